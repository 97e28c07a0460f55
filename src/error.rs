//! Error types for the MyAgent client

use crate::classifier::{
    self, ErrorInfo, ErrorPayload, Presentation, RecoveryAction, Severity, AUTH_CREDENTIALS_CODE,
    NETWORK_ERROR_CODE, NETWORK_ERROR_PID,
};
use crate::storage::StorageError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Client error types
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Result of a dispatched API call
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Broad class of an [`ApiError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// Transport failure or timeout, no vendor response
    Network,
    /// Login failed or the vendor rejected the token
    Authentication,
    /// Known vendor code unrelated to authentication
    Domain,
    /// Unknown code or malformed payload
    Unknown,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Authentication => "authentication",
            Self::Domain => "domain",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Normalized failure of an outbound call.
///
/// Every failure leaving [`ApiClient`](crate::ApiClient) has this shape; raw
/// transport errors are folded into `original_message`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    pub code: Option<i64>,
    pub pid: Option<String>,
    pub original_message: Option<String>,
    pub can_retry: bool,
    pub retry_delay: Option<Duration>,
    pub severity: Severity,
    pub action: Option<RecoveryAction>,
}

impl ApiError {
    /// Transport failure: connection refused, DNS, timeout, broken body
    pub fn network(err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "Request timed out. Please try again."
        } else {
            "Network error. Please check your connection."
        };
        let info = classifier::classify(Some(NETWORK_ERROR_CODE));

        Self {
            kind: ApiErrorKind::Network,
            message: message.to_string(),
            code: Some(NETWORK_ERROR_CODE),
            pid: Some(NETWORK_ERROR_PID.to_string()),
            original_message: Some(err.to_string()),
            can_retry: true,
            retry_delay: classifier::retry_hint(Some(NETWORK_ERROR_CODE)),
            severity: info.severity,
            action: info.action,
        }
    }

    /// Failure reported by the vendor in a response payload
    pub fn from_payload(payload: ErrorPayload) -> Self {
        let kind = match payload.code {
            Some(code) if classifier::is_auth_code(code) => ApiErrorKind::Authentication,
            Some(code) if classifier::is_known_code(code) => ApiErrorKind::Domain,
            _ => ApiErrorKind::Unknown,
        };
        Self::classified(kind, payload.message, payload.code, payload.pid)
    }

    /// Login call did not yield a token
    ///
    /// Always carries an auth code. A vendor code outside the auth set is
    /// kept in `original_message`.
    pub fn login_failed(payload: ErrorPayload) -> Self {
        let (code, vendor_code) = match payload.code {
            Some(code) if classifier::is_auth_code(code) => (code, None),
            other => (AUTH_CREDENTIALS_CODE, other),
        };
        let mut err = Self::classified(
            ApiErrorKind::Authentication,
            format!("Authentication failed: {}", payload.message),
            Some(code),
            payload.pid,
        );
        err.original_message = vendor_code.map(|code| format!("vendor error code {code}"));
        err
    }

    /// Response arrived but could not be interpreted
    pub fn malformed(detail: impl fmt::Display, pid: Option<String>) -> Self {
        let mut err = Self::classified(
            ApiErrorKind::Unknown,
            "Malformed response payload".to_string(),
            None,
            pid,
        );
        err.original_message = Some(detail.to_string());
        err
    }

    fn classified(kind: ApiErrorKind, message: String, code: Option<i64>, pid: Option<String>) -> Self {
        let info = classifier::classify(code);
        let retry_delay = classifier::retry_hint(code);
        let action = match kind {
            ApiErrorKind::Unknown => info.action.or(Some(RecoveryAction::ContactSupport)),
            _ => info.action,
        };

        Self {
            kind,
            message,
            code,
            pid,
            original_message: None,
            can_retry: retry_delay.is_some(),
            retry_delay,
            severity: info.severity,
            action,
        }
    }

    /// Whether the failure carries an auth-invalid code
    pub fn is_auth_error(&self) -> bool {
        self.code.is_some_and(classifier::is_auth_code)
    }

    pub fn info(&self) -> ErrorInfo {
        classifier::classify(self.code)
    }

    pub fn presentation(&self) -> Presentation {
        self.info().presentation()
    }

    /// One-line notice for the user, including the trace id when known
    pub fn user_notice(&self) -> String {
        let user_message = self.info().user_message;
        match (self.code, self.pid.as_deref()) {
            (Some(code), Some(pid)) => format!("{user_message} (Error {code} • ID: {pid})"),
            (Some(code), None) => format!("{user_message} (Error {code})"),
            (None, Some(pid)) => format!("{user_message} (ID: {pid})"),
            (None, None) => user_message.to_string(),
        }
    }
}
