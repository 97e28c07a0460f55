//! Classification of vendor error codes and parsing of error payloads
//!
//! The vendor reports failures as a numeric domain code inside the response
//! envelope. This module turns such a code into a severity, a user-facing
//! message and a suggested recovery action, and extracts `{message, code, pid}`
//! from the different payload shapes the vendor (and the OAuth token endpoint)
//! are known to return.

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Sentinel code for transport failures (no vendor response available)
pub const NETWORK_ERROR_CODE: i64 = 7;

/// Trace id attached to transport failures
pub const NETWORK_ERROR_PID: &str = "network-error";

/// Session token is invalid or has expired
pub const AUTH_INVALID_CODE: i64 = 9;

/// Login rejected (bad login/password or client credentials)
pub const AUTH_CREDENTIALS_CODE: i64 = 10;

/// Vendor is throttling requests
pub const RATE_LIMITED_CODE: i64 = 4;

/// Message used when a payload carries no usable message
pub const DEFAULT_ERROR_MESSAGE: &str = "API Error";

/// User message for codes missing from the table
pub const DEFAULT_USER_MESSAGE: &str = "An error occurred";

/// How serious a failure is for the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// What the user (or the caller) should do about a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Retry,
    Redirect,
    ContactSupport,
    FixInput,
}

/// Presentation intensity derived from [`Severity`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// Persistent, actionable notice (critical/high)
    Persistent,
    /// Transient warning (medium)
    Warning,
    /// Transient information (low)
    Info,
}

/// Result of classifying a domain code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub severity: Severity,
    pub user_message: &'static str,
    pub action: Option<RecoveryAction>,
}

impl ErrorInfo {
    pub fn presentation(&self) -> Presentation {
        match self.severity {
            Severity::Critical | Severity::High => Presentation::Persistent,
            Severity::Medium => Presentation::Warning,
            Severity::Low => Presentation::Info,
        }
    }

    /// How long a transient notice for this error stays on screen
    pub fn display_duration(&self) -> Duration {
        match self.severity {
            Severity::Critical => Duration::from_secs(10),
            Severity::High => Duration::from_secs(8),
            Severity::Medium => Duration::from_secs(6),
            Severity::Low => Duration::from_secs(4),
        }
    }
}

struct CodeRule {
    code: i64,
    severity: Severity,
    user_message: &'static str,
    action: Option<RecoveryAction>,
    retry_after: Option<Duration>,
}

const fn rule(
    code: i64,
    severity: Severity,
    user_message: &'static str,
    action: RecoveryAction,
    retry_after: Option<Duration>,
) -> CodeRule {
    CodeRule {
        code,
        severity,
        user_message,
        action: Some(action),
        retry_after,
    }
}

const RULES: &[CodeRule] = &[
    rule(1, Severity::Medium, "Some search parameters are invalid. Please check your input.", RecoveryAction::FixInput, None),
    rule(2, Severity::Medium, "A required parameter is missing.", RecoveryAction::FixInput, None),
    rule(3, Severity::High, "Access to this service is denied.", RecoveryAction::ContactSupport, None),
    rule(RATE_LIMITED_CODE, Severity::Low, "Too many requests. Please wait a moment.", RecoveryAction::Retry, Some(Duration::from_secs(5))),
    rule(5, Severity::High, "The flight service is temporarily unavailable.", RecoveryAction::Retry, Some(Duration::from_secs(5))),
    rule(6, Severity::Critical, "The flight service encountered an internal error.", RecoveryAction::ContactSupport, None),
    rule(NETWORK_ERROR_CODE, Severity::Medium, "Network error. Please check your connection.", RecoveryAction::Retry, Some(Duration::from_secs(5))),
    rule(8, Severity::Medium, "The request timed out. Please try again.", RecoveryAction::Retry, Some(Duration::from_secs(3))),
    rule(AUTH_INVALID_CODE, Severity::High, "Your session has expired.", RecoveryAction::Redirect, Some(Duration::ZERO)),
    rule(AUTH_CREDENTIALS_CODE, Severity::Critical, "Authentication with the flight service failed.", RecoveryAction::Redirect, None),
    rule(11, Severity::Low, "No flights found for this search.", RecoveryAction::FixInput, None),
    rule(12, Severity::Low, "Search results have expired. Please search again.", RecoveryAction::Retry, Some(Duration::ZERO)),
    rule(13, Severity::Medium, "This offer is no longer available.", RecoveryAction::Retry, Some(Duration::from_secs(3))),
];

fn find_rule(code: Option<i64>) -> Option<&'static CodeRule> {
    let code = code?;
    RULES.iter().find(|rule| rule.code == code)
}

/// Classify a domain code. Total over the code space: missing or unknown
/// codes fall back to `{medium, "An error occurred", none}`.
pub fn classify(code: Option<i64>) -> ErrorInfo {
    match find_rule(code) {
        Some(rule) => ErrorInfo {
            severity: rule.severity,
            user_message: rule.user_message,
            action: rule.action,
        },
        None => ErrorInfo {
            severity: Severity::Medium,
            user_message: DEFAULT_USER_MESSAGE,
            action: None,
        },
    }
}

/// Suggested delay before retrying, `None` when retrying will not help
pub fn retry_hint(code: Option<i64>) -> Option<Duration> {
    find_rule(code).and_then(|rule| rule.retry_after)
}

/// Whether the code is present in the classification table
pub fn is_known_code(code: i64) -> bool {
    find_rule(Some(code)).is_some()
}

/// Whether the code means the current token must be discarded
pub fn is_auth_code(code: i64) -> bool {
    matches!(code, AUTH_INVALID_CODE | AUTH_CREDENTIALS_CODE)
}

/// Error details extracted from a raw response payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPayload {
    pub message: String,
    pub code: Option<i64>,
    pub pid: Option<String>,
}

impl Default for ErrorPayload {
    fn default() -> Self {
        Self {
            message: DEFAULT_ERROR_MESSAGE.to_string(),
            code: None,
            pid: None,
        }
    }
}

impl ErrorPayload {
    /// True when no message could be found in the payload
    pub fn has_default_message(&self) -> bool {
        self.message == DEFAULT_ERROR_MESSAGE
    }
}

/// Extract `{message, code, pid}` from any payload.
///
/// Message lookup order: `data.message`, `message`, `errors[0].detail`,
/// `errors[0].title`, `error_description`, `error`, then [`DEFAULT_ERROR_MESSAGE`].
/// Code: `code` (number or numeric string), then `errors[0].code`.
/// Non-object input yields the default payload.
pub fn parse_error_payload(raw: &Value) -> ErrorPayload {
    let message = [
        "/data/message",
        "/message",
        "/errors/0/detail",
        "/errors/0/title",
        "/error_description",
        "/error",
    ]
    .iter()
    .find_map(|pointer| raw.pointer(pointer).and_then(non_empty_str))
    .unwrap_or(DEFAULT_ERROR_MESSAGE)
    .to_string();

    ErrorPayload {
        message,
        code: payload_code(raw),
        pid: payload_pid(raw),
    }
}

/// Domain code of a payload, accepting numbers and numeric strings
pub fn payload_code(raw: &Value) -> Option<i64> {
    raw.get("code")
        .and_then(as_code)
        .or_else(|| raw.pointer("/errors/0/code").and_then(as_code))
}

/// Trace id of a payload
pub fn payload_pid(raw: &Value) -> Option<String> {
    match raw.get("pid")? {
        Value::String(pid) if !pid.is_empty() => Some(pid.clone()),
        Value::Number(pid) => Some(pid.to_string()),
        _ => None,
    }
}

fn as_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|text| !text.trim().is_empty())
}
