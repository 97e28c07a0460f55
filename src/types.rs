//! Type definitions for authentication and the vendor response envelope

use crate::classifier;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Bearer token with its absolute expiry
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        !self.is_valid_at(Utc::now())
    }

    /// Time left before expiry, zero once expired
    pub fn remaining(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

// Token values never end up in logs
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &format_args!("<{} chars>", self.value.len()))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Vendor response envelope: `{ success, code, pid, data, message }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    pub code: Option<i64>,
    pub pid: Option<String>,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T: DeserializeOwned> ApiResponse<T> {
    /// Build from a successful envelope, tolerating string codes and numeric pids
    pub(crate) fn from_envelope(mut raw: Value) -> serde_json::Result<Self> {
        let data = match raw.get_mut("data").map(Value::take) {
            None | Some(Value::Null) => None,
            Some(data) => Some(serde_json::from_value(data)?),
        };

        Ok(Self {
            success: true,
            code: classifier::payload_code(&raw),
            pid: classifier::payload_pid(&raw),
            message: raw.get("message").and_then(Value::as_str).map(String::from),
            data,
        })
    }

    /// Build from a plain (unwrapped) body; the whole body becomes `data`
    pub(crate) fn from_plain(raw: Value) -> serde_json::Result<Self> {
        Ok(Self {
            success: true,
            code: None,
            pid: None,
            data: Some(serde_json::from_value(raw)?),
            message: None,
        })
    }
}

/// Whether an envelope reports success
pub(crate) fn envelope_success(raw: &Value) -> bool {
    raw.get("success").and_then(Value::as_bool).unwrap_or(false)
}

/// Body of the password login call
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub login: &'a str,
    pub password: &'a str,
    pub lang: &'a str,
}

/// `data` of a successful password login
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub auth_token: String,
    pub expires_in: Option<u64>,
    pub user: Option<AuthUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: i64,
    pub login: String,
    pub email: Option<String>,
}

/// Response of an OAuth client-credentials token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
}

/// HTTP method of a dispatched call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
