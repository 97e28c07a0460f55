//! Client configuration, read once from the environment

use crate::error::{ClientError, Result};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.myagent.online/api";
pub const DEFAULT_LANG: &str = "en";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(15);
/// Used when the login response carries no `expires_in`
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(55 * 60);
/// Subtracted from a vendor-provided `expires_in`
pub const DEFAULT_EXPIRY_SAFETY_MARGIN: Duration = Duration::from_secs(60);

const OAUTH_TOKEN_PATH: &str = "/v1/security/oauth2/token";

/// Login credentials; the variant selects the deployment flavour
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Username/password login against `{base_url}/user/login`
    Password { login: String, password: String },

    /// OAuth client-credentials grant against `token_url`
    ClientCredentials {
        token_url: String,
        client_id: String,
        client_secret: String,
    },
}

impl Credentials {
    pub fn token_placement(&self) -> TokenPlacement {
        match self {
            Self::Password { .. } => TokenPlacement::AuthKey,
            Self::ClientCredentials { .. } => TokenPlacement::Bearer,
        }
    }

    pub fn response_format(&self) -> ResponseFormat {
        match self {
            Self::Password { .. } => ResponseFormat::Envelope,
            Self::ClientCredentials { .. } => ResponseFormat::Plain,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password { login, .. } => f
                .debug_struct("Password")
                .field("login", login)
                .field("password", &"<redacted>")
                .finish(),
            Self::ClientCredentials {
                token_url,
                client_id,
                ..
            } => f
                .debug_struct("ClientCredentials")
                .field("token_url", token_url)
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
        }
    }
}

/// How the bearer token travels on outbound calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPlacement {
    /// `auth_key` query parameter on GET, `auth_key` header on POST
    AuthKey,
    /// `Authorization: Bearer` header on every call
    Bearer,
}

/// How success is signalled in responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// `{ success, code, pid, data, message }` envelope
    Envelope,
    /// Bare body, HTTP status decides success
    Plain,
}

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the vendor API, without trailing slash
    pub base_url: String,

    pub credentials: Credentials,

    /// Language code sent with login and search calls
    pub lang: String,

    /// Ceiling for every dispatched call
    pub request_timeout: Duration,

    /// Ceiling for the login call
    pub login_timeout: Duration,

    /// Token lifetime when the login response has no `expires_in`
    pub default_token_lifetime: Duration,

    /// Subtracted from a vendor-provided `expires_in`
    pub expiry_safety_margin: Duration,

    /// Lifetime granted by the sliding extension after each successful call
    pub session_lifetime: Duration,

    /// JSON file for durable token storage; in-memory only when unset
    pub token_store_path: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            credentials,
            lang: DEFAULT_LANG.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            default_token_lifetime: DEFAULT_TOKEN_LIFETIME,
            expiry_safety_margin: DEFAULT_EXPIRY_SAFETY_MARGIN,
            session_lifetime: DEFAULT_TOKEN_LIFETIME,
            token_store_path: None,
        }
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets both the default token lifetime and the sliding session lifetime
    pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.default_token_lifetime = lifetime;
        self.session_lifetime = lifetime;
        self
    }

    pub fn with_token_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_store_path = Some(path.into());
        self
    }

    /// Load configuration from the environment (and a `.env` file if present)
    ///
    /// Password credentials (`MYAGENT_API_LOGIN` + `MYAGENT_API_PASSWORD`) take
    /// precedence over client credentials (`MYAGENT_OAUTH_CLIENT_ID` +
    /// `MYAGENT_OAUTH_CLIENT_SECRET`).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let secs = |key: &str, default: Duration| match var(key) {
            None => default,
            Some(raw) => raw.parse().map(Duration::from_secs).unwrap_or_else(|e| {
                warn!(key, value = %raw, error = %e, "Invalid duration, using default");
                default
            }),
        };

        let base_url = var("MYAGENT_API_BASE_URL").unwrap_or_else(|| {
            info!(default = DEFAULT_BASE_URL, "MYAGENT_API_BASE_URL not set, using default");
            DEFAULT_BASE_URL.to_string()
        });
        let base_url = base_url.trim_end_matches('/').to_string();

        let credentials = match (
            var("MYAGENT_API_LOGIN"),
            var("MYAGENT_API_PASSWORD"),
            var("MYAGENT_OAUTH_CLIENT_ID"),
            var("MYAGENT_OAUTH_CLIENT_SECRET"),
        ) {
            (Some(login), Some(password), _, _) => Credentials::Password { login, password },
            (_, _, Some(client_id), Some(client_secret)) => Credentials::ClientCredentials {
                token_url: var("MYAGENT_OAUTH_TOKEN_URL")
                    .unwrap_or_else(|| format!("{base_url}{OAUTH_TOKEN_PATH}")),
                client_id,
                client_secret,
            },
            _ => {
                return Err(ClientError::Configuration(
                    "set MYAGENT_API_LOGIN/MYAGENT_API_PASSWORD or MYAGENT_OAUTH_CLIENT_ID/MYAGENT_OAUTH_CLIENT_SECRET"
                        .to_string(),
                ))
            }
        };

        let token_lifetime = secs("MYAGENT_TOKEN_LIFETIME_SECS", DEFAULT_TOKEN_LIFETIME);
        let mut config = Self::new(base_url, credentials)
            .with_request_timeout(secs("MYAGENT_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT))
            .with_token_lifetime(token_lifetime);

        if let Some(lang) = var("MYAGENT_LANG") {
            config.lang = lang;
        }
        if let Some(path) = var("MYAGENT_TOKEN_STORE") {
            config.token_store_path = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    /// Lifetime to cache a freshly issued token for
    pub fn token_lifetime(&self, expires_in: Option<u64>) -> Duration {
        match expires_in {
            Some(secs) => Duration::from_secs(secs).saturating_sub(self.expiry_safety_margin),
            None => self.default_token_lifetime,
        }
    }

    /// Absolute URL of the login / token call
    pub fn login_url(&self) -> String {
        match &self.credentials {
            Credentials::Password { .. } => format!("{}/user/login", self.base_url),
            Credentials::ClientCredentials { token_url, .. } => token_url.clone(),
        }
    }

    /// Absolute URL for `endpoint`; absolute URLs pass through unchanged
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
        }
    }
}
