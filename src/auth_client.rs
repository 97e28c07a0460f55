// Authentication client with single-flight login and token caching

use crate::classifier::{self, ErrorPayload};
use crate::config::{ClientConfig, Credentials};
use crate::error::{ApiError, ApiResult, Result};
use crate::storage::{FileStore, KeyValueStore, MemoryStore};
use crate::token_store::TokenCache;
use crate::types::*;
use async_singleflight::Group;
use reqwest::Client;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// User agent sent with every call
pub(crate) const USER_AGENT: &str = "MyAgentClient/1.0";

/// Key of the only login flight; one client manages one set of credentials
const LOGIN_FLIGHT: &str = "login";

/// Source of bearer tokens for the request dispatcher
pub trait AuthClient: Send + Sync + 'static {
    /// Get a valid access token
    ///
    /// - Valid cached token: returns immediately
    /// - No token or expired token: logs in, or joins the login already in flight
    fn get_access_token(&self) -> impl Future<Output = ApiResult<String>> + Send;

    /// Cache the dispatcher extends after successful calls and clears on auth failures
    fn token_cache(&self) -> &TokenCache;
}

/// Authentication client logging in over HTTP
///
/// Concurrent callers that find no valid token share a single login call:
/// all of them observe the same token or the same error.
pub struct AuthClientHttp {
    config: Arc<ClientConfig>,
    token_cache: TokenCache,
    http_client: Client,
    /// Singleflight group so that at most one login request is outstanding.
    /// The error type is `ApiError` so joined callers receive the leader's failure.
    login_singleflight: Group<Token, ApiError>,
}

impl AuthClientHttp {
    /// Create an authentication client
    ///
    /// The token cache persists to `config.token_store_path` when set and is
    /// hydrated from it immediately.
    pub fn new(config: Arc<ClientConfig>) -> Result<Arc<Self>> {
        let store: Arc<dyn KeyValueStore> = match &config.token_store_path {
            Some(path) => Arc::new(FileStore::new(path)),
            None => Arc::new(MemoryStore::new()),
        };
        Self::with_token_cache(config, TokenCache::new(store))
    }

    /// Create an authentication client over an existing token cache
    pub fn with_token_cache(config: Arc<ClientConfig>, token_cache: TokenCache) -> Result<Arc<Self>> {
        let http_client = Client::builder()
            .timeout(config.login_timeout)
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()?;

        Ok(Arc::new(Self {
            config,
            token_cache,
            http_client,
            login_singleflight: Group::new(),
        }))
    }

    /// Obtain a valid token, logging in only when the cache has none
    ///
    /// A token still valid in the cache is returned without a login call, so
    /// this never forces a re-login; call `token_cache().clear()` first for
    /// that. Joins the login already in flight if there is one. On failure the
    /// cache is cleared and the error is returned to every joined caller;
    /// there is no internal retry.
    pub async fn authenticate(&self) -> ApiResult<Token> {
        let (token_opt, error_opt, shared) = self
            .login_singleflight
            .work(LOGIN_FLIGHT, async {
                // A flight that finished just before this one started may already have filled the cache
                if let Some(token) = self.token_cache.get() {
                    return Ok(token);
                }

                match self.do_authenticate().await {
                    Ok(token) => Ok(token),
                    Err(e) => {
                        self.token_cache.clear();
                        warn!(
                            url = %self.config.login_url(),
                            code = ?e.code,
                            error = %e,
                            "Authentication failed"
                        );
                        Err(e)
                    }
                }
            })
            .await;

        if shared {
            debug!("Joined in-flight authentication");
        }

        match (token_opt, error_opt) {
            (Some(token), None) => Ok(token),
            (None, Some(e)) => Err(e),
            _ => Err(ApiError::login_failed(ErrorPayload {
                message: "Unknown error during authentication".to_string(),
                ..ErrorPayload::default()
            })),
        }
    }

    /// Perform the login exchange for the configured credentials
    async fn do_authenticate(&self) -> ApiResult<Token> {
        info!(url = %self.config.login_url(), "Authenticating");

        let (value, expires_in) = match &self.config.credentials {
            Credentials::Password { login, password } => self.login_with_password(login, password).await?,
            Credentials::ClientCredentials {
                token_url,
                client_id,
                client_secret,
            } => {
                self.login_with_client_credentials(token_url, client_id, client_secret)
                    .await?
            }
        };

        let token = self
            .token_cache
            .set(value, self.config.token_lifetime(expires_in));

        info!(
            expires_at = %token.expires_at,
            vendor_expires_in = ?expires_in,
            "Authentication succeeded"
        );

        Ok(token)
    }

    async fn login_with_password(&self, login: &str, password: &str) -> ApiResult<(String, Option<u64>)> {
        let request = LoginRequest {
            login,
            password,
            lang: &self.config.lang,
        };

        let response = self
            .http_client
            .post(self.config.login_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::network(&e))?;

        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);

        if status.is_success() && envelope_success(&body) {
            let auth = body
                .get("data")
                .cloned()
                .and_then(|data| serde_json::from_value::<AuthResponse>(data).ok())
                .filter(|auth| !auth.auth_token.is_empty());

            if let Some(auth) = auth {
                if let Some(user) = &auth.user {
                    debug!(user_id = user.id, login = %user.login, "Logged in");
                }
                return Ok((auth.auth_token, auth.expires_in));
            }
        }

        let mut payload = classifier::parse_error_payload(&body);
        if payload.has_default_message() {
            payload.message = format!("No token received (status {status})");
        }
        Err(ApiError::login_failed(payload))
    }

    async fn login_with_client_credentials(
        &self,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> ApiResult<(String, Option<u64>)> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];

        let response = self
            .http_client
            .post(token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ApiError::network(&e))?;

        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);

        if status.is_success() {
            let grant = serde_json::from_value::<OAuthTokenResponse>(body.clone())
                .ok()
                .filter(|grant| !grant.access_token.is_empty());

            if let Some(grant) = grant {
                debug!(token_type = ?grant.token_type, "Client credentials accepted");
                return Ok((grant.access_token, grant.expires_in));
            }
        }

        let mut payload = classifier::parse_error_payload(&body);
        if payload.has_default_message() {
            payload.message = format!("Token endpoint returned status {status}");
        }
        Err(ApiError::login_failed(payload))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl AuthClient for AuthClientHttp {
    async fn get_access_token(&self) -> ApiResult<String> {
        // Fast path: valid cached token, no singleflight involved
        if let Some(token) = self.token_cache.get() {
            return Ok(token.value);
        }

        debug!("No valid auth token, authenticating");
        self.authenticate().await.map(|token| token.value)
    }

    fn token_cache(&self) -> &TokenCache {
        &self.token_cache
    }
}
