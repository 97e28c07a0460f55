//! Request dispatcher: attaches the token, issues the call, normalizes failures

use crate::auth_client::{AuthClient, AuthClientHttp, USER_AGENT};
use crate::classifier::{self, ErrorPayload, AUTH_INVALID_CODE, RATE_LIMITED_CODE};
use crate::config::{ClientConfig, ResponseFormat, TokenPlacement};
use crate::error::{ApiError, ApiResult, Result};
use crate::token_store::TokenCache;
use crate::types::{envelope_success, ApiResponse, Method, Token};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Name of the token parameter/header for `auth_key` placement
pub const AUTH_KEY_PARAM: &str = "auth_key";

/// Authenticated client for the vendor API
///
/// Every failure is returned as an [`ApiError`]. An auth-invalid code clears
/// the token cache so the next call logs in again; a successful call slides
/// the token expiry forward.
pub struct ApiClient<A: AuthClient = AuthClientHttp> {
    config: Arc<ClientConfig>,
    auth: Arc<A>,
    http_client: Client,
}

impl ApiClient<AuthClientHttp> {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let config = Arc::new(config);
        let auth = AuthClientHttp::new(Arc::clone(&config))?;
        Self::with_auth(config, auth)
    }

    /// Client configured from `MYAGENT_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }
}

impl<A: AuthClient> ApiClient<A> {
    pub fn with_auth(config: Arc<ClientConfig>, auth: Arc<A>) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()?;

        Ok(Self {
            config,
            auth,
            http_client,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn auth(&self) -> &Arc<A> {
        &self.auth
    }

    pub fn token_cache(&self) -> &TokenCache {
        self.auth.token_cache()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token_cache().is_valid()
    }

    pub fn token_expiry(&self) -> Option<DateTime<Utc>> {
        self.token_cache().get().map(|token| token.expires_at)
    }

    /// Install a token issued elsewhere (e.g. handed over by a server process)
    pub fn seed_token(&self, value: impl Into<String>, lifetime: Duration) -> Token {
        self.token_cache().set(value, lifetime)
    }

    /// Log out: drop the token and its persisted copy
    pub fn clear_auth(&self) {
        self.token_cache().clear();
        info!("Authentication cleared");
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &(impl Serialize + ?Sized),
    ) -> ApiResult<ApiResponse<T>> {
        self.call(endpoint, params, Method::Get).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &(impl Serialize + ?Sized),
    ) -> ApiResult<ApiResponse<T>> {
        self.call(endpoint, params, Method::Post).await
    }

    /// Dispatch an authenticated call
    ///
    /// 1. Obtain a token (cached, or via a possibly shared login)
    /// 2. Attach it per the configured placement
    /// 3. Send with the configured timeout
    /// 4. Classify the response
    pub async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &(impl Serialize + ?Sized),
        method: Method,
    ) -> ApiResult<ApiResponse<T>> {
        let token = self.auth.get_access_token().await?;

        let params = serde_json::to_value(params).map_err(|e| {
            let mut err = ApiError::from_payload(ErrorPayload {
                message: "Failed to encode request parameters".to_string(),
                ..ErrorPayload::default()
            });
            err.original_message = Some(e.to_string());
            err
        })?;

        debug!(method = %method, endpoint = %endpoint, "API request");

        let response = match self.build_request(endpoint, &params, method, &token).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(method = %method, endpoint = %endpoint, error = %e, "API request failed");
                return Err(ApiError::network(&e));
            }
        };

        let status = response.status();
        debug!(status = %status, endpoint = %endpoint, "API response");

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "Failed to read API response");
                return Err(ApiError::network(&e));
            }
        };
        let raw = serde_json::from_slice::<Value>(&body).ok();

        let result = match self.config.credentials.response_format() {
            ResponseFormat::Envelope => self.interpret_envelope(status, raw),
            ResponseFormat::Plain => self.interpret_plain(status, raw),
        };

        result.map_err(|e| self.reject(endpoint, e))
    }

    fn build_request(&self, endpoint: &str, params: &Value, method: Method, token: &str) -> RequestBuilder {
        let url = self.config.endpoint_url(endpoint);
        let builder = match method {
            Method::Get => self.http_client.get(&url).query(&flatten_query(params)),
            Method::Post => self.http_client.post(&url).json(params),
        };

        match (self.config.credentials.token_placement(), method) {
            (TokenPlacement::AuthKey, Method::Get) => builder.query(&[(AUTH_KEY_PARAM, token)]),
            (TokenPlacement::AuthKey, Method::Post) => builder.header(AUTH_KEY_PARAM, token),
            (TokenPlacement::Bearer, _) => builder.bearer_auth(token),
        }
    }

    fn interpret_envelope<T: DeserializeOwned>(
        &self,
        status: StatusCode,
        raw: Option<Value>,
    ) -> ApiResult<ApiResponse<T>> {
        let Some(raw) = raw else {
            return Err(ApiError::malformed(format!("non-JSON response with status {status}"), None));
        };

        if !(status.is_success() && envelope_success(&raw)) {
            return Err(ApiError::from_payload(classifier::parse_error_payload(&raw)));
        }

        let pid = classifier::payload_pid(&raw);
        self.slide_expiry();
        ApiResponse::from_envelope(raw).map_err(|e| ApiError::malformed(e, pid))
    }

    fn interpret_plain<T: DeserializeOwned>(
        &self,
        status: StatusCode,
        raw: Option<Value>,
    ) -> ApiResult<ApiResponse<T>> {
        if status.is_success() {
            self.slide_expiry();
            return ApiResponse::from_plain(raw.unwrap_or(Value::Null)).map_err(|e| ApiError::malformed(e, None));
        }

        let mut payload = raw
            .as_ref()
            .map(classifier::parse_error_payload)
            .unwrap_or_default();

        match status {
            StatusCode::UNAUTHORIZED => payload.code = Some(AUTH_INVALID_CODE),
            StatusCode::TOO_MANY_REQUESTS => payload.code = Some(RATE_LIMITED_CODE),
            _ => {}
        }
        if payload.has_default_message() {
            payload.message = format!("Request failed with status {status}");
        }

        Err(ApiError::from_payload(payload))
    }

    /// Sliding expiry after a successful authenticated call
    fn slide_expiry(&self) {
        if let Some(expires_at) = self.token_cache().extend(self.config.session_lifetime) {
            debug!(expires_at = %expires_at, "Extended auth token");
        }
    }

    fn reject(&self, endpoint: &str, err: ApiError) -> ApiError {
        if err.code.is_some_and(classifier::is_auth_code) {
            info!(endpoint = %endpoint, "Authentication error detected, clearing auth");
            self.token_cache().clear();
        }

        warn!(
            endpoint = %endpoint,
            kind = %err.kind,
            code = ?err.code,
            pid = ?err.pid,
            error = %err,
            "API call failed"
        );
        err
    }
}

/// Flatten JSON parameters into query pairs using bracket notation
///
/// `{"segments": [{"from": "JFK"}]}` becomes `segments[0][from]=JFK`.
/// Nulls are dropped and booleans become `1`/`0`.
pub fn flatten_query(params: &Value) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let Value::Object(map) = params {
        for (key, value) in map {
            push_pairs(key.clone(), value, &mut pairs);
        }
    }
    pairs
}

fn push_pairs(key: String, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Bool(flag) => pairs.push((key, if *flag { "1" } else { "0" }.to_string())),
        Value::Number(number) => pairs.push((key, number.to_string())),
        Value::String(text) => pairs.push((key, text.clone())),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                push_pairs(format!("{key}[{index}]"), item, pairs);
            }
        }
        Value::Object(map) => {
            for (name, item) in map {
                push_pairs(format!("{key}[{name}]"), item, pairs);
            }
        }
    }
}
