//! OAuth token lifecycle for the remote charging API
//!
//! The [`TokenManager`] owns the stored token record: it acquires tokens
//! with client credentials, refreshes them preemptively before expiry,
//! and persists every change through the injected [`TokenStore`]. All
//! checks and refreshes run under one async lock, so concurrent callers
//! observing an expiring token trigger exactly one network refresh.

use crate::api;
use crate::config::ApiConfig;
use crate::error::{ChargeSyncError, Result};
use crate::logging::get_logger;
use crate::models::{Token, TokenResponse};
use crate::storage::TokenStore;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Refresh this many seconds before the token would actually expire
const PREEMPTIVE_REFRESH_TTL_SECS: i64 = 300;

/// Manages acquisition, refresh and persistence of the API token
pub struct TokenManager {
    client_id: String,
    client_secret: String,
    base_url: String,
    http: reqwest::Client,
    store: Arc<dyn TokenStore>,
    // Guards the whole load/check/refresh sequence (at-most-one-refresh-in-flight)
    token: Mutex<Option<Token>>,
    logger: crate::logging::StructuredLogger,
}

impl TokenManager {
    /// Create a new token manager
    pub fn new(config: &ApiConfig, http: reqwest::Client, store: Arc<dyn TokenStore>) -> Self {
        let logger = get_logger("auth");
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            base_url: api::normalize_base_url(&config.base_url),
            http,
            store,
            token: Mutex::new(None),
            logger,
        }
    }

    /// Return an access token guaranteed to be outside the preemptive
    /// refresh margin, refreshing or re-authenticating as needed
    pub async fn access_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;

        if guard.is_none() {
            *guard = Some(self.store.load().await?.unwrap_or_default());
        }
        let token = match guard.as_mut() {
            Some(token) => token,
            None => return Err(ChargeSyncError::auth("token record unavailable")),
        };

        let margin = chrono::Duration::seconds(PREEMPTIVE_REFRESH_TTL_SECS);
        let now = chrono::Utc::now();

        if token.is_access_token_valid(margin, now) {
            self.logger.debug("Access token still valid, using it");
            if let Some(access_token) = token.access_token.clone() {
                return Ok(access_token);
            }
        }

        if token.is_refresh_token_valid(margin, now) {
            self.logger.debug("Refresh token still valid, using it");
            let refresh_token = token.refresh_token.clone().unwrap_or_default();
            match self.request_refresh(&refresh_token).await {
                Ok(response) => {
                    token.apply(&response);
                    self.store.save(token).await?;
                    return Ok(response.access_token);
                }
                Err(err) if err.is_auth() => {
                    // Refresh token rejected remotely; fall through to a
                    // full re-authentication with client credentials
                    self.logger
                        .warn("Refresh token rejected, re-authenticating with client credentials");
                }
                Err(err) => return Err(err),
            }
        }

        self.logger.debug("No token is valid, requesting new tokens");
        let response = self.request_token().await?;
        token.apply(&response);
        self.store.save(token).await?;
        Ok(response.access_token)
    }

    /// Drop the cached access token so the next call refreshes. Called by
    /// the transport when the remote service rejects a request as
    /// unauthenticated.
    pub async fn invalidate_access_token(&self) {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_mut() {
            token.access_token = None;
            token.access_token_expiration = None;
            self.logger.debug("Access token invalidated");
        }
    }

    /// Obtain a fresh token pair with client credentials
    async fn request_token(&self) -> Result<TokenResponse> {
        let body = serde_json::json!({
            "clientId": self.client_id,
            "clientSecret": self.client_secret,
        });
        self.post_token_endpoint("auth/token", &body).await
    }

    /// Exchange a refresh token for a fresh token pair
    async fn request_refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        let body = serde_json::json!({ "refreshToken": refresh_token });
        self.post_token_endpoint("auth/refresh", &body).await
    }

    async fn post_token_endpoint(&self, path: &str, body: &serde_json::Value) -> Result<TokenResponse> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header(reqwest::header::CONTENT_TYPE, "application/json; charset=UTF-8")
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;

        let payload = api::decode_response(&self.logger, path, response).await?;
        let token_response: TokenResponse = serde_json::from_value(payload)
            .map_err(|e| ChargeSyncError::auth(format!("Malformed token response: {}", e)))?;
        Ok(token_response)
    }
}
