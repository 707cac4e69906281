//! HTTP transport for the remote charging API
//!
//! Executes authenticated requests, maps response statuses onto the
//! error taxonomy, and extracts the in-band rate-limit reset hint from
//! 429 bodies. Retry policy lives in the pollers; the transport only
//! retries once after re-establishing authentication.

use crate::auth::TokenManager;
use crate::config::ApiConfig;
use crate::error::{ChargeSyncError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::models::{Charge, ChargePoint, Wallet, WalletTransaction, redact};
use reqwest::{Method, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;

/// Slowdown applied when a 429 body carries no usable reset hint
const DEFAULT_RATE_LIMIT_RESET_SECS: u64 = 60;

/// Build the shared HTTP client used by the transport and token manager
pub fn build_http_client(config: &ApiConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Ensure the base URL ends with a single trailing slash
pub(crate) fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    format!("{}/", trimmed)
}

/// Authenticated client for the charging management API
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    auth: Arc<TokenManager>,
    logger: StructuredLogger,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(config: &ApiConfig, http: reqwest::Client, auth: Arc<TokenManager>) -> Self {
        let logger = get_logger("api");
        Self {
            base_url: normalize_base_url(&config.base_url),
            http,
            auth,
            logger,
        }
    }

    /// Get the charge points available to the account, keyed by id.
    ///
    /// Entries without a serial number are virtual placeholders the
    /// upstream service returns for unprovisioned hardware; they are
    /// filtered out of the reference set.
    pub async fn charge_points(&self) -> Result<HashMap<u64, ChargePoint>> {
        let response = self
            .request(Method::GET, "charge-points?page=0&perPage=10", None)
            .await?;

        let items: Vec<ChargePoint> = match response.get("data") {
            Some(data) => serde_json::from_value(data.clone())?,
            None => {
                self.logger.warn("No charge points found in response!");
                Vec::new()
            }
        };

        Ok(items
            .into_iter()
            .filter(|cp| cp.serial_number.is_some())
            .map(|cp| (cp.id, cp))
            .collect())
    }

    /// Retrieve the charges for one charge point, most recent first
    pub async fn charges(&self, charge_point_id: u64) -> Result<Vec<Charge>> {
        let path = format!("charges?chargePointId={}", charge_point_id);
        let response = self.request(Method::GET, &path, None).await?;

        let mut charges: Vec<Charge> = match response.get("data") {
            Some(data) => serde_json::from_value(data.clone())?,
            None => {
                self.logger.warn("No charges found in response!");
                Vec::new()
            }
        };

        for charge in &mut charges {
            if charge.charge_point_id == 0 {
                charge.charge_point_id = charge_point_id;
            }
        }
        charges.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(charges)
    }

    /// Start a charge on the given charge point
    pub async fn start_charge(&self, charge_point_id: u64) -> Result<Charge> {
        self.logger
            .debug(&format!("Trying to start a charge on: {}", charge_point_id));

        let body = serde_json::json!({ "chargePointId": charge_point_id });
        let response = self.request(Method::POST, "charges", Some(&body)).await?;

        self.logger
            .debug(&format!("Started a charge on: {}", charge_point_id));

        let mut charge: Charge = serde_json::from_value(response)?;
        if charge.charge_point_id == 0 {
            charge.charge_point_id = charge_point_id;
        }
        Ok(charge)
    }

    /// Stop a charge by its id
    pub async fn stop_charge(&self, charge_id: u64) -> Result<()> {
        self.logger
            .debug(&format!("Trying to stop a charge with id: {}", charge_id));

        let path = format!("charges/{}/stop", charge_id);
        self.request(Method::POST, &path, None).await?;

        self.logger
            .debug(&format!("Stopped charge for chargeId: {}", charge_id));
        Ok(())
    }

    /// Retrieve personal wallet information
    pub async fn wallet(&self) -> Result<Wallet> {
        let response = self.request(Method::GET, "wallets/personal", None).await?;
        Ok(serde_json::from_value(response)?)
    }

    /// Retrieve the first page of wallet transactions, most recent first
    pub async fn wallet_transactions(&self) -> Result<Vec<WalletTransaction>> {
        let response = self.request(Method::GET, "wallet-transactions", None).await?;

        let mut transactions: Vec<WalletTransaction> = match response.get("data") {
            Some(data) => serde_json::from_value(data.clone())?,
            None => {
                self.logger.warn("No transactions found in response!");
                Vec::new()
            }
        };

        transactions.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(transactions)
    }

    /// Issue an authenticated request and decode the response.
    ///
    /// On an authentication rejection the cached access token is
    /// invalidated, a fresh one acquired, and the request retried once;
    /// a second rejection surfaces as an auth error.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let access_token = self.auth.access_token().await?;
        match self.send(method.clone(), path, body, &access_token).await {
            Err(err) if err.is_auth() => {
                self.logger
                    .debug(&format!("[{}] Token rejected, re-authenticating", path));
                self.auth.invalidate_access_token().await;
                let access_token = self.auth.access_token().await?;
                self.send(method, path, body, &access_token).await
            }
            other => other,
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        access_token: &str,
    ) -> Result<serde_json::Value> {
        let mut request = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header(reqwest::header::CONTENT_TYPE, "application/json; charset=UTF-8")
            .header(reqwest::header::ACCEPT, "application/json")
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", access_token),
            );
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        decode_response(&self.logger, path, response).await
    }
}

/// Map a response onto the error taxonomy and decode the JSON payload.
///
/// The reset hint for 429 responses is read from the JSON body field
/// `context.rateLimitResponse.resetsIn`; the `Retry-After` header is
/// deliberately not consulted, the service does not populate it reliably.
pub(crate) async fn decode_response(
    logger: &StructuredLogger,
    path: &str,
    response: reqwest::Response,
) -> Result<serde_json::Value> {
    let status = response.status();
    logger.debug(&format!("[{}] Response status: {}", path, status));

    if status == StatusCode::TOO_MANY_REQUESTS {
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let resets_in = body
            .pointer("/context/rateLimitResponse/resetsIn")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(DEFAULT_RATE_LIMIT_RESET_SECS);
        return Err(ChargeSyncError::rate_limited(resets_in));
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ChargeSyncError::auth("Invalid credentials"));
    }

    if status.is_server_error() {
        return Err(ChargeSyncError::communication(format!(
            "[{}] Server error: {}",
            path, status
        )));
    }

    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ChargeSyncError::api(format!(
            "[{}] Unexpected status {}: {}",
            path, status, message
        )));
    }

    let payload: serde_json::Value = response
        .json()
        .await
        .map_err(|e| ChargeSyncError::communication(format!("[{}] Invalid body: {}", path, e)))?;

    logger.debug(&format!("[{}] Response body: {}", path, redact(&payload)));
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_normalization() {
        assert_eq!(
            normalize_base_url("https://api.example.com/v1"),
            "https://api.example.com/v1/"
        );
        assert_eq!(
            normalize_base_url("https://api.example.com/v1/"),
            "https://api.example.com/v1/"
        );
        assert_eq!(
            normalize_base_url("https://api.example.com/v1//"),
            "https://api.example.com/v1/"
        );
    }
}
