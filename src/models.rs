//! Data model for the remote charging API
//!
//! Wire structs mirror the JSON payloads of the charging management API
//! (camelCase field names), with lenient defaults so a sparse payload
//! still deserializes. Also holds the stored token record and the
//! private-field redaction used before response bodies hit the logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response of the token and refresh endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub access_token_expiration_date: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expiration_date: DateTime<Utc>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Stored token record, persisted opaquely through a [`crate::storage::TokenStore`]
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Token {
    pub access_token: Option<String>,
    pub access_token_expiration: Option<DateTime<Utc>>,
    pub refresh_token: Option<String>,
    pub refresh_token_expiration: Option<DateTime<Utc>>,
}

impl Token {
    /// Merge a token endpoint response into the stored record
    pub fn apply(&mut self, response: &TokenResponse) {
        self.access_token = Some(response.access_token.clone());
        self.access_token_expiration = Some(response.access_token_expiration_date);
        self.refresh_token = Some(response.refresh_token.clone());
        self.refresh_token_expiration = Some(response.refresh_token_expiration_date);
    }

    /// Whether the access token is present and outside the preemptive
    /// refresh margin
    pub fn is_access_token_valid(&self, margin: chrono::Duration, now: DateTime<Utc>) -> bool {
        match (&self.access_token, self.access_token_expiration) {
            (Some(token), Some(expiration)) if !token.is_empty() => now < expiration - margin,
            _ => false,
        }
    }

    /// Whether the refresh token is present and outside the preemptive
    /// refresh margin
    pub fn is_refresh_token_valid(&self, margin: chrono::Duration, now: DateTime<Utc>) -> bool {
        match (&self.refresh_token, self.refresh_token_expiration) {
            (Some(token), Some(expiration)) if !token.is_empty() => now < expiration - margin,
            _ => false,
        }
    }
}

// Token material must never appear in logs, so Debug masks it.
impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &self.access_token.as_deref().map(mask))
            .field("access_token_expiration", &self.access_token_expiration)
            .field("refresh_token", &self.refresh_token.as_deref().map(mask))
            .field("refresh_token_expiration", &self.refresh_token_expiration)
            .finish()
    }
}

fn mask(value: &str) -> String {
    "*".repeat(value.len())
}

/// Charge point state as reported by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChargerState {
    Available,
    Busy,
    BusyBlocked,
    BusyCharging,
    BusyNonCharging,
    BusyNonReleased,
    BusyReserved,
    BusyScheduled,
    Error,
    Disconnected,
    Passive,
    #[serde(other)]
    Other,
}

impl ChargerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Busy => "busy",
            Self::BusyBlocked => "busy-blocked",
            Self::BusyCharging => "busy-charging",
            Self::BusyNonCharging => "busy-non-charging",
            Self::BusyNonReleased => "busy-non-released",
            Self::BusyReserved => "busy-reserved",
            Self::BusyScheduled => "busy-scheduled",
            Self::Error => "error",
            Self::Disconnected => "disconnected",
            Self::Passive => "passive",
            Self::Other => "other",
        }
    }

    /// Any of the busy states, meaning a charge can be stopped
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Busy
                | Self::BusyBlocked
                | Self::BusyCharging
                | Self::BusyNonCharging
                | Self::BusyNonReleased
                | Self::BusyReserved
                | Self::BusyScheduled
        )
    }
}

impl Default for ChargerState {
    fn default() -> Self {
        Self::Other
    }
}

/// AC or DC charge point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChargePointType {
    Ac,
    Dc,
    #[serde(other)]
    #[default]
    Other,
}

/// Public or private charge point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

/// A physical charging station
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChargePoint {
    pub id: u64,
    pub name: String,
    pub serial_number: Option<String>,
    #[serde(rename = "type")]
    pub kind: ChargePointType,
    pub state: ChargerState,
    pub visibility: Visibility,
    pub last_meter_reading_kwh: f64,
    pub brand_name: String,
    pub model_name: String,
    pub firmware_version: String,
    pub cable_plugged_in: bool,
}

impl Default for ChargePoint {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            serial_number: None,
            kind: ChargePointType::Other,
            state: ChargerState::Other,
            visibility: Visibility::Private,
            last_meter_reading_kwh: 0.0,
            brand_name: String::new(),
            model_name: String::new(),
            firmware_version: String::new(),
            cable_plugged_in: false,
        }
    }
}

/// One charging session at a charge point
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Charge {
    pub id: u64,
    pub charge_point_id: u64,
    pub state: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub cable_plugged_in_at: Option<DateTime<Utc>>,
    pub fully_charged_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub timeout_at: Option<DateTime<Utc>>,
    pub kwh: Option<f64>,
}

/// Wallet balance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Balance {
    pub amount: f64,
    pub credit: Option<f64>,
}

/// Wallet currency
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Currency {
    pub identifier: String,
}

/// A personal wallet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Wallet {
    pub balance: Option<Balance>,
    pub currency: Option<Currency>,
}

/// Wallet transaction state as reported by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WalletTransactionState {
    Complete,
    Failed,
    Pending,
    Reserved,
    None,
    #[serde(other)]
    #[default]
    Other,
}

/// One wallet ledger entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WalletTransaction {
    pub id: u64,
    pub state: WalletTransactionState,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub amount: Option<f64>,
}

/// Keys whose values are masked before a payload is logged
pub const PRIVATE_FIELDS: &[&str] = &[
    "accessToken",
    "refreshToken",
    "serialNumber",
    "latitude",
    "longitude",
    "address1",
    "address2",
    "address3",
];

/// Recursively mask private fields in a JSON payload for debug logging
pub fn redact(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(key, val)| {
                    let redacted = if val.is_object() || val.is_array() {
                        redact(val)
                    } else if PRIVATE_FIELDS.contains(&key.as_str()) {
                        let text = match val {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        serde_json::Value::String(mask(&text))
                    } else {
                        val.clone()
                    };
                    (key.clone(), redacted)
                })
                .collect(),
        ),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(redact).collect())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn charge_point_parses_api_payload() {
        let payload = json!({
            "id": 1234,
            "name": "Garage",
            "serialNumber": "SN-001",
            "type": "ac",
            "state": "busy-charging",
            "visibility": "private",
            "lastMeterReadingKwh": 1523.7,
            "brandName": "Acme",
            "modelName": "One",
            "firmwareVersion": "2.1.0",
            "cablePluggedIn": true
        });
        let cp: ChargePoint = serde_json::from_value(payload).unwrap();
        assert_eq!(cp.id, 1234);
        assert_eq!(cp.kind, ChargePointType::Ac);
        assert_eq!(cp.state, ChargerState::BusyCharging);
        assert!(cp.state.is_busy());
        assert_eq!(cp.visibility, Visibility::Private);
        assert!((cp.last_meter_reading_kwh - 1523.7).abs() < 1e-9);
        assert!(cp.cable_plugged_in);
    }

    #[test]
    fn unknown_states_fall_back_to_other() {
        let cp: ChargePoint =
            serde_json::from_value(json!({"id": 1, "state": "brand-new-state"})).unwrap();
        assert_eq!(cp.state, ChargerState::Other);

        let tx: WalletTransaction =
            serde_json::from_value(json!({"id": 9, "state": "mystery"})).unwrap();
        assert_eq!(tx.state, WalletTransactionState::Other);
    }

    #[test]
    fn sparse_charge_payload_uses_defaults() {
        let charge: Charge = serde_json::from_value(json!({
            "id": 42,
            "chargePointId": 7,
            "state": "charging",
            "startedAt": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(charge.id, 42);
        assert_eq!(charge.charge_point_id, 7);
        assert!(charge.started_at.is_some());
        assert!(charge.stopped_at.is_none());
        assert!(charge.kwh.is_none());
    }

    #[test]
    fn wallet_parses_with_missing_credit() {
        let wallet: Wallet = serde_json::from_value(json!({
            "balance": {"amount": 25.5},
            "currency": {"identifier": "DKK"}
        }))
        .unwrap();
        let balance = wallet.balance.unwrap();
        assert!((balance.amount - 25.5).abs() < 1e-9);
        assert!(balance.credit.is_none());
        assert_eq!(wallet.currency.unwrap().identifier, "DKK");
    }

    #[test]
    fn token_validity_honors_margin() {
        let now = Utc::now();
        let mut token = Token::default();
        assert!(!token.is_access_token_valid(chrono::Duration::seconds(300), now));

        token.access_token = Some("abc".to_string());
        token.access_token_expiration = Some(now + chrono::Duration::seconds(600));
        assert!(token.is_access_token_valid(chrono::Duration::seconds(300), now));
        // Inside the preemptive margin counts as expired
        assert!(!token.is_access_token_valid(chrono::Duration::seconds(900), now));
    }

    #[test]
    fn token_debug_masks_material() {
        let token = Token {
            access_token: Some("super-secret".to_string()),
            access_token_expiration: None,
            refresh_token: Some("also-secret".to_string()),
            refresh_token_expiration: None,
        };
        let out = format!("{:?}", token);
        assert!(!out.contains("super-secret"));
        assert!(!out.contains("also-secret"));
        assert!(out.contains("************"));
    }

    #[test]
    fn redact_masks_private_fields_recursively() {
        let payload = json!({
            "accessToken": "abcd",
            "data": [{"serialNumber": "SN-1", "name": "Garage"}],
            "nested": {"refreshToken": "efgh", "latitude": 55.6}
        });
        let redacted = redact(&payload);
        assert_eq!(redacted["accessToken"], json!("****"));
        assert_eq!(redacted["data"][0]["serialNumber"], json!("****"));
        assert_eq!(redacted["data"][0]["name"], json!("Garage"));
        assert_eq!(redacted["nested"]["refreshToken"], json!("****"));
        assert_eq!(redacted["nested"]["latitude"], json!("****"));
    }
}
