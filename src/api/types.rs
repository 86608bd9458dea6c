//! Serde types matching the nonprofit API's JSON.
//!
//! Field names follow the server's camelCase. Everything the server may omit
//! is defaulted so that partial records still deserialize.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{ApiError, ErrorKind, NO_STATUS};

/// Keys the server puts next to `data` in its response wrapper.
const ENVELOPE_KEYS: &[&str] = &["data", "success", "message", "count"];

/// Decode a response that may or may not be wrapped as `{ "data": ... }`.
///
/// An object only counts as a wrapper when it has `data` and nothing but
/// wrapper keys, so records that carry their own `data` field come through
/// whole.
pub fn unwrap_envelope<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
  let inner = match value {
    Value::Object(mut map) if is_envelope(&map) => map.remove("data").unwrap_or(Value::Null),
    other => other,
  };
  serde_json::from_value(inner).map_err(|e| {
    ApiError::new(
      ErrorKind::Unknown,
      NO_STATUS,
      format!("Unexpected response shape: {}", e),
    )
  })
}

fn is_envelope(map: &serde_json::Map<String, Value>) -> bool {
  map.contains_key("data") && map.keys().all(|k| ENVELOPE_KEYS.contains(&k.as_str()))
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
  #[serde(alias = "_id")]
  pub id: String,
  pub name: String,
  pub email: String,
  pub role: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
  pub email: &'a str,
  pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
  pub name: &'a str,
  pub email: &'a str,
  pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
  pub token: String,
  pub user: User,
}

// ============================================================================
// Volunteers
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Volunteer {
  #[serde(alias = "_id")]
  pub id: String,
  pub name: String,
  pub email: String,
  pub phone: Option<String>,
  pub interests: Vec<String>,
  pub availability: Option<String>,
  pub status: Option<String>,
  pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerApplication {
  pub name: String,
  pub email: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub phone: Option<String>,
  pub interests: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub availability: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
}

// ============================================================================
// Donations
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DonationFrequency {
  #[default]
  OneTime,
  Monthly,
  Yearly,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Donation {
  #[serde(alias = "_id")]
  pub id: String,
  pub amount: f64,
  pub currency: String,
  pub frequency: DonationFrequency,
  pub donor_name: Option<String>,
  pub donor_email: Option<String>,
  pub status: Option<String>,
  pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationRequest {
  pub amount: f64,
  pub currency: String,
  pub frequency: DonationFrequency,
  pub donor_name: String,
  pub donor_email: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  pub anonymous: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
  pub donation_id: String,
  pub amount: f64,
  pub currency: String,
  /// Opaque token issued by the payment provider's client SDK
  pub payment_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentResult {
  pub status: String,
  pub transaction_id: Option<String>,
  pub message: Option<String>,
}

// ============================================================================
// Contact, impact, stories
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct ContactMessage {
  pub name: String,
  pub email: String,
  pub subject: String,
  pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ContactReceipt {
  pub success: bool,
  pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImpactStats {
  pub volunteers: u64,
  pub donations_total: f64,
  pub projects: u64,
  pub people_helped: u64,
  // Anything else the server reports
  #[serde(flatten)]
  pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Story {
  #[serde(alias = "_id")]
  pub id: String,
  pub title: String,
  pub summary: Option<String>,
  pub content: Option<String>,
  pub author: Option<String>,
  pub image_url: Option<String>,
  pub published_at: Option<String>,
}
