use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::client::{ApiClient, RequestOptions};
use crate::error::{ApiError, ErrorKind, NO_STATUS};
use crate::transport::Method;

use super::types::{
  unwrap_envelope, AuthResponse, ContactMessage, ContactReceipt, Donation, DonationRequest,
  ImpactStats, LoginRequest, PaymentRequest, PaymentResult, RegisterRequest, Story, User,
  Volunteer, VolunteerApplication,
};

/// Typed client for the nonprofit's REST API.
#[derive(Clone)]
pub struct NonprofitApi {
  client: ApiClient,
}

impl NonprofitApi {
  pub fn new(client: ApiClient) -> Self {
    Self { client }
  }

  pub fn client(&self) -> &ApiClient {
    &self.client
  }

  /// Log in and persist the returned token and user
  pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
    let response: AuthResponse = self
      .send(Method::Post, "auth/login", Some(&LoginRequest { email, password }))
      .await?;
    self.store_session(&response)?;
    tracing::info!(user = %response.user.email, "Logged in");
    Ok(response.user)
  }

  /// Create an account and persist the returned token and user
  pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<User, ApiError> {
    let response: AuthResponse = self
      .send(
        Method::Post,
        "auth/register",
        Some(&RegisterRequest {
          name,
          email,
          password,
        }),
      )
      .await?;
    self.store_session(&response)?;
    tracing::info!(user = %response.user.email, "Registered");
    Ok(response.user)
  }

  /// Current user according to the server. Refreshes the cached copy.
  pub async fn me(&self) -> Result<User, ApiError> {
    let user: User = self.send(Method::Get, "auth/me", None::<&()>).await?;
    if let Err(e) = self.client.session().set_user(&user) {
      tracing::warn!("Could not cache user: {}", e);
    }
    Ok(user)
  }

  /// Forget the stored token and user
  pub fn logout(&self) -> Result<(), ApiError> {
    self
      .client
      .session()
      .clear()
      .map_err(|e| storage_error("Failed to clear session", e))?;
    tracing::info!("Logged out");
    Ok(())
  }

  /// The user stored at the last login, without asking the server
  pub fn cached_user(&self) -> Option<User> {
    self.client.session().user().ok().flatten()
  }

  pub async fn volunteers(&self) -> Result<Vec<Volunteer>, ApiError> {
    self.send(Method::Get, "volunteers", None::<&()>).await
  }

  pub async fn register_volunteer(
    &self,
    application: &VolunteerApplication,
  ) -> Result<Volunteer, ApiError> {
    self.send(Method::Post, "volunteers", Some(application)).await
  }

  pub async fn donations(&self) -> Result<Vec<Donation>, ApiError> {
    self.send(Method::Get, "donations", None::<&()>).await
  }

  pub async fn create_donation(&self, donation: &DonationRequest) -> Result<Donation, ApiError> {
    self.send(Method::Post, "donations", Some(donation)).await
  }

  pub async fn process_payment(&self, payment: &PaymentRequest) -> Result<PaymentResult, ApiError> {
    self.send(Method::Post, "donations/payment", Some(payment)).await
  }

  pub async fn send_contact(&self, message: &ContactMessage) -> Result<ContactReceipt, ApiError> {
    self.send(Method::Post, "contact", Some(message)).await
  }

  pub async fn impact(&self) -> Result<ImpactStats, ApiError> {
    self.send(Method::Get, "impact", None::<&()>).await
  }

  pub async fn stories(&self) -> Result<Vec<Story>, ApiError> {
    self.send(Method::Get, "stories", None::<&()>).await
  }

  /// Free-form content for an about page section (e.g. "team", "mission")
  pub async fn about(&self, section: &str) -> Result<Value, ApiError> {
    let section = section.trim().trim_matches('/').trim();
    if section.is_empty() {
      return Err(ApiError::new(
        ErrorKind::Validation,
        NO_STATUS,
        "About section must not be empty",
      ));
    }
    self
      .send(Method::Get, &format!("about/{}", section), None::<&()>)
      .await
  }

  async fn send<B: Serialize, T: DeserializeOwned>(
    &self,
    method: Method,
    path: &str,
    body: Option<&B>,
  ) -> Result<T, ApiError> {
    let body = body
      .map(serde_json::to_value)
      .transpose()
      .map_err(|e| {
        ApiError::new(
          ErrorKind::Unknown,
          NO_STATUS,
          format!("Failed to serialize request body: {}", e),
        )
      })?;

    let value = self
      .client
      .request(method, path, body, RequestOptions::default())
      .await?;
    unwrap_envelope(value)
  }

  fn store_session(&self, response: &AuthResponse) -> Result<(), ApiError> {
    let session = self.client.session();
    session
      .set_token(&response.token)
      .map_err(|e| storage_error("Failed to store token", e))?;
    session
      .set_user(&response.user)
      .map_err(|e| storage_error("Failed to store user", e))
  }
}

fn storage_error(context: &str, e: color_eyre::Report) -> ApiError {
  ApiError::new(ErrorKind::Unknown, NO_STATUS, format!("{}: {}", context, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::ApiConfig;
  use crate::storage::Session;
  use crate::transport::testing::{Reply, ScriptedTransport};
  use serde_json::json;
  use std::sync::Arc;

  fn api(transport: &ScriptedTransport) -> NonprofitApi {
    let config = ApiConfig {
      base_url: "http://api.test/api".to_string(),
      timeout_ms: 1_000,
      max_retries: 0,
    };
    NonprofitApi::new(ApiClient::with_transport(
      Arc::new(transport.clone()),
      &config,
      Session::in_memory(),
    ))
  }

  #[tokio::test]
  async fn test_login_stores_session_and_authenticates_later_calls() {
    let transport = ScriptedTransport::new([
      Reply::json(
        200,
        json!({ "token": "jwt-1", "user": { "_id": "u1", "name": "Ada", "email": "ada@example.org" } }),
      ),
      Reply::json(200, json!({ "data": [] })),
    ]);
    let api = api(&transport);

    let user = api.login("ada@example.org", "pw").await.unwrap();
    assert_eq!(user.id, "u1");
    assert_eq!(api.cached_user(), Some(user));

    let volunteers = api.volunteers().await.unwrap();
    assert!(volunteers.is_empty());

    let requests = transport.requests();
    assert_eq!(requests[0].url, "http://api.test/api/auth/login");
    assert_eq!(requests[0].header("authorization"), None);
    assert_eq!(
      serde_json::from_str::<Value>(requests[0].body.as_deref().unwrap()).unwrap(),
      json!({ "email": "ada@example.org", "password": "pw" })
    );
    assert_eq!(requests[1].header("authorization"), Some("Bearer jwt-1"));
  }

  #[tokio::test]
  async fn test_logout_clears_session() {
    let transport = ScriptedTransport::new([Reply::json(
      200,
      json!({ "data": { "token": "t", "user": { "id": "1", "name": "A", "email": "a@b.c" } } }),
    )]);
    let api = api(&transport);

    api.login("a@b.c", "pw").await.unwrap();
    api.logout().unwrap();

    assert_eq!(api.cached_user(), None);
    assert_eq!(api.client().session().token().unwrap(), None);
  }

  #[tokio::test]
  async fn test_failed_login_stores_nothing() {
    let transport =
      ScriptedTransport::new([Reply::json(401, json!({ "message": "Invalid credentials" }))]);
    let api = api(&transport);

    let err = api.login("a@b.c", "wrong").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert_eq!(err.message(), "Invalid credentials");
    assert_eq!(api.client().session().token().unwrap(), None);
  }

  #[tokio::test]
  async fn test_endpoint_paths() {
    let transport = ScriptedTransport::new([Reply::json(200, json!({}))]);
    let api = api(&transport);

    api.impact().await.unwrap();
    api.about("/team/").await.unwrap();
    api
      .process_payment(&PaymentRequest {
        donation_id: "d1".to_string(),
        amount: 10.0,
        currency: "USD".to_string(),
        payment_token: "tok".to_string(),
      })
      .await
      .unwrap();

    let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
    assert_eq!(
      urls,
      vec![
        "http://api.test/api/impact",
        "http://api.test/api/about/team",
        "http://api.test/api/donations/payment",
      ]
    );
  }

  #[tokio::test]
  async fn test_about_keeps_content_with_data_field() {
    let content = json!({ "title": "Our team", "data": ["Ada", "Grace"] });
    let transport = ScriptedTransport::new([Reply::json(200, content.clone())]);
    let api = api(&transport);

    assert_eq!(api.about("team").await.unwrap(), content);
  }

  #[tokio::test]
  async fn test_empty_about_section_rejected_locally() {
    let transport = ScriptedTransport::default();
    let api = api(&transport);

    for section in ["", "/", "  / "] {
      let err = api.about(section).await.unwrap_err();
      assert_eq!(err.kind(), ErrorKind::Validation);
    }
    assert_eq!(transport.calls(), 0);
  }
}
