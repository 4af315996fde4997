//! HTTP layer for the permit intake service.
//!
//! Exposes an axum [`Router`] serving the JSON API under `/api` plus a
//! `/health` check, backed by any [`PermitStore`].

pub mod analysis;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod openai;
pub mod seed;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, patch, post},
};
use permit_core::store::PermitStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use analysis::AnalysisQueue;
use auth::JwtKeys;
use handlers::{auth as auth_routes, councils, permits, users};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `PERMIT__*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:          String,
  #[serde(default = "default_port")]
  pub port:          u16,
  pub store_path:    PathBuf,
  #[serde(default)]
  pub jwt_secret:    String,
  #[serde(default = "default_jwt_ttl_hours")]
  pub jwt_ttl_hours: i64,
  #[serde(default)]
  pub analysis:      AnalysisConfig,
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 3001 }
fn default_jwt_ttl_hours() -> i64 { 24 }

/// Settings for the chat-completions analyzer. Analysis is disabled when
/// `api_key` is unset.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AnalysisConfig {
  pub api_key:        Option<String>,
  pub base_url:       String,
  pub model:          String,
  pub max_tokens:     u32,
  pub temperature:    f32,
  pub queue_capacity: usize,
  pub timeout_secs:   u64,
}

impl Default for AnalysisConfig {
  fn default() -> Self {
    Self {
      api_key:        None,
      base_url:       "https://api.openai.com/v1".into(),
      model:          "gpt-4".into(),
      max_tokens:     1000,
      temperature:    0.3,
      queue_capacity: 256,
      timeout_secs:   60,
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S: PermitStore> {
  pub store:    Arc<S>,
  pub config:   Arc<ServerConfig>,
  pub jwt:      Arc<JwtKeys>,
  pub analysis: AnalysisQueue,
}

// Derived `Clone` would demand `S: Clone`.
impl<S: PermitStore> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:    self.store.clone(),
      config:   self.config.clone(),
      jwt:      self.jwt.clone(),
      analysis: self.analysis.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the service [`Router`].
pub fn router<S>(state: AppState<S>) -> Router
where
  S: PermitStore + 'static,
{
  let api = Router::new()
    .route("/auth/register",      post(auth_routes::register::<S>))
    .route("/auth/login",         post(auth_routes::login::<S>))
    .route("/users",              post(users::create::<S>))
    .route("/users/profile",      get(users::profile::<S>).put(users::update_profile::<S>))
    .route("/users/{id}",         get(users::get_one::<S>).put(users::update::<S>))
    .route("/councils",           get(councils::list::<S>))
    .route("/councils/{id}",      get(councils::get_one::<S>))
    .route("/permits",            get(permits::list::<S>))
    .route("/permits/types",      get(permits::types::<S>))
    .route("/permits/submit",     post(permits::submit::<S>))
    .route("/permits/{id}",       get(permits::get_one::<S>))
    .route("/permits/{id}/status", patch(permits::update_status::<S>));

  Router::new()
    .route("/health", get(handlers::health::<S>))
    .nest("/api", api)
    .fallback(handlers::not_found)
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use chrono::TimeDelta;
  use permit_core::{role::Role, user::NewUser};
  use permit_store_sqlite::SqliteStore;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;
  use uuid::Uuid;

  use crate::analysis::tests::{FakeAnalyzer, settle};

  const SECRET: &str = "test-secret";

  fn config() -> ServerConfig {
    ServerConfig {
      host:          "127.0.0.1".into(),
      port:          3001,
      store_path:    PathBuf::from(":memory:"),
      jwt_secret:    SECRET.into(),
      jwt_ttl_hours: 24,
      analysis:      AnalysisConfig::default(),
    }
  }

  async fn make_state(analysis: bool) -> AppState<SqliteStore> {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    seed::seed_reference_data(store.as_ref(), false).await.unwrap();

    let analysis = if analysis {
      AnalysisQueue::start(store.clone(), FakeAnalyzer { fail: false }, 8).0
    } else {
      AnalysisQueue::disabled()
    };

    AppState {
      store,
      config: Arc::new(config()),
      jwt: Arc::new(JwtKeys::new(SECRET, TimeDelta::hours(24))),
      analysis,
    }
  }

  async fn send(
    state:  &AppState<SqliteStore>,
    method: &str,
    uri:    &str,
    token:  Option<&str>,
    body:   Option<Value>,
  ) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
      builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
      Some(json) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(json.to_string())
      }
      None => Body::empty(),
    };

    let resp = router(state.clone()).oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json)
  }

  async fn register(state: &AppState<SqliteStore>, email: &str) -> Value {
    let (status, body) = send(
      state,
      "POST",
      "/api/auth/register",
      None,
      Some(json!({
        "email": email,
        "password": "hunter22",
        "firstName": "Aroha",
        "lastName": "Ngata",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["user"].clone()
  }

  async fn login(state: &AppState<SqliteStore>, email: &str) -> String {
    let (status, body) = send(
      state,
      "POST",
      "/api/auth/login",
      None,
      Some(json!({ "email": email, "password": "hunter22" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["token"].as_str().unwrap().to_owned()
  }

  async fn staff_token(state: &AppState<SqliteStore>) -> String {
    let hash = auth::hash_password("hunter22".into()).await.unwrap();
    state
      .store
      .create_user(NewUser {
        email:         "officer@kapiti.govt.nz".into(),
        password_hash: Some(hash),
        first_name:    "Wiremu".into(),
        last_name:     "Parata".into(),
        phone:         None,
        address:       None,
        role:          Role::Staff,
      })
      .await
      .unwrap();
    login(state, "officer@kapiti.govt.nz").await
  }

  /// Submit a fence application for `user_id` and return the response body.
  async fn submit(state: &AppState<SqliteStore>, user_id: &str) -> (StatusCode, Value) {
    let (_, councils) = send(state, "GET", "/api/councils", None, None).await;
    let council = &councils["data"][0];
    let fence = council["permitTypes"]
      .as_array()
      .unwrap()
      .iter()
      .find(|t| t["code"] == "FENCE")
      .unwrap();

    send(
      state,
      "POST",
      "/api/permits/submit",
      None,
      Some(json!({
        "userId": user_id,
        "councilId": council["id"],
        "permitTypeId": fence["id"],
        "data": { "height": "1.8m", "material": "timber" },
      })),
    )
    .await
  }

  // ── Health and routing ──────────────────────────────────────────────────────

  #[tokio::test]
  async fn health_reports_queue_stats() {
    let state = make_state(false).await;
    let (status, body) = send(&state, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert_eq!(body["analysis"]["enabled"], false);
  }

  #[tokio::test]
  async fn unknown_route_returns_404_envelope() {
    let state = make_state(false).await;
    let (status, body) = send(&state, "GET", "/api/nowhere", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Route not found");
  }

  // ── Auth ────────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn duplicate_registration_is_409_without_new_row() {
    let state = make_state(false).await;
    register(&state, "aroha@example.nz").await;

    let (status, body) = send(
      &state,
      "POST",
      "/api/auth/register",
      None,
      Some(json!({
        "email": "Aroha@Example.nz",
        "password": "another-pass",
        "firstName": "Someone",
        "lastName": "Else",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "User with this email already exists");

    let user = state.store.find_user_by_email("aroha@example.nz").await.unwrap().unwrap();
    assert_eq!(user.first_name, "Aroha");
  }

  #[tokio::test]
  async fn registration_validation_lists_fields() {
    let state = make_state(false).await;
    let (status, body) = send(
      &state,
      "POST",
      "/api/auth/register",
      None,
      Some(json!({ "email": "not-an-email", "password": "short" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation error");
    assert!(body["details"].as_array().is_some_and(|d| !d.is_empty()));
  }

  #[tokio::test]
  async fn malformed_json_is_400() {
    let state = make_state(false).await;
    let req = Request::builder()
      .method("POST")
      .uri("/api/auth/login")
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from("{not json"))
      .unwrap();
    let resp = router(state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn login_returns_token_and_user() {
    let state = make_state(false).await;
    register(&state, "aroha@example.nz").await;

    let (status, body) = send(
      &state,
      "POST",
      "/api/auth/login",
      None,
      Some(json!({ "email": "aroha@example.nz", "password": "hunter22" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(body["user"]["role"], "citizen");
    assert!(body["user"].get("passwordHash").is_none());
  }

  #[tokio::test]
  async fn wrong_password_is_401() {
    let state = make_state(false).await;
    register(&state, "aroha@example.nz").await;

    let (status, body) = send(
      &state,
      "POST",
      "/api/auth/login",
      None,
      Some(json!({ "email": "aroha@example.nz", "password": "wrong-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");
  }

  #[tokio::test]
  async fn inactive_account_gets_no_token() {
    let state = make_state(false).await;
    let user = register(&state, "aroha@example.nz").await;
    let id: Uuid = user["id"].as_str().unwrap().parse().unwrap();
    state
      .store
      .update_user(id, permit_core::user::UserUpdate {
        is_active: Some(false),
        ..Default::default()
      })
      .await
      .unwrap();

    let (status, body) = send(
      &state,
      "POST",
      "/api/auth/login",
      None,
      Some(json!({ "email": "aroha@example.nz", "password": "hunter22" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Account is inactive");
    assert!(body.get("token").is_none());
  }

  #[tokio::test]
  async fn protected_route_requires_token() {
    let state = make_state(false).await;
    let (status, body) = send(&state, "GET", "/api/users/profile", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "No token provided");

    let (status, body) = send(&state, "GET", "/api/users/profile", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid token");
  }

  // ── Users ───────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn profile_includes_applications() {
    let state = make_state(false).await;
    let user = register(&state, "aroha@example.nz").await;
    let token = login(&state, "aroha@example.nz").await;
    submit(&state, user["id"].as_str().unwrap()).await;

    let (status, body) = send(&state, "GET", "/api/users/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "aroha@example.nz");
    assert_eq!(body["user"]["applications"].as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn citizens_cannot_read_other_users() {
    let state = make_state(false).await;
    register(&state, "aroha@example.nz").await;
    let other = register(&state, "tama@example.nz").await;
    let token = login(&state, "aroha@example.nz").await;

    let uri = format!("/api/users/{}", other["id"].as_str().unwrap());
    let (status, body) = send(&state, "GET", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Insufficient permissions");
  }

  #[tokio::test]
  async fn only_admins_create_users() {
    let state = make_state(false).await;
    let staff = staff_token(&state).await;
    let body = json!({ "email": "new@example.nz", "firstName": "New", "lastName": "Person" });

    let (status, _) = send(&state, "POST", "/api/users", Some(&staff), Some(body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let hash = auth::hash_password("hunter22".into()).await.unwrap();
    seed::ensure_admin(state.store.as_ref(), "admin@example.nz", "Ada", "Admin", hash)
      .await
      .unwrap();
    let admin = login(&state, "admin@example.nz").await;

    let (status, created) = send(&state, "POST", "/api/users", Some(&admin), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["email"], "new@example.nz");
  }

  // ── Permits ─────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn submission_is_201_with_reference() {
    let state = make_state(false).await;
    let user = register(&state, "aroha@example.nz").await;

    let (status, body) = submit(&state, user["id"].as_str().unwrap()).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["status"], "SUBMITTED");

    let reference = body["data"]["reference"].as_str().unwrap();
    let parts: Vec<&str> = reference.split('-').collect();
    assert_eq!(parts.len(), 3, "{reference}");
    assert!(parts[0].chars().all(|c| c.is_ascii_uppercase()));
    assert!(parts[1].len() == 4 && parts[1].chars().all(|c| c.is_ascii_digit()));
    assert!(parts[2].len() == 5 && parts[2].chars().all(|c| c.is_ascii_digit()));
    assert!(reference.starts_with("KCDC-") && reference.ends_with("-00001"));
  }

  #[tokio::test]
  async fn consecutive_submissions_get_consecutive_references() {
    let state = make_state(false).await;
    let user = register(&state, "aroha@example.nz").await;
    let id = user["id"].as_str().unwrap();

    let (_, first) = submit(&state, id).await;
    let (_, second) = submit(&state, id).await;
    let first = first["data"]["reference"].as_str().unwrap();
    let second = second["data"]["reference"].as_str().unwrap();
    assert!(first.ends_with("-00001"));
    assert!(second.ends_with("-00002"));
  }

  #[tokio::test]
  async fn submission_for_unknown_user_is_404() {
    let state = make_state(false).await;
    let (status, body) = submit(&state, &Uuid::new_v4().to_string()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");
  }

  #[tokio::test]
  async fn submission_is_analyzed_in_background() {
    let state = make_state(true).await;
    let user = register(&state, "aroha@example.nz").await;
    let (status, body) = submit(&state, user["id"].as_str().unwrap()).await;
    assert_eq!(status, StatusCode::CREATED);

    settle(&state.analysis, 1).await;
    let uri = format!("/api/permits/{}", body["data"]["id"].as_str().unwrap());
    let (status, detail) = send(&state, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["data"]["aiAnalysis"]["model"], "fake-model");
    assert_eq!(detail["data"]["council"]["code"], "KCDC");
  }

  #[tokio::test]
  async fn submission_survives_a_closed_analysis_queue() {
    let mut state = make_state(false).await;
    let (queue, worker) = AnalysisQueue::start(state.store.clone(), FakeAnalyzer { fail: false }, 8);
    worker.abort();
    assert!(worker.await.unwrap_err().is_cancelled());
    state.analysis = queue;

    let user = register(&state, "aroha@example.nz").await;
    let (status, body) = submit(&state, user["id"].as_str().unwrap()).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let id: Uuid = body["data"]["id"].as_str().unwrap().parse().unwrap();
    let dead = state.store.list_analysis_failures(Some(id)).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(state.analysis.stats().dropped, 1);

    let (_, health) = send(&state, "GET", "/health", None, None).await;
    assert_eq!(health["analysis"]["dropped"], 1);
  }

  #[tokio::test]
  async fn bad_query_string_uses_error_envelope() {
    let state = make_state(false).await;
    register(&state, "aroha@example.nz").await;
    let token = login(&state, "aroha@example.nz").await;

    for uri in ["/api/permits?limit=abc", "/api/permits?offset=-1"] {
      let (status, body) = send(&state, "GET", uri, Some(&token), None).await;
      assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
      assert_eq!(body["success"], false);
      assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
    }
  }

  #[tokio::test]
  async fn oversized_limit_is_capped() {
    let state = make_state(false).await;
    let user = register(&state, "aroha@example.nz").await;
    submit(&state, user["id"].as_str().unwrap()).await;
    let staff = staff_token(&state).await;

    let uri = format!("/api/permits?limit={}", usize::MAX);
    let (status, body) = send(&state, "GET", &uri, Some(&staff), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn unknown_and_malformed_ids() {
    let state = make_state(false).await;

    let uri = format!("/api/permits/{}", Uuid::new_v4());
    let (status, body) = send(&state, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Permit application not found");

    let (status, _) = send(&state, "GET", "/api/permits/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn citizens_list_only_their_own() {
    let state = make_state(false).await;
    let aroha = register(&state, "aroha@example.nz").await;
    let tama = register(&state, "tama@example.nz").await;
    submit(&state, aroha["id"].as_str().unwrap()).await;
    submit(&state, tama["id"].as_str().unwrap()).await;

    let token = login(&state, "aroha@example.nz").await;
    let (_, mine) = send(&state, "GET", "/api/permits", Some(&token), None).await;
    assert_eq!(mine["data"].as_array().unwrap().len(), 1);

    let staff = staff_token(&state).await;
    let (_, all) = send(&state, "GET", "/api/permits", Some(&staff), None).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 2);
  }

  #[tokio::test]
  async fn status_changes_need_review_permission() {
    let state = make_state(false).await;
    let user = register(&state, "aroha@example.nz").await;
    let (_, submitted) = submit(&state, user["id"].as_str().unwrap()).await;
    let uri = format!("/api/permits/{}/status", submitted["data"]["id"].as_str().unwrap());

    let citizen = login(&state, "aroha@example.nz").await;
    let (status, _) = send(
      &state,
      "PATCH",
      &uri,
      Some(&citizen),
      Some(json!({ "status": "UNDER_REVIEW" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let staff = staff_token(&state).await;
    let (status, body) = send(
      &state,
      "PATCH",
      &uri,
      Some(&staff),
      Some(json!({ "status": "UNDER_REVIEW" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "UNDER_REVIEW");

    let (status, _) = send(
      &state,
      "PATCH",
      &uri,
      Some(&staff),
      Some(json!({ "status": "DRAFT" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
      &state,
      "PATCH",
      &uri,
      Some(&staff),
      Some(json!({ "status": "FINISHED" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  // ── Councils ────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn councils_carry_active_permit_types() {
    let state = make_state(false).await;
    let (status, body) = send(&state, "GET", "/api/councils", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let council = &body["data"][0];
    assert_eq!(council["name"], "Kapiti Coast District Council");
    assert_eq!(council["permitTypes"].as_array().unwrap().len(), 4);

    let uri = format!("/api/councils/{}", Uuid::new_v4());
    let (status, body) = send(&state, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Council not found");
  }

  #[tokio::test]
  async fn permit_types_filter_by_council() {
    let state = make_state(false).await;
    let (_, councils) = send(&state, "GET", "/api/councils", None, None).await;
    let id = councils["data"][0]["id"].as_str().unwrap();

    let uri = format!("/api/permits/types?councilId={id}");
    let (status, body) = send(&state, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 4);

    let (status, _) = send(&state, "GET", "/api/permits/types?councilId=nope", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }
}
