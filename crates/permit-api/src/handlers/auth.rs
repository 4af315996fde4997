//! Handlers for `/auth` endpoints.

use axum::{
  Json,
  extract::{State, rejection::JsonRejection},
  http::StatusCode,
};
use chrono::Utc;
use permit_core::{
  store::{PermitStore, StoreError as _},
  user::User,
  validate::{LoginInput, RegisterInput},
};
use serde::Serialize;

use super::UserBody;
use crate::{
  AppState,
  auth::{hash_password, verify_password},
  error::ApiError,
};

const DUPLICATE_EMAIL: &str = "User with this email already exists";
const INVALID_CREDENTIALS: &str = "Invalid credentials";

// ─── Register ────────────────────────────────────────────────────────────────

/// `POST /auth/register`: body: `{email, password, firstName, lastName, phone?}`
pub async fn register<S>(
  State(state): State<AppState<S>>,
  body: Result<Json<RegisterInput>, JsonRejection>,
) -> Result<(StatusCode, Json<UserBody<User>>), ApiError>
where
  S: PermitStore + 'static,
{
  let Json(input) = body?;
  let registration = input.validate()?;

  let existing = state
    .store
    .find_user_by_email(&registration.email)
    .await
    .map_err(ApiError::store)?;
  if existing.is_some() {
    return Err(ApiError::Conflict(DUPLICATE_EMAIL.into()));
  }

  let hash = hash_password(registration.password.clone()).await?;
  let user = state
    .store
    .create_user(registration.into_new_user(hash))
    .await
    .map_err(|e| {
      // Lost a race with a concurrent registration.
      if e.is_conflict() { ApiError::Conflict(DUPLICATE_EMAIL.into()) } else { ApiError::store(e) }
    })?;

  tracing::info!(user_id = %user.id, "user registered");
  Ok((StatusCode::CREATED, UserBody::json(user)))
}

// ─── Login ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct LoginBody {
  pub success: bool,
  pub token:   String,
  pub user:    User,
}

/// `POST /auth/login`: body: `{email, password}`
pub async fn login<S>(
  State(state): State<AppState<S>>,
  body: Result<Json<LoginInput>, JsonRejection>,
) -> Result<Json<LoginBody>, ApiError>
where
  S: PermitStore + 'static,
{
  let Json(input) = body?;
  let credentials = input
    .validate()
    .map_err(|_| ApiError::BadRequest("Email and password are required".into()))?;

  let mut user = state
    .store
    .find_user_by_email(&credentials.email)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::Unauthorized(INVALID_CREDENTIALS.into()))?;

  if !user.is_active {
    return Err(ApiError::Unauthorized("Account is inactive".into()));
  }

  let Some(hash) = user.password_hash.clone() else {
    return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
  };
  if !verify_password(credentials.password, hash).await? {
    tracing::debug!(user_id = %user.id, "password mismatch");
    return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
  }

  let token = state.jwt.issue(&user).map_err(ApiError::internal)?;

  let now = Utc::now();
  state
    .store
    .record_login(user.id, now)
    .await
    .map_err(ApiError::store)?;
  user.last_login_at = Some(now);

  tracing::info!(user_id = %user.id, "user logged in");
  Ok(Json(LoginBody { success: true, token, user }))
}
