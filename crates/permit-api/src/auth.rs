//! Bearer-token authentication, password hashing and role checks.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use chrono::{TimeDelta, Utc};
use jsonwebtoken::{
  DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use permit_core::{
  role::{Authorize, Permission, Role},
  store::PermitStore,
  user::User,
};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

// ─── Tokens ──────────────────────────────────────────────────────────────────

/// What a session token asserts about its bearer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
  /// User id.
  pub sub:   Uuid,
  pub email: String,
  pub role:  Role,
  pub iat:   i64,
  pub exp:   i64,
}

/// Why a request carried no usable token. The messages are client-facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
  #[error("No token provided")]
  Missing,
  #[error("Invalid token format")]
  Malformed,
  #[error("Token expired")]
  Expired,
  #[error("Invalid token")]
  Invalid,
}

/// HS256 signing and verification keys plus the token lifetime.
#[derive(Clone)]
pub struct JwtKeys {
  encoding:   EncodingKey,
  decoding:   DecodingKey,
  validation: Validation,
  ttl:        TimeDelta,
}

impl JwtKeys {
  pub fn new(secret: &str, ttl: TimeDelta) -> Self {
    Self {
      encoding:   EncodingKey::from_secret(secret.as_bytes()),
      decoding:   DecodingKey::from_secret(secret.as_bytes()),
      validation: Validation::default(),
      ttl,
    }
  }

  /// Sign a token for `user`, valid for the configured lifetime.
  pub fn issue(&self, user: &User) -> jsonwebtoken::errors::Result<String> {
    let now = Utc::now();
    let claims = Claims {
      sub:   user.id,
      email: user.email.clone(),
      role:  user.role,
      iat:   now.timestamp(),
      exp:   (now + self.ttl).timestamp(),
    };
    encode(&Header::default(), &claims, &self.encoding)
  }

  pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
    decode::<Claims>(token, &self.decoding, &self.validation)
      .map(|data| data.claims)
      .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid,
      })
  }
}

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, TokenError> {
  let value = headers.get(header::AUTHORIZATION).ok_or(TokenError::Missing)?;
  let value = value.to_str().map_err(|_| TokenError::Malformed)?;
  let token = value.strip_prefix("Bearer ").ok_or(TokenError::Malformed)?.trim();
  if token.is_empty() {
    return Err(TokenError::Malformed);
  }
  Ok(token)
}

// ─── Passwords ───────────────────────────────────────────────────────────────

/// Hash `password` into an argon2 PHC string off the async runtime.
pub async fn hash_password(password: String) -> Result<String, ApiError> {
  tokio::task::spawn_blocking(move || {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map(|h| h.to_string())
  })
  .await
  .map_err(ApiError::internal)?
  .map_err(|e| ApiError::Internal(format!("argon2 error: {e}").into()))
}

/// Check `password` against a stored PHC string. An unparsable hash never
/// matches.
pub async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
  tokio::task::spawn_blocking(move || {
    let Ok(parsed) = PasswordHash::new(&hash) else {
      tracing::warn!("stored password hash is not a valid PHC string");
      return false;
    };
    Argon2::default()
      .verify_password(password.as_bytes(), &parsed)
      .is_ok()
  })
  .await
  .map_err(ApiError::internal)
}

// ─── Extractor ───────────────────────────────────────────────────────────────

/// The authenticated caller.
///
/// The user row is re-read on every request so deactivation and role changes
/// take effect immediately, whatever the token says.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
  pub fn id(&self) -> Uuid { self.0.id }

  pub fn require(&self, permission: Permission) -> Result<(), ApiError> {
    if self.can(permission) { Ok(()) } else { Err(ApiError::Forbidden) }
  }

  /// Allow acting on `user_id` when it is the caller, or with `permission`.
  pub fn require_self_or(&self, user_id: Uuid, permission: Permission) -> Result<(), ApiError> {
    if self.0.id == user_id { Ok(()) } else { self.require(permission) }
  }
}

impl Authorize for AuthUser {
  fn role(&self) -> Role { self.0.role }
}

impl<S> FromRequestParts<AppState<S>> for AuthUser
where
  S: PermitStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let claims = state.jwt.verify(bearer_token(&parts.headers)?)?;

    let user = state
      .store
      .get_user(claims.sub)
      .await
      .map_err(ApiError::store)?
      .filter(|u| u.is_active)
      .ok_or_else(|| ApiError::Unauthorized("User not found or inactive".into()))?;

    Ok(AuthUser(user))
  }
}

#[cfg(test)]
mod tests {
  use axum::http::HeaderValue;

  use super::*;

  fn user(role: Role) -> User {
    let now = Utc::now();
    User {
      id:             Uuid::new_v4(),
      email:          "aroha@example.nz".into(),
      password_hash:  None,
      first_name:     "Aroha".into(),
      last_name:      "Ngata".into(),
      phone:          None,
      address:        None,
      role,
      is_active:      true,
      email_verified: false,
      last_login_at:  None,
      created_at:     now,
      updated_at:     now,
    }
  }

  #[test]
  fn issue_and_verify() {
    let keys = JwtKeys::new("test-secret", TimeDelta::hours(24));
    let u = user(Role::Staff);
    let token = keys.issue(&u).unwrap();
    let claims = keys.verify(&token).unwrap();
    assert_eq!(claims.sub, u.id);
    assert_eq!(claims.email, u.email);
    assert_eq!(claims.role, Role::Staff);
    assert_eq!(claims.exp - claims.iat, 24 * 3600);
  }

  #[test]
  fn wrong_secret_is_invalid() {
    let issuer = JwtKeys::new("secret-a", TimeDelta::hours(1));
    let verifier = JwtKeys::new("secret-b", TimeDelta::hours(1));
    let token = issuer.issue(&user(Role::Citizen)).unwrap();
    assert_eq!(verifier.verify(&token).unwrap_err(), TokenError::Invalid);
  }

  #[test]
  fn garbage_is_invalid() {
    let keys = JwtKeys::new("test-secret", TimeDelta::hours(1));
    assert_eq!(keys.verify("not.a.jwt").unwrap_err(), TokenError::Invalid);
  }

  #[test]
  fn expired_token_is_reported_as_such() {
    // Past the default 60s leeway.
    let keys = JwtKeys::new("test-secret", TimeDelta::seconds(-120));
    let token = keys.issue(&user(Role::Citizen)).unwrap();
    assert_eq!(keys.verify(&token).unwrap_err(), TokenError::Expired);
  }

  #[test]
  fn bearer_header_parsing() {
    let mut headers = HeaderMap::new();
    assert_eq!(bearer_token(&headers).unwrap_err(), TokenError::Missing);

    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
    assert_eq!(bearer_token(&headers).unwrap_err(), TokenError::Malformed);

    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
    assert_eq!(bearer_token(&headers).unwrap_err(), TokenError::Malformed);

    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
    assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");
  }

  #[tokio::test]
  async fn password_hash_roundtrip() {
    let hash = hash_password("correct horse".into()).await.unwrap();
    assert!(hash.starts_with("$argon2"));
    assert!(verify_password("correct horse".into(), hash.clone()).await.unwrap());
    assert!(!verify_password("wrong horse".into(), hash).await.unwrap());
    assert!(!verify_password("anything".into(), "not-a-hash".into()).await.unwrap());
  }

  #[test]
  fn self_or_permission() {
    let citizen = AuthUser(user(Role::Citizen));
    assert!(citizen.require_self_or(citizen.id(), Permission::ViewAllUsers).is_ok());
    assert!(matches!(
      citizen.require_self_or(Uuid::new_v4(), Permission::ViewAllUsers),
      Err(ApiError::Forbidden)
    ));

    let staff = AuthUser(user(Role::Staff));
    assert!(staff.require_self_or(Uuid::new_v4(), Permission::ViewAllUsers).is_ok());
    assert!(staff.require(Permission::ManageUsers).is_err());
  }
}
