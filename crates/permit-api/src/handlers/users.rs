//! Handlers for `/users` endpoints.

use axum::{
  Json,
  extract::{Path, State, rejection::JsonRejection},
  http::StatusCode,
};
use permit_core::{
  application::{ApplicationFilter, ApplicationSummary},
  role::Permission,
  store::{PermitStore, StoreError as _},
  user::{CreatedUser, UpdatedUser, User, UserUpdate},
  validate::{CreateUserInput, UpdateUserInput, parse_id},
};
use serde::Serialize;
use uuid::Uuid;

use super::{Data, UserBody};
use crate::{AppState, auth::AuthUser, error::ApiError};

/// A user together with a summary of their applications.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserWithApplications {
  #[serde(flatten)]
  pub user:         User,
  pub applications: Vec<ApplicationSummary>,
}

async fn with_applications<S: PermitStore>(
  store: &S,
  user: User,
) -> Result<UserWithApplications, ApiError> {
  let filter = ApplicationFilter { user_id: Some(user.id), ..Default::default() };
  let applications = store
    .list_applications(&filter)
    .await
    .map_err(ApiError::store)?
    .iter()
    .map(ApplicationSummary::from)
    .collect();
  Ok(UserWithApplications { user, applications })
}

/// Apply `update` to `id`, mapping a missing row and a taken email.
async fn apply_update<S: PermitStore>(
  store: &S,
  id: Uuid,
  update: UserUpdate,
  taken_message: &str,
) -> Result<User, ApiError> {
  store
    .update_user(id, update)
    .await
    .map_err(|e| {
      if e.is_conflict() { ApiError::Conflict(taken_message.into()) } else { ApiError::store(e) }
    })?
    .ok_or_else(|| ApiError::NotFound("User not found".into()))
}

// ─── Profile ─────────────────────────────────────────────────────────────────

/// `GET /users/profile`
pub async fn profile<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
) -> Result<Json<UserBody<UserWithApplications>>, ApiError>
where
  S: PermitStore + 'static,
{
  let body = with_applications(state.store.as_ref(), caller.0).await?;
  Ok(UserBody::json(body))
}

/// `PUT /users/profile`: partial update of the caller's own details.
pub async fn update_profile<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  body: Result<Json<UpdateUserInput>, JsonRejection>,
) -> Result<Json<UserBody<User>>, ApiError>
where
  S: PermitStore + 'static,
{
  let Json(input) = body?;
  let update = input.validate()?;

  let user = apply_update(state.store.as_ref(), caller.id(), update, "Email already exists").await?;
  tracing::info!(user_id = %user.id, "profile updated");
  Ok(UserBody::json(user))
}

// ─── Administration ──────────────────────────────────────────────────────────

/// `POST /users`: create an account without a password.
pub async fn create<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  body: Result<Json<CreateUserInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Data<CreatedUser>>), ApiError>
where
  S: PermitStore + 'static,
{
  caller.require(Permission::ManageUsers)?;
  let Json(input) = body?;
  let new_user = input.validate()?;

  let user = state.store.create_user(new_user).await.map_err(|e| {
    if e.is_conflict() {
      ApiError::Conflict("User with this email already exists".into())
    } else {
      ApiError::store(e)
    }
  })?;

  tracing::info!(user_id = %user.id, created_by = %caller.id(), "user created");
  Ok((StatusCode::CREATED, Data::json(CreatedUser::from(&user))))
}

/// `GET /users/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  Path(raw_id): Path<String>,
) -> Result<Json<Data<UserWithApplications>>, ApiError>
where
  S: PermitStore + 'static,
{
  let id = parse_id(&raw_id, "id", "User")?;
  caller.require_self_or(id, Permission::ViewAllUsers)?;

  let user = state
    .store
    .get_user(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

  Ok(Data::json(with_applications(state.store.as_ref(), user).await?))
}

/// `PUT /users/{id}`
pub async fn update<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  Path(raw_id): Path<String>,
  body: Result<Json<UpdateUserInput>, JsonRejection>,
) -> Result<Json<Data<UpdatedUser>>, ApiError>
where
  S: PermitStore + 'static,
{
  let id = parse_id(&raw_id, "id", "User")?;
  caller.require_self_or(id, Permission::ManageUsers)?;
  let Json(input) = body?;
  let update = input.validate()?;

  let user = apply_update(
    state.store.as_ref(),
    id,
    update,
    "User with this email already exists",
  )
  .await?;
  tracing::info!(user_id = %user.id, updated_by = %caller.id(), "user updated");
  Ok(Data::json(UpdatedUser::from(&user)))
}
