//! Handlers for `/permits` endpoints.

use axum::{
  Json,
  extract::{
    Path, Query, State,
    rejection::{JsonRejection, QueryRejection},
  },
  http::StatusCode,
};
use chrono::{Datelike as _, Utc};
use permit_core::{
  application::{
    Application, ApplicationDetail, ApplicationFilter, ApplicationSummary, NewApplication,
  },
  council::PermitType,
  role::{Authorize as _, Permission},
  store::PermitStore,
  validate::{StatusInput, SubmitInput, parse_id},
};
use serde::Deserialize;

use super::Data;
use crate::{AppState, auth::AuthUser, error::ApiError};

// ─── Permit types ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypesParams {
  pub council_id: Option<String>,
}

/// `GET /permits/types[?councilId=<id>]`: active permit types.
pub async fn types<S>(
  State(state): State<AppState<S>>,
  query: Result<Query<TypesParams>, QueryRejection>,
) -> Result<Json<Data<Vec<PermitType>>>, ApiError>
where
  S: PermitStore + 'static,
{
  let Query(params) = query?;
  let council_id = params
    .council_id
    .as_deref()
    .map(|raw| parse_id(raw, "councilId", "Council"))
    .transpose()?;

  let permit_types = state
    .store
    .list_permit_types(council_id, false)
    .await
    .map_err(ApiError::store)?;
  Ok(Data::json(permit_types))
}

// ─── Submit ──────────────────────────────────────────────────────────────────

/// `POST /permits/submit`: body: `{userId, councilId, permitTypeId, data}`
///
/// Responds as soon as the application is stored; analysis is queued and
/// its outcome never affects the response.
pub async fn submit<S>(
  State(state): State<AppState<S>>,
  body: Result<Json<SubmitInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Data<ApplicationSummary>>), ApiError>
where
  S: PermitStore + 'static,
{
  let Json(input) = body?;
  let submission = input.validate()?;

  let not_found = |what: &str| ApiError::NotFound(format!("{what} not found"));
  state
    .store
    .get_user(submission.user_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| not_found("User"))?;
  let council = state
    .store
    .get_council(submission.council_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| not_found("Council"))?;
  let permit_type = state
    .store
    .get_permit_type(submission.permit_type_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| not_found("Permit type"))?;

  if permit_type.council_id != council.id {
    return Err(ApiError::BadRequest(
      "Permit type is not offered by this council".into(),
    ));
  }
  if !permit_type.is_active {
    return Err(ApiError::BadRequest("Permit type is not active".into()));
  }

  let application = state
    .store
    .submit_application(
      NewApplication {
        user_id:        submission.user_id,
        council_id:     council.id,
        permit_type_id: permit_type.id,
        data:           submission.data,
      },
      Utc::now().year(),
    )
    .await
    .map_err(ApiError::store)?;

  tracing::info!(
    application_id = %application.id,
    reference = %application.reference,
    "application submitted"
  );

  if let Err(e) = state.analysis.enqueue(application.id) {
    tracing::warn!(application_id = %application.id, error = %e, "analysis not queued");
    if let Err(err) = state.store.record_analysis_failure(application.id, e.to_string()).await {
      tracing::error!(
        application_id = %application.id,
        error = %err,
        "could not record analysis failure"
      );
    }
  }

  Ok((StatusCode::CREATED, Data::json(ApplicationSummary::from(&application))))
}

// ─── Read ────────────────────────────────────────────────────────────────────

/// `GET /permits/{id}`: the application with its user, council and type.
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path(raw_id): Path<String>,
) -> Result<Json<Data<ApplicationDetail>>, ApiError>
where
  S: PermitStore + 'static,
{
  let id = parse_id(&raw_id, "id", "Permit")?;
  let detail = state
    .store
    .get_application_detail(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound("Permit application not found".into()))?;
  Ok(Data::json(detail))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
  pub status:     Option<String>,
  pub council_id: Option<String>,
  pub limit:      Option<usize>,
  pub offset:     Option<usize>,
}

/// `GET /permits`: citizens see their own applications; reviewers see all.
pub async fn list<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  query: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Data<Vec<Application>>>, ApiError>
where
  S: PermitStore + 'static,
{
  let Query(params) = query?;
  let status = params
    .status
    .map(|raw| StatusInput { status: Some(raw) }.validate())
    .transpose()?;
  let council_id = params
    .council_id
    .as_deref()
    .map(|raw| parse_id(raw, "councilId", "Council"))
    .transpose()?;

  let user_id = if caller.can(Permission::ViewAllApplications) {
    None
  } else {
    caller.require(Permission::ViewOwnApplications)?;
    Some(caller.id())
  };

  let filter = ApplicationFilter {
    user_id,
    council_id,
    status,
    limit: params.limit,
    offset: params.offset,
  };
  let applications = state
    .store
    .list_applications(&filter)
    .await
    .map_err(ApiError::store)?;
  Ok(Data::json(applications))
}

// ─── Review ──────────────────────────────────────────────────────────────────

/// `PATCH /permits/{id}/status`: body: `{status}`
pub async fn update_status<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  Path(raw_id): Path<String>,
  body: Result<Json<StatusInput>, JsonRejection>,
) -> Result<Json<Data<Application>>, ApiError>
where
  S: PermitStore + 'static,
{
  caller.require(Permission::ReviewApplications)?;
  let id = parse_id(&raw_id, "id", "Permit")?;
  let Json(input) = body?;
  let status = input.validate()?;

  let application = state
    .store
    .update_status(id, status)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound("Permit application not found".into()))?;

  tracing::info!(
    application_id = %application.id,
    status = %application.status,
    reviewer = %caller.id(),
    "application status changed"
  );
  Ok(Data::json(application))
}
