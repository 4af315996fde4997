//! Handlers for `/councils` endpoints.

use axum::{
  Json,
  extract::{Path, State},
};
use permit_core::{
  council::{CouncilWithPermitTypes, PermitType},
  store::PermitStore,
  validate::parse_id,
};

use super::Data;
use crate::{AppState, error::ApiError};

/// `GET /councils`: every council with its active permit types.
pub async fn list<S>(
  State(state): State<AppState<S>>,
) -> Result<Json<Data<Vec<CouncilWithPermitTypes>>>, ApiError>
where
  S: PermitStore + 'static,
{
  let councils = state.store.list_councils().await.map_err(ApiError::store)?;
  let permit_types = state
    .store
    .list_permit_types(None, false)
    .await
    .map_err(ApiError::store)?;

  let body = councils
    .into_iter()
    .map(|council| {
      let own: Vec<PermitType> = permit_types
        .iter()
        .filter(|t| t.council_id == council.id)
        .cloned()
        .collect();
      CouncilWithPermitTypes { council, permit_types: own }
    })
    .collect();

  Ok(Data::json(body))
}

/// `GET /councils/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path(raw_id): Path<String>,
) -> Result<Json<Data<CouncilWithPermitTypes>>, ApiError>
where
  S: PermitStore + 'static,
{
  let id = parse_id(&raw_id, "id", "Council")?;

  let council = state
    .store
    .get_council(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound("Council not found".into()))?;
  let permit_types = state
    .store
    .list_permit_types(Some(id), false)
    .await
    .map_err(ApiError::store)?;

  Ok(Data::json(CouncilWithPermitTypes { council, permit_types }))
}
