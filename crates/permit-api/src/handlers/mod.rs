//! axum handlers, one module per resource.
//!
//! | Method  | Path                       | Auth                 |
//! |---------|----------------------------|----------------------|
//! | `POST`  | `/auth/register`           | none                 |
//! | `POST`  | `/auth/login`              | none                 |
//! | `GET`   | `/users/profile`           | bearer               |
//! | `PUT`   | `/users/profile`           | bearer               |
//! | `POST`  | `/users`                   | `ManageUsers`        |
//! | `GET`   | `/users/{id}`              | self or `ViewAllUsers` |
//! | `PUT`   | `/users/{id}`              | self or `ManageUsers`  |
//! | `GET`   | `/councils`                | none                 |
//! | `GET`   | `/councils/{id}`           | none                 |
//! | `GET`   | `/permits/types`           | none                 |
//! | `POST`  | `/permits/submit`          | none                 |
//! | `GET`   | `/permits`                 | bearer               |
//! | `GET`   | `/permits/{id}`            | none                 |
//! | `PATCH` | `/permits/{id}/status`     | `ReviewApplications` |

pub mod auth;
pub mod councils;
pub mod permits;
pub mod users;

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use permit_core::store::PermitStore;
use serde::Serialize;

use crate::{AppState, analysis::AnalysisStats, error::ApiError};

// ─── Envelopes ───────────────────────────────────────────────────────────────

/// `{"success": true, "data": ...}`
#[derive(Debug, Serialize)]
pub struct Data<T> {
  pub success: bool,
  pub data:    T,
}

impl<T> Data<T> {
  pub fn json(data: T) -> Json<Self> { Json(Self { success: true, data }) }
}

/// `{"success": true, "user": ...}`
#[derive(Debug, Serialize)]
pub struct UserBody<T> {
  pub success: bool,
  pub user:    T,
}

impl<T> UserBody<T> {
  pub fn json(user: T) -> Json<Self> { Json(Self { success: true, user }) }
}

// ─── Health ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Health {
  pub status:    &'static str,
  pub timestamp: DateTime<Utc>,
  pub analysis:  AnalysisStats,
}

/// `GET /health`
pub async fn health<S>(State(state): State<AppState<S>>) -> Json<Health>
where
  S: PermitStore + 'static,
{
  Json(Health {
    status:    "OK",
    timestamp: Utc::now(),
    analysis:  state.analysis.stats(),
  })
}

/// Fallback for unmatched routes.
pub async fn not_found() -> ApiError { ApiError::NotFound("Route not found".into()) }
