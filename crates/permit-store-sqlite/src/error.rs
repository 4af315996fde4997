//! Error type for `permit-store-sqlite`.

use permit_core::store::StoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] permit_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored enum column held a value this build does not recognise.
  #[error("cannot decode column value: {0}")]
  Decode(String),

  #[error("a user with email {0:?} already exists")]
  DuplicateEmail(String),

  #[error("user not found: {0}")]
  UserNotFound(Uuid),

  #[error("council not found: {0}")]
  CouncilNotFound(Uuid),

  #[error("permit type not found: {0}")]
  PermitTypeNotFound(Uuid),

  #[error("application not found: {0}")]
  ApplicationNotFound(Uuid),
}

impl StoreError for Error {
  fn is_conflict(&self) -> bool {
    matches!(
      self,
      Error::DuplicateEmail(_)
        | Error::Core(permit_core::Error::InvalidTransition { .. })
    )
  }

  fn is_not_found(&self) -> bool {
    matches!(
      self,
      Error::UserNotFound(_)
        | Error::CouncilNotFound(_)
        | Error::PermitTypeNotFound(_)
        | Error::ApplicationNotFound(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
