//! Error types for `permit-core`.

use thiserror::Error;

use crate::application::ApplicationStatus;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid reference: {0:?}")]
  InvalidReference(String),

  #[error("invalid reference prefix {0:?}: expected uppercase ASCII letters")]
  InvalidPrefix(String),

  #[error("year {0} cannot be encoded in a reference")]
  InvalidYear(i32),

  #[error("reference sequence for {prefix}-{year} is exhausted")]
  SequenceExhausted { prefix: String, year: i32 },

  #[error("cannot move an application from {from} to {to}")]
  InvalidTransition {
    from: ApplicationStatus,
    to:   ApplicationStatus,
  },

  #[error("unknown application status: {0:?}")]
  UnknownStatus(String),

  #[error("unknown role: {0:?}")]
  UnknownRole(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
