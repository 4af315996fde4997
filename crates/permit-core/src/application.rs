//! Permit applications and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{
  Error, Result,
  council::{Council, PermitType},
  user::User,
};

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
  Draft,
  Submitted,
  UnderReview,
  Approved,
  Rejected,
  Cancelled,
}

impl ApplicationStatus {
  /// No further transitions are possible from a terminal status.
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
  }

  pub fn can_transition_to(self, next: Self) -> bool {
    use ApplicationStatus::*;
    !self.is_terminal()
      && matches!(
        (self, next),
        (Draft, Submitted | Cancelled)
          | (Submitted, UnderReview | Rejected | Cancelled)
          | (UnderReview, Approved | Rejected | Cancelled)
      )
  }

  /// Validate a transition, returning the new status.
  pub fn transition(self, next: Self) -> Result<Self> {
    if self.can_transition_to(next) {
      Ok(next)
    } else {
      Err(Error::InvalidTransition { from: self, to: next })
    }
  }
}

// ─── AI analysis ─────────────────────────────────────────────────────────────

/// The annotation written back by the analysis worker.
///
/// Stored as JSON on the application; either the analysis text or the error
/// that prevented it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AiAnalysis {
  Completed {
    analysis:    String,
    #[serde(rename = "analyzedAt")]
    analyzed_at: DateTime<Utc>,
    model:       String,
  },
  Failed {
    error:       String,
    #[serde(rename = "analyzedAt")]
    analyzed_at: DateTime<Utc>,
  },
}

impl AiAnalysis {
  pub fn is_failure(&self) -> bool { matches!(self, Self::Failed { .. }) }
}

/// A dead-letter record for an analysis that could not be completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisFailure {
  pub id:             Uuid,
  pub application_id: Uuid,
  pub error:          String,
  pub failed_at:      DateTime<Utc>,
}

// ─── Application ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
  pub id:             Uuid,
  /// `<PREFIX>-<YEAR>-<SEQUENCE>`; see [`crate::reference::Reference`].
  pub reference:      String,
  pub status:         ApplicationStatus,
  pub user_id:        Uuid,
  pub council_id:     Uuid,
  pub permit_type_id: Uuid,
  /// The applicant's form contents, stored verbatim.
  pub data:           Value,
  /// Written asynchronously after submission; absent until analysis runs.
  pub ai_analysis:    Option<AiAnalysis>,
  pub submitted_at:   DateTime<Utc>,
  pub updated_at:     DateTime<Utc>,
}

/// Input for [`crate::store::PermitStore::submit_application`].
#[derive(Debug, Clone)]
pub struct NewApplication {
  pub user_id:        Uuid,
  pub council_id:     Uuid,
  pub permit_type_id: Uuid,
  pub data:           Value,
}

/// The short form returned on submission and in profile listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSummary {
  pub id:           Uuid,
  pub reference:    String,
  pub status:       ApplicationStatus,
  pub submitted_at: DateTime<Utc>,
}

impl From<&Application> for ApplicationSummary {
  fn from(a: &Application) -> Self {
    Self {
      id:           a.id,
      reference:    a.reference.clone(),
      status:       a.status,
      submitted_at: a.submitted_at,
    }
  }
}

/// An application joined with the records it points at.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDetail {
  #[serde(flatten)]
  pub application: Application,
  pub user:        User,
  pub council:     Council,
  pub permit_type: PermitType,
}

/// Parameters for [`crate::store::PermitStore::list_applications`].
#[derive(Debug, Clone, Default)]
pub struct ApplicationFilter {
  pub user_id:    Option<Uuid>,
  pub council_id: Option<Uuid>,
  pub status:     Option<ApplicationStatus>,
  pub limit:      Option<usize>,
  pub offset:     Option<usize>,
}
