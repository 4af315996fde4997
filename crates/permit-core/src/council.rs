//! Councils and the permit types they offer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A permitting authority. Its `code` doubles as the reference prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Council {
  pub id:         Uuid,
  pub name:       String,
  pub code:       String,
  pub country:    String,
  pub region:     Option<String>,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCouncil {
  pub name:    String,
  pub code:    String,
  pub country: String,
  pub region:  Option<String>,
}

/// A category of consent offered by a council.
///
/// `requirements` and `fees` are opaque to the service; they are stored and
/// returned verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitType {
  pub id:           Uuid,
  pub council_id:   Uuid,
  pub name:         String,
  pub code:         String,
  pub description:  Option<String>,
  pub requirements: Value,
  pub fees:         Value,
  pub is_active:    bool,
  pub created_at:   DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPermitType {
  pub council_id:   Uuid,
  pub name:         String,
  pub code:         String,
  pub description:  Option<String>,
  pub requirements: Value,
  pub fees:         Value,
  pub is_active:    bool,
}

/// A council together with the permit types it currently offers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouncilWithPermitTypes {
  #[serde(flatten)]
  pub council:      Council,
  pub permit_types: Vec<PermitType>,
}
