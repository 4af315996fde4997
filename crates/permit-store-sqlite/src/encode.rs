//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so that lexical order matches chronological order. JSON payloads are stored
//! as compact text. UUIDs are stored as hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use permit_core::{
  application::{AiAnalysis, AnalysisFailure, Application, ApplicationStatus},
  council::{Council, PermitType},
  role::Role,
  user::User,
};
use serde_json::Value;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn encode_role(r: Role) -> &'static str {
  match r {
    Role::Citizen => "citizen",
    Role::Staff => "staff",
    Role::Admin => "admin",
  }
}

pub fn decode_role(s: &str) -> Result<Role> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown role: {s:?}")))
}

pub fn encode_status(s: ApplicationStatus) -> &'static str {
  match s {
    ApplicationStatus::Draft => "DRAFT",
    ApplicationStatus::Submitted => "SUBMITTED",
    ApplicationStatus::UnderReview => "UNDER_REVIEW",
    ApplicationStatus::Approved => "APPROVED",
    ApplicationStatus::Rejected => "REJECTED",
    ApplicationStatus::Cancelled => "CANCELLED",
  }
}

pub fn decode_status(s: &str) -> Result<ApplicationStatus> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown application status: {s:?}")))
}

// ─── JSON ────────────────────────────────────────────────────────────────────

pub fn encode_json(v: &Value) -> Result<String> { Ok(serde_json::to_string(v)?) }

pub fn decode_json(s: &str) -> Result<Value> { Ok(serde_json::from_str(s)?) }

pub fn encode_analysis(a: &AiAnalysis) -> Result<String> { Ok(serde_json::to_string(a)?) }

// ─── Column lists ────────────────────────────────────────────────────────────

pub const USER_COLUMNS: &str = "user_id, email, password_hash, first_name, last_name, phone, \
   address, role, is_active, email_verified, last_login_at, created_at, updated_at";

pub const COUNCIL_COLUMNS: &str = "council_id, name, code, country, region, created_at";

pub const PERMIT_TYPE_COLUMNS: &str = "permit_type_id, council_id, name, code, description, \
   requirements, fees, is_active, created_at";

pub const APPLICATION_COLUMNS: &str = "application_id, reference, status, user_id, council_id, \
   permit_type_id, data, ai_analysis, submitted_at, updated_at";

pub const FAILURE_COLUMNS: &str = "failure_id, application_id, error, failed_at";

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `users` row.
pub struct RawUser {
  pub user_id:        String,
  pub email:          String,
  pub password_hash:  Option<String>,
  pub first_name:     String,
  pub last_name:      String,
  pub phone:          Option<String>,
  pub address:        Option<String>,
  pub role:           String,
  pub is_active:      bool,
  pub email_verified: bool,
  pub last_login_at:  Option<String>,
  pub created_at:     String,
  pub updated_at:     String,
}

impl RawUser {
  /// Expects the columns in [`USER_COLUMNS`] order.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:        row.get(0)?,
      email:          row.get(1)?,
      password_hash:  row.get(2)?,
      first_name:     row.get(3)?,
      last_name:      row.get(4)?,
      phone:          row.get(5)?,
      address:        row.get(6)?,
      role:           row.get(7)?,
      is_active:      row.get(8)?,
      email_verified: row.get(9)?,
      last_login_at:  row.get(10)?,
      created_at:     row.get(11)?,
      updated_at:     row.get(12)?,
    })
  }

  pub fn into_user(self) -> Result<User> {
    Ok(User {
      id:             decode_uuid(&self.user_id)?,
      email:          self.email,
      password_hash:  self.password_hash,
      first_name:     self.first_name,
      last_name:      self.last_name,
      phone:          self.phone,
      address:        self.address.as_deref().map(decode_json).transpose()?,
      role:           decode_role(&self.role)?,
      is_active:      self.is_active,
      email_verified: self.email_verified,
      last_login_at:  decode_opt_dt(self.last_login_at)?,
      created_at:     decode_dt(&self.created_at)?,
      updated_at:     decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read directly from a `councils` row.
pub struct RawCouncil {
  pub council_id: String,
  pub name:       String,
  pub code:       String,
  pub country:    String,
  pub region:     Option<String>,
  pub created_at: String,
}

impl RawCouncil {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      council_id: row.get(0)?,
      name:       row.get(1)?,
      code:       row.get(2)?,
      country:    row.get(3)?,
      region:     row.get(4)?,
      created_at: row.get(5)?,
    })
  }

  pub fn into_council(self) -> Result<Council> {
    Ok(Council {
      id:         decode_uuid(&self.council_id)?,
      name:       self.name,
      code:       self.code,
      country:    self.country,
      region:     self.region,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `permit_types` row.
pub struct RawPermitType {
  pub permit_type_id: String,
  pub council_id:     String,
  pub name:           String,
  pub code:           String,
  pub description:    Option<String>,
  pub requirements:   String,
  pub fees:           String,
  pub is_active:      bool,
  pub created_at:     String,
}

impl RawPermitType {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      permit_type_id: row.get(0)?,
      council_id:     row.get(1)?,
      name:           row.get(2)?,
      code:           row.get(3)?,
      description:    row.get(4)?,
      requirements:   row.get(5)?,
      fees:           row.get(6)?,
      is_active:      row.get(7)?,
      created_at:     row.get(8)?,
    })
  }

  pub fn into_permit_type(self) -> Result<PermitType> {
    Ok(PermitType {
      id:           decode_uuid(&self.permit_type_id)?,
      council_id:   decode_uuid(&self.council_id)?,
      name:         self.name,
      code:         self.code,
      description:  self.description,
      requirements: decode_json(&self.requirements)?,
      fees:         decode_json(&self.fees)?,
      is_active:    self.is_active,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from an `applications` row.
pub struct RawApplication {
  pub application_id: String,
  pub reference:      String,
  pub status:         String,
  pub user_id:        String,
  pub council_id:     String,
  pub permit_type_id: String,
  pub data:           String,
  pub ai_analysis:    Option<String>,
  pub submitted_at:   String,
  pub updated_at:     String,
}

impl RawApplication {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      application_id: row.get(0)?,
      reference:      row.get(1)?,
      status:         row.get(2)?,
      user_id:        row.get(3)?,
      council_id:     row.get(4)?,
      permit_type_id: row.get(5)?,
      data:           row.get(6)?,
      ai_analysis:    row.get(7)?,
      submitted_at:   row.get(8)?,
      updated_at:     row.get(9)?,
    })
  }

  pub fn into_application(self) -> Result<Application> {
    let ai_analysis = self
      .ai_analysis
      .as_deref()
      .map(serde_json::from_str::<AiAnalysis>)
      .transpose()?;

    Ok(Application {
      id: decode_uuid(&self.application_id)?,
      reference: self.reference,
      status: decode_status(&self.status)?,
      user_id: decode_uuid(&self.user_id)?,
      council_id: decode_uuid(&self.council_id)?,
      permit_type_id: decode_uuid(&self.permit_type_id)?,
      data: decode_json(&self.data)?,
      ai_analysis,
      submitted_at: decode_dt(&self.submitted_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read directly from an `analysis_failures` row.
pub struct RawFailure {
  pub failure_id:     String,
  pub application_id: String,
  pub error:          String,
  pub failed_at:      String,
}

impl RawFailure {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      failure_id:     row.get(0)?,
      application_id: row.get(1)?,
      error:          row.get(2)?,
      failed_at:      row.get(3)?,
    })
  }

  pub fn into_failure(self) -> Result<AnalysisFailure> {
    Ok(AnalysisFailure {
      id:             decode_uuid(&self.failure_id)?,
      application_id: decode_uuid(&self.application_id)?,
      error:          self.error,
      failed_at:      decode_dt(&self.failed_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let early = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    let later = early + chrono::TimeDelta::microseconds(1);
    let (a, b) = (encode_dt(early), encode_dt(later));
    assert_eq!(a.len(), b.len());
    assert!(a < b);
    assert_eq!(decode_dt(&a).unwrap(), early);
  }

  #[test]
  fn enum_columns_roundtrip() {
    for role in [Role::Citizen, Role::Staff, Role::Admin] {
      assert_eq!(decode_role(encode_role(role)).unwrap(), role);
    }
    for status in [
      ApplicationStatus::Draft,
      ApplicationStatus::Submitted,
      ApplicationStatus::UnderReview,
      ApplicationStatus::Approved,
      ApplicationStatus::Rejected,
      ApplicationStatus::Cancelled,
    ] {
      assert_eq!(decode_status(encode_status(status)).unwrap(), status);
    }
    assert!(decode_status("PENDING").is_err());
  }
}
