//! User accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::role::{Authorize, Role};

/// A stored user account.
///
/// The password hash never leaves the process: it is skipped by serde in both
/// directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub id:             Uuid,
  pub email:          String,
  #[serde(skip)]
  pub password_hash:  Option<String>,
  pub first_name:     String,
  pub last_name:      String,
  pub phone:          Option<String>,
  /// Free-form postal address object.
  pub address:        Option<Value>,
  pub role:           Role,
  pub is_active:      bool,
  pub email_verified: bool,
  pub last_login_at:  Option<DateTime<Utc>>,
  pub created_at:     DateTime<Utc>,
  pub updated_at:     DateTime<Utc>,
}

impl User {
  pub fn full_name(&self) -> String { format!("{} {}", self.first_name, self.last_name) }
}

impl Authorize for User {
  fn role(&self) -> Role { self.role }
}

/// Input for creating a user. `id` and timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewUser {
  pub email:         String,
  pub password_hash: Option<String>,
  pub first_name:    String,
  pub last_name:     String,
  pub phone:         Option<String>,
  pub address:       Option<Value>,
  pub role:          Role,
}

/// A partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
  pub email:         Option<String>,
  pub first_name:    Option<String>,
  pub last_name:     Option<String>,
  pub phone:         Option<String>,
  pub address:       Option<Value>,
  pub role:          Option<Role>,
  pub is_active:     Option<bool>,
  pub password_hash: Option<String>,
}

impl UserUpdate {
  pub fn is_empty(&self) -> bool {
    self.email.is_none()
      && self.first_name.is_none()
      && self.last_name.is_none()
      && self.phone.is_none()
      && self.address.is_none()
      && self.role.is_none()
      && self.is_active.is_none()
      && self.password_hash.is_none()
  }
}

/// The fields echoed back after an administrative create.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedUser {
  pub id:         Uuid,
  pub email:      String,
  pub first_name: String,
  pub last_name:  String,
  pub created_at: DateTime<Utc>,
}

impl From<&User> for CreatedUser {
  fn from(u: &User) -> Self {
    Self {
      id:         u.id,
      email:      u.email.clone(),
      first_name: u.first_name.clone(),
      last_name:  u.last_name.clone(),
      created_at: u.created_at,
    }
  }
}

/// The fields echoed back after an administrative update.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedUser {
  pub id:         Uuid,
  pub email:      String,
  pub first_name: String,
  pub last_name:  String,
  pub updated_at: DateTime<Utc>,
}

impl From<&User> for UpdatedUser {
  fn from(u: &User) -> Self {
    Self {
      id:         u.id,
      email:      u.email.clone(),
      first_name: u.first_name.clone(),
      last_name:  u.last_name.clone(),
      updated_at: u.updated_at,
    }
  }
}
