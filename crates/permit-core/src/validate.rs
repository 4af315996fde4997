//! Request validation.
//!
//! Raw inputs deserialise leniently (every field optional) so that a missing
//! or mistyped field yields a per-field message instead of a generic parse
//! failure. Each `validate` turns the raw input into the typed value the store
//! accepts, or into [`ValidationErrors`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
  application::ApplicationStatus,
  role::Role,
  user::{NewUser, UserUpdate},
};

/// Minimum password length accepted on registration.
pub const MIN_PASSWORD_LEN: usize = 8;

// ─── Error collection ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
  pub field:   String,
  pub message: String,
}

/// Every problem found in one input, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
  pub fn new() -> Self { Self::default() }

  /// A single-field error.
  pub fn single(field: &str, message: impl Into<String>) -> Self {
    let mut errors = Self::new();
    errors.push(field, message);
    errors
  }

  pub fn push(&mut self, field: &str, message: impl Into<String>) {
    self.0.push(FieldError {
      field:   field.to_owned(),
      message: message.into(),
    });
  }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = &FieldError> { self.0.iter() }

  /// Whether any error was recorded against `field`.
  pub fn has(&self, field: &str) -> bool { self.0.iter().any(|e| e.field == field) }

  /// `Ok(value)` if nothing was recorded.
  pub fn finish<T>(self, value: impl FnOnce() -> T) -> Result<T, Self> {
    if self.is_empty() { Ok(value()) } else { Err(self) }
  }
}

impl fmt::Display for ValidationErrors {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let messages: Vec<_> = self
      .0
      .iter()
      .map(|e| format!("{}: {}", e.field, e.message))
      .collect();
    f.write_str(&messages.join("; "))
  }
}

impl std::error::Error for ValidationErrors {}

// ─── Field helpers ───────────────────────────────────────────────────────────

/// A deliberately loose shape check: one `@`, something on either side, and a
/// dot in the domain part.
pub fn is_email(s: &str) -> bool {
  let Some((local, domain)) = s.split_once('@') else {
    return false;
  };
  !local.is_empty()
    && !domain.contains('@')
    && !s.chars().any(char::is_whitespace)
    && domain
      .split_once('.')
      .is_some_and(|(head, tail)| !head.is_empty() && !tail.is_empty() && !tail.ends_with('.'))
}

fn trimmed(value: Option<String>) -> Option<String> {
  value.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}

fn required_text(
  errors: &mut ValidationErrors,
  field: &str,
  value: Option<String>,
  message: &str,
) -> String {
  match trimmed(value) {
    Some(v) => v,
    None => {
      errors.push(field, message);
      String::new()
    }
  }
}

/// An optional text field which, when present, must not be blank.
fn optional_text(
  errors: &mut ValidationErrors,
  field: &str,
  value: Option<String>,
  message: &str,
) -> Option<String> {
  let v = value?;
  let v = v.trim().to_owned();
  if v.is_empty() {
    errors.push(field, message);
    None
  } else {
    Some(v)
  }
}

fn required_email(errors: &mut ValidationErrors, value: Option<String>) -> String {
  match trimmed(value) {
    Some(v) if is_email(&v) => v.to_lowercase(),
    Some(_) => {
      errors.push("email", "Invalid email format");
      String::new()
    }
    None => {
      errors.push("email", "Email is required");
      String::new()
    }
  }
}

fn optional_email(errors: &mut ValidationErrors, value: Option<String>) -> Option<String> {
  let v = value?.trim().to_owned();
  if is_email(&v) {
    Some(v.to_lowercase())
  } else {
    errors.push("email", "Invalid email format");
    None
  }
}

fn optional_object(
  errors: &mut ValidationErrors,
  field: &str,
  value: Option<Value>,
) -> Option<Value> {
  match value {
    None | Some(Value::Null) => None,
    Some(v @ Value::Object(_)) => Some(v),
    Some(_) => {
      errors.push(field, format!("{field} must be an object"));
      None
    }
  }
}

/// Parse a UUID-valued field, recording `missing` or an "Invalid …" message.
pub fn uuid_field(
  errors: &mut ValidationErrors,
  field: &str,
  value: Option<&str>,
  label: &str,
) -> Uuid {
  match value.map(str::trim).filter(|v| !v.is_empty()) {
    None => {
      errors.push(field, format!("{label} ID is required"));
      Uuid::nil()
    }
    Some(v) => Uuid::parse_str(v).unwrap_or_else(|_| {
      errors.push(field, format!("Invalid {label} ID"));
      Uuid::nil()
    }),
  }
}

/// Parse a path or query identifier.
pub fn parse_id(raw: &str, field: &str, label: &str) -> Result<Uuid, ValidationErrors> {
  let mut errors = ValidationErrors::new();
  let id = uuid_field(&mut errors, field, Some(raw), label);
  errors.finish(|| id)
}

// ─── Auth inputs ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
  pub email:      Option<String>,
  pub password:   Option<String>,
  pub first_name: Option<String>,
  pub last_name:  Option<String>,
  pub phone:      Option<String>,
}

/// A validated registration; the password is still plaintext and must be
/// hashed by the caller.
#[derive(Debug, Clone)]
pub struct Registration {
  pub email:      String,
  pub password:   String,
  pub first_name: String,
  pub last_name:  String,
  pub phone:      Option<String>,
}

impl Registration {
  /// Build the stored user once the password has been hashed.
  pub fn into_new_user(self, password_hash: String) -> NewUser {
    NewUser {
      email:         self.email,
      password_hash: Some(password_hash),
      first_name:    self.first_name,
      last_name:     self.last_name,
      phone:         self.phone,
      address:       None,
      role:          Role::Citizen,
    }
  }
}

impl RegisterInput {
  pub fn validate(self) -> Result<Registration, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let email = required_email(&mut errors, self.email);
    let password = match self.password {
      Some(p) if p.chars().count() >= MIN_PASSWORD_LEN => p,
      _ => {
        errors.push(
          "password",
          format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        );
        String::new()
      }
    };
    let first_name =
      required_text(&mut errors, "firstName", self.first_name, "First name is required");
    let last_name =
      required_text(&mut errors, "lastName", self.last_name, "Last name is required");
    let phone = trimmed(self.phone);

    errors.finish(|| Registration { email, password, first_name, last_name, phone })
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginInput {
  pub email:    Option<String>,
  pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Credentials {
  pub email:    String,
  pub password: String,
}

impl LoginInput {
  pub fn validate(self) -> Result<Credentials, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let email = required_email(&mut errors, self.email);
    let password = match self.password {
      Some(p) if !p.is_empty() => p,
      _ => {
        errors.push("password", "Password is required");
        String::new()
      }
    };
    errors.finish(|| Credentials { email, password })
  }
}

// ─── User inputs ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserInput {
  pub email:      Option<String>,
  pub first_name: Option<String>,
  pub last_name:  Option<String>,
  pub phone:      Option<String>,
  pub address:    Option<Value>,
}

impl CreateUserInput {
  /// Administratively created users have no password until one is set.
  pub fn validate(self) -> Result<NewUser, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let email = required_email(&mut errors, self.email);
    let first_name =
      required_text(&mut errors, "firstName", self.first_name, "First name is required");
    let last_name =
      required_text(&mut errors, "lastName", self.last_name, "Last name is required");
    let phone = trimmed(self.phone);
    let address = optional_object(&mut errors, "address", self.address);

    errors.finish(|| NewUser {
      email,
      password_hash: None,
      first_name,
      last_name,
      phone,
      address,
      role: Role::Citizen,
    })
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserInput {
  pub email:      Option<String>,
  pub first_name: Option<String>,
  pub last_name:  Option<String>,
  pub phone:      Option<String>,
  pub address:    Option<Value>,
}

impl UpdateUserInput {
  pub fn validate(self) -> Result<UserUpdate, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let email = optional_email(&mut errors, self.email);
    let first_name =
      optional_text(&mut errors, "firstName", self.first_name, "First name is required");
    let last_name =
      optional_text(&mut errors, "lastName", self.last_name, "Last name is required");
    let phone = self.phone.map(|p| p.trim().to_owned());
    let address = optional_object(&mut errors, "address", self.address);

    errors.finish(|| UserUpdate {
      email,
      first_name,
      last_name,
      phone,
      address,
      ..UserUpdate::default()
    })
  }
}

// ─── Application inputs ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitInput {
  pub user_id:        Option<String>,
  pub council_id:     Option<String>,
  pub permit_type_id: Option<String>,
  pub data:           Option<Value>,
}

/// A validated submission whose referenced rows have not been checked yet.
#[derive(Debug, Clone)]
pub struct Submission {
  pub user_id:        Uuid,
  pub council_id:     Uuid,
  pub permit_type_id: Uuid,
  pub data:           Value,
}

impl SubmitInput {
  pub fn validate(self) -> Result<Submission, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let user_id = uuid_field(&mut errors, "userId", self.user_id.as_deref(), "User");
    let council_id =
      uuid_field(&mut errors, "councilId", self.council_id.as_deref(), "Council");
    let permit_type_id = uuid_field(
      &mut errors,
      "permitTypeId",
      self.permit_type_id.as_deref(),
      "Permit type",
    );
    let data = match self.data {
      Some(v @ Value::Object(_)) => v,
      Some(_) => {
        errors.push("data", "Application data must be a JSON object");
        Value::Null
      }
      None => {
        errors.push("data", "Application data is required");
        Value::Null
      }
    };

    errors.finish(|| Submission { user_id, council_id, permit_type_id, data })
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusInput {
  pub status: Option<String>,
}

impl StatusInput {
  pub fn validate(self) -> Result<ApplicationStatus, ValidationErrors> {
    match self.status.as_deref().map(str::trim) {
      None | Some("") => Err(ValidationErrors::single("status", "Status is required")),
      Some(s) => s
        .parse()
        .map_err(|_| ValidationErrors::single("status", format!("Unknown status {s:?}"))),
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn register(v: Value) -> Result<Registration, ValidationErrors> {
    serde_json::from_value::<RegisterInput>(v).unwrap().validate()
  }

  #[test]
  fn email_shapes() {
    assert!(is_email("jane@example.com"));
    assert!(is_email("a.b+c@council.govt.nz"));
    assert!(!is_email("jane"));
    assert!(!is_email("@example.com"));
    assert!(!is_email("jane@example"));
    assert!(!is_email("jane@@example.com"));
    assert!(!is_email("jane doe@example.com"));
    assert!(!is_email("jane@example."));
  }

  #[test]
  fn registration_is_normalised() {
    let r = register(json!({
      "email": "  Jane@Example.com ",
      "password": "correct horse",
      "firstName": " Jane ",
      "lastName": "Doe",
    }))
    .unwrap();
    assert_eq!(r.email, "jane@example.com");
    assert_eq!(r.first_name, "Jane");
    assert!(r.phone.is_none());
  }

  #[test]
  fn registration_reports_every_field() {
    let errors = register(json!({ "email": "nope", "password": "short" })).unwrap_err();
    assert!(errors.has("email"));
    assert!(errors.has("password"));
    assert!(errors.has("firstName"));
    assert!(errors.has("lastName"));
  }

  #[test]
  fn login_requires_both_fields() {
    let errors = LoginInput::default().validate().unwrap_err();
    assert!(errors.has("email"));
    assert!(errors.has("password"));
  }

  #[test]
  fn submission_requires_ids_and_object_data() {
    let input: SubmitInput = serde_json::from_value(json!({
      "userId": "not-a-uuid",
      "permitTypeId": Uuid::new_v4().to_string(),
      "data": [1, 2, 3],
    }))
    .unwrap();
    let errors = input.validate().unwrap_err();
    assert!(errors.has("userId"));
    assert!(errors.has("councilId"));
    assert!(!errors.has("permitTypeId"));
    assert!(errors.has("data"));
    let messages: Vec<_> = errors.iter().map(|e| e.message.as_str()).collect();
    assert!(messages.contains(&"Invalid User ID"));
    assert!(messages.contains(&"Council ID is required"));
  }

  #[test]
  fn valid_submission() {
    let (u, c, p) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let input: SubmitInput = serde_json::from_value(json!({
      "userId": u.to_string(),
      "councilId": c.to_string(),
      "permitTypeId": p.to_string(),
      "data": { "description": "New garage" },
    }))
    .unwrap();
    let s = input.validate().unwrap();
    assert_eq!((s.user_id, s.council_id, s.permit_type_id), (u, c, p));
    assert_eq!(s.data["description"], "New garage");
  }

  #[test]
  fn update_leaves_absent_fields_alone() {
    let update = UpdateUserInput { first_name: Some("Kiri".into()), ..Default::default() }
      .validate()
      .unwrap();
    assert_eq!(update.first_name.as_deref(), Some("Kiri"));
    assert!(update.email.is_none());
    assert!(update.role.is_none());
  }

  #[test]
  fn update_rejects_blank_names() {
    let errors = UpdateUserInput { last_name: Some("  ".into()), ..Default::default() }
      .validate()
      .unwrap_err();
    assert!(errors.has("lastName"));
  }

  #[test]
  fn status_input_parses_known_values() {
    let ok = StatusInput { status: Some("UNDER_REVIEW".into()) }.validate().unwrap();
    assert_eq!(ok, ApplicationStatus::UnderReview);
    assert!(StatusInput { status: Some("DONE".into()) }.validate().is_err());
    assert!(StatusInput::default().validate().is_err());
  }

  #[test]
  fn parse_id_rejects_garbage() {
    assert!(parse_id("abc", "id", "Permit").is_err());
    let id = Uuid::new_v4();
    assert_eq!(parse_id(&id.to_string(), "id", "Permit").unwrap(), id);
  }
}
