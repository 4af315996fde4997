//! The `PermitStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `permit-store-sqlite`).
//! The HTTP layer depends on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  application::{
    AiAnalysis, AnalysisFailure, Application, ApplicationDetail, ApplicationFilter,
    ApplicationStatus, NewApplication,
  },
  council::{Council, NewCouncil, NewPermitType, PermitType},
  reference::Reference,
  user::{NewUser, User, UserUpdate},
};

/// Lets callers classify a backend error without knowing the backend.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// The write collided with existing data (duplicate email, illegal status
  /// transition, …).
  fn is_conflict(&self) -> bool;

  /// A row the operation depends on does not exist.
  fn is_not_found(&self) -> bool;
}

/// Abstraction over a permit store backend.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait PermitStore: Send + Sync {
  type Error: StoreError;

  // ── Users ─────────────────────────────────────────────────────────────

  /// Persist a new user. Fails with a conflict if the email is taken.
  fn create_user(
    &self,
    input: NewUser,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  fn get_user(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  /// Look a user up by (already normalised) email address.
  fn find_user_by_email<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + 'a;

  /// Apply a partial update. Returns `None` if the user does not exist and a
  /// conflict if the new email is taken by someone else.
  fn update_user(
    &self,
    id: Uuid,
    update: UserUpdate,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  /// Stamp a successful login.
  fn record_login(
    &self,
    id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Councils & permit types ───────────────────────────────────────────

  /// Insert a council, or update the one with the same code.
  fn upsert_council(
    &self,
    input: NewCouncil,
  ) -> impl Future<Output = Result<Council, Self::Error>> + Send + '_;

  fn get_council(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Council>, Self::Error>> + Send + '_;

  fn list_councils(&self) -> impl Future<Output = Result<Vec<Council>, Self::Error>> + Send + '_;

  /// Insert a permit type, or update the one with the same council and code.
  fn upsert_permit_type(
    &self,
    input: NewPermitType,
  ) -> impl Future<Output = Result<PermitType, Self::Error>> + Send + '_;

  fn get_permit_type(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<PermitType>, Self::Error>> + Send + '_;

  /// List permit types, optionally for one council only.
  fn list_permit_types(
    &self,
    council_id: Option<Uuid>,
    include_inactive: bool,
  ) -> impl Future<Output = Result<Vec<PermitType>, Self::Error>> + Send + '_;

  // ── References & applications ─────────────────────────────────────────

  /// Reserve the next reference for `prefix` in `year`.
  ///
  /// Allocation is atomic: concurrent callers never receive the same value.
  fn allocate_reference<'a>(
    &'a self,
    prefix: &'a str,
    year: i32,
  ) -> impl Future<Output = Result<Reference, Self::Error>> + Send + 'a;

  /// Allocate a reference (prefixed with the council code) and persist the
  /// application with status `SUBMITTED` in one atomic step.
  fn submit_application(
    &self,
    input: NewApplication,
    year: i32,
  ) -> impl Future<Output = Result<Application, Self::Error>> + Send + '_;

  fn get_application(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Application>, Self::Error>> + Send + '_;

  /// The application joined with its user, council and permit type.
  fn get_application_detail(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<ApplicationDetail>, Self::Error>> + Send + '_;

  /// Newest first.
  fn list_applications<'a>(
    &'a self,
    filter: &'a ApplicationFilter,
  ) -> impl Future<Output = Result<Vec<Application>, Self::Error>> + Send + 'a;

  /// Move an application to `status`. Returns `None` if it does not exist and
  /// a conflict if the transition is not allowed.
  fn update_status(
    &self,
    id: Uuid,
    status: ApplicationStatus,
  ) -> impl Future<Output = Result<Option<Application>, Self::Error>> + Send + '_;

  // ── Analysis ──────────────────────────────────────────────────────────

  /// Overwrite the analysis annotation. Returns `false` if the application
  /// does not exist.
  fn record_analysis(
    &self,
    id: Uuid,
    analysis: AiAnalysis,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Append a dead-letter record for a failed analysis.
  fn record_analysis_failure(
    &self,
    application_id: Uuid,
    error: String,
  ) -> impl Future<Output = Result<AnalysisFailure, Self::Error>> + Send + '_;

  fn list_analysis_failures(
    &self,
    application_id: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<AnalysisFailure>, Self::Error>> + Send + '_;
}
