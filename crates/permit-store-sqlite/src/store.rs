//! [`SqliteStore`], the SQLite implementation of [`PermitStore`].

use std::path::Path;

use chrono::{DateTime, SubsecRound as _, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use permit_core::{
  application::{
    AiAnalysis, AnalysisFailure, Application, ApplicationDetail, ApplicationFilter,
    ApplicationStatus, NewApplication,
  },
  council::{Council, NewCouncil, NewPermitType, PermitType},
  reference::{self, MAX_SEQUENCE, Reference},
  store::PermitStore,
  user::{NewUser, User, UserUpdate},
};

use crate::{
  Error, Result,
  encode::{
    APPLICATION_COLUMNS, COUNCIL_COLUMNS, FAILURE_COLUMNS, PERMIT_TYPE_COLUMNS,
    RawApplication, RawCouncil, RawFailure, RawPermitType, RawUser, USER_COLUMNS,
    encode_analysis, encode_dt, encode_json, encode_role, encode_status, encode_uuid,
  },
  schema::SCHEMA,
};

/// Timestamps are stored with microsecond precision; truncate up front so
/// values returned from writes compare equal to values read back later.
fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

// ─── Store ───────────────────────────────────────────────────────────────────

/// A permit store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Flush and close the underlying connection.
  pub async fn close(self) -> Result<()> {
    self.conn.close().await?;
    Ok(())
  }

  pub(crate) async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn select_user(&self, column: &'static str, value: String) -> Result<Option<User>> {
    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| Ok(select_user_by(conn, column, &value)?))
      .await?;
    raw.map(RawUser::into_user).transpose()
  }
}

// ─── Row helpers (run on the connection thread) ──────────────────────────────

fn select_user_by(
  conn: &rusqlite::Connection,
  column: &str,
  value: &str,
) -> rusqlite::Result<Option<RawUser>> {
  conn
    .query_row(
      &format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"),
      rusqlite::params![value],
      RawUser::from_row,
    )
    .optional()
}

fn select_application(
  conn: &rusqlite::Connection,
  id: &str,
) -> rusqlite::Result<Option<RawApplication>> {
  conn
    .query_row(
      &format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE application_id = ?1"),
      rusqlite::params![id],
      RawApplication::from_row,
    )
    .optional()
}

/// Greatest sequence already present in `applications` for `prefix`/`year`.
///
/// Only consulted the first time a (prefix, year) counter is created, so rows
/// inserted before the counter existed are not reissued.
fn highest_issued(
  conn: &rusqlite::Connection,
  prefix: &str,
  year: i32,
) -> rusqlite::Result<i64> {
  let pattern = format!("{}%", reference::year_stem(prefix, year));
  let mut stmt = conn.prepare("SELECT reference FROM applications WHERE reference LIKE ?1")?;
  let refs = stmt
    .query_map(rusqlite::params![pattern], |row| row.get::<_, String>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  Ok(
    refs
      .iter()
      .filter_map(|r| reference::sequence_in(r, prefix, year))
      .map(i64::from)
      .max()
      .unwrap_or(0),
  )
}

/// Page size when the caller does not ask for one.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Upper bound on a single page of applications.
pub const MAX_LIST_LIMIT: usize = 500;

fn list_limit(requested: Option<usize>) -> i64 {
  let limit = requested.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
  // Bounded by MAX_LIST_LIMIT, so the cast is lossless.
  limit as i64
}

/// Reserve the next sequence for `prefix`/`year`.
///
/// Must run inside an immediate transaction. Returns `None`, writing nothing,
/// once the five-digit space is used up.
fn allocate_sequence(
  conn: &rusqlite::Connection,
  prefix: &str,
  year: i32,
) -> rusqlite::Result<Option<u32>> {
  let last: Option<i64> = conn
    .query_row(
      "SELECT last_sequence FROM reference_counters WHERE prefix = ?1 AND year = ?2",
      rusqlite::params![prefix, year],
      |row| row.get(0),
    )
    .optional()?;

  let last = match last {
    Some(n) => n,
    None => highest_issued(conn, prefix, year)?,
  };
  let next = last + 1;
  if next > i64::from(MAX_SEQUENCE) {
    return Ok(None);
  }

  conn.execute(
    "INSERT INTO reference_counters (prefix, year, last_sequence) VALUES (?1, ?2, ?3)
     ON CONFLICT (prefix, year) DO UPDATE SET last_sequence = excluded.last_sequence",
    rusqlite::params![prefix, year, next],
  )?;

  Ok(u32::try_from(next).ok())
}

/// What happened inside the submission transaction.
enum Submitted {
  Issued(Reference),
  MissingCouncil,
  Exhausted(String),
  Rejected(permit_core::Error),
}

enum UserWrite {
  Done(RawUser),
  Missing,
  EmailTaken(String),
}

enum StatusChange {
  Changed(RawApplication),
  Missing,
  Refused(permit_core::Error),
  Undecodable(String),
}

// ─── PermitStore impl ────────────────────────────────────────────────────────

impl PermitStore for SqliteStore {
  type Error = Error;

  // ── Users ─────────────────────────────────────────────────────────────────

  async fn create_user(&self, input: NewUser) -> Result<User> {
    let at = now();
    let user = User {
      id:             Uuid::new_v4(),
      email:          input.email,
      password_hash:  input.password_hash,
      first_name:     input.first_name,
      last_name:      input.last_name,
      phone:          input.phone,
      address:        input.address,
      role:           input.role,
      is_active:      true,
      email_verified: false,
      last_login_at:  None,
      created_at:     at,
      updated_at:     at,
    };

    let id_str      = encode_uuid(user.id);
    let email       = user.email.clone();
    let hash        = user.password_hash.clone();
    let first_name  = user.first_name.clone();
    let last_name   = user.last_name.clone();
    let phone       = user.phone.clone();
    let address_str = user.address.as_ref().map(encode_json).transpose()?;
    let role_str    = encode_role(user.role);
    let at_str      = encode_dt(at);

    let inserted: bool = self
      .conn
      .call(move |conn| {
        let taken = conn
          .query_row(
            "SELECT 1 FROM users WHERE email = ?1",
            rusqlite::params![email],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if taken {
          return Ok(false);
        }

        conn.execute(
          "INSERT INTO users (
             user_id, email, password_hash, first_name, last_name, phone,
             address, role, is_active, email_verified, last_login_at,
             created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, 0, NULL, ?9, ?9)",
          rusqlite::params![
            id_str,
            email,
            hash,
            first_name,
            last_name,
            phone,
            address_str,
            role_str,
            at_str,
          ],
        )?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(Error::DuplicateEmail(user.email));
    }
    Ok(user)
  }

  async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
    self.select_user("user_id", encode_uuid(id)).await
  }

  async fn find_user_by_email<'a>(&'a self, email: &'a str) -> Result<Option<User>> {
    self.select_user("email", email.to_owned()).await
  }

  async fn update_user(&self, id: Uuid, update: UserUpdate) -> Result<Option<User>> {
    let id_str      = encode_uuid(id);
    let address_str = update.address.as_ref().map(encode_json).transpose()?;
    let role_str    = update.role.map(encode_role);
    let at_str      = encode_dt(now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        if select_user_by(&tx, "user_id", &id_str)?.is_none() {
          return Ok(UserWrite::Missing);
        }

        if let Some(email) = &update.email {
          let taken = tx
            .query_row(
              "SELECT 1 FROM users WHERE email = ?1 AND user_id != ?2",
              rusqlite::params![email, id_str],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
          if taken {
            return Ok(UserWrite::EmailTaken(email.clone()));
          }
        }

        tx.execute(
          "UPDATE users SET
             email         = COALESCE(?2, email),
             first_name    = COALESCE(?3, first_name),
             last_name     = COALESCE(?4, last_name),
             phone         = COALESCE(?5, phone),
             address       = COALESCE(?6, address),
             role          = COALESCE(?7, role),
             is_active     = COALESCE(?8, is_active),
             password_hash = COALESCE(?9, password_hash),
             updated_at    = ?10
           WHERE user_id = ?1",
          rusqlite::params![
            id_str,
            update.email,
            update.first_name,
            update.last_name,
            update.phone,
            address_str,
            role_str,
            update.is_active,
            update.password_hash,
            at_str,
          ],
        )?;

        let raw = select_user_by(&tx, "user_id", &id_str)?;
        tx.commit()?;
        Ok(raw.map_or(UserWrite::Missing, UserWrite::Done))
      })
      .await?;

    match outcome {
      UserWrite::Done(raw) => Ok(Some(raw.into_user()?)),
      UserWrite::Missing => Ok(None),
      UserWrite::EmailTaken(email) => Err(Error::DuplicateEmail(email)),
    }
  }

  async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(at);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE users SET last_login_at = ?2 WHERE user_id = ?1",
          rusqlite::params![id_str, at_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::UserNotFound(id));
    }
    Ok(())
  }

  // ── Councils & permit types ───────────────────────────────────────────────

  async fn upsert_council(&self, input: NewCouncil) -> Result<Council> {
    reference::validate_prefix(&input.code)?;

    let id_str = encode_uuid(Uuid::new_v4());
    let at_str = encode_dt(now());

    let raw: RawCouncil = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO councils (council_id, name, code, country, region, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (code) DO UPDATE SET
             name    = excluded.name,
             country = excluded.country,
             region  = excluded.region",
          rusqlite::params![
            id_str,
            input.name,
            input.code,
            input.country,
            input.region,
            at_str
          ],
        )?;
        Ok(conn.query_row(
          &format!("SELECT {COUNCIL_COLUMNS} FROM councils WHERE code = ?1"),
          rusqlite::params![input.code],
          RawCouncil::from_row,
        )?)
      })
      .await?;

    raw.into_council()
  }

  async fn get_council(&self, id: Uuid) -> Result<Option<Council>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawCouncil> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {COUNCIL_COLUMNS} FROM councils WHERE council_id = ?1"),
              rusqlite::params![id_str],
              RawCouncil::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawCouncil::into_council).transpose()
  }

  async fn list_councils(&self) -> Result<Vec<Council>> {
    let raws: Vec<RawCouncil> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {COUNCIL_COLUMNS} FROM councils ORDER BY name"))?;
        let rows = stmt
          .query_map([], RawCouncil::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCouncil::into_council).collect()
  }

  async fn upsert_permit_type(&self, input: NewPermitType) -> Result<PermitType> {
    let council_id       = input.council_id;
    let id_str           = encode_uuid(Uuid::new_v4());
    let council_str      = encode_uuid(council_id);
    let requirements_str = encode_json(&input.requirements)?;
    let fees_str         = encode_json(&input.fees)?;
    let at_str           = encode_dt(now());

    let raw: Option<RawPermitType> = self
      .conn
      .call(move |conn| {
        let council_exists = conn
          .query_row(
            "SELECT 1 FROM councils WHERE council_id = ?1",
            rusqlite::params![council_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !council_exists {
          return Ok(None);
        }

        conn.execute(
          "INSERT INTO permit_types (
             permit_type_id, council_id, name, code, description,
             requirements, fees, is_active, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
           ON CONFLICT (council_id, code) DO UPDATE SET
             name         = excluded.name,
             description  = excluded.description,
             requirements = excluded.requirements,
             fees         = excluded.fees,
             is_active    = excluded.is_active",
          rusqlite::params![
            id_str,
            council_str,
            input.name,
            input.code,
            input.description,
            requirements_str,
            fees_str,
            input.is_active,
            at_str,
          ],
        )?;

        Ok(Some(conn.query_row(
          &format!(
            "SELECT {PERMIT_TYPE_COLUMNS} FROM permit_types WHERE council_id = ?1 AND code = ?2"
          ),
          rusqlite::params![council_str, input.code],
          RawPermitType::from_row,
        )?))
      })
      .await?;

    raw
      .ok_or(Error::CouncilNotFound(council_id))?
      .into_permit_type()
  }

  async fn get_permit_type(&self, id: Uuid) -> Result<Option<PermitType>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawPermitType> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {PERMIT_TYPE_COLUMNS} FROM permit_types WHERE permit_type_id = ?1"
              ),
              rusqlite::params![id_str],
              RawPermitType::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPermitType::into_permit_type).transpose()
  }

  async fn list_permit_types(
    &self,
    council_id:       Option<Uuid>,
    include_inactive: bool,
  ) -> Result<Vec<PermitType>> {
    let council_str = council_id.map(encode_uuid);

    let raws: Vec<RawPermitType> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PERMIT_TYPE_COLUMNS} FROM permit_types
           WHERE (?1 IS NULL OR council_id = ?1)
             AND (?2 OR is_active = 1)
           ORDER BY name"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![council_str, include_inactive],
            RawPermitType::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPermitType::into_permit_type).collect()
  }

  // ── References & applications ─────────────────────────────────────────────

  async fn allocate_reference<'a>(&'a self, prefix: &'a str, year: i32) -> Result<Reference> {
    reference::validate_prefix(prefix)?;
    let prefix = prefix.to_owned();
    let p = prefix.clone();

    let sequence = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let sequence = allocate_sequence(&tx, &p, year)?;
        tx.commit()?;
        Ok(sequence)
      })
      .await?;

    let sequence = sequence.ok_or_else(|| permit_core::Error::SequenceExhausted {
      prefix: prefix.clone(),
      year,
    })?;
    Ok(Reference::new(prefix, year, sequence)?)
  }

  async fn submit_application(&self, input: NewApplication, year: i32) -> Result<Application> {
    let at = now();
    let id = Uuid::new_v4();

    let id_str          = encode_uuid(id);
    let user_str        = encode_uuid(input.user_id);
    let council_str     = encode_uuid(input.council_id);
    let permit_type_str = encode_uuid(input.permit_type_id);
    let data_str        = encode_json(&input.data)?;
    let status_str      = encode_status(ApplicationStatus::Submitted);
    let at_str          = encode_dt(at);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let code: Option<String> = tx
          .query_row(
            "SELECT code FROM councils WHERE council_id = ?1",
            rusqlite::params![council_str],
            |row| row.get(0),
          )
          .optional()?;
        let Some(code) = code else {
          return Ok(Submitted::MissingCouncil);
        };

        let Some(sequence) = allocate_sequence(&tx, &code, year)? else {
          return Ok(Submitted::Exhausted(code));
        };
        let reference = match Reference::new(code, year, sequence) {
          Ok(r) => r,
          Err(e) => return Ok(Submitted::Rejected(e)),
        };

        tx.execute(
          "INSERT INTO applications (
             application_id, reference, status, user_id, council_id,
             permit_type_id, data, ai_analysis, submitted_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?8)",
          rusqlite::params![
            id_str,
            reference.to_string(),
            status_str,
            user_str,
            council_str,
            permit_type_str,
            data_str,
            at_str,
          ],
        )?;
        tx.commit()?;
        Ok(Submitted::Issued(reference))
      })
      .await?;

    let reference = match outcome {
      Submitted::Issued(r) => r,
      Submitted::MissingCouncil => return Err(Error::CouncilNotFound(input.council_id)),
      Submitted::Exhausted(prefix) => {
        return Err(permit_core::Error::SequenceExhausted { prefix, year }.into());
      }
      Submitted::Rejected(e) => return Err(e.into()),
    };

    Ok(Application {
      id,
      reference: reference.to_string(),
      status: ApplicationStatus::Submitted,
      user_id: input.user_id,
      council_id: input.council_id,
      permit_type_id: input.permit_type_id,
      data: input.data,
      ai_analysis: None,
      submitted_at: at,
      updated_at: at,
    })
  }

  async fn get_application(&self, id: Uuid) -> Result<Option<Application>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawApplication> = self
      .conn
      .call(move |conn| Ok(select_application(conn, &id_str)?))
      .await?;

    raw.map(RawApplication::into_application).transpose()
  }

  async fn get_application_detail(&self, id: Uuid) -> Result<Option<ApplicationDetail>> {
    let application = match self.get_application(id).await? {
      Some(a) => a,
      None    => return Ok(None),
    };

    let user = self
      .get_user(application.user_id)
      .await?
      .ok_or(Error::UserNotFound(application.user_id))?;
    let council = self
      .get_council(application.council_id)
      .await?
      .ok_or(Error::CouncilNotFound(application.council_id))?;
    let permit_type = self
      .get_permit_type(application.permit_type_id)
      .await?
      .ok_or(Error::PermitTypeNotFound(application.permit_type_id))?;

    Ok(Some(ApplicationDetail { application, user, council, permit_type }))
  }

  async fn list_applications<'a>(
    &'a self,
    filter: &'a ApplicationFilter,
  ) -> Result<Vec<Application>> {
    let user_str    = filter.user_id.map(encode_uuid);
    let council_str = filter.council_id.map(encode_uuid);
    let status_str  = filter.status.map(encode_status);
    let limit_val   = list_limit(filter.limit);
    let offset_val  = i64::try_from(filter.offset.unwrap_or(0)).unwrap_or(i64::MAX);

    let raws: Vec<RawApplication> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {APPLICATION_COLUMNS} FROM applications
           WHERE (?1 IS NULL OR user_id = ?1)
             AND (?2 IS NULL OR council_id = ?2)
             AND (?3 IS NULL OR status = ?3)
           ORDER BY submitted_at DESC, reference DESC
           LIMIT ?4 OFFSET ?5"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![user_str, council_str, status_str, limit_val, offset_val],
            RawApplication::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawApplication::into_application).collect()
  }

  async fn update_status(
    &self,
    id:     Uuid,
    status: ApplicationStatus,
  ) -> Result<Option<Application>> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<String> = tx
          .query_row(
            "SELECT status FROM applications WHERE application_id = ?1",
            rusqlite::params![id_str],
            |row| row.get(0),
          )
          .optional()?;
        let Some(current) = current else {
          return Ok(StatusChange::Missing);
        };
        let Ok(from) = current.parse::<ApplicationStatus>() else {
          return Ok(StatusChange::Undecodable(current));
        };
        let next = match from.transition(status) {
          Ok(next) => next,
          Err(refused) => return Ok(StatusChange::Refused(refused)),
        };

        tx.execute(
          "UPDATE applications SET status = ?2, updated_at = ?3 WHERE application_id = ?1",
          rusqlite::params![id_str, encode_status(next), at_str],
        )?;
        let raw = select_application(&tx, &id_str)?;
        tx.commit()?;
        Ok(raw.map_or(StatusChange::Missing, StatusChange::Changed))
      })
      .await?;

    match outcome {
      StatusChange::Changed(raw) => Ok(Some(raw.into_application()?)),
      StatusChange::Missing => Ok(None),
      StatusChange::Refused(e) => Err(e.into()),
      StatusChange::Undecodable(s) => {
        Err(Error::Decode(format!("unknown application status: {s:?}")))
      }
    }
  }

  // ── Analysis ──────────────────────────────────────────────────────────────

  async fn record_analysis(&self, id: Uuid, analysis: AiAnalysis) -> Result<bool> {
    let id_str       = encode_uuid(id);
    let analysis_str = encode_analysis(&analysis)?;
    let at_str       = encode_dt(now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE applications SET ai_analysis = ?2, updated_at = ?3 WHERE application_id = ?1",
          rusqlite::params![id_str, analysis_str, at_str],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }

  async fn record_analysis_failure(
    &self,
    application_id: Uuid,
    error:          String,
  ) -> Result<AnalysisFailure> {
    let failure = AnalysisFailure {
      id: Uuid::new_v4(),
      application_id,
      error,
      failed_at: now(),
    };

    let id_str  = encode_uuid(failure.id);
    let app_str = encode_uuid(application_id);
    let error   = failure.error.clone();
    let at_str  = encode_dt(failure.failed_at);

    let inserted = self
      .conn
      .call(move |conn| {
        if select_application(conn, &app_str)?.is_none() {
          return Ok(false);
        }
        conn.execute(
          "INSERT INTO analysis_failures (failure_id, application_id, error, failed_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, app_str, error, at_str],
        )?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(Error::ApplicationNotFound(application_id));
    }
    Ok(failure)
  }

  async fn list_analysis_failures(
    &self,
    application_id: Option<Uuid>,
  ) -> Result<Vec<AnalysisFailure>> {
    let app_str = application_id.map(encode_uuid);

    let raws: Vec<RawFailure> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {FAILURE_COLUMNS} FROM analysis_failures
           WHERE (?1 IS NULL OR application_id = ?1)
           ORDER BY failed_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![app_str], RawFailure::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFailure::into_failure).collect()
  }
}

#[cfg(test)]
impl SqliteStore {
  /// Run raw SQL against the connection; lets tests stage legacy rows.
  pub(crate) async fn execute_raw(&self, sql: String) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
