//! SQL schema for the permit SQLite store.
//!
//! Applied on every open. Each statement is idempotent, so reopening an
//! existing database leaves its rows untouched.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id        TEXT PRIMARY KEY,
    email          TEXT NOT NULL UNIQUE,   -- stored lowercased
    password_hash  TEXT,                   -- argon2 PHC string; NULL until set
    first_name     TEXT NOT NULL,
    last_name      TEXT NOT NULL,
    phone          TEXT,
    address        TEXT,                   -- JSON object or NULL
    role           TEXT NOT NULL DEFAULT 'citizen',
    is_active      INTEGER NOT NULL DEFAULT 1,
    email_verified INTEGER NOT NULL DEFAULT 0,
    last_login_at  TEXT,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS councils (
    council_id TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    code       TEXT NOT NULL UNIQUE,       -- reference prefix
    country    TEXT NOT NULL,
    region     TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS permit_types (
    permit_type_id TEXT PRIMARY KEY,
    council_id     TEXT NOT NULL REFERENCES councils(council_id),
    name           TEXT NOT NULL,
    code           TEXT NOT NULL,
    description    TEXT,
    requirements   TEXT NOT NULL DEFAULT '{}',
    fees           TEXT NOT NULL DEFAULT '{}',
    is_active      INTEGER NOT NULL DEFAULT 1,
    created_at     TEXT NOT NULL,
    UNIQUE (council_id, code)
);

-- Applications are never deleted.
CREATE TABLE IF NOT EXISTS applications (
    application_id TEXT PRIMARY KEY,
    reference      TEXT NOT NULL UNIQUE,
    status         TEXT NOT NULL,
    user_id        TEXT NOT NULL REFERENCES users(user_id),
    council_id     TEXT NOT NULL REFERENCES councils(council_id),
    permit_type_id TEXT NOT NULL REFERENCES permit_types(permit_type_id),
    data           TEXT NOT NULL,          -- applicant payload, JSON object
    ai_analysis    TEXT,                   -- JSON written by the analysis worker
    submitted_at   TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

-- Last sequence handed out per reference prefix and year.
CREATE TABLE IF NOT EXISTS reference_counters (
    prefix        TEXT    NOT NULL,
    year          INTEGER NOT NULL,
    last_sequence INTEGER NOT NULL,
    PRIMARY KEY (prefix, year)
);

-- Dead letters for analyses that could not be completed.
CREATE TABLE IF NOT EXISTS analysis_failures (
    failure_id     TEXT PRIMARY KEY,
    application_id TEXT NOT NULL REFERENCES applications(application_id),
    error          TEXT NOT NULL,
    failed_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS applications_user_idx      ON applications(user_id);
CREATE INDEX IF NOT EXISTS applications_council_idx   ON applications(council_id);
CREATE INDEX IF NOT EXISTS applications_submitted_idx ON applications(submitted_at);
CREATE INDEX IF NOT EXISTS permit_types_council_idx   ON permit_types(council_id);
CREATE INDEX IF NOT EXISTS analysis_failures_app_idx  ON analysis_failures(application_id);

PRAGMA user_version = 1;
";
