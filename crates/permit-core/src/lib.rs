//! Domain types, validation and the storage trait for the permit intake
//! service.
//!
//! Nothing in here knows about HTTP or SQL; `permit-store-sqlite` and
//! `permit-api` both build on it.

pub mod application;
pub mod council;
pub mod error;
pub mod reference;
pub mod role;
pub mod store;
pub mod user;
pub mod validate;

pub use error::{Error, Result};
