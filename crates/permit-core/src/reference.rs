//! Application references: `<PREFIX>-<YEAR>-<SEQUENCE>`.
//!
//! The prefix is a council code (uppercase ASCII letters), the year is four
//! digits and the sequence is a zero-padded five-digit counter that restarts
//! every year. Allocation itself lives in the store; this module only knows
//! the format.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Number of digits in the sequence part.
pub const SEQUENCE_WIDTH: usize = 5;

/// Largest sequence that fits in [`SEQUENCE_WIDTH`] digits.
pub const MAX_SEQUENCE: u32 = 99_999;

/// A parsed, well-formed application reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Reference {
  prefix:   String,
  year:     i32,
  sequence: u32,
}

impl Reference {
  pub fn new(prefix: impl Into<String>, year: i32, sequence: u32) -> Result<Self> {
    let prefix = prefix.into();
    validate_prefix(&prefix)?;
    if !(0..=9999).contains(&year) {
      return Err(Error::InvalidYear(year));
    }
    if sequence == 0 || sequence > MAX_SEQUENCE {
      return Err(Error::SequenceExhausted { prefix, year });
    }
    Ok(Self { prefix, year, sequence })
  }

  pub fn prefix(&self) -> &str { &self.prefix }

  pub fn year(&self) -> i32 { self.year }

  pub fn sequence(&self) -> u32 { self.sequence }
}

impl fmt::Display for Reference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}-{:04}-{:0width$}",
      self.prefix,
      self.year,
      self.sequence,
      width = SEQUENCE_WIDTH
    )
  }
}

impl FromStr for Reference {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let invalid = || Error::InvalidReference(s.to_owned());

    let mut parts = s.split('-');
    let (Some(prefix), Some(year), Some(sequence), None) =
      (parts.next(), parts.next(), parts.next(), parts.next())
    else {
      return Err(invalid());
    };

    if year.len() != 4 || !is_digits(year) {
      return Err(invalid());
    }
    if sequence.len() != SEQUENCE_WIDTH || !is_digits(sequence) {
      return Err(invalid());
    }

    let year: i32 = year.parse().map_err(|_| invalid())?;
    let sequence: u32 = sequence.parse().map_err(|_| invalid())?;
    Self::new(prefix, year, sequence).map_err(|_| invalid())
  }
}

impl TryFrom<String> for Reference {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { s.parse() }
}

impl From<Reference> for String {
  fn from(r: Reference) -> Self { r.to_string() }
}

/// Check that `prefix` is usable as the first part of a reference.
pub fn validate_prefix(prefix: &str) -> Result<()> {
  if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_uppercase()) {
    return Err(Error::InvalidPrefix(prefix.to_owned()));
  }
  Ok(())
}

/// The `LIKE`-style stem shared by every reference of a prefix and year,
/// e.g. `KCDC-2024-`.
pub fn year_stem(prefix: &str, year: i32) -> String { format!("{prefix}-{year:04}-") }

/// Extract the trailing sequence from a stored reference if it belongs to
/// `prefix`/`year`.
///
/// Lenient about width so that rows written before the five-digit limit was
/// enforced still count towards the next allocation.
pub fn sequence_in(reference: &str, prefix: &str, year: i32) -> Option<u32> {
  let digits = reference.strip_prefix(&year_stem(prefix, year))?;
  if digits.is_empty() || !is_digits(digits) {
    return None;
  }
  digits.parse().ok()
}

fn is_digits(s: &str) -> bool { s.bytes().all(|b| b.is_ascii_digit()) }
