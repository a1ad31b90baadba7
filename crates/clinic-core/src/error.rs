//! Error types for `clinic-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{0} cannot be empty")]
  MissingField(&'static str),

  #[error("'{value}' is not a valid {expected} for {field}")]
  InvalidField {
    field:    &'static str,
    value:    String,
    expected: &'static str,
  },

  #[error("{field} must be in YYYY-MM-DD format, got {value:?}")]
  InvalidDate { field: &'static str, value: String },

  #[error("invalid clock time {hour:02}:{minute:02}")]
  InvalidClockTime { hour: u8, minute: u8 },

  #[error("frequency is {frequency} but {supplied} dose times were supplied")]
  ReminderSlotMismatch { frequency: u32, supplied: usize },

  #[error("at most {max} other vitals may be recorded, got {got}")]
  TooManyOtherVitals { max: usize, got: usize },

  #[error("unknown {kind}: {value:?}")]
  UnknownVariant { kind: &'static str, value: String },

  #[error("{0}")]
  Validation(String),

  #[error("patient not found: {0}")]
  PatientNotFound(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Classification ──────────────────────────────────────────────────────────

/// The coarse category of a failure, used by outer layers to choose a
/// response without knowing the concrete backend error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
  /// Caller-supplied input was missing or malformed.
  Validation,
  /// The addressed entity does not exist.
  NotFound,
  /// The write raced with another write or violated a uniqueness rule.
  Conflict,
  /// The backend failed; the transaction was rolled back.
  Persistence,
}

/// Implemented by every error a [`crate::store::ClinicStore`] can return.
pub trait Classify {
  fn kind(&self) -> FailureKind;
}

impl Classify for Error {
  fn kind(&self) -> FailureKind {
    match self {
      Self::PatientNotFound(_) => FailureKind::NotFound,
      _ => FailureKind::Validation,
    }
  }
}
