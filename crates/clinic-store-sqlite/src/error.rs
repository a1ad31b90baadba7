//! Error type for `clinic-store-sqlite`.

use clinic_core::{Classify, FailureKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] clinic_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// A stored column could not be decoded into its domain type.
  #[error("decode error: {0}")]
  Decode(String),

  #[error("patient not found: {0}")]
  PatientNotFound(String),

  #[error("prescription not found: {0}")]
  PrescriptionNotFound(i64),

  #[error("user not found: {0}")]
  UserNotFound(i64),

  #[error("username already exists: {0}")]
  UsernameTaken(String),

  /// The caller edited a version that is no longer the active one.
  #[error("patient {uhid} is at version {active}, not {expected}")]
  VersionConflict {
    uhid:     String,
    expected: u32,
    active:   u32,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Classify for Error {
  fn kind(&self) -> FailureKind {
    match self {
      Self::Core(e) => e.kind(),
      Self::PatientNotFound(_)
      | Self::PrescriptionNotFound(_)
      | Self::UserNotFound(_) => FailureKind::NotFound,
      Self::UsernameTaken(_) | Self::VersionConflict { .. } => {
        FailureKind::Conflict
      }
      Self::Database(_) | Self::Sqlite(_) | Self::Json(_) | Self::Decode(_) => {
        FailureKind::Persistence
      }
    }
  }
}
