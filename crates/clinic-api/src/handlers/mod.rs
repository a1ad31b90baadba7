//! Route handlers, one module per resource.

pub mod audit;
pub mod auth;
pub mod detect;
pub mod import;
pub mod patients;
pub mod reminders;
pub mod stats;
pub mod users;

use clinic_core::{audit::NewAuditEntry, store::ClinicStore};

use crate::error::ApiError;

/// Append a standalone audit entry, mapping store failures.
pub(crate) async fn record<S: ClinicStore>(store: &S, entry: NewAuditEntry) -> Result<(), ApiError> {
  store.record_event(entry).await.map_err(ApiError::from_store)?;
  Ok(())
}
