//! The `ClinicStore` trait.
//!
//! Implemented by storage backends (e.g. `clinic-store-sqlite`). The API
//! layer depends on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::NaiveDateTime;

use crate::{
  Classify,
  audit::{AuditFacets, AuditLogEntry, AuditQuery, Actor, NewAuditEntry},
  patient::{NewVersion, PatientRecord},
  reminder::{NewPrescription, PrescriptionView, ReminderType},
  stats::DashboardStats,
  user::{NewUser, Session, User},
};

/// Abstraction over a clinic store backend.
///
/// Every write method is atomic: either all of its effects (including the
/// audit entry it records) are committed, or none are.
///
/// All methods return `Send` futures so the trait can be used from axum
/// handlers on a multi-threaded runtime.
pub trait ClinicStore: Send + Sync {
  type Error: std::error::Error + Classify + Send + Sync + 'static;

  // ── Patient records ───────────────────────────────────────────────────

  /// Assign a fresh UHID and store version 1, recording `PATIENT_CREATED`.
  fn create_patient(
    &self,
    actor: Actor,
    input: NewVersion,
  ) -> impl Future<Output = Result<PatientRecord, Self::Error>> + Send + '_;

  /// Deactivate the active version of `uhid`, store the next version and
  /// record `PATIENT_UPDATED` with the field diff.
  ///
  /// When `expected_version` is given and does not match the active version
  /// the update is rejected as a conflict. Without it, the last writer wins.
  fn update_patient(
    &self,
    actor: Actor,
    uhid: String,
    input: NewVersion,
    expected_version: Option<u32>,
  ) -> impl Future<Output = Result<PatientRecord, Self::Error>> + Send + '_;

  /// The active version of `uhid`, if the patient exists.
  fn get_active(
    &self,
    uhid: String,
  ) -> impl Future<Output = Result<Option<PatientRecord>, Self::Error>> + Send + '_;

  /// Every version of `uhid`, newest first. Empty if unknown.
  fn get_history(
    &self,
    uhid: String,
  ) -> impl Future<Output = Result<Vec<PatientRecord>, Self::Error>> + Send + '_;

  /// All active records ordered by UHID.
  fn list_active(
    &self,
  ) -> impl Future<Output = Result<Vec<PatientRecord>, Self::Error>> + Send + '_;

  /// Store many new patients and one `DATA_UPLOADED` entry together.
  fn import_patients(
    &self,
    actor: Actor,
    inputs: Vec<NewVersion>,
  ) -> impl Future<Output = Result<Vec<PatientRecord>, Self::Error>> + Send + '_;

  // ── Prescriptions and reminders ───────────────────────────────────────

  /// Store a prescription and its expanded reminders, recording
  /// `REMINDER_SET`. The patient must have an active record.
  fn schedule(
    &self,
    actor: Actor,
    input: NewPrescription,
  ) -> impl Future<Output = Result<PrescriptionView, Self::Error>> + Send + '_;

  /// Mark every scheduled reminder due at or before `now` as sent, then list
  /// prescriptions (optionally of one type), newest first.
  fn list_prescriptions(
    &self,
    reminder_type: Option<ReminderType>,
    now: NaiveDateTime,
  ) -> impl Future<Output = Result<Vec<PrescriptionView>, Self::Error>> + Send + '_;

  /// Delete a prescription and its reminders, recording
  /// `REMINDER_CANCELLED`.
  fn cancel_prescription(
    &self,
    actor: Actor,
    prescription_id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Audit log ─────────────────────────────────────────────────────────

  /// Append a standalone audit entry.
  fn record_event(
    &self,
    entry: NewAuditEntry,
  ) -> impl Future<Output = Result<AuditLogEntry, Self::Error>> + Send + '_;

  /// Entries matching `query`, oldest first.
  fn audit_log(
    &self,
    query: AuditQuery,
  ) -> impl Future<Output = Result<Vec<AuditLogEntry>, Self::Error>> + Send + '_;

  fn audit_facets(
    &self,
  ) -> impl Future<Output = Result<AuditFacets, Self::Error>> + Send + '_;

  // ── Users and sessions ────────────────────────────────────────────────

  /// Create an account and record `USER_CREATED` on behalf of `actor`.
  fn add_user(
    &self,
    actor: Actor,
    input: NewUser,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  /// A user and their password hash, for credential checks.
  fn find_credentials(
    &self,
    username: String,
  ) -> impl Future<Output = Result<Option<(User, String)>, Self::Error>> + Send + '_;

  fn list_users(
    &self,
  ) -> impl Future<Output = Result<Vec<User>, Self::Error>> + Send + '_;

  /// Delete a user: their sessions are closed and their audit entries keep
  /// the username but lose the user id. Records `USER_DELETED`.
  fn delete_user(
    &self,
    actor: Actor,
    user_id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Persist a session keyed by the digest of its bearer token.
  fn open_session(
    &self,
    user_id: i64,
    token_digest: String,
    ip_address: Option<String>,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + '_;

  /// The session for a token digest, if open and its user still active.
  fn resolve_session(
    &self,
    token_digest: String,
  ) -> impl Future<Output = Result<Option<Session>, Self::Error>> + Send + '_;

  fn close_session(
    &self,
    token_digest: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Statistics ────────────────────────────────────────────────────────

  fn dashboard_stats(
    &self,
  ) -> impl Future<Output = Result<DashboardStats, Self::Error>> + Send + '_;
}
