//! JSON REST API for the clinic record service.
//!
//! Exposes an axum [`Router`] backed by any [`clinic_core::store::ClinicStore`].
//! Every route except `POST /login` requires a bearer token from a live
//! session; `/audit-logs` and `/users` additionally require the admin role.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = clinic_api::router(AppState::new(store, settings, analyzer));
//! axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
//! ```
//!
//! Without connect info the caller's IP is taken from `X-Forwarded-For` only.

pub mod analysis;
pub mod context;
pub mod error;
pub mod handlers;


use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post},
};
use chrono::{FixedOffset, NaiveDateTime, Offset, Utc};
use clinic_core::store::ClinicStore;
use serde::Deserialize;

use crate::{analysis::AnalysisClient, handlers::*};

pub use error::ApiError;

// ─── Settings ────────────────────────────────────────────────────────────────

/// Behaviour knobs that are not tied to a particular store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
  /// Offset of the clinic's wall clock from UTC, in minutes. Reminder times
  /// and exported timestamps use it.
  pub utc_offset_minutes: i32,
  /// Sessions per page on `/audit-logs`.
  pub audit_page_size:    usize,
}

impl Default for ApiSettings {
  fn default() -> Self {
    Self {
      // IST
      utc_offset_minutes: 330,
      audit_page_size:    10,
    }
  }
}

impl ApiSettings {
  /// The clinic's offset. Out-of-range values fall back to UTC.
  pub fn clinic_offset(&self) -> FixedOffset {
    self
      .utc_offset_minutes
      .checked_mul(60)
      .and_then(FixedOffset::east_opt)
      .unwrap_or_else(|| Utc.fix())
  }

  /// The current clinic-local wall-clock time.
  pub fn clinic_now(&self) -> NaiveDateTime {
    Utc::now().with_timezone(&self.clinic_offset()).naive_local()
  }
}

// ─── State ───────────────────────────────────────────────────────────────────

/// Shared handler state.
pub struct AppState<S> {
  pub store:    Arc<S>,
  pub settings: Arc<ApiSettings>,
  pub analyzer: Arc<AnalysisClient>,
}

impl<S> AppState<S> {
  pub fn new(store: Arc<S>, settings: ApiSettings, analyzer: AnalysisClient) -> Self {
    Self {
      store,
      settings: Arc::new(settings),
      analyzer: Arc::new(analyzer),
    }
  }
}

// Manual impl: `S` itself need not be `Clone`.
impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      settings: Arc::clone(&self.settings),
      analyzer: Arc::clone(&self.analyzer),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router over `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn router<S>(state: AppState<S>) -> Router<()>
where
  S: ClinicStore + 'static,
{
  Router::new()
    // Auth
    .route("/login", post(auth::login::<S>))
    .route("/logout", post(auth::logout::<S>))
    // Dashboards
    .route("/dashboard", get(stats::dashboard::<S>))
    .route("/overview", get(stats::overview::<S>))
    // Patients
    .route("/patients", get(patients::list::<S>).post(patients::create::<S>))
    .route("/patients/import", post(import::handler::<S>))
    .route(
      "/patients/{uhid}",
      get(patients::get_one::<S>).put(patients::update::<S>),
    )
    .route("/patients/{uhid}/history", get(patients::history::<S>))
    // Reminders
    .route("/reminders", get(reminders::list::<S>).post(reminders::create::<S>))
    .route("/reminders/{id}", delete(reminders::cancel::<S>))
    // Analysis
    .route("/detect", post(detect::handler::<S>))
    // Admin
    .route("/audit-logs", get(audit::browse::<S>))
    .route("/audit-logs/export", get(audit::export::<S>))
    .route("/users", get(users::list::<S>).post(users::create::<S>))
    .route("/users/{id}", delete(users::delete::<S>))
    .with_state(state)
}
