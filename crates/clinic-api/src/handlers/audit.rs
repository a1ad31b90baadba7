//! Admin-only audit log browsing and CSV export.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/audit-logs` | `?username=&event_type=&start_date=&end_date=&page=` |
//! | `GET`  | `/audit-logs/export` | Same filters; `text/csv`, newest first |

use axum::{
  Json,
  extract::{Query, State},
  http::header,
  response::IntoResponse,
};
use chrono::FixedOffset;
use clinic_core::{
  Error,
  audit::{
    AuditFacets, AuditLogEntry, AuditQuery, AuditSession, EventType, NewAuditEntry,
    Page, group_sessions,
  },
  patient::parse_date,
  store::ClinicStore,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::record;
use crate::{AppState, context::AdminContext, error::ApiError};

/// Column headings of the export, in order.
pub const EXPORT_HEADER: [&str; 7] = [
  "Timestamp (IST)",
  "Username",
  "IP Address",
  "Event Type",
  "Details",
  "Changed From",
  "Changed To",
];

const EXPORT_TIME_FORMAT: &str = "%d-%m-%Y %I:%M:%S %p";

// ─── Filters ─────────────────────────────────────────────────────────────────

/// Raw query-string filters. Empty values mean "no filter".
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FilterParams {
  pub username:   Option<String>,
  pub event_type: Option<String>,
  pub start_date: Option<String>,
  pub end_date:   Option<String>,
  pub page:       Option<usize>,
}

fn non_empty(v: &Option<String>) -> Option<&str> {
  v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl FilterParams {
  fn to_query(&self) -> Result<AuditQuery, ApiError> {
    let event_type = non_empty(&self.event_type)
      .map(|s| {
        s.parse::<EventType>().map_err(|_| Error::UnknownVariant {
          kind:  "event type",
          value: s.to_owned(),
        })
      })
      .transpose()?;

    Ok(AuditQuery {
      username: non_empty(&self.username).map(str::to_owned),
      event_type,
      start_date: non_empty(&self.start_date)
        .map(|s| parse_date(s, "start date"))
        .transpose()?,
      end_date: non_empty(&self.end_date)
        .map(|s| parse_date(s, "end date"))
        .transpose()?,
    })
  }
}

// ─── Browse ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditPage {
  pub sessions: Page<AuditSession>,
  pub facets:   AuditFacets,
}

/// `GET /audit-logs`
pub async fn browse<S>(
  State(state): State<AppState<S>>,
  _admin: AdminContext,
  Query(params): Query<FilterParams>,
) -> Result<Json<AuditPage>, ApiError>
where
  S: ClinicStore + 'static,
{
  let query = params.to_query()?;
  let entries = state.store.audit_log(query).await.map_err(ApiError::from_store)?;
  let facets = state.store.audit_facets().await.map_err(ApiError::from_store)?;

  let sessions = Page::paginate(
    group_sessions(entries),
    params.page.unwrap_or(1),
    state.settings.audit_page_size,
  );
  Ok(Json(AuditPage { sessions, facets }))
}

// ─── Export ──────────────────────────────────────────────────────────────────

fn json_cell(v: Option<&Value>) -> String {
  match v {
    None | Some(Value::Null) => String::new(),
    Some(Value::String(s)) => s.clone(),
    Some(other) => other.to_string(),
  }
}

/// Render `entries` as CSV in the given order, with timestamps shifted to
/// `offset`.
pub fn export_csv(entries: &[AuditLogEntry], offset: FixedOffset) -> Result<Vec<u8>, csv::Error> {
  let mut wtr = csv::Writer::from_writer(Vec::new());
  wtr.write_record(EXPORT_HEADER)?;

  for e in entries {
    let (from, to) = match &e.diff {
      Some(d) => (
        serde_json::to_string(&d.changed_from).unwrap_or_default(),
        serde_json::to_string(&d.changed_to).unwrap_or_default(),
      ),
      None => (String::new(), String::new()),
    };
    wtr.write_record([
      e.timestamp.with_timezone(&offset).format(EXPORT_TIME_FORMAT).to_string(),
      e.username.clone(),
      e.ip_address.clone().unwrap_or_default(),
      e.event_type.to_string(),
      json_cell(e.details.as_ref()),
      from,
      to,
    ])?;
  }

  wtr.into_inner().map_err(|e| e.into_error().into())
}

/// `GET /audit-logs/export`
pub async fn export<S>(
  State(state): State<AppState<S>>,
  AdminContext(ctx): AdminContext,
  Query(params): Query<FilterParams>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ClinicStore + 'static,
{
  let query = params.to_query()?;
  let mut entries = state.store.audit_log(query).await.map_err(ApiError::from_store)?;
  entries.reverse();

  let body = export_csv(&entries, state.settings.clinic_offset())
    .map_err(|e| ApiError::Store(Box::new(e)))?;

  record(
    &*state.store,
    NewAuditEntry::new(ctx.actor(), EventType::LogExport)
      .details(json!({ "entries": entries.len() })),
  )
  .await?;

  Ok((
    [
      (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
      (
        header::CONTENT_DISPOSITION,
        "attachment; filename=\"audit_logs_export.csv\"",
      ),
    ],
    body,
  ))
}
