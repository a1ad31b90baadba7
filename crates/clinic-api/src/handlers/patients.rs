//! Handlers for `/patients` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/patients` | Active records, ordered by UHID |
//! | `POST` | `/patients` | Body: patient form; returns version 1 |
//! | `GET`  | `/patients/{uhid}` | Active record; 404 if unknown |
//! | `PUT`  | `/patients/{uhid}` | Patient form plus optional `expected_version` |
//! | `GET`  | `/patients/{uhid}/history` | Every version, newest first |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use clinic_core::{
  audit::{EventType, NewAuditEntry},
  patient::{NewVersion, PatientFields, PatientForm, PatientRecord},
  store::ClinicStore,
};
use serde::Deserialize;
use serde_json::json;

use super::record;
use crate::{AppState, context::RequestContext, error::ApiError};

fn to_version(form: PatientForm) -> Result<NewVersion, ApiError> {
  Ok(NewVersion::new(PatientFields::try_from(form)?)?)
}

// ─── List ────────────────────────────────────────────────────────────────────

/// `GET /patients`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  ctx: RequestContext,
) -> Result<Json<Vec<PatientRecord>>, ApiError>
where
  S: ClinicStore + 'static,
{
  let records = state.store.list_active().await.map_err(ApiError::from_store)?;
  record(
    &*state.store,
    NewAuditEntry::new(ctx.actor(), EventType::ViewRecords)
      .details(json!({ "count": records.len() })),
  )
  .await?;
  Ok(Json(records))
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// `POST /patients`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  ctx: RequestContext,
  Json(form): Json<PatientForm>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ClinicStore + 'static,
{
  let input = to_version(form)?;
  let created = state
    .store
    .create_patient(ctx.actor(), input)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(created)))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /patients/{uhid}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  _ctx: RequestContext,
  Path(uhid): Path<String>,
) -> Result<Json<PatientRecord>, ApiError>
where
  S: ClinicStore + 'static,
{
  let active = state
    .store
    .get_active(uhid.clone())
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("patient {uhid} not found")))?;
  Ok(Json(active))
}

// ─── Update ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UpdateBody {
  #[serde(flatten)]
  pub form:             PatientForm,
  /// When present, the edit is rejected unless this is still the active
  /// version.
  #[serde(default)]
  pub expected_version: Option<u32>,
}

/// `PUT /patients/{uhid}`
pub async fn update<S>(
  State(state): State<AppState<S>>,
  ctx: RequestContext,
  Path(uhid): Path<String>,
  Json(body): Json<UpdateBody>,
) -> Result<Json<PatientRecord>, ApiError>
where
  S: ClinicStore + 'static,
{
  let input = to_version(body.form)?;
  let updated = state
    .store
    .update_patient(ctx.actor(), uhid, input, body.expected_version)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(updated))
}

// ─── History ─────────────────────────────────────────────────────────────────

/// `GET /patients/{uhid}/history`
pub async fn history<S>(
  State(state): State<AppState<S>>,
  ctx: RequestContext,
  Path(uhid): Path<String>,
) -> Result<Json<Vec<PatientRecord>>, ApiError>
where
  S: ClinicStore + 'static,
{
  let versions = state
    .store
    .get_history(uhid.clone())
    .await
    .map_err(ApiError::from_store)?;
  if versions.is_empty() {
    return Err(ApiError::NotFound(format!("patient {uhid} not found")));
  }

  record(
    &*state.store,
    NewAuditEntry::new(ctx.actor(), EventType::ViewHistory)
      .details(json!({ "uhid": uhid, "versions": versions.len() })),
  )
  .await?;
  Ok(Json(versions))
}
