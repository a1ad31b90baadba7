//! Handlers for `/reminders` endpoints.
//!
//! Listing first sweeps past-due reminders to `Sent`, using the clinic-local
//! current time.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use clinic_core::{
  reminder::{NewPrescription, PrescriptionView, ReminderType},
  store::ClinicStore,
};
use serde::Deserialize;

use crate::{AppState, context::RequestContext, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub reminder_type: Option<ReminderType>,
}

/// `GET /reminders[?reminder_type=Medication|Follow-up|Other]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  _ctx: RequestContext,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<PrescriptionView>>, ApiError>
where
  S: ClinicStore + 'static,
{
  let views = state
    .store
    .list_prescriptions(params.reminder_type, state.settings.clinic_now())
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(views))
}

/// `POST /reminders`: body: `{"uhid":…,"reminder_type":…, …}`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  ctx: RequestContext,
  Json(body): Json<NewPrescription>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ClinicStore + 'static,
{
  let view = state
    .store
    .schedule(ctx.actor(), body)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(view)))
}

/// `DELETE /reminders/{id}`: cancels the whole prescription.
pub async fn cancel<S>(
  State(state): State<AppState<S>>,
  ctx: RequestContext,
  Path(id): Path<i64>,
) -> Result<StatusCode, ApiError>
where
  S: ClinicStore + 'static,
{
  state
    .store
    .cancel_prescription(ctx.actor(), id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(StatusCode::NO_CONTENT)
}
