//! `GET /dashboard` and `GET /overview`.

use axum::{Json, extract::State};
use clinic_core::{
  audit::{EventType, NewAuditEntry},
  stats::{DashboardStats, Overview},
  store::ClinicStore,
};

use super::record;
use crate::{AppState, context::RequestContext, error::ApiError};

/// `GET /dashboard`
pub async fn dashboard<S>(
  State(state): State<AppState<S>>,
  _ctx: RequestContext,
) -> Result<Json<DashboardStats>, ApiError>
where
  S: ClinicStore + 'static,
{
  let stats = state.store.dashboard_stats().await.map_err(ApiError::from_store)?;
  Ok(Json(stats))
}

/// `GET /overview`: aggregate statistics over the active records.
pub async fn overview<S>(
  State(state): State<AppState<S>>,
  ctx: RequestContext,
) -> Result<Json<Overview>, ApiError>
where
  S: ClinicStore + 'static,
{
  let active = state.store.list_active().await.map_err(ApiError::from_store)?;
  let overview = Overview::from_records(&active);
  record(&*state.store, NewAuditEntry::new(ctx.actor(), EventType::ViewOverview)).await?;
  Ok(Json(overview))
}
