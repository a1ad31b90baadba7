//! `POST /login` and `POST /logout`.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{Json, extract::State, http::StatusCode};
use clinic_core::{
  audit::{Actor, EventType, NewAuditEntry},
  store::ClinicStore,
  user::User,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::record;
use crate::{
  AppState,
  context::{ClientIp, RequestContext, generate_token, token_digest},
  error::ApiError,
};

#[derive(Debug, Deserialize)]
pub struct LoginBody {
  pub username: String,
  pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
  /// Bearer token for subsequent requests. Shown once; only its digest is
  /// stored.
  pub token:      String,
  pub session_id: String,
  pub user:       User,
}

fn verify_password(password: &str, hash: &str) -> bool {
  PasswordHash::new(hash)
    .map(|parsed| {
      Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
    })
    .unwrap_or(false)
}

/// `POST /login`: body: `{"username":…,"password":…}`
pub async fn login<S>(
  State(state): State<AppState<S>>,
  ClientIp(ip): ClientIp,
  Json(body): Json<LoginBody>,
) -> Result<Json<LoginResponse>, ApiError>
where
  S: ClinicStore + 'static,
{
  let username = body.username.trim().to_owned();
  let credentials = state
    .store
    .find_credentials(username.clone())
    .await
    .map_err(ApiError::from_store)?;

  let user = match credentials {
    Some((user, hash)) if user.is_active && verify_password(&body.password, &hash) => user,
    _ => {
      tracing::warn!(%username, "login failed");
      record(
        &*state.store,
        NewAuditEntry::new(Actor::anonymous(ip), EventType::LoginFailure)
          .details(json!({ "username": username })),
      )
      .await?;
      return Err(ApiError::InvalidCredentials);
    }
  };

  let token = generate_token();
  let session = state
    .store
    .open_session(user.user_id, token_digest(&token), ip.clone())
    .await
    .map_err(ApiError::from_store)?;

  let actor = Actor {
    user_id:    Some(user.user_id),
    username:   user.username.clone(),
    session_id: Some(session.session_id.clone()),
    ip_address: ip,
  };
  record(
    &*state.store,
    NewAuditEntry::new(actor, EventType::LoginSuccess).details(json!({ "role": user.role })),
  )
  .await?;
  tracing::info!(username = %user.username, "login");

  Ok(Json(LoginResponse { token, session_id: session.session_id, user }))
}

/// `POST /logout`
pub async fn logout<S>(
  State(state): State<AppState<S>>,
  ctx: RequestContext,
) -> Result<StatusCode, ApiError>
where
  S: ClinicStore + 'static,
{
  record(&*state.store, NewAuditEntry::new(ctx.actor(), EventType::Logout)).await?;
  state
    .store
    .close_session(ctx.token_digest)
    .await
    .map_err(ApiError::from_store)?;
  Ok(StatusCode::NO_CONTENT)
}
