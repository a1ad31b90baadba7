//! Admin-only account management under `/users`.

use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use clinic_core::{
  Error,
  audit::{EventType, NewAuditEntry},
  store::ClinicStore,
  user::{NewUser, Role, User, validate_password_strength, validate_username},
};
use rand_core::OsRng;
use serde::Deserialize;
use serde_json::json;

use super::record;
use crate::{AppState, context::AdminContext, error::ApiError};

/// `GET /users`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  _admin: AdminContext,
) -> Result<Json<Vec<User>>, ApiError>
where
  S: ClinicStore + 'static,
{
  let users = state.store.list_users().await.map_err(ApiError::from_store)?;
  Ok(Json(users))
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  #[serde(default)]
  pub username:         String,
  #[serde(default)]
  pub password:         String,
  #[serde(default)]
  pub confirm_password: String,
  #[serde(default)]
  pub role:             String,
  #[serde(default)]
  pub department:       String,
}

impl CreateBody {
  /// Check the form and hash the password.
  fn into_new_user(self) -> Result<NewUser, ApiError> {
    let fields = [
      &self.username,
      &self.password,
      &self.confirm_password,
      &self.role,
      &self.department,
    ];
    if fields.iter().any(|f| f.trim().is_empty()) {
      return Err(ApiError::Validation("all fields are required".into()));
    }
    validate_username(&self.username)?;
    if self.password != self.confirm_password {
      return Err(ApiError::Validation("passwords do not match".into()));
    }
    validate_password_strength(&self.password)?;
    let role: Role = self
      .role
      .trim()
      .parse()
      .map_err(|_| Error::UnknownVariant { kind: "role", value: self.role.clone() })?;

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
      .hash_password(self.password.as_bytes(), &salt)
      .map_err(|e| ApiError::Store(e.to_string().into()))?
      .to_string();

    Ok(NewUser {
      username: self.username.trim().to_owned(),
      password_hash,
      role,
      department: Some(self.department.trim().to_owned()),
    })
  }
}

/// `POST /users`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  AdminContext(ctx): AdminContext,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ClinicStore + 'static,
{
  let username = body.username.trim().to_owned();
  let created = match body.into_new_user() {
    Ok(input) => state
      .store
      .add_user(ctx.actor(), input)
      .await
      .map_err(ApiError::from_store),
    Err(e) => Err(e),
  };

  match created {
    Ok(user) => Ok((StatusCode::CREATED, Json(user))),
    Err(e) => {
      record(
        &*state.store,
        NewAuditEntry::new(ctx.actor(), EventType::UserCreationFailed)
          .details(json!({ "username": username, "reason": e.to_string() })),
      )
      .await?;
      Err(e)
    }
  }
}

/// `DELETE /users/{id}`
pub async fn delete<S>(
  State(state): State<AppState<S>>,
  AdminContext(ctx): AdminContext,
  Path(user_id): Path<i64>,
) -> Result<StatusCode, ApiError>
where
  S: ClinicStore + 'static,
{
  if user_id == ctx.user().user_id {
    return Err(ApiError::Validation("you cannot delete your own account".into()));
  }
  state
    .store
    .delete_user(ctx.actor(), user_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(StatusCode::NO_CONTENT)
}
