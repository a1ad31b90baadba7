//! Staff accounts and login sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{Error, Result};

/// Maximum username length accepted at account creation.
pub const MAX_USERNAME_LEN: usize = 20;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
  Admin,
  HealthWorker,
  User,
}

/// A staff account. The password hash never leaves the store through this
/// type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  pub user_id:    i64,
  pub username:   String,
  pub role:       Role,
  pub department: Option<String>,
  pub is_active:  bool,
  pub created_at: DateTime<Utc>,
}

impl User {
  pub fn is_admin(&self) -> bool { self.role == Role::Admin }
}

/// Input to [`crate::store::ClinicStore::add_user`].
#[derive(Debug, Clone)]
pub struct NewUser {
  pub username:      String,
  /// argon2 PHC string.
  pub password_hash: String,
  pub role:          Role,
  pub department:    Option<String>,
}

/// A stored login session. The bearer token itself is never stored, only
/// its digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
  pub session_id: String,
  pub user:       User,
  pub ip_address: Option<String>,
  pub created_at: DateTime<Utc>,
}

/// Check a proposed username.
pub fn validate_username(username: &str) -> Result<()> {
  let trimmed = username.trim();
  if trimmed.is_empty() {
    return Err(Error::MissingField("username"));
  }
  if trimmed.chars().count() > MAX_USERNAME_LEN {
    return Err(Error::Validation(format!(
      "username must be at most {MAX_USERNAME_LEN} characters"
    )));
  }
  Ok(())
}

/// Require at least eight characters including an uppercase letter, a
/// lowercase letter and a digit.
pub fn validate_password_strength(password: &str) -> Result<()> {
  let strong = password.chars().count() >= 8
    && password.chars().any(|c| c.is_ascii_digit())
    && password.chars().any(char::is_uppercase)
    && password.chars().any(char::is_lowercase);
  if strong {
    Ok(())
  } else {
    Err(Error::Validation(
      "password must be at least 8 characters long and contain an uppercase \
       letter, a lowercase letter and a digit"
        .into(),
    ))
  }
}
