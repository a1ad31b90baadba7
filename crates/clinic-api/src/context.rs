//! Request-scoped caller identity.
//!
//! [`RequestContext`] is extracted per request from the `Authorization:
//! Bearer` header and passed explicitly to every handler that needs to know
//! who is acting. [`AdminContext`] additionally requires the admin role and
//! records an `UNAUTHORIZED_ACCESS` entry when it is refused.

use std::{convert::Infallible, net::SocketAddr};

use axum::{
  extract::{ConnectInfo, FromRequestParts},
  http::{HeaderMap, header, request::Parts},
};
use clinic_core::{
  audit::{Actor, EventType, NewAuditEntry},
  store::ClinicStore,
  user::{Session, User},
};
use rand_core::{OsRng, RngCore};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::{AppState, error::ApiError};

// ─── Tokens ──────────────────────────────────────────────────────────────────

/// A fresh 256-bit bearer token, hex-encoded.
pub fn generate_token() -> String {
  let mut bytes = [0u8; 32];
  OsRng.fill_bytes(&mut bytes);
  hex::encode(bytes)
}

/// The digest under which a token's session is stored.
pub fn token_digest(token: &str) -> String { hex::encode(Sha256::digest(token.as_bytes())) }

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
  headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(str::trim)
    .filter(|t| !t.is_empty())
}

// ─── Client address ──────────────────────────────────────────────────────────

/// The caller's IP: the first `X-Forwarded-For` hop if present, otherwise the
/// socket peer when the server was started with connect info.
#[derive(Debug, Clone)]
pub struct ClientIp(pub Option<String>);

impl ClientIp {
  fn from_parts(parts: &Parts) -> Self {
    let forwarded = parts
      .headers
      .get("x-forwarded-for")
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.split(',').next())
      .map(str::trim)
      .filter(|v| !v.is_empty())
      .map(str::to_owned);

    Self(forwarded.or_else(|| {
      parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
    }))
  }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
  type Rejection = Infallible;

  async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
    Ok(Self::from_parts(parts))
  }
}

// ─── Authenticated caller ────────────────────────────────────────────────────

/// The authenticated caller of the current request.
#[derive(Debug, Clone)]
pub struct RequestContext {
  pub session:      Session,
  pub token_digest: String,
  pub ip_address:   Option<String>,
}

impl RequestContext {
  pub fn user(&self) -> &User { &self.session.user }

  /// The identity recorded on audit entries written for this request.
  pub fn actor(&self) -> Actor {
    Actor {
      user_id:    Some(self.session.user.user_id),
      username:   self.session.user.username.clone(),
      session_id: Some(self.session.session_id.clone()),
      ip_address: self.ip_address.clone(),
    }
  }
}

impl<S> FromRequestParts<AppState<S>> for RequestContext
where
  S: ClinicStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let token = bearer_token(&parts.headers).ok_or(ApiError::Unauthorized)?;
    let digest = token_digest(token);

    let session = state
      .store
      .resolve_session(digest.clone())
      .await
      .map_err(ApiError::from_store)?
      .ok_or(ApiError::Unauthorized)?;

    Ok(Self {
      session,
      token_digest: digest,
      ip_address: ClientIp::from_parts(parts).0,
    })
  }
}

/// An authenticated caller with the admin role.
#[derive(Debug, Clone)]
pub struct AdminContext(pub RequestContext);

impl<S> FromRequestParts<AppState<S>> for AdminContext
where
  S: ClinicStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let ctx = RequestContext::from_request_parts(parts, state).await?;
    if ctx.user().is_admin() {
      return Ok(Self(ctx));
    }

    tracing::warn!(
      username = %ctx.user().username,
      path = %parts.uri.path(),
      "non-admin request refused"
    );
    state
      .store
      .record_event(
        NewAuditEntry::new(ctx.actor(), EventType::UnauthorizedAccess).details(json!({
          "method": parts.method.as_str(),
          "path":   parts.uri.path(),
        })),
      )
      .await
      .map_err(ApiError::from_store)?;
    Err(ApiError::Forbidden)
  }
}

#[cfg(test)]
mod tests {
  use axum::http::Request;

  use super::*;

  #[test]
  fn tokens_are_random_and_digests_stable() {
    let a = generate_token();
    let b = generate_token();
    assert_eq!(a.len(), 64);
    assert_ne!(a, b);
    assert_eq!(token_digest(&a), token_digest(&a));
    assert_ne!(token_digest(&a), a);
  }

  #[test]
  fn bearer_header_parsing() {
    let mut headers = HeaderMap::new();
    assert_eq!(bearer_token(&headers), None);
    headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
    assert_eq!(bearer_token(&headers), None);
    headers.insert(header::AUTHORIZATION, "Bearer  tok ".parse().unwrap());
    assert_eq!(bearer_token(&headers), Some("tok"));
  }

  #[test]
  fn forwarded_for_wins_over_peer() {
    let mut req = Request::builder()
      .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
      .body(())
      .unwrap();
    req
      .extensions_mut()
      .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
    let (parts, _) = req.into_parts();
    assert_eq!(ClientIp::from_parts(&parts).0.as_deref(), Some("203.0.113.9"));

    let mut req = Request::builder().body(()).unwrap();
    req
      .extensions_mut()
      .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
    let (parts, _) = req.into_parts();
    assert_eq!(ClientIp::from_parts(&parts).0.as_deref(), Some("127.0.0.1"));
  }
}
