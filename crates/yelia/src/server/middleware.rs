//! Request context and middleware for the YELIA REST API
//!
//! Every request gets a [`RequestContext`] carrying a request id, the
//! caller's anonymous session and peer address, injected into handlers as
//! an extension.

use axum::{
  extract::{ConnectInfo, Request, State},
  http::{header::SET_COOKIE, HeaderValue, Method, Uri},
  middleware::Next,
  response::Response,
};
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::sanitize::sanitize;
use crate::server::session::{session_cookie, set_cookie_value};
use crate::server::state::AppState;

const ANONYMOUS_USER: &str = "anonimo";
const MAX_USER_CHARS: usize = 50;

/// Request context containing request metadata and the session id
#[derive(Clone, Debug)]
pub struct RequestContext {
  /// Unique ID for this request
  pub request_id: Uuid,
  pub method: Method,
  pub uri: Uri,
  /// Anonymous session id from the signed cookie
  pub session_id: String,
  /// False when the session was minted for this request
  pub returning: bool,
  pub peer: Option<IpAddr>,
}

impl RequestContext {
  pub fn new(method: Method, uri: Uri, session_id: String) -> Self {
    Self { request_id: Uuid::new_v4(), method, uri, session_id, returning: true, peer: None }
  }

  /// Mark the session as minted for this request, coming from `peer`
  pub fn minted_for(mut self, peer: Option<IpAddr>) -> Self {
    self.returning = false;
    self.peer = peer;
    self
  }

  /// Rate-limit bucket: the session for cookie holders, the peer address
  /// for callers without a valid cookie
  pub fn rate_limit_key(&self) -> String {
    if self.returning {
      return self.session_id.clone();
    }
    match self.peer {
      Some(ip) => format!("peer:{ip}"),
      None => "peer:unknown".to_string(),
    }
  }

  /// The user a request acts for: an explicit `usuario`, unless it is blank
  /// or the anonymous placeholder, otherwise the session id
  pub fn user(&self, requested: Option<&str>) -> String {
    requested
      .map(|u| sanitize(u, MAX_USER_CHARS))
      .filter(|u| !u.is_empty() && u != ANONYMOUS_USER)
      .unwrap_or_else(|| self.session_id.clone())
  }
}

/// Middleware to inject RequestContext into all requests
pub async fn request_context_middleware(
  State(state): State<AppState>,
  mut request: Request,
  next: Next,
) -> Response {
  let started = Instant::now();

  let existing = session_cookie(request.headers()).and_then(|value| state.sessions.verify(value));
  let (session_id, new_cookie) = match existing {
    Some(id) => (id, None),
    None => {
      let (id, value) = state.sessions.mint();
      (id, Some(value))
    }
  };

  let mut context = RequestContext::new(request.method().clone(), request.uri().clone(), session_id);
  if new_cookie.is_some() {
    let peer = request.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0.ip());
    context = context.minted_for(peer);
  }
  debug!(request_id = %context.request_id, "{} {} started", context.method, context.uri.path());
  request.extensions_mut().insert(context.clone());

  let mut response = next.run(request).await;

  if let Some(value) = new_cookie {
    match HeaderValue::from_str(&set_cookie_value(&value)) {
      Ok(header) => {
        response.headers_mut().append(SET_COOKIE, header);
      }
      Err(e) => warn!("Could not encode session cookie: {e}"),
    }
  }

  info!(
    request_id = %context.request_id,
    status = response.status().as_u16(),
    duration_ms = started.elapsed().as_secs_f64() * 1000.0,
    "{} {} completed",
    context.method,
    context.uri.path()
  );

  response
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_user_identity_rule() {
    let context = RequestContext::new(Method::GET, Uri::from_static("/progreso"), "sess-1".into());
    assert_eq!(context.user(Some("ana")), "ana");
    assert_eq!(context.user(Some("  ana ")), "ana");
    assert_eq!(context.user(Some("anonimo")), "sess-1");
    assert_eq!(context.user(Some("")), "sess-1");
    assert_eq!(context.user(Some("<b></b>")), "sess-1");
    assert_eq!(context.user(None), "sess-1");
  }

  #[test]
  fn test_rate_limit_key_follows_session_or_peer() {
    let context = RequestContext::new(Method::POST, Uri::from_static("/ask"), "sess-1".into());
    assert_eq!(context.rate_limit_key(), "sess-1");

    let peer: IpAddr = "10.0.0.7".parse().unwrap();
    let fresh = context.clone().minted_for(Some(peer));
    assert_eq!(fresh.rate_limit_key(), "peer:10.0.0.7");
    assert_eq!(fresh.user(None), "sess-1");

    assert_eq!(context.minted_for(None).rate_limit_key(), "peer:unknown");
  }
}
