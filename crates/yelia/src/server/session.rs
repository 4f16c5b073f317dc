//! Signed anonymous session cookies
//!
//! The cookie value is `<uuid>.<hex hmac-sha256 of the uuid>`, so a client can
//! keep its session id but cannot pick someone else's.

use anyhow::{anyhow, Result};
use axum::http::{header::COOKIE, HeaderMap};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "yelia_session";

#[derive(Clone)]
pub struct SessionSigner {
  mac: HmacSha256,
}

impl SessionSigner {
  pub fn new(secret: &[u8]) -> Result<Self> {
    let mac = HmacSha256::new_from_slice(secret).map_err(|e| anyhow!("Invalid session key: {e}"))?;
    Ok(Self { mac })
  }

  /// Signer with a random key; sessions do not survive a restart
  pub fn ephemeral() -> Result<Self> {
    Self::new(&rand::random::<[u8; 32]>())
  }

  fn signature(&self, session_id: &str) -> String {
    let mut mac = self.mac.clone();
    mac.update(session_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
  }

  pub fn sign(&self, session_id: &str) -> String {
    format!("{session_id}.{}", self.signature(session_id))
  }

  /// Session id carried by a cookie value, if the signature checks out
  pub fn verify(&self, cookie_value: &str) -> Option<String> {
    let (session_id, signature) = cookie_value.split_once('.')?;
    Uuid::parse_str(session_id).ok()?;
    let signature = hex::decode(signature).ok()?;

    let mut mac = self.mac.clone();
    mac.update(session_id.as_bytes());
    mac.verify_slice(&signature).ok()?;
    Some(session_id.to_string())
  }

  /// New session id and its cookie value
  pub fn mint(&self) -> (String, String) {
    let session_id = Uuid::new_v4().to_string();
    let value = self.sign(&session_id);
    (session_id, value)
  }
}

/// Value of the session cookie, if the request carries one
pub fn session_cookie(headers: &HeaderMap) -> Option<&str> {
  headers
    .get_all(COOKIE)
    .iter()
    .filter_map(|value| value.to_str().ok())
    .flat_map(|value| value.split(';'))
    .filter_map(|pair| pair.trim().split_once('='))
    .find(|(name, _)| *name == SESSION_COOKIE)
    .map(|(_, value)| value.trim())
}

pub fn set_cookie_value(cookie_value: &str) -> String {
  format!("{SESSION_COOKIE}={cookie_value}; HttpOnly; SameSite=Lax; Path=/")
}
