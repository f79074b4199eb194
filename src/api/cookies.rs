//! Session and flash cookies
//!
//! The session cookie carries the session token with an HMAC-SHA256 tag
//! (`token.hexmac`) so a forged or tampered cookie never reaches the
//! database. Flash messages travel in their own short-lived cookie as
//! URL-encoded JSON.

use axum::http::{header, HeaderMap};
use data_encoding::HEXLOWER;
use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const SESSION_COOKIE: &str = "session";
pub const FLASH_COOKIE: &str = "flash";

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies session tokens
#[derive(Clone)]
pub struct CookieSigner {
    mac: HmacSha256,
}

impl CookieSigner {
    pub fn new(key: &[u8]) -> anyhow::Result<Self> {
        let mac = HmacSha256::new_from_slice(key)
            .map_err(|e| anyhow::anyhow!("Invalid signing key: {}", e))?;
        Ok(Self { mac })
    }

    /// `token.hexmac`
    pub fn sign(&self, token: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        let tag = mac.finalize().into_bytes();
        format!("{}.{}", token, HEXLOWER.encode(&tag))
    }

    /// The token inside a signed value, if the tag matches.
    pub fn verify(&self, signed: &str) -> Option<String> {
        let (token, tag) = signed.rsplit_once('.')?;
        let tag = HEXLOWER.decode(tag.as_bytes()).ok()?;

        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        mac.verify_slice(&tag).ok()?;
        Some(token.to_string())
    }
}

/// Find a cookie value in the request headers
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then_some(value)
        })
}

/// `Set-Cookie` value for a signed session
pub fn session_cookie(signed_token: &str, ttl_days: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        signed_token,
        ttl_days * 24 * 60 * 60
    )
}

/// `Set-Cookie` value carrying flash messages to the next page
pub fn flash_cookie(messages: &[String]) -> String {
    let json = serde_json::to_string(messages).unwrap_or_else(|_| "[]".to_string());
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age=300",
        FLASH_COOKIE,
        urlencoding::encode(&json)
    )
}

/// `Set-Cookie` value that removes `name`
pub fn clear_cookie(name: &str) -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", name)
}

/// Decode a flash cookie value. Garbage yields no messages.
pub fn decode_flashes(value: &str) -> Vec<String> {
    urlencoding::decode(value)
        .ok()
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default()
}
