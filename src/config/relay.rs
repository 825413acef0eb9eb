//! Relay endpoint description and relay URL parsing

use crate::crypto::{derive_master_key, CipherSuite};
use crate::protocol::DEFAULT_RELAY_PORT;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// One remote relay endpoint and the credential used to reach it
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_cipher")]
    pub cipher: CipherSuite,
    pub password: String,
}

fn default_port() -> u16 {
    DEFAULT_RELAY_PORT
}

/// Cipher used when a relay entry or URL names none
pub(crate) fn default_cipher() -> CipherSuite {
    CipherSuite::Aes256Gcm
}

impl RelayConfig {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        cipher: CipherSuite,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            cipher,
            password: password.into(),
        }
    }

    /// Master key for this relay's password and cipher
    pub fn master_key(&self) -> Vec<u8> {
        derive_master_key(self.password.as_bytes(), self.cipher.key_len())
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("cipher", &self.cipher)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Parse a relay URL into a [`RelayConfig`].
///
/// Accepted forms:
/// - `scheme://host[:port]?cipher=..&password=..[&name=..]`
/// - `ss://BASE64(method:password)@host[:port][#name]` (SIP002)
///
/// Cipher defaults to aes-256-gcm and port to 8388. Returns `None` on any
/// parse failure.
pub fn parse_relay_url(input: &str) -> Option<RelayConfig> {
    let url = Url::parse(input.trim()).ok()?;

    let host = url
        .host_str()?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    if host.is_empty() {
        return None;
    }
    let port = url.port().unwrap_or(DEFAULT_RELAY_PORT);

    let mut cipher = None;
    let mut password = None;
    let mut name = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "cipher" | "method" => cipher = Some(value.into_owned()),
            "password" => password = Some(value.into_owned()),
            "name" => name = Some(value.into_owned()),
            _ => {}
        }
    }

    if password.is_none() && !url.username().is_empty() {
        let (method, secret) = decode_userinfo(url.username())?;
        cipher = Some(method);
        password = Some(secret);
    }

    let password = password.filter(|p| !p.is_empty())?;
    let cipher = cipher
        .map(|c| CipherSuite::from_name(&c))
        .unwrap_or_else(default_cipher);
    let name = name
        .or_else(|| url.fragment().filter(|f| !f.is_empty()).map(str::to_string))
        .unwrap_or_else(|| host.clone());

    Some(RelayConfig {
        name,
        host,
        port,
        cipher,
        password,
    })
}

/// Decode SIP002 userinfo `base64(method:password)`
fn decode_userinfo(userinfo: &str) -> Option<(String, String)> {
    let trimmed = userinfo.trim_end_matches("%3D").trim_end_matches('=');
    let decoded = URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (method, password) = text.split_once(':')?;
    if method.is_empty() || password.is_empty() {
        return None;
    }
    Some((method.to_string(), password.to_string()))
}
