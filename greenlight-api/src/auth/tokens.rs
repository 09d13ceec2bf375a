//! Opaque bearer tokens
//!
//! A token is 32 random bytes handed to its holder once, base64url encoded.
//! Only the SHA-256 digest of the plaintext is stored; lookups recompute the
//! digest from the presented value. [`StoredToken`] deliberately has no
//! plaintext field so the plaintext cannot reach storage.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Random bytes per token
pub const TOKEN_BYTES: usize = 32;
/// Length of the encoded plaintext (32 bytes, base64url, no padding)
pub const TOKEN_LEN: usize = 43;

/// What a token may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Activation,
    Authentication,
    PasswordReset,
}

impl Scope {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
            Scope::PasswordReset => "password-reset",
        }
    }

    /// Lifetime of a freshly issued token of this scope
    pub const fn default_ttl(&self) -> Duration {
        match self {
            Scope::Activation => Duration::from_secs(3 * 24 * 60 * 60),
            Scope::Authentication => Duration::from_secs(24 * 60 * 60),
            Scope::PasswordReset => Duration::from_secs(45 * 60),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activation" => Ok(Scope::Activation),
            "authentication" => Ok(Scope::Authentication),
            "password-reset" => Ok(Scope::PasswordReset),
            other => Err(format!("unknown token scope: {other}")),
        }
    }
}

/// The persisted half of a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredToken {
    pub hash: Vec<u8>,
    pub user_id: i64,
    /// Absolute expiry, unix millis
    pub expiry: i64,
    pub scope: Scope,
}

impl StoredToken {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expiry <= now_ms
    }
}

/// Issue a new token, returning the plaintext and its persisted form
pub fn generate_token(user_id: i64, ttl: Duration, scope: Scope, now_ms: i64) -> (String, StoredToken) {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let plaintext = URL_SAFE_NO_PAD.encode(bytes);

    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    let token = StoredToken {
        hash: hash_token(&plaintext),
        user_id,
        expiry: now_ms.saturating_add(ttl_ms),
        scope,
    };
    (plaintext, token)
}

/// SHA-256 digest of the plaintext
pub fn hash_token(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

/// Whether `s` has the shape of a plaintext token
pub fn is_well_formed(s: &str) -> bool {
    s.len() == TOKEN_LEN
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Constant-time comparison for token digests
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
