use std::fmt;

use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

/// Length of a bearer token in bytes.
pub const TOKEN_LEN: usize = 16;

/// Opaque bearer token identifying a returning client.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token([u8; TOKEN_LEN]);

impl Token {
    /// Draw a fresh token from the OS entropy source.
    pub fn random() -> Self {
        let mut bytes = [0u8; TOKEN_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; TOKEN_LEN] {
        &self.0
    }
}

impl From<[u8; TOKEN_LEN]> for Token {
    fn from(bytes: [u8; TOKEN_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Tokens are credentials; only a prefix ever reaches the logs.
        write!(f, "Token({:02x}{:02x}{:02x}{:02x}..)", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

/// A durable `(token, number)` record. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    token: Token,
    number: String,
}

impl Identity {
    pub fn new(token: Token, number: String) -> Self {
        Self { token, number }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn number(&self) -> &str {
        &self.number
    }
}

/// Draw a candidate phone number: a zero followed by nine random digits.
///
/// Candidates starting with `010` are reserved and get rejected, mirroring
/// the numbering plan of the original service.
pub(crate) fn random_number() -> Option<String> {
    let number = format!("0{:09}", fastrand::u32(0..1_000_000_000));
    if number.starts_with("010") {
        return None;
    }
    Some(number)
}
