use std::fmt::{self, Write as _};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Content identity of a decoded narration payload
///
/// Two payloads with the same bytes share a key regardless of which page
/// requested them, which is what lets a preloaded resource be promoted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKey(String);

impl ContentKey {
    /// Hash decoded audio bytes into a key
    pub fn of(audio: &[u8]) -> Self {
        let digest = Sha256::digest(audio);
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest.iter() {
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    /// Abbreviated form for log fields
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Narration audio as handed to the session
#[derive(Debug, Clone)]
pub enum AudioPayload {
    /// Base64-encoded MP3, as returned by the speak endpoint
    Base64(String),
    /// Already-decoded audio bytes
    Decoded(Bytes),
}

impl AudioPayload {
    /// Decode into raw bytes plus their content key
    ///
    /// # Errors
    ///
    /// Returns an error if a base64 payload cannot be decoded
    pub fn into_bytes(self) -> Result<(Bytes, ContentKey)> {
        let bytes = match self {
            Self::Base64(encoded) => Bytes::from(STANDARD.decode(encoded.trim())?),
            Self::Decoded(bytes) => bytes,
        };
        let key = ContentKey::of(&bytes);
        Ok((bytes, key))
    }
}

impl From<String> for AudioPayload {
    fn from(encoded: String) -> Self {
        Self::Base64(encoded)
    }
}

impl From<&str> for AudioPayload {
    fn from(encoded: &str) -> Self {
        Self::Base64(encoded.to_owned())
    }
}

impl From<Bytes> for AudioPayload {
    fn from(bytes: Bytes) -> Self {
        Self::Decoded(bytes)
    }
}

impl From<Vec<u8>> for AudioPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Decoded(Bytes::from(bytes))
    }
}
