//! Transport cipher
//!
//! Repeating-key XOR followed by standard base64. Tokens are single
//! lines of ASCII and therefore safe to frame with `\n`.
//!
//! This obfuscates traffic against casual inspection only: there is no
//! nonce and no authentication tag, so identical plaintexts produce
//! identical tokens and a wrong key decodes to garbage instead of an
//! error. Only malformed framing is detected.

use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use rand::RngCore;

use crate::error::{AppError, DecodeError};

/// Length of generated keys in bytes
pub const KEY_LEN: usize = 32;

/// Decoder that accepts tokens with or without trailing padding
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Shared secret for encoding and decoding frames
///
/// Never empty. Read-only once created.
#[derive(Clone, PartialEq, Eq)]
pub struct Key(Vec<u8>);

impl Key {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, AppError> {
        if bytes.is_empty() {
            return Err(AppError::InvalidKey("key must not be empty".to_string()));
        }
        Ok(Self(bytes))
    }

    /// Parse a key from its base64 text form
    pub fn from_base64(text: &str) -> Result<Self, AppError> {
        let bytes = LENIENT
            .decode(text.trim())
            .map_err(|e| AppError::InvalidKey(e.to_string()))?;
        Self::from_bytes(bytes)
    }

    /// Base64 text form, suitable for handing to clients
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Key({} bytes)", self.0.len())
    }
}

/// Generate a fresh random key
pub fn generate_key() -> Key {
    let mut bytes = vec![0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    Key(bytes)
}

/// Encode plaintext into a transportable token
pub fn encode(plaintext: &[u8], key: &Key) -> String {
    STANDARD.encode(xor(plaintext, key))
}

/// Decode a token back into plaintext bytes
pub fn decode(token: &str, key: &Key) -> Result<Vec<u8>, DecodeError> {
    let bytes = LENIENT.decode(token)?;
    Ok(xor(&bytes, key))
}

/// Decode a token whose plaintext must be UTF-8 text
pub fn decode_text(token: &str, key: &Key) -> Result<String, DecodeError> {
    let bytes = decode(token, key)?;
    Ok(String::from_utf8(bytes)?)
}

fn xor(data: &[u8], key: &Key) -> Vec<u8> {
    data.iter()
        .zip(key.0.iter().cycle())
        .map(|(byte, k)| byte ^ k)
        .collect()
}
