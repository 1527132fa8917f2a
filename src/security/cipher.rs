//! Symmetric payload encryption for established sessions.
//!
//! Wire layout of every sealed message: `nonce (24 bytes) || ciphertext || tag (16 bytes)`.
//! XChaCha20-Poly1305 with a fresh random 192-bit nonce per message, in both directions.
//!
//! The associated data binds each message to its direction and key id, so a
//! reply can never be replayed as a request and a request sealed for one key
//! id does not open under another.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{DecryptionError, EncryptionError};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;

const SESSION_AAD_LABEL: &[u8] = b"fiber-node/session/v1";

/// Which way a session message travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Requester to responder (challenge body).
    Request,
    /// Responder to requester (result or encrypted error).
    Reply,
}

impl Direction {
    fn tag(self) -> u8 {
        match self {
            Direction::Request => 0x01,
            Direction::Reply => 0x02,
        }
    }
}

/// `label || 0x00 || direction || key_id`
fn session_aad(direction: Direction, key_id: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(SESSION_AAD_LABEL.len() + 2 + key_id.len());
    aad.extend_from_slice(SESSION_AAD_LABEL);
    aad.push(0);
    aad.push(direction.tag());
    aad.extend_from_slice(key_id.as_bytes());
    aad
}

/// Symmetric key material for one session. Wiped on drop, never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_LEN]);

impl SessionKey {
    /// Fresh random key (requester side).
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Returns `None` unless `bytes` is exactly [`KEY_LEN`] long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; KEY_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn seal(
        &self,
        direction: Direction,
        key_id: &str,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, EncryptionError> {
        seal(&self.0, &session_aad(direction, key_id), plaintext)
    }

    pub fn open(
        &self,
        direction: Direction,
        key_id: &str,
        sealed: &[u8],
    ) -> Result<Vec<u8>, DecryptionError> {
        open(&self.0, &session_aad(direction, key_id), sealed)
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

pub(crate) fn seal(
    key: &[u8; KEY_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ct = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| EncryptionError)?;
    let mut out = Vec::with_capacity(NONCE_LEN + ct.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ct);
    Ok(out)
}

pub(crate) fn open(
    key: &[u8; KEY_LEN],
    aad: &[u8],
    sealed: &[u8],
) -> Result<Vec<u8>, DecryptionError> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(DecryptionError::Truncated);
    }
    let (nonce, ct) = sealed.split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ct, aad })
        .map_err(|_| DecryptionError::Authentication)
}
