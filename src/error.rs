//! Error taxonomy for the responder.
//!
//! Each enum maps onto an HTTP status through `status_code()`. Cryptographic
//! failures on the challenge path never surface their cause to the requester:
//! they collapse into [`ChallengeError::RequiresHandshake`].

use axum::http::StatusCode;
use thiserror::Error;

/// A sealed blob could not be opened with this node's private key.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecryptionError {
    #[error("ciphertext too short")]
    Truncated,
    #[error("malformed public key")]
    MalformedKey,
    #[error("authentication failed")]
    Authentication,
    #[error("key derivation failed")]
    KeyDerivation,
}

/// The AEAD refused to seal (only possible for absurdly large inputs).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("encryption failed")]
pub struct EncryptionError;

/// Failure while accepting a submitted session key.
#[derive(Debug, Error)]
pub enum KeyExchangeError {
    #[error("missing peer identifier")]
    MissingPeer,
    #[error("malformed key exchange payload: {0}")]
    Malformed(String),
    #[error("encrypted symmetric key could not be decrypted")]
    Undecryptable(#[from] DecryptionError),
    #[error("symmetric key must be {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
    #[error("nonce already used")]
    Replay,
    #[error("an unexpired session exists and key rotation is disabled")]
    RotationDisabled,
    #[error(transparent)]
    Admission(#[from] AdmissionError),
}

impl KeyExchangeError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::RotationDisabled => StatusCode::CONFLICT,
            Self::Undecryptable(DecryptionError::KeyDerivation) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Admission(e) => e.status_code(),
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Rejection by the admission gate, before any key material is touched.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("inference backend is not ready")]
    BackendNotReady,
    #[error("concurrency limit of {limit} requests reached")]
    ConcurrencyLimitExceeded { limit: usize },
}

impl AdmissionError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BackendNotReady => StatusCode::SERVICE_UNAVAILABLE,
            Self::ConcurrencyLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

/// Failure reported by the inference collaborator.
#[derive(Debug, Error, Clone)]
pub enum InferenceError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend request failed: {0}")]
    Request(String),
    #[error("backend returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// Outcome of a challenge that did not produce an encrypted result.
#[derive(Debug, Error)]
pub enum ChallengeError {
    /// No usable session: absent, expired, wrong key id, or decryption failed.
    #[error("session missing or expired; handshake required")]
    RequiresHandshake { public_key: String },
    #[error("missing peer identifier")]
    MissingPeer,
    /// Authentic plaintext that is not a valid task envelope.
    #[error("invalid task payload: {0}")]
    InvalidTask(String),
    /// Inference failed; the body is an error object encrypted under the session key.
    #[error("inference failed")]
    Inference {
        encrypted_body: Vec<u8>,
        key_id: String,
    },
    #[error(transparent)]
    Admission(#[from] AdmissionError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<EncryptionError> for ChallengeError {
    fn from(e: EncryptionError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl ChallengeError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::RequiresHandshake { .. } => StatusCode::UNAUTHORIZED,
            Self::MissingPeer | Self::InvalidTask(_) => StatusCode::BAD_REQUEST,
            Self::Inference { .. } => StatusCode::BAD_GATEWAY,
            Self::Admission(e) => e.status_code(),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_derivation_failure_is_internal() {
        assert_eq!(
            KeyExchangeError::from(DecryptionError::KeyDerivation).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            KeyExchangeError::from(DecryptionError::Authentication).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
