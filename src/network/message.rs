// src/network/message.rs
// JSON bodies exchanged on the fiber endpoints.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    pub public_key: String,
    pub algorithm: String,
    pub fingerprint: String,
}

/// Step two of the handshake: a session key sealed to the node public key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyExchangeRequest {
    /// Base64 of the sealed 32-byte session key.
    pub encrypted_symmetric_key: String,
    /// Requester-chosen key label, echoed on every challenge reply.
    pub symmetric_key_uuid: String,
    /// Requester wall clock, seconds since epoch. Informational.
    #[serde(default)]
    pub timestamp: Option<u64>,
    /// Single-use value; a repeat inside the handshake window is refused.
    pub nonce: String,
    /// Accepted for wire compatibility; not verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Peer claim used when the request carries no peer header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyExchangeResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

impl KeyExchangeResponse {
    pub fn accepted(ttl_secs: u64) -> Self {
        Self {
            success: true,
            message: "session key accepted".to_string(),
            ttl_secs: Some(ttl_secs),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ttl_secs: None,
        }
    }
}

/// 401 body telling the requester to re-handshake against `public_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeRequired {
    pub requires_handshake: bool,
    pub public_key: String,
    pub message: String,
}

impl HandshakeRequired {
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            requires_handshake: true,
            public_key: public_key.into(),
            message: "session missing or expired; handshake required".to_string(),
        }
    }
}

/// Plain JSON error for admission rejections and bad requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub available: bool,
    pub ready: bool,
    pub in_flight: usize,
    pub max_in_flight: usize,
}
