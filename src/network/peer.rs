// src/network/peer.rs
// Who is calling: peer identity resolution for inbound requests.

use axum::http::HeaderMap;

use crate::constants::HEADER_PEER_ID;

const MAX_PEER_ID_LEN: usize = 128;

/// Maps an inbound request to the peer identifier sessions are keyed by.
pub trait PeerResolver: Send + Sync {
    /// `claimed` is the peer id carried in a request body, if any.
    fn resolve(&self, headers: &HeaderMap, claimed: Option<&str>) -> Option<String>;
}

/// Reads the peer header, falling back to the body claim.
#[derive(Debug, Clone)]
pub struct HeaderPeerResolver {
    header: String,
}

impl Default for HeaderPeerResolver {
    fn default() -> Self {
        Self::new(HEADER_PEER_ID)
    }
}

impl HeaderPeerResolver {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into().to_ascii_lowercase(),
        }
    }
}

impl PeerResolver for HeaderPeerResolver {
    fn resolve(&self, headers: &HeaderMap, claimed: Option<&str>) -> Option<String> {
        headers
            .get(self.header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|p| valid_peer_id(p))
            .or_else(|| claimed.map(str::trim).filter(|p| valid_peer_id(p)))
            .map(str::to_string)
    }
}

pub fn valid_peer_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_PEER_ID_LEN && id.chars().all(|c| c.is_ascii_graphic())
}
