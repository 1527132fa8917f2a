pub mod message;
pub mod peer;
pub mod server;

pub use message::{
    AvailabilityResponse, ErrorBody, HandshakeRequired, KeyExchangeRequest, KeyExchangeResponse,
    PublicKeyResponse,
};
pub use peer::{HeaderPeerResolver, PeerResolver};
pub use server::{router, serve, AppState};
