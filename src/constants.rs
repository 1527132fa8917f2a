//! Central place for application-wide constants and default values.

/// Default application name (can be overridden in config)
pub const DEFAULT_APP_NAME: &str = "fiber-node";

/// Left padding used to align log lines with those that include emoji prefixes.
pub const ICON_PLACEHOLDER: &str = "   "; // Three spaces for alignment

/// Protocol branding shown in logs and the public key response
pub const PROTOCOL_NAME: &str = "fiber";
/// Protocol version for compatibility checks (bump when wire format changes)
pub const PROTOCOL_VERSION: &str = "1";

/// Application / crate version (populated from Cargo.toml via env! macro)
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Algorithm label advertised next to the public key.
pub const KEY_TRANSPORT_ALGORITHM: &str = "x25519-hkdf-sha256-xchacha20poly1305";
/// HKDF info string binding derived transport keys to this protocol version.
pub const KEY_TRANSPORT_INFO: &[u8] = b"fiber-node/key-transport/v1";

/// Header carrying the requester's peer identifier claim.
pub const HEADER_PEER_ID: &str = "x-fiber-peer-id";
/// Header naming the symmetric key the requester encrypted with.
pub const HEADER_KEY_UUID: &str = "x-fiber-symmetric-key-uuid";
/// Header carrying this node's resolved identifier on challenge replies.
pub const HEADER_NODE_ID: &str = "x-fiber-node-id";

/// Route paths
pub const ROUTE_PUBLIC_KEY: &str = "/fiber/public-key";
pub const ROUTE_KEY_EXCHANGE: &str = "/fiber/key-exchange";
pub const ROUTE_CHALLENGE: &str = "/fiber/challenge";
pub const ROUTE_AVAILABILITY: &str = "/availability";

/// Optional short git commit hash (set via build script or cargo:rustc-env). Falls back to "unknown".
pub fn git_commit() -> &'static str {
    option_env!("GIT_COMMIT").unwrap_or("unknown")
}

/// Human friendly composite version string used in logs.
pub fn full_version() -> String {
    format!(
        "v{} (protocol={}/{}, commit={})",
        APP_VERSION,
        PROTOCOL_NAME,
        PROTOCOL_VERSION,
        git_commit()
    )
}

/// Shorten an identifier for log output (peer ids, key ids).
pub fn short_id(id: &str) -> String {
    let end = id
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(id.len());
    if end < id.len() {
        format!("{}...", &id[..end])
    } else {
        id.to_string()
    }
}
