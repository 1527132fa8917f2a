use serde::Deserialize;
use std::time::Duration;

use crate::events::model::LogLevel;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP listener configuration
    pub server: Option<ServerConfig>,
    pub app_name: Option<String>,
    /// Logging / events configuration
    pub logging: Option<LoggingConfig>,
    /// Node label / state directory configuration
    pub node: Option<NodeConfig>,
    /// Session key lifetime and handshake policy
    pub session: Option<SessionConfig>,
    /// Readiness polling and concurrency limits
    pub admission: Option<AdmissionConfig>,
    /// Inference collaborator selection
    pub backend: Option<BackendConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: Some(ServerConfig::default()),
            app_name: None,
            logging: None,
            node: Some(NodeConfig::default()),
            session: Some(SessionConfig::default()),
            admission: Some(AdmissionConfig::default()),
            backend: Some(BackendConfig::default()),
        }
    }
}

impl Config {
    /// Parse a TOML document into a config.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str::<Config>(content)?)
    }

    pub fn bind_addr(&self) -> String {
        let server = self.server.clone().unwrap_or_default();
        format!(
            "{}:{}",
            server.host.unwrap_or_else(|| "0.0.0.0".to_string()),
            server.port.unwrap_or(8000)
        )
    }

    pub fn max_body_bytes(&self) -> usize {
        self.server
            .as_ref()
            .and_then(|s| s.max_body_bytes)
            .unwrap_or(2 * 1024 * 1024)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Upper bound on request bodies (challenge ciphertext, key exchange JSON)
    pub max_body_bytes: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Some("0.0.0.0".to_string()),
            port: Some(8000),
            max_body_bytes: Some(2 * 1024 * 1024),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Path to JSON line audit log (rotated). If unset, defaults to logs/fiber_audit.jsonl
    pub json_path: Option<String>,
    /// Max size in bytes before rotation (default 5MB)
    pub json_max_bytes: Option<usize>,
    /// Number of rotated files to retain (default 3)
    pub json_rotate: Option<u32>,
    /// Disable console sink (default false)
    pub disable_console: Option<bool>,
    /// Minimum level printed to the console: trace | debug | info | warn | error
    pub console_level: Option<String>,
}

impl LoggingConfig {
    pub fn console_min_level(&self) -> Option<LogLevel> {
        self.console_level.as_deref().and_then(LogLevel::parse)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Explicit node ID (highest precedence if provided)
    pub id: Option<String>,
    /// Directory for persisted runtime state (node_id file)
    pub state_dir: Option<String>,
    /// Filename inside state_dir that will store generated node id (default: node_id)
    pub id_file: Option<String>,
    /// Allow ephemeral (in-memory) UUID if no persistence possible
    pub allow_ephemeral: Option<bool>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: None,
            state_dir: Some("data".to_string()),
            id_file: Some("node_id".to_string()),
            allow_ephemeral: Some(true),
        }
    }
}

/// Where the node label came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeIdSource {
    Configured,
    Persisted,
    Generated,
    /// Generated but could not be written; changes on every restart.
    Ephemeral,
}

impl NodeIdSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configured => "configured",
            Self::Persisted => "persisted",
            Self::Generated => "generated",
            Self::Ephemeral => "ephemeral",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNodeId {
    pub id: String,
    pub source: NodeIdSource,
}

impl NodeConfig {
    /// Resolve the label returned in `x-fiber-node-id`: a valid configured id,
    /// else the one persisted under `state_dir/id_file`, else a fresh UUID that
    /// is persisted when possible. Invalid configured or persisted values are
    /// skipped.
    ///
    /// The label is unrelated to the key-transport identity, which is
    /// regenerated on every start.
    pub fn resolve_node_id(&self) -> anyhow::Result<ResolvedNodeId> {
        if let Some(id) = self.id.as_deref().map(str::trim).filter(|id| valid_node_id(id)) {
            return Ok(ResolvedNodeId {
                id: id.to_string(),
                source: NodeIdSource::Configured,
            });
        }

        let path = self.id_path();
        let persisted = std::fs::read_to_string(&path).ok();
        if let Some(id) = persisted.as_deref().map(str::trim).filter(|id| valid_node_id(id)) {
            return Ok(ResolvedNodeId {
                id: id.to_string(),
                source: NodeIdSource::Persisted,
            });
        }

        let id = uuid::Uuid::new_v4().to_string();
        match persist_atomically(&path, &id) {
            Ok(()) => Ok(ResolvedNodeId {
                id,
                source: NodeIdSource::Generated,
            }),
            Err(_) if self.allow_ephemeral.unwrap_or(true) => Ok(ResolvedNodeId {
                id,
                source: NodeIdSource::Ephemeral,
            }),
            Err(e) => Err(anyhow::anyhow!(
                "cannot persist node id to {} and ephemeral ids are disabled: {}",
                path.display(),
                e
            )),
        }
    }

    fn id_path(&self) -> std::path::PathBuf {
        let dir = self.state_dir.as_deref().unwrap_or("data");
        let file = self.id_file.as_deref().unwrap_or("node_id");
        std::path::Path::new(dir).join(file)
    }
}

fn persist_atomically(path: &std::path::Path, value: &str) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, value)?;
    std::fs::rename(&tmp, path)
}

/// Node labels travel in a response header: 1-128 chars of `[A-Za-z0-9._-]`.
fn valid_node_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Lifetime of a submitted symmetric key in seconds (default 1 hour)
    pub key_ttl_secs: Option<u64>,
    /// Window in which a key-exchange nonce may not be reused (default 30s)
    pub handshake_timeout_secs: Option<u64>,
    /// Allow a new key submission to replace an unexpired session (default true)
    pub enable_key_rotation: Option<bool>,
    /// Expired-session sweep interval; defaults to half the TTL
    pub sweep_interval_secs: Option<u64>,
    /// Re-handshake signals per peer per minute before a warning is emitted
    pub rehandshake_alert_threshold: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            key_ttl_secs: Some(3600),
            handshake_timeout_secs: Some(30),
            enable_key_rotation: Some(true),
            sweep_interval_secs: None,
            rehandshake_alert_threshold: Some(20),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionConfig {
    /// Maximum number of challenge requests processed at once (default 10)
    pub max_concurrent_requests: Option<usize>,
    /// Seconds between backend health polls (default 5)
    pub readiness_poll_interval_secs: Option<u64>,
    /// Upper bound on a single health check call (default 10)
    pub health_check_timeout_secs: Option<u64>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: Some(10),
            readiness_poll_interval_secs: Some(5),
            health_check_timeout_secs: Some(10),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// mock | openai | ollama | vllm
    pub kind: Option<String>,
    /// OpenAI-compatible API base, e.g. http://localhost:11434/v1
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
    pub default_model: Option<String>,
    pub default_max_tokens: Option<u32>,
    pub default_temperature: Option<f32>,
    pub default_top_p: Option<f32>,
    /// Answer every task with a canned response instead of running inference
    pub test_mode: Option<bool>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: Some("mock".to_string()),
            api_base: None,
            api_key: None,
            timeout_secs: Some(300),
            default_model: None,
            default_max_tokens: Some(512),
            default_temperature: Some(0.7),
            default_top_p: Some(0.95),
            test_mode: Some(false),
        }
    }
}

/// Ceiling for second-valued durations that feed timers and `Instant` math.
pub const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 3600;

/// Session policy with every optional resolved.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub key_ttl: Duration,
    pub handshake_timeout: Duration,
    pub enable_key_rotation: bool,
    pub sweep_interval: Duration,
    pub rehandshake_alert_threshold: u32,
}

impl SessionSettings {
    pub fn from_config(cfg: &Config) -> Self {
        let s = cfg.session.clone().unwrap_or_default();
        let ttl_secs = s.key_ttl_secs.unwrap_or(3600).clamp(1, MAX_DURATION_SECS);
        let sweep_secs = s
            .sweep_interval_secs
            .unwrap_or(ttl_secs / 2)
            .clamp(1, MAX_DURATION_SECS);
        let handshake_secs = s.handshake_timeout_secs.unwrap_or(30).min(MAX_DURATION_SECS);
        Self {
            key_ttl: Duration::from_secs(ttl_secs),
            handshake_timeout: Duration::from_secs(handshake_secs),
            enable_key_rotation: s.enable_key_rotation.unwrap_or(true),
            sweep_interval: Duration::from_secs(sweep_secs),
            rehandshake_alert_threshold: s.rehandshake_alert_threshold.unwrap_or(20),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Admission policy with every optional resolved.
#[derive(Debug, Clone)]
pub struct AdmissionSettings {
    pub max_concurrent_requests: usize,
    pub readiness_poll_interval: Duration,
    pub health_check_timeout: Duration,
}

impl AdmissionSettings {
    pub fn from_config(cfg: &Config) -> Self {
        let a = cfg.admission.clone().unwrap_or_default();
        Self {
            max_concurrent_requests: a.max_concurrent_requests.unwrap_or(10).max(1),
            readiness_poll_interval: Duration::from_secs(
                a.readiness_poll_interval_secs
                    .unwrap_or(5)
                    .clamp(1, MAX_DURATION_SECS),
            ),
            health_check_timeout: Duration::from_secs(
                a.health_check_timeout_secs
                    .unwrap_or(10)
                    .clamp(1, MAX_DURATION_SECS),
            ),
        }
    }
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Backend selection and task defaults with every optional resolved.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub kind: String,
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
    /// Per-request bound on health checks; follows `[admission] health_check_timeout_secs`
    pub health_timeout: Duration,
    pub default_model: Option<String>,
    pub default_max_tokens: u32,
    pub default_temperature: f32,
    pub default_top_p: f32,
    pub test_mode: bool,
}

impl BackendSettings {
    pub fn from_config(cfg: &Config) -> Self {
        let b = cfg.backend.clone().unwrap_or_default();
        Self {
            kind: b
                .kind
                .map(|k| k.trim().to_ascii_lowercase())
                .unwrap_or_else(|| "mock".to_string()),
            api_base: b.api_base,
            api_key: b.api_key,
            timeout: Duration::from_secs(b.timeout_secs.unwrap_or(300).clamp(1, MAX_DURATION_SECS)),
            health_timeout: AdmissionSettings::from_config(cfg).health_check_timeout,
            default_model: b.default_model,
            default_max_tokens: b.default_max_tokens.unwrap_or(512),
            default_temperature: b.default_temperature.unwrap_or(0.7),
            default_top_p: b.default_top_p.unwrap_or(0.95),
            test_mode: b.test_mode.unwrap_or(false),
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let cfg = Config::from_toml_str("").unwrap();
        let session = SessionSettings::from_config(&cfg);
        assert_eq!(session.key_ttl, Duration::from_secs(3600));
        assert_eq!(session.sweep_interval, Duration::from_secs(1800));
        assert!(session.enable_key_rotation);
        let admission = AdmissionSettings::from_config(&cfg);
        assert_eq!(admission.max_concurrent_requests, 10);
        assert_eq!(admission.readiness_poll_interval, Duration::from_secs(5));
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8000");
    }

    #[test]
    fn tables_override_defaults() {
        let cfg = Config::from_toml_str(
            r#"
            [server]
            host = "127.0.0.1"
            port = 9100

            [session]
            key_ttl_secs = 60
            enable_key_rotation = false

            [admission]
            max_concurrent_requests = 3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:9100");
        let session = SessionSettings::from_config(&cfg);
        assert_eq!(session.key_ttl, Duration::from_secs(60));
        assert_eq!(session.sweep_interval, Duration::from_secs(30));
        assert!(!session.enable_key_rotation);
        assert_eq!(
            AdmissionSettings::from_config(&cfg).max_concurrent_requests,
            3
        );
    }

    #[test]
    fn huge_session_durations_are_capped() {
        let cfg = Config::from_toml_str(
            r#"
            [session]
            key_ttl_secs = 9223372036854775807
            handshake_timeout_secs = 9223372036854775807
            "#,
        )
        .unwrap();
        let session = SessionSettings::from_config(&cfg);
        assert_eq!(session.key_ttl, Duration::from_secs(MAX_DURATION_SECS));
        assert_eq!(session.sweep_interval, Duration::from_secs(MAX_DURATION_SECS / 2));
        assert_eq!(session.handshake_timeout, Duration::from_secs(MAX_DURATION_SECS));
    }

    #[test]
    fn zero_admission_values_are_raised_to_one() {
        let cfg = Config::from_toml_str(
            r#"
            [admission]
            max_concurrent_requests = 0
            health_check_timeout_secs = 0
            readiness_poll_interval_secs = 0
            "#,
        )
        .unwrap();
        let admission = AdmissionSettings::from_config(&cfg);
        assert_eq!(admission.max_concurrent_requests, 1);
        assert_eq!(admission.health_check_timeout, Duration::from_secs(1));
        assert_eq!(admission.readiness_poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn backend_health_timeout_follows_admission() {
        let cfg = Config::from_toml_str("[admission]\nhealth_check_timeout_secs = 45").unwrap();
        assert_eq!(
            BackendSettings::from_config(&cfg).health_timeout,
            Duration::from_secs(45)
        );
        assert_eq!(
            BackendSettings::default().health_timeout,
            Duration::from_secs(10)
        );
    }

    #[test]
    fn explicit_node_id_wins() {
        let node = NodeConfig {
            id: Some("responder-01".into()),
            ..NodeConfig::default()
        };
        let resolved = node.resolve_node_id().unwrap();
        assert_eq!(resolved.id, "responder-01");
        assert_eq!(resolved.source, NodeIdSource::Configured);
    }
}
