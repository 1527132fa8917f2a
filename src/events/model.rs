use serde::Serialize;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeOutcome {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionGateKind {
    Readiness,
    Concurrency,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventMeta {
    pub ts: SystemTime,
    pub level: LogLevel,
    pub corr_id: Option<String>,
    pub session_id: String,
    pub component: &'static str,
    pub suppress_console: bool,
}

/// Key exchange result for one peer.
#[derive(Debug, Clone, Serialize)]
pub struct HandshakeEvent {
    pub meta: EventMeta,
    pub peer: String,
    pub key_id: Option<String>,
    pub outcome: HandshakeOutcome,
    pub reason: String,
    pub replaced_existing: bool,
    pub ttl_secs: Option<u64>,
}

/// Session store lifecycle (invalidation, sweep).
#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    pub meta: EventMeta,
    pub action: String,
    pub peer: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdmissionEvent {
    pub meta: EventMeta,
    pub gate: AdmissionGateKind,
    pub action: String,
    pub in_flight: usize,
    pub limit: usize,
    pub rejected_total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessEvent {
    pub meta: EventMeta,
    pub from: String,
    pub to: String,
    pub detail: Option<String>,
}

/// Challenge processing outcome. Never carries plaintext or key material.
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeEvent {
    pub meta: EventMeta,
    pub peer: String,
    pub action: String,
    pub key_id: Option<String>,
    pub elapsed_ms: Option<u64>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkEvent {
    pub meta: EventMeta,
    pub action: String,
    pub addr: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemEvent {
    pub meta: EventMeta,
    pub action: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEvent {
    Handshake(HandshakeEvent),
    Session(SessionEvent),
    Admission(AdmissionEvent),
    Readiness(ReadinessEvent),
    Challenge(ChallengeEvent),
    Network(NetworkEvent),
    System(SystemEvent),
}

impl LogEvent {
    pub fn meta(&self) -> &EventMeta {
        match self {
            LogEvent::Handshake(e) => &e.meta,
            LogEvent::Session(e) => &e.meta,
            LogEvent::Admission(e) => &e.meta,
            LogEvent::Readiness(e) => &e.meta,
            LogEvent::Challenge(e) => &e.meta,
            LogEvent::Network(e) => &e.meta,
            LogEvent::System(e) => &e.meta,
        }
    }
}
