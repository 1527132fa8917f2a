use crate::config::LoggingConfig;
use crate::events::dispatcher::init_events;
use crate::events::sink::{ConsoleSink, JsonFileSink, LogSink};
use std::sync::Arc;

pub const DEFAULT_AUDIT_LOG: &str = "logs/fiber_audit.jsonl";
const DEFAULT_AUDIT_MAX_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_AUDIT_BACKUPS: u32 = 3;
const QUEUE_CAPACITY: usize = 1024;

/// Console sink unless disabled, plus the rotating JSON audit log.
///
/// An audit log that cannot be opened is reported on stderr and skipped; the
/// node still runs with console output only.
pub async fn build_sinks(logging: Option<&LoggingConfig>) -> Vec<Arc<dyn LogSink>> {
    let mut sinks: Vec<Arc<dyn LogSink>> = Vec::new();

    if !logging.and_then(|l| l.disable_console).unwrap_or(false) {
        let level = logging.and_then(LoggingConfig::console_min_level);
        sinks.push(Arc::new(ConsoleSink::new(level)));
    }

    let path = logging
        .and_then(|l| l.json_path.clone())
        .unwrap_or_else(|| DEFAULT_AUDIT_LOG.into());
    let max_bytes = logging
        .and_then(|l| l.json_max_bytes)
        .unwrap_or(DEFAULT_AUDIT_MAX_BYTES);
    let backups = logging
        .and_then(|l| l.json_rotate)
        .unwrap_or(DEFAULT_AUDIT_BACKUPS);
    match JsonFileSink::new(&path, backups > 0, max_bytes as u64, backups).await {
        Ok(sink) => sinks.push(Arc::new(sink)),
        Err(e) => eprintln!("⚠️ audit log {} unavailable: {}", path, e),
    }
    sinks
}

/// Install the global dispatcher from `[logging]`. Later calls are no-ops.
pub async fn init_events_from_config(logging: Option<&LoggingConfig>) -> bool {
    init_events(build_sinks(logging).await, QUEUE_CAPACITY).await
}
