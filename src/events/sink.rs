use crate::{
    constants::ICON_PLACEHOLDER,
    events::model::{LogEvent, LogLevel},
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[async_trait]
pub trait LogSink: Send + Sync {
    async fn handle(&self, event: &LogEvent);
    async fn flush(&self) {}
}

pub struct ConsoleSink {
    level_filter: Option<LogLevel>,
}

impl ConsoleSink {
    pub fn new(level_filter: Option<LogLevel>) -> Self {
        Self { level_filter }
    }
}

fn level_rank(level: LogLevel) -> u8 {
    match level {
        LogLevel::Trace => 0,
        LogLevel::Debug => 1,
        LogLevel::Info => 2,
        LogLevel::Warn => 3,
        LogLevel::Error => 4,
    }
}

fn level_icon(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Warn => "⚠️ ",
        LogLevel::Error => "❌ ",
        _ => ICON_PLACEHOLDER,
    }
}

#[async_trait]
impl LogSink for ConsoleSink {
    async fn handle(&self, event: &LogEvent) {
        let meta = event.meta();
        if meta.suppress_console {
            return;
        }
        if let Some(min) = self.level_filter {
            if level_rank(meta.level) < level_rank(min) {
                return;
            }
        }
        let icon = level_icon(meta.level);
        match event {
            LogEvent::Handshake(h) => {
                println!(
                    "{}HANDSHAKE peer={} key={:?} outcome={:?} replaced={} reason={} corr={:?}",
                    icon, h.peer, h.key_id, h.outcome, h.replaced_existing, h.reason, h.meta.corr_id
                );
            }
            LogEvent::Session(s) => {
                println!(
                    "{}SESSION action={} peer={:?} detail={:?}",
                    icon, s.action, s.peer, s.detail
                );
            }
            LogEvent::Admission(a) => {
                println!(
                    "{}ADMISSION gate={:?} action={} in_flight={}/{} rejected_total={}",
                    icon, a.gate, a.action, a.in_flight, a.limit, a.rejected_total
                );
            }
            LogEvent::Readiness(r) => {
                println!(
                    "{}READINESS {} -> {} detail={:?}",
                    icon, r.from, r.to, r.detail
                );
            }
            LogEvent::Challenge(c) => {
                println!(
                    "{}CHALLENGE peer={} action={} key={:?} elapsed_ms={:?} detail={:?} corr={:?}",
                    icon, c.peer, c.action, c.key_id, c.elapsed_ms, c.detail, c.meta.corr_id
                );
            }
            LogEvent::Network(n) => {
                println!(
                    "{}NET action={} addr={:?} detail={:?}",
                    icon, n.action, n.addr, n.detail
                );
            }
            LogEvent::System(s) => {
                println!("{}SYS action={} detail={:?}", icon, s.action, s.detail);
            }
        }
    }
}

/// Appends one JSON object per line to `path`. When `rotate` is set and the
/// file reaches `max_size_bytes`, it is shifted to `path.1` (then `.2`, ...)
/// and at most `max_backups` old files are kept.
pub struct JsonFileSink {
    path: PathBuf,
    rotate: bool,
    max_size_bytes: u64,
    max_backups: u32,
    state: Mutex<JsonFileState>,
}

struct JsonFileState {
    file: tokio::fs::File,
    written: u64,
}

impl JsonFileSink {
    pub async fn new<P: Into<PathBuf>>(
        path: P,
        rotate: bool,
        max_size_bytes: u64,
        max_backups: u32,
    ) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = open_append(&path).await?;
        let written = file.metadata().await.map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            path,
            rotate: rotate && max_backups > 0,
            max_size_bytes: max_size_bytes.max(1),
            max_backups,
            state: Mutex::new(JsonFileState { file, written }),
        })
    }

    fn backup_path(&self, idx: u32) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{idx}"));
        PathBuf::from(name)
    }

    async fn shift_backups(&self, state: &mut JsonFileState) -> std::io::Result<()> {
        state.file.flush().await?;
        let _ = tokio::fs::remove_file(self.backup_path(self.max_backups)).await;
        for idx in (1..self.max_backups).rev() {
            let from = self.backup_path(idx);
            if tokio::fs::metadata(&from).await.is_ok() {
                tokio::fs::rename(&from, self.backup_path(idx + 1)).await?;
            }
        }
        tokio::fs::rename(&self.path, self.backup_path(1)).await?;
        state.file = open_append(&self.path).await?;
        state.written = 0;
        Ok(())
    }
}

async fn open_append(path: &Path) -> std::io::Result<tokio::fs::File> {
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
}

#[async_trait]
impl LogSink for JsonFileSink {
    async fn handle(&self, event: &LogEvent) {
        let Ok(mut line) = serde_json::to_string(event) else {
            return;
        };
        line.push('\n');
        let mut state = self.state.lock().await;
        if self.rotate && state.written >= self.max_size_bytes {
            if let Err(e) = self.shift_backups(&mut state).await {
                eprintln!("⚠️ audit log rotation failed: {}", e);
            }
        }
        if state.file.write_all(line.as_bytes()).await.is_ok() {
            state.written += line.len() as u64;
        }
    }

    async fn flush(&self) {
        let mut state = self.state.lock().await;
        let _ = state.file.flush().await;
        let _ = state.file.sync_all().await;
    }
}
