//! Process-wide event queue.
//!
//! Emitters never block: `emit` does a `try_send` into a bounded channel and
//! counts what it could not enqueue. A single task drains the channel into
//! every sink in registration order.

use crate::events::model::{EventMeta, LogEvent, LogLevel};
use crate::events::sink::LogSink;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use uuid::Uuid;

static DISPATCHER: OnceCell<EventDispatcher> = OnceCell::new();

pub struct EventDispatcher {
    tx: mpsc::Sender<LogEvent>,
    capacity: usize,
    session_id: String,
    sinks: RwLock<Vec<Arc<dyn LogSink>>>,
    dropped: AtomicU64,
}

impl EventDispatcher {
    pub fn global() -> Option<&'static EventDispatcher> {
        DISPATCHER.get()
    }

    /// Identifier of this process run, stamped on every event.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn register_sink(&self, sink: Arc<dyn LogSink>) {
        self.sinks.write().push(sink);
    }

    /// Events lost because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn queued(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    /// Wait (bounded) for the queue to drain, then flush every sink.
    pub async fn drain_and_flush(&self, max_wait: Duration) {
        let deadline = tokio::time::Instant::now() + max_wait;
        while self.queued() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let sinks = self.sinks.read().clone();
        for sink in sinks {
            sink.flush().await;
        }
    }
}

/// Install the dispatcher and spawn its drain task. Returns `false` when one
/// is already installed; the sinks passed to a losing call are discarded.
pub async fn init_events(sinks: Vec<Arc<dyn LogSink>>, capacity: usize) -> bool {
    let capacity = capacity.max(1);
    let (tx, mut rx) = mpsc::channel::<LogEvent>(capacity);
    let dispatcher = EventDispatcher {
        tx,
        capacity,
        session_id: Uuid::new_v4().to_string(),
        sinks: RwLock::new(sinks),
        dropped: AtomicU64::new(0),
    };
    if DISPATCHER.set(dispatcher).is_err() {
        return false;
    }
    tokio::spawn(async move {
        while let Some(evt) = rx.recv().await {
            let Some(d) = EventDispatcher::global() else {
                continue;
            };
            let sinks = d.sinks.read().clone();
            for sink in sinks {
                sink.handle(&evt).await;
            }
        }
    });
    true
}

pub fn correlation_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

pub fn meta(component: &'static str, level: LogLevel) -> EventMeta {
    EventMeta {
        ts: SystemTime::now(),
        level,
        corr_id: None,
        session_id: EventDispatcher::global()
            .map(|d| d.session_id.clone())
            .unwrap_or_else(|| "unknown".into()),
        component,
        suppress_console: false,
    }
}

/// No-op until `init_events` has run.
pub fn emit(event: LogEvent) {
    if let Some(d) = EventDispatcher::global() {
        if d.tx.try_send(event).is_err() {
            d.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}
