use std::time::SystemTime;

use fiber_node::events::{EventMeta, LogEvent, LogLevel, LogSink, JsonFileSink, SystemEvent};

fn event(i: usize) -> LogEvent {
    LogEvent::System(SystemEvent {
        meta: EventMeta {
            ts: SystemTime::now(),
            level: LogLevel::Info,
            corr_id: None,
            session_id: "test".into(),
            component: "json_sink_test",
            suppress_console: false,
        },
        action: format!("event_{i}"),
        detail: Some("x".repeat(64)),
    })
}

#[tokio::test]
async fn writes_one_json_object_per_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let sink = JsonFileSink::new(&path, false, 1024, 0).await.unwrap();
    for i in 0..3 {
        sink.handle(&event(i)).await;
    }
    sink.flush().await;

    let text = tokio::fs::read_to_string(&path).await.unwrap();
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["type"], "system");
    assert_eq!(lines[2]["action"], "event_2");
    assert_eq!(lines[1]["meta"]["level"], "info");
}

#[tokio::test]
async fn rotates_and_caps_backups() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let sink = JsonFileSink::new(&path, true, 256, 2).await.unwrap();
    for i in 0..30 {
        sink.handle(&event(i)).await;
        sink.flush().await;
    }

    assert!(path.exists());
    assert!(dir.path().join("audit.jsonl.1").exists());
    assert!(dir.path().join("audit.jsonl.2").exists());
    assert!(!dir.path().join("audit.jsonl.3").exists());

    let current = tokio::fs::read_to_string(&path).await.unwrap();
    assert!(current.contains("event_29"));
    for line in current.lines() {
        serde_json::from_str::<serde_json::Value>(line).unwrap();
    }
}
