use fiber_node::config::{NodeConfig, NodeIdSource};

fn node_config(dir: &std::path::Path) -> NodeConfig {
    NodeConfig {
        state_dir: Some(dir.to_string_lossy().into_owned()),
        ..NodeConfig::default()
    }
}

#[test]
fn explicit_id_wins() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = NodeConfig {
        id: Some("miner-07".into()),
        ..node_config(dir.path())
    };
    let resolved = cfg.resolve_node_id().unwrap();
    assert_eq!(resolved.id, "miner-07");
    assert_eq!(resolved.source, NodeIdSource::Configured);
    assert!(!dir.path().join("node_id").exists());
}

#[test]
fn generated_id_is_persisted_and_reused() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = node_config(dir.path());
    let first = cfg.resolve_node_id().unwrap();
    assert_eq!(first.source, NodeIdSource::Generated);
    assert!(uuid::Uuid::parse_str(&first.id).is_ok());
    let persisted = std::fs::read_to_string(dir.path().join("node_id")).unwrap();
    assert_eq!(persisted.trim(), first.id);

    let second = cfg.resolve_node_id().unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.source, NodeIdSource::Persisted);
}

#[test]
fn invalid_explicit_id_falls_back_to_persisted() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("node_id"), "persisted-id\n").unwrap();
    let cfg = NodeConfig {
        id: Some("has spaces/and slashes".into()),
        ..node_config(dir.path())
    };
    let resolved = cfg.resolve_node_id().unwrap();
    assert_eq!(resolved.id, "persisted-id");
    assert_eq!(resolved.source, NodeIdSource::Persisted);
}

#[test]
fn unwritable_state_dir_without_ephemeral_fails() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the state directory should be
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "x").unwrap();
    let cfg = NodeConfig {
        allow_ephemeral: Some(false),
        ..node_config(&blocker)
    };
    assert!(cfg.resolve_node_id().is_err());

    let cfg = NodeConfig {
        allow_ephemeral: Some(true),
        ..node_config(&blocker)
    };
    assert_eq!(cfg.resolve_node_id().unwrap().source, NodeIdSource::Ephemeral);
}
