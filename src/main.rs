use anyhow::Context;
use clap::Parser;
use std::fs;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

use fiber_node::{
    backend::build_backend,
    config::{BackendSettings, Config, NodeIdSource},
    constants::*,
    emit_system_event,
    events::{self, model::LogLevel, EventDispatcher},
    network::{router, serve, AppState, HeaderPeerResolver},
    FiberNode,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Fiber responder node")]
struct Args {
    /// Path to config file (TOML)
    #[arg(short, long, env = "FIBER_NODE_CONFIG", default_value = "config.toml")]
    config: String,

    /// Override [server].port
    #[arg(long)]
    port: Option<u16>,

    /// Override [server].host
    #[arg(long)]
    host: Option<String>,
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let cfg = Config::from_toml_str(&content)
                .with_context(|| format!("failed to parse config file '{}'", path))?;
            println!("{}Loaded config from: {}", ICON_PLACEHOLDER, path);
            Ok(cfg)
        }
        Err(_) => {
            println!(
                "⚠️ No config file found at '{}', falling back to default config.",
                path
            );
            Ok(Config::default())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = load_config(&args.config)?;

    let mut server = config.server.clone().unwrap_or_default();
    if let Some(port) = args.port {
        server.port = Some(port);
    }
    if let Some(host) = args.host {
        server.host = Some(host);
    }
    config.server = Some(server);

    // Events come up after config so the configured log path applies
    events::init_events_from_config(config.logging.as_ref()).await;

    let resolved = config
        .node
        .clone()
        .unwrap_or_default()
        .resolve_node_id()?;
    if resolved.source == NodeIdSource::Ephemeral {
        emit_system_event!(
            "node",
            LogLevel::Warn,
            "node_id_ephemeral",
            Some("node id could not be persisted; it will change on restart".to_string())
        );
    }
    let node_id = resolved.id;
    let app_name = config
        .app_name
        .clone()
        .unwrap_or_else(|| DEFAULT_APP_NAME.to_string());
    emit_system_event!(
        "node",
        LogLevel::Info,
        "startup",
        Some(format!(
            "app={} version={} node_id={} ({})",
            app_name,
            full_version(),
            short_id(&node_id),
            resolved.source.as_str()
        ))
    );

    let backend = build_backend(&BackendSettings::from_config(&config));
    let node = Arc::new(FiberNode::from_config(&config, node_id, backend));
    emit_system_event!(
        "node",
        LogLevel::Info,
        "identity_generated",
        Some(format!(
            "algorithm={} fingerprint={}",
            KEY_TRANSPORT_ALGORITHM,
            node.identity().fingerprint()
        ))
    );
    let background = node.spawn_background();

    let state = AppState {
        node: node.clone(),
        resolver: Arc::new(HeaderPeerResolver::default()),
    };
    let app = router(state, config.max_body_bytes());
    let bind = config.bind_addr();
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;

    let result = serve(listener, app, async {
        if let Err(e) = signal::ctrl_c().await {
            eprintln!("❌ Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await;

    background.abort();
    emit_system_event!(
        "node",
        LogLevel::Info,
        "shutdown",
        Some(format!("sessions_dropped={}", node.store().len()))
    );
    if let Some(d) = EventDispatcher::global() {
        d.drain_and_flush(std::time::Duration::from_secs(2)).await;
        if d.dropped() > 0 {
            eprintln!("⚠️ {} events dropped (queue full)", d.dropped());
        }
    }
    result
}
