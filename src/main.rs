use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use tokio::signal;
use tracing::info;

mod api;
mod config;
mod diagnostics;
mod error;
mod filesystem;
mod health;
mod memory;
mod probe;
mod session;
mod state;

use config::Config;

/// Config path used when `ROOTLESS_PROBE_CONFIG` is not set.
const DEFAULT_CONFIG_PATH: &str = "/etc/rootless-probe/config.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // When invoked as a Docker HEALTHCHECK, hit /health and exit immediately.
    // This avoids needing any external tool (curl/wget) in the container image.
    if std::env::args().nth(1).as_deref() == Some("--healthcheck") {
        return healthcheck().await;
    }

    init_tracing();

    let config = load_config()?;

    info!(
        port = config.server.port,
        runtime_version = %config.runtime.version,
        memory_limit = %config.runtime.memory_limit,
        temp_dir = %config.filesystem.temp_dir.display(),
        sessions = config.session.enabled,
        "rootless-probe starting"
    );

    let config = Arc::new(config);
    let state = Arc::new(state::AppState::new(Arc::clone(&config)));

    let addr: SocketAddr = format!("0.0.0.0:{}", config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");

    let app = api::router(state)
        .layer(axum::middleware::from_fn(api::request_id::request_id_middleware))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO)),
        );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shut down");
    Ok(())
}

/// `RUST_LOG` wins over the built-in filter; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "rootless_probe=info,tower_http=warn".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// An explicit `ROOTLESS_PROBE_CONFIG` must load; the default path is optional.
fn load_config() -> anyhow::Result<Config> {
    match std::env::var("ROOTLESS_PROBE_CONFIG") {
        Ok(path) => {
            let path = PathBuf::from(path);
            Config::load(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))
        }
        Err(_) => {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            let config = Config::load_or_default(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            if !path.exists() {
                info!(path = %path.display(), "no config file, using defaults");
            }
            Ok(config)
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}

/// Lightweight healthcheck: GET /health and exit 0 on 2xx, 1 otherwise.
/// Invoked via `rootless-probe --healthcheck` from Docker HEALTHCHECK.
async fn healthcheck() -> anyhow::Result<()> {
    let port = std::env::var("ROOTLESS_PROBE_PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(8080);

    let healthy = probe_health(&format!("http://127.0.0.1:{port}")).await?;
    std::process::exit(if healthy { 0 } else { 1 });
}

/// `true` when `{base_url}/health` answers with a success status.
async fn probe_health(base_url: &str) -> anyhow::Result<bool> {
    let resp = reqwest::get(format!("{base_url}/health")).await?;
    Ok(resp.status().is_success())
}
