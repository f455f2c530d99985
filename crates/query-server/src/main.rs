use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use common::config::AppConfig;
use query_server::{
    app,
    state::{AppState, load_index},
};
use tracing::info;

const PREVIEW_ROWS: usize = 5;
const PREVIEW_VALUES: usize = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).json().init();

    let config_path = std::env::var("IMGVEC_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("imgvec.toml"));
    let cfg = AppConfig::load(&config_path)?;

    let index = load_index(&PathBuf::from(&cfg.embedding_dir))?;
    info!(
        count = index.len(),
        dim = index.dim().unwrap_or(0),
        embedding_dir = %cfg.embedding_dir,
        "loaded embeddings"
    );
    for file in index.paths().iter().take(PREVIEW_ROWS) {
        if let Some(row) = index.row(file) {
            let head = &row[..row.len().min(PREVIEW_VALUES)];
            info!(file = %file, first_values = ?head, "embedding preview");
        }
    }

    let addr = build_bind_addr(&cfg.bind_host, cfg.port, allow_non_local_from_env())?;
    let state = AppState::from_config(&cfg, index)?;
    info!("query-server listening on http://{addr}");
    info!("Query endpoint: http://{addr}/query");
    info!("Upsert endpoint: http://{addr}/upsert");
    info!("Metrics endpoint: http://{addr}/metrics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown_state = state.clone();
    axum::serve(listener, app::router(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_state.begin_shutdown();
            info!("shutdown requested, draining connections");
        })
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate =
            signal(SignalKind::terminate()).expect("signal handler for SIGTERM should install");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn allow_non_local_from_env() -> bool {
    std::env::var("IMGVEC_ALLOW_NON_LOCAL")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn build_bind_addr(host: &str, port: u16, allow_non_local: bool) -> anyhow::Result<SocketAddr> {
    let ip = host.parse::<IpAddr>()?;

    if !ip.is_loopback() && !allow_non_local {
        anyhow::bail!(
            "non-local bind requested for {ip}, set IMGVEC_ALLOW_NON_LOCAL=true to opt in"
        );
    }

    Ok(SocketAddr::new(ip, port))
}

#[cfg(test)]
mod tests {
    use super::build_bind_addr;

    #[test]
    fn defaults_to_localhost() {
        let addr = build_bind_addr("127.0.0.1", 1234, false).expect("default bind addr");
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 1234);
    }

    #[test]
    fn rejects_non_local_without_opt_in() {
        let err = build_bind_addr("0.0.0.0", 1234, false).expect_err("expected rejection");
        assert!(err.to_string().contains("IMGVEC_ALLOW_NON_LOCAL=true"));
    }

    #[test]
    fn allows_any_address_with_opt_in() {
        let addr = build_bind_addr("0.0.0.0", 1234, true).expect("opt-in bind addr");
        assert!(addr.ip().is_unspecified());
    }
}
