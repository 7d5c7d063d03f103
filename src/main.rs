use anyhow::Context;
use belgic::config::{check_config_path, Config, CONFIG_ENV};
use belgic::supervisor::Supervisor;
use tracing::{error, info, warn};

const PKG_NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

const USAGE: &str = "usage: belgic [start | config <directory>]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("belgic=debug".parse().expect("valid log directive")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("start") => start().await,
        Some("config") => create_config(args.get(1).map(String::as_str).unwrap_or("")),
        Some(other) => anyhow::bail!("unknown command '{}'\n{}", other, USAGE),
    }
}

/// Write a default `belgic.json` into `dir`
fn create_config(dir: &str) -> anyhow::Result<()> {
    check_config_path(dir)?;
    let file = Config::create(dir).with_context(|| format!("creating config in {}", dir))?;
    info!(path = %file.display(), "Default configuration written");
    println!("Set {}={} to use it", CONFIG_ENV, file.display());
    Ok(())
}

async fn start() -> anyhow::Result<()> {
    let config = Config::load().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!(
        name = PKG_NAME,
        version = VERSION,
        path = %config.path,
        port = %config.port,
        backends = %config.backends,
        attempts = config.attempts,
        "Starting supervisor"
    );

    let supervisor = Supervisor::new(&config)?;
    let monitors = supervisor
        .start()
        .await
        .context("failed to launch backends")?;

    for url in supervisor.urls() {
        info!(%url, "Backend published");
    }

    // Report children that die; nothing restarts them
    for mut monitor in monitors {
        tokio::spawn(async move {
            let status = monitor.finished().await;
            warn!(port = monitor.port(), ?status, "Backend process is no longer running");
        });
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down (backend processes are left running)");

    Ok(())
}
