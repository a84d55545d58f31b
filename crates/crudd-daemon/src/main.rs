// SPDX-License-Identifier: MIT OR Apache-2.0
use anyhow::{Context, Result};
use clap::Parser;
use crudd_config::{DashboardConfig, config_schema, load_config, merge_configs, validate_config};
use crudd_daemon::{AppState, build_app};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "crudd",
    version,
    about = "CRUDD diagnostics dashboard: streams local system commands over HTTP"
)]
struct Args {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address (default 0.0.0.0:4901).
    #[arg(long)]
    bind: Option<String>,

    /// Fake filesystem root prepended to every command path (testing only).
    #[arg(long, alias = "test_fs_root")]
    fs_root: Option<PathBuf>,

    /// Log every line streamed to a client.
    #[arg(long)]
    verbose: bool,

    /// Seconds a command may take to exit after drain or cancellation.
    #[arg(long)]
    grace_period_secs: Option<u64>,

    /// Hard deadline for a single command request, in seconds.
    #[arg(long)]
    request_timeout_secs: Option<u64>,

    /// Print the configuration JSON schema and exit.
    #[arg(long)]
    print_config_schema: bool,
}

impl Args {
    /// Command-line values as a config overlay.
    fn overlay(&self) -> DashboardConfig {
        DashboardConfig {
            bind: self.bind.clone(),
            fs_root: self
                .fs_root
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            verbose: self.verbose.then_some(true),
            grace_period_secs: self.grace_period_secs,
            request_timeout_secs: self.request_timeout_secs,
            ..DashboardConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config_schema {
        println!("{}", serde_json::to_string_pretty(&config_schema())?);
        return Ok(());
    }

    let file_config = load_config(args.config.as_deref()).context("load config")?;
    let config = merge_configs(file_config, args.overlay());
    let warnings = validate_config(&config).context("invalid configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("crudd={}", config.log_level())));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    for warning in &warnings {
        warn!(target: "crudd.config", "{warning}");
    }

    info!("CRUDD is starting up");
    let state = AppState::from_config(&config).context("build command catalog")?;
    let app = build_app(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(config.bind())
        .await
        .with_context(|| format!("bind {}", config.bind()))?;
    let addr = listener.local_addr().context("resolve bound address")?;
    info!("CRUDD is ready to handle requests at {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("serve")?;

    info!("CRUDD has been shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("CRUDD is shutting down");
}
