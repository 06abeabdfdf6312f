use anyhow::{Context, Result};
use botfleet_api::config::Args;
use botfleet_api::create_app;
use botfleet_core::JsonFileStore;
use botfleet_supervisor::{OsLauncher, Supervisor};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    let store = JsonFileStore::new(&args.state_file);
    info!(state_file = %store.path().display(), "loading instance store");

    let supervisor = Arc::new(
        Supervisor::boot(args.supervisor_config(), Arc::new(store), Arc::new(OsLauncher)).await?,
    );

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    info!(addr = %args.listen, "botfleet listening");

    axum::serve(listener, create_app(supervisor.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    supervisor.shutdown().await;
    info!("botfleet stopped");
    Ok(())
}

fn init_tracing(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown requested");
}
