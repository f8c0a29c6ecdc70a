use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::{net::TcpListener, sync::Mutex};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use offerwatch_core::{
    DailySweepScanner, MemoryOfferStore, NewMemberAuditor, ProxySweepScanner,
    scan::{NewMemberValidator, OfferScanner},
    store::OfferStore,
};
use offerwatch_server::{
    AppState, create_app,
    infra::{
        config::Config,
        jobs::{JobRegistry, ScheduledJob},
        startup::Bootstrap,
    },
};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "offerwatch-server")]
#[command(about = "Offer-harvesting web service with supervised background scanning")]
struct Cli {
    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,

    /// Serve assets in development mode (ServeDir fallback)
    #[arg(long, default_value_t = false)]
    dev: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        Config::from_env().context("failed to load configuration")?;
    if let Some(port) = cli.port {
        config.server_port = port;
    }
    if let Some(host) = cli.host {
        config.server_host = host;
    }
    if cli.dev {
        config.dev_mode = true;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    // Focused defaults; override via RUST_LOG.
                    "info,http::access=info,jobs=info,bootstrap=info,scan=info,tower_http=warn"
                        .into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        sites = config.sites.len(),
        scan_interval_ms = config.scan_interval.as_millis() as u64,
        refresh_interval_ms = config.new_member_refresh.as_millis() as u64,
        dev_mode = config.dev_mode,
        "configuration in effect"
    );

    let store: Arc<dyn OfferStore> = Arc::new(MemoryOfferStore::new());
    let scanner_a: Arc<dyn OfferScanner> = Arc::new(
        DailySweepScanner::new(config.sites.clone(), Arc::clone(&store))
            .context("failed to build primary scanner")?,
    );
    let scanner_b: Arc<dyn OfferScanner> = Arc::new(
        ProxySweepScanner::new(config.sites.clone(), Arc::clone(&store))
            .context("failed to build redundant scanner")?,
    );
    let validator: Arc<dyn NewMemberValidator> = Arc::new(
        NewMemberAuditor::new(
            config.sites.clone(),
            Arc::clone(&store),
            config.new_member_max_age_chrono(),
        )
        .context("failed to build new-member validator")?,
    );

    let registry = Arc::new(JobRegistry::new());
    let bootstrap = Bootstrap::new(
        Arc::clone(&registry),
        scanner_a,
        scanner_b,
        validator,
        Arc::clone(&store),
        config.sites.clone(),
        config.scan_interval,
        config.new_member_refresh,
        config.job_timeout,
    );
    // Duplicate job names are a programming error; abort before binding.
    bootstrap
        .register_jobs()
        .context("job registration failed")?;

    let state = AppState::new(config.clone(), store, registry);
    let app = create_app(state);

    let listener =
        bind_listener(&config.server_host, config.server_port).await?;

    info!(
        "offerwatch listening on {}:{}",
        config.server_host, config.server_port
    );

    // Background startup runs after the bind-success line above and never
    // gates request serving.
    let job_handles: Arc<Mutex<Vec<ScheduledJob>>> =
        Arc::new(Mutex::new(Vec::new()));
    {
        let job_handles = Arc::clone(&job_handles);
        tokio::spawn(async move {
            let scheduled = bootstrap.start().await;
            job_handles.lock().await.extend(scheduled);
        });
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(job_handles))
        .await?;

    Ok(())
}

/// Binds the listen socket on the configured host, resolving hostnames.
async fn bind_listener(host: &str, port: u16) -> anyhow::Result<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .with_context(|| format!("failed to bind {host}:{port}"))
}

async fn shutdown_signal(job_handles: Arc<Mutex<Vec<ScheduledJob>>>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received, cancelling scheduled jobs");
    for job in job_handles.lock().await.drain(..) {
        job.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listener_binds_on_the_configured_host() {
        let listener = bind_listener("127.0.0.1", 0).await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }

    #[tokio::test]
    async fn unresolvable_host_is_a_bind_error() {
        let err = bind_listener("no-such-host.invalid", 0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no-such-host.invalid"));
    }
}
