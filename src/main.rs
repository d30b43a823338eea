// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use banwarden::adapters::lapi::LapiAdapter;
use banwarden::adapters::siem::SiemAdapter;
use banwarden::config::Config;
use banwarden::metrics::Metrics;
use banwarden::metrics_server;
use banwarden::reconciler::Reconciler;
use banwarden::sinks::cluster::ClusterIpSetSink;
use banwarden::sinks::local::LocalFilterSink;

#[derive(Parser, Debug)]
#[command(name = "banwarden", about = "Dual-plane IP ban reconciler")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "banwarden.toml")]
    config: PathBuf,

    /// Override the configured log filter directive (e.g. "debug").
    #[arg(long)]
    log_filter: Option<String>,

    /// Repeatable verbosity flag; each occurrence raises the default
    /// filter by one level when `--log-filter` is not set.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(directive: &str, verbose: u8) {
    let directive = match verbose {
        0 => directive.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;

    let log_directive = args
        .log_filter
        .clone()
        .unwrap_or_else(|| config.log_filter.clone());
    init_tracing(&log_directive, args.verbose);

    let config = Arc::new(config);
    let metrics = Arc::new(Metrics::new());

    let lapi = config.lapi.as_ref().map(LapiAdapter::new);
    let siem = config.siem.as_ref().map(SiemAdapter::new);
    let cluster = ClusterIpSetSink::new(&config.cluster);
    let local = match &config.local {
        Some(local_cfg) => Some(LocalFilterSink::new(local_cfg).await?),
        None => None,
    };

    let running = Arc::new(AtomicBool::new(true));
    let mut reconciler = Reconciler::new(
        Arc::clone(&config),
        Arc::clone(&metrics),
        lapi,
        siem,
        cluster,
        local,
        Arc::clone(&running),
    );

    reconciler.test_connections().await?;
    info!("banwarden starting up");

    let metrics_addr = config.metrics_endpoint;
    let metrics_for_server = Arc::clone(&metrics);

    // The reconciler loop runs on its own task so that a shutdown signal
    // can flip `running` and then wait for the current tick's 1-second
    // quantum to observe it, rather than dropping the loop mid-tick the
    // instant the select below resolves.
    let reconciler_task = tokio::spawn(async move {
        reconciler.run().await;
    });

    tokio::select! {
        result = metrics_server::serve(metrics_addr, metrics_for_server) => {
            if let Err(e) = result {
                error!(error = %e, "metrics server exited");
            }
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    running.store(false, Ordering::SeqCst);
    if let Err(e) = reconciler_task.await {
        error!(error = %e, "reconciler task panicked");
    }
    info!("banwarden shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
