// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Host process for the telemetry reliability relay.
//!
//! Wires the cardinality limiter, priority queue, durable spill store and
//! dispatcher into one pipeline, exposes a JSON ingest endpoint and exports
//! batches upstream over HTTP.
//!
//! Exit codes: 0 after a graceful shutdown, 1 on configuration errors, 2 on
//! fatal I/O during startup.

mod http;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use nrdq_config::RelayConfig;
use nrdq_engine::{Error as EngineError, Pipeline, RelayMetrics};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const EXIT_CONFIG: u8 = 1;
const EXIT_STARTUP_IO: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "nrdqd", about = "Telemetry reliability relay")]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(long)]
    config: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = match RelayConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, config = %args.config.display(), "invalid configuration");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to build runtime");
            return ExitCode::from(EXIT_STARTUP_IO);
        }
    };
    runtime.block_on(run(config))
}

async fn run(config: RelayConfig) -> ExitCode {
    let exporter = match http::HttpExporter::new(&config.exporter) {
        Ok(exporter) => Arc::new(exporter),
        Err(e) => {
            error!(error = %e, "failed to build exporter transport");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let metrics = RelayMetrics::default();
    let pipeline = match Pipeline::build(&config, exporter, metrics) {
        Ok(pipeline) => Arc::new(pipeline),
        Err(EngineError::Store(e)) => {
            error!(error = %e, "spill store unavailable");
            return ExitCode::from(EXIT_STARTUP_IO);
        }
        Err(e) => {
            error!(error = %e, "failed to build pipeline");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    pipeline.start();

    let listener = match tokio::net::TcpListener::bind(&config.ingest.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, listen = %config.ingest.listen, "failed to bind ingest endpoint");
            return ExitCode::from(EXIT_STARTUP_IO);
        }
    };
    info!(listen = %config.ingest.listen, upstream = %config.exporter.endpoint, "relay ready");

    let router = http::ingest_router(Arc::clone(&pipeline));
    let server = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal());
    if let Err(e) = server.await {
        error!(error = %e, "ingest server failed");
    }

    info!("shutting down");
    if let Err(e) = pipeline.shutdown().await {
        error!(error = %e, "shutdown did not complete cleanly");
        return ExitCode::from(EXIT_STARTUP_IO);
    }
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                let _ = signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
