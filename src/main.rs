// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{process::ExitCode, sync::Arc};

use relational_identity::{
    api::router,
    app::{self, StartupError},
    config::{Config, LogFormat, DEFAULT_LOG_FILTER},
    state::AppState,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            // Logging is not up yet.
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(config.log_format);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Relational Identity server failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

async fn run(config: Config) -> Result<(), StartupError> {
    info!(?config, "Starting Relational Identity");

    let service = Arc::new(app::build_service(&config)?);
    app::seed_owner(&service, &config).await?;

    let app = router(AppState::new(service));

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Relational Identity listening (docs at /docs)");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown signal received, draining connections");
                    shutdown.cancel();
                }
                Err(e) => warn!(error = %e, "Could not listen for shutdown signal"),
            }
        }
    });

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Server stopped");
    Ok(())
}
