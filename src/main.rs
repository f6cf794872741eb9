//! Entry point for the `smoker-sentinel` consumer.
//!
//! One process watches one signal:
//! - Load configuration from environment variables or `.env`
//! - Initialize structured logging/tracing
//! - Build the evaluator and notifier for the configured signal
//! - Connect to the broker, subscribe to the signal's durable queue and
//!   consume until interrupted
//!
//! # Exit status
//! - `0` after CTRL+C / SIGTERM, once the connection is closed
//! - `1` on invalid configuration, an unreachable broker, a transport failure
//!   or a subscription ended by the broker
//!
//! Startup does not retry; a supervisor is expected to restart the process.
use std::process::ExitCode;

use anyhow::Result;
use dotenvy::dotenv;
use tracing::{error, info, warn};

use smoker_sentinel::{
    broker::AmqpBroker, config, logging::init_tracing, notify::build_notifier, AlertEvaluator,
    Consumer, Stopped,
};

// ---

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // ---
    dotenv().ok();
    init_tracing();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    // ---
    let cfg = config::load_from_env()?;
    cfg.log_config();

    let notifier = build_notifier(&cfg.notifier, cfg.notify_timeout)?;
    let evaluator = AlertEvaluator::from_settings(&cfg.rules);
    let mut consumer = Consumer::new(evaluator, notifier, cfg.notify_timeout);

    let broker = consumer
        .connect(&cfg.broker.host, AmqpBroker::connect(&cfg.broker))
        .await?;
    let mut source = consumer.subscribe(broker, &cfg.queue).await?;

    info!("To exit press CTRL+C");
    match consumer.run(&mut source, shutdown_signal()).await? {
        Stopped::Interrupted => {
            info!("Closing connection. Goodbye.");
            Ok(ExitCode::SUCCESS)
        }
        Stopped::SourceClosed => Ok(ExitCode::FAILURE),
    }
}

/// Resolves on CTRL+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    // ---
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for CTRL+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
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
}
