//! Entry point for `smoker-producer`: replays a smoker CSV export into the
//! three signal queues at a fixed cadence, then exits.
//!
//! Configuration comes from `PRODUCER_CSV`, `PRODUCER_QUEUES`, `CADENCE_SECS`
//! and the `BROKER_*` variables (see `config::load_producer_from_env`).
use std::{fs::File, process::ExitCode};

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tracing::{error, info, warn};

use smoker_sentinel::{
    broker::{AmqpBroker, MessageSink},
    config,
    logging::init_tracing,
    producer,
};

// ---

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // ---
    dotenv().ok();
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    // ---
    let cfg = config::load_producer_from_env()?;
    cfg.log_config();

    let input = File::open(&cfg.csv_path)
        .with_context(|| format!("opening {}", cfg.csv_path.display()))?;

    let broker = AmqpBroker::connect(&cfg.broker)
        .await
        .with_context(|| format!("verify the server is running on host={}", cfg.broker.host))?;
    let mut sink = broker.into_sink().await?;

    let result = tokio::select! {
        result = producer::replay(&mut sink, input, &cfg.queues, cfg.cadence) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; stopping replay");
            Ok(Default::default())
        }
    };

    if let Err(e) = sink.close().await {
        warn!(error = %e, "Closing connection failed");
    }

    let summary = result?;
    info!(
        rows = summary.rows,
        published = summary.published,
        skipped_rows = summary.skipped_rows,
        "Replay finished"
    );
    Ok(())
}
