//! Replays a smart-smoker CSV export into the three signal queues.
//!
//! Expected columns: timestamp, smoker, food A, food B, with one header row.
//! Each row becomes three `"<timestamp>,<value>"` messages, one per queue,
//! followed by a pause of one cadence.

use std::{io::Read, time::Duration};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{broker::MessageSink, models::NO_TEMPERATURE};

// ---

/// One CSV row split into per-queue wire messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayRow {
    // ---
    pub timestamp: String,
    /// Smoker, Food A, Food B.
    pub messages: [String; 3],
}

/// Totals reported once a replay finishes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    // ---
    pub rows: usize,
    pub published: usize,
    pub skipped_rows: usize,
}

/// Read all rows, skipping (and logging) malformed ones.
pub fn read_rows<R: Read>(input: R) -> (Vec<ReplayRow>, usize) {
    // ---
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut rows = Vec::new();
    let mut skipped = 0;
    for (index, record) in reader.records().enumerate() {
        let line = index + 2;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(line, error = %e, "Skipping unreadable CSV row");
                skipped += 1;
                continue;
            }
        };
        if record.len() != 4 {
            warn!(line, fields = record.len(), "Skipping CSV row without 4 columns");
            skipped += 1;
            continue;
        }

        let timestamp = record[0].to_string();
        let message = |i: usize| {
            let value = if record[i].is_empty() { NO_TEMPERATURE } else { &record[i] };
            format!("{timestamp},{value}")
        };
        rows.push(ReplayRow {
            messages: [message(1), message(2), message(3)],
            timestamp,
        });
    }
    (rows, skipped)
}

/// Reset the three queues, then publish every row at `cadence`.
pub async fn replay<K: MessageSink>(
    sink: &mut K,
    input: impl Read,
    queues: &[String; 3],
    cadence: Duration,
) -> Result<ReplaySummary> {
    // ---
    for queue in queues {
        sink.reset_queue(queue)
            .await
            .with_context(|| format!("resetting queue {queue}"))?;
    }
    info!(queues = ?queues, "Queues reset");

    let (rows, skipped_rows) = read_rows(input);
    let mut summary = ReplaySummary {
        skipped_rows,
        ..Default::default()
    };

    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(cadence).await;
        }
        for (queue, message) in queues.iter().zip(&row.messages) {
            sink.publish(queue, message.as_bytes())
                .await
                .with_context(|| format!("publishing to {queue}"))?;
            info!(queue = %queue, message = %message, "Sent");
            summary.published += 1;
        }
        summary.rows += 1;
    }

    Ok(summary)
}
