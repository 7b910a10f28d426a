use crate::day;
use crate::retention;
use crate::router::CounterSource;
use crate::store::registry::StoreHandle;
use crate::store::NewSample;
use anyhow::{Context, Result};
use chrono::{Local, Utc};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureOutcome {
    pub inserted: u64,
    pub trimmed: u64,
}

/// Runs insert-then-trim capture cycles against one router's store.
#[derive(Clone)]
pub struct Recorder {
    handle: StoreHandle,
    max_per_day: usize,
}

impl Recorder {
    pub fn new(handle: StoreHandle, max_per_day: usize) -> Self {
        Self {
            handle,
            max_per_day,
        }
    }

    /// One capture: fetch current counters, stamp them with a single shared
    /// "now", persist, then trim today's window for each channel seen in the
    /// batch. Nothing is written when the fetch fails or comes back empty,
    /// and a failed insert skips the trim pass entirely.
    pub async fn capture_once<S: CounterSource>(&self, source: &S) -> Result<CaptureOutcome> {
        let counters = source
            .fetch_counters()
            .await
            .context("failed to fetch interface counters")?;

        let now = Utc::now();
        let now_ms = now.timestamp_millis();
        let rows: Vec<NewSample> = counters
            .into_iter()
            .filter_map(|entry| {
                let name = entry.name?.trim().to_string();
                if name.is_empty() {
                    return None;
                }
                Some(NewSample {
                    channel: name,
                    rx_bytes: entry.rx_bytes.unwrap_or(0) as i64,
                    tx_bytes: entry.tx_bytes.unwrap_or(0) as i64,
                    ts: now_ms,
                })
            })
            .collect();

        if rows.is_empty() {
            tracing::debug!("counter source returned no named interfaces; skipping capture");
            return Ok(CaptureOutcome::default());
        }

        let window = day::day_window(now.with_timezone(&Local));
        let mut channels: Vec<&str> = rows.iter().map(|row| row.channel.as_str()).collect();
        channels.sort_unstable();
        channels.dedup();

        // Serializes whole capture-and-trim cycles per store; concurrent
        // trims over one day window would double-count the surplus.
        let _gate = self.handle.capture_gate().lock().await;

        let store = self.handle.store();
        let inserted = store
            .insert_batch(&rows)
            .await
            .context("failed to persist captured samples")?;

        let mut trimmed = 0u64;
        for channel in channels {
            trimmed += retention::trim_day(store, channel, window, self.max_per_day)
                .await
                .with_context(|| format!("failed to trim channel {channel}"))?;
        }

        tracing::debug!(inserted, trimmed, ts = now_ms, "capture cycle complete");
        Ok(CaptureOutcome { inserted, trimmed })
    }
}
