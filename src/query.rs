use crate::day;
use crate::store::{Sample, SampleStore};
use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// One day's usage for a channel: the difference between the day's last and
/// first cumulative counters, clamped at zero. A counter that reset mid-day
/// (device reboot) would otherwise report a negative delta; retention does
/// not defend against resets, so the clamp lives here on the read side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DayUsage {
    pub day: NaiveDate,
    pub rx_bytes: i64,
    pub tx_bytes: i64,
}

/// Read-side facade over one router's store. Every call re-reads the store,
/// so results always reflect the latest committed inserts and trims.
#[derive(Clone)]
pub struct TrafficQuery {
    store: SampleStore,
}

impl TrafficQuery {
    pub fn new(store: SampleStore) -> Self {
        Self { store }
    }

    /// Channel names present in the store, lexicographically ordered.
    pub async fn channels(&self) -> Result<Vec<String>> {
        self.store.distinct_channels().await
    }

    /// Post-trim history of one channel, oldest first.
    pub async fn samples(&self, channel: &str) -> Result<Vec<Sample>> {
        self.store.all_samples(channel).await
    }

    /// Change notifications in commit order; await a change, then re-pull
    /// the snapshot of interest.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.store.watch()
    }

    /// Same signal as [`subscribe`](Self::subscribe) as a stream; yields the
    /// current version immediately, then once per committed mutation.
    pub fn updates(&self) -> WatchStream<u64> {
        WatchStream::new(self.store.watch())
    }

    /// Per-local-day usage of one channel, oldest day first.
    pub async fn daily_usage(&self, channel: &str) -> Result<Vec<DayUsage>> {
        let samples = self.store.all_samples(channel).await?;
        Ok(aggregate_daily(&samples))
    }
}

fn aggregate_daily(samples: &[Sample]) -> Vec<DayUsage> {
    let mut days: Vec<DayUsage> = Vec::new();
    let mut run: Option<(NaiveDate, &Sample, &Sample)> = None;

    for sample in samples {
        let Some(sample_day) = day::local_day(sample.ts) else {
            continue;
        };
        let same_day = matches!(&run, Some((current_day, _, _)) if *current_day == sample_day);
        if same_day {
            if let Some((_, _, last)) = run.as_mut() {
                *last = sample;
            }
        } else {
            if let Some(finished) = run.take() {
                days.push(usage_of(finished));
            }
            run = Some((sample_day, sample, sample));
        }
    }
    if let Some(finished) = run {
        days.push(usage_of(finished));
    }
    days
}

fn usage_of((day, first, last): (NaiveDate, &Sample, &Sample)) -> DayUsage {
    DayUsage {
        day,
        rx_bytes: (last.rx_bytes - first.rx_bytes).max(0),
        tx_bytes: (last.tx_bytes - first.tx_bytes).max(0),
    }
}
