use crate::day::DayWindow;
use crate::store::{Sample, SampleStore};
use anyhow::Result;

/// Ids of the samples a day window holds beyond its cap.
///
/// `day_rows` must be one channel's samples for one day, oldest first. The
/// chronologically first and last rows are never candidates; the surplus is
/// taken from the oldest interior rows, which keeps the most recent intraday
/// shape while `last - first` stays exact. A cap below 2 empties the interior
/// but still leaves both endpoints.
pub fn surplus_sample_ids(day_rows: &[Sample], max_per_day: usize) -> Vec<i64> {
    if day_rows.len() <= max_per_day || day_rows.len() < 3 {
        return Vec::new();
    }
    let interior = &day_rows[1..day_rows.len() - 1];
    let allowed_interior = max_per_day.saturating_sub(2);
    if interior.len() <= allowed_interior {
        return Vec::new();
    }
    let surplus = interior.len() - allowed_interior;
    interior[..surplus].iter().map(|row| row.id).collect()
}

/// Loads one (channel, day) window and deletes its surplus rows. Returns the
/// number of rows deleted; a day at or under the cap is left untouched.
pub async fn trim_day(
    store: &SampleStore,
    channel: &str,
    window: DayWindow,
    max_per_day: usize,
) -> Result<u64> {
    let day_rows = store
        .samples_in_range(channel, window.start_ms, window.end_ms)
        .await?;
    let surplus = surplus_sample_ids(&day_rows, max_per_day);
    if surplus.is_empty() {
        return Ok(0);
    }
    let deleted = store.delete_by_ids(&surplus).await?;
    tracing::debug!(
        channel,
        deleted,
        kept = day_rows.len() as u64 - deleted,
        "trimmed day window"
    );
    Ok(deleted)
}
