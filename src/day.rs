use chrono::{DateTime, Duration as ChronoDuration, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

pub const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Inclusive local-calendar day span in epoch milliseconds, midnight to
/// midnight minus one millisecond.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DayWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl DayWindow {
    pub fn contains(&self, ts_ms: i64) -> bool {
        ts_ms >= self.start_ms && ts_ms <= self.end_ms
    }
}

/// Day window of the local calendar day containing `instant`.
pub fn day_window(instant: DateTime<Local>) -> DayWindow {
    let midnight = instant.date_naive().and_time(NaiveTime::MIN);
    let start = match Local.from_local_datetime(&midnight) {
        LocalResult::Single(dt) => dt,
        // DST fold: the earlier instant is the start of the calendar day.
        LocalResult::Ambiguous(earlier, _) => earlier,
        LocalResult::None => first_valid_after(midnight),
    };
    let start_ms = start.timestamp_millis();
    DayWindow {
        start_ms,
        end_ms: start_ms + MS_PER_DAY - 1,
    }
}

// Some timezones skip midnight on DST transition days; walk forward to the
// first wall-clock time that exists.
fn first_valid_after(naive: NaiveDateTime) -> DateTime<Local> {
    for minutes in 1..=180 {
        match Local.from_local_datetime(&(naive + ChronoDuration::minutes(minutes))) {
            LocalResult::Single(dt) => return dt,
            LocalResult::Ambiguous(earlier, _) => return earlier,
            LocalResult::None => continue,
        }
    }
    Utc.from_utc_datetime(&naive).with_timezone(&Local)
}

/// Local calendar date a stored timestamp falls on. `None` only for
/// timestamps outside chrono's representable range.
pub fn local_day(ts_ms: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp_millis(ts_ms)
        .map(|utc| utc.with_timezone(&Local).date_naive())
}
