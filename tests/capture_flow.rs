use anyhow::Result;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio_stream::StreamExt;
use traffic_recorder::capture::Recorder;
use traffic_recorder::day;
use traffic_recorder::query::TrafficQuery;
use traffic_recorder::retention;
use traffic_recorder::router::{CounterSource, FetchError, InterfaceCounters};
use traffic_recorder::store::registry::{StoreHandle, StoreRegistry};
use traffic_recorder::store::{NewSample, SampleStore};

struct ScriptedSource {
    batches: Mutex<VecDeque<Vec<InterfaceCounters>>>,
}

impl ScriptedSource {
    fn new(batches: Vec<Vec<InterfaceCounters>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
        }
    }
}

impl CounterSource for ScriptedSource {
    async fn fetch_counters(&self) -> Result<Vec<InterfaceCounters>, FetchError> {
        Ok(self
            .batches
            .lock()
            .expect("batch queue poisoned")
            .pop_front()
            .unwrap_or_default())
    }
}

struct FailingSource;

impl CounterSource for FailingSource {
    async fn fetch_counters(&self) -> Result<Vec<InterfaceCounters>, FetchError> {
        Err(FetchError::Status(reqwest::StatusCode::UNAUTHORIZED))
    }
}

fn iface(name: Option<&str>, rx: Option<u64>, tx: Option<u64>) -> InterfaceCounters {
    InterfaceCounters {
        name: name.map(str::to_string),
        rx_bytes: rx,
        tx_bytes: tx,
    }
}

async fn in_memory_recorder(max_per_day: usize) -> Result<(Recorder, SampleStore)> {
    let store = SampleStore::open_in_memory().await?;
    let recorder = Recorder::new(StoreHandle::new(store.clone()), max_per_day);
    Ok((recorder, store))
}

#[tokio::test]
async fn capture_stamps_one_timestamp_and_drops_nameless_entries() -> Result<()> {
    let (recorder, store) = in_memory_recorder(10).await?;
    let source = ScriptedSource::new(vec![vec![
        iface(Some("ether1"), Some(100), Some(200)),
        iface(None, Some(10), Some(20)),
        iface(Some("wlan1"), None, Some(500)),
    ]]);

    let outcome = recorder.capture_once(&source).await?;
    assert_eq!(outcome.inserted, 2);
    assert_eq!(outcome.trimmed, 0);

    assert_eq!(store.distinct_channels().await?, vec!["ether1", "wlan1"]);

    let ether = store.all_samples("ether1").await?;
    let wlan = store.all_samples("wlan1").await?;
    assert_eq!(ether.len(), 1);
    assert_eq!(wlan.len(), 1);
    assert_eq!(ether[0].rx_bytes, 100);
    assert_eq!(ether[0].tx_bytes, 200);
    // Missing counters read as zero.
    assert_eq!(wlan[0].rx_bytes, 0);
    assert_eq!(wlan[0].tx_bytes, 500);
    // The whole batch shares the capture instant.
    assert_eq!(ether[0].ts, wlan[0].ts);
    Ok(())
}

#[tokio::test]
async fn empty_fetch_is_a_silent_no_op() -> Result<()> {
    let (recorder, store) = in_memory_recorder(10).await?;
    let changes = store.watch();
    let source = ScriptedSource::new(vec![Vec::new()]);

    let outcome = recorder.capture_once(&source).await?;
    assert_eq!(outcome.inserted, 0);
    assert_eq!(outcome.trimmed, 0);
    assert!(store.distinct_channels().await?.is_empty());
    assert!(!changes.has_changed()?);
    Ok(())
}

#[tokio::test]
async fn fetch_failure_leaves_the_store_untouched() -> Result<()> {
    let (recorder, store) = in_memory_recorder(10).await?;
    let changes = store.watch();

    let err = recorder
        .capture_once(&FailingSource)
        .await
        .expect_err("fetch failure must propagate");
    assert!(format!("{err:#}").contains("401"));
    assert!(store.distinct_channels().await?.is_empty());
    assert!(!changes.has_changed()?);
    Ok(())
}

#[tokio::test]
async fn duplicate_rows_are_suppressed_by_the_store() -> Result<()> {
    let store = SampleStore::open_in_memory().await?;
    let rows = vec![
        NewSample {
            channel: "ether1".to_string(),
            rx_bytes: 100,
            tx_bytes: 200,
            ts: 1_700_000_000_000,
        },
        NewSample {
            channel: "wlan1".to_string(),
            rx_bytes: 0,
            tx_bytes: 500,
            ts: 1_700_000_000_000,
        },
    ];

    assert_eq!(store.insert_batch(&rows).await?, 2);
    assert_eq!(store.insert_batch(&rows).await?, 0);
    assert_eq!(store.all_samples("ether1").await?.len(), 1);
    assert_eq!(store.all_samples("wlan1").await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn deleting_absent_ids_is_a_no_op() -> Result<()> {
    let store = SampleStore::open_in_memory().await?;
    assert_eq!(store.delete_by_ids(&[]).await?, 0);
    assert_eq!(store.delete_by_ids(&[12_345, 67_890]).await?, 0);
    Ok(())
}

async fn seed_day(
    store: &SampleStore,
    channel: &str,
    base_ms: i64,
    minute_offsets: &[i64],
) -> Result<()> {
    let rows: Vec<NewSample> = minute_offsets
        .iter()
        .enumerate()
        .map(|(idx, offset)| NewSample {
            channel: channel.to_string(),
            rx_bytes: 1_000 + idx as i64 * 100,
            tx_bytes: 2_000 + idx as i64 * 100,
            ts: base_ms + offset * 60_000,
        })
        .collect();
    store.insert_batch(&rows).await?;
    Ok(())
}

#[tokio::test]
async fn hourly_day_trims_exactly_the_oldest_interior_sample() -> Result<()> {
    let store = SampleStore::open_in_memory().await?;
    let window = day::day_window(chrono::Local::now());
    let offsets: Vec<i64> = (0..=10).map(|h| h * 60).collect();
    seed_day(&store, "ether1", window.start_ms, &offsets).await?;

    let deleted = retention::trim_day(&store, "ether1", window, 10).await?;
    assert_eq!(deleted, 1);

    let kept = store.all_samples("ether1").await?;
    assert_eq!(kept.len(), 10);
    let kept_ts: Vec<i64> = kept.iter().map(|row| row.ts).collect();
    assert!(kept_ts.contains(&window.start_ms));
    assert!(kept_ts.contains(&(window.start_ms + 600 * 60_000)));
    assert!(!kept_ts.contains(&(window.start_ms + 60 * 60_000)));
    Ok(())
}

#[tokio::test]
async fn trimming_an_already_trimmed_day_deletes_nothing() -> Result<()> {
    let store = SampleStore::open_in_memory().await?;
    let window = day::day_window(chrono::Local::now());
    let offsets: Vec<i64> = (0..13).map(|i| i * 30).collect();
    seed_day(&store, "ether1", window.start_ms, &offsets).await?;

    assert_eq!(retention::trim_day(&store, "ether1", window, 10).await?, 3);
    assert_eq!(retention::trim_day(&store, "ether1", window, 10).await?, 0);
    assert_eq!(store.all_samples("ether1").await?.len(), 10);
    Ok(())
}

#[tokio::test]
async fn a_day_under_the_cap_is_untouched() -> Result<()> {
    let store = SampleStore::open_in_memory().await?;
    let window = day::day_window(chrono::Local::now());
    seed_day(&store, "ether1", window.start_ms, &[0, 60, 120]).await?;

    assert_eq!(retention::trim_day(&store, "ether1", window, 10).await?, 0);
    assert_eq!(store.all_samples("ether1").await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn cap_of_one_still_keeps_both_endpoints() -> Result<()> {
    let store = SampleStore::open_in_memory().await?;
    let window = day::day_window(chrono::Local::now());
    seed_day(&store, "ether1", window.start_ms, &[0, 10, 20, 30, 40]).await?;

    assert_eq!(retention::trim_day(&store, "ether1", window, 1).await?, 3);

    let kept = store.all_samples("ether1").await?;
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].ts, window.start_ms);
    assert_eq!(kept[1].ts, window.start_ms + 40 * 60_000);
    Ok(())
}

#[tokio::test]
async fn repeated_captures_keep_day_endpoints_and_cap() -> Result<()> {
    let captures = 12usize;
    let batches: Vec<Vec<InterfaceCounters>> = (0..captures)
        .map(|i| {
            vec![iface(
                Some("ether1"),
                Some(1_000 + i as u64 * 100),
                Some(2_000 + i as u64 * 100),
            )]
        })
        .collect();
    let source = ScriptedSource::new(batches);
    let (recorder, store) = in_memory_recorder(10).await?;

    let mut inserted = 0;
    for _ in 0..captures {
        inserted += recorder.capture_once(&source).await?.inserted;
    }
    assert_eq!(inserted, captures as u64);

    let samples = store.all_samples("ether1").await?;
    // Every local day stays at or under the cap.
    let mut per_day = std::collections::HashMap::new();
    for row in &samples {
        *per_day.entry(day::local_day(row.ts)).or_insert(0usize) += 1;
    }
    assert!(per_day.values().all(|count| *count <= 10));

    // The very first and very last observations survive all trims.
    let first = samples.first().expect("history not empty");
    let last = samples.last().expect("history not empty");
    assert_eq!(first.rx_bytes, 1_000);
    assert_eq!(last.rx_bytes, 1_000 + (captures as i64 - 1) * 100);
    Ok(())
}

#[tokio::test]
async fn registry_resolves_one_store_per_address() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let registry = StoreRegistry::new(dir.path());

    let first = registry.resolve("192.168.88.1").await?;
    let second = registry.resolve("192.168.88.1").await?;
    let other = registry.resolve("10.0.0.7:8443").await?;

    first
        .store()
        .insert_batch(&[NewSample {
            channel: "ether1".to_string(),
            rx_bytes: 1,
            tx_bytes: 2,
            ts: 1_700_000_000_000,
        }])
        .await?;

    // Same address shares one store; a different address gets its own.
    assert_eq!(second.store().all_samples("ether1").await?.len(), 1);
    assert!(other.store().all_samples("ether1").await?.is_empty());
    assert!(dir.path().join("192_168_88_1.db").exists());
    assert!(dir.path().join("10_0_0_7_8443.db").exists());
    Ok(())
}

#[tokio::test]
async fn update_stream_reflects_commits_in_order() -> Result<()> {
    let store = SampleStore::open_in_memory().await?;
    let query = TrafficQuery::new(store.clone());
    let mut updates = query.updates();
    let initial = updates.next().await.expect("initial version");

    let window = day::day_window(chrono::Local::now());
    seed_day(&store, "ether1", window.start_ms, &[0, 10, 20]).await?;
    let after_insert = updates.next().await.expect("insert version");
    assert!(after_insert > initial);

    let first_id = store.all_samples("ether1").await?[0].id;
    store.delete_by_ids(&[first_id]).await?;
    let after_delete = updates.next().await.expect("delete version");
    assert!(after_delete > after_insert);

    assert_eq!(query.samples("ether1").await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn query_facade_reflects_trims_immediately() -> Result<()> {
    let store = SampleStore::open_in_memory().await?;
    let query = TrafficQuery::new(store.clone());
    let window = day::day_window(chrono::Local::now());
    let offsets: Vec<i64> = (0..12).map(|i| i * 15).collect();
    seed_day(&store, "ether1", window.start_ms, &offsets).await?;

    assert_eq!(query.samples("ether1").await?.len(), 12);
    retention::trim_day(&store, "ether1", window, 10).await?;
    assert_eq!(query.samples("ether1").await?.len(), 10);
    assert_eq!(query.channels().await?, vec!["ether1"]);

    let usage = query.daily_usage("ether1").await?;
    assert_eq!(usage.len(), 1);
    // Endpoints survived the trim, so the daily delta is unchanged.
    assert_eq!(usage[0].rx_bytes, 1_100);
    assert_eq!(usage[0].tx_bytes, 1_100);
    Ok(())
}
