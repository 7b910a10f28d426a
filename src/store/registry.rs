use super::SampleStore;
use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A store plus the lock that serializes capture-and-trim cycles against it.
/// Clones share both, so every resolver of the same router address contends
/// on the same gate.
#[derive(Clone)]
pub struct StoreHandle {
    store: SampleStore,
    capture_gate: Arc<Mutex<()>>,
}

impl StoreHandle {
    pub fn new(store: SampleStore) -> Self {
        Self {
            store,
            capture_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    pub fn capture_gate(&self) -> &Mutex<()> {
        &self.capture_gate
    }
}

/// Resolves router addresses to their on-disk stores. Each router gets its
/// own database file; the same address always resolves to the same handle
/// until it is explicitly invalidated.
pub struct StoreRegistry {
    data_dir: PathBuf,
    entries: Mutex<HashMap<String, StoreHandle>>,
}

impl StoreRegistry {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn resolve(&self, router_addr: &str) -> Result<StoreHandle> {
        let key = router_addr.trim().to_string();
        let mut entries = self.entries.lock().await;
        if let Some(handle) = entries.get(&key) {
            return Ok(handle.clone());
        }
        let path = self.data_dir.join(db_file_name(&key));
        tracing::info!(router = %key, path = %path.display(), "opening sample store");
        let store = SampleStore::open(&path).await?;
        let handle = StoreHandle::new(store);
        entries.insert(key, handle.clone());
        Ok(handle)
    }

    /// Drops the cached handle for one router. The next resolve reopens the
    /// same file.
    pub async fn invalidate(&self, router_addr: &str) {
        self.entries.lock().await.remove(router_addr.trim());
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

// "192.168.88.1" -> "192_168_88_1.db", "10.0.0.7:8443" -> "10_0_0_7_8443.db"
fn db_file_name(router_addr: &str) -> String {
    let sanitized: String = router_addr
        .chars()
        .map(|c| if c == '.' || c == ':' { '_' } else { c })
        .collect();
    format!("{sanitized}.db")
}
