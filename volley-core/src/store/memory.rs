use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use volley_contracts::{HostRecord, PersistenceError, PersistenceStore};

/// Keeps records in memory for the run. Used with `--no-store`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<HostRecord>>,
    closed: AtomicBool,
    shutdowns: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<HostRecord> {
        self.records.lock().clone()
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::Acquire)
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    fn record(&self, record: HostRecord) -> Result<(), PersistenceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PersistenceError::Closed);
        }
        self.records.lock().push(record);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), PersistenceError> {
        self.shutdowns.fetch_add(1, Ordering::AcqRel);
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
