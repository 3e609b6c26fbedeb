//! Reference [`PersistenceStore`] implementations.

mod jsonl;
mod memory;

use std::{path::PathBuf, sync::Arc};

use volley_contracts::{PersistenceError, PersistenceStore};

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

/// Where a protocol's store lives for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSpec {
    /// `<home>/workspaces/<workspace>`
    pub workspace_dir: PathBuf,
    pub protocol: String,
}

impl StoreSpec {
    pub fn new(workspace_dir: impl Into<PathBuf>, protocol: impl Into<String>) -> Self {
        Self {
            workspace_dir: workspace_dir.into(),
            protocol: protocol.into(),
        }
    }
}

/// Persistence-store entry point of a protocol descriptor.
pub type StoreFactory =
    Arc<dyn Fn(&StoreSpec) -> Result<Arc<dyn PersistenceStore>, PersistenceError> + Send + Sync>;

pub fn jsonl_store_factory() -> StoreFactory {
    Arc::new(|spec| Ok(Arc::new(JsonlStore::open_for(spec)?) as Arc<dyn PersistenceStore>))
}

pub fn memory_store_factory() -> StoreFactory {
    Arc::new(|_| Ok(Arc::new(MemoryStore::new()) as Arc<dyn PersistenceStore>))
}
