use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use volley_contracts::{HostRecord, PersistenceError, PersistenceStore};

use super::StoreSpec;

/// Append-only JSON-lines file, one [`HostRecord`] per line.
#[derive(Debug)]
pub struct JsonlStore {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl JsonlStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::debug!(target: "volley::store", path = %path.display(), "opened host store");

        Ok(Self {
            path,
            writer: Mutex::new(Some(BufWriter::new(file))),
        })
    }

    /// `<workspace_dir>/<protocol>.jsonl`
    pub fn open_for(spec: &StoreSpec) -> Result<Self, PersistenceError> {
        Self::open(spec.workspace_dir.join(format!("{}.jsonl", spec.protocol)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every record back from a store file.
    pub fn load(path: impl AsRef<Path>) -> Result<Vec<HostRecord>, PersistenceError> {
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl PersistenceStore for JsonlStore {
    fn record(&self, record: HostRecord) -> Result<(), PersistenceError> {
        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or(PersistenceError::Closed)?;
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        writer.write_all(&line)?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), PersistenceError> {
        let writer = self.writer.lock().take();
        let Some(writer) = writer else {
            return Err(PersistenceError::Closed);
        };
        tokio::task::spawn_blocking(move || -> Result<(), PersistenceError> {
            let file = writer
                .into_inner()
                .map_err(|err| PersistenceError::Io(err.into_error()))?;
            file.sync_all()?;
            Ok(())
        })
        .await
        .map_err(|err| PersistenceError::Backend(format!("store flush task failed: {err}")))??;
        tracing::debug!(target: "volley::store", path = %self.path.display(), "host store closed");
        Ok(())
    }
}
