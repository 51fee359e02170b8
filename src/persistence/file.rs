//! File-backed snapshot store: one JSON file per tracker key.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{TrackerError, TrackerResult};
use crate::persistence::{SnapshotStore, StoredSnapshot};

/// Stores snapshots as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create the store, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

fn read_error(key: &str, e: impl std::fmt::Display) -> TrackerError {
    TrackerError::PersistenceRead { key: key.to_string(), reason: e.to_string() }
}

fn write_error(key: &str, e: impl std::fmt::Display) -> TrackerError {
    TrackerError::PersistenceWrite { key: key.to_string(), reason: e.to_string() }
}

impl SnapshotStore for FileStore {
    fn get(&self, key: &str) -> TrackerResult<Option<StoredSnapshot>> {
        let file = match File::open(self.path_for(key)) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(read_error(key, e)),
        };
        let snapshot = serde_json::from_reader(BufReader::new(file)).map_err(|e| read_error(key, e))?;
        Ok(Some(snapshot))
    }

    fn set(&self, key: &str, snapshot: StoredSnapshot) -> TrackerResult<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");

        let file = File::create(&tmp).map_err(|e| write_error(key, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &snapshot).map_err(|e| write_error(key, e))?;
        writer.flush().map_err(|e| write_error(key, e))?;
        drop(writer);

        fs::rename(&tmp, &path).map_err(|e| write_error(key, e))?;
        tracing::debug!(key = %key, path = ?path, "Saved tracker snapshot");
        Ok(())
    }

    fn remove(&self, key: &str) -> TrackerResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(write_error(key, e)),
        }
    }
}
