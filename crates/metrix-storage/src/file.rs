use crate::error::{Result, StorageError};
use crate::SnapshotStore;
use metrix_common::Metric;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Snapshot stored as one JSON array line.
///
/// Each save writes a uniquely named temporary file in the same directory,
/// fsyncs it and renames it over the target, so a crash leaves either the
/// old or the new snapshot and concurrent saves never share a temp file.
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn name(&self) -> &str {
        "file"
    }

    fn load(&self) -> Result<Vec<Metric>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        let mut line = String::new();
        BufReader::new(file)
            .read_line(&mut line)
            .map_err(|e| StorageError::io(&self.path, e))?;
        if line.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(line.trim_end())?)
    }

    fn save(&self, snapshot: &[Metric]) -> Result<()> {
        let dir = self.parent_dir();
        std::fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;

        let mut body = serde_json::to_vec(snapshot)?;
        body.push(b'\n');

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| StorageError::io(&dir, e))?;
        tmp.write_all(&body)
            .map_err(|e| StorageError::io(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| StorageError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| StorageError::io(&self.path, e.error))?;
        tracing::debug!(path = %self.path.display(), count = snapshot.len(), "Snapshot written");
        Ok(())
    }

    fn ping(&self) -> Result<()> {
        let dir = self.parent_dir();
        std::fs::metadata(&dir)
            .map(|_| ())
            .map_err(|e| StorageError::io(&dir, e))
    }
}
