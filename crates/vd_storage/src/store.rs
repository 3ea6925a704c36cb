use std::fs;
use std::io;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("no configuration stored at {0}")]
    NotFound(String),
    #[error("failed to read {location}: {source}")]
    Read {
        location: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {location}: {source}")]
    Write {
        location: String,
        #[source]
        source: io::Error,
    },
}

impl PersistenceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PersistenceError::NotFound(_))
    }
}

/// Where the configuration document lives between sessions.
pub trait ConfigStore {
    fn load(&mut self) -> Result<String, PersistenceError>;
    fn save(&mut self, document: &str) -> Result<(), PersistenceError>;
}

#[derive(Clone, Debug)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&mut self) -> Result<String, PersistenceError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(PersistenceError::NotFound(self.location()))
            }
            Err(source) => Err(PersistenceError::Read {
                location: self.location(),
                source,
            }),
        }
    }

    /// Writes to a sibling temp file first so a failed write never truncates the
    /// previous document.
    fn save(&mut self, document: &str) -> Result<(), PersistenceError> {
        let staging = self.path.with_extension("json.tmp");
        let write_error = |source| PersistenceError::Write {
            location: self.location(),
            source,
        };
        fs::write(&staging, document).map_err(write_error)?;
        fs::rename(&staging, &self.path).map_err(|source| {
            let _ = fs::remove_file(&staging);
            write_error(source)
        })?;
        log::debug!("saved configuration to {}", self.location());
        Ok(())
    }
}

/// In-memory store, used by tests and by sessions that never touch disk.
#[derive(Clone, Debug, Default)]
pub struct MemoryConfigStore {
    document: Option<String>,
    fail_saves: bool,
    save_count: usize,
}

impl MemoryConfigStore {
    pub fn with_document(document: impl Into<String>) -> Self {
        Self {
            document: Some(document.into()),
            ..Self::default()
        }
    }

    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    /// Makes every following save fail, as a full or read-only disk would.
    pub fn set_fail_saves(&mut self, fail: bool) {
        self.fail_saves = fail;
    }

    pub fn save_count(&self) -> usize {
        self.save_count
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&mut self) -> Result<String, PersistenceError> {
        self.document
            .clone()
            .ok_or_else(|| PersistenceError::NotFound("memory".to_string()))
    }

    fn save(&mut self, document: &str) -> Result<(), PersistenceError> {
        if self.fail_saves {
            return Err(PersistenceError::Write {
                location: "memory".to_string(),
                source: io::Error::new(ErrorKind::Other, "saving disabled"),
            });
        }
        self.document = Some(document.to_string());
        self.save_count = self.save_count.saturating_add(1);
        Ok(())
    }
}
