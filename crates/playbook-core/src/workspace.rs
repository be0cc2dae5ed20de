//! Per-run artifact files.
//!
//! Each artifact lives at `<dir>/<id>.<ext>`; the path is a pure function of
//! the ID so writer and deleter agree without shared state. Concurrent runs
//! are kept apart by [`Workspace::reserve`], which claims the paths a run is
//! about to write and releases them when the returned guard drops.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use regex::Regex;
use thiserror::Error;

use crate::io::atomic_write;

pub const DEFAULT_EXTENSION: &str = "yml";

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("invalid artifact id '{0}': must start alphanumeric and contain only [A-Za-z0-9._-]")]
    InvalidId(String),

    #[error("artifact path already in use by another run: {}", .0.display())]
    InUse(PathBuf),

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove {}: {source}", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// ID validation
// ---------------------------------------------------------------------------

static ID_RE: OnceLock<Regex> = OnceLock::new();

fn id_re() -> &'static Regex {
    ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._\-]*$").unwrap())
}

pub fn validate_id(id: &str) -> Result<(), WorkspaceError> {
    if id.is_empty() || id.len() > 128 || !id_re().is_match(id) {
        return Err(WorkspaceError::InvalidId(id.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Workspace {
    dir: PathBuf,
    extension: String,
    reserved: Arc<Mutex<HashSet<PathBuf>>>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(std::env::temp_dir(), DEFAULT_EXTENSION)
    }
}

impl Workspace {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
            reserved: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `<dir>/<id>.<ext>`.
    pub fn path_for(&self, id: &str) -> Result<PathBuf, WorkspaceError> {
        validate_id(id)?;
        Ok(self.dir.join(format!("{id}.{}", self.extension)))
    }

    /// Write `contents` for `id`, creating or truncating the file.
    pub fn write(&self, id: &str, contents: &str) -> Result<PathBuf, WorkspaceError> {
        let path = self.path_for(id)?;
        atomic_write(&path, contents.as_bytes()).map_err(|source| WorkspaceError::Write {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), bytes = contents.len(), "artifact written");
        Ok(path)
    }

    /// Delete the artifact for `id`.
    pub fn remove(&self, id: &str) -> Result<(), WorkspaceError> {
        let path = self.path_for(id)?;
        std::fs::remove_file(&path).map_err(|source| WorkspaceError::Remove {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "artifact removed");
        Ok(())
    }

    /// Claim the artifact paths for `ids` until the guard drops.
    ///
    /// Fails without claiming anything if any path is already held, or if two
    /// of `ids` resolve to the same path.
    pub fn reserve(&self, ids: &[&str]) -> Result<Reservation, WorkspaceError> {
        let mut paths = Vec::with_capacity(ids.len());
        for id in ids {
            let path = self.path_for(id)?;
            if paths.contains(&path) {
                return Err(WorkspaceError::InUse(path));
            }
            paths.push(path);
        }

        let mut held = self
            .reserved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(taken) = paths.iter().find(|p| held.contains(*p)) {
            return Err(WorkspaceError::InUse(taken.clone()));
        }
        held.extend(paths.iter().cloned());

        Ok(Reservation {
            paths,
            reserved: Arc::clone(&self.reserved),
        })
    }
}

/// Guard returned by [`Workspace::reserve`].
#[derive(Debug)]
pub struct Reservation {
    paths: Vec<PathBuf>,
    reserved: Arc<Mutex<HashSet<PathBuf>>>,
}

impl Reservation {
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let mut held = self
            .reserved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for p in &self.paths {
            held.remove(p);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
