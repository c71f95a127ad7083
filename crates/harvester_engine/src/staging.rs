//! Per-URL scratch storage for response bodies.
//!
//! Bodies are streamed into a uniquely named temp file owned by one worker.
//! A finalized [`StagedResult`] keeps its file alive until it is dropped, so a
//! staged body is never leaked and never visible to anyone but its owner.

use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::{TempDir, TempPath};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::artifact::ensure_output_dir;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("staging directory unusable: {0}")]
    Dir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

enum StagingRoot {
    Owned(TempDir),
    External(PathBuf),
}

pub struct StagingStore {
    root: StagingRoot,
}

impl StagingStore {
    /// Scratch space in a fresh private directory, removed when the store is dropped.
    pub fn temporary() -> Result<Self, StagingError> {
        let dir = tempfile::Builder::new()
            .prefix("harvest-staging-")
            .tempdir()
            .map_err(|e| StagingError::Dir(e.to_string()))?;
        Ok(Self {
            root: StagingRoot::Owned(dir),
        })
    }

    /// Scratch space inside `dir`, created if missing. Entries are still removed
    /// individually once merged or discarded.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Result<Self, StagingError> {
        let dir = dir.into();
        ensure_output_dir(&dir).map_err(|e| StagingError::Dir(e.to_string()))?;
        Ok(Self {
            root: StagingRoot::External(dir),
        })
    }

    pub fn dir(&self) -> &Path {
        match &self.root {
            StagingRoot::Owned(dir) => dir.path(),
            StagingRoot::External(dir) => dir,
        }
    }

    /// Creates a fresh, uniquely named scratch file for `url`.
    pub fn open(&self, url: &str, content_type: Option<String>) -> Result<StagingHandle, StagingError> {
        let prefix = format!("{}-", short_hash(url));
        let tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".part")
            .tempfile_in(self.dir())?;
        let (file, path) = tmp.into_parts();
        Ok(StagingHandle {
            url: url.to_string(),
            content_type,
            file: File::from_std(file),
            path,
            size: 0,
        })
    }

    /// Appends a chunk to the scratch file.
    pub async fn write(&self, handle: &mut StagingHandle, chunk: &[u8]) -> Result<(), StagingError> {
        handle.file.write_all(chunk).await?;
        handle.size += chunk.len() as u64;
        Ok(())
    }

    /// Flushes the scratch file to disk and turns it into a read-only result.
    pub async fn finalize(&self, handle: StagingHandle) -> Result<StagedResult, StagingError> {
        let StagingHandle {
            url,
            content_type,
            mut file,
            path,
            size,
        } = handle;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        Ok(StagedResult {
            url,
            content_type,
            path,
            size,
        })
    }

    /// Removes an unfinished scratch file.
    pub fn discard(&self, handle: StagingHandle) -> Result<(), StagingError> {
        let StagingHandle { file, path, .. } = handle;
        drop(file);
        path.close()?;
        Ok(())
    }
}

/// Writable scratch file for one in-flight response body.
pub struct StagingHandle {
    url: String,
    content_type: Option<String>,
    file: File,
    path: TempPath,
    size: u64,
}

impl StagingHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// A completely written response body awaiting merge. The scratch file is
/// deleted when this value is dropped.
#[derive(Debug)]
pub struct StagedResult {
    url: String,
    content_type: Option<String>,
    path: TempPath,
    size: u64,
}

impl StagedResult {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}
