use std::fs;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempPath};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use engine_logging::engine_warn;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("output artifact is already closed")]
    Closed,
    #[error("failed to write output artifact: {0}")]
    Io(#[from] io::Error),
    #[error("append interrupted after {written} records: {source}")]
    Interrupted {
        written: usize,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to prepare output artifact: {0}")]
    Persist(#[from] PersistError),
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    // Basic writability probe: try creating a temp file.
    NamedTempFile::new_in(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    Ok(())
}

struct OpenArtifact {
    file: File,
    temp: TempPath,
    committed: u64,
    /// File length past which writes fail part-way, like a full disk.
    #[cfg(test)]
    size_limit: Option<u64>,
}

impl OpenArtifact {
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        #[cfg(test)]
        if let Some(limit) = self.size_limit {
            let room = limit.saturating_sub(self.committed) as usize;
            if line.len() > room {
                self.file.write_all(&line.as_bytes()[..room]).await?;
                self.file.flush().await?;
                return Err(io::Error::other("no space left on device"));
            }
        }
        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await
    }
}

/// Append-only line-delimited output file.
///
/// Records accumulate in a temp file beside the target and are moved into place
/// by [`OutputArtifact::close`]. Appends are serialized by an internal mutex and
/// each record is written as one complete line.
pub struct OutputArtifact {
    target: PathBuf,
    inner: Mutex<Option<OpenArtifact>>,
}

impl OutputArtifact {
    pub fn create(target: impl Into<PathBuf>) -> Result<Self, MergeError> {
        let target = target.into();
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        ensure_output_dir(&dir)?;
        let (file, temp) = tempfile::Builder::new()
            .prefix(".harvest-")
            .suffix(".jsonl.tmp")
            .tempfile_in(&dir)?
            .into_parts();
        Ok(Self {
            target,
            inner: Mutex::new(Some(OpenArtifact {
                file: File::from_std(file),
                temp,
                committed: 0,
                #[cfg(test)]
                size_limit: None,
            })),
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Appends complete lines while holding the artifact lock for the whole batch.
    ///
    /// Each entry must already end with `\n`. On a failed write the file is cut
    /// back to the last complete record and [`MergeError::Interrupted`] reports
    /// how many lines of the batch made it in.
    pub async fn append_lines(&self, lines: &[String]) -> Result<usize, MergeError> {
        let mut guard = self.inner.lock().await;
        let open = guard.as_mut().ok_or(MergeError::Closed)?;
        for (written, line) in lines.iter().enumerate() {
            if let Err(err) = open.write_line(line).await {
                if let Err(trunc) = rollback(&mut open.file, open.committed).await {
                    engine_warn!("Failed to roll back partial record: {}", trunc);
                }
                return Err(MergeError::Interrupted {
                    written,
                    source: err,
                });
            }
            open.committed += line.len() as u64;
        }
        Ok(lines.len())
    }

    /// Flushes and atomically moves the artifact to its target path, replacing
    /// any existing file. Later appends fail with [`MergeError::Closed`].
    pub async fn close(&self) -> Result<PathBuf, MergeError> {
        let mut guard = self.inner.lock().await;
        let OpenArtifact { mut file, temp, .. } = guard.take().ok_or(MergeError::Closed)?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        // Replace existing file if present to keep determinism.
        if self.target.exists() {
            fs::remove_file(&self.target)?;
        }
        temp.persist(&self.target)
            .map_err(|e| MergeError::Io(e.error))?;
        Ok(self.target.clone())
    }

    #[cfg(test)]
    pub(crate) async fn limit_size(&self, limit: Option<u64>) {
        if let Some(open) = self.inner.lock().await.as_mut() {
            open.size_limit = limit;
        }
    }
}

async fn rollback(file: &mut File, committed: u64) -> io::Result<()> {
    file.set_len(committed).await?;
    file.seek(SeekFrom::Start(committed)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn line(n: u32) -> String {
        format!("{{\"n\":{n}}}\n")
    }

    #[tokio::test]
    async fn failed_append_is_cut_back_to_the_last_complete_record() {
        let temp = TempDir::new().unwrap();
        let artifact = OutputArtifact::create(temp.path().join("results.jsonl")).unwrap();
        artifact.append_lines(&[line(1)]).await.unwrap();

        // Room for one more record and part of the next.
        artifact.limit_size(Some(2 * line(1).len() as u64 + 3)).await;
        let err = artifact
            .append_lines(&[line(2), line(3), line(4)])
            .await
            .unwrap_err();
        assert!(matches!(err, MergeError::Interrupted { written: 1, .. }));

        artifact.limit_size(None).await;
        assert_eq!(artifact.append_lines(&[line(5)]).await.unwrap(), 1);

        let path = artifact.close().await.unwrap();
        assert_eq!(
            fs::read_to_string(path).unwrap(),
            [line(1), line(2), line(5)].concat()
        );
    }
}
