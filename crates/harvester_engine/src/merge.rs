use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::artifact::{MergeError, OutputArtifact};
use crate::decode::{decode_body, DecodeError};
use crate::staging::StagedResult;

/// One line of the output artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRecord {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

impl MergedRecord {
    /// The record as one complete, newline-terminated line.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("failed to read staged body: {0}")]
    Read(#[from] std::io::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// What happened to one staged result.
#[derive(Debug)]
pub enum MergeOutcome {
    Merged,
    /// Not appended (or appended without content when unparsed records are kept).
    Unparsed(ParseError),
}

/// Result of merging a batch. `merged` lists every URL whose line reached the
/// artifact, including content-less lines for kept unparsed bodies. `failed`
/// carries the URLs whose lines were lost because an append failed.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub merged: Vec<String>,
    pub unparsed: Vec<(String, ParseError)>,
    pub failed: Option<(Vec<String>, MergeError)>,
}

pub struct Merger {
    artifact: Arc<OutputArtifact>,
    keep_unparsed: bool,
}

impl Merger {
    pub fn new(artifact: Arc<OutputArtifact>, keep_unparsed: bool) -> Self {
        Self {
            artifact,
            keep_unparsed,
        }
    }

    pub fn keeps_unparsed(&self) -> bool {
        self.keep_unparsed
    }

    pub fn artifact(&self) -> &Arc<OutputArtifact> {
        &self.artifact
    }

    /// Parses one staged body and appends its record. Not deduplicating: merging
    /// the same staged result twice appends two records.
    pub async fn merge(&self, staged: &StagedResult) -> Result<MergeOutcome, MergeError> {
        let (record, parse_error) = self.prepare(staged).await;
        if let Some(record) = record {
            self.artifact.append_lines(&[record.to_line()?]).await?;
        }
        Ok(match parse_error {
            Some(err) => MergeOutcome::Unparsed(err),
            None => MergeOutcome::Merged,
        })
    }

    /// Parses every staged body outside the artifact lock, then appends the
    /// whole batch under one lock acquisition.
    pub async fn merge_batch(&self, batch: &[StagedResult]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut lines = Vec::with_capacity(batch.len());
        let mut line_urls = Vec::with_capacity(batch.len());

        for staged in batch {
            let (record, parse_error) = self.prepare(staged).await;
            if let Some(err) = parse_error {
                outcome.unparsed.push((staged.url().to_string(), err));
            }
            let Some(record) = record else { continue };
            match record.to_line() {
                Ok(line) => {
                    lines.push(line);
                    line_urls.push(staged.url().to_string());
                }
                Err(err) => outcome
                    .unparsed
                    .push((staged.url().to_string(), ParseError::Json(err))),
            }
        }

        if lines.is_empty() {
            return outcome;
        }

        let (written, err) = match self.artifact.append_lines(&lines).await {
            Ok(written) => (written, None),
            Err(MergeError::Interrupted { written, source }) => {
                (written, Some(MergeError::Interrupted { written, source }))
            }
            Err(err) => (0, Some(err)),
        };
        let mut urls = line_urls.into_iter();
        outcome.merged = urls.by_ref().take(written).collect();
        if let Some(err) = err {
            outcome.failed = Some((urls.collect(), err));
        }
        outcome
    }

    async fn prepare(&self, staged: &StagedResult) -> (Option<MergedRecord>, Option<ParseError>) {
        match parse_staged(staged).await {
            Ok(content) => (
                Some(MergedRecord {
                    url: staged.url().to_string(),
                    content: Some(content),
                }),
                None,
            ),
            Err(err) if self.keep_unparsed => (
                Some(MergedRecord {
                    url: staged.url().to_string(),
                    content: None,
                }),
                Some(err),
            ),
            Err(err) => (None, Some(err)),
        }
    }
}

/// Reads a finalized staged body and parses it as JSON.
pub async fn parse_staged(staged: &StagedResult) -> Result<Value, ParseError> {
    let bytes = tokio::fs::read(staged.path()).await?;
    let decoded = decode_body(&bytes, staged.content_type())?;
    Ok(serde_json::from_str(&decoded.text)?)
}
