use std::fmt;

pub type WorkerId = usize;

/// Progress notifications emitted by the coordinator and the workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    Enqueued { url: String },
    Dequeued { worker: WorkerId, url: String },
    Staged { worker: WorkerId, url: String, bytes: u64 },
    Dropped { worker: WorkerId, url: String, reason: DropReason },
    Merged { worker: WorkerId, url: String },
    MergeFailed { worker: WorkerId, url: String, message: String },
}

/// Why an item never reached the output artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    Transport(FailureKind),
    NonSuccessStatus(u16),
    Staging(String),
    Parse(String),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Transport(kind) => write!(f, "transport failure: {kind}"),
            DropReason::NonSuccessStatus(code) => write!(f, "http status {code}"),
            DropReason::Staging(message) => write!(f, "staging failed: {message}"),
            DropReason::Parse(message) => write!(f, "unparseable body: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Transient failures a retrying wrapper may try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, FailureKind::Timeout | FailureKind::Network)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::Network => write!(f, "network error"),
        }
    }
}
