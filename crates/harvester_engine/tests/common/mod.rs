#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream;
use harvester_engine::{
    FailureKind, FetchError, FetchResponse, Fetcher, PipelineEvent, ProgressSink,
};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

/// Canned behaviour for one URL.
#[derive(Debug, Clone)]
pub enum Script {
    Respond {
        status: u16,
        content_type: Option<String>,
        chunks: Vec<Vec<u8>>,
        delay: Duration,
    },
    Fail(FailureKind),
    /// 200 whose body errors after the given chunks.
    BreakMidStream(Vec<Vec<u8>>),
}

impl Script {
    pub fn json(body: &str) -> Self {
        Script::Respond {
            status: 200,
            content_type: Some("application/json".to_string()),
            chunks: vec![body.as_bytes().to_vec()],
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16) -> Self {
        Script::Respond {
            status,
            content_type: None,
            chunks: vec![b"nope".to_vec()],
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(self, by: Duration) -> Self {
        match self {
            Script::Respond {
                status,
                content_type,
                chunks,
                ..
            } => Script::Respond {
                status,
                content_type,
                chunks,
                delay: by,
            },
            other => other,
        }
    }
}

/// In-memory fetcher; unknown URLs fail like an unresolvable host.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, script: Script) -> Self {
        self.scripts.insert(url.to_string(), script);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<FetchResponse, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.scripts.get(url).cloned() {
            Some(Script::Respond {
                status,
                content_type,
                chunks,
                delay,
            }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let body = stream::iter(
                    chunks
                        .into_iter()
                        .map(|chunk| Ok::<_, FetchError>(Bytes::from(chunk))),
                );
                Ok(FetchResponse {
                    status,
                    content_type,
                    body: Box::pin(body),
                })
            }
            Some(Script::Fail(kind)) => Err(FetchError::new(kind, "scripted failure")),
            Some(Script::BreakMidStream(chunks)) => {
                let mut items: Vec<Result<Bytes, FetchError>> =
                    chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
                items.push(Err(FetchError::new(FailureKind::Network, "connection reset")));
                Ok(FetchResponse {
                    status: 200,
                    content_type: Some("application/json".to_string()),
                    body: Box::pin(stream::iter(items)),
                })
            }
            None => Err(FetchError::new(
                FailureKind::Network,
                format!("dns error: failed to lookup address for {url}"),
            )),
        }
    }
}

#[derive(Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<PipelineEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn position(&self, pred: impl Fn(&PipelineEvent) -> bool) -> Option<usize> {
        self.events().iter().position(pred)
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: PipelineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn read_lines(path: &std::path::Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
