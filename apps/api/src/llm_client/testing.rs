//! Scripted `GenerativeClient` double for unit and pipeline tests.
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{GenerationRequest, GenerativeClient, GenerativeError};

type Reply = Result<serde_json::Value, GenerativeError>;

/// Replies are scripted per response shape. Each call pops the next reply for
/// its shape; the last reply repeats forever. Unscripted shapes fail with a
/// transport error.
#[derive(Default)]
pub struct ScriptedClient {
    scripts: Mutex<HashMap<&'static str, VecDeque<Reply>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, shape: &'static str, replies: Vec<Reply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(shape, replies.into_iter().collect());
        self
    }

    /// Sleeps before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, shape: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.shape.name == shape)
            .count()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeClient for ScriptedClient {
    async fn generate(&self, request: &GenerationRequest) -> Reply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(request.shape.name) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => match queue.front() {
                Some(reply) => reply.clone(),
                None => Err(GenerativeError::Transport("empty script".into())),
            },
            None => Err(GenerativeError::Transport(format!(
                "no scripted reply for shape {}",
                request.shape.name
            ))),
        }
    }
}
