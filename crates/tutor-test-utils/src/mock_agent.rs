use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;

use tutor_core::error::{Result, TutorError};
use tutor_core::traits::AgentClient;
use tutor_core::types::{AgentMessage, QueryRequest};

/// Agent that replays a fixed list of stream-JSON messages for every query.
#[derive(Clone)]
pub struct MockAgent {
    messages: Vec<Value>,
    fail_with: Option<String>,
    delay: Option<Duration>,
    requests: Arc<Mutex<Vec<QueryRequest>>>,
}

impl MockAgent {
    pub fn new(messages: Vec<Value>) -> Self {
        Self {
            messages,
            fail_with: None,
            delay: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every query fails to start with `TutorError::Agent(message)`.
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::new(Vec::new())
        }
    }

    /// Sleep before yielding each message.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<QueryRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<QueryRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

impl AgentClient for MockAgent {
    fn query(
        &self,
        request: QueryRequest,
    ) -> BoxFuture<'_, Result<BoxStream<'static, Result<AgentMessage>>>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request);
            if let Some(message) = &self.fail_with {
                return Err(TutorError::Agent(message.clone()));
            }

            let delay = self.delay;
            let messages = self.messages.clone();
            let stream = stream::iter(messages).then(move |value| async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(AgentMessage::from_json(value))
            });
            Ok(stream.boxed())
        })
    }
}
