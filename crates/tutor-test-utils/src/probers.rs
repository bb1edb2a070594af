use futures::future::BoxFuture;
use serde_json::{Map, Value};

use tutor_core::error::{Result, TutorError};
use tutor_core::traits::Prober;
use tutor_core::types::ConnectionStatus;

/// Reports a fixed status for the servers it knows; others are absent.
pub struct StaticProber {
    status: ConnectionStatus,
}

impl StaticProber {
    pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            status: entries
                .into_iter()
                .map(|(name, status)| (name.to_string(), status.to_string()))
                .collect(),
        }
    }

    /// Reports nothing for any server.
    pub fn empty() -> Self {
        Self {
            status: ConnectionStatus::new(),
        }
    }
}

impl Prober for StaticProber {
    fn probe(&self, servers: Map<String, Value>) -> BoxFuture<'_, Result<ConnectionStatus>> {
        Box::pin(async move {
            Ok(self
                .status
                .iter()
                .filter(|(name, _)| servers.contains_key(name.as_str()))
                .map(|(name, status)| (name.clone(), status.clone()))
                .collect())
        })
    }
}

/// Always fails with `TutorError::Probe`.
pub struct FailingProber {
    message: String,
}

impl FailingProber {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl Prober for FailingProber {
    fn probe(&self, _servers: Map<String, Value>) -> BoxFuture<'_, Result<ConnectionStatus>> {
        Box::pin(async move { Err(TutorError::Probe(self.message.clone())) })
    }
}

/// Never completes. For cancellation and timeout tests.
pub struct PendingProber;

impl Prober for PendingProber {
    fn probe(&self, _servers: Map<String, Value>) -> BoxFuture<'_, Result<ConnectionStatus>> {
        Box::pin(futures::future::pending())
    }
}
