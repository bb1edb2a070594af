use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::StreamExt;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tutor_core::error::Result;
use tutor_core::traits::{AgentClient, Prober};
use tutor_core::types::{AgentMessage, ConnectionStatus, ProbeOutcome, QueryRequest};

/// Marks that a verification pass is in flight.
#[derive(Debug, Clone, Default)]
pub struct BusyFlag {
    inner: Arc<AtomicBool>,
}

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.load(Ordering::Acquire)
    }

    /// Claim the flag. Returns `None` if a pass is already running.
    pub fn try_acquire(&self) -> Option<BusyGuard> {
        self.inner
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard {
                inner: self.inner.clone(),
            })
    }
}

/// Clears the owning [`BusyFlag`] when dropped.
#[derive(Debug)]
pub struct BusyGuard {
    inner: Arc<AtomicBool>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.inner.store(false, Ordering::Release);
    }
}

/// Probes through the agent stream: one minimal query, read only up to the
/// handshake message, then drop the stream.
pub struct StreamProber<A> {
    agent: Arc<A>,
    prompt: String,
    allowed_tools: Vec<String>,
}

impl<A: AgentClient> StreamProber<A> {
    pub fn new(agent: Arc<A>, prompt: impl Into<String>, allowed_tools: Vec<String>) -> Self {
        Self {
            agent,
            prompt: prompt.into(),
            allowed_tools,
        }
    }
}

impl<A: AgentClient> Prober for StreamProber<A> {
    fn probe(&self, servers: Map<String, Value>) -> BoxFuture<'_, Result<ConnectionStatus>> {
        Box::pin(async move {
            let request = QueryRequest {
                prompt: self.prompt.clone(),
                mcp_servers: servers,
                allowed_tools: self.allowed_tools.clone(),
                max_turns: Some(1),
            };
            let mut stream = self.agent.query(request).await?;

            while let Some(message) = stream.next().await {
                let message = message?;
                if let AgentMessage::System { ref subtype, .. } = message {
                    debug!(subtype = %subtype, "Probe handshake received");
                    return Ok(message.server_statuses().unwrap_or_default());
                }
            }

            debug!("Agent stream ended before handshake");
            Ok(ConnectionStatus::new())
        })
    }
}

/// Run one verification pass against `servers`.
///
/// Never returns an error: failures and timeouts become
/// [`ProbeOutcome::Failed`], an interrupt becomes [`ProbeOutcome::Cancelled`].
pub async fn run_probe<P>(
    prober: &P,
    servers: Map<String, Value>,
    cancel: &CancellationToken,
    timeout: Duration,
) -> ProbeOutcome
where
    P: Prober + ?Sized,
{
    if servers.is_empty() {
        return ProbeOutcome::Completed(ConnectionStatus::new());
    }

    let count = servers.len();
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!(servers = count, "Connection probe cancelled");
            ProbeOutcome::Cancelled
        }
        result = tokio::time::timeout(timeout, prober.probe(servers)) => match result {
            Ok(Ok(status)) => {
                info!(servers = count, reported = status.len(), "Connection probe finished");
                ProbeOutcome::Completed(status)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Connection probe failed");
                ProbeOutcome::Failed(e.to_string())
            }
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "Connection probe timed out");
                ProbeOutcome::Failed(format!("timed out after {}s", timeout.as_secs()))
            }
        },
    }
}
