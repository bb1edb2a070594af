use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::types::{AgentMessage, ConnectionStatus, QueryRequest};

/// Opaque request/response conversation with the agent process.
pub trait AgentClient: Send + Sync + 'static {
    /// Start a query and receive its message stream.
    ///
    /// Dropping the stream terminates the underlying request.
    fn query(
        &self,
        request: QueryRequest,
    ) -> BoxFuture<'_, Result<BoxStream<'static, Result<AgentMessage>>>>;
}

/// Live connectivity check for a set of enabled servers.
pub trait Prober: Send + Sync + 'static {
    /// Probe `servers` (name → expanded config) and report a status per name.
    ///
    /// Servers the probe learned nothing about are simply absent.
    fn probe(&self, servers: Map<String, Value>) -> BoxFuture<'_, Result<ConnectionStatus>>;
}
