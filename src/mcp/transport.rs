//! Per-request MCP transport
//!
//! A [`Transport`] serves exactly one HTTP request body. It is created by the `/mcp`
//! handler, bound to the shared [`ToolRegistry`], asked to handle the body once and then
//! closed. Dropping a transport that is still open (for example because the client went
//! away and the request future was dropped) closes it as aborted.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::registry::ToolRegistry;
use crate::mcp::rpc::{json_rpc_error, INVALID_REQUEST, PARSE_ERROR};
use crate::mcp::server::handle_json_rpc_value;

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Created,
    Bound,
    Handling,
    Responded,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// A reply was produced before the transport closed.
    Completed,
    /// The transport closed without producing a reply.
    Aborted,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is not bound to a tool registry")]
    NotBound,
    #[error("transport is already bound")]
    AlreadyBound,
    #[error("transport has already handled a request")]
    AlreadyHandled,
    #[error("transport is closed")]
    Closed,
}

/// What the HTTP layer should send back for a handled body.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportReply {
    Message(Value),
    /// The body held only notifications; nothing to answer.
    Accepted,
}

type CloseHook = Box<dyn FnOnce(CloseReason) + Send>;

pub struct Transport {
    id: u64,
    state: TransportState,
    registry: Option<Arc<ToolRegistry>>,
    close_hooks: Vec<CloseHook>,
    closed_with: Option<CloseReason>,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    pub fn new() -> Self {
        let id = NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed);
        debug!(transport_id = id, "transport created");
        Self {
            id,
            state: TransportState::Created,
            registry: None,
            close_hooks: Vec::new(),
            closed_with: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn bind(&mut self, registry: Arc<ToolRegistry>) -> Result<(), TransportError> {
        match self.state {
            TransportState::Created => {
                self.registry = Some(registry);
                self.state = TransportState::Bound;
                Ok(())
            }
            TransportState::Closed => Err(TransportError::Closed),
            _ => Err(TransportError::AlreadyBound),
        }
    }

    /// Registers a hook that runs once when the transport closes.
    pub fn on_close(&mut self, hook: impl FnOnce(CloseReason) + Send + 'static) {
        if let Some(reason) = self.closed_with {
            hook(reason);
            return;
        }
        self.close_hooks.push(Box::new(hook));
    }

    pub async fn handle(&mut self, body: &[u8]) -> Result<TransportReply, TransportError> {
        let registry = match self.state {
            TransportState::Bound => self
                .registry
                .clone()
                .ok_or(TransportError::NotBound)?,
            TransportState::Created => return Err(TransportError::NotBound),
            TransportState::Handling | TransportState::Responded => {
                return Err(TransportError::AlreadyHandled)
            }
            TransportState::Closed => return Err(TransportError::Closed),
        };

        self.state = TransportState::Handling;
        debug!(transport_id = self.id, bytes = body.len(), "transport handling request");

        let reply = process_body(&registry, body).await;

        self.state = TransportState::Responded;
        Ok(reply)
    }

    /// Idempotent; releases the registry handle and runs close hooks.
    pub fn close(&mut self) {
        if self.state == TransportState::Closed {
            return;
        }

        let reason = self.close_reason();
        if reason == CloseReason::Aborted && self.state == TransportState::Handling {
            warn!(transport_id = self.id, "transport closed before a response was produced");
        }

        self.state = TransportState::Closed;
        self.closed_with = Some(reason);
        self.registry = None;
        for hook in self.close_hooks.drain(..) {
            hook(reason);
        }
        debug!(transport_id = self.id, reason = ?reason, "transport closed");
    }

    fn close_reason(&self) -> CloseReason {
        if self.state == TransportState::Responded {
            CloseReason::Completed
        } else {
            CloseReason::Aborted
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

async fn process_body(registry: &ToolRegistry, body: &[u8]) -> TransportReply {
    let payload: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => return TransportReply::Message(json_rpc_error(None, PARSE_ERROR, "Parse error")),
    };

    if let Value::Array(batch) = payload {
        if batch.is_empty() {
            return TransportReply::Message(Value::Array(vec![json_rpc_error(
                None,
                INVALID_REQUEST,
                "Invalid Request",
            )]));
        }

        let mut responses = Vec::new();
        for item in batch {
            if let Some(response) = handle_json_rpc_value(registry, item).await {
                responses.push(response);
            }
        }

        if responses.is_empty() {
            return TransportReply::Accepted;
        }

        return TransportReply::Message(Value::Array(responses));
    }

    match handle_json_rpc_value(registry, payload).await {
        Some(response) => TransportReply::Message(response),
        None => TransportReply::Accepted,
    }
}
