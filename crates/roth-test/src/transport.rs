//! Agent transport that records traffic instead of sending it

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use roth_driver::{AgentTransport, DriverError, DriverResult, EventReply, ReplySink};
use serde_json::{json, Value};

/// A targeted call as the agent would have received it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub server: String,
    pub method: String,
    pub args: Value,
}

/// A fanout cast as every agent would have received it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCast {
    pub method: String,
    pub args: Value,
}

/// Records calls and casts; replies with a scripted result or failure
pub struct RecordingTransport {
    calls: Mutex<Vec<RecordedCall>>,
    casts: Mutex<Vec<RecordedCast>>,
    reply: Result<Value, String>,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTransport {
    /// Agents answer every call with `{"status": "ok"}`
    pub fn new() -> Self {
        Self::replying(json!({ "status": "ok" }))
    }

    pub fn replying(reply: Value) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            casts: Mutex::new(Vec::new()),
            reply: Ok(reply),
        }
    }

    /// Agents reject every call and the fanout channel is down
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            casts: Mutex::new(Vec::new()),
            reply: Err(message.into()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn casts(&self) -> Vec<RecordedCast> {
        lock(&self.casts).clone()
    }

    /// Nothing was sent in either mode
    pub fn is_silent(&self) -> bool {
        lock(&self.calls).is_empty() && lock(&self.casts).is_empty()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl AgentTransport for RecordingTransport {
    async fn call(&self, server: &str, method: &str, args: Value) -> DriverResult<Value> {
        lock(&self.calls).push(RecordedCall {
            server: server.to_string(),
            method: method.to_string(),
            args,
        });
        self.reply
            .clone()
            .map_err(|message| DriverError::remote_failure(server, method, message))
    }

    async fn fanout_cast(&self, method: &str, args: Value) -> DriverResult<()> {
        lock(&self.casts).push(RecordedCast {
            method: method.to_string(),
            args,
        });
        match &self.reply {
            Ok(_) => Ok(()),
            Err(message) => Err(DriverError::remote_failure("fanout", method, message.clone())),
        }
    }
}

/// An event reply with the agent traffic that had gone out before it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedReply {
    pub reply_to: String,
    pub reply: EventReply,
    pub calls_before: usize,
    pub casts_before: usize,
}

/// Records event replies against the traffic of a [`RecordingTransport`]
pub struct RecordingReplies {
    transport: Arc<RecordingTransport>,
    replies: Mutex<Vec<RecordedReply>>,
}

impl RecordingReplies {
    pub fn new(transport: Arc<RecordingTransport>) -> Self {
        Self {
            transport,
            replies: Mutex::new(Vec::new()),
        }
    }

    pub fn replies(&self) -> Vec<RecordedReply> {
        lock(&self.replies).clone()
    }
}

#[async_trait]
impl ReplySink for RecordingReplies {
    async fn reply(&self, reply_to: &str, reply: &EventReply) -> DriverResult<()> {
        let recorded = RecordedReply {
            reply_to: reply_to.to_string(),
            reply: reply.clone(),
            calls_before: lock(&self.transport.calls).len(),
            casts_before: lock(&self.transport.casts).len(),
        };
        lock(&self.replies).push(recorded);
        Ok(())
    }
}
