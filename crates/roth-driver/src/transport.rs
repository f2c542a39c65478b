//! Messaging channel to the RotH agents
//!
//! Two delivery modes are needed: a targeted call to one host that waits for
//! the agent's reply, and a fire-and-forget fanout to every agent.
//!
//! [`RedisTransport`] carries both over Redis:
//!
//! | Mode | Redis | Key |
//! |------|-------|-----|
//! | call request | `LPUSH` | `<topic>.<host>` |
//! | call reply | `BRPOP` with timeout | `<topic>.reply.<msg_id>` |
//! | fanout cast | `PUBLISH` | `<topic>_fanout` |
//!
//! A call carries `expires_at`; agents drop requests past it and expire
//! their reply key. On timeout the driver withdraws the request if it is
//! still queued and expires the reply key itself.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{DriverError, DriverResult};

/// Request/response and fanout delivery to agents
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Invoke `method` on the agent of `server` and wait for its reply.
    async fn call(&self, server: &str, method: &str, args: Value) -> DriverResult<Value>;

    /// Deliver `method` to every listening agent without waiting.
    async fn fanout_cast(&self, method: &str, args: Value) -> DriverResult<()>;
}

/// Message pushed to an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub msg_id: String,
    pub method: String,
    pub args: Value,
    /// Reply list for calls; absent for casts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Unix time in seconds after which nobody waits for the reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl RequestEnvelope {
    /// A call whose caller waits at most `timeout`
    pub fn call(method: &str, args: Value, reply_to: String, msg_id: String, timeout: Duration) -> Self {
        Self {
            msg_id,
            method: method.to_string(),
            args,
            reply_to: Some(reply_to),
            expires_at: Some(unix_now() + timeout.as_secs().max(1)),
        }
    }

    pub fn cast(method: &str, args: Value) -> Self {
        Self {
            msg_id: Uuid::new_v4().to_string(),
            method: method.to_string(),
            args,
            reply_to: None,
            expires_at: None,
        }
    }

    /// True once the caller has stopped waiting
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// Agent reply to a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyEnvelope {
    Result(Value),
    Failure(String),
}

/// Seconds since the unix epoch
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

/// Request list of one agent host
pub fn server_queue(topic: &str, server: &str) -> String {
    format!("{}.{}", topic, server)
}

/// Reply list of one call
pub fn reply_key(topic: &str, msg_id: &str) -> String {
    format!("{}.reply.{}", topic, msg_id)
}

/// Channel all agents subscribe to
pub fn fanout_channel(topic: &str) -> String {
    format!("{}_fanout", topic)
}

/// Redis-backed agent transport
pub struct RedisTransport {
    client: Client,
    publisher: ConnectionManager,
    topic: String,
    call_timeout: Duration,
    reply_ttl: Duration,
}

impl RedisTransport {
    /// Connect to Redis for the given agent topic
    #[instrument(skip_all, fields(topic = %topic))]
    pub async fn connect(
        url: &str,
        topic: &str,
        call_timeout: Duration,
        reply_ttl: Duration,
    ) -> DriverResult<Self> {
        let client = Client::open(url)?;
        let publisher = ConnectionManager::new(client.clone()).await?;
        debug!("Connected agent transport");
        Ok(Self {
            client,
            publisher,
            topic: topic.to_string(),
            call_timeout,
            reply_ttl,
        })
    }

    /// Undo a call nobody waits for any more
    ///
    /// Removes the request if no agent has taken it yet and makes sure a
    /// late reply does not linger.
    async fn withdraw(&self, queue: &str, payload: &str, reply_to: &str) {
        let mut publisher = self.publisher.clone();
        let removed: RedisResult<i64> = publisher.lrem(queue, 1, payload).await;
        match removed {
            Ok(0) => debug!(queue, "Timed out request already taken by the agent"),
            Ok(_) => debug!(queue, "Withdrew timed out request"),
            Err(e) => warn!(error = %e, queue, "Failed to withdraw timed out request"),
        }
        let ttl = i64::try_from(self.reply_ttl.as_secs()).unwrap_or(i64::MAX);
        let expired: RedisResult<bool> = publisher.expire(reply_to, ttl).await;
        if let Err(e) = expired {
            warn!(error = %e, reply_to, "Failed to expire reply key");
        }
    }
}

#[async_trait]
impl AgentTransport for RedisTransport {
    #[instrument(skip(self, args))]
    async fn call(&self, server: &str, method: &str, args: Value) -> DriverResult<Value> {
        let msg_id = Uuid::new_v4().to_string();
        let reply_to = reply_key(&self.topic, &msg_id);
        let request =
            RequestEnvelope::call(method, args, reply_to.clone(), msg_id, self.call_timeout);
        let payload = serde_json::to_string(&request)?;
        let queue = server_queue(&self.topic, server);

        let mut publisher = self.publisher.clone();
        let _: () = publisher.lpush(&queue, &payload).await?;

        // BRPOP holds its connection until it returns; a shared connection
        // would serialize concurrent calls, so each call waits on its own
        let mut waiter = self.client.get_multiplexed_async_connection().await?;
        let popped: Option<(String, String)> = waiter
            .brpop(&reply_to, self.call_timeout.as_secs_f64())
            .await?;

        let Some((_, raw)) = popped else {
            warn!(server, method, "Agent call timed out");
            self.withdraw(&queue, &payload, &reply_to).await;
            return Err(DriverError::Timeout {
                server: server.to_string(),
                method: method.to_string(),
                timeout: self.call_timeout,
            });
        };

        match serde_json::from_str::<ReplyEnvelope>(&raw)? {
            ReplyEnvelope::Result(value) => Ok(value),
            ReplyEnvelope::Failure(message) => {
                Err(DriverError::remote_failure(server, method, message))
            }
        }
    }

    #[instrument(skip(self, args))]
    async fn fanout_cast(&self, method: &str, args: Value) -> DriverResult<()> {
        let payload = serde_json::to_string(&RequestEnvelope::cast(method, args))?;

        let mut publisher = self.publisher.clone();
        let receivers: i64 = publisher
            .publish(fanout_channel(&self.topic), payload)
            .await?;
        debug!(receivers, "Fanout cast published");
        Ok(())
    }
}
