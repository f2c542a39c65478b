//! Lifecycle event intake
//!
//! The orchestration framework pushes each callback as a JSON request onto a
//! Redis list and, for callbacks it must order against, waits on `reply_to`:
//!
//! ```json
//! {"msg_id": "...", "event": "update_port_postcommit", "current": {"id": "...", "status": "ACTIVE", ...}}
//! {"msg_id": "...", "reply_to": "roth_events.reply.<msg_id>", "event": "delete_network_precommit", "current": {"id": "..."}}
//! ```
//!
//! The reply is pushed only after the driver has finished the callback, so a
//! precommit reply means the teardown cast has already gone out.
//!
//! Every event is handled on its own task; events share nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::driver::{EventOutcome, MechanismDriver};
use crate::error::{DriverError, DriverResult};
use crate::types::{NetworkContext, PortContext};

/// How long one intake poll blocks before the shutdown flag is checked again
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// First reconnect delay after an intake failure
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Reconnect delay ceiling
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// A lifecycle callback with its context snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "current", rename_all = "snake_case")]
pub enum DriverEvent {
    UpdatePortPostcommit(PortContext),
    DeleteNetworkPrecommit(NetworkContext),
}

impl DriverEvent {
    /// Decode a bare event payload
    pub fn decode(payload: &str) -> DriverResult<Self> {
        serde_json::from_str(payload).map_err(|e| DriverError::InvalidEvent(e.to_string()))
    }
}

/// One queued callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRequest {
    #[serde(default)]
    pub msg_id: String,
    /// List the outcome is pushed to; absent when nobody waits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(flatten)]
    pub event: DriverEvent,
}

impl EventRequest {
    pub fn decode(payload: &str) -> DriverResult<Self> {
        serde_json::from_str(payload).map_err(|e| DriverError::InvalidEvent(e.to_string()))
    }
}

/// Outcome report pushed to `reply_to`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventReply {
    pub msg_id: String,
    /// `dispatched`, `skipped` or `dispatch_failed`
    pub outcome: String,
    pub detail: Value,
}

impl EventReply {
    pub fn new(msg_id: &str, outcome: &EventOutcome) -> Self {
        let (kind, detail) = match outcome {
            EventOutcome::Dispatched(reply) => ("dispatched", reply.clone()),
            EventOutcome::Skipped(reason) => (
                "skipped",
                json!({
                    "reason": reason.to_string(),
                    "retryable": reason.is_retryable(),
                }),
            ),
            EventOutcome::DispatchFailed(message) => ("dispatch_failed", json!(message)),
        };
        Self {
            msg_id: msg_id.to_string(),
            outcome: kind.to_string(),
            detail,
        }
    }
}

/// Where event outcomes are reported
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn reply(&self, reply_to: &str, reply: &EventReply) -> DriverResult<()>;
}

/// Pushes replies onto Redis lists that expire if nobody collects them
#[derive(Clone)]
pub struct RedisReplySink {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisReplySink {
    pub fn new(conn: ConnectionManager, ttl: Duration) -> Self {
        Self { conn, ttl }
    }
}

#[async_trait]
impl ReplySink for RedisReplySink {
    async fn reply(&self, reply_to: &str, reply: &EventReply) -> DriverResult<()> {
        let payload = serde_json::to_string(reply)?;
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(reply_to, payload).await?;
        let _: bool = conn.expire(reply_to, ttl).await?;
        Ok(())
    }
}

/// Route an event to the matching driver callback
pub async fn handle_event(driver: &dyn MechanismDriver, event: DriverEvent) -> EventOutcome {
    match event {
        DriverEvent::UpdatePortPostcommit(port) => driver.update_port_postcommit(&port).await,
        DriverEvent::DeleteNetworkPrecommit(network) => {
            driver.delete_network_precommit(&network).await
        }
    }
}

/// Handle one request, then report its outcome if the sender waits for it
pub async fn process_request(
    driver: &dyn MechanismDriver,
    replies: &dyn ReplySink,
    request: EventRequest,
) -> EventOutcome {
    let outcome = handle_event(driver, request.event).await;

    if let Some(reply_to) = request.reply_to.as_deref() {
        let reply = EventReply::new(&request.msg_id, &outcome);
        if let Err(e) = replies.reply(reply_to, &reply).await {
            warn!(error = %e, msg_id = %request.msg_id, reply_to, "Failed to send event reply");
        }
    }
    outcome
}

/// Exponential reconnect delay
#[derive(Debug)]
struct Backoff {
    current: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            current: INITIAL_BACKOFF,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(MAX_BACKOFF);
        delay
    }

    fn reset(&mut self) {
        self.current = INITIAL_BACKOFF;
    }
}

/// Pops events off the intake queue and feeds the driver
pub struct EventListener {
    client: Client,
    queue: String,
    reply_ttl: Duration,
}

impl EventListener {
    pub fn new(redis_url: &str, queue: impl Into<String>, reply_ttl: Duration) -> DriverResult<Self> {
        Ok(Self {
            client: Client::open(redis_url)?,
            queue: queue.into(),
            reply_ttl,
        })
    }

    /// Intake waits on its own connection; replies go out on another so a
    /// pending pop never holds them up
    async fn connect(&self) -> DriverResult<(ConnectionManager, Arc<RedisReplySink>)> {
        let intake = ConnectionManager::new(self.client.clone()).await?;
        let replies = ConnectionManager::new(self.client.clone()).await?;
        Ok((intake, Arc::new(RedisReplySink::new(replies, self.reply_ttl))))
    }

    /// Process events until `shutdown` is set, then wait for in-flight events
    ///
    /// Redis failures never end the loop; the listener backs off and
    /// reconnects.
    pub async fn run(self, driver: Arc<dyn MechanismDriver>, shutdown: Arc<AtomicBool>) {
        let mut backoff = Backoff::new();
        let mut in_flight = JoinSet::new();
        let mut connection: Option<(ConnectionManager, Arc<RedisReplySink>)> = None;

        info!(queue = %self.queue, "Listening for lifecycle events");

        while !shutdown.load(Ordering::Relaxed) {
            while in_flight.try_join_next().is_some() {}

            let (mut intake, replies) = match connection.clone() {
                Some(connected) => connected,
                None => match self.connect().await {
                    Ok(connected) => {
                        connection = Some(connected.clone());
                        connected
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to connect event intake");
                        tokio::time::sleep(backoff.next_delay()).await;
                        continue;
                    }
                },
            };

            let popped: RedisResult<Option<(String, String)>> =
                intake.brpop(&self.queue, POLL_INTERVAL.as_secs_f64()).await;

            let payload = match popped {
                Ok(Some((_, payload))) => payload,
                Ok(None) => {
                    backoff.reset();
                    continue;
                }
                Err(e) => {
                    let err = DriverError::from(e);
                    let delay = backoff.next_delay();
                    warn!(
                        error = %err,
                        retryable = err.is_retryable(),
                        ?delay,
                        "Event intake failed, reconnecting"
                    );
                    connection = None;
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };
            backoff.reset();

            let request = match EventRequest::decode(&payload) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "Dropping undecodable event");
                    continue;
                }
            };
            debug!(?request, "Received event");

            let driver = Arc::clone(&driver);
            in_flight.spawn(async move {
                process_request(driver.as_ref(), replies.as_ref(), request).await;
            });
        }

        info!("Shutdown requested, no longer accepting events");
        while in_flight.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::RothMechanismDriver;
    use crate::resolver::SkipReason;
    use crate::transport::AgentTransport;
    use pretty_assertions::assert_eq;
    use roth_topology::{Lookup, MockTopologyStore};
    use std::sync::Mutex;

    type Journal = Arc<Mutex<Vec<String>>>;

    /// Records deliveries into a journal shared with [`JournalReplies`]
    struct JournalTransport(Journal);

    #[async_trait]
    impl AgentTransport for JournalTransport {
        async fn call(&self, _server: &str, method: &str, _args: Value) -> DriverResult<Value> {
            self.0.lock().unwrap().push(format!("call {}", method));
            Ok(json!({ "status": "ok" }))
        }

        async fn fanout_cast(&self, method: &str, _args: Value) -> DriverResult<()> {
            // Yield so a reply racing the cast would land first
            tokio::task::yield_now().await;
            self.0.lock().unwrap().push(format!("cast {}", method));
            Ok(())
        }
    }

    struct JournalReplies(Journal);

    #[async_trait]
    impl ReplySink for JournalReplies {
        async fn reply(&self, reply_to: &str, reply: &EventReply) -> DriverResult<()> {
            self.0
                .lock()
                .unwrap()
                .push(format!("reply {} {}", reply_to, reply.outcome));
            Ok(())
        }
    }

    fn delete_request(reply_to: Option<&str>) -> EventRequest {
        EventRequest {
            msg_id: "m1".to_string(),
            reply_to: reply_to.map(str::to_string),
            event: DriverEvent::DeleteNetworkPrecommit(NetworkContext::new("net-1")),
        }
    }

    fn segment_store(segment: Option<u32>) -> MockTopologyStore {
        let mut store = MockTopologyStore::new();
        store.expect_segment_for_network().returning(move |_| {
            Ok(match segment {
                Some(id) => Lookup::Found(id),
                None => Lookup::NotFound,
            })
        });
        store
    }

    #[tokio::test]
    async fn test_precommit_reply_follows_teardown_cast() {
        let journal = Journal::default();
        let driver = RothMechanismDriver::new(
            Arc::new(segment_store(Some(42))),
            Arc::new(JournalTransport(journal.clone())),
        );
        let replies = JournalReplies(journal.clone());

        let outcome =
            process_request(&driver, &replies, delete_request(Some("roth_events.reply.m1"))).await;

        assert_eq!(outcome, EventOutcome::Dispatched(Value::Null));
        assert_eq!(
            *journal.lock().unwrap(),
            vec![
                "cast call_delete_tenant_vrf".to_string(),
                "reply roth_events.reply.m1 dispatched".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_skipped_precommit_still_replies() {
        let journal = Journal::default();
        let driver = RothMechanismDriver::new(
            Arc::new(segment_store(None)),
            Arc::new(JournalTransport(journal.clone())),
        );

        let outcome = process_request(
            &driver,
            &JournalReplies(journal.clone()),
            delete_request(Some("roth_events.reply.m1")),
        )
        .await;

        assert!(matches!(outcome, EventOutcome::Skipped(SkipReason::NoSegment { .. })));
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["reply roth_events.reply.m1 skipped".to_string()]
        );
    }

    #[tokio::test]
    async fn test_no_reply_without_reply_to() {
        let journal = Journal::default();
        let driver = RothMechanismDriver::new(
            Arc::new(segment_store(Some(42))),
            Arc::new(JournalTransport(journal.clone())),
        );

        process_request(&driver, &JournalReplies(journal.clone()), delete_request(None)).await;

        assert_eq!(
            *journal.lock().unwrap(),
            vec!["cast call_delete_tenant_vrf".to_string()]
        );
    }

    #[test]
    fn test_decode_request() {
        let request = EventRequest::decode(
            r#"{"msg_id": "m7", "reply_to": "roth_events.reply.m7",
                "event": "delete_network_precommit", "current": {"id": "net-1"}}"#,
        )
        .unwrap();
        assert_eq!(request.msg_id, "m7");
        assert_eq!(request.reply_to.as_deref(), Some("roth_events.reply.m7"));
        assert_eq!(
            request.event,
            DriverEvent::DeleteNetworkPrecommit(NetworkContext::new("net-1"))
        );
    }

    #[test]
    fn test_decode_request_without_reply() {
        let request = EventRequest::decode(
            r#"{"event": "update_port_postcommit", "current": {
                "id": "port-1", "status": "DOWN", "network_id": "net-1",
                "device_owner": "compute:nova", "binding:host_id": ""}}"#,
        )
        .unwrap();
        assert_eq!(request.msg_id, "");
        assert_eq!(request.reply_to, None);
        assert!(matches!(request.event, DriverEvent::UpdatePortPostcommit(_)));
    }

    #[test]
    fn test_decode_request_unknown_event() {
        let result = EventRequest::decode(r#"{"msg_id": "m1", "event": "bogus", "current": {}}"#);
        assert!(matches!(result, Err(DriverError::InvalidEvent(_))));
    }

    #[test]
    fn test_reply_for_skip() {
        let reply = EventReply::new(
            "m1",
            &EventOutcome::Skipped(SkipReason::StoreError {
                step: "network",
                message: "pool timed out".to_string(),
                retryable: true,
            }),
        );
        assert_eq!(reply.outcome, "skipped");
        assert_eq!(reply.detail["retryable"], json!(true));
    }

    #[test]
    fn test_reply_for_dispatch_failure() {
        let reply = EventReply::new("m1", &EventOutcome::DispatchFailed("closed".to_string()));
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({ "msg_id": "m1", "outcome": "dispatch_failed", "detail": "closed" })
        );
    }

    #[test]
    fn test_backoff_doubles_to_ceiling() {
        let mut backoff = Backoff::new();
        let delays: Vec<Duration> = (0..8).map(|_| backoff.next_delay()).collect();

        assert_eq!(delays[0], INITIAL_BACKOFF);
        assert_eq!(delays[1], INITIAL_BACKOFF * 2);
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(*delays.last().unwrap(), MAX_BACKOFF);

        backoff.reset();
        assert_eq!(backoff.next_delay(), INITIAL_BACKOFF);
    }

    #[test]
    fn test_decode_port_event() {
        let event = DriverEvent::decode(
            r#"{"event": "update_port_postcommit", "current": {
                "id": "port-1", "status": "ACTIVE", "network_id": "net-1",
                "device_owner": "compute:nova", "binding:host_id": "compute-1"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            DriverEvent::UpdatePortPostcommit(PortContext::new(
                "port-1",
                "ACTIVE",
                "net-1",
                "compute:nova",
                "compute-1"
            ))
        );
    }

    #[test]
    fn test_decode_network_event() {
        let event = DriverEvent::decode(
            r#"{"event": "delete_network_precommit", "current": {"id": "net-1", "name": "x"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            DriverEvent::DeleteNetworkPrecommit(NetworkContext::new("net-1"))
        );
    }

    #[test]
    fn test_decode_unknown_event() {
        let result = DriverEvent::decode(r#"{"event": "create_subnet_postcommit", "current": {}}"#);
        assert!(matches!(result, Err(DriverError::InvalidEvent(_))));
    }

    #[test]
    fn test_decode_missing_fields() {
        let result =
            DriverEvent::decode(r#"{"event": "update_port_postcommit", "current": {"id": "p"}}"#);
        assert!(matches!(result, Err(DriverError::InvalidEvent(_))));
    }
}
