//! End-to-end driver scenarios: topology rows in, agent traffic out

use std::sync::Arc;

use pretty_assertions::assert_eq;
use roth_driver::commands::{DELETE_TENANT_VRF, SETUP_TENANT_VRF};
use roth_driver::{
    handle_event, process_request, DriverEvent, EventOutcome, EventRequest, MechanismDriver,
    NetworkContext, PortContext, RothMechanismDriver, SkipReason,
};
use roth_test::{
    RecordingReplies, RecordingTransport, RouterSeed, TenantNetworkSeed, TopologyFixture,
};
use serde_json::json;

struct Harness {
    fixture: TopologyFixture,
    transport: Arc<RecordingTransport>,
}

impl Harness {
    async fn new() -> Self {
        Self::with_transport(RecordingTransport::new()).await
    }

    async fn with_transport(transport: RecordingTransport) -> Self {
        Self {
            fixture: TopologyFixture::new().await.unwrap(),
            transport: Arc::new(transport),
        }
    }

    fn driver(&self) -> RothMechanismDriver {
        RothMechanismDriver::new(Arc::new(self.fixture.store()), self.transport.clone())
    }
}

fn tenant_net_one() -> TenantNetworkSeed {
    TenantNetworkSeed::new("net-1", "p1", "net-one")
        .with_vni(500)
        .with_segment(42)
        .with_subnet("sub-4", "10.0.0.0/24", "10.0.0.1")
        .with_subnet("sub-6", "2001:db8::/64", "2001:db8::1")
}

fn compute_port(network_id: &str) -> PortContext {
    PortContext::new("port-1", "ACTIVE", network_id, "compute:nova", "compute-1")
}

#[tokio::test]
async fn test_scenario_a_plain_tenant_port() {
    let harness = Harness::new().await;
    harness.fixture.seed_tenant_network(&tenant_net_one()).await.unwrap();

    let outcome = harness
        .driver()
        .update_port_postcommit(&compute_port("net-1"))
        .await;

    assert_eq!(outcome, EventOutcome::Dispatched(json!({ "status": "ok" })));
    let calls = harness.transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].server, "compute-1");
    assert_eq!(calls[0].method, SETUP_TENANT_VRF);
    assert_eq!(
        calls[0].args,
        json!({
            "bridge_id": "brqnet-1",
            "vni": 500,
            "gateways": ["10.0.0.1/24", "2001:db8::1/64"],
            "transit": null,
            "segment_id": 42,
            "router_id": null,
            "bgp_id": null,
            "bgp_peer": null,
            "router_networks": null,
        })
    );
    assert!(harness.transport.casts().is_empty());
}

#[tokio::test]
async fn test_scenario_b_transit_network() {
    let harness = Harness::new().await;
    harness
        .fixture
        .seed_tenant_network(
            &TenantNetworkSeed::new("net-t", "p1", "transit-net")
                .with_vni(500)
                .with_segment(42)
                .with_subnet("transit-sub", "192.0.2.0/29", "192.0.2.1"),
        )
        .await
        .unwrap();
    harness
        .fixture
        .subnet_route("transit-sub", "0.0.0.0/0", "192.0.2.2")
        .await
        .unwrap();

    let outcome = harness
        .driver()
        .update_port_postcommit(&compute_port("net-t"))
        .await;

    assert!(matches!(outcome, EventOutcome::Dispatched(_)));
    let calls = harness.transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].args["gateways"], json!(["192.0.2.1/29"]));
    assert_eq!(
        calls[0].args["transit"],
        json!({ "destination": "0.0.0.0/0", "nexthop": "192.0.2.2" })
    );
    assert_eq!(calls[0].args["router_id"], json!(null));
}

#[tokio::test]
async fn test_transit_network_without_route_sends_nothing() {
    let harness = Harness::new().await;
    harness
        .fixture
        .seed_tenant_network(
            &TenantNetworkSeed::new("net-t", "p1", "transit-net")
                .with_vni(500)
                .with_segment(42)
                .with_subnet("transit-sub", "192.0.2.0/29", "192.0.2.1"),
        )
        .await
        .unwrap();

    let outcome = harness
        .driver()
        .update_port_postcommit(&compute_port("net-t"))
        .await;

    assert_eq!(
        outcome,
        EventOutcome::Skipped(SkipReason::InvalidTransitRoute {
            subnet_id: "transit-sub".to_string()
        })
    );
    assert!(harness.transport.is_silent());
}

/// Tenant network without its own VNI, routed through `router-1`
async fn seed_routed_tenant(harness: &Harness) -> RouterSeed {
    seed_routed_tenant_named(harness, "net-one").await
}

async fn seed_routed_tenant_named(harness: &Harness, name: &str) -> RouterSeed {
    let fixture = &harness.fixture;
    fixture
        .seed_tenant_network(
            &TenantNetworkSeed::new("net-1", "p1", name)
                .with_segment(42)
                .with_subnet("sub-4", "10.0.0.0/24", "10.0.0.1"),
        )
        .await
        .unwrap();

    let seed = RouterSeed::new("router-1");
    fixture.seed_router(&seed).await.unwrap();
    fixture
        .seed_tenant_network(
            &TenantNetworkSeed::new(&seed.external_network_id, "ext-project", "public")
                .with_vni(900)
                .with_segment(90),
        )
        .await
        .unwrap();
    fixture
        .attach_router_interface(&seed.router_id, "port-r", "net-1")
        .await
        .unwrap();
    fixture
        .seed_ha_interface(&seed.router_id, "ha-1", "sub-a", "10.1.0.0/24", "pool-a", "scope-public")
        .await
        .unwrap();
    fixture
        .seed_ha_interface(&seed.router_id, "ha-2", "sub-b", "10.2.0.0/24", "pool-b", "scope-private")
        .await
        .unwrap();
    seed
}

#[tokio::test]
async fn test_scenario_c_router_port_via_gateway() {
    let harness = Harness::new().await;
    seed_routed_tenant(&harness).await;

    let port = PortContext::new(
        "port-r",
        "ACTIVE",
        "net-1",
        "network:router_interface_distributed",
        "network-1",
    );
    let outcome = harness.driver().update_port_postcommit(&port).await;

    assert!(matches!(outcome, EventOutcome::Dispatched(_)));
    let calls = harness.transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].server, "network-1");
    assert_eq!(
        calls[0].args,
        json!({
            "bridge_id": "brqext-net",
            "vni": 900,
            "gateways": ["203.0.113.1/24"],
            "transit": null,
            "segment_id": 90,
            "router_id": "router-1",
            "bgp_id": "203.0.113.10",
            "bgp_peer": "203.0.113.1",
            "router_networks": ["10.1.0.0/24"],
        })
    );
}

#[tokio::test]
async fn test_transit_router_port_reads_gateway_network() {
    let harness = Harness::new().await;
    let seed = seed_routed_tenant_named(&harness, "transit-a").await;
    // Only the gateway network's subnet carries a route; the tenant subnet has none
    harness
        .fixture
        .subnet_route(&seed.external_subnet_id, "0.0.0.0/0", &seed.external_gateway_ip)
        .await
        .unwrap();

    let port = PortContext::new("port-r", "ACTIVE", "net-1", "network:router_interface", "network-1");
    let outcome = harness.driver().update_port_postcommit(&port).await;

    assert!(matches!(outcome, EventOutcome::Dispatched(_)));
    let calls = harness.transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].args["bridge_id"], json!("brqext-net"));
    assert_eq!(calls[0].args["vni"], json!(900));
    assert_eq!(calls[0].args["segment_id"], json!(90));
    assert_eq!(calls[0].args["gateways"], json!(["203.0.113.1/24"]));
    assert_eq!(
        calls[0].args["transit"],
        json!({ "destination": "0.0.0.0/0", "nexthop": "203.0.113.1" })
    );
    assert_eq!(calls[0].args["router_id"], json!("router-1"));
}

#[tokio::test]
async fn test_router_port_not_eligible_sends_nothing() {
    let harness = Harness::new().await;
    seed_routed_tenant(&harness).await;
    harness
        .fixture
        .execute("DELETE FROM addressscoperbacs")
        .await
        .unwrap();

    let port = PortContext::new("port-r", "ACTIVE", "net-1", "network:router_interface", "network-1");
    let outcome = harness.driver().update_port_postcommit(&port).await;

    assert_eq!(
        outcome,
        EventOutcome::Skipped(SkipReason::RouterNotEligible {
            router_id: "router-1".to_string()
        })
    );
    assert!(harness.transport.is_silent());
}

#[tokio::test]
async fn test_project_without_vni_or_router_sends_nothing() {
    let harness = Harness::new().await;
    harness
        .fixture
        .seed_tenant_network(
            &TenantNetworkSeed::new("net-1", "p1", "net-one")
                .with_segment(42)
                .with_subnet("sub-4", "10.0.0.0/24", "10.0.0.1"),
        )
        .await
        .unwrap();

    let outcome = harness
        .driver()
        .update_port_postcommit(&compute_port("net-1"))
        .await;

    assert_eq!(
        outcome,
        EventOutcome::Skipped(SkipReason::NoVniOrRouter {
            port_id: "port-1".to_string()
        })
    );
    assert!(harness.transport.is_silent());
}

#[tokio::test]
async fn test_port_down_sends_nothing() {
    let harness = Harness::new().await;
    harness.fixture.seed_tenant_network(&tenant_net_one()).await.unwrap();

    let mut port = compute_port("net-1");
    port.status = "DOWN".to_string();
    let outcome = harness.driver().update_port_postcommit(&port).await;

    assert_eq!(outcome, EventOutcome::Skipped(SkipReason::PortDown));
    assert!(harness.transport.is_silent());
}

#[tokio::test]
async fn test_agent_failure_is_contained() {
    let harness = Harness::with_transport(RecordingTransport::failing("bridge busy")).await;
    harness.fixture.seed_tenant_network(&tenant_net_one()).await.unwrap();

    let outcome = harness
        .driver()
        .update_port_postcommit(&compute_port("net-1"))
        .await;

    assert!(matches!(outcome, EventOutcome::DispatchFailed(message) if message.contains("bridge busy")));
    assert_eq!(harness.transport.calls().len(), 1);
}

#[tokio::test]
async fn test_network_delete_broadcasts_segment() {
    let harness = Harness::new().await;
    harness.fixture.seed_tenant_network(&tenant_net_one()).await.unwrap();

    let outcome = harness
        .driver()
        .delete_network_precommit(&NetworkContext::new("net-1"))
        .await;

    assert_eq!(outcome, EventOutcome::Dispatched(json!(null)));
    let casts = harness.transport.casts();
    assert_eq!(casts.len(), 1);
    assert_eq!(casts[0].method, DELETE_TENANT_VRF);
    assert_eq!(casts[0].args, json!({ "segment_id": 42 }));
    assert!(harness.transport.calls().is_empty());
}

#[tokio::test]
async fn test_scenario_d_network_delete_with_two_segments() {
    let harness = Harness::new().await;
    harness.fixture.segment("net-1", 42).await.unwrap();
    harness.fixture.segment("net-1", 43).await.unwrap();

    let outcome = harness
        .driver()
        .delete_network_precommit(&NetworkContext::new("net-1"))
        .await;

    assert_eq!(
        outcome,
        EventOutcome::Skipped(SkipReason::NoSegment {
            network_id: "net-1".to_string()
        })
    );
    assert!(harness.transport.is_silent());
}

#[tokio::test]
async fn test_decoded_event_reaches_driver() {
    let harness = Harness::new().await;
    harness.fixture.seed_tenant_network(&tenant_net_one()).await.unwrap();
    let driver = harness.driver();

    let event = DriverEvent::decode(
        r#"{"event": "update_port_postcommit", "current": {
            "id": "port-1", "status": "ACTIVE", "network_id": "net-1",
            "device_owner": "compute:nova", "binding:host_id": "compute-7"}}"#,
    )
    .unwrap();
    let outcome = handle_event(&driver, event).await;

    assert!(matches!(outcome, EventOutcome::Dispatched(_)));
    assert_eq!(harness.transport.calls()[0].server, "compute-7");
}

#[tokio::test]
async fn test_events_are_independent() {
    let harness = Harness::new().await;
    harness.fixture.seed_tenant_network(&tenant_net_one()).await.unwrap();
    let driver = harness.driver();

    let first = driver.update_port_postcommit(&compute_port("net-1")).await;
    let second = driver.update_port_postcommit(&compute_port("net-1")).await;

    assert_eq!(first, second);
    let calls = harness.transport.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], calls[1]);
}

#[tokio::test]
async fn test_queued_network_delete_replies_after_broadcast() {
    let harness = Harness::new().await;
    harness.fixture.segment("net-1", 42).await.unwrap();
    let replies = RecordingReplies::new(harness.transport.clone());

    let request = EventRequest::decode(
        r#"{"msg_id": "m1", "reply_to": "roth_events.reply.m1",
            "event": "delete_network_precommit", "current": {"id": "net-1"}}"#,
    )
    .unwrap();
    let outcome = process_request(&harness.driver(), &replies, request).await;

    assert_eq!(outcome, EventOutcome::Dispatched(json!(null)));
    let recorded = replies.replies();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].reply_to, "roth_events.reply.m1");
    assert_eq!(recorded[0].reply.msg_id, "m1");
    assert_eq!(recorded[0].reply.outcome, "dispatched");
    assert_eq!(recorded[0].casts_before, 1);
    assert_eq!(harness.transport.casts().len(), 1);
}

#[tokio::test]
async fn test_queued_port_update_replies_with_agent_result() {
    let harness = Harness::new().await;
    harness.fixture.seed_tenant_network(&tenant_net_one()).await.unwrap();
    let replies = RecordingReplies::new(harness.transport.clone());

    let request = EventRequest {
        msg_id: "m2".to_string(),
        reply_to: Some("roth_events.reply.m2".to_string()),
        event: DriverEvent::UpdatePortPostcommit(compute_port("net-1")),
    };
    process_request(&harness.driver(), &replies, request).await;

    let recorded = replies.replies();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].calls_before, 1);
    assert_eq!(recorded[0].reply.detail, json!({ "status": "ok" }));
}
