//! RPC command builders for the RotH agent

use roth_topology::SegmentId;
use serde_json::{json, Value};

use crate::types::VrfDescriptor;

/// Default agent topic
pub const AGENT_TOPIC: &str = "roth_agent";

/// Targeted call that builds a tenant VRF on one host
pub const SETUP_TENANT_VRF: &str = "call_setup_tenant_vrf";

/// Broadcast that removes a tenant VRF everywhere
pub const DELETE_TENANT_VRF: &str = "call_delete_tenant_vrf";

/// Build `call_setup_tenant_vrf` arguments
///
/// Optional parts of the descriptor are sent as `null`.
pub fn build_setup_tenant_vrf_args(descriptor: &VrfDescriptor) -> Value {
    let router = descriptor.router.as_ref();
    json!({
        "bridge_id": descriptor.bridge_id,
        "vni": descriptor.vni,
        "gateways": descriptor.gateways,
        "transit": descriptor.transit,
        "segment_id": descriptor.segment_id,
        "router_id": router.map(|r| &r.router_id),
        "bgp_id": router.map(|r| &r.bgp_id),
        "bgp_peer": router.map(|r| &r.bgp_peer),
        "router_networks": router.map(|r| &r.router_networks),
    })
}

/// Build `call_delete_tenant_vrf` arguments
pub fn build_delete_tenant_vrf_args(segment_id: SegmentId) -> Value {
    json!({ "segment_id": segment_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RouterPeering;
    use pretty_assertions::assert_eq;
    use roth_topology::TransitRoute;

    fn descriptor() -> VrfDescriptor {
        VrfDescriptor {
            bridge_id: "brqnet-1".to_string(),
            vni: 500,
            gateways: vec!["10.0.0.1/24".to_string()],
            transit: None,
            host_id: "compute-1".to_string(),
            segment_id: 42,
            router: None,
        }
    }

    #[test]
    fn test_build_setup_args_plain_port() {
        let args = build_setup_tenant_vrf_args(&descriptor());
        assert_eq!(
            args,
            json!({
                "bridge_id": "brqnet-1",
                "vni": 500,
                "gateways": ["10.0.0.1/24"],
                "transit": null,
                "segment_id": 42,
                "router_id": null,
                "bgp_id": null,
                "bgp_peer": null,
                "router_networks": null,
            })
        );
    }

    #[test]
    fn test_build_setup_args_transit_router_port() {
        let mut d = descriptor();
        d.transit = Some(TransitRoute::new("0.0.0.0/0", "10.0.0.254"));
        d.router = Some(RouterPeering {
            router_id: "router-1".to_string(),
            bgp_id: "203.0.113.10".to_string(),
            bgp_peer: "203.0.113.1".to_string(),
            router_networks: vec!["192.168.1.0/24".to_string()],
        });

        let args = build_setup_tenant_vrf_args(&d);
        assert_eq!(
            args["transit"],
            json!({ "destination": "0.0.0.0/0", "nexthop": "10.0.0.254" })
        );
        assert_eq!(args["router_id"], "router-1");
        assert_eq!(args["bgp_id"], "203.0.113.10");
        assert_eq!(args["bgp_peer"], "203.0.113.1");
        assert_eq!(args["router_networks"], json!(["192.168.1.0/24"]));
    }

    #[test]
    fn test_host_is_not_an_argument() {
        let args = build_setup_tenant_vrf_args(&descriptor());
        assert!(args.get("host_id").is_none());
    }

    #[test]
    fn test_build_delete_args() {
        assert_eq!(build_delete_tenant_vrf_args(42), json!({ "segment_id": 42 }));
    }
}
