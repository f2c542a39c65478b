//! Neutron schema fixtures for topology and scenario tests
//!
//! [`TopologyFixture`] owns an in-memory sqlite database holding the subset
//! of the neutron schema the driver reads. Rows are added with one builder
//! per table; the canned topologies at the bottom seed whole networks and
//! routers at once.

use roth_topology::tables::{self, values};
use roth_topology::SqlTopologyStore;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use thiserror::Error;
use tracing::debug;

/// Fixture error types
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

/// Result type for fixture operations
pub type FixtureResult<T> = Result<T, FixtureError>;

const SCHEMA: &[&str] = &[
    "CREATE TABLE networks (id TEXT, project_id TEXT, name TEXT)",
    "CREATE TABLE networksegments (id TEXT, network_id TEXT, segmentation_id INTEGER)",
    "CREATE TABLE network_segment_ranges (id TEXT, name TEXT, minimum INTEGER)",
    "CREATE TABLE subnets (id TEXT, network_id TEXT, cidr TEXT, gateway_ip TEXT, subnetpool_id TEXT)",
    "CREATE TABLE subnetroutes (subnet_id TEXT, destination TEXT, nexthop TEXT)",
    "CREATE TABLE routers (id TEXT, gw_port_id TEXT)",
    "CREATE TABLE routerports (router_id TEXT, port_id TEXT, port_type TEXT)",
    "CREATE TABLE ports (id TEXT, network_id TEXT)",
    "CREATE TABLE ipallocations (port_id TEXT, ip_address TEXT, subnet_id TEXT)",
    "CREATE TABLE subnetpools (id TEXT, address_scope_id TEXT)",
    "CREATE TABLE addressscoperbacs (id TEXT, object_id TEXT, action TEXT)",
];

/// In-memory neutron database
pub struct TopologyFixture {
    pool: AnyPool,
}

impl TopologyFixture {
    /// Create an empty database with the schema in place
    pub async fn new() -> FixtureResult<Self> {
        sqlx::any::install_default_drivers();

        // every connection to sqlite::memory: is its own database, so the
        // pool holds exactly one for the fixture's lifetime
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        debug!(tables = SCHEMA.len(), "Created topology fixture schema");

        Ok(Self { pool })
    }

    /// A store reading this database
    pub fn store(&self) -> SqlTopologyStore {
        SqlTopologyStore::from_pool(self.pool.clone())
    }

    /// Run raw SQL, for rows the builders cannot express (NULL columns)
    pub async fn execute(&self, sql: &str) -> FixtureResult<()> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert(&self, sql: &'static str, values: &[&str]) -> FixtureResult<()> {
        let mut query = sqlx::query(sql);
        for value in values {
            query = query.bind(*value);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_with_number(
        &self,
        sql: &'static str,
        values: &[&str],
        number: i64,
    ) -> FixtureResult<()> {
        let mut query = sqlx::query(sql);
        for value in values {
            query = query.bind(*value);
        }
        query.bind(number).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn network(&self, id: &str, project_id: &str, name: &str) -> FixtureResult<()> {
        self.insert(
            "INSERT INTO networks (id, project_id, name) VALUES (?, ?, ?)",
            &[id, project_id, name],
        )
        .await
    }

    pub async fn segment(&self, network_id: &str, segmentation_id: i64) -> FixtureResult<()> {
        let id = format!("{}-seg-{}", network_id, segmentation_id);
        self.insert_with_number(
            "INSERT INTO networksegments (id, network_id, segmentation_id) VALUES (?, ?, ?)",
            &[&id, network_id],
            segmentation_id,
        )
        .await
    }

    /// Segment range of a project; its minimum is the project's VNI
    pub async fn segment_range(&self, project_id: &str, minimum: i64) -> FixtureResult<()> {
        let id = format!("range-{}-{}", project_id, minimum);
        self.insert_with_number(
            "INSERT INTO network_segment_ranges (id, name, minimum) VALUES (?, ?, ?)",
            &[&id, project_id],
            minimum,
        )
        .await
    }

    /// Subnet outside any pool
    pub async fn subnet(
        &self,
        id: &str,
        network_id: &str,
        cidr: &str,
        gateway_ip: &str,
    ) -> FixtureResult<()> {
        self.insert(
            "INSERT INTO subnets (id, network_id, cidr, gateway_ip) VALUES (?, ?, ?, ?)",
            &[id, network_id, cidr, gateway_ip],
        )
        .await
    }

    /// Subnet allocated from a subnet pool
    pub async fn pooled_subnet(
        &self,
        id: &str,
        network_id: &str,
        cidr: &str,
        gateway_ip: &str,
        subnetpool_id: &str,
    ) -> FixtureResult<()> {
        self.insert(
            "INSERT INTO subnets (id, network_id, cidr, gateway_ip, subnetpool_id) \
             VALUES (?, ?, ?, ?, ?)",
            &[id, network_id, cidr, gateway_ip, subnetpool_id],
        )
        .await
    }

    pub async fn subnet_route(
        &self,
        subnet_id: &str,
        destination: &str,
        nexthop: &str,
    ) -> FixtureResult<()> {
        self.insert(
            "INSERT INTO subnetroutes (subnet_id, destination, nexthop) VALUES (?, ?, ?)",
            &[subnet_id, destination, nexthop],
        )
        .await
    }

    pub async fn router(&self, id: &str, gw_port_id: &str) -> FixtureResult<()> {
        self.insert(
            "INSERT INTO routers (id, gw_port_id) VALUES (?, ?)",
            &[id, gw_port_id],
        )
        .await
    }

    pub async fn router_port(
        &self,
        router_id: &str,
        port_id: &str,
        port_type: &str,
    ) -> FixtureResult<()> {
        self.insert(
            "INSERT INTO routerports (router_id, port_id, port_type) VALUES (?, ?, ?)",
            &[router_id, port_id, port_type],
        )
        .await
    }

    pub async fn port(&self, id: &str, network_id: &str) -> FixtureResult<()> {
        self.insert(
            "INSERT INTO ports (id, network_id) VALUES (?, ?)",
            &[id, network_id],
        )
        .await
    }

    pub async fn ip_allocation(
        &self,
        port_id: &str,
        ip_address: &str,
        subnet_id: &str,
    ) -> FixtureResult<()> {
        self.insert(
            "INSERT INTO ipallocations (port_id, ip_address, subnet_id) VALUES (?, ?, ?)",
            &[port_id, ip_address, subnet_id],
        )
        .await
    }

    pub async fn subnet_pool(&self, id: &str, address_scope_id: &str) -> FixtureResult<()> {
        self.insert(
            "INSERT INTO subnetpools (id, address_scope_id) VALUES (?, ?)",
            &[id, address_scope_id],
        )
        .await
    }

    /// Share an address scope with every project
    pub async fn share_address_scope(&self, address_scope_id: &str) -> FixtureResult<()> {
        let id = format!("rbac-{}", address_scope_id);
        self.insert(
            "INSERT INTO addressscoperbacs (id, object_id, action) VALUES (?, ?, ?)",
            &[&id, address_scope_id, values::ACCESS_AS_SHARED],
        )
        .await
    }

    /// Number of rows in a table
    pub async fn count(&self, table: &str) -> FixtureResult<i64> {
        use sqlx::Row;

        // table names come from roth_topology::tables, never from input
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")?)
    }
}

/// A tenant network with a VNI, one segment and its subnets
#[derive(Debug, Clone)]
pub struct TenantNetworkSeed {
    pub network_id: String,
    pub project_id: String,
    pub name: String,
    /// Segment range minimum of the project; `None` leaves the project without one
    pub vni: Option<i64>,
    pub segmentation_id: i64,
    /// `(subnet_id, cidr, gateway_ip)`
    pub subnets: Vec<(String, String, String)>,
}

impl TenantNetworkSeed {
    pub fn new(network_id: &str, project_id: &str, name: &str) -> Self {
        Self {
            network_id: network_id.to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            vni: None,
            segmentation_id: 0,
            subnets: Vec::new(),
        }
    }

    pub fn with_vni(mut self, vni: i64) -> Self {
        self.vni = Some(vni);
        self
    }

    pub fn with_segment(mut self, segmentation_id: i64) -> Self {
        self.segmentation_id = segmentation_id;
        self
    }

    pub fn with_subnet(mut self, subnet_id: &str, cidr: &str, gateway_ip: &str) -> Self {
        self.subnets.push((
            subnet_id.to_string(),
            cidr.to_string(),
            gateway_ip.to_string(),
        ));
        self
    }
}

/// A router whose external gateway chain resolves completely
///
/// The gateway port lives on `external_network_id`, in a subnet allocated
/// from `subnetpool_id`, whose address scope is shared.
#[derive(Debug, Clone)]
pub struct RouterSeed {
    pub router_id: String,
    pub gateway_port_id: String,
    pub external_network_id: String,
    pub external_subnet_id: String,
    pub external_cidr: String,
    pub external_gateway_ip: String,
    pub router_ip: String,
    pub subnetpool_id: String,
    pub address_scope_id: String,
}

impl RouterSeed {
    pub fn new(router_id: &str) -> Self {
        Self {
            router_id: router_id.to_string(),
            gateway_port_id: format!("{}-gw", router_id),
            external_network_id: "ext-net".to_string(),
            external_subnet_id: "ext-subnet".to_string(),
            external_cidr: "203.0.113.0/24".to_string(),
            external_gateway_ip: "203.0.113.1".to_string(),
            router_ip: "203.0.113.10".to_string(),
            subnetpool_id: "ext-pool".to_string(),
            address_scope_id: "scope-public".to_string(),
        }
    }
}

impl TopologyFixture {
    /// Seed a tenant network
    pub async fn seed_tenant_network(&self, seed: &TenantNetworkSeed) -> FixtureResult<()> {
        self.network(&seed.network_id, &seed.project_id, &seed.name)
            .await?;
        if let Some(vni) = seed.vni {
            self.segment_range(&seed.project_id, vni).await?;
        }
        self.segment(&seed.network_id, seed.segmentation_id).await?;
        for (subnet_id, cidr, gateway_ip) in &seed.subnets {
            self.subnet(subnet_id, &seed.network_id, cidr, gateway_ip)
                .await?;
        }
        Ok(())
    }

    /// Seed a router with its gateway port, pool, scope and shared grant
    ///
    /// The external network itself is not created; seed it separately when
    /// the gateway network's VNI is needed.
    pub async fn seed_router(&self, seed: &RouterSeed) -> FixtureResult<()> {
        self.router(&seed.router_id, &seed.gateway_port_id).await?;
        self.router_port(&seed.router_id, &seed.gateway_port_id, "network:router_gateway")
            .await?;
        self.port(&seed.gateway_port_id, &seed.external_network_id)
            .await?;
        self.ip_allocation(
            &seed.gateway_port_id,
            &seed.router_ip,
            &seed.external_subnet_id,
        )
        .await?;
        self.pooled_subnet(
            &seed.external_subnet_id,
            &seed.external_network_id,
            &seed.external_cidr,
            &seed.external_gateway_ip,
            &seed.subnetpool_id,
        )
        .await?;
        self.subnet_pool(&seed.subnetpool_id, &seed.address_scope_id)
            .await?;
        self.share_address_scope(&seed.address_scope_id).await?;
        Ok(())
    }

    /// Attach a router to a port on a tenant network
    pub async fn attach_router_interface(
        &self,
        router_id: &str,
        port_id: &str,
        network_id: &str,
    ) -> FixtureResult<()> {
        self.router_port(router_id, port_id, "network:router_interface")
            .await?;
        self.port(port_id, network_id).await
    }

    /// Add an HA replicated interface of a router on a pooled subnet
    pub async fn seed_ha_interface(
        &self,
        router_id: &str,
        port_id: &str,
        subnet_id: &str,
        cidr: &str,
        subnetpool_id: &str,
        address_scope_id: &str,
    ) -> FixtureResult<()> {
        self.router_port(router_id, port_id, values::HA_ROUTER_REPLICATED_INTERFACE)
            .await?;
        self.ip_allocation(port_id, "169.254.192.1", subnet_id)
            .await?;
        self.pooled_subnet(subnet_id, "ha-net", cidr, "", subnetpool_id)
            .await?;
        self.subnet_pool(subnetpool_id, address_scope_id).await
    }
}

/// Tables the fixture creates
pub fn fixture_tables() -> [&'static str; 11] {
    [
        tables::NETWORKS_TABLE,
        tables::NETWORK_SEGMENTS_TABLE,
        tables::NETWORK_SEGMENT_RANGES_TABLE,
        tables::SUBNETS_TABLE,
        tables::SUBNET_ROUTES_TABLE,
        tables::ROUTERS_TABLE,
        tables::ROUTER_PORTS_TABLE,
        tables::PORTS_TABLE,
        tables::IP_ALLOCATIONS_TABLE,
        tables::SUBNET_POOLS_TABLE,
        tables::ADDRESS_SCOPE_RBACS_TABLE,
    ]
}
