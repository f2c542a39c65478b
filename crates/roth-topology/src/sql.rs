//! SQL implementation of [`TopologyStore`].
//!
//! Every lookup is a single parameterized statement; identifiers are always
//! bound, never interpolated into the query text. The pool is opened through
//! the sqlx `Any` driver so the same code serves the MySQL neutron database
//! in production and sqlite in tests.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use tracing::{debug, info, instrument};

use crate::error::{TopologyError, TopologyResult};
use crate::lookup::Lookup;
use crate::store::TopologyStore;
use crate::tables::{self, values};
use crate::types::*;

const NETWORK_BY_ID: &str = "SELECT id, project_id, name FROM networks WHERE id = ?";
const SEGMENT_BY_NETWORK: &str =
    "SELECT segmentation_id FROM networksegments WHERE network_id = ?";
const GATEWAYS_BY_NETWORK: &str = "SELECT gateway_ip, cidr FROM subnets WHERE network_id = ?";
const SUBNET_BY_NETWORK: &str = "SELECT id FROM subnets WHERE network_id = ?";
const ROUTES_BY_SUBNET: &str = "SELECT destination, nexthop FROM subnetroutes WHERE subnet_id = ?";
const ROUTER_BY_PORT: &str = "SELECT router_id FROM routerports WHERE port_id = ?";
const GATEWAY_PORT_BY_ROUTER: &str = "SELECT gw_port_id FROM routers WHERE id = ?";
const ALLOCATION_BY_PORT: &str = "SELECT ip_address, subnet_id FROM ipallocations WHERE port_id = ?";
const POOL_AND_GATEWAY_BY_SUBNET: &str =
    "SELECT subnetpool_id, gateway_ip FROM subnets WHERE id = ?";
const SCOPE_BY_POOL: &str = "SELECT address_scope_id FROM subnetpools WHERE id = ?";
const SHARED_GRANT_BY_SCOPE: &str =
    "SELECT id FROM addressscoperbacs WHERE object_id = ? AND action = ?";
const PORTS_BY_ROUTER_AND_TYPE: &str =
    "SELECT port_id FROM routerports WHERE router_id = ? AND port_type = ?";
const SUBNET_BY_PORT: &str = "SELECT subnet_id FROM ipallocations WHERE port_id = ?";
const CIDR_AND_POOL_BY_SUBNET: &str = "SELECT cidr, subnetpool_id FROM subnets WHERE id = ?";
const RANGE_MINIMUM_BY_NAME: &str = "SELECT minimum FROM network_segment_ranges WHERE name = ?";
const NETWORK_BY_PORT: &str = "SELECT network_id FROM ports WHERE id = ?";
const PROJECT_BY_NETWORK: &str = "SELECT project_id FROM networks WHERE id = ?";

/// Unwraps a found chain step or returns the miss from the enclosing lookup.
macro_rules! chain_step {
    ($lookup:expr, $step:literal, $key:expr) => {
        match $lookup {
            Lookup::Found(value) => value,
            Lookup::NotFound => {
                debug!(step = $step, key = %$key, "Lookup chain stopped: not found");
                return Ok(Lookup::NotFound);
            }
            Lookup::Ambiguous { rows } => {
                debug!(step = $step, key = %$key, rows, "Lookup chain stopped: ambiguous");
                return Ok(Lookup::Ambiguous { rows });
            }
        }
    };
}

/// Unwraps a found value or moves on to the next loop iteration.
macro_rules! found_or_continue {
    ($lookup:expr) => {
        match $lookup {
            Lookup::Found(value) => value,
            _ => continue,
        }
    };
}

/// Topology store backed by a SQL connection pool
#[derive(Clone)]
pub struct SqlTopologyStore {
    pool: AnyPool,
}

impl SqlTopologyStore {
    /// Open a pool against the given database URL
    /// (`mysql://...` in production, `sqlite::memory:` in tests).
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> TopologyResult<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(TopologyError::Connect)?;

        info!(max_connections, "Connected to topology store");
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: AnyPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, sql: &'static str, key: &str) -> TopologyResult<Vec<AnyRow>> {
        sqlx::query(sql)
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| TopologyError::query(sql, e))
    }

    async fn fetch2(
        &self,
        sql: &'static str,
        first: &str,
        second: &str,
    ) -> TopologyResult<Vec<AnyRow>> {
        sqlx::query(sql)
            .bind(first)
            .bind(second)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| TopologyError::query(sql, e))
    }

    /// Single nullable text column, exactly one row expected
    async fn single_text(
        &self,
        sql: &'static str,
        table: &'static str,
        column: &'static str,
        key: &str,
    ) -> TopologyResult<Lookup<String>> {
        let rows = self.fetch(sql, key).await?;
        let values = rows
            .iter()
            .map(|row| text(row, table, column))
            .collect::<TopologyResult<Vec<_>>>()?;
        Ok(Lookup::exactly_one(values).flatten())
    }

    /// Single nullable integer column, exactly one row expected
    async fn single_u32(
        &self,
        sql: &'static str,
        table: &'static str,
        column: &'static str,
        key: &str,
    ) -> TopologyResult<Lookup<u32>> {
        let rows = self.fetch(sql, key).await?;
        let values = rows
            .iter()
            .map(|row| integer(row, table, column))
            .collect::<TopologyResult<Vec<_>>>()?;
        Ok(Lookup::exactly_one(values).flatten())
    }
}

#[async_trait]
impl TopologyStore for SqlTopologyStore {
    #[instrument(level = "debug", skip(self))]
    async fn network(&self, network_id: &str) -> TopologyResult<Lookup<NetworkIdentity>> {
        let rows = self.fetch(NETWORK_BY_ID, network_id).await?;
        let networks = rows
            .iter()
            .map(|row| -> TopologyResult<NetworkIdentity> {
                Ok(NetworkIdentity {
                    id: required_text(row, tables::NETWORKS_TABLE, "id")?,
                    project_id: text(row, tables::NETWORKS_TABLE, "project_id")?
                        .unwrap_or_default(),
                    name: text(row, tables::NETWORKS_TABLE, "name")?.unwrap_or_default(),
                })
            })
            .collect::<TopologyResult<Vec<_>>>()?;
        Ok(Lookup::exactly_one(networks))
    }

    #[instrument(level = "debug", skip(self))]
    async fn segment_for_network(&self, network_id: &str) -> TopologyResult<Lookup<SegmentId>> {
        self.single_u32(
            SEGMENT_BY_NETWORK,
            tables::NETWORK_SEGMENTS_TABLE,
            "segmentation_id",
            network_id,
        )
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn gateways_for_network(
        &self,
        network_id: &str,
    ) -> TopologyResult<Lookup<GatewaySet>> {
        let rows = self.fetch(GATEWAYS_BY_NETWORK, network_id).await?;
        let gateways = rows
            .iter()
            .map(|row| {
                let gateway_ip = required_text(row, tables::SUBNETS_TABLE, "gateway_ip")?;
                let cidr = required_text(row, tables::SUBNETS_TABLE, "cidr")?;
                qualify_gateway(&gateway_ip, &cidr)
            })
            .collect::<TopologyResult<Vec<_>>>()?;
        Ok(Lookup::<String>::at_least_one(gateways))
    }

    #[instrument(level = "debug", skip(self))]
    async fn transit_subnet(&self, network_id: &str) -> TopologyResult<Lookup<String>> {
        self.single_text(SUBNET_BY_NETWORK, tables::SUBNETS_TABLE, "id", network_id)
            .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn transit_route(&self, subnet_id: &str) -> TopologyResult<Lookup<TransitRoute>> {
        let rows = self.fetch(ROUTES_BY_SUBNET, subnet_id).await?;
        let routes = rows
            .iter()
            .map(|row| -> TopologyResult<Option<TransitRoute>> {
                let destination = text(row, tables::SUBNET_ROUTES_TABLE, "destination")?;
                let next_hop = text(row, tables::SUBNET_ROUTES_TABLE, "nexthop")?;
                Ok(destination
                    .zip(next_hop)
                    .filter(|(dst, nh)| !dst.is_empty() && !nh.is_empty())
                    .map(|(dst, nh)| TransitRoute::new(dst, nh)))
            })
            .collect::<TopologyResult<Vec<_>>>()?;
        Ok(Lookup::exactly_one(routes).flatten())
    }

    #[instrument(level = "debug", skip(self))]
    async fn router_id_for_port(&self, port_id: &str) -> TopologyResult<Lookup<String>> {
        self.single_text(ROUTER_BY_PORT, tables::ROUTER_PORTS_TABLE, "router_id", port_id)
            .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn router_gateway_info(
        &self,
        router_id: &str,
    ) -> TopologyResult<Lookup<RouterGatewayInfo>> {
        let gateway_port = chain_step!(
            self.single_text(
                GATEWAY_PORT_BY_ROUTER,
                tables::ROUTERS_TABLE,
                "gw_port_id",
                router_id
            )
            .await?,
            "router gateway port",
            router_id
        );

        let rows = self.fetch(ALLOCATION_BY_PORT, &gateway_port).await?;
        let allocations = rows
            .iter()
            .map(|row| -> TopologyResult<Option<(String, String)>> {
                let ip = text(row, tables::IP_ALLOCATIONS_TABLE, "ip_address")?;
                let subnet = text(row, tables::IP_ALLOCATIONS_TABLE, "subnet_id")?;
                Ok(ip.zip(subnet))
            })
            .collect::<TopologyResult<Vec<_>>>()?;
        let (router_ip, subnet_id) = chain_step!(
            Lookup::exactly_one(allocations).flatten(),
            "gateway port allocation",
            gateway_port
        );

        let rows = self.fetch(POOL_AND_GATEWAY_BY_SUBNET, &subnet_id).await?;
        let subnets = rows
            .iter()
            .map(|row| -> TopologyResult<Option<(String, String)>> {
                let pool = text(row, tables::SUBNETS_TABLE, "subnetpool_id")?;
                let gateway = text(row, tables::SUBNETS_TABLE, "gateway_ip")?;
                Ok(pool.zip(gateway))
            })
            .collect::<TopologyResult<Vec<_>>>()?;
        let (subnetpool_id, router_gateway_ip) = chain_step!(
            Lookup::exactly_one(subnets).flatten(),
            "gateway subnet pool",
            subnet_id
        );

        let address_scope_id = chain_step!(
            self.single_text(
                SCOPE_BY_POOL,
                tables::SUBNET_POOLS_TABLE,
                "address_scope_id",
                &subnetpool_id
            )
            .await?,
            "subnet pool address scope",
            subnetpool_id
        );

        let grants = self
            .fetch2(
                SHARED_GRANT_BY_SCOPE,
                &address_scope_id,
                values::ACCESS_AS_SHARED,
            )
            .await?;
        chain_step!(
            Lookup::exactly_one(grants),
            "address scope shared grant",
            address_scope_id
        );

        Ok(Lookup::Found(RouterGatewayInfo {
            router_ip,
            router_gateway_ip,
            address_scope_id,
        }))
    }

    #[instrument(level = "debug", skip(self))]
    async fn router_networks(
        &self,
        router_id: &str,
        address_scope_id: &str,
    ) -> TopologyResult<Vec<String>> {
        let rows = self
            .fetch2(
                PORTS_BY_ROUTER_AND_TYPE,
                router_id,
                values::HA_ROUTER_REPLICATED_INTERFACE,
            )
            .await?;
        let port_ids = rows
            .iter()
            .map(|row| required_text(row, tables::ROUTER_PORTS_TABLE, "port_id"))
            .collect::<TopologyResult<Vec<_>>>()?;

        let mut cidrs = Vec::new();
        for port_id in port_ids {
            let subnet_id = found_or_continue!(
                self.single_text(
                    SUBNET_BY_PORT,
                    tables::IP_ALLOCATIONS_TABLE,
                    "subnet_id",
                    &port_id
                )
                .await?
            );

            let rows = self.fetch(CIDR_AND_POOL_BY_SUBNET, &subnet_id).await?;
            let subnets = rows
                .iter()
                .map(|row| -> TopologyResult<Option<(String, String)>> {
                    let cidr = text(row, tables::SUBNETS_TABLE, "cidr")?;
                    let pool = text(row, tables::SUBNETS_TABLE, "subnetpool_id")?;
                    Ok(cidr.zip(pool))
                })
                .collect::<TopologyResult<Vec<_>>>()?;
            let (cidr, subnetpool_id) = found_or_continue!(Lookup::exactly_one(subnets).flatten());

            let scope = found_or_continue!(
                self.single_text(
                    SCOPE_BY_POOL,
                    tables::SUBNET_POOLS_TABLE,
                    "address_scope_id",
                    &subnetpool_id
                )
                .await?
            );
            if scope != address_scope_id {
                debug!(%port_id, %cidr, %scope, "Skipping interface outside router scope");
                continue;
            }
            cidrs.push(cidr);
        }

        Ok(cidrs)
    }

    #[instrument(level = "debug", skip(self))]
    async fn vni_for_project(&self, project_id: &str) -> TopologyResult<Lookup<Vni>> {
        self.single_u32(
            RANGE_MINIMUM_BY_NAME,
            tables::NETWORK_SEGMENT_RANGES_TABLE,
            "minimum",
            project_id,
        )
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn gateway_port_vni(&self, router_id: &str) -> TopologyResult<Lookup<GatewayVni>> {
        let gateway_port = chain_step!(
            self.single_text(
                GATEWAY_PORT_BY_ROUTER,
                tables::ROUTERS_TABLE,
                "gw_port_id",
                router_id
            )
            .await?,
            "router gateway port",
            router_id
        );

        let network_id = chain_step!(
            self.single_text(NETWORK_BY_PORT, tables::PORTS_TABLE, "network_id", &gateway_port)
                .await?,
            "gateway port network",
            gateway_port
        );

        let project_id = chain_step!(
            self.single_text(
                PROJECT_BY_NETWORK,
                tables::NETWORKS_TABLE,
                "project_id",
                &network_id
            )
            .await?,
            "gateway network project",
            network_id
        );

        let vni = chain_step!(
            self.vni_for_project(&project_id).await?,
            "gateway project vni",
            project_id
        );

        Ok(Lookup::Found(GatewayVni { vni, network_id }))
    }
}

/// Nullable text column
fn text(row: &AnyRow, table: &'static str, column: &str) -> TopologyResult<Option<String>> {
    row.try_get::<Option<String>, _>(column)
        .map_err(|e| TopologyError::malformed(table, format!("column {}: {}", column, e)))
}

/// Text column that must not be NULL
fn required_text(row: &AnyRow, table: &'static str, column: &str) -> TopologyResult<String> {
    text(row, table, column)?
        .ok_or_else(|| TopologyError::malformed(table, format!("column {} is NULL", column)))
}

/// Nullable unsigned 32-bit column
fn integer(row: &AnyRow, table: &'static str, column: &str) -> TopologyResult<Option<u32>> {
    let value = row
        .try_get::<Option<i64>, _>(column)
        .map_err(|e| TopologyError::malformed(table, format!("column {}: {}", column, e)))?;
    value
        .map(|v| {
            u32::try_from(v).map_err(|_| {
                TopologyError::malformed(table, format!("column {} out of range: {}", column, v))
            })
        })
        .transpose()
}

/// Combine a gateway address with the prefix length of its subnet
/// (`10.0.0.1` + `10.0.0.0/24` -> `10.0.0.1/24`).
pub fn qualify_gateway(gateway_ip: &str, cidr: &str) -> TopologyResult<String> {
    match cidr.split_once('/') {
        Some((_, prefix)) if !prefix.is_empty() => Ok(format!("{}/{}", gateway_ip, prefix)),
        _ => Err(TopologyError::malformed(
            tables::SUBNETS_TABLE,
            format!("cidr '{}' has no prefix length", cidr),
        )),
    }
}
