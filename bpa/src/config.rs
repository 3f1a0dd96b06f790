use super::*;
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// This node's endpoint id, e.g. `dtn://node-a/`.
    pub node_id: bpv7::eid::Eid,

    /// Directory for bundle blobs.
    pub storage_path: PathBuf,

    /// Depth of the dispatcher's inbound channel.
    pub inbound_channel_depth: usize,

    /// How often expired bundles are purged.
    pub gc_interval: Duration,

    /// How often pending bundles are re-offered to routing.
    pub retry_interval: Duration,

    pub cla: ClaConfig,
    pub routing: RoutingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: bpv7::eid::Eid::Null,
            storage_path: PathBuf::from("store"),
            inbound_channel_depth: 64,
            gc_interval: Duration::from_secs(10),
            retry_interval: Duration::from_secs(10),
            cla: ClaConfig::default(),
            routing: RoutingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ClaConfig {
    /// Start attempts before a non-permanent CLA is dropped.
    pub max_start_attempts: u32,

    /// First retry delay; doubles per attempt.
    pub initial_backoff: Duration,
}

impl Default for ClaConfig {
    fn default() -> Self {
        Self {
            max_start_attempts: 5,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum RoutingConfig {
    /// Delay-tolerant link-state routing.
    Dtlsr {
        /// Interval between routing table recomputations.
        recompute_interval: Duration,
        /// Interval between peer-data broadcasts.
        /// A broadcast is only emitted when peer data has changed.
        broadcast_interval: Duration,
        /// A disconnected peer is dropped from the peer list after this long.
        purge_time: Duration,
        /// Lifetime of emitted routing-metadata bundles.
        broadcast_lifetime: Duration,
    },
    /// Flood every bundle to every peer it has not been sent to yet.
    Epidemic,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        RoutingConfig::Dtlsr {
            recompute_interval: Duration::from_secs(30),
            broadcast_interval: Duration::from_secs(30),
            purge_time: Duration::from_secs(600),
            broadcast_lifetime: Duration::from_secs(3600),
        }
    }
}
