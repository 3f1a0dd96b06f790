use super::*;
use mule_bpv7::{bundle::Bundle, eid::Eid, peer_data::PeerData};
use cla::ConvergenceSender;
use pack::BundlePack;
use std::collections::HashMap;
use tokio::sync::mpsc;

mod dtlsr;
mod epidemic;

/// Destination node → next-hop node. Replaced atomically on recompute.
pub type RoutingTable = HashMap<Eid, Eid>;

/// Events posted to the routing task, which alone owns mutable routing
/// state. Cron ticks arrive here as well, so every mutation happens on one
/// task.
#[derive(Debug)]
pub enum Event {
    PeerAppeared(Eid),
    PeerDisappeared(Eid),
    Metadata(PeerData),
    Recompute,
    Broadcast,
    Purge,
}

/// A pluggable routing policy.
#[async_trait]
pub trait Algorithm: Send + Sync {
    /// Inspect a received bundle for routing metadata.
    fn notify_incoming(&self, bundle: &Bundle);

    fn report_peer_appeared(&self, peer: &Eid);

    fn report_peer_disappeared(&self, peer: &Eid);

    /// A send failure is not a topology change; only peer-disappeared events
    /// alter routing state.
    fn report_send_failure(&self, bundle: &Bundle, peer: &Eid);

    /// Select the senders for an outbound bundle. The boolean asks the
    /// dispatcher to retain the bundle for later peers even after a
    /// successful send.
    fn senders_for_bundle(
        &self,
        bundle: &Bundle,
        pack: &BundlePack,
        cla: &cla::Manager,
    ) -> (Vec<Arc<dyn ConvergenceSender>>, bool);

    async fn shutdown(&self);
}

pub fn new(
    config: &config::RoutingConfig,
    node_id: Eid,
    submit: mpsc::Sender<dispatcher::Ingress>,
    cron: &cron::Cron,
) -> Result<Arc<dyn Algorithm>, cron::Error> {
    match config {
        config::RoutingConfig::Dtlsr {
            recompute_interval,
            broadcast_interval,
            purge_time,
            broadcast_lifetime,
        } => Ok(dtlsr::Dtlsr::new(
            node_id,
            *recompute_interval,
            *broadcast_interval,
            *purge_time,
            *broadcast_lifetime,
            submit,
            cron,
        )?),
        config::RoutingConfig::Epidemic => Ok(Arc::new(epidemic::Epidemic)),
    }
}

pub(crate) fn timestamp_now() -> u64 {
    time::OffsetDateTime::now_utc().unix_timestamp().max(0) as u64
}
