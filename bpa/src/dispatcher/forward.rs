use super::*;
use mule_bpv7::block::{self, Block, Data};
use futures::future::join_all;

impl Dispatcher {
    pub(super) async fn forward(&self, bundle: Bundle, mut pack: BundlePack) {
        pack.state.remove(Constraint::DispatchPending);
        pack.state.add(Constraint::ForwardPending);
        if let Err(e) = pack.sync(&self.store) {
            error!("failed to sync {pack}: {e}");
            return;
        }

        let (senders, keep) = self.routing.senders_for_bundle(&bundle, &pack, &self.cla);
        if senders.is_empty() {
            if bundle.primary.destination.is_broadcast() {
                // sent to the empty set
                pack.state.purge_constraints();
            } else {
                debug!("no sender for bundle {}, contraindicated", pack.id);
                pack.state.add(Constraint::Contraindicated);
            }
            if let Err(e) = pack.sync(&self.store) {
                error!("failed to sync {pack}: {e}");
            }
            return;
        }

        let mut outbound = bundle.clone();
        if !self.prepare_for_forwarding(&mut outbound, &pack) {
            info!("hop limit exceeded, removing bundle {}", pack.id);
            if let Err(e) = self.store.delete(&pack.id.to_string()).await {
                warn!("failed to remove bundle {}: {e}", pack.id);
            }
            return;
        }

        let outbound = &outbound;
        let results = join_all(senders.into_iter().map(|sender| async move {
            let result = sender.send(outbound).await;
            (sender, result)
        }))
        .await;

        let mut sent = false;
        for (sender, result) in results {
            match result {
                Ok(()) => {
                    sent = true;
                    debug!("bundle {} sent via {}", pack.id, sender.address());
                    let peer = sender.peer_endpoint_id();
                    if !peer.is_null() && !pack.state.sent_to.contains(&peer) {
                        pack.state.sent_to.push(peer);
                    }
                }
                Err(e) => {
                    warn!(
                        "sending bundle {} via {} failed: {e}",
                        pack.id,
                        sender.address()
                    );
                    if !e.is_transient() {
                        // an unrecoverable transport also loses its registration
                        self.cla.unregister(&sender.address()).await;
                    }
                    self.routing
                        .report_send_failure(&bundle, &sender.peer_endpoint_id());
                }
            }
        }

        if sent {
            if !keep {
                pack.state.purge_constraints();
            }
        } else {
            pack.state.add(Constraint::Contraindicated);
        }

        if let Err(e) = pack.sync(&self.store) {
            error!("failed to sync {pack}: {e}");
        }
    }

    /// Update the mutable extension blocks before transmission: accumulate
    /// bundle age, stamp this node as previous node, and count the hop.
    /// Returns false when the hop limit is exhausted.
    fn prepare_for_forwarding(&self, bundle: &mut Bundle, pack: &BundlePack) -> bool {
        let elapsed = time::OffsetDateTime::now_utc() - pack.state.received_at;
        let elapsed_millis = (elapsed.whole_microseconds().max(0) as u64) / 1000;
        if let Some(b) = bundle.block_mut(block::Type::BundleAge) {
            if let Data::BundleAge(age) = &mut b.data {
                *age += elapsed_millis;
            }
        }

        let previous_node = Data::PreviousNode(self.node_id.clone());
        match bundle.block_mut(block::Type::PreviousNode) {
            Some(b) => b.data = previous_node,
            None => {
                let number = bundle.blocks.iter().map(|b| b.number).max().unwrap_or(1) + 1;
                let index = bundle.blocks.len().saturating_sub(1);
                bundle.blocks.insert(
                    index,
                    Block {
                        number,
                        flags: Default::default(),
                        crc_type: bundle.primary.crc_type,
                        data: previous_node,
                    },
                );
            }
        }

        if let Some(b) = bundle.block_mut(block::Type::HopCount) {
            if let Data::HopCount(hop_info) = &mut b.data {
                hop_info.count += 1;
                if hop_info.exceeded() {
                    return false;
                }
            }
        }
        true
    }
}
