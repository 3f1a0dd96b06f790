use super::*;

/// Flooding: every bundle goes to every connected peer it has not already
/// been transmitted to, and is retained for peers that appear later.
pub(super) struct Epidemic;

#[async_trait]
impl Algorithm for Epidemic {
    fn notify_incoming(&self, _bundle: &Bundle) {}

    fn report_peer_appeared(&self, peer: &Eid) {
        debug!("peer appeared: {peer}");
    }

    fn report_peer_disappeared(&self, peer: &Eid) {
        debug!("peer disappeared: {peer}");
    }

    fn report_send_failure(&self, _bundle: &Bundle, _peer: &Eid) {}

    fn senders_for_bundle(
        &self,
        bundle: &Bundle,
        pack: &BundlePack,
        cla: &cla::Manager,
    ) -> (Vec<Arc<dyn ConvergenceSender>>, bool) {
        let senders = cla
            .senders()
            .into_iter()
            .filter(|s| {
                let peer = s.peer_endpoint_id();
                !peer.is_null()
                    && !pack.state.sent_to.contains(&peer)
                    && !bundle.primary.source.matches_node(&peer)
            })
            .collect();
        (senders, true)
    }

    async fn shutdown(&self) {}
}
