use super::*;
use mule_bpv7::{bundle::Bundle, eid::Eid};
use pack::{BundlePack, Constraint};
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

mod forward;
mod reassemble;

/// A bundle entering the pipeline, from a convergence layer or a local
/// application.
#[derive(Debug)]
pub enum Ingress {
    Receive { bundle: Bundle, receiver: Eid },
    Submit { bundle: Bundle },
}

/// Drives each bundle through receive → dispatch → deliver / forward,
/// tracking its position with constraints persisted in the store.
///
/// One task consumes the inbound channel, so bundles from a single
/// convergence-layer connection are processed in receive order.
pub struct Dispatcher {
    store: Arc<storage::Store>,
    routing: Arc<dyn routing::Algorithm>,
    cla: Arc<cla::Manager>,
    agents: Arc<agent::Registry>,
    node_id: Eid,
    cancel: CancellationToken,
    tasks: TaskTracker,
    store_failures: std::sync::atomic::AtomicU32,
}

// Consecutive store failures tolerated before corruption is assumed.
const MAX_STORE_FAILURES: u32 = 5;

impl Dispatcher {
    pub fn new(
        store: Arc<storage::Store>,
        routing: Arc<dyn routing::Algorithm>,
        cla: Arc<cla::Manager>,
        agents: Arc<agent::Registry>,
        node_id: Eid,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            routing,
            cla,
            agents,
            node_id,
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
            store_failures: std::sync::atomic::AtomicU32::new(0),
        })
    }

    /// A store error aborts the operation; a run of them means the store is
    /// corrupt and the process must not keep acknowledging bundles.
    fn store_failed(&self, e: &storage::Error) {
        use std::sync::atomic::Ordering;
        let failures = self.store_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= MAX_STORE_FAILURES {
            error!("bundle store failing persistently ({failures} consecutive errors): {e}");
            panic!("bundle store failing persistently: {e}");
        }
    }

    fn store_ok(&self) {
        self.store_failures
            .store(0, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn start(self: &Arc<Self>, rx: mpsc::Receiver<Ingress>) {
        let dispatcher = self.clone();
        self.tasks.spawn(dispatcher.run(rx));
    }

    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }

    async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<Ingress>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                msg = rx.recv() => match msg {
                    None => return,
                    Some(Ingress::Receive { bundle, receiver }) => {
                        self.receive(bundle, receiver).await
                    }
                    Some(Ingress::Submit { bundle }) => {
                        let receiver = self.node_id.clone();
                        self.receive(bundle, receiver).await
                    }
                }
            }
        }
    }

    /// Entry point of the pipeline: persist, then dispatch.
    pub(crate) async fn receive(&self, bundle: Bundle, receiver: Eid) {
        let id = bundle.id();
        let key = id.scrub().to_string();

        // at-most-once: a part we already hold is dropped here
        if let Ok(item) = self.store.query_id(&key) {
            let duplicate = match &id.fragment_info {
                None => true,
                Some(f) => item
                    .parts
                    .iter()
                    .any(|p| (p.fragment_offset, p.total_data_length) == (f.offset, f.total_len)),
            };
            if duplicate {
                debug!("duplicate bundle {id}, discarding");
                return;
            }
        }

        let item = match self.store.push(&bundle).await {
            Ok(item) => {
                self.store_ok();
                item
            }
            Err(e) => {
                error!("failed to store bundle {id}: {e}");
                self.store_failed(&e);
                return;
            }
        };

        self.routing.notify_incoming(&bundle);

        let mut pack = BundlePack::from_item(&item);
        if pack.state.receiver.is_null() {
            pack.state.receiver = receiver;
        }
        pack.state.add(Constraint::DispatchPending);
        if let Err(e) = pack.sync(&self.store) {
            error!("failed to sync {pack}: {e}");
            return;
        }

        info!("received bundle {id} for {}", bundle.primary.destination);
        self.dispatch(bundle, pack).await
    }

    async fn dispatch(&self, bundle: Bundle, pack: BundlePack) {
        if self.is_local(&bundle.primary.destination) {
            self.deliver(bundle, pack).await
        } else {
            self.forward(bundle, pack).await
        }
    }

    fn is_local(&self, destination: &Eid) -> bool {
        destination.matches_node(&self.node_id) || self.agents.has_endpoint(destination)
    }

    async fn deliver(&self, bundle: Bundle, mut pack: BundlePack) {
        pack.state.remove(Constraint::DispatchPending);

        if bundle.primary.has_fragmentation() {
            return self.reassemble(pack).await;
        }

        if self.agents.deliver(&bundle).await {
            info!("delivered bundle {} locally", pack.id);
            pack.state.add(Constraint::LocalEndpoint);
            pack.state.purge_constraints();
        } else {
            debug!(
                "no agent for {}, retaining bundle {}",
                bundle.primary.destination, pack.id
            );
            pack.state.add(Constraint::Contraindicated);
        }

        if let Err(e) = pack.sync(&self.store) {
            error!("failed to sync {pack}: {e}");
        }
    }

    /// Cron: drop bundles whose lifetime has passed. An expired item that is
    /// still pending has its constraints purged on the same pass; lifetime
    /// exhaustion is terminal either way.
    pub async fn purge_expired(&self) {
        let now = time::OffsetDateTime::now_utc();
        for item in self.store.query_expired(now) {
            if item.pending {
                debug!("bundle {} expired while pending", item.id);
            }
            match self.store.delete(&item.id).await {
                Ok(()) => info!("removed expired bundle {}", item.id),
                Err(e) => warn!("failed to remove expired bundle {}: {e}", item.id),
            }
        }
    }

    /// Cron: re-offer retained bundles to routing. This is what turns a
    /// store-and-forward opportunity (a new peer, a new route) into actual
    /// transmission.
    pub async fn dispatch_pending(&self) {
        let now = time::OffsetDateTime::now_utc();
        for item in self.store.query_pending() {
            // expired items belong to the purge pass, never to routing
            if item.expires <= now {
                continue;
            }
            let Some(part) = item.parts.first() else {
                continue;
            };
            match self.store.load(part).await {
                Ok(bundle) => {
                    trace!("re-dispatching pending bundle {}", item.id);
                    let mut pack = BundlePack::from_item(&item);
                    pack.state.remove(Constraint::Contraindicated);
                    self.dispatch(bundle, pack).await;
                }
                Err(e) => warn!("failed to load pending bundle {}: {e}", item.id),
            }
        }
    }

    /// Re-run the pipeline for items rebuilt by store recovery.
    pub(crate) async fn redispatch(&self, items: Vec<storage::BundleItem>) {
        for item in items {
            let Some(part) = item.parts.first() else {
                continue;
            };
            match self.store.load(part).await {
                Ok(bundle) => {
                    let mut pack = BundlePack::from_item(&item);
                    pack.state.add(Constraint::DispatchPending);
                    self.dispatch(bundle, pack).await;
                }
                Err(e) => warn!("failed to load recovered bundle {}: {e}", item.id),
            }
        }
    }
}
