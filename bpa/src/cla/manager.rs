use super::*;
use std::{
    collections::HashMap,
    sync::{RwLock, Weak},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

#[derive(Clone)]
enum Entry {
    Sender(Arc<dyn ConvergenceSender>),
    Receiver(Arc<dyn ConvergenceReceiver>),
}

impl Entry {
    fn address(&self) -> String {
        match self {
            Entry::Sender(cla) => cla.address(),
            Entry::Receiver(cla) => cla.address(),
        }
    }

    async fn start(&self, sink: Arc<dyn Sink>) -> (Result<()>, bool) {
        match self {
            Entry::Sender(cla) => cla.start(sink).await,
            Entry::Receiver(cla) => cla.start(sink).await,
        }
    }

    async fn close(&self) {
        match self {
            Entry::Sender(cla) => cla.close().await,
            Entry::Receiver(cla) => cla.close().await,
        }
    }

    fn is_permanent(&self) -> bool {
        match self {
            Entry::Sender(cla) => cla.is_permanent(),
            // listeners are kept through transient failures
            Entry::Receiver(_) => true,
        }
    }

    /// The peer reachable through this CLA, when known.
    fn peer(&self) -> Option<Eid> {
        match self {
            Entry::Sender(cla) => {
                let peer = cla.peer_endpoint_id();
                (!peer.is_null()).then_some(peer)
            }
            Entry::Receiver(_) => None,
        }
    }

    /// The local endpoint stamped on bundles received through this CLA.
    fn receiver_endpoint(&self) -> Eid {
        match self {
            Entry::Sender(_) => Eid::Null,
            Entry::Receiver(cla) => cla.endpoint_id(),
        }
    }
}

struct SinkImpl {
    manager: Weak<Manager>,
    address: String,
    receiver_endpoint: Eid,
    inbound: mpsc::Sender<dispatcher::Ingress>,
}

#[async_trait]
impl Sink for SinkImpl {
    async fn dispatch(&self, bundle: Bundle, from: String) {
        trace!("bundle received via {} from {from}", self.address);
        if self
            .inbound
            .send(dispatcher::Ingress::Receive {
                bundle,
                receiver: self.receiver_endpoint.clone(),
            })
            .await
            .is_err()
        {
            warn!("dispatcher channel closed, dropping bundle from {from}");
        }
    }

    async fn disconnected(&self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.handle_disconnect(&self.address).await;
        }
    }
}

/// Registry of active convergence-layer senders and receivers, keyed by
/// address. Start failures are retried with exponential backoff; peer
/// appearance and disappearance are reported to routing.
pub struct Manager {
    clas: RwLock<HashMap<String, Entry>>,
    inbound: mpsc::Sender<dispatcher::Ingress>,
    routing: Arc<dyn routing::Algorithm>,
    cancel: CancellationToken,
    tasks: TaskTracker,
    max_start_attempts: u32,
    initial_backoff: Duration,
}

impl Manager {
    pub fn new(
        config: &config::ClaConfig,
        inbound: mpsc::Sender<dispatcher::Ingress>,
        routing: Arc<dyn routing::Algorithm>,
    ) -> Self {
        Self {
            clas: RwLock::new(HashMap::new()),
            inbound,
            routing,
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
            max_start_attempts: config.max_start_attempts,
            initial_backoff: config.initial_backoff,
        }
    }

    pub async fn register_sender(self: &Arc<Self>, cla: Arc<dyn ConvergenceSender>) -> Result<()> {
        self.register(Entry::Sender(cla)).await
    }

    pub async fn register_receiver(
        self: &Arc<Self>,
        cla: Arc<dyn ConvergenceReceiver>,
    ) -> Result<()> {
        self.register(Entry::Receiver(cla)).await
    }

    async fn register(self: &Arc<Self>, entry: Entry) -> Result<()> {
        let address = entry.address();
        {
            let mut clas = self.clas.write().expect("CLA registry lock poisoned");
            if clas.contains_key(&address) {
                return Err(Error::DuplicateAddress(address));
            }
            clas.insert(address.clone(), entry.clone());
        }
        info!("registered CLA for {address}");

        match entry.start(self.sink_for(&address, &entry)).await {
            (Ok(()), _) => {
                self.report_started(&entry);
                Ok(())
            }
            (Err(e), true) => {
                warn!("CLA {address} failed to start, retrying: {e}");
                let manager = self.clone();
                self.tasks.spawn(manager.start_with_backoff(address, 1));
                Ok(())
            }
            (Err(e), false) => {
                self.clas
                    .write()
                    .expect("CLA registry lock poisoned")
                    .remove(&address);
                Err(e)
            }
        }
    }

    pub async fn unregister(&self, address: &str) {
        let entry = self
            .clas
            .write()
            .expect("CLA registry lock poisoned")
            .remove(address);

        if let Some(entry) = entry {
            if let Some(peer) = entry.peer() {
                self.routing.report_peer_disappeared(&peer);
            }
            entry.close().await;
            info!("unregistered CLA for {address}");
        }
    }

    /// A snapshot of active senders for routing iteration.
    pub fn senders(&self) -> Vec<Arc<dyn ConvergenceSender>> {
        self.clas
            .read()
            .expect("CLA registry lock poisoned")
            .values()
            .filter_map(|entry| match entry {
                Entry::Sender(cla) => Some(cla.clone()),
                Entry::Receiver(_) => None,
            })
            .collect()
    }

    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let entries = self
            .clas
            .write()
            .expect("CLA registry lock poisoned")
            .drain()
            .map(|(_, v)| v)
            .collect::<Vec<_>>();
        for entry in entries {
            entry.close().await;
        }

        self.tasks.close();
        self.tasks.wait().await;
    }

    fn sink_for(self: &Arc<Self>, address: &str, entry: &Entry) -> Arc<dyn Sink> {
        Arc::new(SinkImpl {
            manager: Arc::downgrade(self),
            address: address.to_string(),
            receiver_endpoint: entry.receiver_endpoint(),
            inbound: self.inbound.clone(),
        })
    }

    fn report_started(&self, entry: &Entry) {
        if let Some(peer) = entry.peer() {
            self.routing.report_peer_appeared(&peer);
        }
    }

    /// Transport failure after a successful start. The peer is gone; the CLA
    /// stays registered and is restarted with backoff.
    async fn handle_disconnect(self: Arc<Self>, address: &str) {
        let entry = self
            .clas
            .read()
            .expect("CLA registry lock poisoned")
            .get(address)
            .cloned();

        let Some(entry) = entry else {
            return;
        };

        warn!("CLA {address} disconnected");
        if let Some(peer) = entry.peer() {
            self.routing.report_peer_disappeared(&peer);
        }

        let manager = self.clone();
        self.tasks
            .spawn(manager.start_with_backoff(address.to_string(), 0));
    }

    async fn start_with_backoff(self: Arc<Self>, address: String, mut attempts: u32) {
        let mut backoff = self.initial_backoff;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = backoff.saturating_mul(2);

            let entry = self
                .clas
                .read()
                .expect("CLA registry lock poisoned")
                .get(&address)
                .cloned();
            let Some(entry) = entry else {
                // unregistered in the meantime
                return;
            };

            attempts += 1;
            match entry.start(self.sink_for(&address, &entry)).await {
                (Ok(()), _) => {
                    info!("CLA {address} started after {attempts} attempts");
                    self.report_started(&entry);
                    return;
                }
                (Err(e), retriable) => {
                    if !retriable || (!entry.is_permanent() && attempts > self.max_start_attempts)
                    {
                        warn!("giving up on CLA {address}: {e}");
                        self.unregister(&address).await;
                        return;
                    }
                    debug!("CLA {address} start attempt {attempts} failed: {e}");
                }
            }
        }
    }
}
