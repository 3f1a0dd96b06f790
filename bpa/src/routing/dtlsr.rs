use super::*;
use mule_bpv7::{
    block,
    builder::Builder,
    creation_timestamp::CreationTimestamp,
};
use futures::FutureExt;
use std::{cmp::Reverse, collections::BinaryHeap, time::Duration};
use tokio::sync::watch;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Delay-tolerant link-state routing.
///
/// Every node floods its neighbour list; each link is weighted by how long
/// ago it was last seen, so shortest paths prefer recent contact. The handle
/// posts events to the owning task and reads published table snapshots.
pub(super) struct Dtlsr {
    events: mpsc::UnboundedSender<Event>,
    table: watch::Receiver<Arc<RoutingTable>>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl Dtlsr {
    pub(super) fn new(
        node_id: Eid,
        recompute_interval: Duration,
        broadcast_interval: Duration,
        purge_time: Duration,
        broadcast_lifetime: Duration,
        submit: mpsc::Sender<dispatcher::Ingress>,
        cron: &cron::Cron,
    ) -> Result<Arc<Self>, cron::Error> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (table_tx, table_rx) = watch::channel(Arc::new(RoutingTable::new()));
        let cancel = CancellationToken::new();
        let tasks = TaskTracker::new();

        let state = State {
            peers: PeerData {
                id: node_id.clone(),
                timestamp: timestamp_now(),
                peers: Default::default(),
            },
            received: HashMap::new(),
            peer_change: false,
            received_change: false,
            node_index: HashMap::from([(node_id.clone(), 0)]),
            index_node: vec![node_id],
            purge_time: purge_time.as_secs(),
            broadcast_lifetime: broadcast_lifetime.as_micros() as u64,
            submit,
            table_tx,
        };
        tasks.spawn(state.run(events_rx, cancel.clone()));

        let dtlsr = Arc::new(Self {
            events: events_tx,
            table: table_rx,
            cancel,
            tasks,
        });

        fn tick(tx: &mpsc::UnboundedSender<Event>, event: fn() -> Event) -> cron::JobFn {
            let tx = tx.clone();
            Box::new(move || {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(event());
                }
                .boxed()
            })
        }

        cron.register(
            "dtlsr_recompute",
            recompute_interval,
            tick(&dtlsr.events, || Event::Recompute),
        )?;
        cron.register(
            "dtlsr_broadcast",
            broadcast_interval,
            tick(&dtlsr.events, || Event::Broadcast),
        )?;
        cron.register("dtlsr_purge", purge_time, tick(&dtlsr.events, || Event::Purge))?;

        Ok(dtlsr)
    }

    fn post(&self, event: Event) {
        if self.events.send(event).is_err() {
            warn!("routing task has terminated");
        }
    }
}

#[async_trait]
impl Algorithm for Dtlsr {
    fn notify_incoming(&self, bundle: &Bundle) {
        if let Some(b) = bundle.block(block::Type::LinkState) {
            if let block::Data::LinkState(peer_data) = &b.data {
                debug!("received routing metadata from {}", peer_data.id);
                self.post(Event::Metadata(peer_data.clone()));
            }
        }
    }

    fn report_peer_appeared(&self, peer: &Eid) {
        self.post(Event::PeerAppeared(peer.clone()));
    }

    fn report_peer_disappeared(&self, peer: &Eid) {
        self.post(Event::PeerDisappeared(peer.clone()));
    }

    fn report_send_failure(&self, bundle: &Bundle, peer: &Eid) {
        // transient transport errors must not make the topology oscillate
        trace!("send failure for {} via {peer} ignored", bundle.id());
    }

    fn senders_for_bundle(
        &self,
        bundle: &Bundle,
        _pack: &BundlePack,
        cla: &cla::Manager,
    ) -> (Vec<Arc<dyn ConvergenceSender>>, bool) {
        let destination = &bundle.primary.destination;

        if destination.is_broadcast() {
            return (cla.senders(), false);
        }

        let table = self.table.borrow().clone();
        let Some(forwarder) = table
            .get(destination)
            .or_else(|| table.get(&destination.node_id()))
        else {
            debug!("no route towards {destination}");
            return (Vec::new(), false);
        };

        let senders = cla
            .senders()
            .into_iter()
            .filter(|s| &s.peer_endpoint_id() == forwarder)
            .collect::<Vec<_>>();
        if senders.is_empty() {
            debug!("forwarder {forwarder} for {destination} is not connected");
        }
        (senders, false)
    }

    async fn shutdown(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }
}

struct State {
    /// Own peer data; `peers.id` is this node.
    peers: PeerData,
    /// Most recent peer data per origin.
    received: HashMap<Eid, PeerData>,
    /// Own links changed since the last broadcast.
    peer_change: bool,
    /// Anything changed since the last recompute.
    received_change: bool,
    /// Bijective endpoint ↔ vertex mapping for the shortest-path routine;
    /// vertex 0 is this node.
    node_index: HashMap<Eid, usize>,
    index_node: Vec<Eid>,
    purge_time: u64,
    broadcast_lifetime: u64,
    submit: mpsc::Sender<dispatcher::Ingress>,
    table_tx: watch::Sender<Arc<RoutingTable>>,
}

impl State {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<Event>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                event = events.recv() => match event {
                    None => return,
                    Some(event) => self.handle_event(event).await,
                }
            }
        }
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::PeerAppeared(peer) => {
                debug!("peer appeared: {peer}");
                self.track(&peer);
                self.peers.peers.insert(peer, 0);
                self.peers.timestamp = timestamp_now();
                self.peer_change = true;
            }
            Event::PeerDisappeared(peer) => {
                debug!("peer disappeared: {peer}");
                let timestamp = timestamp_now();
                self.track(&peer);
                self.peers.peers.insert(peer, timestamp);
                self.peers.timestamp = timestamp;
                self.peer_change = true;
            }
            Event::Metadata(data) => self.merge_metadata(data),
            Event::Recompute => {
                if self.peer_change || self.received_change {
                    self.compute_routing_table();
                    self.received_change = false;
                }
            }
            Event::Broadcast => self.broadcast().await,
            Event::Purge => self.purge_peers(),
        }
    }

    fn merge_metadata(&mut self, data: PeerData) {
        if data.id == self.peers.id {
            return;
        }
        if let Some(stored) = self.received.get(&data.id) {
            if !data.is_newer_than(stored) {
                trace!("stale peer data for {} ignored", data.id);
                return;
            }
        }

        let id = data.id.clone();
        self.track(&id);
        for peer in data.peers.keys() {
            self.track(peer);
        }
        self.received.insert(id, data);
        self.received_change = true;
    }

    fn track(&mut self, id: &Eid) {
        if !self.node_index.contains_key(id) {
            self.node_index.insert(id.clone(), self.index_node.len());
            self.index_node.push(id.clone());
        }
    }

    /// Single-source shortest paths over the observed peer graph. Edge cost
    /// is the time since the link was last up, so fresh links are cheapest.
    /// Ties pick the lexicographically lowest first hop.
    fn compute_routing_table(&mut self) {
        let now = timestamp_now();
        let n = self.index_node.len();
        let cost = |ts: u64| if ts == 0 { 0 } else { now.saturating_sub(ts) };

        let mut adj: Vec<Vec<(usize, u64)>> = vec![Vec::new(); n];
        for (peer, ts) in &self.peers.peers {
            if let Some(&idx) = self.node_index.get(peer) {
                adj[0].push((idx, cost(*ts)));
            }
        }
        for data in self.received.values() {
            let Some(&from) = self.node_index.get(&data.id) else {
                continue;
            };
            for (peer, ts) in &data.peers {
                if let Some(&idx) = self.node_index.get(peer) {
                    adj[from].push((idx, cost(*ts)));
                }
            }
        }

        let mut dist: Vec<Option<u64>> = vec![None; n];
        let mut first_hop: Vec<Option<usize>> = vec![None; n];
        let mut heap = BinaryHeap::new();
        dist[0] = Some(0);
        heap.push(Reverse((0u64, 0usize)));

        while let Some(Reverse((d, u))) = heap.pop() {
            if dist[u] != Some(d) {
                continue;
            }
            for &(v, w) in &adj[u] {
                let nd = d + w;
                let candidate = if u == 0 {
                    v
                } else {
                    first_hop[u].unwrap_or(v)
                };
                let better = match (dist[v], first_hop[v]) {
                    (None, _) => true,
                    (Some(cur), _) if nd < cur => true,
                    (Some(cur), Some(cur_hop)) if nd == cur => {
                        self.index_node[candidate] < self.index_node[cur_hop]
                    }
                    _ => false,
                };
                if better {
                    dist[v] = Some(nd);
                    first_hop[v] = Some(candidate);
                    heap.push(Reverse((nd, v)));
                }
            }
        }

        let mut table = RoutingTable::new();
        for i in 1..n {
            if let Some(hop) = first_hop[i] {
                table.insert(self.index_node[i].clone(), self.index_node[hop].clone());
            }
        }

        debug!("routing table rebuilt with {} destinations", table.len());
        self.table_tx.send_replace(Arc::new(table));
    }

    /// Emit a routing-metadata bundle when own peer data has changed.
    async fn broadcast(&mut self) {
        if !self.peer_change {
            return;
        }

        let bundle = Builder::new()
            .source(self.peers.id.clone())
            .destination(Eid::broadcast())
            .lifetime(self.broadcast_lifetime)
            .add_block(block::Data::LinkState(self.peers.clone()))
            .payload(Vec::new())
            .build(CreationTimestamp::now());

        debug!("broadcasting peer data, {} links", self.peers.peers.len());
        if self
            .submit
            .send(dispatcher::Ingress::Submit { bundle })
            .await
            .is_err()
        {
            warn!("dispatcher channel closed, broadcast dropped");
            return;
        }

        self.peer_change = false;
        // own link changes must still trigger a recompute even though the
        // broadcast consumed the flag
        self.received_change = true;
    }

    /// Drop peers that have been disconnected longer than the purge time.
    fn purge_peers(&mut self) {
        let now = timestamp_now();
        let stale = self
            .peers
            .peers
            .iter()
            .filter(|(_, &ts)| ts != 0 && now > ts + self.purge_time)
            .map(|(peer, _)| peer.clone())
            .collect::<Vec<_>>();

        for peer in stale {
            debug!("purging stale peer {peer}");
            self.peers.peers.remove(&peer);
            self.peer_change = true;
        }
    }
}
