//! Multi-node scenarios over real MTCP links with link-state routing.

use mule_bpa::{
    agent,
    config::{ClaConfig, Config, RoutingConfig},
    node::Node,
    pack::Constraint,
};
use mule_bpv7::{builder::Builder, creation_timestamp::CreationTimestamp, eid::Eid};
use mule_mtcp::{MtcpClient, MtcpServer};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::mpsc;

fn free_addr() -> SocketAddr {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
}

async fn spawn_node(name: &str, dir: &tempfile::TempDir) -> Arc<Node> {
    Node::new(Config {
        node_id: name.parse().unwrap(),
        storage_path: dir.path().to_path_buf(),
        inbound_channel_depth: 16,
        gc_interval: Duration::from_secs(5),
        retry_interval: Duration::from_millis(150),
        cla: ClaConfig {
            max_start_attempts: 20,
            initial_backoff: Duration::from_millis(100),
        },
        routing: RoutingConfig::Dtlsr {
            recompute_interval: Duration::from_millis(150),
            broadcast_interval: Duration::from_millis(150),
            purge_time: Duration::from_secs(600),
            broadcast_lifetime: Duration::from_secs(3600),
        },
    })
    .await
    .unwrap()
}

async fn listen(node: &Arc<Node>, addr: SocketAddr) {
    node.register_receiver(Arc::new(MtcpServer::new(addr, node.node_id().clone())))
        .await
        .unwrap();
}

async fn connect(node: &Arc<Node>, addr: SocketAddr, peer: &str) {
    node.register_sender(Arc::new(MtcpClient::new(
        addr.to_string(),
        peer.parse::<Eid>().unwrap(),
        true,
    )))
    .await
    .unwrap();
}

fn register_agent(
    node: &Arc<Node>,
    endpoint: &str,
) -> (mpsc::Sender<agent::Request>, mpsc::Receiver<agent::Response>) {
    let (req_tx, req_rx) = mpsc::channel(8);
    let (resp_tx, resp_rx) = mpsc::channel(8);
    node.serve_agent(req_rx, resp_tx);
    let endpoint: Eid = endpoint.parse().unwrap();
    let req = req_tx.clone();
    tokio::spawn(async move {
        let _ = req.send(agent::Request::Register { endpoint }).await;
    });
    (req_tx, resp_rx)
}

async fn next_delivery(
    rx: &mut mpsc::Receiver<agent::Response>,
    timeout: Duration,
) -> mule_bpv7::bundle::Bundle {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let response = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .expect("timed out waiting for delivery")
            .expect("agent connection closed");
        if let agent::Response::Delivered { bundle } = response {
            return bundle;
        }
    }
}

#[tokio::test]
async fn single_hop_forward() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let a = spawn_node("dtn://node-a/", &dir_a).await;
    let b = spawn_node("dtn://node-b/", &dir_b).await;

    let addr_b = free_addr();
    listen(&b, addr_b).await;
    connect(&a, addr_b, "dtn://node-b/").await;

    let (_req, mut deliveries) = register_agent(&b, "dtn://node-b/app");

    let bundle = Builder::new()
        .source("dtn://node-a/".parse().unwrap())
        .destination("dtn://node-b/app".parse().unwrap())
        .payload(b"across one hop".to_vec())
        .build(CreationTimestamp::now());
    let id = bundle.id().scrub().to_string();
    a.submit(bundle).await.unwrap();

    let delivered = next_delivery(&mut deliveries, Duration::from_secs(20)).await;
    assert_eq!(delivered.payload().unwrap(), b"across one hop");

    // the sender's copy is no longer pending once the send succeeded
    let mut cleared = false;
    for _ in 0..250 {
        match a.store().query_id(&id) {
            Ok(item) if !item.pending => {
                cleared = true;
                break;
            }
            _ => tokio::time::sleep(Duration::from_millis(40)).await,
        }
    }
    assert!(cleared, "bundle stayed pending on the sending node");

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn store_and_forward_across_two_hops() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let dir_c = tempfile::tempdir().unwrap();
    let a = spawn_node("dtn://node-a/", &dir_a).await;
    let b = spawn_node("dtn://node-b/", &dir_b).await;
    let c = spawn_node("dtn://node-c/", &dir_c).await;

    let (_req, mut deliveries) = register_agent(&c, "dtn://node-c/app");

    // submitted while node-a has no neighbours at all
    let bundle = Builder::new()
        .source("dtn://node-a/".parse().unwrap())
        .destination("dtn://node-c/app".parse().unwrap())
        .payload(b"patience pays".to_vec())
        .build(CreationTimestamp::now());
    let id = bundle.id().scrub().to_string();
    a.submit(bundle).await.unwrap();

    // retained with no route
    let mut retained = false;
    for _ in 0..100 {
        if let Ok(item) = a.store().query_id(&id) {
            if item.pending && item.pack.has(Constraint::Contraindicated) {
                retained = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(retained, "bundle was not retained while unroutable");

    // now bring up the a <-> b <-> c topology
    let addr_a = free_addr();
    let addr_b = free_addr();
    let addr_c = free_addr();
    listen(&a, addr_a).await;
    listen(&b, addr_b).await;
    listen(&c, addr_c).await;
    connect(&a, addr_b, "dtn://node-b/").await;
    connect(&b, addr_a, "dtn://node-a/").await;
    connect(&b, addr_c, "dtn://node-c/").await;
    connect(&c, addr_b, "dtn://node-b/").await;

    // b advertises its link to c; a learns the route and releases the bundle
    let delivered = next_delivery(&mut deliveries, Duration::from_secs(30)).await;
    assert_eq!(delivered.payload().unwrap(), b"patience pays");
    assert_eq!(
        delivered.primary.source,
        "dtn://node-a/".parse::<Eid>().unwrap()
    );

    a.shutdown().await;
    b.shutdown().await;
    c.shutdown().await;
}
