use mule_bpa::{
    async_trait,
    cla::{ConvergenceReceiver, ConvergenceSender, Sink},
};
use mule_bpv7::{
    builder::Builder, bundle::Bundle, creation_timestamp::CreationTimestamp, eid::Eid,
};
use mule_mtcp::{MtcpClient, MtcpServer};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{io::AsyncReadExt, sync::mpsc};

struct CaptureSink {
    bundles: mpsc::Sender<(Bundle, String)>,
    disconnects: mpsc::Sender<()>,
}

impl CaptureSink {
    fn new() -> (
        Arc<dyn Sink>,
        mpsc::Receiver<(Bundle, String)>,
        mpsc::Receiver<()>,
    ) {
        let (bundles_tx, bundles_rx) = mpsc::channel(16);
        let (disconnects_tx, disconnects_rx) = mpsc::channel(16);
        (
            Arc::new(CaptureSink {
                bundles: bundles_tx,
                disconnects: disconnects_tx,
            }),
            bundles_rx,
            disconnects_rx,
        )
    }
}

#[async_trait]
impl Sink for CaptureSink {
    async fn dispatch(&self, bundle: Bundle, from: String) {
        let _ = self.bundles.send((bundle, from)).await;
    }

    async fn disconnected(&self) {
        let _ = self.disconnects.send(()).await;
    }
}

fn free_addr() -> SocketAddr {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
}

fn test_bundle() -> Bundle {
    Builder::new()
        .source("dtn://node-a/".parse().unwrap())
        .destination("dtn://node-b/app".parse().unwrap())
        .payload(b"over the wire".to_vec())
        .build(CreationTimestamp::now())
}

#[tokio::test]
async fn single_hop_frame_carries_the_bundle() {
    let addr = free_addr();
    let server = Arc::new(MtcpServer::new(addr, "dtn://node-b/".parse().unwrap()));
    let (server_sink, mut bundles, _) = CaptureSink::new();
    let (result, _) = server.start(server_sink).await;
    result.unwrap();

    let client = MtcpClient::new(addr.to_string(), "dtn://node-b/".parse::<Eid>().unwrap(), false);
    let (client_sink, _, _) = CaptureSink::new();
    let (result, retriable) = client.start(client_sink).await;
    result.unwrap();
    assert!(retriable);

    let bundle = test_bundle();
    client.send(&bundle).await.unwrap();

    let (received, from) = tokio::time::timeout(Duration::from_secs(5), bundles.recv())
        .await
        .expect("timed out")
        .expect("sink closed");
    assert_eq!(received, bundle);
    assert!(from.starts_with("127.0.0.1:"));

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn dial_failure_is_retriable() {
    // nothing is listening here
    let addr = free_addr();
    let client = MtcpClient::new(addr.to_string(), Eid::Null, false);
    let (sink, _, _) = CaptureSink::new();
    let (result, retriable) = client.start(sink).await;
    assert!(result.is_err());
    assert!(retriable);
    client.close().await;
}

#[tokio::test]
async fn keepalive_probes_are_zero_length_frames() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let client = MtcpClient::with_keepalive(
        addr.to_string(),
        Eid::Null,
        false,
        Duration::from_millis(30),
    );
    let (sink, _, _) = CaptureSink::new();
    let (result, _) = client.start(sink).await;
    result.unwrap();

    let (mut stream, _) = listener.accept().await.unwrap();
    let mut buf = [0u8; 8];
    let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("timed out")
        .unwrap();
    assert!(n >= 1);
    // a keepalive is the header of an empty byte string
    assert!(buf[..n].iter().all(|b| *b == 0x40));

    client.close().await;
}

#[tokio::test]
async fn dead_peer_is_reported_through_the_sink() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let client = MtcpClient::with_keepalive(
        addr.to_string(),
        Eid::Null,
        false,
        Duration::from_millis(20),
    );
    let (sink, _, mut disconnects) = CaptureSink::new();
    let (result, _) = client.start(sink).await;
    result.unwrap();

    // accept and immediately drop the connection
    let (stream, _) = listener.accept().await.unwrap();
    drop(stream);
    drop(listener);

    tokio::time::timeout(Duration::from_secs(5), disconnects.recv())
        .await
        .expect("no disconnect reported")
        .expect("sink closed");

    client.close().await;
}

#[tokio::test]
async fn close_releases_the_connection() {
    let addr = free_addr();
    let server = Arc::new(MtcpServer::new(addr, "dtn://node-b/".parse().unwrap()));
    let (server_sink, _, _) = CaptureSink::new();
    server.start(server_sink).await.0.unwrap();

    let client = MtcpClient::new(addr.to_string(), Eid::Null, false);
    let (client_sink, _, _) = CaptureSink::new();
    client.start(client_sink).await.0.unwrap();

    client.close().await;
    assert!(client.send(&test_bundle()).await.is_err());

    server.close().await;
}
