use super::*;
use crate::codec::{Frame, MtcpCodec};
use mule_bpv7::{bundle::Bundle, eid::Eid};
use futures::StreamExt;
use mule_bpa::{
    async_trait,
    cla::{self, ConvergenceReceiver, Sink},
};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::{codec::FramedRead, sync::CancellationToken, task::TaskTracker};

/// MTCP receiving side: an accept loop with one reader task per connection.
///
/// A framing or bundle-decode error terminates the offending connection; the
/// listener keeps running.
pub struct MtcpServer {
    inner: Arc<Inner>,
}

struct Inner {
    listen: SocketAddr,
    endpoint: Eid,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl MtcpServer {
    pub fn new(listen: SocketAddr, endpoint: Eid) -> Self {
        Self {
            inner: Arc::new(Inner {
                listen,
                endpoint,
                cancel: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }
}

async fn accept_loop(inner: Arc<Inner>, listener: TcpListener, sink: Arc<dyn Sink>) {
    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => return,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    debug!("mtcp connection from {peer_addr}");
                    inner
                        .tasks
                        .spawn(connection(inner.clone(), stream, peer_addr, sink.clone()));
                }
                Err(e) => {
                    warn!("mtcp accept failed: {e}");
                }
            }
        }
    }
}

async fn connection(
    inner: Arc<Inner>,
    stream: TcpStream,
    peer_addr: SocketAddr,
    sink: Arc<dyn Sink>,
) {
    let mut frames = FramedRead::new(stream, MtcpCodec);
    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => return,
            frame = frames.next() => match frame {
                None => {
                    debug!("mtcp connection from {peer_addr} closed");
                    return;
                }
                Some(Err(e)) => {
                    warn!("mtcp framing error from {peer_addr}, dropping connection: {e}");
                    return;
                }
                Some(Ok(Frame::Keepalive)) => {
                    trace!("keepalive from {peer_addr}");
                }
                Some(Ok(Frame::Bundle(data))) => match Bundle::parse(&data) {
                    Ok(bundle) => sink.dispatch(bundle, peer_addr.to_string()).await,
                    Err(e) => {
                        warn!("undecodable bundle from {peer_addr}, dropping connection: {e}");
                        return;
                    }
                },
            }
        }
    }
}

#[async_trait]
impl ConvergenceReceiver for MtcpServer {
    async fn start(&self, sink: Arc<dyn Sink>) -> (cla::Result<()>, bool) {
        match TcpListener::bind(self.inner.listen).await {
            Err(e) => (Err(cla::Error::Io(e)), true),
            Ok(listener) => {
                info!("mtcp listening on {}", self.inner.listen);
                self.inner
                    .tasks
                    .spawn(accept_loop(self.inner.clone(), listener, sink));
                (Ok(()), true)
            }
        }
    }

    fn address(&self) -> String {
        self.inner.listen.to_string()
    }

    fn endpoint_id(&self) -> Eid {
        self.inner.endpoint.clone()
    }

    async fn close(&self) {
        self.inner.cancel.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        debug!("mtcp listener on {} closed", self.inner.listen);
    }
}
