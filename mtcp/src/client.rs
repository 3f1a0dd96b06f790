use super::*;
use mule_bpv7::{bundle::Bundle, eid::Eid};
use mule_bpa::{
    async_trait,
    cla::{self, ConvergenceSender, Sink},
};
use mule_cbor as cbor;
use std::time::Duration;
use tokio::{io::AsyncWriteExt, net::TcpStream, sync::Mutex};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

const DIAL_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(60);

/// MTCP sending side: one TCP connection to a peer's listener.
///
/// Sends are serialised by the connection mutex. A keepalive task probes the
/// connection with zero-length frames and reports transport death back to
/// the manager. `close` is two-phase: the cancellation token is the stop
/// request, and waiting for the task tracker is the stop acknowledgement, so
/// in-flight sends complete before the socket is released.
pub struct MtcpClient {
    inner: Arc<Inner>,
}

struct Inner {
    address: String,
    peer: Eid,
    permanent: bool,
    keepalive: Duration,
    conn: Mutex<Option<TcpStream>>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl MtcpClient {
    pub fn new(address: impl Into<String>, peer: Eid, permanent: bool) -> Self {
        Self::with_keepalive(address, peer, permanent, DEFAULT_KEEPALIVE)
    }

    pub fn with_keepalive(
        address: impl Into<String>,
        peer: Eid,
        permanent: bool,
        keepalive: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                address: address.into(),
                peer,
                permanent,
                keepalive,
                conn: Mutex::new(None),
                cancel: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }
}

async fn keepalive_loop(inner: Arc<Inner>, sink: Arc<dyn Sink>) {
    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => {
                // stop requested; taking the connection under the mutex lets
                // any in-flight send finish first
                inner.conn.lock().await.take();
                return;
            }
            _ = tokio::time::sleep(inner.keepalive) => {
                let mut conn = inner.conn.lock().await;
                let Some(stream) = conn.as_mut() else {
                    // a failed send already tore the connection down
                    drop(conn);
                    sink.disconnected().await;
                    return;
                };
                let header = cbor::encode::byte_string_header(0);
                let result = async {
                    stream.write_all(&header).await?;
                    stream.flush().await
                }
                .await;
                if let Err(e) = result {
                    warn!("mtcp://{}: keepalive failed: {e}", inner.address);
                    conn.take();
                    drop(conn);
                    sink.disconnected().await;
                    return;
                }
                trace!("mtcp://{}: keepalive sent", inner.address);
            }
        }
    }
}

#[async_trait]
impl ConvergenceSender for MtcpClient {
    async fn start(&self, sink: Arc<dyn Sink>) -> (cla::Result<()>, bool) {
        match tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(&self.inner.address)).await {
            Err(_) => (
                Err(cla::Error::Transient(format!(
                    "dialing {} timed out",
                    self.inner.address
                ))),
                true,
            ),
            Ok(Err(e)) => (Err(cla::Error::Io(e)), true),
            Ok(Ok(stream)) => {
                info!("mtcp://{} connected", self.inner.address);
                *self.inner.conn.lock().await = Some(stream);
                self.inner
                    .tasks
                    .spawn(keepalive_loop(self.inner.clone(), sink));
                (Ok(()), true)
            }
        }
    }

    async fn send(&self, bundle: &Bundle) -> cla::Result<()> {
        let data = bundle.emit();
        let header = cbor::encode::byte_string_header(data.len() as u64);

        let mut conn = self.inner.conn.lock().await;
        let Some(stream) = conn.as_mut() else {
            return Err(cla::Error::Transient("not connected".to_string()));
        };

        let result = async {
            stream.write_all(&header).await?;
            stream.write_all(&data).await?;
            stream.flush().await
        }
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                // the stream may be desynchronised; the keepalive task will
                // report the loss
                conn.take();
                Err(cla::Error::Io(e))
            }
        }
    }

    fn address(&self) -> String {
        self.inner.address.clone()
    }

    fn peer_endpoint_id(&self) -> Eid {
        self.inner.peer.clone()
    }

    fn is_permanent(&self) -> bool {
        self.inner.permanent
    }

    async fn close(&self) {
        self.inner.cancel.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        // in case start never succeeded and no task owns the socket
        self.inner.conn.lock().await.take();
        debug!("mtcp://{} closed", self.inner.address);
    }
}
