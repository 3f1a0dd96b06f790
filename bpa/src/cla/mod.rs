use super::*;
use mule_bpv7::{bundle::Bundle, eid::Eid};
use thiserror::Error;

mod manager;

pub use manager::Manager;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("a convergence layer is already registered for {0}")]
    DuplicateAddress(String),

    #[error("transient transport failure: {0}")]
    Transient(String),

    #[error("permanent transport failure: {0}")]
    Permanent(String),

    #[error("the convergence layer is shutting down")]
    Cancelled,

    #[error(transparent)]
    InvalidBundle(#[from] bpv7::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Transient failures leave the CLA registered for a retried start;
    /// permanent ones unregister it.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_) | Error::Io(_))
    }
}

/// The sending half of a convergence layer, connected to one peer.
#[async_trait]
pub trait ConvergenceSender: Send + Sync {
    /// Open the transport. The boolean reports whether a failed start may be
    /// retried later.
    async fn start(&self, sink: Arc<dyn Sink>) -> (Result<()>, bool);

    async fn send(&self, bundle: &Bundle) -> Result<()>;

    /// A unique address; the manager registers each address at most once.
    fn address(&self) -> String;

    /// The peer's endpoint id, or the null endpoint if unknown.
    fn peer_endpoint_id(&self) -> Eid;

    /// Permanent CLAs are never dropped after start failures.
    fn is_permanent(&self) -> bool;

    /// Two-phase stop: request, then wait until in-flight sends finish and
    /// the socket is released.
    async fn close(&self);
}

/// The receiving half of a convergence layer.
#[async_trait]
pub trait ConvergenceReceiver: Send + Sync {
    /// Start accepting. Received bundles flow through the sink.
    async fn start(&self, sink: Arc<dyn Sink>) -> (Result<()>, bool);

    fn address(&self) -> String;

    /// The local endpoint this receiver accepts bundles for.
    fn endpoint_id(&self) -> Eid;

    async fn close(&self);
}

/// Channel from a convergence layer back into the node.
#[async_trait]
pub trait Sink: Send + Sync {
    /// A bundle arrived; `from` is the transport-level source address.
    async fn dispatch(&self, bundle: Bundle, from: String);

    /// The transport failed after a successful start.
    async fn disconnected(&self);
}
