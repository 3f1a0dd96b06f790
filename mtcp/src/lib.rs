/*!
The Minimal TCP convergence layer.

Wire format: a stream of frames, each a CBOR byte-string header giving the
length `N` followed by `N` bytes holding one encoded bundle. `N == 0` is a
keepalive and carries no bundle.
*/

use mule_bpv7 as bpv7;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

mod codec;

pub mod client;
pub mod server;

pub use client::MtcpClient;
pub use server::MtcpServer;

/// Builds an [`MtcpClient`] for discovery announcements naming MTCP.
pub struct SenderFactory;

impl mule_bpa::discovery::SenderFactory for SenderFactory {
    fn sender(
        &self,
        message: &mule_bpa::discovery::Message,
    ) -> Option<Arc<dyn mule_bpa::cla::ConvergenceSender>> {
        match message.cla_type {
            mule_bpa::discovery::ClaType::Mtcp => Some(Arc::new(MtcpClient::new(
                message.socket_address(),
                message.endpoint.clone(),
                false,
            ))),
            mule_bpa::discovery::ClaType::Unrecognised(_) => None,
        }
    }
}
