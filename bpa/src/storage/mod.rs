use super::*;
use mule_bpv7::{bundle::Bundle, bundle_id::BundleId};
use sha1::{Digest, Sha1};
use thiserror::Error;

mod store;

pub use store::Store;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Codec(#[from] bpv7::Error),

    #[error("bundle {0} not found")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Store record for one logical bundle, keyed by its scrubbed id.
#[derive(Debug, Clone)]
pub struct BundleItem {
    /// Scrubbed id string, the store key.
    pub id: String,
    /// The scrubbed bundle id.
    pub bundle_id: BundleId,

    pub pending: bool,
    pub expires: time::OffsetDateTime,

    pub fragmented: bool,
    pub parts: Vec<BundlePart>,

    /// Dispatcher-owned metadata.
    pub pack: pack::PackState,
}

/// One on-disk bundle blob, possibly a fragment of the logical bundle.
#[derive(Debug, Clone)]
pub struct BundlePart {
    /// Blob filename below the storage root.
    pub filename: String,

    pub fragment_offset: u64,
    pub total_data_length: u64,
}

/// Blob names are the SHA-1 of the full (unscrubbed) bundle id string, so
/// every fragment gets its own deterministic path.
pub(crate) fn blob_name(id: &BundleId) -> String {
    let digest = Sha1::digest(id.to_string().as_bytes());
    let mut name = String::with_capacity(digest.len() * 2);
    for b in digest {
        name.push_str(&format!("{b:02x}"));
    }
    name
}

pub(crate) fn expiration_date(bundle: &Bundle) -> time::OffsetDateTime {
    time::OffsetDateTime::from(bundle.primary.timestamp.creation_time)
        + time::Duration::microseconds(bundle.primary.lifetime as i64)
}
