/*!
The bundle data model and its deterministic CBOR codec.

A [`bundle::Bundle`] is a primary block followed by canonical blocks, exactly
one of which is a payload block. Blocks carry typed data ([`block::Data`])
with opaque retention for unrecognised types, and every block may be covered
by a CRC. Encoding is length-stable: `emit(parse(emit(b))) == emit(b)`.
*/

use mule_cbor as cbor;

pub mod block;
pub mod builder;
pub mod bundle;
pub mod bundle_id;
pub mod creation_timestamp;
pub mod crc;
pub mod dtn_time;
pub mod eid;
pub mod peer_data;
pub mod primary_block;

mod block_flags;
mod bundle_flags;
mod error;

pub use block_flags::BlockFlags;
pub use bundle_flags::BundleFlags;
pub use error::Error;
