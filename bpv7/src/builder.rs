use super::*;
use super::crc::CrcType;
use block::{Block, Data};
use bundle::Bundle;
use creation_timestamp::CreationTimestamp;
use eid::Eid;
use primary_block::PrimaryBlock;

/// Constructs well-formed bundles: extension blocks are numbered from 2 and
/// the payload block is always number 1 and final.
pub struct Builder {
    flags: BundleFlags,
    crc_type: CrcType,
    source: Eid,
    destination: Eid,
    report_to: Option<Eid>,
    lifetime: u64,
    payload: Vec<u8>,
    extensions: Vec<(BlockFlags, Data)>,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            flags: BundleFlags::default(),
            crc_type: CrcType::CRC32_CASTAGNOLI,
            source: Eid::default(),
            destination: Eid::default(),
            report_to: None,
            lifetime: 24 * 60 * 60 * 1_000_000,
            payload: Vec::new(),
            extensions: Vec::new(),
        }
    }
}

impl Builder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn flags(mut self, flags: BundleFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn crc_type(mut self, crc_type: CrcType) -> Self {
        self.crc_type = crc_type;
        self
    }

    pub fn source(mut self, source: Eid) -> Self {
        self.source = source;
        self
    }

    pub fn destination(mut self, destination: Eid) -> Self {
        self.destination = destination;
        self
    }

    pub fn report_to(mut self, report_to: Eid) -> Self {
        self.report_to = Some(report_to);
        self
    }

    /// Lifetime in microseconds. Defaults to 24 hours.
    pub fn lifetime(mut self, lifetime: u64) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn payload(mut self, data: Vec<u8>) -> Self {
        self.payload = data;
        self
    }

    pub fn add_block(self, data: Data) -> Self {
        self.add_block_with_flags(data, BlockFlags::default())
    }

    pub fn add_block_with_flags(mut self, data: Data, flags: BlockFlags) -> Self {
        self.extensions.push((flags, data));
        self
    }

    pub fn build(self, timestamp: CreationTimestamp) -> Bundle {
        let mut blocks = Vec::with_capacity(self.extensions.len() + 1);
        for (number, (flags, data)) in (2u64..).zip(self.extensions) {
            blocks.push(Block {
                number,
                flags,
                crc_type: self.crc_type,
                data,
            });
        }
        blocks.push(Block {
            number: 1,
            flags: BlockFlags::default(),
            crc_type: self.crc_type,
            data: Data::Payload(self.payload.into()),
        });

        Bundle {
            primary: PrimaryBlock {
                report_to: self.report_to.unwrap_or_else(|| self.source.clone()),
                flags: self.flags,
                crc_type: self.crc_type,
                destination: self.destination,
                source: self.source,
                timestamp,
                lifetime: self.lifetime,
                fragment_info: None,
            },
            blocks,
        }
    }
}
