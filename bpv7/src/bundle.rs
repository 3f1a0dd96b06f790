use super::*;
use block::{Block, Data, MaybeBlock, Type};
use bundle_id::BundleId;
use primary_block::PrimaryBlock;

/// A primary block plus an ordered list of canonical blocks, exactly one of
/// which is the payload block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub primary: PrimaryBlock,
    pub blocks: Vec<Block>,
}

impl Bundle {
    pub fn id(&self) -> BundleId {
        self.primary.bundle_id()
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.blocks.iter().find_map(|b| match &b.data {
            Data::Payload(data) => Some(&**data),
            _ => None,
        })
    }

    pub fn block(&self, block_type: Type) -> Option<&Block> {
        self.blocks.iter().find(|b| b.block_type() == block_type)
    }

    pub fn block_mut(&mut self, block_type: Type) -> Option<&mut Block> {
        self.blocks
            .iter_mut()
            .find(|b| b.block_type() == block_type)
    }

    /// The canonical encoding: an indefinite-length array of the primary
    /// block followed by each canonical block.
    pub fn emit(&self) -> Vec<u8> {
        cbor::encode::emit_array(None, |a| {
            a.emit_raw(&self.primary.emit());
            for block in &self.blocks {
                a.emit_raw(&block.emit());
            }
        })
    }

    pub fn parse(data: &[u8]) -> Result<Bundle, Error> {
        let (bundle, len) = cbor::decode::parse_array(data, |outer, _| {
            let primary: PrimaryBlock = outer.parse()?;

            let mut blocks = Vec::new();
            while let Some(MaybeBlock(block)) = outer.try_parse()? {
                if let Some(block) = block {
                    blocks.push(block);
                }
            }

            Ok::<_, Error>(Bundle { primary, blocks })
        })?;

        if len != data.len() {
            return Err(Error::AdditionalData);
        }

        bundle.validate()?;
        Ok(bundle)
    }

    fn validate(&self) -> Result<(), Error> {
        let mut seen_numbers = std::collections::HashSet::new();
        let mut seen_types = std::collections::HashSet::new();
        let mut payloads = 0usize;

        for block in &self.blocks {
            if !seen_numbers.insert(block.number) {
                return Err(Error::DuplicateBlockNumber(block.number));
            }

            match block.block_type() {
                Type::Payload => payloads += 1,
                t @ (Type::PreviousNode | Type::BundleAge | Type::HopCount | Type::LinkState) => {
                    if !seen_types.insert(t) {
                        return Err(Error::DuplicateBlocks(t));
                    }
                }
                Type::Unrecognised(_) => {}
            }
        }

        match payloads {
            0 => return Err(Error::MissingPayload),
            1 => {}
            _ => return Err(Error::DuplicateBlocks(Type::Payload)),
        }

        match self.blocks.last() {
            Some(block) if block.block_type() == Type::Payload => Ok(()),
            _ => Err(Error::PayloadNotFinal),
        }
    }
}
