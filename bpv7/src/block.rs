use super::*;
use super::crc::CrcType;
use eid::Eid;
use error::CaptureFieldErr;
use peer_data::PeerData;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Payload,
    PreviousNode,
    BundleAge,
    HopCount,
    LinkState,
    Unrecognised(u64),
}

impl From<Type> for u64 {
    fn from(value: Type) -> Self {
        match value {
            Type::Payload => 1,
            Type::PreviousNode => 6,
            Type::BundleAge => 7,
            Type::HopCount => 10,
            Type::LinkState => 193,
            Type::Unrecognised(v) => v,
        }
    }
}

impl From<u64> for Type {
    fn from(value: u64) -> Self {
        match value {
            1 => Type::Payload,
            6 => Type::PreviousNode,
            7 => Type::BundleAge,
            10 => Type::HopCount,
            193 => Type::LinkState,
            value => Type::Unrecognised(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopInfo {
    pub limit: u64,
    pub count: u64,
}

impl HopInfo {
    pub fn exceeded(&self) -> bool {
        self.count > self.limit
    }
}

/// The typed content of a canonical block.
///
/// Each variant constructor doubles as the registration table entry for its
/// block type code; an unregistered code decodes to [`Data::Unrecognised`]
/// when its flags permit carrying the block opaquely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Data {
    Payload(Box<[u8]>),
    PreviousNode(Eid),
    /// Accumulated bundle age in milliseconds.
    BundleAge(u64),
    HopCount(HopInfo),
    /// Link-state routing metadata, extension block type 193.
    LinkState(PeerData),
    Unrecognised {
        type_code: u64,
        data: Box<[u8]>,
    },
}

impl Data {
    pub fn block_type(&self) -> Type {
        match self {
            Data::Payload(_) => Type::Payload,
            Data::PreviousNode(_) => Type::PreviousNode,
            Data::BundleAge(_) => Type::BundleAge,
            Data::HopCount(_) => Type::HopCount,
            Data::LinkState(_) => Type::LinkState,
            Data::Unrecognised { type_code, .. } => Type::Unrecognised(*type_code),
        }
    }

    fn emit_content(&self) -> Vec<u8> {
        match self {
            Data::Payload(data) => data.to_vec(),
            Data::PreviousNode(eid) => cbor::encode::emit(eid),
            Data::BundleAge(millisecs) => cbor::encode::emit(millisecs),
            Data::HopCount(hop_info) => cbor::encode::emit_array(Some(2), |a| {
                a.emit(&hop_info.limit);
                a.emit(&hop_info.count);
            }),
            Data::LinkState(peer_data) => cbor::encode::emit(peer_data),
            Data::Unrecognised { data, .. } => data.to_vec(),
        }
    }

    /// Decode block content for a type code. Returns `Ok(None)` when the
    /// block is unrecognised and flagged to be dropped rather than carried.
    fn parse_content(
        block_type: Type,
        content: &[u8],
        flags: &BlockFlags,
    ) -> Result<Option<Data>, Error> {
        fn complete<T>(
            block_type: Type,
            content: &[u8],
            parsed: Option<(T, usize)>,
        ) -> Result<T, Error> {
            match parsed {
                Some((value, len)) if len == content.len() => Ok(value),
                _ => Err(Error::MalformedBlock(block_type)),
            }
        }

        match block_type {
            Type::Payload => Ok(Some(Data::Payload(content.into()))),
            Type::PreviousNode => Ok(Some(Data::PreviousNode(complete(
                block_type,
                content,
                cbor::decode::try_parse::<Eid>(content)?,
            )?))),
            Type::BundleAge => Ok(Some(Data::BundleAge(complete(
                block_type,
                content,
                cbor::decode::try_parse::<u64>(content)?,
            )?))),
            Type::HopCount => {
                let parsed = cbor::decode::try_parse_array(content, |a, _| {
                    Ok::<_, Error>(HopInfo {
                        limit: a.parse()?,
                        count: a.parse()?,
                    })
                })
                .map_err(|_| Error::MalformedBlock(block_type))?;
                Ok(Some(Data::HopCount(complete(block_type, content, parsed)?)))
            }
            Type::LinkState => Ok(Some(Data::LinkState(complete(
                block_type,
                content,
                cbor::decode::try_parse::<PeerData>(content)
                    .map_err(|_| Error::MalformedBlock(block_type))?,
            )?))),
            Type::Unrecognised(type_code) => {
                if flags.delete_bundle_on_failure {
                    Err(Error::UnknownBlock(type_code))
                } else if flags.delete_block_on_failure {
                    Ok(None)
                } else {
                    Ok(Some(Data::Unrecognised {
                        type_code,
                        data: content.into(),
                    }))
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub number: u64,
    pub flags: BlockFlags,
    pub crc_type: CrcType,
    pub data: Data,
}

impl Block {
    pub fn block_type(&self) -> Type {
        self.data.block_type()
    }

    pub(crate) fn emit(&self) -> Vec<u8> {
        let content = self.data.emit_content();
        crc::append_crc_value(
            self.crc_type,
            cbor::encode::emit_array(
                Some(if let CrcType::None = self.crc_type {
                    5
                } else {
                    6
                }),
                |a| {
                    a.emit(&u64::from(self.block_type()));
                    a.emit(&self.number);
                    a.emit(&self.flags);
                    a.emit(&self.crc_type);
                    a.emit(content.as_slice());
                    if !matches!(self.crc_type, CrcType::None) {
                        a.skip_value();
                    }
                },
            ),
        )
    }
}

/// A parsed canonical block, or `None` when the block was unrecognised and
/// flagged for local deletion.
pub(crate) struct MaybeBlock(pub Option<Block>);

impl cbor::decode::FromCbor for MaybeBlock {
    type Error = Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        cbor::decode::try_parse_array(data, |block, _| {
            let block_type: Type = block
                .parse::<u64>()
                .map_field_err("block type code")?
                .into();

            let number = block.parse::<u64>().map_field_err("block number")?;
            match (number, block_type) {
                (1, Type::Payload) => {}
                (0, _) | (1, _) | (_, Type::Payload) => {
                    return Err(Error::InvalidBlockNumber(number, block_type));
                }
                _ => {}
            }

            let flags: BlockFlags = block
                .parse()
                .map_field_err("block processing control flags")?;

            let crc_type: CrcType = block.parse().map_field_err("CRC type")?;

            let content: Vec<u8> = block.parse().map_field_err("block data")?;

            crc::parse_crc_value(data, block, crc_type)?;

            Ok(
                Data::parse_content(block_type, &content, &flags)?.map(|data| Block {
                    number,
                    flags,
                    crc_type,
                    data,
                }),
            )
        })
        .map(|o| o.map(|(block, len)| (MaybeBlock(block), len)))
    }
}
