use super::*;
use super::crc::CrcType;
use bundle_id::{BundleId, FragmentInfo};
use creation_timestamp::CreationTimestamp;
use eid::Eid;
use error::CaptureFieldErr;

/// The primary block of a bundle. Version is fixed at 7 on the wire.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct PrimaryBlock {
    pub flags: BundleFlags,
    pub crc_type: CrcType,
    pub destination: Eid,
    pub source: Eid,
    pub report_to: Eid,
    pub timestamp: CreationTimestamp,
    /// Bundle lifetime in microseconds.
    pub lifetime: u64,
    pub fragment_info: Option<FragmentInfo>,
}

impl PrimaryBlock {
    pub fn has_fragmentation(&self) -> bool {
        self.flags.is_fragment
    }

    pub fn bundle_id(&self) -> BundleId {
        BundleId {
            source: self.source.clone(),
            timestamp: self.timestamp,
            fragment_info: self.fragment_info.clone(),
        }
    }

    pub(crate) fn emit(&self) -> Vec<u8> {
        crc::append_crc_value(
            self.crc_type,
            cbor::encode::emit_array(
                Some({
                    let mut count = if let CrcType::None = self.crc_type {
                        8
                    } else {
                        9
                    };
                    if self.fragment_info.is_some() {
                        count += 2;
                    }
                    count
                }),
                |a| {
                    a.emit(&7u64);
                    a.emit(&self.flags);
                    a.emit(&self.crc_type);
                    a.emit(&self.destination);
                    a.emit(&self.source);
                    a.emit(&self.report_to);
                    a.emit(&self.timestamp);
                    a.emit(&self.lifetime);

                    if let Some(fragment_info) = &self.fragment_info {
                        a.emit(&fragment_info.offset);
                        a.emit(&fragment_info.total_len);
                    }

                    if !matches!(self.crc_type, CrcType::None) {
                        a.skip_value();
                    }
                },
            ),
        )
    }
}

impl cbor::decode::FromCbor for PrimaryBlock {
    type Error = Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        cbor::decode::try_parse_array(data, |block, _| {
            let version = block.parse::<u64>().map_field_err("version")?;
            if version != 7 {
                return Err(Error::InvalidVersion(version));
            }

            let flags: BundleFlags = block
                .parse()
                .map_field_err("bundle processing control flags")?;

            let crc_type: CrcType = block.parse().map_field_err("CRC type")?;

            let destination: Eid = block.parse().map_field_err("destination EID")?;
            let source: Eid = block.parse().map_field_err("source EID")?;
            let report_to: Eid = block.parse().map_field_err("report-to EID")?;

            let timestamp: CreationTimestamp =
                block.parse().map_field_err("creation timestamp")?;

            let lifetime = block.parse::<u64>().map_field_err("lifetime")?;

            let fragment_info = if !flags.is_fragment {
                None
            } else {
                let offset = block.parse::<u64>().map_field_err("fragment offset")?;
                let total_len = block
                    .parse::<u64>()
                    .map_field_err("total application data unit length")?;
                if total_len == 0 || offset >= total_len {
                    return Err(Error::InvalidFragmentInfo(offset, total_len));
                }
                Some(FragmentInfo { offset, total_len })
            };

            crc::parse_crc_value(data, block, crc_type)?;

            Ok::<_, Error>(PrimaryBlock {
                flags,
                crc_type,
                destination,
                source,
                report_to,
                timestamp,
                lifetime,
                fragment_info,
            })
        })
    }
}
