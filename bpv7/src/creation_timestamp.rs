use super::*;
use dtn_time::DtnTime;

/// The `(creation time, sequence number)` pair that, together with the source
/// endpoint, identifies a bundle.
#[derive(Default, Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct CreationTimestamp {
    pub creation_time: DtnTime,
    pub sequence_number: u64,
}

impl CreationTimestamp {
    pub fn now() -> Self {
        let timestamp = time::OffsetDateTime::now_utc();
        Self {
            creation_time: DtnTime::now(),
            sequence_number: (timestamp.nanosecond() % 1_000_000) as u64,
        }
    }
}

impl std::fmt::Display for CreationTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}",
            self.creation_time.millisecs(),
            self.sequence_number
        )
    }
}

impl cbor::encode::ToCbor for CreationTimestamp {
    fn to_cbor(&self, encoder: &mut cbor::encode::Encoder) {
        encoder.emit_array(Some(2), |a| {
            a.emit(&self.creation_time);
            a.emit(&self.sequence_number);
        })
    }
}

impl cbor::decode::FromCbor for CreationTimestamp {
    type Error = cbor::decode::Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        cbor::decode::try_parse_array(data, |a, _| {
            Ok::<_, cbor::decode::Error>(CreationTimestamp {
                creation_time: a.parse()?,
                sequence_number: a.parse()?,
            })
        })
    }
}
