use super::*;
use mule_bpv7::eid::Eid;
use mule_cbor as cbor;

/// Convergence-layer types a discovery announcement can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaType {
    Mtcp,
    Unrecognised(u64),
}

impl From<u64> for ClaType {
    fn from(value: u64) -> Self {
        match value {
            0 => ClaType::Mtcp,
            value => ClaType::Unrecognised(value),
        }
    }
}

impl From<ClaType> for u64 {
    fn from(value: ClaType) -> Self {
        match value {
            ClaType::Mtcp => 0,
            ClaType::Unrecognised(v) => v,
        }
    }
}

/// One announced convergence-layer endpoint of a neighbour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub cla_type: ClaType,
    pub endpoint: Eid,
    pub address: String,
    pub port: u16,
}

impl Message {
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl cbor::encode::ToCbor for Message {
    fn to_cbor(&self, encoder: &mut cbor::encode::Encoder) {
        encoder.emit_array(Some(4), |a| {
            a.emit(&u64::from(self.cla_type));
            a.emit(&self.endpoint);
            a.emit(self.address.as_str());
            a.emit(&(self.port as u64));
        })
    }
}

impl cbor::decode::FromCbor for Message {
    type Error = bpv7::Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        cbor::decode::try_parse_array(data, |a, _| {
            let cla_type = ClaType::from(a.parse::<u64>()?);
            let endpoint = a.parse::<Eid>()?;
            let address = a.parse::<String>()?;
            let port = a.parse::<u64>()?;
            Ok::<_, bpv7::Error>(Message {
                cla_type,
                endpoint,
                address,
                port: port as u16,
            })
        })
    }
}

/// Decode a CBOR batch of discovery messages: a definite array of messages.
pub fn decode_batch(data: &[u8]) -> Result<Vec<Message>, bpv7::Error> {
    let (messages, len) = cbor::decode::parse_array(data, |a, _| {
        let mut messages = Vec::new();
        while let Some(message) = a.try_parse::<Message>()? {
            messages.push(message);
        }
        Ok::<_, bpv7::Error>(messages)
    })?;
    if len != data.len() {
        return Err(bpv7::Error::AdditionalData);
    }
    Ok(messages)
}

pub fn encode_batch(messages: &[Message]) -> Vec<u8> {
    cbor::encode::emit_array(Some(messages.len()), |a| {
        for message in messages {
            a.emit(message);
        }
    })
}

/// Builds a convergence sender from a discovery announcement; the node
/// translates each announcement into a CL registration through this.
pub trait SenderFactory: Send + Sync {
    fn sender(&self, message: &Message) -> Option<Arc<dyn cla::ConvergenceSender>>;
}
