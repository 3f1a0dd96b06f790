use super::*;
use thiserror::Error;

mod parse;

#[cfg(test)]
mod tests;

#[derive(Error, Debug)]
pub enum EidError {
    #[error("Unsupported EID scheme {0}")]
    UnsupportedScheme(u64),

    #[error("Invalid scheme-specific part")]
    InvalidSsp,

    #[error("{0}")]
    ParseError(String),

    #[error(transparent)]
    InvalidCbor(#[from] cbor::decode::Error),
}

/// An endpoint identifier with a canonical string form.
///
/// `dtn:none` is the null endpoint, and the `broadcast` node name is reserved
/// for the all-nodes destination used by routing metadata bundles.
#[derive(Default, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Eid {
    #[default]
    Null,
    Dtn {
        node_name: Box<str>,
        demux: Box<str>,
    },
    Ipn {
        node_number: u64,
        service_number: u64,
    },
}

const BROADCAST_NODE: &str = "broadcast";

impl Eid {
    pub fn null() -> Self {
        Eid::Null
    }

    /// The reserved all-nodes destination, `dtn://broadcast/`.
    pub fn broadcast() -> Self {
        Eid::Dtn {
            node_name: BROADCAST_NODE.into(),
            demux: "".into(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Eid::Null)
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, Eid::Dtn { node_name, demux } if &**node_name == BROADCAST_NODE && demux.is_empty())
    }

    /// This endpoint with any application demux stripped, identifying the
    /// node itself.
    pub fn node_id(&self) -> Eid {
        match self {
            Eid::Null => Eid::Null,
            Eid::Dtn { node_name, .. } => Eid::Dtn {
                node_name: node_name.clone(),
                demux: "".into(),
            },
            Eid::Ipn { node_number, .. } => Eid::Ipn {
                node_number: *node_number,
                service_number: 0,
            },
        }
    }

    /// True if this endpoint is hosted by the node identified by `node`.
    pub fn matches_node(&self, node: &Eid) -> bool {
        !self.is_null() && self.node_id() == node.node_id()
    }
}

impl cbor::encode::ToCbor for Eid {
    fn to_cbor(&self, encoder: &mut cbor::encode::Encoder) {
        encoder.emit_array(Some(2), |a| match self {
            Eid::Null => {
                a.emit(&1u64);
                a.emit(&0u64);
            }
            Eid::Dtn { node_name, demux } => {
                a.emit(&1u64);
                a.emit(format!("//{}/{demux}", urlencoding::encode(node_name)).as_str());
            }
            Eid::Ipn {
                node_number,
                service_number,
            } => {
                a.emit(&2u64);
                a.emit_array(Some(2), |a| {
                    a.emit(node_number);
                    a.emit(service_number);
                });
            }
        })
    }
}

impl cbor::decode::FromCbor for Eid {
    type Error = EidError;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        cbor::decode::try_parse_array(data, |a, _| {
            match a.parse::<u64>()? {
                1 => a.parse_value(|value, _| match value {
                    cbor::decode::Value::UnsignedInteger(0) => Ok(Eid::Null),
                    cbor::decode::Value::Text("none") => Ok(Eid::Null),
                    cbor::decode::Value::Text(s) => {
                        use winnow::Parser;
                        parse::parse_dtn
                            .parse(s)
                            .map_err(|e| EidError::ParseError(e.to_string()))
                    }
                    value => Err(cbor::decode::Error::IncorrectType(
                        "Text String".to_string(),
                        value.type_name().to_string(),
                    )
                    .into()),
                }),
                2 => a.parse_array(|a, _| {
                    let node_number = a.parse::<u64>()?;
                    let service_number = a.parse::<u64>()?;
                    Ok(Eid::Ipn {
                        node_number,
                        service_number,
                    })
                }),
                scheme => Err(EidError::UnsupportedScheme(scheme)),
            }
        })
    }
}

impl std::fmt::Display for Eid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eid::Null => f.write_str("dtn:none"),
            Eid::Dtn { node_name, demux } => {
                write!(f, "dtn://{}/{demux}", urlencoding::encode(node_name))
            }
            Eid::Ipn {
                node_number,
                service_number,
            } => write!(f, "ipn:{node_number}.{service_number}"),
        }
    }
}

impl std::fmt::Debug for Eid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

impl serde::Serialize for Eid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Eid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
