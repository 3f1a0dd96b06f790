use super::*;
use eid::Eid;
use std::collections::BTreeMap;

/// A snapshot of one node's direct neighbours.
///
/// The outer `timestamp` is the logical version of the record, monotone per
/// origin. A peer entry of `0` means "currently connected"; any other value
/// is the time the peer disconnected, in seconds.
///
/// Peers are kept in a `BTreeMap` so the encoded form is deterministic.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PeerData {
    pub id: Eid,
    pub timestamp: u64,
    pub peers: BTreeMap<Eid, u64>,
}

impl PeerData {
    pub fn is_newer_than(&self, other: &PeerData) -> bool {
        self.timestamp > other.timestamp
    }
}

impl cbor::encode::ToCbor for PeerData {
    fn to_cbor(&self, encoder: &mut cbor::encode::Encoder) {
        encoder.emit_array(Some(3), |a| {
            a.emit(&self.id);
            a.emit(&self.timestamp);

            // peers flatten to [eid, ts, eid, ts, ...]
            a.emit_array(Some(self.peers.len() * 2), |a| {
                for (peer, timestamp) in &self.peers {
                    a.emit(peer);
                    a.emit(timestamp);
                }
            });
        })
    }
}

impl cbor::decode::FromCbor for PeerData {
    type Error = Error;

    fn try_from_cbor(data: &[u8]) -> Result<Option<(Self, usize)>, Self::Error> {
        cbor::decode::try_parse_array(data, |a, _| {
            let id = a.parse::<Eid>()?;
            let timestamp = a.parse::<u64>()?;
            let peers = a.parse_array(|a, _| {
                let mut peers = BTreeMap::new();
                while let Some(peer) = a.try_parse::<Eid>()? {
                    peers.insert(peer, a.parse::<u64>().map_err(Error::from)?);
                }
                Ok::<_, Error>(peers)
            })?;
            Ok::<_, Error>(PeerData {
                id,
                timestamp,
                peers,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let mut pd = PeerData {
            id: "dtn://node-a/".parse().unwrap(),
            timestamp: 1234,
            peers: BTreeMap::new(),
        };
        pd.peers.insert("dtn://node-b/".parse().unwrap(), 0);
        pd.peers.insert("dtn://node-c/".parse().unwrap(), 997);

        let data = cbor::encode::emit(&pd);
        let parsed: PeerData = cbor::decode::parse(&data).unwrap();
        assert_eq!(parsed, pd);
        assert_eq!(cbor::encode::emit(&parsed), data);
    }

    #[test]
    fn header_carries_twice_the_peer_count() {
        let mut pd = PeerData::default();
        pd.peers.insert("dtn://node-b/".parse().unwrap(), 7);
        let data = cbor::encode::emit(&pd);
        let ((), _) = cbor::decode::parse_array(&data, |a, _| {
            a.parse::<Eid>()?;
            a.parse::<u64>().map_err(Error::from)?;
            a.parse_array(|a, _| {
                assert_eq!(a.count(), Some(2));
                a.parse::<Eid>()?;
                a.parse::<u64>().map_err(Error::from)?;
                Ok::<_, Error>(())
            })
        })
        .unwrap();
    }

    #[test]
    fn freshness_is_by_timestamp() {
        let newer = PeerData {
            timestamp: 100,
            ..Default::default()
        };
        let older = PeerData {
            timestamp: 50,
            ..Default::default()
        };
        assert!(newer.is_newer_than(&older));
        assert!(!older.is_newer_than(&newer));
        assert!(!newer.is_newer_than(&newer));
    }
}
