use super::*;
use creation_timestamp::CreationTimestamp;
use eid::Eid;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct FragmentInfo {
    pub offset: u64,
    pub total_len: u64,
}

/// The identity of a bundle: source, creation timestamp, and the fragment
/// coordinates when the bundle is a fragment.
///
/// Fragments of one original bundle share a *scrubbed* id, which has the
/// fragment fields cleared. The scrubbed string form keys the store; the full
/// string form names the on-disk blob of each part.
#[derive(Default, Debug, Clone, Hash, PartialEq, Eq)]
pub struct BundleId {
    pub source: Eid,
    pub timestamp: CreationTimestamp,
    pub fragment_info: Option<FragmentInfo>,
}

impl BundleId {
    pub fn scrub(&self) -> BundleId {
        BundleId {
            source: self.source.clone(),
            timestamp: self.timestamp,
            fragment_info: None,
        }
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment_info.is_some()
    }
}

impl std::fmt::Display for BundleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.source, self.timestamp)?;
        if let Some(fragment_info) = &self.fragment_info {
            write!(f, "-{}-{}", fragment_info.offset, fragment_info.total_len)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrubbed_ids_of_fragments_coincide() {
        let source: Eid = "dtn://node-a/".parse().unwrap();
        let timestamp = CreationTimestamp {
            creation_time: dtn_time::DtnTime::new(812_000),
            sequence_number: 4,
        };
        let a = BundleId {
            source: source.clone(),
            timestamp,
            fragment_info: Some(FragmentInfo {
                offset: 0,
                total_len: 1000,
            }),
        };
        let b = BundleId {
            source,
            timestamp,
            fragment_info: Some(FragmentInfo {
                offset: 500,
                total_len: 1000,
            }),
        };
        assert_ne!(a, b);
        assert_ne!(a.to_string(), b.to_string());
        assert_eq!(a.scrub(), b.scrub());
        assert_eq!(a.scrub().to_string(), "dtn://node-a/-812000-4");
        assert!(!a.scrub().is_fragment());
    }
}
