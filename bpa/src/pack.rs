use super::*;
use mule_bpv7::{bundle_id::BundleId, eid::Eid};
use std::collections::BTreeSet;

/// A tag marking a bundle's position in the processing pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Constraint {
    DispatchPending,
    ForwardPending,
    ReassemblyPending,
    Contraindicated,
    LocalEndpoint,
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Constraint::DispatchPending => "dispatch pending",
            Constraint::ForwardPending => "forwarding pending",
            Constraint::ReassemblyPending => "reassembly pending",
            Constraint::Contraindicated => "contraindicated",
            Constraint::LocalEndpoint => "local endpoint",
        })
    }
}

/// Dispatcher-owned metadata persisted alongside a bundle.
#[derive(Debug, Clone)]
pub struct PackState {
    /// The local CL endpoint the bundle arrived through, or the node id for
    /// locally submitted bundles.
    pub receiver: Eid,
    pub received_at: time::OffsetDateTime,
    pub constraints: BTreeSet<Constraint>,
    /// Peers this bundle has already been transmitted to.
    pub sent_to: Vec<Eid>,
}

impl Default for PackState {
    fn default() -> Self {
        Self {
            receiver: Eid::Null,
            received_at: time::OffsetDateTime::now_utc(),
            constraints: BTreeSet::new(),
            sent_to: Vec::new(),
        }
    }
}

impl PackState {
    pub fn has(&self, constraint: Constraint) -> bool {
        self.constraints.contains(&constraint)
    }

    pub fn has_constraints(&self) -> bool {
        !self.constraints.is_empty()
    }

    pub fn add(&mut self, constraint: Constraint) {
        self.constraints.insert(constraint);
    }

    pub fn remove(&mut self, constraint: Constraint) {
        self.constraints.remove(&constraint);
    }

    /// Drop all constraints except `LocalEndpoint`.
    pub fn purge_constraints(&mut self) {
        self.constraints
            .retain(|c| matches!(c, Constraint::LocalEndpoint));
    }

    /// A bundle is pending exactly when it awaits forwarding and is not held
    /// back for reassembly.
    pub fn pending(&self) -> bool {
        !self.has(Constraint::ReassemblyPending)
            && (self.has(Constraint::ForwardPending) || self.has(Constraint::Contraindicated))
    }
}

/// In-memory processing envelope for one logical bundle.
#[derive(Debug, Clone)]
pub struct BundlePack {
    /// The scrubbed bundle id.
    pub id: BundleId,
    pub state: PackState,
}

impl BundlePack {
    pub fn new(id: &BundleId, receiver: Eid) -> Self {
        Self {
            id: id.scrub(),
            state: PackState {
                receiver,
                ..Default::default()
            },
        }
    }

    pub fn from_item(item: &storage::BundleItem) -> Self {
        Self {
            id: item.bundle_id.clone(),
            state: item.pack.clone(),
        }
    }

    /// Write this pack back to the store, deriving the item's `pending` flag.
    pub fn sync(&self, store: &storage::Store) -> storage::Result<()> {
        let mut item = store.query_id(&self.id.to_string())?;
        item.pending = self.state.pending();
        item.pack = self.state.clone();
        store.update(item)
    }
}

impl std::fmt::Display for BundlePack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BundlePack({}", self.id)?;
        for c in &self.state.constraints {
            write!(f, ", {c}")?;
        }
        write!(f, ")")
    }
}
