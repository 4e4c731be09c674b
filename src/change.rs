//! Which inputs a proposal touched.

use std::collections::BTreeMap;

use crate::tree::VertexId;

/// An input the likelihood depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Parent {
    HostTimes,
    Discretisation,
    DupLossRates,
    GuestTopology,
    MprMap,
    Placements,
    BranchLengths,
    RateDistribution,
}

/// Changed inputs, each with the guest vertices it affects when known.
/// `None` means "possibly everything".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: BTreeMap<Parent, Option<Vec<VertexId>>>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a change. Repeated entries for the same input merge; an
    /// unknown extent wins over a known one.
    pub fn insert(&mut self, parent: Parent, affected: Option<Vec<VertexId>>) {
        use std::collections::btree_map::Entry;
        match self.changes.entry(parent) {
            Entry::Vacant(e) => {
                e.insert(affected);
            }
            Entry::Occupied(mut e) => match (e.get_mut(), affected) {
                (Some(old), Some(new)) => {
                    old.extend(new);
                    old.sort_unstable();
                    old.dedup();
                }
                (slot, _) => *slot = None,
            },
        }
    }

    pub fn with(mut self, parent: Parent, affected: Option<Vec<VertexId>>) -> Self {
        self.insert(parent, affected);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn contains(&self, parent: Parent) -> bool {
        self.changes.contains_key(&parent)
    }

    /// `Some(None)` if `parent` changed in unknown places.
    pub fn get(&self, parent: Parent) -> Option<Option<&[VertexId]>> {
        self.changes.get(&parent).map(|a| a.as_deref())
    }

    pub fn parents(&self) -> impl Iterator<Item = Parent> + '_ {
        self.changes.keys().copied()
    }
}
