//! Guest-to-host leaf map and the maximum-parsimony reconciliation (MPR).

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};

use crate::error::{DlrsError, Result};
use crate::tree::{RBTree, VertexId};

/// Which host leaf each guest leaf belongs to, by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuestHostMap {
    map: HashMap<String, String>,
}

impl GuestHostMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `guestLeaf<TAB>hostLeaf` lines. Lines starting with `#` are
    /// skipped.
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_reader(File::open(path)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .trim(Trim::All)
            .from_reader(reader);
        let mut map = Self::new();
        for record in rdr.records() {
            let record = record?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            if record.len() != 2 {
                return Err(DlrsError::Parse(format!(
                    "expected 'guest<TAB>host' in leaf map, got {:?}",
                    record.iter().collect::<Vec<_>>()
                )));
            }
            map.insert(&record[0], &record[1])?;
        }
        Ok(map)
    }

    pub fn insert(&mut self, guest_leaf: &str, host_leaf: &str) -> Result<()> {
        if let Some(prev) = self.map.insert(guest_leaf.to_string(), host_leaf.to_string()) {
            if prev != host_leaf {
                return Err(DlrsError::InvalidInput(format!(
                    "guest leaf {} mapped to both {} and {}",
                    guest_leaf, prev, host_leaf
                )));
            }
        }
        Ok(())
    }

    pub fn host_leaf(&self, guest_leaf: &str) -> Option<&str> {
        self.map.get(guest_leaf).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// The σ map: every guest vertex sent to the lowest host vertex it can
/// possibly be placed at.
#[derive(Debug, Clone, PartialEq)]
pub struct MprMap {
    sigma: Vec<VertexId>,
    duplication: Vec<bool>,
}

impl MprMap {
    pub fn new(guest: &RBTree, host: &RBTree, leaf_map: &GuestHostMap) -> Result<Self> {
        let host_leaves = host.leaf_names();
        let n = guest.vertex_count();
        let mut sigma = vec![0; n];
        let mut duplication = vec![false; n];

        for u in guest.post_order() {
            match guest.children(u) {
                None => {
                    let name = guest.name(u).ok_or_else(|| {
                        DlrsError::InvalidInput(format!("guest leaf {} has no name", u))
                    })?;
                    let host_name = leaf_map.host_leaf(name).ok_or_else(|| {
                        DlrsError::InvalidInput(format!("guest leaf {} missing from leaf map", name))
                    })?;
                    sigma[u] = *host_leaves.get(host_name).ok_or_else(|| {
                        DlrsError::InvalidInput(format!(
                            "guest leaf {} mapped to unknown host leaf {}",
                            name, host_name
                        ))
                    })?;
                }
                Some((l, r)) => {
                    sigma[u] = host.lca(sigma[l], sigma[r]);
                    duplication[u] = sigma[u] == sigma[l] || sigma[u] == sigma[r];
                }
            }
        }
        Ok(Self { sigma, duplication })
    }

    pub fn sigma(&self, u: VertexId) -> VertexId {
        self.sigma[u]
    }

    /// True if `u` must be a duplication in every reconciliation.
    pub fn is_duplication(&self, u: VertexId) -> bool {
        self.duplication[u]
    }

    pub fn duplication_count(&self) -> usize {
        self.duplication.iter().filter(|&&d| d).count()
    }

    /// Losses implied by the parsimonious reconciliation.
    pub fn loss_count(&self, guest: &RBTree, host: &RBTree) -> usize {
        let mut losses = 0;
        for u in 0..guest.vertex_count() {
            let Some((l, r)) = guest.children(u) else {
                continue;
            };
            let du = host.depth(self.sigma[u]);
            for c in [l, r] {
                let skipped = host.depth(self.sigma[c]) - du;
                losses += if self.duplication[u] { skipped } else { skipped - 1 };
            }
        }
        losses
    }
}
