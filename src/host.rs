//! Dated host tree: topology plus absolute vertex times and a stem arc.

use crate::error::{DlrsError, Result};
use crate::newick::NewickTree;
use crate::tree::{RBTree, VertexId};

/// Relative tolerance when checking that all leaves share time zero.
const ULTRAMETRIC_TOLERANCE: f64 = 1e-6;

/// A host tree S with absolute times. Leaves sit at time 0 and time grows
/// towards the root; the root's arc is the stem, predating the root by
/// `stem_time`.
#[derive(Debug, Clone, PartialEq)]
pub struct HostTree {
    tree: RBTree,
    vertex_times: Vec<f64>,
    stem_time: f64,
}

impl HostTree {
    /// Builds a host tree from explicit absolute times.
    pub fn new(tree: RBTree, vertex_times: Vec<f64>, stem_time: f64) -> Result<Self> {
        let host = Self {
            tree,
            vertex_times,
            stem_time,
        };
        host.validate()?;
        Ok(host)
    }

    /// Reads times from an ultrametric Newick tree whose branch lengths are
    /// arc times. The root's branch length, if any, is the stem time.
    pub fn from_newick(nw: &NewickTree) -> Result<Self> {
        let tree = nw.tree.clone();
        let mut depths = vec![0.0; tree.vertex_count()];
        for v in tree.topological_order() {
            if let Some(p) = tree.parent(v) {
                let len = nw.lengths[v].ok_or_else(|| {
                    DlrsError::InvalidInput(format!("host arc above vertex {} lacks a time", v))
                })?;
                depths[v] = depths[p] + len;
            }
        }

        let height = tree
            .leaves()
            .iter()
            .map(|&l| depths[l])
            .fold(0.0_f64, f64::max);
        for l in tree.leaves() {
            if (depths[l] - height).abs() > ULTRAMETRIC_TOLERANCE * height.max(1.0) {
                return Err(DlrsError::InvalidInput(format!(
                    "host tree is not ultrametric: leaf {} has depth {} but tree height is {}",
                    tree.name(l).unwrap_or("?"),
                    depths[l],
                    height
                )));
            }
        }

        let vertex_times = depths
            .iter()
            .enumerate()
            .map(|(v, &d)| if tree.is_leaf(v) { 0.0 } else { (height - d).max(0.0) })
            .collect();
        let stem_time = nw.lengths[tree.root()].unwrap_or(0.0);
        Self::new(tree, vertex_times, stem_time)
    }

    fn validate(&self) -> Result<()> {
        let n = self.tree.vertex_count();
        if self.vertex_times.len() != n {
            return Err(DlrsError::InvalidInput(format!(
                "{} times given for {} host vertices",
                self.vertex_times.len(),
                n
            )));
        }
        if !(self.stem_time >= 0.0) || !self.stem_time.is_finite() {
            return Err(DlrsError::InvalidInput(format!("invalid stem time {}", self.stem_time)));
        }
        for v in 0..n {
            let t = self.vertex_times[v];
            if !t.is_finite() || t < 0.0 {
                return Err(DlrsError::InvalidInput(format!("invalid time {} of host vertex {}", t, v)));
            }
            if let Some(p) = self.tree.parent(v) {
                if self.vertex_times[p] <= t {
                    return Err(DlrsError::InvalidInput(format!(
                        "host vertex {} is not older than its child {}",
                        p, v
                    )));
                }
            }
        }
        Ok(())
    }

    /// Same topology, new times.
    pub fn with_times(&self, vertex_times: Vec<f64>, stem_time: f64) -> Result<Self> {
        Self::new(self.tree.clone(), vertex_times, stem_time)
    }

    pub fn tree(&self) -> &RBTree {
        &self.tree
    }

    pub fn vertex_times(&self) -> &[f64] {
        &self.vertex_times
    }

    pub fn vertex_time(&self, x: VertexId) -> f64 {
        self.vertex_times[x]
    }

    /// Time span of the arc above `x`; the stem time for the root.
    pub fn arc_time(&self, x: VertexId) -> f64 {
        match self.tree.parent(x) {
            Some(p) => self.vertex_times[p] - self.vertex_times[x],
            None => self.stem_time,
        }
    }

    pub fn stem_time(&self) -> f64 {
        self.stem_time
    }

    /// Absolute time of the very tip of the stem arc.
    pub fn tip_time(&self) -> f64 {
        self.vertex_times[self.tree.root()] + self.stem_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::newick;

    #[test]
    fn times_from_ultrametric_newick() {
        let nw = newick::parse("((A:1.0,B:1.0):0.5,C:1.5):0.25;").unwrap();
        let host = HostTree::from_newick(&nw).unwrap();
        let root = host.tree().root();
        assert!((host.vertex_time(root) - 1.5).abs() < 1e-12);
        assert!((host.stem_time() - 0.25).abs() < 1e-12);
        assert!((host.tip_time() - 1.75).abs() < 1e-12);
        let a = host.tree().leaf_names()["A"];
        let ab = host.tree().parent(a).unwrap();
        assert!((host.vertex_time(ab) - 1.0).abs() < 1e-12);
        assert!((host.arc_time(ab) - 0.5).abs() < 1e-12);
        assert_eq!(host.vertex_time(a), 0.0);
    }

    #[test]
    fn missing_stem_means_zero() {
        let nw = newick::parse("(A:1.0,B:1.0);").unwrap();
        let host = HostTree::from_newick(&nw).unwrap();
        assert_eq!(host.stem_time(), 0.0);
        assert_eq!(host.arc_time(host.tree().root()), 0.0);
    }

    #[test]
    fn rejects_non_ultrametric() {
        let nw = newick::parse("(A:1.0,B:2.0);").unwrap();
        assert!(HostTree::from_newick(&nw).is_err());
    }

    #[test]
    fn rejects_parent_younger_than_child() {
        let nw = newick::parse("(A:1.0,B:1.0);").unwrap();
        let host = HostTree::from_newick(&nw).unwrap();
        assert!(host.with_times(vec![0.0, 0.0, 0.0], 0.0).is_err());
        assert!(host.with_times(vec![2.0, 0.0, 0.0], 1.0).is_ok());
    }
}
