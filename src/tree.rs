//! Rooted bifurcating tree topology shared by the host and guest trees.
//!
//! Vertices are numbered `0..n` and stored arena-style. Every walk in this
//! module uses an explicit stack or queue, so tree depth is never bounded by
//! the call stack.

use std::collections::{HashMap, VecDeque};

use crate::error::{DlrsError, Result};

/// Index of a vertex in a [`RBTree`].
pub type VertexId = usize;

/// A rooted tree in which every internal vertex has exactly two children.
#[derive(Debug, Clone, PartialEq)]
pub struct RBTree {
    parents: Vec<Option<VertexId>>,
    children: Vec<Option<(VertexId, VertexId)>>,
    names: Vec<Option<String>>,
    root: VertexId,
}

impl RBTree {
    /// Builds a tree from a parent vector and per-vertex names.
    ///
    /// Exactly one vertex must lack a parent, every other vertex must have
    /// either zero or two children, and all vertices must reach the root.
    pub fn from_parents(parents: Vec<Option<VertexId>>, names: Vec<Option<String>>) -> Result<Self> {
        let n = parents.len();
        if n == 0 {
            return Err(DlrsError::InvalidInput("empty tree".into()));
        }
        if names.len() != n {
            return Err(DlrsError::InvalidInput(format!(
                "{} names given for {} vertices",
                names.len(),
                n
            )));
        }

        let mut child_lists: Vec<Vec<VertexId>> = vec![Vec::new(); n];
        let mut root = None;
        for (v, parent) in parents.iter().enumerate() {
            match *parent {
                Some(p) if p >= n => {
                    return Err(DlrsError::InvalidInput(format!(
                        "parent {} of vertex {} out of range",
                        p, v
                    )));
                }
                Some(p) if p == v => {
                    return Err(DlrsError::InvalidInput(format!("vertex {} is its own parent", v)));
                }
                Some(p) => child_lists[p].push(v),
                None => {
                    if root.is_some() {
                        return Err(DlrsError::InvalidInput("tree has more than one root".into()));
                    }
                    root = Some(v);
                }
            }
        }
        let root = root.ok_or_else(|| DlrsError::InvalidInput("tree has no root".into()))?;

        let mut children = Vec::with_capacity(n);
        for (v, list) in child_lists.iter().enumerate() {
            match list.as_slice() {
                [] => children.push(None),
                [l, r] => children.push(Some((*l, *r))),
                other => {
                    return Err(DlrsError::InvalidInput(format!(
                        "vertex {} has {} children; only bifurcating trees are supported",
                        v,
                        other.len()
                    )));
                }
            }
        }

        let tree = Self {
            parents,
            children,
            names,
            root,
        };

        // Cycles would leave vertices unreachable from the root.
        if tree.topological_order().len() != n {
            return Err(DlrsError::InvalidInput("tree is not connected".into()));
        }
        Ok(tree)
    }

    pub fn root(&self) -> VertexId {
        self.root
    }

    pub fn vertex_count(&self) -> usize {
        self.parents.len()
    }

    pub fn parent(&self, v: VertexId) -> Option<VertexId> {
        self.parents[v]
    }

    pub fn children(&self, v: VertexId) -> Option<(VertexId, VertexId)> {
        self.children[v]
    }

    pub fn is_leaf(&self, v: VertexId) -> bool {
        self.children[v].is_none()
    }

    pub fn is_root(&self, v: VertexId) -> bool {
        v == self.root
    }

    pub fn name(&self, v: VertexId) -> Option<&str> {
        self.names[v].as_deref()
    }

    /// The other child of `v`'s parent, or `None` for the root.
    pub fn sibling(&self, v: VertexId) -> Option<VertexId> {
        let (l, r) = self.children[self.parents[v]?]?;
        Some(if l == v { r } else { l })
    }

    pub fn leaves(&self) -> Vec<VertexId> {
        (0..self.vertex_count()).filter(|&v| self.is_leaf(v)).collect()
    }

    /// Maps leaf names to vertices. Unnamed leaves are skipped.
    pub fn leaf_names(&self) -> HashMap<&str, VertexId> {
        self.leaves()
            .into_iter()
            .filter_map(|v| self.name(v).map(|name| (name, v)))
            .collect()
    }

    /// Vertices in breadth-first order from the root, so every parent
    /// precedes its children.
    pub fn topological_order(&self) -> Vec<VertexId> {
        let mut order = Vec::with_capacity(self.vertex_count());
        let mut queue = VecDeque::from([self.root]);
        while let Some(v) = queue.pop_front() {
            order.push(v);
            if let Some((l, r)) = self.children[v] {
                queue.push_back(l);
                queue.push_back(r);
            }
        }
        order
    }

    /// Vertices in post-order (left subtree, right subtree, vertex).
    pub fn post_order(&self) -> Vec<VertexId> {
        self.post_order_from(self.root)
    }

    /// Post-order of the subtree rooted at `v`.
    pub fn post_order_from(&self, v: VertexId) -> Vec<VertexId> {
        let mut order = Vec::new();
        let mut stack = vec![(v, false)];
        while let Some((u, expanded)) = stack.pop() {
            match (expanded, self.children[u]) {
                (false, Some((l, r))) => {
                    stack.push((u, true));
                    stack.push((r, false));
                    stack.push((l, false));
                }
                _ => order.push(u),
            }
        }
        order
    }

    /// Number of proper ancestors of `v`.
    pub fn depth(&self, v: VertexId) -> usize {
        self.ancestors(v).count()
    }

    /// Proper ancestors of `v`, nearest first.
    pub fn ancestors(&self, v: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        std::iter::successors(self.parents[v], move |&u| self.parents[u])
    }

    /// True if `a` lies on the path from `b` to the root (inclusive).
    pub fn is_ancestor_or_self(&self, a: VertexId, b: VertexId) -> bool {
        a == b || self.ancestors(b).any(|u| u == a)
    }

    /// Lowest common ancestor of two vertices.
    pub fn lca(&self, a: VertexId, b: VertexId) -> VertexId {
        let (mut a, mut b) = (a, b);
        let (mut da, mut db) = (self.depth(a), self.depth(b));
        while da > db {
            a = self.parents[a].unwrap_or(a);
            da -= 1;
        }
        while db > da {
            b = self.parents[b].unwrap_or(b);
            db -= 1;
        }
        while a != b {
            match (self.parents[a], self.parents[b]) {
                (Some(pa), Some(pb)) => {
                    a = pa;
                    b = pb;
                }
                _ => break,
            }
        }
        a
    }

    /// The union of the root paths of `vertices`, ordered so that children
    /// precede their parents. This is the set of vertices whose subtree
    /// quantities depend on any of `vertices`.
    pub fn spanning_root_subtree(&self, vertices: &[VertexId]) -> Vec<VertexId> {
        let mut marked = vec![false; self.vertex_count()];
        for &v in vertices {
            let mut u = Some(v);
            while let Some(w) = u {
                if marked[w] {
                    break;
                }
                marked[w] = true;
                u = self.parents[w];
            }
        }
        self.post_order().into_iter().filter(|&v| marked[v]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ((A,B),C) with root 0.
    fn three_leaf() -> RBTree {
        let parents = vec![None, Some(0), Some(1), Some(1), Some(0)];
        let names = vec![
            None,
            None,
            Some("A".to_string()),
            Some("B".to_string()),
            Some("C".to_string()),
        ];
        RBTree::from_parents(parents, names).unwrap()
    }

    #[test]
    fn navigation() {
        let t = three_leaf();
        assert_eq!(t.root(), 0);
        assert_eq!(t.children(1), Some((2, 3)));
        assert_eq!(t.sibling(2), Some(3));
        assert_eq!(t.sibling(4), Some(1));
        assert_eq!(t.sibling(0), None);
        assert_eq!(t.leaves(), vec![2, 3, 4]);
        assert_eq!(t.depth(3), 2);
        assert_eq!(t.leaf_names()["C"], 4);
    }

    #[test]
    fn orders() {
        let t = three_leaf();
        assert_eq!(t.topological_order(), vec![0, 1, 4, 2, 3]);
        assert_eq!(t.post_order(), vec![2, 3, 1, 4, 0]);
    }

    #[test]
    fn lca_and_ancestry() {
        let t = three_leaf();
        assert_eq!(t.lca(2, 3), 1);
        assert_eq!(t.lca(2, 4), 0);
        assert_eq!(t.lca(1, 3), 1);
        assert!(t.is_ancestor_or_self(1, 3));
        assert!(!t.is_ancestor_or_self(4, 3));
    }

    #[test]
    fn spanning_root_subtree_is_children_first() {
        let t = three_leaf();
        assert_eq!(t.spanning_root_subtree(&[3]), vec![3, 1, 0]);
        assert_eq!(t.spanning_root_subtree(&[4, 2]), vec![2, 1, 4, 0]);
    }

    #[test]
    fn rejects_non_binary() {
        let parents = vec![None, Some(0), Some(0), Some(0)];
        let names = vec![None; 4];
        assert!(RBTree::from_parents(parents, names).is_err());
    }

    #[test]
    fn rejects_cycles_and_two_roots() {
        let names = vec![None; 3];
        assert!(RBTree::from_parents(vec![None, None, Some(0)], names.clone()).is_err());
        // 1 and 2 point at each other and are unreachable from 0.
        assert!(RBTree::from_parents(vec![None, Some(2), Some(1)], names).is_err());
    }

    #[test]
    fn deep_caterpillar_does_not_overflow() {
        // Caterpillar of 20000 leaves: internal i has children (leaf, i+1).
        let internals = 20_000;
        let mut parents = vec![None];
        let mut names = vec![None];
        let mut spine = 0;
        for i in 0..internals {
            let parent = spine;
            parents.push(Some(parent));
            names.push(Some(format!("l{}", i)));
            spine = parents.len();
            parents.push(Some(parent));
            names.push(None);
        }
        let t = RBTree::from_parents(parents, names).unwrap();
        assert_eq!(t.post_order().len(), t.vertex_count());
        assert_eq!(*t.post_order().last().unwrap(), t.root());
    }
}
