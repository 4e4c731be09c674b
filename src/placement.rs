//! Valid placements of guest vertices on the discretised host tree.
//!
//! A guest vertex `u` may sit at any point from its lower limit upwards,
//! strictly below the uppermost point available to its parent. The lower
//! limit is the speciation point σ(u) if that is reachable above both
//! children, and otherwise the first midpoint above the higher child.

use std::iter;

use tracing::debug;

use crate::discretisation::{Discretisation, Point};
use crate::error::{DlrsError, Result};
use crate::mpr::MprMap;
use crate::tree::{RBTree, VertexId};

#[derive(Debug, Clone, PartialEq)]
pub struct PlacementIndex {
    lower_limits: Vec<Point>,
    upper_limits: Vec<Point>,
    counts: Vec<usize>,
}

impl PlacementIndex {
    pub fn new(
        guest: &RBTree,
        disc: &Discretisation,
        mpr: &MprMap,
        max_implied_losses: Option<usize>,
    ) -> Result<Self> {
        let lower_limits = lower_limits(guest, disc, mpr)?;
        let n = guest.vertex_count();
        let mut upper_limits = lower_limits.clone();
        let mut counts = vec![0; n];
        let host = disc.tree();
        let cap = max_implied_losses.unwrap_or(usize::MAX);

        for u in guest.topological_order() {
            if guest.is_leaf(u) {
                counts[u] = 1;
                continue;
            }
            let top = match guest.parent(u) {
                Some(p) => upper_limits[p],
                None => disc.tip(),
            };

            let lo = lower_limits[u];
            let mut losses = host
                .ancestors(mpr.sigma(u))
                .take_while(|&a| a != lo.arc)
                .count()
                + usize::from(mpr.sigma(u) != lo.arc);
            if losses > cap {
                return Err(DlrsError::InsufficientDiscretisation(format!(
                    "lower limit of guest vertex {} implies {} losses, more than the allowed {}",
                    u, losses, cap
                )));
            }

            let mut p = lo;
            while !(p.arc == top.arc && p.index >= top.index) && p != disc.tip() && losses <= cap {
                counts[u] += 1;
                upper_limits[u] = p;
                let next = disc.next_point(p);
                if next.arc != p.arc {
                    losses += 1;
                }
                p = next;
            }

            if counts[u] == 0 {
                return Err(DlrsError::InsufficientDiscretisation(format!(
                    "guest vertex {} has no placement between {} and {}",
                    u, lo, top
                )));
            }
        }
        debug!(
            placements = counts.iter().sum::<usize>(),
            "computed guest placement counts"
        );

        Ok(Self {
            lower_limits,
            upper_limits,
            counts,
        })
    }

    pub fn lower_limit(&self, u: VertexId) -> Point {
        self.lower_limits[u]
    }

    /// The uppermost valid placement of `u`.
    pub fn upper_limit(&self, u: VertexId) -> Point {
        self.upper_limits[u]
    }

    pub fn placement_count(&self, u: VertexId) -> usize {
        self.counts[u]
    }

    /// Every valid placement of `u`, lowest first.
    pub fn placements<'a>(
        &'a self,
        u: VertexId,
        disc: &'a Discretisation,
    ) -> impl Iterator<Item = Point> + 'a {
        iter::successors(Some(self.lower_limits[u]), move |&p| Some(disc.next_point(p)))
            .take(self.counts[u])
    }
}

/// Lower limits for every guest vertex, children before parents.
fn lower_limits(guest: &RBTree, disc: &Discretisation, mpr: &MprMap) -> Result<Vec<Point>> {
    let host = disc.tree();
    let mut lo_lims = vec![Point::new(0, 0); guest.vertex_count()];

    for u in guest.post_order() {
        let sigma = mpr.sigma(u);
        let Some((lc, rc)) = guest.children(u) else {
            lo_lims[u] = Point::new(sigma, 0);
            continue;
        };
        let (lc_lo, rc_lo) = (lo_lims[lc], lo_lims[rc]);

        // Lowest point above the left child, then walk towards the root.
        let mut lo = Point::new(lc_lo.arc, lc_lo.index + 1);
        let mut curr = Some(lo.arc);
        while let Some(x) = curr {
            if x == sigma && lo.arc != sigma {
                lo = Point::new(sigma, 0);
            }
            if x == rc_lo.arc {
                lo = if lo.arc == x {
                    Point::new(x, lo.index.max(rc_lo.index + 1))
                } else {
                    // The right child sits higher up than the left.
                    Point::new(rc_lo.arc, rc_lo.index + 1)
                };
                break;
            }
            curr = host.parent(x);
        }

        if lo.index > disc.slice_count(lo.arc) {
            let parent = host.parent(lo.arc).ok_or_else(|| {
                DlrsError::InsufficientDiscretisation(format!(
                    "no room for guest vertex {} on the stem arc",
                    u
                ))
            })?;
            lo = Point::new(parent, 1);
        }
        lo_lims[u] = lo;
    }
    Ok(lo_lims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiscretisationConfig;
    use crate::host::HostTree;
    use crate::mpr::GuestHostMap;
    use crate::newick;

    struct Fixture {
        guest: RBTree,
        disc: Discretisation,
        mpr: MprMap,
    }

    fn fixture(host: &str, guest: &str, map: &[(&str, &str)], slices: usize, stem: Option<usize>) -> Fixture {
        let host = HostTree::from_newick(&newick::parse(host).unwrap()).unwrap();
        let config = DiscretisationConfig {
            min_slices: slices,
            max_slices: slices,
            max_timestep: 0.1,
            stem_slices: stem,
        };
        let disc = Discretisation::new(host, &config).unwrap();
        let guest = newick::parse(guest).unwrap().tree;
        let mut leaf_map = GuestHostMap::new();
        for (g, h) in map {
            leaf_map.insert(g, h).unwrap();
        }
        let mpr = MprMap::new(&guest, disc.tree(), &leaf_map).unwrap();
        Fixture { guest, disc, mpr }
    }

    #[test]
    fn speciation_root_may_use_every_point_below_tip() {
        let f = fixture("(A:1.0,B:1.0):0.0;", "(a:0.1,b:0.1):0.2;", &[("a", "A"), ("b", "B")], 4, Some(2));
        let idx = PlacementIndex::new(&f.guest, &f.disc, &f.mpr, None).unwrap();
        let root = f.guest.root();
        let host_root = f.disc.tree().root();
        assert_eq!(idx.lower_limit(root), Point::new(host_root, 0));
        // (root,0..=4), the tip excluded.
        assert_eq!(idx.placement_count(root), 5);
        assert_eq!(idx.upper_limit(root), Point::new(host_root, 4));
        let leaves = f.guest.leaves();
        for l in leaves {
            assert_eq!(idx.placement_count(l), 1);
            assert_eq!(idx.lower_limit(l).index, 0);
        }
    }

    #[test]
    fn duplication_lower_limit_is_above_children() {
        let f = fixture(
            "((A:1.0,B:1.0):1.0,C:2.0):0.5;",
            "((a1,a2),(b,c));",
            &[("a1", "A"), ("a2", "A"), ("b", "B"), ("c", "C")],
            3,
            None,
        );
        let idx = PlacementIndex::new(&f.guest, &f.disc, &f.mpr, None).unwrap();
        let gl = f.guest.leaf_names();
        let hl = f.disc.tree().leaf_names();
        let a12 = f.guest.parent(gl["a1"]).unwrap();
        let bc = f.guest.parent(gl["b"]).unwrap();
        assert_eq!(idx.lower_limit(a12), Point::new(hl["A"], 1));
        // σ(bc) is the host root; it is reachable above both children.
        assert_eq!(idx.lower_limit(bc), Point::new(f.disc.tree().root(), 0));
        // The guest root must lie strictly above bc's lowest point.
        assert_eq!(idx.lower_limit(f.guest.root()), Point::new(f.disc.tree().root(), 1));
    }

    #[test]
    fn lower_limit_spills_onto_parent_arc() {
        // Nested duplications on a 2-slice leaf arc run out of room.
        let f = fixture(
            "(A:1.0,B:1.0):1.0;",
            "(((a1,a2),a3),a4);",
            &[("a1", "A"), ("a2", "A"), ("a3", "A"), ("a4", "A")],
            2,
            None,
        );
        let idx = PlacementIndex::new(&f.guest, &f.disc, &f.mpr, None).unwrap();
        let gl = f.guest.leaf_names();
        let a12 = f.guest.parent(gl["a1"]).unwrap();
        let a123 = f.guest.parent(a12).unwrap();
        let host_root = f.disc.tree().root();
        assert_eq!(idx.lower_limit(a12).index, 1);
        assert_eq!(idx.lower_limit(a123).index, 2);
        // Above a123 the A arc is exhausted; the guest root moves to the stem.
        assert_eq!(idx.lower_limit(f.guest.root()), Point::new(host_root, 1));
        assert_eq!(idx.placement_count(f.guest.root()), 2);
    }

    #[test]
    fn counts_match_points_to_top() {
        let f = fixture(
            "((A:1.0,B:1.0):1.0,C:2.0):0.5;",
            "(((a1,a2),b),(c1,c2));",
            &[("a1", "A"), ("a2", "A"), ("b", "B"), ("c1", "C"), ("c2", "C")],
            4,
            Some(3),
        );
        let idx = PlacementIndex::new(&f.guest, &f.disc, &f.mpr, None).unwrap();
        for u in 0..f.guest.vertex_count() {
            if f.guest.is_leaf(u) {
                continue;
            }
            let depth = f.guest.depth(u);
            assert_eq!(
                idx.placement_count(u) + depth,
                f.disc.points_to_top(idx.lower_limit(u)),
                "vertex {}",
                u
            );
            let pts: Vec<Point> = idx.placements(u, &f.disc).collect();
            assert_eq!(pts.len(), idx.placement_count(u));
            assert_eq!(*pts.last().unwrap(), idx.upper_limit(u));
        }
    }

    #[test]
    fn too_coarse_for_nesting_fails() {
        // Four nested duplications above A with a 2-slice grid and a
        // 2-slice stem leave the root nowhere to go.
        let f = fixture(
            "(A:1.0,B:1.0):1.0;",
            "(((((a1,a2),a3),a4),a5),b);",
            &[("a1", "A"), ("a2", "A"), ("a3", "A"), ("a4", "A"), ("a5", "A"), ("b", "B")],
            2,
            None,
        );
        let err = PlacementIndex::new(&f.guest, &f.disc, &f.mpr, None).unwrap_err();
        assert!(matches!(err, DlrsError::InsufficientDiscretisation(_)));
    }

    #[test]
    fn loss_cap_limits_placements() {
        let f = fixture(
            "((A:1.0,B:1.0):1.0,C:2.0):0.5;",
            "(a1,a2);",
            &[("a1", "A"), ("a2", "A")],
            3,
            None,
        );
        let uncapped = PlacementIndex::new(&f.guest, &f.disc, &f.mpr, None).unwrap();
        let capped = PlacementIndex::new(&f.guest, &f.disc, &f.mpr, Some(0)).unwrap();
        let root = f.guest.root();
        // (A,1..=3) and 3 points on each of two arcs above.
        assert_eq!(uncapped.placement_count(root), 9);
        assert_eq!(capped.placement_count(root), 3);
        let one = PlacementIndex::new(&f.guest, &f.disc, &f.mpr, Some(1)).unwrap();
        assert_eq!(one.placement_count(root), 6);
    }
}
