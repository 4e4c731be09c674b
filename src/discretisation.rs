//! Slicing of the host arcs into ordered time points.
//!
//! Every arc above host vertex `x` carries points `0..=k+1`: point 0 is `x`
//! itself (a speciation, or the leaf), points `1..=k` are slice midpoints and
//! point `k+1` is the arc's upper end, which coincides with point 0 of the
//! parent arc. For the stem arc above the root it is the tip of the host tree.

use std::fmt;

use crate::config::DiscretisationConfig;
use crate::error::{DlrsError, Result};
use crate::host::HostTree;
use crate::tree::{RBTree, VertexId};

/// Stems shorter than this fall back to the general slicing rule.
const MIN_STEM_TIME: f64 = 1e-8;

/// A discretisation point: host arc plus index along it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub arc: VertexId,
    pub index: usize,
}

impl Point {
    pub const fn new(arc: VertexId, index: usize) -> Self {
        Self { arc, index }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.arc, self.index)
    }
}

/// A dated host tree with every arc sliced.
#[derive(Debug, Clone, PartialEq)]
pub struct Discretisation {
    host: HostTree,
    config: DiscretisationConfig,
    slices: Vec<usize>,
    /// Absolute times of points `0..=k+1` per arc.
    times: Vec<Vec<f64>>,
}

/// Slice count for an arc of span `t`.
fn slice_count(t: f64, config: &DiscretisationConfig) -> usize {
    if config.min_slices == config.max_slices {
        return config.min_slices;
    }
    let wanted = (t / config.max_timestep).ceil();
    // Saturating conversion; `wanted` is non-negative.
    let wanted = if wanted.is_finite() { wanted as usize } else { usize::MAX };
    wanted.max(config.min_slices).min(config.max_slices)
}

impl Discretisation {
    pub fn new(host: HostTree, config: &DiscretisationConfig) -> Result<Self> {
        if config.min_slices < 2 {
            return Err(DlrsError::InvalidInput(format!(
                "at least 2 slices per arc are required, got {}",
                config.min_slices
            )));
        }
        if config.max_slices < config.min_slices {
            return Err(DlrsError::InvalidInput(format!(
                "max slices {} below min slices {}",
                config.max_slices, config.min_slices
            )));
        }
        if config.min_slices != config.max_slices && !(config.max_timestep > 0.0) {
            return Err(DlrsError::InvalidInput(format!(
                "invalid discretisation timestep {}",
                config.max_timestep
            )));
        }

        let n = host.tree().vertex_count();
        let root = host.tree().root();
        let mut slices = Vec::with_capacity(n);
        let mut times = Vec::with_capacity(n);
        for x in 0..n {
            let arc_time = host.arc_time(x);
            let k = match config.stem_slices {
                Some(ks) if x == root && ks > 0 && arc_time > MIN_STEM_TIME => ks,
                _ => slice_count(arc_time, config),
            };
            let vt = host.vertex_time(x);
            let dt = arc_time / k as f64;
            let mut pts = Vec::with_capacity(k + 2);
            pts.push(vt);
            pts.extend((1..=k).map(|i| vt + dt * (i as f64 - 0.5)));
            pts.push(vt + arc_time);
            slices.push(k);
            times.push(pts);
        }

        Ok(Self {
            host,
            config: config.clone(),
            slices,
            times,
        })
    }

    /// Rebuilds the points after the host times changed.
    pub fn with_host(&self, host: HostTree) -> Result<Self> {
        Self::new(host, &self.config)
    }

    pub fn host(&self) -> &HostTree {
        &self.host
    }

    pub fn tree(&self) -> &RBTree {
        self.host.tree()
    }

    pub fn config(&self) -> &DiscretisationConfig {
        &self.config
    }

    /// Number of slices `k` on the arc above `x`.
    pub fn slice_count(&self, x: VertexId) -> usize {
        self.slices[x]
    }

    /// Number of points `k + 2` on the arc above `x`.
    pub fn point_count(&self, x: VertexId) -> usize {
        self.slices[x] + 2
    }

    pub fn time(&self, p: Point) -> f64 {
        self.times[p.arc][p.index]
    }

    pub fn arc_times(&self, x: VertexId) -> &[f64] {
        &self.times[x]
    }

    /// Length of one slice on the arc above `x`.
    pub fn slice_time(&self, x: VertexId) -> f64 {
        self.host.arc_time(x) / self.slices[x] as f64
    }

    /// Slices on the arc above `x` and on every arc above it.
    pub fn slices_to_top(&self, x: VertexId) -> usize {
        self.slices[x]
            + self
                .tree()
                .ancestors(x)
                .map(|a| self.slices[a])
                .sum::<usize>()
    }

    /// Points from `p` inclusive up to the tip, exclusive.
    pub fn points_to_top(&self, p: Point) -> usize {
        let x = p.arc;
        (self.slices[x] + 1).saturating_sub(p.index)
            + self
                .tree()
                .ancestors(x)
                .map(|a| self.slices[a])
                .sum::<usize>()
    }

    /// Largest number of slices between a leaf and the tip.
    pub fn max_slice_height(&self) -> usize {
        self.tree()
            .leaves()
            .into_iter()
            .map(|l| self.slices_to_top(l))
            .max()
            .unwrap_or(0)
    }

    /// The top of the stem arc.
    pub fn tip(&self) -> Point {
        let root = self.tree().root();
        Point::new(root, self.slices[root] + 1)
    }

    /// The next point towards the root. An arc's last midpoint is followed
    /// by the first midpoint of the parent arc; past the root's last midpoint
    /// comes the tip.
    pub fn next_point(&self, p: Point) -> Point {
        if p.index < self.slices[p.arc] {
            return Point::new(p.arc, p.index + 1);
        }
        match self.tree().parent(p.arc) {
            Some(parent) => Point::new(parent, 1),
            None => self.tip(),
        }
    }
}

impl fmt::Display for Discretisation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Host tree discretisation")?;
        writeln!(f, "Arc\tName\tSlices\tArc time\tSlice time\tPoint times")?;
        for x in self.tree().topological_order() {
            let pts: Vec<String> = self.times[x].iter().map(|t| format!("{:.6}", t)).collect();
            writeln!(
                f,
                "{}\t{}\t{}\t{:.6}\t{:.6}\t{}",
                x,
                self.tree().name(x).unwrap_or(""),
                self.slices[x],
                self.host.arc_time(x),
                self.slice_time(x),
                pts.join(",")
            )?;
        }
        write!(f, "Max slices leaf to tip: {}", self.max_slice_height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::newick;

    fn host(text: &str) -> HostTree {
        HostTree::from_newick(&newick::parse(text).unwrap()).unwrap()
    }

    fn config(min: usize, max: usize, step: f64, stem: Option<usize>) -> DiscretisationConfig {
        DiscretisationConfig {
            min_slices: min,
            max_slices: max,
            max_timestep: step,
            stem_slices: stem,
        }
    }

    #[test]
    fn slice_counts_follow_timestep_within_bounds() {
        let d = Discretisation::new(host("((A:0.1,B:0.1):0.9,C:1.0):0.5;"), &config(3, 10, 0.2, None)).unwrap();
        let names = d.tree().leaf_names();
        // 0.1 / 0.2 rounds up to 1, raised to the minimum.
        assert_eq!(d.slice_count(names["A"]), 3);
        // 1.0 / 0.2 = 5.
        assert_eq!(d.slice_count(names["C"]), 5);
        // 0.9 / 0.2 rounds up to 5.
        let ab = d.tree().parent(names["A"]).unwrap();
        assert_eq!(d.slice_count(ab), 5);
        assert_eq!(d.slice_count(d.tree().root()), 3);

        let capped = Discretisation::new(host("(A:10.0,B:10.0);"), &config(3, 10, 0.2, None)).unwrap();
        assert_eq!(capped.slice_count(capped.tree().root()), 3);
        assert_eq!(capped.slice_count(capped.tree().leaf_names()["A"]), 10);
    }

    #[test]
    fn point_times_are_midpoints() {
        let d = Discretisation::new(host("(A:1.0,B:1.0):0.0;"), &config(4, 4, 0.1, Some(2))).unwrap();
        let a = d.tree().leaf_names()["A"];
        let times = d.arc_times(a);
        let expected = [0.0, 0.125, 0.375, 0.625, 0.875, 1.0];
        assert_eq!(times.len(), expected.len());
        for (t, e) in times.iter().zip(expected) {
            assert!((t - e).abs() < 1e-12);
        }
        // Zero stem ignores the explicit stem count.
        let root = d.tree().root();
        assert_eq!(d.slice_count(root), 4);
        assert_eq!(d.time(d.tip()), 1.0);
        assert_eq!(d.slice_time(root), 0.0);
    }

    #[test]
    fn explicit_stem_slices() {
        let d = Discretisation::new(host("(A:1.0,B:1.0):0.5;"), &config(4, 4, 0.1, Some(2))).unwrap();
        let root = d.tree().root();
        assert_eq!(d.slice_count(root), 2);
        assert!((d.time(Point::new(root, 1)) - 1.125).abs() < 1e-12);
        assert!((d.time(d.tip()) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn walking_and_counting_points() {
        let d = Discretisation::new(host("(A:1.0,B:1.0):0.5;"), &config(3, 3, 0.1, None)).unwrap();
        let a = d.tree().leaf_names()["A"];
        let root = d.tree().root();
        assert_eq!(d.next_point(Point::new(a, 1)), Point::new(a, 2));
        assert_eq!(d.next_point(Point::new(a, 3)), Point::new(root, 1));
        assert_eq!(d.next_point(Point::new(root, 3)), d.tip());
        assert_eq!(d.slices_to_top(a), 6);
        assert_eq!(d.max_slice_height(), 6);
        // (A,0..=3) and (root,1..=3).
        assert_eq!(d.points_to_top(Point::new(a, 0)), 7);

        let mut p = Point::new(a, 0);
        let mut steps = 0;
        while p != d.tip() {
            p = d.next_point(p);
            steps += 1;
        }
        assert_eq!(steps, 7);
    }

    #[test]
    fn rejects_invalid_bounds() {
        assert!(Discretisation::new(host("(A:1.0,B:1.0);"), &config(1, 3, 0.1, None)).is_err());
        assert!(Discretisation::new(host("(A:1.0,B:1.0);"), &config(4, 3, 0.1, None)).is_err());
        assert!(Discretisation::new(host("(A:1.0,B:1.0);"), &config(2, 3, 0.0, None)).is_err());
        assert!(Discretisation::new(host("(A:1.0,B:1.0);"), &config(3, 3, 0.0, None)).is_ok());
    }

    #[test]
    fn summary_lists_every_arc() {
        let d = Discretisation::new(host("(A:1.0,B:1.0):0.5;"), &config(3, 3, 0.1, None)).unwrap();
        let text = d.to_string();
        assert_eq!(text.lines().count(), 2 + 3 + 1);
        assert!(text.contains("Max slices leaf to tip: 6"));
    }
}
