//! Birth-death duplication-loss probabilities over the discretised host tree.
//!
//! For every host arc this holds the probability that a lineage starting at
//! the arc's tip goes extinct in the planted subtree below, and "p11", the
//! probability that a single lineage at an ancestral point leaves exactly
//! one descendant at a lower point with all other copies lost.
//!
//! There is no partial update: any change to the rates or the host times
//! recomputes everything.

use std::collections::HashMap;
use std::fmt;

use ndarray::Array2;
use tracing::debug;

use crate::checkpoint::Checkpointed;
use crate::discretisation::{Discretisation, Point};
use crate::error::{DlrsError, Result};
use crate::tree::VertexId;

/// Rates closer than this are treated as equal.
const RATE_EQUALITY_EPS: f64 = 1e-9;

/// `(P(t), u(t))` of a linear birth-death process with birth rate `lambda`
/// and death rate `mu`: `P` is the probability that a single lineage has
/// survivors after `t`, and `u` governs the geometric number of survivors.
pub fn survival_and_growth(lambda: f64, mu: f64, t: f64) -> (f64, f64) {
    if (lambda - mu).abs() < RATE_EQUALITY_EPS {
        let denom = 1.0 + mu * t;
        (1.0 / denom, mu * t / denom)
    } else if mu < RATE_EQUALITY_EPS {
        (1.0, 1.0 - (-lambda * t).exp())
    } else {
        let e = ((mu - lambda) * t).exp();
        let denom = lambda - mu * e;
        ((lambda - mu) / denom, lambda * (1.0 - e) / denom)
    }
}

/// One segment of length `t`, given `(P, u)` for `t`: maps the running p11
/// and the probability `d` of extinction below to their values at the
/// segment's upper end.
fn step(p11: f64, d: f64, (p, u): (f64, f64)) -> (f64, f64) {
    let denom = 1.0 - u * d;
    (p11 * p * (1.0 - u) / (denom * denom), 1.0 - p * (1.0 - d) / denom)
}

#[derive(Debug, Clone, PartialEq)]
struct Tables {
    lambda: f64,
    mu: f64,
    extinction: Vec<f64>,
    /// Within-arc p11, indexed `[upper][lower]`.
    arc_p11: Vec<Array2<f64>>,
    /// p11 from points on ancestral arc x to points on descendant arc y,
    /// keyed `(x, y)` and indexed `[x point][y point]`.
    path_p11: HashMap<(VertexId, VertexId), Array2<f64>>,
}

/// Extinction and p11 tables for a fixed pair of rates.
#[derive(Debug, Clone, PartialEq)]
pub struct DupLossProbs {
    tables: Checkpointed<Tables>,
}

impl DupLossProbs {
    pub fn new(disc: &Discretisation, lambda: f64, mu: f64) -> Result<Self> {
        Ok(Self {
            tables: Checkpointed::new(compute(disc, lambda, mu)?),
        })
    }

    /// Full recompute for new rates or new host times.
    pub fn update(&mut self, disc: &Discretisation, lambda: f64, mu: f64) -> Result<()> {
        self.tables.set(compute(disc, lambda, mu)?);
        Ok(())
    }

    pub fn cache(&mut self) {
        self.tables.cache();
    }

    pub fn clear_cache(&mut self) {
        self.tables.clear_cache();
    }

    pub fn restore_cache(&mut self) {
        self.tables.restore_cache();
    }

    pub fn duplication_rate(&self) -> f64 {
        self.tables.get().lambda
    }

    pub fn loss_rate(&self) -> f64 {
        self.tables.get().mu
    }

    /// Probability that a lineage at the tip of arc `x` leaves no
    /// descendants in the planted subtree below.
    pub fn extinction(&self, x: VertexId) -> f64 {
        self.tables.get().extinction[x]
    }

    pub fn arc_p11(&self, x: VertexId) -> &Array2<f64> {
        &self.tables.get().arc_p11[x]
    }

    /// p11 from ancestral point `x` to descendant point `y`; zero if `y`
    /// does not lie below `x`.
    pub fn p11(&self, x: Point, y: Point) -> f64 {
        let tables = self.tables.get();
        if x.arc == y.arc {
            if x.index < y.index {
                return 0.0;
            }
            return tables.arc_p11[x.arc][[x.index, y.index]];
        }
        tables
            .path_p11
            .get(&(x.arc, y.arc))
            .map_or(0.0, |m| m[[x.index, y.index]])
    }
}

fn compute(disc: &Discretisation, lambda: f64, mu: f64) -> Result<Tables> {
    for (what, rate) in [("duplication", lambda), ("loss", mu)] {
        if !rate.is_finite() || rate < 0.0 {
            return Err(DlrsError::InvalidInput(format!("invalid {} rate {}", what, rate)));
        }
    }
    let tree = disc.tree();
    let n = tree.vertex_count();
    let mut extinction = vec![0.0; n];
    let mut arc_p11: Vec<Array2<f64>> = vec![Array2::zeros((0, 0)); n];

    for x in tree.post_order() {
        let mut d = match tree.children(x) {
            Some((l, r)) => extinction[l] * extinction[r],
            None => 0.0,
        };
        let dt = disc.slice_time(x);
        let half = survival_and_growth(lambda, mu, dt / 2.0);
        let full = survival_and_growth(lambda, mu, dt);

        let sz = disc.point_count(x);
        let mut to_bottom = vec![1.0; sz];
        let mut p11 = 1.0;
        for (i, slot) in to_bottom.iter_mut().enumerate().skip(1) {
            let pu = if i == 1 || i == sz - 1 { half } else { full };
            (p11, d) = step(p11, d, pu);
            *slot = p11;
        }
        extinction[x] = d;

        let mut m = Array2::<f64>::zeros((sz, sz));
        for i in 0..sz {
            m[[i, i]] = 1.0;
            for j in 0..i {
                m[[i, j]] = to_bottom[i] / to_bottom[j];
            }
        }
        arc_p11[x] = m;
    }

    let mut path_p11 = HashMap::new();
    for y in tree.post_order() {
        let (Some(mut x), Some(sib)) = (tree.parent(y), tree.sibling(y)) else {
            continue;
        };
        let yp11 = &arc_p11[y];
        let y_top = yp11.nrows() - 1;
        let mut intermediate = 1.0;
        let mut loss = extinction[sib];
        loop {
            let xp11 = &arc_p11[x];
            let x_sz = xp11.nrows();
            let mut xy = Array2::<f64>::zeros((x_sz, yp11.ncols()));
            for j in 0..yp11.ncols() {
                xy[[0, j]] = intermediate * yp11[[y_top, j]];
            }
            // Points above the speciation need the other clade to die out.
            intermediate *= loss;
            for i in 1..x_sz {
                let to_spec = xp11[[i, 0]];
                for j in 0..yp11.ncols() {
                    xy[[i, j]] = to_spec * intermediate * yp11[[y_top, j]];
                }
            }
            path_p11.insert((x, y), xy);

            match (tree.parent(x), tree.sibling(x)) {
                (Some(px), Some(sx)) => {
                    intermediate *= xp11[[x_sz - 1, 0]];
                    loss = extinction[sx];
                    x = px;
                }
                _ => break,
            }
        }
    }
    debug!(lambda, mu, pairs = path_p11.len(), "computed duplication-loss probabilities");

    Ok(Tables {
        lambda,
        mu,
        extinction,
        arc_p11,
        path_p11,
    })
}

impl fmt::Display for DupLossProbs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.tables.get();
        writeln!(f, "# Duplication-loss probabilities")?;
        writeln!(f, "Duplication rate: {}\tLoss rate: {}", t.lambda, t.mu)?;
        write!(f, "Arc\tExtinction\tp11 tip to bottom")?;
        for x in 0..t.extinction.len() {
            let m = &t.arc_p11[x];
            write!(f, "\n{}\t{:.6}\t{:.6}", x, t.extinction[x], m[[m.nrows() - 1, 0]])?;
        }
        Ok(())
    }
}
