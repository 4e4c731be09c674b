//! The reconciliation DP: probability density of the guest tree summed over
//! every placement of its vertices on the discretised host tree.
//!
//! For a guest vertex `u`, `ats[u][i]` is the density of the subtree rooted
//! at `u` given `u` sits at its i-th valid placement, and `belows[u][j]` is
//! the density of the planted subtree above `u` given the tip of `u`'s arc
//! (its parent) sits at the parent's j-th valid placement. For the root,
//! `belows` has a single entry: the tip of the host tree.

use std::io::Write;

use csv::{QuoteStyle, WriterBuilder};
use tracing::{debug, trace};

use crate::change::{ChangeSet, Parent};
use crate::checkpoint::{Checkpointed, CheckpointedArray};
use crate::discretisation::{Discretisation, Point};
use crate::dup_loss::DupLossProbs;
use crate::error::Result;
use crate::mpr::MprMap;
use crate::placement::PlacementIndex;
use crate::prob::LogDouble;
use crate::rates::RateDistribution;
use crate::tree::{RBTree, VertexId};

/// Everything the DP reads. All parts must describe the same state.
#[derive(Debug, Clone, Copy)]
pub struct DpInputs<'a> {
    pub guest: &'a RBTree,
    pub lengths: &'a [f64],
    pub disc: &'a Discretisation,
    pub dup_loss: &'a DupLossProbs,
    pub mpr: &'a MprMap,
    pub placements: &'a PlacementIndex,
    pub rates: &'a RateDistribution,
    /// Whether the root's length is scored against the stem arc.
    pub stem_rate: bool,
}

impl DpInputs<'_> {
    /// Relaxed-clock density of `u`'s branch spanning `elapsed` time.
    pub fn rate_density(&self, u: VertexId, elapsed: f64) -> f64 {
        if self.guest.is_root(u) && (!self.stem_rate || elapsed <= 0.0) {
            return 1.0;
        }
        if !(elapsed > 0.0) {
            return 0.0;
        }
        self.rates.pdf(self.lengths[u] / elapsed)
    }

    /// Placements available to `u`'s parent, or just the tip for the root.
    pub fn parent_placements(&self, u: VertexId) -> Vec<Point> {
        match self.guest.parent(u) {
            Some(p) => self.placements.placements(p, self.disc).collect(),
            None => vec![self.disc.tip()],
        }
    }
}

/// How much of the DP a proposal forces to be recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Nothing,
    /// Only these vertices, children before parents.
    Partial(Vec<VertexId>),
    Full,
}

impl Update {
    /// Decides the update for a set of changed inputs.
    pub fn classify(changes: &ChangeSet, guest: &RBTree) -> Self {
        if changes.is_empty() {
            return Update::Nothing;
        }
        let only_lengths = changes.parents().all(|p| p == Parent::BranchLengths);
        match changes.get(Parent::BranchLengths) {
            Some(Some(affected)) if only_lengths => {
                Update::Partial(guest.spanning_root_subtree(affected))
            }
            _ => Update::Full,
        }
    }
}

/// An in-flight proposal on the DP tables. Must be handed back to
/// [`ReconciliationDp::commit`] or [`ReconciliationDp::rollback`].
#[must_use = "a trial must be committed or rolled back"]
#[derive(Debug)]
pub struct Trial {
    update: Update,
}

impl Trial {
    pub fn update(&self) -> &Update {
        &self.update
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationDp {
    root: Checkpointed<VertexId>,
    ats: CheckpointedArray<Vec<f64>>,
    belows: CheckpointedArray<Vec<f64>>,
}

impl ReconciliationDp {
    pub fn new(inputs: &DpInputs<'_>) -> Self {
        let mut dp = Self {
            root: Checkpointed::new(inputs.guest.root()),
            ats: CheckpointedArray::new(Vec::new()),
            belows: CheckpointedArray::new(Vec::new()),
        };
        dp.full_update(inputs);
        dp
    }

    /// Recomputes every table from scratch.
    pub fn full_update(&mut self, inputs: &DpInputs<'_>) {
        let n = inputs.guest.vertex_count();
        self.root.set(inputs.guest.root());
        self.ats.reset(vec![Vec::new(); n]);
        self.belows.reset(vec![Vec::new(); n]);
        for u in inputs.guest.post_order() {
            self.update_at(inputs, u);
        }
        debug!(density = %self.data_probability(), "full DP update");
    }

    /// Recomputes only `affected`, which must be closed under taking
    /// parents and ordered children first.
    pub fn partial_update(&mut self, inputs: &DpInputs<'_>, affected: &[VertexId]) {
        for &u in affected {
            self.update_at(inputs, u);
        }
        trace!(vertices = affected.len(), "partial DP update");
    }

    /// Caches what `changes` may touch and brings the tables up to date
    /// with `inputs`, which must already reflect the change.
    pub fn begin_trial(&mut self, inputs: &DpInputs<'_>, changes: &ChangeSet) -> Trial {
        let update = Update::classify(changes, inputs.guest);
        match &update {
            Update::Nothing => {}
            Update::Partial(affected) => {
                self.ats.cache(Some(affected));
                self.belows.cache(Some(affected));
                self.partial_update(inputs, affected);
            }
            Update::Full => {
                self.root.cache();
                self.ats.cache(None);
                self.belows.cache(None);
                self.full_update(inputs);
            }
        }
        Trial { update }
    }

    /// Keeps the trial's values.
    pub fn commit(&mut self, trial: Trial) {
        if trial.update == Update::Full {
            self.root.clear_cache();
        }
        if trial.update != Update::Nothing {
            self.ats.clear_cache();
            self.belows.clear_cache();
        }
    }

    /// Restores the tables to their state before the trial.
    pub fn rollback(&mut self, trial: Trial) {
        if trial.update == Update::Full {
            self.root.restore_cache();
        }
        if trial.update != Update::Nothing {
            self.ats.restore_cache();
            self.belows.restore_cache();
        }
    }

    /// The density of the guest tree given every input.
    pub fn data_probability(&self) -> LogDouble {
        let root_belows = self.belows.get(*self.root.get());
        LogDouble::from_value(root_belows.first().copied().unwrap_or(0.0))
    }

    pub fn ats(&self, u: VertexId) -> &[f64] {
        self.ats.get(u)
    }

    pub fn belows(&self, u: VertexId) -> &[f64] {
        self.belows.get(u)
    }

    /// Writes one tab-separated row per guest vertex with its lower limit,
    /// placement count, type and DP tables.
    pub fn write_table<W: Write>(&self, inputs: &DpInputs<'_>, writer: W) -> Result<()> {
        let mut wtr = WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(QuoteStyle::Never)
            .from_writer(writer);
        wtr.write_record([
            "Guest tree vertex",
            "Lower limit",
            "No of placements",
            "Type",
            "DP ats",
            "DP belows",
        ])?;
        for u in 0..inputs.guest.vertex_count() {
            let lo = inputs.placements.lower_limit(u);
            let kind = if inputs.guest.is_leaf(u) {
                "Leaf"
            } else if inputs.mpr.is_duplication(u) {
                "Duplication"
            } else {
                "Speciation/duplication"
            };
            wtr.write_record([
                u.to_string(),
                format!("{}_{}", lo.arc, lo.index),
                self.ats(u).len().to_string(),
                kind.to_string(),
                format_probs(self.ats(u)),
                format_probs(self.belows(u)),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn update_at(&mut self, inputs: &DpInputs<'_>, u: VertexId) {
        let placements: Vec<Point> = inputs.placements.placements(u, inputs.disc).collect();
        let mut ats = vec![0.0; placements.len()];
        match inputs.guest.children(u) {
            None => ats[0] = 1.0,
            Some((lc, rc)) => {
                let (lcb, rcb) = (self.belows.get(lc), self.belows.get(rc));
                let two_lambda = 2.0 * inputs.dup_loss.duplication_rate();
                for (i, p) in placements.iter().enumerate() {
                    let event = if p.index == 0 {
                        1.0
                    } else {
                        two_lambda * inputs.disc.slice_time(p.arc)
                    };
                    ats[i] = lcb[i] * rcb[i] * event;
                }
            }
        }

        let belows: Vec<f64> = inputs
            .parent_placements(u)
            .into_iter()
            .map(|x| {
                let xt = inputs.disc.time(x);
                placements
                    .iter()
                    .zip(&ats)
                    .take_while(|(y, _)| !(y.arc == x.arc && y.index >= x.index))
                    .map(|(&y, &at)| {
                        let dens = inputs.rate_density(u, xt - inputs.disc.time(y));
                        dens * inputs.dup_loss.p11(x, y) * at
                    })
                    .sum::<f64>()
            })
            .collect();

        self.ats.set(u, ats);
        self.belows.set(u, belows);
    }
}

fn format_probs(values: &[f64]) -> String {
    let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", items.join(", "))
}
