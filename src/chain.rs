//! Owned model state for an MCMC driver.
//!
//! A [`ChainState`] holds the host and guest trees, every derived table and
//! the DP. A [`Perturbation`] is applied as a transaction: each component it
//! may touch is cached first, derived components are rebuilt in dependency
//! order (discretisation, duplication-loss tables, σ map, placements, DP),
//! and the returned [`Proposal`] is then committed or rolled back.

use std::io::Write;

use tracing::{debug, trace};

use crate::change::{ChangeSet, Parent};
use crate::checkpoint::{Checkpointed, CheckpointedArray};
use crate::config::DlrsConfig;
use crate::discretisation::Discretisation;
use crate::dup_loss::DupLossProbs;
use crate::error::{DlrsError, Result};
use crate::host::HostTree;
use crate::mpr::{GuestHostMap, MprMap};
use crate::newick::NewickTree;
use crate::placement::PlacementIndex;
use crate::prob::LogDouble;
use crate::rates::RateDistribution;
use crate::realisation::RealisationSampler;
use crate::reconciliation::{DpInputs, ReconciliationDp, Trial, Update};
use crate::tree::{RBTree, VertexId};

/// A proposed change to the chain's inputs.
#[derive(Debug, Clone)]
pub enum Perturbation {
    /// New lengths for some guest branches, as `(vertex, length)`.
    BranchLengths(Vec<(VertexId, f64)>),
    /// New lengths for every guest branch.
    AllBranchLengths(Vec<f64>),
    DupLossRates { lambda: f64, mu: f64 },
    RateDistribution(RateDistribution),
    /// New absolute host vertex times and stem time, same topology.
    HostTimes { times: Vec<f64>, stem_time: f64 },
    /// A new guest topology with its branch lengths.
    GuestTree { tree: RBTree, lengths: Vec<f64> },
}

impl Perturbation {
    fn describe(&self) -> &'static str {
        match self {
            Self::BranchLengths(_) => "branch lengths",
            Self::AllBranchLengths(_) => "all branch lengths",
            Self::DupLossRates { .. } => "duplication-loss rates",
            Self::RateDistribution(_) => "rate distribution",
            Self::HostTimes { .. } => "host times",
            Self::GuestTree { .. } => "guest tree",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component {
    Discretisation,
    DupLoss,
    Guest,
    Lengths,
    Mpr,
    Placements,
    Rates,
}

/// An applied, undecided perturbation. Hand it to [`ChainState::commit`]
/// or [`ChainState::rollback`].
#[must_use = "a proposal must be committed or rolled back"]
#[derive(Debug)]
pub struct Proposal {
    changes: ChangeSet,
    touched: Vec<Component>,
    trial: Trial,
}

impl Proposal {
    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    pub fn update(&self) -> &Update {
        self.trial.update()
    }
}

/// Guest branch lengths from a parsed tree. A missing root length counts as
/// zero; any other missing length is an error.
pub fn guest_lengths(nw: &NewickTree) -> Result<Vec<f64>> {
    nw.lengths
        .iter()
        .enumerate()
        .map(|(v, len)| match len {
            Some(l) => Ok(*l),
            None if nw.tree.is_root(v) => Ok(0.0),
            None => Err(DlrsError::InvalidInput(format!(
                "guest branch above vertex {} lacks a length",
                nw.tree.name(v).map_or_else(|| v.to_string(), str::to_string)
            ))),
        })
        .collect()
}

fn check_lengths(lengths: &[f64]) -> Result<()> {
    match lengths.iter().position(|l| !l.is_finite() || *l < 0.0) {
        Some(v) => Err(DlrsError::InvalidInput(format!(
            "invalid branch length {} above guest vertex {}",
            lengths[v], v
        ))),
        None => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct ChainState {
    config: DlrsConfig,
    leaf_map: GuestHostMap,
    disc: Checkpointed<Discretisation>,
    dup_loss: DupLossProbs,
    guest: Checkpointed<RBTree>,
    lengths: CheckpointedArray<f64>,
    mpr: Checkpointed<MprMap>,
    placements: Checkpointed<PlacementIndex>,
    rates: Checkpointed<RateDistribution>,
    dp: ReconciliationDp,
}

impl ChainState {
    pub fn new(
        config: DlrsConfig,
        host: HostTree,
        guest: RBTree,
        lengths: Vec<f64>,
        leaf_map: GuestHostMap,
    ) -> Result<Self> {
        config.validate()?;
        if lengths.len() != guest.vertex_count() {
            return Err(DlrsError::InvalidInput(format!(
                "{} branch lengths given for {} guest vertices",
                lengths.len(),
                guest.vertex_count()
            )));
        }
        check_lengths(&lengths)?;

        let disc = Discretisation::new(host, &config.discretisation)?;
        let dup_loss = DupLossProbs::new(&disc, config.duplication_rate, config.loss_rate)?;
        let mpr = MprMap::new(&guest, disc.tree(), &leaf_map)?;
        let placements = PlacementIndex::new(&guest, &disc, &mpr, config.max_implied_losses)?;
        let rates = RateDistribution::from_config(&config.rate_distribution)?;
        let dp = ReconciliationDp::new(&DpInputs {
            guest: &guest,
            lengths: &lengths,
            disc: &disc,
            dup_loss: &dup_loss,
            mpr: &mpr,
            placements: &placements,
            rates: &rates,
            stem_rate: config.stem_rate,
        });

        Ok(Self {
            config,
            leaf_map,
            disc: Checkpointed::new(disc),
            dup_loss,
            guest: Checkpointed::new(guest),
            lengths: CheckpointedArray::new(lengths),
            mpr: Checkpointed::new(mpr),
            placements: Checkpointed::new(placements),
            rates: Checkpointed::new(rates),
            dp,
        })
    }

    /// Builds a state from a parsed guest tree; see [`guest_lengths`].
    pub fn from_newick(
        config: DlrsConfig,
        host: HostTree,
        guest: &NewickTree,
        leaf_map: GuestHostMap,
    ) -> Result<Self> {
        let lengths = guest_lengths(guest)?;
        Self::new(config, host, guest.tree.clone(), lengths, leaf_map)
    }

    pub fn config(&self) -> &DlrsConfig {
        &self.config
    }

    pub fn discretisation(&self) -> &Discretisation {
        self.disc.get()
    }

    pub fn dup_loss(&self) -> &DupLossProbs {
        &self.dup_loss
    }

    pub fn guest(&self) -> &RBTree {
        self.guest.get()
    }

    pub fn lengths(&self) -> &[f64] {
        self.lengths.values()
    }

    pub fn mpr(&self) -> &MprMap {
        self.mpr.get()
    }

    pub fn placements(&self) -> &PlacementIndex {
        self.placements.get()
    }

    pub fn inputs(&self) -> DpInputs<'_> {
        DpInputs {
            guest: self.guest.get(),
            lengths: self.lengths.values(),
            disc: self.disc.get(),
            dup_loss: &self.dup_loss,
            mpr: self.mpr.get(),
            placements: self.placements.get(),
            rates: self.rates.get(),
            stem_rate: self.config.stem_rate,
        }
    }

    pub fn dp(&self) -> &ReconciliationDp {
        &self.dp
    }

    pub fn data_probability(&self) -> LogDouble {
        self.dp.data_probability()
    }

    pub fn sampler(&self) -> RealisationSampler<'_> {
        RealisationSampler::new(self.inputs(), &self.dp)
    }

    pub fn write_table<W: Write>(&self, writer: W) -> Result<()> {
        self.dp.write_table(&self.inputs(), writer)
    }

    /// Applies `perturbation` and brings every derived table up to date.
    /// On error the state is left exactly as it was.
    pub fn apply(&mut self, perturbation: Perturbation) -> Result<Proposal> {
        debug!(kind = perturbation.describe(), "applying perturbation");
        let mut touched = Vec::new();
        let mut changes = match self.mutate_inputs(perturbation, &mut touched) {
            Ok(changes) => changes,
            Err(e) => {
                self.restore(&touched);
                return Err(e);
            }
        };
        if let Err(e) = self.propagate(&mut changes, &mut touched) {
            self.restore(&touched);
            return Err(e);
        }

        let Self {
            config,
            disc,
            dup_loss,
            guest,
            lengths,
            mpr,
            placements,
            rates,
            dp,
            ..
        } = self;
        let inputs = DpInputs {
            guest: guest.get(),
            lengths: lengths.values(),
            disc: disc.get(),
            dup_loss,
            mpr: mpr.get(),
            placements: placements.get(),
            rates: rates.get(),
            stem_rate: config.stem_rate,
        };
        let trial = dp.begin_trial(&inputs, &changes);
        trace!(update = ?trial.update(), density = %dp.data_probability(), "proposal ready");
        Ok(Proposal {
            changes,
            touched,
            trial,
        })
    }

    /// Keeps the proposed state.
    pub fn commit(&mut self, proposal: Proposal) {
        self.dp.commit(proposal.trial);
        for c in &proposal.touched {
            match c {
                Component::Discretisation => self.disc.clear_cache(),
                Component::DupLoss => self.dup_loss.clear_cache(),
                Component::Guest => self.guest.clear_cache(),
                Component::Lengths => self.lengths.clear_cache(),
                Component::Mpr => self.mpr.clear_cache(),
                Component::Placements => self.placements.clear_cache(),
                Component::Rates => self.rates.clear_cache(),
            }
        }
        trace!("proposal committed");
    }

    /// Returns to the state before the proposal.
    pub fn rollback(&mut self, proposal: Proposal) {
        self.dp.rollback(proposal.trial);
        self.restore(&proposal.touched);
        trace!("proposal rolled back");
    }

    fn restore(&mut self, touched: &[Component]) {
        for c in touched {
            match c {
                Component::Discretisation => self.disc.restore_cache(),
                Component::DupLoss => self.dup_loss.restore_cache(),
                Component::Guest => self.guest.restore_cache(),
                Component::Lengths => self.lengths.restore_cache(),
                Component::Mpr => self.mpr.restore_cache(),
                Component::Placements => self.placements.restore_cache(),
                Component::Rates => self.rates.restore_cache(),
            }
        }
    }

    /// Writes the primary inputs and reports what changed.
    fn mutate_inputs(
        &mut self,
        perturbation: Perturbation,
        touched: &mut Vec<Component>,
    ) -> Result<ChangeSet> {
        let mut changes = ChangeSet::new();
        match perturbation {
            Perturbation::BranchLengths(updates) => {
                let n = self.lengths.len();
                if let Some(&(v, _)) = updates.iter().find(|(v, _)| *v >= n) {
                    return Err(DlrsError::InvalidInput(format!("no guest vertex {}", v)));
                }
                check_lengths(&updates.iter().map(|&(_, l)| l).collect::<Vec<_>>())?;
                let affected: Vec<VertexId> = updates.iter().map(|&(v, _)| v).collect();
                self.lengths.cache(Some(&affected));
                touched.push(Component::Lengths);
                for (v, l) in updates {
                    self.lengths.set(v, l);
                }
                changes.insert(Parent::BranchLengths, Some(affected));
            }
            Perturbation::AllBranchLengths(lengths) => {
                if lengths.len() != self.lengths.len() {
                    return Err(DlrsError::InvalidInput(format!(
                        "{} branch lengths given for {} guest vertices",
                        lengths.len(),
                        self.lengths.len()
                    )));
                }
                check_lengths(&lengths)?;
                self.lengths.cache(None);
                touched.push(Component::Lengths);
                self.lengths.reset(lengths);
                changes.insert(Parent::BranchLengths, None);
            }
            Perturbation::DupLossRates { lambda, mu } => {
                self.dup_loss.cache();
                touched.push(Component::DupLoss);
                self.dup_loss.update(self.disc.get(), lambda, mu)?;
                changes.insert(Parent::DupLossRates, None);
            }
            Perturbation::RateDistribution(rates) => {
                self.rates.cache();
                touched.push(Component::Rates);
                self.rates.set(rates);
                changes.insert(Parent::RateDistribution, None);
            }
            Perturbation::HostTimes { times, stem_time } => {
                let disc = self.disc.get();
                let host = disc.host().with_times(times, stem_time)?;
                let disc = disc.with_host(host)?;
                self.disc.cache();
                touched.push(Component::Discretisation);
                self.disc.set(disc);
                changes.insert(Parent::HostTimes, None);
                changes.insert(Parent::Discretisation, None);
            }
            Perturbation::GuestTree { tree, lengths } => {
                if lengths.len() != tree.vertex_count() {
                    return Err(DlrsError::InvalidInput(format!(
                        "{} branch lengths given for {} guest vertices",
                        lengths.len(),
                        tree.vertex_count()
                    )));
                }
                check_lengths(&lengths)?;
                self.guest.cache();
                touched.push(Component::Guest);
                self.guest.set(tree);
                self.lengths.cache(None);
                touched.push(Component::Lengths);
                self.lengths.reset(lengths);
                changes.insert(Parent::GuestTopology, None);
                changes.insert(Parent::BranchLengths, None);
            }
        }
        Ok(changes)
    }

    /// Rebuilds derived components downstream of `changes`, recording
    /// their own changes too.
    fn propagate(&mut self, changes: &mut ChangeSet, touched: &mut Vec<Component>) -> Result<()> {
        if changes.contains(Parent::Discretisation) && !touched.contains(&Component::DupLoss) {
            self.dup_loss.cache();
            touched.push(Component::DupLoss);
            let (lambda, mu) = (self.dup_loss.duplication_rate(), self.dup_loss.loss_rate());
            self.dup_loss.update(self.disc.get(), lambda, mu)?;
            changes.insert(Parent::DupLossRates, None);
        }
        if changes.contains(Parent::GuestTopology) {
            let mpr = MprMap::new(self.guest.get(), self.disc.get().tree(), &self.leaf_map)?;
            self.mpr.cache();
            touched.push(Component::Mpr);
            self.mpr.set(mpr);
            changes.insert(Parent::MprMap, None);
        }
        if changes.contains(Parent::Discretisation) || changes.contains(Parent::MprMap) {
            let placements = PlacementIndex::new(
                self.guest.get(),
                self.disc.get(),
                self.mpr.get(),
                self.config.max_implied_losses,
            )?;
            self.placements.cache();
            touched.push(Component::Placements);
            self.placements.set(placements);
            changes.insert(Parent::Placements, None);
        }
        Ok(())
    }
}
