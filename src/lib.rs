//! Likelihood of a guest (gene) tree evolving inside a dated host (species)
//! tree under duplications, losses and a relaxed molecular clock.
//!
//! The host tree is discretised into time points, and a dynamic program sums
//! over every placement of the guest vertices on those points. Realisations,
//! explicit dated embeddings, can be sampled from the same tables.

pub mod chain;
pub mod change;
pub mod checkpoint;
pub mod config;
pub mod discretisation;
pub mod dup_loss;
pub mod error;
pub mod host;
pub mod mpr;
pub mod newick;
pub mod placement;
pub mod prob;
pub mod rates;
pub mod realisation;
pub mod reconciliation;
pub mod tree;

pub use chain::{ChainState, Perturbation, Proposal};
pub use config::DlrsConfig;
pub use discretisation::{Discretisation, Point};
pub use error::{DlrsError, Result};
pub use host::HostTree;
pub use prob::LogDouble;
pub use realisation::{Realisation, RealisationSampler, RealisationWriter};
pub use reconciliation::{DpInputs, ReconciliationDp};
