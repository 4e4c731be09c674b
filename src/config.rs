//! Run configuration, read from JSON and overridable from the command line.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DlrsError, Result};

/// Bounds for slicing the host arcs into discrete time points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscretisationConfig {
    /// Min. no. of slices on each host arc.
    pub min_slices: usize,
    /// Max. no. of slices on each host arc.
    pub max_slices: usize,
    /// Upper bound on slice length.
    pub max_timestep: f64,
    /// Exact no. of slices on the stem arc; the general rule applies if unset.
    pub stem_slices: Option<usize>,
}

impl Default for DiscretisationConfig {
    fn default() -> Self {
        Self {
            min_slices: 3,
            max_slices: 10,
            max_timestep: 0.02,
            stem_slices: None,
        }
    }
}

/// Relaxed-clock rate distribution, parameterised the way users think of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateDistributionConfig {
    Gamma { mean: f64, variance: f64 },
    LogNormal { mean: f64, variance: f64 },
    InvGamma { mean: f64, variance: f64 },
    Uniform { min: f64, max: f64 },
    Exponential { mean: f64 },
}

impl Default for RateDistributionConfig {
    fn default() -> Self {
        RateDistributionConfig::Gamma {
            mean: 1.0,
            variance: 1.0,
        }
    }
}

/// Everything the likelihood engine needs besides the trees themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DlrsConfig {
    pub discretisation: DiscretisationConfig,
    pub duplication_rate: f64,
    pub loss_rate: f64,
    pub rate_distribution: RateDistributionConfig,
    /// Whether the root's branch length is scored against the stem arc.
    pub stem_rate: bool,
    /// Placements implying more losses than this are discarded.
    pub max_implied_losses: Option<usize>,
}

impl Default for DlrsConfig {
    fn default() -> Self {
        Self {
            discretisation: DiscretisationConfig::default(),
            duplication_rate: 0.1,
            loss_rate: 0.1,
            rate_distribution: RateDistributionConfig::default(),
            stem_rate: true,
            max_implied_losses: None,
        }
    }
}

impl DlrsConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let config: DlrsConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: DlrsConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (what, rate) in [("duplication", self.duplication_rate), ("loss", self.loss_rate)] {
            if !rate.is_finite() || rate < 0.0 {
                return Err(DlrsError::InvalidInput(format!("invalid {} rate {}", what, rate)));
            }
        }
        let d = &self.discretisation;
        if d.min_slices < 2 {
            return Err(DlrsError::InvalidInput(format!(
                "min_slices must be at least 2, got {}",
                d.min_slices
            )));
        }
        if d.max_slices < d.min_slices {
            return Err(DlrsError::InvalidInput(format!(
                "max_slices {} is below min_slices {}",
                d.max_slices, d.min_slices
            )));
        }
        if d.min_slices != d.max_slices && !(d.max_timestep > 0.0) {
            return Err(DlrsError::InvalidInput(format!(
                "max_timestep must be positive, got {}",
                d.max_timestep
            )));
        }
        if d.stem_slices == Some(0) {
            return Err(DlrsError::InvalidInput("stem_slices must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DlrsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.discretisation.min_slices, 3);
        assert_eq!(config.max_implied_losses, None);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = DlrsConfig::from_json_str(
            r#"{
                "duplication_rate": 0.25,
                "discretisation": { "stem_slices": 2 },
                "rate_distribution": { "kind": "uniform", "min": 0.0, "max": 5.0 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.duplication_rate, 0.25);
        assert_eq!(config.loss_rate, 0.1);
        assert_eq!(config.discretisation.stem_slices, Some(2));
        assert_eq!(config.discretisation.max_slices, 10);
        assert_eq!(
            config.rate_distribution,
            RateDistributionConfig::Uniform { min: 0.0, max: 5.0 }
        );
    }

    #[test]
    fn rejects_bad_bounds() {
        let mut config = DlrsConfig::default();
        config.discretisation.min_slices = 1;
        assert!(config.validate().is_err());

        let mut config = DlrsConfig::default();
        config.discretisation.max_slices = 2;
        assert!(config.validate().is_err());

        let mut config = DlrsConfig::default();
        config.discretisation.max_timestep = 0.0;
        assert!(config.validate().is_err());
        config.discretisation.max_slices = config.discretisation.min_slices;
        assert!(config.validate().is_ok());

        assert!(DlrsConfig::from_json_str(r#"{"loss_rate": -1.0}"#).is_err());
    }
}
