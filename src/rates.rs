//! Relaxed-clock substitution rate densities.
//!
//! Guest branch lengths are modelled as `rate * time`, with iid rates drawn
//! from one of these distributions. Users give the mean and variance; the
//! conversion to each family's native parameters happens here.

use statrs::distribution::{Continuous, Exp, Gamma, InverseGamma, LogNormal, Uniform};

use crate::config::RateDistributionConfig;
use crate::error::{DlrsError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum RateDistribution {
    Gamma(Gamma),
    LogNormal(LogNormal),
    InvGamma(InverseGamma),
    Uniform(Uniform),
    Exponential(Exp),
}

fn check_moments(mean: f64, variance: f64) -> Result<()> {
    if !(mean > 0.0 && mean.is_finite()) || !(variance > 0.0 && variance.is_finite()) {
        return Err(DlrsError::Distribution(format!(
            "mean and variance must be positive, got mean {} variance {}",
            mean, variance
        )));
    }
    Ok(())
}

impl RateDistribution {
    pub fn from_config(config: &RateDistributionConfig) -> Result<Self> {
        let err = |e: statrs::StatsError| DlrsError::Distribution(e.to_string());
        match *config {
            RateDistributionConfig::Gamma { mean, variance } => {
                check_moments(mean, variance)?;
                let shape = mean * mean / variance;
                let rate = mean / variance;
                Ok(Self::Gamma(Gamma::new(shape, rate).map_err(err)?))
            }
            RateDistributionConfig::LogNormal { mean, variance } => {
                check_moments(mean, variance)?;
                let sigma2 = (1.0 + variance / (mean * mean)).ln();
                let mu = mean.ln() - sigma2 / 2.0;
                Ok(Self::LogNormal(LogNormal::new(mu, sigma2.sqrt()).map_err(err)?))
            }
            RateDistributionConfig::InvGamma { mean, variance } => {
                check_moments(mean, variance)?;
                let shape = mean * mean / variance + 2.0;
                let scale = mean * (shape - 1.0);
                Ok(Self::InvGamma(InverseGamma::new(shape, scale).map_err(err)?))
            }
            RateDistributionConfig::Uniform { min, max } => {
                if !(min >= 0.0) || !(max > min) {
                    return Err(DlrsError::Distribution(format!(
                        "uniform rate bounds must satisfy 0 <= min < max, got [{}, {}]",
                        min, max
                    )));
                }
                Ok(Self::Uniform(Uniform::new(min, max).map_err(err)?))
            }
            RateDistributionConfig::Exponential { mean } => {
                if !(mean > 0.0 && mean.is_finite()) {
                    return Err(DlrsError::Distribution(format!("invalid exponential mean {}", mean)));
                }
                Ok(Self::Exponential(Exp::new(1.0 / mean).map_err(err)?))
            }
        }
    }

    /// Density at `rate`; zero for rates outside the support.
    pub fn pdf(&self, rate: f64) -> f64 {
        if !rate.is_finite() || rate < 0.0 {
            return 0.0;
        }
        let density = match self {
            Self::Gamma(d) => d.pdf(rate),
            Self::LogNormal(d) => d.pdf(rate),
            Self::InvGamma(d) => d.pdf(rate),
            Self::Uniform(d) => d.pdf(rate),
            Self::Exponential(d) => d.pdf(rate),
        };
        if density.is_finite() {
            density
        } else {
            0.0
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Gamma(_) => "Gamma",
            Self::LogNormal(_) => "LogNormal",
            Self::InvGamma(_) => "InvGamma",
            Self::Uniform(_) => "Uniform",
            Self::Exponential(_) => "Exponential",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statrs::statistics::Distribution;

    #[test]
    fn uniform_density() {
        let d = RateDistribution::from_config(&RateDistributionConfig::Uniform { min: 0.0, max: 5.0 }).unwrap();
        assert!((d.pdf(0.1) - 0.2).abs() < 1e-12);
        assert_eq!(d.pdf(6.0), 0.0);
        assert_eq!(d.pdf(-1.0), 0.0);
        assert_eq!(d.pdf(f64::INFINITY), 0.0);
    }

    #[test]
    fn gamma_matches_moments() {
        let d = RateDistribution::from_config(&RateDistributionConfig::Gamma {
            mean: 2.0,
            variance: 0.5,
        })
        .unwrap();
        match &d {
            RateDistribution::Gamma(g) => {
                assert!((g.mean().unwrap() - 2.0).abs() < 1e-12);
                assert!((g.variance().unwrap() - 0.5).abs() < 1e-12);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(d.pdf(2.0) > 0.0);
    }

    #[test]
    fn log_normal_and_inv_gamma_match_moments() {
        let ln = RateDistribution::from_config(&RateDistributionConfig::LogNormal {
            mean: 1.5,
            variance: 0.3,
        })
        .unwrap();
        if let RateDistribution::LogNormal(d) = &ln {
            assert!((d.mean().unwrap() - 1.5).abs() < 1e-9);
            assert!((d.variance().unwrap() - 0.3).abs() < 1e-9);
        }
        let ig = RateDistribution::from_config(&RateDistributionConfig::InvGamma {
            mean: 1.5,
            variance: 0.3,
        })
        .unwrap();
        if let RateDistribution::InvGamma(d) = &ig {
            assert!((d.mean().unwrap() - 1.5).abs() < 1e-9);
            assert!((d.variance().unwrap() - 0.3).abs() < 1e-9);
        }
        assert_eq!(ln.name(), "LogNormal");
        assert_eq!(ig.pdf(0.0), 0.0);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(RateDistribution::from_config(&RateDistributionConfig::Gamma {
            mean: -1.0,
            variance: 1.0
        })
        .is_err());
        assert!(RateDistribution::from_config(&RateDistributionConfig::Uniform { min: 2.0, max: 1.0 }).is_err());
        assert!(RateDistribution::from_config(&RateDistributionConfig::Exponential { mean: 0.0 }).is_err());
    }
}
