use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use tracing::info;

use dlrs::config::DlrsConfig;
use dlrs::error::{DlrsError, Result};
use dlrs::host::HostTree;
use dlrs::mpr::GuestHostMap;
use dlrs::newick::{self, NewickTree};

/// Model settings shared by every subcommand. Flags override the JSON file.
#[derive(Debug, Args)]
pub struct ModelArgs {
    /// JSON config file; defaults are used for anything it leaves out.
    #[clap(short, long, value_parser)]
    pub config: Option<PathBuf>,

    /// Duplication rate.
    #[clap(long, value_parser)]
    pub lambda: Option<f64>,

    /// Loss rate.
    #[clap(long, value_parser)]
    pub mu: Option<f64>,

    /// Min. no. of slices per host arc.
    #[clap(long, value_parser)]
    pub min_slices: Option<usize>,

    /// Max. no. of slices per host arc.
    #[clap(long, value_parser)]
    pub max_slices: Option<usize>,

    /// Approximate max. slice length.
    #[clap(long, value_parser)]
    pub timestep: Option<f64>,

    /// Exact no. of slices on the stem arc.
    #[clap(long, value_parser)]
    pub stem_slices: Option<usize>,

    /// Score the root's branch length against the stem arc.
    #[clap(long, value_parser)]
    pub stem_rate: Option<bool>,

    /// Drop placements implying more losses than this.
    #[clap(long, value_parser)]
    pub max_losses: Option<usize>,
}

impl ModelArgs {
    pub fn load(&self) -> Result<DlrsConfig> {
        let mut config = match &self.config {
            Some(path) => DlrsConfig::from_json_file(path)?,
            None => DlrsConfig::default(),
        };
        if let Some(v) = self.lambda {
            config.duplication_rate = v;
        }
        if let Some(v) = self.mu {
            config.loss_rate = v;
        }
        let d = &mut config.discretisation;
        if let Some(v) = self.min_slices {
            d.min_slices = v;
        }
        if let Some(v) = self.max_slices {
            d.max_slices = v;
        }
        if let Some(v) = self.timestep {
            d.max_timestep = v;
        }
        if self.stem_slices.is_some() {
            d.stem_slices = self.stem_slices;
        }
        if let Some(v) = self.stem_rate {
            config.stem_rate = v;
        }
        if self.max_losses.is_some() {
            config.max_implied_losses = self.max_losses;
        }
        config.validate()?;
        Ok(config)
    }
}

/// The first tree of a Newick file, as a dated host tree and as text.
pub fn load_host(path: &Path) -> Result<(HostTree, String)> {
    let text = fs::read_to_string(path)?;
    let nw = newick::parse_many(&text)?
        .into_iter()
        .next()
        .ok_or_else(|| DlrsError::InvalidInput(format!("no host tree in {}", path.display())))?;
    let host = HostTree::from_newick(&nw)?;
    info!(
        vertices = host.tree().vertex_count(),
        tip_time = host.tip_time(),
        "read host tree"
    );
    Ok((host, newick::write(&nw)))
}

/// Every guest tree in a file, one per line.
pub fn load_guests(path: &Path) -> Result<Vec<NewickTree>> {
    let guests = newick::parse_many(&fs::read_to_string(path)?)?;
    if guests.is_empty() {
        return Err(DlrsError::InvalidInput(format!("no guest trees in {}", path.display())));
    }
    info!(trees = guests.len(), "read guest trees");
    Ok(guests)
}

pub fn load_map(path: &Path) -> Result<GuestHostMap> {
    let map = GuestHostMap::from_path(path)?;
    info!(leaves = map.len(), "read guest-to-host leaf map");
    Ok(map)
}
