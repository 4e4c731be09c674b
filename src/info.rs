use std::path::PathBuf;

use dlrs::discretisation::Discretisation;
use dlrs::dup_loss::DupLossProbs;
use dlrs::error::Result;

use crate::input::{self, ModelArgs};

/// Prints the effective config, the host discretisation and the
/// duplication-loss tables.
pub fn start(host_file: &PathBuf, model: &ModelArgs) -> Result<()> {
    let config = model.load()?;
    let (host, host_newick) = input::load_host(host_file)?;
    let disc = Discretisation::new(host, &config.discretisation)?;
    let dup_loss = DupLossProbs::new(&disc, config.duplication_rate, config.loss_rate)?;

    println!("# Host tree: {}", host_newick);
    println!("# Config");
    println!("{}", serde_json::to_string_pretty(&config)?);
    println!("{}", disc);
    println!("{}", dup_loss);
    Ok(())
}
