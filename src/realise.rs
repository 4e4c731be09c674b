use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use indicatif::ProgressBar;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::{info, warn};

use dlrs::chain::ChainState;
use dlrs::error::Result;
use dlrs::realisation::RealisationWriter;

use crate::input::{self, ModelArgs};

/// Samples realisations for every guest tree in parallel and writes them
/// in input order.
#[allow(clippy::too_many_arguments)]
pub fn start(
    host_file: &PathBuf,
    guest_file: &PathBuf,
    map_file: &PathBuf,
    model: &ModelArgs,
    output: &PathBuf,
    samples: usize,
    seed: u64,
    most_probable: bool,
) -> Result<()> {
    let config = model.load()?;
    let (host, host_newick) = input::load_host(host_file)?;
    let guests = input::load_guests(guest_file)?;
    let leaf_map = input::load_map(map_file)?;
    if most_probable {
        warn!("greedy most probable realisations are not maximum a posteriori estimates");
    }

    let progress_bar = ProgressBar::new(guests.len() as u64);
    let results: Vec<Result<Vec<String>>> = guests
        .par_iter()
        .enumerate()
        .map(|(id, nw)| {
            let state = ChainState::from_newick(config.clone(), host.clone(), nw, leaf_map.clone())?;
            let sampler = state.sampler();
            let realisations = if most_probable {
                vec![sampler.most_probable().to_newick(state.guest())]
            } else {
                // One stream per tree, seeded by its index.
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(id as u64));
                (0..samples)
                    .map(|_| sampler.sample(&mut rng).to_newick(state.guest()))
                    .collect()
            };
            progress_bar.inc(1);
            Ok(realisations)
        })
        .collect();
    progress_bar.finish();

    let mut writer = RealisationWriter::new(BufWriter::new(File::create(output)?), &host_newick)?;
    let mut written = 0;
    for (id, result) in results.into_iter().enumerate() {
        for (sub, realisation) in result?.iter().enumerate() {
            writer.write(id, sub, realisation)?;
            written += 1;
        }
    }
    writer.finish()?;
    info!(realisations = written, output = %output.display(), "wrote realisations");
    Ok(())
}
