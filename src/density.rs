use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use tracing::{debug, info};

use dlrs::chain::ChainState;
use dlrs::error::Result;

use crate::input::{self, ModelArgs};

/// Prints `index<TAB>ln(density)` for every guest tree, optionally dumping
/// the DP tables.
pub fn start(
    host_file: &PathBuf,
    guest_file: &PathBuf,
    map_file: &PathBuf,
    model: &ModelArgs,
    dump: Option<&PathBuf>,
) -> Result<()> {
    let config = model.load()?;
    let (host, _) = input::load_host(host_file)?;
    let guests = input::load_guests(guest_file)?;
    let leaf_map = input::load_map(map_file)?;

    let mut dump = match dump {
        Some(path) => Some(BufWriter::new(File::create(path)?)),
        None => None,
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for (i, nw) in guests.iter().enumerate() {
        let state = ChainState::from_newick(config.clone(), host.clone(), nw, leaf_map.clone())?;
        let density = state.data_probability();
        debug!(tree = i, ln_density = density.ln(), "computed density");
        writeln!(out, "{}\t{}", i, density)?;
        if let Some(w) = dump.as_mut() {
            writeln!(w, "# Guest tree {}", i)?;
            state.write_table(&mut *w)?;
        }
    }
    if let Some(mut w) = dump {
        w.flush()?;
    }
    info!(trees = guests.len(), "done");
    Ok(())
}
