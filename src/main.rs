use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::input::ModelArgs;

mod density;
mod info;
mod input;
mod realise;

#[derive(Debug, Parser)]
#[clap(name = "dlrs")]
#[clap(about = "Guest tree likelihoods and realisations under the DLRS model.", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

const DEFAULT_SAMPLES: usize = 1;

#[derive(Debug, Subcommand)]
enum Commands {
    /// Density of each guest tree given the host tree
    #[clap(arg_required_else_help = true)]
    Density {
        /// Dated, ultrametric host tree in Newick format.
        #[clap(short = 's', long, value_parser, required = true)]
        host: PathBuf,

        /// Guest trees in Newick format, one per line.
        #[clap(short, long, value_parser, required = true)]
        guest: PathBuf,

        /// Tab-separated guest leaf to host leaf map.
        #[clap(short, long, value_parser, required = true)]
        map: PathBuf,

        /// Output path for the DP tables of every tree.
        #[clap(short, long, value_parser)]
        dump: Option<PathBuf>,

        #[clap(flatten)]
        model: ModelArgs,
    },

    /// Sample dated embeddings of each guest tree in the host tree
    #[clap(arg_required_else_help = true)]
    Realise {
        /// Dated, ultrametric host tree in Newick format.
        #[clap(short = 's', long, value_parser, required = true)]
        host: PathBuf,

        /// Guest trees in Newick format, one per line.
        #[clap(short, long, value_parser, required = true)]
        guest: PathBuf,

        /// Tab-separated guest leaf to host leaf map.
        #[clap(short, long, value_parser, required = true)]
        map: PathBuf,

        /// Output path for the realisations.
        #[clap(short, long, value_parser, default_value = "/dev/stdout")]
        output: PathBuf,

        /// Realisations per guest tree.
        #[clap(short = 'n', long, value_parser, default_value_t = DEFAULT_SAMPLES)]
        samples: usize,

        /// Seed; tree i uses seed + i.
        #[clap(long, value_parser, default_value_t = 0)]
        seed: u64,

        /// One greedy realisation per tree instead of samples. Not a MAP estimate.
        #[clap(long, value_parser, default_value_t = false)]
        most_probable: bool,

        #[clap(flatten)]
        model: ModelArgs,
    },

    /// Show the host discretisation and duplication-loss tables
    #[clap(arg_required_else_help = true)]
    Info {
        /// Dated, ultrametric host tree in Newick format.
        #[clap(short = 's', long, value_parser, required = true)]
        host: PathBuf,

        #[clap(flatten)]
        model: ModelArgs,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    let result = match args.command {
        Commands::Density {
            host,
            guest,
            map,
            dump,
            model,
        } => density::start(&host, &guest, &map, &model, dump.as_ref()),

        Commands::Realise {
            host,
            guest,
            map,
            output,
            samples,
            seed,
            most_probable,
            model,
        } => realise::start(&host, &guest, &map, &model, &output, samples, seed, most_probable),

        Commands::Info { host, model } => info::start(&host, &model),
    };

    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}
