use std::{fs::File, io::BufReader, path::PathBuf, time::Instant};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use multitree_fock::{
    integrals::DefaultIntegrator, naive_fock, testing, ConfigSystem, MultiTreeFock,
    MultiTreeOptions,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: FockCommand,
}

#[derive(Subcommand, Debug)]
enum FockCommand {
    /// Approximate the Fock matrix of a system
    #[command(name = "compute")]
    Compute {
        /// A path to the system (shells and density) to compute the Fock matrix for
        #[arg(long, short)]
        system: PathBuf,
        #[command(flatten)]
        options: OptionArgs,
        /// Also build the matrices exactly and report the largest errors
        #[arg(long)]
        compare: bool,
        /// Write the statistics of the computation here, as JSON
        #[arg(long)]
        statistics: Option<PathBuf>,
    },
    /// Write a random system, for benchmarks and testing
    #[command(name = "generate")]
    Generate {
        /// Where to write the system
        #[arg(long, short)]
        output: PathBuf,
        /// Number of shells
        #[arg(long, short, default_value_t = 100)]
        centers: usize,
        /// Shells are placed in a cube with this half width
        #[arg(long, default_value_t = 10.0)]
        spread: f64,
        /// 0 for only s shells, 1 to also generate p shells
        #[arg(long, default_value_t = 1)]
        max_momentum: i32,
        /// Rank of the density
        #[arg(long, default_value_t = 5)]
        occupied: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

/// Options of the multi-tree algorithm. Values given here override the ones in the
/// options file.
#[derive(Args, Debug)]
struct OptionArgs {
    /// JSON file with the options, missing fields take their defaults
    #[arg(long)]
    options: Option<PathBuf>,
    /// The error cutoff, relative unless --absolute-error is given
    #[arg(long, short)]
    epsilon: Option<f64>,
    /// Fraction of epsilon given to the Coulomb matrix
    #[arg(long)]
    epsilon_split: Option<f64>,
    #[arg(long)]
    leaf_size: Option<usize>,
    #[arg(long)]
    absolute_error: bool,
    /// Try the Schwartz inequality before the general bounds
    #[arg(long)]
    schwartz_pruning: bool,
    /// Integral bounds smaller than this are treated as zero
    #[arg(long)]
    bounds_cutoff: Option<f64>,
}

impl OptionArgs {
    fn resolve(&self) -> anyhow::Result<MultiTreeOptions> {
        let mut options = match &self.options {
            Some(path) => serde_json::from_reader(BufReader::new(
                File::open(path).with_context(|| format!("opening {}", path.display()))?,
            ))
            .with_context(|| format!("reading options from {}", path.display()))?,
            None => MultiTreeOptions::default(),
        };

        if let Some(epsilon) = self.epsilon {
            options.epsilon = epsilon;
        }
        if let Some(epsilon_split) = self.epsilon_split {
            options.epsilon_split = epsilon_split;
        }
        if let Some(leaf_size) = self.leaf_size {
            options.leaf_size = leaf_size;
        }
        if let Some(bounds_cutoff) = self.bounds_cutoff {
            options.bounds_cutoff = bounds_cutoff;
        }
        options.absolute_error |= self.absolute_error;
        options.schwartz_pruning |= self.schwartz_pruning;

        Ok(options.validated()?)
    }
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        FockCommand::Compute {
            system,
            options,
            compare,
            statistics,
        } => {
            let options = options.resolve()?;
            log::debug!("{options:?}");
            let system = ConfigSystem::load(&system)
                .map_err(|error| anyhow::anyhow!("loading {}: {error}", system.display()))?;
            let shells = system.shells()?;
            let density = system.density_matrix()?;

            let start = Instant::now();
            let mut fock = MultiTreeFock::from_centers(&shells, &density, options)?;
            println!("set up {} functions in {:0.2?}", fock.n_basis(), start.elapsed());

            let start = Instant::now();
            let stats = fock.compute()?.clone();
            println!("multi-tree fock matrix took {:0.2?}", start.elapsed());
            println!(
                "approximations: {} coulomb, {} exchange ({} schwartz)",
                stats.coulomb_approximations, stats.exchange_approximations, stats.schwartz_prunes
            );
            println!(
                "base cases: {} coulomb, {} exchange, {:.3}% of integrals computed exactly",
                stats.coulomb_base_cases,
                stats.exchange_base_cases,
                100.0 * stats.exact_fraction()
            );

            if compare {
                let start = Instant::now();
                let exact = naive_fock(&shells, &density, &DefaultIntegrator::default())?;
                println!("naive fock matrix took {:0.2?}", start.elapsed());

                let output = fock.output();
                println!(
                    "max error: coulomb {:e}, exchange {:e}, fock {:e}",
                    (output.coulomb - exact.coulomb).amax(),
                    (output.exchange - exact.exchange).amax(),
                    (output.fock - exact.fock).amax()
                );
            }

            if let Some(path) = statistics {
                serde_json::to_writer_pretty(File::create(&path)?, &stats)
                    .with_context(|| format!("writing statistics to {}", path.display()))?;
            }
        }

        FockCommand::Generate {
            output,
            centers,
            spread,
            max_momentum,
            occupied,
            seed,
        } => {
            let system = testing::random_system(centers, spread, max_momentum, occupied, seed);
            system
                .save(&output)
                .map_err(|error| anyhow::anyhow!("writing {}: {error}", output.display()))?;
            println!("wrote {} shells to {}", centers, output.display());
        }
    }

    Ok(())
}
