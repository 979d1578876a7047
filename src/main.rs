use clap::Parser;
use log::{info, warn};
use markov_blanket::reader::{read_table, ReaderOptions};
use markov_blanket::{
    Algorithm, Communicator, CtCounter, DiscreteData, Error, Learner, SoloComm,
};
use std::path::PathBuf;
use std::process;
use std::str::FromStr;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "markov-blanket")]
#[command(version)]
#[command(about = "Constraint-based Bayesian network structure learning from discrete data")]
struct Cli {
    /// Input table file
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    file: PathBuf,

    /// Number of variables
    #[arg(short = 'n', long = "num-vars", value_name = "UINT")]
    num_vars: usize,

    /// Number of observations
    #[arg(short = 'm', long = "num-obs", value_name = "UINT")]
    num_obs: usize,

    /// Field separator
    #[arg(short = 's', long = "separator", default_value_t = ',')]
    separator: char,

    /// Observations are columns (default: rows)
    #[arg(long)]
    col_obs: bool,

    /// The first row/column holds variable names
    #[arg(long)]
    var_names: bool,

    /// The first column/row holds observation indices
    #[arg(long)]
    obs_indices: bool,

    /// Each rank reads its own slice of the observations
    #[arg(long)]
    parallel_read: bool,

    /// Discovery algorithm
    #[arg(short = 'a', long = "algorithm", default_value = "gs", value_name = "ALGO")]
    algorithm: String,

    /// Target variable name
    #[arg(short = 't', long = "target", value_name = "NAME")]
    target: Option<String>,

    /// Report the Markov blanket of the target instead of its
    /// parents-and-children set
    #[arg(long)]
    discover_mb: bool,

    /// Learn the whole-network skeleton
    #[arg(long)]
    learn_network: bool,

    /// Graphviz output path
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    output: Option<PathBuf>,

    /// Orient edges with the collider rule
    #[arg(long)]
    direct_edges: bool,

    /// Bound on the size of conditioning sets (default: the number of
    /// variables)
    #[arg(long, value_name = "K")]
    max_conditioning: Option<usize>,

    /// Significance level for the independence tests
    #[arg(long, default_value_t = 0.05, value_name = "F")]
    alpha: f64,

    /// Fractional load imbalance beyond which network assembly rebalances
    /// its targets
    #[arg(long, default_value_t = 0.2, value_name = "F")]
    imbalance_threshold: f64,

    /// Use the distributed code path even with a single rank
    #[arg(long)]
    force_parallel: bool,

    /// Dry-run the collectives before the timed phases
    #[arg(long)]
    warmup_mpi: bool,

    /// Print the rank-to-host map
    #[arg(long)]
    host_names: bool,

    /// Counting backend
    #[arg(long, default_value = "ct", value_name = "NAME")]
    counter: String,

    /// Logging verbosity (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "warn", value_name = "LVL")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();
    let comm = SoloComm;

    env_logger::Builder::new()
        .filter_level(
            log::LevelFilter::from_str(&cli.log_level).unwrap_or(log::LevelFilter::Warn),
        )
        .target(env_logger::Target::Stderr)
        .init();

    if cli.host_names {
        print_host_names(&comm);
    }
    if cli.warmup_mpi && comm.size() > 1 {
        warmup(&comm);
    }

    if let Err(e) = run(&cli, &comm) {
        if comm.is_first() {
            eprintln!("Encountered runtime error during execution:");
            eprintln!("{}", e);
            eprintln!("Aborting.");
        }
        process::exit(1);
    }
}

fn run(cli: &Cli, comm: &dyn Communicator) -> Result<(), Error> {
    // Counts are accumulated in u32; products of two counts are computed in
    // f64, but a table bigger than this can overflow a u32 cell.
    if (cli.num_obs as f64) >= (u32::MAX as f64).sqrt() && comm.is_first() {
        warn!("the given number of observations may overflow 32-bit counts");
    }

    let read_start = Instant::now();
    let options = ReaderOptions {
        separator: u8::try_from(cli.separator as u32)
            .map_err(|_| Error::InvalidSeparator(cli.separator))?,
        var_names: cli.var_names,
        obs_indices: cli.obs_indices,
        col_obs: cli.col_obs,
        parallel_read: cli.parallel_read,
    };
    let (names, table) = read_table(&cli.file, cli.num_vars, cli.num_obs, &options, comm)?;
    comm.barrier();
    if comm.is_first() {
        info!("Time taken in reading the file: {:?}", read_start.elapsed());
    }

    let counter = match cli.counter.as_str() {
        "ct" => CtCounter::new(cli.num_vars, cli.num_obs, table)?,
        other => return Err(Error::UnknownCounter(other.to_string())),
    };
    let data = DiscreteData::new(counter, &names, cli.alpha)?;

    let algorithm = Algorithm::from_name(&cli.algorithm)?;
    let max_conditioning = cli.max_conditioning.unwrap_or(cli.num_vars);
    let parallel = comm.size() > 1 || cli.force_parallel;
    let learner = Learner::new(&data, comm, algorithm, max_conditioning, parallel);

    if let Some(target_name) = &cli.target {
        let target = data
            .var_index(target_name)
            .ok_or_else(|| Error::UnknownVariable(target_name.clone()))?;
        let start = Instant::now();
        let neighborhood = learner.neighborhood(target, cli.discover_mb);
        if comm.is_first() {
            info!("Time taken in getting the neighborhood: {:?}", start.elapsed());
            println!("{}", data.var_names(&neighborhood).join(","));
        }
    }

    if cli.learn_network || cli.output.is_some() {
        let start = Instant::now();
        let graph = learner.network(cli.direct_edges, parallel, cli.imbalance_threshold);
        comm.barrier();
        if comm.is_first() {
            info!("Time taken in getting the network: {:?}", start.elapsed());
            if let Some(path) = &cli.output {
                let write_start = Instant::now();
                graph.write_graphviz_file(path, cli.direct_edges)?;
                info!("Time taken in writing the network: {:?}", write_start.elapsed());
            }
        }
    }
    Ok(())
}

/// Gathers every rank's host name and prints the map on rank 0.
fn print_host_names(comm: &dyn Communicator) {
    let name = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
    let gathered = comm.allgather_bytes(name.as_bytes());
    if comm.is_first() {
        println!("*** Host names ***");
        for (rank, host) in gathered.iter().enumerate() {
            println!("{}: {}", rank, String::from_utf8_lossy(host));
        }
        println!("******");
    }
}

/// Exercises the collectives once so that their setup cost stays out of the
/// timed phases.
fn warmup(comm: &dyn Communicator) {
    let start = Instant::now();
    comm.barrier();
    comm.allreduce_min(0.0);
    comm.allgather_bytes(&[0u8]);
    comm.barrier();
    if comm.is_first() {
        info!("Time taken in warming up the collectives: {:?}", start.elapsed());
    }
}
