use std::path::PathBuf;

use clap::{Parser, Subcommand};
use scene::EntitySnapshot;
use tools::{ToolError, read_file, write_file};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Offline tooling for the flight globe")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a deterministic synthetic entity snapshot as JSON
    SynthFeed {
        /// Number of entities
        #[arg(long, default_value_t = 6001)]
        count: usize,

        /// RNG seed
        #[arg(long, default_value_t = 1)]
        seed: u64,

        /// Output file (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Parse a GeoJSON boundary file and report what the engine would draw
    CheckOutlines {
        path: PathBuf,
    },

    /// Dead-reckon a snapshot file forward and print the final positions
    Simulate {
        path: PathBuf,

        /// Simulated duration in seconds
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,

        /// Integration step in seconds
        #[arg(long, default_value_t = 1.0 / 60.0)]
        dt: f64,
    },

    /// Print the built-in fallback outlines as GeoJSON
    FallbackOutlines,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(Args::parse()) {
        error!(%err, "flightctl failed");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), ToolError> {
    match args.command {
        Command::SynthFeed { count, seed, out } => {
            let feed = tools::synth_feed(count, seed);
            let payload = serde_json::to_string(&feed)?;
            match out {
                Some(path) => {
                    write_file(&path, &payload)?;
                    info!(count, seed, path = %path.display(), "synthetic feed written");
                }
                None => println!("{payload}"),
            }
        }
        Command::CheckOutlines { path } => {
            let report = tools::check_outlines(&read_file(&path)?);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Simulate { path, seconds, dt } => {
            let snapshot: Vec<EntitySnapshot> = serde_json::from_str(&read_file(&path)?)?;
            let out = tools::simulate(snapshot, seconds, dt)?;
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::FallbackOutlines => {
            println!("{}", tools::fallback_outlines_geojson()?);
        }
    }
    Ok(())
}
