#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! CLI tool for building the Vision Zero canonical dataset.
//!
//! `join` assigns every crash and concern to its nearest road segment;
//! `generate` turns the joined events and road features into the weekly
//! per-segment panel and the adjacency table.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use vz_config::Config;
use vz_record::DateWindow;

#[derive(Parser)]
#[command(name = "vz_canon", about = "Vision Zero canonical dataset builder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// City config file
    #[arg(short = 'c', long = "config_file")]
    config: PathBuf,

    /// Data directory (defaults to the config's data directory)
    #[arg(short = 'd', long = "datadir")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Join crashes and concerns to their nearest road segment
    Join {
        #[command(flatten)]
        common: CommonArgs,

        /// Leave events farther than this many metres unassigned
        #[arg(long)]
        tolerance: Option<f64>,
    },
    /// Build the canonical dataset and adjacency table
    Generate {
        #[command(flatten)]
        common: CommonArgs,

        /// First year of data to keep (overrides the config)
        #[arg(short = 's', long = "startyear")]
        start_year: Option<i32>,

        /// Year at which data stops being kept (overrides the config)
        #[arg(short = 'e', long = "endyear")]
        end_year: Option<i32>,
    },
}

fn load(common: &CommonArgs) -> Result<(Config, vz_config::DataPaths), Box<dyn std::error::Error>> {
    let config = Config::load(&common.config)?;
    let paths = common
        .data_dir
        .as_ref()
        .map_or_else(|| config.data_paths(), |dir| config.data_paths_in(dir));
    log::info!("Using data directory {}", paths.data_dir.display());
    Ok((config, paths))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Join { common, tolerance } => {
            let (config, paths) = load(&common)?;
            let tolerance = tolerance.or(config.join.tolerance_m);
            let report = vz_canon::run_join(&config, &paths, tolerance)?;
            log::info!(
                "Join complete: {} crashes matched, {} crash locations",
                report.crashes.matched,
                report.crash_locations
            );
        }
        Commands::Generate {
            common,
            start_year,
            end_year,
        } => {
            let (mut config, paths) = load(&common)?;
            config.start_year = start_year.or(config.start_year);
            config.end_year = end_year.or(config.end_year);
            if let (Some(start), Some(end)) = (config.start_year, config.end_year)
                && start >= end
            {
                return Err(format!("start year {start} must be before end year {end}").into());
            }

            let window = DateWindow::from_years(config.start_year, config.end_year);
            let summary = vz_canon::run_generate(&config, &paths, window)?;
            log::info!(
                "Generate complete: {} rows for {} segments written to {}",
                summary.rows,
                summary.segments,
                paths.canonical_dataset.display()
            );
        }
    }

    Ok(())
}
