#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Runs the Vision Zero pipeline for one city.
//!
//! Uses `indicatif-log-bridge` (via [`vz_cli_utils::init_logger`]) to
//! route `log` output through `indicatif::MultiProgress` so that log lines
//! and the stage progress bar never fight for the terminal.

use std::path::PathBuf;

use clap::Parser;
use vz_cli::{Pipeline, Stage};
use vz_config::Config;

#[derive(Parser)]
#[command(name = "vz_pipeline", about = "Vision Zero pipeline orchestrator")]
struct Cli {
    /// City config file
    #[arg(short = 'c', long = "config_file")]
    config: PathBuf,

    /// Rerun every selected stage even if it is up to date
    #[arg(long)]
    forceupdate: bool,

    /// Comma-separated stages to run (transformation, generation, model,
    /// visualization); defaults to all
    #[arg(long, value_delimiter = ',')]
    onlysteps: Option<Vec<Stage>>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = vz_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    let stages = cli.onlysteps.unwrap_or_else(|| Stage::ALL.to_vec());

    let pipeline = Pipeline::new(&config, &cli.config, cli.forceupdate);
    let outcomes = pipeline.run(&stages, &multi)?;

    for (stage, outcome) in outcomes {
        log::debug!("{stage}: {outcome:?}");
    }

    Ok(())
}
