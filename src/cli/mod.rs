//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::RunArgs;
use std::ffi::OsString;
use std::path::PathBuf;

/// Provision and validate a virtual environment
#[derive(Debug, Parser, Clone)]
#[command(name = "eom")]
#[command(version)]
#[command(about = "env-o-matic: provision, validate and deploy a virtual environment", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// More logging; -vv also logs raw channel output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Append the log to this file instead of stderr
    #[arg(short, long, global = true)]
    pub logfile: Option<PathBuf>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the provisioning pipeline
    Run(RunArgs),

    /// Resolve the options and show what would run, without connecting
    Plan(RunArgs),

    /// List the stage catalog
    Stages,
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
