use clap::*;
use std::path::PathBuf;

#[derive(Debug, Subcommand)]
pub enum Command {
  /// Write an image of DIRECTORY, file contents included.
  Create {
    output: PathBuf,
    #[clap(required = true)]
    directory: PathBuf,
    /// Volume name; defaults to CDROM.
    #[clap(long)]
    volume: Option<String>,
  },
  /// Write a catalog image of DIRECTORY: every file is listed but none takes space.
  Catalog {
    output: PathBuf,
    #[clap(required = true)]
    directory: PathBuf,
    /// Volume name; defaults to the name of DIRECTORY.
    #[clap(long)]
    volume: Option<String>,
  },
}

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
  #[clap(subcommand)]
  pub command: Command,
}

pub fn parse() -> Cli {
  Cli::parse()
}
