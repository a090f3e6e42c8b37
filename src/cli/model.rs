use std::path::PathBuf;

use clap_derive::{Args, Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// RON config holding the channel list
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: CliCommands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommands {
    /// Decode an encoded frame and print its series as JSON
    #[command(alias = "dec")]
    Decode(DecodeArgs),
    /// Print the flag byte of an encoded frame
    Flags(FlagsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DecodeArgs {
    pub file: PathBuf,
    /// Include sample values
    #[arg(short, long)]
    pub values: bool,
}

#[derive(Args, Debug, Clone)]
pub struct FlagsArgs {
    pub file: PathBuf,
}
