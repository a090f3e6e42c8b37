use std::error::Error;

use clap::Parser;
use cli::{dispatcher::dispatch, model::Cli};
use framer::FramerConfig;
use tracing::{Level, span};
use tracing_subscriber::EnvFilter;

pub mod cli;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let span = span!(Level::INFO, "framer");
    let _enter = span.enter();

    let cfg = match &cli.config {
        Some(path) => FramerConfig::from_file(path)?,
        None => FramerConfig::default(),
    };

    println!("{}", dispatch(cli.command, &cfg)?);
    Ok(())
}
