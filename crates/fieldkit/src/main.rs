mod cli;
mod config;
mod tracker;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "fieldkit=debug,fieldkit_fetch=debug,fieldkit_fs=debug"
    } else {
        "fieldkit=info,fieldkit_fetch=info,fieldkit_fs=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose());
    cli.run().await
}
