use anyhow::Result;
use butterfly_plot::cli::{init_tracing, Cli};
use clap::Parser;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_format);
    cli.run()
}
