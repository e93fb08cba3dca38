//! Atelier binary entry point

use atelier::cli::{self, Cli};
use clap::Parser;
use color_eyre::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Install error handler
    color_eyre::install()?;

    // A local .env works the same as exported variables
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Set up logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("atelier=debug")
            .init();
    }

    cli::run(cli).await?;

    Ok(())
}
