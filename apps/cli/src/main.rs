//! ddxbuilder CLI — clinical differential-diagnosis knowledge tool.
//!
//! Ingests a remote classification hierarchy, a paginated diagnostic
//! text corpus, decision trees, and reference cases into a local
//! knowledge database, and answers diagnosis requests against it.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
