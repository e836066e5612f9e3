use anyhow::{Context, Result};
use clap::Parser;

use dialogue_tts::cli::{self, Cli};
use dialogue_tts::logger;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        logger::init_logger_with("warn,dialogue_tts=debug");
    } else {
        logger::init_logger();
    }

    let command = format!("{:?}", cli.command);
    cli::run(cli)
        .await
        .with_context(|| format!("dialogue-tts failed: {}", command))?;
    Ok(())
}
