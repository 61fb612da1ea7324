mod command;
mod error;
mod repl;
mod variables;

use crate::repl::{Repl, Session, print_evaluation};
use anyhow::Context;
use std::env;
use std::fs;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let runtime = tokio::runtime::Runtime::new().context("failed to start the async runtime")?;

    // Get command line arguments
    let args: Vec<String> = env::args().collect();

    if args.len() == 1 {
        let mut repl = Repl::new(runtime);
        repl.run()
    } else if args.len() == 2 {
        runtime.block_on(run_file(&args[1]))
    } else {
        println!("Usage: urlmacro [filename]");
        println!("       urlmacro           # Run in REPL mode");
        Ok(())
    }
}

/// Expand every template in `filename`. Blank lines and `#` comments are
/// skipped; lines starting with `:` adjust the session like in the REPL.
async fn run_file(filename: &str) -> anyhow::Result<()> {
    tracing::info!("Running file: {}", filename);

    let source =
        fs::read_to_string(filename).with_context(|| format!("Error reading file: {filename}"))?;

    let mut session = Session::new();
    for (number, line) in source.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if command::is_command(trimmed) {
            let cmd = command::parse(trimmed)
                .with_context(|| format!("{filename}:{}", number + 1))?;
            if let Some(message) = session.apply(&cmd) {
                tracing::debug!("{}", message);
            }
            continue;
        }

        match session.evaluate(trimmed).await {
            Ok(evaluation) => print_evaluation(&evaluation),
            Err(e) => tracing::error!("{}:{}: {}", filename, number + 1, e),
        }
    }

    tracing::info!("Execution complete");
    Ok(())
}
