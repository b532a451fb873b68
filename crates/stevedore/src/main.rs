use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

#[tokio::main]
async fn main() -> Result<()> {
    let parsed = cli::Cli::parse();

    match parsed.dispatch().await {
        Ok(()) => Ok(()),
        Err(err) => {
            // Propagate the wrapped command's own exit code
            if let Some(failed) = err.downcast_ref::<commands::run::CommandFailed>() {
                eprintln!("Error: {}", failed);
                std::process::exit(failed.exit_code());
            }
            Err(err)
        }
    }
}
