use anyhow::Result;
use clap::{Parser, Subcommand};
use meetscribe::app;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "meetscribe")]
#[command(about = "Post-meeting analysis service", long_about = None)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Run the HTTP service (default when no subcommand is given)
    Serve,
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("meetscribe {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(CliCommand::Serve) | None => app::run_service().await,
    }
}
