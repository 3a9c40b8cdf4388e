//! CLI entry point - the composition root.

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use toolhost_cli::bootstrap::bootstrap;
use toolhost_cli::{Cli, CliConfig, CliError, Commands, handlers};

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = CliConfig::load(cli.config.as_deref(), cli.data_dir.as_deref())?;

    match command {
        Commands::Check { strict } => handlers::check::execute(&config, strict)?,
        Commands::Supervise => {
            let ctx = bootstrap(&config)?;
            handlers::supervise::execute(&ctx).await?;
        }
        Commands::Status => {
            let ctx = bootstrap(&config)?;
            handlers::status::execute(&ctx).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => Ok(()),
        Err(err) => match err.downcast_ref::<CliError>() {
            Some(cli_err) => {
                eprintln!("Error: {cli_err}");
                std::process::exit(cli_err.exit_code());
            }
            None => Err(err),
        },
    }
}
