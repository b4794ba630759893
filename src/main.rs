use clap::Parser;
use tracing::error;

use coinarena::app::Config;
use coinarena::cli::Cli;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    config.init_logging();

    if let Err(e) = coinarena::cli::execute(cli.command, config).await {
        error!(error = %e, "fatal error");
        std::process::exit(1);
    }
}
