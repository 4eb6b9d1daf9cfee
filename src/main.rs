use clap::Parser;

use riskgate::cli::{load_config, Cli, Commands};
use riskgate::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    telemetry::init_logging(&config.telemetry)?;

    match cli.command {
        Commands::Backtest(args) => args.execute(config),
        Commands::Walkforward(args) => args.execute(config).await,
        Commands::Breaker(args) => args.execute(config),
        Commands::Config(args) => args.execute(config),
    }
}
