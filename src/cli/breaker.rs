//! `riskgate breaker` subcommand

use clap::{Args, Subcommand};

use crate::breaker::{BreakerStore, CircuitBreaker};
use crate::config::Config;
use crate::staleness::StalenessGuard;

#[derive(Args)]
pub struct BreakerArgs {
    #[command(subcommand)]
    pub command: BreakerCommand,
}

#[derive(Subcommand)]
pub enum BreakerCommand {
    /// Show the persisted breaker state
    Status,
    /// Manually reset the breaker, the only downward tier transition
    Reset {
        /// Who is performing the reset
        #[arg(long)]
        actor: String,
        /// Why the reset is justified
        #[arg(long)]
        reason: String,
    },
}

impl BreakerArgs {
    pub fn execute(&self, config: Config) -> anyhow::Result<()> {
        let store = BreakerStore::new(&config.breaker.state_path);
        let guard = StalenessGuard::new(config.staleness.clone());

        match &self.command {
            BreakerCommand::Status => {
                let breaker = CircuitBreaker::with_store(config.breaker.clone(), store, &guard)?;
                let state = breaker.state();
                println!("Tier:                  {}", state.tier);
                println!(
                    "Tripped at:            {}",
                    state
                        .tripped_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "-".to_string())
                );
                println!(
                    "Reason:                {}",
                    state.reason.as_deref().unwrap_or("-")
                );
                println!("Requires manual reset: {}", state.requires_manual_reset);
                println!("Last evaluated:        {}", state.last_evaluated_at.to_rfc3339());
                println!("New entries allowed:   {}", breaker.allows_new_entries());
                Ok(())
            }
            BreakerCommand::Reset { actor, reason } => {
                let mut breaker = CircuitBreaker::with_store(config.breaker.clone(), store, &guard)?;
                let previous = breaker.state().tier;
                let state = breaker.reset(actor, reason)?;
                println!("Breaker reset: {} -> {}", previous, state.tier);
                Ok(())
            }
        }
    }
}
