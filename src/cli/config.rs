//! `riskgate config` subcommand

use clap::{Args, Subcommand};

use crate::config::Config;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the resolved configuration
    Show,
    /// Validate the configuration and exit
    Validate,
}

impl ConfigArgs {
    pub fn execute(&self, config: Config) -> anyhow::Result<()> {
        match self.command {
            ConfigCommand::Show => {
                println!("{config:#?}");
                Ok(())
            }
            ConfigCommand::Validate => {
                config.validate()?;
                println!("Configuration is valid");
                Ok(())
            }
        }
    }
}
