use clap::{Args, Subcommand};

use custsync::config::Config;

use super::OutputFormat;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!(
                            "database_path: {}",
                            config.database_path.value.display()
                        );
                        println!("  source: {}", config.database_path.source);
                        println!();

                        println!("state_path: {}", config.state_path.value.display());
                        println!("  source: {}", config.state_path.source);
                        println!();

                        println!("staleness_hours: {}", config.staleness_hours.value);
                        println!("  source: {}", config.staleness_hours.source);
                        println!();

                        println!(
                            "remote.endpoint: {}",
                            config.remote.endpoint.as_deref().unwrap_or("(not set)")
                        );
                        println!(
                            "remote.api_key: {}",
                            if config.remote.api_key.is_some() {
                                "(set)"
                            } else {
                                "(not set)"
                            }
                        );
                        match config.remote.timeout_secs {
                            Some(secs) => println!("remote.timeout_secs: {}", secs),
                            None => println!("remote.timeout_secs: (none)"),
                        }
                    }
                }
                Ok(())
            }
        }
    }
}
