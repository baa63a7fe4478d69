use anyhow::Result;
use clap::Parser;
use console::style;

use super::load_config;

/// Validate a configuration file.
#[derive(Parser)]
pub struct CheckCommand {
    /// Configuration file path.
    #[arg(short, long, default_value = "supervisor.toml")]
    pub config: String,
}

impl CheckCommand {
    /// Execute the check command.
    pub fn execute(self) -> Result<()> {
        let (config, found) = load_config(&self.config)?;
        if !found {
            anyhow::bail!("Configuration file not found: {}", self.config);
        }

        let weights = config.routing.weights();
        println!("{} {} is valid", style("✓").green().bold(), self.config);
        println!(
            "  server      {}:{}",
            config.server.host, config.server.port
        );
        println!(
            "  database    {}",
            if config.database.is_enabled() {
                "postgres"
            } else {
                "none (in memory)"
            }
        );
        println!(
            "  routing     k={} cpu={} memory={} connections={}",
            config.routing.k_nearest, weights.cpu, weights.memory, weights.connections
        );
        println!(
            "  health      every {}s, timeout {}s, fail after {}, recover after {}",
            config.health.check_interval_secs,
            config.health.timeout_secs,
            config.health.failure_threshold,
            config.health.recovery_threshold
        );
        println!(
            "  events      buffer {} per subscriber, {:?}",
            config.events.subscriber_buffer, config.events.overflow_policy
        );
        Ok(())
    }
}
