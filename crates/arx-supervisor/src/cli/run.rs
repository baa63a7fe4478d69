use anyhow::Result;
use clap::Parser;
use console::style;
use tracing::info;
use tracing_subscriber::EnvFilter;

use arx_core::config::{ObservabilityConfig, SupervisorConfig};
use arx_supervisor::Supervisor;

use super::load_config;

/// Run the supervisor.
#[derive(Parser)]
pub struct RunCommand {
    /// Configuration file path.
    #[arg(short, long, default_value = "supervisor.toml")]
    pub config: String,

    /// Port to listen on (overrides config).
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    pub host: Option<String>,

    /// Enable development mode (verbose logging).
    #[arg(long)]
    pub dev: bool,
}

impl RunCommand {
    /// Execute the run command.
    pub async fn execute(self) -> Result<()> {
        dotenvy::dotenv().ok();

        let (mut config, found) = load_config(&self.config)?;
        self.apply_overrides(&mut config);
        init_tracing(&config.observability, self.dev);

        println!();
        println!(
            "  {}  v{}",
            style("ARX supervisor").bold().cyan(),
            env!("CARGO_PKG_VERSION")
        );
        println!();

        if found {
            info!(path = %self.config, "Loaded configuration");
        } else {
            info!(path = %self.config, "Configuration file not found, using defaults");
        }

        println!(
            "  {} API at {}",
            style("→").bold(),
            style(format!(
                "http://{}:{}/api/v1",
                config.server.host, config.server.port
            ))
            .cyan()
        );
        println!(
            "  {} Admin at {}",
            style("→").bold(),
            style(format!(
                "http://{}:{}/admin/api/v1",
                config.server.host, config.server.port
            ))
            .cyan()
        );
        if !config.database.is_enabled() {
            println!(
                "  {} No database configured, running in memory",
                style("!").bold().yellow()
            );
        }
        if self.dev {
            println!("  {} Development mode enabled", style("→").bold());
        }
        println!();

        let supervisor = Supervisor::builder()
            .config(config)
            .build()
            .map_err(|e| anyhow::anyhow!("{}", e))?;

        supervisor.run().await.map_err(|e| anyhow::anyhow!("{}", e))?;

        println!("\n  {} Stopped", style("■").bold());

        Ok(())
    }

    fn apply_overrides(&self, config: &mut SupervisorConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(observability: &ObservabilityConfig, dev: bool) {
    let level = if dev {
        "debug"
    } else {
        observability.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if observability.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing already initialized: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_command_defaults() {
        let cmd = RunCommand::try_parse_from(["run"]).unwrap();
        assert_eq!(cmd.config, "supervisor.toml");
        assert!(cmd.port.is_none());
        assert!(cmd.host.is_none());
        assert!(!cmd.dev);
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let cmd = RunCommand {
            config: "custom.toml".to_string(),
            port: Some(3000),
            host: Some("127.0.0.1".to_string()),
            dev: true,
        };
        let mut config = SupervisorConfig::default();
        cmd.apply_overrides(&mut config);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let cmd = RunCommand::try_parse_from(["run", "-c", "other.toml"]).unwrap();
        let mut config = SupervisorConfig::default();
        cmd.apply_overrides(&mut config);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
    }
}
