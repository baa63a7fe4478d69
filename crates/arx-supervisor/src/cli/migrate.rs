use anyhow::Result;
use clap::Parser;
use console::style;

use arx_runtime::db::{migrate, Database};

use super::load_config;

/// Create the persistence schema.
#[derive(Parser)]
pub struct MigrateCommand {
    /// Configuration file path.
    #[arg(short, long, default_value = "supervisor.toml")]
    pub config: String,

    /// Database URL (overrides config and `DATABASE_URL`).
    #[arg(long)]
    pub database_url: Option<String>,
}

impl MigrateCommand {
    /// Execute the migrate command.
    pub async fn execute(self) -> Result<()> {
        dotenvy::dotenv().ok();

        let (mut config, _) = load_config(&self.config)?;
        let url = self
            .database_url
            .clone()
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .or(config.database.url.take());
        config.database.url = url;

        if !config.database.is_enabled() {
            anyhow::bail!(
                "No database configured. Set [database].url in {}, DATABASE_URL, or --database-url.",
                self.config
            );
        }

        let db = Database::from_config(&config.database)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        let result = migrate(db.pool()).await;
        db.close().await;
        result.map_err(|e| anyhow::anyhow!("{}", e))?;

        println!("{} Schema is up to date", style("✓").green().bold());
        Ok(())
    }
}
