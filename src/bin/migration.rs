use anyhow::Result;
use marketplace_orders::{
    config::{self, init_tracing},
    migrator::run_migration,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = config::load_config()?;
    init_tracing(cfg.log_level.as_str(), cfg.log_json);

    info!("Starting database migration");
    run_migration(&cfg.database_url).await?;
    info!("Migration completed successfully");

    Ok(())
}
