mod config;
mod matching;
mod models;
mod net;
mod provision;
#[cfg(test)]
mod scenario_tests;
mod store;
mod txn;
mod wire;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;
use crate::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "exchange=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    tracing::info!("starting xmatch-exchange v{}", env!("CARGO_PKG_VERSION"));

    let store = Store::connect(&config.database_url, config.db_max_connections).await?;
    tracing::info!(max_connections = config.db_max_connections, "database pool ready");

    net::run(&config.host, config.port, store).await?;

    Ok(())
}
