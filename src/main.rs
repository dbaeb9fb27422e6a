use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use edf_connector::config::Config;
use edf_connector::connector::Connector;
use edf_connector::edelia::HttpEdeliaApi;
use edf_connector::filestore::LocalFileStore;
use edf_connector::pg_store::PgStore;
use edf_connector::pipeline::Credentials;
use edf_connector::transport::HttpTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "edf_connector=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize persistence
    let store = PgStore::connect(&config.database_url).await?;
    store.ensure_schema().await?;

    let transport = HttpTransport::new(config.edf_base_url.clone())?;
    let edelia = HttpEdeliaApi::new(config.edelia_base_url.clone())?;
    let files = LocalFileStore::new(&config.bills_dir);

    let connector = Connector::new(
        Credentials {
            email: config.email.clone(),
            password: config.password.clone(),
        },
        Arc::new(transport),
        Arc::new(edelia),
        Arc::new(store),
        Arc::new(files),
    )?;

    match connector.run().await {
        Ok(_summary) => {
            tracing::info!("Run completed");
            Ok(())
        }
        Err(err) => {
            tracing::error!("Run failed: {}", err);
            Err(err.into())
        }
    }
}
