//! EDF backend-for-frontend server.

use edf_bff::config::load_from_env;
use edf_bff::edf::HttpTransport;
use edf_bff::startup::{bootstrap, serve};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const EDF_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("edf_bff=info".parse()?))
        .init();

    let settings = load_from_env()?;
    tracing::info!(uri = %settings.edf_uri, env = ?settings.env, "starting");

    let transport = Arc::new(HttpTransport::new(EDF_TIMEOUT)?);
    let state = bootstrap(&settings, transport).await?;
    serve(&settings, state).await?;
    Ok(())
}
