//! roon-connect entry point.
//!
//! Loads the configuration, runs one SOOD discovery round and reports the
//! Roon Cores that answered together with the saved server, if any.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config_or_default()   -- ~/.config/roon-connect/config.toml
//!  └─ tracing init               -- RUST_LOG, else [general] log_level
//!  └─ spawn_blocking(discover)   -- UDP round on a blocking worker
//!  └─ FileCredentialStore        -- report the saved server
//! ```

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use roon_connect::application::ports::{CredentialStore, ServerDiscovery};
use roon_connect::infrastructure::network::discovery::SoodDiscovery;
use roon_connect::infrastructure::storage::config::{self, AppConfig};
use roon_connect::infrastructure::storage::credentials::FileCredentialStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = config::config_file_path().ok();
    let cfg = config_path
        .as_deref()
        .map(config::load_config_or_default)
        .unwrap_or_default();

    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.general.log_level)),
        )
        .init();

    info!("roon-connect starting");
    match &config_path {
        Some(path) => info!("configuration: {}", path.display()),
        None => warn!("no platform config directory; using defaults"),
    }

    run_discovery(&cfg).await?;

    if let Some(path) = config_path {
        report_saved_server(&FileCredentialStore::new(path));
    }

    info!("roon-connect finished");
    Ok(())
}

/// Runs one discovery round on a blocking worker and logs every server found.
async fn run_discovery(cfg: &AppConfig) -> anyhow::Result<()> {
    let settings = cfg
        .discovery
        .to_settings()
        .context("invalid [discovery] configuration")?;
    let timeout = settings.timeout;
    let discovery = SoodDiscovery::new(settings);

    info!("searching for Roon Cores ({} ms)", timeout.as_millis());
    let servers = tokio::task::spawn_blocking(move || discovery.discover(timeout))
        .await
        .context("discovery worker panicked")?
        .context("could not open the discovery socket")?;

    if servers.is_empty() {
        info!("no Roon Core answered");
    }
    for server in &servers {
        info!(
            "found {} (v{}) at {} [{}]",
            server.display_name,
            server.version,
            server.endpoint(),
            server.unique_id
        );
    }
    Ok(())
}

fn report_saved_server(store: &FileCredentialStore) {
    match store.load_saved_server() {
        Ok(Some(saved)) => info!(
            "saved server: {} (token {})",
            saved.server,
            if saved.token.is_some() { "present" } else { "absent" }
        ),
        Ok(None) => info!("no saved server"),
        Err(e) => warn!("could not read saved server: {e}"),
    }
}
