//! `siloed serve`: Start the HTTP API server.

use siloed_core::store::TaskStore;
use siloed_store::InMemoryTaskStore;
use std::path::Path;
use std::sync::Arc;

pub async fn run(
    config_path: Option<&Path>,
    port_override: Option<u16>,
    ephemeral: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let store: Arc<dyn TaskStore> = if ephemeral {
        Arc::new(InMemoryTaskStore::new())
    } else {
        siloed_store::open(&config.storage.dir)
    };

    println!("Siloed Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Primary:   {} ({})", config.primary.kind, config.primary.model);
    println!("   Delegate:  {} ({})", config.delegate.kind, config.delegate.model);
    if ephemeral {
        println!("   Records:   in memory");
    } else {
        println!("   Records:   {}", config.storage.dir.display());
    }

    siloed_gateway::serve(config, store).await?;

    Ok(())
}
