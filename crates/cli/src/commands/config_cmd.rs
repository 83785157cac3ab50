//! `siloed config`: Configuration management commands.

use siloed_config::AppConfig;
use siloed_store::InMemoryTaskStore;
use std::path::Path;
use std::sync::Arc;

pub fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    let config = match AppConfig::load_with(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   Config parsed successfully");

    // Provider sections are only checked fully when the backends are built
    if let Err(e) = siloed_gateway::build_orchestrator(
        &config,
        Arc::new(InMemoryTaskStore::new()),
        Arc::default(),
    ) {
        println!("   Provider error: {e}");
        return Err(e.into());
    }

    let mut warnings = Vec::new();
    if config.gateway.host == "0.0.0.0" {
        warnings.push("Gateway binds every interface and has no authentication");
    }
    if config.orchestrator.max_iterations > 100 && config.rate_limit.cooldown_interval == 0 {
        warnings.push("Long runs with no cooldown may hit provider-side limits");
    }

    if warnings.is_empty() {
        println!("   All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   Warning: {w}");
        }
    }

    println!();
    println!("   Primary:   {} ({})", config.primary.kind, config.primary.model);
    println!("   Delegate:  {} ({})", config.delegate.kind, config.delegate.model);
    println!("   Gateway:   {}:{}", config.gateway.host, config.gateway.port);
    println!("   Records:   {}", config.storage.dir.display());

    Ok(())
}

pub fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    println!("{}", toml::to_string_pretty(&redacted(config))?);
    Ok(())
}

pub fn path(config_path: Option<&Path>) {
    println!("{}", AppConfig::resolve_path(config_path).display());
}

fn redacted(mut config: AppConfig) -> AppConfig {
    for provider in [&mut config.primary, &mut config.delegate] {
        if provider.api_key.is_some() {
            provider.api_key = Some("[REDACTED]".into());
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_never_prints_keys() {
        let mut config = AppConfig::default();
        config.primary.api_key = Some("sk-secret".into());

        let out = toml::to_string_pretty(&redacted(config)).unwrap();
        assert!(!out.contains("sk-secret"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::resolve_path(Some(Path::new("siloed.toml")));
        assert!(path.to_str().unwrap().contains("siloed.toml"));
    }
}
