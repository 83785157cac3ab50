//! `siloed status`: Show configuration and a running gateway's counters.

use siloed_config::AppConfig;
use std::path::Path;
use std::time::Duration;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    println!("Siloed Status");
    println!("=============");
    println!("  Config:       {}", AppConfig::resolve_path(config_path).display());
    println!("  Primary:      {} ({})", config.primary.kind, config.primary.model);
    println!("  Delegate:     {} ({})", config.delegate.kind, config.delegate.model);
    println!(
        "  Quota:        {} requests / {} tokens per {}s",
        config.rate_limit.max_requests_per_window,
        config.rate_limit.max_tokens_per_window,
        config.rate_limit.window_secs
    );
    println!("  Iterations:   {}", config.orchestrator.max_iterations);
    println!("  Records:      {}", config.storage.dir.display());
    println!("  Gateway:      {}:{}", config.gateway.host, config.gateway.port);

    let url = format!("{}/status", gateway_base_url(&config));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;

    match client.get(&url).send().await {
        Ok(response) if response.status().is_success() => {
            let status: serde_json::Value = response.json().await?;
            println!();
            println!("  Gateway is running");
            println!("  Active tasks: {}", status["active_tasks"]);
            println!("  Rate limit:   {}", status["rate_limit"]);
        }
        Ok(response) => {
            println!();
            println!("  Gateway answered {}", response.status());
        }
        Err(_) => {
            println!();
            println!("  Gateway not reachable at {url}");
        }
    }

    Ok(())
}

/// Where a local client reaches the configured gateway.
fn gateway_base_url(config: &AppConfig) -> String {
    let host = match config.gateway.host.as_str() {
        "0.0.0.0" => "127.0.0.1",
        "::" => "[::1]",
        other => other,
    };
    format!("http://{host}:{}", config.gateway.port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_bind_is_reached_on_loopback() {
        let mut config = AppConfig::default();
        assert_eq!(gateway_base_url(&config), "http://127.0.0.1:8000");

        config.gateway.host = "0.0.0.0".into();
        config.gateway.port = 9000;
        assert_eq!(gateway_base_url(&config), "http://127.0.0.1:9000");
    }
}
