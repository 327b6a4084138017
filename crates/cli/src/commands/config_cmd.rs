//! `chatdesk config`: configuration management commands.

use std::path::Path;

use chatdesk_config::AppConfig;

pub fn default() {
    print!("{}", AppConfig::default_toml());
}

pub fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    println!("{}", toml::to_string_pretty(&redacted(config))?);
    Ok(())
}

pub fn path(config_path: Option<&Path>) {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    println!("{}", path.display());
}

pub fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load_with(config_path) {
        Ok(config) => {
            println!("   Config parsed and validated");
            if !config.has_api_key() {
                println!("   Warning: no API key set (CHATDESK_API_KEY, GEMINI_API_KEY, or OPENAI_API_KEY)");
            }
            println!();
            println!("   Provider:  {}", config.provider);
            println!("   Model:     {}", config.model);
            println!("   Gateway:   {}:{}", config.gateway.host, config.gateway.port);
            println!("   Store:     {}", config.store.backend);
            println!("   Units:     {}", config.business.units.join(", "));
            Ok(())
        }
        Err(e) => {
            println!("   Config error: {e}");
            Err(e.into())
        }
    }
}

fn redacted(mut config: AppConfig) -> AppConfig {
    const MASK: &str = "***";
    if config.api_key.is_some() {
        config.api_key = Some(MASK.into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some(MASK.into());
        }
    }
    config
}
