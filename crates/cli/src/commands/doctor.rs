//! `chatdesk doctor`: diagnose configuration, provider, and store.

use std::path::Path;

use chatdesk_config::AppConfig;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("chatdesk doctor");
    println!("===============\n");

    let mut issues = 0;

    let file = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    if file.exists() {
        println!("  [ok]   Config file found at {}", file.display());
    } else {
        println!("  [info] No config file at {}, using defaults", file.display());
    }

    let config = match AppConfig::load_with(config_path) {
        Ok(config) => {
            println!("  [ok]   Configuration valid");
            config
        }
        Err(e) => {
            println!("  [fail] Configuration invalid: {e}");
            println!();
            println!("  1 issue found. Fix the configuration and run doctor again.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  [ok]   API key configured for '{}'", config.provider);
    } else {
        println!("  [warn] No API key for '{}' (set CHATDESK_API_KEY)", config.provider);
        issues += 1;
    }

    match chatdesk_providers::router::build_from_config(&config) {
        Ok(provider) => {
            println!("  [ok]   Provider {} ready (model {})", provider.name(), provider.model());
            match provider.health_check().await {
                Ok(true) => println!("  [ok]   Provider reachable"),
                Ok(false) => {
                    println!("  [warn] Provider did not report healthy");
                    issues += 1;
                }
                Err(e) => {
                    println!("  [warn] Provider unreachable: {e}");
                    issues += 1;
                }
            }
        }
        Err(e) => {
            println!("  [fail] Provider could not be built: {e}");
            issues += 1;
        }
    }

    match chatdesk_store::open(&config.store).await {
        Ok(store) => match store.count().await {
            Ok(n) => println!("  [ok]   {} store open ({n} sessions)", store.name()),
            Err(e) => {
                println!("  [fail] {} store unreadable: {e}", store.name());
                issues += 1;
            }
        },
        Err(e) => {
            println!("  [fail] Store could not be opened: {e}");
            issues += 1;
        }
    }

    println!("  [info] Business units: {}", config.business.units.join(", "));

    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
