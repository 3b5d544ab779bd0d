//! `prepwise init`: write the default config and optionally seed tiers.

use prepwise_config::AppConfig;
use prepwise_tools::{TOOLS_ENABLED_KEY, save_enabled_tool_ids};
use std::path::Path;

use crate::app::App;

pub async fn run(config_path: Option<&Path>, seed: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));

    println!("Prepwise setup");
    println!("==============\n");

    if config_path.exists() {
        println!("  Config already exists at: {}", config_path.display());
    } else {
        if let Some(dir) = config_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("  Created {}", config_path.display());
    }

    if !seed {
        println!("\n  Next: set primary models under [tiers.*], then run `prepwise init --seed`.");
        return Ok(());
    }

    let mut config = AppConfig::load_from(&config_path)?;
    config.apply_env_overrides();
    let app = App::build(config).await?;
    let seeded = seed_settings(&app).await?;
    println!("\n  Seeded {seeded} tier(s) into the settings store.");
    Ok(())
}

/// Write tier seeds and the tool allow-list. An existing allow-list is kept.
pub async fn seed_settings(app: &App) -> Result<usize, Box<dyn std::error::Error>> {
    let seeds = app.config.tier_seeds();
    for seed in &seeds {
        app.tiers.set_tier_config(seed.tier, seed.clone()).await?;
        println!(
            "  {:<7} {} / {}",
            seed.tier.as_str(),
            seed.provider,
            seed.primary_model.as_deref().unwrap_or("(unset)")
        );
    }

    if app.stores.settings.get(TOOLS_ENABLED_KEY).await?.is_none() {
        save_enabled_tool_ids(app.stores.settings.as_ref(), &app.config.tools.enabled).await?;
        println!("  tools.enabled = {:?}", app.config.tools.enabled);
    }
    Ok(seeds.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Stores;
    use prepwise_config::{StorageBackend, TierSeed};
    use prepwise_core::tier::Tier;

    #[tokio::test]
    async fn seeds_tiers_and_default_tools() {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.tiers.insert(
            "high".into(),
            TierSeed {
                primary_model: Some("openai/gpt-4o".into()),
                ..TierSeed::default()
            },
        );
        let app = App::with_stores(config, Stores::in_memory()).unwrap();

        assert_eq!(seed_settings(&app).await.unwrap(), 1);
        let high = app.tiers.get_tier_config(Tier::High).await.unwrap();
        assert_eq!(high.primary_model.as_deref(), Some("openai/gpt-4o"));
        assert!(app.stores.settings.get(TOOLS_ENABLED_KEY).await.unwrap().is_some());
    }
}
