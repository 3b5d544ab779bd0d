//! Administrator tool allow-list, stored under a settings key.

use prepwise_core::error::StoreError;
use prepwise_core::store::SettingsStore;
use std::collections::HashSet;
use tracing::debug;

pub const TOOLS_ENABLED_KEY: &str = "tools.enabled";

/// The enabled tool ids. An absent setting falls back to `defaults`.
pub async fn load_enabled_tool_ids(
    settings: &dyn SettingsStore,
    defaults: &[String],
) -> Result<HashSet<String>, StoreError> {
    match settings.get(TOOLS_ENABLED_KEY).await? {
        Some(value) => {
            let ids: Vec<String> =
                serde_json::from_value(value).map_err(|e| StoreError::Malformed {
                    key: TOOLS_ENABLED_KEY.into(),
                    reason: e.to_string(),
                })?;
            Ok(ids.into_iter().collect())
        }
        None => {
            debug!("No stored tool allow-list, using configured defaults");
            Ok(defaults.iter().cloned().collect())
        }
    }
}

pub async fn save_enabled_tool_ids(
    settings: &dyn SettingsStore,
    ids: &[String],
) -> Result<(), StoreError> {
    settings
        .set(TOOLS_ENABLED_KEY, serde_json::json!(ids))
        .await
}
