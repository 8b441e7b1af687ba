use crate::services::cache_service;
use anyhow::Result;
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::Path;

const SETTINGS_FILE: &str = "drops_settings.json";

/// Recovery thresholds the mining backend enforces. The core only carries them.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RecoverySettings {
    pub stale_progress_minutes: u32,    // No progress for this long = stale channel
    pub streamer_blacklist_minutes: u32, // How long a bad streamer stays skipped
    pub campaign_deprioritize_failures: u32,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            stale_progress_minutes: 7,
            streamer_blacklist_minutes: 10,
            campaign_deprioritize_failures: 3,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DropsSettings {
    pub auto_claim_drops: bool,
    pub notify_on_new_favorite_campaigns: bool,
    pub favorite_games: Vec<String>,
    pub check_interval_seconds: u64,
    pub queue_settle_delay_ms: u64,
    pub claim_all_delay_ms: u64, // Claims are rate limited remotely
    pub diagnostics_enabled: bool,
    pub recovery: RecoverySettings,
}

impl Default for DropsSettings {
    fn default() -> Self {
        Self {
            auto_claim_drops: true,
            notify_on_new_favorite_campaigns: true,
            favorite_games: vec![],
            check_interval_seconds: 60,
            queue_settle_delay_ms: 2000,
            claim_all_delay_ms: 500,
            diagnostics_enabled: true,
            recovery: RecoverySettings::default(),
        }
    }
}

impl DropsSettings {
    pub fn is_favorite(&self, game_name: &str) -> bool {
        self.favorite_games
            .iter()
            .any(|g| g.eq_ignore_ascii_case(game_name))
    }

    /// Load settings from the app data directory, defaulting on any failure.
    pub fn load() -> Self {
        match cache_service::get_app_data_dir() {
            Ok(dir) => Self::load_from(&dir.join(SETTINGS_FILE)),
            Err(e) => {
                warn!("⚠️ No app data directory, using default drops settings: {}", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|json| serde_json::from_str::<Self>(&json).map_err(anyhow::Error::from))
        {
            Ok(settings) => settings,
            Err(e) => {
                warn!("⚠️ Failed to read {}, using defaults: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
