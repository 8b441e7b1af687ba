//! Fixtures and a scripted backend shared by the service tests.

use crate::models::drops::*;
use crate::services::drops_backend::DropsBackend;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

pub fn ts() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
}

/// Campaign with one time-based drop per `(id, required_minutes)`.
pub fn campaign(id: &str, game: &str, drops: &[(&str, i32)]) -> DropCampaign {
    DropCampaign {
        id: id.to_string(),
        name: format!("{} campaign {}", game, id),
        game_id: format!("g-{}", game.to_lowercase()),
        game_name: game.to_string(),
        game_image_url: format!("https://img.example/{}.jpg", game.to_lowercase()),
        description: String::new(),
        image_url: String::new(),
        start_at: ts() - chrono::Duration::days(1),
        end_at: ts() + chrono::Duration::days(7),
        time_based_drops: drops
            .iter()
            .map(|(drop_id, required)| TimeBasedDrop {
                id: drop_id.to_string(),
                name: format!("Drop {}", drop_id),
                required_minutes_watched: *required,
                benefit_edges: vec![DropBenefit {
                    id: format!("b-{}", drop_id),
                    name: format!("Reward {}", drop_id),
                    image_url: String::new(),
                }],
                progress: None,
            })
            .collect(),
        is_account_connected: true,
    }
}

pub fn drop_progress(campaign_id: &str, drop_id: &str, current: i32, required: i32) -> DropProgress {
    DropProgress {
        campaign_id: campaign_id.to_string(),
        drop_id: drop_id.to_string(),
        current_minutes_watched: current,
        required_minutes_watched: required,
        is_claimed: false,
        last_updated: ts(),
        drop_instance_id: None,
    }
}

/// Sets the progress carried on the drop itself.
pub fn embed_progress(campaign: &mut DropCampaign, drop_id: &str, current: i32, claimed: bool) {
    let campaign_id = campaign.id.clone();
    let drop = campaign
        .time_based_drops
        .iter_mut()
        .find(|d| d.id == drop_id)
        .unwrap_or_else(|| panic!("no drop {} in {}", drop_id, campaign_id));
    let mut progress = drop_progress(&campaign_id, drop_id, current, drop.required_minutes_watched);
    progress.is_claimed = claimed;
    drop.progress = Some(progress);
}

/// Inventory entry for `campaign`, with counters derived from its embedded progress.
pub fn inventory_item(campaign: &DropCampaign, status: CampaignStatus) -> InventoryItem {
    let embedded = || campaign.time_based_drops.iter().filter_map(|d| d.progress.as_ref());
    InventoryItem {
        campaign: campaign.clone(),
        status,
        total_drops: campaign.time_based_drops.len() as i32,
        claimed_drops: embedded().filter(|p| p.is_claimed).count() as i32,
        drops_in_progress: embedded().filter(|p| p.is_in_progress()).count() as i32,
    }
}

pub fn mining_status_for(game: &str, drop_id: &str, current: i32, required: i32) -> MiningStatus {
    let mut drop = CurrentDropInfo {
        drop_id: drop_id.to_string(),
        drop_name: format!("Reward {}", drop_id),
        campaign_name: format!("{} campaign", game),
        game_name: game.to_string(),
        current_minutes: 0,
        required_minutes: required,
        progress_percentage: 0.0,
        estimated_completion: None,
    };
    drop.set_minutes(current, required, ts());

    MiningStatus {
        is_mining: true,
        current_channel: Some(MiningChannel {
            id: "chan-1".into(),
            name: "streamer".into(),
            game_id: format!("g-{}", game.to_lowercase()),
            game_name: game.to_string(),
            viewers: 1200,
            drops_enabled: true,
            is_online: true,
            is_acl_based: false,
        }),
        current_campaign: Some(format!("{} campaign", game)),
        current_campaign_id: None,
        current_drop: Some(drop),
        eligible_channels: Vec::new(),
        last_update: ts(),
    }
}

#[derive(Default)]
struct ScriptState {
    campaigns: Vec<DropCampaign>,
    progress: Vec<DropProgress>,
    inventory: InventoryResponse,
    statistics: DropsStatistics,
    mining_status: MiningStatus,
    channels: Vec<MiningChannel>,
    failures: HashSet<String>,
    calls: Vec<String>,
    started: Vec<(String, Option<String>)>,
    claimed: Vec<(String, Option<String>)>,
}

/// Backend whose answers are set up front. Every call is recorded by name and
/// fails when that name was passed to `fail`.
#[derive(Default)]
pub struct ScriptedBackend {
    state: Mutex<ScriptState>,
}

impl ScriptedBackend {
    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(call.to_string());
        if state.failures.contains(call) {
            return Err(anyhow!("{} failed (scripted)", call));
        }
        Ok(())
    }

    pub fn set_campaigns(&self, campaigns: Vec<DropCampaign>) {
        self.lock().campaigns = campaigns;
    }

    pub fn set_progress(&self, progress: Vec<DropProgress>) {
        self.lock().progress = progress;
    }

    pub fn set_inventory(&self, inventory: InventoryResponse) {
        self.lock().inventory = inventory;
    }

    pub fn set_statistics(&self, statistics: DropsStatistics) {
        self.lock().statistics = statistics;
    }

    pub fn set_mining_status(&self, status: MiningStatus) {
        self.lock().mining_status = status;
    }

    pub fn set_channels(&self, channels: Vec<MiningChannel>) {
        self.lock().channels = channels;
    }

    pub fn fail(&self, call: &str) {
        self.lock().failures.insert(call.to_string());
    }

    pub fn recover(&self, call: &str) {
        self.lock().failures.remove(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, call: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.as_str() == call).count()
    }

    pub fn started_campaigns(&self) -> Vec<String> {
        self.lock().started.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn started_with_channels(&self) -> Vec<(String, Option<String>)> {
        self.lock().started.clone()
    }

    pub fn claimed_drops(&self) -> Vec<(String, Option<String>)> {
        self.lock().claimed.clone()
    }
}

#[async_trait]
impl DropsBackend for ScriptedBackend {
    async fn fetch_campaigns(&self) -> Result<Vec<DropCampaign>> {
        self.record("fetch_campaigns")?;
        Ok(self.lock().campaigns.clone())
    }

    async fn fetch_progress(&self) -> Result<Vec<DropProgress>> {
        self.record("fetch_progress")?;
        Ok(self.lock().progress.clone())
    }

    async fn fetch_inventory(&self) -> Result<InventoryResponse> {
        self.record("fetch_inventory")?;
        Ok(self.lock().inventory.clone())
    }

    async fn fetch_statistics(&self) -> Result<DropsStatistics> {
        self.record("fetch_statistics")?;
        Ok(self.lock().statistics.clone())
    }

    async fn fetch_mining_status(&self) -> Result<MiningStatus> {
        self.record("fetch_mining_status")?;
        Ok(self.lock().mining_status.clone())
    }

    async fn fetch_eligible_channels(&self, _campaign_id: &str) -> Result<Vec<MiningChannel>> {
        self.record("fetch_eligible_channels")?;
        Ok(self.lock().channels.clone())
    }

    async fn start_campaign_mining(&self, campaign_id: &str, channel_id: Option<&str>) -> Result<()> {
        self.record("start_campaign_mining")?;
        self.lock()
            .started
            .push((campaign_id.to_string(), channel_id.map(str::to_string)));
        Ok(())
    }

    async fn stop_mining(&self) -> Result<()> {
        self.record("stop_mining")
    }

    async fn claim_drop(&self, drop_id: &str, drop_instance_id: Option<&str>) -> Result<()> {
        self.record("claim_drop")?;
        self.lock()
            .claimed
            .push((drop_id.to_string(), drop_instance_id.map(str::to_string)));
        Ok(())
    }
}
