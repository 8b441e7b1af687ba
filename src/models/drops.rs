use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropCampaign {
    pub id: String,
    pub name: String,
    pub game_id: String,
    pub game_name: String,
    #[serde(default)]
    pub game_image_url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub time_based_drops: Vec<TimeBasedDrop>,
    #[serde(default)]
    pub is_account_connected: bool,
}

impl DropCampaign {
    /// Key used to group campaigns and inventory under one game.
    pub fn game_key(&self) -> String {
        game_key(&self.game_id, &self.game_name)
    }
}

/// Games are keyed by id when the backend knows it, otherwise by lowercased name.
pub fn game_key(game_id: &str, game_name: &str) -> String {
    if game_id.is_empty() {
        format!("name:{}", game_name.to_lowercase())
    } else {
        game_id.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBasedDrop {
    pub id: String,
    pub name: String,
    /// Zero means the drop is unlocked by something other than watching
    /// (events, gifts, subscriptions) and never completes by mining.
    pub required_minutes_watched: i32,
    pub benefit_edges: Vec<DropBenefit>,
    #[serde(default)]
    pub progress: Option<DropProgress>,
}

impl TimeBasedDrop {
    pub fn is_time_gated(&self) -> bool {
        self.required_minutes_watched > 0
    }

    /// Benefit name when there is one; drop names are often generic.
    pub fn display_name(&self) -> String {
        self.benefit_edges
            .first()
            .map(|b| b.name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropBenefit {
    pub id: String,
    pub name: String,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropProgress {
    pub campaign_id: String,
    pub drop_id: String,
    pub current_minutes_watched: i32,
    pub required_minutes_watched: i32,
    pub is_claimed: bool,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub drop_instance_id: Option<String>,
}

impl DropProgress {
    pub fn is_complete(&self) -> bool {
        self.required_minutes_watched > 0
            && self.current_minutes_watched >= self.required_minutes_watched
    }

    pub fn is_claimable(&self) -> bool {
        self.is_complete() && !self.is_claimed
    }

    pub fn is_in_progress(&self) -> bool {
        !self.is_claimed
            && self.current_minutes_watched > 0
            && self.current_minutes_watched < self.required_minutes_watched
    }

    pub fn percentage(&self) -> f32 {
        percentage(self.current_minutes_watched, self.required_minutes_watched)
    }
}

/// Watch percentage capped at 100; zero-minute drops report 0.
pub fn percentage(current: i32, required: i32) -> f32 {
    if required <= 0 {
        return 0.0;
    }
    ((current.max(0) as f32 / required as f32) * 100.0).min(100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    #[default]
    Active,
    Upcoming,
    Expired,
}

/// One campaign the user has history with, as reported by the inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub campaign: DropCampaign,
    pub status: CampaignStatus,
    pub total_drops: i32,
    pub claimed_drops: i32,
    pub drops_in_progress: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedDrop {
    pub id: String,
    pub name: String,
    pub image_url: String,
    pub game_name: Option<String>,
    pub last_awarded_at: Option<DateTime<Utc>>,
    pub total_count: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InventoryResponse {
    pub items: Vec<InventoryItem>,
    pub completed_drops: Vec<CompletedDrop>,
}

impl InventoryResponse {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.completed_drops.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimedDrop {
    pub id: String,
    pub campaign_id: String,
    pub drop_id: String,
    pub drop_name: String,
    pub game_name: String,
    pub benefit_name: String,
    pub benefit_image_url: String,
    pub claimed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DropsStatistics {
    pub total_drops_claimed: i32,
    pub active_campaigns: i32,
    pub drops_in_progress: i32,
    pub recent_claims: Vec<ClaimedDrop>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningChannel {
    pub id: String,
    pub name: String,
    pub game_id: String,
    pub game_name: String,
    pub viewers: i32,
    pub drops_enabled: bool,
    pub is_online: bool,
    pub is_acl_based: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentDropInfo {
    pub drop_id: String,
    pub drop_name: String,
    pub campaign_name: String,
    pub game_name: String,
    pub current_minutes: i32,
    pub required_minutes: i32,
    pub progress_percentage: f32,
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl CurrentDropInfo {
    pub fn is_complete(&self) -> bool {
        self.required_minutes > 0 && self.current_minutes >= self.required_minutes
    }

    pub fn percentage(&self) -> f32 {
        percentage(self.current_minutes, self.required_minutes)
    }

    /// Applies new minute counts and refreshes the derived fields.
    pub fn set_minutes(&mut self, current: i32, required: i32, now: DateTime<Utc>) {
        self.current_minutes = current;
        if required > 0 {
            self.required_minutes = required;
        }
        self.progress_percentage = self.percentage();
        self.estimated_completion = if self.current_minutes > 0 && !self.is_complete() {
            let remaining = (self.required_minutes - self.current_minutes) as i64;
            Some(now + chrono::Duration::minutes(remaining))
        } else {
            None
        };
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningStatus {
    pub is_mining: bool,
    pub current_channel: Option<MiningChannel>,
    pub current_campaign: Option<String>,
    #[serde(default)]
    pub current_campaign_id: Option<String>,
    pub current_drop: Option<CurrentDropInfo>,
    #[serde(default)]
    pub eligible_channels: Vec<MiningChannel>,
    pub last_update: DateTime<Utc>,
}

impl Default for MiningStatus {
    fn default() -> Self {
        Self {
            is_mining: false,
            current_channel: None,
            current_campaign: None,
            current_campaign_id: None,
            current_drop: None,
            eligible_channels: Vec::new(),
            last_update: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl MiningStatus {
    /// Name of the game being mined, if any.
    pub fn mining_game_name(&self) -> Option<&str> {
        if !self.is_mining {
            return None;
        }
        self.current_drop
            .as_ref()
            .map(|d| d.game_name.as_str())
            .filter(|n| !n.is_empty())
            .or_else(|| self.current_channel.as_ref().map(|c| c.game_name.as_str()))
    }
}

/// The per-game view shown to the user, rebuilt on every aggregation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedGame {
    pub key: String,
    pub game_id: String,
    pub game_name: String,
    pub box_art_url: String,
    pub active_campaigns: Vec<DropCampaign>,
    pub inventory_items: Vec<InventoryItem>,
    pub total_active_drops: usize,
    pub drops_in_progress: usize,
    pub claimable_drops: usize,
    pub has_claimable: bool,
    pub is_fully_claimed: bool,
    pub is_mining: bool,
    pub is_favorite: bool,
}

impl UnifiedGame {
    pub fn find_campaign(&self, campaign_id: &str) -> Option<&DropCampaign> {
        self.active_campaigns.iter().find(|c| c.id == campaign_id)
    }
}
