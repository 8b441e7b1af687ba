use crate::error::{DropsError, Result};
use crate::models::drops::*;
use crate::services::drops_backend::DropsBackend;
use log::{debug, error, warn};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropsSource {
    Campaigns,
    Inventory,
    Statistics,
    MiningStatus,
    Progress,
}

impl fmt::Display for DropsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropsSource::Campaigns => write!(f, "campaigns"),
            DropsSource::Inventory => write!(f, "inventory"),
            DropsSource::Statistics => write!(f, "statistics"),
            DropsSource::MiningStatus => write!(f, "mining-status"),
            DropsSource::Progress => write!(f, "progress"),
        }
    }
}

const PHASE_ONE: [DropsSource; 4] = [
    DropsSource::Campaigns,
    DropsSource::Inventory,
    DropsSource::Statistics,
    DropsSource::MiningStatus,
];

/// Everything one refresh pulled from the backend. Failed sources hold their
/// empty default and are listed in `failed_sources`.
#[derive(Debug, Clone, Default)]
pub struct DropsSnapshot {
    pub campaigns: Vec<DropCampaign>,
    pub inventory: InventoryResponse,
    pub statistics: DropsStatistics,
    /// `None` when the status fetch failed, so callers keep what they had.
    pub mining_status: Option<MiningStatus>,
    pub progress: Vec<DropProgress>,
    pub failed_sources: Vec<DropsSource>,
}

impl DropsSnapshot {
    pub fn source_failed(&self, source: DropsSource) -> bool {
        self.failed_sources.contains(&source)
    }

    pub fn all_primary_sources_failed(&self) -> bool {
        PHASE_ONE.iter().all(|s| self.source_failed(*s))
    }
}

/// Fail-soft wrapper over the remote drops operations.
#[derive(Clone)]
pub struct SourceFetcher {
    backend: Arc<dyn DropsBackend>,
}

impl SourceFetcher {
    pub fn new(backend: Arc<dyn DropsBackend>) -> Self {
        Self { backend }
    }

    /// Two-phase fetch. Phase 1 runs campaigns, inventory, statistics and
    /// mining status together; progress is only requested once phase 1 is
    /// done, because the campaigns fetch is what refreshes the backend's
    /// progress map.
    pub async fn fetch_snapshot(&self) -> DropsSnapshot {
        let mut failed = Vec::new();

        let (campaigns, inventory, statistics, mining_status) = tokio::join!(
            self.backend.fetch_campaigns(),
            self.backend.fetch_inventory(),
            self.backend.fetch_statistics(),
            self.backend.fetch_mining_status(),
        );

        let campaigns = soften(DropsSource::Campaigns, campaigns, &mut failed).unwrap_or_default();
        let inventory = soften(DropsSource::Inventory, inventory, &mut failed).unwrap_or_default();
        let statistics =
            soften(DropsSource::Statistics, statistics, &mut failed).unwrap_or_default();
        let mining_status = soften(DropsSource::MiningStatus, mining_status, &mut failed);

        let progress = self.backend.fetch_progress().await;
        let progress = soften(DropsSource::Progress, progress, &mut failed).unwrap_or_default();

        debug!(
            "📦 Fetched {} campaigns, {} inventory items, {} progress entries ({} sources failed)",
            campaigns.len(),
            inventory.items.len(),
            progress.len(),
            failed.len()
        );

        DropsSnapshot {
            campaigns,
            inventory,
            statistics,
            mining_status,
            progress,
            failed_sources: failed,
        }
    }

    pub async fn fetch_mining_status(&self) -> Option<MiningStatus> {
        let mut failed = Vec::new();
        soften(
            DropsSource::MiningStatus,
            self.backend.fetch_mining_status().await,
            &mut failed,
        )
    }

    /// Channel picker data; an unreachable backend just means no channels.
    pub async fn fetch_eligible_channels(&self, campaign_id: &str) -> Vec<MiningChannel> {
        match self.backend.fetch_eligible_channels(campaign_id).await {
            Ok(channels) => channels,
            Err(e) => {
                warn!("⚠️ Failed to fetch eligible channels for {}: {}", campaign_id, e);
                Vec::new()
            }
        }
    }

    pub async fn start_campaign_mining(
        &self,
        campaign_id: &str,
        channel_id: Option<&str>,
    ) -> Result<()> {
        self.backend
            .start_campaign_mining(campaign_id, channel_id)
            .await
            .map_err(|e| {
                error!("❌ Failed to start mining campaign {}: {}", campaign_id, e);
                DropsError::command("start_campaign_mining", e)
            })
    }

    pub async fn stop_mining(&self) -> Result<()> {
        self.backend.stop_mining().await.map_err(|e| {
            error!("❌ Failed to stop mining: {}", e);
            DropsError::command("stop_mining", e)
        })
    }

    pub async fn claim_drop(&self, drop_id: &str, drop_instance_id: Option<&str>) -> Result<()> {
        self.backend
            .claim_drop(drop_id, drop_instance_id)
            .await
            .map_err(|e| {
                error!("❌ Failed to claim drop {}: {}", drop_id, e);
                DropsError::command("claim_drop", e)
            })
    }
}

fn soften<T>(
    source: DropsSource,
    result: anyhow::Result<T>,
    failed: &mut Vec<DropsSource>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("⚠️ Drops source {} unavailable, using empty data: {}", source, e);
            failed.push(source);
            None
        }
    }
}
