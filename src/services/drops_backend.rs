use crate::models::drops::*;
use anyhow::Result;
use async_trait::async_trait;

/// Remote drops operations. The transport (GQL, IPC, a local mining service)
/// lives behind this trait; timeouts and retries are its business.
#[async_trait]
pub trait DropsBackend: Send + Sync {
    /// Fetching campaigns is what makes the backend refresh its progress map,
    /// so it must complete before `fetch_progress` is called.
    async fn fetch_campaigns(&self) -> Result<Vec<DropCampaign>>;

    async fn fetch_progress(&self) -> Result<Vec<DropProgress>>;

    async fn fetch_inventory(&self) -> Result<InventoryResponse>;

    async fn fetch_statistics(&self) -> Result<DropsStatistics>;

    async fn fetch_mining_status(&self) -> Result<MiningStatus>;

    async fn fetch_eligible_channels(&self, campaign_id: &str) -> Result<Vec<MiningChannel>>;

    async fn start_campaign_mining(&self, campaign_id: &str, channel_id: Option<&str>)
        -> Result<()>;

    /// Idempotent.
    async fn stop_mining(&self) -> Result<()>;

    /// Idempotent for drops that are already claimed.
    async fn claim_drop(&self, drop_id: &str, drop_instance_id: Option<&str>) -> Result<()>;
}
