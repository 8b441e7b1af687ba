//! Drops core: merges campaign, progress and inventory data into one
//! per-game view, applies live pushes to it and drives mine-all runs.

pub mod error;
pub mod models;
pub mod services;

pub use error::{DropsError, Result};
pub use models::drops::{
    DropCampaign, DropProgress, InventoryResponse, MiningStatus, TimeBasedDrop, UnifiedGame,
};
pub use models::events::{CoreEvent, NewFavoriteCampaigns, ProgressUpdate, PushEvent};
pub use models::settings::DropsSettings;
pub use services::aggregator::{Aggregator, GameView};
pub use services::drops_backend::DropsBackend;
pub use services::drops_manager::DropsManager;
pub use services::kv_store::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use services::queue_controller::{QueueState, StartOutcome};
