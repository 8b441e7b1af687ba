use crate::models::drops::UnifiedGame;
use crate::models::events::NewFavoriteCampaigns;
use crate::services::kv_store::KeyValueStore;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub const FAVORITE_CACHE_KEY: &str = "favorite_campaign_cache";

/// Last-seen campaign ids per favorited game, keyed by lowercased name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FavoriteCampaignCache {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl FavoriteCampaignCache {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn campaigns_for(&self, game_name: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(&game_name.to_lowercase())
    }

    pub fn insert(&mut self, game_name: &str, campaign_ids: BTreeSet<String>) {
        self.entries.insert(game_name.to_lowercase(), campaign_ids);
    }

    /// Unparseable blobs count as an empty cache; the next diff just reseeds.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(cache) => cache,
            Err(e) => {
                warn!("⚠️ Favorite campaign cache is unreadable, reseeding: {}", e);
                Self::default()
            }
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Compare favorited games against the cache. Returns one notification per
/// game with new campaigns, plus the cache to persist (always the full
/// current mapping).
///
/// An empty cache, or a game the cache has never seen, only seeds.
pub fn diff_favorites<'a>(
    games: impl IntoIterator<Item = &'a UnifiedGame>,
    cache: &FavoriteCampaignCache,
) -> (Vec<NewFavoriteCampaigns>, FavoriteCampaignCache) {
    let mut notifications = Vec::new();
    let mut next = FavoriteCampaignCache::default();

    for game in games.into_iter().filter(|g| g.is_favorite) {
        let current: BTreeSet<String> = game.active_campaigns.iter().map(|c| c.id.clone()).collect();

        if let Some(seen) = cache.campaigns_for(&game.game_name) {
            let new_names: Vec<String> = game
                .active_campaigns
                .iter()
                .filter(|c| !seen.contains(&c.id))
                .map(|c| c.name.clone())
                .collect();

            if !new_names.is_empty() {
                notifications.push(NewFavoriteCampaigns {
                    game_name: game.game_name.clone(),
                    image_url: game.box_art_url.clone(),
                    count: new_names.len(),
                    campaign_names: new_names,
                });
            }
        } else if !cache.is_empty() {
            debug!("Seeding favorite cache for {}", game.game_name);
        }

        next.insert(&game.game_name, current);
    }

    (notifications, next)
}

/// Runs the favorite diff against persisted state.
pub struct FavoriteNotifier {
    store: Arc<dyn KeyValueStore>,
}

impl FavoriteNotifier {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn load_cache(&self) -> FavoriteCampaignCache {
        match self.store.load(FAVORITE_CACHE_KEY) {
            Ok(Some(bytes)) => FavoriteCampaignCache::from_bytes(&bytes),
            Ok(None) => FavoriteCampaignCache::default(),
            Err(e) => {
                warn!("⚠️ Failed to load favorite campaign cache: {}", e);
                FavoriteCampaignCache::default()
            }
        }
    }

    /// Load, diff, save. Callers serialize calls; a failed save is logged
    /// and the notifications are still returned.
    pub fn check<'a>(&self, games: impl IntoIterator<Item = &'a UnifiedGame>) -> Vec<NewFavoriteCampaigns> {
        let cache = self.load_cache();
        let (notifications, next) = diff_favorites(games, &cache);

        match next.to_bytes() {
            Ok(bytes) => {
                if let Err(e) = self.store.save(FAVORITE_CACHE_KEY, &bytes) {
                    warn!("⚠️ Failed to save favorite campaign cache: {}", e);
                }
            }
            Err(e) => warn!("⚠️ Failed to serialize favorite campaign cache: {}", e),
        }

        for notification in &notifications {
            info!(
                "🆕 {} new campaign(s) for favorite {}",
                notification.count, notification.game_name
            );
        }
        notifications
    }
}
