use crate::models::drops::*;
use log::debug;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Unified per-game view plus the display order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GameView {
    pub games: BTreeMap<String, UnifiedGame>,
    pub order: Vec<String>,
}

impl GameView {
    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// Games in display order.
    pub fn ordered(&self) -> impl Iterator<Item = &UnifiedGame> {
        self.order.iter().filter_map(|key| self.games.get(key))
    }

    pub fn get(&self, key: &str) -> Option<&UnifiedGame> {
        self.games.get(key)
    }

    pub fn find_by_name(&self, game_name: &str) -> Option<&UnifiedGame> {
        self.games
            .values()
            .find(|g| g.game_name.eq_ignore_ascii_case(game_name))
    }

    pub fn find_by_name_mut(&mut self, game_name: &str) -> Option<&mut UnifiedGame> {
        self.games
            .values_mut()
            .find(|g| g.game_name.eq_ignore_ascii_case(game_name))
    }

    pub fn find_campaign(&self, campaign_id: &str) -> Option<(&UnifiedGame, &DropCampaign)> {
        self.games.values().find_map(|g| g.find_campaign(campaign_id).map(|c| (g, c)))
    }

    pub fn total_campaigns(&self) -> usize {
        self.games.values().map(|g| g.active_campaigns.len()).sum()
    }
}

/// Lookup tables over the progress list and inventory for one pass.
pub(crate) struct ProgressIndex<'a> {
    live: HashMap<&'a str, &'a DropProgress>,
    inventory_by_id: HashMap<&'a str, &'a InventoryItem>,
    inventory_by_name: HashMap<String, &'a InventoryItem>,
}

impl<'a> ProgressIndex<'a> {
    pub(crate) fn new(progress: &'a [DropProgress], inventory: &'a InventoryResponse) -> Self {
        let live = progress.iter().map(|p| (p.drop_id.as_str(), p)).collect();
        let inventory_by_id = inventory
            .items
            .iter()
            .map(|item| (item.campaign.id.as_str(), item))
            .collect();
        let mut inventory_by_name = HashMap::new();
        for item in &inventory.items {
            inventory_by_name
                .entry(item.campaign.name.to_lowercase())
                .or_insert(item);
        }
        Self {
            live,
            inventory_by_id,
            inventory_by_name,
        }
    }

    pub(crate) fn has_live_progress(&self) -> bool {
        !self.live.is_empty()
    }

    pub(crate) fn live(&self, drop_id: &str) -> Option<&'a DropProgress> {
        self.live.get(drop_id).copied()
    }

    /// Inventory copy of a campaign, by id first and then by case-insensitive name.
    pub(crate) fn inventory_item(&self, campaign: &DropCampaign) -> Option<&'a InventoryItem> {
        self.inventory_by_id
            .get(campaign.id.as_str())
            .or_else(|| self.inventory_by_name.get(&campaign.name.to_lowercase()))
            .copied()
    }

    pub(crate) fn from_inventory(
        &self,
        campaign: &DropCampaign,
        drop_id: &str,
    ) -> Option<&'a DropProgress> {
        self.inventory_item(campaign)?
            .campaign
            .time_based_drops
            .iter()
            .find(|d| d.id == drop_id)?
            .progress
            .as_ref()
    }

    /// Progress list, then inventory, then the drop's own copy; first match wins.
    /// `is_claimed` is sticky across all three.
    pub(crate) fn resolve(&self, campaign: &DropCampaign, drop: &TimeBasedDrop) -> Option<DropProgress> {
        let live = self.live(&drop.id);
        let inventory = self.from_inventory(campaign, &drop.id);
        let embedded = drop.progress.as_ref();

        let mut resolved = live.or(inventory).or(embedded)?.clone();
        resolved.is_claimed = [live, inventory, embedded]
            .iter()
            .flatten()
            .any(|p| p.is_claimed);
        if resolved.campaign_id.is_empty() {
            resolved.campaign_id = campaign.id.clone();
        }
        if resolved.drop_id.is_empty() {
            resolved.drop_id = drop.id.clone();
        }
        if resolved.required_minutes_watched <= 0 {
            resolved.required_minutes_watched = drop.required_minutes_watched;
        }
        Some(resolved)
    }
}

pub struct Aggregator {
    favorite_games: Vec<String>,
}

impl Aggregator {
    pub fn new(favorite_games: Vec<String>) -> Self {
        Self { favorite_games }
    }

    pub fn set_favorite_games(&mut self, favorite_games: Vec<String>) {
        self.favorite_games = favorite_games;
    }

    fn is_favorite(&self, game_name: &str) -> bool {
        self.favorite_games
            .iter()
            .any(|g| g.eq_ignore_ascii_case(game_name))
    }

    /// Merge campaigns, the progress list and the inventory into a fresh view.
    /// Pure: identical inputs give an identical view.
    pub fn rebuild(
        &self,
        campaigns: &[DropCampaign],
        progress: &[DropProgress],
        inventory: &InventoryResponse,
        mining_status: &MiningStatus,
    ) -> GameView {
        let index = ProgressIndex::new(progress, inventory);
        let mut games: BTreeMap<String, UnifiedGame> = BTreeMap::new();

        for campaign in campaigns {
            let mut annotated = campaign.clone();
            for drop in annotated.time_based_drops.iter_mut() {
                drop.progress = index.resolve(campaign, drop);
            }

            let game = games
                .entry(campaign.game_key())
                .or_insert_with(|| empty_game(campaign));
            if game.box_art_url.is_empty() {
                game.box_art_url = campaign.game_image_url.clone();
            }
            game.active_campaigns.push(annotated);
        }

        for item in &inventory.items {
            let game = games
                .entry(item.campaign.game_key())
                .or_insert_with(|| empty_game(&item.campaign));
            game.inventory_items.push(item.clone());
        }

        let mining_game = mining_status.mining_game_name();
        for game in games.values_mut() {
            game.is_favorite = self.is_favorite(&game.game_name);
            game.is_mining = mining_game
                .map(|name| name.eq_ignore_ascii_case(&game.game_name))
                .unwrap_or(false);
            refresh_counters(game, progress);
        }

        let mut view = GameView {
            games,
            order: Vec::new(),
        };
        resort(&mut view);

        debug!(
            "🧮 Rebuilt drops view: {} games, {} campaigns",
            view.games.len(),
            view.total_campaigns()
        );
        view
    }
}

fn empty_game(campaign: &DropCampaign) -> UnifiedGame {
    UnifiedGame {
        key: campaign.game_key(),
        game_id: campaign.game_id.clone(),
        game_name: campaign.game_name.clone(),
        box_art_url: campaign.game_image_url.clone(),
        active_campaigns: Vec::new(),
        inventory_items: Vec::new(),
        total_active_drops: 0,
        drops_in_progress: 0,
        claimable_drops: 0,
        has_claimable: false,
        is_fully_claimed: false,
        is_mining: false,
        is_favorite: false,
    }
}

/// Recompute the derived counters of one game from its annotated campaigns.
///
/// `is_fully_claimed` counts claims from the progress list only, because
/// inventory counters can claim completion before the progress map has
/// populated. With an empty list (early loads) it falls back to the
/// progress embedded on each drop.
pub fn refresh_counters(game: &mut UnifiedGame, progress: &[DropProgress]) {
    let live: HashMap<&str, &DropProgress> =
        progress.iter().map(|p| (p.drop_id.as_str(), p)).collect();

    let mut total = 0;
    let mut in_progress = 0;
    let mut claimable = 0;
    let mut claimed = 0;

    for drop in game.active_campaigns.iter().flat_map(|c| &c.time_based_drops) {
        total += 1;
        if let Some(p) = &drop.progress {
            if drop.is_time_gated() && p.is_in_progress() {
                in_progress += 1;
            }
            if drop.is_time_gated() && p.is_claimable() {
                claimable += 1;
            }
        }

        let is_claimed = if live.is_empty() {
            drop.progress.as_ref().map(|p| p.is_claimed).unwrap_or(false)
        } else {
            live.get(drop.id.as_str()).map(|p| p.is_claimed).unwrap_or(false)
        };
        if is_claimed {
            claimed += 1;
        }
    }

    game.total_active_drops = total;
    game.drops_in_progress = in_progress;
    game.claimable_drops = claimable;
    game.has_claimable = claimable > 0;
    game.is_fully_claimed = total > 0 && claimed == total;
}

/// Set `is_mining` from the current status. Returns true when any flag changed.
pub fn apply_mining_flags(view: &mut GameView, mining_status: &MiningStatus) -> bool {
    let mining_game = mining_status.mining_game_name();
    let mut changed = false;
    for game in view.games.values_mut() {
        let is_mining = mining_game
            .map(|name| name.eq_ignore_ascii_case(&game.game_name))
            .unwrap_or(false);
        if game.is_mining != is_mining {
            game.is_mining = is_mining;
            changed = true;
        }
    }
    changed
}

/// Favorites, then the mined game, then unfinished games, then games with
/// something to claim, then more campaigns, then name.
pub fn resort(view: &mut GameView) {
    let mut keys: Vec<&UnifiedGame> = view.games.values().collect();
    keys.sort_by(|a, b| compare_games(a, b));
    view.order = keys.into_iter().map(|g| g.key.clone()).collect();
}

fn compare_games(a: &UnifiedGame, b: &UnifiedGame) -> Ordering {
    b.is_favorite
        .cmp(&a.is_favorite)
        .then(b.is_mining.cmp(&a.is_mining))
        .then(a.is_fully_claimed.cmp(&b.is_fully_claimed))
        .then(b.has_claimable.cmp(&a.has_claimable))
        .then(b.active_campaigns.len().cmp(&a.active_campaigns.len()))
        .then_with(|| a.game_name.to_lowercase().cmp(&b.game_name.to_lowercase()))
        .then_with(|| a.key.cmp(&b.key))
}
