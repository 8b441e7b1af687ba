use crate::error::{DropsError, Result};
use crate::models::drops::*;
use crate::models::events::ProgressUpdate;
use crate::services::aggregator::{apply_mining_flags, refresh_counters, resort, Aggregator, GameView};
use crate::services::live_reconciler::{LiveReconciler, ProgressApplied};
use crate::services::queue_controller::{
    AdvanceOutcome, AdvanceTrigger, MineAllQueue, QueueController, QueueState, StartOutcome,
};
use crate::services::source_fetcher::DropsSnapshot;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use uuid::Uuid;

/// A drop ready to be claimed, with its claim token when one is known.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimableDrop {
    pub campaign_id: String,
    pub drop_id: String,
    pub drop_name: String,
    pub drop_instance_id: Option<String>,
}

/// Owner of the unified view, the live progress and the mine-all queue.
///
/// Every write goes through a named method here; callers hold the lock and
/// hand out clones as read snapshots.
pub struct DropsState {
    aggregator: Aggregator,
    campaigns: Vec<DropCampaign>,
    inventory: InventoryResponse,
    statistics: DropsStatistics,
    view: GameView,
    reconciler: LiveReconciler,
    queue: QueueController,
    last_refresh: Option<DateTime<Utc>>,
}

impl DropsState {
    pub fn new(favorite_games: Vec<String>) -> Self {
        Self {
            aggregator: Aggregator::new(favorite_games),
            campaigns: Vec::new(),
            inventory: InventoryResponse::default(),
            statistics: DropsStatistics::default(),
            view: GameView::default(),
            reconciler: LiveReconciler::new(),
            queue: QueueController::new(),
            last_refresh: None,
        }
    }

    pub fn view(&self) -> &GameView {
        &self.view
    }

    pub fn campaigns(&self) -> &[DropCampaign] {
        &self.campaigns
    }

    pub fn inventory(&self) -> &InventoryResponse {
        &self.inventory
    }

    pub fn statistics(&self) -> &DropsStatistics {
        &self.statistics
    }

    pub fn progress(&self) -> &[DropProgress] {
        self.reconciler.progress()
    }

    pub fn mining_status(&self) -> &MiningStatus {
        self.reconciler.mining_status()
    }

    pub fn queue_state(&self) -> &QueueState {
        self.queue.state()
    }

    pub fn active_queue(&self) -> Option<&MineAllQueue> {
        self.queue.queue()
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.last_refresh
    }

    pub fn set_favorite_games(&mut self, favorite_games: Vec<String>) {
        self.aggregator.set_favorite_games(favorite_games);
        self.rebuild_view();
    }

    /// Fold a fresh fetch into the state and rebuild the view. When every
    /// phase-1 source failed the previous state is kept untouched.
    pub fn apply_snapshot(&mut self, snapshot: DropsSnapshot) -> Result<()> {
        if snapshot.all_primary_sources_failed() {
            warn!("⚠️ Every drops source failed, keeping the previous view");
            return Err(DropsError::AllSourcesUnavailable);
        }

        self.campaigns = snapshot.campaigns;
        self.inventory = snapshot.inventory;
        self.statistics = snapshot.statistics;
        self.reconciler.index_campaigns(&self.campaigns);
        self.reconciler.merge_progress_snapshot(&snapshot.progress);
        if let Some(status) = snapshot.mining_status {
            self.reconciler.apply_mining_status(status);
        }

        self.rebuild_view();
        self.last_refresh = Some(Utc::now());
        Ok(())
    }

    fn rebuild_view(&mut self) {
        self.view = self.aggregator.rebuild(
            &self.campaigns,
            self.reconciler.progress(),
            &self.inventory,
            self.reconciler.mining_status(),
        );
    }

    /// Apply a minute tick, then patch the one drop it touches in the view.
    pub fn apply_progress_event(&mut self, event: &ProgressUpdate) -> ProgressApplied {
        let applied = self.reconciler.apply_progress_event(event);
        if let Some(entry) = self.reconciler.progress_for(&event.drop_id).cloned() {
            self.queue.note_campaign_activity(&entry.campaign_id);
            self.patch_view_progress(&entry);
        }
        apply_mining_flags(&mut self.view, self.reconciler.mining_status());
        resort(&mut self.view);
        applied
    }

    fn patch_view_progress(&mut self, entry: &DropProgress) {
        let progress = self.reconciler.progress();
        for game in self.view.games.values_mut() {
            let mut touched = false;
            for drop in game
                .active_campaigns
                .iter_mut()
                .flat_map(|c| c.time_based_drops.iter_mut())
                .filter(|d| d.id == entry.drop_id)
            {
                let was_claimed = drop.progress.as_ref().map(|p| p.is_claimed).unwrap_or(false);
                let mut patched = entry.clone();
                patched.is_claimed |= was_claimed;
                if patched.required_minutes_watched <= 0 {
                    patched.required_minutes_watched = drop.required_minutes_watched;
                }
                drop.progress = Some(patched);
                touched = true;
            }
            if touched {
                refresh_counters(game, progress);
            }
        }
    }

    /// Authoritative status push. Returns true when a mining flag changed.
    pub fn apply_mining_status(&mut self, status: MiningStatus) -> bool {
        self.reconciler.apply_mining_status(status);
        let changed = apply_mining_flags(&mut self.view, self.reconciler.mining_status());
        if changed {
            resort(&mut self.view);
        }
        changed
    }

    /// Optimistic local stop: no status, no in-flight progress.
    pub fn reset_session(&mut self) {
        self.reconciler.reset_session();
        if apply_mining_flags(&mut self.view, self.reconciler.mining_status()) {
            resort(&mut self.view);
        }
    }

    pub fn attach_claim_token(&mut self, drop_id: &str, drop_instance_id: &str) -> bool {
        let attached = self
            .reconciler
            .attach_claim_token(drop_id, drop_instance_id)
            .is_some();
        if !attached {
            debug!("Claim token for unknown drop {}", drop_id);
        }
        attached
    }

    pub fn claim_token(&self, drop_id: &str) -> Option<String> {
        self.reconciler
            .progress_for(drop_id)
            .and_then(|p| p.drop_instance_id.clone())
    }

    pub fn mark_claimed(&mut self, drop_id: &str) {
        self.reconciler.mark_claimed(drop_id, Utc::now());
        if let Some(entry) = self.reconciler.progress_for(drop_id).cloned() {
            self.patch_view_progress(&entry);
            resort(&mut self.view);
        }
    }

    /// Drops of one game that are complete and unclaimed, in display order.
    pub fn claimable_drops(&self, game_name: &str) -> Result<Vec<ClaimableDrop>> {
        let game = self
            .view
            .find_by_name(game_name)
            .ok_or_else(|| DropsError::UnknownGame(game_name.to_string()))?;

        Ok(game
            .active_campaigns
            .iter()
            .flat_map(|c| c.time_based_drops.iter().map(move |d| (c, d)))
            .filter(|(_, d)| d.is_time_gated())
            .filter(|(_, d)| d.progress.as_ref().map(|p| p.is_claimable()).unwrap_or(false))
            .map(|(c, d)| ClaimableDrop {
                campaign_id: c.id.clone(),
                drop_id: d.id.clone(),
                drop_name: d.display_name(),
                drop_instance_id: self
                    .claim_token(&d.id)
                    .or_else(|| d.progress.as_ref().and_then(|p| p.drop_instance_id.clone())),
            })
            .collect())
    }

    /// Plan a mine-all run over the game's active campaigns.
    pub fn start_queue(&mut self, game_name: &str) -> Result<StartOutcome> {
        let game = self
            .view
            .find_by_name(game_name)
            .ok_or_else(|| DropsError::UnknownGame(game_name.to_string()))?;
        let game_name = game.game_name.clone();
        let candidates = game.active_campaigns.clone();

        Ok(self.queue.start(
            &game_name,
            &candidates,
            self.reconciler.progress(),
            &self.inventory,
        ))
    }

    pub fn advance_queue(&mut self, trigger: &AdvanceTrigger) -> AdvanceOutcome {
        self.queue.advance(trigger)
    }

    pub fn advance_queue_from(&mut self, run_id: Uuid, index: usize, trigger: &AdvanceTrigger) -> AdvanceOutcome {
        self.queue.advance_from(run_id, index, trigger)
    }

    pub fn abort_queue(&mut self, reason: &str) -> Option<MineAllQueue> {
        self.queue.abort(reason)
    }

    /// Whether the live progress list shows the queued campaign finished.
    pub fn current_campaign_complete(&self) -> bool {
        self.queue
            .current_campaign_complete(&self.campaigns, self.reconciler.progress())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::*;

    fn snapshot(campaigns: Vec<DropCampaign>, progress: Vec<DropProgress>) -> DropsSnapshot {
        DropsSnapshot {
            campaigns,
            progress,
            mining_status: Some(MiningStatus::default()),
            ..DropsSnapshot::default()
        }
    }

    fn tick(drop_id: &str, current: i32, required: i32) -> ProgressUpdate {
        ProgressUpdate {
            drop_id: drop_id.to_string(),
            current_minutes: current,
            required_minutes: required,
            timestamp: ts(),
        }
    }

    #[test]
    fn test_failed_refresh_keeps_previous_view() {
        let mut state = DropsState::new(vec![]);
        state
            .apply_snapshot(snapshot(vec![campaign("c1", "Rust", &[("d1", 60)])], vec![]))
            .unwrap();

        let failed = DropsSnapshot {
            failed_sources: vec![
                crate::services::source_fetcher::DropsSource::Campaigns,
                crate::services::source_fetcher::DropsSource::Inventory,
                crate::services::source_fetcher::DropsSource::Statistics,
                crate::services::source_fetcher::DropsSource::MiningStatus,
            ],
            ..DropsSnapshot::default()
        };
        assert!(matches!(
            state.apply_snapshot(failed),
            Err(DropsError::AllSourcesUnavailable)
        ));
        assert!(state.view().find_by_name("Rust").is_some());
    }

    #[test]
    fn test_two_reward_scenario_counters() {
        let mut state = DropsState::new(vec![]);
        state
            .apply_snapshot(snapshot(
                vec![campaign("c1", "Game A", &[("reward1", 30), ("reward2", 60)])],
                vec![],
            ))
            .unwrap();

        state.apply_progress_event(&tick("reward1", 30, 30));
        state.apply_progress_event(&tick("reward2", 10, 60));

        let game = state.view().find_by_name("Game A").unwrap();
        assert_eq!(game.claimable_drops, 1);
        assert_eq!(game.drops_in_progress, 1);
        assert!(game.has_claimable);
        assert_eq!(
            state.mining_status().current_drop.as_ref().unwrap().drop_id,
            "reward2"
        );

        state.mark_claimed("reward1");
        let game = state.view().find_by_name("Game A").unwrap();
        assert_eq!(game.claimable_drops, 0);
        assert_eq!(
            state.mining_status().current_drop.as_ref().unwrap().drop_id,
            "reward2"
        );
    }

    #[test]
    fn test_refresh_does_not_regress_pushed_progress() {
        let mut state = DropsState::new(vec![]);
        let campaigns = vec![campaign("c1", "Rust", &[("d1", 60)])];
        state.apply_snapshot(snapshot(campaigns.clone(), vec![])).unwrap();
        state.apply_progress_event(&tick("d1", 40, 60));

        state
            .apply_snapshot(snapshot(campaigns, vec![drop_progress("c1", "d1", 25, 60)]))
            .unwrap();
        assert_eq!(state.progress()[0].current_minutes_watched, 40);
        let drop = &state.view().find_by_name("Rust").unwrap().active_campaigns[0].time_based_drops[0];
        assert_eq!(drop.progress.as_ref().unwrap().current_minutes_watched, 40);
    }

    #[test]
    fn test_claimable_drops_carry_tokens() {
        let mut state = DropsState::new(vec![]);
        state
            .apply_snapshot(snapshot(
                vec![campaign("c1", "Rust", &[("d1", 30), ("d2", 60)])],
                vec![drop_progress("c1", "d1", 30, 30), drop_progress("c1", "d2", 10, 60)],
            ))
            .unwrap();
        assert!(state.attach_claim_token("d1", "inst-1"));

        let claimable = state.claimable_drops("rust").unwrap();
        assert_eq!(claimable.len(), 1);
        assert_eq!(claimable[0].drop_id, "d1");
        assert_eq!(claimable[0].drop_instance_id.as_deref(), Some("inst-1"));

        assert!(matches!(
            state.claimable_drops("Halo"),
            Err(DropsError::UnknownGame(_))
        ));
    }

    #[test]
    fn test_status_push_sets_mining_flag() {
        let mut state = DropsState::new(vec![]);
        state
            .apply_snapshot(snapshot(
                vec![
                    campaign("c1", "Rust", &[("d1", 30)]),
                    campaign("c2", "Halo", &[("d2", 30)]),
                ],
                vec![],
            ))
            .unwrap();

        assert!(state.apply_mining_status(mining_status_for("Halo", "d2", 3, 30)));
        assert!(state.view().find_by_name("Halo").unwrap().is_mining);

        state.reset_session();
        assert!(!state.view().find_by_name("Halo").unwrap().is_mining);
        assert!(state.progress().is_empty());
    }

    #[test]
    fn test_queue_uses_view_candidates() {
        let mut state = DropsState::new(vec![]);
        let mut done = drop_progress("C1", "c1-d1", 60, 60);
        done.is_claimed = true;
        state
            .apply_snapshot(snapshot(
                vec![
                    campaign("C1", "Rust", &[("c1-d1", 60)]),
                    campaign("C2", "Rust", &[("c2-d1", 100)]),
                    campaign("C3", "Rust", &[("c3-d1", 60)]),
                ],
                vec![done, drop_progress("C2", "c2-d1", 80, 100), drop_progress("C3", "c3-d1", 0, 60)],
            ))
            .unwrap();

        match state.start_queue("rust").unwrap() {
            StartOutcome::Started { order, campaign_id, .. } => {
                assert_eq!(order, vec!["C2".to_string(), "C3".to_string()]);
                assert_eq!(campaign_id, "C2");
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        assert!(!state.current_campaign_complete());
        state.apply_progress_event(&tick("c2-d1", 100, 100));
        assert!(state.current_campaign_complete());
    }
}
