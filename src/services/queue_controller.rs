use crate::models::drops::*;
use crate::services::aggregator::ProgressIndex;
use log::{debug, info, warn};
use uuid::Uuid;

/// Score for campaigns with no progress record at all, below a started 0%.
pub const NO_PROGRESS_SCORE: f32 = -1.0;

/// An ordered run of campaigns for one game.
#[derive(Debug, Clone, PartialEq)]
pub struct MineAllQueue {
    pub run_id: Uuid,
    pub game_name: String,
    pub campaign_ids: Vec<String>,
    pub current_index: usize,
    /// Set after a locally triggered advance: the backend may still report
    /// the job it was running as complete, and that report is not about the
    /// campaign now at `current_index`.
    pub expect_stale_completion: bool,
}

impl MineAllQueue {
    pub fn current_campaign_id(&self) -> Option<&str> {
        self.campaign_ids.get(self.current_index).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueueState {
    Idle,
    Running(MineAllQueue),
    Completed {
        game_name: String,
        mined_campaigns: usize,
        nothing_to_do: bool,
    },
    Aborted {
        game_name: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceTrigger {
    /// Backend reported the running job finished.
    MiningComplete { game_name: String },
    /// Every drop of the current campaign is complete in the live progress list.
    CampaignProgressComplete,
    /// Backend found no channel to watch for the current campaign.
    NoEligibleChannels,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    NothingToDo,
    Started {
        run_id: Uuid,
        campaign_id: String,
        order: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    Next { run_id: Uuid, campaign_id: String },
    Completed { game_name: String, mined_campaigns: usize },
    Ignored,
}

fn drop_is_done(drop: &TimeBasedDrop, sources: &[&DropProgress]) -> bool {
    sources.iter().any(|p| p.is_claimed)
        || sources
            .first()
            .map(|p| p.current_minutes_watched >= drop.required_minutes_watched)
            .unwrap_or(false)
}

/// A campaign is complete when every watch-gated drop is complete or claimed.
/// Progress is looked up in the inventory, then the live list, then the drop.
pub(crate) fn campaign_is_complete(campaign: &DropCampaign, index: &ProgressIndex) -> bool {
    campaign
        .time_based_drops
        .iter()
        .filter(|d| d.is_time_gated())
        .all(|drop| {
            let sources: Vec<&DropProgress> = [
                index.from_inventory(campaign, &drop.id),
                index.live(&drop.id),
                drop.progress.as_ref(),
            ]
            .into_iter()
            .flatten()
            .collect();
            drop_is_done(drop, &sources)
        })
}

/// Highest completion percentage among unclaimed drops, taking the better of
/// the inventory and live figures. `NO_PROGRESS_SCORE` when neither has data.
pub(crate) fn campaign_progress_score(campaign: &DropCampaign, index: &ProgressIndex) -> f32 {
    campaign
        .time_based_drops
        .iter()
        .filter(|d| d.is_time_gated())
        .filter_map(|drop| {
            let inventory = index.from_inventory(campaign, &drop.id);
            let live = index.live(&drop.id);
            if inventory.or(live).is_none() || [inventory, live].iter().flatten().any(|p| p.is_claimed) {
                return None;
            }
            [inventory, live]
                .into_iter()
                .flatten()
                .map(|p| percentage(p.current_minutes_watched, drop.required_minutes_watched))
                .reduce(f32::max)
        })
        .fold(NO_PROGRESS_SCORE, f32::max)
}

/// Drop complete candidates and order the rest by progress, furthest first.
/// Ties keep the caller's order.
pub fn plan_queue(
    candidates: &[DropCampaign],
    progress: &[DropProgress],
    inventory: &InventoryResponse,
) -> Vec<String> {
    let index = ProgressIndex::new(progress, inventory);
    let mut scored: Vec<(&DropCampaign, f32)> = candidates
        .iter()
        .filter(|c| {
            let complete = campaign_is_complete(c, &index);
            if complete {
                debug!("⏭️ Skipping complete campaign {} ({})", c.name, c.id);
            }
            !complete
        })
        .map(|c| (c, campaign_progress_score(c, &index)))
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.into_iter().map(|(c, _)| c.id.clone()).collect()
}

/// State machine behind "mine all campaigns for a game".
#[derive(Debug)]
pub struct QueueController {
    state: QueueState,
}

impl Default for QueueController {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueController {
    pub fn new() -> Self {
        Self {
            state: QueueState::Idle,
        }
    }

    pub fn state(&self) -> &QueueState {
        &self.state
    }

    pub fn queue(&self) -> Option<&MineAllQueue> {
        match &self.state {
            QueueState::Running(queue) => Some(queue),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.queue().is_some()
    }

    /// Plan a run over `candidates`. Replaces any run in progress.
    pub fn start(
        &mut self,
        game_name: &str,
        candidates: &[DropCampaign],
        progress: &[DropProgress],
        inventory: &InventoryResponse,
    ) -> StartOutcome {
        let order = plan_queue(candidates, progress, inventory);

        let Some(first) = order.first().cloned() else {
            info!("✅ Nothing left to mine for {}", game_name);
            self.state = QueueState::Completed {
                game_name: game_name.to_string(),
                mined_campaigns: 0,
                nothing_to_do: true,
            };
            return StartOutcome::NothingToDo;
        };

        let queue = MineAllQueue {
            run_id: Uuid::new_v4(),
            game_name: game_name.to_string(),
            campaign_ids: order.clone(),
            current_index: 0,
            expect_stale_completion: false,
        };
        info!(
            "⛏️ Mine-all for {}: {} of {} campaigns queued",
            game_name,
            order.len(),
            candidates.len()
        );
        let run_id = queue.run_id;
        self.state = QueueState::Running(queue);

        StartOutcome::Started {
            run_id,
            campaign_id: first,
            order,
        }
    }

    /// Move to the next campaign, or finish when the queue is exhausted.
    pub fn advance(&mut self, trigger: &AdvanceTrigger) -> AdvanceOutcome {
        let QueueState::Running(queue) = &mut self.state else {
            return AdvanceOutcome::Ignored;
        };

        if let AdvanceTrigger::MiningComplete { game_name } = trigger {
            if !game_name.is_empty() && !game_name.eq_ignore_ascii_case(&queue.game_name) {
                debug!(
                    "Ignoring mining-complete for {} while mining {}",
                    game_name, queue.game_name
                );
                return AdvanceOutcome::Ignored;
            }
            if queue.expect_stale_completion {
                queue.expect_stale_completion = false;
                debug!(
                    "Ignoring mining-complete for the job replaced at {}/{}",
                    queue.current_index + 1,
                    queue.campaign_ids.len()
                );
                return AdvanceOutcome::Ignored;
            }
        }

        let run_id = queue.run_id;
        let index = queue.current_index;
        self.advance_from(run_id, index, trigger)
    }

    /// Advance only if the run and position still match what the caller saw.
    /// Delayed triggers use this so they never act on a queue that moved on.
    pub fn advance_from(&mut self, run_id: Uuid, index: usize, trigger: &AdvanceTrigger) -> AdvanceOutcome {
        let QueueState::Running(queue) = &mut self.state else {
            return AdvanceOutcome::Ignored;
        };
        if queue.run_id != run_id || queue.current_index != index {
            debug!("Ignoring stale advance ({:?}) for an older queue position", trigger);
            return AdvanceOutcome::Ignored;
        }

        queue.current_index += 1;
        queue.expect_stale_completion = matches!(trigger, AdvanceTrigger::CampaignProgressComplete);
        debug!(
            "⏩ Advancing mine-all for {} ({:?}) to {}/{}",
            queue.game_name,
            trigger,
            queue.current_index + 1,
            queue.campaign_ids.len()
        );

        match queue.current_campaign_id().map(str::to_string) {
            Some(campaign_id) => AdvanceOutcome::Next { run_id, campaign_id },
            None => {
                let game_name = queue.game_name.clone();
                let mined_campaigns = queue.campaign_ids.len();
                info!("🏁 Mine-all finished for {}", game_name);
                self.state = QueueState::Completed {
                    game_name: game_name.clone(),
                    mined_campaigns,
                    nothing_to_do: false,
                };
                AdvanceOutcome::Completed {
                    game_name,
                    mined_campaigns,
                }
            }
        }
    }

    /// True when the live progress list shows the current campaign done.
    pub fn current_campaign_complete(&self, campaigns: &[DropCampaign], progress: &[DropProgress]) -> bool {
        let Some(campaign_id) = self.queue().and_then(|q| q.current_campaign_id()) else {
            return false;
        };
        let Some(campaign) = campaigns.iter().find(|c| c.id == campaign_id) else {
            return false;
        };

        campaign
            .time_based_drops
            .iter()
            .filter(|d| d.is_time_gated())
            .all(|drop| {
                progress
                    .iter()
                    .find(|p| p.drop_id == drop.id)
                    .map(|p| p.is_claimed || p.is_complete())
                    .unwrap_or(false)
            })
    }

    /// Progress for the current campaign shows its job is running, so any
    /// completion from now on is about it.
    pub fn note_campaign_activity(&mut self, campaign_id: &str) {
        if let QueueState::Running(queue) = &mut self.state {
            if queue.current_campaign_id() == Some(campaign_id) {
                queue.expect_stale_completion = false;
            }
        }
    }

    /// Discard the run. Returns the queue that was running, if any.
    pub fn abort(&mut self, reason: &str) -> Option<MineAllQueue> {
        let QueueState::Running(queue) = std::mem::replace(&mut self.state, QueueState::Idle) else {
            return None;
        };
        warn!("🛑 Mine-all for {} aborted: {}", queue.game_name, reason);
        self.state = QueueState::Aborted {
            game_name: queue.game_name.clone(),
            reason: reason.to_string(),
        };
        Some(queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::*;

    fn three_campaigns() -> (Vec<DropCampaign>, Vec<DropProgress>) {
        let campaigns = vec![
            campaign("C1", "Rust", &[("c1-d1", 60)]),
            campaign("C2", "Rust", &[("c2-d1", 100)]),
            campaign("C3", "Rust", &[("c3-d1", 60)]),
        ];
        let mut c1_done = drop_progress("C1", "c1-d1", 60, 60);
        c1_done.is_claimed = true;
        let progress = vec![
            c1_done,
            drop_progress("C2", "c2-d1", 80, 100),
            drop_progress("C3", "c3-d1", 0, 60),
        ];
        (campaigns, progress)
    }

    #[test]
    fn test_queue_skip_law() {
        let (campaigns, progress) = three_campaigns();
        let mut controller = QueueController::new();
        let outcome = controller.start("Rust", &campaigns, &progress, &InventoryResponse::default());

        match outcome {
            StartOutcome::Started { campaign_id, order, .. } => {
                assert_eq!(campaign_id, "C2");
                assert_eq!(order, vec!["C2", "C3"]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_unstarted_campaigns_sort_after_zero_percent() {
        let campaigns = vec![
            campaign("fresh", "Rust", &[("f1", 60)]),
            campaign("zero", "Rust", &[("z1", 60)]),
            campaign("half", "Rust", &[("h1", 60)]),
        ];
        let progress = vec![drop_progress("zero", "z1", 0, 60)];
        let mut half = campaigns[2].clone();
        embed_progress(&mut half, "h1", 30, false);
        let inventory = InventoryResponse {
            items: vec![inventory_item(&half, CampaignStatus::Active)],
            completed_drops: vec![],
        };

        assert_eq!(plan_queue(&campaigns, &progress, &inventory), vec!["half", "zero", "fresh"]);
    }

    #[test]
    fn test_score_takes_higher_of_inventory_and_live() {
        let listed = campaign("c1", "Rust", &[("d1", 100)]);
        let mut inventory_copy = listed.clone();
        embed_progress(&mut inventory_copy, "d1", 20, false);
        let inventory = InventoryResponse {
            items: vec![inventory_item(&inventory_copy, CampaignStatus::Active)],
            completed_drops: vec![],
        };
        let progress = vec![drop_progress("c1", "d1", 70, 100)];

        let index = ProgressIndex::new(&progress, &inventory);
        assert_eq!(campaign_progress_score(&listed, &index), 70.0);

        let empty = InventoryResponse::default();
        let index = ProgressIndex::new(&[], &empty);
        assert_eq!(campaign_progress_score(&listed, &index), NO_PROGRESS_SCORE);
    }

    #[test]
    fn test_inventory_claim_marks_campaign_complete() {
        let listed = campaign("c1", "Rust", &[("d1", 60), ("gift", 0)]);
        let mut inventory_copy = listed.clone();
        embed_progress(&mut inventory_copy, "d1", 60, true);
        let inventory = InventoryResponse {
            items: vec![inventory_item(&inventory_copy, CampaignStatus::Active)],
            completed_drops: vec![],
        };
        // The live list lags behind the inventory
        let progress = vec![drop_progress("c1", "d1", 45, 60)];

        let index = ProgressIndex::new(&progress, &inventory);
        assert!(campaign_is_complete(&listed, &index));
    }

    #[test]
    fn test_all_complete_means_nothing_to_do() {
        let mut done = campaign("c1", "Rust", &[("d1", 60)]);
        embed_progress(&mut done, "d1", 60, true);

        let mut controller = QueueController::new();
        let outcome = controller.start("Rust", &[done], &[], &InventoryResponse::default());
        assert_eq!(outcome, StartOutcome::NothingToDo);
        assert!(matches!(
            controller.state(),
            QueueState::Completed { nothing_to_do: true, .. }
        ));
    }

    #[test]
    fn test_queue_terminates_within_len_steps() {
        let campaigns: Vec<DropCampaign> = (0..5)
            .map(|i| campaign(&format!("c{}", i), "Rust", &[(format!("d{}", i).as_str(), 60)]))
            .collect();
        let mut controller = QueueController::new();
        controller.start("Rust", &campaigns, &[], &InventoryResponse::default());

        let mut steps = 0;
        loop {
            steps += 1;
            match controller.advance(&AdvanceTrigger::NoEligibleChannels) {
                AdvanceOutcome::Next { .. } => assert!(steps < campaigns.len()),
                AdvanceOutcome::Completed { mined_campaigns, .. } => {
                    assert_eq!(mined_campaigns, 5);
                    break;
                }
                AdvanceOutcome::Ignored => panic!("advance ignored while running"),
            }
        }
        assert!(steps <= campaigns.len());
        assert_eq!(controller.advance(&AdvanceTrigger::NoEligibleChannels), AdvanceOutcome::Ignored);
    }

    #[test]
    fn test_stale_advance_is_ignored_after_restart() {
        let (campaigns, progress) = three_campaigns();
        let mut controller = QueueController::new();
        let StartOutcome::Started { run_id: old_run, .. } =
            controller.start("Rust", &campaigns, &progress, &InventoryResponse::default())
        else {
            panic!("expected a run");
        };

        // A different queue starts before the delayed trigger fires
        let halo = vec![campaign("H1", "Halo", &[("h1", 60)]), campaign("H2", "Halo", &[("h2", 60)])];
        controller.start("Halo", &halo, &[], &InventoryResponse::default());

        let outcome = controller.advance_from(old_run, 0, &AdvanceTrigger::CampaignProgressComplete);
        assert_eq!(outcome, AdvanceOutcome::Ignored);
        assert_eq!(controller.queue().unwrap().current_campaign_id(), Some("H1"));
    }

    #[test]
    fn test_mining_complete_for_other_game_is_ignored() {
        let (campaigns, progress) = three_campaigns();
        let mut controller = QueueController::new();
        controller.start("Rust", &campaigns, &progress, &InventoryResponse::default());

        let other = AdvanceTrigger::MiningComplete {
            game_name: "Halo".into(),
        };
        assert_eq!(controller.advance(&other), AdvanceOutcome::Ignored);

        let same = AdvanceTrigger::MiningComplete {
            game_name: "rust".into(),
        };
        assert!(matches!(controller.advance(&same), AdvanceOutcome::Next { ref campaign_id, .. } if campaign_id == "C3"));
    }

    #[test]
    fn test_completion_of_replaced_job_is_ignored_once() {
        let (campaigns, progress) = three_campaigns();
        let mut controller = QueueController::new();
        let StartOutcome::Started { run_id, .. } =
            controller.start("Rust", &campaigns, &progress, &InventoryResponse::default())
        else {
            panic!("expected a run");
        };
        controller.advance_from(run_id, 0, &AdvanceTrigger::CampaignProgressComplete);
        assert_eq!(controller.queue().unwrap().current_campaign_id(), Some("C3"));

        // The backend reports the C2 job it was running as finished
        let complete = AdvanceTrigger::MiningComplete {
            game_name: "Rust".into(),
        };
        assert_eq!(controller.advance(&complete), AdvanceOutcome::Ignored);
        assert_eq!(controller.queue().unwrap().current_campaign_id(), Some("C3"));

        assert!(matches!(controller.advance(&complete), AdvanceOutcome::Completed { .. }));
    }

    #[test]
    fn test_activity_on_new_campaign_clears_stale_expectation() {
        let (campaigns, progress) = three_campaigns();
        let mut controller = QueueController::new();
        let StartOutcome::Started { run_id, .. } =
            controller.start("Rust", &campaigns, &progress, &InventoryResponse::default())
        else {
            panic!("expected a run");
        };
        controller.advance_from(run_id, 0, &AdvanceTrigger::CampaignProgressComplete);

        controller.note_campaign_activity("C2");
        assert!(controller.queue().unwrap().expect_stale_completion);
        controller.note_campaign_activity("C3");
        assert!(!controller.queue().unwrap().expect_stale_completion);

        let complete = AdvanceTrigger::MiningComplete {
            game_name: "Rust".into(),
        };
        assert!(matches!(controller.advance(&complete), AdvanceOutcome::Completed { .. }));
    }

    #[test]
    fn test_current_campaign_complete_uses_live_progress() {
        let (campaigns, mut progress) = three_campaigns();
        let mut controller = QueueController::new();
        controller.start("Rust", &campaigns, &progress, &InventoryResponse::default());
        assert!(!controller.current_campaign_complete(&campaigns, &progress));

        progress[1].current_minutes_watched = 100;
        assert!(controller.current_campaign_complete(&campaigns, &progress));
    }

    #[test]
    fn test_abort_discards_queue() {
        let (campaigns, progress) = three_campaigns();
        let mut controller = QueueController::new();
        controller.start("Rust", &campaigns, &progress, &InventoryResponse::default());

        let queue = controller.abort("user stopped").unwrap();
        assert_eq!(queue.game_name, "Rust");
        assert!(!controller.is_running());
        assert!(matches!(controller.state(), QueueState::Aborted { .. }));
        assert!(controller.abort("again").is_none());
    }
}
