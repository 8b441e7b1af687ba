use crate::error::{DropsError, Result};
use crate::models::drops::*;
use crate::models::events::{CoreEvent, PushEvent};
use crate::models::settings::DropsSettings;
use crate::services::aggregator::GameView;
use crate::services::cache_service;
use crate::services::drops_backend::DropsBackend;
use crate::services::drops_state::DropsState;
use crate::services::favorite_notifier::FavoriteNotifier;
use crate::services::kv_store::{FileKeyValueStore, KeyValueStore};
use crate::services::queue_controller::{AdvanceOutcome, AdvanceTrigger, QueueState, StartOutcome};
use crate::services::diagnostic_logger::{init_logging, is_diagnostics_enabled, set_diagnostics_enabled};
use crate::services::source_fetcher::{DropsSource, SourceFetcher};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

const CORE_EVENT_CAPACITY: usize = 128;
const PUSH_EVENT_CAPACITY: usize = 256;

/// Async front of the drops core: runs fetches and commands, feeds push
/// events into the state in arrival order and broadcasts what changed.
///
/// Lock order is `command_lock` then `state`; the state lock is never held
/// across a remote call.
#[derive(Clone)]
pub struct DropsManager {
    fetcher: SourceFetcher,
    state: Arc<Mutex<DropsState>>,
    settings: Arc<RwLock<DropsSettings>>,
    notifier: Arc<Mutex<FavoriteNotifier>>,
    events: broadcast::Sender<CoreEvent>,
    command_lock: Arc<Mutex<()>>,
    settle_pending: Arc<Mutex<Option<(Uuid, usize)>>>,
    refresh_running: Arc<RwLock<bool>>,
}

impl DropsManager {
    pub fn new(
        backend: Arc<dyn DropsBackend>,
        store: Arc<dyn KeyValueStore>,
        settings: DropsSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(CORE_EVENT_CAPACITY);
        Self {
            fetcher: SourceFetcher::new(backend),
            state: Arc::new(Mutex::new(DropsState::new(settings.favorite_games.clone()))),
            settings: Arc::new(RwLock::new(settings)),
            notifier: Arc::new(Mutex::new(FavoriteNotifier::new(store))),
            events,
            command_lock: Arc::new(Mutex::new(())),
            settle_pending: Arc::new(Mutex::new(None)),
            refresh_running: Arc::new(RwLock::new(false)),
        }
    }

    /// Settings and favorite cache from the app data directory. Also installs
    /// the logger at the saved diagnostics level.
    pub fn from_app_data(backend: Arc<dyn DropsBackend>) -> Result<Self> {
        let settings = DropsSettings::load();
        set_diagnostics_enabled(settings.diagnostics_enabled);
        init_logging();

        let state_dir =
            cache_service::get_drops_state_dir().map_err(|e| DropsError::Storage(e.to_string()))?;
        let store = Arc::new(FileKeyValueStore::new(state_dir));
        Ok(Self::new(backend, store, settings))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: CoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn emit_command_failed(&self, err: &DropsError) {
        if let DropsError::CommandFailed { command, message } = err {
            self.emit(CoreEvent::CommandFailed {
                command: command.clone(),
                message: message.clone(),
            });
        }
    }

    pub async fn settings(&self) -> DropsSettings {
        self.settings.read().await.clone()
    }

    pub async fn update_settings(&self, settings: DropsSettings) {
        let favorites = settings.favorite_games.clone();
        set_diagnostics_enabled(settings.diagnostics_enabled);
        *self.settings.write().await = settings;
        self.state.lock().await.set_favorite_games(favorites);
    }

    pub async fn game_view(&self) -> GameView {
        self.state.lock().await.view().clone()
    }

    pub async fn mining_status(&self) -> MiningStatus {
        self.state.lock().await.mining_status().clone()
    }

    pub async fn progress(&self) -> Vec<DropProgress> {
        self.state.lock().await.progress().to_vec()
    }

    pub async fn statistics(&self) -> DropsStatistics {
        self.state.lock().await.statistics().clone()
    }

    pub async fn queue_state(&self) -> QueueState {
        self.state.lock().await.queue_state().clone()
    }

    async fn publish_status(&self) {
        let status = self.mining_status().await;
        self.emit(CoreEvent::MiningStatusUpdate(status));
    }

    /// Two-phase fetch, rebuild, favorite diff. Fails only when every
    /// phase-1 source failed; the previous view is kept in that case.
    ///
    /// The favorite diff is skipped when the campaign list failed, so the
    /// cache never forgets campaigns that were merely not fetched.
    pub async fn refresh(&self) -> Result<()> {
        let snapshot = self.fetcher.fetch_snapshot().await;
        let campaigns_failed = snapshot.source_failed(DropsSource::Campaigns);

        let favorites: Vec<UnifiedGame> = {
            let mut state = self.state.lock().await;
            state.apply_snapshot(snapshot)?;
            state.view().ordered().filter(|g| g.is_favorite).cloned().collect()
        };
        self.publish_status().await;

        if campaigns_failed {
            debug!("Campaign fetch failed, skipping favorite check");
        } else {
            let notifications = self.notifier.lock().await.check(&favorites);
            if self.settings.read().await.notify_on_new_favorite_campaigns {
                for notification in notifications {
                    self.emit(CoreEvent::NewFavoriteCampaigns(notification));
                }
            }
        }

        self.maybe_schedule_settle_advance().await;
        Ok(())
    }

    async fn refresh_mining_status(&self) {
        if let Some(status) = self.fetcher.fetch_mining_status().await {
            self.state.lock().await.apply_mining_status(status);
            self.publish_status().await;
        }
    }

    /// Apply one push event. Errors are surfaced as core events, not returned.
    pub async fn handle_push_event(&self, event: PushEvent) {
        if is_diagnostics_enabled() {
            debug!("📨 Push event: {:?}", event);
        } else {
            debug!("📨 Push event: {}", event.name());
        }
        match event {
            PushEvent::MiningStatusUpdate(status) => {
                self.state.lock().await.apply_mining_status(status);
                self.publish_status().await;
                self.maybe_schedule_settle_advance().await;
            }
            PushEvent::ProgressUpdate(update) => {
                self.state.lock().await.apply_progress_event(&update);
                self.publish_status().await;
                self.maybe_schedule_settle_advance().await;
            }
            PushEvent::MiningComplete { game_name, reason } => {
                info!("✅ Mining complete for {}: {}", game_name, reason);
                self.advance(AdvanceTrigger::MiningComplete { game_name }).await;
            }
            PushEvent::MiningStoppedNoChannels { reason } => {
                warn!("📺 Mining stopped, no eligible channels: {}", reason);
                self.advance(AdvanceTrigger::NoEligibleChannels).await;
            }
            PushEvent::ClaimReady {
                drop_id,
                drop_instance_id,
            } => {
                self.state
                    .lock()
                    .await
                    .attach_claim_token(&drop_id, &drop_instance_id);
                if self.settings.read().await.auto_claim_drops {
                    if let Err(e) = self.claim_drop(&drop_id).await {
                        warn!("⚠️ Auto-claim of {} failed: {}", drop_id, e);
                    }
                }
            }
        }
    }

    /// Consume push events in arrival order until every sender is dropped.
    pub fn run_event_loop(&self, mut events: mpsc::Receiver<PushEvent>) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                manager.handle_push_event(event).await;
            }
            debug!("Push event loop finished");
        })
    }

    pub fn spawn_event_loop(&self) -> (mpsc::Sender<PushEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(PUSH_EVENT_CAPACITY);
        (tx, self.run_event_loop(rx))
    }

    /// Start a mine-all run for one game.
    pub async fn start_mine_all(&self, game_name: &str) -> Result<StartOutcome> {
        let _guard = self.command_lock.lock().await;
        let outcome = self.state.lock().await.start_queue(game_name)?;
        *self.settle_pending.lock().await = None;

        let StartOutcome::Started { campaign_id, .. } = &outcome else {
            self.emit(CoreEvent::MineAllFinished {
                game_name: game_name.to_string(),
                mined_campaigns: 0,
                nothing_to_do: true,
            });
            return Ok(outcome);
        };

        if let Err(e) = self.fetcher.stop_mining().await {
            warn!("⚠️ Ignoring stop failure before mine-all: {}", e);
        }
        if let Err(e) = self.fetcher.start_campaign_mining(campaign_id, None).await {
            self.abort_after_failed_start(&e).await;
            return Err(e);
        }

        self.refresh_mining_status().await;
        Ok(outcome)
    }

    async fn advance(&self, trigger: AdvanceTrigger) {
        let _guard = self.command_lock.lock().await;
        let outcome = self.state.lock().await.advance_queue(&trigger);
        self.follow_advance(outcome).await;
    }

    async fn advance_from(&self, run_id: Uuid, index: usize, trigger: AdvanceTrigger) {
        let _guard = self.command_lock.lock().await;
        let outcome = self
            .state
            .lock()
            .await
            .advance_queue_from(run_id, index, &trigger);
        self.follow_advance(outcome).await;
    }

    // Caller holds the command lock.
    async fn follow_advance(&self, outcome: AdvanceOutcome) {
        match outcome {
            AdvanceOutcome::Ignored => {}
            AdvanceOutcome::Next { campaign_id, .. } => {
                if let Err(e) = self.fetcher.start_campaign_mining(&campaign_id, None).await {
                    self.abort_after_failed_start(&e).await;
                    return;
                }
                self.refresh_mining_status().await;
            }
            AdvanceOutcome::Completed {
                game_name,
                mined_campaigns,
            } => {
                if let Err(e) = self.fetcher.stop_mining().await {
                    warn!("⚠️ Stop after mine-all failed: {}", e);
                }
                self.state.lock().await.reset_session();
                self.publish_status().await;
                self.emit(CoreEvent::MineAllFinished {
                    game_name,
                    mined_campaigns,
                    nothing_to_do: false,
                });
            }
        }
    }

    async fn abort_after_failed_start(&self, err: &DropsError) {
        let aborted = {
            let mut state = self.state.lock().await;
            let aborted = state.abort_queue(&err.to_string());
            state.reset_session();
            aborted
        };
        self.emit_command_failed(err);
        if let Some(queue) = aborted {
            self.emit(CoreEvent::MineAllAborted {
                game_name: queue.game_name,
                reason: err.to_string(),
            });
        }
        self.publish_status().await;
    }

    /// Schedule a settled advance when the live list shows the queued
    /// campaign complete. The advance re-checks the run and position.
    async fn maybe_schedule_settle_advance(&self) {
        let position = {
            let state = self.state.lock().await;
            if !state.current_campaign_complete() {
                return;
            }
            state.active_queue().map(|q| (q.run_id, q.current_index))
        };
        let Some((run_id, index)) = position else {
            return;
        };

        {
            let mut pending = self.settle_pending.lock().await;
            if *pending == Some((run_id, index)) {
                return;
            }
            *pending = Some((run_id, index));
        }

        let delay = Duration::from_millis(self.settings.read().await.queue_settle_delay_ms);
        debug!("⏳ Campaign complete, advancing in {:?}", delay);
        let manager = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager
                .advance_from(run_id, index, AdvanceTrigger::CampaignProgressComplete)
                .await;
        });
    }

    /// Mine one campaign, optionally on a chosen channel. Any mine-all run is dropped.
    pub async fn start_campaign_mining(&self, campaign_id: &str, channel_id: Option<&str>) -> Result<()> {
        let _guard = self.command_lock.lock().await;

        let aborted = self
            .state
            .lock()
            .await
            .abort_queue("replaced by single-campaign mining");
        if let Some(queue) = aborted {
            self.emit(CoreEvent::MineAllAborted {
                game_name: queue.game_name,
                reason: "replaced by single-campaign mining".to_string(),
            });
        }

        if let Err(e) = self.fetcher.stop_mining().await {
            warn!("⚠️ Ignoring stop failure before mining {}: {}", campaign_id, e);
        }
        if let Err(e) = self.fetcher.start_campaign_mining(campaign_id, channel_id).await {
            self.emit_command_failed(&e);
            return Err(e);
        }

        self.refresh_mining_status().await;
        Ok(())
    }

    /// Optimistic stop. On remote failure the authoritative status is re-fetched.
    pub async fn stop_mining(&self) -> Result<()> {
        let _guard = self.command_lock.lock().await;

        let aborted = {
            let mut state = self.state.lock().await;
            let aborted = state.abort_queue("stopped by user");
            state.reset_session();
            aborted
        };
        if let Some(queue) = aborted {
            self.emit(CoreEvent::MineAllAborted {
                game_name: queue.game_name,
                reason: "stopped by user".to_string(),
            });
        }
        self.publish_status().await;

        if let Err(e) = self.fetcher.stop_mining().await {
            self.emit_command_failed(&e);
            self.refresh_mining_status().await;
            return Err(e);
        }
        info!("⏹️ Mining stopped");
        Ok(())
    }

    pub async fn eligible_channels(&self, campaign_id: &str) -> Vec<MiningChannel> {
        self.fetcher.fetch_eligible_channels(campaign_id).await
    }

    pub async fn claim_drop(&self, drop_id: &str) -> Result<()> {
        let _guard = self.command_lock.lock().await;
        self.claim_drop_locked(drop_id).await
    }

    async fn claim_drop_locked(&self, drop_id: &str) -> Result<()> {
        let token = self.state.lock().await.claim_token(drop_id);
        if let Err(e) = self.fetcher.claim_drop(drop_id, token.as_deref()).await {
            self.emit_command_failed(&e);
            return Err(e);
        }
        self.state.lock().await.mark_claimed(drop_id);
        info!("🎁 Claimed drop {}", drop_id);
        Ok(())
    }

    /// Claim every claimable drop of a game, one at a time with a fixed gap.
    /// Returns how many claims succeeded.
    pub async fn claim_all_for_game(&self, game_name: &str) -> Result<usize> {
        let _guard = self.command_lock.lock().await;
        let drops = self.state.lock().await.claimable_drops(game_name)?;
        let delay = Duration::from_millis(self.settings.read().await.claim_all_delay_ms);

        let mut claimed = 0;
        for (i, drop) in drops.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(delay).await;
            }
            match self.claim_drop_locked(&drop.drop_id).await {
                Ok(()) => claimed += 1,
                Err(e) => error!("❌ Claim of {} ({}) failed: {}", drop.drop_name, drop.drop_id, e),
            }
        }

        info!("🎁 Claimed {}/{} drops for {}", claimed, drops.len(), game_name);
        Ok(claimed)
    }

    /// Refresh every `check_interval_seconds` until stopped. The first
    /// refresh runs immediately.
    pub async fn start_refresh_loop(&self) {
        {
            let mut running = self.refresh_running.write().await;
            if *running {
                return;
            }
            *running = true;
        }

        let period = Duration::from_secs(self.settings.read().await.check_interval_seconds.max(1));
        let manager = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if !*manager.refresh_running.read().await {
                    break;
                }
                if let Err(e) = manager.refresh().await {
                    warn!("⚠️ Background drops refresh failed: {}", e);
                }
            }
            debug!("Drops refresh loop stopped");
        });
    }

    pub async fn stop_refresh_loop(&self) {
        *self.refresh_running.write().await = false;
    }

    pub async fn is_refresh_loop_running(&self) -> bool {
        *self.refresh_running.read().await
    }
}
