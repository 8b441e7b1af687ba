use crate::models::drops::*;
use crate::models::events::ProgressUpdate;
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashMap;

/// What to do with the displayed drop when a tick arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropSelection {
    /// Same drop: update its minutes in place.
    Patch,
    /// Show the incoming drop instead.
    Switch,
    /// Leave the current drop on screen.
    Keep,
}

/// Decide whether an incoming drop replaces the one on display.
///
/// A complete drop stays visible until something incomplete shows up, so the
/// user can still claim it, and an incomplete drop is only replaced by one
/// that is strictly further along.
pub fn select_display_drop(
    current: Option<&CurrentDropInfo>,
    incoming: &CurrentDropInfo,
) -> DropSelection {
    let Some(current) = current else {
        return DropSelection::Switch;
    };
    if current.drop_id == incoming.drop_id {
        return DropSelection::Patch;
    }

    match (current.is_complete(), incoming.is_complete()) {
        (true, false) => DropSelection::Switch,
        (false, false) if incoming.percentage() > current.percentage() => DropSelection::Switch,
        _ => DropSelection::Keep,
    }
}

/// Campaign context for a drop id, taken from the last aggregation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DropContext {
    pub campaign_id: String,
    pub campaign_name: String,
    pub game_name: String,
    pub drop_name: String,
    pub required_minutes: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressApplied {
    pub created: bool,
    pub display: Option<DropSelection>,
}

/// Keeps the live progress list and mining status between full refreshes.
#[derive(Debug, Default)]
pub struct LiveReconciler {
    progress: Vec<DropProgress>,
    mining_status: MiningStatus,
    drop_index: HashMap<String, DropContext>,
}

impl LiveReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self) -> &[DropProgress] {
        &self.progress
    }

    pub fn progress_for(&self, drop_id: &str) -> Option<&DropProgress> {
        self.progress.iter().find(|p| p.drop_id == drop_id)
    }

    pub fn mining_status(&self) -> &MiningStatus {
        &self.mining_status
    }

    pub fn drop_context(&self, drop_id: &str) -> Option<&DropContext> {
        self.drop_index.get(drop_id)
    }

    pub fn index_campaigns(&mut self, campaigns: &[DropCampaign]) {
        self.drop_index = campaigns
            .iter()
            .flat_map(|campaign| {
                campaign.time_based_drops.iter().map(move |drop| {
                    (
                        drop.id.clone(),
                        DropContext {
                            campaign_id: campaign.id.clone(),
                            campaign_name: campaign.name.clone(),
                            game_name: campaign.game_name.clone(),
                            drop_name: drop.display_name(),
                            required_minutes: drop.required_minutes_watched,
                        },
                    )
                })
            })
            .collect();
    }

    /// Fold a freshly fetched progress list into the live one. Entries the
    /// fetch did not return are kept; pushes may know about them already.
    pub fn merge_progress_snapshot(&mut self, fetched: &[DropProgress]) {
        for incoming in fetched {
            match self.progress.iter_mut().find(|p| p.drop_id == incoming.drop_id) {
                Some(existing) => merge_progress(existing, incoming),
                None => self.progress.push(incoming.clone()),
            }
        }
    }

    /// Apply one minute tick to the progress list and the displayed drop.
    pub fn apply_progress_event(&mut self, event: &ProgressUpdate) -> ProgressApplied {
        let mut applied = ProgressApplied::default();
        let context = self.drop_index.get(&event.drop_id).cloned();

        let entry = match self.progress.iter_mut().position(|p| p.drop_id == event.drop_id) {
            Some(index) => {
                let entry = &mut self.progress[index];
                entry.current_minutes_watched =
                    entry.current_minutes_watched.max(event.current_minutes);
                if event.required_minutes > 0 {
                    entry.required_minutes_watched = event.required_minutes;
                }
                entry.last_updated = entry.last_updated.max(event.timestamp);
                entry.clone()
            }
            None => {
                let entry = DropProgress {
                    campaign_id: context
                        .as_ref()
                        .map(|c| c.campaign_id.clone())
                        .unwrap_or_default(),
                    drop_id: event.drop_id.clone(),
                    current_minutes_watched: event.current_minutes,
                    required_minutes_watched: if event.required_minutes > 0 {
                        event.required_minutes
                    } else {
                        context.as_ref().map(|c| c.required_minutes).unwrap_or(0)
                    },
                    is_claimed: false,
                    last_updated: event.timestamp,
                    drop_instance_id: None,
                };
                applied.created = true;
                self.progress.push(entry.clone());
                entry
            }
        };

        applied.display = Some(self.update_display(&entry, context.as_ref(), event.timestamp));
        applied
    }

    fn update_display(
        &mut self,
        entry: &DropProgress,
        context: Option<&DropContext>,
        now: DateTime<Utc>,
    ) -> DropSelection {
        let mut incoming = CurrentDropInfo {
            drop_id: entry.drop_id.clone(),
            drop_name: context.map(|c| c.drop_name.clone()).unwrap_or_default(),
            campaign_name: context.map(|c| c.campaign_name.clone()).unwrap_or_default(),
            game_name: context.map(|c| c.game_name.clone()).unwrap_or_default(),
            current_minutes: 0,
            required_minutes: entry.required_minutes_watched,
            progress_percentage: 0.0,
            estimated_completion: None,
        };
        incoming.set_minutes(entry.current_minutes_watched, entry.required_minutes_watched, now);

        let selection = select_display_drop(self.mining_status.current_drop.as_ref(), &incoming);
        match selection {
            DropSelection::Patch => {
                if let Some(current) = self.mining_status.current_drop.as_mut() {
                    let minutes = current.current_minutes.max(entry.current_minutes_watched);
                    current.set_minutes(minutes, entry.required_minutes_watched, now);
                }
            }
            DropSelection::Switch => {
                debug!(
                    "🔀 Displayed drop switched to {} ({}/{})",
                    incoming.drop_id, incoming.current_minutes, incoming.required_minutes
                );
                if let Some(context) = context {
                    self.mining_status.current_campaign = Some(context.campaign_name.clone());
                    self.mining_status.current_campaign_id = Some(context.campaign_id.clone());
                }
                self.mining_status.current_drop = Some(incoming);
            }
            DropSelection::Keep => {}
        }
        self.mining_status.last_update = self.mining_status.last_update.max(now);
        selection
    }

    /// Authoritative status from the backend; replaces local patches wholesale.
    pub fn apply_mining_status(&mut self, status: MiningStatus) {
        self.mining_status = status;
    }

    pub fn clear_mining_status(&mut self) {
        self.mining_status = MiningStatus {
            last_update: Utc::now(),
            ..MiningStatus::default()
        };
    }

    pub fn attach_claim_token(&mut self, drop_id: &str, drop_instance_id: &str) -> Option<&DropProgress> {
        let entry = self.progress.iter_mut().find(|p| p.drop_id == drop_id)?;
        entry.drop_instance_id = Some(drop_instance_id.to_string());
        Some(entry)
    }

    pub fn mark_claimed(&mut self, drop_id: &str, now: DateTime<Utc>) {
        if let Some(entry) = self.progress.iter_mut().find(|p| p.drop_id == drop_id) {
            entry.is_claimed = true;
            entry.last_updated = entry.last_updated.max(now);
        } else if let Some(context) = self.drop_index.get(drop_id) {
            self.progress.push(DropProgress {
                campaign_id: context.campaign_id.clone(),
                drop_id: drop_id.to_string(),
                current_minutes_watched: context.required_minutes,
                required_minutes_watched: context.required_minutes,
                is_claimed: true,
                last_updated: now,
                drop_instance_id: None,
            });
        }
    }

    /// The only place displayed progress may go backwards. Claims and claim
    /// tokens outlive the session; everything else starts over from the
    /// backend.
    pub fn reset_session(&mut self) {
        self.progress
            .retain(|p| p.is_claimed || p.drop_instance_id.is_some());
        self.clear_mining_status();
    }
}

/// Newer non-empty fields win; minutes never go down and claims never revert.
fn merge_progress(existing: &mut DropProgress, incoming: &DropProgress) {
    let newer = incoming.last_updated >= existing.last_updated;

    existing.current_minutes_watched = existing
        .current_minutes_watched
        .max(incoming.current_minutes_watched);
    if incoming.required_minutes_watched > 0 && (newer || existing.required_minutes_watched <= 0) {
        existing.required_minutes_watched = incoming.required_minutes_watched;
    }
    if !incoming.campaign_id.is_empty() && (newer || existing.campaign_id.is_empty()) {
        existing.campaign_id = incoming.campaign_id.clone();
    }
    if incoming.drop_instance_id.is_some() && (newer || existing.drop_instance_id.is_none()) {
        existing.drop_instance_id = incoming.drop_instance_id.clone();
    }
    existing.is_claimed |= incoming.is_claimed;
    existing.last_updated = existing.last_updated.max(incoming.last_updated);
}
