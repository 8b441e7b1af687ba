use crate::models::drops::MiningStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minute tick for one drop, as pushed by the drops websocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub drop_id: String,
    pub current_minutes: i32,
    pub required_minutes: i32,
    pub timestamp: DateTime<Utc>,
}

/// Events pushed by the backend, applied in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum PushEvent {
    MiningStatusUpdate(MiningStatus),
    ProgressUpdate(ProgressUpdate),
    MiningComplete {
        game_name: String,
        reason: String,
    },
    MiningStoppedNoChannels {
        reason: String,
    },
    #[serde(rename = "drops-claim-ready")]
    ClaimReady {
        drop_id: String,
        drop_instance_id: String,
    },
}

impl PushEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PushEvent::MiningStatusUpdate(_) => "mining-status-update",
            PushEvent::ProgressUpdate(_) => "progress-update",
            PushEvent::MiningComplete { .. } => "mining-complete",
            PushEvent::MiningStoppedNoChannels { .. } => "mining-stopped-no-channels",
            PushEvent::ClaimReady { .. } => "drops-claim-ready",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFavoriteCampaigns {
    pub game_name: String,
    pub image_url: String,
    pub count: usize,
    pub campaign_names: Vec<String>,
}

/// Events the core emits for whoever renders notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum CoreEvent {
    NewFavoriteCampaigns(NewFavoriteCampaigns),
    CommandFailed {
        command: String,
        message: String,
    },
    MineAllFinished {
        game_name: String,
        mined_campaigns: usize,
        nothing_to_do: bool,
    },
    MineAllAborted {
        game_name: String,
        reason: String,
    },
    MiningStatusUpdate(MiningStatus),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_event_wire_names() {
        let raw = json!({
            "event": "mining-stopped-no-channels",
            "payload": { "reason": "all channels offline" }
        });
        let event: PushEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.name(), "mining-stopped-no-channels");

        let raw = json!({
            "event": "drops-claim-ready",
            "payload": { "drop_id": "d1", "drop_instance_id": "inst" }
        });
        let event: PushEvent = serde_json::from_value(raw).unwrap();
        assert!(matches!(event, PushEvent::ClaimReady { .. }));
    }

    #[test]
    fn test_new_favorite_event_is_tagged() {
        let event = CoreEvent::NewFavoriteCampaigns(NewFavoriteCampaigns {
            game_name: "Rust".into(),
            image_url: String::new(),
            count: 1,
            campaign_names: vec!["Twitch Drops 42".into()],
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "new-favorite-campaigns");
        assert_eq!(value["payload"]["count"], 1);
    }
}
