//! sqlx row structs and their conversions into domain records.
//!
//! Statuses and event types live as snake_case text in Postgres; parsing
//! happens here so the rest of the crate only ever sees the closed enums.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::battle::model::{Battle, Event, Participant};

#[derive(Debug, FromRow)]
pub struct BattleRow {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub created_by: Uuid,
    pub title: Option<String>,
    pub scenario: String,
    pub status: String,
    pub settings: Value,
    pub winner_warband_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub post_processed_at: Option<DateTime<Utc>>,
}

impl BattleRow {
    pub fn into_domain(self) -> Result<Battle> {
        Ok(Battle {
            id: self.id,
            campaign_id: self.campaign_id,
            created_by: self.created_by,
            title: self.title,
            scenario: self.scenario,
            status: self.status.parse().map_err(|e| anyhow!("battle {}: {e}", self.id))?,
            settings: self.settings,
            winner_warband_id: self.winner_warband_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
            post_processed_at: self.post_processed_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct ParticipantRow {
    pub id: i64,
    pub battle_id: Uuid,
    pub user_id: Uuid,
    pub warband_id: Uuid,
    pub status: String,
    pub connected: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub invited_by: Option<Uuid>,
    pub invited_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
    pub prebattle_joined_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub battle_joined_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub last_ack_event_id: i64,
    pub selected_units: Value,
    pub stat_overrides: Value,
    pub custom_units: Value,
    pub rating: Option<i32>,
}

impl ParticipantRow {
    pub fn into_domain(self) -> Result<Participant> {
        Ok(Participant {
            id: self.id,
            battle_id: self.battle_id,
            user_id: self.user_id,
            warband_id: self.warband_id,
            status: self
                .status
                .parse()
                .map_err(|e| anyhow!("participant {}: {e}", self.id))?,
            connected: self.connected,
            last_seen_at: self.last_seen_at,
            invited_by: self.invited_by,
            invited_at: self.invited_at,
            responded_at: self.responded_at,
            prebattle_joined_at: self.prebattle_joined_at,
            ready_at: self.ready_at,
            canceled_at: self.canceled_at,
            battle_joined_at: self.battle_joined_at,
            finished_at: self.finished_at,
            confirmed_at: self.confirmed_at,
            last_ack_event_id: self.last_ack_event_id,
            selected_units: serde_json::from_value(self.selected_units)
                .context("decoding selected_units")?,
            stat_overrides: serde_json::from_value(self.stat_overrides)
                .context("decoding stat_overrides")?,
            custom_units: serde_json::from_value(self.custom_units)
                .context("decoding custom_units")?,
            rating: self.rating,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct EventRow {
    pub id: i64,
    pub battle_id: Uuid,
    pub event_type: String,
    pub actor_user_id: Option<Uuid>,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl EventRow {
    pub fn into_domain(self) -> Result<Event> {
        Ok(Event {
            id: self.id,
            battle_id: self.battle_id,
            event_type: self
                .event_type
                .parse()
                .map_err(|e| anyhow!("event {}/{}: {e}", self.battle_id, self.id))?,
            actor_user_id: self.actor_user_id,
            payload: self.payload,
            created_at: self.created_at,
        })
    }
}
