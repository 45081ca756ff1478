//! Domain records for the battle lifecycle engine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::battle::config_rules::{CustomUnit, StatOverride};
use crate::battle::events::EventType;
use crate::battle::status::{BattleStatus, ParticipantStatus};
use std::collections::BTreeMap;

/// One scheduled match between warbands within a campaign.
/// Owned by the campaign; there is no direct deletion endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Battle {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub created_by: Uuid,
    pub title: Option<String>,
    pub scenario: String,
    pub status: BattleStatus,
    /// Opaque key/value map supplied at creation (table rules, house rules).
    pub settings: Value,
    pub winner_warband_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Set exactly once, together with the `ended` write; guards kill
    /// aggregation against re-running.
    pub post_processed_at: Option<DateTime<Utc>>,
}

/// A (user, warband) pairing attached to one battle. Unique per user and
/// per warband within the battle.
#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    pub id: i64,
    pub battle_id: Uuid,
    pub user_id: Uuid,
    pub warband_id: Uuid,
    pub status: ParticipantStatus,
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
    /// High-water mark of events this client has acknowledged.
    pub last_ack_event_id: i64,
    /// Ordered, de-duplicated unit keys picked for this battle.
    pub selected_units: Vec<String>,
    /// unit key → one-off stat override for this battle.
    pub stat_overrides: BTreeMap<String, StatOverride>,
    /// Ad-hoc units that exist only inside this battle.
    pub custom_units: Vec<CustomUnit>,
    pub rating: Option<i32>,
}

/// Append-only ledger entry. Ids are a per-battle sequence; ordering by
/// id is the authoritative event order.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: i64,
    pub battle_id: Uuid,
    pub event_type: EventType,
    /// `None` for system transitions (entering postbattle, auto-cancel).
    pub actor_user_id: Option<Uuid>,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}
