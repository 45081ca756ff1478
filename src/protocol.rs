//! Wire shapes for outbound Redis pushes.
//!
//! Delivery is best-effort: the event ledger is the durable source of
//! truth and every push is only a hint to re-sync via
//! `GET /battles/{id}/state`.

use serde::Serialize;
use uuid::Uuid;

use crate::battle::model::Event;
use crate::battle::status::BattleStatus;

/// server → client push, published on a battle or user channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PushMsg {
    /// A ledger event was appended.
    BattleEvent {
        battle_id: Uuid,
        campaign_id: Uuid,
        status: BattleStatus,
        event: Event,
    },
    /// Something about the battle or a participant changed; re-sync.
    BattleStateChanged {
        battle_id: Uuid,
        campaign_id: Uuid,
        status: BattleStatus,
    },
    /// Sent to each invitee when a battle is created.
    BattleInvite {
        battle_id: Uuid,
        campaign_id: Uuid,
        status: BattleStatus,
        scenario: String,
        invited_by: Uuid,
    },
}

/// Where a [`PushMsg`] goes.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Everyone watching the battle: channel `battle:{id}:events`.
    Battle(Uuid, PushMsg),
    /// One user's personal channel: `user:{id}:battles`.
    User(Uuid, PushMsg),
}

pub fn battle_channel(battle_id: Uuid) -> String {
    format!("battle:{battle_id}:events")
}

pub fn user_channel(user_id: Uuid) -> String {
    format!("user:{user_id}:battles")
}
