//! Shared fixtures: hand-built aggregates, no database.
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use uuid::Uuid;

use warcamp_server::battle::engine::BattleAggregate;
use warcamp_server::battle::model::{Battle, Participant};
use warcamp_server::battle::status::{BattleStatus, ParticipantStatus};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn t(minutes: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(minutes)
}

pub fn battle(creator: Uuid, status: BattleStatus) -> Battle {
    Battle {
        id: Uuid::new_v4(),
        campaign_id: Uuid::new_v4(),
        created_by: creator,
        title: None,
        scenario: "Street Fight".into(),
        status,
        settings: json!({}),
        winner_warband_id: None,
        created_at: t0(),
        updated_at: t0(),
        started_at: None,
        ended_at: None,
        post_processed_at: None,
    }
}

pub fn participant(
    id: i64,
    battle_id: Uuid,
    user_id: Uuid,
    status: ParticipantStatus,
) -> Participant {
    // Statuses at or past joined_prebattle imply the participant has joined
    // prebattle, so keep the timestamp consistent with the status.
    let joined = matches!(
        status,
        ParticipantStatus::JoinedPrebattle
            | ParticipantStatus::Ready
            | ParticipantStatus::InBattle
            | ParticipantStatus::FinishedBattle
            | ParticipantStatus::ConfirmedPostbattle
    );
    Participant {
        id,
        battle_id,
        user_id,
        warband_id: Uuid::new_v4(),
        status,
        connected: false,
        last_seen_at: None,
        invited_by: None,
        invited_at: Some(t0()),
        responded_at: None,
        prebattle_joined_at: if joined { Some(t0()) } else { None },
        ready_at: None,
        canceled_at: None,
        battle_joined_at: None,
        finished_at: None,
        confirmed_at: None,
        last_ack_event_id: 0,
        selected_units: Vec::new(),
        stat_overrides: BTreeMap::new(),
        custom_units: Vec::new(),
        rating: None,
    }
}

pub struct Fixture {
    pub creator: Uuid,
    pub guest: Uuid,
    pub agg: BattleAggregate,
}

/// Creator + one guest, both in the given participant state.
pub fn two_players(battle_status: BattleStatus, p_status: ParticipantStatus) -> Fixture {
    let creator = Uuid::new_v4();
    let guest = Uuid::new_v4();
    let b = battle(creator, battle_status);
    let participants = vec![
        participant(1, b.id, creator, p_status),
        participant(2, b.id, guest, p_status),
    ];
    Fixture {
        creator,
        guest,
        agg: BattleAggregate::new(b, participants, 1),
    }
}
