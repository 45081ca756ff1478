//! Player-submitted event payload validation and kill aggregation.

mod common;

use common::*;
use serde_json::json;
use uuid::Uuid;
use warcamp_server::battle::events::{validate_player_payload, EventType, UnitKind};
use warcamp_server::battle::finalize::tally_kills;
use warcamp_server::battle::model::Event;
use warcamp_server::battle::status::{BattleStatus, ParticipantStatus};
use warcamp_server::error::BattleError;

#[test]
fn kill_requires_a_positive_unit_id() {
    let bad = json!({ "killer_unit_type": "hero", "killer_unit_id": 0 });
    assert!(validate_player_payload(EventType::KillRecorded, &bad).is_err());

    let ok = json!({ "killer_unit_type": "hero", "killer_unit_id": 7, "victim": "rat" });
    let out = validate_player_payload(EventType::KillRecorded, &ok).unwrap();
    assert_eq!(out["killer_unit_id"], json!(7));
    // extra fields pass through
    assert_eq!(out["victim"], json!("rat"));
}

#[test]
fn custom_kill_swaps_id_for_key() {
    let raw = json!({
        "killer_unit_type": "custom",
        "killer_unit_key": "  custom:ogre ",
        "killer_unit_id": 99
    });
    let out = validate_player_payload(EventType::KillRecorded, &raw).unwrap();
    assert_eq!(out["killer_unit_key"], json!("custom:ogre"));
    assert!(out.get("killer_unit_id").is_none());
}

#[test]
fn non_object_payload_rejects() {
    let err = validate_player_payload(EventType::DeathRecorded, &json!([1, 2])).unwrap_err();
    assert!(matches!(err, BattleError::Validation(_)));
}

#[test]
fn lifecycle_event_types_are_not_submittable() {
    let err = validate_player_payload(EventType::BattleEnded, &json!({})).unwrap_err();
    assert!(matches!(err, BattleError::Validation(_)));
}

#[test]
fn item_used_is_legal_during_prebattle() {
    let mut fx = two_players(BattleStatus::Prebattle, ParticipantStatus::JoinedPrebattle);
    let guest = fx.guest;
    let out = fx
        .agg
        .submit_event(guest, EventType::ItemUsed, &json!({ "item": "lucky charm" }), t(1))
        .unwrap();
    assert_eq!(out.events.len(), 1);
    assert_eq!(out.events[0].actor_user_id, Some(guest));
}

#[test]
fn kills_are_only_recorded_mid_battle() {
    let mut fx = two_players(BattleStatus::Prebattle, ParticipantStatus::JoinedPrebattle);
    let payload = json!({ "killer_unit_type": "hero", "killer_unit_id": 1 });
    let err = fx
        .agg
        .submit_event(fx.guest, EventType::KillRecorded, &payload, t(1))
        .unwrap_err();
    assert!(matches!(err, BattleError::InvalidState(_)));
}

#[test]
fn finished_participant_cannot_record_kills() {
    let mut fx = two_players(BattleStatus::Active, ParticipantStatus::InBattle);
    let guest = fx.guest;
    fx.agg.finish(guest, t(1)).unwrap();
    let payload = json!({ "killer_unit_type": "hero", "killer_unit_id": 1 });
    let err = fx
        .agg
        .submit_event(guest, EventType::KillRecorded, &payload, t(2))
        .unwrap_err();
    assert!(matches!(err, BattleError::InvalidState(_)));
}

fn kill_event(id: i64, battle_id: Uuid, kind: &str, unit_id: i64) -> Event {
    Event {
        id,
        battle_id,
        event_type: EventType::KillRecorded,
        actor_user_id: Some(Uuid::new_v4()),
        payload: json!({ "killer_unit_type": kind, "killer_unit_id": unit_id }),
        created_at: t0(),
    }
}

#[test]
fn tally_groups_by_unit_and_skips_custom() {
    let bid = Uuid::new_v4();
    let mut events = vec![
        kill_event(1, bid, "hero", 7),
        kill_event(2, bid, "hero", 7),
        kill_event(3, bid, "henchman", 3),
    ];
    events.push(Event {
        id: 4,
        battle_id: bid,
        event_type: EventType::KillRecorded,
        actor_user_id: None,
        payload: json!({ "killer_unit_type": "custom", "killer_unit_key": "custom:ogre" }),
        created_at: t0(),
    });
    events.push(Event {
        id: 5,
        battle_id: bid,
        event_type: EventType::DeathRecorded,
        actor_user_id: None,
        payload: json!({}),
        created_at: t0(),
    });

    let tallies = tally_kills(&events);
    assert_eq!(tallies.len(), 2);
    let hero = tallies.iter().find(|t| t.kind == UnitKind::Hero).unwrap();
    assert_eq!((hero.unit_id, hero.count), (7, 2));
    let hench = tallies.iter().find(|t| t.kind == UnitKind::Henchman).unwrap();
    assert_eq!((hench.unit_id, hench.count), (3, 1));
}

#[test]
fn tally_is_stable_across_reruns() {
    let bid = Uuid::new_v4();
    let events = vec![kill_event(1, bid, "hero", 1), kill_event(2, bid, "hero", 2)];
    assert_eq!(tally_kills(&events), tally_kills(&events));
}
