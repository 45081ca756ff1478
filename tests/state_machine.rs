//! Battle and participant state-machine rules, run directly against the
//! in-memory aggregate.

mod common;

use common::*;
use uuid::Uuid;
use warcamp_server::battle::status::{BattleStatus, ParticipantStatus};
use warcamp_server::error::BattleError;

#[test]
fn accepting_last_invite_opens_prebattle() {
    let mut fx = two_players(BattleStatus::Inviting, ParticipantStatus::Invited);
    let creator = fx.creator;
    let guest = fx.guest;

    // creator accepts, guest still pending
    fx.agg.join(creator, t(1)).unwrap();
    assert_eq!(fx.agg.battle.status, BattleStatus::Inviting);

    // last acceptance flips battle and both participants
    let out = fx.agg.join(guest, t(2)).unwrap();
    assert!(out.changed);
    assert_eq!(fx.agg.battle.status, BattleStatus::Prebattle);
    assert!(fx
        .agg
        .participants
        .iter()
        .all(|p| p.status == ParticipantStatus::JoinedPrebattle));
    assert!(fx
        .agg
        .participants
        .iter()
        .all(|p| p.prebattle_joined_at == Some(t(2))));
}

#[test]
fn repeated_join_is_a_noop() {
    let mut fx = two_players(BattleStatus::Prebattle, ParticipantStatus::JoinedPrebattle);
    let out = fx.agg.join(fx.guest, t(1)).unwrap();
    assert!(!out.changed);
    assert!(out.events.is_empty());
}

#[test]
fn canceled_participant_cannot_rejoin() {
    let mut fx = two_players(BattleStatus::Inviting, ParticipantStatus::Invited);
    let guest = fx.guest;
    fx.agg.cancel_self(guest, t(1)).unwrap();
    let err = fx.agg.join(guest, t(2)).unwrap_err();
    assert!(matches!(err, BattleError::InvalidState(_)));
}

#[test]
fn joining_a_closed_battle_fails() {
    let mut fx = two_players(BattleStatus::Ended, ParticipantStatus::ConfirmedPostbattle);
    let err = fx.agg.join(fx.guest, t(1)).unwrap_err();
    assert!(matches!(err, BattleError::InvalidState(_)));
}

#[test]
fn stranger_gets_not_found() {
    let mut fx = two_players(BattleStatus::Prebattle, ParticipantStatus::JoinedPrebattle);
    let err = fx.agg.join(Uuid::new_v4(), t(1)).unwrap_err();
    assert!(matches!(err, BattleError::NotFound));
}

#[test]
fn ready_toggle_keeps_first_timestamp() {
    let mut fx = two_players(BattleStatus::Prebattle, ParticipantStatus::JoinedPrebattle);
    let guest = fx.guest;

    fx.agg.set_ready(guest, true, t(1)).unwrap();
    fx.agg.set_ready(guest, false, t(2)).unwrap();
    fx.agg.set_ready(guest, true, t(3)).unwrap();

    let p = fx.agg.participants.iter().find(|p| p.user_id == guest).unwrap();
    assert_eq!(p.status, ParticipantStatus::Ready);
    assert_eq!(p.ready_at, Some(t(1)));
}

#[test]
fn unready_reverts_to_joined_prebattle() {
    let mut fx = two_players(BattleStatus::Prebattle, ParticipantStatus::JoinedPrebattle);
    let guest = fx.guest;
    fx.agg.set_ready(guest, true, t(1)).unwrap();
    fx.agg.set_ready(guest, false, t(2)).unwrap();
    let p = fx.agg.participants.iter().find(|p| p.user_id == guest).unwrap();
    assert_eq!(p.status, ParticipantStatus::JoinedPrebattle);
}

#[test]
fn ready_outside_prebattle_fails() {
    let mut fx = two_players(BattleStatus::Active, ParticipantStatus::InBattle);
    let err = fx.agg.set_ready(fx.guest, true, t(1)).unwrap_err();
    assert!(matches!(err, BattleError::InvalidState(_)));
}

#[test]
fn only_the_creator_may_start() {
    let mut fx = two_players(BattleStatus::Prebattle, ParticipantStatus::Ready);
    let err = fx.agg.start(fx.guest, t(1)).unwrap_err();
    assert!(matches!(err, BattleError::Forbidden(_)));
}

#[test]
fn start_requires_every_participant_ready() {
    let mut fx = two_players(BattleStatus::Prebattle, ParticipantStatus::JoinedPrebattle);
    let creator = fx.creator;
    fx.agg.set_ready(creator, true, t(1)).unwrap();

    let err = fx.agg.start(creator, t(2)).unwrap_err();
    assert!(matches!(err, BattleError::InvalidState(_)));
}

#[test]
fn a_withdrawn_participant_blocks_start() {
    let mut fx = two_players(BattleStatus::Prebattle, ParticipantStatus::Ready);
    let creator = fx.creator;
    let guest = fx.guest;
    fx.agg.cancel_self(guest, t(1)).unwrap();
    let err = fx.agg.start(creator, t(2)).unwrap_err();
    assert!(matches!(err, BattleError::InvalidState(_)));
}

#[test]
fn start_moves_everyone_into_battle() {
    let mut fx = two_players(BattleStatus::Prebattle, ParticipantStatus::Ready);
    let creator = fx.creator;
    let out = fx.agg.start(creator, t(1)).unwrap();

    assert_eq!(fx.agg.battle.status, BattleStatus::Active);
    assert_eq!(fx.agg.battle.started_at, Some(t(1)));
    assert!(fx
        .agg
        .participants
        .iter()
        .all(|p| p.status == ParticipantStatus::InBattle));
    assert_eq!(out.events.len(), 1);
    assert_eq!(out.events[0].id, 2); // fixture seeds the ledger at 1
}

#[test]
fn finish_before_start_fails() {
    let mut fx = two_players(BattleStatus::Prebattle, ParticipantStatus::JoinedPrebattle);
    let err = fx.agg.finish(fx.guest, t(1)).unwrap_err();
    assert!(matches!(err, BattleError::InvalidState(_)));
}

#[test]
fn last_finisher_tips_battle_into_postbattle() {
    let mut fx = two_players(BattleStatus::Active, ParticipantStatus::InBattle);
    let creator = fx.creator;
    let guest = fx.guest;

    fx.agg.finish(creator, t(1)).unwrap();
    assert_eq!(fx.agg.battle.status, BattleStatus::Active);

    let out = fx.agg.finish(guest, t(2)).unwrap();
    assert_eq!(fx.agg.battle.status, BattleStatus::Postbattle);
    // participant_finished_battle followed by battle_entered_postbattle
    assert_eq!(out.events.len(), 2);
    assert!(out.events[1].actor_user_id.is_none());
}

#[test]
fn repeated_finish_is_a_noop() {
    let mut fx = two_players(BattleStatus::Active, ParticipantStatus::InBattle);
    let guest = fx.guest;
    fx.agg.finish(guest, t(1)).unwrap();
    let out = fx.agg.finish(guest, t(2)).unwrap();
    assert!(!out.changed);
    let p = fx.agg.participants.iter().find(|p| p.user_id == guest).unwrap();
    assert_eq!(p.finished_at, Some(t(1)));
}

#[test]
fn finish_after_the_battle_ended_is_a_noop() {
    let mut fx = two_players(BattleStatus::Ended, ParticipantStatus::ConfirmedPostbattle);
    let guest = fx.guest;
    for p in &mut fx.agg.participants {
        p.finished_at = Some(t(1));
    }

    let out = fx.agg.finish(guest, t(5)).unwrap();
    assert!(!out.changed);
    assert!(out.events.is_empty());
    let p = fx.agg.participants.iter().find(|p| p.user_id == guest).unwrap();
    assert_eq!(p.finished_at, Some(t(1)));
}

#[test]
fn cancel_self_cancels_battle_once_everyone_left() {
    let mut fx = two_players(BattleStatus::Inviting, ParticipantStatus::Invited);
    let creator = fx.creator;
    let guest = fx.guest;

    fx.agg.cancel_self(creator, t(1)).unwrap();
    assert_eq!(fx.agg.battle.status, BattleStatus::Inviting);

    let out = fx.agg.cancel_self(guest, t(2)).unwrap();
    assert_eq!(fx.agg.battle.status, BattleStatus::Canceled);
    assert_eq!(out.events.len(), 1);
    assert!(out.events[0].actor_user_id.is_none());
}

#[test]
fn cancel_self_after_start_fails() {
    let mut fx = two_players(BattleStatus::Active, ParticipantStatus::InBattle);
    let err = fx.agg.cancel_self(fx.guest, t(1)).unwrap_err();
    assert!(matches!(err, BattleError::InvalidState(_)));
}

#[test]
fn creator_cancel_flips_everyone() {
    let mut fx = two_players(BattleStatus::Prebattle, ParticipantStatus::JoinedPrebattle);
    let creator = fx.creator;

    fx.agg.cancel_battle(creator, t(1)).unwrap();
    assert_eq!(fx.agg.battle.status, BattleStatus::Canceled);
    assert!(fx
        .agg
        .participants
        .iter()
        .all(|p| p.status == ParticipantStatus::CanceledPrebattle));

    // idempotent repeat
    let out = fx.agg.cancel_battle(creator, t(2)).unwrap();
    assert!(!out.changed);
}

#[test]
fn guest_cannot_cancel_the_whole_battle() {
    let mut fx = two_players(BattleStatus::Prebattle, ParticipantStatus::JoinedPrebattle);
    let err = fx.agg.cancel_battle(fx.guest, t(1)).unwrap_err();
    assert!(matches!(err, BattleError::Forbidden(_)));
}
