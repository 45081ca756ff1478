//! Transaction owner for battle actions.
//!
//! Pattern per action: begin → lock + load the aggregate → run the
//! engine → persist rows and events → (optionally) run kill
//! aggregation → commit → hand the outbound notices to the caller for
//! post-commit publishing. A failed action rolls back and leaves no
//! visible state change.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::battle::engine::{self, ActionOutcome, BattleAggregate};
use crate::battle::finalize::tally_kills;
use crate::battle::snapshot::Snapshot;
use crate::db::{battle_repo, campaign_repo, unit_repo};
use crate::error::BattleError;
use crate::protocol::{Outbound, PushMsg};

/// Runs one mutating action against a locked battle aggregate and
/// returns the post-commit snapshot (battle + participants + the events
/// this action appended) plus the notices to publish.
pub async fn run_action<F>(
    db: &PgPool,
    battle_id: Uuid,
    action: F,
) -> Result<(Snapshot, Vec<Outbound>), BattleError>
where
    F: FnOnce(&mut BattleAggregate, DateTime<Utc>) -> Result<ActionOutcome, BattleError>,
{
    let now = Utc::now();
    let mut tx = db.begin().await?;

    let mut agg = battle_repo::load_for_update(&mut *tx, battle_id)
        .await?
        .ok_or(BattleError::NotFound)?;

    let outcome = action(&mut agg, now)?;

    if outcome.changed {
        battle_repo::persist(&mut *tx, &agg).await?;
        battle_repo::insert_events(&mut *tx, &outcome.events).await?;
        if outcome.finalize_due {
            finalize(&mut *tx, battle_id).await?;
        }
        tx.commit().await?;
    } else {
        // Idempotent repeat: nothing to write, release the locks.
        tx.rollback().await.ok();
    }

    let outbound = collect_outbound(&agg, &outcome);
    let snapshot = Snapshot {
        battle: agg.battle.clone(),
        participants: agg.participants.clone(),
        events: outcome.events,
    };
    Ok((snapshot, outbound))
}

/// Rolls every recorded kill into the warband catalog, once. The caller
/// has already flipped the post-processed guard inside this transaction.
async fn finalize(tx: &mut sqlx::PgConnection, battle_id: Uuid) -> Result<(), BattleError> {
    let kills = battle_repo::kill_events(tx, battle_id).await?;
    let tallies = tally_kills(&kills);
    log::info!(
        "finalizing battle {battle_id}: {} kill events, {} units credited",
        kills.len(),
        tallies.len()
    );
    for t in &tallies {
        unit_repo::increment_kills(tx, t.kind, t.unit_id, t.count).await?;
    }
    Ok(())
}

fn collect_outbound(agg: &BattleAggregate, outcome: &ActionOutcome) -> Vec<Outbound> {
    let mut out: Vec<Outbound> = outcome
        .events
        .iter()
        .map(|event| {
            Outbound::Battle(
                agg.battle.id,
                PushMsg::BattleEvent {
                    battle_id: agg.battle.id,
                    campaign_id: agg.battle.campaign_id,
                    status: agg.battle.status,
                    event: event.clone(),
                },
            )
        })
        .collect();
    out.extend(outcome.outbound.iter().cloned());
    out
}

/// Creates a battle with its participant roster in one transaction.
#[allow(clippy::too_many_arguments)]
pub async fn create_battle(
    db: &PgPool,
    campaign_id: Uuid,
    creator: Uuid,
    title: Option<&str>,
    scenario: &str,
    settings: Option<&Value>,
    participant_user_ids: &[Uuid],
    participant_ratings: &BTreeMap<Uuid, i64>,
) -> Result<(Snapshot, Vec<Outbound>), BattleError> {
    let now = Utc::now();

    let mut users = vec![creator];
    for u in participant_user_ids {
        if !users.contains(u) {
            users.push(*u);
        }
    }

    let members = campaign_repo::members_of(db, campaign_id, &users).await?;
    if !members.contains(&creator) {
        // Not a member (or no such campaign): don't leak which.
        return Err(BattleError::NotFound);
    }
    for user in &users {
        if !members.contains(user) {
            return Err(BattleError::validation(format!(
                "user {user} is not a member of this campaign"
            )));
        }
    }

    let warbands = campaign_repo::warbands_of(db, campaign_id, &users).await?;
    let mut roster = BTreeMap::new();
    for user in &users {
        match warbands.get(user).map(Vec::as_slice) {
            Some([warband]) => {
                roster.insert(*user, *warband);
            }
            _ => {
                return Err(BattleError::validation(format!(
                    "user {user} must own exactly one warband in this campaign"
                )))
            }
        }
    }

    let new = engine::plan_battle(
        campaign_id,
        creator,
        title,
        scenario,
        settings,
        participant_user_ids,
        participant_ratings,
        &roster,
        now,
    )?;

    let mut tx = db.begin().await?;
    let (participants, created_event) = battle_repo::insert_battle(&mut *tx, &new, now).await?;
    tx.commit().await?;

    let mut outbound = vec![Outbound::Battle(
        new.battle.id,
        PushMsg::BattleEvent {
            battle_id: new.battle.id,
            campaign_id,
            status: new.battle.status,
            event: created_event.clone(),
        },
    )];
    for invitee in &new.invites {
        outbound.push(Outbound::User(
            *invitee,
            PushMsg::BattleInvite {
                battle_id: new.battle.id,
                campaign_id,
                status: new.battle.status,
                scenario: new.battle.scenario.clone(),
                invited_by: creator,
            },
        ));
    }

    let snapshot = Snapshot {
        battle: new.battle,
        participants,
        events: vec![created_event],
    };
    Ok((snapshot, outbound))
}

/// Incremental state fetch. Reads never touch domain state, but they do
/// mark the caller online and record their acknowledged event id.
pub async fn fetch_state(
    db: &PgPool,
    battle_id: Uuid,
    user_id: Uuid,
    since_event_id: i64,
) -> Result<Snapshot, BattleError> {
    let (battle, mut participants) = battle_repo::load(db, battle_id)
        .await?
        .ok_or(BattleError::NotFound)?;

    let caller = participants
        .iter()
        .position(|p| p.user_id == user_id)
        .ok_or(BattleError::NotFound)?;

    let events = battle_repo::events_since(db, battle_id, since_event_id).await?;

    battle_repo::touch_presence(db, participants[caller].id, since_event_id).await?;
    let p = &mut participants[caller];
    p.connected = true;
    p.last_seen_at = Some(Utc::now());
    p.last_ack_event_id = p.last_ack_event_id.max(since_event_id);

    Ok(Snapshot {
        battle,
        participants,
        events,
    })
}
