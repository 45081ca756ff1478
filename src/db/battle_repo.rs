//! Battle / participant / event persistence.
//!
//! Locked loads use `SELECT ... FOR UPDATE` on the battle row first and
//! then on every participant row, so concurrent actions on one battle
//! serialize through the battle lock for the duration of the
//! surrounding transaction.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::battle::engine::{BattleAggregate, NewBattle};
use crate::battle::events::EventType;
use crate::battle::model::{Battle, Event, Participant};
use crate::db::models::{BattleRow, EventRow, ParticipantRow};

const BATTLE_COLS: &str = "id, campaign_id, created_by, title, scenario, status, settings, \
     winner_warband_id, created_at, updated_at, started_at, ended_at, post_processed_at";

const PARTICIPANT_COLS: &str = "id, battle_id, user_id, warband_id, status, connected, \
     last_seen_at, invited_by, invited_at, responded_at, prebattle_joined_at, ready_at, \
     canceled_at, battle_joined_at, finished_at, confirmed_at, last_ack_event_id, \
     selected_units, stat_overrides, custom_units, rating";

/// Loads the full aggregate under exclusive row locks. Returns `None`
/// when the battle does not exist.
pub async fn load_for_update(
    conn: &mut PgConnection,
    battle_id: Uuid,
) -> Result<Option<BattleAggregate>> {
    let row = sqlx::query_as::<_, BattleRow>(&format!(
        "SELECT {BATTLE_COLS} FROM battles WHERE id = $1 FOR UPDATE"
    ))
    .bind(battle_id)
    .fetch_optional(&mut *conn)
    .await
    .context("locking battle row")?;

    let battle = match row {
        Some(row) => row.into_domain()?,
        None => return Ok(None),
    };

    let participants = sqlx::query_as::<_, ParticipantRow>(&format!(
        "SELECT {PARTICIPANT_COLS} FROM battle_participants \
          WHERE battle_id = $1 ORDER BY id FOR UPDATE"
    ))
    .bind(battle_id)
    .fetch_all(&mut *conn)
    .await
    .context("locking participant rows")?
    .into_iter()
    .map(ParticipantRow::into_domain)
    .collect::<Result<Vec<_>>>()?;

    let last_event_id: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(id), 0) FROM battle_events WHERE battle_id = $1",
    )
    .bind(battle_id)
    .fetch_one(&mut *conn)
    .await
    .context("reading event high-water mark")?;

    Ok(Some(BattleAggregate::new(battle, participants, last_event_id)))
}

/// Unlocked read for the state endpoint.
pub async fn load(db: &PgPool, battle_id: Uuid) -> Result<Option<(Battle, Vec<Participant>)>> {
    let row = sqlx::query_as::<_, BattleRow>(&format!(
        "SELECT {BATTLE_COLS} FROM battles WHERE id = $1"
    ))
    .bind(battle_id)
    .fetch_optional(db)
    .await
    .context("fetching battle")?;

    let battle = match row {
        Some(row) => row.into_domain()?,
        None => return Ok(None),
    };

    let participants = sqlx::query_as::<_, ParticipantRow>(&format!(
        "SELECT {PARTICIPANT_COLS} FROM battle_participants WHERE battle_id = $1 ORDER BY id"
    ))
    .bind(battle_id)
    .fetch_all(db)
    .await
    .context("fetching participants")?
    .into_iter()
    .map(ParticipantRow::into_domain)
    .collect::<Result<Vec<_>>>()?;

    Ok(Some((battle, participants)))
}

/// Writes the mutated aggregate back: the battle row plus every
/// participant row (they are all locked already; battles are small).
pub async fn persist(conn: &mut PgConnection, agg: &BattleAggregate) -> Result<()> {
    let b = &agg.battle;
    sqlx::query(
        "UPDATE battles SET status = $2, settings = $3, winner_warband_id = $4, \
         updated_at = $5, started_at = $6, ended_at = $7, post_processed_at = $8 \
         WHERE id = $1",
    )
    .bind(b.id)
    .bind(b.status.as_str())
    .bind(&b.settings)
    .bind(b.winner_warband_id)
    .bind(b.updated_at)
    .bind(b.started_at)
    .bind(b.ended_at)
    .bind(b.post_processed_at)
    .execute(&mut *conn)
    .await
    .context("updating battle row")?;

    for p in &agg.participants {
        sqlx::query(
            "UPDATE battle_participants SET status = $2, connected = $3, last_seen_at = $4, \
             responded_at = $5, prebattle_joined_at = $6, ready_at = $7, canceled_at = $8, \
             battle_joined_at = $9, finished_at = $10, confirmed_at = $11, \
             last_ack_event_id = $12, selected_units = $13, stat_overrides = $14, \
             custom_units = $15, rating = $16 \
             WHERE id = $1",
        )
        .bind(p.id)
        .bind(p.status.as_str())
        .bind(p.connected)
        .bind(p.last_seen_at)
        .bind(p.responded_at)
        .bind(p.prebattle_joined_at)
        .bind(p.ready_at)
        .bind(p.canceled_at)
        .bind(p.battle_joined_at)
        .bind(p.finished_at)
        .bind(p.confirmed_at)
        .bind(p.last_ack_event_id)
        .bind(serde_json::to_value(&p.selected_units)?)
        .bind(serde_json::to_value(&p.stat_overrides)?)
        .bind(serde_json::to_value(&p.custom_units)?)
        .bind(p.rating)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("updating participant {}", p.id))?;
    }
    Ok(())
}

/// Appends ledger events produced by an action, in order, inside the
/// owning transaction.
pub async fn insert_events(conn: &mut PgConnection, events: &[Event]) -> Result<()> {
    for e in events {
        sqlx::query(
            "INSERT INTO battle_events (battle_id, id, event_type, actor_user_id, payload, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(e.battle_id)
        .bind(e.id)
        .bind(e.event_type.as_str())
        .bind(e.actor_user_id)
        .bind(&e.payload)
        .bind(e.created_at)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("appending event {}/{}", e.battle_id, e.id))?;
    }
    Ok(())
}

/// Inserts a freshly planned battle, its participants (in roster order,
/// ids assigned by the store) and the `battle_created` ledger entry.
pub async fn insert_battle(
    conn: &mut PgConnection,
    new: &NewBattle,
    now: DateTime<Utc>,
) -> Result<(Vec<Participant>, Event)> {
    let b = &new.battle;
    sqlx::query(
        "INSERT INTO battles (id, campaign_id, created_by, title, scenario, status, settings, \
         created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(b.id)
    .bind(b.campaign_id)
    .bind(b.created_by)
    .bind(&b.title)
    .bind(&b.scenario)
    .bind(b.status.as_str())
    .bind(&b.settings)
    .bind(b.created_at)
    .bind(b.updated_at)
    .execute(&mut *conn)
    .await
    .context("inserting battle")?;

    let mut participants = Vec::with_capacity(new.participants.len());
    for p in &new.participants {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO battle_participants \
             (battle_id, user_id, warband_id, status, invited_by, invited_at, responded_at, rating) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
        )
        .bind(b.id)
        .bind(p.user_id)
        .bind(p.warband_id)
        .bind(p.status.as_str())
        .bind(p.invited_by)
        .bind(p.invited_at)
        .bind(p.responded_at)
        .bind(p.rating)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("inserting participant for user {}", p.user_id))?;

        participants.push(Participant {
            id,
            battle_id: b.id,
            user_id: p.user_id,
            warband_id: p.warband_id,
            status: p.status,
            connected: false,
            last_seen_at: None,
            invited_by: p.invited_by,
            invited_at: Some(p.invited_at),
            responded_at: p.responded_at,
            prebattle_joined_at: None,
            ready_at: None,
            canceled_at: None,
            battle_joined_at: None,
            finished_at: None,
            confirmed_at: None,
            last_ack_event_id: 0,
            selected_units: Vec::new(),
            stat_overrides: Default::default(),
            custom_units: Vec::new(),
            rating: p.rating,
        });
    }

    let created = Event {
        id: 1,
        battle_id: b.id,
        event_type: EventType::BattleCreated,
        actor_user_id: Some(b.created_by),
        payload: new.created_payload.clone(),
        created_at: now,
    };
    insert_events(conn, std::slice::from_ref(&created)).await?;

    Ok((participants, created))
}

/// Everything after `since`, in ledger order.
pub async fn events_since(db: &PgPool, battle_id: Uuid, since: i64) -> Result<Vec<Event>> {
    sqlx::query_as::<_, EventRow>(
        "SELECT id, battle_id, event_type, actor_user_id, payload, created_at \
           FROM battle_events WHERE battle_id = $1 AND id > $2 ORDER BY id",
    )
    .bind(battle_id)
    .bind(since)
    .fetch_all(db)
    .await
    .context("fetching events")?
    .into_iter()
    .map(EventRow::into_domain)
    .collect()
}

/// All recorded kills of one battle, for finalization.
pub async fn kill_events(conn: &mut PgConnection, battle_id: Uuid) -> Result<Vec<Event>> {
    sqlx::query_as::<_, EventRow>(
        "SELECT id, battle_id, event_type, actor_user_id, payload, created_at \
           FROM battle_events WHERE battle_id = $1 AND event_type = $2 ORDER BY id",
    )
    .bind(battle_id)
    .bind(EventType::KillRecorded.as_str())
    .fetch_all(&mut *conn)
    .await
    .context("fetching kill events")?
    .into_iter()
    .map(EventRow::into_domain)
    .collect()
}

/// Presence side effect of a state fetch: mark the caller online and
/// move their acknowledged-event high-water mark forward (never back).
pub async fn touch_presence(
    db: &PgPool,
    participant_id: i64,
    acked_event_id: i64,
) -> Result<()> {
    sqlx::query(
        "UPDATE battle_participants SET connected = TRUE, last_seen_at = NOW(), \
         last_ack_event_id = GREATEST(last_ack_event_id, $2) WHERE id = $1",
    )
    .bind(participant_id)
    .bind(acked_event_id)
    .execute(db)
    .await
    .context("updating presence")?;
    Ok(())
}

/// Lobby listing: battles of a campaign, newest first.
#[derive(Debug, serde::Serialize, sqlx::FromRow)]
pub struct BattleSummary {
    pub id: Uuid,
    pub title: Option<String>,
    pub scenario: String,
    pub status: String,
    pub winner_warband_id: Option<Uuid>,
    pub participant_count: i64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

pub async fn list_for_campaign(db: &PgPool, campaign_id: Uuid) -> Result<Vec<BattleSummary>> {
    sqlx::query_as::<_, BattleSummary>(
        "SELECT b.id, b.title, b.scenario, b.status, b.winner_warband_id, \
                COUNT(p.id) AS participant_count, b.created_at, b.started_at, b.ended_at \
           FROM battles b \
           LEFT JOIN battle_participants p ON p.battle_id = b.id \
          WHERE b.campaign_id = $1 \
          GROUP BY b.id \
          ORDER BY b.created_at DESC \
          LIMIT 100",
    )
    .bind(campaign_id)
    .fetch_all(db)
    .await
    .context("listing campaign battles")
}
