//! Closed event-type enum plus boundary validation for the three
//! player-submittable payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::BattleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    BattleCreated,
    BattleStarted,
    BattleEnteredPostbattle,
    BattleEnded,
    BattleCanceled,
    WinnerDeclared,
    ParticipantJoinedBattle,
    ParticipantFinishedBattle,
    ParticipantConfirmedPostbattle,
    KillRecorded,
    DeathRecorded,
    ItemUsed,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::BattleCreated => "battle_created",
            EventType::BattleStarted => "battle_started",
            EventType::BattleEnteredPostbattle => "battle_entered_postbattle",
            EventType::BattleEnded => "battle_ended",
            EventType::BattleCanceled => "battle_canceled",
            EventType::WinnerDeclared => "winner_declared",
            EventType::ParticipantJoinedBattle => "participant_joined_battle",
            EventType::ParticipantFinishedBattle => "participant_finished_battle",
            EventType::ParticipantConfirmedPostbattle => "participant_confirmed_postbattle",
            EventType::KillRecorded => "kill_recorded",
            EventType::DeathRecorded => "death_recorded",
            EventType::ItemUsed => "item_used",
        }
    }

    /// The only types a client may push through `POST /battles/{id}/events`.
    pub fn player_submittable(self) -> bool {
        matches!(
            self,
            EventType::KillRecorded | EventType::DeathRecorded | EventType::ItemUsed
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "battle_created" => EventType::BattleCreated,
            "battle_started" => EventType::BattleStarted,
            "battle_entered_postbattle" => EventType::BattleEnteredPostbattle,
            "battle_ended" => EventType::BattleEnded,
            "battle_canceled" => EventType::BattleCanceled,
            "winner_declared" => EventType::WinnerDeclared,
            "participant_joined_battle" => EventType::ParticipantJoinedBattle,
            "participant_finished_battle" => EventType::ParticipantFinishedBattle,
            "participant_confirmed_postbattle" => EventType::ParticipantConfirmedPostbattle,
            "kill_recorded" => EventType::KillRecorded,
            "death_recorded" => EventType::DeathRecorded,
            "item_used" => EventType::ItemUsed,
            other => return Err(format!("unknown event type '{other}'")),
        })
    }
}

/// Which catalog a recorded kill is credited to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Hero,
    HiredSword,
    Henchman,
    Custom,
}

impl UnitKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitKind::Hero => "hero",
            UnitKind::HiredSword => "hired_sword",
            UnitKind::Henchman => "henchman",
            UnitKind::Custom => "custom",
        }
    }

    /// Custom units have no catalog row, so they never aggregate.
    pub fn aggregatable(self) -> bool {
        !matches!(self, UnitKind::Custom)
    }
}

impl FromStr for UnitKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "hero" => UnitKind::Hero,
            "hired_sword" => UnitKind::HiredSword,
            "henchman" => UnitKind::Henchman,
            "custom" => UnitKind::Custom,
            other => return Err(format!("unknown killer unit type '{other}'")),
        })
    }
}

/// Validates and normalizes a player-submitted event payload.
///
/// All three types must be JSON objects. `kill_recorded` additionally
/// requires `killer_unit_type`; non-custom kinds need a positive integer
/// `killer_unit_id`, the custom kind needs a non-empty `killer_unit_key`
/// and drops any stray numeric id. Extra fields (victim info, notes)
/// pass through untouched.
pub fn validate_player_payload(
    event_type: EventType,
    payload: &Value,
) -> Result<Value, BattleError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| BattleError::validation("event payload must be a JSON object"))?;

    match event_type {
        EventType::KillRecorded => normalize_kill(obj).map(Value::Object),
        EventType::DeathRecorded | EventType::ItemUsed => Ok(Value::Object(obj.clone())),
        _ => Err(BattleError::validation(format!(
            "event type '{event_type}' is not player-submittable"
        ))),
    }
}

fn normalize_kill(obj: &Map<String, Value>) -> Result<Map<String, Value>, BattleError> {
    let kind_str = obj
        .get("killer_unit_type")
        .and_then(Value::as_str)
        .ok_or_else(|| BattleError::validation("killer_unit_type is required"))?;
    let kind: UnitKind = kind_str.parse().map_err(BattleError::Validation)?;

    let mut out = obj.clone();
    out.insert("killer_unit_type".into(), Value::from(kind.as_str()));

    if kind == UnitKind::Custom {
        let key = obj
            .get("killer_unit_key")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                BattleError::validation("custom kills require a non-empty killer_unit_key")
            })?;
        out.insert("killer_unit_key".into(), Value::from(key));
        // No catalog row backs a custom unit; a numeric id is meaningless.
        out.remove("killer_unit_id");
    } else {
        let id = obj
            .get("killer_unit_id")
            .and_then(Value::as_i64)
            .filter(|id| *id > 0)
            .ok_or_else(|| {
                BattleError::validation("killer_unit_id must be a positive integer")
            })?;
        out.insert("killer_unit_id".into(), Value::from(id));
    }

    Ok(out)
}

/// Reads the aggregation key back out of a stored `kill_recorded`
/// payload. Returns `None` for custom kills and for malformed rows
/// (pre-validation data cannot be assumed for the whole ledger history).
pub fn kill_target(payload: &Value) -> Option<(UnitKind, i64)> {
    let kind: UnitKind = payload.get("killer_unit_type")?.as_str()?.parse().ok()?;
    if !kind.aggregatable() {
        return None;
    }
    let id = payload.get("killer_unit_id")?.as_i64()?;
    (id > 0).then_some((kind, id))
}
