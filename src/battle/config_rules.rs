//! Validation & normalization for participant-supplied battle
//! configuration: selected unit keys, per-unit stat overrides and
//! fully ad-hoc custom units (§ player config).
//!
//! Every rule here is all-or-nothing: one bad entry rejects the whole
//! request and nothing is applied.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::BattleError;

/// The nine numeric attributes of a profile line, in profile order.
pub const NUMERIC_STATS: [&str; 9] = [
    "movement",
    "weapon_skill",
    "ballistic_skill",
    "strength",
    "toughness",
    "wounds",
    "initiative",
    "attacks",
    "leadership",
];

pub const STAT_MIN: i64 = 0;
pub const STAT_MAX: i64 = 10;
pub const ARMOUR_SAVE_MAX_LEN: usize = 20;
pub const NAME_MAX_LEN: usize = 120;
pub const REASON_MAX_LEN: usize = 160;
pub const RATING_MAX: i64 = 9999;
pub const CUSTOM_KEY_PREFIX: &str = "custom:";

/// One stored stat override: why, and which recognized keys change.
/// Values are already normalized (numbers clamped, armour_save a string).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatOverride {
    pub reason: String,
    pub stats: BTreeMap<String, Value>,
}

/// A complete normalized profile line for a custom unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatBlock {
    pub movement: i64,
    pub weapon_skill: i64,
    pub ballistic_skill: i64,
    pub strength: i64,
    pub toughness: i64,
    pub wounds: i64,
    pub initiative: i64,
    pub attacks: i64,
    pub leadership: i64,
    pub armour_save: String,
}

/// An ad-hoc unit that exists only inside one battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomUnit {
    pub key: String,
    pub name: String,
    pub unit_type: String,
    pub reason: String,
    pub rating: i64,
    pub stats: StatBlock,
}

/// Trims entries, drops empties, removes duplicates keeping the first
/// occurrence. Idempotent: normalizing a normalized list is a no-op.
pub fn normalize_selected_units(raw: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for key in raw {
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        if seen.insert(key.to_owned()) {
            out.push(key.to_owned());
        }
    }
    out
}

// Incoming shapes. `deny_unknown_fields` so a typoed field is a 400
// instead of a silent drop.

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOverride {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    stats: BTreeMap<String, Value>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCustomUnit {
    key: String,
    name: String,
    unit_type: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    rating: i64,
    #[serde(default)]
    stats: BTreeMap<String, Value>,
}

fn clamp_stat(v: i64) -> i64 {
    v.clamp(STAT_MIN, STAT_MAX)
}

fn numeric_stat(key: &str, value: &Value) -> Result<i64, BattleError> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        .map(clamp_stat)
        .ok_or_else(|| BattleError::validation(format!("stat '{key}' must be an integer")))
}

fn armour_save_stat(value: &Value) -> Result<String, BattleError> {
    let s = value
        .as_str()
        .ok_or_else(|| BattleError::validation("armour_save must be a string"))?
        .trim()
        .to_owned();
    if s.chars().count() > ARMOUR_SAVE_MAX_LEN {
        return Err(BattleError::validation(format!(
            "armour_save exceeds {ARMOUR_SAVE_MAX_LEN} characters"
        )));
    }
    Ok(s)
}

/// Normalizes a `unit key → override` map. Unknown stat keys reject the
/// request; integer stat values clamp into [0,10] while fractional
/// numbers reject; an entry with an empty
/// reason and no stats is dropped; key collisions are impossible at this
/// point (JSON objects de-duplicate, last value wins).
pub fn normalize_stat_overrides(
    raw: &Value,
) -> Result<BTreeMap<String, StatOverride>, BattleError> {
    let map: BTreeMap<String, RawOverride> = serde_json::from_value(raw.clone())
        .map_err(|e| BattleError::validation(format!("bad stat_overrides: {e}")))?;

    let mut out = BTreeMap::new();
    for (unit_key, entry) in map {
        let unit_key = unit_key.trim().to_owned();
        if unit_key.is_empty() {
            return Err(BattleError::validation("stat override unit key is empty"));
        }

        let mut stats = BTreeMap::new();
        for (key, value) in &entry.stats {
            if key == "armour_save" {
                stats.insert(key.clone(), Value::from(armour_save_stat(value)?));
            } else if NUMERIC_STATS.contains(&key.as_str()) {
                stats.insert(key.clone(), Value::from(numeric_stat(key, value)?));
            } else {
                return Err(BattleError::validation(format!(
                    "unknown stat key '{key}'"
                )));
            }
        }

        let reason = entry.reason.trim().to_owned();
        if reason.is_empty() && stats.is_empty() {
            continue;
        }
        if reason.chars().count() > REASON_MAX_LEN {
            return Err(BattleError::validation(format!(
                "override reason exceeds {REASON_MAX_LEN} characters"
            )));
        }
        out.insert(unit_key, StatOverride { reason, stats });
    }
    Ok(out)
}

fn bounded_name(field: &str, value: &str, max: usize) -> Result<String, BattleError> {
    let v = value.trim().to_owned();
    if v.is_empty() {
        return Err(BattleError::validation(format!("custom unit {field} is required")));
    }
    if v.chars().count() > max {
        return Err(BattleError::validation(format!(
            "custom unit {field} exceeds {max} characters"
        )));
    }
    Ok(v)
}

/// Normalizes the custom-unit batch. Keys must be unique and carry the
/// `custom:` prefix; missing numeric stats default to 0, armour save to
/// an empty string; rating clamps into [0,9999].
pub fn normalize_custom_units(raw: &Value) -> Result<Vec<CustomUnit>, BattleError> {
    let list: Vec<RawCustomUnit> = serde_json::from_value(raw.clone())
        .map_err(|e| BattleError::validation(format!("bad custom_units: {e}")))?;

    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(list.len());
    for unit in list {
        let key = unit.key.trim().to_owned();
        if !key.starts_with(CUSTOM_KEY_PREFIX) || key.len() == CUSTOM_KEY_PREFIX.len() {
            return Err(BattleError::validation(format!(
                "custom unit key must start with '{CUSTOM_KEY_PREFIX}'"
            )));
        }
        if !seen.insert(key.clone()) {
            return Err(BattleError::validation(format!(
                "duplicate custom unit key '{key}'"
            )));
        }

        let mut stats = StatBlock::default();
        for (stat_key, value) in &unit.stats {
            match stat_key.as_str() {
                "movement" => stats.movement = numeric_stat(stat_key, value)?,
                "weapon_skill" => stats.weapon_skill = numeric_stat(stat_key, value)?,
                "ballistic_skill" => stats.ballistic_skill = numeric_stat(stat_key, value)?,
                "strength" => stats.strength = numeric_stat(stat_key, value)?,
                "toughness" => stats.toughness = numeric_stat(stat_key, value)?,
                "wounds" => stats.wounds = numeric_stat(stat_key, value)?,
                "initiative" => stats.initiative = numeric_stat(stat_key, value)?,
                "attacks" => stats.attacks = numeric_stat(stat_key, value)?,
                "leadership" => stats.leadership = numeric_stat(stat_key, value)?,
                "armour_save" => stats.armour_save = armour_save_stat(value)?,
                other => {
                    return Err(BattleError::validation(format!(
                        "unknown stat key '{other}'"
                    )))
                }
            }
        }

        let reason = unit.reason.trim().to_owned();
        if reason.chars().count() > REASON_MAX_LEN {
            return Err(BattleError::validation(format!(
                "custom unit reason exceeds {REASON_MAX_LEN} characters"
            )));
        }

        out.push(CustomUnit {
            key,
            name: bounded_name("name", &unit.name, NAME_MAX_LEN)?,
            unit_type: bounded_name("unit type", &unit.unit_type, NAME_MAX_LEN)?,
            reason,
            rating: unit.rating.clamp(0, RATING_MAX),
            stats,
        });
    }
    Ok(out)
}
