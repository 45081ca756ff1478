//! Participant configuration: selection cleanup, stat overrides and
//! custom units.

use serde_json::json;
use warcamp_server::battle::config_rules::{
    normalize_custom_units, normalize_selected_units, normalize_stat_overrides,
};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn selected_units_trim_dedupe_keep_first() {
    let raw = strings(&["  hero:1 ", "henchman:3", "hero:1", "", "   "]);
    let out = normalize_selected_units(&raw);
    assert_eq!(out, strings(&["hero:1", "henchman:3"]));

    // normalizing again changes nothing
    assert_eq!(normalize_selected_units(&out), out);
}

#[test]
fn override_numeric_stats_clamp_into_range() {
    let raw = json!({
        "hero:1": { "reason": "injury", "stats": { "strength": 42, "toughness": -3 } }
    });
    let out = normalize_stat_overrides(&raw).unwrap();
    let entry = &out["hero:1"];
    assert_eq!(entry.stats["strength"], json!(10));
    assert_eq!(entry.stats["toughness"], json!(0));
}

#[test]
fn fractional_stat_values_reject() {
    let raw = json!({
        "hero:1": { "stats": { "strength": 3.7 } }
    });
    assert!(normalize_stat_overrides(&raw).is_err());

    // integer-valued floats are still integers
    let whole = json!({
        "hero:1": { "stats": { "strength": 3.0 } }
    });
    let out = normalize_stat_overrides(&whole).unwrap();
    assert_eq!(out["hero:1"].stats["strength"], json!(3));
}

#[test]
fn override_reason_length_is_bounded() {
    let raw = json!({
        "hero:1": { "reason": "x".repeat(161) }
    });
    assert!(normalize_stat_overrides(&raw).is_err());

    let ok = json!({
        "hero:1": { "reason": "x".repeat(160) }
    });
    assert!(normalize_stat_overrides(&ok).is_ok());
}

#[test]
fn override_unknown_stat_key_rejects() {
    let raw = json!({
        "hero:1": { "stats": { "charisma": 5 } }
    });
    assert!(normalize_stat_overrides(&raw).is_err());
}

#[test]
fn override_unknown_field_rejects() {
    let raw = json!({
        "hero:1": { "reasn": "typo", "stats": {} }
    });
    assert!(normalize_stat_overrides(&raw).is_err());
}

#[test]
fn empty_override_entries_are_dropped() {
    let raw = json!({
        "hero:1": { "reason": "  ", "stats": {} },
        "hero:2": { "reason": "blessed" }
    });
    let out = normalize_stat_overrides(&raw).unwrap();
    assert!(!out.contains_key("hero:1"));
    assert_eq!(out["hero:2"].reason, "blessed");
}

#[test]
fn armour_save_is_a_bounded_string() {
    let raw = json!({
        "hero:1": { "stats": { "armour_save": " 4+ " } }
    });
    let out = normalize_stat_overrides(&raw).unwrap();
    assert_eq!(out["hero:1"].stats["armour_save"], json!("4+"));

    let too_long = json!({
        "hero:1": { "stats": { "armour_save": "x".repeat(21) } }
    });
    assert!(normalize_stat_overrides(&too_long).is_err());
}

#[test]
fn custom_unit_defaults_and_clamps() {
    let raw = json!([{
        "key": "custom:ogre",
        "name": "Hired Ogre",
        "unit_type": "ogre",
        "rating": 250000,
        "stats": { "strength": 4 }
    }]);
    let out = normalize_custom_units(&raw).unwrap();
    assert_eq!(out.len(), 1);
    let ogre = &out[0];
    assert_eq!(ogre.rating, 9999);
    assert_eq!(ogre.stats.strength, 4);
    // unspecified stats default to zero, armour save to empty
    assert_eq!(ogre.stats.movement, 0);
    assert_eq!(ogre.stats.armour_save, "");
}

#[test]
fn custom_unit_key_must_carry_prefix() {
    let raw = json!([{ "key": "ogre", "name": "Ogre", "unit_type": "ogre" }]);
    assert!(normalize_custom_units(&raw).is_err());

    // a bare prefix is not a key either
    let bare = json!([{ "key": "custom:", "name": "Ogre", "unit_type": "ogre" }]);
    assert!(normalize_custom_units(&bare).is_err());
}

#[test]
fn duplicate_custom_unit_keys_reject() {
    let raw = json!([
        { "key": "custom:ogre", "name": "Ogre", "unit_type": "ogre" },
        { "key": "custom:ogre", "name": "Other Ogre", "unit_type": "ogre" }
    ]);
    assert!(normalize_custom_units(&raw).is_err());
}

#[test]
fn custom_unit_requires_name_and_type() {
    let raw = json!([{ "key": "custom:ogre", "name": "  ", "unit_type": "ogre" }]);
    assert!(normalize_custom_units(&raw).is_err());
}
