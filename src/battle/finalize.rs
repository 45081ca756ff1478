//! Kill aggregation: rolls `kill_recorded` events into per-unit totals.

use std::collections::BTreeMap;

use crate::battle::events::{kill_target, EventType, UnitKind};
use crate::battle::model::Event;

/// One catalog increment: `kills = kills + count` for the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KillTally {
    pub kind: UnitKind,
    pub unit_id: i64,
    pub count: i64,
}

/// Groups a battle's `kill_recorded` events by (unit kind, unit id) and
/// sums them. Custom units have no catalog row and are skipped, as is
/// anything that is not a kill event. Deterministic order for stable
/// application and tests.
pub fn tally_kills(events: &[Event]) -> Vec<KillTally> {
    let mut totals: BTreeMap<(UnitKind, i64), i64> = BTreeMap::new();
    for event in events {
        if event.event_type != EventType::KillRecorded {
            continue;
        }
        if let Some((kind, unit_id)) = kill_target(&event.payload) {
            *totals.entry((kind, unit_id)).or_insert(0) += 1;
        }
    }
    totals
        .into_iter()
        .map(|((kind, unit_id), count)| KillTally {
            kind,
            unit_id,
            count,
        })
        .collect()
}
