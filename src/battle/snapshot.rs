//! The combined payload returned by every successful battle call:
//! current battle, all participants, and the freshly relevant events
//! (new ones for mutations, everything-since-N for state fetches).

use serde::Serialize;

use crate::battle::model::{Battle, Event, Participant};

#[derive(Debug, Serialize)]
pub struct Snapshot {
    pub battle: Battle,
    pub participants: Vec<Participant>,
    pub events: Vec<Event>,
}
