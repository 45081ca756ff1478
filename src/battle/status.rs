//! Battle and participant lifecycle enums.
//!
//! Stored as snake_case text in Postgres; parsed back through `FromStr`
//! so an out-of-graph value in the store surfaces as an error instead of
//! silently mapping to a default.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Battle lifecycle: `inviting → prebattle → active → postbattle → ended`,
/// with `canceled` reachable from the two pre-active states. `ended` and
/// `canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleStatus {
    Inviting,
    Prebattle,
    Active,
    Postbattle,
    Ended,
    Canceled,
}

impl BattleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BattleStatus::Inviting => "inviting",
            BattleStatus::Prebattle => "prebattle",
            BattleStatus::Active => "active",
            BattleStatus::Postbattle => "postbattle",
            BattleStatus::Ended => "ended",
            BattleStatus::Canceled => "canceled",
        }
    }

    /// No transition leaves `ended` or `canceled`.
    pub fn is_terminal(self) -> bool {
        matches!(self, BattleStatus::Ended | BattleStatus::Canceled)
    }

    /// Participant configuration (unit selection, overrides, custom units)
    /// stays editable until the battle closes.
    pub fn config_open(self) -> bool {
        matches!(
            self,
            BattleStatus::Prebattle | BattleStatus::Active | BattleStatus::Postbattle
        )
    }

    /// Self/creator cancel is only possible before the battle starts.
    pub fn cancelable(self) -> bool {
        matches!(self, BattleStatus::Inviting | BattleStatus::Prebattle)
    }
}

impl fmt::Display for BattleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BattleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "inviting" => BattleStatus::Inviting,
            "prebattle" => BattleStatus::Prebattle,
            "active" => BattleStatus::Active,
            "postbattle" => BattleStatus::Postbattle,
            "ended" => BattleStatus::Ended,
            "canceled" => BattleStatus::Canceled,
            other => return Err(format!("unknown battle status '{other}'")),
        })
    }
}

/// Per-participant sub-state, nested inside the battle lifecycle.
/// Forward-only except the ready toggle; `canceled_prebattle` is reachable
/// from any pre-active state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Invited,
    Accepted,
    JoinedPrebattle,
    Ready,
    InBattle,
    FinishedBattle,
    ConfirmedPostbattle,
    CanceledPrebattle,
}

impl ParticipantStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ParticipantStatus::Invited => "invited",
            ParticipantStatus::Accepted => "accepted",
            ParticipantStatus::JoinedPrebattle => "joined_prebattle",
            ParticipantStatus::Ready => "ready",
            ParticipantStatus::InBattle => "in_battle",
            ParticipantStatus::FinishedBattle => "finished_battle",
            ParticipantStatus::ConfirmedPostbattle => "confirmed_postbattle",
            ParticipantStatus::CanceledPrebattle => "canceled_prebattle",
        }
    }

    /// Accepted the invite (or anything further along the happy path).
    pub fn has_accepted(self) -> bool {
        !matches!(
            self,
            ParticipantStatus::Invited | ParticipantStatus::CanceledPrebattle
        )
    }

    /// Done fighting: finished or already confirmed.
    pub fn has_finished(self) -> bool {
        matches!(
            self,
            ParticipantStatus::FinishedBattle | ParticipantStatus::ConfirmedPostbattle
        )
    }

    pub fn is_canceled(self) -> bool {
        matches!(self, ParticipantStatus::CanceledPrebattle)
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "invited" => ParticipantStatus::Invited,
            "accepted" => ParticipantStatus::Accepted,
            "joined_prebattle" => ParticipantStatus::JoinedPrebattle,
            "ready" => ParticipantStatus::Ready,
            "in_battle" => ParticipantStatus::InBattle,
            "finished_battle" => ParticipantStatus::FinishedBattle,
            "confirmed_postbattle" => ParticipantStatus::ConfirmedPostbattle,
            "canceled_prebattle" => ParticipantStatus::CanceledPrebattle,
            other => return Err(format!("unknown participant status '{other}'")),
        })
    }
}
