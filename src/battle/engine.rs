//! Battle lifecycle engine.
//!
//! `BattleAggregate` is the unit of locking: the battle row plus every
//! participant row, loaded `FOR UPDATE` by the service layer. Every
//! action below runs synchronously against that in-memory copy and
//! reports what changed through an [`ActionOutcome`]; the service
//! persists rows and appended events in the same transaction and
//! publishes outbound notices only after commit. Keeping the engine
//! free of I/O is what lets the state-machine rules be tested without
//! a database.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::battle::config_rules::{
    normalize_custom_units, normalize_selected_units, normalize_stat_overrides,
};
use crate::battle::events::{validate_player_payload, EventType};
use crate::battle::model::{Battle, Event, Participant};
use crate::battle::status::{BattleStatus, ParticipantStatus};
use crate::error::BattleError;
use crate::protocol::{Outbound, PushMsg};

pub const SCENARIO_MAX_LEN: usize = 120;
pub const TITLE_MAX_LEN: usize = 120;

/// What a single action did: events appended to the ledger, notices to
/// publish after commit, whether any row changed at all (idempotent
/// repeats report `changed == false` and nothing is written), and
/// whether kill aggregation is due in the surrounding transaction.
#[derive(Debug, Default)]
pub struct ActionOutcome {
    pub events: Vec<Event>,
    pub outbound: Vec<Outbound>,
    pub changed: bool,
    pub finalize_due: bool,
}

/// Participant-supplied configuration patch. Omitted fields keep their
/// stored value; present fields are validated as a batch before any of
/// them is applied.
#[derive(Debug, Default)]
pub struct ConfigUpdate {
    pub selected_units: Option<Vec<String>>,
    pub stat_overrides: Option<Value>,
    pub custom_units: Option<Value>,
    pub rating: Option<i64>,
}

/// A battle plus all of its participants, locked for one action.
#[derive(Debug, Clone)]
pub struct BattleAggregate {
    pub battle: Battle,
    pub participants: Vec<Participant>,
    last_event_id: i64,
}

impl BattleAggregate {
    pub fn new(battle: Battle, participants: Vec<Participant>, last_event_id: i64) -> Self {
        Self {
            battle,
            participants,
            last_event_id,
        }
    }

    pub fn last_event_id(&self) -> i64 {
        self.last_event_id
    }

    fn participant_for(&self, user_id: Uuid) -> Result<&Participant, BattleError> {
        self.participants
            .iter()
            .find(|p| p.user_id == user_id)
            .ok_or(BattleError::NotFound)
    }

    fn participant_mut(&mut self, user_id: Uuid) -> Result<&mut Participant, BattleError> {
        self.participants
            .iter_mut()
            .find(|p| p.user_id == user_id)
            .ok_or(BattleError::NotFound)
    }

    fn append(
        &mut self,
        out: &mut ActionOutcome,
        event_type: EventType,
        actor: Option<Uuid>,
        payload: Value,
        now: DateTime<Utc>,
    ) {
        self.last_event_id += 1;
        out.events.push(Event {
            id: self.last_event_id,
            battle_id: self.battle.id,
            event_type,
            actor_user_id: actor,
            payload,
            created_at: now,
        });
        out.changed = true;
    }

    fn state_changed(&self, out: &mut ActionOutcome) {
        out.outbound.push(Outbound::Battle(
            self.battle.id,
            PushMsg::BattleStateChanged {
                battle_id: self.battle.id,
                campaign_id: self.battle.campaign_id,
                status: self.battle.status,
            },
        ));
    }

    fn notify_user(&self, out: &mut ActionOutcome, user_id: Uuid) {
        out.outbound.push(Outbound::User(
            user_id,
            PushMsg::BattleStateChanged {
                battle_id: self.battle.id,
                campaign_id: self.battle.campaign_id,
                status: self.battle.status,
            },
        ));
    }

    fn touch(&mut self, out: &mut ActionOutcome, now: DateTime<Utc>) {
        self.battle.updated_at = now;
        out.changed = true;
    }

    /// Accept an invitation, or (re)join a running battle. Behavior
    /// depends on the current battle status; repeats are no-ops.
    pub fn join(&mut self, user_id: Uuid, now: DateTime<Utc>) -> Result<ActionOutcome, BattleError> {
        let mut out = ActionOutcome::default();
        let status = self.participant_for(user_id)?.status;

        match self.battle.status {
            BattleStatus::Inviting => match status {
                ParticipantStatus::Invited => {
                    let p = self.participant_mut(user_id)?;
                    p.status = ParticipantStatus::Accepted;
                    p.responded_at.get_or_insert(now);
                    self.touch(&mut out, now);
                    if self.participants.iter().all(|p| p.status.has_accepted()) {
                        self.open_prebattle(&mut out, now);
                    }
                }
                ParticipantStatus::CanceledPrebattle => {
                    return Err(BattleError::invalid_state("participation was canceled"));
                }
                _ => {} // already accepted
            },
            BattleStatus::Prebattle | BattleStatus::Postbattle => {
                // prebattle membership is flipped in bulk; nothing to do
            }
            BattleStatus::Active => match status {
                ParticipantStatus::InBattle
                | ParticipantStatus::FinishedBattle
                | ParticipantStatus::ConfirmedPostbattle => {}
                ParticipantStatus::CanceledPrebattle => {
                    return Err(BattleError::invalid_state("participation was canceled"));
                }
                _ => {
                    let p = self.participant_mut(user_id)?;
                    p.status = ParticipantStatus::InBattle;
                    p.battle_joined_at.get_or_insert(now);
                    let payload = participant_payload(self.participant_for(user_id)?);
                    self.append(
                        &mut out,
                        EventType::ParticipantJoinedBattle,
                        Some(user_id),
                        payload,
                        now,
                    );
                    self.touch(&mut out, now);
                }
            },
            BattleStatus::Ended | BattleStatus::Canceled => {
                return Err(BattleError::invalid_state("battle is closed"));
            }
        }
        Ok(out)
    }

    /// Everyone has accepted: the lobby opens. Accepted participants
    /// flip to `joined_prebattle` in the same transaction.
    fn open_prebattle(&mut self, out: &mut ActionOutcome, now: DateTime<Utc>) {
        self.battle.status = BattleStatus::Prebattle;
        for p in &mut self.participants {
            if p.status == ParticipantStatus::Accepted {
                p.status = ParticipantStatus::JoinedPrebattle;
                p.prebattle_joined_at.get_or_insert(now);
            }
        }
        self.state_changed(out);
        let users: Vec<Uuid> = self.participants.iter().map(|p| p.user_id).collect();
        for user in users {
            self.notify_user(out, user);
        }
    }

    /// Toggle the ready flag. Only legal while the battle is in
    /// `prebattle`; unset reverts to wherever the participant was.
    pub fn set_ready(
        &mut self,
        user_id: Uuid,
        ready: bool,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome, BattleError> {
        let mut out = ActionOutcome::default();
        if self.battle.status != BattleStatus::Prebattle {
            return Err(BattleError::invalid_state(
                "ready can only be toggled during prebattle",
            ));
        }

        let p = self.participant_mut(user_id)?;
        if ready {
            match p.status {
                ParticipantStatus::Ready => {}
                ParticipantStatus::JoinedPrebattle => {
                    p.status = ParticipantStatus::Ready;
                    // first ready-at only; toggling never rewrites it
                    p.ready_at.get_or_insert(now);
                    self.touch(&mut out, now);
                }
                _ => {
                    return Err(BattleError::invalid_state(
                        "participant cannot ready up from the current state",
                    ))
                }
            }
        } else {
            match p.status {
                ParticipantStatus::Ready => {
                    p.status = if p.prebattle_joined_at.is_some() {
                        ParticipantStatus::JoinedPrebattle
                    } else {
                        ParticipantStatus::Accepted
                    };
                    self.touch(&mut out, now);
                }
                ParticipantStatus::JoinedPrebattle | ParticipantStatus::Accepted => {}
                _ => {
                    return Err(BattleError::invalid_state(
                        "participant cannot unready from the current state",
                    ))
                }
            }
        }
        Ok(out)
    }

    /// Creator-only: open the battle once every participant is ready.
    pub fn start(&mut self, user_id: Uuid, now: DateTime<Utc>) -> Result<ActionOutcome, BattleError> {
        let mut out = ActionOutcome::default();
        self.participant_for(user_id)?;
        if self.battle.created_by != user_id {
            return Err(BattleError::forbidden("only the creator may start the battle"));
        }
        if self.battle.status != BattleStatus::Prebattle {
            return Err(BattleError::invalid_state("battle is not in prebattle"));
        }
        if !self
            .participants
            .iter()
            .all(|p| p.status == ParticipantStatus::Ready)
        {
            return Err(BattleError::invalid_state(
                "waiting for all participants to be ready",
            ));
        }

        self.battle.status = BattleStatus::Active;
        self.battle.started_at = Some(now);
        for p in &mut self.participants {
            p.status = ParticipantStatus::InBattle;
            p.battle_joined_at.get_or_insert(now);
        }
        let ids: Vec<i64> = self.participants.iter().map(|p| p.id).collect();
        self.append(
            &mut out,
            EventType::BattleStarted,
            Some(user_id),
            json!({ "participant_ids": ids }),
            now,
        );
        self.touch(&mut out, now);
        self.state_changed(&mut out);
        let users: Vec<Uuid> = self.participants.iter().map(|p| p.user_id).collect();
        for user in users {
            self.notify_user(&mut out, user);
        }
        Ok(out)
    }

    /// Record a player-submitted event (`kill_recorded`, `death_recorded`
    /// or `item_used`). Payload is validated and normalized first.
    pub fn submit_event(
        &mut self,
        user_id: Uuid,
        event_type: EventType,
        payload: &Value,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome, BattleError> {
        let mut out = ActionOutcome::default();
        if !event_type.player_submittable() {
            return Err(BattleError::validation(format!(
                "event type '{event_type}' cannot be submitted"
            )));
        }
        let p = self.participant_for(user_id)?;

        let legal = match event_type {
            EventType::ItemUsed => {
                (self.battle.status == BattleStatus::Prebattle
                    && matches!(
                        p.status,
                        ParticipantStatus::JoinedPrebattle | ParticipantStatus::Ready
                    ))
                    || (self.battle.status == BattleStatus::Active
                        && p.status == ParticipantStatus::InBattle)
            }
            _ => {
                self.battle.status == BattleStatus::Active
                    && p.status == ParticipantStatus::InBattle
            }
        };
        if !legal {
            return Err(BattleError::invalid_state(format!(
                "cannot record '{event_type}' while battle is {} and participant is {}",
                self.battle.status, p.status
            )));
        }

        let normalized = validate_player_payload(event_type, payload)?;
        self.append(&mut out, event_type, Some(user_id), normalized, now);
        self.touch(&mut out, now);
        Ok(out)
    }

    /// Leave the fight. Once every non-canceled participant is done the
    /// battle drops into `postbattle`. Idempotent.
    pub fn finish(&mut self, user_id: Uuid, now: DateTime<Utc>) -> Result<ActionOutcome, BattleError> {
        let mut out = ActionOutcome::default();
        let status = self.participant_for(user_id)?.status;

        match self.battle.status {
            BattleStatus::Ended => return Ok(out), // late repeat, keep snapshot semantics
            BattleStatus::Inviting | BattleStatus::Prebattle => {
                return Err(BattleError::invalid_state("battle has not started"));
            }
            BattleStatus::Canceled => {
                return Err(BattleError::invalid_state("battle was canceled"));
            }
            BattleStatus::Active | BattleStatus::Postbattle => {}
        }

        match status {
            ParticipantStatus::InBattle => {
                let p = self.participant_mut(user_id)?;
                p.status = ParticipantStatus::FinishedBattle;
                p.finished_at.get_or_insert(now);
                let payload = participant_payload(self.participant_for(user_id)?);
                self.append(
                    &mut out,
                    EventType::ParticipantFinishedBattle,
                    Some(user_id),
                    payload,
                    now,
                );
                self.touch(&mut out, now);
            }
            ParticipantStatus::FinishedBattle | ParticipantStatus::ConfirmedPostbattle => {
                return Ok(out);
            }
            _ => {
                return Err(BattleError::invalid_state(
                    "participant is not in the battle",
                ))
            }
        }

        if self.battle.status == BattleStatus::Active
            && self
                .participants
                .iter()
                .filter(|p| !p.status.is_canceled())
                .all(|p| p.status.has_finished())
        {
            self.battle.status = BattleStatus::Postbattle;
            self.append(
                &mut out,
                EventType::BattleEnteredPostbattle,
                None,
                json!({}),
                now,
            );
            self.state_changed(&mut out);
        }
        Ok(out)
    }

    /// Declare the winning warband. Only the most recently finished
    /// participant may do so; re-declaring the same winner is a no-op.
    pub fn declare_winner(
        &mut self,
        user_id: Uuid,
        winner_warband_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome, BattleError> {
        let mut out = ActionOutcome::default();
        let caller = self.participant_for(user_id)?;
        if self.battle.status != BattleStatus::Postbattle {
            return Err(BattleError::invalid_state(
                "winner can only be declared during postbattle",
            ));
        }
        if !caller.status.has_finished() {
            return Err(BattleError::invalid_state(
                "finish the battle before declaring a winner",
            ));
        }
        if !self
            .participants
            .iter()
            .any(|p| p.warband_id == winner_warband_id)
        {
            return Err(BattleError::validation(
                "winner warband is not part of this battle",
            ));
        }

        let last = self
            .participants
            .iter()
            .filter(|p| p.finished_at.is_some())
            .max_by_key(|p| (p.finished_at, p.id))
            .ok_or_else(|| BattleError::invalid_state("no participant has finished"))?;
        if last.user_id != user_id {
            return Err(BattleError::forbidden(
                "only the last finisher may declare the winner",
            ));
        }

        match self.battle.winner_warband_id {
            Some(current) if current == winner_warband_id => return Ok(out),
            Some(_) => {
                return Err(BattleError::invalid_state(
                    "a different winner has already been declared",
                ))
            }
            None => {}
        }

        self.battle.winner_warband_id = Some(winner_warband_id);
        self.append(
            &mut out,
            EventType::WinnerDeclared,
            Some(user_id),
            json!({ "winner_warband_id": winner_warband_id }),
            now,
        );
        self.touch(&mut out, now);
        self.maybe_end(&mut out, now);
        Ok(out)
    }

    /// Confirm the post-battle result. When a winner is set and every
    /// non-canceled participant has confirmed, the battle ends and
    /// finalization becomes due. Idempotent.
    pub fn confirm(&mut self, user_id: Uuid, now: DateTime<Utc>) -> Result<ActionOutcome, BattleError> {
        let mut out = ActionOutcome::default();
        let status = self.participant_for(user_id)?.status;

        match self.battle.status {
            BattleStatus::Canceled | BattleStatus::Inviting | BattleStatus::Prebattle => {
                return Err(BattleError::invalid_state(
                    "there is no battle result to confirm",
                ));
            }
            BattleStatus::Ended => return Ok(out),
            BattleStatus::Active | BattleStatus::Postbattle => {}
        }

        match status {
            ParticipantStatus::FinishedBattle => {
                let p = self.participant_mut(user_id)?;
                p.status = ParticipantStatus::ConfirmedPostbattle;
                p.confirmed_at.get_or_insert(now);
                let payload = participant_payload(self.participant_for(user_id)?);
                self.append(
                    &mut out,
                    EventType::ParticipantConfirmedPostbattle,
                    Some(user_id),
                    payload,
                    now,
                );
                self.touch(&mut out, now);
            }
            ParticipantStatus::ConfirmedPostbattle => {}
            _ => {
                return Err(BattleError::invalid_state(
                    "finish the battle before confirming",
                ))
            }
        }

        self.maybe_end(&mut out, now);
        Ok(out)
    }

    /// Close the battle exactly once. The post-processed timestamp is the
    /// idempotency guard for kill aggregation: it is written in the same
    /// transaction as the `ended` status, so a repeated confirm can never
    /// re-trigger the catalog increments.
    fn maybe_end(&mut self, out: &mut ActionOutcome, now: DateTime<Utc>) {
        let winner = match self.battle.winner_warband_id {
            Some(w) => w,
            None => return,
        };
        if self.battle.status != BattleStatus::Postbattle
            || self.battle.post_processed_at.is_some()
        {
            return;
        }
        let all_confirmed = self
            .participants
            .iter()
            .filter(|p| !p.status.is_canceled())
            .all(|p| p.status == ParticipantStatus::ConfirmedPostbattle);
        if !all_confirmed {
            return;
        }

        self.battle.status = BattleStatus::Ended;
        self.battle.ended_at = Some(now);
        self.battle.post_processed_at = Some(now);
        out.finalize_due = true;
        self.append(
            out,
            EventType::BattleEnded,
            None,
            json!({ "winner_warband_id": winner }),
            now,
        );
        self.touch(out, now);
        self.state_changed(out);
    }

    /// Withdraw own participation before the battle starts. The battle
    /// cancels once everyone has withdrawn.
    pub fn cancel_self(&mut self, user_id: Uuid, now: DateTime<Utc>) -> Result<ActionOutcome, BattleError> {
        let mut out = ActionOutcome::default();
        let status = self.participant_for(user_id)?.status;

        if status == ParticipantStatus::CanceledPrebattle {
            return Ok(out);
        }
        if !self.battle.status.cancelable() {
            return Err(BattleError::invalid_state(
                "battle can no longer be canceled",
            ));
        }

        let p = self.participant_mut(user_id)?;
        p.status = ParticipantStatus::CanceledPrebattle;
        p.canceled_at.get_or_insert(now);
        self.touch(&mut out, now);

        if self
            .participants
            .iter()
            .all(|p| p.status.is_canceled())
        {
            self.battle.status = BattleStatus::Canceled;
            self.append(&mut out, EventType::BattleCanceled, None, json!({}), now);
            self.state_changed(&mut out);
        }
        Ok(out)
    }

    /// Creator-only: cancel the whole battle in one step. Idempotent.
    pub fn cancel_battle(&mut self, user_id: Uuid, now: DateTime<Utc>) -> Result<ActionOutcome, BattleError> {
        let mut out = ActionOutcome::default();
        self.participant_for(user_id)?;
        if self.battle.created_by != user_id {
            return Err(BattleError::forbidden(
                "only the creator may cancel the battle",
            ));
        }
        if self.battle.status == BattleStatus::Canceled {
            return Ok(out);
        }
        if !self.battle.status.cancelable() {
            return Err(BattleError::invalid_state(
                "battle can no longer be canceled",
            ));
        }

        for p in &mut self.participants {
            if !p.status.is_canceled() {
                p.status = ParticipantStatus::CanceledPrebattle;
                p.canceled_at.get_or_insert(now);
            }
        }
        self.battle.status = BattleStatus::Canceled;
        self.append(
            &mut out,
            EventType::BattleCanceled,
            Some(user_id),
            json!({ "mode": "creator" }),
            now,
        );
        self.touch(&mut out, now);
        self.state_changed(&mut out);
        let users: Vec<Uuid> = self.participants.iter().map(|p| p.user_id).collect();
        for user in users {
            self.notify_user(&mut out, user);
        }
        Ok(out)
    }

    /// Apply a configuration patch to the caller's own participant row.
    /// The whole batch validates before anything is written.
    pub fn update_config(
        &mut self,
        user_id: Uuid,
        update: &ConfigUpdate,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome, BattleError> {
        let mut out = ActionOutcome::default();
        self.participant_for(user_id)?;
        if !self.battle.status.config_open() {
            return Err(BattleError::invalid_state(
                "battle configuration is locked",
            ));
        }

        let selected = update
            .selected_units
            .as_deref()
            .map(normalize_selected_units);
        let overrides = update
            .stat_overrides
            .as_ref()
            .map(normalize_stat_overrides)
            .transpose()?;
        let custom = update
            .custom_units
            .as_ref()
            .map(normalize_custom_units)
            .transpose()?;
        let rating = match update.rating {
            Some(r) if r < 0 => {
                return Err(BattleError::validation("rating must be non-negative"))
            }
            Some(r) => Some(r.min(i32::MAX as i64) as i32),
            None => None,
        };

        let p = self.participant_mut(user_id)?;
        if let Some(selected) = selected {
            p.selected_units = selected;
        }
        if let Some(overrides) = overrides {
            p.stat_overrides = overrides;
        }
        if let Some(custom) = custom {
            p.custom_units = custom;
        }
        if let Some(rating) = rating {
            p.rating = Some(rating);
        }
        self.touch(&mut out, now);
        self.state_changed(&mut out);
        Ok(out)
    }
}

fn participant_payload(p: &Participant) -> Value {
    json!({
        "participant_id": p.id,
        "user_id": p.user_id,
        "warband_id": p.warband_id,
    })
}

/// Everything needed to insert a brand-new battle: the battle row, the
/// participant rows (ids come from the store), the `battle_created`
/// payload and the users to invite.
#[derive(Debug)]
pub struct NewBattle {
    pub battle: Battle,
    pub participants: Vec<NewParticipant>,
    pub created_payload: Value,
    pub invites: Vec<Uuid>,
}

#[derive(Debug)]
pub struct NewParticipant {
    pub user_id: Uuid,
    pub warband_id: Uuid,
    pub status: ParticipantStatus,
    pub invited_by: Option<Uuid>,
    pub invited_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub rating: Option<i32>,
}

/// Pure half of battle creation. `roster` maps each campaign member to
/// their single warband; membership itself is resolved by the caller.
/// The creator is always included and the user list de-duplicated.
#[allow(clippy::too_many_arguments)]
pub fn plan_battle(
    campaign_id: Uuid,
    creator: Uuid,
    title: Option<&str>,
    scenario: &str,
    settings: Option<&Value>,
    user_ids: &[Uuid],
    ratings: &BTreeMap<Uuid, i64>,
    roster: &BTreeMap<Uuid, Uuid>,
    now: DateTime<Utc>,
) -> Result<NewBattle, BattleError> {
    let scenario = scenario.trim();
    if scenario.is_empty() {
        return Err(BattleError::validation("scenario is required"));
    }
    if scenario.chars().count() > SCENARIO_MAX_LEN {
        return Err(BattleError::validation(format!(
            "scenario exceeds {SCENARIO_MAX_LEN} characters"
        )));
    }
    let title = match title.map(str::trim) {
        Some("") | None => None,
        Some(t) if t.chars().count() > TITLE_MAX_LEN => {
            return Err(BattleError::validation(format!(
                "title exceeds {TITLE_MAX_LEN} characters"
            )))
        }
        Some(t) => Some(t.to_owned()),
    };
    let settings = match settings {
        Some(v) if !v.is_object() => {
            return Err(BattleError::validation("settings must be a JSON object"))
        }
        Some(v) => v.clone(),
        None => json!({}),
    };
    if let Some((user, rating)) = ratings.iter().find(|(_, r)| **r < 0) {
        return Err(BattleError::validation(format!(
            "rating {rating} for user {user} must be non-negative"
        )));
    }

    // Creator first, invitees in submitted order, duplicates dropped.
    let mut users = vec![creator];
    for u in user_ids {
        if !users.contains(u) {
            users.push(*u);
        }
    }

    let mut participants = Vec::with_capacity(users.len());
    for user in &users {
        let warband = roster
            .get(user)
            .ok_or_else(|| BattleError::validation(format!("user {user} has no warband")))?;
        let is_creator = *user == creator;
        participants.push(NewParticipant {
            user_id: *user,
            warband_id: *warband,
            status: if is_creator {
                ParticipantStatus::Accepted
            } else {
                ParticipantStatus::Invited
            },
            invited_by: (!is_creator).then_some(creator),
            invited_at: now,
            responded_at: is_creator.then_some(now),
            rating: ratings.get(user).map(|r| (*r).min(i32::MAX as i64) as i32),
        });
    }

    let battle = Battle {
        id: Uuid::new_v4(),
        campaign_id,
        created_by: creator,
        title,
        scenario: scenario.to_owned(),
        status: BattleStatus::Inviting,
        settings,
        winner_warband_id: None,
        created_at: now,
        updated_at: now,
        started_at: None,
        ended_at: None,
        post_processed_at: None,
    };

    let created_payload = json!({
        "scenario": battle.scenario,
        "participant_user_ids": users,
    });
    let invites = users.into_iter().filter(|u| *u != creator).collect();

    Ok(NewBattle {
        battle,
        participants,
        created_payload,
        invites,
    })
}
