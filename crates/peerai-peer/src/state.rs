//! Peer session lifecycle.
//!
//! A session moves `Idle → Negotiating → Connected → Exchanging → Closed`.
//! `Closed` and `Errored` are absorbing. Each role owns its half of the
//! triggers; `Superseded` and `Failed` apply to both.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Initiator,
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Negotiating,
    Connected,
    Exchanging,
    Closed,
    Errored,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Errored)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    OfferSent,
    OfferReceived,
    AnswerReceived,
    AnswerSent,
    RequestSent,
    RequestReceived,
    ReplyReceived,
    ReplySent,
    Superseded,
    Failed,
}

impl Trigger {
    /// The only role allowed to fire this trigger, if restricted.
    fn owner(self) -> Option<Role> {
        match self {
            Trigger::OfferSent
            | Trigger::AnswerReceived
            | Trigger::RequestSent
            | Trigger::ReplyReceived => Some(Role::Initiator),
            Trigger::OfferReceived
            | Trigger::AnswerSent
            | Trigger::RequestReceived
            | Trigger::ReplySent => Some(Role::Responder),
            Trigger::Superseded | Trigger::Failed => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {trigger:?} from {from:?} as {role:?}")]
pub struct InvalidTransition {
    pub role: Role,
    pub from: SessionState,
    pub trigger: Trigger,
}

pub fn transition(
    role: Role,
    from: SessionState,
    trigger: Trigger,
) -> Result<SessionState, InvalidTransition> {
    use SessionState::*;

    let invalid = InvalidTransition { role, from, trigger };

    if trigger.owner().is_some_and(|owner| owner != role) {
        return Err(invalid);
    }

    let next = match (from, trigger) {
        (Idle, Trigger::OfferSent | Trigger::OfferReceived) => Negotiating,
        (Negotiating, Trigger::AnswerReceived | Trigger::AnswerSent) => Connected,
        (Connected, Trigger::RequestSent | Trigger::RequestReceived) => Exchanging,
        (Exchanging, Trigger::ReplyReceived | Trigger::ReplySent) => Closed,
        (s, Trigger::Superseded) if !s.is_terminal() => Closed,
        (s, Trigger::Failed) if !s.is_terminal() => Errored,
        _ => return Err(invalid),
    };
    Ok(next)
}
