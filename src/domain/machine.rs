//! Membership transitions and the counter side effect each one has on the
//! inviter of the user it applies to.
//!
//! Every transition is guarded by the persisted state alone, so replaying an
//! event against the state it already produced is a no-op.

use serde::{Deserialize, Serialize};

use super::fields::MembershipState;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Join,
    Leave,
    FirstInteraction,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CounterDelta {
    Increment,
    Decrement,
}

impl CounterDelta {
    pub fn value(&self) -> i64 {
        match self {
            Self::Increment => 1,
            Self::Decrement => -1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// First join of a never-seen user. The only place attribution is set.
    Enter,
    Move {
        to: MembershipState,
        delta: Option<CounterDelta>,
    },
    /// Known user, event already reflected in its state.
    Unchanged,
    /// Leave or first interaction for a user with no record.
    Skipped,
}

impl Transition {
    pub fn target(&self, current: Option<MembershipState>) -> Option<MembershipState> {
        match self {
            Self::Enter => Some(MembershipState::InsideSilent),
            Self::Move { to, .. } => Some(*to),
            Self::Unchanged | Self::Skipped => current,
        }
    }

    pub fn delta(&self) -> Option<CounterDelta> {
        match self {
            Self::Move { delta, .. } => *delta,
            _ => None,
        }
    }
}

pub fn next(current: Option<MembershipState>, event: EventKind) -> Transition {
    use crate::domain::fields::MembershipState::*;

    let Some(current) = current else {
        return match event {
            EventKind::Join => Transition::Enter,
            EventKind::Leave | EventKind::FirstInteraction => Transition::Skipped,
        };
    };

    match (event, current) {
        (EventKind::Join, Outside) => Transition::Move {
            to: InsideSilent,
            delta: None,
        },
        (EventKind::Join, InsideSilent | InsideActive) => Transition::Unchanged,

        (EventKind::FirstInteraction, InsideSilent) => Transition::Move {
            to: InsideActive,
            delta: Some(CounterDelta::Increment),
        },
        (EventKind::FirstInteraction, InsideActive | Outside) => Transition::Unchanged,

        (EventKind::Leave, InsideActive) => Transition::Move {
            to: Outside,
            delta: Some(CounterDelta::Decrement),
        },
        (EventKind::Leave, InsideSilent) => Transition::Move {
            to: Outside,
            delta: None,
        },
        (EventKind::Leave, Outside) => Transition::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fields::MembershipState::*;

    #[test]
    fn unseen_user_only_enters_on_join() {
        assert_eq!(next(None, EventKind::Join), Transition::Enter);
        assert_eq!(next(None, EventKind::Leave), Transition::Skipped);
        assert_eq!(next(None, EventKind::FirstInteraction), Transition::Skipped);
        assert_eq!(Transition::Enter.target(None), Some(InsideSilent));
    }

    #[test]
    fn only_active_transitions_touch_the_counter() {
        assert_eq!(
            next(Some(InsideSilent), EventKind::FirstInteraction).delta(),
            Some(CounterDelta::Increment)
        );
        assert_eq!(
            next(Some(InsideActive), EventKind::Leave).delta(),
            Some(CounterDelta::Decrement)
        );
        assert_eq!(next(Some(InsideSilent), EventKind::Leave).delta(), None);
        assert_eq!(next(Some(Outside), EventKind::Join).delta(), None);
    }

    #[test]
    fn replays_are_no_ops() {
        for state in [Outside, InsideSilent, InsideActive] {
            for event in [EventKind::Join, EventKind::Leave, EventKind::FirstInteraction] {
                let first = next(Some(state), event);
                let reached = first.target(Some(state));
                assert_eq!(
                    next(reached, event),
                    Transition::Unchanged,
                    "{event:?} replayed from {state:?}"
                );
            }
        }
    }

    #[test]
    fn departed_users_must_rejoin_before_counting() {
        assert_eq!(next(Some(Outside), EventKind::FirstInteraction), Transition::Unchanged);
        assert_eq!(
            next(Some(Outside), EventKind::Join).target(Some(Outside)),
            Some(InsideSilent)
        );
    }
}
