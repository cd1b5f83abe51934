use super::{
    fields::{InviteToken, MembershipState, UserId},
    machine::{CounterDelta, EventKind},
};
use serde::{Deserialize, Serialize};

/// Membership event as delivered by the platform, at least once and unordered.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MembershipEvent {
    pub user_id: UserId,
    pub kind: EventKind,
    #[serde(default)]
    pub inviter_token: Option<InviteToken>,
}

impl MembershipEvent {
    pub fn join(user_id: UserId, inviter_token: Option<InviteToken>) -> Self {
        Self {
            user_id,
            kind: EventKind::Join,
            inviter_token,
        }
    }

    pub fn leave(user_id: UserId) -> Self {
        Self {
            user_id,
            kind: EventKind::Leave,
            inviter_token: None,
        }
    }

    pub fn first_interaction(user_id: UserId) -> Self {
        Self {
            user_id,
            kind: EventKind::FirstInteraction,
            inviter_token: None,
        }
    }
}

/// Result of one committed event.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventOutcome {
    pub user_id: UserId,
    pub kind: EventKind,
    pub previous: Option<MembershipState>,
    pub current: Option<MembershipState>,
    pub inviter_id: Option<UserId>,
    pub delta: Option<CounterDelta>,
    /// Inviter's counter after `delta` was applied.
    pub inviter_active: Option<i64>,
}

impl EventOutcome {
    pub fn is_skipped(&self) -> bool {
        self.current.is_none()
    }

    pub fn should_notify(&self) -> bool {
        self.delta.is_some() && self.inviter_id.is_some()
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReferralEvent {
    pub inviter: UserId,
    pub invitee: UserId,
    pub active_referrals: i64,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", content = "data")]
pub enum AppEvent {
    NewMember(UserId),
    ReferralActivated(ReferralEvent),
    ReferralLost(ReferralEvent),
}
