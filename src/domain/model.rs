use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

use super::fields::{MembershipState, UserId};

#[derive(Serialize, Deserialize, FromRow)]
pub struct DbUser {
    pub(crate) id: i64,
    pub(crate) inviter_id: Option<i64>,
    pub(crate) is_member: bool,
    pub(crate) has_chatted: bool,
    pub(crate) referral_count: i64,
    pub(crate) join_date: OffsetDateTime,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub inviter_id: Option<UserId>,
    pub is_member: bool,
    pub has_chatted: bool,
    pub referral_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub join_date: OffsetDateTime,
}

impl User {
    /// Record created before the user itself was seen joining.
    pub fn placeholder(id: UserId, join_date: OffsetDateTime) -> Self {
        Self {
            id,
            inviter_id: None,
            is_member: false,
            has_chatted: false,
            referral_count: 0,
            join_date,
        }
    }

    pub fn state(&self) -> MembershipState {
        MembershipState::from_flags(self.is_member, self.has_chatted)
    }

    /// Writes the flags of `state`. Leaving keeps `has_chatted` as history,
    /// every (re)join starts silent.
    pub fn enter_state(&mut self, state: MembershipState) {
        match state {
            MembershipState::Outside => self.is_member = false,
            MembershipState::InsideSilent => {
                self.is_member = true;
                self.has_chatted = false;
            }
            MembershipState::InsideActive => {
                self.is_member = true;
                self.has_chatted = true;
            }
        }
    }
}

impl From<DbUser> for User {
    fn from(value: DbUser) -> Self {
        let referral_count = if value.referral_count < 0 {
            tracing::warn!(
                user_id = value.id,
                referral_count = value.referral_count,
                "negative referral counter found, clamping to zero"
            );
            0
        } else {
            value.referral_count
        };

        Self {
            id: value.id.into(),
            inviter_id: value.inviter_id.map(UserId::from),
            is_member: value.is_member,
            has_chatted: value.has_chatted,
            referral_count,
            join_date: value.join_date,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub active_count: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReferralStats {
    pub user_id: UserId,
    pub total: i64,
    pub active: i64,
}

/// A materialized counter that disagrees with the live aggregate.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CounterDrift {
    pub user_id: UserId,
    pub materialized: i64,
    pub actual: i64,
}
