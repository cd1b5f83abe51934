use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use time::OffsetDateTime;

/// Platform user identifier.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    pub fn inner(&self) -> i64 {
        self.0
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(Self)
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name carried by an invite link, `ref_<owner>_<unix seconds>`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(transparent)]
pub struct InviteToken(String);

impl InviteToken {
    const PREFIX: &'static str = "ref_";

    pub fn new(owner: UserId) -> Self {
        Self(format!(
            "{}{}_{}",
            Self::PREFIX,
            owner,
            OffsetDateTime::now_utc().unix_timestamp()
        ))
    }

    pub fn inner(&self) -> String {
        self.0.to_owned()
    }

    /// Decodes the owner id. `None` when the token is not one of ours.
    pub fn owner(&self) -> Option<UserId> {
        let rest = self.0.strip_prefix(Self::PREFIX)?;
        let id = rest.split('_').next()?;
        id.parse::<UserId>().ok()
    }
}

impl From<String> for InviteToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for InviteToken {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for InviteToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Membership of a user in the tracked group.
///
/// Only `InsideActive` invitees count towards their inviter's active referrals.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipState {
    Outside,
    InsideSilent,
    InsideActive,
}

impl MembershipState {
    pub fn from_flags(is_member: bool, has_chatted: bool) -> Self {
        match (is_member, has_chatted) {
            (false, _) => Self::Outside,
            (true, false) => Self::InsideSilent,
            (true, true) => Self::InsideActive,
        }
    }

    pub fn is_member(&self) -> bool {
        !matches!(self, Self::Outside)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::InsideActive)
    }
}
