//! Turns the invite token of a join into a validated inviter.
//!
//! A bad token never fails the join, it only drops the attribution.

use crate::{
    domain::{
        errors::DatabaseError,
        fields::{InviteToken, UserId},
        model::User,
    },
    repository::UserTx,
};
use time::OffsetDateTime;

/// Decodes the inviter of `joining` from `token`.
pub fn decode(token: Option<&InviteToken>, joining: UserId) -> Option<UserId> {
    let token = token?;
    let Some(inviter) = token.owner() else {
        tracing::warn!(user_id = %joining, token = %token, "malformed invite token, joining without inviter");
        return None;
    };

    if inviter == joining {
        tracing::warn!(user_id = %joining, "user joined through own invite link, ignoring attribution");
        return None;
    }

    Some(inviter)
}

/// Decodes the inviter and makes sure it has a row to be credited on.
pub async fn resolve(
    tx: &mut dyn UserTx,
    token: Option<&InviteToken>,
    joining: UserId,
) -> Result<Option<UserId>, DatabaseError> {
    let Some(inviter) = decode(token, joining) else {
        return Ok(None);
    };
    materialize(tx, inviter).await?;
    Ok(Some(inviter))
}

/// Creates a record for `id` that is not a member and has no inviter, unless
/// one exists. Returns whether a record was created.
pub async fn materialize(tx: &mut dyn UserTx, id: UserId) -> Result<bool, DatabaseError> {
    let created = tx
        .insert_user(&User::placeholder(id, OffsetDateTime::now_utc()))
        .await?;
    if created {
        tracing::info!("created placeholder record for inviter {}", id);
    }
    Ok(created)
}
