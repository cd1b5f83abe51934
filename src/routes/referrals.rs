use std::sync::Arc;

use crate::{
    app::AppState,
    domain::{
        errors::ApiError,
        fields::UserId,
        model::{CounterDrift, LeaderboardEntry, ReferralStats},
    },
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

const MAX_LEADERBOARD_LIMIT: i64 = 100;

#[derive(Deserialize)]
pub struct LeaderboardParams {
    limit: Option<i64>,
}

pub async fn get_referrals(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<Json<ReferralStats>, ApiError> {
    let store = state.get_store();
    let user_id = UserId::from(user_id);

    if store.get_user(user_id).await?.is_none() {
        return Err(ApiError::NotFound);
    }

    let total = store.total_referrals(user_id).await?;
    let active = store.active_referrals(user_id).await?;
    Ok(Json(ReferralStats {
        user_id,
        total,
        active,
    }))
}

pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeaderboardParams>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(state.config.processor.leaderboard_limit);
    if !(1..=MAX_LEADERBOARD_LIMIT).contains(&limit) {
        return Err(ApiError::BadRequest("limit must be between 1 and 100"));
    }

    let entries = state.get_store().leaderboard(limit).await?;
    Ok(Json(entries))
}

pub async fn get_audit(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CounterDrift>>, ApiError> {
    let drift = state.get_processor().audit_counters().await?;
    Ok(Json(drift))
}
