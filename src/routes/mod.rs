use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "referral-server",
    }))
}

pub mod auth;
pub mod event;
pub mod referrals;
pub mod webhook;
