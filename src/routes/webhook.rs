use crate::{
    app::AppState,
    domain::{errors::ApiError, events::{EventOutcome, MembershipEvent}},
    platform::telegram::Update,
};
use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

pub async fn receive_update(
    State(state): State<Arc<AppState>>,
    Json(update): Json<Update>,
) -> Result<StatusCode, ApiError> {
    let span = tracing::info_span!(
        "update",
        request_id = %Uuid::new_v4(),
        update_id = update.update_id
    );

    state.get_bot().handle(update).instrument(span).await?;
    Ok(StatusCode::OK)
}

pub async fn apply_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<MembershipEvent>,
) -> Result<Json<EventOutcome>, ApiError> {
    let span = tracing::info_span!("apply_event", request_id = %Uuid::new_v4());

    let outcome = async {
        let outcome = state.get_processor().apply(&event).await?;
        state.get_notifier().notify(&outcome).await;
        Ok::<_, ApiError>(outcome)
    }
    .instrument(span)
    .await?;

    Ok(Json(outcome))
}
