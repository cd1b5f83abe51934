use crate::config::Config;
use axum::{
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Rejects requests that do not carry the configured webhook secret.
pub async fn check_secret<B>(request: Request<B>, next: Next<B>) -> Response {
    let config = match request.extensions().get::<Config>() {
        Some(c) => c,
        None => return (StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    };

    let authorized = request
        .headers()
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .map_or(false, |provided| {
            provided == config.telegram.webhook_secret.expose_secret().as_str()
        });

    if authorized {
        return next.run(request).await;
    }

    tracing::warn!("rejected request with a missing or wrong webhook secret");
    (StatusCode::UNAUTHORIZED).into_response()
}
