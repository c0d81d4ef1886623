use axum::{
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};

use crate::config::config_model::DotEnvyConfig;

pub mod entitlements;
pub mod payment_events;
pub mod plans;
pub mod subscriptions;
pub mod tier_changes;

/// Shared check for collaborator-only endpoints guarded by the internal
/// bearer token. An unset token refuses to serve rather than opening up.
pub(crate) fn require_internal_token(
    config: &DotEnvyConfig,
    headers: &HeaderMap,
) -> Result<(), Response> {
    let expected_token = match config.auth.internal_api_token.as_deref() {
        Some(token) => token,
        None => {
            return Err((
                StatusCode::SERVICE_UNAVAILABLE,
                "internal API token is not configured",
            )
                .into_response());
        }
    };

    authorize_bearer(headers, expected_token)
        .map_err(|status| (status, "unauthorized").into_response())
}

pub(crate) fn authorize_bearer(headers: &HeaderMap, expected_token: &str) -> Result<(), StatusCode> {
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if token == expected_token {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}
