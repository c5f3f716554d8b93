use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use common::storage::types::user::{User, ADMIN_USERNAME};

use crate::{api_state::ApiState, error::ApiError, AuthSessionType};

#[derive(Debug, Deserialize)]
pub struct LoginParams {
    pub password: String,
}

/// Password login for the single admin principal. On success the session
/// cookie is marked long-lived.
pub async fn login(
    State(state): State<ApiState>,
    auth: AuthSessionType,
    Json(params): Json<LoginParams>,
) -> Result<impl IntoResponse, ApiError> {
    let user = User::authenticate(ADMIN_USERNAME, &params.password, &state.db)
        .await
        .map_err(|_| ApiError::Unauthorized("Invalid password".to_string()))?;

    auth.login_user(user.id.clone());
    auth.remember_user(true);
    info!(user_id = %user.id, "Admin session opened");

    Ok((StatusCode::OK, Json(json!({ "status": "success" }))))
}

pub async fn me(auth: AuthSessionType) -> Json<serde_json::Value> {
    match auth.current_user {
        Some(user) if !user.anonymous => Json(json!({
            "authenticated": true,
            "user": { "id": user.id, "username": user.username, "admin": user.admin },
        })),
        _ => Json(json!({ "authenticated": false, "user": null })),
    }
}

pub async fn logout(auth: AuthSessionType) -> Json<serde_json::Value> {
    auth.logout_user();
    Json(json!({ "status": "success" }))
}
