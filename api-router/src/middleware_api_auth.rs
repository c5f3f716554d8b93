use axum::{extract::Request, middleware::Next, response::Response};

use crate::{error::ApiError, AuthSessionType};

/// Protect a route group: the session must carry an authenticated user, which
/// is then made available to handlers through request extensions.
pub async fn require_auth(
    auth: AuthSessionType,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match auth.current_user {
        Some(user) if !user.anonymous => {
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
        _ => Err(ApiError::Unauthorized(
            "You have to be authenticated".to_string(),
        )),
    }
}
