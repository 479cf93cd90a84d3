use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::{
    error::AppError,
    services::auth_service::{self, CurrentUser},
    state::SharedState,
};

/// Resolve the bearer credential and expose the caller as a [`CurrentUser`] extension.
pub async fn require_user(
    State(state): State<SharedState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = auth_service::bearer_token(req.headers()).ok_or_else(|| {
        AppError::Unauthorized("missing `Authorization: Bearer <token>` header".into())
    })?;

    let user: CurrentUser = auth_service::authenticate(&state, &token).await?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
