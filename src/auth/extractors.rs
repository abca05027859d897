use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

use super::{dto::PublicUser, services::resolve_identity};
use crate::{error::ApiError, state::AppState};

/// The resolved caller, without its password hash.
#[derive(Debug, Clone)]
pub struct AuthUser(pub PublicUser);

/// Route layer for protected routers: resolves the identity once and stores
/// it in request extensions before any handler runs.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = resolve_identity(&state, req.headers()).await?;
    req.extensions_mut().insert(AuthUser(user));
    Ok(next.run(req).await)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }
        // route mounted without the layer: resolve here instead
        let user = resolve_identity(state, &parts.headers).await?;
        Ok(AuthUser(user))
    }
}
