use std::{future::Future, pin::Pin};

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::services::{authorize, AuthService};
use crate::{
    error::AppError,
    state::AppState,
    users::model::{Role, User},
};

/// Verified caller. Extracting it runs the full token check; a user already
/// resolved by an outer gate on the same request is reused.
pub struct AuthUser(pub User);

/// Token from `Authorization: Bearer <token>`.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = auth
        .strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<User>() {
            return Ok(AuthUser(user.clone()));
        }

        let auth = AuthService::from_ref(state);
        let user = auth.verify(bearer_token(&parts.headers)).await?;
        parts.extensions.insert(user.clone());
        Ok(AuthUser(user))
    }
}

type GateFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Gate factory: verifies the caller and lets the request through only for
/// the given roles. Use with `axum::middleware::from_fn_with_state`.
pub fn restrict_to(
    roles: &'static [Role],
) -> impl Fn(State<AppState>, Request, Next) -> GateFuture + Clone + Send + Sync + 'static {
    move |State(state): State<AppState>, req: Request, next: Next| -> GateFuture {
        Box::pin(async move {
            let (mut parts, body) = req.into_parts();
            let user = match AuthUser::from_request_parts(&mut parts, &state).await {
                Ok(AuthUser(user)) => user,
                Err(e) => return e.into_response(),
            };
            if let Err(e) = authorize(&user, roles) {
                return e.into_response();
            }
            next.run(Request::from_parts(parts, body)).await
        })
    }
}
