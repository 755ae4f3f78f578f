use crate::{auth::restrict_to, state::AppState};
use axum::{middleware, Router};

pub mod handlers;
#[cfg(test)]
pub mod memory;
pub mod model;
pub mod repo;
mod repo_types;

/// Self-service routes for any verified user, plus admin-only management.
pub fn router(state: &AppState) -> Router<AppState> {
    let admin_only =
        middleware::from_fn_with_state(state.clone(), restrict_to(model::ADMIN_ONLY));
    handlers::me_routes().merge(handlers::admin_routes().route_layer(admin_only))
}
