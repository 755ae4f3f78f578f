use std::fmt;

use axum::{
    middleware,
    routing::{delete, get},
    Extension, Router,
};

use crate::{auth::restrict_to, state::AppState, users::model::ADMIN_ONLY};

pub mod handlers;
#[cfg(test)]
pub mod memory;
pub mod repo;

/// A named set of JSON documents served under `/api/v1/<name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Tours,
    Plants,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Tours, Collection::Plants];

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Tours => "tours",
            Collection::Plants => "plants",
        }
    }

    /// Key for a single document inside `data`.
    pub fn singular(self) -> &'static str {
        match self {
            Collection::Tours => "tour",
            Collection::Plants => "plant",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn collection_routes(state: &AppState, collection: Collection) -> Router<AppState> {
    let admin_only = middleware::from_fn_with_state(state.clone(), restrict_to(ADMIN_ONLY));
    let mut routes = Router::new()
        .route("/", get(handlers::list).post(handlers::create))
        .route(
            "/:id",
            get(handlers::get_one)
                .patch(handlers::update)
                .merge(delete(handlers::remove).route_layer(admin_only)),
        );
    if collection == Collection::Tours {
        routes = routes.route("/top-5-cheap", get(handlers::top_cheap));
    }
    routes.layer(Extension(collection))
}

/// One nested router per collection; deletes are admin-only.
pub fn router(state: &AppState) -> Router<AppState> {
    Collection::ALL
        .into_iter()
        .fold(Router::new(), |router, collection| {
            router.nest(
                &format!("/{collection}"),
                collection_routes(state, collection),
            )
        })
}
