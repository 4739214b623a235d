//! Resource routes. Everything here except token issuing requires a token.

use crate::extractors::require_token;
use crate::handlers::{address, auth, opening_hours, store};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub fn api_routes(state: AppState) -> Router {
    let protected = Router::new()
        .route("/addresses/", get(address::list).post(address::create))
        .route(
            "/addresses/:id/",
            get(address::read).put(address::update).delete(address::delete),
        )
        .route("/opening-hours/", get(opening_hours::list).post(opening_hours::create))
        .route(
            "/opening-hours/:id/",
            get(opening_hours::read)
                .put(opening_hours::update)
                .delete(opening_hours::delete),
        )
        .route("/stores/", get(store::list).post(store::create))
        .route(
            "/stores/:id/",
            get(store::read).put(store::update).delete(store::delete),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .merge(protected)
        .route("/api-token-auth/", post(auth::obtain_token))
        .with_state(state)
}
