use axum::{Router, middleware::from_fn_with_state, routing::get};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::envelope::Envelope;
use crate::state::AppState;

pub mod auth;
pub mod clock;
pub mod conversation;
pub mod envelope;
pub mod error;
pub mod event;
pub mod integration;
pub mod message;
pub mod pagination;
pub mod state;
pub mod user;

#[cfg(test)]
mod testing;

pub type Result<T> = std::result::Result<T, error::Error>;

pub fn app(s: AppState, cors: CorsLayer) -> Router {
    let protected = Router::new()
        .merge(conversation::api(s.clone()))
        .merge(message::api(s.clone()))
        .merge(user::api(s.clone()))
        .merge(event::api(s.clone()))
        .route_layer(from_fn_with_state(
            s.verifier.clone(),
            auth::middleware::authorize,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .fallback(error::route_not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

async fn health() -> Envelope<()> {
    Envelope::message("ok")
}
