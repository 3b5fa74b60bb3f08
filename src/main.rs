use log::info;
use tower_http::cors::CorsLayer;

use social_service::state::AppState;
use social_service::{app, clock, conversation, integration};

#[tokio::main]
async fn main() {
    let config = integration::Config::default();

    let db = config.mongo.connect().expect("Failed to connect to MongoDB");
    let pubsub = config
        .pubsub
        .connect()
        .await
        .expect("Failed to connect to NATS");

    let state = AppState::new(&config, &db, pubsub, clock::system());

    conversation::spawn_sweeper(state.conversation_service.clone(), config.sweep_interval);

    let cors = CorsLayer::new()
        .allow_origin(config.env.allow_origin())
        .allow_methods(config.env.allow_methods())
        .allow_headers(config.env.allow_headers());

    let addr = config.env.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    info!("listening on {addr}");

    axum::serve(listener, app(state, cors))
        .await
        .expect("Failed to start server");
}
