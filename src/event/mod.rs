use std::sync::Arc;

use axum::{Router, routing::get};

use crate::error::Kind;
use crate::state::AppState;

mod handler;
pub mod model;
pub mod presence;
pub mod service;

pub(crate) type Result<T> = std::result::Result<T, Error>;
pub type Service = Arc<dyn service::Relay + Send + Sync>;

pub use model::{Notification, Subject, SystemMessage};

pub fn api<S>(s: AppState) -> Router<S> {
    Router::new()
        .route("/ws", get(handler::ws))
        .with_state(s)
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    _User(#[from] crate::user::Error),
    #[error(transparent)]
    _Subscribe(#[from] async_nats::SubscribeError),
}

impl Error {
    pub fn classify(&self) -> (Kind, &'static str) {
        match self {
            Self::_User(e) => e.classify(),
            Self::_Subscribe(_) => (Kind::UpstreamFailure, "RELAY_UNAVAILABLE"),
        }
    }
}
