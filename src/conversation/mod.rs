use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use log::{error, info};
use mongodb::bson::{Bson, oid::ObjectId};
use serde::{Deserialize, Serialize};

use crate::error::Kind;
use crate::state::AppState;
use crate::user;

mod handler;
pub mod model;
pub mod repository;
pub mod service;

pub(crate) type Result<T> = std::result::Result<T, Error>;
pub type Repository = Arc<dyn repository::ConversationRepository + Send + Sync>;
pub type Service = Arc<dyn service::ConversationService + Send + Sync>;

pub fn api<S>(s: AppState) -> Router<S> {
    Router::new()
        .route("/conversation", post(handler::api::create))
        .route("/conversation", get(handler::api::find_all))
        .route("/conversation/{id}", get(handler::api::find_one))
        .route("/conversation/{id}/name", put(handler::api::rename))
        .route("/conversation/{id}/admin", put(handler::api::switch_admin))
        .route("/conversation/{id}/members", post(handler::api::add_member))
        .route(
            "/conversation/{id}/members/{user_id}",
            delete(handler::api::remove_member),
        )
        .route("/conversation/{id}/leave", post(handler::api::leave))
        .with_state(s)
}

#[derive(Clone, Debug, Deserialize, Serialize, Hash, PartialEq, Eq)]
pub struct Id(pub String);

impl Id {
    pub fn random() -> Self {
        Self(ObjectId::new().to_hex())
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&Id> for Bson {
    fn from(id: &Id) -> Self {
        Bson::String(id.0.clone())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("conversation not found: {0}")]
    NotFound(Id),
    #[error("conversation with the same participants already exists")]
    ConversationExists,
    #[error("conversation needs at least 2 participants, got {0}")]
    NotEnoughParticipants(usize),
    #[error("conversation name is empty")]
    EmptyName,
    #[error("not authorized to modify the conversation")]
    NotAuthorized,
    #[error("user is not a participant of the conversation")]
    NotAParticipant,
    #[error("target user is not a participant: {0}")]
    TargetNotParticipant(user::Id),
    #[error("use leave to exit a conversation")]
    SelfRemoval,
    #[error("admin must hand over adminship before leaving")]
    AdminCannotLeave,
    #[error("user is already a participant: {0}")]
    AlreadyParticipant(user::Id),
    #[error("user not found: {0}")]
    UserNotFound(user::Id),
    #[error("could not finish deleting conversation {0}: {1}")]
    CascadeFailed(Id, String),

    #[error(transparent)]
    _User(user::Error),
    #[error(transparent)]
    _MongoDB(#[from] mongodb::error::Error),
}

impl From<user::Error> for Error {
    fn from(e: user::Error) -> Self {
        match e {
            user::Error::NotFound(id) => Self::UserNotFound(id),
            other => Self::_User(other),
        }
    }
}

impl Error {
    pub fn classify(&self) -> (Kind, &'static str) {
        match self {
            Self::NotFound(_) => (Kind::NotFound, "CONVERSATION_NOT_FOUND"),
            Self::UserNotFound(_) => (Kind::NotFound, "USER_NOT_FOUND"),
            Self::ConversationExists => (Kind::InvalidState, "CONVERSATION_EXISTS"),
            Self::SelfRemoval => (Kind::InvalidState, "SELF_REMOVAL"),
            Self::AdminCannotLeave => (Kind::InvalidState, "ADMIN_CANNOT_LEAVE"),
            Self::AlreadyParticipant(_) => (Kind::InvalidState, "ALREADY_PARTICIPANT"),
            Self::NotEnoughParticipants(_) => (Kind::BadRequest, "NOT_ENOUGH_PARTICIPANTS"),
            Self::EmptyName => (Kind::BadRequest, "EMPTY_NAME"),
            Self::TargetNotParticipant(_) => (Kind::BadRequest, "TARGET_NOT_PARTICIPANT"),
            Self::NotAuthorized => (Kind::NotAuthorized, "NOT_AUTHORIZED"),
            Self::NotAParticipant => (Kind::NotAuthorized, "NOT_A_PARTICIPANT"),
            Self::CascadeFailed(..) => (Kind::UpstreamFailure, "CASCADE_DELETE_FAILED"),
            Self::_User(e) => e.classify(),
            Self::_MongoDB(_) => (Kind::Internal, "DATABASE_ERROR"),
        }
    }
}

/// Periodically finishes conversation deletes interrupted by a failure.
pub fn spawn_sweeper(service: Service, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match service.sweep().await {
                Ok(0) => {}
                Ok(n) => info!("swept {n} pending conversation deletes"),
                Err(e) => error!("conversation sweep failed: {e:?}"),
            }
        }
    })
}
