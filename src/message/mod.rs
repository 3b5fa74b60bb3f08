use std::fmt::Display;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use mongodb::bson::{Bson, oid::ObjectId};
use serde::{Deserialize, Serialize};

use crate::error::Kind;
use crate::integration::storage;
use crate::pagination;
use crate::state::AppState;
use crate::{conversation, user};

mod handler;
pub mod model;
pub mod repository;
pub mod service;

pub(crate) type Result<T> = std::result::Result<T, Error>;
pub type Repository = Arc<dyn repository::MessageRepository + Send + Sync>;
pub type Service = Arc<dyn service::MessageService + Send + Sync>;

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub fn api<S>(s: AppState) -> Router<S> {
    Router::new()
        .route("/message", post(handler::api::create))
        .route("/message/{conversation_id}", get(handler::api::find_page))
        .route("/message/{conversation_id}/seen", put(handler::api::mark_seen))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
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
    ConversationNotFound(conversation::Id),
    #[error("sender is not a participant of the conversation")]
    SenderNotParticipant,
    #[error("message not found: {0}")]
    NotFound(Id),
    #[error("text message is empty")]
    EmptyText,
    #[error("image message has no images")]
    NoImages,
    #[error("too many images: {0}, at most {max} allowed", max = service::MAX_IMAGES)]
    TooManyImages(usize),
    #[error("unsupported message type: {0}")]
    UnsupportedType(String),
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("image upload failed: {0}")]
    Upload(storage::Error),

    #[error(transparent)]
    _Conversation(conversation::Error),
    #[error(transparent)]
    _Pagination(#[from] pagination::Error),
    #[error(transparent)]
    _User(#[from] user::Error),
    #[error(transparent)]
    _Multipart(#[from] axum::extract::multipart::MultipartError),
    #[error(transparent)]
    _MongoDB(#[from] mongodb::error::Error),
    #[error(transparent)]
    _Bson(#[from] mongodb::bson::ser::Error),
}

impl From<conversation::Error> for Error {
    fn from(e: conversation::Error) -> Self {
        match e {
            conversation::Error::NotFound(id) => Self::ConversationNotFound(id),
            other => Self::_Conversation(other),
        }
    }
}

impl Error {
    pub fn classify(&self) -> (Kind, &'static str) {
        match self {
            Self::ConversationNotFound(_) => (Kind::NotFound, "CONVERSATION_NOT_FOUND"),
            Self::NotFound(_) => (Kind::NotFound, "MESSAGE_NOT_FOUND"),
            Self::SenderNotParticipant => (Kind::NotAuthorized, "SENDER_NOT_PARTICIPANT"),
            Self::EmptyText => (Kind::BadRequest, "EMPTY_TEXT"),
            Self::NoImages => (Kind::BadRequest, "NO_IMAGES"),
            Self::TooManyImages(_) => (Kind::BadRequest, "TOO_MANY_IMAGES"),
            Self::UnsupportedType(_) => (Kind::BadRequest, "UNSUPPORTED_TYPE"),
            Self::MissingField(_) => (Kind::BadRequest, "MISSING_FIELD"),
            Self::_Multipart(_) => (Kind::BadRequest, "MALFORMED_MULTIPART"),
            Self::_Pagination(_) => (Kind::BadRequest, "CURSOR_NOT_FOUND"),
            Self::Upload(_) => (Kind::UpstreamFailure, "UPLOAD_FAILED"),
            Self::_Conversation(e) => e.classify(),
            Self::_User(e) => e.classify(),
            Self::_MongoDB(_) | Self::_Bson(_) => (Kind::Internal, "DATABASE_ERROR"),
        }
    }
}
