use std::fmt::Display;
use std::sync::Arc;

use axum::{Router, routing::get};
use mongodb::bson::{Bson, oid::ObjectId};
use serde::{Deserialize, Serialize};

use crate::error::Kind;
use crate::pagination;
use crate::state::AppState;

mod handler;
pub mod model;
pub mod repository;
pub mod service;

pub(crate) type Result<T> = std::result::Result<T, Error>;
pub type Repository = Arc<dyn repository::UserRepository + Send + Sync>;
pub type Service = Arc<dyn service::UserService + Send + Sync>;

pub fn api<S>(s: AppState) -> Router<S> {
    Router::new()
        .route("/users/friends", get(handler::api::find_friends))
        .route("/users/{id}", get(handler::api::find_one))
        .with_state(s)
}

#[derive(Clone, Debug, Deserialize, Serialize, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Id(pub String);

impl Id {
    pub fn random() -> Self {
        Self(ObjectId::new().to_hex())
    }

    pub fn as_str(&self) -> &str {
        &self.0
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

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<&Id> for Bson {
    fn from(id: &Id) -> Self {
        Bson::String(id.0.clone())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("user not found: {0}")]
    NotFound(Id),

    #[error(transparent)]
    _Pagination(#[from] pagination::Error),
    #[error(transparent)]
    _MongoDB(#[from] mongodb::error::Error),
}

impl Error {
    pub fn classify(&self) -> (Kind, &'static str) {
        match self {
            Self::NotFound(_) => (Kind::NotFound, "USER_NOT_FOUND"),
            Self::_Pagination(_) => (Kind::BadRequest, "CURSOR_NOT_FOUND"),
            Self::_MongoDB(_) => (Kind::Internal, "DATABASE_ERROR"),
        }
    }
}
