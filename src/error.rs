use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;

use crate::envelope::Envelope;
use crate::{auth, conversation, event, message, user};

/// Failure categories every module error is mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    NotFound,
    NotAuthorized,
    Unauthenticated,
    InvalidState,
    BadRequest,
    UpstreamFailure,
    Internal,
}

impl Kind {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::NotAuthorized => StatusCode::FORBIDDEN,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::InvalidState => StatusCode::CONFLICT,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::UpstreamFailure => StatusCode::BAD_GATEWAY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    _Auth(#[from] auth::Error),
    #[error(transparent)]
    _Conversation(#[from] conversation::Error),
    #[error(transparent)]
    _Event(#[from] event::Error),
    #[error(transparent)]
    _Message(#[from] message::Error),
    #[error(transparent)]
    _User(#[from] user::Error),

    #[error(transparent)]
    _Json(#[from] JsonRejection),
    #[error(transparent)]
    _Query(#[from] QueryRejection),
    #[error(transparent)]
    _Path(#[from] PathRejection),
    #[error(transparent)]
    _Multipart(#[from] MultipartRejection),
}

impl Error {
    pub fn classify(&self) -> (Kind, &'static str) {
        match self {
            Self::_Auth(e) => e.classify(),
            Self::_Conversation(e) => e.classify(),
            Self::_Event(e) => e.classify(),
            Self::_Message(e) => e.classify(),
            Self::_User(e) => e.classify(),
            Self::_Json(_) | Self::_Query(_) | Self::_Path(_) | Self::_Multipart(_) => {
                (Kind::BadRequest, "MALFORMED_REQUEST")
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        error!("{self}");

        let (kind, code) = self.classify();
        let message = match kind {
            Kind::Internal => "Internal server error".to_owned(),
            _ => self.to_string(),
        };

        Envelope::error(kind.status(), code, message).into_response()
    }
}

/// Envelope for requests that match no route.
pub async fn route_not_found() -> Envelope<()> {
    Envelope::error(StatusCode::NOT_FOUND, "ROUTE_NOT_FOUND", "No such route")
}
