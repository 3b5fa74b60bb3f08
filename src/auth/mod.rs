use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

use crate::error::Kind;
use crate::user;

pub mod middleware;

type Result<T> = std::result::Result<T, Error>;

/// Caller identity attached to every authenticated request.
#[derive(Clone, Debug, PartialEq)]
pub struct User {
    id: user::Id,
    email: String,
    phone: Option<String>,
}

impl User {
    pub fn new(id: user::Id, email: impl Into<String>, phone: Option<String>) -> Self {
        Self {
            id,
            email: email.into(),
            phone,
        }
    }

    pub const fn id(&self) -> &user::Id {
        &self.id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }
}

#[derive(Deserialize)]
struct TokenClaims {
    sub: user::Id,
    email: String,
    #[serde(default)]
    phone: Option<String>,
}

/// Verifies bearer tokens issued by the identity service.
#[derive(Clone)]
pub struct Verifier {
    key: Arc<DecodingKey>,
    validation: Arc<Validation>,
}

impl Verifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            validation: Arc::new(Validation::new(Algorithm::HS256)),
        }
    }

    pub fn verify(&self, token: &str) -> Result<User> {
        let claims = decode::<TokenClaims>(token, &self.key, &self.validation)?.claims;
        Ok(User::new(claims.sub, claims.email, claims.phone))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unauthorized to access the resource")]
    Unauthorized,

    #[error(transparent)]
    _JsonWebtoken(#[from] jsonwebtoken::errors::Error),
}

impl Error {
    pub fn classify(&self) -> (Kind, &'static str) {
        match self {
            Self::Unauthorized => (Kind::Unauthenticated, "UNAUTHORIZED"),
            Self::_JsonWebtoken(_) => (Kind::Unauthenticated, "INVALID_TOKEN"),
        }
    }
}
