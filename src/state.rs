use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::Verifier;
use crate::clock::Clock;
use crate::conversation::{
    repository::MongoConversationRepository, service::ConversationServiceImpl,
};
use crate::event::{presence::Presence, service::NatsRelay};
use crate::integration::{self, storage};
use crate::message::{repository::MongoMessageRepository, service::MessageServiceImpl};
use crate::user::{repository::MongoUserRepository, service::UserServiceImpl};
use crate::{conversation, event, message, user};

#[derive(Clone)]
pub struct AppState {
    pub verifier: Verifier,
    pub presence: Presence,
    pub user_service: user::Service,
    pub conversation_service: conversation::Service,
    pub message_service: message::Service,
    pub relay: event::Service,
}

impl AppState {
    pub fn new(
        config: &integration::Config,
        db: &mongodb::Database,
        pubsub: async_nats::Client,
        clock: Clock,
    ) -> Self {
        let http = integration::init_http_client();
        let storage: storage::Storage = Arc::new(storage::HttpObjectStore::new(
            config.storage.clone(),
            http,
        ));
        let presence = Presence::default();
        let relay: event::Service = Arc::new(NatsRelay::new(pubsub));
        let message_repo: message::Repository = Arc::new(MongoMessageRepository::new(db));

        let user_service: user::Service = Arc::new(UserServiceImpl::new(
            Arc::new(MongoUserRepository::new(db)),
            storage.clone(),
            presence.clone(),
        ));
        let conversation_service: conversation::Service = Arc::new(ConversationServiceImpl::new(
            Arc::new(MongoConversationRepository::new(db)),
            message_repo.clone(),
            user_service.clone(),
            relay.clone(),
            clock.clone(),
        ));
        let message_service: message::Service = Arc::new(MessageServiceImpl::new(
            message_repo,
            conversation_service.clone(),
            user_service.clone(),
            storage,
            relay.clone(),
            clock,
        ));

        Self {
            verifier: Verifier::new(&config.jwt_secret),
            presence,
            user_service,
            conversation_service,
            message_service,
            relay,
        }
    }
}

impl FromRef<AppState> for Verifier {
    fn from_ref(s: &AppState) -> Self {
        s.verifier.clone()
    }
}

impl FromRef<AppState> for Presence {
    fn from_ref(s: &AppState) -> Self {
        s.presence.clone()
    }
}

impl FromRef<AppState> for user::Service {
    fn from_ref(s: &AppState) -> Self {
        s.user_service.clone()
    }
}

impl FromRef<AppState> for conversation::Service {
    fn from_ref(s: &AppState) -> Self {
        s.conversation_service.clone()
    }
}

impl FromRef<AppState> for message::Service {
    fn from_ref(s: &AppState) -> Self {
        s.message_service.clone()
    }
}

impl FromRef<AppState> for event::Service {
    fn from_ref(s: &AppState) -> Self {
        s.relay.clone()
    }
}
