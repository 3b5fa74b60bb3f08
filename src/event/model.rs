use std::fmt;
use std::pin::Pin;

use futures::Stream;
use serde::Serialize;

use crate::conversation::{self, model::ConversationDto};
use crate::message::{self, model::MessageDto};
use crate::user;

pub type EventStream = Pin<Box<dyn Stream<Item = String> + Send>>;

pub enum Subject<'a> {
    Notifications(&'a user::Id),
}

impl fmt::Display for Subject<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Notifications(id) => write!(f, "noti.{id}"),
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    AddedToConversation {
        conversation: ConversationDto,
    },
    RemovedFromConversation {
        conversation_id: conversation::Id,
    },
    NewMessage {
        conversation_id: conversation::Id,
        message: MessageDto,
    },
    MessageSeen {
        conversation_id: conversation::Id,
        message_id: message::Id,
        seen_by: user::Id,
    },
    OnlineStatus {
        user: user::Id,
        online: bool,
    },
    System(SystemMessage),
}

/// Membership change announced to every participant, never persisted.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SystemMessage {
    pub conversation_id: conversation::Id,
    pub user: user::Id,
    pub text: String,
    pub at: i64,
}

impl SystemMessage {
    pub fn removed(conversation_id: &conversation::Id, user: &user::Id, at: i64) -> Self {
        Self::new(conversation_id, user, "was removed from the group", at)
    }

    pub fn left(conversation_id: &conversation::Id, user: &user::Id, at: i64) -> Self {
        Self::new(conversation_id, user, "left the group", at)
    }

    pub fn joined(conversation_id: &conversation::Id, user: &user::Id, at: i64) -> Self {
        Self::new(conversation_id, user, "joined the group", at)
    }

    fn new(conversation_id: &conversation::Id, user: &user::Id, text: &str, at: i64) -> Self {
        Self {
            conversation_id: conversation_id.clone(),
            user: user.clone(),
            text: text.to_owned(),
            at,
        }
    }
}
