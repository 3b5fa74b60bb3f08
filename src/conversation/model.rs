use serde::{Deserialize, Serialize};

use crate::message::{self, model::LastMessage};
use crate::user::{self, model::UserInfo};

use super::Id;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Conversation {
    #[serde(rename = "_id")]
    id: Id,
    participants: Vec<user::Id>,
    #[serde(default)]
    removed_members: Vec<user::Id>,
    /// Newest first; writers prepend, readers never re-sort.
    #[serde(default)]
    messages: Vec<message::Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    admin: Option<user::Id>,
    created_at: i64,
    updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deleted_at: Option<i64>,
}

impl Conversation {
    /// `participants` must already be deduplicated. Groups (more than two
    /// participants) get `requester` as admin and keep the name.
    pub fn new(
        mut participants: Vec<user::Id>,
        name: Option<String>,
        requester: &user::Id,
        now: i64,
    ) -> Self {
        participants.sort();
        let group = participants.len() > 2;

        Self {
            id: Id::random(),
            participants,
            removed_members: vec![],
            messages: vec![],
            name: name.filter(|_| group),
            admin: group.then(|| requester.clone()),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub const fn id(&self) -> &Id {
        &self.id
    }

    pub fn participants(&self) -> &[user::Id] {
        &self.participants
    }

    pub fn removed_members(&self) -> &[user::Id] {
        &self.removed_members
    }

    pub fn messages(&self) -> &[message::Id] {
        &self.messages
    }

    pub fn head(&self) -> Option<&message::Id> {
        self.messages.first()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub const fn admin(&self) -> Option<&user::Id> {
        self.admin.as_ref()
    }

    pub const fn updated_at(&self) -> i64 {
        self.updated_at
    }

    pub const fn deleted_at(&self) -> Option<i64> {
        self.deleted_at
    }

    pub fn is_group(&self) -> bool {
        self.participants.len() > 2
    }

    pub fn is_participant(&self, id: &user::Id) -> bool {
        self.participants.contains(id)
    }

    pub fn is_admin(&self, id: &user::Id) -> bool {
        self.admin.as_ref() == Some(id)
    }

    pub fn was_removed(&self, id: &user::Id) -> bool {
        self.removed_members.contains(id)
    }
}

// state transitions mirrored by the repositories
impl Conversation {
    pub fn set_name(&mut self, name: &str, now: i64) {
        self.name = Some(name.to_owned());
        self.updated_at = now;
    }

    pub fn set_admin(&mut self, admin: &user::Id, now: i64) {
        self.admin = Some(admin.clone());
        self.updated_at = now;
    }

    pub fn add_participant(&mut self, id: &user::Id, admin: Option<&user::Id>, now: i64) {
        if !self.participants.contains(id) {
            self.participants.push(id.clone());
            self.participants.sort();
        }
        if let Some(a) = admin {
            self.admin = Some(a.clone());
        }
        self.updated_at = now;
    }

    pub fn remove_participant(&mut self, id: &user::Id, record: bool, now: i64) {
        self.participants.retain(|p| p != id);
        if record && !self.removed_members.contains(id) {
            self.removed_members.push(id.clone());
        }
        self.updated_at = now;
    }

    pub fn prepend_message(&mut self, id: &message::Id, now: i64) {
        self.messages.insert(0, id.clone());
        self.updated_at = now;
    }

    /// Bumps activity while `head` is still the newest message.
    pub fn touch_head(&mut self, head: &message::Id, now: i64) -> bool {
        if self.head() != Some(head) {
            return false;
        }
        self.updated_at = now;
        true
    }

    pub fn mark_deleted(&mut self, now: i64) {
        self.deleted_at = Some(now);
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ConversationDto {
    pub id: Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<user::Id>,
    pub participants: Vec<UserInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
    pub updated_at: i64,
}

impl ConversationDto {
    /// Recency used for ordering the conversation list, 0 without messages.
    pub fn last_activity(&self) -> i64 {
        self.last_message
            .as_ref()
            .map(|m| m.updated_at)
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
pub struct ParticipantRef {
    pub id: user::Id,
}

#[derive(Deserialize)]
pub struct CreateRequest {
    pub participants: Vec<ParticipantRef>,
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct MemberRequest {
    pub id: user::Id,
}
