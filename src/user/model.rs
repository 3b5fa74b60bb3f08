use serde::{Deserialize, Serialize};

use super::Id;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    #[serde(rename = "_id")]
    id: Id,
    name: String,
    email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    avatar: Option<String>,
    #[serde(default)]
    friends: Vec<Id>,
    #[serde(default)]
    blocked: Vec<Id>,
}

impl User {
    pub fn new(id: Id, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
            phone: None,
            avatar: None,
            friends: vec![],
            blocked: vec![],
        }
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    pub fn with_friends(mut self, friends: &[Id]) -> Self {
        self.friends = friends.to_vec();
        self
    }

    pub fn with_blocked(mut self, blocked: &[Id]) -> Self {
        self.blocked = blocked.to_vec();
        self
    }

    pub const fn id(&self) -> &Id {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn avatar(&self) -> Option<&str> {
        self.avatar.as_deref()
    }

    pub fn friends(&self) -> &[Id] {
        &self.friends
    }

    pub fn has_friend(&self, other: &Id) -> bool {
        self.friends.contains(other)
    }

    pub fn has_blocked(&self, other: &Id) -> bool {
        self.blocked.contains(other)
    }
}

/// Display projection used wherever a user is rendered next to content.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserInfo {
    pub id: Id,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct FriendDto {
    #[serde(flatten)]
    pub info: UserInfo,
    pub online: bool,
}
