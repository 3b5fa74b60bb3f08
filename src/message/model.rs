use serde::{Deserialize, Serialize};

use crate::user::{self, model::UserInfo};

use super::Id;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Content {
    Text { body: String },
    Image { asset_ids: Vec<String> },
}

impl Content {
    pub fn text(body: &str) -> Self {
        Self::Text {
            body: body.to_owned(),
        }
    }

    pub fn images(asset_ids: Vec<String>) -> Self {
        Self::Image { asset_ids }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Fragment {
    #[serde(flatten)]
    content: Content,
    #[serde(default)]
    seen_by: Vec<user::Id>,
    created_at: i64,
}

impl Fragment {
    pub fn new(content: Content, now: i64) -> Self {
        Self {
            content,
            seen_by: vec![],
            created_at: now,
        }
    }

    pub const fn content(&self) -> &Content {
        &self.content
    }

    pub fn seen_by(&self) -> &[user::Id] {
        &self.seen_by
    }

    pub const fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn mark_seen(&mut self, by: &user::Id) {
        if !self.seen_by.contains(by) {
            self.seen_by.push(by.clone());
        }
    }
}

/// A sender's burst of fragments; never empty, oldest fragment first.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    #[serde(rename = "_id")]
    id: Id,
    sender: user::Id,
    fragments: Vec<Fragment>,
    created_at: i64,
    updated_at: i64,
}

impl Message {
    pub fn new(sender: &user::Id, content: Content, now: i64) -> Self {
        Self {
            id: Id::random(),
            sender: sender.clone(),
            fragments: vec![Fragment::new(content, now)],
            created_at: now,
            updated_at: now,
        }
    }

    pub const fn id(&self) -> &Id {
        &self.id
    }

    pub const fn sender(&self) -> &user::Id {
        &self.sender
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub const fn created_at(&self) -> i64 {
        self.created_at
    }

    pub const fn updated_at(&self) -> i64 {
        self.updated_at
    }

    pub fn push_fragment(&mut self, fragment: Fragment, now: i64) {
        self.fragments.push(fragment);
        self.updated_at = now;
    }

    pub fn mark_seen(&mut self, by: &user::Id) {
        for f in &mut self.fragments {
            f.mark_seen(by);
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ImageDto {
    pub asset_id: String,
    pub url: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentDto {
    Text { body: String },
    Image { images: Vec<ImageDto> },
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct FragmentDto {
    #[serde(flatten)]
    pub content: ContentDto,
    pub seen_by: Vec<user::Id>,
    pub created_at: i64,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct MessageDto {
    pub id: Id,
    pub sender: UserInfo,
    pub fragments: Vec<FragmentDto>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Preview of the newest message, shown in conversation listings.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct LastMessage {
    pub id: Id,
    pub sender: user::Id,
    pub preview: String,
    pub updated_at: i64,
}

impl From<&Message> for LastMessage {
    fn from(m: &Message) -> Self {
        let preview = match m.fragments.last().map(Fragment::content) {
            Some(Content::Text { body }) => body.clone(),
            Some(Content::Image { asset_ids }) if asset_ids.len() == 1 => "[image]".to_owned(),
            Some(Content::Image { asset_ids }) => format!("[{} images]", asset_ids.len()),
            None => String::new(),
        };

        Self {
            id: m.id.clone(),
            sender: m.sender.clone(),
            preview,
            updated_at: m.updated_at,
        }
    }
}
