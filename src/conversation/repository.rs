use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    Database,
    bson::{Bson, doc},
    options::ReturnDocument,
};

use crate::{message, user};

use super::Id;
use super::model::Conversation;

const CONVERSATIONS_COLLECTION: &str = "conversations";

/// Every lookup except [`ConversationRepository::find_marked_deleted`] skips
/// conversations with a pending delete.
#[async_trait]
pub trait ConversationRepository {
    async fn insert(&self, c: &Conversation) -> super::Result<()>;

    async fn find_by_id(&self, id: &Id) -> super::Result<Option<Conversation>>;

    async fn find_by_participant(&self, user: &user::Id) -> super::Result<Vec<Conversation>>;

    /// Exact participant set match, order-insensitive.
    async fn exists(&self, participants: &[user::Id]) -> super::Result<bool>;

    async fn update_name(&self, id: &Id, name: &str, now: i64) -> super::Result<bool>;

    async fn update_admin(&self, id: &Id, admin: &user::Id, now: i64) -> super::Result<bool>;

    async fn add_participant(
        &self,
        id: &Id,
        user: &user::Id,
        promote: Option<&user::Id>,
        now: i64,
    ) -> super::Result<bool>;

    /// Returns the conversation as it is after the removal.
    async fn remove_participant(
        &self,
        id: &Id,
        user: &user::Id,
        record: bool,
        now: i64,
    ) -> super::Result<Option<Conversation>>;

    async fn push_message_ref(
        &self,
        id: &Id,
        message_id: &message::Id,
        now: i64,
    ) -> super::Result<bool>;

    /// Conditional on `head` still being the first message reference, so a
    /// message pushed in between makes it fail.
    async fn touch_head(&self, id: &Id, head: &message::Id, now: i64) -> super::Result<bool>;

    async fn mark_deleted(&self, id: &Id, now: i64) -> super::Result<bool>;

    async fn find_marked_deleted(&self) -> super::Result<Vec<Conversation>>;

    async fn delete(&self, id: &Id) -> super::Result<bool>;
}

pub struct MongoConversationRepository {
    col: mongodb::Collection<Conversation>,
}

impl MongoConversationRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            col: db.collection(CONVERSATIONS_COLLECTION),
        }
    }
}

#[async_trait]
impl ConversationRepository for MongoConversationRepository {
    async fn insert(&self, c: &Conversation) -> super::Result<()> {
        self.col.insert_one(c).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &Id) -> super::Result<Option<Conversation>> {
        self.col
            .find_one(doc! { "_id": id, "deleted_at": null })
            .await
            .map_err(super::Error::from)
    }

    async fn find_by_participant(&self, user: &user::Id) -> super::Result<Vec<Conversation>> {
        let cursor = self
            .col
            .find(doc! { "participants": user, "deleted_at": null })
            .await?;

        cursor.try_collect().await.map_err(super::Error::from)
    }

    async fn exists(&self, participants: &[user::Id]) -> super::Result<bool> {
        let ids: Vec<Bson> = participants.iter().map(Bson::from).collect();
        let size = ids.len() as i64;

        let count = self
            .col
            .count_documents(doc! {
                "participants": { "$all": ids, "$size": size },
                "deleted_at": null,
            })
            .await?;

        Ok(count > 0)
    }

    async fn update_name(&self, id: &Id, name: &str, now: i64) -> super::Result<bool> {
        let res = self
            .col
            .update_one(
                doc! { "_id": id, "deleted_at": null },
                doc! { "$set": { "name": name, "updated_at": now } },
            )
            .await?;

        Ok(res.matched_count > 0)
    }

    async fn update_admin(&self, id: &Id, admin: &user::Id, now: i64) -> super::Result<bool> {
        let res = self
            .col
            .update_one(
                doc! { "_id": id, "deleted_at": null },
                doc! { "$set": { "admin": admin, "updated_at": now } },
            )
            .await?;

        Ok(res.matched_count > 0)
    }

    async fn add_participant(
        &self,
        id: &Id,
        user: &user::Id,
        promote: Option<&user::Id>,
        now: i64,
    ) -> super::Result<bool> {
        let mut set = doc! { "updated_at": now };
        if let Some(admin) = promote {
            set.insert("admin", admin);
        }

        let res = self
            .col
            .update_one(
                doc! { "_id": id, "deleted_at": null },
                doc! {
                    "$addToSet": { "participants": user },
                    "$set": set,
                },
            )
            .await?;

        Ok(res.matched_count > 0)
    }

    async fn remove_participant(
        &self,
        id: &Id,
        user: &user::Id,
        record: bool,
        now: i64,
    ) -> super::Result<Option<Conversation>> {
        let mut update = doc! {
            "$pull": { "participants": user },
            "$set": { "updated_at": now },
        };
        if record {
            update.insert("$addToSet", doc! { "removed_members": user });
        }

        self.col
            .find_one_and_update(doc! { "_id": id, "deleted_at": null }, update)
            .return_document(ReturnDocument::After)
            .await
            .map_err(super::Error::from)
    }

    async fn push_message_ref(
        &self,
        id: &Id,
        message_id: &message::Id,
        now: i64,
    ) -> super::Result<bool> {
        let res = self
            .col
            .update_one(
                doc! { "_id": id, "deleted_at": null },
                doc! {
                    "$push": { "messages": { "$each": [message_id], "$position": 0 } },
                    "$set": { "updated_at": now },
                },
            )
            .await?;

        Ok(res.matched_count > 0)
    }

    async fn touch_head(&self, id: &Id, head: &message::Id, now: i64) -> super::Result<bool> {
        let res = self
            .col
            .update_one(
                doc! { "_id": id, "deleted_at": null, "messages.0": head },
                doc! { "$set": { "updated_at": now } },
            )
            .await?;

        Ok(res.matched_count > 0)
    }

    async fn mark_deleted(&self, id: &Id, now: i64) -> super::Result<bool> {
        let res = self
            .col
            .update_one(
                doc! { "_id": id, "deleted_at": null },
                doc! { "$set": { "deleted_at": now } },
            )
            .await?;

        Ok(res.modified_count > 0)
    }

    async fn find_marked_deleted(&self) -> super::Result<Vec<Conversation>> {
        let cursor = self
            .col
            .find(doc! { "deleted_at": { "$ne": null } })
            .await?;

        cursor.try_collect().await.map_err(super::Error::from)
    }

    async fn delete(&self, id: &Id) -> super::Result<bool> {
        let res = self.col.delete_one(doc! { "_id": id }).await?;
        Ok(res.deleted_count > 0)
    }
}
