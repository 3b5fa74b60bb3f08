use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    Database,
    bson::{self, Bson, doc},
    options::ReturnDocument,
};

use crate::user;

use super::Id;
use super::model::{Fragment, Message};

const MESSAGES_COLLECTION: &str = "messages";

#[async_trait]
pub trait MessageRepository {
    async fn insert(&self, m: &Message) -> super::Result<()>;

    async fn find_by_id(&self, id: &Id) -> super::Result<Option<Message>>;

    /// Messages among `ids` created at or after `since`, in no particular order.
    async fn find_many_since(&self, ids: &[Id], since: i64) -> super::Result<Vec<Message>>;

    /// Appends `fragment` to message `id` in a single conditional write and
    /// returns the updated message. Only succeeds while the message belongs to
    /// `sender` and was last updated at or after `not_before`.
    async fn append_fragment(
        &self,
        id: &Id,
        sender: &user::Id,
        fragment: &Fragment,
        not_before: i64,
        now: i64,
    ) -> super::Result<Option<Message>>;

    async fn mark_seen(&self, id: &Id, by: &user::Id) -> super::Result<bool>;

    async fn delete(&self, id: &Id) -> super::Result<bool>;
}

pub struct MongoMessageRepository {
    col: mongodb::Collection<Message>,
}

impl MongoMessageRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            col: db.collection(MESSAGES_COLLECTION),
        }
    }
}

#[async_trait]
impl MessageRepository for MongoMessageRepository {
    async fn insert(&self, m: &Message) -> super::Result<()> {
        self.col.insert_one(m).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &Id) -> super::Result<Option<Message>> {
        self.col
            .find_one(doc! { "_id": id })
            .await
            .map_err(super::Error::from)
    }

    async fn find_many_since(&self, ids: &[Id], since: i64) -> super::Result<Vec<Message>> {
        let ids: Vec<Bson> = ids.iter().map(Bson::from).collect();

        let cursor = self
            .col
            .find(doc! {
                "_id": { "$in": ids },
                "created_at": { "$gte": since },
            })
            .await?;

        cursor.try_collect().await.map_err(super::Error::from)
    }

    async fn append_fragment(
        &self,
        id: &Id,
        sender: &user::Id,
        fragment: &Fragment,
        not_before: i64,
        now: i64,
    ) -> super::Result<Option<Message>> {
        let fragment = bson::to_bson(fragment)?;

        self.col
            .find_one_and_update(
                doc! {
                    "_id": id,
                    "sender": sender,
                    "updated_at": { "$gte": not_before },
                },
                doc! {
                    "$push": { "fragments": fragment },
                    "$set": { "updated_at": now },
                },
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(super::Error::from)
    }

    async fn mark_seen(&self, id: &Id, by: &user::Id) -> super::Result<bool> {
        let res = self
            .col
            .update_one(
                doc! { "_id": id },
                doc! { "$addToSet": { "fragments.$[].seen_by": by } },
            )
            .await?;

        Ok(res.matched_count > 0)
    }

    async fn delete(&self, id: &Id) -> super::Result<bool> {
        let res = self.col.delete_one(doc! { "_id": id }).await?;
        Ok(res.deleted_count > 0)
    }
}
