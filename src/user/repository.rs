use async_trait::async_trait;
use mongodb::{Database, bson::doc};

use super::Id;
use super::model::User;

const USERS_COLLECTION: &str = "users";

#[async_trait]
pub trait UserRepository {
    async fn insert(&self, user: &User) -> super::Result<()>;

    async fn find_by_id(&self, id: &Id) -> super::Result<Option<User>>;
}

pub struct MongoUserRepository {
    col: mongodb::Collection<User>,
}

impl MongoUserRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            col: db.collection(USERS_COLLECTION),
        }
    }
}

#[async_trait]
impl UserRepository for MongoUserRepository {
    async fn insert(&self, user: &User) -> super::Result<()> {
        self.col.insert_one(user).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &Id) -> super::Result<Option<User>> {
        self.col
            .find_one(doc! { "_id": id })
            .await
            .map_err(super::Error::from)
    }
}
