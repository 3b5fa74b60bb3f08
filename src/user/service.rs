use async_trait::async_trait;

use crate::event::presence::Presence;
use crate::integration::storage;
use crate::pagination::{self, Cursor, Page};

use super::model::{FriendDto, User, UserInfo};
use super::{Id, Repository};

#[async_trait]
pub trait UserService {
    async fn find_by_id(&self, id: &Id) -> super::Result<User>;

    async fn get_simple_info(&self, id: &Id) -> super::Result<UserInfo>;

    /// Whether `a` is on `b`'s friend list.
    async fn is_a_friend_to_b(&self, a: &Id, b: &Id) -> super::Result<bool>;

    /// Whether `blocker` has `target` on its block list.
    async fn has_blocked(&self, blocker: &Id, target: &Id) -> super::Result<bool>;

    async fn find_friends(
        &self,
        id: &Id,
        cursor: &Cursor<Id>,
        limit: usize,
    ) -> super::Result<Page<FriendDto, Id>>;
}

#[derive(Clone)]
pub struct UserServiceImpl {
    repo: Repository,
    storage: storage::Storage,
    presence: Presence,
}

impl UserServiceImpl {
    pub fn new(repo: Repository, storage: storage::Storage, presence: Presence) -> Self {
        Self {
            repo,
            storage,
            presence,
        }
    }
}

#[async_trait]
impl UserService for UserServiceImpl {
    async fn find_by_id(&self, id: &Id) -> super::Result<User> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(super::Error::NotFound(id.clone()))
    }

    async fn get_simple_info(&self, id: &Id) -> super::Result<UserInfo> {
        let user = self.find_by_id(id).await?;
        Ok(self.to_info(&user))
    }

    async fn is_a_friend_to_b(&self, a: &Id, b: &Id) -> super::Result<bool> {
        let b = self.find_by_id(b).await?;
        Ok(b.has_friend(a))
    }

    async fn has_blocked(&self, blocker: &Id, target: &Id) -> super::Result<bool> {
        let blocker = self.find_by_id(blocker).await?;
        Ok(blocker.has_blocked(target))
    }

    async fn find_friends(
        &self,
        id: &Id,
        cursor: &Cursor<Id>,
        limit: usize,
    ) -> super::Result<Page<FriendDto, Id>> {
        let user = self.find_by_id(id).await?;
        let page = pagination::by_count(user.friends(), cursor, limit, |f| f)?;

        let mut items = Vec::with_capacity(page.items.len());
        for friend in &page.items {
            let info = self.get_simple_info(friend).await?;
            let online = self.presence.is_online(friend).await;
            items.push(FriendDto { info, online });
        }

        Ok(Page {
            items,
            next: page.next,
        })
    }
}

impl UserServiceImpl {
    fn to_info(&self, user: &User) -> UserInfo {
        UserInfo {
            id: user.id().clone(),
            name: user.name().to_owned(),
            avatar: user.avatar().map(|a| self.storage.url(a)),
        }
    }
}
