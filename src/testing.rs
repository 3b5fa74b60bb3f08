//! In-memory doubles for service tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::Notify;

use crate::conversation::{self, model::Conversation, repository::ConversationRepository};
use crate::event::{Notification, SystemMessage, model::EventStream, service::Relay};
use crate::integration::storage::{self, Image, ObjectStore, UploadedAsset};
use crate::message::{
    self,
    model::{Fragment, Message},
    repository::MessageRepository,
};
use crate::user::{self, model::User, repository::UserRepository};

#[derive(Default)]
pub struct InMemoryUsers {
    users: Mutex<HashMap<user::Id, User>>,
}

impl InMemoryUsers {
    pub fn with(users: Vec<User>) -> Self {
        Self {
            users: Mutex::new(users.into_iter().map(|u| (u.id().clone(), u)).collect()),
        }
    }

    pub fn remove(&self, id: &user::Id) {
        self.users.lock().unwrap().remove(id);
    }
}

#[async_trait]
impl UserRepository for InMemoryUsers {
    async fn insert(&self, user: &User) -> user::Result<()> {
        self.users
            .lock()
            .unwrap()
            .insert(user.id().clone(), user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &user::Id) -> user::Result<Option<User>> {
        Ok(self.users.lock().unwrap().get(id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryConversations {
    conversations: Mutex<HashMap<conversation::Id, Conversation>>,
}

impl InMemoryConversations {
    /// Raw lookup that also sees conversations pending deletion.
    pub fn get(&self, id: &conversation::Id) -> Option<Conversation> {
        self.conversations.lock().unwrap().get(id).cloned()
    }

    fn update<R>(
        &self,
        id: &conversation::Id,
        f: impl FnOnce(&mut Conversation) -> R,
    ) -> Option<R> {
        let mut all = self.conversations.lock().unwrap();
        all.get_mut(id)
            .filter(|c| c.deleted_at().is_none())
            .map(f)
    }
}

#[async_trait]
impl ConversationRepository for InMemoryConversations {
    async fn insert(&self, c: &Conversation) -> conversation::Result<()> {
        self.conversations
            .lock()
            .unwrap()
            .insert(c.id().clone(), c.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &conversation::Id) -> conversation::Result<Option<Conversation>> {
        Ok(self.get(id).filter(|c| c.deleted_at().is_none()))
    }

    async fn find_by_participant(&self, user: &user::Id) -> conversation::Result<Vec<Conversation>> {
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.deleted_at().is_none() && c.is_participant(user))
            .cloned()
            .collect())
    }

    async fn exists(&self, participants: &[user::Id]) -> conversation::Result<bool> {
        let mut wanted = participants.to_vec();
        wanted.sort();

        Ok(self
            .conversations
            .lock()
            .unwrap()
            .values()
            .any(|c| c.deleted_at().is_none() && c.participants() == wanted.as_slice()))
    }

    async fn update_name(
        &self,
        id: &conversation::Id,
        name: &str,
        now: i64,
    ) -> conversation::Result<bool> {
        Ok(self.update(id, |c| c.set_name(name, now)).is_some())
    }

    async fn update_admin(
        &self,
        id: &conversation::Id,
        admin: &user::Id,
        now: i64,
    ) -> conversation::Result<bool> {
        Ok(self.update(id, |c| c.set_admin(admin, now)).is_some())
    }

    async fn add_participant(
        &self,
        id: &conversation::Id,
        user: &user::Id,
        promote: Option<&user::Id>,
        now: i64,
    ) -> conversation::Result<bool> {
        Ok(self
            .update(id, |c| c.add_participant(user, promote, now))
            .is_some())
    }

    async fn remove_participant(
        &self,
        id: &conversation::Id,
        user: &user::Id,
        record: bool,
        now: i64,
    ) -> conversation::Result<Option<Conversation>> {
        Ok(self.update(id, |c| {
            c.remove_participant(user, record, now);
            c.clone()
        }))
    }

    async fn push_message_ref(
        &self,
        id: &conversation::Id,
        message_id: &message::Id,
        now: i64,
    ) -> conversation::Result<bool> {
        Ok(self
            .update(id, |c| c.prepend_message(message_id, now))
            .is_some())
    }

    async fn touch_head(
        &self,
        id: &conversation::Id,
        head: &message::Id,
        now: i64,
    ) -> conversation::Result<bool> {
        Ok(self.update(id, |c| c.touch_head(head, now)).unwrap_or(false))
    }

    async fn mark_deleted(&self, id: &conversation::Id, now: i64) -> conversation::Result<bool> {
        Ok(self.update(id, |c| c.mark_deleted(now)).is_some())
    }

    async fn find_marked_deleted(&self) -> conversation::Result<Vec<Conversation>> {
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.deleted_at().is_some())
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &conversation::Id) -> conversation::Result<bool> {
        Ok(self.conversations.lock().unwrap().remove(id).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryMessages {
    messages: Mutex<HashMap<message::Id, Message>>,
    fail_deletes: AtomicBool,
}

impl InMemoryMessages {
    pub fn put(&self, m: Message) {
        self.messages.lock().unwrap().insert(m.id().clone(), m);
    }

    pub fn get(&self, id: &message::Id) -> Option<Message> {
        self.messages.lock().unwrap().get(id).cloned()
    }

    pub fn contains(&self, id: &message::Id) -> bool {
        self.messages.lock().unwrap().contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().unwrap().is_empty()
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessages {
    async fn insert(&self, m: &Message) -> message::Result<()> {
        self.put(m.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &message::Id) -> message::Result<Option<Message>> {
        Ok(self.get(id))
    }

    async fn find_many_since(
        &self,
        ids: &[message::Id],
        since: i64,
    ) -> message::Result<Vec<Message>> {
        let all = self.messages.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| all.get(id))
            .filter(|m| m.created_at() >= since)
            .cloned()
            .collect())
    }

    async fn append_fragment(
        &self,
        id: &message::Id,
        sender: &user::Id,
        fragment: &Fragment,
        not_before: i64,
        now: i64,
    ) -> message::Result<Option<Message>> {
        let mut all = self.messages.lock().unwrap();
        match all.get_mut(id) {
            Some(m) if m.sender() == sender && m.updated_at() >= not_before => {
                m.push_fragment(fragment.clone(), now);
                Ok(Some(m.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_seen(&self, id: &message::Id, by: &user::Id) -> message::Result<bool> {
        let mut all = self.messages.lock().unwrap();
        Ok(all.get_mut(id).map(|m| m.mark_seen(by)).is_some())
    }

    async fn delete(&self, id: &message::Id) -> message::Result<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(message::Error::NotFound(id.clone()));
        }
        Ok(self.messages.lock().unwrap().remove(id).is_some())
    }
}

/// Uploads keep `{folder}/{file_name}` as public id. File names starting with
/// `broken` are rejected.
#[derive(Default)]
pub struct FakeStorage {
    stored: Mutex<Vec<String>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeStorage {
    pub fn stored(&self) -> Vec<String> {
        self.stored.lock().unwrap().clone()
    }

    /// Every following upload waits for a permit on the returned gate.
    pub fn hold_uploads(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl ObjectStore for FakeStorage {
    async fn upload_image(&self, image: &Image, folder: &str) -> storage::Result<UploadedAsset> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if image.file_name.starts_with("broken") {
            return Err(storage::Error::Rejected(image.file_name.clone()));
        }

        let public_id = format!("{folder}/{}", image.file_name);
        self.stored.lock().unwrap().push(public_id.clone());
        Ok(UploadedAsset {
            public_id,
            width: 1,
            height: 1,
        })
    }

    fn url(&self, public_id: &str) -> String {
        format!("https://cdn.test/{public_id}")
    }

    async fn delete_image(&self, public_id: &str) -> storage::Result<bool> {
        let mut stored = self.stored.lock().unwrap();
        let before = stored.len();
        stored.retain(|s| s != public_id);
        Ok(stored.len() < before)
    }
}

#[derive(Default)]
pub struct RecordingRelay {
    sent: Mutex<Vec<(user::Id, Notification)>>,
}

impl RecordingRelay {
    pub fn notifications_for(&self, target: &user::Id) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == target)
            .map(|(_, n)| n.clone())
            .collect()
    }
}

#[async_trait]
impl Relay for RecordingRelay {
    async fn notify(&self, target: &user::Id, noti: &Notification) {
        self.sent
            .lock()
            .unwrap()
            .push((target.clone(), noti.clone()));
    }

    async fn broadcast_system_message(&self, targets: &[user::Id], msg: &SystemMessage) {
        for t in targets {
            self.notify(t, &Notification::System(msg.clone())).await;
        }
    }

    async fn subscribe(&self, _target: &user::Id) -> crate::event::Result<EventStream> {
        Ok(Box::pin(stream::empty()))
    }
}

/// Fully wired state over in-memory doubles, tokens verified with
/// [`crate::auth::tests::SECRET`].
pub fn app_state(users: Vec<User>) -> crate::state::AppState {
    use crate::clock;
    use crate::conversation::service::ConversationServiceImpl;
    use crate::event::presence::Presence;
    use crate::message::service::MessageServiceImpl;
    use crate::user::service::UserServiceImpl;

    let storage: storage::Storage = Arc::new(FakeStorage::default());
    let relay: crate::event::Service = Arc::new(RecordingRelay::default());
    let messages: message::Repository = Arc::new(InMemoryMessages::default());
    let presence = Presence::default();
    let clock = clock::system();

    let user_service: user::Service = Arc::new(UserServiceImpl::new(
        Arc::new(InMemoryUsers::with(users)),
        storage.clone(),
        presence.clone(),
    ));
    let conversation_service: conversation::Service = Arc::new(ConversationServiceImpl::new(
        Arc::new(InMemoryConversations::default()),
        messages.clone(),
        user_service.clone(),
        relay.clone(),
        clock.clone(),
    ));
    let message_service: message::Service = Arc::new(MessageServiceImpl::new(
        messages,
        conversation_service.clone(),
        user_service.clone(),
        storage,
        relay.clone(),
        clock,
    ));

    crate::state::AppState {
        verifier: crate::auth::Verifier::new(crate::auth::tests::SECRET),
        presence,
        user_service,
        conversation_service,
        message_service,
        relay,
    }
}
