use async_trait::async_trait;
use log::{debug, error, warn};

use crate::clock::Clock;
use crate::event::{Notification, SystemMessage};
use crate::message::model::LastMessage;
use crate::user::model::UserInfo;
use crate::{event, message, user};

use super::model::{Conversation, ConversationDto};
use super::{Error, Id, Repository};

#[async_trait]
pub trait ConversationService {
    /// `requester` is always added to `participants`.
    async fn create(
        &self,
        participants: &[user::Id],
        name: Option<&str>,
        requester: &user::Id,
    ) -> super::Result<ConversationDto>;

    async fn find(&self, id: &Id) -> super::Result<Conversation>;

    async fn find_by_id(&self, id: &Id, requester: &user::Id) -> super::Result<ConversationDto>;

    /// Most recently active first, conversations without messages last.
    async fn list_for_user(&self, user: &user::Id) -> super::Result<Vec<ConversationDto>>;

    async fn rename(&self, id: &Id, name: &str, requester: &user::Id) -> super::Result<()>;

    async fn switch_admin(
        &self,
        id: &Id,
        new_admin: &user::Id,
        requester: &user::Id,
    ) -> super::Result<()>;

    async fn remove_member(
        &self,
        id: &Id,
        target: &user::Id,
        requester: &user::Id,
    ) -> super::Result<()>;

    async fn leave(&self, id: &Id, requester: &user::Id) -> super::Result<()>;

    async fn add_member(
        &self,
        id: &Id,
        target: &user::Id,
        requester: &user::Id,
    ) -> super::Result<()>;

    async fn add_message_ref(&self, id: &Id, message_id: &message::Id) -> super::Result<()>;

    /// True while `head` is still the newest message of the conversation.
    async fn claim_head(&self, id: &Id, head: &message::Id) -> super::Result<bool>;

    /// Removes the conversation together with all of its messages.
    async fn delete(&self, id: &Id) -> super::Result<()>;

    /// Finishes deletes left pending by an earlier failure. Returns how many
    /// conversations were fully removed.
    async fn sweep(&self) -> super::Result<usize>;
}

#[derive(Clone)]
pub struct ConversationServiceImpl {
    repo: Repository,
    message_repo: message::Repository,
    user_service: user::Service,
    relay: event::Service,
    clock: Clock,
}

impl ConversationServiceImpl {
    pub fn new(
        repo: Repository,
        message_repo: message::Repository,
        user_service: user::Service,
        relay: event::Service,
        clock: Clock,
    ) -> Self {
        Self {
            repo,
            message_repo,
            user_service,
            relay,
            clock,
        }
    }
}

#[async_trait]
impl ConversationService for ConversationServiceImpl {
    async fn create(
        &self,
        participants: &[user::Id],
        name: Option<&str>,
        requester: &user::Id,
    ) -> super::Result<ConversationDto> {
        let mut members = participants.to_vec();
        members.push(requester.clone());
        members.sort();
        members.dedup();

        if members.len() < 2 {
            return Err(Error::NotEnoughParticipants(members.len()));
        }

        for m in &members {
            self.user_service.find_by_id(m).await?;
        }

        if members.len() == 2 {
            let other = members
                .iter()
                .find(|m| *m != requester)
                .ok_or(Error::NotEnoughParticipants(1))?;
            if self.user_service.has_blocked(other, requester).await? {
                return Err(Error::NotAuthorized);
            }
        }

        if self.repo.exists(&members).await? {
            return Err(Error::ConversationExists);
        }

        let name = name.map(str::trim).filter(|n| !n.is_empty()).map(String::from);
        let conversation = Conversation::new(members, name, requester, self.clock.now());
        self.repo.insert(&conversation).await?;
        debug!("created conversation {}", conversation.id());

        let dto = self.to_dto(&conversation, None).await?;
        for p in conversation.participants() {
            if p == requester {
                continue;
            }
            self.relay
                .notify(
                    p,
                    &Notification::AddedToConversation {
                        conversation: dto.clone(),
                    },
                )
                .await;
        }

        Ok(dto)
    }

    async fn find(&self, id: &Id) -> super::Result<Conversation> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(Error::NotFound(id.clone()))
    }

    async fn find_by_id(&self, id: &Id, requester: &user::Id) -> super::Result<ConversationDto> {
        let conversation = self.find(id).await?;
        if !conversation.is_participant(requester) {
            return Err(Error::NotAParticipant);
        }

        self.to_dto(&conversation, Some(requester)).await
    }

    async fn list_for_user(&self, user: &user::Id) -> super::Result<Vec<ConversationDto>> {
        let conversations = self.repo.find_by_participant(user).await?;

        let mut dtos = Vec::with_capacity(conversations.len());
        for c in &conversations {
            dtos.push(self.to_dto(c, Some(user)).await?);
        }

        dtos.sort_by_key(|d| std::cmp::Reverse(d.last_activity()));
        Ok(dtos)
    }

    async fn rename(&self, id: &Id, name: &str, requester: &user::Id) -> super::Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::EmptyName);
        }

        let conversation = self.find(id).await?;
        if !conversation.is_admin(requester) {
            return Err(Error::NotAuthorized);
        }

        self.repo.update_name(id, name, self.clock.now()).await?;
        Ok(())
    }

    async fn switch_admin(
        &self,
        id: &Id,
        new_admin: &user::Id,
        requester: &user::Id,
    ) -> super::Result<()> {
        let conversation = self.find(id).await?;
        if !conversation.is_admin(requester) {
            return Err(Error::NotAuthorized);
        }
        if !conversation.is_participant(new_admin) {
            return Err(Error::TargetNotParticipant(new_admin.clone()));
        }
        self.user_service.find_by_id(new_admin).await?;

        self.repo
            .update_admin(id, new_admin, self.clock.now())
            .await?;
        Ok(())
    }

    async fn remove_member(
        &self,
        id: &Id,
        target: &user::Id,
        requester: &user::Id,
    ) -> super::Result<()> {
        let conversation = self.find(id).await?;
        if target == requester {
            return Err(Error::SelfRemoval);
        }
        if !conversation.is_admin(requester) {
            return Err(Error::NotAuthorized);
        }
        if !conversation.is_participant(target) {
            return Err(Error::TargetNotParticipant(target.clone()));
        }

        let now = self.clock.now();
        let record = !conversation.was_removed(target);
        let updated = self
            .repo
            .remove_participant(id, target, record, now)
            .await?
            .ok_or(Error::NotFound(id.clone()))?;

        self.relay
            .notify(
                target,
                &Notification::RemovedFromConversation {
                    conversation_id: id.clone(),
                },
            )
            .await;
        self.relay
            .broadcast_system_message(
                updated.participants(),
                &SystemMessage::removed(id, target, now),
            )
            .await;

        self.delete_if_abandoned(&updated).await
    }

    async fn leave(&self, id: &Id, requester: &user::Id) -> super::Result<()> {
        let conversation = self.find(id).await?;
        if !conversation.is_participant(requester) {
            return Err(Error::NotAParticipant);
        }
        if conversation.is_admin(requester) {
            return Err(Error::AdminCannotLeave);
        }

        let now = self.clock.now();
        let record = !conversation.was_removed(requester);
        let updated = self
            .repo
            .remove_participant(id, requester, record, now)
            .await?
            .ok_or(Error::NotFound(id.clone()))?;

        self.relay
            .broadcast_system_message(
                updated.participants(),
                &SystemMessage::left(id, requester, now),
            )
            .await;

        self.delete_if_abandoned(&updated).await
    }

    async fn add_member(
        &self,
        id: &Id,
        target: &user::Id,
        requester: &user::Id,
    ) -> super::Result<()> {
        let conversation = self.find(id).await?;
        if !conversation.is_participant(requester) {
            return Err(Error::NotAParticipant);
        }
        self.user_service.find_by_id(target).await?;
        if conversation.is_participant(target) {
            return Err(Error::AlreadyParticipant(target.clone()));
        }

        let mut members = conversation.participants().to_vec();
        members.push(target.clone());
        if self.repo.exists(&members).await? {
            return Err(Error::ConversationExists);
        }

        let promote = match conversation.admin() {
            None if members.len() > 2 => Some(requester),
            _ => None,
        };

        let now = self.clock.now();
        if !self.repo.add_participant(id, target, promote, now).await? {
            return Err(Error::NotFound(id.clone()));
        }

        let updated = self.find(id).await?;
        let dto = self.to_dto(&updated, Some(target)).await?;
        self.relay
            .notify(
                target,
                &Notification::AddedToConversation { conversation: dto },
            )
            .await;
        self.relay
            .broadcast_system_message(
                conversation.participants(),
                &SystemMessage::joined(id, target, now),
            )
            .await;

        Ok(())
    }

    async fn add_message_ref(&self, id: &Id, message_id: &message::Id) -> super::Result<()> {
        if !self
            .repo
            .push_message_ref(id, message_id, self.clock.now())
            .await?
        {
            return Err(Error::NotFound(id.clone()));
        }

        Ok(())
    }

    async fn claim_head(&self, id: &Id, head: &message::Id) -> super::Result<bool> {
        self.repo.touch_head(id, head, self.clock.now()).await
    }

    async fn delete(&self, id: &Id) -> super::Result<()> {
        let conversation = self.find(id).await?;

        if !self.repo.mark_deleted(id, self.clock.now()).await? {
            return Err(Error::NotFound(id.clone()));
        }

        self.complete_delete(&conversation).await
    }

    async fn sweep(&self) -> super::Result<usize> {
        let pending = self.repo.find_marked_deleted().await?;

        let mut swept = 0;
        for c in &pending {
            match self.complete_delete(c).await {
                Ok(()) => swept += 1,
                Err(e) => warn!("sweep could not remove conversation {}: {e}", c.id()),
            }
        }

        Ok(swept)
    }
}

impl ConversationServiceImpl {
    async fn delete_if_abandoned(&self, c: &Conversation) -> super::Result<()> {
        if c.participants().len() > 1 {
            return Ok(());
        }

        debug!("conversation {} has a single participant left", c.id());
        self.delete(c.id()).await
    }

    /// Messages go first so a crash leaves a marked conversation the sweeper
    /// can retry instead of orphaned messages.
    async fn complete_delete(&self, c: &Conversation) -> super::Result<()> {
        for m in c.messages() {
            if let Err(e) = self.message_repo.delete(m).await {
                error!("failed to delete message {m} of conversation {}: {e:?}", c.id());
                return Err(Error::CascadeFailed(c.id().clone(), e.to_string()));
            }
        }

        if let Err(e) = self.repo.delete(c.id()).await {
            error!("failed to delete conversation {}: {e:?}", c.id());
            return Err(Error::CascadeFailed(c.id().clone(), e.to_string()));
        }

        Ok(())
    }

    async fn to_dto(
        &self,
        c: &Conversation,
        viewer: Option<&user::Id>,
    ) -> super::Result<ConversationDto> {
        let mut participants: Vec<UserInfo> = Vec::with_capacity(c.participants().len());
        for p in c.participants() {
            if Some(p) == viewer {
                continue;
            }
            match self.user_service.get_simple_info(p).await {
                Ok(info) => participants.push(info),
                Err(user::Error::NotFound(_)) => {
                    warn!("participant {p} of conversation {} is gone", c.id())
                }
                Err(e) => return Err(e.into()),
            }
        }

        let last_message = match c.head() {
            None => None,
            Some(head) => match self.message_repo.find_by_id(head).await {
                Ok(Some(m)) => Some(LastMessage::from(&m)),
                Ok(None) => {
                    warn!("head message {head} of conversation {} is missing", c.id());
                    None
                }
                Err(e) => {
                    error!("could not load head message {head}: {e:?}");
                    None
                }
            },
        };

        Ok(ConversationDto {
            id: c.id().clone(),
            name: c.name().map(String::from),
            admin: c.admin().cloned(),
            participants,
            last_message,
            updated_at: c.updated_at(),
        })
    }
}
