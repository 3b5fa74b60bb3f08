use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, warn};

use crate::clock::Clock;
use crate::conversation::{self, model::Conversation};
use crate::event::{self, Notification};
use crate::integration::storage::{self, Image};
use crate::pagination::{self, Cursor, Page};
use crate::user::{self, model::UserInfo};

use super::model::{Content, ContentDto, Fragment, FragmentDto, ImageDto, Message, MessageDto};
use super::{Error, Id, Repository};

/// Consecutive fragments from one sender merge into the head message while
/// it was updated less than this long ago.
pub const BATCHING_WINDOW: Duration = Duration::from_secs(120);
pub const MAX_IMAGES: usize = 10;
pub const DEFAULT_WINDOW_MINUTES: u32 = 60;

pub enum Draft {
    Text(String),
    Images(Vec<Image>),
}

#[async_trait]
pub trait MessageService {
    async fn append(
        &self,
        conversation_id: &conversation::Id,
        sender: &user::Id,
        draft: Draft,
    ) -> super::Result<MessageDto>;

    /// Newest first. A page holds the message at the cursor and every
    /// following message created within `window_minutes` before it.
    async fn paginate(
        &self,
        conversation_id: &conversation::Id,
        window_minutes: u32,
        cursor: &Cursor<Id>,
        requester: &user::Id,
    ) -> super::Result<Page<MessageDto, Id>>;

    /// Marks every fragment of the newest message as seen by `requester`.
    async fn mark_seen(
        &self,
        conversation_id: &conversation::Id,
        requester: &user::Id,
    ) -> super::Result<()>;
}

#[derive(Clone)]
pub struct MessageServiceImpl {
    repo: Repository,
    conversation_service: conversation::Service,
    user_service: user::Service,
    storage: storage::Storage,
    relay: event::Service,
    clock: Clock,
}

impl MessageServiceImpl {
    pub fn new(
        repo: Repository,
        conversation_service: conversation::Service,
        user_service: user::Service,
        storage: storage::Storage,
        relay: event::Service,
        clock: Clock,
    ) -> Self {
        Self {
            repo,
            conversation_service,
            user_service,
            storage,
            relay,
            clock,
        }
    }
}

#[async_trait]
impl MessageService for MessageServiceImpl {
    async fn append(
        &self,
        conversation_id: &conversation::Id,
        sender: &user::Id,
        draft: Draft,
    ) -> super::Result<MessageDto> {
        let conversation = self.participant_view(conversation_id, sender).await?;
        // resolved up front so nothing after the write depends on the directory
        let mut senders = HashMap::from([(
            sender.clone(),
            self.user_service.get_simple_info(sender).await?,
        )]);
        let content = self.prepare(conversation_id, draft).await?;

        let now = self.clock.now();
        let fragment = Fragment::new(content, now);

        if let Some(head) = conversation.head() {
            if self
                .conversation_service
                .claim_head(conversation_id, head)
                .await?
            {
                let not_before = now - BATCHING_WINDOW.as_millis() as i64;
                if let Some(merged) = self
                    .repo
                    .append_fragment(head, sender, &fragment, not_before, now)
                    .await?
                {
                    debug!("batched fragment into message {head}");
                    let dto = self.to_dto(&merged, &mut senders).await?;
                    self.announce(&conversation, sender, &dto).await;
                    return Ok(dto);
                }
            } else {
                debug!("head of {conversation_id} moved past {head}");
            }
        }

        let message = Message::new(sender, fragment.content().clone(), now);
        self.repo.insert(&message).await?;
        if let Err(e) = self
            .conversation_service
            .add_message_ref(conversation_id, message.id())
            .await
        {
            self.discard(&message).await;
            return Err(e.into());
        }
        debug!("started message {} in {conversation_id}", message.id());

        let dto = self.to_dto(&message, &mut senders).await?;
        self.announce(&conversation, sender, &dto).await;
        Ok(dto)
    }

    async fn paginate(
        &self,
        conversation_id: &conversation::Id,
        window_minutes: u32,
        cursor: &Cursor<Id>,
        requester: &user::Id,
    ) -> super::Result<Page<MessageDto, Id>> {
        let conversation = self.participant_view(conversation_id, requester).await?;

        let refs = conversation.messages();
        let start = pagination::start_index(refs, cursor, |m| m)?;
        let rest = &refs[start..];

        let Some(anchor_id) = rest.first() else {
            return Ok(Page::end());
        };
        let anchor = self
            .repo
            .find_by_id(anchor_id)
            .await?
            .ok_or(Error::NotFound(anchor_id.clone()))?;

        let window_start = anchor.created_at() - i64::from(window_minutes) * 60_000;
        let mut found: HashMap<Id, Message> = self
            .repo
            .find_many_since(rest, window_start)
            .await?
            .into_iter()
            .map(|m| (m.id().clone(), m))
            .collect();

        let taken: Vec<Message> = rest.iter().map_while(|id| found.remove(id)).collect();

        let next = match rest.get(taken.len()) {
            Some(id) => Cursor::At(id.clone()),
            None => Cursor::End,
        };

        let mut senders = HashMap::new();
        let mut items = Vec::with_capacity(taken.len());
        for m in &taken {
            items.push(self.to_dto(m, &mut senders).await?);
        }

        Ok(Page { items, next })
    }

    async fn mark_seen(
        &self,
        conversation_id: &conversation::Id,
        requester: &user::Id,
    ) -> super::Result<()> {
        let conversation = self.participant_view(conversation_id, requester).await?;

        let Some(head) = conversation.head() else {
            return Ok(());
        };
        if !self.repo.mark_seen(head, requester).await? {
            return Err(Error::NotFound(head.clone()));
        }

        let Some(message) = self.repo.find_by_id(head).await? else {
            return Ok(());
        };
        if message.sender() != requester {
            self.relay
                .notify(
                    message.sender(),
                    &Notification::MessageSeen {
                        conversation_id: conversation_id.clone(),
                        message_id: head.clone(),
                        seen_by: requester.clone(),
                    },
                )
                .await;
        }

        Ok(())
    }
}

impl MessageServiceImpl {
    async fn participant_view(
        &self,
        conversation_id: &conversation::Id,
        user: &user::Id,
    ) -> super::Result<Conversation> {
        let conversation = self.conversation_service.find(conversation_id).await?;
        if !conversation.is_participant(user) {
            return Err(Error::SenderNotParticipant);
        }
        Ok(conversation)
    }

    async fn prepare(&self, conversation_id: &conversation::Id, draft: Draft) -> super::Result<Content> {
        match draft {
            Draft::Text(body) => {
                if body.trim().is_empty() {
                    return Err(Error::EmptyText);
                }
                Ok(Content::Text { body })
            }
            Draft::Images(images) => {
                if images.is_empty() {
                    return Err(Error::NoImages);
                }
                if images.len() > MAX_IMAGES {
                    return Err(Error::TooManyImages(images.len()));
                }
                let asset_ids = self.upload_all(conversation_id, &images).await?;
                Ok(Content::images(asset_ids))
            }
        }
    }

    /// Uploads concurrently, keeping the input order. Nothing stays in the
    /// object store when any upload fails.
    async fn upload_all(
        &self,
        conversation_id: &conversation::Id,
        images: &[Image],
    ) -> super::Result<Vec<String>> {
        let folder = format!("conversations/{conversation_id}");
        let results = join_all(images.iter().map(|i| self.storage.upload_image(i, &folder))).await;

        let mut uploaded = Vec::with_capacity(results.len());
        let mut failure = None;
        for r in results {
            match r {
                Ok(asset) => uploaded.push(asset.public_id),
                Err(e) if failure.is_none() => failure = Some(e),
                Err(e) => warn!("additional upload failure: {e}"),
            }
        }

        match failure {
            None => Ok(uploaded),
            Some(e) => {
                for id in &uploaded {
                    if let Err(e) = self.storage.delete_image(id).await {
                        warn!("could not clean up uploaded image {id}: {e}");
                    }
                }
                Err(Error::Upload(e))
            }
        }
    }

    /// Best-effort removal of a message no conversation references.
    async fn discard(&self, m: &Message) {
        if let Err(e) = self.repo.delete(m.id()).await {
            warn!("could not discard unreferenced message {}: {e}", m.id());
        }
        for f in m.fragments() {
            if let Content::Image { asset_ids } = f.content() {
                for id in asset_ids {
                    if let Err(e) = self.storage.delete_image(id).await {
                        warn!("could not clean up uploaded image {id}: {e}");
                    }
                }
            }
        }
    }

    async fn announce(&self, conversation: &Conversation, sender: &user::Id, dto: &MessageDto) {
        let noti = Notification::NewMessage {
            conversation_id: conversation.id().clone(),
            message: dto.clone(),
        };
        for p in conversation.participants() {
            if p != sender {
                self.relay.notify(p, &noti).await;
            }
        }
    }

    async fn to_dto(
        &self,
        m: &Message,
        senders: &mut HashMap<user::Id, UserInfo>,
    ) -> super::Result<MessageDto> {
        let sender = match senders.get(m.sender()) {
            Some(info) => info.clone(),
            None => {
                let info = self.user_service.get_simple_info(m.sender()).await?;
                senders.insert(m.sender().clone(), info.clone());
                info
            }
        };

        let fragments = m
            .fragments()
            .iter()
            .map(|f| FragmentDto {
                content: match f.content() {
                    Content::Text { body } => ContentDto::Text { body: body.clone() },
                    Content::Image { asset_ids } => ContentDto::Image {
                        images: asset_ids
                            .iter()
                            .map(|id| ImageDto {
                                asset_id: id.clone(),
                                url: self.storage.url(id),
                            })
                            .collect(),
                    },
                },
                seen_by: f.seen_by().to_vec(),
                created_at: f.created_at(),
            })
            .collect();

        Ok(MessageDto {
            id: m.id().clone(),
            sender,
            fragments,
            created_at: m.created_at(),
            updated_at: m.updated_at(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;

    use crate::clock::manual::ManualClock;
    use crate::conversation::service::{ConversationService, ConversationServiceImpl};
    use crate::event::presence::Presence;
    use crate::testing::{
        FakeStorage, InMemoryConversations, InMemoryMessages, InMemoryUsers, RecordingRelay,
    };
    use crate::user::model::User;
    use crate::user::service::UserServiceImpl;

    use super::*;

    struct Fixture {
        service: MessageServiceImpl,
        conversations: conversation::Service,
        messages: Arc<InMemoryMessages>,
        storage: Arc<FakeStorage>,
        relay: Arc<RecordingRelay>,
        users: Arc<InMemoryUsers>,
        clock: ManualClock,
    }

    fn uid(s: &str) -> user::Id {
        user::Id::from(s)
    }

    fn fixture() -> Fixture {
        let users = ["a", "b", "c", "z"]
            .into_iter()
            .map(|n| User::new(uid(n), n, format!("{n}@mail.md")))
            .collect();
        let storage = Arc::new(FakeStorage::default());
        let messages = Arc::new(InMemoryMessages::default());
        let relay = Arc::new(RecordingRelay::default());
        let users = Arc::new(InMemoryUsers::with(users));
        let clock = ManualClock::at(10_000_000);

        let user_service: user::Service = Arc::new(UserServiceImpl::new(
            users.clone(),
            storage.clone(),
            Presence::default(),
        ));
        let conversations: conversation::Service = Arc::new(ConversationServiceImpl::new(
            Arc::new(InMemoryConversations::default()),
            messages.clone(),
            user_service.clone(),
            relay.clone(),
            Arc::new(clock.clone()),
        ));
        let service = MessageServiceImpl::new(
            messages.clone(),
            conversations.clone(),
            user_service,
            storage.clone(),
            relay.clone(),
            Arc::new(clock.clone()),
        );

        Fixture {
            service,
            conversations,
            messages,
            storage,
            relay,
            users,
            clock,
        }
    }

    async fn conversation(f: &Fixture) -> conversation::Id {
        f.conversations
            .create(&[uid("b"), uid("c")], Some("team"), &uid("a"))
            .await
            .unwrap()
            .id
    }

    fn text(s: &str) -> Draft {
        Draft::Text(s.to_owned())
    }

    fn image(name: &str) -> Image {
        Image {
            file_name: name.to_owned(),
            content_type: "image/png".to_owned(),
            bytes: Bytes::from_static(b"png"),
        }
    }

    async fn refs(f: &Fixture, id: &conversation::Id) -> Vec<Id> {
        f.conversations.find(id).await.unwrap().messages().to_vec()
    }

    #[tokio::test]
    async fn should_batch_fragments_within_window() {
        let f = fixture();
        let cid = conversation(&f).await;

        f.service.append(&cid, &uid("a"), text("one")).await.unwrap();
        f.clock.advance(Duration::from_secs(119));
        let dto = f.service.append(&cid, &uid("a"), text("two")).await.unwrap();

        assert_eq!(dto.fragments.len(), 2);
        assert_eq!(refs(&f, &cid).await.len(), 1);
    }

    #[tokio::test]
    async fn should_start_new_message_after_window() {
        let f = fixture();
        let cid = conversation(&f).await;

        f.service.append(&cid, &uid("a"), text("one")).await.unwrap();
        f.clock.advance(Duration::from_secs(121));
        let dto = f.service.append(&cid, &uid("a"), text("two")).await.unwrap();

        assert_eq!(dto.fragments.len(), 1);
        let refs = refs(&f, &cid).await;
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0], dto.id);
    }

    #[tokio::test]
    async fn should_measure_window_from_last_fragment() {
        let f = fixture();
        let cid = conversation(&f).await;

        f.service.append(&cid, &uid("a"), text("one")).await.unwrap();
        for _ in 0..3 {
            f.clock.advance(Duration::from_secs(100));
            f.service.append(&cid, &uid("a"), text("more")).await.unwrap();
        }

        assert_eq!(refs(&f, &cid).await.len(), 1);
        let head = f.messages.get(&refs(&f, &cid).await[0]).unwrap();
        assert_eq!(head.fragments().len(), 4);
    }

    #[tokio::test]
    async fn should_not_batch_across_senders() {
        let f = fixture();
        let cid = conversation(&f).await;

        f.service.append(&cid, &uid("a"), text("hi")).await.unwrap();
        f.service.append(&cid, &uid("b"), text("hey")).await.unwrap();
        f.service.append(&cid, &uid("a"), text("again")).await.unwrap();

        assert_eq!(refs(&f, &cid).await.len(), 3);
    }

    #[tokio::test]
    async fn should_reject_non_participant_sender() {
        let f = fixture();
        let cid = conversation(&f).await;

        let err = f.service.append(&cid, &uid("z"), text("hi")).await.unwrap_err();
        assert!(matches!(err, Error::SenderNotParticipant));

        let err = f
            .service
            .append(&conversation::Id::random(), &uid("a"), text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConversationNotFound(_)));
    }

    #[tokio::test]
    async fn should_validate_drafts() {
        let f = fixture();
        let cid = conversation(&f).await;

        let err = f.service.append(&cid, &uid("a"), text("  ")).await.unwrap_err();
        assert!(matches!(err, Error::EmptyText));

        let err = f
            .service
            .append(&cid, &uid("a"), Draft::Images(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoImages));

        let many = (0..11).map(|i| image(&format!("{i}.png"))).collect();
        let err = f
            .service
            .append(&cid, &uid("a"), Draft::Images(many))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TooManyImages(11)));

        assert!(refs(&f, &cid).await.is_empty());
    }

    #[tokio::test]
    async fn should_upload_images_in_order() {
        let f = fixture();
        let cid = conversation(&f).await;

        let dto = f
            .service
            .append(
                &cid,
                &uid("a"),
                Draft::Images(vec![image("1.png"), image("2.png"), image("3.png")]),
            )
            .await
            .unwrap();

        let ContentDto::Image { images } = &dto.fragments[0].content else {
            panic!("expected image fragment");
        };
        let names: Vec<&str> = images.iter().map(|i| i.asset_id.as_str()).collect();
        assert_eq!(
            names,
            vec![
                format!("conversations/{cid}/1.png"),
                format!("conversations/{cid}/2.png"),
                format!("conversations/{cid}/3.png"),
            ]
        );
        assert_eq!(images[0].url, format!("https://cdn.test/conversations/{cid}/1.png"));
    }

    #[tokio::test]
    async fn should_clean_up_when_an_upload_fails() {
        let f = fixture();
        let cid = conversation(&f).await;

        let err = f
            .service
            .append(
                &cid,
                &uid("a"),
                Draft::Images(vec![image("1.png"), image("broken.png"), image("3.png")]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Upload(_)));
        assert!(refs(&f, &cid).await.is_empty());
        assert!(f.storage.stored().is_empty());
    }

    #[tokio::test]
    async fn should_notify_other_participants_of_new_message() {
        let f = fixture();
        let cid = conversation(&f).await;

        f.service.append(&cid, &uid("a"), text("hi")).await.unwrap();

        let is_new = |n: &Notification| matches!(n, Notification::NewMessage { .. });
        assert!(!f.relay.notifications_for(&uid("a")).iter().any(is_new));
        assert!(f.relay.notifications_for(&uid("b")).iter().any(is_new));
        assert!(f.relay.notifications_for(&uid("c")).iter().any(is_new));
    }

    async fn seed_minutes_apart(f: &Fixture, cid: &conversation::Id, gaps: &[u64]) {
        f.service.append(cid, &uid("a"), text("m0")).await.unwrap();
        for (i, gap) in gaps.iter().enumerate() {
            f.clock.advance(Duration::from_secs(gap * 60));
            let sender = if i % 2 == 0 { "b" } else { "a" };
            f.service
                .append(cid, &uid(sender), text(&format!("m{}", i + 1)))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn should_page_by_time_window() {
        let f = fixture();
        let cid = conversation(&f).await;
        // created at 0, 10, 20, 90, 100 minutes
        seed_minutes_apart(&f, &cid, &[10, 10, 70, 10]).await;
        let all = refs(&f, &cid).await;

        let first = f
            .service
            .paginate(&cid, 30, &Cursor::Start, &uid("a"))
            .await
            .unwrap();
        let ids: Vec<&Id> = first.items.iter().map(|m| &m.id).collect();
        assert_eq!(ids, vec![&all[0], &all[1]]);
        assert_eq!(first.next, Cursor::At(all[2].clone()));

        let second = f.service.paginate(&cid, 30, &first.next, &uid("a")).await.unwrap();
        let ids: Vec<&Id> = second.items.iter().map(|m| &m.id).collect();
        assert_eq!(ids, vec![&all[2], &all[3], &all[4]]);
        assert_eq!(second.next, Cursor::End);

        let done = f.service.paginate(&cid, 30, &second.next, &uid("a")).await.unwrap();
        assert!(done.items.is_empty());
        assert_eq!(done.next, Cursor::End);
    }

    #[tokio::test]
    async fn should_always_include_cursor_message() {
        let f = fixture();
        let cid = conversation(&f).await;
        seed_minutes_apart(&f, &cid, &[120, 120]).await;
        let all = refs(&f, &cid).await;

        let mut cursor = Cursor::Start;
        let mut seen = vec![];
        while cursor != Cursor::End {
            let page = f.service.paginate(&cid, 1, &cursor, &uid("b")).await.unwrap();
            assert_eq!(page.items.len(), 1);
            seen.extend(page.items.into_iter().map(|m| m.id));
            cursor = page.next;
        }

        assert_eq!(seen, all);
    }

    #[tokio::test]
    async fn should_end_immediately_for_empty_conversation() {
        let f = fixture();
        let cid = conversation(&f).await;

        let page = f
            .service
            .paginate(&cid, 60, &Cursor::Start, &uid("a"))
            .await
            .unwrap();

        assert!(page.items.is_empty());
        assert_eq!(page.next, Cursor::End);
    }

    #[tokio::test]
    async fn should_reject_unknown_cursor_and_outsiders() {
        let f = fixture();
        let cid = conversation(&f).await;
        f.service.append(&cid, &uid("a"), text("hi")).await.unwrap();

        let err = f
            .service
            .paginate(&cid, 60, &Cursor::At(Id::random()), &uid("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::_Pagination(_)));

        let err = f
            .service
            .paginate(&cid, 60, &Cursor::Start, &uid("z"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SenderNotParticipant));
    }

    #[tokio::test]
    async fn should_mark_head_seen_and_notify_sender() {
        let f = fixture();
        let cid = conversation(&f).await;
        let dto = f.service.append(&cid, &uid("a"), text("hi")).await.unwrap();
        f.service.append(&cid, &uid("a"), text("there")).await.unwrap();

        f.service.mark_seen(&cid, &uid("b")).await.unwrap();

        let head = f.messages.get(&dto.id).unwrap();
        assert!(head.fragments().iter().all(|fr| fr.seen_by() == [uid("b")]));
        assert!(f.relay.notifications_for(&uid("a")).contains(&Notification::MessageSeen {
            conversation_id: cid.clone(),
            message_id: dto.id.clone(),
            seen_by: uid("b"),
        }));
    }

    #[tokio::test]
    async fn should_ignore_seen_on_empty_conversation() {
        let f = fixture();
        let cid = conversation(&f).await;

        f.service.mark_seen(&cid, &uid("b")).await.unwrap();
        assert!(f.relay.notifications_for(&uid("a")).is_empty());
    }

    #[tokio::test]
    async fn should_not_batch_into_superseded_head() {
        let f = fixture();
        let cid = conversation(&f).await;
        let first = f.service.append(&cid, &uid("a"), text("one")).await.unwrap();
        let gate = f.storage.hold_uploads();

        let author = uid("a");
        let (late, other) = tokio::join!(
            f.service
                .append(&cid, &author, Draft::Images(vec![image("1.png")])),
            async {
                let dto = f.service.append(&cid, &uid("b"), text("two")).await;
                gate.notify_one();
                dto
            },
        );
        let late = late.unwrap();
        let other = other.unwrap();

        assert_eq!(
            refs(&f, &cid).await,
            vec![late.id.clone(), other.id, first.id.clone()]
        );
        assert_eq!(late.fragments.len(), 1);
        assert_eq!(f.messages.get(&first.id).unwrap().fragments().len(), 1);
    }

    #[tokio::test]
    async fn should_discard_message_when_conversation_is_deleted_mid_append() {
        let f = fixture();
        let cid = conversation(&f).await;
        let gate = f.storage.hold_uploads();

        let author = uid("a");
        let (appended, _) = tokio::join!(
            f.service
                .append(&cid, &author, Draft::Images(vec![image("1.png")])),
            async {
                f.conversations.delete(&cid).await.unwrap();
                gate.notify_one();
            },
        );

        assert!(matches!(appended, Err(Error::ConversationNotFound(_))));
        assert!(f.messages.is_empty());
        assert!(f.storage.stored().is_empty());
    }

    #[tokio::test]
    async fn should_fail_before_writing_when_sender_left_directory() {
        let f = fixture();
        let cid = conversation(&f).await;
        let first = f.service.append(&cid, &uid("a"), text("one")).await.unwrap();
        f.users.remove(&uid("a"));

        let res = f.service.append(&cid, &uid("a"), text("two")).await;

        assert!(matches!(res, Err(Error::_User(_))));
        assert_eq!(f.messages.get(&first.id).unwrap().fragments().len(), 1);
        assert_eq!(refs(&f, &cid).await, vec![first.id]);
    }
}
