use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, error};

use crate::user;

use super::model::{EventStream, Notification, Subject, SystemMessage};

/// Best-effort fan-out to connected clients. Delivery failures are logged,
/// never reported back to the caller.
#[async_trait]
pub trait Relay {
    async fn notify(&self, target: &user::Id, noti: &Notification);

    async fn broadcast_system_message(&self, targets: &[user::Id], msg: &SystemMessage);

    async fn subscribe(&self, target: &user::Id) -> super::Result<EventStream>;
}

#[derive(Clone)]
pub struct NatsRelay {
    pubsub: async_nats::Client,
}

impl NatsRelay {
    pub fn new(pubsub: async_nats::Client) -> Self {
        Self { pubsub }
    }
}

#[async_trait]
impl Relay for NatsRelay {
    async fn notify(&self, target: &user::Id, noti: &Notification) {
        let subject = Subject::Notifications(target).to_string();

        let payload = match serde_json::to_vec(noti) {
            Ok(p) => p,
            Err(e) => {
                error!("could not serialize notification: {e:?}");
                return;
            }
        };

        match self.pubsub.publish(subject.clone(), payload.into()).await {
            Ok(_) => debug!("published notification to {subject}"),
            Err(e) => error!("failed to publish notification to {subject}: {e:?}"),
        }
    }

    async fn broadcast_system_message(&self, targets: &[user::Id], msg: &SystemMessage) {
        let noti = Notification::System(msg.clone());
        for t in targets {
            self.notify(t, &noti).await;
        }
    }

    async fn subscribe(&self, target: &user::Id) -> super::Result<EventStream> {
        let subscriber = self
            .pubsub
            .subscribe(Subject::Notifications(target).to_string())
            .await?;

        let stream = subscriber.map(|msg| String::from_utf8_lossy(&msg.payload).into_owned());

        Ok(Box::pin(stream))
    }
}
