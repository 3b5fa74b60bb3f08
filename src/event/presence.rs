//! Online-user registry of this relay instance.
//!
//! Populated when a websocket connects and pruned when it closes. Each user is
//! connection-counted so a second tab closing does not mark the user offline.
//! The registry is local to the process; running several instances requires
//! moving it into shared storage.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::user;

#[derive(Clone, Default)]
pub struct Presence {
    online: Arc<RwLock<HashMap<user::Id, usize>>>,
}

impl Presence {
    /// Returns `true` when this is the first live connection of the user.
    pub async fn connect(&self, id: &user::Id) -> bool {
        let mut online = self.online.write().await;
        let count = online.entry(id.clone()).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Returns `true` when the last live connection of the user is gone.
    pub async fn disconnect(&self, id: &user::Id) -> bool {
        let mut online = self.online.write().await;
        match online.get_mut(id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                online.remove(id);
                true
            }
            None => false,
        }
    }

    pub async fn is_online(&self, id: &user::Id) -> bool {
        self.online.read().await.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn should_count_connections() {
        let presence = Presence::default();
        let jora = user::Id::from("jora");

        assert!(presence.connect(&jora).await);
        assert!(!presence.connect(&jora).await);
        assert!(presence.is_online(&jora).await);

        assert!(!presence.disconnect(&jora).await);
        assert!(presence.is_online(&jora).await);

        assert!(presence.disconnect(&jora).await);
        assert!(!presence.is_online(&jora).await);
    }

    #[tokio::test]
    async fn should_ignore_unknown_disconnect() {
        let presence = Presence::default();
        assert!(!presence.disconnect(&user::Id::from("ghost")).await);
    }
}
