//! The chat context: every cache, the store handle and the write-behind
//! queue, built once at startup and shared by `Arc`.
//!
//! Actions live in the submodules, one per entity.  They all follow the same
//! pattern: resolve the session from the registry, call the store outside
//! every cache lock, then update the caches.

mod contacts;
mod messages;
mod sessions;
mod users;

pub use contacts::ContactEntry;
pub use messages::NewMessage;
pub use users::{UserLookup, UserPatch};

use chatbus_store::{OptionalRecord, Session, User, UserId};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::{ContactGraph, MailboxStore, SessionRegistry, UserDirectory};
use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::persistence::Persistence;
use crate::write_behind::{WriteBehindQueue, WriteBehindStats};

pub struct Chat {
    config: ChatConfig,
    store: Persistence,
    users: UserDirectory,
    sessions: SessionRegistry,
    contacts: ContactGraph,
    mailboxes: MailboxStore,
    outbox: WriteBehindQueue,
}

impl Chat {
    /// Build empty caches over `store` and start the write-behind workers.
    ///
    /// Must be called from inside a tokio runtime.  Call [`Chat::restore`]
    /// before serving traffic.
    pub fn new(config: ChatConfig, store: Persistence) -> Self {
        let outbox = WriteBehindQueue::start(store.clone(), config.persistence_workers);
        Self {
            mailboxes: MailboxStore::new(config.mailbox_capacity),
            users: UserDirectory::new(),
            sessions: SessionRegistry::new(),
            contacts: ContactGraph::new(),
            outbox,
            store,
            config,
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn store(&self) -> &Persistence {
        &self.store
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn contacts(&self) -> &ContactGraph {
        &self.contacts
    }

    pub fn mailboxes(&self) -> &MailboxStore {
        &self.mailboxes
    }

    pub fn outbox_stats(&self) -> WriteBehindStats {
        self.outbox.stats()
    }

    /// Look a session up in the registry.  Sessions are never fetched from
    /// the store on a miss: a session the registry does not know is gone.
    pub async fn session(&self, id: Uuid) -> Result<Session> {
        self.sessions
            .get(id)
            .await
            .ok_or(ChatError::NotFound("session"))
    }

    /// Remove an expired or logged-out session: store first, then both
    /// registry indices.
    pub async fn expire_session(&self, session: &Session) -> Result<()> {
        let id = session.id;
        self.store.run(move |db| db.delete_session(id)).await?;
        self.sessions.remove(session).await;
        debug!(session = %id, user = session.user_id, "Session removed");
        Ok(())
    }

    /// Write every cached last-active time back to the store.  Returns the
    /// number of rows updated.
    pub async fn flush_last_active(&self) -> Result<usize> {
        let touches: Vec<_> = self
            .sessions
            .list_all()
            .await
            .into_iter()
            .map(|s| (s.id, s.last_active_utc))
            .collect();

        self.store
            .run(move |db| {
                db.transaction(|| {
                    let mut updated = 0;
                    for (id, at) in &touches {
                        if db.touch_session(*id, *at)? {
                            updated += 1;
                        }
                    }
                    Ok(updated)
                })
            })
            .await
    }

    /// Drain the write-behind queue and persist last-active times.
    pub async fn shutdown(&self) -> Result<WriteBehindStats> {
        let stats = self.outbox.shutdown().await;
        let flushed = self.flush_last_active().await?;
        info!(flushed, "Session activity flushed");
        Ok(stats)
    }

    /// Resolve a user from the directory, falling back to the store and
    /// caching what it returns.
    pub(crate) async fn resolve_user(&self, id: UserId) -> Result<Option<User>> {
        if let Some(user) = self.users.get(id).await {
            return Ok(Some(user));
        }
        let fetched = self.store.run(move |db| db.get_user(id).optional()).await?;
        if let Some(user) = &fetched {
            self.users.put(user.clone()).await;
        }
        Ok(fetched)
    }

    pub(crate) async fn require_user(&self, id: UserId) -> Result<User> {
        self.resolve_user(id)
            .await?
            .ok_or(ChatError::NotFound("user"))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;

    use chatbus_store::Database;

    use super::*;

    pub fn config() -> ChatConfig {
        ChatConfig {
            mailbox_capacity: 8,
            ..ChatConfig::default()
        }
    }

    pub fn chat() -> Chat {
        Chat::new(config(), Persistence::new(Database::open_in_memory().unwrap()))
    }

    pub fn chat_at(path: &Path) -> Chat {
        Chat::new(config(), Persistence::new(Database::open_at(path).unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::chat;
    use super::*;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let chat = chat();
        let err = chat.session(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ChatError::NotFound("session")));
    }

    #[tokio::test]
    async fn resolve_user_falls_back_to_the_store() {
        let chat = chat();
        let user = chat
            .store()
            .run(|db| db.create_user("u-1", "Stored"))
            .await
            .unwrap();
        assert!(!chat.users().contains(user.id).await);

        let resolved = chat.resolve_user(user.id).await.unwrap();
        assert_eq!(resolved, Some(user.clone()));
        assert!(chat.users().contains(user.id).await);

        assert_eq!(chat.resolve_user(999).await.unwrap(), None);
        assert!(matches!(
            chat.require_user(999).await,
            Err(ChatError::NotFound("user"))
        ));
    }

    #[tokio::test]
    async fn flush_last_active_writes_cached_times() {
        let chat = chat();
        let user = chat.create_user("u-1", "One").await.unwrap();
        let session = chat.create_session(user.id).await.unwrap();

        let later = Utc::now() + Duration::minutes(2);
        chat.sessions().set_last_active(session.id, later).await;
        assert_eq!(chat.flush_last_active().await.unwrap(), 1);

        let id = session.id;
        let stored = chat.store().run(move |db| db.get_session(id)).await.unwrap();
        assert_eq!(stored.last_active_utc, later);
    }
}
