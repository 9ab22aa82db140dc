//! Session cache with a by-user presence index.
//!
//! The two indices sit behind independent locks and are never held at the
//! same time.  A user is online exactly while the by-user index has an entry
//! for them, so an entry is deleted as soon as its set empties.

use std::collections::{HashMap, HashSet};

use chatbus_store::{Session, User, UserId};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Session>>,
    by_user: RwLock<HashMap<UserId, HashSet<Uuid>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: Uuid) -> Option<Session> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Insert or replace a session and index it under its user.
    pub async fn put(&self, session: Session) {
        let (id, user_id) = (session.id, session.user_id);

        self.sessions.write().await.insert(id, session);
        self.by_user
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(id);
    }

    /// Drop a session from both indices.  Returns `true` if it was cached.
    pub async fn remove(&self, session: &Session) -> bool {
        let removed = self.sessions.write().await.remove(&session.id);
        // Trust the cached owner over the caller's copy.
        let user_id = removed.as_ref().map_or(session.user_id, |s| s.user_id);

        let mut by_user = self.by_user.write().await;
        if let Some(ids) = by_user.get_mut(&user_id) {
            ids.remove(&session.id);
            if ids.is_empty() {
                by_user.remove(&user_id);
            }
        }

        removed.is_some()
    }

    /// Drop every session owned by `user_id`, returning what was removed.
    pub async fn remove_user(&self, user_id: UserId) -> Vec<Session> {
        let ids = self.by_user.write().await.remove(&user_id).unwrap_or_default();

        let mut sessions = self.sessions.write().await;
        ids.iter().filter_map(|id| sessions.remove(id)).collect()
    }

    pub async fn is_user_online(&self, user_id: UserId) -> bool {
        self.by_user.read().await.contains_key(&user_id)
    }

    /// Refresh a session's last-active time.  Returns `false` if the session
    /// is not cached.
    pub async fn set_last_active(&self, id: Uuid, at: DateTime<Utc>) -> bool {
        match self.sessions.write().await.get_mut(&id) {
            Some(session) => {
                session.last_active_utc = at;
                true
            }
            None => false,
        }
    }

    /// Replace the embedded copy of `user` in every session it owns.
    pub async fn refresh_user(&self, user: &User) {
        let ids = self.session_ids_for_user(user.id).await;

        let mut sessions = self.sessions.write().await;
        for id in ids {
            if let Some(session) = sessions.get_mut(&id) {
                session.user = Some(user.clone());
            }
        }
    }

    pub async fn session_ids_for_user(&self, user_id: UserId) -> Vec<Uuid> {
        self.by_user
            .read()
            .await
            .get(&user_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Cached sessions owned by `user_id`, oldest first.
    pub async fn sessions_for_user(&self, user_id: UserId) -> Vec<Session> {
        let ids = self.session_ids_for_user(user_id).await;

        let sessions = self.sessions.read().await;
        let mut owned: Vec<Session> = ids.iter().filter_map(|id| sessions.get(id).cloned()).collect();
        owned.sort_by_key(|s| (s.created_utc, s.id));
        owned
    }

    /// Snapshot of every cached session, oldest first.
    pub async fn list_all(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by_key(|s| (s.created_utc, s.id));
        sessions
    }

    /// Ids of every user with at least one session, ascending.
    pub async fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.by_user.read().await.keys().copied().collect();
        users.sort_unstable();
        users
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
