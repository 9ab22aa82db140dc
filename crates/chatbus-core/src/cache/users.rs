use std::collections::HashMap;

use chatbus_store::{User, UserId};
use tokio::sync::RwLock;

/// Keyed cache of users.  Does no I/O; callers fall back to the store on a
/// miss and `put` what they fetched.
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: RwLock<HashMap<UserId, User>>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: UserId) -> Option<User> {
        self.users.read().await.get(&id).cloned()
    }

    pub async fn contains(&self, id: UserId) -> bool {
        self.users.read().await.contains_key(&id)
    }

    /// Insert or replace a user.
    pub async fn put(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }

    pub async fn remove(&self, id: UserId) -> Option<User> {
        self.users.write().await.remove(&id)
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    /// Every cached user, ordered by id.
    pub async fn all(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by_key(|user| user.id);
        users
    }
}
