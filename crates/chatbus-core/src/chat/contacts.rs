use chatbus_store::{User, UserId};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::Chat;
use crate::error::{ChatError, Result};

/// One row of a contact list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactEntry {
    pub user: User,
    pub is_online: bool,
}

impl Chat {
    /// Link the session's user and `user_id`, in both directions.
    pub async fn create_contact(&self, session_id: Uuid, user_id: UserId) -> Result<()> {
        let session = self.session(session_id).await?;
        let owner = session.user_id;
        if owner == user_id {
            return Err(ChatError::BadRequest("cannot add yourself as a contact".into()));
        }
        self.require_user(user_id).await?;

        self.store
            .run(move |db| db.link_contacts(owner, user_id))
            .await?;
        self.contacts.link(owner, user_id).await;

        debug!(user = owner, contact = user_id, "Contact linked");
        Ok(())
    }

    /// Remove the edge between the session's user and `user_id`.  Removing
    /// an edge that does not exist succeeds.
    pub async fn delete_contact(&self, session_id: Uuid, user_id: UserId) -> Result<()> {
        let session = self.session(session_id).await?;
        let owner = session.user_id;
        self.require_user(user_id).await?;

        self.store
            .run(move |db| db.unlink_contacts(owner, user_id))
            .await?;
        self.contacts.unlink(owner, user_id).await;

        debug!(user = owner, contact = user_id, "Contact unlinked");
        Ok(())
    }

    /// The session user's contacts with their presence, ordered by user id.
    pub async fn list_contacts(&self, session_id: Uuid) -> Result<Vec<ContactEntry>> {
        let session = self.session(session_id).await?;

        let mut entries = Vec::new();
        for id in self.contacts.neighbors(session.user_id).await {
            let Some(user) = self.resolve_user(id).await? else {
                warn!(user = session.user_id, contact = id, "Contact has no user record");
                continue;
            };
            let is_online = self.sessions.is_user_online(id).await;
            entries.push(ContactEntry { user, is_online });
        }
        Ok(entries)
    }
}
