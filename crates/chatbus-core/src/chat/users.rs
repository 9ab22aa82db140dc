use chatbus_store::{OptionalRecord, User, UserId};
use serde::Deserialize;
use tracing::{debug, info};

use super::Chat;
use crate::error::{ChatError, Result};

/// How a caller identifies a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup {
    Id(UserId),
    Uuid(String),
}

/// Fields of a user that may change after creation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub display_name: Option<String>,
}

impl Chat {
    /// Register a user, or return the existing one if `uuid` is known.
    pub async fn create_user(&self, uuid: &str, display_name: &str) -> Result<User> {
        if uuid.trim().is_empty() {
            return Err(ChatError::BadRequest("uuid must not be empty".into()));
        }

        let (uuid, display_name) = (uuid.to_string(), display_name.to_string());
        let (user, created) = self
            .store
            .run(move |db| {
                db.transaction(|| match db.get_user_by_uuid(&uuid).optional()? {
                    Some(existing) => Ok((existing, false)),
                    None => Ok((db.create_user(&uuid, &display_name)?, true)),
                })
            })
            .await?;

        self.users.put(user.clone()).await;
        if created {
            info!(user = user.id, uuid = %user.uuid, "User created");
        } else {
            debug!(user = user.id, "User already registered");
        }
        Ok(user)
    }

    pub async fn get_user(&self, lookup: UserLookup) -> Result<User> {
        match lookup {
            UserLookup::Id(id) => self.require_user(id).await,
            UserLookup::Uuid(uuid) => {
                let user = self
                    .store
                    .run(move |db| db.get_user_by_uuid(&uuid).optional())
                    .await?
                    .ok_or(ChatError::NotFound("user"))?;
                self.users.put(user.clone()).await;
                Ok(user)
            }
        }
    }

    /// Every persisted user, ordered by id.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.store.run(|db| db.list_users()).await
    }

    /// Apply `patch` and return the updated user.  Sessions owned by the user
    /// see the new copy.
    pub async fn update_user(&self, id: UserId, patch: UserPatch) -> Result<User> {
        if let Some(name) = &patch.display_name {
            if name.trim().is_empty() {
                return Err(ChatError::BadRequest("display_name must not be empty".into()));
            }
        }

        let user = self
            .store
            .run(move |db| {
                db.transaction(|| {
                    let Some(mut user) = db.get_user(id).optional()? else {
                        return Ok(None);
                    };
                    if let Some(name) = patch.display_name {
                        db.update_user_display_name(id, &name)?;
                        user.display_name = name;
                    }
                    Ok(Some(user))
                })
            })
            .await?
            .ok_or(ChatError::NotFound("user"))?;

        self.users.put(user.clone()).await;
        self.sessions.refresh_user(&user).await;
        debug!(user = id, "User updated");
        Ok(user)
    }

    /// Delete a user.  The store cascades to sessions, contact rows and
    /// messages; the caches follow once the delete has committed.
    pub async fn delete_user(&self, id: UserId) -> Result<()> {
        if !self.store.run(move |db| db.delete_user(id)).await? {
            return Err(ChatError::NotFound("user"));
        }

        self.users.remove(id).await;
        let sessions = self.sessions.remove_user(id).await;
        let contacts = self.contacts.remove_node(id).await;
        self.mailboxes.remove(id).await;

        info!(
            user = id,
            sessions = sessions.len(),
            contacts = contacts.len(),
            "User deleted"
        );
        Ok(())
    }
}
