use chatbus_store::{OptionalRecord, Session, UserId};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::Chat;
use crate::error::{ChatError, Result};

impl Chat {
    /// Open a session for `user_id`.  The user's mailbox is created on their
    /// first session and kept across later ones.
    pub async fn create_session(&self, user_id: UserId) -> Result<Session> {
        let session = self
            .store
            .run(move |db| {
                db.transaction(|| {
                    let Some(user) = db.get_user(user_id).optional()? else {
                        return Ok(None);
                    };
                    let session = Session::new(user, Utc::now());
                    db.create_session(&session)?;
                    Ok(Some(session))
                })
            })
            .await?
            .ok_or(ChatError::NotFound("user"))?;

        if let Some(user) = &session.user {
            self.users.put(user.clone()).await;
        }
        self.mailboxes.ensure(user_id).await;
        self.sessions.put(session.clone()).await;

        info!(session = %session.id, user = user_id, "Session created");
        Ok(session)
    }

    /// Log a session out.
    pub async fn delete_session(&self, id: Uuid) -> Result<()> {
        let cached = self.sessions.get(id).await;
        let deleted = self.store.run(move |db| db.delete_session(id)).await?;

        match cached {
            Some(session) => {
                self.sessions.remove(&session).await;
            }
            None if !deleted => return Err(ChatError::NotFound("session")),
            None => {}
        }
        info!(session = %id, "Session deleted");
        Ok(())
    }

    /// Every live session, oldest first.
    pub async fn list_sessions(&self) -> Vec<Session> {
        self.sessions.list_all().await
    }

    /// Resolve a session and mark it active now.
    pub(crate) async fn touch_session(&self, id: Uuid) -> Result<Session> {
        let session = self.session(id).await?;
        self.sessions.set_last_active(id, Utc::now()).await;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::chat;
    use super::*;
    use crate::chat::NewMessage;

    #[tokio::test]
    async fn create_session_marks_user_online() {
        let chat = chat();
        let alice = chat.create_user("a", "Alice").await.unwrap();

        let session = chat.create_session(alice.id).await.unwrap();
        assert_eq!(session.user.as_ref(), Some(&alice));
        assert!(chat.sessions().is_user_online(alice.id).await);
        assert!(chat.mailboxes().contains(alice.id).await);
        assert_eq!(chat.list_sessions().await, vec![session.clone()]);

        let id = session.id;
        let stored = chat.store().run(move |db| db.get_session(id)).await.unwrap();
        assert_eq!(stored.user_id, alice.id);
    }

    #[tokio::test]
    async fn create_session_for_unknown_user_is_not_found() {
        let chat = chat();
        let err = chat.create_session(7).await.unwrap_err();
        assert!(matches!(err, ChatError::NotFound("user")));
        assert!(chat.list_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn second_session_keeps_the_mailbox() {
        let chat = chat();
        let alice = chat.create_user("a", "Alice").await.unwrap();
        let first = chat.create_session(alice.id).await.unwrap();
        chat.send_message(first.id, note(alice.id)).await.unwrap();

        chat.create_session(alice.id).await.unwrap();
        assert_eq!(chat.mailboxes().messages(alice.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn user_goes_offline_with_last_session() {
        let chat = chat();
        let alice = chat.create_user("a", "Alice").await.unwrap();
        let phone = chat.create_session(alice.id).await.unwrap();
        let laptop = chat.create_session(alice.id).await.unwrap();

        chat.delete_session(phone.id).await.unwrap();
        assert!(chat.sessions().is_user_online(alice.id).await);

        chat.delete_session(laptop.id).await.unwrap();
        assert!(!chat.sessions().is_user_online(alice.id).await);
        assert!(chat.store().run(|db| db.list_sessions()).await.unwrap().is_empty());

        assert!(matches!(
            chat.delete_session(laptop.id).await,
            Err(ChatError::NotFound("session"))
        ));
    }

    fn note(receiver_id: UserId) -> NewMessage {
        NewMessage {
            receiver_id,
            body: "hello".into(),
            attachments: None,
        }
    }
}
