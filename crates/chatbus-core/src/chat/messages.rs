use chatbus_store::{Message, UserId};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use super::Chat;
use crate::error::{ChatError, Result};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// A message as submitted by a client.  The sender, id and timestamp are
/// assigned by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMessage {
    pub receiver_id: UserId,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub attachments: Option<serde_json::Value>,
}

impl Chat {
    /// Deliver a message to the sender's and the receiver's mailbox and queue
    /// it for persistence.
    ///
    /// The message is visible to the next poll as soon as this returns.
    /// Persistence is best effort and its failures never reach the caller.
    pub async fn send_message(&self, session_id: Uuid, new: NewMessage) -> Result<Message> {
        let session = self.session(session_id).await?;

        let len = new.body.chars().count();
        if len > self.config.max_body_len {
            return Err(ChatError::BadRequest(format!(
                "body is {len} characters, limit is {}",
                self.config.max_body_len
            )));
        }
        if self.resolve_user(new.receiver_id).await?.is_none() {
            return Err(ChatError::BadRequest("recipient not found".into()));
        }

        let message = Message {
            id: Uuid::new_v4(),
            created_utc: Utc::now(),
            sender_id: session.user_id,
            receiver_id: new.receiver_id,
            body: new.body,
            attachments: new.attachments,
        };

        let delivery = self.mailboxes.deliver(&message).await;
        self.sessions.set_last_active(session.id, Utc::now()).await;
        self.outbox.enqueue(message.clone());

        debug!(
            message = %message.id,
            sender = message.sender_id,
            receiver = message.receiver_id,
            to_sender = delivery.sender,
            to_receiver = delivery.receiver,
            "Message sent"
        );
        Ok(message)
    }

    /// Cached messages for the session's user created strictly after the
    /// cutoff `seconds`/`nanos` since the Unix epoch, oldest first.  Nanos
    /// outside `0..1e9` carry into the seconds.
    pub async fn poll_messages(
        &self,
        session_id: Uuid,
        seconds: i64,
        nanos: i64,
    ) -> Result<Vec<Message>> {
        let session = self.touch_session(session_id).await?;
        let cutoff = cutoff(seconds, nanos)?;
        Ok(self.mailboxes.read_after(session.user_id, cutoff).await)
    }
}

fn cutoff(seconds: i64, nanos: i64) -> Result<DateTime<Utc>> {
    let out_of_range = || ChatError::BadRequest(format!("cutoff {seconds}.{nanos} is out of range"));

    let seconds = seconds
        .checked_add(nanos.div_euclid(NANOS_PER_SECOND))
        .ok_or_else(out_of_range)?;
    let nanos = nanos.rem_euclid(NANOS_PER_SECOND) as u32;
    DateTime::from_timestamp(seconds, nanos).ok_or_else(out_of_range)
}

#[cfg(test)]
mod tests {
    use super::super::testing::chat;
    use super::*;
    use chrono::Duration;

    fn text(receiver_id: UserId, body: &str) -> NewMessage {
        NewMessage {
            receiver_id,
            body: body.to_string(),
            attachments: None,
        }
    }

    fn bodies(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.body.as_str()).collect()
    }

    #[test]
    fn cutoff_normalises_nanos() {
        assert_eq!(cutoff(0, 0).unwrap(), DateTime::from_timestamp(0, 0).unwrap());
        assert_eq!(
            cutoff(10, 1_500_000_000).unwrap(),
            DateTime::from_timestamp(11, 500_000_000).unwrap()
        );
        assert_eq!(
            cutoff(10, -1).unwrap(),
            DateTime::from_timestamp(9, 999_999_999).unwrap()
        );
        assert!(matches!(cutoff(i64::MAX, 0), Err(ChatError::BadRequest(_))));
        assert!(matches!(
            cutoff(i64::MAX, NANOS_PER_SECOND),
            Err(ChatError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn send_to_offline_user_skips_their_mailbox() {
        let chat = chat();
        let alice = chat.create_user("a", "Alice").await.unwrap();
        let bob = chat.create_user("b", "Bob").await.unwrap();
        let session = chat.create_session(alice.id).await.unwrap();

        let sent = chat.send_message(session.id, text(bob.id, "hi")).await.unwrap();
        assert_eq!(sent.sender_id, alice.id);
        assert_eq!(sent.receiver_id, bob.id);

        assert!(!chat.mailboxes().contains(bob.id).await);
        let polled = chat.poll_messages(session.id, 0, 0).await.unwrap();
        assert_eq!(polled, vec![sent]);
    }

    #[tokio::test]
    async fn receiver_sees_message_on_next_poll() {
        let chat = chat();
        let alice = chat.create_user("a", "Alice").await.unwrap();
        let bob = chat.create_user("b", "Bob").await.unwrap();
        let alice_session = chat.create_session(alice.id).await.unwrap();
        let bob_session = chat.create_session(bob.id).await.unwrap();

        let attachments = serde_json::json!({"kind": "image", "url": "https://example.test/a.png"});
        let sent = chat
            .send_message(
                alice_session.id,
                NewMessage {
                    receiver_id: bob.id,
                    body: "look".into(),
                    attachments: Some(attachments.clone()),
                },
            )
            .await
            .unwrap();

        let polled = chat.poll_messages(bob_session.id, 0, 0).await.unwrap();
        assert_eq!(polled.len(), 1);
        assert_eq!(polled[0].id, sent.id);
        assert_eq!(polled[0].attachments, Some(attachments));
    }

    #[tokio::test]
    async fn poll_returns_only_messages_after_cutoff() {
        let chat = chat();
        let alice = chat.create_user("a", "Alice").await.unwrap();
        let session = chat.create_session(alice.id).await.unwrap();

        let first = chat.send_message(session.id, text(alice.id, "one")).await.unwrap();
        chat.send_message(session.id, text(alice.id, "two")).await.unwrap();
        chat.send_message(session.id, text(alice.id, "three")).await.unwrap();

        let cutoff = first.created_utc;
        let polled = chat
            .poll_messages(
                session.id,
                cutoff.timestamp(),
                i64::from(cutoff.timestamp_subsec_nanos()),
            )
            .await
            .unwrap();
        assert!(polled.iter().all(|m| m.created_utc > cutoff));
        assert!(polled.windows(2).all(|w| w[0].created_utc <= w[1].created_utc));
        assert!(!bodies(&polled).contains(&"one"));

        let future = Utc::now() + Duration::hours(1);
        assert!(chat
            .poll_messages(session.id, future.timestamp(), 0)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn poll_refreshes_last_active() {
        let chat = chat();
        let alice = chat.create_user("a", "Alice").await.unwrap();
        let session = chat.create_session(alice.id).await.unwrap();

        let stale = Utc::now() - Duration::minutes(4);
        chat.sessions().set_last_active(session.id, stale).await;
        chat.poll_messages(session.id, 0, 0).await.unwrap();

        let cached = chat.session(session.id).await.unwrap();
        assert!(cached.last_active_utc > stale + Duration::minutes(3));
    }

    #[tokio::test]
    async fn mailbox_keeps_the_most_recent_capacity() {
        let chat = chat();
        let capacity = chat.config().mailbox_capacity;
        let alice = chat.create_user("a", "Alice").await.unwrap();
        let session = chat.create_session(alice.id).await.unwrap();

        for i in 0..capacity + 5 {
            chat.send_message(session.id, text(alice.id, &format!("m{i}")))
                .await
                .unwrap();
        }

        let polled = chat.poll_messages(session.id, 0, 0).await.unwrap();
        assert_eq!(polled.len(), capacity);
        assert_eq!(polled[0].body, "m5");
        assert_eq!(polled[capacity - 1].body, format!("m{}", capacity + 4));
    }

    #[tokio::test]
    async fn send_rejections() {
        let chat = chat();
        let alice = chat.create_user("a", "Alice").await.unwrap();
        let session = chat.create_session(alice.id).await.unwrap();

        assert!(matches!(
            chat.send_message(session.id, text(999, "hi")).await,
            Err(ChatError::BadRequest(_))
        ));
        assert!(matches!(
            chat.send_message(session.id, text(alice.id, &"é".repeat(1025))).await,
            Err(ChatError::BadRequest(_))
        ));
        assert!(matches!(
            chat.send_message(Uuid::new_v4(), text(alice.id, "hi")).await,
            Err(ChatError::NotFound("session"))
        ));
        assert!(matches!(
            chat.poll_messages(Uuid::new_v4(), 0, 0).await,
            Err(ChatError::NotFound("session"))
        ));

        // A body right at the limit, counted in characters, is fine.
        chat.send_message(session.id, text(alice.id, &"é".repeat(1024)))
            .await
            .unwrap();
        assert_eq!(chat.outbox_stats().enqueued, 1);
    }

    #[tokio::test]
    async fn sent_messages_are_persisted_behind_the_response() {
        let chat = chat();
        let alice = chat.create_user("a", "Alice").await.unwrap();
        let bob = chat.create_user("b", "Bob").await.unwrap();
        let session = chat.create_session(alice.id).await.unwrap();

        let sent = chat.send_message(session.id, text(bob.id, "durable")).await.unwrap();
        let stats = chat.shutdown().await.unwrap();
        assert_eq!(stats.persisted, 1);

        let id = sent.id;
        let stored = chat.store().run(move |db| db.get_message(id)).await.unwrap();
        assert_eq!(stored, sent);
    }
}
