//! Rehydration of the caches from the store at startup.
//!
//! Loading and applying are separate steps.  [`Snapshot::load`] reads
//! everything under one transaction, so it sees a consistent view and can
//! also run inside a transaction the caller already opened.
//! [`Chat::apply_snapshot`] then fills the caches in dependency order:
//! users, sessions, contacts, messages.

use chatbus_store::{Contact, Database, Message, Session, User};
use serde::Serialize;
use tracing::{info, warn};

use crate::chat::Chat;
use crate::error::Result;

/// Everything the caches mirror, as read from the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub users: Vec<User>,
    pub sessions: Vec<Session>,
    pub contacts: Vec<Contact>,
    /// The most recent messages per receiver, oldest first.
    pub messages: Vec<Message>,
}

impl Snapshot {
    /// Read a snapshot keeping at most `per_receiver` messages for each
    /// receiver.
    pub fn load(db: &Database, per_receiver: usize) -> chatbus_store::Result<Self> {
        db.transaction(|| {
            Ok(Self {
                users: db.list_users()?,
                sessions: db.list_sessions()?,
                contacts: db.list_contacts()?,
                messages: db.recent_messages_per_receiver(per_receiver)?,
            })
        })
    }
}

/// What a restore put into the caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub users: usize,
    pub sessions: usize,
    pub contacts: usize,
    pub messages: usize,
}

impl Chat {
    /// Load a snapshot from the store and apply it.  Run once, before
    /// serving traffic.
    pub async fn restore(&self) -> Result<RestoreReport> {
        let limit = self.config().mailbox_capacity;
        let snapshot = self
            .store()
            .run(move |db| Snapshot::load(db, limit))
            .await?;

        let report = self.apply_snapshot(snapshot).await;
        info!(
            users = report.users,
            sessions = report.sessions,
            contacts = report.contacts,
            messages = report.messages,
            "Caches restored"
        );
        Ok(report)
    }

    /// Fill the caches from `snapshot`.  Applying the same snapshot to fresh
    /// caches always yields the same contents.
    pub async fn apply_snapshot(&self, snapshot: Snapshot) -> RestoreReport {
        let mut report = RestoreReport::default();

        for user in snapshot.users {
            self.users().put(user).await;
            report.users += 1;
        }

        for mut session in snapshot.sessions {
            session.user = self.users().get(session.user_id).await;
            if session.user.is_none() {
                warn!(session = %session.id, user = session.user_id, "Session owner missing from snapshot");
            }
            self.mailboxes().ensure(session.user_id).await;
            self.sessions().put(session).await;
            report.sessions += 1;
        }

        for contact in snapshot.contacts {
            self.contacts().link(contact.sender, contact.receiver).await;
            report.contacts += 1;
        }

        for message in snapshot.messages {
            self.mailboxes().deliver(&message).await;
            report.messages += 1;
        }

        report
    }
}
