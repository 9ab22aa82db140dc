//! Per-user bounded mailboxes.
//!
//! Locking happens at two levels.  The map from user id to mailbox has its
//! own reader-writer lock, and every mailbox carries a second lock around its
//! ring.  Lookups take the map lock shared, clone the mailbox handle and
//! release the map before locking the ring, so mutating one user's mailbox
//! never blocks finding another's.  Only `ensure` and `remove` take the map
//! lock exclusively.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chatbus_store::{Message, UserId};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// Fixed-capacity ring of messages in arrival order.  Pushing onto a full
/// mailbox evicts the oldest message.
#[derive(Debug, Clone)]
pub struct Mailbox {
    ring: VecDeque<Message>,
    capacity: usize,
}

impl Mailbox {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `message`, returning the evicted message if the ring was full.
    pub fn push(&mut self, message: Message) -> Option<Message> {
        let evicted = if self.ring.len() >= self.capacity {
            self.ring.pop_front()
        } else {
            None
        };
        self.ring.push_back(message);
        evicted
    }

    /// Messages created strictly after `cutoff`, oldest first.
    ///
    /// Scans backward from the newest entry and stops at the first one at or
    /// before the cutoff, so a poll for a recent tail does not walk the
    /// whole ring.
    pub fn read_after(&self, cutoff: DateTime<Utc>) -> Vec<Message> {
        let mut tail: Vec<Message> = self
            .ring
            .iter()
            .rev()
            .take_while(|message| message.created_utc > cutoff)
            .cloned()
            .collect();
        tail.reverse();
        tail
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.ring.iter()
    }
}

/// Which mailboxes a delivery reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub sender: bool,
    pub receiver: bool,
}

type SharedMailbox = Arc<RwLock<Mailbox>>;

#[derive(Debug)]
pub struct MailboxStore {
    capacity: usize,
    mailboxes: RwLock<HashMap<UserId, SharedMailbox>>,
}

impl MailboxStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            mailboxes: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Create an empty mailbox for `user_id` if it has none.  Returns `true`
    /// if one was created.
    pub async fn ensure(&self, user_id: UserId) -> bool {
        let mut mailboxes = self.mailboxes.write().await;
        if mailboxes.contains_key(&user_id) {
            return false;
        }
        mailboxes.insert(
            user_id,
            Arc::new(RwLock::new(Mailbox::with_capacity(self.capacity))),
        );
        true
    }

    /// Append `message` to the sender's and the receiver's mailbox.
    ///
    /// A side without a mailbox is skipped.  A message a user sends to
    /// themself lands once.
    pub async fn deliver(&self, message: &Message) -> Delivery {
        let (sender_box, receiver_box) = {
            let mailboxes = self.mailboxes.read().await;
            let sender_box = mailboxes.get(&message.sender_id).cloned();
            let receiver_box = if message.receiver_id == message.sender_id {
                None
            } else {
                mailboxes.get(&message.receiver_id).cloned()
            };
            (sender_box, receiver_box)
        };

        let mut delivery = Delivery::default();
        if let Some(mailbox) = sender_box {
            append(&mailbox, message, message.sender_id).await;
            delivery.sender = true;
        }
        if let Some(mailbox) = receiver_box {
            append(&mailbox, message, message.receiver_id).await;
            delivery.receiver = true;
        }
        delivery
    }

    /// Cached messages for `user_id` created strictly after `cutoff`, oldest
    /// first.  Empty if the user has no mailbox.
    pub async fn read_after(&self, user_id: UserId, cutoff: DateTime<Utc>) -> Vec<Message> {
        match self.get(user_id).await {
            Some(mailbox) => mailbox.read().await.read_after(cutoff),
            None => Vec::new(),
        }
    }

    /// Full contents of a mailbox, oldest first.
    pub async fn messages(&self, user_id: UserId) -> Option<Vec<Message>> {
        let mailbox = self.get(user_id).await?;
        let guard = mailbox.read().await;
        Some(guard.iter().cloned().collect())
    }

    pub async fn remove(&self, user_id: UserId) -> bool {
        self.mailboxes.write().await.remove(&user_id).is_some()
    }

    pub async fn contains(&self, user_id: UserId) -> bool {
        self.mailboxes.read().await.contains_key(&user_id)
    }

    /// Number of mailboxes.
    pub async fn len(&self) -> usize {
        self.mailboxes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.mailboxes.read().await.is_empty()
    }

    async fn get(&self, user_id: UserId) -> Option<SharedMailbox> {
        self.mailboxes.read().await.get(&user_id).cloned()
    }
}

async fn append(mailbox: &RwLock<Mailbox>, message: &Message, owner: UserId) {
    if let Some(evicted) = mailbox.write().await.push(message.clone()) {
        tracing::trace!(user = owner, evicted = %evicted.id, "mailbox full, evicted oldest message");
    }
}
