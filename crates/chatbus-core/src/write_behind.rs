//! Best-effort persistence of sent messages.
//!
//! `send_message` delivers to the mailboxes synchronously and hands the
//! message to this queue.  A small pool of workers drains it into the store.
//! A failed insert is logged and counted and never retried; the caller has
//! already been answered.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chatbus_store::Message;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::persistence::Persistence;

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    persisted: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time view of the queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteBehindStats {
    pub enqueued: u64,
    pub persisted: u64,
    pub failed: u64,
}

impl WriteBehindStats {
    /// Jobs accepted but not yet finished.
    pub fn pending(&self) -> u64 {
        self.enqueued.saturating_sub(self.persisted + self.failed)
    }
}

pub struct WriteBehindQueue {
    sender: RwLock<Option<mpsc::UnboundedSender<Message>>>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl WriteBehindQueue {
    /// Spawn `workers` drain tasks on the current runtime.
    pub fn start(store: Persistence, workers: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(Counters::default());

        let workers = workers.max(1);
        let handles = (0..workers)
            .map(|index| {
                tokio::spawn(drain(
                    index,
                    Arc::clone(&rx),
                    store.clone(),
                    Arc::clone(&counters),
                ))
            })
            .collect();

        info!(workers, "Write-behind queue started");

        Self {
            sender: RwLock::new(Some(tx)),
            workers: std::sync::Mutex::new(handles),
            counters,
        }
    }

    /// Queue `message` for insertion.  Returns `false` once the queue has
    /// been shut down; the message is then counted as failed.
    pub fn enqueue(&self, message: Message) -> bool {
        let sender = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);

        let accepted = match sender.as_ref() {
            Some(tx) => tx.send(message).map_err(|e| e.0),
            None => Err(message),
        };
        match accepted {
            Ok(()) => true,
            Err(message) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(message = %message.id, "Write-behind queue closed, message not persisted");
                false
            }
        }
    }

    pub fn stats(&self) -> WriteBehindStats {
        WriteBehindStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            persisted: self.counters.persisted.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Close the queue and wait for the workers to finish everything that
    /// was already accepted.  Later calls return immediately.
    pub async fn shutdown(&self) -> WriteBehindStats {
        self.sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let handles = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Write-behind worker ended abnormally");
            }
        }

        let stats = self.stats();
        info!(
            persisted = stats.persisted,
            failed = stats.failed,
            "Write-behind queue drained"
        );
        stats
    }
}

async fn drain(
    index: usize,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Message>>>,
    store: Persistence,
    counters: Arc<Counters>,
) {
    loop {
        // Hold the receiver only while waiting so the other workers can pick
        // up the next job during this one's insert.
        let next = rx.lock().await.recv().await;
        let Some(message) = next else {
            break;
        };

        let id = message.id;
        match store.run(move |db| db.insert_message(&message)).await {
            Ok(()) => {
                counters.persisted.fetch_add(1, Ordering::Relaxed);
                debug!(worker = index, message = %id, "Message persisted");
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(worker = index, message = %id, error = %e, "Failed to persist message");
            }
        }
    }
    debug!(worker = index, "Write-behind worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatbus_store::{Database, UserId};
    use chrono::Utc;
    use uuid::Uuid;

    fn message(sender: UserId, receiver: UserId, body: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            created_utc: Utc::now(),
            sender_id: sender,
            receiver_id: receiver,
            body: body.to_string(),
            attachments: None,
        }
    }

    async fn store_with_two_users() -> (Persistence, UserId, UserId) {
        let store = Persistence::new(Database::open_in_memory().unwrap());
        let (a, b) = store
            .run(|db| Ok((db.create_user("a", "A")?, db.create_user("b", "B")?)))
            .await
            .unwrap();
        (store, a.id, b.id)
    }

    #[tokio::test]
    async fn shutdown_drains_accepted_messages() {
        let (store, a, b) = store_with_two_users().await;
        let queue = WriteBehindQueue::start(store.clone(), 2);

        for i in 0..20 {
            assert!(queue.enqueue(message(a, b, &format!("m{i}"))));
        }
        let stats = queue.shutdown().await;

        assert_eq!(stats.persisted, 20);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.pending(), 0);
        assert_eq!(store.run(|db| db.count_messages()).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn failed_inserts_are_counted_not_retried() {
        let (store, a, b) = store_with_two_users().await;
        let queue = WriteBehindQueue::start(store.clone(), 2);

        queue.enqueue(message(a, b, "fine"));
        // Unknown receiver violates the foreign key.
        queue.enqueue(message(a, 999, "orphan"));
        queue.enqueue(message(a, b, &"x".repeat(2000)));
        let stats = queue.shutdown().await;

        assert_eq!(stats.persisted, 1);
        assert_eq!(stats.failed, 2);
        assert_eq!(store.run(|db| db.count_messages()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn enqueue_after_shutdown_is_rejected() {
        let (store, a, b) = store_with_two_users().await;
        let queue = WriteBehindQueue::start(store, 1);
        queue.shutdown().await;

        assert!(!queue.enqueue(message(a, b, "late")));
        assert_eq!(queue.stats().failed, 1);

        // A second shutdown is a no-op.
        assert_eq!(queue.shutdown().await.failed, 1);
    }
}
