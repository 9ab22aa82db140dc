//! Periodic removal of idle sessions.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::chat::Chat;
use crate::error::Result;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CullReport {
    pub scanned: usize,
    pub culled: usize,
}

pub struct SessionCuller {
    chat: Arc<Chat>,
    timeout: chrono::Duration,
    interval: Duration,
}

impl SessionCuller {
    /// Culler using the timeout and interval from the chat's config.
    pub fn new(chat: Arc<Chat>) -> Self {
        let timeout = chat.config().session_timeout_chrono();
        let interval = chat.config().cull_interval;
        Self {
            chat,
            timeout,
            interval,
        }
    }

    /// One sweep as of now.  Returns `None` without touching anything if
    /// `token` is already cancelled.
    pub async fn sweep(&self, token: &CancellationToken) -> Result<Option<CullReport>> {
        if token.is_cancelled() {
            return Ok(None);
        }
        self.sweep_at(Utc::now()).await.map(Some)
    }

    /// Remove every session idle for longer than the timeout as of `now`.
    ///
    /// Works on a snapshot of the registry.  The first failed store delete
    /// aborts the sweep; the sessions not yet visited wait for the next one.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<CullReport> {
        let sessions = self.chat.sessions().list_all().await;
        let mut report = CullReport {
            scanned: sessions.len(),
            culled: 0,
        };

        for session in sessions
            .iter()
            .filter(|s| s.is_expired(now, self.timeout))
        {
            self.chat.expire_session(session).await?;
            debug!(session = %session.id, user = session.user_id, "Session culled");
            report.culled += 1;
        }
        Ok(report)
    }

    /// Run a sweep every interval until `token` is cancelled.  The first
    /// sweep happens one interval after the call.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = self.interval.as_secs_f64(),
                timeout_secs = self.timeout.num_seconds(),
                "Session culler started"
            );

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                match self.sweep(&token).await {
                    Ok(Some(report)) if report.culled > 0 => {
                        info!(culled = report.culled, scanned = report.scanned, "Sessions culled");
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Session cull aborted"),
                }
            }

            info!("Session culler stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::testing::{chat, config};
    use crate::error::ChatError;
    use crate::persistence::Persistence;
    use chatbus_store::Database;

    #[tokio::test]
    async fn idle_session_is_culled() {
        let chat = Arc::new(chat());
        let alice = chat.create_user("a", "Alice").await.unwrap();
        let idle = chat.create_session(alice.id).await.unwrap();

        let now = Utc::now();
        chat.sessions()
            .set_last_active(idle.id, now - chrono::Duration::minutes(6))
            .await;

        let culler = SessionCuller::new(Arc::clone(&chat));
        let report = culler.sweep_at(now).await.unwrap();
        assert_eq!(report, CullReport { scanned: 1, culled: 1 });

        assert!(matches!(
            chat.session(idle.id).await,
            Err(ChatError::NotFound("session"))
        ));
        assert!(!chat.sessions().is_user_online(alice.id).await);
        assert!(chat.store().run(|db| db.list_sessions()).await.unwrap().is_empty());
        // The mailbox outlives the session.
        assert!(chat.mailboxes().contains(alice.id).await);
    }

    #[tokio::test]
    async fn active_sessions_survive() {
        let chat = Arc::new(chat());
        let alice = chat.create_user("a", "Alice").await.unwrap();
        let bob = chat.create_user("b", "Bob").await.unwrap();
        let fresh = chat.create_session(alice.id).await.unwrap();
        let idle = chat.create_session(bob.id).await.unwrap();

        let now = Utc::now();
        chat.sessions()
            .set_last_active(fresh.id, now - chrono::Duration::minutes(4))
            .await;
        chat.sessions()
            .set_last_active(idle.id, now - chrono::Duration::minutes(10))
            .await;

        let report = SessionCuller::new(Arc::clone(&chat)).sweep_at(now).await.unwrap();
        assert_eq!(report.culled, 1);
        assert!(chat.sessions().is_user_online(alice.id).await);
        assert!(!chat.sessions().is_user_online(bob.id).await);
    }

    #[tokio::test]
    async fn store_failure_aborts_the_sweep() {
        let chat = Arc::new(chat());
        let alice = chat.create_user("a", "Alice").await.unwrap();
        let first = chat.create_session(alice.id).await.unwrap();
        let second = chat.create_session(alice.id).await.unwrap();

        chat.store()
            .run(|db| Ok(db.conn().execute_batch("DROP TABLE sessions")?))
            .await
            .unwrap();

        let later = Utc::now() + chrono::Duration::hours(1);
        let result = SessionCuller::new(Arc::clone(&chat)).sweep_at(later).await;
        assert!(matches!(result, Err(ChatError::Store(_))));

        // Nothing was removed from the cache.
        assert!(chat.session(first.id).await.is_ok());
        assert!(chat.session(second.id).await.is_ok());
    }

    #[tokio::test]
    async fn cancelled_token_skips_the_sweep() {
        let chat = Arc::new(chat());
        let alice = chat.create_user("a", "Alice").await.unwrap();
        let session = chat.create_session(alice.id).await.unwrap();
        chat.sessions()
            .set_last_active(session.id, Utc::now() - chrono::Duration::hours(1))
            .await;

        let token = CancellationToken::new();
        token.cancel();
        let culler = SessionCuller::new(Arc::clone(&chat));
        assert_eq!(culler.sweep(&token).await.unwrap(), None);
        assert!(chat.sessions().is_user_online(alice.id).await);
    }

    #[tokio::test]
    async fn spawned_culler_runs_until_cancelled() {
        let config = crate::config::ChatConfig {
            cull_interval: Duration::from_millis(20),
            ..config()
        };
        let chat = Arc::new(Chat::new(
            config,
            Persistence::new(Database::open_in_memory().unwrap()),
        ));
        let alice = chat.create_user("a", "Alice").await.unwrap();
        let session = chat.create_session(alice.id).await.unwrap();
        chat.sessions()
            .set_last_active(session.id, Utc::now() - chrono::Duration::minutes(6))
            .await;

        let token = CancellationToken::new();
        let handle = SessionCuller::new(Arc::clone(&chat)).spawn(token.clone());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while chat.sessions().is_user_online(alice.id).await {
            assert!(tokio::time::Instant::now() < deadline, "session was never culled");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("culler did not stop")
            .unwrap();
    }
}
