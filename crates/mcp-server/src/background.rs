//! Periodic session snapshotting.

use sfcc_ocapi_tools::session::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const PERSIST_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Every `period`, purge expired auth codes and write a session snapshot. A final snapshot is
/// written once `shutdown` is cancelled.
pub fn spawn_persistence_timer(
    sessions: Arc<SessionStore>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let purged = sessions.purge_expired_auth_codes();
                    if purged > 0 {
                        tracing::debug!(purged, "expired auth codes purged");
                    }
                    sessions.persist();
                }
            }
        }

        sessions.persist();
        tracing::info!("session data persisted on shutdown");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfcc_ocapi_tools::persistence::SessionPersistence;

    #[tokio::test]
    async fn snapshots_periodically_and_on_shutdown() {
        let dir = tempfile::tempdir().expect("tempdir");
        let persistence = SessionPersistence::new(dir.path());
        let file = persistence.path().to_path_buf();
        let sessions = Arc::new(SessionStore::new(Some(persistence)));

        let shutdown = CancellationToken::new();
        let handle = spawn_persistence_timer(
            Arc::clone(&sessions),
            Duration::from_millis(20),
            shutdown.clone(),
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(file.exists(), "timer never wrote a snapshot");

        std::fs::remove_file(&file).expect("remove snapshot");
        shutdown.cancel();
        handle.await.expect("join");
        assert!(file.exists(), "no snapshot on shutdown");
    }

    #[tokio::test]
    async fn stops_promptly_when_cancelled() {
        let sessions = Arc::new(SessionStore::in_memory());
        let shutdown = CancellationToken::new();
        let handle = spawn_persistence_timer(sessions, PERSIST_INTERVAL, shutdown.clone());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("timer task did not stop")
            .expect("join");
    }
}
