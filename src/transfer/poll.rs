//! Waiting for the processor's result file.

use crate::store::{release, RemoteFileStore, StoreError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ready,
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

/// Poll `remote` over a single connection until it exists, `policy.timeout`
/// elapses, or `cancel` fires.
///
/// Connection and not-found failures are waited out. Any other store error
/// ends the poll. The connection is released on every path.
#[tracing::instrument(skip(store, policy, cancel))]
pub async fn poll_for_file(
    store: &dyn RemoteFileStore,
    remote: &str,
    policy: PollPolicy,
    cancel: &CancellationToken,
) -> Result<PollOutcome, StoreError> {
    let mut conn = store.connect().await?;
    let started = Instant::now();
    let mut attempts = 0u32;

    let result = loop {
        attempts += 1;
        let stat = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(PollOutcome::Cancelled),
            stat = conn.stat(remote) => stat,
        };
        match stat {
            Ok(meta) => {
                tracing::info!(attempts, size = ?meta.size, "Result file is ready");
                break Ok(PollOutcome::Ready);
            }
            Err(e) if e.is_transient() => {
                tracing::debug!(attempts, error = %e, "Result not available yet");
            }
            Err(e) => break Err(e),
        }

        let elapsed = started.elapsed();
        if elapsed >= policy.timeout {
            tracing::warn!(attempts, ?elapsed, "Gave up waiting for result file");
            break Ok(PollOutcome::TimedOut);
        }
        let nap = policy.interval.min(policy.timeout - elapsed);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(PollOutcome::Cancelled),
            _ = tokio::time::sleep(nap) => {}
        }
    };

    release(conn, result).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{RemoteConnection, RemoteMetadata};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Ready,
        Missing,
        Dropped,
        Denied,
    }

    impl Step {
        fn reply(self, remote: &str) -> Result<RemoteMetadata, StoreError> {
            match self {
                Step::Ready => Ok(RemoteMetadata {
                    path: remote.to_string(),
                    size: Some(1),
                }),
                Step::Missing => Err(StoreError::NotFound(remote.to_string())),
                Step::Dropped => Err(StoreError::Connection {
                    host: "test".to_string(),
                    reason: "connection reset".to_string(),
                }),
                Step::Denied => Err(StoreError::Operation {
                    operation: "stat",
                    path: remote.to_string(),
                    reason: "Permission denied".to_string(),
                }),
            }
        }
    }

    /// Replies to `stat` from a script, then keeps repeating the last step.
    #[derive(Clone)]
    struct ScriptedStore {
        script: Arc<Mutex<Vec<Step>>>,
        stats: Arc<AtomicUsize>,
        disconnects: Arc<AtomicUsize>,
    }

    impl ScriptedStore {
        fn new(script: Vec<Step>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script)),
                stats: Arc::new(AtomicUsize::new(0)),
                disconnects: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    struct ScriptedConnection(ScriptedStore);

    #[async_trait]
    impl RemoteFileStore for ScriptedStore {
        async fn connect(&self) -> Result<Box<dyn RemoteConnection>, StoreError> {
            Ok(Box::new(ScriptedConnection(self.clone())))
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    #[async_trait]
    impl RemoteConnection for ScriptedConnection {
        async fn upload(&mut self, _: &Path, _: &str) -> Result<(), StoreError> {
            unreachable!()
        }
        async fn rename(&mut self, _: &str, _: &str) -> Result<(), StoreError> {
            unreachable!()
        }
        async fn stat(&mut self, remote: &str) -> Result<RemoteMetadata, StoreError> {
            self.0.stats.fetch_add(1, Ordering::SeqCst);
            let mut script = self.0.script.lock().unwrap();
            let next = if script.len() > 1 {
                script.remove(0)
            } else {
                script[0]
            };
            next.reply(remote)
        }
        async fn download(&mut self, _: &str, _: &Path) -> Result<(), StoreError> {
            unreachable!()
        }
        async fn delete(&mut self, _: &str) -> Result<(), StoreError> {
            unreachable!()
        }
        async fn disconnect(self: Box<Self>) -> Result<(), StoreError> {
            self.0.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn policy(timeout: u64, interval: u64) -> PollPolicy {
        PollPolicy {
            timeout: Duration::from_secs(timeout),
            interval: Duration::from_secs(interval),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ready_after_transient_failures() {
        let store = ScriptedStore::new(vec![Step::Missing, Step::Dropped, Step::Ready]);
        let cancel = CancellationToken::new();

        let outcome = poll_for_file(&store, "outbound/a.asc", policy(600, 30), &cancel)
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Ready);
        assert_eq!(store.stats.load(Ordering::SeqCst), 3);
        assert_eq!(store.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_and_disconnects() {
        let store = ScriptedStore::new(vec![Step::Missing]);
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let outcome = poll_for_file(&store, "outbound/a.asc", policy(100, 30), &cancel)
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_secs(100));
        // 0, 30, 60, 90, 100
        assert_eq!(store.stats.load(Ordering::SeqCst), 5);
        assert_eq!(store.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hard_error_ends_poll() {
        let store = ScriptedStore::new(vec![Step::Missing, Step::Denied]);
        let cancel = CancellationToken::new();

        let err = poll_for_file(&store, "outbound/a.asc", policy(600, 30), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Operation { .. }));
        assert_eq!(store.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_returns_cancelled() {
        let store = ScriptedStore::new(vec![Step::Missing]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(45)).await;
            trigger.cancel();
        });

        let outcome = poll_for_file(&store, "outbound/a.asc", policy(600, 30), &cancel)
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Cancelled);
        assert_eq!(store.stats.load(Ordering::SeqCst), 2);
        assert_eq!(store.disconnects.load(Ordering::SeqCst), 1);
    }
}
