//! Single-flight coordination for token refresh.
//!
//! At most one network refresh runs per provider instance at any time.
//! The first caller becomes the leader and performs the operation; callers
//! arriving while it runs join the same attempt and receive the same
//! outcome through a watch channel. The in-flight marker is cleared by a
//! drop guard, so a failed or even panicked attempt never wedges the next
//! one.

use std::future::Future;
use std::sync::Mutex;

use tokio::sync::watch;

use crate::error::{AuthError, AuthErrorCode, AuthResult};

/// Cloneable rendition of a refresh outcome, broadcast to joiners.
type SharedOutcome = Option<Result<(), (AuthErrorCode, String)>>;

/// Coordinates concurrent attempts at one logical operation.
#[derive(Debug, Default)]
pub struct SingleFlight {
    inflight: Mutex<Option<watch::Receiver<SharedOutcome>>>,
}

/// Clears the in-flight marker when the leader finishes, however it
/// finishes.
struct ClearOnDrop<'a> {
    slot: &'a Mutex<Option<watch::Receiver<SharedOutcome>>>,
}

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }
}

impl SingleFlight {
    /// Creates an idle coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if an attempt is currently in flight.
    pub fn in_flight(&self) -> bool {
        self.inflight.lock().unwrap().is_some()
    }

    /// Runs `op`, sharing the attempt with concurrent callers.
    ///
    /// If an attempt is already in flight, this call joins it and returns
    /// its outcome without invoking `op`. Otherwise `op` runs here and its
    /// outcome is broadcast to every joiner.
    pub async fn run<F, Fut>(&self, op: F) -> AuthResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AuthResult<()>>,
    {
        let tx = {
            let mut slot = self.inflight.lock().unwrap();
            if let Some(rx) = slot.as_ref() {
                let rx = rx.clone();
                drop(slot);
                Err(rx)
            } else {
                let (tx, rx) = watch::channel(None);
                *slot = Some(rx);
                Ok(tx)
            }
        };
        let tx = match tx {
            Ok(tx) => tx,
            Err(rx) => return Self::join(rx).await,
        };

        let _clear = ClearOnDrop {
            slot: &self.inflight,
        };

        let result = op().await;
        let shared = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err((e.code(), e.message().to_string())),
        };
        let _ = tx.send(Some(shared));
        result
    }

    async fn join(mut rx: watch::Receiver<SharedOutcome>) -> AuthResult<()> {
        let outcome = rx
            .wait_for(|value| value.is_some())
            .await
            .map(|value| (*value).clone());

        match outcome {
            Ok(Some(Ok(()))) => Ok(()),
            Ok(Some(Err((code, message)))) => Err(AuthError::new(code, message)),
            // wait_for only returns on Some; keep the match exhaustive.
            Ok(None) => Err(AuthError::internal("refresh outcome missing")),
            Err(_) => Err(AuthError::internal(
                "refresh leader stopped without reporting an outcome",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let flight = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let flight = flight.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                flight
                    .run(|| async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(())
                    })
                    .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn joiners_receive_the_leaders_failure() {
        let flight = Arc::new(SingleFlight::new());

        let leader = {
            let flight = flight.clone();
            tokio::spawn(async move {
                flight
                    .run(|| async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Err(AuthError::network("connection reset"))
                    })
                    .await
            })
        };

        // Give the leader time to claim the slot.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(flight.in_flight());

        let joiner = flight.run(|| async { Ok(()) }).await;
        let err = joiner.unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::Network);
        assert_eq!(err.message(), "connection reset");

        assert!(leader.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn marker_clears_after_failure() {
        let flight = SingleFlight::new();

        let result = flight
            .run(|| async { Err(AuthError::network("boom")) })
            .await;
        assert!(result.is_err());
        assert!(!flight.in_flight());

        // A fresh attempt runs the operation again.
        let calls = AtomicUsize::new(0);
        flight
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sequential_runs_each_execute() {
        let flight = SingleFlight::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            flight
                .run(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
