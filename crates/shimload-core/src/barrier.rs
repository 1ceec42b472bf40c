//! Load barrier: fires once every requested capability has registered.

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{ShimError, ShimResult};
use crate::load_state::{Activation, LoadState};

/// Outcome of a single readiness registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierStatus {
    /// Other capabilities are still pending.
    Waiting {
        /// How many are still pending.
        pending: usize,
    },
    /// This registration completed the barrier.
    Completed,
}

/// Tracks one load phase and completes exactly once.
///
/// Each [`LoadBarrier::on_ready`] call stores the activation and rescans the
/// whole state. The scan is linear in the number of tracked capabilities,
/// which is bounded by the registry size.
pub struct LoadBarrier {
    /// `None` once the barrier has completed or failed.
    state: Option<LoadState>,
    completion: Option<oneshot::Sender<ShimResult<LoadState>>>,
}

/// Receiving half of a [`LoadBarrier`].
#[must_use = "the barrier result is only observable by awaiting it"]
pub struct BarrierWait {
    rx: oneshot::Receiver<ShimResult<LoadState>>,
}

impl BarrierWait {
    /// Wait for the barrier to complete and take back the finished state.
    ///
    /// # Errors
    ///
    /// Returns the error the phase failed with, or
    /// [`ShimError::ChannelClosed`] if the barrier was dropped unfinished.
    pub async fn wait(self) -> ShimResult<LoadState> {
        self.rx
            .await
            .map_err(|_| ShimError::ChannelClosed("capability readiness".to_string()))?
    }
}

impl LoadBarrier {
    /// Arm a barrier over a fully resolved load state.
    ///
    /// Resolution must be finished before arming: the barrier completes as
    /// soon as nothing is pending, so an empty state completes immediately.
    pub fn arm(state: LoadState) -> (Self, BarrierWait) {
        let (tx, rx) = oneshot::channel();
        let mut barrier = Self {
            state: Some(state),
            completion: Some(tx),
        };
        if barrier.state.as_ref().is_some_and(|s| !s.has_pending()) {
            debug!("Nothing to load, barrier completes immediately");
            barrier.complete();
        }
        (barrier, BarrierWait { rx })
    }

    /// Register `activation` as the ready value for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ShimError::ChannelMisuse`] if the barrier already completed,
    /// if `name` was never requested, or if it registered before. Misuse also
    /// fails the phase, so the waiting side observes the same error.
    pub fn on_ready(&mut self, name: &str, activation: Activation) -> ShimResult<BarrierStatus> {
        let Some(state) = self.state.as_mut() else {
            return Err(ShimError::ChannelMisuse(format!(
                "readiness registered for {name} after the load phase finished"
            )));
        };

        if let Err(e) = state.mark_ready(name, activation) {
            let message = e.to_string();
            warn!(capability = name, error = %message, "Rejecting readiness registration");
            self.fail(ShimError::ChannelMisuse(message));
            return Err(e);
        }

        let pending = state.pending().len();
        if pending > 0 {
            debug!(capability = name, pending, "Capability ready");
            return Ok(BarrierStatus::Waiting { pending });
        }

        debug!(capability = name, "Last capability ready");
        self.complete();
        Ok(BarrierStatus::Completed)
    }

    /// Fail the phase. Returns `false` if the barrier had already finished.
    pub fn fail(&mut self, error: ShimError) -> bool {
        self.state = None;
        match self.completion.take() {
            Some(tx) => {
                let _ = tx.send(Err(error));
                true
            },
            None => false,
        }
    }

    /// Whether the barrier has completed or failed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.completion.is_none()
    }

    fn complete(&mut self) {
        if let (Some(state), Some(tx)) = (self.state.take(), self.completion.take()) {
            // The waiter may have gone away when the run already failed.
            let _ = tx.send(Ok(state));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::capability::CapabilityName;

    fn pending(names: &[&str]) -> LoadState {
        let mut state = LoadState::new();
        for name in names {
            state.mark_pending(CapabilityName::new(*name).unwrap());
        }
        state
    }

    #[tokio::test]
    async fn test_empty_state_completes_immediately() {
        let (barrier, wait) = LoadBarrier::arm(LoadState::new());
        assert!(barrier.is_finished());
        let state = wait.wait().await.unwrap();
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn test_completes_on_last_registration() {
        let (mut barrier, wait) = LoadBarrier::arm(pending(&["a", "b"]));

        assert_eq!(
            barrier.on_ready("b", Box::new(|| {})).unwrap(),
            BarrierStatus::Waiting { pending: 1 }
        );
        assert!(!barrier.is_finished());
        assert_eq!(
            barrier.on_ready("a", Box::new(|| {})).unwrap(),
            BarrierStatus::Completed
        );

        let mut state = wait.wait().await.unwrap();
        assert!(!state.has_pending());
        assert!(state.take_activation("a").is_some());
    }

    #[tokio::test]
    async fn test_completion_fires_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let (mut barrier, wait) = LoadBarrier::arm(pending(&["a"]));

        barrier.on_ready("a", Box::new(|| {})).unwrap();
        let again = barrier.on_ready("a", Box::new(|| {}));
        assert!(matches!(again, Err(ShimError::ChannelMisuse(_))));

        if wait.wait().await.is_ok() {
            fired.fetch_add(1, Ordering::SeqCst);
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unrequested_registration_fails_phase() {
        let (mut barrier, wait) = LoadBarrier::arm(pending(&["a"]));
        let err = barrier.on_ready("ghost", Box::new(|| {})).unwrap_err();
        assert!(matches!(err, ShimError::ChannelMisuse(_)));
        assert!(barrier.is_finished());

        let phase = wait.wait().await;
        assert!(matches!(phase, Err(ShimError::ChannelMisuse(_))));
    }

    #[tokio::test]
    async fn test_dropped_barrier_reports_closed() {
        let (barrier, wait) = LoadBarrier::arm(pending(&["a"]));
        drop(barrier);
        assert!(matches!(wait.wait().await, Err(ShimError::ChannelClosed(_))));
    }
}
