//! Per-run registration channel.
//!
//! Loaded resources report back to the orchestrator through this channel:
//! capability implementations register their activation by name, and
//! indirect payloads deliver their text under the callback identifier they
//! were handed. Both kinds are correlated independently, so any number of
//! acquisitions can be in flight at once.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::barrier::{BarrierStatus, BarrierWait, LoadBarrier};
use crate::error::{ShimError, ShimResult};
use crate::load_state::LoadState;

/// A pending indirect delivery waiting for its resource to call back.
struct PendingDelivery {
    tx: oneshot::Sender<ShimResult<String>>,
}

#[derive(Default)]
struct ChannelInner {
    barrier: Option<LoadBarrier>,
    deliveries: HashMap<String, PendingDelivery>,
}

/// Handle through which loaded resources report to the running orchestrator.
///
/// Cheap to clone; every clone refers to the same run.
#[derive(Clone, Default)]
pub struct RegistrationChannel {
    inner: Arc<Mutex<ChannelInner>>,
}

/// Receiving half of one indirect delivery.
#[must_use = "the delivered payload is only observable by awaiting it"]
pub struct DeliveryWait {
    callback_id: String,
    rx: oneshot::Receiver<ShimResult<String>>,
}

impl DeliveryWait {
    /// The identifier the resource must deliver under.
    #[must_use]
    pub fn callback_id(&self) -> &str {
        &self.callback_id
    }

    /// Wait for the resource to deliver its payload.
    ///
    /// # Errors
    ///
    /// Returns the failure reported through [`RegistrationChannel::fail`], or
    /// [`ShimError::ChannelClosed`] if the channel was dropped first.
    pub async fn wait(self) -> ShimResult<String> {
        let callback_id = self.callback_id;
        self.rx
            .await
            .map_err(|_| ShimError::ChannelClosed(format!("delivery {callback_id}")))?
    }
}

impl RegistrationChannel {
    /// Create a channel for a new run.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a load barrier over `state` and return its wait handle.
    ///
    /// Only one load phase may be in progress; arming while an earlier phase
    /// is unfinished fails that phase.
    pub(crate) fn arm(&self, state: LoadState) -> BarrierWait {
        let (barrier, wait) = LoadBarrier::arm(state);
        let mut inner = self.lock();
        if let Some(mut previous) = inner.barrier.replace(barrier)
            && !previous.is_finished()
        {
            warn!("Arming a new load phase while the previous one is unfinished");
            previous.fail(ShimError::ChannelMisuse(
                "load phase superseded before completion".to_string(),
            ));
        }
        wait
    }

    /// Register a loaded capability's activation.
    ///
    /// Called by capability implementations once they have loaded. The
    /// activation is not invoked here; it runs after every requested
    /// capability has registered, in registry order.
    ///
    /// # Errors
    ///
    /// Returns [`ShimError::ChannelMisuse`] if no load phase is in progress,
    /// if `name` was never requested, or if it already registered.
    pub fn capability_ready(
        &self,
        name: &str,
        activation: impl FnOnce() + Send + 'static,
    ) -> ShimResult<BarrierStatus> {
        let mut inner = self.lock();
        let Some(barrier) = inner.barrier.as_mut() else {
            return Err(ShimError::ChannelMisuse(format!(
                "readiness registered for {name} with no load phase in progress"
            )));
        };
        barrier.on_ready(name, Box::new(activation))
    }

    /// Register a pending delivery under `callback_id`.
    pub(crate) fn expect_delivery(&self, callback_id: impl Into<String>) -> DeliveryWait {
        let callback_id = callback_id.into();
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.lock();
            inner
                .deliveries
                .insert(callback_id.clone(), PendingDelivery { tx });
        }
        debug!(callback_id = %callback_id, "Awaiting indirect delivery");
        DeliveryWait { callback_id, rx }
    }

    /// Drop a pending delivery whose resource was never injected.
    pub(crate) fn cancel_delivery(&self, callback_id: &str) {
        self.lock().deliveries.remove(callback_id);
    }

    /// Deliver an indirect payload's text.
    ///
    /// Returns `false` if nothing is waiting under `callback_id`.
    pub fn deliver(&self, callback_id: &str, payload: impl ToString) -> bool {
        let mut inner = self.lock();
        if let Some(req) = inner.deliveries.remove(callback_id) {
            let _ = req.tx.send(Ok(payload.to_string()));
            true
        } else {
            warn!(callback_id, "No pending delivery found for callback");
            false
        }
    }

    /// Report that a resource failed to load.
    ///
    /// Fails the current load phase and every pending delivery.
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(reason = %reason, "Resource reported a load failure");
        let mut inner = self.lock();
        if let Some(barrier) = inner.barrier.as_mut() {
            barrier.fail(ShimError::Host(reason.clone()));
        }
        for (_, req) in inner.deliveries.drain() {
            let _ = req.tx.send(Err(ShimError::Host(reason.clone())));
        }
    }

    /// Number of indirect deliveries still outstanding.
    #[must_use]
    pub fn pending_deliveries(&self) -> usize {
        self.lock().deliveries.len()
    }

    /// Whether a load phase is armed and still waiting.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.lock()
            .barrier
            .as_ref()
            .is_some_and(|barrier| !barrier.is_finished())
    }

    fn lock(&self) -> MutexGuard<'_, ChannelInner> {
        // Nothing held under the lock can leave it half-updated.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for RegistrationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("RegistrationChannel")
            .field("loading", &inner.barrier.as_ref().is_some_and(|b| !b.is_finished()))
            .field("pending_deliveries", &inner.deliveries.len())
            .finish()
    }
}
