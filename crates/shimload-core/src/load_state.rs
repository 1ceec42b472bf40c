//! Per-phase load state: which capabilities are requested and which are ready.

use std::collections::HashMap;
use std::fmt;

use crate::capability::CapabilityName;
use crate::error::{ShimError, ShimResult};

/// Zero-argument procedure that performs a capability's patch when invoked.
pub type Activation = Box<dyn FnOnce() + Send>;

/// Observable status of a capability within one load phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Never requested.
    Absent,
    /// Requested, implementation not yet ready.
    Pending,
    /// Implementation loaded and registered its activation.
    Ready,
}

enum Slot {
    Pending,
    /// `None` once the activation has been taken.
    Ready(Option<Activation>),
}

/// Mapping from capability name to [`LoadStatus`], plus the stored activations.
///
/// Exactly one instance exists per load phase. It is filled by the resolver
/// (pending entries), completed by the load barrier (ready entries), and
/// drained by activation.
#[derive(Default)]
pub struct LoadState {
    slots: HashMap<CapabilityName, Slot>,
    requested: Vec<CapabilityName>,
}

impl LoadState {
    /// Create an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Status of `name` in this phase.
    #[must_use]
    pub fn status(&self, name: &str) -> LoadStatus {
        match self.slots.get(name) {
            None => LoadStatus::Absent,
            Some(Slot::Pending) => LoadStatus::Pending,
            Some(Slot::Ready(_)) => LoadStatus::Ready,
        }
    }

    /// Mark `name` as pending. Returns `false` if it was already tracked.
    pub fn mark_pending(&mut self, name: CapabilityName) -> bool {
        if self.slots.contains_key(&name) {
            return false;
        }
        self.slots.insert(name.clone(), Slot::Pending);
        self.requested.push(name);
        true
    }

    /// Record `name` as already loaded by an earlier phase of the same run.
    ///
    /// It counts as requested, so the resolver skips it, but carries no
    /// activation. Returns `false` if it was already tracked.
    pub fn mark_loaded(&mut self, name: CapabilityName) -> bool {
        if self.slots.contains_key(&name) {
            return false;
        }
        self.slots.insert(name.clone(), Slot::Ready(None));
        self.requested.push(name);
        true
    }

    /// Transition `name` from pending to ready.
    ///
    /// # Errors
    ///
    /// Returns [`ShimError::ChannelMisuse`] if `name` was never requested or
    /// is already ready.
    pub fn mark_ready(&mut self, name: &str, activation: Activation) -> ShimResult<()> {
        match self.slots.get_mut(name) {
            None => Err(ShimError::ChannelMisuse(format!(
                "readiness registered for {name}, which was never requested"
            ))),
            Some(Slot::Ready(_)) => Err(ShimError::ChannelMisuse(format!(
                "readiness registered twice for {name}"
            ))),
            Some(slot @ Slot::Pending) => {
                *slot = Slot::Ready(Some(activation));
                Ok(())
            },
        }
    }

    /// Whether any tracked capability is still pending.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.slots.values().any(|slot| matches!(slot, Slot::Pending))
    }

    /// Names still pending, in request order.
    #[must_use]
    pub fn pending(&self) -> Vec<&CapabilityName> {
        self.requested
            .iter()
            .filter(|name| self.status(name.as_str()) == LoadStatus::Pending)
            .collect()
    }

    /// All tracked names in the order they were requested.
    #[must_use]
    pub fn requested(&self) -> &[CapabilityName] {
        &self.requested
    }

    /// Remove and return the activation stored for `name`, if ready.
    pub fn take_activation(&mut self, name: &str) -> Option<Activation> {
        match self.slots.get_mut(name) {
            Some(Slot::Ready(activation)) => activation.take(),
            _ => None,
        }
    }

    /// Number of tracked capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for name in &self.requested {
            map.entry(&name.as_str(), &self.status(name.as_str()));
        }
        map.finish()
    }
}
