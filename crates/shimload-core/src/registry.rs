//! Capability registry.
//!
//! An ordered, immutable collection of [`CapabilityDescriptor`]s. The
//! registration order is part of the contract: activation walks the registry
//! in this order, so prerequisites must be registered before dependents.

use std::collections::HashMap;

use tracing::debug;

use crate::capability::{CapabilityDescriptor, CapabilityName, DependencyRule};
use crate::error::{ShimError, ShimResult};

/// Ordered mapping from capability name to descriptor.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    descriptors: Vec<CapabilityDescriptor>,
    index: HashMap<CapabilityName, usize>,
}

impl CapabilityRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Look up a descriptor by name.
    ///
    /// # Errors
    ///
    /// Returns [`ShimError::UnknownCapability`] if no such capability exists.
    pub fn lookup(&self, name: &str) -> ShimResult<&CapabilityDescriptor> {
        self.get(name)
            .ok_or_else(|| ShimError::UnknownCapability(name.to_string()))
    }

    /// Look up a descriptor, if registered.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Registration position of `name`, if registered.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Iterate descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &CapabilityDescriptor> {
        self.descriptors.iter()
    }

    /// Visit every descriptor in registration order.
    pub fn for_each_in_order(&self, mut visit: impl FnMut(&CapabilityDescriptor)) {
        for descriptor in &self.descriptors {
            visit(descriptor);
        }
    }

    /// Names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&CapabilityName> {
        self.descriptors.iter().map(CapabilityDescriptor::name).collect()
    }

    /// Number of registered capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Builder for [`CapabilityRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    descriptors: Vec<CapabilityDescriptor>,
    index: HashMap<CapabilityName, usize>,
}

impl RegistryBuilder {
    /// Append a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ShimError::DuplicateCapability`] if the name is taken.
    pub fn register(mut self, descriptor: CapabilityDescriptor) -> ShimResult<Self> {
        let name = descriptor.name().clone();
        if self.index.contains_key(&name) {
            return Err(ShimError::DuplicateCapability(name.to_string()));
        }
        debug!(capability = %name, position = self.descriptors.len(), "Registered capability");
        self.index.insert(name, self.descriptors.len());
        self.descriptors.push(descriptor);
        Ok(self)
    }

    /// Freeze the registry.
    ///
    /// Fixed dependency edges are checked here: each must name a registered
    /// capability that comes earlier in registration order. Dynamic edges get
    /// the same check from the resolver when they are evaluated.
    ///
    /// # Errors
    ///
    /// Returns [`ShimError::UnknownCapability`] or [`ShimError::RegistryOrder`].
    pub fn build(self) -> ShimResult<CapabilityRegistry> {
        for (position, descriptor) in self.descriptors.iter().enumerate() {
            let DependencyRule::Fixed(deps) = descriptor.dependency_rule() else {
                continue;
            };
            for dep in deps {
                match self.index.get(dep) {
                    None => return Err(ShimError::UnknownCapability(dep.to_string())),
                    Some(&dep_position) if dep_position >= position => {
                        return Err(ShimError::RegistryOrder {
                            dependent: descriptor.name().to_string(),
                            dependency: dep.to_string(),
                        });
                    },
                    Some(_) => {},
                }
            }
        }

        Ok(CapabilityRegistry {
            descriptors: self.descriptors,
            index: self.index,
        })
    }
}
