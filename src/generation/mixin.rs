// src/generation/mixin.rs
//! Mixin registry
//!
//! Lays out the capabilities contributed by mixin instances. Entries are
//! sorted by capability full name and a capability's position is its index
//! in that order, so one instance exposing several capabilities occupies
//! several positions.

use crate::contract::descriptor::{ContractDescriptor, MemberDescriptor, ParamDirection};
use crate::contract::types::TypeRef;
use crate::proxy::target::Target;
use crate::utils::errors::{ProxyError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// One (capability, instance) slot
#[derive(Clone)]
pub struct MixinEntry {
    pub capability: Arc<ContractDescriptor>,
    pub instance: Arc<dyn Target>,
}

/// Position-stable mixin layout
#[derive(Clone, Default)]
pub struct MixinRegistry {
    entries: Vec<MixinEntry>,
}

fn same_instance(a: &Arc<dyn Target>, b: &Arc<dyn Target>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl MixinRegistry {
    /// Build the layout for `instances`. Capabilities already provided by
    /// `primary` (or one of its bases) are dropped.
    pub fn new(instances: &[Arc<dyn Target>], primary: Option<&ContractDescriptor>) -> Result<Self> {
        let mut by_capability: BTreeMap<String, MixinEntry> = BTreeMap::new();
        let mut seen: Vec<&Arc<dyn Target>> = Vec::new();

        for instance in instances {
            if seen.iter().any(|s| same_instance(s, instance)) {
                continue;
            }
            seen.push(instance);

            let mut capabilities: Vec<Arc<ContractDescriptor>> = Vec::new();
            for direct in instance.capabilities() {
                for capability in std::iter::once(Arc::clone(direct)).chain(direct.ancestors()) {
                    if !capabilities.iter().any(|c| c.type_ref == capability.type_ref) {
                        capabilities.push(capability);
                    }
                }
            }

            if capabilities.is_empty() {
                debug!("Ignoring mixin {} without capabilities", instance.type_info());
                continue;
            }

            for capability in capabilities {
                if primary.map_or(false, |p| p.is_or_derives_from(&capability.type_ref)) {
                    debug!(
                        "Dropping mixin capability {} already provided by the contract",
                        capability.type_ref
                    );
                    continue;
                }

                let key = capability.type_ref.to_string();
                if let Some(existing) = by_capability.get(&key) {
                    return Err(ProxyError::AmbiguousMixin {
                        capability: key,
                        first: existing.instance.type_info().to_string(),
                        second: instance.type_info().to_string(),
                    });
                }
                by_capability.insert(
                    key,
                    MixinEntry {
                        capability,
                        instance: Arc::clone(instance),
                    },
                );
            }
        }

        let registry = Self {
            entries: by_capability.into_values().collect(),
        };
        registry.ensure_distinct_delegates()?;
        Ok(registry)
    }

    /// Delegate capabilities all expose `Invoke`; their signatures must differ
    fn ensure_distinct_delegates(&self) -> Result<()> {
        let delegates: Vec<(&MixinEntry, &MemberDescriptor)> = self
            .entries
            .iter()
            .filter_map(|e| e.capability.invoke_member().map(|m| (e, m)))
            .collect();

        for (i, (first, a)) in delegates.iter().enumerate() {
            for (second, b) in &delegates[i + 1..] {
                if call_shape(a) == call_shape(b) && a.return_type == b.return_type {
                    let params: Vec<String> = a.params.iter().map(|p| p.ty.to_string()).collect();
                    return Err(ProxyError::AmbiguousDelegateMixin {
                        first: first.capability.type_ref.to_string(),
                        second: second.capability.type_ref.to_string(),
                        signature: params.join(", "),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn entries(&self) -> &[MixinEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Position of `capability` in the layout
    pub fn position_of(&self, capability: &TypeRef) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.capability.type_ref == *capability)
    }

    pub fn instance_at(&self, position: usize) -> Option<&Arc<dyn Target>> {
        self.entries.get(position).map(|e| &e.instance)
    }

    pub fn capability_types(&self) -> BTreeSet<TypeRef> {
        self.entries
            .iter()
            .map(|e| e.capability.type_ref.clone())
            .collect()
    }

    /// Instances indexed by position
    pub fn instances(&self) -> Vec<Arc<dyn Target>> {
        self.entries.iter().map(|e| Arc::clone(&e.instance)).collect()
    }
}

fn call_shape(member: &MemberDescriptor) -> Vec<(&TypeRef, ParamDirection)> {
    member.params.iter().map(|p| (&p.ty, p.direction)).collect()
}

impl PartialEq for MixinRegistry {
    fn eq(&self, other: &Self) -> bool {
        self.capability_types() == other.capability_types()
    }
}

impl Eq for MixinRegistry {}

impl std::hash::Hash for MixinRegistry {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.capability_types().hash(state);
    }
}

impl fmt::Debug for MixinRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|e| format!("{} -> {}", e.capability.type_ref, e.instance.type_info())),
            )
            .finish()
    }
}
