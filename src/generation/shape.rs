// src/generation/shape.rs
//! Proxy shapes
//!
//! A [`ProxyShape`] is the cache key for generated implementations. It
//! captures everything that determines an implementation's structure and
//! nothing that varies per instance (interceptors, targets, mixin instances).
//! Capability sets are kept sorted, so the key is independent of the order
//! in which capabilities were supplied.

use crate::contract::types::TypeRef;
use crate::generation::hook::HookIdentity;
use crate::generation::mixin::MixinRegistry;
use crate::generation::options::{AttributeInfo, GenerationOptions};
use crate::proxy::target::Target;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Proxy flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProxyKind {
    /// Interface proxy; interceptors must supply every result
    InterfaceWithoutTarget,

    /// Interface proxy forwarding to a fixed target
    InterfaceWithTarget,

    /// Interface proxy whose target can be swapped
    InterfaceWithTargetInterface,

    /// Subclass proxy forwarding to its own base object
    Class,

    /// Subclass proxy forwarding to a separate instance of the class
    ClassWithTarget,
}

impl ProxyKind {
    pub fn is_class(&self) -> bool {
        matches!(self, ProxyKind::Class | ProxyKind::ClassWithTarget)
    }

    pub fn has_target(&self) -> bool {
        matches!(
            self,
            ProxyKind::InterfaceWithTarget
                | ProxyKind::InterfaceWithTargetInterface
                | ProxyKind::ClassWithTarget
        )
    }

    pub fn allows_retargeting(&self) -> bool {
        matches!(self, ProxyKind::InterfaceWithTargetInterface)
    }
}

/// Canonical cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyShape {
    pub kind: ProxyKind,
    pub contract: TypeRef,

    /// Concrete target type; only for flavours bound to a fixed target type
    pub target_type: Option<TypeRef>,

    /// Capabilities of that target, ancestors included
    pub target_capabilities: BTreeSet<TypeRef>,
    pub additional: BTreeSet<TypeRef>,
    pub mixins: BTreeSet<TypeRef>,
    pub hook: HookIdentity,
    pub has_selector: bool,

    /// Sorted multiset
    pub attributes: Vec<AttributeInfo>,
    pub base_type: Option<TypeRef>,
}

impl ProxyShape {
    pub fn new(
        kind: ProxyKind,
        contract: TypeRef,
        target_type: Option<TypeRef>,
        additional: &[TypeRef],
        options: &GenerationOptions,
        mixins: &MixinRegistry,
    ) -> Self {
        let mut attributes = options.additional_attributes.clone();
        attributes.sort();

        Self {
            kind,
            contract,
            target_type,
            target_capabilities: BTreeSet::new(),
            additional: additional.iter().cloned().collect(),
            mixins: mixins.capability_types(),
            hook: HookIdentity::new(&options.hook),
            has_selector: options.selector.is_some(),
            attributes,
            base_type: options
                .base_type_for_contract_proxy
                .as_ref()
                .map(|b| b.type_ref.clone()),
        }
    }
}

impl ProxyShape {
    /// Key the shape by what `target` implements as well as by its type
    pub fn with_target_capabilities(mut self, target: &dyn Target) -> Self {
        self.target_capabilities = target
            .capabilities()
            .iter()
            .flat_map(|c| std::iter::once(Arc::clone(c)).chain(c.ancestors()))
            .map(|c| c.type_ref.clone())
            .collect();
        self
    }
}

impl fmt::Display for ProxyShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}<{}>", self.kind, self.contract)?;
        if let Some(target) = &self.target_type {
            write!(f, " target={}", target)?;
        }
        if !self.target_capabilities.is_empty() {
            let names: Vec<_> = self.target_capabilities.iter().map(|t| t.to_string()).collect();
            write!(f, " implements=[{}]", names.join(", "))?;
        }
        if !self.additional.is_empty() {
            let names: Vec<_> = self.additional.iter().map(|t| t.to_string()).collect();
            write!(f, " +[{}]", names.join(", "))?;
        }
        if !self.mixins.is_empty() {
            let names: Vec<_> = self.mixins.iter().map(|t| t.to_string()).collect();
            write!(f, " mixins=[{}]", names.join(", "))?;
        }
        write!(f, " hook={}", self.hook.describe())
    }
}
