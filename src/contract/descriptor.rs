// src/contract/descriptor.rs
//! Contract descriptors
//!
//! A [`ContractDescriptor`] is the caller-supplied, immutable description of
//! an interface or extensible class: its type, inherited capabilities,
//! generic parameters and members. Properties, indexers and events are
//! described as accessor members (`get_X`, `set_Item`, `add_X`, ...).

use crate::contract::types::{TypeKind, TypeRef, Visibility};
use crate::interception::value::Value;
use crate::proxy::target::Target;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Builds the base object of a class proxy from constructor arguments
pub type Activator = Arc<dyn Fn(&[Value]) -> anyhow::Result<Arc<dyn Target>> + Send + Sync>;

/// How a parameter is passed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub enum ParamDirection {
    /// Copied in, never copied back
    ByValue,

    /// Copied in and copied back
    ByRef,

    /// Read-only reference; copied in, never copied back
    In,

    /// Starts out null, copied back
    Out,
}

impl ParamDirection {
    /// Whether the slot is written back to the caller after the call
    pub fn copies_back(&self) -> bool {
        matches!(self, ParamDirection::ByRef | ParamDirection::Out)
    }

    pub fn is_by_reference(&self) -> bool {
        !matches!(self, ParamDirection::ByValue)
    }
}

/// Parameter description
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamDescriptor {
    pub name: String,
    pub ty: TypeRef,
    pub direction: ParamDirection,
}

/// Member kinds; accessors carry the name of the property or event they belong to
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub enum MemberKind {
    Method,
    PropertyGet { property: String },
    PropertySet { property: String },
    IndexerGet,
    IndexerSet,
    EventAdd { event: String },
    EventRemove { event: String },
}

/// Member description
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberDescriptor {
    pub name: String,
    pub kind: MemberKind,
    pub params: Vec<ParamDescriptor>,

    /// `None` for void members
    pub return_type: Option<TypeRef>,

    /// Names of method-level generic parameters
    pub generic_params: Vec<String>,
    pub visibility: Visibility,

    /// Class members only: whether the member can be overridden
    pub overridable: bool,

    /// Class members only: declared without an implementation
    pub is_abstract: bool,
}

impl MemberDescriptor {
    fn with_kind(name: impl Into<String>, kind: MemberKind) -> Self {
        Self {
            name: name.into(),
            kind,
            params: Vec::new(),
            return_type: None,
            generic_params: Vec::new(),
            visibility: Visibility::Public,
            overridable: true,
            is_abstract: false,
        }
    }

    pub fn method(name: impl Into<String>) -> Self {
        Self::with_kind(name, MemberKind::Method)
    }

    pub fn property_get(property: &str, ty: TypeRef) -> Self {
        Self::with_kind(
            format!("get_{}", property),
            MemberKind::PropertyGet {
                property: property.to_string(),
            },
        )
        .returns(ty)
    }

    pub fn property_set(property: &str, ty: TypeRef) -> Self {
        Self::with_kind(
            format!("set_{}", property),
            MemberKind::PropertySet {
                property: property.to_string(),
            },
        )
        .param("value", ty)
    }

    pub fn indexer_get(index: Vec<ParamDescriptor>, ty: TypeRef) -> Self {
        let mut member = Self::with_kind("get_Item", MemberKind::IndexerGet).returns(ty);
        member.params = index;
        member
    }

    pub fn indexer_set(index: Vec<ParamDescriptor>, ty: TypeRef) -> Self {
        let mut member = Self::with_kind("set_Item", MemberKind::IndexerSet);
        member.params = index;
        member.param("value", ty)
    }

    pub fn event_add(event: &str, handler: TypeRef) -> Self {
        Self::with_kind(
            format!("add_{}", event),
            MemberKind::EventAdd {
                event: event.to_string(),
            },
        )
        .param("value", handler)
    }

    pub fn event_remove(event: &str, handler: TypeRef) -> Self {
        Self::with_kind(
            format!("remove_{}", event),
            MemberKind::EventRemove {
                event: event.to_string(),
            },
        )
        .param("value", handler)
    }

    fn push_param(mut self, name: &str, ty: TypeRef, direction: ParamDirection) -> Self {
        self.params.push(ParamDescriptor {
            name: name.to_string(),
            ty,
            direction,
        });
        self
    }

    pub fn param(self, name: &str, ty: TypeRef) -> Self {
        self.push_param(name, ty, ParamDirection::ByValue)
    }

    pub fn ref_param(self, name: &str, ty: TypeRef) -> Self {
        self.push_param(name, ty, ParamDirection::ByRef)
    }

    pub fn out_param(self, name: &str, ty: TypeRef) -> Self {
        self.push_param(name, ty, ParamDirection::Out)
    }

    pub fn in_param(self, name: &str, ty: TypeRef) -> Self {
        self.push_param(name, ty, ParamDirection::In)
    }

    pub fn returns(mut self, ty: TypeRef) -> Self {
        self.return_type = Some(ty);
        self
    }

    pub fn generic(mut self, param: &str) -> Self {
        self.generic_params.push(param.to_string());
        self
    }

    pub fn non_overridable(mut self) -> Self {
        self.overridable = false;
        self
    }

    pub fn abstract_member(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn is_void(&self) -> bool {
        self.return_type.is_none()
    }

    pub fn has_by_ref_params(&self) -> bool {
        self.params.iter().any(|p| p.direction.is_by_reference())
    }
}

/// Description of an interface or class to implement
#[derive(Clone)]
pub struct ContractDescriptor {
    pub type_ref: TypeRef,

    /// Type-level generic parameter names, bound by `type_ref.generic_args`
    pub generic_params: Vec<String>,

    /// Inherited capabilities (interfaces, or the base class for classes)
    pub bases: Vec<Arc<ContractDescriptor>>,
    pub members: Vec<MemberDescriptor>,

    /// Class contracts: builds the base object from constructor arguments
    pub activator: Option<Activator>,

    /// Delegate types expose a single `Invoke` member
    pub is_delegate: bool,
}

impl ContractDescriptor {
    pub fn new(type_ref: TypeRef) -> Self {
        Self {
            type_ref,
            generic_params: Vec::new(),
            bases: Vec::new(),
            members: Vec::new(),
            activator: None,
            is_delegate: false,
        }
    }

    pub fn interface(full_name: impl Into<String>) -> Self {
        Self::new(TypeRef::interface(full_name))
    }

    pub fn class(full_name: impl Into<String>) -> Self {
        Self::new(TypeRef::class(full_name))
    }

    pub fn sealed_class(full_name: impl Into<String>) -> Self {
        Self::new(TypeRef::sealed_class(full_name))
    }

    /// Delegate type whose single `Invoke` member takes `params` and returns `returns`
    pub fn delegate(
        full_name: impl Into<String>,
        params: Vec<ParamDescriptor>,
        returns: Option<TypeRef>,
    ) -> Self {
        let mut invoke = MemberDescriptor::method("Invoke");
        invoke.params = params;
        invoke.return_type = returns;
        let mut contract = Self::interface(full_name).member(invoke);
        contract.is_delegate = true;
        contract
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.type_ref.visibility = visibility;
        self
    }

    pub fn with_generic_params(mut self, params: &[&str]) -> Self {
        self.generic_params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn extends(mut self, base: Arc<ContractDescriptor>) -> Self {
        self.bases.push(base);
        self
    }

    pub fn member(mut self, member: MemberDescriptor) -> Self {
        self.members.push(member);
        self
    }

    /// Adds accessors for a property
    pub fn property(mut self, name: &str, ty: TypeRef, writable: bool) -> Self {
        self.members.push(MemberDescriptor::property_get(name, ty.clone()));
        if writable {
            self.members.push(MemberDescriptor::property_set(name, ty));
        }
        self
    }

    /// Adds accessors for an indexer
    pub fn indexer(mut self, index: Vec<ParamDescriptor>, ty: TypeRef, writable: bool) -> Self {
        self.members
            .push(MemberDescriptor::indexer_get(index.clone(), ty.clone()));
        if writable {
            self.members.push(MemberDescriptor::indexer_set(index, ty));
        }
        self
    }

    /// Adds add/remove accessors for an event
    pub fn event(mut self, name: &str, handler: TypeRef) -> Self {
        self.members
            .push(MemberDescriptor::event_add(name, handler.clone()));
        self.members.push(MemberDescriptor::event_remove(name, handler));
        self
    }

    pub fn with_activator<F>(mut self, activator: F) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<Arc<dyn Target>> + Send + Sync + 'static,
    {
        self.activator = Some(Arc::new(activator));
        self
    }

    /// Bind the type-level generic parameters, producing a closed contract
    pub fn close(&self, args: Vec<TypeRef>) -> Self {
        let mut closed = self.clone();
        closed.type_ref.generic_args = args;
        closed
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.type_ref.full_name
    }

    pub fn is_interface(&self) -> bool {
        self.type_ref.is_interface()
    }

    /// The `Invoke` member of a delegate type
    pub fn invoke_member(&self) -> Option<&MemberDescriptor> {
        if !self.is_delegate {
            return None;
        }
        self.members.iter().find(|m| m.name == "Invoke")
    }

    pub fn is_class(&self) -> bool {
        matches!(self.type_ref.kind, TypeKind::Class { .. })
    }

    /// Open if a generic argument is unbound or missing
    pub fn is_open(&self) -> bool {
        self.type_ref.is_open() || self.type_ref.generic_args.len() < self.generic_params.len()
    }

    /// Generic parameter bindings of this (closed) contract
    pub fn bindings(&self) -> HashMap<String, TypeRef> {
        self.generic_params
            .iter()
            .cloned()
            .zip(self.type_ref.generic_args.iter().cloned())
            .collect()
    }

    /// All inherited capabilities, depth first, without duplicates
    pub fn ancestors(&self) -> Vec<Arc<ContractDescriptor>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut stack: Vec<Arc<ContractDescriptor>> = self.bases.iter().rev().cloned().collect();
        while let Some(next) = stack.pop() {
            if !seen.insert(next.type_ref.clone()) {
                continue;
            }
            for base in next.bases.iter().rev() {
                stack.push(Arc::clone(base));
            }
            out.push(next);
        }
        out
    }

    /// Whether `other` is this contract or one of its ancestors
    pub fn is_or_derives_from(&self, other: &TypeRef) -> bool {
        self.type_ref == *other || self.ancestors().iter().any(|a| a.type_ref == *other)
    }
}

impl fmt::Debug for ContractDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractDescriptor")
            .field("type_ref", &self.type_ref)
            .field("generic_params", &self.generic_params)
            .field(
                "bases",
                &self.bases.iter().map(|b| b.type_ref.to_string()).collect::<Vec<_>>(),
            )
            .field("members", &self.members.len())
            .field("activator", &self.activator.is_some())
            .field("is_delegate", &self.is_delegate)
            .finish()
    }
}
