// src/generation/emitter.rs
//! Emission backend
//!
//! Builds the closed dispatch table of an [`Implementation`] for one proxy
//! shape. Every retained member becomes a [`DispatchEntry`] that records
//! where calls are routed and an [`InvokeShim`], the argument marshaling plan
//! interpreted on each call.

use crate::contract::descriptor::{ContractDescriptor, MemberDescriptor, ParamDirection};
use crate::contract::signature::{
    is_always_excluded, root_contract, ConcreteMethod, MemberSignature, MemberTable,
    MethodIdentity,
};
use crate::contract::types::{TypeRef, Visibility};
use crate::generation::mixin::MixinRegistry;
use crate::generation::options::{AttributeInfo, GenerationOptions};
use crate::generation::shape::{ProxyKind, ProxyShape};
use crate::interception::value::Value;
use crate::proxy::target::Target;
use crate::utils::errors::{ProxyError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Identifier of an implementation within its scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ImplementationId(pub u64);

impl fmt::Display for ImplementationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where calls to an entry are sent
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Routing {
    /// The proxy's target
    Target,

    /// The proxy's target, when it implements the capability at call time
    TargetIfImplements(TypeRef),

    /// The mixin at this position
    Mixin(usize),

    /// The base object of the proxy
    Base,

    /// Nothing; interceptors must produce the result
    None,
}

impl fmt::Display for Routing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Routing::Target => write!(f, "target"),
            Routing::TargetIfImplements(cap) => write!(f, "target-if({})", cap),
            Routing::Mixin(position) => write!(f, "mixin[{}]", position),
            Routing::Base => write!(f, "base"),
            Routing::None => write!(f, "none"),
        }
    }
}

/// Marshaling plan for one argument slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotPlan {
    pub direction: ParamDirection,
    pub copy_back: bool,
}

/// How the return slot is settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnPlan {
    Void,

    /// Unset return becomes null
    Reference,

    /// Unset return is a contract violation
    Value,

    /// Decided once the member is closed over its generic arguments
    Generic,
}

/// Argument marshaling plan of a dispatch entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeShim {
    pub slots: Vec<SlotPlan>,
    pub returns: ReturnPlan,

    /// Whether the frame keeps the creation-time argument values
    pub tracks_changes: bool,
}

impl InvokeShim {
    pub fn plan(signature: &MemberSignature) -> Self {
        let returns = match &signature.return_type {
            None => ReturnPlan::Void,
            Some(ty) if ty.is_open() => ReturnPlan::Generic,
            Some(ty) if ty.is_value() => ReturnPlan::Value,
            Some(_) => ReturnPlan::Reference,
        };

        Self {
            slots: signature
                .params
                .iter()
                .map(|p| SlotPlan {
                    direction: p.direction,
                    copy_back: p.direction.copies_back(),
                })
                .collect(),
            returns,
            tracks_changes: signature.has_by_ref_params(),
        }
    }

    /// Copy the caller's arguments into fresh slots; out slots start as null
    pub fn prepare(&self, method: &ConcreteMethod, args: &[Value]) -> Result<Vec<Value>> {
        if args.len() != self.slots.len() {
            return Err(ProxyError::ArgumentMismatch {
                method: method.to_string(),
                detail: format!("expected {} argument(s), got {}", self.slots.len(), args.len()),
            });
        }
        Ok(self
            .slots
            .iter()
            .zip(args)
            .map(|(slot, arg)| match slot.direction {
                ParamDirection::Out => Value::Null,
                _ => arg.clone(),
            })
            .collect())
    }

    /// Write by-reference and out slots back to the caller
    pub fn copy_back(&self, slots: &[Value], args: &mut [Value]) {
        for ((plan, slot), arg) in self.slots.iter().zip(slots).zip(args.iter_mut()) {
            if plan.copy_back {
                *arg = slot.clone();
            }
        }
    }

    /// Turn the final return slot into the caller's result
    pub fn settle(&self, method: &ConcreteMethod, slot: Option<Value>) -> Result<Value> {
        let value_shaped = match self.returns {
            ReturnPlan::Void => return Ok(Value::Null),
            ReturnPlan::Reference => false,
            ReturnPlan::Value => true,
            ReturnPlan::Generic => method.returns_value_type(),
        };
        match slot {
            Some(value) => Ok(value),
            None if value_shaped => Err(ProxyError::InterceptorContractViolation {
                method: method.to_string(),
            }),
            None => Ok(Value::Null),
        }
    }
}

/// One slot of the dispatch table
#[derive(Debug, Clone)]
pub struct DispatchEntry {
    pub exposed_name: String,
    pub signature: MemberSignature,

    /// Declarations served by this entry; the first one is the default identity
    pub declarations: Vec<Arc<MethodIdentity>>,
    pub routing: Routing,
    pub intercepted: bool,
    pub is_abstract: bool,
    pub shim: InvokeShim,
}

/// Generated implementation of one proxy shape
pub struct Implementation {
    pub(crate) id: ImplementationId,
    pub(crate) name: String,
    pub(crate) type_ref: TypeRef,
    pub(crate) shape: ProxyShape,
    pub(crate) contract: Arc<ContractDescriptor>,
    pub(crate) capabilities: Vec<Arc<ContractDescriptor>>,
    pub(crate) entries: Vec<DispatchEntry>,
    pub(crate) names: HashMap<String, Vec<(usize, usize)>>,

    /// Mixin capabilities by position
    pub(crate) mixin_capabilities: Vec<Arc<ContractDescriptor>>,

    /// Type whose activator builds the base object
    pub(crate) base_type: Option<Arc<ContractDescriptor>>,
    pub(crate) attributes: Vec<AttributeInfo>,
    pub(crate) created_at: DateTime<Utc>,
}

impl Implementation {
    pub fn id(&self) -> ImplementationId {
        self.id
    }

    /// Unique generated type name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    pub fn shape(&self) -> &ProxyShape {
        &self.shape
    }

    pub fn kind(&self) -> ProxyKind {
        self.shape.kind
    }

    pub fn contract(&self) -> &Arc<ContractDescriptor> {
        &self.contract
    }

    /// Every capability the implementation satisfies
    pub fn capabilities(&self) -> &[Arc<ContractDescriptor>] {
        &self.capabilities
    }

    pub fn implements(&self, capability: &TypeRef) -> bool {
        self.capabilities.iter().any(|c| c.type_ref == *capability)
    }

    pub fn entries(&self) -> &[DispatchEntry] {
        &self.entries
    }

    /// Every (entry, declaration) callable under `name`
    pub fn lookup(&self, name: &str) -> &[(usize, usize)] {
        self.names.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Locate a declaration by identity
    pub fn find_declaration(&self, identity: &MethodIdentity) -> Option<(usize, usize)> {
        self.entries.iter().enumerate().find_map(|(e, entry)| {
            entry
                .declarations
                .iter()
                .position(|d| d.declaring == identity.declaring && d.signature == identity.signature)
                .map(|d| (e, d))
        })
    }

    pub fn mixin_capabilities(&self) -> &[Arc<ContractDescriptor>] {
        &self.mixin_capabilities
    }

    pub fn base_type(&self) -> Option<&Arc<ContractDescriptor>> {
        self.base_type.as_ref()
    }

    pub fn attributes(&self) -> &[AttributeInfo] {
        &self.attributes
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementation")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("shape", &self.shape.to_string())
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Everything needed to emit one implementation
pub(crate) struct EmitRequest<'a> {
    pub id: ImplementationId,
    pub name: String,
    pub shape: ProxyShape,
    pub contract: &'a Arc<ContractDescriptor>,

    /// Additional capabilities, validated
    pub additional: &'a [Arc<ContractDescriptor>],
    pub mixins: &'a MixinRegistry,
    pub options: &'a GenerationOptions,

    /// Target supplied with the request (with-target flavours)
    pub target: Option<&'a Arc<dyn Target>>,
}

/// How members of one capability are routed and filtered
#[derive(Debug, Clone)]
enum Source {
    Primary,
    Additional,
    Mixin(usize),
    ContractBase,
}

/// `contract` followed by its ancestors
fn with_ancestors(contract: &Arc<ContractDescriptor>) -> Vec<Arc<ContractDescriptor>> {
    std::iter::once(Arc::clone(contract))
        .chain(contract.ancestors())
        .collect()
}

fn push_unique(
    sources: &mut Vec<(Arc<ContractDescriptor>, Source)>,
    contract: Arc<ContractDescriptor>,
    source: Source,
) {
    if !sources.iter().any(|(c, _)| c.type_ref == contract.type_ref) {
        sources.push((contract, source));
    }
}

/// Capabilities in processing order, each tagged with its routing rule
fn collect_sources(request: &EmitRequest<'_>) -> Vec<(Arc<ContractDescriptor>, Source)> {
    let kind = request.shape.kind;
    let mut sources = Vec::new();

    for contract in with_ancestors(request.contract) {
        push_unique(&mut sources, contract, Source::Primary);
    }
    if kind.is_class() {
        push_unique(&mut sources, root_contract(), Source::Primary);
    }

    let mut additional: Vec<&Arc<ContractDescriptor>> = request.additional.iter().collect();
    additional.sort_by(|a, b| a.type_ref.cmp(&b.type_ref));
    for capability in additional {
        for contract in with_ancestors(capability) {
            if request.mixins.position_of(&contract.type_ref).is_none() {
                push_unique(&mut sources, contract, Source::Additional);
            }
        }
    }

    for (position, entry) in request.mixins.entries().iter().enumerate() {
        push_unique(&mut sources, Arc::clone(&entry.capability), Source::Mixin(position));
    }

    if !kind.is_class() {
        let base = request
            .options
            .base_type_for_contract_proxy
            .clone()
            .unwrap_or_else(root_contract);
        for contract in with_ancestors(&base) {
            push_unique(&mut sources, contract, Source::ContractBase);
        }
        push_unique(&mut sources, root_contract(), Source::ContractBase);
    }

    sources
}

/// Routing of a member, or `None` when the member is not emitted
fn route(
    request: &EmitRequest<'_>,
    capability: &ContractDescriptor,
    source: &Source,
    member: &MemberDescriptor,
) -> Routing {
    let kind = request.shape.kind;
    let target_implements = |cap: &TypeRef| request.target.map_or(false, |t| t.implements(cap));

    match source {
        Source::Primary => match kind {
            ProxyKind::InterfaceWithoutTarget => Routing::None,
            ProxyKind::InterfaceWithTarget | ProxyKind::InterfaceWithTargetInterface => {
                Routing::Target
            }
            ProxyKind::Class if member.is_abstract => Routing::None,
            ProxyKind::Class => Routing::Base,
            ProxyKind::ClassWithTarget => Routing::Target,
        },
        Source::Additional => match kind {
            ProxyKind::InterfaceWithoutTarget | ProxyKind::Class => Routing::None,
            ProxyKind::InterfaceWithTarget | ProxyKind::ClassWithTarget => {
                if target_implements(&capability.type_ref) {
                    Routing::Target
                } else {
                    Routing::None
                }
            }
            ProxyKind::InterfaceWithTargetInterface => {
                Routing::TargetIfImplements(capability.type_ref.clone())
            }
        },
        Source::Mixin(position) => match kind {
            ProxyKind::InterfaceWithTarget | ProxyKind::ClassWithTarget
                if target_implements(&capability.type_ref) =>
            {
                Routing::Target
            }
            _ => Routing::Mixin(*position),
        },
        Source::ContractBase => Routing::Base,
    }
}

/// Build the dispatch table for `request`
pub(crate) fn emit(request: EmitRequest<'_>) -> Result<Implementation> {
    let kind = request.shape.kind;
    let hook = Arc::clone(&request.options.hook);
    let sources = collect_sources(&request);

    let derives = |a: &TypeRef, b: &TypeRef| {
        a != b
            && sources
                .iter()
                .find(|(c, _)| c.type_ref == *a)
                .map_or(false, |(c, _)| c.is_or_derives_from(b))
    };

    let mut table: MemberTable<Routing> = MemberTable::new();
    for (capability, source) in &sources {
        for member in &capability.members {
            let identity = Arc::new(MethodIdentity::new(capability, member));
            if is_always_excluded(&identity) {
                continue;
            }
            if capability.is_class() && member.visibility == Visibility::Private {
                continue;
            }

            let routing = route(&request, capability, source, member);
            let intercepted = match source {
                Source::ContractBase => false,
                _ if capability.is_class() && !member.overridable => {
                    hook.non_interceptable(&capability.type_ref, member);
                    false
                }
                _ => hook.should_intercept(&capability.type_ref, member),
            };

            let placement = table.insert(identity, routing, intercepted, &derives);
            debug!(
                "{}.{} -> {:?}",
                capability.type_ref, member.name, placement
            );
        }
    }
    hook.inspection_complete();

    let (members, names) = table.into_parts();
    let entries: Vec<DispatchEntry> = members
        .into_iter()
        .map(|m| DispatchEntry {
            is_abstract: m.declarations[0].member.is_abstract,
            shim: InvokeShim::plan(&m.signature),
            exposed_name: m.exposed_name,
            signature: m.signature,
            declarations: m.declarations,
            routing: m.routing,
            intercepted: m.intercepted,
        })
        .collect();

    let mut capabilities: Vec<Arc<ContractDescriptor>> = Vec::new();
    for (capability, source) in &sources {
        if matches!(source, Source::ContractBase) || capability.type_ref.is_root() {
            continue;
        }
        capabilities.push(Arc::clone(capability));
    }

    let base_type = if kind.is_class() {
        Some(Arc::clone(request.contract))
    } else {
        request.options.base_type_for_contract_proxy.clone()
    };

    info!(
        "Generated {} for {} ({} members, {} intercepted)",
        request.name,
        request.shape,
        entries.len(),
        entries.iter().filter(|e| e.intercepted).count()
    );

    Ok(Implementation {
        id: request.id,
        type_ref: TypeRef::class(request.name.clone()),
        name: request.name,
        shape: request.shape,
        contract: Arc::clone(request.contract),
        capabilities,
        entries,
        names,
        mixin_capabilities: request
            .mixins
            .entries()
            .iter()
            .map(|e| Arc::clone(&e.capability))
            .collect(),
        base_type,
        attributes: request.options.additional_attributes.clone(),
        created_at: Utc::now(),
    })
}
