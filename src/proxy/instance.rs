// src/proxy/instance.rs
//! Proxy instances
//!
//! A [`ProxyInstance`] pairs a shared [`Implementation`] with per-instance
//! state: the target, the interceptor array, mixin instances, the base
//! object and an optional selector. Every call resolves a dispatch entry,
//! then either forwards directly to the implementer or builds a frame and
//! runs the interceptor chain.

use crate::contract::descriptor::ContractDescriptor;
use crate::contract::signature::{ConcreteMethod, MethodIdentity};
use crate::contract::types::TypeRef;
use crate::generation::emitter::{DispatchEntry, Implementation, Routing};
use crate::generation::mixin::MixinRegistry;
use crate::generation::selector::InterceptorSelector;
use crate::generation::shape::ProxyKind;
use crate::interception::executor;
use crate::interception::frame::Frame;
use crate::interception::interceptor::Interceptor;
use crate::interception::value::Value;
use crate::observability::INTERCEPTED_CALLS;
use crate::proxy::target::{DelegateTarget, Target};
use crate::utils::errors::{ProxyError, Result};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

struct InstanceState {
    implementation: Arc<Implementation>,
    target: RwLock<Option<Arc<dyn Target>>>,
    interceptors: Vec<Arc<dyn Interceptor>>,

    /// Mixin instances by position
    mixins: Vec<Arc<dyn Target>>,
    base: Option<Arc<dyn Target>>,
    selector: Option<Arc<dyn InterceptorSelector>>,
}

/// A live proxy object
#[derive(Clone)]
pub struct ProxyInstance {
    state: Arc<InstanceState>,
}

impl ProxyInstance {
    pub fn implementation(&self) -> &Arc<Implementation> {
        &self.state.implementation
    }

    pub fn kind(&self) -> ProxyKind {
        self.state.implementation.kind()
    }

    /// Current target, if any
    pub fn target(&self) -> Option<Arc<dyn Target>> {
        self.state.target.read().clone()
    }

    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.state.interceptors
    }

    pub fn mixin(&self, position: usize) -> Option<&Arc<dyn Target>> {
        self.state.mixins.get(position)
    }

    pub fn base(&self) -> Option<&Arc<dyn Target>> {
        self.state.base.as_ref()
    }

    /// Replace the target for subsequent calls (target-interface proxies only)
    pub fn change_target(&self, target: Option<Arc<dyn Target>>) -> Result<()> {
        let implementation = &self.state.implementation;
        if !implementation.kind().allows_retargeting() {
            return Err(ProxyError::InvalidTarget(format!(
                "{} is a {:?} proxy; only proxies with a target interface can change their target",
                implementation.name(),
                implementation.kind()
            )));
        }
        if let Some(new_target) = &target {
            ensure_implements(new_target, implementation.contract())?;
        }
        debug!("Changing target of {}", implementation.name());
        *self.state.target.write() = target;
        Ok(())
    }

    /// Wrap the proxy in a [`Value`] so it can travel as an argument
    pub fn to_value(&self) -> Value {
        Value::object(self.clone())
    }

    pub fn from_value(value: &Value) -> Option<ProxyInstance> {
        value
            .as_object()
            .and_then(|o| o.downcast_ref::<ProxyInstance>())
            .cloned()
    }

    /// Call a non-generic member by exposed or namespaced name
    pub fn invoke(&self, name: &str, args: &mut [Value]) -> Result<Value> {
        self.invoke_generic(name, &[], args)
    }

    /// Call a member, closing its method-level generic parameters over `generic_args`
    pub fn invoke_generic(
        &self,
        name: &str,
        generic_args: &[TypeRef],
        args: &mut [Value],
    ) -> Result<Value> {
        let (entry, declaration) = self.resolve(name, generic_args.len(), args)?;
        self.call_entry(entry, declaration, generic_args, args)
    }

    /// Call a member by declaration identity
    pub fn invoke_member(
        &self,
        identity: &MethodIdentity,
        generic_args: &[TypeRef],
        args: &mut [Value],
    ) -> Result<Value> {
        let implementation = &self.state.implementation;
        let located = implementation.find_declaration(identity).or_else(|| {
            implementation
                .lookup(identity.name())
                .iter()
                .copied()
                .find(|(e, _)| {
                    implementation.entries()[*e]
                        .signature
                        .same_call_shape(&identity.signature)
                })
        });

        match located {
            Some((entry, declaration)) => self.call_entry(entry, declaration, generic_args, args),
            None => Err(ProxyError::MemberNotFound {
                implementation: implementation.name().to_string(),
                member: identity.namespaced_name(),
            }),
        }
    }

    pub fn get_property(&self, name: &str) -> Result<Value> {
        self.invoke(&format!("get_{}", name), &mut [])
    }

    pub fn set_property(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.invoke(&format!("set_{}", name), &mut [value.into()])?;
        Ok(())
    }

    pub fn get_index(&self, index: &[Value]) -> Result<Value> {
        let mut args = index.to_vec();
        self.invoke("get_Item", &mut args)
    }

    pub fn set_index(&self, index: &[Value], value: impl Into<Value>) -> Result<()> {
        let mut args = index.to_vec();
        args.push(value.into());
        self.invoke("set_Item", &mut args)?;
        Ok(())
    }

    pub fn add_handler(&self, event: &str, handler: Value) -> Result<()> {
        self.invoke(&format!("add_{}", event), &mut [handler])?;
        Ok(())
    }

    pub fn remove_handler(&self, event: &str, handler: Value) -> Result<()> {
        self.invoke(&format!("remove_{}", event), &mut [handler])?;
        Ok(())
    }

    /// Pick the (entry, declaration) a call by name refers to
    fn resolve(&self, name: &str, generic_count: usize, args: &[Value]) -> Result<(usize, usize)> {
        let implementation = &self.state.implementation;
        let named = implementation.lookup(name);
        if named.is_empty() {
            return Err(ProxyError::MemberNotFound {
                implementation: implementation.name().to_string(),
                member: name.to_string(),
            });
        }

        let candidates: Vec<(usize, usize)> = named
            .iter()
            .copied()
            .filter(|(e, _)| {
                let signature = &implementation.entries()[*e].signature;
                signature.params.len() == args.len() && signature.generic_arity == generic_count
            })
            .collect();

        match candidates.len() {
            0 => Err(ProxyError::ArgumentMismatch {
                method: name.to_string(),
                detail: format!(
                    "no overload takes {} argument(s) and {} generic argument(s)",
                    args.len(),
                    generic_count
                ),
            }),
            1 => Ok(candidates[0]),
            _ => {
                let fitting: Vec<(usize, usize)> = candidates
                    .iter()
                    .copied()
                    .filter(|(e, _)| arguments_fit(&implementation.entries()[*e], args))
                    .collect();
                if fitting.len() == 1 {
                    Ok(fitting[0])
                } else {
                    Err(ProxyError::AmbiguousMember {
                        implementation: implementation.name().to_string(),
                        member: name.to_string(),
                        candidates: candidates.len(),
                    })
                }
            }
        }
    }

    /// Implementer a routing resolves to on this instance
    fn resolve_target(&self, entry: &DispatchEntry) -> Option<Arc<dyn Target>> {
        match &entry.routing {
            Routing::Target => self.target(),
            Routing::TargetIfImplements(capability) => {
                self.target().filter(|t| t.implements(capability))
            }
            Routing::Mixin(position) => self.state.mixins.get(*position).cloned(),
            Routing::Base if entry.is_abstract => None,
            Routing::Base => self.state.base.clone(),
            Routing::None => None,
        }
    }

    fn call_entry(
        &self,
        entry_index: usize,
        declaration: usize,
        generic_args: &[TypeRef],
        args: &mut [Value],
    ) -> Result<Value> {
        let implementation = &self.state.implementation;
        let entry = &implementation.entries()[entry_index];
        let method = ConcreteMethod::close(
            Arc::clone(&entry.declarations[declaration]),
            generic_args,
        )?;
        let slots = entry.shim.prepare(&method, args)?;
        let target = self.resolve_target(entry);

        if !entry.intercepted {
            trace!("Forwarding {} directly", method);
            let target = match target {
                Some(target) => target,
                None => {
                    return Err(ProxyError::NoTargetToProceed {
                        method: method.to_string(),
                    })
                }
            };
            let mut slots = slots;
            let outcome = target.invoke(&method, &mut slots);
            entry.shim.copy_back(&slots, args);
            let value = outcome.map_err(ProxyError::from_target)?;
            let slot = if method.is_void() { None } else { Some(value) };
            return entry.shim.settle(&method, slot);
        }

        let interceptors = match &self.state.selector {
            Some(selector) => {
                let target_type = target.as_ref().map(|t| t.type_info().clone());
                selector.select(target_type.as_ref(), &method, &self.state.interceptors)
            }
            None => self.state.interceptors.clone(),
        };
        metrics::counter!(INTERCEPTED_CALLS).increment(1);

        let retargetable = implementation.kind().allows_retargeting()
            && matches!(
                entry.routing,
                Routing::Target | Routing::TargetIfImplements(_)
            );
        let frame = Frame::new(
            self.clone(),
            method.clone(),
            slots,
            interceptors,
            target,
            retargetable,
        );

        let outcome = executor::execute(&frame);
        entry.shim.copy_back(&frame.take_arguments(), args);
        outcome?;
        entry.shim.settle(&method, frame.take_return_value())
    }
}

/// Whether the argument values plausibly match an overload's parameter types
fn arguments_fit(entry: &DispatchEntry, args: &[Value]) -> bool {
    entry
        .signature
        .params
        .iter()
        .zip(args)
        .all(|(param, value)| param.direction.copies_back() || value_fits(&param.ty, value))
}

fn value_fits(ty: &TypeRef, value: &Value) -> bool {
    if ty.is_open() || ty.is_root() {
        return true;
    }
    match value {
        Value::Bool(_) => ty.full_name == "bool",
        Value::Int(_) => matches!(
            ty.full_name.as_str(),
            "int" | "long" | "short" | "byte" | "uint" | "ulong"
        ),
        Value::Float(_) => matches!(ty.full_name.as_str(), "double" | "float" | "decimal"),
        Value::Str(_) => matches!(ty.full_name.as_str(), "string" | "char"),
        Value::Null | Value::List(_) | Value::Object(_) => !ty.is_value(),
    }
}

fn ensure_implements(target: &Arc<dyn Target>, contract: &ContractDescriptor) -> Result<()> {
    if target.implements(&contract.type_ref) {
        Ok(())
    } else {
        Err(ProxyError::InvalidTarget(format!(
            "{} does not implement {}",
            target.type_info(),
            contract.type_ref
        )))
    }
}

impl Target for ProxyInstance {
    fn type_info(&self) -> &TypeRef {
        self.state.implementation.type_ref()
    }

    fn capabilities(&self) -> &[Arc<ContractDescriptor>] {
        self.state.implementation.capabilities()
    }

    fn invoke(&self, method: &ConcreteMethod, args: &mut [Value]) -> anyhow::Result<Value> {
        self.invoke_member(&method.identity, &method.generic_args, args)
            .map_err(anyhow::Error::new)
    }

    fn as_proxy(&self) -> Option<&ProxyInstance> {
        Some(self)
    }
}

impl PartialEq for ProxyInstance {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for ProxyInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyInstance")
            .field("implementation", &self.state.implementation.name())
            .field(
                "target",
                &self.target().map(|t| t.type_info().to_string()),
            )
            .field("interceptors", &self.state.interceptors.len())
            .field("mixins", &self.state.mixins.len())
            .finish()
    }
}

/// Builder returned by [`Implementation::instantiate`]
pub struct InstanceBuilder {
    implementation: Arc<Implementation>,
    target: Option<Arc<dyn Target>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    mixins: Vec<Arc<dyn Target>>,
    selector: Option<Arc<dyn InterceptorSelector>>,
    constructor_args: Vec<Value>,
}

impl Implementation {
    /// Start building an instance of this implementation
    pub fn instantiate(self: &Arc<Self>) -> InstanceBuilder {
        InstanceBuilder {
            implementation: Arc::clone(self),
            target: None,
            interceptors: Vec::new(),
            mixins: Vec::new(),
            selector: None,
            constructor_args: Vec::new(),
        }
    }
}

impl InstanceBuilder {
    pub fn target(mut self, target: Arc<dyn Target>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn interceptors(mut self, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        self.interceptors = interceptors;
        self
    }

    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn mixins(mut self, mixins: Vec<Arc<dyn Target>>) -> Self {
        self.mixins = mixins;
        self
    }

    pub fn selector(mut self, selector: Option<Arc<dyn InterceptorSelector>>) -> Self {
        self.selector = selector;
        self
    }

    /// Arguments passed to the base type's activator
    pub fn constructor_args(mut self, args: Vec<Value>) -> Self {
        self.constructor_args = args;
        self
    }

    pub fn build(self) -> Result<ProxyInstance> {
        let implementation = self.implementation;
        let contract = Arc::clone(implementation.contract());
        let kind = implementation.kind();

        match kind {
            ProxyKind::InterfaceWithoutTarget | ProxyKind::Class => {
                if self.target.is_some() {
                    return Err(ProxyError::InvalidTarget(format!(
                        "{} is a {:?} proxy and does not take a target",
                        implementation.name(),
                        kind
                    )));
                }
            }
            ProxyKind::InterfaceWithTarget | ProxyKind::ClassWithTarget => {
                let target = self.target.as_ref().ok_or_else(|| {
                    ProxyError::InvalidTarget(format!(
                        "{} requires a target implementing {}",
                        implementation.name(),
                        contract.type_ref
                    ))
                })?;
                ensure_implements(target, &contract)?;
                if let Some(expected) = &implementation.shape().target_type {
                    if target.type_info() != expected {
                        return Err(ProxyError::InvalidTarget(format!(
                            "{} was generated for targets of type {}, got {}",
                            implementation.name(),
                            expected,
                            target.type_info()
                        )));
                    }
                }
            }
            ProxyKind::InterfaceWithTargetInterface => {
                if let Some(target) = &self.target {
                    ensure_implements(target, &contract)?;
                }
            }
        }

        let registry = MixinRegistry::new(&self.mixins, Some(contract.as_ref()))?;
        if registry.capability_types() != implementation.shape().mixins {
            return Err(ProxyError::InvalidTarget(format!(
                "mixin instances provide {:?}, {} expects {:?}",
                registry.capability_types(),
                implementation.name(),
                implementation.shape().mixins
            )));
        }

        let base = match kind {
            ProxyKind::ClassWithTarget => None,
            _ => Some(create_base(&implementation, &self.constructor_args)?),
        };

        debug!(
            "Instantiated {} with {} interceptor(s)",
            implementation.name(),
            self.interceptors.len()
        );

        Ok(ProxyInstance {
            state: Arc::new(InstanceState {
                target: RwLock::new(self.target),
                interceptors: self.interceptors,
                mixins: registry.instances(),
                base,
                selector: self.selector,
                implementation,
            }),
        })
    }
}

/// Base object: built by the base type's activator, or a default object
fn create_base(implementation: &Implementation, args: &[Value]) -> Result<Arc<dyn Target>> {
    match implementation.base_type() {
        Some(base_type) => match &base_type.activator {
            Some(activator) => activator(args).map_err(ProxyError::from_target),
            None => Ok(DelegateTarget::new(base_type.type_ref.clone()).shared()),
        },
        None => Ok(DelegateTarget::new(implementation.type_ref().clone()).shared()),
    }
}
