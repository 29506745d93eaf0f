// src/proxy/target.rs
//! Call targets
//!
//! A [`Target`] is anything a dispatch entry can route to: the main target of
//! a proxy, a mixin instance, the base object of a class proxy, or another
//! proxy. [`DelegateTarget`] assembles one from closures keyed by member name.

use crate::contract::descriptor::ContractDescriptor;
use crate::contract::signature::ConcreteMethod;
use crate::contract::types::TypeRef;
use crate::interception::value::Value;
use crate::proxy::instance::ProxyInstance;
use anyhow::anyhow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Object that can receive member calls
pub trait Target: Send + Sync {
    /// Concrete type of the object
    fn type_info(&self) -> &TypeRef;

    /// Capabilities the object implements directly
    fn capabilities(&self) -> &[Arc<ContractDescriptor>];

    /// Whether the object implements `capability` (directly or through a base)
    fn implements(&self, capability: &TypeRef) -> bool {
        self.type_info() == capability
            || self
                .capabilities()
                .iter()
                .any(|c| c.is_or_derives_from(capability))
    }

    /// Invoke a member; by-reference slots in `args` are updated in place
    fn invoke(&self, method: &ConcreteMethod, args: &mut [Value]) -> anyhow::Result<Value>;

    /// Downcast hook for proxies
    fn as_proxy(&self) -> Option<&ProxyInstance> {
        None
    }
}

type Handler = Arc<dyn Fn(&ConcreteMethod, &mut [Value]) -> anyhow::Result<Value> + Send + Sync>;

/// Target assembled from per-member closures
///
/// Handlers are looked up by `"Declaring.Member"` first, then by the simple
/// member name. `ToString`, `GetHashCode` and `Equals` fall back to
/// identity-based defaults.
#[derive(Clone)]
pub struct DelegateTarget {
    type_info: TypeRef,
    capabilities: Vec<Arc<ContractDescriptor>>,
    handlers: HashMap<String, Handler>,
}

impl DelegateTarget {
    pub fn new(type_info: TypeRef) -> Self {
        Self {
            type_info,
            capabilities: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    /// Target of the given class type implementing `capability`
    pub fn implementing(type_name: &str, capability: Arc<ContractDescriptor>) -> Self {
        Self::new(TypeRef::class(type_name)).with_capability(capability)
    }

    /// Instance of a delegate type; `Invoke` runs `body`
    pub fn delegate<F>(capability: Arc<ContractDescriptor>, body: F) -> Self
    where
        F: Fn(&mut [Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::delegate_type(capability).on("Invoke", body)
    }

    /// Placeholder for a delegate type with no body; interceptors must
    /// supply every result
    pub fn delegate_type(capability: Arc<ContractDescriptor>) -> Self {
        Self::new(capability.type_ref.clone()).with_capability(capability)
    }

    pub fn with_capability(mut self, capability: Arc<ContractDescriptor>) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Register a handler that only needs the arguments
    pub fn on<F>(self, member: &str, handler: F) -> Self
    where
        F: Fn(&mut [Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.on_method(member, move |_, args| handler(args))
    }

    /// Register a handler that also receives the concrete member
    pub fn on_method<F>(mut self, member: &str, handler: F) -> Self
    where
        F: Fn(&ConcreteMethod, &mut [Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.handlers.insert(member.to_string(), Arc::new(handler));
        self
    }

    pub fn shared(self) -> Arc<dyn Target> {
        Arc::new(self)
    }

    /// Whether `other` is this object, or a proxy whose base object is this one
    fn is_same(&self, other: &Value) -> bool {
        let me = self as *const Self as *const ();
        let object = match other.as_object() {
            Some(object) => object,
            None => return false,
        };
        if let Some(target) = object.downcast_ref::<DelegateTarget>() {
            return target as *const Self as *const () == me;
        }
        object
            .downcast_ref::<ProxyInstance>()
            .and_then(|proxy| proxy.base())
            .map_or(false, |base| Arc::as_ptr(base) as *const () == me)
    }

    fn handler_for(&self, method: &ConcreteMethod) -> Option<&Handler> {
        self.handlers
            .get(&method.identity.namespaced_name())
            .or_else(|| self.handlers.get(method.name()))
    }
}

impl Target for DelegateTarget {
    fn type_info(&self) -> &TypeRef {
        &self.type_info
    }

    fn capabilities(&self) -> &[Arc<ContractDescriptor>] {
        &self.capabilities
    }

    fn invoke(&self, method: &ConcreteMethod, args: &mut [Value]) -> anyhow::Result<Value> {
        if let Some(handler) = self.handler_for(method) {
            return handler(method, args);
        }
        match method.name() {
            "ToString" => Ok(Value::Str(self.type_info.full_name.clone())),
            "GetHashCode" => Ok(Value::Int(self as *const Self as usize as i64)),
            "Equals" => Ok(Value::Bool(args.first().map_or(false, |other| self.is_same(other)))),
            member => Err(anyhow!("{} does not implement {}", self.type_info, member)),
        }
    }
}

impl fmt::Debug for DelegateTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut members: Vec<_> = self.handlers.keys().collect();
        members.sort();
        f.debug_struct("DelegateTarget")
            .field("type_info", &self.type_info.to_string())
            .field("members", &members)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::descriptor::MemberDescriptor;
    use crate::contract::signature::MethodIdentity;

    fn calc() -> Arc<ContractDescriptor> {
        ContractDescriptor::interface("Tests.ICalc")
            .member(
                MemberDescriptor::method("Sum")
                    .param("a", TypeRef::int())
                    .param("b", TypeRef::int())
                    .returns(TypeRef::int()),
            )
            .member(MemberDescriptor::method("Reset"))
            .shared()
    }

    fn method(contract: &ContractDescriptor, index: usize) -> ConcreteMethod {
        let identity = Arc::new(MethodIdentity::new(contract, &contract.members[index]));
        ConcreteMethod::close(identity, &[]).unwrap()
    }

    #[test]
    fn test_dispatch_by_name() {
        let contract = calc();
        let target = DelegateTarget::implementing("Tests.Calc", Arc::clone(&contract)).on("Sum", |args| {
            Ok(Value::Int(args[0].as_int().unwrap_or(0) + args[1].as_int().unwrap_or(0)))
        });

        let mut args = vec![Value::from(2), Value::from(3)];
        assert_eq!(target.invoke(&method(&contract, 0), &mut args).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_namespaced_handler_wins() {
        let contract = calc();
        let target = DelegateTarget::implementing("Tests.Calc", Arc::clone(&contract))
            .on("Sum", |_| Ok(Value::Int(1)))
            .on("Tests.ICalc.Sum", |_| Ok(Value::Int(2)));

        let mut args = vec![Value::from(0), Value::from(0)];
        assert_eq!(target.invoke(&method(&contract, 0), &mut args).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_missing_member_faults() {
        let contract = calc();
        let target = DelegateTarget::implementing("Tests.Calc", Arc::clone(&contract));
        let err = target.invoke(&method(&contract, 1), &mut []).unwrap_err();
        assert_eq!(err.to_string(), "Tests.Calc does not implement Reset");
    }

    #[test]
    fn test_equals_defaults_to_identity() {
        let root = crate::contract::signature::root_contract();
        let equals = method(&root, 0);
        let target = Arc::new(DelegateTarget::new(TypeRef::class("Tests.Plain")));
        let same = Value::Object(crate::interception::value::ObjectRef::from_arc(Arc::clone(&target)));
        let other = Value::object(DelegateTarget::new(TypeRef::class("Tests.Plain")));

        assert_eq!(target.invoke(&equals, &mut [same]).unwrap(), Value::Bool(true));
        assert_eq!(target.invoke(&equals, &mut [other]).unwrap(), Value::Bool(false));
        assert_eq!(target.invoke(&equals, &mut [Value::Null]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_implements_through_bases() {
        let base = calc();
        let derived = ContractDescriptor::interface("Tests.IScientific")
            .extends(Arc::clone(&base))
            .shared();
        let target = DelegateTarget::implementing("Tests.Scientific", derived);

        assert!(target.implements(&base.type_ref));
        assert!(target.implements(&TypeRef::class("Tests.Scientific")));
        assert!(!target.implements(&TypeRef::interface("Tests.IOther")));
    }
}
