// src/proxy/util.rs
//! Helpers for code that receives objects without knowing whether they are proxies

use crate::contract::descriptor::ContractDescriptor;
use crate::contract::signature::MethodIdentity;
use crate::contract::types::TypeRef;
use crate::generation::shape::ProxyKind;
use crate::interception::interceptor::Interceptor;
use crate::interception::value::Value;
use crate::proxy::instance::ProxyInstance;
use crate::proxy::target::Target;
use crate::utils::errors::{ProxyError, Result};
use std::sync::Arc;

/// Whether `object` is a generated proxy
pub fn is_proxy(object: &dyn Target) -> bool {
    object.as_proxy().is_some()
}

/// Current target of a proxy; `None` for plain objects and target-less proxies
pub fn get_target(object: &dyn Target) -> Option<Arc<dyn Target>> {
    object.as_proxy().and_then(|proxy| proxy.target())
}

/// Interceptors attached to a proxy
pub fn get_interceptors(object: &dyn Target) -> Option<Vec<Arc<dyn Interceptor>>> {
    object
        .as_proxy()
        .map(|proxy| proxy.interceptors().to_vec())
}

/// Replace the target of a target-interface proxy
pub fn change_target(object: &dyn Target, target: Option<Arc<dyn Target>>) -> Result<()> {
    match object.as_proxy() {
        Some(proxy) => proxy.change_target(target),
        None => Err(ProxyError::InvalidTarget(format!(
            "{} is not a proxy",
            object.type_info()
        ))),
    }
}

/// Type of the object a proxy stands in for
///
/// Class proxies report their proxied class; proxies with a target report the
/// target's unproxied type, following chains of proxies. Target-less interface
/// proxies report their base type. Plain objects report their own type.
pub fn unproxied_type(object: &dyn Target) -> TypeRef {
    let proxy = match object.as_proxy() {
        Some(proxy) => proxy,
        None => return object.type_info().clone(),
    };

    let implementation = proxy.implementation();
    match implementation.kind() {
        ProxyKind::Class => implementation.contract().type_ref.clone(),
        ProxyKind::ClassWithTarget
        | ProxyKind::InterfaceWithTarget
        | ProxyKind::InterfaceWithTargetInterface => match proxy.target() {
            Some(target) => unproxied_type(target.as_ref()),
            None => base_or_root(proxy.implementation().base_type().map(|b| b.type_ref.clone())),
        },
        ProxyKind::InterfaceWithoutTarget => {
            base_or_root(implementation.base_type().map(|b| b.type_ref.clone()))
        }
    }
}

/// Callable bound to the `Invoke` member a proxy gained from a delegate mixin
///
/// Calls go through the proxy's interceptors like any other member call.
pub fn delegate_to_mixin(
    proxy: &ProxyInstance,
    delegate_type: &ContractDescriptor,
) -> Result<impl Fn(&mut [Value]) -> Result<Value> + Send + Sync + 'static> {
    let invoke = delegate_type
        .invoke_member()
        .ok_or_else(|| ProxyError::InvalidContract {
            type_name: delegate_type.type_ref.to_string(),
            reason: "not a delegate type".to_string(),
        })?;
    let implementation = proxy.implementation();
    if !implementation
        .mixin_capabilities()
        .iter()
        .any(|c| c.type_ref == delegate_type.type_ref)
    {
        return Err(ProxyError::MemberNotFound {
            implementation: implementation.name().to_string(),
            member: format!("{}.Invoke", delegate_type.type_ref),
        });
    }

    let identity = MethodIdentity::new(delegate_type, invoke);
    let proxy = proxy.clone();
    Ok(move |args: &mut [Value]| proxy.invoke_member(&identity, &[], args))
}

fn base_or_root(base: Option<TypeRef>) -> TypeRef {
    base.unwrap_or_else(TypeRef::object)
}
