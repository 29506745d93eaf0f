// src/generation/selector.rs
//! Per-call interceptor selection

use crate::contract::signature::ConcreteMethod;
use crate::contract::types::TypeRef;
use crate::interception::interceptor::Interceptor;
use std::sync::Arc;

/// Chooses which interceptors run for one intercepted call
///
/// `target_type` is the type of the concrete target, mixin or base object
/// the call is routed to, or `None` when the call has nothing to proceed to.
pub trait InterceptorSelector: Send + Sync {
    fn select(
        &self,
        target_type: Option<&TypeRef>,
        method: &ConcreteMethod,
        interceptors: &[Arc<dyn Interceptor>],
    ) -> Vec<Arc<dyn Interceptor>>;
}

/// Selector backed by a closure
pub struct FnSelector<F>(F);

impl<F> InterceptorSelector for FnSelector<F>
where
    F: Fn(Option<&TypeRef>, &ConcreteMethod, &[Arc<dyn Interceptor>]) -> Vec<Arc<dyn Interceptor>>
        + Send
        + Sync,
{
    fn select(
        &self,
        target_type: Option<&TypeRef>,
        method: &ConcreteMethod,
        interceptors: &[Arc<dyn Interceptor>],
    ) -> Vec<Arc<dyn Interceptor>> {
        (self.0)(target_type, method, interceptors)
    }
}

/// Wrap a closure as a shared selector
pub fn from_fn<F>(select: F) -> Arc<dyn InterceptorSelector>
where
    F: Fn(Option<&TypeRef>, &ConcreteMethod, &[Arc<dyn Interceptor>]) -> Vec<Arc<dyn Interceptor>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnSelector(select))
}
