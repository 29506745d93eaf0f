// src/interception/frame.rs
//! Call frames
//!
//! A [`Frame`] is the mutable record of one in-flight call: argument slots,
//! the return slot, the current invocation target and the interceptor
//! snapshot. Interceptors see the frame through an [`Invocation`], a view
//! fixed at their own position in the chain, so the chain cursor lives on the
//! stack rather than in shared state.
//!
//! Frame state sits behind `parking_lot` mutexes; a frame captured through a
//! [`ProceedInfo`](crate::interception::executor::ProceedInfo) may be resumed
//! from another thread.

use crate::contract::descriptor::ParamDirection;
use crate::contract::signature::ConcreteMethod;
use crate::contract::types::TypeRef;
use crate::interception::interceptor::Interceptor;
use crate::interception::value::Value;
use crate::proxy::instance::ProxyInstance;
use crate::proxy::target::Target;
use crate::utils::errors::{ProxyError, Result};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Frame lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Created,

    /// Interceptor at this position is running
    Intercepting(usize),

    /// The target is being invoked
    Proceeding,
    Completed,
    Faulted,
}

/// Per-call state shared by every level of the chain
pub struct Frame {
    pub(crate) proxy: ProxyInstance,
    pub(crate) method: ConcreteMethod,
    pub(crate) directions: Vec<ParamDirection>,
    pub(crate) interceptors: Vec<Arc<dyn Interceptor>>,
    pub(crate) retargetable: bool,

    pub(crate) arguments: Mutex<Vec<Value>>,

    /// Creation-time values; only kept when a slot is passed by reference
    pub(crate) originals: Option<Vec<Value>>,

    /// `None` until something sets a return value
    pub(crate) return_value: Mutex<Option<Value>>,
    pub(crate) target: Mutex<Option<Arc<dyn Target>>>,

    /// Levels currently executing (interceptor positions, `len` = target)
    pub(crate) running: Mutex<BTreeSet<usize>>,
    pub(crate) phase: Mutex<FramePhase>,
}

impl Frame {
    pub(crate) fn new(
        proxy: ProxyInstance,
        method: ConcreteMethod,
        arguments: Vec<Value>,
        interceptors: Vec<Arc<dyn Interceptor>>,
        target: Option<Arc<dyn Target>>,
        retargetable: bool,
    ) -> Arc<Self> {
        let directions: Vec<ParamDirection> = method
            .identity
            .signature
            .params
            .iter()
            .map(|p| p.direction)
            .collect();
        let originals = if directions.iter().any(ParamDirection::is_by_reference) {
            Some(arguments.clone())
        } else {
            None
        };

        Arc::new(Self {
            proxy,
            method,
            directions,
            interceptors,
            retargetable,
            arguments: Mutex::new(arguments),
            originals,
            return_value: Mutex::new(None),
            target: Mutex::new(target),
            running: Mutex::new(BTreeSet::new()),
            phase: Mutex::new(FramePhase::Created),
        })
    }

    pub(crate) fn set_phase(&self, phase: FramePhase) {
        *self.phase.lock() = phase;
    }

    pub(crate) fn take_arguments(&self) -> Vec<Value> {
        self.arguments.lock().clone()
    }

    pub(crate) fn take_return_value(&self) -> Option<Value> {
        self.return_value.lock().take()
    }

    /// Number of interceptors in the snapshot
    pub fn chain_len(&self) -> usize {
        self.interceptors.len()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("method", &self.method.to_string())
            .field("interceptors", &self.interceptors.len())
            .field("phase", &*self.phase.lock())
            .finish()
    }
}

/// View of a frame from one position in the interceptor chain
#[derive(Clone)]
pub struct Invocation {
    pub(crate) frame: Arc<Frame>,
    pub(crate) position: usize,
}

impl Invocation {
    /// Member being called, closed over the call-site generic arguments
    pub fn method(&self) -> &ConcreteMethod {
        &self.frame.method
    }

    pub fn generic_arguments(&self) -> &[TypeRef] {
        &self.frame.method.generic_args
    }

    /// Position of the interceptor holding this view
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn phase(&self) -> FramePhase {
        *self.frame.phase.lock()
    }

    /// The proxy the call was made on
    pub fn proxy(&self) -> &ProxyInstance {
        &self.frame.proxy
    }

    /// Current target of this call (may differ from the proxy's target)
    pub fn invocation_target(&self) -> Option<Arc<dyn Target>> {
        self.frame.target.lock().clone()
    }

    pub fn target_type(&self) -> Option<TypeRef> {
        self.frame
            .target
            .lock()
            .as_ref()
            .map(|t| t.type_info().clone())
    }

    pub fn arguments(&self) -> Vec<Value> {
        self.frame.arguments.lock().clone()
    }

    /// Writable view of the argument slots
    ///
    /// Writes are seen by the rest of the chain, the target and copy-back.
    /// Drop the guard before calling `proceed`.
    pub fn arguments_mut(&self) -> MappedMutexGuard<'_, [Value]> {
        MutexGuard::map(self.frame.arguments.lock(), |slots| slots.as_mut_slice())
    }

    pub fn argument(&self, index: usize) -> Result<Value> {
        self.frame
            .arguments
            .lock()
            .get(index)
            .cloned()
            .ok_or_else(|| self.index_error(index))
    }

    pub fn set_argument(&self, index: usize, value: Value) -> Result<()> {
        let mut arguments = self.frame.arguments.lock();
        let count = arguments.len();
        match arguments.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ProxyError::ArgumentMismatch {
                method: self.frame.method.to_string(),
                detail: format!("argument index {} out of range (0..{})", index, count),
            }),
        }
    }

    /// Whether slot `index` differs from its value when the call started.
    /// Always `true` for members without by-reference parameters.
    pub fn argument_changed(&self, index: usize) -> Result<bool> {
        let current = self.argument(index)?;
        match &self.frame.originals {
            Some(originals) => Ok(!originals.get(index).map_or(false, |o| o.same_as(&current))),
            None => Ok(true),
        }
    }

    /// Direction of parameter `index`
    pub fn direction(&self, index: usize) -> Option<ParamDirection> {
        self.frame.directions.get(index).copied()
    }

    pub fn return_value(&self) -> Option<Value> {
        self.frame.return_value.lock().clone()
    }

    pub fn set_return_value(&self, value: impl Into<Value>) {
        *self.frame.return_value.lock() = Some(value.into());
    }

    /// Redirect the rest of this call to another target
    pub fn change_invocation_target(&self, target: Option<Arc<dyn Target>>) -> Result<()> {
        if !self.frame.retargetable {
            return Err(ProxyError::InvalidTarget(format!(
                "the invocation target of '{}' can only be changed on proxies with a target interface",
                self.frame.method
            )));
        }
        *self.frame.target.lock() = target;
        Ok(())
    }

    /// Change the proxy's target for subsequent calls; the current call is unaffected
    pub fn change_proxy_target(&self, target: Option<Arc<dyn Target>>) -> Result<()> {
        self.frame.proxy.change_target(target)
    }

    fn index_error(&self, index: usize) -> ProxyError {
        ProxyError::ArgumentMismatch {
            method: self.frame.method.to_string(),
            detail: format!(
                "argument index {} out of range (0..{})",
                index,
                self.frame.directions.len()
            ),
        }
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("method", &self.frame.method.to_string())
            .field("position", &self.position)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::descriptor::{ContractDescriptor, MemberDescriptor};
    use crate::generation::generator::ProxyGenerator;
    use crate::generation::options::GenerationOptions;
    use crate::interception::interceptor::from_fn;
    use crate::proxy::target::DelegateTarget;

    #[test]
    fn test_invocation_exposes_call_state() {
        let contract = ContractDescriptor::interface("Tests.IStore")
            .member(
                MemberDescriptor::method("Put")
                    .param("key", TypeRef::string())
                    .in_param("value", TypeRef::int()),
            )
            .shared();
        let target = DelegateTarget::implementing("Tests.Store", Arc::clone(&contract))
            .on("Put", |_| Ok(Value::Null))
            .shared();
        let observed = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&observed);

        let proxy = ProxyGenerator::new()
            .create_interface_proxy_with_target(
                &contract,
                &[],
                target,
                &GenerationOptions::new(),
                vec![from_fn(move |invocation| {
                    let mut seen = seen.lock();
                    seen.push(format!("{:?}", invocation.direction(1)));
                    seen.push(format!("{:?}", invocation.target_type()));
                    seen.push(invocation.argument(0)?.to_string());
                    seen.push(invocation.argument(2).is_err().to_string());
                    seen.push(invocation.set_argument(5, Value::Null).is_err().to_string());
                    seen.push(invocation.return_value().is_none().to_string());
                    drop(seen);
                    invocation.proceed()
                })],
            )
            .unwrap();

        proxy
            .invoke("Put", &mut [Value::from("answer"), Value::Int(42)])
            .unwrap();
        let observed = observed.lock();
        assert_eq!(observed[0], "Some(In)");
        assert!(observed[1].contains("Tests.Store"));
        assert_eq!(observed[2], "answer");
        assert_eq!(&observed[3..], ["true", "true", "true"]);
    }

    #[test]
    fn test_slot_writes_are_tracked_through_both_paths() {
        let contract = ContractDescriptor::interface("Tests.ICounter")
            .member(MemberDescriptor::method("Bump").ref_param("value", TypeRef::int()))
            .shared();
        let target = DelegateTarget::implementing("Tests.Counter", Arc::clone(&contract))
            .on("Bump", |args| {
                let seen = args[0].as_int().unwrap_or(0);
                args[0] = Value::Int(seen + 1);
                Ok(Value::Null)
            })
            .shared();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&changes);

        let proxy = ProxyGenerator::new()
            .create_interface_proxy_with_target(
                &contract,
                &[],
                target,
                &GenerationOptions::new(),
                vec![from_fn(move |invocation| {
                    let mut recorded = recorded.lock();

                    invocation.arguments_mut()[0] = Value::Int(9);
                    recorded.push(invocation.argument_changed(0)?);
                    invocation.arguments_mut()[0] = Value::Int(4);
                    recorded.push(invocation.argument_changed(0)?);

                    invocation.set_argument(0, Value::Int(9))?;
                    recorded.push(invocation.argument_changed(0)?);
                    invocation.set_argument(0, Value::Int(4))?;
                    recorded.push(invocation.argument_changed(0)?);

                    invocation.arguments_mut()[0] = Value::Int(10);
                    drop(recorded);
                    invocation.proceed()
                })],
            )
            .unwrap();

        let mut args = [Value::Int(4)];
        proxy.invoke("Bump", &mut args).unwrap();
        assert_eq!(*changes.lock(), vec![true, false, true, false]);
        assert_eq!(args[0], Value::Int(11));
    }
}
