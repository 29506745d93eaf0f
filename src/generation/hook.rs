// src/generation/hook.rs
//! Generation hook
//!
//! The hook decides, member by member, whether calls are routed through the
//! interceptor chain. It is consulted only while an implementation is built;
//! cached implementations are shared between requests whose hooks compare
//! equal (see [`HookIdentity`]).

use crate::contract::descriptor::MemberDescriptor;
use crate::contract::types::TypeRef;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Filters the members of a generated implementation
pub trait GenerationHook: Send + Sync {
    /// Whether calls to `member` are intercepted
    fn should_intercept(&self, declaring: &TypeRef, member: &MemberDescriptor) -> bool;

    /// Notification for members that can never be intercepted
    fn non_interceptable(&self, _declaring: &TypeRef, _member: &MemberDescriptor) {}

    /// Called once every member has been inspected
    fn inspection_complete(&self) {}

    /// Value used to compare hooks across requests; `None` compares by identity
    fn equality_key(&self) -> Option<String> {
        None
    }
}

/// Intercepts every member except those declared on the root object type
#[derive(Debug, Clone, Copy, Default)]
pub struct AllMethodsHook;

impl GenerationHook for AllMethodsHook {
    fn should_intercept(&self, declaring: &TypeRef, _member: &MemberDescriptor) -> bool {
        !declaring.is_root()
    }

    fn equality_key(&self) -> Option<String> {
        Some("AllMethodsHook".to_string())
    }
}

/// Hook backed by a predicate
pub struct PredicateHook<F> {
    predicate: F,
    key: Option<String>,
}

impl<F> PredicateHook<F>
where
    F: Fn(&TypeRef, &MemberDescriptor) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self {
            predicate,
            key: None,
        }
    }

    /// Give the hook value semantics so equal predicates share implementations
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

impl<F> GenerationHook for PredicateHook<F>
where
    F: Fn(&TypeRef, &MemberDescriptor) -> bool + Send + Sync,
{
    fn should_intercept(&self, declaring: &TypeRef, member: &MemberDescriptor) -> bool {
        !declaring.is_root() && (self.predicate)(declaring, member)
    }

    fn equality_key(&self) -> Option<String> {
        self.key.clone()
    }
}

/// Hook as it participates in a shape key
#[derive(Clone)]
pub struct HookIdentity {
    hook: Arc<dyn GenerationHook>,
    key: Option<String>,
}

impl HookIdentity {
    pub fn new(hook: &Arc<dyn GenerationHook>) -> Self {
        Self {
            hook: Arc::clone(hook),
            key: hook.equality_key(),
        }
    }

    pub fn hook(&self) -> &Arc<dyn GenerationHook> {
        &self.hook
    }

    fn address(&self) -> usize {
        Arc::as_ptr(&self.hook) as *const () as usize
    }

    /// Stable description for logs and snapshots
    pub fn describe(&self) -> String {
        match &self.key {
            Some(key) => key.clone(),
            None => format!("hook@{:#x}", self.address()),
        }
    }
}

impl PartialEq for HookIdentity {
    fn eq(&self, other: &Self) -> bool {
        match (&self.key, &other.key) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.address() == other.address(),
            _ => false,
        }
    }
}

impl Eq for HookIdentity {}

impl Hash for HookIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.key {
            Some(key) => {
                0u8.hash(state);
                key.hash(state);
            }
            None => {
                1u8.hash(state);
                self.address().hash(state);
            }
        }
    }
}

impl fmt::Debug for HookIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HookIdentity({})", self.describe())
    }
}
