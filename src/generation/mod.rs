// src/generation/mod.rs
//! Proxy generation
//!
//! Turns a generation request into a cached, reusable [`Implementation`]:
//!
//! - **Options**: hook, selector, mixins, attributes and base type
//! - **Shape**: canonical cache key derived from a request
//! - **Mixin**: position-stable capability layout
//! - **Emitter**: member collection, routing and dispatch table construction
//! - **Cache**: build-once-per-shape [`ProxyScope`]
//! - **Generator**: validation and the public `create_*` entry points

pub mod cache;
pub mod emitter;
pub mod generator;
pub mod hook;
pub mod mixin;
pub mod options;
pub mod selector;
pub mod shape;

// Re-export commonly used types
pub use cache::ProxyScope;
pub use emitter::{DispatchEntry, Implementation, ImplementationId, Routing};
pub use generator::{GenerationRequest, ProxyGenerator};
pub use hook::{AllMethodsHook, GenerationHook, PredicateHook};
pub use mixin::MixinRegistry;
pub use options::{AttributeInfo, GenerationOptions};
pub use selector::InterceptorSelector;
pub use shape::{ProxyKind, ProxyShape};
