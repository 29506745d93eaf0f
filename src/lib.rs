// src/lib.rs
//! Interpose: dynamic proxies built from dispatch tables
//!
//! This library generates proxy implementations of caller-described
//! contracts at runtime and routes every call through a chain of
//! interceptors before it reaches a target, a mixin or a base object.
//!
//! # Architecture
//!
//! The library is structured into several key modules:
//!
//! - **contract**: type references, contract descriptors, signatures
//! - **generation**: shapes, member collection, dispatch tables, the shape cache
//! - **interception**: call frames, proceed semantics, interceptors
//! - **proxy**: proxy instances, targets and introspection helpers
//! - **persistence**: serializable snapshots of a proxy scope
//! - **observability**: tracing setup, cache events, metrics
//! - **utils**: errors and configuration
//!
//! # Example
//!
//! ```ignore
//! let generator = ProxyGenerator::new();
//! let proxy = generator.create_interface_proxy_with_target(
//!     &contract, &[], target, &GenerationOptions::new(), vec![Arc::new(LoggingInterceptor)],
//! )?;
//! let sum = proxy.invoke("Sum", &mut [Value::from(2), Value::from(3)])?;
//! ```

// Public module exports
pub mod contract;
pub mod generation;
pub mod interception;
pub mod observability;
pub mod persistence;
pub mod proxy;
pub mod utils;

// Re-export commonly used types
pub use contract::{ContractDescriptor, MemberDescriptor, TypeRef};
pub use generation::{GenerationOptions, ProxyGenerator, ProxyKind, ProxyScope};
pub use interception::{Interceptor, Invocation, ProceedInfo, Value};
pub use proxy::{DelegateTarget, ProxyInstance, Target};
pub use utils::config::InterposeConfig;
pub use utils::errors::{ProxyError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
