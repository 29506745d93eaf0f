// src/proxy/mod.rs
//! Proxy objects
//!
//! - **Target**: the object-side contract every implementer satisfies
//! - **Instance**: live proxies and their dispatch
//! - **Util**: helpers for inspecting and retargeting arbitrary objects

pub mod instance;
pub mod target;
pub mod util;

// Re-export commonly used types
pub use instance::{InstanceBuilder, ProxyInstance};
pub use target::{DelegateTarget, Target};
pub use util::{change_target, get_interceptors, get_target, is_proxy, unproxied_type};
