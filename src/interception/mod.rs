// src/interception/mod.rs
//! Call interception layer
//!
//! Everything that happens once a call has entered a proxy:
//!
//! - **Value**: uniform argument and return representation
//! - **Frame**: per-call mutable state and the interceptor-facing view
//! - **Executor**: proceed semantics and captured continuations
//! - **Interceptor**: chain element trait and stock interceptors
//!
//! # Architecture
//!
//! ```text
//! ProxyInstance::invoke
//!     │
//!     ├─ not intercepted → target / mixin / base (direct)
//!     └─ intercepted → Frame → interceptor[0] → ... → interceptor[n-1] → target
//! ```

pub mod executor;
pub mod frame;
pub mod interceptor;
pub mod value;

// Re-export commonly used types
pub use executor::ProceedInfo;
pub use frame::{FramePhase, Invocation};
pub use interceptor::{
    from_fn, InterceptionStages, Interceptor, LoggingInterceptor, PassThrough, StandardInterceptor,
};
pub use value::{ObjectRef, Value};
