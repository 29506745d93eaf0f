// src/interception/interceptor.rs
//! Interceptors
//!
//! - [`Interceptor`]: the chain element trait
//! - [`from_fn`]: closure adapter
//! - [`StandardInterceptor`]: pre / perform / post template
//! - [`LoggingInterceptor`]: traces every call it sees

use crate::interception::frame::Invocation;
use crate::utils::errors::Result;
use std::sync::Arc;
use tracing::{debug, warn};

/// One element of an interceptor chain
pub trait Interceptor: Send + Sync {
    /// Handle the call. Call [`Invocation::proceed`] to continue down the
    /// chain, or set a return value and return without proceeding.
    fn intercept(&self, invocation: &Invocation) -> Result<()>;
}

/// Interceptor backed by a closure
pub struct FnInterceptor<F>(F);

impl<F> Interceptor for FnInterceptor<F>
where
    F: Fn(&Invocation) -> Result<()> + Send + Sync,
{
    fn intercept(&self, invocation: &Invocation) -> Result<()> {
        (self.0)(invocation)
    }
}

/// Wrap a closure as a shared interceptor
pub fn from_fn<F>(intercept: F) -> Arc<dyn Interceptor>
where
    F: Fn(&Invocation) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(FnInterceptor(intercept))
}

/// Stages of a [`StandardInterceptor`]
pub trait InterceptionStages: Send + Sync {
    fn pre_proceed(&self, _invocation: &Invocation) -> Result<()> {
        Ok(())
    }

    fn perform_proceed(&self, invocation: &Invocation) -> Result<()> {
        invocation.proceed()
    }

    /// Runs only when the earlier stages succeeded
    fn post_proceed(&self, _invocation: &Invocation) -> Result<()> {
        Ok(())
    }
}

/// Template interceptor running pre, perform and post stages in order
pub struct StandardInterceptor<S>(pub S);

impl<S: InterceptionStages> Interceptor for StandardInterceptor<S> {
    fn intercept(&self, invocation: &Invocation) -> Result<()> {
        self.0.pre_proceed(invocation)?;
        self.0.perform_proceed(invocation)?;
        self.0.post_proceed(invocation)
    }
}

/// Proceeds unconditionally
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl Interceptor for PassThrough {
    fn intercept(&self, invocation: &Invocation) -> Result<()> {
        invocation.proceed()
    }
}

/// Logs member, arguments and outcome of every call
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

impl Interceptor for LoggingInterceptor {
    fn intercept(&self, invocation: &Invocation) -> Result<()> {
        debug!(
            "Calling {} with {:?}",
            invocation.method(),
            invocation.arguments()
        );
        match invocation.proceed() {
            Ok(()) => {
                debug!(
                    "{} returned {:?}",
                    invocation.method(),
                    invocation.return_value()
                );
                Ok(())
            }
            Err(e) => {
                warn!("{} failed: {}", invocation.method(), e);
                Err(e)
            }
        }
    }
}
