// src/utils/errors.rs
//! Error taxonomy for proxy generation and call dispatch
//!
//! Generation-time errors (`InvalidContract`, `InaccessibleType`,
//! `AmbiguousMixin`) are raised synchronously when a proxy is requested.
//! Call-time errors are raised at the point the executor detects them.
//! Faults raised by targets or interceptors travel as [`ProxyError::Fault`].

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, ProxyError>;

#[derive(Error, Debug)]
pub enum ProxyError {
    /// The contract cannot be implemented (open generic, wrong kind, sealed)
    #[error("Can not create proxy for type {type_name}: {reason}")]
    InvalidContract { type_name: String, reason: String },

    /// The contract or one of its generic arguments is not visible
    #[error("{}", inaccessible_message(.contract, .offending))]
    InaccessibleType { contract: String, offending: String },

    /// Two distinct mixin instances expose the same capability
    #[error(
        "The mixin {second} adds the capability '{capability}' which is already \
         provided by the mixin {first}. Mixins must not overlap"
    )]
    AmbiguousMixin {
        capability: String,
        first: String,
        second: String,
    },

    /// Two delegate mixins expose `Invoke` with the same call shape
    #[error(
        "The delegate mixins {first} and {second} both expose Invoke({signature}). \
         Delegate mixins must have distinct signatures"
    )]
    AmbiguousDelegateMixin {
        first: String,
        second: String,
        signature: String,
    },

    /// Proceed reached the end of the chain without a target or return value
    #[error(
        "The interceptor attempted to 'Proceed' for method '{method}' which has no target. \
         When calling a method without target there is no implementation to 'proceed' to \
         and it is the responsibility of the interceptor to mimic the implementation \
         (set return value, out arguments etc)"
    )]
    NoTargetToProceed { method: String },

    /// A value-returning call completed without a return value or a fault
    #[error(
        "Interceptors failed to set a return value, or swallowed the exception thrown \
         by the target, for method '{method}'"
    )]
    InterceptorContractViolation { method: String },

    /// A captured proceed token or proceed call re-entered a running segment
    #[error("Not a valid point to proceed for method '{method}': {reason}")]
    NotAValidProceedPoint { method: String, reason: String },

    #[error("Member '{member}' is not exposed by {implementation}")]
    MemberNotFound { implementation: String, member: String },

    #[error("Call to '{member}' on {implementation} matches {candidates} members; use the namespaced name")]
    AmbiguousMember {
        implementation: String,
        member: String,
        candidates: usize,
    },

    #[error("Invalid call to '{method}': {detail}")]
    ArgumentMismatch { method: String, detail: String },

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Error raised by a target, mixin, base object or interceptor
    #[error("{0}")]
    Fault(anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Observability initialisation failed: {0}")]
    Observability(String),
}

fn inaccessible_message(contract: &str, offending: &str) -> String {
    if contract == offending {
        format!(
            "Can not create proxy for type {} because it is not accessible. Make it public, or internal",
            contract
        )
    } else {
        format!(
            "Can not create proxy for type {} because type {} is not accessible. Make it public, or internal",
            contract, offending
        )
    }
}

impl ProxyError {
    /// Wrap an arbitrary error raised by user code as a fault
    pub fn fault(error: impl Into<anyhow::Error>) -> Self {
        ProxyError::Fault(error.into())
    }

    /// Convert an error coming back from a target, unwrapping nested proxy errors
    pub(crate) fn from_target(error: anyhow::Error) -> Self {
        match error.downcast::<ProxyError>() {
            Ok(inner) => inner,
            Err(other) => ProxyError::Fault(other),
        }
    }

    /// Whether this error originated in user code rather than in the core
    pub fn is_fault(&self) -> bool {
        matches!(self, ProxyError::Fault(_))
    }
}
