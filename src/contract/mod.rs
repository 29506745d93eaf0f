// src/contract/mod.rs
//! Type and contract model
//!
//! - **Types**: comparable, hashable type references
//! - **Descriptors**: caller-supplied contracts and their members
//! - **Signature**: normalized signatures, validation and the member table

pub mod descriptor;
pub mod signature;
pub mod types;

// Re-export commonly used types
pub use descriptor::{
    Activator, ContractDescriptor, MemberDescriptor, MemberKind, ParamDescriptor, ParamDirection,
};
pub use signature::{ConcreteMethod, MemberSignature, MemberTable, MethodIdentity};
pub use types::{TypeKind, TypeRef, Visibility};
