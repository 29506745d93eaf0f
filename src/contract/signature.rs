// src/contract/signature.rs
//! Normalized member signatures
//!
//! Turns member descriptors into comparable [`MemberSignature`]s, validates
//! contracts (open generics, accessibility) and builds the [`MemberTable`]
//! that merges identically-shaped declarations and disambiguates colliding
//! names with the `"Namespace.ICapability.Member"` form.

use crate::contract::descriptor::{ContractDescriptor, MemberDescriptor, ParamDirection};
use crate::contract::types::{TypeRef, ROOT_TYPE_NAME};
use crate::utils::errors::{ProxyError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Root members that are never offered to the generation hook
const ALWAYS_EXCLUDED: &[&str] = &["Finalize", "MemberwiseClone", "GetType"];

/// One parameter of a normalized signature
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureParam {
    pub ty: TypeRef,
    pub direction: ParamDirection,
}

/// Comparable member shape, independent of the declaring capability
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberSignature {
    pub name: String,
    pub params: Vec<SignatureParam>,
    pub return_type: Option<TypeRef>,
    pub generic_arity: usize,
}

/// Placeholder name for the i-th method-level generic parameter
fn positional_param(index: usize) -> String {
    format!("!!{}", index)
}

impl MemberSignature {
    /// Extract the signature of `member`, binding type-level generic
    /// parameters and renaming method-level ones positionally
    pub fn extract(member: &MemberDescriptor, type_bindings: &HashMap<String, TypeRef>) -> Self {
        let mut bindings = type_bindings.clone();
        for (i, name) in member.generic_params.iter().enumerate() {
            bindings.insert(name.clone(), TypeRef::generic_param(positional_param(i)));
        }

        Self {
            name: member.name.clone(),
            params: member
                .params
                .iter()
                .map(|p| SignatureParam {
                    ty: p.ty.substitute(&bindings),
                    direction: p.direction,
                })
                .collect(),
            return_type: member.return_type.as_ref().map(|t| t.substitute(&bindings)),
            generic_arity: member.generic_params.len(),
        }
    }

    /// Same name, parameters and generic arity (return type ignored)
    pub fn same_call_shape(&self, other: &MemberSignature) -> bool {
        self.name == other.name
            && self.params == other.params
            && self.generic_arity == other.generic_arity
    }

    pub fn has_by_ref_params(&self) -> bool {
        self.params.iter().any(|p| p.direction.is_by_reference())
    }

    pub fn is_void(&self) -> bool {
        self.return_type.is_none()
    }

    /// Binding map from positional generic parameters to concrete types
    fn method_bindings(&self, generic_args: &[TypeRef]) -> HashMap<String, TypeRef> {
        generic_args
            .iter()
            .enumerate()
            .map(|(i, ty)| (positional_param(i), ty.clone()))
            .collect()
    }
}

fn write_signature(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    generic_args: &[TypeRef],
    params: &[(TypeRef, ParamDirection)],
    return_type: Option<&TypeRef>,
) -> fmt::Result {
    match return_type {
        Some(ty) => write!(f, "{} ", ty)?,
        None => write!(f, "void ")?,
    }
    write!(f, "{}", name)?;
    if !generic_args.is_empty() {
        let args: Vec<String> = generic_args.iter().map(|a| a.to_string()).collect();
        write!(f, "<{}>", args.join(", "))?;
    }
    write!(f, "(")?;
    for (i, (ty, direction)) in params.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        match direction {
            ParamDirection::ByValue => write!(f, "{}", ty)?,
            ParamDirection::ByRef => write!(f, "ref {}", ty)?,
            ParamDirection::In => write!(f, "in {}", ty)?,
            ParamDirection::Out => write!(f, "out {}", ty)?,
        }
    }
    write!(f, ")")
}

impl fmt::Display for MemberSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let generic: Vec<TypeRef> = (0..self.generic_arity)
            .map(|i| TypeRef::generic_param(positional_param(i)))
            .collect();
        let params: Vec<_> = self
            .params
            .iter()
            .map(|p| (p.ty.clone(), p.direction))
            .collect();
        write_signature(f, &self.name, &generic, &params, self.return_type.as_ref())
    }
}

/// A member as declared by one capability
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodIdentity {
    /// Declaring capability (closed over its generic arguments)
    pub declaring: TypeRef,

    /// The descriptor as declared
    pub member: MemberDescriptor,

    /// Normalized signature
    pub signature: MemberSignature,
}

impl MethodIdentity {
    pub fn new(declaring: &ContractDescriptor, member: &MemberDescriptor) -> Self {
        Self {
            declaring: declaring.type_ref.clone(),
            member: member.clone(),
            signature: MemberSignature::extract(member, &declaring.bindings()),
        }
    }

    pub fn name(&self) -> &str {
        &self.member.name
    }

    /// `"Namespace.ICapability.Member"`
    pub fn namespaced_name(&self) -> String {
        format!("{}.{}", self.declaring.full_name, self.member.name)
    }

    pub fn declared_by_root(&self) -> bool {
        self.declaring.full_name == ROOT_TYPE_NAME
    }
}

/// A member identity closed over the call site's generic arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConcreteMethod {
    pub identity: Arc<MethodIdentity>,
    pub generic_args: Vec<TypeRef>,
    pub param_types: Vec<TypeRef>,
    pub return_type: Option<TypeRef>,
}

impl ConcreteMethod {
    /// Close `identity` over `generic_args`; the arity must match
    pub fn close(identity: Arc<MethodIdentity>, generic_args: &[TypeRef]) -> Result<Self> {
        let arity = identity.signature.generic_arity;
        if generic_args.len() != arity {
            return Err(ProxyError::ArgumentMismatch {
                method: identity.signature.to_string(),
                detail: format!(
                    "expected {} generic argument(s), got {}",
                    arity,
                    generic_args.len()
                ),
            });
        }
        if let Some(open) = generic_args.iter().find(|a| a.is_open()) {
            return Err(ProxyError::ArgumentMismatch {
                method: identity.signature.to_string(),
                detail: format!("generic argument {} is not closed", open),
            });
        }

        let bindings = identity.signature.method_bindings(generic_args);
        let param_types = identity
            .signature
            .params
            .iter()
            .map(|p| p.ty.substitute(&bindings))
            .collect();
        let return_type = identity
            .signature
            .return_type
            .as_ref()
            .map(|t| t.substitute(&bindings));

        Ok(Self {
            identity,
            generic_args: generic_args.to_vec(),
            param_types,
            return_type,
        })
    }

    pub fn name(&self) -> &str {
        self.identity.name()
    }

    pub fn declaring_type(&self) -> &TypeRef {
        &self.identity.declaring
    }

    pub fn is_void(&self) -> bool {
        self.return_type.is_none()
    }

    /// Whether an unset return slot is a contract violation
    pub fn returns_value_type(&self) -> bool {
        self.return_type.as_ref().map(TypeRef::is_value).unwrap_or(false)
    }
}

impl fmt::Display for ConcreteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<_> = self
            .param_types
            .iter()
            .cloned()
            .zip(self.identity.signature.params.iter().map(|p| p.direction))
            .collect();
        write_signature(
            f,
            self.name(),
            &self.generic_args,
            &params,
            self.return_type.as_ref(),
        )
    }
}

/// Reject open generic contracts
pub fn ensure_closed(contract: &ContractDescriptor) -> Result<()> {
    if contract.is_open() {
        return Err(ProxyError::InvalidContract {
            type_name: contract.type_ref.to_string(),
            reason: "it is an open generic type; supply all generic arguments".to_string(),
        });
    }
    Ok(())
}

/// Reject types (or generic arguments) the generator cannot see
pub fn ensure_accessible(ty: &TypeRef, allow_internal: bool) -> Result<()> {
    if let Some(offending) = ty.first_inaccessible(allow_internal) {
        return Err(ProxyError::InaccessibleType {
            contract: ty.to_string(),
            offending: offending.to_string(),
        });
    }
    Ok(())
}

/// Whether a root member must never reach the generation hook
pub fn is_always_excluded(identity: &MethodIdentity) -> bool {
    identity.declared_by_root() && ALWAYS_EXCLUDED.contains(&identity.name())
}

/// The universal root type every class contract implicitly derives from
pub fn root_contract() -> Arc<ContractDescriptor> {
    let object = TypeRef::object();
    ContractDescriptor::new(object.clone())
        .member(
            MemberDescriptor::method("Equals")
                .param("obj", object.clone())
                .returns(TypeRef::bool()),
        )
        .member(MemberDescriptor::method("GetHashCode").returns(TypeRef::int()))
        .member(MemberDescriptor::method("ToString").returns(TypeRef::string()))
        .member(MemberDescriptor::method("Finalize"))
        .member(MemberDescriptor::method("MemberwiseClone").returns(object).non_overridable())
        .member(
            MemberDescriptor::method("GetType")
                .returns(TypeRef::class("Type"))
                .non_overridable(),
        )
        .shared()
}

/// One slot of the member table
#[derive(Debug, Clone)]
pub struct MemberEntry<R> {
    /// Name under which the entry is callable without qualification
    pub exposed_name: String,

    /// Signature exposed to callers (most-derived declaration)
    pub signature: MemberSignature,

    /// Declarations sharing this entry; the first one is the default identity
    pub declarations: Vec<Arc<MethodIdentity>>,
    pub routing: R,
    pub intercepted: bool,
}

/// Outcome of [`MemberTable::insert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Same declaration reached through another inheritance path
    Duplicate(usize),

    /// Shares an existing entry (identical shape, or covariant ancestor)
    Merged(usize),

    /// New entry under its simple name
    Exposed(usize),

    /// New entry reachable only through its namespaced name
    Namespaced(usize),
}

/// Normalized member table with name lookup
#[derive(Debug, Clone)]
pub struct MemberTable<R> {
    entries: Vec<MemberEntry<R>>,

    /// name -> (entry, declaration)
    names: HashMap<String, Vec<(usize, usize)>>,
}

impl<R: Clone + PartialEq> MemberTable<R> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            names: HashMap::new(),
        }
    }

    /// Insert a declaration. `derives(a, b)` must report whether capability
    /// `a` derives from capability `b`.
    pub fn insert<F>(
        &mut self,
        identity: Arc<MethodIdentity>,
        routing: R,
        intercepted: bool,
        derives: F,
    ) -> Placement
    where
        F: Fn(&TypeRef, &TypeRef) -> bool,
    {
        // diamond: same capability reached twice
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.declarations.iter().any(|d| {
                d.declaring == identity.declaring && d.signature == identity.signature
            }) {
                return Placement::Duplicate(index);
            }
        }

        // identical shape with identical dispatch: share the entry
        if let Some(index) = self.entries.iter().position(|e| {
            e.signature == identity.signature && e.routing == routing && e.intercepted == intercepted
        }) {
            return self.merge(index, identity);
        }

        // covariant ancestor: a derived declaration already narrowed the return type
        if let Some(index) = self.entries.iter().position(|e| {
            e.signature.same_call_shape(&identity.signature)
                && e.signature.return_type != identity.signature.return_type
                && derives(&e.declarations[0].declaring, &identity.declaring)
        }) {
            return self.merge(index, identity);
        }

        let simple_taken = self.entries.iter().any(|e| {
            e.exposed_name == identity.signature.name
                && e.signature.same_call_shape(&identity.signature)
        });

        let index = self.entries.len();
        let exposed_name = if simple_taken {
            identity.namespaced_name()
        } else {
            identity.signature.name.clone()
        };

        self.names
            .entry(exposed_name.clone())
            .or_default()
            .push((index, 0));
        if simple_taken {
            // exposed name already is the namespaced one
        } else {
            self.names
                .entry(identity.namespaced_name())
                .or_default()
                .push((index, 0));
        }

        self.entries.push(MemberEntry {
            exposed_name,
            signature: identity.signature.clone(),
            declarations: vec![identity],
            routing,
            intercepted,
        });

        if simple_taken {
            Placement::Namespaced(index)
        } else {
            Placement::Exposed(index)
        }
    }

    fn merge(&mut self, index: usize, identity: Arc<MethodIdentity>) -> Placement {
        let entry = &mut self.entries[index];
        let declaration = entry.declarations.len();
        self.names
            .entry(identity.namespaced_name())
            .or_default()
            .push((index, declaration));
        entry.declarations.push(identity);
        Placement::Merged(index)
    }

    pub fn entries(&self) -> &[MemberEntry<R>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every (entry, declaration) registered under `name`
    pub fn lookup(&self, name: &str) -> &[(usize, usize)] {
        self.names.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn into_parts(self) -> (Vec<MemberEntry<R>>, HashMap<String, Vec<(usize, usize)>>) {
        (self.entries, self.names)
    }
}

impl<R: Clone + PartialEq> Default for MemberTable<R> {
    fn default() -> Self {
        Self::new()
    }
}
