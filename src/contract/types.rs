// src/contract/types.rs
//! Type references used by contract descriptors
//!
//! A [`TypeRef`] is an immutable, comparable description of a type as seen by
//! the generator: its namespace-qualified name, its kind, its visibility and
//! its generic arguments. Type references are hashable and totally ordered so
//! they can take part in canonical shape keys.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Visibility of a type from the point of view of the generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Internal,
    Private,
}

/// Kind of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    /// Pure contract; can be proxied and used as a capability
    Interface,

    /// Extensible (unless sealed) base type
    Class { sealed: bool },

    /// Value-shaped type (numbers, booleans, structs)
    Value,

    /// Unbound generic parameter such as `T`
    GenericParameter,
}

/// Reference to a type
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeRef {
    /// Namespace-qualified name (e.g. "Tests.IFoo")
    pub full_name: String,

    /// Type kind
    pub kind: TypeKind,

    /// Visibility
    pub visibility: Visibility,

    /// Generic arguments, in declaration order
    pub generic_args: Vec<TypeRef>,
}

/// Name of the universal root type
pub const ROOT_TYPE_NAME: &str = "object";

impl TypeRef {
    pub fn new(full_name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            full_name: full_name.into(),
            kind,
            visibility: Visibility::Public,
            generic_args: Vec::new(),
        }
    }

    pub fn interface(full_name: impl Into<String>) -> Self {
        Self::new(full_name, TypeKind::Interface)
    }

    pub fn class(full_name: impl Into<String>) -> Self {
        Self::new(full_name, TypeKind::Class { sealed: false })
    }

    pub fn sealed_class(full_name: impl Into<String>) -> Self {
        Self::new(full_name, TypeKind::Class { sealed: true })
    }

    pub fn value(full_name: impl Into<String>) -> Self {
        Self::new(full_name, TypeKind::Value)
    }

    pub fn generic_param(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::GenericParameter)
    }

    pub fn int() -> Self {
        Self::value("int")
    }

    pub fn long() -> Self {
        Self::value("long")
    }

    pub fn bool() -> Self {
        Self::value("bool")
    }

    pub fn double() -> Self {
        Self::value("double")
    }

    pub fn char() -> Self {
        Self::value("char")
    }

    pub fn string() -> Self {
        Self::sealed_class("string")
    }

    pub fn object() -> Self {
        Self::class(ROOT_TYPE_NAME)
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_args(mut self, args: Vec<TypeRef>) -> Self {
        self.generic_args = args;
        self
    }

    /// Last segment of the full name
    pub fn short_name(&self) -> &str {
        self.full_name
            .rsplit('.')
            .next()
            .unwrap_or(self.full_name.as_str())
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.kind, TypeKind::Interface)
    }

    pub fn is_class(&self) -> bool {
        matches!(self.kind, TypeKind::Class { .. })
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self.kind, TypeKind::Class { sealed: true })
    }

    pub fn is_value(&self) -> bool {
        matches!(self.kind, TypeKind::Value)
    }

    pub fn is_root(&self) -> bool {
        self.full_name == ROOT_TYPE_NAME
    }

    /// Whether the type still contains an unbound generic parameter
    pub fn is_open(&self) -> bool {
        matches!(self.kind, TypeKind::GenericParameter)
            || self.generic_args.iter().any(TypeRef::is_open)
    }

    /// First type, depth first, that fails the accessibility rule
    pub fn first_inaccessible(&self, allow_internal: bool) -> Option<&TypeRef> {
        let accessible = match self.visibility {
            Visibility::Public => true,
            Visibility::Internal => allow_internal,
            Visibility::Private => false,
        };
        if !accessible {
            return Some(self);
        }
        self.generic_args
            .iter()
            .find_map(|arg| arg.first_inaccessible(allow_internal))
    }

    /// Replace generic parameters by their bindings
    pub fn substitute(&self, bindings: &HashMap<String, TypeRef>) -> TypeRef {
        if matches!(self.kind, TypeKind::GenericParameter) {
            if let Some(bound) = bindings.get(&self.full_name) {
                return bound.clone();
            }
            return self.clone();
        }
        if self.generic_args.is_empty() {
            return self.clone();
        }
        TypeRef {
            generic_args: self
                .generic_args
                .iter()
                .map(|arg| arg.substitute(bindings))
                .collect(),
            ..self.clone()
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name)?;
        if !self.generic_args.is_empty() {
            write!(f, "<")?;
            for (i, arg) in self.generic_args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", arg)?;
            }
            write!(f, ">")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_generic() {
        let list = TypeRef::interface("IList").with_args(vec![TypeRef::interface("Tests.IFoo")]);
        assert_eq!(list.to_string(), "IList<Tests.IFoo>");
        assert_eq!(TypeRef::interface("Tests.Inner.IFoo").short_name(), "IFoo");
    }

    #[test]
    fn test_open_detection() {
        let open = TypeRef::interface("IList").with_args(vec![TypeRef::generic_param("T")]);
        assert!(open.is_open());

        let nested = TypeRef::interface("IList").with_args(vec![open.clone()]);
        assert!(nested.is_open());

        let closed = TypeRef::interface("IList").with_args(vec![TypeRef::int()]);
        assert!(!closed.is_open());
    }

    #[test]
    fn test_first_inaccessible_nested() {
        let private = TypeRef::interface("Tests.PrivateInterface").with_visibility(Visibility::Private);
        let inner = TypeRef::interface("IList").with_args(vec![private.clone()]);
        let outer = TypeRef::interface("IList").with_args(vec![inner]);

        assert_eq!(outer.first_inaccessible(true), Some(&private));
        assert!(TypeRef::int().first_inaccessible(true).is_none());

        let internal = TypeRef::interface("Tests.IInternal").with_visibility(Visibility::Internal);
        assert!(internal.first_inaccessible(true).is_none());
        assert!(internal.first_inaccessible(false).is_some());
    }

    #[test]
    fn test_substitute() {
        let mut bindings = HashMap::new();
        bindings.insert("T".to_string(), TypeRef::string());

        let list = TypeRef::interface("IList").with_args(vec![TypeRef::generic_param("T")]);
        let closed = list.substitute(&bindings);
        assert_eq!(closed.to_string(), "IList<string>");
        assert!(!closed.is_open());

        let unbound = TypeRef::generic_param("U").substitute(&bindings);
        assert!(unbound.is_open());
    }
}
