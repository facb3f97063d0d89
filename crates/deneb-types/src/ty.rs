//! The type representation used throughout the engine.
//!
//! `Type` is a plain value: cloning is cheap enough for the sizes the engine
//! sees in practice, and value semantics keep resolution side-effect free.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::store::{ClassId, TypeVarId};

/// Java primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimitiveType {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveType {
    /// Widening primitive conversion (JLS 5.1.2).
    #[must_use]
    pub fn widens_to(self, target: PrimitiveType) -> bool {
        use PrimitiveType::*;
        if self == target {
            return true;
        }
        match self {
            Byte => matches!(target, Short | Int | Long | Float | Double),
            Short => matches!(target, Int | Long | Float | Double),
            Char => matches!(target, Int | Long | Float | Double),
            Int => matches!(target, Long | Float | Double),
            Long => matches!(target, Float | Double),
            Float => matches!(target, Double),
            Boolean | Double => false,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Byte => "byte",
            PrimitiveType::Short => "short",
            PrimitiveType::Char => "char",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
        }
    }
}

/// A wildcard type argument's bound.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WildcardBound {
    /// `?`
    Unbounded,
    /// `? extends T`
    Extends(Box<Type>),
    /// `? super T`
    Super(Box<Type>),
}

/// A (possibly parameterized) reference to a declared class or interface.
///
/// `args` being empty while the declaration has type parameters denotes the
/// raw type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassType {
    pub def: ClassId,
    pub args: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Primitive(PrimitiveType),
    Class(ClassType),
    TypeVar(TypeVarId),
    Array(Box<Type>),
    /// Intersection of reference types, e.g. `Comparable<T> & Serializable`.
    Intersection(Vec<Type>),
    Wildcard(WildcardBound),
    /// The type of the `null` literal.
    Null,
    Void,
    /// An unresolved spelling, kept so diagnostics can still name it.
    Named(String),
    Unknown,
    Error,
}

impl Type {
    #[must_use]
    pub fn class(def: ClassId, args: Vec<Type>) -> Type {
        Type::Class(ClassType { def, args })
    }

    #[must_use]
    pub fn array(elem: Type) -> Type {
        Type::Array(Box::new(elem))
    }

    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Primitive(_))
    }

    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Type::Class(_)
                | Type::TypeVar(_)
                | Type::Array(_)
                | Type::Intersection(_)
                | Type::Null
                | Type::Named(_)
        )
    }

    /// Placeholder types that should not fail further checks on their own.
    #[must_use]
    pub fn is_errorish(&self) -> bool {
        matches!(self, Type::Unknown | Type::Error)
    }

    #[must_use]
    pub fn as_class(&self) -> Option<&ClassType> {
        match self {
            Type::Class(ct) => Some(ct),
            _ => None,
        }
    }

    /// Whether any free type variable from `vars` occurs in this type.
    #[must_use]
    pub fn mentions_any(&self, vars: &[TypeVarId]) -> bool {
        match self {
            Type::TypeVar(id) => vars.contains(id),
            Type::Class(ClassType { args, .. }) => args.iter().any(|a| a.mentions_any(vars)),
            Type::Array(elem) => elem.mentions_any(vars),
            Type::Intersection(parts) => parts.iter().any(|p| p.mentions_any(vars)),
            Type::Wildcard(WildcardBound::Extends(b)) | Type::Wildcard(WildcardBound::Super(b)) => {
                b.mentions_any(vars)
            }
            _ => false,
        }
    }

    /// Collect every type variable occurring in this type into `out`.
    pub fn collect_type_vars(&self, out: &mut Vec<TypeVarId>) {
        match self {
            Type::TypeVar(id) => {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
            Type::Class(ClassType { args, .. }) => {
                for a in args {
                    a.collect_type_vars(out);
                }
            }
            Type::Array(elem) => elem.collect_type_vars(out),
            Type::Intersection(parts) => {
                for p in parts {
                    p.collect_type_vars(out);
                }
            }
            Type::Wildcard(WildcardBound::Extends(b)) | Type::Wildcard(WildcardBound::Super(b)) => {
                b.collect_type_vars(out)
            }
            _ => {}
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
