//! Structural type-variable substitution and erasure.

use std::collections::HashMap;

use crate::store::{TypeEnv, TypeVarId};
use crate::ty::{ClassType, Type, WildcardBound};

/// A mapping from type variables to types.
///
/// Substitution is applied structurally; a variable absent from the mapping is
/// returned unchanged so callers can detect residual variables explicitly.
/// Once no free variables remain, substitution is idempotent.
pub type Substitution = HashMap<TypeVarId, Type>;

/// Build the substitution for a class instantiation.
///
/// Missing arguments (raw or malformed instantiations) degrade to
/// [`Type::Unknown`] so downstream callers still get a stable shape.
#[must_use]
pub fn class_substitution(formals: &[TypeVarId], args: &[Type]) -> Substitution {
    let mut subst = Substitution::with_capacity(formals.len());
    for (idx, formal) in formals.iter().copied().enumerate() {
        subst.insert(formal, args.get(idx).cloned().unwrap_or(Type::Unknown));
    }
    subst
}

#[must_use]
pub fn substitute(ty: &Type, subst: &Substitution) -> Type {
    if subst.is_empty() {
        return ty.clone();
    }
    match ty {
        Type::TypeVar(id) => subst.get(id).cloned().unwrap_or_else(|| ty.clone()),
        Type::Class(ClassType { def, args }) => Type::class(
            *def,
            args.iter().map(|arg| substitute(arg, subst)).collect(),
        ),
        Type::Array(elem) => Type::array(substitute(elem, subst)),
        Type::Intersection(parts) => {
            Type::Intersection(parts.iter().map(|p| substitute(p, subst)).collect())
        }
        Type::Wildcard(WildcardBound::Extends(bound)) => Type::Wildcard(WildcardBound::Extends(
            Box::new(substitute(bound, subst)),
        )),
        Type::Wildcard(WildcardBound::Super(bound)) => {
            Type::Wildcard(WildcardBound::Super(Box::new(substitute(bound, subst))))
        }
        _ => ty.clone(),
    }
}

/// Type erasure (JLS 4.6).
///
/// Type variables erase to their leftmost upper bound, parameterized types to
/// their raw form, and intersections to their first component.
#[must_use]
pub fn erasure(env: &dyn TypeEnv, ty: &Type) -> Type {
    match ty {
        Type::Class(ClassType { def, .. }) => Type::class(*def, vec![]),
        Type::TypeVar(id) => {
            let Some(def) = env.type_param(*id) else {
                return Type::class(env.well_known().object, vec![]);
            };
            match def.upper_bounds.first() {
                Some(bound) => erasure(env, bound),
                None => Type::class(env.well_known().object, vec![]),
            }
        }
        Type::Array(elem) => Type::array(erasure(env, elem)),
        Type::Intersection(parts) => match parts.first() {
            Some(first) => erasure(env, first),
            None => Type::class(env.well_known().object, vec![]),
        },
        Type::Wildcard(_) => Type::class(env.well_known().object, vec![]),
        _ => ty.clone(),
    }
}

/// Whether a type is reifiable (JLS 4.7): no type-variable or non-wildcard
/// parameterization survives at runtime.
#[must_use]
pub fn is_reifiable(ty: &Type) -> bool {
    match ty {
        Type::Primitive(_) | Type::Null | Type::Void | Type::Unknown | Type::Error => true,
        Type::TypeVar(_) => false,
        Type::Array(elem) => is_reifiable(elem),
        Type::Class(ClassType { args, .. }) => args
            .iter()
            .all(|arg| matches!(arg, Type::Wildcard(WildcardBound::Unbounded))),
        Type::Intersection(_) | Type::Wildcard(_) | Type::Named(_) => false,
    }
}
