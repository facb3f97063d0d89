//! Functional-interface detection (single abstract method).
//!
//! Deep and diamond inheritance among interface supertypes is handled by an
//! explicit merge over the collected abstract-method declarations; the
//! override relation is a computed, tagged result rather than anything
//! resembling dispatch.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::store::{ClassKind, TypeEnv, TypeVarId};
use crate::subst::{class_substitution, erasure, substitute};
use crate::subtype::{canonicalize_named, is_subtype, supertypes, type_sort_key};
use crate::ty::{ClassType, PrimitiveType, Type};

/// The single abstract method of a functional interface, after substitution
/// by the interface instantiation's type arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionalDescriptor {
    pub name: String,
    /// Type parameters declared by the abstract method itself. A lambda
    /// cannot implement a generic method; method references can.
    pub type_params: Vec<TypeVarId>,
    pub params: Vec<Type>,
    pub return_type: Type,
    pub thrown: Vec<Type>,
}

impl FunctionalDescriptor {
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self.return_type, Type::Void)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotFunctionalReason {
    /// Only interface types can be functional.
    NotAnInterface,
    NoAbstractMethod,
    MultipleAbstractMethods { names: Vec<String> },
    /// Two inherited methods share an erasure without one overriding the
    /// other.
    ErasureClash { name: String },
    /// The type has no class shape to inspect (primitive, array, ...).
    NotAClassType,
}

/// How two erasure-equal abstract methods relate (explicit, computed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideRelation {
    /// Same substituted signature: one declaration overrides the other.
    Override,
    /// Same erasure, different substituted signature: a hard name clash.
    UnrelatedClash,
    /// Different erasures entirely.
    Distinct,
}

#[must_use]
pub fn override_relation(env: &dyn TypeEnv, a: &AbstractMethod, b: &AbstractMethod) -> OverrideRelation {
    if a.name != b.name || a.params.len() != b.params.len() {
        return OverrideRelation::Distinct;
    }
    let erasure_equal = a
        .params
        .iter()
        .zip(b.params.iter())
        .all(|(x, y)| erasure(env, x) == erasure(env, y));
    if !erasure_equal {
        return OverrideRelation::Distinct;
    }
    let params_equal = a
        .params
        .iter()
        .zip(b.params.iter())
        .all(|(x, y)| canonicalize_named(env, x) == canonicalize_named(env, y));
    if params_equal {
        OverrideRelation::Override
    } else {
        OverrideRelation::UnrelatedClash
    }
}

/// One abstract instance method collected from the supertype closure, with
/// the owning instantiation's substitution already applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbstractMethod {
    pub name: String,
    pub type_params: Vec<TypeVarId>,
    pub params: Vec<Type>,
    pub return_type: Type,
    pub thrown: Vec<Type>,
}

/// Determine whether `ty` is a functional interface and compute its
/// descriptor (JLS 9.8).
pub fn resolve_functional(
    env: &dyn TypeEnv,
    ty: &Type,
) -> Result<FunctionalDescriptor, NotFunctionalReason> {
    let mut seen_vars = HashSet::new();
    resolve_functional_inner(env, ty, &mut seen_vars)
}

fn resolve_functional_inner(
    env: &dyn TypeEnv,
    ty: &Type,
    seen_vars: &mut HashSet<TypeVarId>,
) -> Result<FunctionalDescriptor, NotFunctionalReason> {
    match ty {
        Type::TypeVar(id) => {
            if !seen_vars.insert(*id) {
                return Err(NotFunctionalReason::NotAClassType);
            }
            let result = env
                .type_param(*id)
                .ok_or(NotFunctionalReason::NotAClassType)
                .and_then(|tp| {
                    let mut found: Option<FunctionalDescriptor> = None;
                    for bound in &tp.upper_bounds {
                        let Ok(desc) = resolve_functional_inner(env, bound, seen_vars) else {
                            continue;
                        };
                        match &found {
                            None => found = Some(desc),
                            Some(existing) if *existing == desc => {}
                            Some(_) => return Err(NotFunctionalReason::MultipleAbstractMethods {
                                names: vec![desc.name],
                            }),
                        }
                    }
                    found.ok_or(NotFunctionalReason::NoAbstractMethod)
                });
            seen_vars.remove(id);
            return result;
        }
        Type::Intersection(parts) => {
            // Functional when all functional components agree on one
            // descriptor.
            let mut found: Option<FunctionalDescriptor> = None;
            for part in parts {
                let Ok(desc) = resolve_functional_inner(env, part, seen_vars) else {
                    continue;
                };
                match &found {
                    None => found = Some(desc),
                    Some(existing) if *existing == desc => {}
                    Some(existing) => {
                        return Err(NotFunctionalReason::MultipleAbstractMethods {
                            names: vec![existing.name.clone(), desc.name],
                        })
                    }
                }
            }
            return found.ok_or(NotFunctionalReason::NoAbstractMethod);
        }
        _ => {}
    }

    let ty = canonicalize_named(env, ty);
    let Type::Class(ClassType { def, .. }) = &ty else {
        return Err(NotFunctionalReason::NotAClassType);
    };
    let root = env.class(*def).ok_or(NotFunctionalReason::NotAClassType)?;
    if root.kind != ClassKind::Interface {
        return Err(NotFunctionalReason::NotAnInterface);
    }

    let collected = collect_abstract_methods(env, &ty);

    // Merge erasure-equal groups; any unrelated clash poisons the type.
    let mut groups: Vec<Vec<AbstractMethod>> = Vec::new();
    for method in collected {
        let mut placed = false;
        for group in groups.iter_mut() {
            match override_relation(env, &group[0], &method) {
                OverrideRelation::Override => {
                    group.push(method.clone());
                    placed = true;
                    break;
                }
                OverrideRelation::UnrelatedClash => {
                    return Err(NotFunctionalReason::ErasureClash {
                        name: method.name,
                    });
                }
                OverrideRelation::Distinct => {}
            }
        }
        if !placed {
            groups.push(vec![method]);
        }
    }

    match groups.len() {
        0 => Err(NotFunctionalReason::NoAbstractMethod),
        1 => {
            let group = groups.into_iter().next().unwrap_or_default();
            merge_group(env, group).ok_or(NotFunctionalReason::NoAbstractMethod)
        }
        _ => {
            let mut names: Vec<String> = groups
                .iter()
                .filter_map(|g| g.first().map(|m| m.name.clone()))
                .collect();
            names.sort();
            names.dedup();
            Err(NotFunctionalReason::MultipleAbstractMethods { names })
        }
    }
}

/// Walk the interface closure collecting abstract instance methods with the
/// owning instantiation's substitution applied; `Object` methods do not
/// count (JLS 9.8).
fn collect_abstract_methods(env: &dyn TypeEnv, ty: &Type) -> Vec<AbstractMethod> {
    let mut out = Vec::new();
    for sup in supertypes(env, ty) {
        let Type::Class(ClassType { def, args }) = &sup else {
            continue;
        };
        let Some(class_def) = env.class(*def) else {
            continue;
        };
        let subst = class_substitution(&class_def.type_params, args);
        for m in &class_def.methods {
            if m.is_static || !m.is_abstract {
                continue;
            }
            let params: Vec<Type> = m.params.iter().map(|p| substitute(p, &subst)).collect();
            let return_type = substitute(&m.return_type, &subst);
            if is_object_method(env, &m.name, &params, &return_type) {
                continue;
            }
            out.push(AbstractMethod {
                name: m.name.clone(),
                type_params: m.type_params.clone(),
                params,
                return_type,
                thrown: m.throws.iter().map(|t| substitute(t, &subst)).collect(),
            });
        }
    }
    // Sort so grouping and merge results never depend on traversal order.
    out.sort_by_cached_key(|m| {
        let params: Vec<String> = m.params.iter().map(|p| type_sort_key(env, p)).collect();
        (m.name.clone(), params.join(","), type_sort_key(env, &m.return_type))
    });
    out
}

/// Merge an override-related group into a single candidate: most specific
/// return type, narrowest throws clause (JLS 8.4.8.4).
fn merge_group(env: &dyn TypeEnv, group: Vec<AbstractMethod>) -> Option<FunctionalDescriptor> {
    let first = group.first()?.clone();

    let mut return_type = first.return_type.clone();
    for m in &group[1..] {
        return_type = merge_return_types(env, return_type, m.return_type.clone())?;
    }

    // A thrown type survives iff every clause in the group covers it.
    let mut thrown: Vec<Type> = Vec::new();
    for m in &group {
        for t in &m.thrown {
            let covered_everywhere = group.iter().all(|other| {
                other
                    .thrown
                    .iter()
                    .any(|declared| is_subtype(env, t, declared))
            });
            if covered_everywhere && !thrown.contains(t) {
                thrown.push(t.clone());
            }
        }
    }
    thrown.sort_by_cached_key(|t| type_sort_key(env, t));

    Some(FunctionalDescriptor {
        name: first.name,
        type_params: first.type_params,
        params: first.params,
        return_type,
        thrown,
    })
}

fn merge_return_types(env: &dyn TypeEnv, a: Type, b: Type) -> Option<Type> {
    let a = canonicalize_named(env, &a);
    let b = canonicalize_named(env, &b);
    if a == b {
        return Some(a);
    }
    if a.is_errorish() {
        return Some(b);
    }
    if b.is_errorish() {
        return Some(a);
    }
    let a_sub_b = is_subtype(env, &a, &b);
    let b_sub_a = is_subtype(env, &b, &a);
    match (a_sub_b, b_sub_a) {
        (true, false) => Some(a),
        (false, true) => Some(b),
        // Mutual subtyping happens for equivalent spellings; pick one
        // deterministically.
        (true, true) => Some(if type_sort_key(env, &a) <= type_sort_key(env, &b) {
            a
        } else {
            b
        }),
        (false, false) => None,
    }
}

fn is_object_method(env: &dyn TypeEnv, name: &str, params: &[Type], return_type: &Type) -> bool {
    let return_type = canonicalize_named(env, return_type);
    match name {
        "equals" => {
            if params.len() != 1 {
                return false;
            }
            let object = Type::class(env.well_known().object, vec![]);
            canonicalize_named(env, &params[0]) == object
                && return_type == Type::Primitive(PrimitiveType::Boolean)
        }
        "hashCode" => params.is_empty() && return_type == Type::Primitive(PrimitiveType::Int),
        "toString" => {
            params.is_empty() && return_type == Type::class(env.well_known().string, vec![])
        }
        _ => false,
    }
}

/// Validate an explicit functional-interface annotation against the real
/// computation. Returns the reason when the annotation is wrong.
#[must_use]
pub fn validate_functional_annotation(
    env: &dyn TypeEnv,
    ty: &Type,
) -> Option<NotFunctionalReason> {
    let canonical = canonicalize_named(env, ty);
    let annotated = canonical
        .as_class()
        .and_then(|c| env.class(c.def))
        .map(|def| def.functional_annotation)
        .unwrap_or(false);
    if !annotated {
        return None;
    }
    resolve_functional(env, &canonical).err()
}
