//! Subtyping, supertype enumeration, and the conversion predicates the
//! invocation phases are built from.
//!
//! Everything here is read-only over a [`TypeEnv`] and deterministic: graph
//! walks sort interface edges before visiting them so results never depend on
//! declaration order.

use std::collections::{HashSet, VecDeque};

use crate::store::{ClassId, ClassKind, TypeEnv, TypeVarId};
use crate::subst::{class_substitution, substitute};
use crate::ty::{ClassType, PrimitiveType, Type, WildcardBound};

/// Resolve `Named` spellings to catalog-backed class types where possible.
#[must_use]
pub fn canonicalize_named(env: &dyn TypeEnv, ty: &Type) -> Type {
    match ty {
        Type::Named(name) => match env.lookup_class(name) {
            Some(id) => Type::class(id, vec![]),
            None => ty.clone(),
        },
        Type::Class(ClassType { def, args }) => Type::class(
            *def,
            args.iter().map(|a| canonicalize_named(env, a)).collect(),
        ),
        Type::Array(elem) => Type::array(canonicalize_named(env, elem)),
        Type::Wildcard(WildcardBound::Extends(b)) => Type::Wildcard(WildcardBound::Extends(
            Box::new(canonicalize_named(env, b)),
        )),
        Type::Wildcard(WildcardBound::Super(b)) => {
            Type::Wildcard(WildcardBound::Super(Box::new(canonicalize_named(env, b))))
        }
        Type::Intersection(parts) => Type::Intersection(
            parts.iter().map(|p| canonicalize_named(env, p)).collect(),
        ),
        _ => ty.clone(),
    }
}

/// A stable ordering key for deterministic iteration over type collections.
#[must_use]
pub fn type_sort_key(env: &dyn TypeEnv, ty: &Type) -> String {
    crate::format::type_display(env, ty)
}

/// Rank used to order intersection components: classes sort before
/// interfaces, which sort before everything else.
#[must_use]
pub fn intersection_component_rank(env: &dyn TypeEnv, ty: &Type) -> u8 {
    match ty {
        Type::Class(ClassType { def, .. }) => match env.class(*def) {
            Some(def) if def.kind == ClassKind::Class => 0,
            Some(_) => 1,
            None => 2,
        },
        Type::Array(_) => 0,
        Type::TypeVar(_) => 1,
        _ => 2,
    }
}

/// Normalize a list of reference types into an intersection type.
///
/// Flattens nested intersections, drops duplicates and redundant supertypes,
/// and orders components deterministically. A single surviving component is
/// returned unwrapped.
#[must_use]
pub fn make_intersection(env: &dyn TypeEnv, parts: Vec<Type>) -> Type {
    let mut flat: Vec<Type> = Vec::new();
    let mut queue: VecDeque<Type> = parts.into();
    while let Some(part) = queue.pop_front() {
        match part {
            Type::Intersection(inner) => queue.extend(inner),
            other => {
                if !flat.contains(&other) {
                    flat.push(other);
                }
            }
        }
    }

    // Drop components that are strict supertypes of another component.
    let mut kept: Vec<Type> = Vec::new();
    for (idx, part) in flat.iter().enumerate() {
        let redundant = flat.iter().enumerate().any(|(other_idx, other)| {
            other_idx != idx
                && is_subtype(env, other, part)
                && !(is_subtype(env, part, other) && other_idx > idx)
        });
        if !redundant {
            kept.push(part.clone());
        }
    }

    kept.sort_by_cached_key(|ty| (intersection_component_rank(env, ty), type_sort_key(env, ty)));
    match kept.len() {
        0 => Type::class(env.well_known().object, vec![]),
        1 => kept.into_iter().next().unwrap_or(Type::Error),
        _ => Type::Intersection(kept),
    }
}

/// Return `ty` viewed as an instantiation of `target` by walking the
/// supertype graph and applying type-argument substitution along the way.
///
/// Example: `ArrayList<String>` viewed as `List` yields `List<String>`.
/// Missing class metadata simply returns `None`; this never panics.
#[must_use]
pub fn instantiate_as_supertype(env: &dyn TypeEnv, ty: &Type, target: ClassId) -> Option<Type> {
    let wk = env.well_known();
    match ty {
        Type::Array(_) => {
            if target == wk.object || target == wk.cloneable || target == wk.serializable {
                return Some(Type::class(target, vec![]));
            }
            return None;
        }
        Type::Null => return Some(Type::class(target, vec![])),
        Type::Intersection(parts) => {
            let mut sorted: Vec<&Type> = parts.iter().collect();
            sorted.sort_by_cached_key(|ty| {
                (intersection_component_rank(env, ty), type_sort_key(env, ty))
            });
            for part in sorted {
                if let Some(found) = instantiate_as_supertype(env, part, target) {
                    return Some(found);
                }
            }
            return None;
        }
        Type::TypeVar(_) => {
            let mut seen = HashSet::new();
            return type_var_as_supertype(env, ty, target, &mut seen);
        }
        _ => {}
    }

    let ty = canonicalize_named(env, ty);
    let Type::Class(ClassType { def, args }) = ty else {
        return None;
    };

    for current in SupertypeWalk::new(env, def, args) {
        if let Type::Class(ClassType { def, .. }) = &current {
            if *def == target {
                return Some(current);
            }
        }
    }
    None
}

fn type_var_as_supertype(
    env: &dyn TypeEnv,
    ty: &Type,
    target: ClassId,
    seen: &mut HashSet<TypeVarId>,
) -> Option<Type> {
    let Type::TypeVar(id) = ty else {
        return instantiate_as_supertype(env, ty, target);
    };
    if !seen.insert(*id) {
        return None;
    }
    let result = env.type_param(*id).and_then(|tp| {
        let mut sorted: Vec<&Type> = tp.upper_bounds.iter().collect();
        sorted.sort_by_cached_key(|ty| {
            (intersection_component_rank(env, ty), type_sort_key(env, ty))
        });
        for bound in sorted {
            if let Some(found) = type_var_as_supertype(env, bound, target, seen) {
                return Some(found);
            }
        }
        if target == env.well_known().object {
            return Some(Type::class(target, vec![]));
        }
        None
    });
    seen.remove(id);
    result
}

/// Breadth-first walk over a class type's substituted supertype closure,
/// starting at (and including) the type itself.
struct SupertypeWalk<'e> {
    env: &'e dyn TypeEnv,
    queue: VecDeque<Type>,
    seen: HashSet<(ClassId, Vec<Type>)>,
}

impl<'e> SupertypeWalk<'e> {
    fn new(env: &'e dyn TypeEnv, def: ClassId, args: Vec<Type>) -> Self {
        let mut queue = VecDeque::new();
        queue.push_back(Type::class(def, args));
        SupertypeWalk {
            env,
            queue,
            seen: HashSet::new(),
        }
    }
}

impl Iterator for SupertypeWalk<'_> {
    type Item = Type;

    fn next(&mut self) -> Option<Type> {
        loop {
            let current = self.queue.pop_front()?;
            let Type::Class(ClassType { def, args }) = current.clone() else {
                continue;
            };
            if !self.seen.insert((def, args.clone())) {
                continue;
            }
            let Some(class_def) = self.env.class(def) else {
                return Some(current);
            };

            // A raw instantiation cannot recover supertype arguments; keep
            // walking the raw view.
            let raw = args.is_empty() && !class_def.type_params.is_empty();
            let subst = if raw {
                class_substitution(&class_def.type_params, &[])
            } else {
                class_substitution(&class_def.type_params, &args)
            };
            let project = |ty: &Type| {
                let ty = substitute(ty, &subst);
                let ty = canonicalize_named(self.env, &ty);
                if raw {
                    match ty {
                        Type::Class(ClassType { def, .. }) => Type::class(def, vec![]),
                        other => other,
                    }
                } else {
                    ty
                }
            };

            if let Some(sc) = &class_def.super_class {
                let sc = project(sc);
                if matches!(sc, Type::Class(_)) {
                    self.queue.push_back(sc);
                }
            }
            let mut ifaces: Vec<Type> = class_def
                .interfaces
                .iter()
                .map(|iface| project(iface))
                .filter(|iface| matches!(iface, Type::Class(_)))
                .collect();
            ifaces.sort_by_cached_key(|ty| type_sort_key(self.env, ty));
            self.queue.extend(ifaces);

            // Every interface implicitly has `Object` as a supertype (JLS 4.10.2).
            if class_def.kind == ClassKind::Interface {
                self.queue
                    .push_back(Type::class(self.env.well_known().object, vec![]));
            }

            return Some(current);
        }
    }
}

/// The direct and transitive supertype view of `ty`, each already substituted
/// by the subject's own type arguments. Includes `ty` itself.
#[must_use]
pub fn supertypes(env: &dyn TypeEnv, ty: &Type) -> Vec<Type> {
    let ty = canonicalize_named(env, ty);
    match ty {
        Type::Class(ClassType { def, args }) => SupertypeWalk::new(env, def, args).collect(),
        Type::Array(_) => {
            let wk = env.well_known();
            vec![
                ty.clone(),
                Type::class(wk.cloneable, vec![]),
                Type::class(wk.serializable, vec![]),
                Type::class(wk.object, vec![]),
            ]
        }
        Type::TypeVar(id) => {
            let mut out = vec![ty.clone()];
            if let Some(tp) = env.type_param(id) {
                let mut bounds = tp.upper_bounds.clone();
                bounds.sort_by_cached_key(|b| type_sort_key(env, b));
                for bound in &bounds {
                    for sup in supertypes(env, bound) {
                        if !out.contains(&sup) {
                            out.push(sup);
                        }
                    }
                }
            }
            out
        }
        _ => vec![ty],
    }
}

/// Subtyping (JLS 4.10), including primitive widening and generic
/// containment. Placeholder (`Unknown`/`Error`) types are compatible with
/// everything so one failure does not cascade.
#[must_use]
pub fn is_subtype(env: &dyn TypeEnv, sub: &Type, sup: &Type) -> bool {
    let mut depth = 0usize;
    is_subtype_inner(env, sub, sup, &mut depth)
}

const SUBTYPE_DEPTH_LIMIT: usize = 256;

fn is_subtype_inner(env: &dyn TypeEnv, sub: &Type, sup: &Type, depth: &mut usize) -> bool {
    if *depth > SUBTYPE_DEPTH_LIMIT {
        return false;
    }
    *depth += 1;

    let sub = canonicalize_named(env, sub);
    let sup = canonicalize_named(env, sup);

    if sub.is_errorish() || sup.is_errorish() {
        return true;
    }
    if sub == sup {
        return true;
    }

    match (&sub, &sup) {
        (Type::Primitive(a), Type::Primitive(b)) => a.widens_to(*b),
        (Type::Primitive(_), _) | (_, Type::Primitive(_)) => false,

        (Type::Void, _) | (_, Type::Void) => false,

        (Type::Null, other) => other.is_reference(),

        // A wildcard only makes sense as a type argument; when one leaks into
        // a plain subtype question, fall back to its bound.
        (Type::Wildcard(WildcardBound::Extends(b)), _) => is_subtype_inner(env, b, &sup, depth),
        (Type::Wildcard(_), _) => {
            let object = Type::class(env.well_known().object, vec![]);
            is_subtype_inner(env, &object, &sup, depth)
        }
        (_, Type::Wildcard(WildcardBound::Super(b))) => is_subtype_inner(env, &sub, b, depth),
        (_, Type::Wildcard(_)) => false,

        (Type::Intersection(parts), _) => {
            parts.iter().any(|p| is_subtype_inner(env, p, &sup, depth))
        }
        (_, Type::Intersection(parts)) => {
            parts.iter().all(|p| is_subtype_inner(env, &sub, p, depth))
        }

        (Type::TypeVar(id), _) => {
            // A capture variable's lower bound also flows upward.
            if let Some(tp) = env.type_param(*id) {
                tp.upper_bounds
                    .iter()
                    .any(|b| is_subtype_inner(env, b, &sup, depth))
                    || (tp.upper_bounds.is_empty()
                        && is_subtype_inner(
                            env,
                            &Type::class(env.well_known().object, vec![]),
                            &sup,
                            depth,
                        ))
            } else {
                false
            }
        }
        (_, Type::TypeVar(id)) => match env.type_param(*id).and_then(|tp| tp.lower_bound.clone()) {
            Some(lower) => is_subtype_inner(env, &sub, &lower, depth),
            None => false,
        },

        (Type::Array(sub_elem), Type::Array(sup_elem)) => {
            if sub_elem.is_primitive() || sup_elem.is_primitive() {
                **sub_elem == **sup_elem
            } else {
                is_subtype_inner(env, sub_elem, sup_elem, depth)
            }
        }
        (Type::Array(_), Type::Class(ClassType { def, .. })) => {
            instantiate_as_supertype(env, &sub, *def).is_some()
        }
        (Type::Class(_), Type::Array(_)) => false,

        (Type::Class(_), Type::Class(ClassType { def: sup_def, args: sup_args })) => {
            let Some(inst) = instantiate_as_supertype(env, &sub, *sup_def) else {
                return false;
            };
            let Type::Class(ClassType { args: inst_args, .. }) = inst else {
                return false;
            };
            if sup_args.is_empty() {
                // Raw supertype: erasure-level match is enough.
                return true;
            }
            if inst_args.is_empty() {
                // Raw subtype against a parameterized supertype is unchecked
                // conversion, not subtyping.
                return false;
            }
            inst_args.len() == sup_args.len()
                && inst_args
                    .iter()
                    .zip(sup_args.iter())
                    .all(|(a, b)| argument_contains(env, b, a, depth))
        }
        _ => false,
    }
}

/// Type-argument containment `a ⊆ b` (JLS 4.5.1): does argument `b` contain
/// argument `a`?
fn argument_contains(env: &dyn TypeEnv, container: &Type, contained: &Type, depth: &mut usize) -> bool {
    match container {
        Type::Wildcard(WildcardBound::Unbounded) => true,
        Type::Wildcard(WildcardBound::Extends(upper)) => match contained {
            Type::Wildcard(WildcardBound::Extends(inner)) => {
                is_subtype_inner(env, inner, upper, depth)
            }
            Type::Wildcard(_) => is_subtype_inner(
                env,
                &Type::class(env.well_known().object, vec![]),
                upper,
                depth,
            ),
            other => is_subtype_inner(env, other, upper, depth),
        },
        Type::Wildcard(WildcardBound::Super(lower)) => match contained {
            Type::Wildcard(WildcardBound::Super(inner)) => {
                is_subtype_inner(env, lower, inner, depth)
            }
            Type::Wildcard(_) => false,
            other => is_subtype_inner(env, lower, other, depth),
        },
        _ => {
            container == contained
                || canonicalize_named(env, container) == canonicalize_named(env, contained)
        }
    }
}

/// Conversion verdict used by the invocation phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convertibility {
    No,
    Yes,
    /// Compatible only through an unchecked (raw-type) conversion.
    Unchecked,
}

impl Convertibility {
    #[must_use]
    pub fn ok(self) -> bool {
        !matches!(self, Convertibility::No)
    }
}

/// Method-invocation compatibility in the strict phase (JLS 5.3 without
/// boxing or unboxing).
#[must_use]
pub fn strict_invocation_compatible(env: &dyn TypeEnv, from: &Type, to: &Type) -> Convertibility {
    if is_subtype(env, from, to) {
        return Convertibility::Yes;
    }
    unchecked_raw_compatible(env, from, to)
}

/// Method-invocation compatibility in the loose phase: strict plus boxing and
/// unboxing conversions.
#[must_use]
pub fn loose_invocation_compatible(env: &dyn TypeEnv, from: &Type, to: &Type) -> Convertibility {
    let strict = strict_invocation_compatible(env, from, to);
    if strict.ok() {
        return strict;
    }
    match (from, to) {
        (Type::Primitive(p), to) if to.is_reference() => {
            let boxed = Type::class(env.well_known().boxed(*p), vec![]);
            if is_subtype(env, &boxed, to) {
                Convertibility::Yes
            } else {
                Convertibility::No
            }
        }
        (from, Type::Primitive(target)) => match unboxed_primitive(env, from) {
            Some(p) if p.widens_to(*target) => Convertibility::Yes,
            _ => Convertibility::No,
        },
        _ => Convertibility::No,
    }
}

/// Raw-to-parameterized assignment is allowed with an unchecked warning
/// (JLS 5.1.9).
fn unchecked_raw_compatible(env: &dyn TypeEnv, from: &Type, to: &Type) -> Convertibility {
    let (Type::Class(_), Type::Class(ClassType { def: to_def, args: to_args })) = (from, to) else {
        return Convertibility::No;
    };
    if to_args.is_empty() {
        return Convertibility::No;
    }
    match instantiate_as_supertype(env, from, *to_def) {
        Some(Type::Class(ClassType { args, .. })) if args.is_empty() => Convertibility::Unchecked,
        _ => Convertibility::No,
    }
}

#[must_use]
pub fn unboxed_primitive(env: &dyn TypeEnv, ty: &Type) -> Option<PrimitiveType> {
    let Type::Class(ClassType { def, .. }) = canonicalize_named(env, ty) else {
        return None;
    };
    env.well_known().unboxed(def)
}

/// Box a primitive type; reference types pass through unchanged.
#[must_use]
pub fn boxed_type(env: &dyn TypeEnv, ty: &Type) -> Type {
    match ty {
        Type::Primitive(p) => Type::class(env.well_known().boxed(*p), vec![]),
        _ => ty.clone(),
    }
}

/// Greatest lower bound of two types: the more specific one when related,
/// otherwise their intersection.
#[must_use]
pub fn glb(env: &dyn TypeEnv, a: &Type, b: &Type) -> Type {
    if is_subtype(env, a, b) {
        return a.clone();
    }
    if is_subtype(env, b, a) {
        return b.clone();
    }
    make_intersection(env, vec![a.clone(), b.clone()])
}

/// Least upper bound over a set of types (JLS 4.10.4, best-effort).
///
/// Reference types are joined through their shared erased supertypes; where
/// the instantiations disagree the argument degrades to an unbounded
/// wildcard rather than recursing into infinite lub towers.
#[must_use]
pub fn lub(env: &dyn TypeEnv, types: &[Type]) -> Type {
    let mut relevant: Vec<Type> = Vec::new();
    for ty in types {
        let ty = canonicalize_named(env, ty);
        if matches!(ty, Type::Null) || ty.is_errorish() {
            continue;
        }
        if !relevant.contains(&ty) {
            relevant.push(ty);
        }
    }
    match relevant.len() {
        0 => {
            return types
                .first()
                .cloned()
                .unwrap_or_else(|| Type::class(env.well_known().object, vec![]));
        }
        1 => return relevant.into_iter().next().unwrap_or(Type::Error),
        _ => {}
    }

    // Pairwise subsumption first: lub(S, T) = T when S <: T.
    let mut minimal: Vec<Type> = Vec::new();
    for ty in &relevant {
        if relevant
            .iter()
            .any(|other| other != ty && is_subtype(env, ty, other) && !is_subtype(env, other, ty))
        {
            continue;
        }
        if !minimal.contains(ty) {
            minimal.push(ty.clone());
        }
    }
    if minimal.len() == 1 {
        return minimal.into_iter().next().unwrap_or(Type::Error);
    }

    // Mixed primitive/reference joins go through boxing.
    let boxed: Vec<Type> = minimal.iter().map(|t| boxed_type(env, t)).collect();

    // Erased candidate set intersection over the supertype closures.
    let mut candidates: Option<Vec<ClassId>> = None;
    for ty in &boxed {
        let mut ids: Vec<ClassId> = supertypes(env, ty)
            .into_iter()
            .filter_map(|sup| sup.as_class().map(|c| c.def))
            .collect();
        ids.dedup();
        candidates = Some(match candidates {
            None => ids,
            Some(prev) => prev.into_iter().filter(|id| ids.contains(id)).collect(),
        });
    }
    let candidates = candidates.unwrap_or_default();
    if candidates.is_empty() {
        return Type::class(env.well_known().object, vec![]);
    }

    // Keep only the most specific erased candidates.
    let mut minimal_candidates: Vec<ClassId> = Vec::new();
    for &id in &candidates {
        let erased = Type::class(id, vec![]);
        let subsumed = candidates.iter().any(|&other| {
            other != id
                && is_subtype(env, &Type::class(other, vec![]), &erased)
                && !is_subtype(env, &erased, &Type::class(other, vec![]))
        });
        if !subsumed {
            minimal_candidates.push(id);
        }
    }
    minimal_candidates.sort_by_cached_key(|id| {
        env.class(*id).map(|d| d.name.clone()).unwrap_or_default()
    });

    let mut parts: Vec<Type> = Vec::new();
    for id in minimal_candidates {
        let mut insts: Vec<Type> = Vec::new();
        for ty in &boxed {
            match instantiate_as_supertype(env, ty, id) {
                Some(inst) => insts.push(inst),
                None => insts.clear(),
            }
        }
        let Some(first) = insts.first().cloned() else {
            continue;
        };
        let merged = if insts.iter().all(|i| *i == first) {
            first
        } else {
            merge_lub_instantiations(env, id, &insts)
        };
        parts.push(merged);
    }
    match parts.len() {
        0 => Type::class(env.well_known().object, vec![]),
        1 => parts.into_iter().next().unwrap_or(Type::Error),
        _ => make_intersection(env, parts),
    }
}

/// Least containing instantiation across several views of the same class:
/// argument positions that disagree become unbounded wildcards.
fn merge_lub_instantiations(env: &dyn TypeEnv, id: ClassId, insts: &[Type]) -> Type {
    let arity = env.class(id).map(|d| d.type_params.len()).unwrap_or(0);
    let mut args: Vec<Type> = Vec::with_capacity(arity);
    for idx in 0..arity {
        let mut position: Vec<&Type> = Vec::new();
        for inst in insts {
            if let Type::Class(ClassType { args, .. }) = inst {
                if let Some(arg) = args.get(idx) {
                    position.push(arg);
                }
            }
        }
        if position.len() != insts.len() {
            // Some view was raw: the merged instantiation is raw too.
            return Type::class(id, vec![]);
        }
        let first = position[0];
        if position.iter().all(|arg| *arg == first) {
            args.push(first.clone());
        } else {
            args.push(Type::Wildcard(WildcardBound::Unbounded));
        }
    }
    Type::class(id, args)
}

/// Whether `ty` is a checked exception type: a `Throwable` that is neither a
/// `RuntimeException` nor an `Error` (JLS 11.1).
#[must_use]
pub fn is_checked_exception(env: &dyn TypeEnv, ty: &Type) -> bool {
    let wk = env.well_known();
    let throwable = Type::class(wk.throwable, vec![]);
    let runtime = Type::class(wk.runtime_exception, vec![]);
    let error = Type::class(wk.error, vec![]);
    is_subtype(env, ty, &throwable)
        && !is_subtype(env, ty, &runtime)
        && !is_subtype(env, ty, &error)
}
