//! Constraint-based inference of method type arguments.
//!
//! One [`InferenceContext`] is created per candidate per call site and owns
//! every piece of mutable state for that round: nested poly-expression
//! resolution runs in its *own* context and only communicates back through
//! the immutable substitution handed down during propagation. Failure is
//! terminal for the candidate; there is no backtracking.
//!
//! The inference variables are the candidate's own declared type-parameter
//! ids: formals already mention them, and scoping the bound sets to the
//! context keeps simultaneous rounds over the same declaration independent.

use serde::{Deserialize, Serialize};

use crate::store::{TypeEnv, TypeVarId};
use crate::subst::{substitute, Substitution};
use crate::subtype::{
    boxed_type, canonicalize_named, glb, instantiate_as_supertype, is_subtype, loose_invocation_compatible, lub,
};
use crate::ty::{ClassType, Type, WildcardBound};

/// Why inference could not produce an instantiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InferenceFailureReason {
    /// No bound satisfied all constraints for the named variable.
    NoInstantiation { type_param: String },
    /// An equality bound contradicts another bound for the named variable.
    ConflictingBounds { type_param: String },
    /// The instantiation violates the variable's declared bounds.
    BoundViolation { type_param: String },
    /// A proper-vs-proper constraint failed outright.
    Incompatible { from: Type, to: Type },
    /// A poly argument could not be checked against its resolved target.
    TargetMismatch { index: usize },
    /// A type thrown inside a dependent body has no home in the target's
    /// throws clause.
    ThrowsIncompatible { thrown: Type },
    /// The reduction budget was exhausted (pathological generic recursion).
    Overflow,
}

struct InferenceVar {
    id: TypeVarId,
    name: String,
    /// Declared upper bounds, substituted by the enclosing instantiation.
    /// Validated after instantiation; not part of the constraint bound set.
    declared_bounds: Vec<Type>,
    equalities: Vec<Type>,
    uppers: Vec<Type>,
    lowers: Vec<Type>,
    instantiation: Option<Type>,
    /// Set when the variable occurs only in the candidate's throws clause.
    throws_only: bool,
}

const REDUCTION_BUDGET: usize = 4_096;

pub struct InferenceContext<'e> {
    env: &'e dyn TypeEnv,
    vars: Vec<InferenceVar>,
    budget: usize,
}

impl<'e> InferenceContext<'e> {
    /// Seed: one inference variable per method type parameter, with its
    /// declared bounds substituted by the receiver's instantiation.
    pub fn seed(
        env: &'e dyn TypeEnv,
        type_params: &[TypeVarId],
        outer_subst: &Substitution,
    ) -> Self {
        let vars = type_params
            .iter()
            .map(|&id| {
                let (name, declared_bounds) = match env.type_param(id) {
                    Some(def) => (
                        def.name.clone(),
                        def.upper_bounds
                            .iter()
                            .map(|b| substitute(b, outer_subst))
                            .collect(),
                    ),
                    None => (format!("#{:?}", id), Vec::new()),
                };
                InferenceVar {
                    id,
                    name,
                    declared_bounds,
                    equalities: Vec::new(),
                    uppers: Vec::new(),
                    lowers: Vec::new(),
                    instantiation: None,
                    throws_only: false,
                }
            })
            .collect();
        InferenceContext {
            env,
            vars,
            budget: REDUCTION_BUDGET,
        }
    }

    pub fn mark_throws_only(&mut self, id: TypeVarId) {
        if let Some(var) = self.vars.iter_mut().find(|v| v.id == id) {
            var.throws_only = true;
        }
    }

    #[must_use]
    pub fn var_ids(&self) -> Vec<TypeVarId> {
        self.vars.iter().map(|v| v.id).collect()
    }

    fn unresolved_ids(&self) -> Vec<TypeVarId> {
        self.vars
            .iter()
            .filter(|v| v.instantiation.is_none())
            .map(|v| v.id)
            .collect()
    }

    fn is_proper(&self, ty: &Type) -> bool {
        !ty.mentions_any(&self.unresolved_ids())
    }

    fn var_mut(&mut self, id: TypeVarId) -> Option<&mut InferenceVar> {
        self.vars.iter_mut().find(|v| v.id == id)
    }

    fn is_var(&self, id: TypeVarId) -> bool {
        self.vars.iter().any(|v| v.id == id)
    }

    fn spend(&mut self) -> Result<(), InferenceFailureReason> {
        if self.budget == 0 {
            return Err(InferenceFailureReason::Overflow);
        }
        self.budget -= 1;
        Ok(())
    }

    /// The substitution of everything resolved so far.
    #[must_use]
    pub fn partial_substitution(&self) -> Substitution {
        let mut subst = Substitution::new();
        for var in &self.vars {
            if let Some(inst) = &var.instantiation {
                subst.insert(var.id, inst.clone());
            }
        }
        subst
    }

    /// Reduce a loose-compatibility constraint `from → to` (an argument
    /// flowing into a formal).
    pub fn reduce_compatibility(
        &mut self,
        from: &Type,
        to: &Type,
    ) -> Result<(), InferenceFailureReason> {
        self.spend()?;
        if from.is_errorish() || to.is_errorish() {
            return Ok(());
        }
        if self.is_proper(to) {
            let to = self.resolved(to);
            let from = self.resolved(from);
            if self.is_proper(&from) {
                return if loose_invocation_compatible(self.env, &from, &to).ok() {
                    Ok(())
                } else {
                    Err(InferenceFailureReason::Incompatible { from, to })
                };
            }
            return self.reduce_subtype(&from, &to);
        }
        // Box a primitive argument before it flows into a type variable.
        let from = boxed_type(self.env, from);
        self.reduce_subtype(&from, to)
    }

    /// Reduce a subtyping constraint `sub <: sup` into variable bounds.
    pub fn reduce_subtype(&mut self, sub: &Type, sup: &Type) -> Result<(), InferenceFailureReason> {
        self.spend()?;
        let sub = self.resolved(sub);
        let sup = self.resolved(sup);
        if sub.is_errorish() || sup.is_errorish() {
            return Ok(());
        }

        match (&sub, &sup) {
            (Type::TypeVar(a), _) if self.is_unresolved_var(*a) => {
                if let Type::TypeVar(b) = &sup {
                    if *a == *b {
                        return Ok(());
                    }
                }
                if let Some(var) = self.var_mut(*a) {
                    if !var.uppers.contains(&sup) {
                        var.uppers.push(sup.clone());
                    }
                }
                Ok(())
            }
            (_, Type::TypeVar(b)) if self.is_unresolved_var(*b) => {
                if let Some(var) = self.var_mut(*b) {
                    if !var.lowers.contains(&sub) {
                        var.lowers.push(sub.clone());
                    }
                }
                Ok(())
            }
            _ if self.is_proper(&sub) && self.is_proper(&sup) => {
                if is_subtype(self.env, &sub, &sup) {
                    Ok(())
                } else {
                    Err(InferenceFailureReason::Incompatible { from: sub, to: sup })
                }
            }
            (Type::Array(sub_elem), Type::Array(sup_elem)) => {
                self.reduce_subtype(sub_elem, sup_elem)
            }
            (_, Type::Class(ClassType { def, args })) if !args.is_empty() => {
                let Some(inst) = instantiate_as_supertype(self.env, &sub, *def) else {
                    return Err(InferenceFailureReason::Incompatible { from: sub, to: sup });
                };
                let Type::Class(ClassType { args: inst_args, .. }) = inst else {
                    return Err(InferenceFailureReason::Incompatible { from: sub, to: sup });
                };
                if inst_args.is_empty() {
                    // Raw view: nothing further to learn.
                    return Ok(());
                }
                if inst_args.len() != args.len() {
                    return Err(InferenceFailureReason::Incompatible { from: sub, to: sup });
                }
                for (actual, formal) in inst_args.iter().zip(args.iter()) {
                    self.reduce_containment(actual, formal)?;
                }
                Ok(())
            }
            _ => {
                // Residual shapes (wildcard operands, intersections) fall back
                // to a conservative check once everything is proper.
                if is_subtype(self.env, &sub, &sup) {
                    Ok(())
                } else {
                    Err(InferenceFailureReason::Incompatible { from: sub, to: sup })
                }
            }
        }
    }

    /// Reduce type-argument containment `actual ⊆ formal` where the formal
    /// may mention inference variables.
    fn reduce_containment(
        &mut self,
        actual: &Type,
        formal: &Type,
    ) -> Result<(), InferenceFailureReason> {
        self.spend()?;
        match formal {
            Type::Wildcard(WildcardBound::Unbounded) => Ok(()),
            Type::Wildcard(WildcardBound::Extends(upper)) => {
                let actual_upper = match actual {
                    Type::Wildcard(WildcardBound::Extends(inner)) => (**inner).clone(),
                    Type::Wildcard(_) => Type::class(self.env.well_known().object, vec![]),
                    other => other.clone(),
                };
                self.reduce_subtype(&actual_upper, upper)
            }
            Type::Wildcard(WildcardBound::Super(lower)) => {
                let actual_lower = match actual {
                    Type::Wildcard(WildcardBound::Super(inner)) => (**inner).clone(),
                    Type::Wildcard(_) => {
                        return Err(InferenceFailureReason::Incompatible {
                            from: actual.clone(),
                            to: formal.clone(),
                        })
                    }
                    other => other.clone(),
                };
                self.reduce_subtype(lower, &actual_lower)
            }
            _ => self.reduce_equality(actual, formal),
        }
    }

    /// Reduce an equality constraint `a = b` into variable bounds.
    pub fn reduce_equality(&mut self, a: &Type, b: &Type) -> Result<(), InferenceFailureReason> {
        self.spend()?;
        let a = self.resolved(a);
        let b = self.resolved(b);
        if a.is_errorish() || b.is_errorish() {
            return Ok(());
        }
        if a == b {
            return Ok(());
        }

        match (&a, &b) {
            (Type::TypeVar(id), other) | (other, Type::TypeVar(id))
                if self.is_unresolved_var(*id) =>
            {
                let other = (*other).clone();
                if let Some(var) = self.var_mut(*id) {
                    if !var.equalities.contains(&other) {
                        var.equalities.push(other);
                    }
                }
                Ok(())
            }
            (
                Type::Class(ClassType { def: da, args: aa }),
                Type::Class(ClassType { def: db, args: ba }),
            ) if da == db && aa.len() == ba.len() => {
                for (x, y) in aa.iter().zip(ba.iter()) {
                    match (x, y) {
                        (
                            Type::Wildcard(WildcardBound::Extends(xb)),
                            Type::Wildcard(WildcardBound::Extends(yb)),
                        )
                        | (
                            Type::Wildcard(WildcardBound::Super(xb)),
                            Type::Wildcard(WildcardBound::Super(yb)),
                        ) => self.reduce_equality(xb, yb)?,
                        _ => self.reduce_equality(x, y)?,
                    }
                }
                Ok(())
            }
            (Type::Array(ea), Type::Array(eb)) => self.reduce_equality(ea, eb),
            _ if self.is_proper(&a) && self.is_proper(&b) => {
                if canonicalize_named(self.env, &a) == canonicalize_named(self.env, &b) {
                    Ok(())
                } else {
                    Err(InferenceFailureReason::Incompatible { from: a, to: b })
                }
            }
            _ => Err(InferenceFailureReason::Incompatible { from: a, to: b }),
        }
    }

    fn is_unresolved_var(&self, id: TypeVarId) -> bool {
        self.vars
            .iter()
            .any(|v| v.id == id && v.instantiation.is_none())
    }

    /// Apply the resolved-so-far substitution to a type.
    fn resolved(&self, ty: &Type) -> Type {
        let subst = self.partial_substitution();
        if subst.is_empty() {
            ty.clone()
        } else {
            substitute(ty, &subst)
        }
    }

    /// First resolution round: instantiate every variable whose accumulated
    /// bounds are proper, iterating to a fixed point. Variables without
    /// proper bounds are left for the final round.
    pub fn resolve_partial(&mut self) -> Result<(), InferenceFailureReason> {
        loop {
            let mut progressed = false;
            for idx in 0..self.vars.len() {
                if self.vars[idx].instantiation.is_some() {
                    continue;
                }
                if !self.var_bounds_proper(idx) {
                    continue;
                }
                if !self.has_any_bound(idx) {
                    continue;
                }
                self.instantiate_var(idx)?;
                progressed = true;
            }
            if !progressed {
                return Ok(());
            }
        }
    }

    /// Final resolution: every remaining variable must resolve. Bound types
    /// still mentioning unresolved siblings are projected through the
    /// resolved substitution first; genuinely cyclic leftovers degrade to
    /// their declared-bound erasure.
    pub fn resolve_all(&mut self) -> Result<Substitution, InferenceFailureReason> {
        self.resolve_partial()?;
        loop {
            let mut progressed = false;
            let mut pending = false;
            for idx in 0..self.vars.len() {
                if self.vars[idx].instantiation.is_some() {
                    continue;
                }
                pending = true;
                if self.var_bounds_proper(idx) {
                    self.instantiate_var(idx)?;
                    progressed = true;
                }
            }
            if !pending {
                break;
            }
            if !progressed {
                // Cycle (F-bounds or mutually dependent variables): force the
                // remaining ones from whatever is proper after projection.
                let Some(idx) = self
                    .vars
                    .iter()
                    .position(|v| v.instantiation.is_none())
                else {
                    break;
                };
                self.force_var(idx)?;
            }
        }

        let subst = self.partial_substitution();
        self.check_declared_bounds(&subst)?;
        Ok(subst)
    }

    fn has_any_bound(&self, idx: usize) -> bool {
        let v = &self.vars[idx];
        !(v.equalities.is_empty() && v.uppers.is_empty() && v.lowers.is_empty())
    }

    fn var_bounds_proper(&self, idx: usize) -> bool {
        let v = &self.vars[idx];
        let mut unresolved = self.unresolved_ids();
        unresolved.retain(|id| *id != v.id);
        v.equalities
            .iter()
            .chain(v.uppers.iter())
            .chain(v.lowers.iter())
            .all(|b| !b.mentions_any(&unresolved) && !b.mentions_any(&[v.id]))
    }

    fn instantiate_var(&mut self, idx: usize) -> Result<(), InferenceFailureReason> {
        let name = self.vars[idx].name.clone();
        let equalities: Vec<Type> = self.vars[idx]
            .equalities
            .iter()
            .map(|b| self.resolved(b))
            .collect();
        let uppers: Vec<Type> = self.vars[idx].uppers.iter().map(|b| self.resolved(b)).collect();
        let lowers: Vec<Type> = self.vars[idx].lowers.iter().map(|b| self.resolved(b)).collect();

        let candidate = if let Some(first) = equalities.first() {
            // All equality bounds must agree.
            if equalities.iter().any(|other| other != first) {
                return Err(InferenceFailureReason::ConflictingBounds { type_param: name });
            }
            first.clone()
        } else if !uppers.is_empty() {
            let mut merged = uppers[0].clone();
            for upper in &uppers[1..] {
                merged = glb(self.env, &merged, upper);
            }
            merged
        } else if !lowers.is_empty() {
            lub(self.env, &lowers)
        } else if self.vars[idx].throws_only {
            // An otherwise-unconstrained variable living only in the throws
            // clause resolves "unchecked" (JLS 18.1.3).
            Type::class(self.env.well_known().runtime_exception, vec![])
        } else {
            // Unconstrained: fall back to the declared bound, or Object. A
            // bound still mentioning unresolved siblings degrades to its
            // erasure so the instantiation is always proper.
            let declared = self.vars[idx]
                .declared_bounds
                .first()
                .cloned()
                .unwrap_or_else(|| Type::class(self.env.well_known().object, vec![]));
            let projected = self.resolved(&declared);
            if self.is_proper(&projected) {
                projected
            } else {
                crate::subst::erasure(self.env, &projected)
            }
        };

        // The chosen instantiation must not contradict the other bound kinds.
        for upper in &uppers {
            if !is_subtype(self.env, &candidate, upper) {
                return Err(if equalities.is_empty() {
                    InferenceFailureReason::NoInstantiation { type_param: name }
                } else {
                    InferenceFailureReason::ConflictingBounds { type_param: name }
                });
            }
        }
        for lower in &lowers {
            if !is_subtype(self.env, lower, &candidate) {
                return Err(if equalities.is_empty() {
                    InferenceFailureReason::NoInstantiation { type_param: name }
                } else {
                    InferenceFailureReason::ConflictingBounds { type_param: name }
                });
            }
        }

        tracing::trace!(var = %name, inst = ?candidate, "instantiated inference variable");
        self.vars[idx].instantiation = Some(candidate);
        Ok(())
    }

    /// Break a dependency cycle by resolving from declared bounds alone.
    fn force_var(&mut self, idx: usize) -> Result<(), InferenceFailureReason> {
        let name = self.vars[idx].name.clone();
        let declared = self.vars[idx]
            .declared_bounds
            .first()
            .cloned()
            .unwrap_or_else(|| Type::class(self.env.well_known().object, vec![]));
        let candidate = crate::subst::erasure(self.env, &self.resolved(&declared));
        tracing::trace!(var = %name, inst = ?candidate, "forced cyclic inference variable");
        self.vars[idx].instantiation = Some(candidate);
        Ok(())
    }

    /// Validate the final instantiation against declared (possibly
    /// self-referential) bounds.
    fn check_declared_bounds(&self, subst: &Substitution) -> Result<(), InferenceFailureReason> {
        for var in &self.vars {
            let Some(inst) = subst.get(&var.id) else {
                continue;
            };
            if inst.is_errorish() {
                continue;
            }
            for bound in &var.declared_bounds {
                let bound = substitute(bound, subst);
                if bound.is_errorish() {
                    continue;
                }
                if !is_subtype(self.env, inst, &bound) {
                    return Err(InferenceFailureReason::BoundViolation {
                        type_param: var.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Fold the thrown types observed inside a dependent body into the
    /// target descriptor's throws clause.
    ///
    /// A thrown type covered by a proper declared type is fine; one that can
    /// only map to an inference variable becomes a lower bound on it; one
    /// with no home fails the candidate.
    pub fn reduce_thrown(
        &mut self,
        thrown: &Type,
        declared: &[Type],
    ) -> Result<(), InferenceFailureReason> {
        self.spend()?;
        let thrown = self.resolved(thrown);
        for decl in declared {
            let decl = self.resolved(decl);
            if self.is_proper(&decl) && is_subtype(self.env, &thrown, &decl) {
                return Ok(());
            }
        }
        for decl in declared {
            if let Type::TypeVar(id) = self.resolved(decl) {
                if self.is_unresolved_var(id) {
                    if let Some(var) = self.var_mut(id) {
                        if !var.lowers.contains(&thrown) {
                            var.lowers.push(thrown.clone());
                        }
                    }
                    return Ok(());
                }
            }
        }
        Err(InferenceFailureReason::ThrowsIncompatible { thrown })
    }
}
