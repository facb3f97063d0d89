//! Overload resolution: candidate collection, the three applicability
//! phases, inference hand-off, and most-specific selection.
//!
//! The entry points are side-effect free with respect to the global
//! environment: capture conversion and inference allocate only inside the
//! supplied [`TyContext`] or the per-candidate inference context.

use serde::{Deserialize, Serialize};

use crate::bounds::{check_bounds, BoundViolation};
use crate::context::TyContext;
use crate::diag::{TypeWarning, UncheckedReason};
use crate::format::method_display;
use crate::functional::{resolve_functional, FunctionalDescriptor, NotFunctionalReason};
use crate::infer::{InferenceContext, InferenceFailureReason};
use crate::store::{ClassId, ClassKind, CtorDef, FieldDef, MethodDef, TypeEnv, TypeVarId};
use crate::subst::{class_substitution, is_reifiable, substitute, Substitution};
use crate::subtype::{
    canonicalize_named, is_subtype, loose_invocation_compatible, strict_invocation_compatible,
    supertypes, Convertibility,
};
use crate::ty::{ClassType, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallKind {
    Instance,
    Static,
}

/// The three applicability phases, tried in order (JLS 15.12.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InvocationPhase {
    Strict,
    Loose,
    VariableArity,
}

impl InvocationPhase {
    pub const ALL: [InvocationPhase; 3] = [
        InvocationPhase::Strict,
        InvocationPhase::Loose,
        InvocationPhase::VariableArity,
    ];
}

/// A call-site argument: either an expression with an intrinsic type, or a
/// poly expression whose typing is deferred until its target is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallArg {
    Typed(Type),
    Poly(PolyArg),
}

/// Shape summary of a poly argument.
///
/// `handle` is an opaque caller-side key (typically an expression id) echoed
/// back through [`PolyProbe`] and [`PolyTarget`]; the engine never interprets
/// it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolyArg {
    pub handle: u32,
    pub kind: PolyArgKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolyArgKind {
    Lambda(LambdaShape),
    MethodRef(MethodRefShape),
    Conditional {
        then_arg: Box<CallArg>,
        else_arg: Box<CallArg>,
    },
    /// A nested generic method/constructor invocation typed against the
    /// formal once the enclosing round has (partially) resolved it.
    Invocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LambdaShape {
    pub params: LambdaParamList,
    pub body: LambdaBodyShape,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LambdaParamList {
    /// `(a, b) -> ...`: types assigned from the descriptor positionally.
    Elided(usize),
    /// `(String a, int b) -> ...`
    Explicit(Vec<Type>),
}

impl LambdaParamList {
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            LambdaParamList::Elided(n) => *n,
            LambdaParamList::Explicit(types) => types.len(),
        }
    }
}

/// What the body's completion shape can support, before full type-checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LambdaBodyShape {
    /// Single-expression body. `statement_expression` marks forms that may
    /// also stand as a statement (and can therefore target a void return).
    Expression { statement_expression: bool },
    Block {
        value_compatible: bool,
        void_compatible: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodRefShape {
    /// `expr::method`
    Bound { receiver: Type, name: String },
    /// `Type::method`: static, or instance with the receiver bound to the
    /// first descriptor parameter.
    Unbound { class: Type, name: String },
    /// `Type::new`
    Ctor { class: Type },
    /// `T[]::new`
    ArrayCtor { component: Type },
    /// `Type.super::method`
    Super { class: Type, name: String },
}

/// Why a candidate failed a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotApplicableReason {
    ArityMismatch {
        expected: usize,
        found: usize,
    },
    ArgumentMismatch {
        index: usize,
        expected: Type,
        found: Type,
    },
    /// A packed variable-arity argument does not fit the array element type.
    VarargsMismatch {
        index: usize,
        expected_element: Type,
        found: Type,
    },
    /// A poly argument's formal is not a functional interface.
    NotFunctionalTarget {
        index: usize,
        reason: NotFunctionalReason,
    },
    /// A poly argument's shape (arity, body form) cannot match the target
    /// descriptor.
    ShapeMismatch {
        index: usize,
    },
    /// A poly argument failed its deferred check against the resolved target.
    TargetMismatch {
        index: usize,
    },
    /// Calling an instance method through a static receiver.
    StaticMismatch,
    /// Phase three on a fixed-arity method.
    NotVarargs,
    ExplicitTypeArgCount {
        expected: usize,
        found: usize,
    },
    BoundViolation(BoundViolation),
    Inference(InferenceFailureReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseFailure {
    pub phase: InvocationPhase,
    pub reason: NotApplicableReason,
}

/// The per-phase reasons collected while one candidate kept failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFailure {
    pub method: String,
    pub phases: Vec<PhaseFailure>,
}

/// A poly argument paired with its fully resolved target type, ready for the
/// body analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolyTarget {
    pub arg_index: usize,
    pub handle: u32,
    pub target: Type,
    /// The target's descriptor when it is a functional interface.
    pub descriptor: Option<FunctionalDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCall {
    pub owner: ClassId,
    pub name: String,
    /// Fully instantiated formal types aligned with the argument list
    /// (variable-arity formals are expanded).
    pub formals: Vec<Type>,
    pub return_type: Type,
    pub thrown: Vec<Type>,
    pub inferred_type_args: Vec<Type>,
    pub used_varargs: bool,
    pub warnings: Vec<TypeWarning>,
    pub poly_targets: Vec<PolyTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodResolution {
    Found(Box<ResolvedCall>),
    Ambiguous {
        name: String,
        candidates: Vec<String>,
    },
    /// Candidates existed but none was applicable; `best` carries the
    /// phase-by-phase reasons of the closest match only.
    NoneApplicable {
        name: String,
        best: Option<CandidateFailure>,
        /// How many candidates were tried before giving up.
        considered: usize,
    },
    NoSuchMember {
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall<'a> {
    pub receiver: Type,
    pub call_kind: CallKind,
    pub name: &'a str,
    pub args: Vec<CallArg>,
    pub expected_return: Option<Type>,
    pub explicit_type_args: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtorCall {
    /// The instantiated class type being constructed. Empty arguments on a
    /// generic class mean diamond inference.
    pub class: Type,
    pub args: Vec<CallArg>,
    pub expected_return: Option<Type>,
    pub explicit_type_args: Vec<Type>,
}

/// Outcome of type-checking a poly expression against a candidate target.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PolyProbeOutcome {
    pub compatible: bool,
    /// Types of the value-returning expressions observed in the body (or the
    /// referenced member's return type for a method reference).
    pub return_types: Vec<Type>,
    /// Checked exception types the body can throw.
    pub thrown_types: Vec<Type>,
}

impl PolyProbeOutcome {
    #[must_use]
    pub fn incompatible() -> Self {
        PolyProbeOutcome::default()
    }

    #[must_use]
    pub fn compatible() -> Self {
        PolyProbeOutcome {
            compatible: true,
            ..PolyProbeOutcome::default()
        }
    }
}

/// Callback used during inference to type-check deferred poly arguments once
/// their target is (at least partially) known.
///
/// Implementations type the expression behind `handle` against `target` in a
/// fresh, disjoint resolution context and report what the body contributes.
pub trait PolyProbe {
    fn probe(&mut self, env: &dyn TypeEnv, handle: u32, target: &Type) -> PolyProbeOutcome;
}

/// Probe that accepts every poly argument and contributes nothing; used when
/// only shape information is available.
pub struct NoProbe;

impl PolyProbe for NoProbe {
    fn probe(&mut self, _env: &dyn TypeEnv, _handle: u32, _target: &Type) -> PolyProbeOutcome {
        PolyProbeOutcome::compatible()
    }
}

/// Resolve an instance or static method call using the three-phase
/// applicability rules, inferring generic type arguments where needed.
pub fn resolve_method_call(ctx: &mut TyContext<'_>, call: &MethodCall<'_>) -> MethodResolution {
    resolve_method_call_with(ctx, call, &mut NoProbe)
}

pub fn resolve_method_call_with(
    ctx: &mut TyContext<'_>,
    call: &MethodCall<'_>,
    probe: &mut dyn PolyProbe,
) -> MethodResolution {
    let receiver = ctx.normalize_receiver_for_member_access(&call.receiver);
    tracing::trace!(name = call.name, "resolving method call");

    let env: &dyn TypeEnv = &*ctx;
    let candidates = collect_candidates(env, &receiver, call.name, call.call_kind);
    if candidates.is_empty() {
        return MethodResolution::NoSuchMember {
            name: call.name.to_string(),
        };
    }
    run_phases(
        env,
        candidates,
        call.name,
        &call.args,
        call.expected_return.as_ref(),
        &call.explicit_type_args,
        probe,
    )
}

/// Resolve a constructor invocation. Diamond creation of a generic class
/// infers the class type arguments from the constructor arguments and the
/// expected type.
pub fn resolve_ctor_call(ctx: &mut TyContext<'_>, call: &CtorCall) -> MethodResolution {
    resolve_ctor_call_with(ctx, call, &mut NoProbe)
}

pub fn resolve_ctor_call_with(
    ctx: &mut TyContext<'_>,
    call: &CtorCall,
    probe: &mut dyn PolyProbe,
) -> MethodResolution {
    let class_ty = canonicalize_named(ctx, &call.class);
    let Some(ClassType { def, args }) = class_ty.as_class().cloned() else {
        return MethodResolution::NoSuchMember {
            name: "<init>".to_string(),
        };
    };
    let Some(class_def) = ctx.class(def) else {
        return MethodResolution::NoSuchMember {
            name: "<init>".to_string(),
        };
    };

    let class_type_params = class_def.type_params.clone();
    let diamond = args.is_empty() && !class_type_params.is_empty();

    let candidates: Vec<Candidate> = class_def
        .constructors
        .iter()
        .map(|ctor| ctor_candidate(def, &class_type_params, &args, ctor, diamond))
        .collect();
    if candidates.is_empty() {
        return MethodResolution::NoSuchMember {
            name: "<init>".to_string(),
        };
    }

    // Only diamond creation infers from the expected type; an explicit
    // instantiation fixes the class arguments up front.
    let expected_return = if diamond {
        call.expected_return.clone()
    } else {
        None
    };
    run_phases(
        &*ctx,
        candidates,
        "<init>",
        &call.args,
        expected_return.as_ref(),
        &call.explicit_type_args,
        probe,
    )
}

/// Resolve a field access against `receiver`, applying the receiver's
/// substitution to the declared field type.
#[must_use]
pub fn resolve_field(
    env: &dyn TypeEnv,
    receiver: &Type,
    name: &str,
    call_kind: CallKind,
) -> Option<FieldDef> {
    for sup in supertypes(env, receiver) {
        let Type::Class(ClassType { def, args }) = &sup else {
            continue;
        };
        let class_def = env.class(*def)?;
        let subst = class_substitution(&class_def.type_params, args);
        for field in &class_def.fields {
            if field.name != name {
                continue;
            }
            if call_kind == CallKind::Static && !field.is_static {
                continue;
            }
            let mut field = field.clone();
            field.ty = substitute(&field.ty, &subst);
            return Some(field);
        }
    }
    None
}

// === Candidates ===

#[derive(Debug, Clone)]
struct Candidate {
    owner: ClassId,
    method: MethodDef,
    /// Substitution from the receiver's view of the owning declaration.
    receiver_subst: Substitution,
}

fn ctor_candidate(
    def: ClassId,
    class_type_params: &[TypeVarId],
    class_args: &[Type],
    ctor: &CtorDef,
    diamond: bool,
) -> Candidate {
    // For diamond creation the class's own type parameters join the
    // constructor's as inference variables.
    let mut type_params = ctor.type_params.clone();
    let receiver_subst = if diamond {
        for &tp in class_type_params {
            if !type_params.contains(&tp) {
                type_params.push(tp);
            }
        }
        Substitution::new()
    } else {
        class_substitution(class_type_params, class_args)
    };
    Candidate {
        owner: def,
        method: MethodDef {
            name: "<init>".to_string(),
            type_params,
            params: ctor.params.clone(),
            return_type: Type::class(
                def,
                class_type_params.iter().map(|&tp| Type::TypeVar(tp)).collect(),
            ),
            throws: ctor.throws.clone(),
            is_static: true,
            is_varargs: ctor.is_varargs,
            is_abstract: false,
            is_default: false,
            visibility: ctor.visibility,
        },
        receiver_subst,
    }
}

fn collect_candidates(
    env: &dyn TypeEnv,
    receiver: &Type,
    name: &str,
    call_kind: CallKind,
) -> Vec<Candidate> {
    let mut out: Vec<Candidate> = Vec::new();
    for sup in supertypes(env, receiver) {
        let Type::Class(ClassType { def, args }) = &sup else {
            continue;
        };
        let Some(class_def) = env.class(*def) else {
            continue;
        };
        let subst = class_substitution(&class_def.type_params, args);
        for method in &class_def.methods {
            if method.name != name {
                continue;
            }
            if call_kind == CallKind::Static && !method.is_static {
                continue;
            }
            // The walk visits subtypes first, so an erasure-equal signature
            // seen again further up is an overridden declaration.
            let erased: Vec<Type> = method
                .params
                .iter()
                .map(|p| crate::subst::erasure(env, p))
                .collect();
            let overridden = out.iter().any(|existing| {
                existing.method.name == method.name
                    && existing
                        .method
                        .params
                        .iter()
                        .map(|p| crate::subst::erasure(env, p))
                        .collect::<Vec<_>>()
                        == erased
            });
            if overridden {
                continue;
            }
            out.push(Candidate {
                owner: *def,
                method: method.clone(),
                receiver_subst: subst.clone(),
            });
        }
    }
    out
}

// === Applicability ===

#[derive(Debug, Clone)]
struct AppOutcome {
    formals: Vec<Type>,
    /// Formals under the receiver substitution only, used for specificity
    /// comparison between candidates.
    spec_formals: Vec<Type>,
    return_type: Type,
    thrown: Vec<Type>,
    inferred_type_args: Vec<Type>,
    used_varargs: bool,
    warnings: Vec<TypeWarning>,
    poly_targets: Vec<PolyTarget>,
    /// How many leading arguments were individually compatible; used to rank
    /// failing candidates for diagnostics.
    progress: usize,
}

fn run_phases(
    env: &dyn TypeEnv,
    candidates: Vec<Candidate>,
    name: &str,
    args: &[CallArg],
    expected_return: Option<&Type>,
    explicit_type_args: &[Type],
    probe: &mut dyn PolyProbe,
) -> MethodResolution {
    let mut failures: Vec<(CandidateFailure, usize)> = candidates
        .iter()
        .map(|c| {
            (
                CandidateFailure {
                    method: method_display(env, &c.method),
                    phases: Vec::new(),
                },
                0usize,
            )
        })
        .collect();

    for phase in InvocationPhase::ALL {
        let mut applicable: Vec<(usize, AppOutcome)> = Vec::new();
        for (idx, candidate) in candidates.iter().enumerate() {
            match check_candidate(env, candidate, args, expected_return, explicit_type_args, phase, probe) {
                Ok(outcome) => applicable.push((idx, outcome)),
                Err((reason, progress)) => {
                    failures[idx].1 = failures[idx].1.max(progress);
                    failures[idx].0.phases.push(PhaseFailure { phase, reason });
                }
            }
        }
        if applicable.is_empty() {
            continue;
        }
        return select_most_specific(env, &candidates, applicable, name);
    }

    // Report only the best-matching candidate's reasons: prefer the one that
    // got furthest through its argument list, then the shorter failure list.
    let considered = failures.len();
    let best = failures
        .into_iter()
        .max_by_key(|(failure, progress)| (*progress, std::cmp::Reverse(failure.phases.len())))
        .map(|(failure, _)| failure);
    MethodResolution::NoneApplicable {
        name: name.to_string(),
        best,
        considered,
    }
}

type CandidateError = (NotApplicableReason, usize);

fn check_candidate(
    env: &dyn TypeEnv,
    candidate: &Candidate,
    args: &[CallArg],
    expected_return: Option<&Type>,
    explicit_type_args: &[Type],
    phase: InvocationPhase,
    probe: &mut dyn PolyProbe,
) -> Result<AppOutcome, CandidateError> {
    let method = &candidate.method;

    // Phase three only applies to variable-arity declarations; fixed-arity
    // phases need an exact length match.
    let varargs_phase = phase == InvocationPhase::VariableArity;
    if varargs_phase {
        if !method.is_varargs {
            return Err((NotApplicableReason::NotVarargs, 0));
        }
        if args.len() + 1 < method.params.len() {
            return Err((
                NotApplicableReason::ArityMismatch {
                    expected: method.params.len(),
                    found: args.len(),
                },
                0,
            ));
        }
    } else if method.params.len() != args.len() {
        return Err((
            NotApplicableReason::ArityMismatch {
                expected: method.params.len(),
                found: args.len(),
            },
            0,
        ));
    }

    let mut subst = candidate.receiver_subst.clone();
    let generic = !method.type_params.is_empty();
    if !explicit_type_args.is_empty() {
        if explicit_type_args.len() != method.type_params.len() {
            return Err((
                NotApplicableReason::ExplicitTypeArgCount {
                    expected: method.type_params.len(),
                    found: explicit_type_args.len(),
                },
                0,
            ));
        }
        for (&tp, arg) in method.type_params.iter().zip(explicit_type_args.iter()) {
            subst.insert(tp, arg.clone());
        }
        if let Some(violation) = check_bounds(env, &method.type_params, &subst).into_iter().next() {
            return Err((NotApplicableReason::BoundViolation(violation), 0));
        }
    }

    let infer = generic && explicit_type_args.is_empty();
    if infer {
        check_candidate_with_inference(env, candidate, args, expected_return, phase, probe, subst)
    } else {
        check_candidate_direct(env, candidate, args, phase, probe, subst)
    }
}

/// Align the (substituted) declared parameters with the argument list,
/// expanding the trailing variable-arity parameter when needed.
fn aligned_formals(
    params: &[Type],
    nargs: usize,
    varargs_phase: bool,
) -> Option<(Vec<Type>, Option<Type>)> {
    if !varargs_phase {
        return Some((params.to_vec(), None));
    }
    let (last, fixed) = params.split_last()?;
    let Type::Array(element) = last else {
        return None;
    };
    let mut formals: Vec<Type> = fixed.to_vec();
    while formals.len() < nargs {
        formals.push((**element).clone());
    }
    Some((formals, Some((**element).clone())))
}

fn arg_compatible(
    env: &dyn TypeEnv,
    from: &Type,
    to: &Type,
    phase: InvocationPhase,
) -> Convertibility {
    match phase {
        InvocationPhase::Strict => strict_invocation_compatible(env, from, to),
        InvocationPhase::Loose | InvocationPhase::VariableArity => {
            loose_invocation_compatible(env, from, to)
        }
    }
}

fn check_candidate_direct(
    env: &dyn TypeEnv,
    candidate: &Candidate,
    args: &[CallArg],
    phase: InvocationPhase,
    probe: &mut dyn PolyProbe,
    subst: Substitution,
) -> Result<AppOutcome, CandidateError> {
    let method = &candidate.method;
    let varargs_phase = phase == InvocationPhase::VariableArity;
    let params: Vec<Type> = method.params.iter().map(|p| substitute(p, &subst)).collect();
    let Some((formals, element)) = aligned_formals(&params, args.len(), varargs_phase) else {
        return Err((NotApplicableReason::NotVarargs, 0));
    };

    let mut warnings = Vec::new();
    let mut poly_targets = Vec::new();
    let mut progress = 0usize;
    let packed_from = method.params.len().saturating_sub(1);

    for (index, (arg, formal)) in args.iter().zip(formals.iter()).enumerate() {
        match arg {
            CallArg::Typed(ty) => {
                let verdict = arg_compatible(env, ty, formal, phase);
                if !verdict.ok() {
                    let reason = if varargs_phase && index >= packed_from {
                        NotApplicableReason::VarargsMismatch {
                            index,
                            expected_element: element.clone().unwrap_or(Type::Error),
                            found: ty.clone(),
                        }
                    } else {
                        NotApplicableReason::ArgumentMismatch {
                            index,
                            expected: formal.clone(),
                            found: ty.clone(),
                        }
                    };
                    return Err((reason, progress));
                }
                if verdict == Convertibility::Unchecked {
                    let warning = TypeWarning::Unchecked(UncheckedReason::UncheckedConversion);
                    if !warnings.contains(&warning) {
                        warnings.push(warning);
                    }
                }
            }
            CallArg::Poly(poly) => {
                poly_shape_applicable(env, index, &poly.kind, formal).map_err(|r| (r, progress))?;
                let outcome = probe.probe(env, poly.handle, formal);
                if !outcome.compatible {
                    return Err((NotApplicableReason::TargetMismatch { index }, progress));
                }
                poly_targets.push(PolyTarget {
                    arg_index: index,
                    handle: poly.handle,
                    target: formal.clone(),
                    descriptor: resolve_functional(env, formal).ok(),
                });
            }
        }
        progress += 1;
    }

    if varargs_phase {
        if let Some(element) = &element {
            if !is_reifiable(element) {
                warnings.push(TypeWarning::Unchecked(UncheckedReason::UncheckedVarargs));
            }
        }
    }

    Ok(AppOutcome {
        spec_formals: formals.clone(),
        formals,
        return_type: substitute(&method.return_type, &subst),
        thrown: method.throws.iter().map(|t| substitute(t, &subst)).collect(),
        inferred_type_args: Vec::new(),
        used_varargs: varargs_phase,
        warnings,
        poly_targets,
        progress,
    })
}

fn check_candidate_with_inference(
    env: &dyn TypeEnv,
    candidate: &Candidate,
    args: &[CallArg],
    expected_return: Option<&Type>,
    phase: InvocationPhase,
    probe: &mut dyn PolyProbe,
    receiver_subst: Substitution,
) -> Result<AppOutcome, CandidateError> {
    let method = &candidate.method;
    let varargs_phase = phase == InvocationPhase::VariableArity;

    // Formals substituted by the receiver view only; the method's own type
    // parameters stay free as inference variables.
    let params: Vec<Type> = method
        .params
        .iter()
        .map(|p| substitute(p, &receiver_subst))
        .collect();
    let Some((formals, element)) = aligned_formals(&params, args.len(), varargs_phase) else {
        return Err((NotApplicableReason::NotVarargs, 0));
    };

    let mut icx = InferenceContext::seed(env, &method.type_params, &receiver_subst);
    let return_subst_rs = substitute(&method.return_type, &receiver_subst);
    let thrown_rs: Vec<Type> = method
        .throws
        .iter()
        .map(|t| substitute(t, &receiver_subst))
        .collect();

    // A variable that only ever appears in the throws clause resolves to
    // RuntimeException when nothing else constrains it.
    for &tp in &method.type_params {
        let in_formals = formals.iter().any(|f| f.mentions_any(&[tp]));
        let in_return = return_subst_rs.mentions_any(&[tp]);
        let in_throws = thrown_rs.iter().any(|t| t.mentions_any(&[tp]));
        if in_throws && !in_formals && !in_return {
            icx.mark_throws_only(tp);
        }
    }

    // Reduce: non-poly arguments first, polys deferred.
    let mut deferred: Vec<(usize, &PolyArg, &Type)> = Vec::new();
    let mut progress = 0usize;
    for (index, (arg, formal)) in args.iter().zip(formals.iter()).enumerate() {
        match arg {
            CallArg::Typed(ty) => {
                icx.reduce_compatibility(ty, formal)
                    .map_err(|r| (NotApplicableReason::Inference(r), progress))?;
            }
            CallArg::Poly(poly) => {
                poly_shape_applicable(env, index, &poly.kind, formal).map_err(|r| (r, progress))?;
                deferred.push((index, poly, formal));
            }
        }
        progress += 1;
    }

    if let Some(expected) = expected_return {
        if return_subst_rs.mentions_any(&method.type_params) {
            icx.reduce_compatibility(&return_subst_rs, expected)
                .map_err(|r| (NotApplicableReason::Inference(r), progress))?;
        }
    }

    // First resolution round, then hand each deferred poly its (partially)
    // instantiated target and fold whatever its body contributes.
    icx.resolve_partial()
        .map_err(|r| (NotApplicableReason::Inference(r), progress))?;
    for (index, poly, formal) in &deferred {
        let partial = icx.partial_substitution();
        let target = substitute(formal, &partial);
        let outcome = probe.probe(env, poly.handle, &target);
        if !outcome.compatible {
            return Err((NotApplicableReason::TargetMismatch { index: *index }, progress));
        }
        let descriptor = resolve_functional(env, &target).ok();
        if let Some(desc) = &descriptor {
            for rt in &outcome.return_types {
                if matches!(desc.return_type, Type::Void) {
                    continue;
                }
                icx.reduce_compatibility(rt, &desc.return_type)
                    .map_err(|r| (NotApplicableReason::Inference(r), progress))?;
            }
            for thrown in &outcome.thrown_types {
                icx.reduce_thrown(thrown, &desc.thrown)
                    .map_err(|r| (NotApplicableReason::Inference(r), progress))?;
            }
        } else {
            // A nested invocation constrains the formal directly through its
            // resolved return type.
            for rt in &outcome.return_types {
                icx.reduce_compatibility(rt, formal)
                    .map_err(|r| (NotApplicableReason::Inference(r), progress))?;
            }
        }
    }

    let inferred = icx
        .resolve_all()
        .map_err(|r| (NotApplicableReason::Inference(r), progress))?;

    let mut subst = receiver_subst.clone();
    subst.extend(inferred.iter().map(|(k, v)| (*k, v.clone())));

    // Re-check applicability with the resolved types: inference reduced with
    // loose rules, so the phase's own predicate gets the final word.
    let final_formals: Vec<Type> = formals.iter().map(|f| substitute(f, &subst)).collect();
    let mut warnings = Vec::new();
    let packed_from = method.params.len().saturating_sub(1);
    for (index, (arg, formal)) in args.iter().zip(final_formals.iter()).enumerate() {
        let CallArg::Typed(ty) = arg else {
            continue;
        };
        let verdict = arg_compatible(env, ty, formal, phase);
        if !verdict.ok() {
            let reason = if varargs_phase && index >= packed_from {
                NotApplicableReason::VarargsMismatch {
                    index,
                    expected_element: element
                        .as_ref()
                        .map(|e| substitute(e, &subst))
                        .unwrap_or(Type::Error),
                    found: ty.clone(),
                }
            } else {
                NotApplicableReason::ArgumentMismatch {
                    index,
                    expected: formal.clone(),
                    found: ty.clone(),
                }
            };
            return Err((reason, progress));
        }
        if verdict == Convertibility::Unchecked {
            let warning = TypeWarning::Unchecked(UncheckedReason::UncheckedConversion);
            if !warnings.contains(&warning) {
                warnings.push(warning);
            }
        }
    }

    if varargs_phase {
        if let Some(element) = &element {
            if !is_reifiable(&substitute(element, &subst)) {
                warnings.push(TypeWarning::Unchecked(UncheckedReason::UncheckedVarargs));
            }
        }
    }

    let poly_targets: Vec<PolyTarget> = deferred
        .iter()
        .map(|(index, poly, formal)| {
            let target = substitute(formal, &subst);
            PolyTarget {
                arg_index: *index,
                handle: poly.handle,
                descriptor: resolve_functional(env, &target).ok(),
                target,
            }
        })
        .collect();

    let inferred_type_args: Vec<Type> = method
        .type_params
        .iter()
        .map(|tp| inferred.get(tp).cloned().unwrap_or(Type::Unknown))
        .collect();

    Ok(AppOutcome {
        spec_formals: formals,
        formals: final_formals,
        return_type: substitute(&method.return_type, &subst),
        thrown: method.throws.iter().map(|t| substitute(t, &subst)).collect(),
        inferred_type_args,
        used_varargs: varargs_phase,
        warnings,
        poly_targets,
        progress: args.len(),
    })
}

/// Potential applicability of a poly argument against a formal that may
/// still contain inference variables (JLS 15.12.2.1).
fn poly_shape_applicable(
    env: &dyn TypeEnv,
    index: usize,
    kind: &PolyArgKind,
    formal: &Type,
) -> Result<(), NotApplicableReason> {
    if formal.is_errorish() {
        return Ok(());
    }
    match kind {
        PolyArgKind::Lambda(shape) => {
            let desc = resolve_functional(env, formal)
                .map_err(|reason| NotApplicableReason::NotFunctionalTarget { index, reason })?;
            // A lambda cannot implement a generic abstract method.
            if !desc.type_params.is_empty() {
                return Err(NotApplicableReason::ShapeMismatch { index });
            }
            if shape.params.arity() != desc.params.len() {
                return Err(NotApplicableReason::ShapeMismatch { index });
            }
            let shape_ok = match (&shape.body, desc.is_void()) {
                (LambdaBodyShape::Expression { statement_expression }, true) => {
                    *statement_expression
                }
                (LambdaBodyShape::Expression { .. }, false) => true,
                (LambdaBodyShape::Block { void_compatible, .. }, true) => *void_compatible,
                (LambdaBodyShape::Block { value_compatible, .. }, false) => *value_compatible,
            };
            if !shape_ok {
                return Err(NotApplicableReason::ShapeMismatch { index });
            }
            Ok(())
        }
        PolyArgKind::MethodRef(shape) => {
            let desc = resolve_functional(env, formal)
                .map_err(|reason| NotApplicableReason::NotFunctionalTarget { index, reason })?;
            if method_ref_potentially_applicable(env, shape, desc.params.len()) {
                Ok(())
            } else {
                Err(NotApplicableReason::ShapeMismatch { index })
            }
        }
        PolyArgKind::Conditional { then_arg, else_arg } => {
            for branch in [then_arg.as_ref(), else_arg.as_ref()] {
                match branch {
                    CallArg::Typed(_) => {
                        // Checked against the resolved formal later.
                    }
                    CallArg::Poly(inner) => {
                        poly_shape_applicable(env, index, &inner.kind, formal)?;
                    }
                }
            }
            Ok(())
        }
        // Any formal can target a nested invocation; the probe decides.
        PolyArgKind::Invocation => Ok(()),
    }
}

fn method_ref_potentially_applicable(
    env: &dyn TypeEnv,
    shape: &MethodRefShape,
    desc_arity: usize,
) -> bool {
    let arity_fits = |m: &MethodDef, n: usize| {
        m.params.len() == n || (m.is_varargs && n + 1 >= m.params.len())
    };
    match shape {
        MethodRefShape::Bound { receiver, name } | MethodRefShape::Super { class: receiver, name } => {
            methods_named(env, receiver, name)
                .iter()
                .any(|m| !m.is_static && arity_fits(m, desc_arity))
        }
        MethodRefShape::Unbound { class, name } => {
            methods_named(env, class, name).iter().any(|m| {
                if m.is_static {
                    arity_fits(m, desc_arity)
                } else {
                    desc_arity > 0 && arity_fits(m, desc_arity - 1)
                }
            })
        }
        MethodRefShape::Ctor { class } => {
            let class = canonicalize_named(env, class);
            let Some(def) = class.as_class().and_then(|c| env.class(c.def)) else {
                return false;
            };
            let ctors = if def.constructors.is_empty() {
                // An implicit default constructor.
                return desc_arity == 0;
            } else {
                &def.constructors
            };
            ctors.iter().any(|c| {
                c.params.len() == desc_arity || (c.is_varargs && desc_arity + 1 >= c.params.len())
            })
        }
        MethodRefShape::ArrayCtor { .. } => desc_arity == 1,
    }
}

fn methods_named(env: &dyn TypeEnv, receiver: &Type, name: &str) -> Vec<MethodDef> {
    let mut out = Vec::new();
    for sup in supertypes(env, receiver) {
        let Type::Class(ClassType { def, .. }) = &sup else {
            continue;
        };
        let Some(class_def) = env.class(*def) else {
            continue;
        };
        for m in &class_def.methods {
            if m.name == name {
                out.push(m.clone());
            }
        }
    }
    out
}

// === Most specific selection ===

fn select_most_specific(
    env: &dyn TypeEnv,
    candidates: &[Candidate],
    applicable: Vec<(usize, AppOutcome)>,
    name: &str,
) -> MethodResolution {
    if applicable.len() == 1 {
        let (idx, outcome) = applicable.into_iter().next().expect("just checked length");
        return found(&candidates[idx], outcome);
    }

    let mut maximal: Vec<usize> = Vec::new();
    for i in 0..applicable.len() {
        let beaten = (0..applicable.len()).any(|j| {
            i != j
                && more_specific(env, candidates, &applicable, j, i)
                && !more_specific(env, candidates, &applicable, i, j)
        });
        if !beaten {
            maximal.push(i);
        }
    }

    if maximal.len() == 1 {
        let winner = maximal[0];
        let (idx, outcome) = applicable
            .into_iter()
            .nth(winner)
            .expect("winner index is in range");
        return found(&candidates[idx], outcome);
    }

    let mut names: Vec<String> = maximal
        .iter()
        .map(|&i| method_display(env, &candidates[applicable[i].0].method))
        .collect();
    names.sort();
    MethodResolution::Ambiguous {
        name: name.to_string(),
        candidates: names,
    }
}

/// Candidate `a` is more specific than `b` when each of its formals (under
/// the receiver view, varargs-normalized) is accepted by `b`'s counterpart.
fn more_specific(
    env: &dyn TypeEnv,
    candidates: &[Candidate],
    applicable: &[(usize, AppOutcome)],
    a: usize,
    b: usize,
) -> bool {
    let (a_idx, a_out) = &applicable[a];
    let (b_idx, b_out) = &applicable[b];
    if a_out.spec_formals.len() != b_out.spec_formals.len() {
        return false;
    }
    let all_subtypes = a_out
        .spec_formals
        .iter()
        .zip(b_out.spec_formals.iter())
        .all(|(fa, fb)| is_subtype(env, fa, fb));
    if !all_subtypes {
        return false;
    }
    let strictly = a_out
        .spec_formals
        .iter()
        .zip(b_out.spec_formals.iter())
        .any(|(fa, fb)| !is_subtype(env, fb, fa));
    if strictly {
        return true;
    }
    // Same formal types: a non-generic declaration beats a generic one, and
    // a more derived owner beats its supertype's declaration.
    let a_generic = !candidates[*a_idx].method.type_params.is_empty();
    let b_generic = !candidates[*b_idx].method.type_params.is_empty();
    if a_generic != b_generic {
        return !a_generic;
    }
    let a_owner = Type::class(candidates[*a_idx].owner, vec![]);
    let b_owner = Type::class(candidates[*b_idx].owner, vec![]);
    is_subtype(env, &a_owner, &b_owner) && a_owner != b_owner
}

fn found(candidate: &Candidate, outcome: AppOutcome) -> MethodResolution {
    MethodResolution::Found(Box::new(ResolvedCall {
        owner: candidate.owner,
        name: candidate.method.name.clone(),
        formals: outcome.formals,
        return_type: outcome.return_type,
        thrown: outcome.thrown,
        inferred_type_args: outcome.inferred_type_args,
        used_varargs: outcome.used_varargs,
        warnings: outcome.warnings,
        poly_targets: outcome.poly_targets,
    }))
}

/// Whether a class can be instantiated with `new` (or a constructor
/// reference): interfaces and abstract classes cannot.
#[must_use]
pub fn can_instantiate(env: &dyn TypeEnv, id: ClassId) -> bool {
    match env.class(id) {
        Some(def) => def.kind == ClassKind::Class && !def.is_abstract,
        None => false,
    }
}

/// Render every member named `name` reachable on `receiver`, for
/// diagnostics.
#[must_use]
pub fn display_candidates(env: &dyn TypeEnv, receiver: &Type, name: &str) -> Vec<String> {
    methods_named(env, receiver, name)
        .iter()
        .map(|m| method_display(env, m))
        .collect()
}
