//! Deneb's semantic core: the Java type model, subtyping, generic
//! substitution, functional-interface detection, and constraint-based
//! overload resolution.
//!
//! The crate is deliberately free of syntax: callers feed it declared types
//! through [`TypeStore`] and call-site shapes through [`MethodCall`] /
//! [`CtorCall`], and get back structured resolutions and diagnostics. All
//! algorithms are read-only over a [`TypeEnv`] and deterministic for a fixed
//! catalog.

mod bounds;
mod context;
mod diag;
pub mod format;
mod functional;
mod infer;
mod overload;
mod store;
mod subst;
mod subtype;
mod ty;

pub use bounds::{check_bounds, BoundViolation};
pub use context::TyContext;
pub use diag::{
    Diagnostic, DiagnosticKind, Severity, Span, SuperReferenceError, TypeWarning, UncheckedReason,
};
pub use functional::{
    override_relation, resolve_functional, validate_functional_annotation, AbstractMethod,
    FunctionalDescriptor, NotFunctionalReason, OverrideRelation,
};
pub use infer::{InferenceContext, InferenceFailureReason};
pub use overload::{
    can_instantiate, display_candidates, resolve_ctor_call, resolve_ctor_call_with, resolve_field,
    resolve_method_call, resolve_method_call_with, CallArg, CallKind, CandidateFailure, CtorCall,
    InvocationPhase, LambdaBodyShape, LambdaParamList, LambdaShape, MethodCall, MethodRefShape,
    MethodResolution, NoProbe, NotApplicableReason, PhaseFailure, PolyArg, PolyArgKind, PolyProbe,
    PolyProbeOutcome, PolyTarget, ResolvedCall,
};
pub use store::{
    ClassDef, ClassId, ClassKind, CtorDef, FieldDef, MethodDef, TypeEnv, TypeParamDef, TypeStore,
    TypeVarId, Visibility, WellKnownTypes,
};
pub use subst::{class_substitution, erasure, is_reifiable, substitute, Substitution};
pub use subtype::{
    boxed_type, canonicalize_named, glb, instantiate_as_supertype, intersection_component_rank,
    is_checked_exception, is_subtype, loose_invocation_compatible, lub, make_intersection,
    strict_invocation_compatible, supertypes, type_sort_key, unboxed_primitive, Convertibility,
};
pub use ty::{ClassType, PrimitiveType, Type, WildcardBound};
