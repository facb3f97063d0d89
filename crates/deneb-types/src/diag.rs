//! Structured diagnostics.
//!
//! A diagnostic is a machine-readable fact: a kind with a structured payload
//! (offending types and names), a severity and a source span. Rendering to
//! text happens on demand so the payload stays language-neutral.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::format::type_display;
use crate::functional::NotFunctionalReason;
use crate::infer::InferenceFailureReason;
use crate::overload::CandidateFailure;
use crate::store::TypeEnv;
use crate::ty::Type;

/// A byte-span into a source string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span({}..{})", self.start, self.end)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

/// Why a `Type.super::method` reference is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuperReferenceError {
    /// `super` has no meaning in a static context.
    StaticContext,
    /// The referenced method is abstract, so `super` cannot invoke it directly.
    AbstractTarget { name: String },
    /// The named supertype is bypassed by a more specific override in between.
    BypassedOverride { name: String, overriding: Type },
    /// The qualifier does not name a direct supertype of the enclosing class.
    NotADirectSupertype { ty: Type },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// A candidate was rejected in every phase it was tried in.
    NotApplicable {
        method: String,
        failure: CandidateFailure,
    },
    AmbiguousMethodCall {
        name: String,
        candidates: Vec<String>,
    },
    /// No candidate survived; carries the per-phase reasons of the
    /// best-matching candidate only.
    NoApplicableMethod {
        name: String,
        best: Option<CandidateFailure>,
    },
    BoundMismatch {
        type_param: String,
        bound: Type,
        actual: Type,
    },
    NotFunctional {
        ty: Type,
        reason: NotFunctionalReason,
    },
    /// A poly expression (lambda, method reference) in a context that
    /// provides no target type.
    MissingTargetType,
    InvalidFunctionalAnnotation {
        ty: Type,
        reason: NotFunctionalReason,
    },
    ParameterTypeMismatch {
        index: usize,
        expected: Type,
        found: Type,
    },
    /// Assignment-context mismatch: an initializer, assigned value or
    /// returned value does not fit the declared type.
    TypeMismatch {
        expected: Type,
        found: Type,
    },
    /// Arity or parameter-list shape mismatch against the target descriptor.
    SignatureMismatch {
        expected_arity: usize,
        found_arity: usize,
    },
    UnhandledExceptionType {
        thrown: Type,
    },
    DuplicateVariable {
        name: String,
    },
    ShadowingError {
        name: String,
    },
    NotEffectivelyFinal {
        name: String,
    },
    /// A local read on a path where it has no definite assignment yet.
    UseBeforeAssignment {
        name: String,
    },
    StaticContextError {
        name: String,
    },
    IllegalSuperReference {
        reason: SuperReferenceError,
    },
    CannotInstantiate {
        ty: Type,
    },
    VarargsMismatch {
        expected_element: Type,
        found: Type,
    },
    InferenceFailure {
        type_param: String,
        reason: InferenceFailureReason,
    },
    InferenceOverflow,
    /// A value returned from a void-compatible body, or a missing value in a
    /// value-compatible one.
    VoidValueMismatch {
        value_returned: bool,
    },
    UnreachableCode,
    MissingReturn,
}

impl DiagnosticKind {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            DiagnosticKind::NotApplicable { .. } => "CALL_NOT_APPLICABLE",
            DiagnosticKind::AmbiguousMethodCall { .. } => "CALL_AMBIGUOUS",
            DiagnosticKind::NoApplicableMethod { .. } => "CALL_NO_CANDIDATE",
            DiagnosticKind::BoundMismatch { .. } => "GENERIC_BOUND_MISMATCH",
            DiagnosticKind::NotFunctional { .. } => "SAM_NOT_FUNCTIONAL",
            DiagnosticKind::MissingTargetType => "POLY_NO_TARGET",
            DiagnosticKind::InvalidFunctionalAnnotation { .. } => "SAM_BAD_ANNOTATION",
            DiagnosticKind::ParameterTypeMismatch { .. } => "LAMBDA_PARAM_TYPE",
            DiagnosticKind::TypeMismatch { .. } => "TYPE_MISMATCH",
            DiagnosticKind::SignatureMismatch { .. } => "LAMBDA_SHAPE",
            DiagnosticKind::UnhandledExceptionType { .. } => "THROWS_UNHANDLED",
            DiagnosticKind::DuplicateVariable { .. } => "SCOPE_DUPLICATE",
            DiagnosticKind::ShadowingError { .. } => "SCOPE_SHADOW",
            DiagnosticKind::NotEffectivelyFinal { .. } => "CAPTURE_NOT_EFFECTIVELY_FINAL",
            DiagnosticKind::UseBeforeAssignment { .. } => "FLOW_UNASSIGNED",
            DiagnosticKind::StaticContextError { .. } => "SCOPE_STATIC_CONTEXT",
            DiagnosticKind::IllegalSuperReference { .. } => "REF_SUPER",
            DiagnosticKind::CannotInstantiate { .. } => "REF_CANNOT_INSTANTIATE",
            DiagnosticKind::VarargsMismatch { .. } => "CALL_VARARGS",
            DiagnosticKind::InferenceFailure { .. } => "INFER_FAILED",
            DiagnosticKind::InferenceOverflow => "INFER_OVERFLOW",
            DiagnosticKind::VoidValueMismatch { .. } => "LAMBDA_VOID_VALUE",
            DiagnosticKind::UnreachableCode => "FLOW_UNREACHABLE",
            DiagnosticKind::MissingReturn => "FLOW_MISSING_RETURN",
        }
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            DiagnosticKind::UnreachableCode => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub span: Option<Span>,
}

impl Diagnostic {
    #[must_use]
    pub fn new(kind: DiagnosticKind, span: Option<Span>) -> Self {
        Self {
            severity: kind.severity(),
            kind,
            span,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Render a human-readable message. Wording is advisory; tools should key
    /// on [`Diagnostic::code`] and the structured payload.
    #[must_use]
    pub fn message(&self, env: &dyn TypeEnv) -> String {
        match &self.kind {
            DiagnosticKind::NotApplicable { method, .. } => {
                format!("method {method} is not applicable to these arguments")
            }
            DiagnosticKind::AmbiguousMethodCall { name, candidates } => format!(
                "reference to {name} is ambiguous ({} candidates match)",
                candidates.len()
            ),
            DiagnosticKind::NoApplicableMethod { name, .. } => {
                format!("no applicable method found for {name}")
            }
            DiagnosticKind::BoundMismatch {
                type_param,
                bound,
                actual,
            } => format!(
                "type argument {} is not within bound {} of type parameter {type_param}",
                type_display(env, actual),
                type_display(env, bound)
            ),
            DiagnosticKind::NotFunctional { ty, .. } => format!(
                "{} is not a functional interface",
                type_display(env, ty)
            ),
            DiagnosticKind::MissingTargetType => {
                "lambda or method reference used where no target type is available".to_string()
            }
            DiagnosticKind::InvalidFunctionalAnnotation { ty, .. } => format!(
                "{} is annotated as functional but has no single abstract method",
                type_display(env, ty)
            ),
            DiagnosticKind::ParameterTypeMismatch {
                index,
                expected,
                found,
            } => format!(
                "lambda parameter {index} has type {} but the descriptor expects {}",
                type_display(env, found),
                type_display(env, expected)
            ),
            DiagnosticKind::TypeMismatch { expected, found } => format!(
                "incompatible types: {} cannot be converted to {}",
                type_display(env, found),
                type_display(env, expected)
            ),
            DiagnosticKind::SignatureMismatch {
                expected_arity,
                found_arity,
            } => format!(
                "parameter list length {found_arity} does not match the descriptor arity {expected_arity}"
            ),
            DiagnosticKind::UnhandledExceptionType { thrown } => format!(
                "unhandled exception type {}",
                type_display(env, thrown)
            ),
            DiagnosticKind::DuplicateVariable { name } => {
                format!("variable {name} is already defined in this scope")
            }
            DiagnosticKind::ShadowingError { name } => {
                format!("{name} redeclares a variable visible from the enclosing scope")
            }
            DiagnosticKind::NotEffectivelyFinal { name } => {
                format!("local variable {name} must be final or effectively final")
            }
            DiagnosticKind::UseBeforeAssignment { name } => {
                format!("variable {name} might not have been initialized")
            }
            DiagnosticKind::StaticContextError { name } => {
                format!("{name} cannot be referenced from a static context")
            }
            DiagnosticKind::IllegalSuperReference { .. } => {
                "illegal super method reference".to_string()
            }
            DiagnosticKind::CannotInstantiate { ty } => {
                format!("cannot instantiate {}", type_display(env, ty))
            }
            DiagnosticKind::VarargsMismatch {
                expected_element,
                found,
            } => format!(
                "argument {} cannot be packed into a {} array",
                type_display(env, found),
                type_display(env, expected_element)
            ),
            DiagnosticKind::InferenceFailure { type_param, .. } => {
                format!("cannot infer type argument for {type_param}")
            }
            DiagnosticKind::InferenceOverflow => {
                "type inference exceeded the recursion budget".to_string()
            }
            DiagnosticKind::VoidValueMismatch { value_returned } => {
                if *value_returned {
                    "value returned from a lambda whose target returns void".to_string()
                } else {
                    "missing value in a lambda whose target returns a value".to_string()
                }
            }
            DiagnosticKind::UnreachableCode => "unreachable code".to_string(),
            DiagnosticKind::MissingReturn => "missing return statement".to_string(),
        }
    }
}

/// Non-error findings attached to a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeWarning {
    Unchecked(UncheckedReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UncheckedReason {
    /// Raw-type conversion applied to make an argument fit.
    UncheckedConversion,
    /// Variable-arity creation of an array of a non-reifiable type.
    UncheckedVarargs,
}
