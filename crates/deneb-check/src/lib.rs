//! The recursive call-site checker.
//!
//! [`check_body`] walks a `deneb-hir` body over a read-only type catalog,
//! driving overload resolution and inference from `deneb-types`, validating
//! lambda and method-reference bodies once their targets are known, and
//! accumulating structured diagnostics. Checking always runs to completion:
//! a failed expression yields `Type::Error` and suppresses its own dependent
//! checks, never its siblings'.

mod checker;
mod exceptions;
mod lambda;
mod scope;

pub use checker::{check_body, CheckContext, CheckResult, LambdaTarget};

use deneb_types::{Diagnostic, DiagnosticKind, TypeStore};

/// Validate explicit functional-interface annotations across a catalog
/// against the real single-abstract-method computation.
#[must_use]
pub fn validate_functional_annotations(store: &TypeStore) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    for (id, def) in store.classes() {
        if !def.functional_annotation {
            continue;
        }
        let ty = deneb_types::Type::class(
            id,
            def.type_params
                .iter()
                .map(|&tp| deneb_types::Type::TypeVar(tp))
                .collect(),
        );
        if let Some(reason) = deneb_types::validate_functional_annotation(store, &ty) {
            out.push(Diagnostic::new(
                DiagnosticKind::InvalidFunctionalAnnotation { ty, reason },
                None,
            ));
        }
    }
    out
}
