//! Declared-bound validation for candidate type arguments.

use serde::{Deserialize, Serialize};

use crate::store::{TypeEnv, TypeVarId};
use crate::subst::{substitute, Substitution};
use crate::subtype::is_subtype;
use crate::ty::{Type, WildcardBound};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundViolation {
    pub type_param: TypeVarId,
    /// The violated bound, after substitution by the current round's mapping.
    pub bound: Type,
    pub actual: Type,
}

/// Check each substituted type parameter against its declared bounds.
///
/// Bounds are checked *substituted*, so a self-referential bound like
/// `T extends Comparable<T>` is validated against the candidate itself, and a
/// bound mentioning a sibling parameter sees whatever that sibling is fixed
/// to in `subst`. At most one violation is reported per variable; once a
/// bound fails, dependent checks for the same variable are skipped.
#[must_use]
pub fn check_bounds(
    env: &dyn TypeEnv,
    params: &[TypeVarId],
    subst: &Substitution,
) -> Vec<BoundViolation> {
    let mut violations = Vec::new();
    for &param in params {
        let Some(candidate) = subst.get(&param) else {
            continue;
        };
        if candidate.is_errorish() {
            continue;
        }
        let Some(def) = env.type_param(param) else {
            continue;
        };

        // A wildcard candidate participates through its bound, not the
        // wildcard itself.
        let subject = match candidate {
            Type::Wildcard(WildcardBound::Extends(upper)) => (**upper).clone(),
            Type::Wildcard(_) => Type::class(env.well_known().object, vec![]),
            other => other.clone(),
        };

        for bound in &def.upper_bounds {
            let bound = substitute(bound, subst);
            if bound.is_errorish() {
                continue;
            }
            if !is_subtype(env, &subject, &bound) {
                violations.push(BoundViolation {
                    type_param: param,
                    bound,
                    actual: candidate.clone(),
                });
                break;
            }
        }
    }
    violations
}
