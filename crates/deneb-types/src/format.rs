//! Stable, Java-like renderings of types and signatures.
//!
//! Used for diagnostics and for deterministic sort keys; the output is not a
//! parseable source form and intentionally avoids import-aware shortening.

use crate::store::{MethodDef, TypeEnv};
use crate::ty::{ClassType, Type, WildcardBound};

#[must_use]
pub fn type_display(env: &dyn TypeEnv, ty: &Type) -> String {
    let mut out = String::new();
    push_type(env, ty, &mut out);
    out
}

fn push_type(env: &dyn TypeEnv, ty: &Type, out: &mut String) {
    match ty {
        Type::Primitive(p) => out.push_str(p.name()),
        Type::Class(ClassType { def, args }) => {
            match env.class(*def) {
                Some(class_def) => out.push_str(&class_def.name),
                None => out.push_str("<missing-class>"),
            }
            if !args.is_empty() {
                out.push('<');
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        out.push_str(", ");
                    }
                    push_type(env, arg, out);
                }
                out.push('>');
            }
        }
        Type::TypeVar(id) => match env.type_param(*id) {
            Some(def) => out.push_str(&def.name),
            None => out.push_str("<missing-type-var>"),
        },
        Type::Array(elem) => {
            push_type(env, elem, out);
            out.push_str("[]");
        }
        Type::Intersection(parts) => {
            for (idx, part) in parts.iter().enumerate() {
                if idx > 0 {
                    out.push_str(" & ");
                }
                push_type(env, part, out);
            }
        }
        Type::Wildcard(WildcardBound::Unbounded) => out.push('?'),
        Type::Wildcard(WildcardBound::Extends(bound)) => {
            out.push_str("? extends ");
            push_type(env, bound, out);
        }
        Type::Wildcard(WildcardBound::Super(bound)) => {
            out.push_str("? super ");
            push_type(env, bound, out);
        }
        Type::Null => out.push_str("null"),
        Type::Void => out.push_str("void"),
        Type::Named(name) => out.push_str(name),
        Type::Unknown => out.push_str("<unknown>"),
        Type::Error => out.push_str("<error>"),
    }
}

/// `name(paramTy, paramTy)` rendering used by resolution diagnostics.
#[must_use]
pub fn method_display(env: &dyn TypeEnv, method: &MethodDef) -> String {
    let mut out = String::new();
    out.push_str(&method.name);
    out.push('(');
    for (idx, param) in method.params.iter().enumerate() {
        if idx > 0 {
            out.push_str(", ");
        }
        push_type(env, param, &mut out);
    }
    out.push(')');
    out
}
