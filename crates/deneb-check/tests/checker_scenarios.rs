//! End-to-end checker scenarios: ill-formed targets, nested inference,
//! conditional poly expressions, and context restrictions.

use deneb_check::{check_body, validate_functional_annotations, CheckContext};
use deneb_hir::{BodyBuilder, ExprKind, LambdaBody, Literal, LocalKind, Receiver, StmtKind};
use deneb_types::{
    ClassDef, ClassKind, Diagnostic, MethodDef, Type, TypeEnv, TypeStore,
};

use pretty_assertions::assert_eq;

fn codes(diags: &[Diagnostic]) -> Vec<&'static str> {
    diags.iter().map(|d| d.code()).collect()
}

/// A lambda assigned to a functional-interface instantiation whose wildcard
/// argument violates the declared bound is rejected at the declaration.
#[test]
fn ill_formed_target_type_reports_a_bound_mismatch() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = Type::class(env.well_known().object, vec![]);
    let string = Type::class(env.well_known().string, vec![]);

    // interface X<T> {}
    let xt = env.add_type_param("T", vec![object.clone()]);
    let x = env.add_class(ClassDef {
        name: "com.example.X".to_string(),
        kind: ClassKind::Interface,
        is_abstract: true,
        type_params: vec![xt],
        ..ClassDef::default()
    });

    // interface I<T, S extends X<T>> { T foo(S p); }
    let it = env.add_type_param("T", vec![object.clone()]);
    let is_ = env.add_type_param("S", vec![object.clone()]);
    env.set_type_param_bounds(is_, vec![Type::class(x, vec![Type::TypeVar(it)])]);
    let i = env.add_class(ClassDef {
        name: "com.example.I".to_string(),
        kind: ClassKind::Interface,
        is_abstract: true,
        type_params: vec![it, is_],
        methods: vec![MethodDef {
            name: "foo".to_string(),
            params: vec![Type::TypeVar(is_)],
            return_type: Type::TypeVar(it),
            is_abstract: true,
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });

    // I<Object, ? extends String> i = (p) -> p;  -- String is no X<Object>.
    let target = Type::class(
        i,
        vec![
            object,
            Type::Wildcard(deneb_types::WildcardBound::Extends(Box::new(string))),
        ],
    );

    let mut b = BodyBuilder::new();
    let p = b.local("p", LocalKind::LambdaParam);
    let p_read = b.expr(ExprKind::Local(p));
    let lambda = b.expr(ExprKind::Lambda {
        params: vec![p],
        body: LambdaBody::Expr(p_read),
    });
    let local = b.typed_local("i", target, LocalKind::Local);
    let decl = b.stmt(StmtKind::Let {
        local,
        initializer: Some(lambda),
    });
    let root = b.stmt(StmtKind::Block(vec![decl]));
    let body = b.finish(root);

    let result = check_body(&env, &body, CheckContext::default());
    assert!(codes(&result.diagnostics).contains(&"GENERIC_BOUND_MISMATCH"));
}

/// `id(single("s"))`: the nested generic call resolves first and its return
/// type feeds the enclosing inference round.
#[test]
fn nested_generic_invocation_feeds_outer_inference() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = Type::class(env.well_known().object, vec![]);
    let string = env.well_known().string;
    let list = env.class_id("java.util.List").unwrap();

    let t1 = env.add_type_param("T", vec![object.clone()]);
    let t2 = env.add_type_param("T", vec![object.clone()]);
    let util = env.add_class(ClassDef {
        name: "com.example.Util".to_string(),
        super_class: Some(object),
        methods: vec![
            MethodDef {
                name: "id".to_string(),
                type_params: vec![t1],
                params: vec![Type::TypeVar(t1)],
                return_type: Type::TypeVar(t1),
                is_static: true,
                ..MethodDef::default()
            },
            MethodDef {
                name: "single".to_string(),
                type_params: vec![t2],
                params: vec![Type::TypeVar(t2)],
                return_type: Type::class(list, vec![Type::TypeVar(t2)]),
                is_static: true,
                ..MethodDef::default()
            },
        ],
        ..ClassDef::default()
    });
    let util_ty = Type::class(util, vec![]);

    let mut b = BodyBuilder::new();
    let s = b.expr(ExprKind::Literal(Literal::Str("s".into())));
    let inner = b.expr(ExprKind::Call {
        receiver: Receiver::Static(util_ty.clone()),
        name: "single".to_string(),
        args: vec![s],
        type_args: vec![],
    });
    let outer = b.expr(ExprKind::Call {
        receiver: Receiver::Static(util_ty),
        name: "id".to_string(),
        args: vec![inner],
        type_args: vec![],
    });
    let stmt = b.stmt(StmtKind::Expr(outer));
    let root = b.stmt(StmtKind::Block(vec![stmt]));
    let body = b.finish(root);

    let result = check_body(&env, &body, CheckContext::default());
    assert_eq!(codes(&result.diagnostics), Vec::<&str>::new());
    assert_eq!(
        result.expr_types[outer.idx()],
        Type::class(list, vec![Type::class(string, vec![])])
    );
}

/// Both branches of a conditional in a target context are checked against
/// the target independently.
#[test]
fn conditional_with_lambda_branches_checks_both_against_the_target() {
    let mut env = TypeStore::with_minimal_jdk();
    let string = Type::class(env.well_known().string, vec![]);
    let f = env.add_class(ClassDef {
        name: "com.example.StrFn".to_string(),
        kind: ClassKind::Interface,
        is_abstract: true,
        methods: vec![MethodDef {
            name: "call".to_string(),
            params: vec![string.clone()],
            return_type: string.clone(),
            is_abstract: true,
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });
    let target = Type::class(f, vec![]);

    let mut b = BodyBuilder::new();
    let cond = b.typed_local(
        "cond",
        Type::Primitive(deneb_types::PrimitiveType::Boolean),
        LocalKind::Param,
    );
    let cond_read = b.expr(ExprKind::Local(cond));

    let p1 = b.local("a", LocalKind::LambdaParam);
    let p1_read = b.expr(ExprKind::Local(p1));
    let then_lambda = b.expr(ExprKind::Lambda {
        params: vec![p1],
        body: LambdaBody::Expr(p1_read),
    });

    // The else branch returns an int from a String-returning descriptor.
    let p2 = b.local("a2", LocalKind::LambdaParam);
    let one = b.expr(ExprKind::Literal(Literal::Int(1)));
    let else_lambda = b.expr(ExprKind::Lambda {
        params: vec![p2],
        body: LambdaBody::Expr(one),
    });

    let cond_expr = b.expr(ExprKind::Cond {
        condition: cond_read,
        then_expr: then_lambda,
        else_expr: else_lambda,
    });
    let local = b.typed_local("f", target, LocalKind::Local);
    let decl = b.stmt(StmtKind::Let {
        local,
        initializer: Some(cond_expr),
    });
    let root = b.stmt(StmtKind::Block(vec![decl]));
    let body = b.finish(root);

    let result = check_body(&env, &body, CheckContext::default());
    // Only the else branch is wrong.
    assert_eq!(
        codes(&result.diagnostics)
            .iter()
            .filter(|c| **c == "TYPE_MISMATCH")
            .count(),
        1
    );
}

/// Instance state is off-limits in explicit constructor-invocation
/// arguments, at any lambda nesting depth.
#[test]
fn this_in_explicit_constructor_arguments_is_rejected_through_lambdas() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = Type::class(env.well_known().object, vec![]);
    let owner = env.add_class(ClassDef {
        name: "com.example.Ctor".to_string(),
        super_class: Some(object.clone()),
        ..ClassDef::default()
    });
    let s = env.add_class(ClassDef {
        name: "com.example.ObjSupplier".to_string(),
        kind: ClassKind::Interface,
        is_abstract: true,
        methods: vec![MethodDef {
            name: "call".to_string(),
            return_type: object,
            is_abstract: true,
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });
    let target = Type::class(s, vec![]);

    // this(() -> this): the lambda sits inside the explicit ctor argument
    // list, so `this` stays illegal despite the nesting.
    let mut b = BodyBuilder::new();
    let this = b.expr(ExprKind::This);
    let lambda = b.expr(ExprKind::Lambda {
        params: vec![],
        body: LambdaBody::Expr(this),
    });
    let local = b.typed_local("s", target, LocalKind::Local);
    let decl = b.stmt(StmtKind::Let {
        local,
        initializer: Some(lambda),
    });
    let root = b.stmt(StmtKind::Block(vec![decl]));
    let body = b.finish(root);

    let cx = CheckContext {
        enclosing_class: Some(owner),
        is_static: false,
        in_explicit_ctor_args: true,
        ..CheckContext::default()
    };
    let result = check_body(&env, &body, cx);
    assert!(codes(&result.diagnostics).contains(&"SCOPE_STATIC_CONTEXT"));
}

/// A lone overload that rejects the arguments is reported as not applicable
/// to them, not as a missing method.
#[test]
fn single_rejected_candidate_is_reported_as_not_applicable() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = Type::class(env.well_known().object, vec![]);
    let integer = Type::class(env.well_known().integer, vec![]);

    let util = env.add_class(ClassDef {
        name: "com.example.Lone".to_string(),
        super_class: Some(object),
        methods: vec![MethodDef {
            name: "take".to_string(),
            params: vec![integer],
            return_type: Type::Void,
            is_static: true,
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });

    let mut b = BodyBuilder::new();
    let s = b.expr(ExprKind::Literal(Literal::Str("s".into())));
    let call = b.expr(ExprKind::Call {
        receiver: Receiver::Static(Type::class(util, vec![])),
        name: "take".to_string(),
        args: vec![s],
        type_args: vec![],
    });
    let stmt = b.stmt(StmtKind::Expr(call));
    let root = b.stmt(StmtKind::Block(vec![stmt]));
    let body = b.finish(root);

    let result = check_body(&env, &body, CheckContext::default());
    assert!(codes(&result.diagnostics).contains(&"CALL_NOT_APPLICABLE"));
}

/// A generic call whose only possible instantiation violates the declared
/// bound names the type variable instead of a generic no-candidate report.
#[test]
fn bound_violating_inference_names_the_type_variable() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = Type::class(env.well_known().object, vec![]);
    let number = Type::class(env.well_known().number, vec![]);

    // static <T extends Number> void take(T t), called with a String.
    let t = env.add_type_param("T", vec![number]);
    let util = env.add_class(ClassDef {
        name: "com.example.Bounded".to_string(),
        super_class: Some(object),
        methods: vec![MethodDef {
            name: "take".to_string(),
            type_params: vec![t],
            params: vec![Type::TypeVar(t)],
            return_type: Type::Void,
            is_static: true,
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });

    let mut b = BodyBuilder::new();
    let s = b.expr(ExprKind::Literal(Literal::Str("s".into())));
    let call = b.expr(ExprKind::Call {
        receiver: Receiver::Static(Type::class(util, vec![])),
        name: "take".to_string(),
        args: vec![s],
        type_args: vec![],
    });
    let stmt = b.stmt(StmtKind::Expr(call));
    let root = b.stmt(StmtKind::Block(vec![stmt]));
    let body = b.finish(root);

    let result = check_body(&env, &body, CheckContext::default());
    assert!(codes(&result.diagnostics).contains(&"INFER_FAILED"));
}

#[test]
fn checking_is_deterministic() {
    let mut env = TypeStore::with_minimal_jdk();
    let string = Type::class(env.well_known().string, vec![]);
    let f = env.add_class(ClassDef {
        name: "com.example.Det".to_string(),
        kind: ClassKind::Interface,
        is_abstract: true,
        methods: vec![MethodDef {
            name: "call".to_string(),
            params: vec![string.clone()],
            return_type: string,
            is_abstract: true,
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });
    let target = Type::class(f, vec![]);

    let mut b = BodyBuilder::new();
    let p = b.local("p", LocalKind::LambdaParam);
    let p_read = b.expr(ExprKind::Local(p));
    let lambda = b.expr(ExprKind::Lambda {
        params: vec![p],
        body: LambdaBody::Expr(p_read),
    });
    let local = b.typed_local("f", target, LocalKind::Local);
    let decl = b.stmt(StmtKind::Let {
        local,
        initializer: Some(lambda),
    });
    let root = b.stmt(StmtKind::Block(vec![decl]));
    let body = b.finish(root);

    let first = check_body(&env, &body, CheckContext::default());
    let second = check_body(&env, &body, CheckContext::default());
    assert_eq!(first.diagnostics, second.diagnostics);
    assert_eq!(first.expr_types, second.expr_types);
}

#[test]
fn catalog_annotation_validation_finds_bad_annotations() {
    let mut env = TypeStore::with_minimal_jdk();
    env.add_class(ClassDef {
        name: "com.example.BadAnnotated".to_string(),
        kind: ClassKind::Interface,
        is_abstract: true,
        functional_annotation: true,
        methods: vec![
            MethodDef {
                name: "one".to_string(),
                is_abstract: true,
                ..MethodDef::default()
            },
            MethodDef {
                name: "two".to_string(),
                is_abstract: true,
                ..MethodDef::default()
            },
        ],
        ..ClassDef::default()
    });

    let diags = validate_functional_annotations(&env);
    assert_eq!(codes(&diags), vec!["SAM_BAD_ANNOTATION"]);
}
