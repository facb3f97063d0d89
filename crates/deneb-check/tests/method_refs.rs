use deneb_check::{check_body, CheckContext};
use deneb_hir::{BodyBuilder, ExprKind, LocalKind, MethodRefExpr, StmtKind};
use deneb_types::{
    ClassDef, ClassKind, Diagnostic, MethodDef, PrimitiveType, Type, TypeEnv, TypeStore,
};

use pretty_assertions::assert_eq;

fn codes(diags: &[Diagnostic]) -> Vec<&'static str> {
    diags.iter().map(|d| d.code()).collect()
}

fn sam(env: &mut TypeStore, name: &str, params: Vec<Type>, return_type: Type) -> Type {
    let id = env.add_class(ClassDef {
        name: name.to_string(),
        kind: ClassKind::Interface,
        is_abstract: true,
        methods: vec![MethodDef {
            name: "call".to_string(),
            params,
            return_type,
            is_abstract: true,
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });
    Type::class(id, vec![])
}

/// Declare `<target> x = <mref>;` as the whole body.
fn ref_body(target: Type, mref: MethodRefExpr) -> deneb_hir::Body {
    let mut b = BodyBuilder::new();
    let expr = b.expr(ExprKind::MethodRef(mref));
    let local = b.typed_local("x", target, LocalKind::Local);
    let decl = b.stmt(StmtKind::Let {
        local,
        initializer: Some(expr),
    });
    let root = b.stmt(StmtKind::Block(vec![decl]));
    b.finish(root)
}

#[test]
fn bound_reference_resolves_an_instance_member() {
    let mut env = TypeStore::with_minimal_jdk();
    let string = Type::class(env.well_known().string, vec![]);
    let target = sam(
        &mut env,
        "com.example.Len",
        vec![],
        Type::Primitive(PrimitiveType::Int),
    );

    // String s = "a"; Len l = s::length;
    let mut b = BodyBuilder::new();
    let s = b.typed_local("s", string, LocalKind::Local);
    let lit = b.expr(ExprKind::Literal(deneb_hir::Literal::Str("a".into())));
    let decl_s = b.stmt(StmtKind::Let {
        local: s,
        initializer: Some(lit),
    });
    let receiver = b.expr(ExprKind::Local(s));
    let mref = b.expr(ExprKind::MethodRef(MethodRefExpr::Bound {
        receiver,
        name: "length".to_string(),
    }));
    let l = b.typed_local("l", target, LocalKind::Local);
    let decl_l = b.stmt(StmtKind::Let {
        local: l,
        initializer: Some(mref),
    });
    let root = b.stmt(StmtKind::Block(vec![decl_s, decl_l]));
    let body = b.finish(root);

    let result = check_body(&env, &body, CheckContext::default());
    assert_eq!(codes(&result.diagnostics), Vec::<&str>::new());
    assert!(result.calls.iter().any(|(id, rc)| *id == mref && rc.name == "length"));
}

#[test]
fn unbound_reference_binds_the_receiver_to_the_first_parameter() {
    let mut env = TypeStore::with_minimal_jdk();
    let string = Type::class(env.well_known().string, vec![]);
    // interface StrLen { int call(String s); }: String::length fits with the
    // receiver taken from the first parameter.
    let target = sam(
        &mut env,
        "com.example.StrLen",
        vec![string.clone()],
        Type::Primitive(PrimitiveType::Int),
    );

    let body = ref_body(
        target,
        MethodRefExpr::Unbound {
            class: string,
            name: "length".to_string(),
        },
    );
    let result = check_body(&env, &body, CheckContext::default());
    assert_eq!(codes(&result.diagnostics), Vec::<&str>::new());
}

#[test]
fn unknown_member_reference_reports_no_candidate() {
    let mut env = TypeStore::with_minimal_jdk();
    let string = Type::class(env.well_known().string, vec![]);
    let target = sam(
        &mut env,
        "com.example.Nope",
        vec![string.clone()],
        Type::Primitive(PrimitiveType::Int),
    );

    let body = ref_body(
        target,
        MethodRefExpr::Unbound {
            class: string,
            name: "no_such_method".to_string(),
        },
    );
    let result = check_body(&env, &body, CheckContext::default());
    assert!(codes(&result.diagnostics).contains(&"CALL_NO_CANDIDATE"));
}

#[test]
fn constructor_reference_to_an_interface_cannot_instantiate() {
    let mut env = TypeStore::with_minimal_jdk();
    let iterable = env.lookup_class("java.lang.Iterable").unwrap();
    let object = Type::class(env.well_known().object, vec![]);
    let target = sam(&mut env, "com.example.Make", vec![], object.clone());

    let body = ref_body(
        target,
        MethodRefExpr::Ctor {
            class: Type::class(iterable, vec![object]),
        },
    );
    let result = check_body(&env, &body, CheckContext::default());
    assert!(codes(&result.diagnostics).contains(&"REF_CANNOT_INSTANTIATE"));
}

#[test]
fn constructor_reference_selects_a_constructor_by_descriptor_arity() {
    let mut env = TypeStore::with_minimal_jdk();
    let array_list = env.class_id("java.util.ArrayList").unwrap();
    let string = Type::class(env.well_known().string, vec![]);
    let list = env.class_id("java.util.List").unwrap();
    // interface NewList { List<String> call(int capacity); }
    let target = sam(
        &mut env,
        "com.example.NewList",
        vec![Type::Primitive(PrimitiveType::Int)],
        Type::class(list, vec![string.clone()]),
    );

    let body = ref_body(
        target,
        MethodRefExpr::Ctor {
            class: Type::class(array_list, vec![string]),
        },
    );
    let result = check_body(&env, &body, CheckContext::default());
    assert_eq!(codes(&result.diagnostics), Vec::<&str>::new());
}

#[test]
fn array_constructor_reference_requires_an_int_parameter() {
    let mut env = TypeStore::with_minimal_jdk();
    let string = Type::class(env.well_known().string, vec![]);
    let object = Type::class(env.well_known().object, vec![]);

    // Good: int parameter, Object return.
    let good = sam(
        &mut env,
        "com.example.MakeArr",
        vec![Type::Primitive(PrimitiveType::Int)],
        object.clone(),
    );
    let body = ref_body(
        good,
        MethodRefExpr::ArrayCtor {
            component: string.clone(),
        },
    );
    let result = check_body(&env, &body, CheckContext::default());
    assert_eq!(codes(&result.diagnostics), Vec::<&str>::new());

    // Bad: String size parameter.
    let bad = sam(&mut env, "com.example.MakeArr2", vec![string.clone()], object);
    let body = ref_body(
        bad,
        MethodRefExpr::ArrayCtor { component: string },
    );
    let result = check_body(&env, &body, CheckContext::default());
    assert!(codes(&result.diagnostics).contains(&"LAMBDA_PARAM_TYPE"));
}

#[test]
fn array_constructor_reference_rejects_generic_components() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = Type::class(env.well_known().object, vec![]);
    let t = env.add_type_param("T", vec![object.clone()]);
    let target = sam(
        &mut env,
        "com.example.MakeGen",
        vec![Type::Primitive(PrimitiveType::Int)],
        object,
    );

    let body = ref_body(
        target,
        MethodRefExpr::ArrayCtor {
            component: Type::TypeVar(t),
        },
    );
    let result = check_body(&env, &body, CheckContext::default());
    assert!(codes(&result.diagnostics).contains(&"REF_CANNOT_INSTANTIATE"));
}

#[test]
fn super_reference_to_an_abstract_method_is_illegal() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = Type::class(env.well_known().object, vec![]);

    // interface A { void m(); } class C implements A { ... }
    let a = env.add_class(ClassDef {
        name: "com.example.A".to_string(),
        kind: ClassKind::Interface,
        is_abstract: true,
        methods: vec![MethodDef {
            name: "m".to_string(),
            is_abstract: true,
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });
    let c = env.add_class(ClassDef {
        name: "com.example.C".to_string(),
        super_class: Some(object),
        interfaces: vec![Type::class(a, vec![])],
        ..ClassDef::default()
    });
    let target = sam(&mut env, "com.example.Run", vec![], Type::Void);

    let body = ref_body(
        target,
        MethodRefExpr::Super {
            class: Some(Type::class(a, vec![])),
            name: "m".to_string(),
        },
    );
    let cx = CheckContext {
        enclosing_class: Some(c),
        ..CheckContext::default()
    };
    let result = check_body(&env, &body, cx);
    assert!(codes(&result.diagnostics).contains(&"REF_SUPER"));
}

#[test]
fn super_reference_in_a_static_context_is_illegal() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = Type::class(env.well_known().object, vec![]);
    let c = env.add_class(ClassDef {
        name: "com.example.StaticCtx".to_string(),
        super_class: Some(object),
        ..ClassDef::default()
    });
    let target = sam(&mut env, "com.example.Run2", vec![], Type::Void);

    let body = ref_body(
        target,
        MethodRefExpr::Super {
            class: None,
            name: "toString".to_string(),
        },
    );
    let cx = CheckContext {
        enclosing_class: Some(c),
        is_static: true,
        ..CheckContext::default()
    };
    let result = check_body(&env, &body, cx);
    assert!(codes(&result.diagnostics).contains(&"REF_SUPER"));
}

#[test]
fn super_reference_must_name_a_direct_supertype() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = Type::class(env.well_known().object, vec![]);

    // class Base { void m() {} } ; class Mid extends Base ; class C extends Mid
    let base = env.add_class(ClassDef {
        name: "com.example.Base".to_string(),
        super_class: Some(object),
        methods: vec![MethodDef {
            name: "m".to_string(),
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });
    let mid = env.add_class(ClassDef {
        name: "com.example.Mid".to_string(),
        super_class: Some(Type::class(base, vec![])),
        ..ClassDef::default()
    });
    let c = env.add_class(ClassDef {
        name: "com.example.Bottom".to_string(),
        super_class: Some(Type::class(mid, vec![])),
        ..ClassDef::default()
    });
    let target = sam(&mut env, "com.example.Run3", vec![], Type::Void);

    // `Base.super::m` skips Mid: not a direct supertype of Bottom.
    let body = ref_body(
        target,
        MethodRefExpr::Super {
            class: Some(Type::class(base, vec![])),
            name: "m".to_string(),
        },
    );
    let cx = CheckContext {
        enclosing_class: Some(c),
        ..CheckContext::default()
    };
    let result = check_body(&env, &body, cx);
    assert!(codes(&result.diagnostics).contains(&"REF_SUPER"));
}

#[test]
fn super_reference_to_a_concrete_inherited_method_is_fine() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = Type::class(env.well_known().object, vec![]);

    let base = env.add_class(ClassDef {
        name: "com.example.Parent".to_string(),
        super_class: Some(object),
        methods: vec![MethodDef {
            name: "m".to_string(),
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });
    let c = env.add_class(ClassDef {
        name: "com.example.Child".to_string(),
        super_class: Some(Type::class(base, vec![])),
        ..ClassDef::default()
    });
    let target = sam(&mut env, "com.example.Run4", vec![], Type::Void);

    let body = ref_body(
        target,
        MethodRefExpr::Super {
            class: Some(Type::class(base, vec![])),
            name: "m".to_string(),
        },
    );
    let cx = CheckContext {
        enclosing_class: Some(c),
        ..CheckContext::default()
    };
    let result = check_body(&env, &body, cx);
    assert_eq!(codes(&result.diagnostics), Vec::<&str>::new());
}
