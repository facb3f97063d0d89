use deneb_types::{
    resolve_ctor_call, resolve_method_call, CallArg, CallKind, ClassDef, ClassKind, CtorCall,
    CtorDef, MethodCall, MethodDef, MethodResolution, NotApplicableReason, PrimitiveType,
    TyContext, Type, TypeEnv, TypeStore,
};

use pretty_assertions::assert_eq;

fn static_call<'a>(receiver: Type, name: &'a str, args: Vec<CallArg>) -> MethodCall<'a> {
    MethodCall {
        receiver,
        call_kind: CallKind::Static,
        name,
        args,
        expected_return: None,
        explicit_type_args: vec![],
    }
}

#[test]
fn loose_phase_boxes_where_strict_refuses() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = env.well_known().object;
    let integer = env.well_known().integer;

    let test = env.add_class(ClassDef {
        name: "com.example.Boxing".to_string(),
        super_class: Some(Type::class(object, vec![])),
        methods: vec![MethodDef {
            name: "take".to_string(),
            params: vec![Type::class(integer, vec![])],
            return_type: Type::Void,
            is_static: true,
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });

    let call = static_call(
        Type::class(test, vec![]),
        "take",
        vec![CallArg::Typed(Type::Primitive(PrimitiveType::Int))],
    );
    let mut ctx = TyContext::new(&env);
    let MethodResolution::Found(res) = resolve_method_call(&mut ctx, &call) else {
        panic!("boxing must make the loose phase applicable");
    };
    assert!(!res.used_varargs);
    assert_eq!(res.formals, vec![Type::class(integer, vec![])]);
}

#[test]
fn most_specific_overload_wins() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = env.well_known().object;
    let string = env.well_known().string;

    let test = env.add_class(ClassDef {
        name: "com.example.Specific".to_string(),
        super_class: Some(Type::class(object, vec![])),
        methods: vec![
            MethodDef {
                name: "show".to_string(),
                params: vec![Type::class(object, vec![])],
                return_type: Type::Void,
                is_static: true,
                ..MethodDef::default()
            },
            MethodDef {
                name: "show".to_string(),
                params: vec![Type::class(string, vec![])],
                return_type: Type::Void,
                is_static: true,
                ..MethodDef::default()
            },
        ],
        ..ClassDef::default()
    });

    let call = static_call(
        Type::class(test, vec![]),
        "show",
        vec![CallArg::Typed(Type::class(string, vec![]))],
    );
    let mut ctx = TyContext::new(&env);
    let MethodResolution::Found(res) = resolve_method_call(&mut ctx, &call) else {
        panic!("expected resolution success");
    };
    assert_eq!(res.formals, vec![Type::class(string, vec![])]);
}

#[test]
fn unrelated_candidates_are_ambiguous() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = env.well_known().object;
    let string = env.well_known().string;
    let integer = env.well_known().integer;

    let test = env.add_class(ClassDef {
        name: "com.example.Amb".to_string(),
        super_class: Some(Type::class(object, vec![])),
        methods: vec![
            MethodDef {
                name: "take".to_string(),
                params: vec![Type::class(string, vec![])],
                return_type: Type::Void,
                is_static: true,
                ..MethodDef::default()
            },
            MethodDef {
                name: "take".to_string(),
                params: vec![Type::class(integer, vec![])],
                return_type: Type::Void,
                is_static: true,
                ..MethodDef::default()
            },
        ],
        ..ClassDef::default()
    });

    // `take(null)` fits both and neither formal is more specific.
    let call = static_call(
        Type::class(test, vec![]),
        "take",
        vec![CallArg::Typed(Type::Null)],
    );
    let mut ctx = TyContext::new(&env);
    match resolve_method_call(&mut ctx, &call) {
        MethodResolution::Ambiguous { candidates, .. } => {
            assert_eq!(candidates.len(), 2);
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
}

#[test]
fn variable_arity_phase_packs_trailing_arguments() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = env.well_known().object;
    let string = env.well_known().string;

    // `static void log(String first, String... rest)`
    let test = env.add_class(ClassDef {
        name: "com.example.Log".to_string(),
        super_class: Some(Type::class(object, vec![])),
        methods: vec![MethodDef {
            name: "log".to_string(),
            params: vec![
                Type::class(string, vec![]),
                Type::array(Type::class(string, vec![])),
            ],
            return_type: Type::Void,
            is_static: true,
            is_varargs: true,
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });

    let call = static_call(
        Type::class(test, vec![]),
        "log",
        vec![
            CallArg::Typed(Type::class(string, vec![])),
            CallArg::Typed(Type::class(string, vec![])),
            CallArg::Typed(Type::class(string, vec![])),
        ],
    );
    let mut ctx = TyContext::new(&env);
    let MethodResolution::Found(res) = resolve_method_call(&mut ctx, &call) else {
        panic!("expected variable-arity success");
    };
    assert!(res.used_varargs);
    assert_eq!(res.formals.len(), 3);

    // Passing the array directly stays fixed-arity.
    let call = static_call(
        Type::class(test, vec![]),
        "log",
        vec![
            CallArg::Typed(Type::class(string, vec![])),
            CallArg::Typed(Type::array(Type::class(string, vec![]))),
        ],
    );
    let mut ctx = TyContext::new(&env);
    let MethodResolution::Found(res) = resolve_method_call(&mut ctx, &call) else {
        panic!("expected fixed-arity success");
    };
    assert!(!res.used_varargs);
}

#[test]
fn varargs_element_mismatch_is_reported_as_such() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = env.well_known().object;
    let string = env.well_known().string;
    let integer = env.well_known().integer;

    let test = env.add_class(ClassDef {
        name: "com.example.Pack".to_string(),
        super_class: Some(Type::class(object, vec![])),
        methods: vec![MethodDef {
            name: "pack".to_string(),
            params: vec![Type::array(Type::class(string, vec![]))],
            return_type: Type::Void,
            is_static: true,
            is_varargs: true,
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });

    let call = static_call(
        Type::class(test, vec![]),
        "pack",
        vec![
            CallArg::Typed(Type::class(string, vec![])),
            CallArg::Typed(Type::class(integer, vec![])),
        ],
    );
    let mut ctx = TyContext::new(&env);
    let MethodResolution::NoneApplicable { best, .. } = resolve_method_call(&mut ctx, &call)
    else {
        panic!("expected failure");
    };
    let best = best.expect("best candidate reasons");
    assert!(best.phases.iter().any(|p| matches!(
        p.reason,
        NotApplicableReason::VarargsMismatch { index: 1, .. }
    )));
}

#[test]
fn constructor_diamond_inference_uses_expected_type() {
    let mut env = TypeStore::with_minimal_jdk();
    let string = env.well_known().string;
    let array_list = env.class_id("java.util.ArrayList").unwrap();
    let list = env.class_id("java.util.List").unwrap();

    // `List<String> xs = new ArrayList<>();`
    let call = CtorCall {
        class: Type::class(array_list, vec![]),
        args: vec![],
        expected_return: Some(Type::class(list, vec![Type::class(string, vec![])])),
        explicit_type_args: vec![],
    };
    let mut ctx = TyContext::new(&env);
    let MethodResolution::Found(res) = resolve_ctor_call(&mut ctx, &call) else {
        panic!("expected diamond inference success");
    };
    assert_eq!(
        res.return_type,
        Type::class(array_list, vec![Type::class(string, vec![])])
    );
}

#[test]
fn instance_methods_are_hidden_from_static_calls() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = env.well_known().object;
    let string = env.well_known().string;

    let test = env.add_class(ClassDef {
        name: "com.example.Inst".to_string(),
        kind: ClassKind::Class,
        super_class: Some(Type::class(object, vec![])),
        methods: vec![MethodDef {
            name: "go".to_string(),
            params: vec![Type::class(string, vec![])],
            return_type: Type::Void,
            is_static: false,
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });

    let call = static_call(
        Type::class(test, vec![]),
        "go",
        vec![CallArg::Typed(Type::class(string, vec![]))],
    );
    let mut ctx = TyContext::new(&env);
    assert!(matches!(
        resolve_method_call(&mut ctx, &call),
        MethodResolution::NoSuchMember { .. }
    ));
}

#[test]
fn overridden_declarations_contribute_one_candidate() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = env.well_known().object;
    let string = env.well_known().string;

    let base = env.add_class(ClassDef {
        name: "com.example.Base".to_string(),
        super_class: Some(Type::class(object, vec![])),
        methods: vec![MethodDef {
            name: "go".to_string(),
            params: vec![Type::class(string, vec![])],
            return_type: Type::Void,
            ..MethodDef::default()
        }],
        constructors: vec![CtorDef::default()],
        ..ClassDef::default()
    });
    let derived = env.add_class(ClassDef {
        name: "com.example.Derived".to_string(),
        super_class: Some(Type::class(base, vec![])),
        methods: vec![MethodDef {
            name: "go".to_string(),
            params: vec![Type::class(string, vec![])],
            return_type: Type::Void,
            ..MethodDef::default()
        }],
        constructors: vec![CtorDef::default()],
        ..ClassDef::default()
    });

    // Were the override double-counted, this unique call would come back
    // ambiguous.
    let call = MethodCall {
        receiver: Type::class(derived, vec![]),
        call_kind: CallKind::Instance,
        name: "go",
        args: vec![CallArg::Typed(Type::class(string, vec![]))],
        expected_return: None,
        explicit_type_args: vec![],
    };
    let mut ctx = TyContext::new(&env);
    let MethodResolution::Found(res) = resolve_method_call(&mut ctx, &call) else {
        panic!("expected unique resolution");
    };
    assert_eq!(res.owner, derived);
}
