//! Shape-level renditions of the seed scenarios: what the resolver decides
//! from poly-argument summaries alone, before any body checking.

use deneb_types::{
    resolve_method_call, CallArg, CallKind, ClassDef, ClassKind, LambdaBodyShape,
    LambdaParamList, LambdaShape, MethodCall, MethodDef, MethodResolution, NotApplicableReason,
    PolyArg, PolyArgKind, TyContext, Type, TypeEnv, TypeStore,
};

fn lambda_arg(handle: u32, params: LambdaParamList, body: LambdaBodyShape) -> CallArg {
    CallArg::Poly(PolyArg {
        handle,
        kind: PolyArgKind::Lambda(LambdaShape { params, body }),
    })
}

fn sam(env: &mut TypeStore, name: &str, method: MethodDef) -> deneb_types::ClassId {
    env.add_class(ClassDef {
        name: name.to_string(),
        kind: ClassKind::Interface,
        is_abstract: true,
        methods: vec![MethodDef {
            is_abstract: true,
            ..method
        }],
        ..ClassDef::default()
    })
}

/// A one-parameter lambda fails a zero-parameter descriptor in every phase.
#[test]
fn lambda_arity_mismatch_fails_all_phases() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = env.well_known().object;

    let i = sam(
        &mut env,
        "com.example.I",
        MethodDef {
            name: "foo".to_string(),
            ..MethodDef::default()
        },
    );
    let test = env.add_class(ClassDef {
        name: "com.example.Use".to_string(),
        super_class: Some(Type::class(object, vec![])),
        methods: vec![MethodDef {
            name: "run".to_string(),
            params: vec![Type::class(i, vec![])],
            return_type: Type::Void,
            is_static: true,
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });

    let call = MethodCall {
        receiver: Type::class(test, vec![]),
        call_kind: CallKind::Static,
        name: "run",
        args: vec![lambda_arg(
            0,
            LambdaParamList::Elided(1),
            LambdaBodyShape::Block {
                value_compatible: false,
                void_compatible: true,
            },
        )],
        expected_return: None,
        explicit_type_args: vec![],
    };
    let mut ctx = TyContext::new(&env);
    let MethodResolution::NoneApplicable { best, .. } = resolve_method_call(&mut ctx, &call)
    else {
        panic!("expected failure in every phase");
    };
    let best = best.expect("reasons for the only candidate");
    assert!(!best.phases.is_empty());
    assert!(best
        .phases
        .iter()
        .all(|p| matches!(p.reason, NotApplicableReason::ShapeMismatch { index: 0 })));
}

/// `foo(() -> { return 1; })` must reject the void-returning target and pick
/// the value-returning one, with no ambiguity.
#[test]
fn value_returning_block_selects_the_non_void_overload() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = env.well_known().object;
    let integer = env.well_known().integer;

    let i = sam(
        &mut env,
        "com.example.VoidSam",
        MethodDef {
            name: "foo".to_string(),
            ..MethodDef::default()
        },
    );
    let j = sam(
        &mut env,
        "com.example.IntSam",
        MethodDef {
            name: "foo".to_string(),
            return_type: Type::class(integer, vec![]),
            ..MethodDef::default()
        },
    );
    let test = env.add_class(ClassDef {
        name: "com.example.Overloads".to_string(),
        super_class: Some(Type::class(object, vec![])),
        methods: vec![
            MethodDef {
                name: "foo".to_string(),
                params: vec![Type::class(i, vec![])],
                return_type: Type::Void,
                is_static: true,
                ..MethodDef::default()
            },
            MethodDef {
                name: "foo".to_string(),
                params: vec![Type::class(j, vec![])],
                return_type: Type::Void,
                is_static: true,
                ..MethodDef::default()
            },
        ],
        ..ClassDef::default()
    });

    let call = MethodCall {
        receiver: Type::class(test, vec![]),
        call_kind: CallKind::Static,
        name: "foo",
        args: vec![lambda_arg(
            0,
            LambdaParamList::Elided(0),
            // `{ return 1; }`: every path returns a value.
            LambdaBodyShape::Block {
                value_compatible: true,
                void_compatible: false,
            },
        )],
        expected_return: None,
        explicit_type_args: vec![],
    };
    let mut ctx = TyContext::new(&env);
    let MethodResolution::Found(res) = resolve_method_call(&mut ctx, &call) else {
        panic!("expected unambiguous selection");
    };
    assert_eq!(res.formals, vec![Type::class(j, vec![])]);
}

/// A collector-style factory with four parameters never half-matches a
/// three-argument call: the failure is a hard `NoneApplicable`, not a
/// partial inference result.
#[test]
fn missing_argument_is_a_hard_arity_failure() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = env.well_known().object;
    let supplier = env.lookup_class("java.util.function.Supplier").unwrap();
    let bi_function = env.lookup_class("java.util.function.BiFunction").unwrap();
    let binary_op = env.lookup_class("java.util.function.BinaryOperator").unwrap();
    let function = env.lookup_class("java.util.function.Function").unwrap();

    // `static <T, A, R> Collector of(Supplier<A>, BiFunction<A,T,A>,
    //  BinaryOperator<A>, Function<A,R>)`
    let t = env.add_type_param("T", vec![Type::class(object, vec![])]);
    let a = env.add_type_param("A", vec![Type::class(object, vec![])]);
    let r = env.add_type_param("R", vec![Type::class(object, vec![])]);
    let collector = env.add_class(ClassDef {
        name: "com.example.Collector".to_string(),
        kind: ClassKind::Interface,
        is_abstract: true,
        ..ClassDef::default()
    });
    let test = env.add_class(ClassDef {
        name: "com.example.Collectors".to_string(),
        super_class: Some(Type::class(object, vec![])),
        methods: vec![MethodDef {
            name: "of".to_string(),
            type_params: vec![t, a, r],
            params: vec![
                Type::class(supplier, vec![Type::TypeVar(a)]),
                Type::class(
                    bi_function,
                    vec![Type::TypeVar(a), Type::TypeVar(t), Type::TypeVar(a)],
                ),
                Type::class(binary_op, vec![Type::TypeVar(a)]),
                Type::class(function, vec![Type::TypeVar(a), Type::TypeVar(r)]),
            ],
            return_type: Type::class(collector, vec![]),
            is_static: true,
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });

    // Only three arguments: the trailing Function supplier is missing.
    let call = MethodCall {
        receiver: Type::class(test, vec![]),
        call_kind: CallKind::Static,
        name: "of",
        args: vec![
            lambda_arg(
                0,
                LambdaParamList::Elided(0),
                LambdaBodyShape::Expression {
                    statement_expression: true,
                },
            ),
            lambda_arg(
                1,
                LambdaParamList::Elided(2),
                LambdaBodyShape::Expression {
                    statement_expression: true,
                },
            ),
            lambda_arg(
                2,
                LambdaParamList::Elided(2),
                LambdaBodyShape::Block {
                    value_compatible: false,
                    void_compatible: true,
                },
            ),
        ],
        expected_return: None,
        explicit_type_args: vec![],
    };
    let mut ctx = TyContext::new(&env);
    let MethodResolution::NoneApplicable { best, .. } = resolve_method_call(&mut ctx, &call)
    else {
        panic!("expected NoneApplicable for the missing argument");
    };
    let best = best.expect("arity reasons");
    assert!(best
        .phases
        .iter()
        .any(|p| matches!(
            p.reason,
            NotApplicableReason::ArityMismatch {
                expected: 4,
                found: 3
            }
        )));
}
