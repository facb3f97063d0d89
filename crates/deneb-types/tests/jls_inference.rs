use deneb_types::{
    resolve_method_call, CallArg, CallKind, ClassDef, ClassKind, MethodCall, MethodDef,
    MethodResolution, TyContext, Type, TypeEnv, TypeStore,
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
fn infer_simple_identity() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = env.well_known().object;
    let string = env.well_known().string;

    // `static <T> T id(T t)`
    let t = env.add_type_param("T", vec![Type::class(object, vec![])]);
    let test = env.add_class(ClassDef {
        name: "com.example.Test".to_string(),
        super_class: Some(Type::class(object, vec![])),
        methods: vec![MethodDef {
            name: "id".to_string(),
            type_params: vec![t],
            params: vec![Type::TypeVar(t)],
            return_type: Type::TypeVar(t),
            is_static: true,
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });

    let call = static_call(
        Type::class(test, vec![]),
        "id",
        vec![CallArg::Typed(Type::class(string, vec![]))],
    );
    let mut ctx = TyContext::new(&env);
    let MethodResolution::Found(res) = resolve_method_call(&mut ctx, &call) else {
        panic!("expected method resolution success");
    };
    assert_eq!(res.inferred_type_args, vec![Type::class(string, vec![])]);
    assert_eq!(res.return_type, Type::class(string, vec![]));
}

#[test]
fn infer_from_return_context() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = env.well_known().object;
    let string = env.well_known().string;
    let list = env.class_id("java.util.List").unwrap();

    // `static <T> List<T> empty()` with `List<String>` expected
    let t = env.add_type_param("T", vec![Type::class(object, vec![])]);
    let test = env.add_class(ClassDef {
        name: "com.example.Lists".to_string(),
        super_class: Some(Type::class(object, vec![])),
        methods: vec![MethodDef {
            name: "empty".to_string(),
            type_params: vec![t],
            params: vec![],
            return_type: Type::class(list, vec![Type::TypeVar(t)]),
            is_static: true,
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });

    let call = MethodCall {
        receiver: Type::class(test, vec![]),
        call_kind: CallKind::Static,
        name: "empty",
        args: vec![],
        expected_return: Some(Type::class(list, vec![Type::class(string, vec![])])),
        explicit_type_args: vec![],
    };
    let mut ctx = TyContext::new(&env);
    let MethodResolution::Found(res) = resolve_method_call(&mut ctx, &call) else {
        panic!("expected method resolution success");
    };
    assert_eq!(res.inferred_type_args, vec![Type::class(string, vec![])]);
}

#[test]
fn infer_lub_of_two_lower_bounds() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = env.well_known().object;
    let string = env.well_known().string;
    let integer = env.well_known().integer;

    // `static <T> T pick(T a, T b)` with unrelated arguments joins at a
    // common supertype.
    let t = env.add_type_param("T", vec![Type::class(object, vec![])]);
    let test = env.add_class(ClassDef {
        name: "com.example.Pick".to_string(),
        super_class: Some(Type::class(object, vec![])),
        methods: vec![MethodDef {
            name: "pick".to_string(),
            type_params: vec![t],
            params: vec![Type::TypeVar(t), Type::TypeVar(t)],
            return_type: Type::TypeVar(t),
            is_static: true,
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });

    let call = static_call(
        Type::class(test, vec![]),
        "pick",
        vec![
            CallArg::Typed(Type::class(string, vec![])),
            CallArg::Typed(Type::class(integer, vec![])),
        ],
    );
    let mut ctx = TyContext::new(&env);
    let MethodResolution::Found(res) = resolve_method_call(&mut ctx, &call) else {
        panic!("expected method resolution success");
    };
    // String and Integer only share Object/Comparable/Serializable; the
    // instantiation must at least not be one of the two inputs.
    assert_eq!(res.inferred_type_args.len(), 1);
    assert_ne!(res.inferred_type_args[0], Type::class(string, vec![]));
    assert_ne!(res.inferred_type_args[0], Type::class(integer, vec![]));
}

#[test]
fn self_referential_bound_accepts_conforming_argument() {
    let mut env = TypeStore::with_minimal_jdk();
    let string = env.well_known().string;
    let object = env.well_known().object;
    let comparable = env.class_id("java.lang.Comparable").unwrap();

    // `static <T extends Comparable<T>> T max(T a, T b)`
    let t = env.add_type_param("T", vec![Type::class(object, vec![])]);
    env.set_type_param_bounds(t, vec![Type::class(comparable, vec![Type::TypeVar(t)])]);
    let test = env.add_class(ClassDef {
        name: "com.example.Ord".to_string(),
        super_class: Some(Type::class(object, vec![])),
        methods: vec![MethodDef {
            name: "max".to_string(),
            type_params: vec![t],
            params: vec![Type::TypeVar(t), Type::TypeVar(t)],
            return_type: Type::TypeVar(t),
            is_static: true,
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });

    // String implements Comparable<String>.
    let call = static_call(
        Type::class(test, vec![]),
        "max",
        vec![
            CallArg::Typed(Type::class(string, vec![])),
            CallArg::Typed(Type::class(string, vec![])),
        ],
    );
    let mut ctx = TyContext::new(&env);
    let MethodResolution::Found(res) = resolve_method_call(&mut ctx, &call) else {
        panic!("expected method resolution success");
    };
    assert_eq!(res.inferred_type_args, vec![Type::class(string, vec![])]);
}

#[test]
fn self_referential_bound_rejects_non_conforming_argument() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = env.well_known().object;
    let comparable = env.class_id("java.lang.Comparable").unwrap();

    let t = env.add_type_param("T", vec![Type::class(object, vec![])]);
    env.set_type_param_bounds(t, vec![Type::class(comparable, vec![Type::TypeVar(t)])]);
    let plain = env.add_class(ClassDef {
        name: "com.example.Plain".to_string(),
        super_class: Some(Type::class(object, vec![])),
        ..ClassDef::default()
    });
    let test = env.add_class(ClassDef {
        name: "com.example.Ord2".to_string(),
        super_class: Some(Type::class(object, vec![])),
        methods: vec![MethodDef {
            name: "max".to_string(),
            type_params: vec![t],
            params: vec![Type::TypeVar(t), Type::TypeVar(t)],
            return_type: Type::TypeVar(t),
            is_static: true,
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });

    // Plain is not Comparable at all.
    let call = static_call(
        Type::class(test, vec![]),
        "max",
        vec![
            CallArg::Typed(Type::class(plain, vec![])),
            CallArg::Typed(Type::class(plain, vec![])),
        ],
    );
    let mut ctx = TyContext::new(&env);
    match resolve_method_call(&mut ctx, &call) {
        MethodResolution::NoneApplicable { best, .. } => {
            assert!(best.is_some(), "failure should carry the best candidate");
        }
        other => panic!("expected NoneApplicable, got {other:?}"),
    }
}

#[test]
fn throws_only_variable_defaults_to_runtime_exception() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = env.well_known().object;
    let throwable = env.well_known().throwable;
    let runtime_exception = env.well_known().runtime_exception;

    // `static <X extends Throwable> void raise() throws X`
    let x = env.add_type_param("X", vec![Type::class(throwable, vec![])]);
    let test = env.add_class(ClassDef {
        name: "com.example.Raise".to_string(),
        super_class: Some(Type::class(object, vec![])),
        methods: vec![MethodDef {
            name: "raise".to_string(),
            type_params: vec![x],
            params: vec![],
            return_type: Type::Void,
            throws: vec![Type::TypeVar(x)],
            is_static: true,
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });

    let call = static_call(Type::class(test, vec![]), "raise", vec![]);
    let mut ctx = TyContext::new(&env);
    let MethodResolution::Found(res) = resolve_method_call(&mut ctx, &call) else {
        panic!("expected method resolution success");
    };
    assert_eq!(
        res.inferred_type_args,
        vec![Type::class(runtime_exception, vec![])]
    );
    assert_eq!(res.thrown, vec![Type::class(runtime_exception, vec![])]);
}

#[test]
fn explicit_type_arguments_bypass_inference() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = env.well_known().object;
    let string = env.well_known().string;

    let t = env.add_type_param("T", vec![Type::class(object, vec![])]);
    let test = env.add_class(ClassDef {
        name: "com.example.Witness".to_string(),
        super_class: Some(Type::class(object, vec![])),
        methods: vec![MethodDef {
            name: "id".to_string(),
            type_params: vec![t],
            params: vec![Type::TypeVar(t)],
            return_type: Type::TypeVar(t),
            is_static: true,
            ..MethodDef::default()
        }],
        ..ClassDef::default()
    });

    // `Witness.<Object>id("s")` widens the argument instead of inferring
    // String.
    let call = MethodCall {
        receiver: Type::class(test, vec![]),
        call_kind: CallKind::Static,
        name: "id",
        args: vec![CallArg::Typed(Type::class(string, vec![]))],
        expected_return: None,
        explicit_type_args: vec![Type::class(object, vec![])],
    };
    let mut ctx = TyContext::new(&env);
    let MethodResolution::Found(res) = resolve_method_call(&mut ctx, &call) else {
        panic!("expected method resolution success");
    };
    assert_eq!(res.return_type, Type::class(object, vec![]));
    assert_eq!(res.inferred_type_args, vec![Type::class(object, vec![])]);
}

#[test]
fn explicit_type_argument_violating_bound_is_rejected() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = env.well_known().object;
    let string = env.well_known().string;
    let number = env.well_known().number;

    // `static <T extends Number> void take(T t)`
    let t = env.add_type_param("T", vec![Type::class(number, vec![])]);
    let test = env.add_class(ClassDef {
        name: "com.example.Bounded".to_string(),
        super_class: Some(Type::class(object, vec![])),
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

    let call = MethodCall {
        receiver: Type::class(test, vec![]),
        call_kind: CallKind::Static,
        name: "take",
        args: vec![CallArg::Typed(Type::class(string, vec![]))],
        expected_return: None,
        explicit_type_args: vec![Type::class(string, vec![])],
    };
    let mut ctx = TyContext::new(&env);
    assert!(matches!(
        resolve_method_call(&mut ctx, &call),
        MethodResolution::NoneApplicable { .. }
    ));
}
