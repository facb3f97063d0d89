use deneb_types::{
    resolve_method_call, CallArg, CallKind, ClassDef, MethodCall, MethodDef, MethodResolution,
    TyContext, Type, TypeEnv, TypeStore, TypeWarning, UncheckedReason,
};

#[test]
fn warns_for_non_reifiable_varargs_array_creation() {
    let mut env = TypeStore::with_minimal_jdk();
    let object = env.well_known().object;
    let string = env.well_known().string;
    let list = env.class_id("java.util.List").unwrap();

    // `static <T> void m(List<T>... xs)`
    let t = env.add_type_param("T", vec![Type::class(object, vec![])]);
    let util = env.add_class(ClassDef {
        name: "com.example.UncheckedVarargs".to_string(),
        super_class: Some(Type::class(object, vec![])),
        methods: vec![
            MethodDef {
                name: "m".to_string(),
                type_params: vec![t],
                params: vec![Type::array(Type::class(list, vec![Type::TypeVar(t)]))],
                return_type: Type::Void,
                is_static: true,
                is_varargs: true,
                ..MethodDef::default()
            },
            // `static void n(String... xs)` creates a reifiable array.
            MethodDef {
                name: "n".to_string(),
                params: vec![Type::array(Type::class(string, vec![]))],
                return_type: Type::Void,
                is_static: true,
                is_varargs: true,
                ..MethodDef::default()
            },
        ],
        ..ClassDef::default()
    });

    let list_of_string = Type::class(list, vec![Type::class(string, vec![])]);
    let call = MethodCall {
        receiver: Type::class(util, vec![]),
        call_kind: CallKind::Static,
        name: "m",
        args: vec![
            CallArg::Typed(list_of_string.clone()),
            CallArg::Typed(list_of_string),
        ],
        expected_return: None,
        explicit_type_args: vec![],
    };
    let mut ctx = TyContext::new(&env);
    let MethodResolution::Found(res) = resolve_method_call(&mut ctx, &call) else {
        panic!("expected variable-arity resolution");
    };
    assert!(res.used_varargs);
    assert!(res
        .warnings
        .contains(&TypeWarning::Unchecked(UncheckedReason::UncheckedVarargs)));

    let call = MethodCall {
        receiver: Type::class(util, vec![]),
        call_kind: CallKind::Static,
        name: "n",
        args: vec![
            CallArg::Typed(Type::class(string, vec![])),
            CallArg::Typed(Type::class(string, vec![])),
        ],
        expected_return: None,
        explicit_type_args: vec![],
    };
    let mut ctx = TyContext::new(&env);
    let MethodResolution::Found(res) = resolve_method_call(&mut ctx, &call) else {
        panic!("expected variable-arity resolution");
    };
    assert!(res.used_varargs);
    assert!(res.warnings.is_empty());
}
