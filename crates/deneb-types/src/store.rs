//! The type catalog: declared classes, interfaces and type parameters.
//!
//! The engine only ever *reads* the catalog during resolution (through the
//! [`TypeEnv`] trait); mutation happens up front while a driver loads
//! declarations. [`TypeStore`] is the owning implementation, with a
//! [`TypeStore::with_minimal_jdk`] constructor seeding the handful of
//! `java.lang`/`java.util` shapes the algorithms and tests rely on.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ty::{PrimitiveType, Type};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(pub(crate) u32);

impl ClassId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeVarId(pub(crate) u32);

impl fmt::Debug for TypeVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeVarId({})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassKind {
    Class,
    Interface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Package,
    Private,
}

/// A declared type parameter.
///
/// `lower_bound` is only ever set for capture variables minted from
/// `? super T` wildcards; source-declared parameters have upper bounds only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeParamDef {
    pub name: String,
    pub upper_bounds: Vec<Type>,
    pub lower_bound: Option<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub ty: Type,
    pub is_static: bool,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    pub type_params: Vec<TypeVarId>,
    pub params: Vec<Type>,
    pub return_type: Type,
    pub throws: Vec<Type>,
    pub is_static: bool,
    pub is_varargs: bool,
    pub is_abstract: bool,
    pub is_default: bool,
    pub visibility: Visibility,
}

impl Default for MethodDef {
    fn default() -> Self {
        MethodDef {
            name: String::new(),
            type_params: Vec::new(),
            params: Vec::new(),
            return_type: Type::Void,
            throws: Vec::new(),
            is_static: false,
            is_varargs: false,
            is_abstract: false,
            is_default: false,
            visibility: Visibility::Public,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CtorDef {
    pub type_params: Vec<TypeVarId>,
    pub params: Vec<Type>,
    pub throws: Vec<Type>,
    pub is_varargs: bool,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    pub kind: ClassKind,
    pub type_params: Vec<TypeVarId>,
    pub super_class: Option<Type>,
    pub interfaces: Vec<Type>,
    pub fields: Vec<FieldDef>,
    pub constructors: Vec<CtorDef>,
    pub methods: Vec<MethodDef>,
    pub is_abstract: bool,
    /// Whether the declaration carries an explicit functional-interface
    /// annotation to validate.
    pub functional_annotation: bool,
    /// The lexically enclosing class for (non-static) inner classes.
    pub enclosing_class: Option<ClassId>,
}

impl Default for ClassDef {
    fn default() -> Self {
        ClassDef {
            name: String::new(),
            kind: ClassKind::Class,
            type_params: Vec::new(),
            super_class: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            constructors: Vec::new(),
            methods: Vec::new(),
            is_abstract: false,
            functional_annotation: false,
            enclosing_class: None,
        }
    }
}

/// Frequently consulted catalog entries, resolved once at store construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WellKnownTypes {
    pub object: ClassId,
    pub string: ClassId,
    pub boolean: ClassId,
    pub byte: ClassId,
    pub short: ClassId,
    pub character: ClassId,
    pub integer: ClassId,
    pub long: ClassId,
    pub float: ClassId,
    pub double: ClassId,
    pub number: ClassId,
    pub cloneable: ClassId,
    pub serializable: ClassId,
    pub throwable: ClassId,
    pub exception: ClassId,
    pub runtime_exception: ClassId,
    pub error: ClassId,
}

impl WellKnownTypes {
    /// The boxed class for a primitive (JLS 5.1.7).
    #[must_use]
    pub fn boxed(&self, p: PrimitiveType) -> ClassId {
        match p {
            PrimitiveType::Boolean => self.boolean,
            PrimitiveType::Byte => self.byte,
            PrimitiveType::Short => self.short,
            PrimitiveType::Char => self.character,
            PrimitiveType::Int => self.integer,
            PrimitiveType::Long => self.long,
            PrimitiveType::Float => self.float,
            PrimitiveType::Double => self.double,
        }
    }

    /// The primitive a boxed class unboxes to, if any (JLS 5.1.8).
    #[must_use]
    pub fn unboxed(&self, id: ClassId) -> Option<PrimitiveType> {
        if id == self.boolean {
            Some(PrimitiveType::Boolean)
        } else if id == self.byte {
            Some(PrimitiveType::Byte)
        } else if id == self.short {
            Some(PrimitiveType::Short)
        } else if id == self.character {
            Some(PrimitiveType::Char)
        } else if id == self.integer {
            Some(PrimitiveType::Int)
        } else if id == self.long {
            Some(PrimitiveType::Long)
        } else if id == self.float {
            Some(PrimitiveType::Float)
        } else if id == self.double {
            Some(PrimitiveType::Double)
        } else {
            None
        }
    }
}

/// Read-only view of the type catalog.
///
/// Resolution algorithms take `&dyn TypeEnv` so they can run against either
/// the global [`TypeStore`] or a capture-conversion overlay
/// ([`crate::TyContext`]).
pub trait TypeEnv {
    fn class(&self, id: ClassId) -> Option<&ClassDef>;
    fn type_param(&self, id: TypeVarId) -> Option<&TypeParamDef>;
    fn lookup_class(&self, name: &str) -> Option<ClassId>;
    fn well_known(&self) -> &WellKnownTypes;
}

#[derive(Debug, Clone)]
pub struct TypeStore {
    classes: Vec<ClassDef>,
    by_name: HashMap<String, ClassId>,
    type_params: Vec<TypeParamDef>,
    well_known: WellKnownTypes,
}

impl TypeStore {
    /// An empty catalog still needs the `java.lang` backbone: every algorithm
    /// in this crate assumes `Object` and the boxed primitives exist.
    #[must_use]
    pub fn with_minimal_jdk() -> TypeStore {
        let mut classes = Vec::new();
        let mut by_name = HashMap::new();
        let mut alloc = |name: &str| {
            let id = ClassId(classes.len() as u32);
            classes.push(ClassDef {
                name: name.to_string(),
                ..ClassDef::default()
            });
            by_name.insert(name.to_string(), id);
            id
        };

        let object = alloc("java.lang.Object");
        let string = alloc("java.lang.String");
        let boolean = alloc("java.lang.Boolean");
        let byte = alloc("java.lang.Byte");
        let short = alloc("java.lang.Short");
        let character = alloc("java.lang.Character");
        let integer = alloc("java.lang.Integer");
        let long = alloc("java.lang.Long");
        let float = alloc("java.lang.Float");
        let double = alloc("java.lang.Double");
        let number = alloc("java.lang.Number");
        let cloneable = alloc("java.lang.Cloneable");
        let serializable = alloc("java.io.Serializable");
        let throwable = alloc("java.lang.Throwable");
        let exception = alloc("java.lang.Exception");
        let runtime_exception = alloc("java.lang.RuntimeException");
        let error = alloc("java.lang.Error");

        let well_known = WellKnownTypes {
            object,
            string,
            boolean,
            byte,
            short,
            character,
            integer,
            long,
            float,
            double,
            number,
            cloneable,
            serializable,
            throwable,
            exception,
            runtime_exception,
            error,
        };

        let mut store = TypeStore {
            classes,
            by_name,
            type_params: Vec::new(),
            well_known,
        };
        store.seed_java_lang();
        store.seed_collections();
        store.seed_functional_interfaces();
        store
    }

    fn seed_java_lang(&mut self) {
        let wk = self.well_known;
        let object_ty = Type::class(wk.object, vec![]);

        {
            let object = &mut self.classes[wk.object.index()];
            object.methods = vec![
                MethodDef {
                    name: "equals".to_string(),
                    params: vec![Type::class(wk.object, vec![])],
                    return_type: Type::Primitive(PrimitiveType::Boolean),
                    ..MethodDef::default()
                },
                MethodDef {
                    name: "hashCode".to_string(),
                    return_type: Type::Primitive(PrimitiveType::Int),
                    ..MethodDef::default()
                },
                MethodDef {
                    name: "toString".to_string(),
                    return_type: Type::class(wk.string, vec![]),
                    ..MethodDef::default()
                },
            ];
            object.constructors = vec![CtorDef::default()];
        }

        // java.lang.Comparable<T>
        let comparable_t = self.add_type_param("T", vec![object_ty.clone()]);
        let comparable = self.add_class(ClassDef {
            name: "java.lang.Comparable".to_string(),
            kind: ClassKind::Interface,
            type_params: vec![comparable_t],
            methods: vec![MethodDef {
                name: "compareTo".to_string(),
                params: vec![Type::TypeVar(comparable_t)],
                return_type: Type::Primitive(PrimitiveType::Int),
                is_abstract: true,
                ..MethodDef::default()
            }],
            is_abstract: true,
            ..ClassDef::default()
        });

        // java.lang.CharSequence
        let char_sequence = self.add_class(ClassDef {
            name: "java.lang.CharSequence".to_string(),
            kind: ClassKind::Interface,
            methods: vec![MethodDef {
                name: "length".to_string(),
                return_type: Type::Primitive(PrimitiveType::Int),
                is_abstract: true,
                ..MethodDef::default()
            }],
            is_abstract: true,
            ..ClassDef::default()
        });

        {
            let string = &mut self.classes[wk.string.index()];
            string.super_class = Some(object_ty.clone());
            string.interfaces = vec![
                Type::class(comparable, vec![Type::class(wk.string, vec![])]),
                Type::class(char_sequence, vec![]),
                Type::class(wk.serializable, vec![]),
            ];
            string.methods = vec![
                MethodDef {
                    name: "length".to_string(),
                    return_type: Type::Primitive(PrimitiveType::Int),
                    ..MethodDef::default()
                },
                MethodDef {
                    name: "compareTo".to_string(),
                    params: vec![Type::class(wk.string, vec![])],
                    return_type: Type::Primitive(PrimitiveType::Int),
                    ..MethodDef::default()
                },
                MethodDef {
                    name: "concat".to_string(),
                    params: vec![Type::class(wk.string, vec![])],
                    return_type: Type::class(wk.string, vec![]),
                    ..MethodDef::default()
                },
            ];
            string.constructors = vec![CtorDef::default()];
        }

        for iface in [wk.cloneable, wk.serializable] {
            let def = &mut self.classes[iface.index()];
            def.kind = ClassKind::Interface;
            def.is_abstract = true;
        }

        {
            let number = &mut self.classes[wk.number.index()];
            number.super_class = Some(object_ty.clone());
            number.interfaces = vec![Type::class(wk.serializable, vec![])];
            number.is_abstract = true;
            number.methods = vec![MethodDef {
                name: "intValue".to_string(),
                return_type: Type::Primitive(PrimitiveType::Int),
                is_abstract: true,
                ..MethodDef::default()
            }];
        }

        // Boxed primitives. The numeric ones extend Number; all are
        // Comparable to themselves.
        let boxed = [
            (wk.boolean, false),
            (wk.byte, true),
            (wk.short, true),
            (wk.character, false),
            (wk.integer, true),
            (wk.long, true),
            (wk.float, true),
            (wk.double, true),
        ];
        for (id, is_number) in boxed {
            let self_comparable = Type::class(comparable, vec![Type::class(id, vec![])]);
            let def = &mut self.classes[id.index()];
            def.super_class = Some(if is_number {
                Type::class(wk.number, vec![])
            } else {
                object_ty.clone()
            });
            def.interfaces = vec![self_comparable, Type::class(wk.serializable, vec![])];
        }

        // Throwable hierarchy.
        {
            let throwable = &mut self.classes[wk.throwable.index()];
            throwable.super_class = Some(object_ty.clone());
            throwable.interfaces = vec![Type::class(wk.serializable, vec![])];
            throwable.constructors = vec![CtorDef::default()];
            throwable.methods = vec![MethodDef {
                name: "getMessage".to_string(),
                return_type: Type::class(wk.string, vec![]),
                ..MethodDef::default()
            }];
        }
        for (id, super_id) in [
            (wk.exception, wk.throwable),
            (wk.runtime_exception, wk.exception),
            (wk.error, wk.throwable),
        ] {
            let def = &mut self.classes[id.index()];
            def.super_class = Some(Type::class(super_id, vec![]));
            def.constructors = vec![CtorDef::default()];
        }
        self.add_class(ClassDef {
            name: "java.io.IOException".to_string(),
            super_class: Some(Type::class(wk.exception, vec![])),
            constructors: vec![CtorDef::default()],
            ..ClassDef::default()
        });
        self.add_class(ClassDef {
            name: "java.lang.IllegalArgumentException".to_string(),
            super_class: Some(Type::class(wk.runtime_exception, vec![])),
            constructors: vec![CtorDef::default()],
            ..ClassDef::default()
        });

        // java.lang.Iterable<T>
        let iterable_t = self.add_type_param("T", vec![object_ty.clone()]);
        self.add_class(ClassDef {
            name: "java.lang.Iterable".to_string(),
            kind: ClassKind::Interface,
            type_params: vec![iterable_t],
            is_abstract: true,
            ..ClassDef::default()
        });

        // java.lang.Runnable
        self.add_class(ClassDef {
            name: "java.lang.Runnable".to_string(),
            kind: ClassKind::Interface,
            functional_annotation: true,
            is_abstract: true,
            methods: vec![MethodDef {
                name: "run".to_string(),
                is_abstract: true,
                ..MethodDef::default()
            }],
            ..ClassDef::default()
        });
    }

    fn seed_collections(&mut self) {
        let wk = self.well_known;
        let object_ty = Type::class(wk.object, vec![]);
        let iterable = self
            .lookup_class("java.lang.Iterable")
            .expect("Iterable seeded before collections");

        // java.util.Collection<E> extends Iterable<E>
        let collection_e = self.add_type_param("E", vec![object_ty.clone()]);
        let collection = self.add_class(ClassDef {
            name: "java.util.Collection".to_string(),
            kind: ClassKind::Interface,
            type_params: vec![collection_e],
            interfaces: vec![Type::class(iterable, vec![Type::TypeVar(collection_e)])],
            is_abstract: true,
            methods: vec![
                MethodDef {
                    name: "add".to_string(),
                    params: vec![Type::TypeVar(collection_e)],
                    return_type: Type::Primitive(PrimitiveType::Boolean),
                    is_abstract: true,
                    ..MethodDef::default()
                },
                MethodDef {
                    name: "size".to_string(),
                    return_type: Type::Primitive(PrimitiveType::Int),
                    is_abstract: true,
                    ..MethodDef::default()
                },
            ],
            ..ClassDef::default()
        });

        // java.util.List<E> extends Collection<E>
        let list_e = self.add_type_param("E", vec![object_ty.clone()]);
        let list = self.add_class(ClassDef {
            name: "java.util.List".to_string(),
            kind: ClassKind::Interface,
            type_params: vec![list_e],
            interfaces: vec![Type::class(collection, vec![Type::TypeVar(list_e)])],
            is_abstract: true,
            methods: vec![MethodDef {
                name: "get".to_string(),
                params: vec![Type::Primitive(PrimitiveType::Int)],
                return_type: Type::TypeVar(list_e),
                is_abstract: true,
                ..MethodDef::default()
            }],
            ..ClassDef::default()
        });

        // java.util.ArrayList<E> implements List<E>
        let array_list_e = self.add_type_param("E", vec![object_ty.clone()]);
        self.add_class(ClassDef {
            name: "java.util.ArrayList".to_string(),
            type_params: vec![array_list_e],
            super_class: Some(object_ty.clone()),
            interfaces: vec![Type::class(list, vec![Type::TypeVar(array_list_e)])],
            constructors: vec![
                CtorDef::default(),
                CtorDef {
                    params: vec![Type::Primitive(PrimitiveType::Int)],
                    ..CtorDef::default()
                },
            ],
            ..ClassDef::default()
        });
    }

    fn seed_functional_interfaces(&mut self) {
        let wk = self.well_known;
        let object_ty = Type::class(wk.object, vec![]);

        // java.util.function.Function<T, R>
        let f_t = self.add_type_param("T", vec![object_ty.clone()]);
        let f_r = self.add_type_param("R", vec![object_ty.clone()]);
        self.add_class(ClassDef {
            name: "java.util.function.Function".to_string(),
            kind: ClassKind::Interface,
            type_params: vec![f_t, f_r],
            functional_annotation: true,
            is_abstract: true,
            methods: vec![MethodDef {
                name: "apply".to_string(),
                params: vec![Type::TypeVar(f_t)],
                return_type: Type::TypeVar(f_r),
                is_abstract: true,
                ..MethodDef::default()
            }],
            ..ClassDef::default()
        });

        // java.util.function.Supplier<T>
        let s_t = self.add_type_param("T", vec![object_ty.clone()]);
        self.add_class(ClassDef {
            name: "java.util.function.Supplier".to_string(),
            kind: ClassKind::Interface,
            type_params: vec![s_t],
            functional_annotation: true,
            is_abstract: true,
            methods: vec![MethodDef {
                name: "get".to_string(),
                return_type: Type::TypeVar(s_t),
                is_abstract: true,
                ..MethodDef::default()
            }],
            ..ClassDef::default()
        });

        // java.util.function.Consumer<T>
        let c_t = self.add_type_param("T", vec![object_ty.clone()]);
        self.add_class(ClassDef {
            name: "java.util.function.Consumer".to_string(),
            kind: ClassKind::Interface,
            type_params: vec![c_t],
            functional_annotation: true,
            is_abstract: true,
            methods: vec![MethodDef {
                name: "accept".to_string(),
                params: vec![Type::TypeVar(c_t)],
                is_abstract: true,
                ..MethodDef::default()
            }],
            ..ClassDef::default()
        });

        // java.util.function.Predicate<T>
        let p_t = self.add_type_param("T", vec![object_ty.clone()]);
        self.add_class(ClassDef {
            name: "java.util.function.Predicate".to_string(),
            kind: ClassKind::Interface,
            type_params: vec![p_t],
            functional_annotation: true,
            is_abstract: true,
            methods: vec![MethodDef {
                name: "test".to_string(),
                params: vec![Type::TypeVar(p_t)],
                return_type: Type::Primitive(PrimitiveType::Boolean),
                is_abstract: true,
                ..MethodDef::default()
            }],
            ..ClassDef::default()
        });

        // java.util.function.BiFunction<T, U, R>
        let bf_t = self.add_type_param("T", vec![object_ty.clone()]);
        let bf_u = self.add_type_param("U", vec![object_ty.clone()]);
        let bf_r = self.add_type_param("R", vec![object_ty.clone()]);
        let bi_function = self.add_class(ClassDef {
            name: "java.util.function.BiFunction".to_string(),
            kind: ClassKind::Interface,
            type_params: vec![bf_t, bf_u, bf_r],
            functional_annotation: true,
            is_abstract: true,
            methods: vec![MethodDef {
                name: "apply".to_string(),
                params: vec![Type::TypeVar(bf_t), Type::TypeVar(bf_u)],
                return_type: Type::TypeVar(bf_r),
                is_abstract: true,
                ..MethodDef::default()
            }],
            ..ClassDef::default()
        });

        // java.util.function.BinaryOperator<T> extends BiFunction<T, T, T>
        let bo_t = self.add_type_param("T", vec![object_ty.clone()]);
        self.add_class(ClassDef {
            name: "java.util.function.BinaryOperator".to_string(),
            kind: ClassKind::Interface,
            type_params: vec![bo_t],
            interfaces: vec![Type::class(
                bi_function,
                vec![
                    Type::TypeVar(bo_t),
                    Type::TypeVar(bo_t),
                    Type::TypeVar(bo_t),
                ],
            )],
            functional_annotation: true,
            is_abstract: true,
            ..ClassDef::default()
        });

        // java.util.concurrent.Callable<V>, whose SAM declares `throws Exception`.
        let call_v = self.add_type_param("V", vec![object_ty.clone()]);
        self.add_class(ClassDef {
            name: "java.util.concurrent.Callable".to_string(),
            kind: ClassKind::Interface,
            type_params: vec![call_v],
            functional_annotation: true,
            is_abstract: true,
            methods: vec![MethodDef {
                name: "call".to_string(),
                return_type: Type::TypeVar(call_v),
                throws: vec![Type::class(wk.exception, vec![])],
                is_abstract: true,
                ..MethodDef::default()
            }],
            ..ClassDef::default()
        });
    }

    /// Add or replace a class declaration, keyed by qualified name.
    pub fn add_class(&mut self, def: ClassDef) -> ClassId {
        if let Some(&existing) = self.by_name.get(&def.name) {
            self.classes[existing.index()] = def;
            return existing;
        }
        let id = ClassId(self.classes.len() as u32);
        self.by_name.insert(def.name.clone(), id);
        self.classes.push(def);
        id
    }

    pub fn add_type_param(&mut self, name: &str, upper_bounds: Vec<Type>) -> TypeVarId {
        let id = TypeVarId(self.type_params.len() as u32);
        self.type_params.push(TypeParamDef {
            name: name.to_string(),
            upper_bounds,
            lower_bound: None,
        });
        id
    }

    /// Patch a type parameter's bounds after allocation.
    ///
    /// Needed for self-referential bounds (`T extends Comparable<T>`): the
    /// variable's id must exist before the bound mentioning it can be built.
    pub fn set_type_param_bounds(&mut self, id: TypeVarId, upper_bounds: Vec<Type>) {
        if let Some(def) = self.type_params.get_mut(id.0 as usize) {
            def.upper_bounds = upper_bounds;
        }
    }

    #[must_use]
    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    pub fn class_mut(&mut self, id: ClassId) -> Option<&mut ClassDef> {
        self.classes.get_mut(id.index())
    }

    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &ClassDef)> {
        self.classes
            .iter()
            .enumerate()
            .map(|(idx, def)| (ClassId(idx as u32), def))
    }
}

impl TypeEnv for TypeStore {
    fn class(&self, id: ClassId) -> Option<&ClassDef> {
        self.classes.get(id.index())
    }

    fn type_param(&self, id: TypeVarId) -> Option<&TypeParamDef> {
        self.type_params.get(id.0 as usize)
    }

    fn lookup_class(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    fn well_known(&self) -> &WellKnownTypes {
        &self.well_known
    }
}
