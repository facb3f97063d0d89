//! Lambda body analysis and method-reference validation against a resolved
//! functional-interface target.

use deneb_flow::FlowConfig;
use deneb_hir::{Body, ExprId, ExprKind, LambdaBody, LocalId, MethodRefExpr, StmtId, StmtKind};
use deneb_types::{
    can_instantiate, is_checked_exception, is_reifiable, resolve_ctor_call, resolve_functional,
    resolve_method_call, CallArg, CallKind, ClassId, CtorCall, DiagnosticKind,
    FunctionalDescriptor, MethodCall, MethodResolution, PrimitiveType, ResolvedCall, Span,
    SuperReferenceError, TyContext, Type, Visibility,
};

use crate::checker::{Checker, LambdaTarget, PolyFit};

impl Checker<'_> {
    pub(crate) fn check_lambda(&mut self, expr: ExprId, target: &Type) -> PolyFit {
        let body = self.body;
        let ExprKind::Lambda { params, body: lbody } = &body.expr(expr).kind else {
            return PolyFit::incompatible();
        };

        let desc = match resolve_functional(self.env, target) {
            Ok(desc) => desc,
            Err(reason) => {
                self.report(
                    expr,
                    DiagnosticKind::NotFunctional {
                        ty: target.clone(),
                        reason,
                    },
                );
                return PolyFit::incompatible();
            }
        };

        // A lambda cannot implement a generic abstract method, and its
        // parameter list must match the descriptor's arity exactly.
        if !desc.type_params.is_empty() || params.len() != desc.params.len() {
            self.report(
                expr,
                DiagnosticKind::SignatureMismatch {
                    expected_arity: desc.params.len(),
                    found_arity: params.len(),
                },
            );
            return PolyFit::incompatible();
        }

        // All-explicit or all-elided; one lambda never mixes the two styles.
        let explicit = params
            .iter()
            .filter(|&&p| body.local(p).ty.is_some())
            .count();
        if explicit != 0 && explicit != params.len() {
            self.report(
                expr,
                DiagnosticKind::SignatureMismatch {
                    expected_arity: desc.params.len(),
                    found_arity: params.len(),
                },
            );
            return PolyFit::incompatible();
        }

        let mut fit = PolyFit {
            compatible: true,
            ..PolyFit::default()
        };

        for (index, (&param, expected)) in params.iter().zip(&desc.params).enumerate() {
            match &body.local(param).ty {
                Some(declared) => {
                    // Explicit types must match the descriptor exactly; a
                    // target still carrying inference variables is judged
                    // only once resolved.
                    if self.is_proper(expected) && !self.types_equal(declared, expected) {
                        self.push_diag(
                            DiagnosticKind::ParameterTypeMismatch {
                                index,
                                expected: expected.clone(),
                                found: declared.clone(),
                            },
                            Some(body.local(param).span),
                        );
                        fit.compatible = false;
                    }
                }
                None => {
                    self.local_types[param.idx()] = Some(expected.clone());
                }
            }
        }

        self.scopes.push();
        for &param in params {
            self.declare_local(param);
        }

        match lbody {
            LambdaBody::Expr(value) => {
                if desc.is_void() {
                    if !body.expr(*value).kind.is_statement_expression() {
                        self.report(
                            expr,
                            DiagnosticKind::VoidValueMismatch {
                                value_returned: true,
                            },
                        );
                        fit.compatible = false;
                    }
                    self.check_expr(*value, None);
                } else if self.is_poly_expr(*value) {
                    let inner = self.check_poly(*value, &desc.return_type);
                    fit.compatible &= inner.compatible;
                    fit.return_types.push(desc.return_type.clone());
                    fit.thrown.extend(inner.thrown);
                } else {
                    let found = self.check_expr(*value, Some(&desc.return_type));
                    if !found.is_errorish()
                        && self.is_proper(&desc.return_type)
                        && !self.value_fits(&found, &desc.return_type)
                    {
                        self.push_diag(
                            DiagnosticKind::TypeMismatch {
                                expected: desc.return_type.clone(),
                                found: found.clone(),
                            },
                            Some(body.expr(*value).span),
                        );
                        fit.compatible = false;
                    }
                    fit.return_types.push(found);
                }
            }
            LambdaBody::Block(root) => {
                // Scoped flow first: unreachable code and definite assignment
                // inside the block, entered with the capture snapshot. The
                // result goes on the flow stack so nested lambdas see it.
                let entry = self.lambda_entry_state(expr);
                let mut scoped =
                    deneb_flow::analyze_scoped(body, *root, entry, FlowConfig::default());
                self.diagnostics.append(&mut scoped.diagnostics);
                self.flows.push(scoped);

                // Statement checking runs with the descriptor's return type
                // as the active return context.
                self.return_targets.push(desc.return_type.clone());
                self.check_stmt(*root);
                self.return_targets.pop();

                let shape = deneb_flow::return_shape(body, *root);
                if desc.is_void() {
                    // Valued returns were already reported one by one.
                    fit.compatible &= shape.void_compatible();
                } else {
                    if shape.completes_normally {
                        self.push_diag(
                            DiagnosticKind::MissingReturn,
                            Some(body.expr(expr).span),
                        );
                        fit.compatible = false;
                    }
                    fit.compatible &= shape.value_compatible();
                    fit.return_types = shape
                        .value_returns
                        .iter()
                        .map(|(value, _)| self.expr_types[value.idx()].clone())
                        .collect();
                }
                self.flows.pop();
            }
        }

        let captures = self.check_captures(expr, params, lbody);

        // Checked exceptions escaping the body must fit the descriptor's
        // throws clause; non-proper declared types are left to inference.
        let thrown = match lbody {
            LambdaBody::Expr(value) => self.uncaught_in_expr(*value),
            LambdaBody::Block(root) => self.uncaught_in_stmt(*root),
        };
        for t in &thrown {
            let declared_proper = desc.thrown.iter().all(|d| self.is_proper(d));
            let covered = desc.thrown.iter().any(|d| self.subtype(t, d));
            if declared_proper && !covered {
                self.push_diag(
                    DiagnosticKind::UnhandledExceptionType { thrown: t.clone() },
                    Some(self.body.expr(expr).span),
                );
            }
        }
        fit.thrown.extend(thrown);

        self.scopes.pop();

        self.lambdas.push((
            expr,
            LambdaTarget {
                descriptor: desc,
                captures,
            },
        ));
        fit
    }

    /// Expression-body value compatibility: assignment-compatible, or a
    /// `void` expression feeding a `void`-returning descriptor is already
    /// rejected by shape.
    fn value_fits(&self, found: &Type, expected: &Type) -> bool {
        !matches!(found, Type::Void)
            && deneb_types::loose_invocation_compatible(self.env, found, expected).ok()
    }

    fn types_equal(&self, a: &Type, b: &Type) -> bool {
        deneb_types::canonicalize_named(self.env, a) == deneb_types::canonicalize_named(self.env, b)
    }

    // === Captures ===

    /// Validate captured-variable rules and return the capture list.
    fn check_captures(
        &mut self,
        expr: ExprId,
        params: &[LocalId],
        lbody: &LambdaBody,
    ) -> Vec<LocalId> {
        let body = self.body;

        let mut declared: Vec<LocalId> = params.to_vec();
        match lbody {
            LambdaBody::Expr(e) => collect_declared_expr(body, *e, &mut declared),
            LambdaBody::Block(root) => collect_declared_stmt(body, *root, &mut declared),
        }

        let mut reads: Vec<(LocalId, Span)> = Vec::new();
        let mut writes: Vec<(LocalId, Span)> = Vec::new();
        match lbody {
            LambdaBody::Expr(e) => {
                collect_accesses_expr(body, *e, &declared, &mut reads, &mut writes)
            }
            LambdaBody::Block(root) => {
                collect_accesses_stmt(body, *root, &declared, &mut reads, &mut writes)
            }
        }

        let mut captures: Vec<LocalId> = Vec::new();
        let mut flagged: Vec<LocalId> = Vec::new();

        // Any write to an enclosing local from inside the body breaks
        // effective finality outright.
        for (local, span) in &writes {
            if !captures.contains(local) {
                captures.push(*local);
            }
            if !flagged.contains(local) {
                flagged.push(*local);
                let name = body.local(*local).name.clone();
                self.push_diag(DiagnosticKind::NotEffectivelyFinal { name }, Some(*span));
            }
        }

        let entry_state = matches!(lbody, LambdaBody::Expr(_))
            .then(|| self.lambda_entry_state(expr));
        for (local, span) in &reads {
            if !captures.contains(local) {
                captures.push(*local);
            }
            if !self.is_effectively_final(*local) && !flagged.contains(local) {
                flagged.push(*local);
                let name = body.local(*local).name.clone();
                self.push_diag(DiagnosticKind::NotEffectivelyFinal { name }, Some(*span));
            }
            // Block bodies get this from their scoped flow pass; expression
            // bodies are checked against the creation-site snapshot here.
            if let Some(state) = &entry_state {
                if !state.get(local.idx()).copied().unwrap_or(true) {
                    let name = body.local(*local).name.clone();
                    self.push_diag(DiagnosticKind::UseBeforeAssignment { name }, Some(*span));
                }
            }
        }

        captures.sort();
        captures
    }

    // === Method references ===

    pub(crate) fn check_method_ref(&mut self, expr: ExprId, target: &Type) -> PolyFit {
        let body = self.body;
        let ExprKind::MethodRef(mref) = &body.expr(expr).kind else {
            return PolyFit::incompatible();
        };

        let desc = match resolve_functional(self.env, target) {
            Ok(desc) => desc,
            Err(reason) => {
                self.report(
                    expr,
                    DiagnosticKind::NotFunctional {
                        ty: target.clone(),
                        reason,
                    },
                );
                return PolyFit::incompatible();
            }
        };

        match mref {
            MethodRefExpr::Bound { receiver, name } => {
                let receiver_ty = self.check_expr(*receiver, None);
                if receiver_ty.is_errorish() {
                    return PolyFit::incompatible();
                }
                let resolution = self.ref_resolution(
                    receiver_ty,
                    CallKind::Instance,
                    name,
                    desc.params.clone(),
                    &desc,
                );
                match resolution {
                    MethodResolution::Found(resolved) => self.ref_fit(expr, *resolved, &desc),
                    other => {
                        self.report_ref_failure(expr, other);
                        PolyFit::incompatible()
                    }
                }
            }
            MethodRefExpr::Unbound { class, name } => {
                // Static form first; otherwise the first descriptor parameter
                // binds as the receiver.
                let as_static = self.ref_resolution(
                    class.clone(),
                    CallKind::Static,
                    name,
                    desc.params.clone(),
                    &desc,
                );
                match as_static {
                    MethodResolution::Found(resolved) => self.ref_fit(expr, *resolved, &desc),
                    failure => {
                        if !desc.params.is_empty() {
                            let receiver = desc.params[0].clone();
                            let as_instance = self.ref_resolution(
                                receiver,
                                CallKind::Instance,
                                name,
                                desc.params[1..].to_vec(),
                                &desc,
                            );
                            if let MethodResolution::Found(resolved) = as_instance {
                                return self.ref_fit(expr, *resolved, &desc);
                            }
                        }
                        self.report_ref_failure(expr, failure);
                        PolyFit::incompatible()
                    }
                }
            }
            MethodRefExpr::Ctor { class } => self.check_ctor_ref(expr, class, &desc),
            MethodRefExpr::ArrayCtor { component } => {
                self.check_array_ctor_ref(expr, component, &desc)
            }
            MethodRefExpr::Super { class, name } => {
                let qualifier = class
                    .clone()
                    .or_else(|| self.enclosing_super_type())
                    .unwrap_or(Type::Unknown);
                self.check_super_ref(expr, &qualifier, name, &desc)
            }
        }
    }

    fn ref_resolution(
        &mut self,
        receiver: Type,
        call_kind: CallKind,
        name: &str,
        args: Vec<Type>,
        desc: &FunctionalDescriptor,
    ) -> MethodResolution {
        let expected = (!desc.is_void() && self.is_proper(&desc.return_type))
            .then(|| desc.return_type.clone());
        let call = MethodCall {
            receiver,
            call_kind,
            name,
            args: args.into_iter().map(CallArg::Typed).collect(),
            expected_return: expected,
            explicit_type_args: Vec::new(),
        };
        let env = self.env;
        let mut tcx = TyContext::new(env);
        resolve_method_call(&mut tcx, &call)
    }

    fn report_ref_failure(&mut self, expr: ExprId, resolution: MethodResolution) {
        match resolution {
            MethodResolution::Found(_) => {}
            MethodResolution::Ambiguous { name, candidates } => {
                self.report(expr, DiagnosticKind::AmbiguousMethodCall { name, candidates });
            }
            MethodResolution::NoneApplicable {
                name,
                best,
                considered,
            } => {
                let kind = crate::checker::no_candidate_kind(name, best, considered);
                self.report(expr, kind);
            }
            MethodResolution::NoSuchMember { name } => {
                self.report(expr, DiagnosticKind::NoApplicableMethod { name, best: None });
            }
        }
    }

    /// Common validation once a referenced member resolved: visibility,
    /// return compatibility, thrown types.
    fn ref_fit(
        &mut self,
        expr: ExprId,
        resolved: ResolvedCall,
        desc: &FunctionalDescriptor,
    ) -> PolyFit {
        let mut compatible = true;

        if self.member_is_invisible(resolved.owner, &resolved.name) {
            self.report(
                expr,
                DiagnosticKind::NoApplicableMethod {
                    name: resolved.name.clone(),
                    best: None,
                },
            );
            return PolyFit::incompatible();
        }

        if !desc.is_void()
            && self.is_proper(&desc.return_type)
            && !resolved.return_type.is_errorish()
            && !deneb_types::loose_invocation_compatible(
                self.env,
                &resolved.return_type,
                &desc.return_type,
            )
            .ok()
        {
            self.report(
                expr,
                DiagnosticKind::TypeMismatch {
                    expected: desc.return_type.clone(),
                    found: resolved.return_type.clone(),
                },
            );
            compatible = false;
        }

        let thrown: Vec<Type> = resolved
            .thrown
            .iter()
            .filter(|t| is_checked_exception(self.env, t))
            .cloned()
            .collect();
        let declared_proper = desc.thrown.iter().all(|d| self.is_proper(d));
        for t in &thrown {
            let covered = desc.thrown.iter().any(|d| self.subtype(t, d));
            if declared_proper && !covered {
                self.push_diag(
                    DiagnosticKind::UnhandledExceptionType { thrown: t.clone() },
                    Some(self.body.expr(expr).span),
                );
            }
        }

        let return_type = resolved.return_type.clone();
        self.calls.push((expr, resolved));

        PolyFit {
            compatible,
            return_types: vec![return_type],
            thrown,
        }
    }

    /// Private members are only reachable from their own class; the catalog
    /// carries no package model, so everything else counts as visible.
    fn member_is_invisible(&self, owner: ClassId, name: &str) -> bool {
        if self.cx.enclosing_class == Some(owner) {
            return false;
        }
        let Some(def) = self.env.class(owner) else {
            return false;
        };
        let named: Vec<_> = def.methods.iter().filter(|m| m.name == name).collect();
        !named.is_empty() && named.iter().all(|m| m.visibility == Visibility::Private)
    }

    fn check_ctor_ref(
        &mut self,
        expr: ExprId,
        class: &Type,
        desc: &FunctionalDescriptor,
    ) -> PolyFit {
        let class = deneb_types::canonicalize_named(self.env, class);
        let Some(ct) = class.as_class() else {
            self.report(expr, DiagnosticKind::CannotInstantiate { ty: class.clone() });
            return PolyFit::incompatible();
        };
        if !can_instantiate(self.env, ct.def) {
            self.report(expr, DiagnosticKind::CannotInstantiate { ty: class.clone() });
            return PolyFit::incompatible();
        }
        if let Some(outer) = self.env.class(ct.def).and_then(|def| def.enclosing_class) {
            if !self.has_enclosing_instance(outer) {
                self.report(expr, DiagnosticKind::CannotInstantiate { ty: class.clone() });
                return PolyFit::incompatible();
            }
        }

        let expected = (!desc.is_void() && self.is_proper(&desc.return_type))
            .then(|| desc.return_type.clone());
        let call = CtorCall {
            class: class.clone(),
            args: desc.params.iter().cloned().map(CallArg::Typed).collect(),
            expected_return: expected,
            explicit_type_args: Vec::new(),
        };
        let env = self.env;
        let mut tcx = TyContext::new(env);
        match resolve_ctor_call(&mut tcx, &call) {
            MethodResolution::Found(resolved) => self.ref_fit(expr, *resolved, desc),
            other => {
                self.report_ref_failure(expr, other);
                PolyFit::incompatible()
            }
        }
    }

    fn check_array_ctor_ref(
        &mut self,
        expr: ExprId,
        component: &Type,
        desc: &FunctionalDescriptor,
    ) -> PolyFit {
        if desc.params.len() != 1 {
            self.report(
                expr,
                DiagnosticKind::SignatureMismatch {
                    expected_arity: 1,
                    found_arity: desc.params.len(),
                },
            );
            return PolyFit::incompatible();
        }
        let size = &desc.params[0];
        let int = Type::Primitive(PrimitiveType::Int);
        if self.is_proper(size)
            && !deneb_types::loose_invocation_compatible(self.env, size, &int).ok()
        {
            self.report(
                expr,
                DiagnosticKind::ParameterTypeMismatch {
                    index: 0,
                    expected: int,
                    found: size.clone(),
                },
            );
            return PolyFit::incompatible();
        }
        // `T[]::new` needs a reifiable component: no array of a generic
        // component can be created.
        if !is_reifiable(component) {
            self.report(
                expr,
                DiagnosticKind::CannotInstantiate {
                    ty: Type::array(component.clone()),
                },
            );
            return PolyFit::incompatible();
        }

        let array = Type::array(component.clone());
        let mut compatible = true;
        if !desc.is_void()
            && self.is_proper(&desc.return_type)
            && !deneb_types::loose_invocation_compatible(self.env, &array, &desc.return_type).ok()
        {
            self.report(
                expr,
                DiagnosticKind::TypeMismatch {
                    expected: desc.return_type.clone(),
                    found: array.clone(),
                },
            );
            compatible = false;
        }
        PolyFit {
            compatible,
            return_types: vec![array],
            thrown: Vec::new(),
        }
    }

    fn check_super_ref(
        &mut self,
        expr: ExprId,
        qualifier: &Type,
        name: &str,
        desc: &FunctionalDescriptor,
    ) -> PolyFit {
        if self.cx.is_static || self.cx.enclosing_class.is_none() {
            self.report(
                expr,
                DiagnosticKind::IllegalSuperReference {
                    reason: SuperReferenceError::StaticContext,
                },
            );
            return PolyFit::incompatible();
        }
        let enclosing = self
            .cx
            .enclosing_class
            .expect("checked enclosing class above");

        let qualifier = deneb_types::canonicalize_named(self.env, qualifier);
        let Some(qual_def) = qualifier.as_class().map(|c| c.def) else {
            self.report(
                expr,
                DiagnosticKind::IllegalSuperReference {
                    reason: SuperReferenceError::NotADirectSupertype {
                        ty: qualifier.clone(),
                    },
                },
            );
            return PolyFit::incompatible();
        };

        // The qualifier must name a direct supertype.
        let direct = self.direct_supertypes(enclosing);
        let is_direct = direct.iter().any(|s| {
            deneb_types::canonicalize_named(self.env, s)
                .as_class()
                .is_some_and(|c| c.def == qual_def)
        });
        if !is_direct {
            self.report(
                expr,
                DiagnosticKind::IllegalSuperReference {
                    reason: SuperReferenceError::NotADirectSupertype {
                        ty: qualifier.clone(),
                    },
                },
            );
            return PolyFit::incompatible();
        }

        // A sibling supertype sitting below the qualifier that redeclares the
        // method makes the qualifier a bypassed ancestor.
        for sibling in &direct {
            let sibling_def = deneb_types::canonicalize_named(self.env, sibling)
                .as_class()
                .map(|c| c.def);
            if sibling_def == Some(qual_def) {
                continue;
            }
            if self.subtype(sibling, &qualifier)
                && self.hierarchy_declares(sibling, qual_def, name)
            {
                self.report(
                    expr,
                    DiagnosticKind::IllegalSuperReference {
                        reason: SuperReferenceError::BypassedOverride {
                            name: name.to_string(),
                            overriding: sibling.clone(),
                        },
                    },
                );
                return PolyFit::incompatible();
            }
        }

        let resolution = self.ref_resolution(
            qualifier.clone(),
            CallKind::Instance,
            name,
            desc.params.clone(),
            desc,
        );
        match resolution {
            MethodResolution::Found(resolved) => {
                // `super` dispatches statically; an abstract target has no
                // body to invoke.
                let is_abstract = self
                    .env
                    .class(resolved.owner)
                    .and_then(|def| def.methods.iter().find(|m| m.name == resolved.name))
                    .is_some_and(|m| m.is_abstract);
                if is_abstract {
                    self.report(
                        expr,
                        DiagnosticKind::IllegalSuperReference {
                            reason: SuperReferenceError::AbstractTarget {
                                name: name.to_string(),
                            },
                        },
                    );
                    return PolyFit::incompatible();
                }
                self.ref_fit(expr, *resolved, desc)
            }
            other => {
                self.report_ref_failure(expr, other);
                PolyFit::incompatible()
            }
        }
    }

    fn direct_supertypes(&self, class: ClassId) -> Vec<Type> {
        let Some(def) = self.env.class(class) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        match &def.super_class {
            Some(sup) => out.push(sup.clone()),
            None => out.push(Type::class(self.env.well_known().object, vec![])),
        }
        out.extend(def.interfaces.iter().cloned());
        out
    }

    /// Whether `ty`'s hierarchy, strictly below `stop`, declares `name`.
    fn hierarchy_declares(&self, ty: &Type, stop: ClassId, name: &str) -> bool {
        for sup in deneb_types::supertypes(self.env, ty) {
            let Some(ct) = deneb_types::canonicalize_named(self.env, &sup).as_class().cloned()
            else {
                continue;
            };
            if ct.def == stop {
                continue;
            }
            if let Some(def) = self.env.class(ct.def) {
                if def.methods.iter().any(|m| m.name == name && !m.is_static) {
                    return true;
                }
            }
        }
        false
    }
}

// === Capture walks ===

fn collect_declared_stmt(body: &Body, stmt: StmtId, out: &mut Vec<LocalId>) {
    match &body.stmt(stmt).kind {
        StmtKind::Block(stmts) => {
            for &s in stmts {
                collect_declared_stmt(body, s, out);
            }
        }
        StmtKind::Let { local, initializer } => {
            out.push(*local);
            if let Some(init) = initializer {
                collect_declared_expr(body, *init, out);
            }
        }
        StmtKind::Assign { value, .. } => collect_declared_expr(body, *value, out),
        StmtKind::Expr(expr) => collect_declared_expr(body, *expr, out),
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            collect_declared_expr(body, *condition, out);
            collect_declared_stmt(body, *then_branch, out);
            if let Some(else_branch) = else_branch {
                collect_declared_stmt(body, *else_branch, out);
            }
        }
        StmtKind::While { condition, body: b } => {
            collect_declared_expr(body, *condition, out);
            collect_declared_stmt(body, *b, out);
        }
        StmtKind::For {
            init,
            condition,
            update,
            body: b,
        } => {
            if let Some(init) = init {
                collect_declared_stmt(body, *init, out);
            }
            if let Some(condition) = condition {
                collect_declared_expr(body, *condition, out);
            }
            if let Some(update) = update {
                collect_declared_stmt(body, *update, out);
            }
            collect_declared_stmt(body, *b, out);
        }
        StmtKind::Return(Some(value)) => collect_declared_expr(body, *value, out),
        StmtKind::Throw(value) => collect_declared_expr(body, *value, out),
        StmtKind::Try {
            body: b,
            catches,
            finally,
        } => {
            collect_declared_stmt(body, *b, out);
            for clause in catches {
                out.push(clause.local);
                collect_declared_stmt(body, clause.body, out);
            }
            if let Some(finally) = finally {
                collect_declared_stmt(body, *finally, out);
            }
        }
        StmtKind::Return(None) | StmtKind::Break | StmtKind::Continue | StmtKind::Nop => {}
    }
}

fn collect_declared_expr(body: &Body, expr: ExprId, out: &mut Vec<LocalId>) {
    match &body.expr(expr).kind {
        ExprKind::Lambda { params, body: lbody } => {
            out.extend(params.iter().copied());
            match lbody {
                LambdaBody::Expr(e) => collect_declared_expr(body, *e, out),
                LambdaBody::Block(root) => collect_declared_stmt(body, *root, out),
            }
        }
        other => {
            for child in child_exprs(other) {
                collect_declared_expr(body, child, out);
            }
        }
    }
}

fn collect_accesses_stmt(
    body: &Body,
    stmt: StmtId,
    declared: &[LocalId],
    reads: &mut Vec<(LocalId, Span)>,
    writes: &mut Vec<(LocalId, Span)>,
) {
    let stmt_data = body.stmt(stmt);
    match &stmt_data.kind {
        StmtKind::Block(stmts) => {
            for &s in stmts {
                collect_accesses_stmt(body, s, declared, reads, writes);
            }
        }
        StmtKind::Let { initializer, .. } => {
            if let Some(init) = initializer {
                collect_accesses_expr(body, *init, declared, reads, writes);
            }
        }
        StmtKind::Assign { target, value } => {
            collect_accesses_expr(body, *value, declared, reads, writes);
            if !declared.contains(target) {
                writes.push((*target, stmt_data.span));
            }
        }
        StmtKind::Expr(expr) => collect_accesses_expr(body, *expr, declared, reads, writes),
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            collect_accesses_expr(body, *condition, declared, reads, writes);
            collect_accesses_stmt(body, *then_branch, declared, reads, writes);
            if let Some(else_branch) = else_branch {
                collect_accesses_stmt(body, *else_branch, declared, reads, writes);
            }
        }
        StmtKind::While { condition, body: b } => {
            collect_accesses_expr(body, *condition, declared, reads, writes);
            collect_accesses_stmt(body, *b, declared, reads, writes);
        }
        StmtKind::For {
            init,
            condition,
            update,
            body: b,
        } => {
            if let Some(init) = init {
                collect_accesses_stmt(body, *init, declared, reads, writes);
            }
            if let Some(condition) = condition {
                collect_accesses_expr(body, *condition, declared, reads, writes);
            }
            if let Some(update) = update {
                collect_accesses_stmt(body, *update, declared, reads, writes);
            }
            collect_accesses_stmt(body, *b, declared, reads, writes);
        }
        StmtKind::Return(Some(value)) => {
            collect_accesses_expr(body, *value, declared, reads, writes);
        }
        StmtKind::Throw(value) => collect_accesses_expr(body, *value, declared, reads, writes),
        StmtKind::Try {
            body: b,
            catches,
            finally,
        } => {
            collect_accesses_stmt(body, *b, declared, reads, writes);
            for clause in catches {
                collect_accesses_stmt(body, clause.body, declared, reads, writes);
            }
            if let Some(finally) = finally {
                collect_accesses_stmt(body, *finally, declared, reads, writes);
            }
        }
        StmtKind::Return(None) | StmtKind::Break | StmtKind::Continue | StmtKind::Nop => {}
    }
}

fn collect_accesses_expr(
    body: &Body,
    expr: ExprId,
    declared: &[LocalId],
    reads: &mut Vec<(LocalId, Span)>,
    writes: &mut Vec<(LocalId, Span)>,
) {
    let expr_data = body.expr(expr);
    match &expr_data.kind {
        ExprKind::Local(local) => {
            if !declared.contains(local) {
                reads.push((*local, expr_data.span));
            }
        }
        ExprKind::Assign { target, value } => {
            collect_accesses_expr(body, *value, declared, reads, writes);
            if !declared.contains(target) {
                writes.push((*target, expr_data.span));
            }
        }
        ExprKind::Unary { op, operand } => {
            collect_accesses_expr(body, *operand, declared, reads, writes);
            if op.mutates() {
                if let ExprKind::Local(local) = &body.expr(*operand).kind {
                    if !declared.contains(local) {
                        writes.push((*local, expr_data.span));
                    }
                }
            }
        }
        ExprKind::Lambda { body: lbody, .. } => match lbody {
            // A nested lambda's reads of our outer locals still capture
            // through this one.
            LambdaBody::Expr(e) => collect_accesses_expr(body, *e, declared, reads, writes),
            LambdaBody::Block(root) => collect_accesses_stmt(body, *root, declared, reads, writes),
        },
        other => {
            for child in child_exprs(other) {
                collect_accesses_expr(body, child, declared, reads, writes);
            }
        }
    }
}

/// Direct child expressions of a node, excluding lambda bodies (handled by
/// the callers that need to descend).
fn child_exprs(kind: &ExprKind) -> Vec<ExprId> {
    match kind {
        ExprKind::Literal(_) | ExprKind::Local(_) | ExprKind::This => vec![],
        ExprKind::Field { receiver, .. } => receiver.iter().copied().collect(),
        ExprKind::Call { receiver, args, .. } => {
            let mut out: Vec<ExprId> = Vec::new();
            if let deneb_hir::Receiver::Expr(r) = receiver {
                out.push(*r);
            }
            out.extend(args.iter().copied());
            out
        }
        ExprKind::New { args, .. } => args.clone(),
        ExprKind::NewArray { length, .. } => vec![*length],
        ExprKind::ArrayIndex { array, index } => vec![*array, *index],
        ExprKind::Assign { value, .. } => vec![*value],
        ExprKind::Unary { operand, .. } => vec![*operand],
        ExprKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
        ExprKind::Cond {
            condition,
            then_expr,
            else_expr,
        } => vec![*condition, *then_expr, *else_expr],
        ExprKind::Lambda { body, .. } => match body {
            LambdaBody::Expr(e) => vec![*e],
            LambdaBody::Block(_) => vec![],
        },
        ExprKind::MethodRef(MethodRefExpr::Bound { receiver, .. }) => vec![*receiver],
        ExprKind::MethodRef(_) => vec![],
        ExprKind::Cast { expr, .. } => vec![*expr],
    }
}
