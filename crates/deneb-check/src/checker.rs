//! Expression and statement checking.

use deneb_flow::{FlowAnalysisResult, FlowConfig};
use deneb_hir::{
    BinaryOp, Body, ExprId, ExprKind, LambdaBody, Literal as HirLiteral, LocalId, LocalKind,
    MethodRefExpr, Receiver, StmtId, StmtKind, UnaryOp,
};
use deneb_types::{
    can_instantiate, resolve_ctor_call_with, resolve_field, resolve_method_call_with, CallArg,
    CallKind, CandidateFailure, ClassId, CtorCall, Diagnostic, DiagnosticKind,
    FunctionalDescriptor, InferenceFailureReason, LambdaBodyShape, LambdaParamList, LambdaShape,
    MethodCall, MethodRefShape, MethodResolution, NotApplicableReason, PolyArg, PolyArgKind,
    PolyProbe, PolyProbeOutcome, PrimitiveType, ResolvedCall, Severity, Span, TyContext, Type,
    TypeEnv,
};

use crate::scope::ScopeStack;

/// Where a body hangs in its declaration: the facts the checker needs about
/// the enclosing member that are not derivable from the body itself.
#[derive(Debug, Clone)]
pub struct CheckContext {
    /// The class whose member body is being checked, when there is one.
    pub enclosing_class: Option<ClassId>,
    /// Whether the body belongs to a static member.
    pub is_static: bool,
    /// Declared return type of the enclosing method (`Type::Void` for void).
    pub return_type: Type,
    /// The enclosing method's `throws` clause.
    pub method_throws: Vec<Type>,
    /// True while checking the arguments of an explicit `this(...)`/
    /// `super(...)` constructor invocation: instance state is off-limits at
    /// any lambda nesting depth.
    pub in_explicit_ctor_args: bool,
    /// Names of locals visible from an enclosing scope when this body is a
    /// fragment nested inside one; redeclaring any of them is an error.
    pub outer_names: Vec<String>,
}

impl Default for CheckContext {
    fn default() -> Self {
        CheckContext {
            enclosing_class: None,
            is_static: false,
            return_type: Type::Void,
            method_throws: Vec::new(),
            in_explicit_ctor_args: false,
            outer_names: Vec::new(),
        }
    }
}

/// A lambda's resolved target, handed to code generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LambdaTarget {
    pub descriptor: FunctionalDescriptor,
    /// Enclosing locals the body reads, in declaration order.
    pub captures: Vec<LocalId>,
}

#[derive(Debug)]
pub struct CheckResult {
    pub diagnostics: Vec<Diagnostic>,
    /// Best-effort type per expression, indexed by `ExprId`; `Type::Error`
    /// where checking failed, so tooling still gets a full table.
    pub expr_types: Vec<Type>,
    /// Resolved invocation sites (calls, creations, method references) with
    /// their concrete instantiations.
    pub calls: Vec<(ExprId, ResolvedCall)>,
    pub lambdas: Vec<(ExprId, LambdaTarget)>,
}

/// What a poly expression contributed when checked against a target;
/// `compatible` covers shape and types only, never scoping or capture rules,
/// so speculative probes and committed checks agree.
#[derive(Debug, Clone, Default)]
pub(crate) struct PolyFit {
    pub(crate) compatible: bool,
    pub(crate) return_types: Vec<Type>,
    pub(crate) thrown: Vec<Type>,
}

impl PolyFit {
    pub(crate) fn incompatible() -> PolyFit {
        PolyFit::default()
    }
}

/// Type-check one body to completion.
pub fn check_body(env: &dyn TypeEnv, body: &Body, cx: CheckContext) -> CheckResult {
    tracing::debug!(locals = body.locals().len(), "checking body");
    let flow = deneb_flow::analyze(body, FlowConfig::default());

    let mut checker = Checker {
        env,
        body,
        local_types: body.locals().iter().map(|l| l.ty.clone()).collect(),
        expr_types: vec![Type::Unknown; body.expr_count()],
        fatal: vec![false; body.expr_count()],
        diagnostics: flow.diagnostics.clone(),
        calls: Vec::new(),
        lambdas: Vec::new(),
        scopes: ScopeStack::default(),
        return_targets: vec![cx.return_type.clone()],
        flows: vec![flow],
        probe_depth: 0,
        cx,
    };

    if let Ok(root) = body.root() {
        checker.scopes.push();
        let params: Vec<LocalId> = body
            .locals_iter()
            .filter(|(_, decl)| decl.kind == LocalKind::Param)
            .map(|(id, _)| id)
            .collect();
        for p in params {
            checker.declare_local(p);
        }
        checker.check_stmt(root);
        checker.scopes.pop();

        let throws = checker.cx.method_throws.clone();
        let uncaught = checker.uncaught_in_stmt(root);
        for thrown in uncaught {
            let handled = throws.iter().any(|d| checker.subtype(&thrown, d));
            if !handled {
                checker.push_diag(DiagnosticKind::UnhandledExceptionType { thrown }, None);
            }
        }
    }

    CheckResult {
        diagnostics: checker.diagnostics,
        expr_types: checker.expr_types,
        calls: dedup_last(checker.calls),
        lambdas: dedup_last(checker.lambdas),
    }
}

/// A re-checked subtree can resolve the same site twice; the last resolution
/// is the committed one.
fn dedup_last<T>(entries: Vec<(ExprId, T)>) -> Vec<(ExprId, T)> {
    let mut seen = std::collections::HashSet::new();
    let mut out: Vec<(ExprId, T)> = entries
        .into_iter()
        .rev()
        .filter(|(id, _)| seen.insert(*id))
        .collect();
    out.reverse();
    out
}

pub(crate) struct Checker<'e> {
    pub(crate) env: &'e dyn TypeEnv,
    pub(crate) body: &'e Body,
    pub(crate) cx: CheckContext,
    pub(crate) local_types: Vec<Option<Type>>,
    pub(crate) expr_types: Vec<Type>,
    /// Suppressed-after-fatal flag per expression: once an expression has a
    /// hard error, dependent diagnostics on the same node stay quiet.
    fatal: Vec<bool>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) calls: Vec<(ExprId, ResolvedCall)>,
    pub(crate) lambdas: Vec<(ExprId, LambdaTarget)>,
    pub(crate) scopes: ScopeStack,
    /// Innermost return-type context: the method's, then one per enclosing
    /// lambda block body.
    pub(crate) return_targets: Vec<Type>,
    /// Flow results, innermost last: index 0 is the whole body, a new entry
    /// is pushed per lambda block body under analysis.
    pub(crate) flows: Vec<FlowAnalysisResult>,
    /// Current speculative-probe nesting depth, bounded by
    /// [`PROBE_DEPTH_LIMIT`].
    pub(crate) probe_depth: usize,
}

impl Checker<'_> {
    // === Diagnostics ===

    pub(crate) fn report(&mut self, expr: ExprId, kind: DiagnosticKind) {
        if self.fatal[expr.idx()] {
            return;
        }
        if kind.severity() == Severity::Error {
            self.fatal[expr.idx()] = true;
        }
        let span = self.body.expr(expr).span;
        self.diagnostics.push(Diagnostic::new(kind, Some(span)));
    }

    pub(crate) fn push_diag(&mut self, kind: DiagnosticKind, span: Option<Span>) {
        self.diagnostics.push(Diagnostic::new(kind, span));
    }

    pub(crate) fn subtype(&self, sub: &Type, sup: &Type) -> bool {
        deneb_types::is_subtype(self.env, sub, sup)
    }

    fn assignable(&self, from: &Type, to: &Type) -> bool {
        deneb_types::loose_invocation_compatible(self.env, from, to).ok()
    }

    fn require_assignable(&mut self, found: &Type, expected: &Type, span: Span) {
        if found.is_errorish() || expected.is_errorish() {
            return;
        }
        if !self.assignable(found, expected) {
            self.push_diag(
                DiagnosticKind::TypeMismatch {
                    expected: expected.clone(),
                    found: found.clone(),
                },
                Some(span),
            );
        }
    }

    // === Scopes ===

    pub(crate) fn declare_local(&mut self, local: LocalId) {
        let decl = self.body.local(local);
        let name = decl.name.clone();
        let span = decl.span;
        if self.scopes.declared_in_current(&name) {
            self.push_diag(DiagnosticKind::DuplicateVariable { name: name.clone() }, Some(span));
        } else if self.scopes.visible_outside_current(&name)
            || self.cx.outer_names.iter().any(|n| *n == name)
        {
            self.push_diag(DiagnosticKind::ShadowingError { name: name.clone() }, Some(span));
        }
        self.scopes.declare(name, local);
    }

    // === Enclosing context ===

    pub(crate) fn enclosing_type(&self) -> Option<Type> {
        let id = self.cx.enclosing_class?;
        let def = self.env.class(id)?;
        Some(Type::class(
            id,
            def.type_params.iter().map(|&tp| Type::TypeVar(tp)).collect(),
        ))
    }

    pub(crate) fn enclosing_super_type(&self) -> Option<Type> {
        let id = self.cx.enclosing_class?;
        let def = self.env.class(id)?;
        def.super_class
            .clone()
            .or_else(|| Some(Type::class(self.env.well_known().object, vec![])))
    }

    /// `this`/`super` usable here? Reports and answers in one step.
    fn check_instance_access(&mut self, expr: ExprId, name: &str) -> bool {
        if self.cx.is_static || self.cx.in_explicit_ctor_args {
            self.report(
                expr,
                DiagnosticKind::StaticContextError {
                    name: name.to_string(),
                },
            );
            return false;
        }
        true
    }

    /// Whether an instance of `outer` is reachable from the current context
    /// (for inner-class creation).
    pub(crate) fn has_enclosing_instance(&self, outer: ClassId) -> bool {
        if self.cx.is_static {
            return false;
        }
        let mut cursor = self.cx.enclosing_class;
        while let Some(id) = cursor {
            if id == outer {
                return true;
            }
            cursor = self.env.class(id).and_then(|def| def.enclosing_class);
        }
        false
    }

    // === Flow lookups across nested lambda scopes ===

    pub(crate) fn lambda_entry_state(&self, lambda: ExprId) -> Vec<bool> {
        for flow in self.flows.iter().rev() {
            if let Some(state) = flow.lambda_state(lambda) {
                return state.to_vec();
            }
        }
        vec![true; self.body.locals().len()]
    }

    pub(crate) fn is_effectively_final(&self, local: LocalId) -> bool {
        self.flows
            .iter()
            .all(|flow| flow.effectively_final.get(local.idx()).copied().unwrap_or(true))
    }

    // === Statements ===

    pub(crate) fn check_stmt(&mut self, stmt: StmtId) {
        let body = self.body;
        let stmt_data = body.stmt(stmt);
        let span = stmt_data.span;
        match &stmt_data.kind {
            StmtKind::Block(stmts) => {
                self.scopes.push();
                for &s in stmts {
                    self.check_stmt(s);
                }
                self.scopes.pop();
            }
            StmtKind::Let { local, initializer } => {
                self.declare_local(*local);
                let declared = self.local_types[local.idx()].clone();
                if let Some(declared) = &declared {
                    self.check_type_well_formed(declared, span);
                }
                if let Some(init) = initializer {
                    let found = self.check_expr(*init, declared.as_ref());
                    match &declared {
                        Some(expected) => {
                            let init_span = body.expr(*init).span;
                            self.require_assignable(&found, expected, init_span);
                        }
                        None => {
                            // `var`-style declaration: the initializer fixes
                            // the type.
                            self.local_types[local.idx()] = Some(found);
                        }
                    }
                }
            }
            StmtKind::Assign { target, value } => {
                let target_ty = self.local_types[target.idx()].clone();
                let found = self.check_expr(*value, target_ty.as_ref());
                if let Some(expected) = &target_ty {
                    let value_span = body.expr(*value).span;
                    self.require_assignable(&found, expected, value_span);
                }
            }
            StmtKind::Expr(expr) => {
                self.check_expr(*expr, None);
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.check_condition(*condition);
                self.check_stmt(*then_branch);
                if let Some(else_branch) = else_branch {
                    self.check_stmt(*else_branch);
                }
            }
            StmtKind::While { condition, body: b } => {
                self.check_condition(*condition);
                self.check_stmt(*b);
            }
            StmtKind::For {
                init,
                condition,
                update,
                body: b,
            } => {
                self.scopes.push();
                if let Some(init) = init {
                    self.check_stmt(*init);
                }
                if let Some(condition) = condition {
                    self.check_condition(*condition);
                }
                self.check_stmt(*b);
                if let Some(update) = update {
                    self.check_stmt(*update);
                }
                self.scopes.pop();
            }
            StmtKind::Return(value) => {
                let target = self
                    .return_targets
                    .last()
                    .cloned()
                    .unwrap_or(Type::Void);
                match (value, matches!(target, Type::Void)) {
                    (Some(value), true) => {
                        self.check_expr(*value, None);
                        self.push_diag(
                            DiagnosticKind::VoidValueMismatch {
                                value_returned: true,
                            },
                            Some(span),
                        );
                    }
                    (Some(value), false) => {
                        let found = self.check_expr(*value, Some(&target));
                        let value_span = body.expr(*value).span;
                        self.require_assignable(&found, &target, value_span);
                    }
                    (None, false) => {
                        self.push_diag(
                            DiagnosticKind::VoidValueMismatch {
                                value_returned: false,
                            },
                            Some(span),
                        );
                    }
                    (None, true) => {}
                }
            }
            StmtKind::Throw(expr) => {
                let found = self.check_expr(*expr, None);
                let throwable = Type::class(self.env.well_known().throwable, vec![]);
                if !found.is_errorish() && !self.subtype(&found, &throwable) {
                    self.push_diag(
                        DiagnosticKind::TypeMismatch {
                            expected: throwable,
                            found,
                        },
                        Some(body.expr(*expr).span),
                    );
                }
            }
            StmtKind::Try {
                body: try_body,
                catches,
                finally,
            } => {
                self.check_stmt(*try_body);
                for clause in catches {
                    self.scopes.push();
                    self.declare_local(clause.local);
                    if self.local_types[clause.local.idx()].is_none() {
                        self.local_types[clause.local.idx()] = Some(clause.ty.clone());
                    }
                    self.check_stmt(clause.body);
                    self.scopes.pop();
                }
                if let Some(finally) = finally {
                    self.check_stmt(*finally);
                }
            }
            StmtKind::Break | StmtKind::Continue | StmtKind::Nop => {}
        }
    }

    fn check_condition(&mut self, expr: ExprId) {
        let found = self.check_expr(expr, Some(&Type::Primitive(PrimitiveType::Boolean)));
        let boolean = matches!(found, Type::Primitive(PrimitiveType::Boolean))
            || deneb_types::unboxed_primitive(self.env, &found) == Some(PrimitiveType::Boolean);
        if !found.is_errorish() && !boolean {
            self.report(
                expr,
                DiagnosticKind::TypeMismatch {
                    expected: Type::Primitive(PrimitiveType::Boolean),
                    found,
                },
            );
        }
    }

    // === Expressions ===

    pub(crate) fn check_expr(&mut self, expr: ExprId, expected: Option<&Type>) -> Type {
        let ty = self.check_expr_inner(expr, expected);
        self.expr_types[expr.idx()] = ty.clone();
        ty
    }

    fn check_expr_inner(&mut self, expr: ExprId, expected: Option<&Type>) -> Type {
        let body = self.body;
        let kind = &body.expr(expr).kind;
        match kind {
            ExprKind::Literal(lit) => self.literal_type(lit),
            ExprKind::Local(local) => self
                .local_types[local.idx()]
                .clone()
                .unwrap_or(Type::Unknown),
            ExprKind::Field { receiver, name } => self.check_field(expr, *receiver, name),
            ExprKind::Call {
                receiver,
                name,
                args,
                type_args,
            } => self.check_call(expr, receiver, name, args, type_args, expected),
            ExprKind::New {
                class,
                args,
                type_args,
            } => self.check_new(expr, class, args, type_args, expected),
            ExprKind::NewArray { element, length } => {
                let found = self.check_expr(*length, Some(&Type::Primitive(PrimitiveType::Int)));
                let length_span = body.expr(*length).span;
                self.require_assignable(&found, &Type::Primitive(PrimitiveType::Int), length_span);
                Type::array(element.clone())
            }
            ExprKind::ArrayIndex { array, index } => {
                let array_ty = self.check_expr(*array, None);
                let found = self.check_expr(*index, Some(&Type::Primitive(PrimitiveType::Int)));
                let index_span = body.expr(*index).span;
                self.require_assignable(&found, &Type::Primitive(PrimitiveType::Int), index_span);
                match array_ty {
                    Type::Array(elem) => *elem,
                    ty if ty.is_errorish() => Type::Error,
                    ty => {
                        self.report(
                            expr,
                            DiagnosticKind::TypeMismatch {
                                expected: Type::array(Type::Unknown),
                                found: ty,
                            },
                        );
                        Type::Error
                    }
                }
            }
            ExprKind::Assign { target, value } => {
                let target_ty = self.local_types[target.idx()].clone();
                let found = self.check_expr(*value, target_ty.as_ref());
                match target_ty {
                    Some(expected) => {
                        let value_span = body.expr(*value).span;
                        self.require_assignable(&found, &expected, value_span);
                        expected
                    }
                    None => found,
                }
            }
            ExprKind::Unary { op, operand } => self.check_unary(expr, *op, *operand),
            ExprKind::Binary { op, lhs, rhs } => self.check_binary(expr, *op, *lhs, *rhs),
            ExprKind::Cond {
                condition,
                then_expr,
                else_expr,
            } => self.check_cond(expr, *condition, *then_expr, *else_expr, expected),
            ExprKind::Cast { ty, expr: inner } => {
                // A cast supplies a target type (JLS 15.16): poly operands
                // check against it.
                let span = body.expr(expr).span;
                self.check_type_well_formed(ty, span);
                if self.is_poly_expr(*inner) {
                    self.check_poly(*inner, ty);
                    self.expr_types[inner.idx()] = ty.clone();
                } else {
                    self.check_expr(*inner, Some(ty));
                }
                ty.clone()
            }
            ExprKind::This => {
                if !self.check_instance_access(expr, "this") {
                    return Type::Error;
                }
                self.enclosing_type().unwrap_or(Type::Unknown)
            }
            ExprKind::Lambda { .. } | ExprKind::MethodRef(_) => match expected {
                Some(target) => {
                    let fit = self.check_poly(expr, target);
                    if fit.compatible {
                        target.clone()
                    } else {
                        Type::Error
                    }
                }
                None => {
                    self.report(expr, DiagnosticKind::MissingTargetType);
                    Type::Error
                }
            },
        }
    }

    fn literal_type(&self, lit: &HirLiteral) -> Type {
        let wk = self.env.well_known();
        match lit {
            HirLiteral::Bool(_) => Type::Primitive(PrimitiveType::Boolean),
            HirLiteral::Int(_) => Type::Primitive(PrimitiveType::Int),
            HirLiteral::Long(_) => Type::Primitive(PrimitiveType::Long),
            HirLiteral::Double(_) => Type::Primitive(PrimitiveType::Double),
            HirLiteral::Char(_) => Type::Primitive(PrimitiveType::Char),
            HirLiteral::Str(_) => Type::class(wk.string, vec![]),
            HirLiteral::Null => Type::Null,
        }
    }

    fn check_field(&mut self, expr: ExprId, receiver: Option<ExprId>, name: &str) -> Type {
        let name = name.to_string();
        let (receiver_ty, call_kind) = match receiver {
            Some(r) => (self.check_expr(r, None), CallKind::Instance),
            None => {
                if !self.check_instance_access(expr, &name) {
                    return Type::Error;
                }
                match self.enclosing_type() {
                    Some(ty) => (ty, CallKind::Instance),
                    None => return Type::Unknown,
                }
            }
        };
        if receiver_ty.is_errorish() {
            return Type::Error;
        }
        match resolve_field(self.env, &receiver_ty, &name, call_kind) {
            Some(field) => field.ty,
            None => {
                self.report(expr, DiagnosticKind::NoApplicableMethod { name, best: None });
                Type::Error
            }
        }
    }

    fn check_call(
        &mut self,
        expr: ExprId,
        receiver: &Receiver,
        name: &str,
        args: &[ExprId],
        type_args: &[Type],
        expected: Option<&Type>,
    ) -> Type {
        let (receiver_ty, call_kind) = match receiver {
            Receiver::Expr(r) => (self.check_expr(*r, None), CallKind::Instance),
            Receiver::Static(ty) => (ty.clone(), CallKind::Static),
            Receiver::This => {
                if !self.check_instance_access(expr, "this") {
                    return Type::Error;
                }
                (
                    self.enclosing_type().unwrap_or(Type::Unknown),
                    CallKind::Instance,
                )
            }
            Receiver::Super => {
                if !self.check_instance_access(expr, "super") {
                    return Type::Error;
                }
                (
                    self.enclosing_super_type().unwrap_or(Type::Unknown),
                    CallKind::Instance,
                )
            }
        };
        if receiver_ty.is_errorish() {
            return Type::Error;
        }

        let call_args = self.build_call_args(args);
        let call = MethodCall {
            receiver: receiver_ty,
            call_kind,
            name,
            args: call_args,
            expected_return: expected.cloned(),
            explicit_type_args: type_args.to_vec(),
        };
        let env = self.env;
        let mut tcx = TyContext::new(env);
        let resolution = resolve_method_call_with(&mut tcx, &call, self);
        self.finish_resolution(expr, resolution)
    }

    fn check_new(
        &mut self,
        expr: ExprId,
        class: &Type,
        args: &[ExprId],
        type_args: &[Type],
        expected: Option<&Type>,
    ) -> Type {
        let class = deneb_types::canonicalize_named(self.env, class);
        let span = self.body.expr(expr).span;
        self.check_type_well_formed(&class, span);
        if let Some(ct) = class.as_class() {
            if !can_instantiate(self.env, ct.def) {
                self.report(expr, DiagnosticKind::CannotInstantiate { ty: class.clone() });
                return Type::Error;
            }
            if let Some(outer) = self.env.class(ct.def).and_then(|def| def.enclosing_class) {
                if !self.has_enclosing_instance(outer) {
                    self.report(expr, DiagnosticKind::CannotInstantiate { ty: class.clone() });
                    return Type::Error;
                }
            }
        }

        let call_args = self.build_call_args(args);
        let call = CtorCall {
            class: class.clone(),
            args: call_args,
            expected_return: expected.cloned(),
            explicit_type_args: type_args.to_vec(),
        };
        let env = self.env;
        let mut tcx = TyContext::new(env);
        let resolution = resolve_ctor_call_with(&mut tcx, &call, self);
        self.finish_resolution(expr, resolution)
    }

    pub(crate) fn finish_resolution(
        &mut self,
        expr: ExprId,
        resolution: MethodResolution,
    ) -> Type {
        match resolution {
            MethodResolution::Found(resolved) => {
                let return_type = resolved.return_type.clone();
                let poly_targets = resolved.poly_targets.clone();
                self.calls.push((expr, *resolved));
                for target in poly_targets {
                    let arg = ExprId::from_handle(target.handle);
                    self.commit_poly(arg, &target.target);
                }
                return_type
            }
            MethodResolution::Ambiguous { name, candidates } => {
                self.report(
                    expr,
                    DiagnosticKind::AmbiguousMethodCall { name, candidates },
                );
                Type::Error
            }
            MethodResolution::NoneApplicable {
                name,
                best,
                considered,
            } => {
                self.report(expr, no_candidate_kind(name, best, considered));
                Type::Error
            }
            MethodResolution::NoSuchMember { name } => {
                self.report(expr, DiagnosticKind::NoApplicableMethod { name, best: None });
                Type::Error
            }
        }
    }

    /// Type a committed poly argument against its fully resolved target.
    fn commit_poly(&mut self, expr: ExprId, target: &Type) {
        let body = self.body;
        match &body.expr(expr).kind {
            ExprKind::Lambda { .. } | ExprKind::MethodRef(_) => {
                self.check_poly(expr, target);
                self.expr_types[expr.idx()] = target.clone();
            }
            ExprKind::Cond {
                condition,
                then_expr,
                else_expr,
            } => {
                self.check_condition(*condition);
                for branch in [*then_expr, *else_expr] {
                    if self.is_poly_expr(branch) {
                        self.commit_poly(branch, target);
                    } else {
                        let found = self.check_expr(branch, Some(target));
                        let span = body.expr(branch).span;
                        self.require_assignable(&found, target, span);
                    }
                }
                self.expr_types[expr.idx()] = target.clone();
            }
            // Nested invocation: re-resolve with the final target as the
            // expected return type.
            _ => {
                self.check_expr(expr, Some(target));
            }
        }
    }

    fn check_unary(&mut self, expr: ExprId, op: UnaryOp, operand: ExprId) -> Type {
        let found = self.check_expr(operand, None);
        if found.is_errorish() {
            return Type::Error;
        }
        match op {
            UnaryOp::Not => {
                let boolean = Type::Primitive(PrimitiveType::Boolean);
                if !self.assignable(&found, &boolean) {
                    self.report(
                        expr,
                        DiagnosticKind::TypeMismatch {
                            expected: boolean.clone(),
                            found,
                        },
                    );
                    return Type::Error;
                }
                boolean
            }
            UnaryOp::Neg
            | UnaryOp::PreInc
            | UnaryOp::PreDec
            | UnaryOp::PostInc
            | UnaryOp::PostDec => match self.numeric_of(&found) {
                Some(p) => Type::Primitive(p),
                None => {
                    self.report(
                        expr,
                        DiagnosticKind::TypeMismatch {
                            expected: Type::Primitive(PrimitiveType::Int),
                            found,
                        },
                    );
                    Type::Error
                }
            },
        }
    }

    fn check_binary(&mut self, expr: ExprId, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> Type {
        let left = self.check_expr(lhs, None);
        let right = self.check_expr(rhs, None);
        if left.is_errorish() || right.is_errorish() {
            return Type::Error;
        }
        let wk = self.env.well_known();
        let string = Type::class(wk.string, vec![]);
        let boolean = Type::Primitive(PrimitiveType::Boolean);
        match op {
            BinaryOp::Add if left == string || right == string => string,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                match (self.numeric_of(&left), self.numeric_of(&right)) {
                    (Some(a), Some(b)) => Type::Primitive(binary_promotion(a, b)),
                    _ => {
                        let found = if self.numeric_of(&left).is_none() { left } else { right };
                        self.report(
                            expr,
                            DiagnosticKind::TypeMismatch {
                                expected: Type::Primitive(PrimitiveType::Int),
                                found,
                            },
                        );
                        Type::Error
                    }
                }
            }
            BinaryOp::And | BinaryOp::Or => {
                for (side, ty) in [(lhs, &left), (rhs, &right)] {
                    if !self.assignable(ty, &boolean) {
                        let span = self.body.expr(side).span;
                        self.push_diag(
                            DiagnosticKind::TypeMismatch {
                                expected: boolean.clone(),
                                found: ty.clone(),
                            },
                            Some(span),
                        );
                    }
                }
                boolean
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                if self.numeric_of(&left).is_none() || self.numeric_of(&right).is_none() {
                    let found = if self.numeric_of(&left).is_none() { left } else { right };
                    self.report(
                        expr,
                        DiagnosticKind::TypeMismatch {
                            expected: Type::Primitive(PrimitiveType::Int),
                            found,
                        },
                    );
                }
                boolean
            }
            BinaryOp::Eq | BinaryOp::Ne => boolean,
        }
    }

    fn check_cond(
        &mut self,
        expr: ExprId,
        condition: ExprId,
        then_expr: ExprId,
        else_expr: ExprId,
        expected: Option<&Type>,
    ) -> Type {
        self.check_condition(condition);
        if let Some(target) = expected {
            // A conditional in a target context is a poly expression: each
            // branch checks against the target independently.
            for branch in [then_expr, else_expr] {
                if self.is_poly_expr(branch) {
                    self.check_poly(branch, target);
                    self.expr_types[branch.idx()] = target.clone();
                } else {
                    let found = self.check_expr(branch, Some(target));
                    let span = self.body.expr(branch).span;
                    self.require_assignable(&found, target, span);
                }
            }
            return target.clone();
        }

        let mut branch_types = Vec::with_capacity(2);
        for branch in [then_expr, else_expr] {
            if self.is_poly_expr(branch)
                && matches!(
                    self.body.expr(branch).kind,
                    ExprKind::Lambda { .. } | ExprKind::MethodRef(_)
                )
            {
                self.report(branch, DiagnosticKind::MissingTargetType);
                branch_types.push(Type::Error);
            } else {
                branch_types.push(self.check_expr(branch, None));
            }
        }
        let (left, right) = (branch_types[0].clone(), branch_types[1].clone());
        if left.is_errorish() {
            return right;
        }
        if right.is_errorish() {
            return left;
        }
        if left == right {
            return left;
        }
        if let (Some(a), Some(b)) = (self.numeric_of(&left), self.numeric_of(&right)) {
            return Type::Primitive(binary_promotion(a, b));
        }
        let env = self.env;
        deneb_types::lub(
            env,
            &[
                deneb_types::boxed_type(env, &left),
                deneb_types::boxed_type(env, &right),
            ],
        )
    }

    fn numeric_of(&self, ty: &Type) -> Option<PrimitiveType> {
        let p = match ty {
            Type::Primitive(p) => *p,
            other => deneb_types::unboxed_primitive(self.env, other)?,
        };
        (p != PrimitiveType::Boolean).then_some(p)
    }

    // === Poly classification ===

    pub(crate) fn is_poly_expr(&self, expr: ExprId) -> bool {
        match &self.body.expr(expr).kind {
            ExprKind::Lambda { .. } | ExprKind::MethodRef(_) => true,
            ExprKind::Call { .. } | ExprKind::New { .. } => true,
            ExprKind::Cond {
                then_expr,
                else_expr,
                ..
            } => self.is_poly_expr(*then_expr) || self.is_poly_expr(*else_expr),
            _ => false,
        }
    }

    fn build_call_args(&mut self, args: &[ExprId]) -> Vec<CallArg> {
        args.iter().map(|&arg| self.classify_arg(arg)).collect()
    }

    fn classify_arg(&mut self, arg: ExprId) -> CallArg {
        match self.summarize_poly(arg) {
            Some(poly) => CallArg::Poly(poly),
            None => CallArg::Typed(self.check_expr(arg, None)),
        }
    }

    /// Shape summary of a poly argument; `None` for standalone expressions.
    fn summarize_poly(&mut self, expr: ExprId) -> Option<PolyArg> {
        let body = self.body;
        let kind = match &body.expr(expr).kind {
            ExprKind::Lambda { params, body: lbody } => {
                let typed: Vec<Option<Type>> = params
                    .iter()
                    .map(|&p| body.local(p).ty.clone())
                    .collect();
                let param_list = if typed.iter().all(Option::is_some) && !typed.is_empty() {
                    LambdaParamList::Explicit(typed.into_iter().flatten().collect())
                } else {
                    // All-elided, or the mixed hard-error case, which the
                    // committed check rejects.
                    LambdaParamList::Elided(params.len())
                };
                let body_shape = match lbody {
                    LambdaBody::Expr(e) => LambdaBodyShape::Expression {
                        statement_expression: body.expr(*e).kind.is_statement_expression(),
                    },
                    LambdaBody::Block(root) => {
                        let shape = deneb_flow::return_shape(body, *root);
                        LambdaBodyShape::Block {
                            value_compatible: shape.value_compatible(),
                            void_compatible: shape.void_compatible(),
                        }
                    }
                };
                PolyArgKind::Lambda(LambdaShape {
                    params: param_list,
                    body: body_shape,
                })
            }
            ExprKind::MethodRef(mref) => PolyArgKind::MethodRef(self.summarize_method_ref(mref)),
            ExprKind::Cond {
                condition,
                then_expr,
                else_expr,
            } => {
                if !self.is_poly_expr(*then_expr) && !self.is_poly_expr(*else_expr) {
                    return None;
                }
                let (condition, then_expr, else_expr) = (*condition, *then_expr, *else_expr);
                self.check_condition(condition);
                let then_arg = Box::new(self.classify_arg(then_expr));
                let else_arg = Box::new(self.classify_arg(else_expr));
                PolyArgKind::Conditional { then_arg, else_arg }
            }
            ExprKind::Call { .. } | ExprKind::New { .. } => PolyArgKind::Invocation,
            _ => return None,
        };
        Some(PolyArg {
            handle: expr.raw(),
            kind,
        })
    }

    fn summarize_method_ref(&mut self, mref: &MethodRefExpr) -> MethodRefShape {
        match mref {
            MethodRefExpr::Bound { receiver, name } => {
                let (receiver, name) = (*receiver, name.clone());
                let receiver_ty = self.check_expr(receiver, None);
                MethodRefShape::Bound {
                    receiver: receiver_ty,
                    name,
                }
            }
            MethodRefExpr::Unbound { class, name } => MethodRefShape::Unbound {
                class: class.clone(),
                name: name.clone(),
            },
            MethodRefExpr::Ctor { class } => MethodRefShape::Ctor {
                class: class.clone(),
            },
            MethodRefExpr::ArrayCtor { component } => MethodRefShape::ArrayCtor {
                component: component.clone(),
            },
            MethodRefExpr::Super { class, name } => MethodRefShape::Super {
                class: class
                    .clone()
                    .or_else(|| self.enclosing_super_type())
                    .unwrap_or(Type::Unknown),
                name: name.clone(),
            },
        }
    }

    /// Check a poly expression against a target type.
    ///
    /// Called both speculatively (from [`PolyProbe::probe`], which rolls back
    /// everything it records) and as the committed check once a target is
    /// final.
    pub(crate) fn check_poly(&mut self, expr: ExprId, target: &Type) -> PolyFit {
        let body = self.body;
        match &body.expr(expr).kind {
            ExprKind::Lambda { .. } => self.check_lambda(expr, target),
            ExprKind::MethodRef(_) => self.check_method_ref(expr, target),
            ExprKind::Cond {
                condition,
                then_expr,
                else_expr,
            } => {
                let (condition, then_expr, else_expr) = (*condition, *then_expr, *else_expr);
                self.check_condition(condition);
                let mut fit = PolyFit {
                    compatible: true,
                    ..PolyFit::default()
                };
                for branch in [then_expr, else_expr] {
                    if self.is_poly_expr(branch) {
                        let branch_fit = self.check_poly(branch, target);
                        fit.compatible &= branch_fit.compatible;
                        fit.return_types.extend(branch_fit.return_types);
                        fit.thrown.extend(branch_fit.thrown);
                    } else {
                        let found = self.check_expr(branch, Some(target));
                        if !found.is_errorish()
                            && !target.is_errorish()
                            && self.is_proper(target)
                            && !self.assignable(&found, target)
                        {
                            let span = body.expr(branch).span;
                            self.push_diag(
                                DiagnosticKind::TypeMismatch {
                                    expected: target.clone(),
                                    found: found.clone(),
                                },
                                Some(span),
                            );
                            fit.compatible = false;
                        }
                        fit.return_types.push(found);
                    }
                }
                fit
            }
            // Nested invocation: resolve with the target as expected return.
            // A target still carrying the enclosing round's inference
            // variables would poison the nested round, so it only flows in
            // once proper; the resolved return type constrains the outer
            // round either way.
            _ => {
                let expected = self.is_proper(target).then(|| target.clone());
                let found = self.check_expr(expr, expected.as_ref());
                PolyFit {
                    compatible: !matches!(found, Type::Error),
                    return_types: vec![found],
                    thrown: self.uncaught_in_expr(expr),
                }
            }
        }
    }

    /// Whether a type mentions no type variables at all; used to decide if a
    /// mismatch against a possibly-uninferred target is reportable yet.
    pub(crate) fn is_proper(&self, ty: &Type) -> bool {
        let mut vars = Vec::new();
        ty.collect_type_vars(&mut vars);
        vars.is_empty()
    }

    /// Validate a written type's arguments against the declared bounds of
    /// the class it instantiates (including wildcard arguments through their
    /// bounds).
    pub(crate) fn check_type_well_formed(&mut self, ty: &Type, span: Span) {
        match ty {
            Type::Class(ct) if !ct.args.is_empty() => {
                for arg in &ct.args {
                    self.check_type_well_formed(arg, span);
                }
                let Some(class_def) = self.env.class(ct.def) else {
                    return;
                };
                if class_def.type_params.len() != ct.args.len() {
                    return;
                }
                let type_params = class_def.type_params.clone();
                let subst = deneb_types::class_substitution(&type_params, &ct.args);
                for violation in deneb_types::check_bounds(self.env, &type_params, &subst) {
                    let type_param = self
                        .env
                        .type_param(violation.type_param)
                        .map(|def| def.name.clone())
                        .unwrap_or_default();
                    self.push_diag(
                        DiagnosticKind::BoundMismatch {
                            type_param,
                            bound: violation.bound,
                            actual: violation.actual,
                        },
                        Some(span),
                    );
                }
            }
            Type::Array(elem) => self.check_type_well_formed(elem, span),
            Type::Wildcard(bound) => match bound {
                deneb_types::WildcardBound::Extends(b)
                | deneb_types::WildcardBound::Super(b) => self.check_type_well_formed(b, span),
                deneb_types::WildcardBound::Unbounded => {}
            },
            _ => {}
        }
    }
}

/// The diagnostic for a call with no applicable candidate.
///
/// The closest candidate's failure picks the kind: a named inference variable
/// (or an exhausted budget) and a failed varargs packing each have their own
/// diagnostic, a lone candidate is reported as not applicable, and anything
/// else falls back to the generic no-candidate report.
pub(crate) fn no_candidate_kind(
    name: String,
    best: Option<CandidateFailure>,
    considered: usize,
) -> DiagnosticKind {
    if let Some(failure) = &best {
        for phase in &failure.phases {
            match &phase.reason {
                NotApplicableReason::Inference(reason) => match reason {
                    InferenceFailureReason::Overflow => return DiagnosticKind::InferenceOverflow,
                    InferenceFailureReason::NoInstantiation { type_param }
                    | InferenceFailureReason::ConflictingBounds { type_param }
                    | InferenceFailureReason::BoundViolation { type_param } => {
                        return DiagnosticKind::InferenceFailure {
                            type_param: type_param.clone(),
                            reason: reason.clone(),
                        };
                    }
                    _ => {}
                },
                NotApplicableReason::VarargsMismatch {
                    expected_element,
                    found,
                    ..
                } => {
                    return DiagnosticKind::VarargsMismatch {
                        expected_element: expected_element.clone(),
                        found: found.clone(),
                    };
                }
                _ => {}
            }
        }
    }
    match best {
        Some(failure) if considered == 1 => DiagnosticKind::NotApplicable {
            method: failure.method.clone(),
            failure,
        },
        best => DiagnosticKind::NoApplicableMethod { name, best },
    }
}

/// Binary numeric promotion (JLS 5.6.2).
fn binary_promotion(a: PrimitiveType, b: PrimitiveType) -> PrimitiveType {
    use PrimitiveType::*;
    for candidate in [Double, Float, Long] {
        if a == candidate || b == candidate {
            return candidate;
        }
    }
    Int
}

/// Probe nesting bound: nested poly expressions recurse through strictly
/// smaller subtrees, so any deeper chain is pathological generic nesting.
const PROBE_DEPTH_LIMIT: usize = 64;

impl PolyProbe for Checker<'_> {
    fn probe(&mut self, _env: &dyn TypeEnv, handle: u32, target: &Type) -> PolyProbeOutcome {
        if self.probe_depth >= PROBE_DEPTH_LIMIT {
            return PolyProbeOutcome::incompatible();
        }
        let expr = ExprId::from_handle(handle);
        let diag_mark = self.diagnostics.len();
        let call_mark = self.calls.len();
        let lambda_mark = self.lambdas.len();
        let fatal_mark = self.fatal.clone();

        self.probe_depth += 1;
        let fit = self.check_poly(expr, target);
        self.probe_depth -= 1;

        // Speculative: a probe must leave no trace in the committed state.
        self.diagnostics.truncate(diag_mark);
        self.calls.truncate(call_mark);
        self.lambdas.truncate(lambda_mark);
        self.fatal = fatal_mark;

        PolyProbeOutcome {
            compatible: fit.compatible,
            return_types: fit.return_types,
            thrown_types: fit.thrown,
        }
    }
}
