//! Arena-allocated expression/statement bodies.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use deneb_types::{Span, Type};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExprId(u32);

impl ExprId {
    pub(crate) fn from_raw(raw: u32) -> Self {
        ExprId(raw)
    }

    #[must_use]
    pub fn idx(self) -> usize {
        self.0 as usize
    }

    /// Stable key for engine callbacks that take an opaque `u32` handle.
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn from_handle(raw: u32) -> Self {
        ExprId(raw)
    }
}

impl fmt::Debug for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExprId({})", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StmtId(u32);

impl StmtId {
    pub(crate) fn from_raw(raw: u32) -> Self {
        StmtId(raw)
    }

    #[must_use]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for StmtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StmtId({})", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalId(u32);

impl LocalId {
    pub(crate) fn from_raw(raw: u32) -> Self {
        LocalId(raw)
    }

    #[must_use]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalId({})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalKind {
    /// A method parameter (definitely assigned on entry).
    Param,
    /// A lambda parameter, owned by the lambda expression that declares it.
    LambdaParam,
    Local,
    /// A `catch` clause parameter.
    CatchParam,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDecl {
    pub name: String,
    /// `None` for an elided lambda parameter type; assigned from the target
    /// descriptor during checking.
    pub ty: Option<Type>,
    pub kind: LocalKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Long(i64),
    Double(f64),
    Char(char),
    Str(String),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

impl UnaryOp {
    /// Increment/decrement forms write back to their operand.
    #[must_use]
    pub fn mutates(self) -> bool {
        matches!(
            self,
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// What a call is dispatched on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Receiver {
    Expr(ExprId),
    /// `TypeName.method(...)`
    Static(Type),
    /// Implicit or explicit `this.method(...)`
    This,
    /// `super.method(...)`
    Super,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MethodRefExpr {
    /// `expr::method`
    Bound { receiver: ExprId, name: String },
    /// `Type::method`
    Unbound { class: Type, name: String },
    /// `Type::new`
    Ctor { class: Type },
    /// `T[]::new`
    ArrayCtor { component: Type },
    /// `Type.super::method`; `class` is `None` for a bare `super::method`.
    Super { class: Option<Type>, name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LambdaBody {
    Expr(ExprId),
    Block(StmtId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(Literal),
    Local(LocalId),
    Field {
        /// `None` means an implicit `this.` access.
        receiver: Option<ExprId>,
        name: String,
    },
    Call {
        receiver: Receiver,
        name: String,
        args: Vec<ExprId>,
        type_args: Vec<Type>,
    },
    New {
        class: Type,
        args: Vec<ExprId>,
        type_args: Vec<Type>,
    },
    NewArray {
        element: Type,
        length: ExprId,
    },
    ArrayIndex {
        array: ExprId,
        index: ExprId,
    },
    /// Assignment to a local, usable in expression position.
    Assign {
        target: LocalId,
        value: ExprId,
    },
    Unary {
        op: UnaryOp,
        operand: ExprId,
    },
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    /// `cond ? then : else`; a poly expression when its branches are.
    Cond {
        condition: ExprId,
        then_expr: ExprId,
        else_expr: ExprId,
    },
    Lambda {
        params: Vec<LocalId>,
        body: LambdaBody,
    },
    MethodRef(MethodRefExpr),
    Cast {
        ty: Type,
        expr: ExprId,
    },
    This,
}

impl ExprKind {
    /// Statement expressions (JLS 14.8): the only expression forms that may
    /// stand alone as a statement, and thus the only single-expression
    /// lambda bodies compatible with a `void` target.
    #[must_use]
    pub fn is_statement_expression(&self) -> bool {
        matches!(
            self,
            ExprKind::Assign { .. }
                | ExprKind::Call { .. }
                | ExprKind::New { .. }
                | ExprKind::Unary {
                    op: UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec,
                    ..
                }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    pub local: LocalId,
    pub ty: Type,
    pub body: StmtId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Block(Vec<StmtId>),
    Let {
        local: LocalId,
        initializer: Option<ExprId>,
    },
    Assign {
        target: LocalId,
        value: ExprId,
    },
    Expr(ExprId),
    If {
        condition: ExprId,
        then_branch: StmtId,
        else_branch: Option<StmtId>,
    },
    While {
        condition: ExprId,
        body: StmtId,
    },
    For {
        init: Option<StmtId>,
        condition: Option<ExprId>,
        update: Option<StmtId>,
        body: StmtId,
    },
    Return(Option<ExprId>),
    Throw(ExprId),
    Try {
        body: StmtId,
        catches: Vec<CatchClause>,
        finally: Option<StmtId>,
    },
    Break,
    Continue,
    Nop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BodyError {
    #[error("body has no root statement")]
    MissingRoot,
}

/// One method (or initializer) body: expression, statement and local arenas
/// plus the root statement. Lambda bodies nest inside the same arenas.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Body {
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
    locals: Vec<LocalDecl>,
    root: Option<StmtId>,
}

impl Body {
    #[must_use]
    pub fn new() -> Body {
        Body::default()
    }

    pub fn alloc_expr(&mut self, kind: ExprKind, span: Span) -> ExprId {
        let id = ExprId::from_raw(self.exprs.len() as u32);
        self.exprs.push(Expr { kind, span });
        id
    }

    pub fn alloc_stmt(&mut self, kind: StmtKind, span: Span) -> StmtId {
        let id = StmtId::from_raw(self.stmts.len() as u32);
        self.stmts.push(Stmt { kind, span });
        id
    }

    pub fn alloc_local(&mut self, decl: LocalDecl) -> LocalId {
        let id = LocalId::from_raw(self.locals.len() as u32);
        self.locals.push(decl);
        id
    }

    pub fn set_root(&mut self, root: StmtId) {
        self.root = Some(root);
    }

    /// The root statement; a body without one is an upstream lowering bug.
    pub fn root(&self) -> Result<StmtId, BodyError> {
        self.root.ok_or(BodyError::MissingRoot)
    }

    #[must_use]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.idx()]
    }

    #[must_use]
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.idx()]
    }

    #[must_use]
    pub fn local(&self, id: LocalId) -> &LocalDecl {
        &self.locals[id.idx()]
    }

    #[must_use]
    pub fn locals(&self) -> &[LocalDecl] {
        &self.locals
    }

    pub fn locals_iter(&self) -> impl Iterator<Item = (LocalId, &LocalDecl)> {
        self.locals
            .iter()
            .enumerate()
            .map(|(idx, decl)| (LocalId::from_raw(idx as u32), decl))
    }

    #[must_use]
    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    pub fn exprs(&self) -> impl Iterator<Item = (ExprId, &Expr)> {
        self.exprs
            .iter()
            .enumerate()
            .map(|(idx, e)| (ExprId::from_raw(idx as u32), e))
    }

    pub fn stmts(&self) -> impl Iterator<Item = (StmtId, &Stmt)> {
        self.stmts
            .iter()
            .enumerate()
            .map(|(idx, s)| (StmtId::from_raw(idx as u32), s))
    }
}

/// Convenience layer over [`Body`] for lowering code and tests.
///
/// Every allocated node gets a fresh one-byte span so diagnostics keyed by
/// span stay distinct and ordered even when no real source text exists.
#[derive(Debug, Default)]
pub struct BodyBuilder {
    body: Body,
    pos: usize,
}

impl BodyBuilder {
    #[must_use]
    pub fn new() -> BodyBuilder {
        BodyBuilder::default()
    }

    fn next_span(&mut self) -> Span {
        let span = Span::new(self.pos, self.pos + 1);
        self.pos += 1;
        span
    }

    /// An untyped local; lambda parameters left untyped are elided.
    pub fn local(&mut self, name: &str, kind: LocalKind) -> LocalId {
        let span = self.next_span();
        self.body.alloc_local(LocalDecl {
            name: name.to_string(),
            ty: None,
            kind,
            span,
        })
    }

    pub fn typed_local(&mut self, name: &str, ty: Type, kind: LocalKind) -> LocalId {
        let span = self.next_span();
        self.body.alloc_local(LocalDecl {
            name: name.to_string(),
            ty: Some(ty),
            kind,
            span,
        })
    }

    pub fn expr(&mut self, kind: ExprKind) -> ExprId {
        let span = self.next_span();
        self.body.alloc_expr(kind, span)
    }

    pub fn stmt(&mut self, kind: StmtKind) -> StmtId {
        let span = self.next_span();
        self.body.alloc_stmt(kind, span)
    }

    #[must_use]
    pub fn finish(mut self, root: StmtId) -> Body {
        self.body.set_root(root);
        self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builder_allocates_dense_ids_with_distinct_spans() {
        let mut b = BodyBuilder::new();
        let one = b.expr(ExprKind::Literal(Literal::Int(1)));
        let two = b.expr(ExprKind::Literal(Literal::Int(2)));
        let stmt = b.stmt(StmtKind::Expr(two));
        let root = b.stmt(StmtKind::Block(vec![stmt]));
        let body = b.finish(root);

        assert_eq!(one.idx(), 0);
        assert_eq!(two.idx(), 1);
        assert_ne!(body.expr(one).span, body.expr(two).span);
        assert_eq!(body.root(), Ok(root));
    }

    #[test]
    fn body_without_a_root_is_an_error() {
        assert_eq!(Body::new().root(), Err(BodyError::MissingRoot));
    }

    #[test]
    fn statement_expression_classification() {
        let mut b = BodyBuilder::new();
        let one = b.expr(ExprKind::Literal(Literal::Int(1)));
        let x = b.local("x", LocalKind::Local);
        let assign = b.expr(ExprKind::Assign {
            target: x,
            value: one,
        });
        let x_read = b.expr(ExprKind::Local(x));
        let bump = b.expr(ExprKind::Unary {
            op: UnaryOp::PostInc,
            operand: x_read,
        });
        let negate = b.expr(ExprKind::Unary {
            op: UnaryOp::Neg,
            operand: x_read,
        });
        let stmt = b.stmt(StmtKind::Expr(assign));
        let root = b.stmt(StmtKind::Block(vec![stmt]));
        let body = b.finish(root);

        assert!(body.expr(assign).kind.is_statement_expression());
        assert!(body.expr(bump).kind.is_statement_expression());
        assert!(!body.expr(negate).kind.is_statement_expression());
        assert!(!body.expr(one).kind.is_statement_expression());
    }
}
