//! Checked-exception propagation through a checked subtree.
//!
//! Runs after typing: `throw` statements contribute their operand's type and
//! resolved invocations contribute their instantiated `throws` clauses.
//! `try`/`catch` filters what escapes; lambda and method-reference subtrees
//! are opaque here because their exceptions surface through the functional
//! descriptor instead.

use deneb_hir::{ExprId, ExprKind, Receiver, StmtId, StmtKind};
use deneb_types::{is_checked_exception, Type};

use crate::checker::Checker;

impl Checker<'_> {
    pub(crate) fn uncaught_in_stmt(&self, stmt: StmtId) -> Vec<Type> {
        let mut out = Vec::new();
        self.stmt_exceptions(stmt, &mut out);
        out
    }

    pub(crate) fn uncaught_in_expr(&self, expr: ExprId) -> Vec<Type> {
        let mut out = Vec::new();
        self.expr_exceptions(expr, &mut out);
        out
    }

    fn add_thrown(&self, ty: &Type, out: &mut Vec<Type>) {
        if ty.is_errorish() || !is_checked_exception(self.env, ty) {
            return;
        }
        if !out.contains(ty) {
            out.push(ty.clone());
        }
    }

    fn stmt_exceptions(&self, stmt: StmtId, out: &mut Vec<Type>) {
        let body = self.body;
        match &body.stmt(stmt).kind {
            StmtKind::Block(stmts) => {
                for &s in stmts {
                    self.stmt_exceptions(s, out);
                }
            }
            StmtKind::Let {
                initializer: Some(init),
                ..
            } => self.expr_exceptions(*init, out),
            StmtKind::Let { .. } => {}
            StmtKind::Assign { value, .. } => self.expr_exceptions(*value, out),
            StmtKind::Expr(expr) => self.expr_exceptions(*expr, out),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.expr_exceptions(*condition, out);
                self.stmt_exceptions(*then_branch, out);
                if let Some(else_branch) = else_branch {
                    self.stmt_exceptions(*else_branch, out);
                }
            }
            StmtKind::While { condition, body: b } => {
                self.expr_exceptions(*condition, out);
                self.stmt_exceptions(*b, out);
            }
            StmtKind::For {
                init,
                condition,
                update,
                body: b,
            } => {
                if let Some(init) = init {
                    self.stmt_exceptions(*init, out);
                }
                if let Some(condition) = condition {
                    self.expr_exceptions(*condition, out);
                }
                if let Some(update) = update {
                    self.stmt_exceptions(*update, out);
                }
                self.stmt_exceptions(*b, out);
            }
            StmtKind::Return(Some(value)) => self.expr_exceptions(*value, out),
            StmtKind::Return(None) => {}
            StmtKind::Throw(value) => {
                self.expr_exceptions(*value, out);
                let thrown = self.expr_types[value.idx()].clone();
                self.add_thrown(&thrown, out);
            }
            StmtKind::Try {
                body: b,
                catches,
                finally,
            } => {
                let mut inner = Vec::new();
                self.stmt_exceptions(*b, &mut inner);
                inner.retain(|t| !catches.iter().any(|clause| self.subtype(t, &clause.ty)));
                for t in inner {
                    self.add_thrown(&t, out);
                }
                for clause in catches {
                    self.stmt_exceptions(clause.body, out);
                }
                if let Some(finally) = finally {
                    self.stmt_exceptions(*finally, out);
                }
            }
            StmtKind::Break | StmtKind::Continue | StmtKind::Nop => {}
        }
    }

    fn expr_exceptions(&self, expr: ExprId, out: &mut Vec<Type>) {
        let body = self.body;
        match &body.expr(expr).kind {
            // Opaque: a lambda or reference throws nothing at creation.
            ExprKind::Lambda { .. } | ExprKind::MethodRef(_) => {}
            ExprKind::Call { receiver, args, .. } => {
                if let Receiver::Expr(r) = receiver {
                    self.expr_exceptions(*r, out);
                }
                for &arg in args {
                    self.expr_exceptions(arg, out);
                }
                self.call_site_exceptions(expr, out);
            }
            ExprKind::New { args, .. } => {
                for &arg in args {
                    self.expr_exceptions(arg, out);
                }
                self.call_site_exceptions(expr, out);
            }
            ExprKind::Field { receiver, .. } => {
                if let Some(receiver) = receiver {
                    self.expr_exceptions(*receiver, out);
                }
            }
            ExprKind::NewArray { length, .. } => self.expr_exceptions(*length, out),
            ExprKind::ArrayIndex { array, index } => {
                self.expr_exceptions(*array, out);
                self.expr_exceptions(*index, out);
            }
            ExprKind::Assign { value, .. } => self.expr_exceptions(*value, out),
            ExprKind::Unary { operand, .. } => self.expr_exceptions(*operand, out),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.expr_exceptions(*lhs, out);
                self.expr_exceptions(*rhs, out);
            }
            ExprKind::Cond {
                condition,
                then_expr,
                else_expr,
            } => {
                self.expr_exceptions(*condition, out);
                self.expr_exceptions(*then_expr, out);
                self.expr_exceptions(*else_expr, out);
            }
            ExprKind::Cast { expr: inner, .. } => self.expr_exceptions(*inner, out),
            ExprKind::Literal(_) | ExprKind::Local(_) | ExprKind::This => {}
        }
    }

    /// The resolved callee's instantiated `throws` clause, when this site
    /// resolved.
    fn call_site_exceptions(&self, expr: ExprId, out: &mut Vec<Type>) {
        let resolved = self
            .calls
            .iter()
            .rev()
            .find(|(id, _)| *id == expr)
            .map(|(_, rc)| rc);
        if let Some(rc) = resolved {
            for t in &rc.thrown {
                self.add_thrown(t, out);
            }
        }
    }
}
