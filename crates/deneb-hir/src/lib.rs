//! Source-position-tagged expression/statement trees for the checker.
//!
//! This crate is the boundary to the (out-of-scope) parser: a front end
//! lowers source into [`body::Body`] values, and the checker consumes them
//! without ever seeing tokens. Trees are arena-allocated with dense ids so
//! analyses can use plain index-keyed side tables.

pub mod body;

pub use body::{
    BinaryOp, Body, BodyBuilder, BodyError, CatchClause, Expr, ExprId, ExprKind, LambdaBody,
    Literal, LocalDecl, LocalId, LocalKind, MethodRefExpr, Receiver, Stmt, StmtId, StmtKind,
    UnaryOp,
};
