//! Completion-shape classification for block bodies.
//!
//! A lambda block is *value-compatible* when it cannot complete normally and
//! every `return` carries a value; *void-compatible* when no `return` ever
//! carries one (JLS 15.27.2). A block that always throws is both.

use deneb_hir::{Body, ExprId, StmtId};
use deneb_types::Span;

use crate::cfg::Terminator;
use crate::flow::{analyze_scoped, FlowConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnShape {
    /// The value expression and statement span of each reachable
    /// `return <value>`.
    pub value_returns: Vec<(ExprId, Span)>,
    /// Statement spans of each reachable bare `return`.
    pub bare_returns: Vec<Span>,
    /// Whether some reachable path falls off the end of the block.
    pub completes_normally: bool,
}

impl ReturnShape {
    #[must_use]
    pub fn value_compatible(&self) -> bool {
        !self.completes_normally && self.bare_returns.is_empty()
    }

    #[must_use]
    pub fn void_compatible(&self) -> bool {
        self.value_returns.is_empty()
    }
}

/// Classify the statement subtree rooted at `root`.
#[must_use]
pub fn return_shape(body: &Body, root: StmtId) -> ReturnShape {
    // Reachability only; the caller runs its own scoped pass when it wants
    // unreachable/assignment diagnostics for the same subtree.
    let result = analyze_scoped(
        body,
        root,
        vec![true; body.locals().len()],
        FlowConfig {
            report_unreachable: false,
        },
    );

    let mut shape = ReturnShape {
        value_returns: Vec::new(),
        bare_returns: Vec::new(),
        completes_normally: false,
    };

    for (idx, bb) in result.cfg.blocks.iter().enumerate() {
        if !result.reachable[idx] {
            continue;
        }
        match bb.terminator {
            Terminator::Return {
                value: Some(value),
                from,
            } => shape.value_returns.push((value, body.stmt(from).span)),
            Terminator::Return { value: None, from } => {
                shape.bare_returns.push(body.stmt(from).span);
            }
            Terminator::Exit => shape.completes_normally = true,
            _ => {}
        }
    }

    shape
}
