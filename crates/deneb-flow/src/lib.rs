//! Flow analysis over a `deneb-hir` body: CFG construction, reachability,
//! definite assignment, effectively-final classification, and return-shape
//! analysis for lambda blocks.
//!
//! The analyses here are expression-free of type information on purpose: the
//! checker combines their verdicts with resolved types (captured-variable
//! rules, value- vs void-compatibility) after overload resolution.

mod cfg;
mod flow;
mod shape;

pub use crate::cfg::{BasicBlock, BlockId, ControlFlowGraph, Terminator};
pub use crate::flow::{analyze, analyze_scoped, initial_assigned, FlowAnalysisResult, FlowConfig};
pub use crate::shape::{return_shape, ReturnShape};
