use std::collections::VecDeque;

use deneb_hir::{
    BinaryOp, Body, ExprId, ExprKind, LocalKind, MethodRefExpr, Receiver, StmtId, StmtKind,
};
use deneb_types::{Diagnostic, DiagnosticKind};

use crate::cfg::{BlockId, CfgBuilder, ControlFlowGraph, Terminator};

#[derive(Debug, Clone, Copy)]
pub struct FlowConfig {
    /// Emit warnings for unreachable statements.
    pub report_unreachable: bool,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            report_unreachable: true,
        }
    }
}

#[derive(Debug)]
pub struct FlowAnalysisResult {
    pub cfg: ControlFlowGraph,
    pub reachable: Vec<bool>,
    pub diagnostics: Vec<Diagnostic>,
    /// Per local: assigned at most once on every reachable path and never
    /// after its first assignment.
    pub effectively_final: Vec<bool>,
    /// Definite-assignment snapshot taken at each lambda expression site, in
    /// block order. Captured-variable rules are checked against these.
    pub lambda_states: Vec<(ExprId, Vec<bool>)>,
}

impl FlowAnalysisResult {
    #[must_use]
    pub fn lambda_state(&self, lambda: ExprId) -> Option<&[bool]> {
        self.lambda_states
            .iter()
            .find(|(id, _)| *id == lambda)
            .map(|(_, state)| state.as_slice())
    }
}

/// The definite-assignment entry state of a full body: parameters (of every
/// flavor) are assigned on entry, plain locals are not.
#[must_use]
pub fn initial_assigned(body: &Body) -> Vec<bool> {
    body.locals()
        .iter()
        .map(|local| {
            matches!(
                local.kind,
                LocalKind::Param | LocalKind::LambdaParam | LocalKind::CatchParam
            )
        })
        .collect()
}

/// Analyze a whole body from its root statement.
#[must_use]
pub fn analyze(body: &Body, config: FlowConfig) -> FlowAnalysisResult {
    match body.root() {
        Ok(root) => analyze_scoped(body, root, initial_assigned(body), config),
        Err(_) => {
            let mut builder = CfgBuilder::new();
            let entry = builder.new_block();
            let cfg = builder.build(entry);
            let reachable = cfg.reachable_blocks();
            FlowAnalysisResult {
                cfg,
                reachable,
                diagnostics: Vec::new(),
                effectively_final: vec![true; body.locals().len()],
                lambda_states: Vec::new(),
            }
        }
    }
}

/// Analyze a statement subtree (a lambda block body) with an explicit entry
/// state, typically the enclosing snapshot plus the lambda's own parameters.
#[must_use]
pub fn analyze_scoped(
    body: &Body,
    root: StmtId,
    entry_state: Vec<bool>,
    config: FlowConfig,
) -> FlowAnalysisResult {
    let cfg = build_cfg(body, root);
    let reachable = cfg.reachable_blocks();

    let mut diagnostics = Vec::new();
    if config.report_unreachable {
        diagnostics.extend(unreachable_diagnostics(body, &cfg, &reachable));
    }

    let mut lambda_states = Vec::new();
    definite_assignment_diagnostics(
        body,
        &cfg,
        &reachable,
        &entry_state,
        &mut diagnostics,
        &mut lambda_states,
    );

    let effectively_final = effectively_final(body, &cfg, &reachable);

    FlowAnalysisResult {
        cfg,
        reachable,
        diagnostics,
        effectively_final,
        lambda_states,
    }
}

fn unreachable_diagnostics(
    body: &Body,
    cfg: &ControlFlowGraph,
    reachable: &[bool],
) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    for (idx, bb) in cfg.blocks.iter().enumerate() {
        if reachable[idx] {
            continue;
        }

        let stmt = bb
            .stmts
            .first()
            .copied()
            .or_else(|| bb.terminator.from_stmt());
        let Some(stmt) = stmt else { continue };

        diags.push(Diagnostic::new(
            DiagnosticKind::UnreachableCode,
            Some(body.stmt(stmt).span),
        ));
    }
    diags
}

// === CFG construction ===

#[derive(Debug, Clone, Copy)]
struct LoopContext {
    break_target: BlockId,
    continue_target: BlockId,
}

fn build_cfg(body: &Body, root: StmtId) -> ControlFlowGraph {
    let mut builder = HirCfgBuilder::new(body);
    let entry = builder.cfg.new_block();
    let _ = builder.build_stmt(root, entry);
    builder.cfg.build(entry)
}

struct HirCfgBuilder<'a> {
    body: &'a Body,
    cfg: CfgBuilder,
    loop_stack: Vec<LoopContext>,
}

impl<'a> HirCfgBuilder<'a> {
    fn new(body: &'a Body) -> Self {
        Self {
            body,
            cfg: CfgBuilder::new(),
            loop_stack: Vec::new(),
        }
    }

    fn build_seq(&mut self, stmts: &[StmtId], entry: BlockId) -> Option<BlockId> {
        let mut reachable_current: Option<BlockId> = Some(entry);
        let mut unreachable_current: Option<BlockId> = None;

        for &stmt in stmts {
            if let Some(cur) = reachable_current {
                reachable_current = self.build_stmt(stmt, cur);
                continue;
            }

            let cur = unreachable_current.unwrap_or_else(|| {
                let bb = self.cfg.new_block();
                unreachable_current = Some(bb);
                bb
            });

            unreachable_current = self.build_stmt(stmt, cur);
        }

        reachable_current
    }

    fn build_stmt(&mut self, stmt: StmtId, entry: BlockId) -> Option<BlockId> {
        let stmt_data = self.body.stmt(stmt);
        match &stmt_data.kind {
            StmtKind::Block(stmts) => self.build_seq(stmts, entry),

            StmtKind::Let { .. } | StmtKind::Assign { .. } | StmtKind::Expr(_) | StmtKind::Nop => {
                self.cfg.push_stmt(entry, stmt);
                Some(entry)
            }

            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let then_entry = self.cfg.new_block();
                let else_entry = self.cfg.new_block();
                let join = self.cfg.new_block();

                self.cfg.set_terminator(
                    entry,
                    Terminator::If {
                        condition: *condition,
                        then_target: then_entry,
                        else_target: else_entry,
                        from: stmt,
                    },
                );

                let then_fallthrough = self.build_stmt(*then_branch, then_entry);
                if let Some(bb) = then_fallthrough {
                    self.cfg.set_terminator(
                        bb,
                        Terminator::Goto {
                            target: join,
                            from: None,
                        },
                    );
                }

                let else_fallthrough = match else_branch {
                    Some(stmt) => self.build_stmt(*stmt, else_entry),
                    None => Some(else_entry),
                };
                if let Some(bb) = else_fallthrough {
                    self.cfg.set_terminator(
                        bb,
                        Terminator::Goto {
                            target: join,
                            from: None,
                        },
                    );
                }

                if then_fallthrough.is_some() || else_fallthrough.is_some() {
                    Some(join)
                } else {
                    None
                }
            }

            StmtKind::While { condition, body } => {
                let cond_bb = self.cfg.new_block();
                let body_bb = self.cfg.new_block();
                let after_bb = self.cfg.new_block();

                self.cfg.set_terminator(
                    entry,
                    Terminator::Goto {
                        target: cond_bb,
                        from: None,
                    },
                );

                self.cfg.set_terminator(
                    cond_bb,
                    Terminator::If {
                        condition: *condition,
                        then_target: body_bb,
                        else_target: after_bb,
                        from: stmt,
                    },
                );

                self.loop_stack.push(LoopContext {
                    break_target: after_bb,
                    continue_target: cond_bb,
                });

                let body_fallthrough = self.build_stmt(*body, body_bb);
                self.loop_stack.pop();

                if let Some(bb) = body_fallthrough {
                    self.cfg.set_terminator(
                        bb,
                        Terminator::Goto {
                            target: cond_bb,
                            from: None,
                        },
                    );
                }

                Some(after_bb)
            }

            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                let init_fallthrough = match init {
                    Some(init) => self.build_stmt(*init, entry),
                    None => Some(entry),
                };
                let Some(init_end) = init_fallthrough else {
                    return None;
                };

                let cond_bb = self.cfg.new_block();
                let body_bb = self.cfg.new_block();
                let update_bb = if update.is_some() {
                    self.cfg.new_block()
                } else {
                    cond_bb
                };
                let after_bb = self.cfg.new_block();

                self.cfg.set_terminator(
                    init_end,
                    Terminator::Goto {
                        target: cond_bb,
                        from: None,
                    },
                );

                match condition {
                    Some(cond) => self.cfg.set_terminator(
                        cond_bb,
                        Terminator::If {
                            condition: *cond,
                            then_target: body_bb,
                            else_target: after_bb,
                            from: stmt,
                        },
                    ),
                    None => {
                        // Best-effort: treat a missing condition as an
                        // infinite loop.
                        self.cfg.set_terminator(
                            cond_bb,
                            Terminator::Goto {
                                target: body_bb,
                                from: Some(stmt),
                            },
                        );
                    }
                }

                self.loop_stack.push(LoopContext {
                    break_target: after_bb,
                    continue_target: update_bb,
                });

                let body_fallthrough = self.build_stmt(*body, body_bb);
                self.loop_stack.pop();

                if let Some(bb) = body_fallthrough {
                    self.cfg.set_terminator(
                        bb,
                        Terminator::Goto {
                            target: update_bb,
                            from: None,
                        },
                    );
                }

                if let Some(update_stmt) = update {
                    let update_fallthrough = self.build_stmt(*update_stmt, update_bb);
                    if let Some(bb) = update_fallthrough {
                        self.cfg.set_terminator(
                            bb,
                            Terminator::Goto {
                                target: cond_bb,
                                from: None,
                            },
                        );
                    }
                }

                Some(after_bb)
            }

            StmtKind::Try {
                body,
                catches,
                finally,
            } => {
                // Best-effort exception modeling: the try entry can reach the
                // body or any catch clause; precise throw-point edges are out
                // of scope.
                let body_bb = self.cfg.new_block();
                let catch_bbs: Vec<BlockId> =
                    catches.iter().map(|_| self.cfg.new_block()).collect();
                let mut targets = vec![body_bb];
                targets.extend(catch_bbs.iter().copied());
                self.cfg.set_terminator(
                    entry,
                    Terminator::Multi {
                        targets,
                        from: stmt,
                    },
                );

                let join = self.cfg.new_block();
                let mut any_fallthrough = false;
                if let Some(bb) = self.build_stmt(*body, body_bb) {
                    self.cfg.set_terminator(
                        bb,
                        Terminator::Goto {
                            target: join,
                            from: None,
                        },
                    );
                    any_fallthrough = true;
                }
                for (clause, bb) in catches.iter().zip(catch_bbs) {
                    if let Some(end) = self.build_stmt(clause.body, bb) {
                        self.cfg.set_terminator(
                            end,
                            Terminator::Goto {
                                target: join,
                                from: None,
                            },
                        );
                        any_fallthrough = true;
                    }
                }

                let after_finally = match finally {
                    Some(finally) => self.build_stmt(*finally, join),
                    None => Some(join),
                };
                if any_fallthrough {
                    after_finally
                } else {
                    None
                }
            }

            StmtKind::Return(value) => {
                self.cfg.set_terminator(
                    entry,
                    Terminator::Return {
                        value: *value,
                        from: stmt,
                    },
                );
                None
            }

            StmtKind::Throw(exception) => {
                self.cfg.set_terminator(
                    entry,
                    Terminator::Throw {
                        exception: *exception,
                        from: stmt,
                    },
                );
                None
            }

            StmtKind::Break => {
                let target = self
                    .loop_stack
                    .last()
                    .map(|ctx| ctx.break_target)
                    .unwrap_or(entry);
                self.cfg.set_terminator(
                    entry,
                    Terminator::Goto {
                        target,
                        from: Some(stmt),
                    },
                );
                None
            }

            StmtKind::Continue => {
                let target = self
                    .loop_stack
                    .last()
                    .map(|ctx| ctx.continue_target)
                    .unwrap_or(entry);
                self.cfg.set_terminator(
                    entry,
                    Terminator::Goto {
                        target,
                        from: Some(stmt),
                    },
                );
                None
            }
        }
    }
}

// === Definite assignment ===

/// Walker applying the definite-assignment transfer function to one
/// statement/expression at a time. The fixed-point pass runs it with the
/// sinks unset; the reporting pass collects diagnostics and lambda-site
/// snapshots.
struct DaWalk<'a> {
    body: &'a Body,
    diags: Option<&'a mut Vec<Diagnostic>>,
    lambdas: Option<&'a mut Vec<(ExprId, Vec<bool>)>>,
}

impl DaWalk<'_> {
    fn stmt(&mut self, stmt: StmtId, state: &mut Vec<bool>) {
        let stmt_data = self.body.stmt(stmt);
        match &stmt_data.kind {
            StmtKind::Let { local, initializer } => {
                if let Some(init) = initializer {
                    self.expr(*init, state);
                    state[local.idx()] = true;
                } else {
                    state[local.idx()] = false;
                }
            }
            StmtKind::Assign { target, value } => {
                self.expr(*value, state);
                state[target.idx()] = true;
            }
            StmtKind::Expr(expr) => self.expr(*expr, state),
            StmtKind::Block(_) => unreachable!("block statements are flattened in CFG"),
            StmtKind::If { .. }
            | StmtKind::While { .. }
            | StmtKind::For { .. }
            | StmtKind::Try { .. }
            | StmtKind::Return(_)
            | StmtKind::Throw(_)
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Nop => {}
        }
    }

    fn terminator(&mut self, term: &Terminator, state: &mut Vec<bool>) {
        match *term {
            Terminator::If { condition, .. } => self.expr(condition, state),
            Terminator::Return { value, .. } => {
                if let Some(value) = value {
                    self.expr(value, state);
                }
            }
            Terminator::Throw { exception, .. } => self.expr(exception, state),
            Terminator::Goto { .. } | Terminator::Multi { .. } | Terminator::Exit => {}
        }
    }

    fn expr(&mut self, expr: ExprId, state: &mut Vec<bool>) {
        let expr_data = self.body.expr(expr);
        match &expr_data.kind {
            ExprKind::Literal(_) | ExprKind::This => {}
            ExprKind::Local(local) => {
                if local.idx() < state.len() && !state[local.idx()] {
                    if let Some(diags) = self.diags.as_deref_mut() {
                        let name = self.body.local(*local).name.clone();
                        diags.push(Diagnostic::new(
                            DiagnosticKind::UseBeforeAssignment { name },
                            Some(expr_data.span),
                        ));
                    }
                }
            }
            ExprKind::Field { receiver, .. } => {
                if let Some(receiver) = receiver {
                    self.expr(*receiver, state);
                }
            }
            ExprKind::Call { receiver, args, .. } => {
                if let Receiver::Expr(receiver) = receiver {
                    self.expr(*receiver, state);
                }
                for arg in args {
                    self.expr(*arg, state);
                }
            }
            ExprKind::New { args, .. } => {
                for arg in args {
                    self.expr(*arg, state);
                }
            }
            ExprKind::NewArray { length, .. } => self.expr(*length, state),
            ExprKind::ArrayIndex { array, index } => {
                self.expr(*array, state);
                self.expr(*index, state);
            }
            ExprKind::Assign { target, value } => {
                self.expr(*value, state);
                state[target.idx()] = true;
            }
            ExprKind::Unary { operand, .. } => self.expr(*operand, state),
            ExprKind::Binary { op, lhs, rhs } => {
                self.expr(*lhs, state);
                if matches!(op, BinaryOp::And | BinaryOp::Or) {
                    // The right operand may be skipped, so its assignments do
                    // not survive; diagnostics inside it still fire.
                    let mut rhs_state = state.clone();
                    self.expr(*rhs, &mut rhs_state);
                } else {
                    self.expr(*rhs, state);
                }
            }
            ExprKind::Cond {
                condition,
                then_expr,
                else_expr,
            } => {
                self.expr(*condition, state);
                let mut then_state = state.clone();
                self.expr(*then_expr, &mut then_state);
                self.expr(*else_expr, state);
                for (slot, v) in state.iter_mut().zip(then_state) {
                    *slot &= v;
                }
            }
            ExprKind::Lambda { .. } => {
                // The body runs later (if at all); capture rules are checked
                // against the snapshot taken here, in its own scoped pass.
                if let Some(lambdas) = self.lambdas.as_deref_mut() {
                    lambdas.push((expr, state.clone()));
                }
            }
            ExprKind::MethodRef(mref) => {
                if let MethodRefExpr::Bound { receiver, .. } = mref {
                    self.expr(*receiver, state);
                }
            }
            ExprKind::Cast { expr, .. } => self.expr(*expr, state),
        }
    }
}

fn definite_assignment_states(
    body: &Body,
    cfg: &ControlFlowGraph,
    reachable: &[bool],
    entry_state: &[bool],
) -> Vec<Vec<bool>> {
    let n_blocks = cfg.blocks.len();
    let n_locals = body.locals().len();

    let mut in_states = vec![vec![true; n_locals]; n_blocks];
    let mut out_states = vec![vec![true; n_locals]; n_blocks];
    in_states[cfg.entry.index()] = entry_state.to_vec();

    let mut worklist = VecDeque::new();
    for idx in 0..n_blocks {
        if reachable[idx] {
            worklist.push_back(BlockId(idx));
        }
    }

    while let Some(bb) = worklist.pop_front() {
        if !reachable[bb.index()] {
            continue;
        }

        let new_in = if bb == cfg.entry {
            entry_state.to_vec()
        } else {
            meet_assigned(
                n_locals,
                cfg.predecessors(bb).iter().filter_map(|pred| {
                    if reachable[pred.index()] {
                        Some(&out_states[pred.index()])
                    } else {
                        None
                    }
                }),
            )
        };

        if new_in != in_states[bb.index()] {
            in_states[bb.index()] = new_in.clone();
        }

        let mut new_out = new_in;
        let mut walk = DaWalk {
            body,
            diags: None,
            lambdas: None,
        };
        let block = cfg.block(bb);
        for stmt in &block.stmts {
            walk.stmt(*stmt, &mut new_out);
        }
        walk.terminator(&block.terminator, &mut new_out);

        if new_out != out_states[bb.index()] {
            out_states[bb.index()] = new_out;
            for succ in cfg.successors(bb) {
                worklist.push_back(succ);
            }
        }
    }

    in_states
}

fn meet_assigned<'a>(
    n_locals: usize,
    mut inputs: impl Iterator<Item = &'a Vec<bool>>,
) -> Vec<bool> {
    let Some(first) = inputs.next() else {
        return vec![false; n_locals];
    };
    let mut out = first.clone();
    for inp in inputs {
        for (slot, v) in out.iter_mut().zip(inp.iter().copied()) {
            *slot &= v;
        }
    }
    out
}

fn definite_assignment_diagnostics(
    body: &Body,
    cfg: &ControlFlowGraph,
    reachable: &[bool],
    entry_state: &[bool],
    diags: &mut Vec<Diagnostic>,
    lambdas: &mut Vec<(ExprId, Vec<bool>)>,
) {
    let in_states = definite_assignment_states(body, cfg, reachable, entry_state);

    for (idx, bb) in cfg.blocks.iter().enumerate() {
        if !reachable[idx] {
            continue;
        }
        let mut state = in_states[idx].clone();
        let mut walk = DaWalk {
            body,
            diags: Some(diags),
            lambdas: Some(lambdas),
        };
        for stmt in &bb.stmts {
            walk.stmt(*stmt, &mut state);
        }
        walk.terminator(&bb.terminator, &mut state);
    }
}

// === Effectively final ===

/// Assignment-count lattice per local: 0 = never, 1 = at most once,
/// 2 = possibly more than once. Join over paths is `max`.
type AssignCount = u8;

struct EfWalk<'a> {
    body: &'a Body,
    flagged: Option<&'a mut Vec<bool>>,
}

impl EfWalk<'_> {
    fn bump(&mut self, local: usize, state: &mut [AssignCount]) {
        if state[local] >= 1 {
            if let Some(flagged) = self.flagged.as_deref_mut() {
                flagged[local] = true;
            }
        }
        state[local] = (state[local] + 1).min(2);
    }

    fn stmt(&mut self, stmt: StmtId, state: &mut Vec<AssignCount>) {
        match &self.body.stmt(stmt).kind {
            StmtKind::Let { local, initializer } => {
                if let Some(init) = initializer {
                    self.expr(*init, state);
                    self.bump(local.idx(), state);
                }
            }
            StmtKind::Assign { target, value } => {
                self.expr(*value, state);
                self.bump(target.idx(), state);
            }
            StmtKind::Expr(expr) => self.expr(*expr, state),
            StmtKind::Block(_) => unreachable!("block statements are flattened in CFG"),
            _ => {}
        }
    }

    fn terminator(&mut self, term: &Terminator, state: &mut Vec<AssignCount>) {
        match *term {
            Terminator::If { condition, .. } => self.expr(condition, state),
            Terminator::Return { value: Some(v), .. } => self.expr(v, state),
            Terminator::Throw { exception, .. } => self.expr(exception, state),
            _ => {}
        }
    }

    fn expr(&mut self, expr: ExprId, state: &mut Vec<AssignCount>) {
        match &self.body.expr(expr).kind {
            ExprKind::Assign { target, value } => {
                self.expr(*value, state);
                self.bump(target.idx(), state);
            }
            ExprKind::Unary { op, operand } => {
                self.expr(*operand, state);
                if op.mutates() {
                    if let ExprKind::Local(local) = &self.body.expr(*operand).kind {
                        self.bump(local.idx(), state);
                    }
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.expr(*lhs, state);
                if matches!(op, BinaryOp::And | BinaryOp::Or) {
                    let mut rhs_state = state.clone();
                    self.expr(*rhs, &mut rhs_state);
                    join_counts(state, &rhs_state);
                } else {
                    self.expr(*rhs, state);
                }
            }
            ExprKind::Cond {
                condition,
                then_expr,
                else_expr,
            } => {
                self.expr(*condition, state);
                let mut then_state = state.clone();
                self.expr(*then_expr, &mut then_state);
                self.expr(*else_expr, state);
                join_counts(state, &then_state);
            }
            ExprKind::Field { receiver, .. } => {
                if let Some(receiver) = receiver {
                    self.expr(*receiver, state);
                }
            }
            ExprKind::Call { receiver, args, .. } => {
                if let Receiver::Expr(receiver) = receiver {
                    self.expr(*receiver, state);
                }
                for arg in args {
                    self.expr(*arg, state);
                }
            }
            ExprKind::New { args, .. } => {
                for arg in args {
                    self.expr(*arg, state);
                }
            }
            ExprKind::NewArray { length, .. } => self.expr(*length, state),
            ExprKind::ArrayIndex { array, index } => {
                self.expr(*array, state);
                self.expr(*index, state);
            }
            ExprKind::Cast { expr, .. } => self.expr(*expr, state),
            ExprKind::MethodRef(MethodRefExpr::Bound { receiver, .. }) => {
                self.expr(*receiver, state);
            }
            // Assignments inside a lambda body target the lambda's own flow;
            // writes to captured locals are rejected by the checker directly.
            ExprKind::Lambda { .. }
            | ExprKind::MethodRef(_)
            | ExprKind::Literal(_)
            | ExprKind::Local(_)
            | ExprKind::This => {}
        }
    }
}

fn join_counts(state: &mut [AssignCount], other: &[AssignCount]) {
    for (slot, v) in state.iter_mut().zip(other.iter().copied()) {
        *slot = (*slot).max(v);
    }
}

fn effectively_final(body: &Body, cfg: &ControlFlowGraph, reachable: &[bool]) -> Vec<bool> {
    let n_blocks = cfg.blocks.len();
    let n_locals = body.locals().len();

    let init: Vec<AssignCount> = body
        .locals()
        .iter()
        .map(|local| match local.kind {
            LocalKind::Param | LocalKind::LambdaParam | LocalKind::CatchParam => 1,
            LocalKind::Local => 0,
        })
        .collect();

    let mut in_states = vec![vec![0; n_locals]; n_blocks];
    let mut out_states = vec![vec![0; n_locals]; n_blocks];
    in_states[cfg.entry.index()] = init.clone();

    let mut worklist = VecDeque::new();
    for idx in 0..n_blocks {
        if reachable[idx] {
            worklist.push_back(BlockId(idx));
        }
    }

    while let Some(bb) = worklist.pop_front() {
        if !reachable[bb.index()] {
            continue;
        }

        let mut new_in = if bb == cfg.entry {
            init.clone()
        } else {
            vec![0; n_locals]
        };
        for pred in cfg.predecessors(bb) {
            if reachable[pred.index()] {
                join_counts(&mut new_in, &out_states[pred.index()]);
            }
        }
        in_states[bb.index()] = new_in.clone();

        let mut new_out = new_in;
        let mut walk = EfWalk {
            body,
            flagged: None,
        };
        let block = cfg.block(bb);
        for stmt in &block.stmts {
            walk.stmt(*stmt, &mut new_out);
        }
        walk.terminator(&block.terminator, &mut new_out);

        if new_out != out_states[bb.index()] {
            out_states[bb.index()] = new_out;
            for succ in cfg.successors(bb) {
                worklist.push_back(succ);
            }
        }
    }

    let mut flagged = vec![false; n_locals];
    for (idx, bb) in cfg.blocks.iter().enumerate() {
        if !reachable[idx] {
            continue;
        }
        let mut state = in_states[idx].clone();
        let mut walk = EfWalk {
            body,
            flagged: Some(&mut flagged),
        };
        for stmt in &bb.stmts {
            walk.stmt(*stmt, &mut state);
        }
        walk.terminator(&bb.terminator, &mut state);
    }

    flagged.iter().map(|f| !f).collect()
}

// === Tests ===

#[cfg(test)]
mod tests {
    use super::*;
    use deneb_hir::{BodyBuilder, ExprKind, LambdaBody, Literal, LocalKind, StmtKind};
    use pretty_assertions::assert_eq;

    fn count_code(diags: &[Diagnostic], code: &str) -> usize {
        diags.iter().filter(|d| d.code() == code).count()
    }

    #[test]
    fn definite_assignment_if_else() {
        // int x;
        // if (cond) { x = 1; } else { x = 2; }
        // sink(x);
        let mut b = BodyBuilder::new();
        let cond = b.local("cond", LocalKind::Param);
        let x = b.local("x", LocalKind::Local);

        let decl = b.stmt(StmtKind::Let {
            local: x,
            initializer: None,
        });

        let cond_read = b.expr(ExprKind::Local(cond));
        let one = b.expr(ExprKind::Literal(Literal::Int(1)));
        let assign_then = b.stmt(StmtKind::Assign {
            target: x,
            value: one,
        });
        let then_block = b.stmt(StmtKind::Block(vec![assign_then]));
        let two = b.expr(ExprKind::Literal(Literal::Int(2)));
        let assign_else = b.stmt(StmtKind::Assign {
            target: x,
            value: two,
        });
        let else_block = b.stmt(StmtKind::Block(vec![assign_else]));
        let if_stmt = b.stmt(StmtKind::If {
            condition: cond_read,
            then_branch: then_block,
            else_branch: Some(else_block),
        });

        let x_read = b.expr(ExprKind::Local(x));
        let use_stmt = b.stmt(StmtKind::Expr(x_read));

        let root = b.stmt(StmtKind::Block(vec![decl, if_stmt, use_stmt]));
        let body = b.finish(root);

        let result = analyze(&body, FlowConfig::default());
        assert_eq!(count_code(&result.diagnostics, "FLOW_UNASSIGNED"), 0);
    }

    #[test]
    fn use_before_assignment_on_one_path() {
        // int x;
        // if (cond) { x = 1; }
        // sink(x);
        let mut b = BodyBuilder::new();
        let cond = b.local("cond", LocalKind::Param);
        let x = b.local("x", LocalKind::Local);

        let decl = b.stmt(StmtKind::Let {
            local: x,
            initializer: None,
        });
        let cond_read = b.expr(ExprKind::Local(cond));
        let one = b.expr(ExprKind::Literal(Literal::Int(1)));
        let assign_then = b.stmt(StmtKind::Assign {
            target: x,
            value: one,
        });
        let then_block = b.stmt(StmtKind::Block(vec![assign_then]));
        let if_stmt = b.stmt(StmtKind::If {
            condition: cond_read,
            then_branch: then_block,
            else_branch: None,
        });
        let x_read = b.expr(ExprKind::Local(x));
        let use_stmt = b.stmt(StmtKind::Expr(x_read));

        let root = b.stmt(StmtKind::Block(vec![decl, if_stmt, use_stmt]));
        let body = b.finish(root);

        let result = analyze(&body, FlowConfig::default());
        assert_eq!(count_code(&result.diagnostics, "FLOW_UNASSIGNED"), 1);
    }

    #[test]
    fn unreachable_after_return() {
        let mut b = BodyBuilder::new();
        let x = b.local("x", LocalKind::Local);

        let ret = b.stmt(StmtKind::Return(None));
        let one = b.expr(ExprKind::Literal(Literal::Int(1)));
        let assign = b.stmt(StmtKind::Assign {
            target: x,
            value: one,
        });

        let root = b.stmt(StmtKind::Block(vec![ret, assign]));
        let body = b.finish(root);

        let result = analyze(&body, FlowConfig::default());
        assert_eq!(count_code(&result.diagnostics, "FLOW_UNREACHABLE"), 1);
    }

    #[test]
    fn single_assignment_is_effectively_final() {
        // int x = 1;
        let mut b = BodyBuilder::new();
        let x = b.local("x", LocalKind::Local);
        let one = b.expr(ExprKind::Literal(Literal::Int(1)));
        let decl = b.stmt(StmtKind::Let {
            local: x,
            initializer: Some(one),
        });
        let root = b.stmt(StmtKind::Block(vec![decl]));
        let body = b.finish(root);

        let result = analyze(&body, FlowConfig::default());
        assert!(result.effectively_final[x.idx()]);
    }

    #[test]
    fn branch_assignments_are_effectively_final() {
        // int x;
        // if (cond) { x = 1; } else { x = 2; }
        let mut b = BodyBuilder::new();
        let cond = b.local("cond", LocalKind::Param);
        let x = b.local("x", LocalKind::Local);

        let decl = b.stmt(StmtKind::Let {
            local: x,
            initializer: None,
        });
        let cond_read = b.expr(ExprKind::Local(cond));
        let one = b.expr(ExprKind::Literal(Literal::Int(1)));
        let assign_then = b.stmt(StmtKind::Assign {
            target: x,
            value: one,
        });
        let two = b.expr(ExprKind::Literal(Literal::Int(2)));
        let assign_else = b.stmt(StmtKind::Assign {
            target: x,
            value: two,
        });
        let then_block = b.stmt(StmtKind::Block(vec![assign_then]));
        let else_block = b.stmt(StmtKind::Block(vec![assign_else]));
        let if_stmt = b.stmt(StmtKind::If {
            condition: cond_read,
            then_branch: then_block,
            else_branch: Some(else_block),
        });
        let root = b.stmt(StmtKind::Block(vec![decl, if_stmt]));
        let body = b.finish(root);

        let result = analyze(&body, FlowConfig::default());
        assert!(result.effectively_final[x.idx()]);
    }

    #[test]
    fn reassignment_is_not_effectively_final() {
        // int x = 1; x = 2;
        let mut b = BodyBuilder::new();
        let x = b.local("x", LocalKind::Local);
        let one = b.expr(ExprKind::Literal(Literal::Int(1)));
        let decl = b.stmt(StmtKind::Let {
            local: x,
            initializer: Some(one),
        });
        let two = b.expr(ExprKind::Literal(Literal::Int(2)));
        let assign = b.stmt(StmtKind::Assign {
            target: x,
            value: two,
        });
        let root = b.stmt(StmtKind::Block(vec![decl, assign]));
        let body = b.finish(root);

        let result = analyze(&body, FlowConfig::default());
        assert!(!result.effectively_final[x.idx()]);
    }

    #[test]
    fn loop_carried_assignment_is_not_effectively_final() {
        // while (cond) { x = 1; }
        let mut b = BodyBuilder::new();
        let cond = b.local("cond", LocalKind::Param);
        let x = b.local("x", LocalKind::Local);

        let decl = b.stmt(StmtKind::Let {
            local: x,
            initializer: None,
        });
        let cond_read = b.expr(ExprKind::Local(cond));
        let one = b.expr(ExprKind::Literal(Literal::Int(1)));
        let assign = b.stmt(StmtKind::Assign {
            target: x,
            value: one,
        });
        let loop_body = b.stmt(StmtKind::Block(vec![assign]));
        let while_stmt = b.stmt(StmtKind::While {
            condition: cond_read,
            body: loop_body,
        });
        let root = b.stmt(StmtKind::Block(vec![decl, while_stmt]));
        let body = b.finish(root);

        let result = analyze(&body, FlowConfig::default());
        assert!(!result.effectively_final[x.idx()]);
    }

    #[test]
    fn lambda_site_records_assignment_snapshot() {
        // int x = 1; f = () -> ...;
        let mut b = BodyBuilder::new();
        let x = b.local("x", LocalKind::Local);
        let y = b.local("y", LocalKind::Local);

        let one = b.expr(ExprKind::Literal(Literal::Int(1)));
        let decl_x = b.stmt(StmtKind::Let {
            local: x,
            initializer: Some(one),
        });
        let decl_y = b.stmt(StmtKind::Let {
            local: y,
            initializer: None,
        });
        let x_read = b.expr(ExprKind::Local(x));
        let lambda = b.expr(ExprKind::Lambda {
            params: vec![],
            body: LambdaBody::Expr(x_read),
        });
        let lambda_stmt = b.stmt(StmtKind::Expr(lambda));
        let root = b.stmt(StmtKind::Block(vec![decl_x, decl_y, lambda_stmt]));
        let body = b.finish(root);

        let result = analyze(&body, FlowConfig::default());
        let state = result.lambda_state(lambda).expect("lambda snapshot");
        assert!(state[x.idx()]);
        assert!(!state[y.idx()]);
    }
}
