//! Hoisting of dynamic index expressions into immutable temporaries.
//!
//! A hoisted expression node keeps its handle: its content moves to a new
//! node that initializes a fresh `let`, and the original node becomes a
//! read of that `let`. Every user of the node, including access chains
//! recorded before hoisting, therefore observes the single evaluation.
//!
//! The right operand of `&&` and `||` only runs when the left one allows
//! it. A request inside it is hoisted into a guarded block instead:
//! `a && b` becomes `var t = a; if t { t = b; }` ahead of the statement.

use std::collections::{HashMap, HashSet};

use prism_ir::{
    BinaryOp, Block, Expression, Function, Handle, LocalKind, LocalVariable, Statement, UnaryOp,
};

use super::walk;

const TEMP_PREFIX: &str = "ptr_index_save";

/// Where the temporaries of one clause of a statement are placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertionPoint {
    /// Immediately before the statement. Used for plain statements, `if`
    /// and `while` conditions.
    Before,
    /// At the end of a `loop`'s continuing block, ahead of `break if`.
    Continuing,
    /// Before a `for` loop, ahead of its init clause.
    ForInit,
    /// Before the first iteration of a `for` loop, after its init clause.
    /// Hosting these requires desugaring a `for` that has an init clause.
    ForHeader,
}

/// Temporaries collected for one statement, grouped by insertion point.
#[derive(Debug, Default)]
struct Placement {
    before: Vec<Statement>,
    continuing: Vec<Statement>,
    for_init: Vec<Statement>,
    for_header: Vec<Statement>,
}

impl Placement {
    fn push(&mut self, point: InsertionPoint, temps: Vec<Statement>) {
        let slot = match point {
            InsertionPoint::Before => &mut self.before,
            InsertionPoint::Continuing => &mut self.continuing,
            InsertionPoint::ForInit => &mut self.for_init,
            InsertionPoint::ForHeader => &mut self.for_header,
        };
        slot.extend(temps);
    }

    fn is_empty(&self) -> bool {
        self.before.is_empty()
            && self.continuing.is_empty()
            && self.for_init.is_empty()
            && self.for_header.is_empty()
    }
}

/// Outcome of a hoisting run.
#[derive(Debug, Default)]
pub struct Hoisted {
    /// Number of temporaries introduced.
    pub count: usize,
    /// New location of the content of every hoisted node.
    pub moved: HashMap<Handle<Expression>, Handle<Expression>>,
}

/// Hoists each of `requests` out of the statement that evaluates it.
///
/// Side-effecting expressions evaluated earlier in the same clause are
/// hoisted too, ahead of the request, so evaluation order is unchanged.
/// Requests not evaluated by any statement are left alone.
pub fn hoist(func: &mut Function, requests: &[Handle<Expression>]) -> Hoisted {
    if requests.is_empty() {
        return Hoisted::default();
    }
    let mut hoister = Hoister {
        requests: requests.iter().copied().collect(),
        taken: func
            .local_variables
            .iter()
            .map(|(_, local)| local.name.clone())
            .collect(),
        func,
        next_suffix: 0,
        guarded: false,
        result: Hoisted::default(),
    };
    let body = std::mem::take(&mut hoister.func.body);
    let body = hoister.block(body);
    hoister.func.body = body;
    log::debug!(
        "dva: hoisted {} temporar(ies) in '{}'",
        hoister.result.count,
        hoister.func.label()
    );
    hoister.result
}

struct Hoister<'a> {
    func: &'a mut Function,
    requests: HashSet<Handle<Expression>>,
    taken: HashSet<String>,
    next_suffix: usize,
    /// Set when the last clause lowered a short-circuit operator.
    guarded: bool,
    result: Hoisted,
}

impl Hoister<'_> {
    fn block(&mut self, block: Block) -> Block {
        let mut out = Vec::with_capacity(block.len());
        for stmt in block {
            out.extend(self.statement(stmt));
        }
        out
    }

    fn statement(&mut self, stmt: Statement) -> Vec<Statement> {
        let mut placement = Placement::default();
        let stmt = match stmt {
            Statement::If {
                condition,
                accept,
                reject,
            } => {
                placement.push(InsertionPoint::Before, self.clause(&[condition], None));
                Statement::If {
                    condition,
                    accept: self.block(accept),
                    reject: self.block(reject),
                }
            }
            Statement::While { condition, body } => {
                let temps = self.clause(&[condition], None);
                let guarded = self.guarded;
                let body = self.block(body);
                if guarded {
                    // Guarded temporaries belong to every evaluation of
                    // the condition.
                    return vec![self.desugar_loop(temps, Some(condition), body, Vec::new())];
                }
                placement.push(InsertionPoint::Before, temps);
                Statement::While { condition, body }
            }
            Statement::Loop {
                body,
                continuing,
                break_if,
            } => {
                let body = self.block(body);
                let continuing = self.block(continuing);
                if let Some(brk) = break_if {
                    placement.push(InsertionPoint::Continuing, self.clause(&[brk], None));
                }
                Statement::Loop {
                    body,
                    continuing,
                    break_if,
                }
            }
            Statement::For {
                init,
                condition,
                update,
                body,
            } => {
                if let Some(init) = init.as_deref() {
                    let temps = self.statement_clause(init);
                    placement.push(InsertionPoint::ForInit, temps);
                }
                let (header, guarded_condition) = match condition {
                    Some(cond) => (self.clause(&[cond], None), self.guarded),
                    None => (Vec::new(), false),
                };
                let (footer, guarded_update) = match update.as_deref() {
                    Some(update) => (self.statement_clause(update), self.guarded),
                    None => (Vec::new(), false),
                };
                let body = self.block(body);
                if guarded_condition || guarded_update {
                    let mut continuing = footer;
                    continuing.extend(update.map(|u| *u));
                    let lowered = self.desugar_loop(header, condition, body, continuing);
                    let mut out = placement.for_init;
                    return match init {
                        Some(init) => {
                            out.push(*init);
                            out.push(lowered);
                            vec![Statement::Block(out)]
                        }
                        None => {
                            out.push(lowered);
                            out
                        }
                    };
                }
                placement.push(InsertionPoint::ForHeader, header);
                placement.push(InsertionPoint::ForHeader, footer);
                Statement::For {
                    init,
                    condition,
                    update,
                    body,
                }
            }
            Statement::Block(inner) => Statement::Block(self.block(inner)),
            simple => {
                let temps = self.statement_clause(&simple);
                placement.push(InsertionPoint::Before, temps);
                simple
            }
        };

        if placement.is_empty() {
            return vec![stmt];
        }
        self.place(stmt, placement)
    }

    fn place(&mut self, stmt: Statement, placement: Placement) -> Vec<Statement> {
        let Placement {
            mut before,
            continuing: tail,
            for_init,
            for_header,
        } = placement;

        let stmt = match stmt {
            Statement::Loop {
                body,
                mut continuing,
                break_if,
            } => {
                continuing.extend(tail);
                Statement::Loop {
                    body,
                    continuing,
                    break_if,
                }
            }
            Statement::For {
                init: Some(init),
                condition,
                update,
                body,
            } if !for_header.is_empty() => {
                // The header temporaries may read variables declared by the
                // init clause, so they have to run between it and the loop.
                let mut block = for_init;
                block.push(*init);
                block.extend(for_header);
                let continuing = update.map(|u| *u).into_iter().collect();
                block.push(self.desugar_loop(Vec::new(), condition, body, continuing));
                before.push(Statement::Block(block));
                return before;
            }
            other => {
                before.extend(for_init);
                before.extend(for_header);
                other
            }
        };
        before.push(stmt);
        before
    }

    /// `loop { header if !cond { break; } body continuing { continuing } }`
    fn desugar_loop(
        &mut self,
        header: Vec<Statement>,
        condition: Option<Handle<Expression>>,
        body: Block,
        continuing: Block,
    ) -> Statement {
        let mut loop_body = header;
        if let Some(cond) = condition {
            let negated = self.func.expressions.append(Expression::Unary {
                op: UnaryOp::LogicalNot,
                expr: cond,
            });
            loop_body.push(Statement::If {
                condition: negated,
                accept: vec![Statement::Break],
                reject: vec![],
            });
        }
        loop_body.extend(body);
        Statement::Loop {
            body: loop_body,
            continuing,
            break_if: None,
        }
    }

    /// Hoists the requests evaluated by a simple statement.
    fn statement_clause(&mut self, stmt: &Statement) -> Vec<Statement> {
        let roots = walk::statement_roots(self.func, stmt);
        let target = match stmt {
            Statement::Assign { target, .. } => Some(*target),
            _ => None,
        };
        self.clause(&roots, target)
    }

    /// Hoists the requests evaluated by `roots`, returning the temporaries
    /// in evaluation order. `target` is the root written by an assignment,
    /// which denotes memory rather than a value.
    fn clause(
        &mut self,
        roots: &[Handle<Expression>],
        target: Option<Handle<Expression>>,
    ) -> Vec<Statement> {
        self.guarded = false;
        let mut temps = Vec::new();
        // Side effects of earlier roots run before the requests of later ones.
        let mut pending = Vec::new();
        for &root in roots {
            self.visit(root, Some(root) == target, &mut pending, &mut temps);
        }
        temps
    }

    /// Post-order walk. `pending` holds the maximal side-effecting subtrees
    /// already evaluated whose parent has not completed yet. Nodes that
    /// denote memory (`place`) are never hoisted themselves; side effects
    /// in their index operands stay pending on their own.
    fn visit(
        &mut self,
        expr: Handle<Expression>,
        place: bool,
        pending: &mut Vec<Handle<Expression>>,
        temps: &mut Vec<Statement>,
    ) {
        if let Expression::Binary { op, left, right } = self.func.expressions[expr] {
            let short_circuit = matches!(op, BinaryOp::LogicalAnd | BinaryOp::LogicalOr);
            if short_circuit && self.has_request(right) {
                self.guard(expr, op, left, right, pending, temps);
                return;
            }
        }

        let operands = self.func.expressions[expr].operands();
        let places: Vec<bool> = operands
            .iter()
            .map(|&operand| match self.func.expressions[expr] {
                Expression::AddressOf(_) => true,
                Expression::Access { base, .. } => place && operand == base,
                Expression::Member { base, .. } => place && operand == base,
                _ => false,
            })
            .collect();
        for (&operand, &operand_place) in operands.iter().zip(&places) {
            self.visit(operand, operand_place, pending, temps);
        }
        if place {
            return;
        }

        let before = pending.len();
        pending.retain(|p| !operands.contains(p));
        let subsumed = pending.len() != before;

        if self.requests.remove(&expr) {
            for earlier in std::mem::take(pending) {
                self.hoist_one(earlier, temps);
            }
            self.hoist_one(expr, temps);
            return;
        }

        if subsumed || matches!(self.func.expressions[expr], Expression::Call { .. }) {
            pending.push(expr);
        }
    }

    /// Returns `true` if a pending request lies in the subtree at `root`.
    fn has_request(&self, root: Handle<Expression>) -> bool {
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            if self.requests.contains(&handle) {
                return true;
            }
            stack.extend(self.func.expressions[handle].operands());
        }
        false
    }

    /// Lowers `left && right` (or `||`) to a `var` assigned under a guard,
    /// hoisting the requests of `right` into the guarded block. The
    /// operator node becomes a read of the `var`.
    fn guard(
        &mut self,
        expr: Handle<Expression>,
        op: BinaryOp,
        left: Handle<Expression>,
        right: Handle<Expression>,
        pending: &mut Vec<Handle<Expression>>,
        temps: &mut Vec<Statement>,
    ) {
        for earlier in std::mem::take(pending) {
            self.hoist_one(earlier, temps);
        }
        self.visit(left, false, &mut Vec::new(), temps);
        let name = self.fresh_name();
        let local = self.func.local_variables.append(LocalVariable {
            name,
            kind: LocalKind::Var,
            ty: None,
            init: Some(left),
        });
        let mut accept = Vec::new();
        self.visit(right, false, &mut Vec::new(), &mut accept);
        let span = self.func.spans.get(&expr).copied();
        let append = |func: &mut Function, node| {
            let handle = func.expressions.append(node);
            if let Some(span) = span {
                func.spans.insert(handle, span);
            }
            handle
        };
        let test = append(self.func, Expression::LocalVariable(local));
        let condition = match op {
            BinaryOp::LogicalOr => append(
                self.func,
                Expression::Unary {
                    op: UnaryOp::LogicalNot,
                    expr: test,
                },
            ),
            _ => test,
        };
        let target = append(self.func, Expression::LocalVariable(local));
        accept.push(Statement::Assign {
            target,
            value: right,
        });

        temps.push(Statement::Local(local));
        temps.push(Statement::If {
            condition,
            accept,
            reject: Vec::new(),
        });
        self.func.expressions[expr] = Expression::LocalVariable(local);
        self.result.count += 1;
        self.guarded = true;
    }

    fn hoist_one(&mut self, expr: Handle<Expression>, temps: &mut Vec<Statement>) {
        let content = self.func.expressions[expr].clone();
        let moved = self.func.expressions.append(content);
        if let Some(span) = self.func.spans.get(&expr).copied() {
            self.func.spans.insert(moved, span);
        }
        let name = self.fresh_name();
        let local = self.func.local_variables.append(LocalVariable {
            name,
            kind: LocalKind::Let,
            ty: None,
            init: Some(moved),
        });
        self.func.expressions[expr] = Expression::LocalVariable(local);
        temps.push(Statement::Local(local));

        self.result.moved.insert(expr, moved);
        self.result.count += 1;
    }

    fn fresh_name(&mut self) -> String {
        loop {
            let name = match self.next_suffix {
                0 => TEMP_PREFIX.to_string(),
                n => format!("{TEMP_PREFIX}_{n}"),
            };
            self.next_suffix += 1;
            if self.taken.insert(name.clone()) {
                return name;
            }
        }
    }
}
