//! Semantic analysis: a single depth-first walk that resolves declarations,
//! binds `break`/`continue` to their enclosing loop, and validates
//! assignment/increment targets (spec §4.3). Errors are collected, never
//! thrown — the walk always runs to completion.

use crate::ast::{Ast, BinOp, ExprId, ExprKind, StmtId, StmtKind, UnOp};
use crate::diagnostic::{Diagnostic, ErrorKind};
use crate::span::Span;

pub fn analyze(ast: &mut Ast) -> Vec<Diagnostic> {
    let mut analyzer = Analyzer {
        ast,
        scope_stack: Vec::new(),
        loop_stack: Vec::new(),
        diagnostics: Vec::new(),
    };
    let root = analyzer.ast.root();
    analyzer.analyze_stmt(root);
    analyzer.diagnostics
}

struct Analyzer<'a> {
    ast: &'a mut Ast,
    /// Block-like ancestors (Block/If/IfElse/While), innermost last.
    scope_stack: Vec<StmtId>,
    /// Enclosing `while` statements, innermost last.
    loop_stack: Vec<StmtId>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Analyzer<'a> {
    fn src(&self, span: Span) -> String {
        self.ast.source[span.start as usize..span.end as usize].to_string()
    }

    fn error(&mut self, span: Span, kind: ErrorKind, detail: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(kind, span, detail));
    }

    fn lookup_var(&self, name: &str) -> Option<ExprId> {
        for &scope_id in self.scope_stack.iter().rev() {
            if let Some(id) = scope_of(self.ast, scope_id).get(name) {
                return Some(id);
            }
        }
        None
    }

    fn declare_in_innermost(&mut self, name: &str, first_decl: ExprId) {
        let top = *self
            .scope_stack
            .last()
            .expect("scope stack is non-empty during analysis");
        scope_of_mut(self.ast, top).declare(name, first_decl);
    }

    // ── Statements ──────────────────────────────────────────────────

    fn analyze_stmt(&mut self, id: StmtId) {
        match self.ast.stmt(id).node.clone() {
            StmtKind::Block { stmts, .. } => {
                self.scope_stack.push(id);
                for s in stmts {
                    self.analyze_stmt(s);
                }
                self.scope_stack.pop();
            }
            StmtKind::ExpressionStmt { expr } => self.analyze_expr(expr),
            StmtKind::If {
                cond, then_branch, ..
            } => {
                self.scope_stack.push(id);
                self.analyze_expr(cond);
                self.analyze_stmt(then_branch);
                self.scope_stack.pop();
            }
            StmtKind::IfElse {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                self.scope_stack.push(id);
                self.analyze_expr(cond);
                self.analyze_stmt(then_branch);
                self.analyze_stmt(else_branch);
                self.scope_stack.pop();
            }
            StmtKind::While { cond, body, .. } => {
                self.scope_stack.push(id);
                self.loop_stack.push(id);
                self.analyze_expr(cond);
                self.analyze_stmt(body);
                self.loop_stack.pop();
                self.scope_stack.pop();
            }
            StmtKind::Output { expr } => self.analyze_expr(expr),
            StmtKind::Break { .. } => self.analyze_loop_exit(id, "break"),
            StmtKind::Continue { .. } => self.analyze_loop_exit(id, "continue"),
        }
    }

    fn analyze_loop_exit(&mut self, id: StmtId, keyword: &str) {
        match self.loop_stack.last().copied() {
            Some(loop_id) => set_loop_ref(self.ast, id, loop_id),
            None => {
                let span = self.ast.stmt(id).span;
                self.error(span, ErrorKind::OutOfLoopStatement, keyword);
            }
        }
    }

    // ── Expressions ─────────────────────────────────────────────────

    fn analyze_expr(&mut self, id: ExprId) {
        match self.ast.expr(id).node.clone() {
            ExprKind::ConstantInt(_) | ExprKind::Input => {}
            ExprKind::Variable { name } => {
                if self.lookup_var(&name).is_none() {
                    let span = self.ast.expr(id).span;
                    self.error(span, ErrorKind::UndeclaredIdentifier, name);
                }
            }
            ExprKind::Unary { op, expr } => match op {
                UnOp::PreInc | UnOp::PreDec | UnOp::PostInc | UnOp::PostDec => {
                    self.analyze_lvalue_use(expr);
                }
                UnOp::Plus | UnOp::Neg | UnOp::Not => self.analyze_expr(expr),
            },
            ExprKind::Binary { op, lhs, rhs } => {
                if op == BinOp::Assign {
                    // Right side analyzed first (spec §4.3).
                    self.analyze_expr(rhs);
                    self.analyze_assign_target(lhs);
                } else {
                    self.analyze_expr(lhs);
                    self.analyze_expr(rhs);
                }
            }
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                self.analyze_expr(cond);
                self.analyze_expr(then_expr);
                self.analyze_expr(else_expr);
            }
        }
    }

    /// Validates and resolves the target of `x = ...` — the sole
    /// declaration construct in the language (spec §4.3).
    fn analyze_assign_target(&mut self, id: ExprId) {
        let name = match &self.ast.expr(id).node {
            ExprKind::Variable { name } => name.clone(),
            _ => {
                let span = self.ast.expr(id).span;
                let detail = self.src(span);
                self.error(span, ErrorKind::UnassignableExpression, detail);
                return;
            }
        };
        if self.lookup_var(&name).is_none() {
            self.declare_in_innermost(&name, id);
        }
    }

    /// Validates the operand of a prefix/postfix `++`/`--`: must be a
    /// `Variable` that is already declared (it is read, not declared).
    fn analyze_lvalue_use(&mut self, id: ExprId) {
        match &self.ast.expr(id).node {
            ExprKind::Variable { name } => {
                let name = name.clone();
                if self.lookup_var(&name).is_none() {
                    let span = self.ast.expr(id).span;
                    self.error(span, ErrorKind::UndeclaredIdentifier, name);
                }
            }
            _ => {
                let span = self.ast.expr(id).span;
                let detail = self.src(span);
                self.error(span, ErrorKind::UnassignableExpression, detail);
            }
        }
    }
}

fn scope_of(ast: &Ast, id: StmtId) -> &crate::ast::Scope {
    match &ast.stmt(id).node {
        StmtKind::Block { scope, .. }
        | StmtKind::If { scope, .. }
        | StmtKind::IfElse { scope, .. }
        | StmtKind::While { scope, .. } => scope,
        _ => unreachable!("scope_of called on a non-scope-owning statement"),
    }
}

fn scope_of_mut(ast: &mut Ast, id: StmtId) -> &mut crate::ast::Scope {
    match &mut ast.stmt_mut(id).node {
        StmtKind::Block { scope, .. }
        | StmtKind::If { scope, .. }
        | StmtKind::IfElse { scope, .. }
        | StmtKind::While { scope, .. } => scope,
        _ => unreachable!("scope_of_mut called on a non-scope-owning statement"),
    }
}

fn set_loop_ref(ast: &mut Ast, id: StmtId, loop_id: StmtId) {
    match &mut ast.stmt_mut(id).node {
        StmtKind::Break { loop_ref } | StmtKind::Continue { loop_ref } => {
            *loop_ref = Some(loop_id)
        }
        _ => unreachable!("set_loop_ref called on a non-break/continue statement"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn analyze_source(source: &str) -> (Ast, Vec<Diagnostic>) {
        let (tokens, _) = Lexer::new(source, 0).tokenize();
        let (mut ast, parse_diags) = Parser::new(tokens, source.to_string()).parse();
        assert!(parse_diags.is_empty(), "parse errors: {parse_diags:?}");
        let diags = analyze(&mut ast);
        (ast, diags)
    }

    #[test]
    fn assignment_declares_and_rereads() {
        let (_, diags) = analyze_source("a = 10; b = a; a = a + 1; print a; print b;");
        assert!(diags.is_empty(), "{diags:?}");
    }

    #[test]
    fn undeclared_read_is_an_error() {
        let (_, diags) = analyze_source("print undefined;");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::UndeclaredIdentifier);
        assert_eq!(diags[0].detail, "undefined");
    }

    #[test]
    fn break_outside_loop_is_an_error() {
        let (_, diags) = analyze_source("break;");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::OutOfLoopStatement);
    }

    #[test]
    fn unassignable_literal_target() {
        // `x` is pre-declared so the RHS analyzes clean, isolating the
        // single `UnassignableExpression` the literal target produces.
        let (_, diags) = analyze_source("x = 0; 5 = x;");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::UnassignableExpression);
        assert_eq!(diags[0].detail, "5");
    }

    #[test]
    fn loop_binds_break_and_continue() {
        let (ast, diags) =
            analyze_source("i = 0; while (i < 10) { if (i == 5) break; i = i + 1; }");
        assert!(diags.is_empty(), "{diags:?}");
        // Find the break statement and confirm its loop_ref got set.
        fn find_break(ast: &Ast, id: StmtId) -> Option<StmtId> {
            match &ast.stmt(id).node {
                StmtKind::Break { .. } => Some(id),
                StmtKind::Block { stmts, .. } => stmts.iter().find_map(|&s| find_break(ast, s)),
                StmtKind::If { then_branch, .. } => find_break(ast, *then_branch),
                StmtKind::IfElse {
                    then_branch,
                    else_branch,
                    ..
                } => find_break(ast, *then_branch).or_else(|| find_break(ast, *else_branch)),
                StmtKind::While { body, .. } => find_break(ast, *body),
                _ => None,
            }
        }
        let break_id = find_break(&ast, ast.root()).expect("break statement present");
        match &ast.stmt(break_id).node {
            StmtKind::Break { loop_ref } => assert!(loop_ref.is_some()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn condition_scope_is_local_to_while() {
        // `x` first assigned in the while condition is local to the loop;
        // reading it afterward is undeclared.
        let (_, diags) = analyze_source("while ((x = 1) < 2) { } print x;");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::UndeclaredIdentifier);
    }
}
