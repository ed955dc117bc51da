//! Recursive-descent parser for the grammar in spec §4.2. Diagnostics are
//! accumulated rather than thrown; on a syntax error the parser synchronizes
//! at the next `;` or `}` so it can keep reporting (spec §4.2, §7).

use crate::ast::{Ast, BinOp, ExprId, ExprKind, Scope, StmtId, StmtKind, UnOp};
use crate::diagnostic::{Diagnostic, ErrorKind};
use crate::span::{Span, Spanned};
use crate::token::Token;

const MAX_NESTING_DEPTH: u32 = 256;

pub struct Parser {
    tokens: Vec<Spanned<Token>>,
    pos: usize,
    ast: Ast,
    diagnostics: Vec<Diagnostic>,
    depth: u32,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned<Token>>, source: String) -> Self {
        Self {
            tokens,
            pos: 0,
            ast: Ast::new(source),
            diagnostics: Vec::new(),
            depth: 0,
        }
    }

    /// Parses the whole token stream into an [`Ast`] rooted at a synthetic
    /// outer block, plus any diagnostics collected along the way.
    pub fn parse(mut self) -> (Ast, Vec<Diagnostic>) {
        let start = self.current_span();
        let mut stmts = Vec::new();
        while !self.at(&Token::Eof) {
            stmts.push(self.parse_stmt());
        }
        let end = self.prev_span();
        let root = self.ast.alloc_stmt(
            StmtKind::Block {
                scope: Scope::default(),
                stmts,
            },
            start.merge(end),
        );
        self.ast.set_root(root);
        (self.ast, self.diagnostics)
    }

    // ── Statements ──────────────────────────────────────────────────

    fn parse_stmt(&mut self) -> StmtId {
        if !self.enter_nesting() {
            self.synchronize();
            self.exit_nesting();
            return self.error_stmt();
        }
        let id = match self.peek() {
            Token::LBrace => self.parse_block(),
            Token::If => self.parse_if(),
            Token::While => self.parse_while(),
            Token::Print => self.parse_print(),
            Token::Break => self.parse_break(),
            Token::Continue => self.parse_continue(),
            _ => self.parse_expr_stmt(),
        };
        self.exit_nesting();
        id
    }

    fn parse_block(&mut self) -> StmtId {
        let start = self.expect(&Token::LBrace);
        let mut stmts = Vec::new();
        while !self.at(&Token::RBrace) && !self.at(&Token::Eof) {
            stmts.push(self.parse_stmt());
        }
        let end = self.expect(&Token::RBrace);
        self.ast.alloc_stmt(
            StmtKind::Block {
                scope: Scope::default(),
                stmts,
            },
            start.merge(end),
        )
    }

    fn parse_if(&mut self) -> StmtId {
        let start = self.expect(&Token::If);
        self.expect(&Token::LParen);
        let cond = self.parse_expr();
        self.expect(&Token::RParen);
        let then_branch = self.parse_stmt();
        if self.eat(&Token::Else) {
            let else_branch = self.parse_stmt();
            let end = self.ast.stmt(else_branch).span;
            self.ast.alloc_stmt(
                StmtKind::IfElse {
                    scope: Scope::default(),
                    cond,
                    then_branch,
                    else_branch,
                },
                start.merge(end),
            )
        } else {
            let end = self.ast.stmt(then_branch).span;
            self.ast.alloc_stmt(
                StmtKind::If {
                    scope: Scope::default(),
                    cond,
                    then_branch,
                },
                start.merge(end),
            )
        }
    }

    fn parse_while(&mut self) -> StmtId {
        let start = self.expect(&Token::While);
        self.expect(&Token::LParen);
        let cond = self.parse_expr();
        self.expect(&Token::RParen);
        let body = self.parse_stmt();
        let end = self.ast.stmt(body).span;
        self.ast.alloc_stmt(
            StmtKind::While {
                scope: Scope::default(),
                cond,
                body,
            },
            start.merge(end),
        )
    }

    fn parse_print(&mut self) -> StmtId {
        let start = self.expect(&Token::Print);
        let expr = self.parse_expr();
        let end = self.expect(&Token::Semicolon);
        self.ast
            .alloc_stmt(StmtKind::Output { expr }, start.merge(end))
    }

    fn parse_break(&mut self) -> StmtId {
        let start = self.expect(&Token::Break);
        let end = self.expect(&Token::Semicolon);
        self.ast
            .alloc_stmt(StmtKind::Break { loop_ref: None }, start.merge(end))
    }

    fn parse_continue(&mut self) -> StmtId {
        let start = self.expect(&Token::Continue);
        let end = self.expect(&Token::Semicolon);
        self.ast
            .alloc_stmt(StmtKind::Continue { loop_ref: None }, start.merge(end))
    }

    fn parse_expr_stmt(&mut self) -> StmtId {
        let start = self.current_span();
        let expr = self.parse_expr();
        let end = self.expect(&Token::Semicolon);
        self.ast
            .alloc_stmt(StmtKind::ExpressionStmt { expr }, start.merge(end))
    }

    // ── Expressions ─────────────────────────────────────────────────

    fn parse_expr(&mut self) -> ExprId {
        let mut lhs = self.parse_assign();
        while self.eat(&Token::Comma) {
            let rhs = self.parse_assign();
            lhs = self.bin(BinOp::Comma, lhs, rhs);
        }
        lhs
    }

    fn parse_assign(&mut self) -> ExprId {
        let lhs = self.parse_ternary();
        if self.eat(&Token::Eq) {
            let rhs = self.parse_assign();
            self.bin(BinOp::Assign, lhs, rhs)
        } else {
            lhs
        }
    }

    fn parse_ternary(&mut self) -> ExprId {
        let cond = self.parse_logic_or();
        if self.eat(&Token::Question) {
            let then_expr = self.parse_expr();
            self.expect(&Token::Colon);
            let else_expr = self.parse_assign();
            let span = self.ast.expr(cond).span.merge(self.ast.expr(else_expr).span);
            self.ast.alloc_expr(
                ExprKind::Ternary {
                    cond,
                    then_expr,
                    else_expr,
                },
                span,
            )
        } else {
            cond
        }
    }

    fn parse_logic_or(&mut self) -> ExprId {
        let mut lhs = self.parse_logic_and();
        while self.eat(&Token::OrOr) {
            let rhs = self.parse_logic_and();
            lhs = self.bin(BinOp::Or, lhs, rhs);
        }
        lhs
    }

    fn parse_logic_and(&mut self) -> ExprId {
        let mut lhs = self.parse_equality();
        while self.eat(&Token::AndAnd) {
            let rhs = self.parse_equality();
            lhs = self.bin(BinOp::And, lhs, rhs);
        }
        lhs
    }

    fn parse_equality(&mut self) -> ExprId {
        let mut lhs = self.parse_relational();
        loop {
            let op = if self.eat(&Token::EqEq) {
                BinOp::Eq
            } else if self.eat(&Token::Ne) {
                BinOp::Ne
            } else {
                break;
            };
            let rhs = self.parse_relational();
            lhs = self.bin(op, lhs, rhs);
        }
        lhs
    }

    fn parse_relational(&mut self) -> ExprId {
        let mut lhs = self.parse_additive();
        loop {
            let op = if self.eat(&Token::Lt) {
                BinOp::Lt
            } else if self.eat(&Token::Gt) {
                BinOp::Gt
            } else if self.eat(&Token::Le) {
                BinOp::Le
            } else if self.eat(&Token::Ge) {
                BinOp::Ge
            } else {
                break;
            };
            let rhs = self.parse_additive();
            lhs = self.bin(op, lhs, rhs);
        }
        lhs
    }

    fn parse_additive(&mut self) -> ExprId {
        let mut lhs = self.parse_multiplicative();
        loop {
            let op = if self.eat(&Token::Plus) {
                BinOp::Add
            } else if self.eat(&Token::Minus) {
                BinOp::Sub
            } else {
                break;
            };
            let rhs = self.parse_multiplicative();
            lhs = self.bin(op, lhs, rhs);
        }
        lhs
    }

    fn parse_multiplicative(&mut self) -> ExprId {
        let mut lhs = self.parse_unary();
        loop {
            let op = if self.eat(&Token::Star) {
                BinOp::Mul
            } else if self.eat(&Token::Slash) {
                BinOp::Div
            } else if self.eat(&Token::Percent) {
                BinOp::Mod
            } else {
                break;
            };
            let rhs = self.parse_unary();
            lhs = self.bin(op, lhs, rhs);
        }
        lhs
    }

    fn parse_unary(&mut self) -> ExprId {
        let start = self.current_span();
        let op = if self.eat(&Token::Plus) {
            Some(UnOp::Plus)
        } else if self.eat(&Token::Minus) {
            Some(UnOp::Neg)
        } else if self.eat(&Token::Bang) {
            Some(UnOp::Not)
        } else if self.eat(&Token::PlusPlus) {
            Some(UnOp::PreInc)
        } else if self.eat(&Token::MinusMinus) {
            Some(UnOp::PreDec)
        } else {
            None
        };
        match op {
            Some(op) => {
                let expr = self.parse_unary();
                let span = start.merge(self.ast.expr(expr).span);
                self.ast.alloc_expr(ExprKind::Unary { op, expr }, span)
            }
            None => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> ExprId {
        let primary = self.parse_primary();
        let start = self.ast.expr(primary).span;
        if self.eat(&Token::PlusPlus) {
            let end = self.prev_span();
            self.ast.alloc_expr(
                ExprKind::Unary {
                    op: UnOp::PostInc,
                    expr: primary,
                },
                start.merge(end),
            )
        } else if self.eat(&Token::MinusMinus) {
            let end = self.prev_span();
            self.ast.alloc_expr(
                ExprKind::Unary {
                    op: UnOp::PostDec,
                    expr: primary,
                },
                start.merge(end),
            )
        } else {
            primary
        }
    }

    fn parse_primary(&mut self) -> ExprId {
        let start = self.current_span();
        match self.peek().clone() {
            Token::Integer(v) => {
                self.advance();
                self.ast.alloc_expr(ExprKind::ConstantInt(v), start)
            }
            Token::Ident(name) => {
                self.advance();
                self.ast.alloc_expr(ExprKind::Variable { name }, start)
            }
            Token::Question => {
                self.advance();
                self.ast.alloc_expr(ExprKind::Input, start)
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr();
                let end = self.expect(&Token::RParen);
                // Re-span the parenthesized group to include the parens.
                let node = self.ast.expr(inner).node.clone();
                self.ast.alloc_expr(node, start.merge(end))
            }
            _ => {
                self.error_at_current(&format!("expected an expression, found {}", self.peek().description()));
                self.ast.alloc_expr(ExprKind::ConstantInt(0), start)
            }
        }
    }

    fn bin(&mut self, op: BinOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        let span = self.ast.expr(lhs).span.merge(self.ast.expr(rhs).span);
        self.ast.alloc_expr(ExprKind::Binary { op, lhs, rhs }, span)
    }

    fn error_stmt(&mut self) -> StmtId {
        let span = self.current_span();
        let expr = self.ast.alloc_expr(ExprKind::ConstantInt(0), span);
        self.ast.alloc_stmt(StmtKind::ExpressionStmt { expr }, span)
    }

    // ── Recovery ────────────────────────────────────────────────────

    /// Skips tokens until the next `;` (consumed) or `}` (left for the
    /// enclosing block to consume), per spec §4.2.
    fn synchronize(&mut self) {
        loop {
            match self.peek() {
                Token::Eof | Token::RBrace => return,
                Token::Semicolon => {
                    self.advance();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn enter_nesting(&mut self) -> bool {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            self.error_at_current("nesting depth exceeded (maximum 256 levels)");
            false
        } else {
            true
        }
    }

    fn exit_nesting(&mut self) {
        self.depth -= 1;
    }

    // ── Token-stream utilities ──────────────────────────────────────

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].node
    }

    fn current_span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn prev_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            self.current_span()
        }
    }

    fn advance(&mut self) -> &Spanned<Token> {
        let tok = &self.tokens[self.pos];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, token: &Token) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Span {
        if self.at(token) {
            let span = self.current_span();
            self.advance();
            span
        } else {
            self.error_at_current(&format!(
                "expected {}, found {}",
                token.description(),
                self.peek().description()
            ));
            let span = self.current_span();
            self.synchronize();
            span
        }
    }

    fn error_at_current(&mut self, msg: &str) {
        self.diagnostics.push(Diagnostic::new(
            ErrorKind::Syntax,
            self.current_span(),
            msg.to_string(),
        ));
    }
}
