//! Walks a validated AST and emits a stack-machine program into an
//! [`Image`], maintaining a [`StackFrame`] in lock-step with the VM's
//! runtime memory layout (spec §4.4).

use crate::ast::{Ast, BinOp, ExprId, ExprKind, Scope, StmtId, StmtKind, UnOp};
use crate::frame::StackFrame;
use crate::image::{Addr, Image, Instruction, Opcode};

/// Compiles an analyzed AST (no outstanding diagnostics) into an [`Image`].
pub fn generate(ast: &Ast) -> Image {
    let mut gen = CodeGenerator {
        ast,
        image: Image::new(),
        frame: StackFrame::new(),
        postfix_queue: Vec::new(),
        loop_stack: Vec::new(),
    };
    gen.gen_stmt(ast.root());
    gen.image.emit(Instruction::new(Opcode::Hlt, 0));
    gen.image
}

enum PostfixOp {
    Inc,
    Dec,
}

/// Bookkeeping for one live `while`, so `break`/`continue` inside its body
/// can unwind exactly the scopes entered since the loop started and patch
/// their jump to the right target (spec §4.4's control-flow lowering).
struct LoopCtx {
    while_id: StmtId,
    cond_addr: Addr,
    /// `frame` depth (block count) right before the loop's own scope was
    /// pushed; `continue` unwinds down to depth+1 (keeps the loop's own
    /// scope), `break` unwinds down to depth (also drops it).
    depth_before_scope: usize,
    /// Instruction indices of placeholder `Jmp`s awaiting the loop's exit
    /// address, which isn't known until the trailing deallocation is
    /// emitted.
    pending_breaks: Vec<usize>,
}

struct CodeGenerator<'a> {
    ast: &'a Ast,
    image: Image,
    frame: StackFrame,
    postfix_queue: Vec<(Addr, PostfixOp)>,
    loop_stack: Vec<LoopCtx>,
}

impl<'a> CodeGenerator<'a> {
    // ── Scopes ──────────────────────────────────────────────────────

    fn enter_scope(&mut self, scope: &Scope) {
        let size = self.frame.begin_scope(scope);
        if size != 0 {
            self.image.emit(Instruction::new(Opcode::Alloca, size));
        }
    }

    fn exit_scope(&mut self) {
        let size = self.frame.end_scope();
        if size != 0 {
            self.image.emit(Instruction::new(Opcode::Alloca, -size));
        }
    }

    fn var_addr(&self, name: &str) -> Addr {
        self.frame
            .lookup_var(name)
            .expect("undeclared variable reached codegen (analyzer should have rejected it)")
    }

    // ── Postfix deferral ────────────────────────────────────────────

    fn flush_postfix_queue(&mut self) {
        for (addr, op) in std::mem::take(&mut self.postfix_queue) {
            self.image
                .emit(Instruction::new(Opcode::PushAddr, addr as i32));
            self.image.emit(Instruction::new(Opcode::PushVal, 1));
            let arith = match op {
                PostfixOp::Inc => Opcode::Add,
                PostfixOp::Dec => Opcode::Sub,
            };
            self.image.emit(Instruction::new(arith, 0));
            self.image
                .emit(Instruction::new(Opcode::PopAddr, addr as i32));
        }
    }

    // ── Statements ──────────────────────────────────────────────────

    fn gen_stmt(&mut self, id: StmtId) {
        match self.ast.stmt(id).node.clone() {
            StmtKind::Block { scope, stmts } => {
                self.enter_scope(&scope);
                for s in stmts {
                    self.gen_stmt(s);
                }
                self.exit_scope();
            }
            StmtKind::ExpressionStmt { expr } => {
                self.gen_expr(expr);
                self.image.emit(Instruction::new(Opcode::PopVal, 0));
                self.flush_postfix_queue();
            }
            StmtKind::If {
                scope,
                cond,
                then_branch,
            } => {
                self.enter_scope(&scope);
                self.gen_expr(cond);
                self.flush_postfix_queue();
                let (exit_idx, _) = self.image.emit(Instruction::new(Opcode::JmpFalse, -1));
                self.gen_stmt(then_branch);
                let target = self.image.instr_cur() as i32;
                self.image.patch(exit_idx, target);
                self.exit_scope();
            }
            StmtKind::IfElse {
                scope,
                cond,
                then_branch,
                else_branch,
            } => {
                // spec §4.4: JmpTrue over the else branch to the then
                // branch; the else branch falls through from the test.
                self.enter_scope(&scope);
                self.gen_expr(cond);
                self.flush_postfix_queue();
                let (then_idx, _) = self.image.emit(Instruction::new(Opcode::JmpTrue, -1));
                self.gen_stmt(else_branch);
                let (end_idx, _) = self.image.emit(Instruction::new(Opcode::Jmp, -1));
                let then_target = self.image.instr_cur() as i32;
                self.image.patch(then_idx, then_target);
                self.gen_stmt(then_branch);
                let end_target = self.image.instr_cur() as i32;
                self.image.patch(end_idx, end_target);
                self.exit_scope();
            }
            StmtKind::While { scope, cond, body } => {
                let depth_before_scope = self.frame.depth();
                self.enter_scope(&scope);
                let cond_addr = self.image.instr_cur();
                self.loop_stack.push(LoopCtx {
                    while_id: id,
                    cond_addr,
                    depth_before_scope,
                    pending_breaks: Vec::new(),
                });
                self.gen_expr(cond);
                self.flush_postfix_queue();
                let (exit_idx, _) = self.image.emit(Instruction::new(Opcode::JmpFalse, -1));
                self.gen_stmt(body);
                self.image
                    .emit(Instruction::new(Opcode::Jmp, cond_addr as i32));
                let exit_pre_dealloc = self.image.instr_cur() as i32;
                self.image.patch(exit_idx, exit_pre_dealloc);
                self.exit_scope();
                let exit_final = self.image.instr_cur() as i32;
                let ctx = self.loop_stack.pop().expect("loop_stack push/pop balanced");
                for idx in ctx.pending_breaks {
                    self.image.patch(idx, exit_final);
                }
            }
            StmtKind::Output { expr } => {
                self.gen_expr(expr);
                self.image.emit(Instruction::new(Opcode::Out, 0));
                self.flush_postfix_queue();
            }
            StmtKind::Break { loop_ref } => self.gen_loop_exit(id, loop_ref, true),
            StmtKind::Continue { loop_ref } => self.gen_loop_exit(id, loop_ref, false),
        }
    }

    /// Unwinds exactly the scopes entered since the target loop started,
    /// then jumps: `break` lands past the loop's own deallocation (emitted
    /// inline here), `continue` lands at the condition re-check (keeping
    /// the loop's own scope alive).
    fn gen_loop_exit(&mut self, stmt_id: StmtId, loop_ref: Option<StmtId>, is_break: bool) {
        let loop_id = loop_ref.unwrap_or_else(|| {
            panic!(
                "unbound break/continue ({stmt_id:?}) reached codegen; the analyzer should have rejected it"
            )
        });
        let (cond_addr, keep_depth) = {
            let ctx = self
                .loop_stack
                .iter()
                .rev()
                .find(|l| l.while_id == loop_id)
                .expect("loop_ref points at a loop not currently on the codegen loop stack");
            (
                ctx.cond_addr,
                if is_break {
                    ctx.depth_before_scope
                } else {
                    ctx.depth_before_scope + 1
                },
            )
        };
        let unwind = self.frame.sizes_from(keep_depth);
        if unwind != 0 {
            self.image.emit(Instruction::new(Opcode::Alloca, -unwind));
        }
        if is_break {
            let (idx, _) = self.image.emit(Instruction::new(Opcode::Jmp, -1));
            let ctx = self
                .loop_stack
                .iter_mut()
                .rev()
                .find(|l| l.while_id == loop_id)
                .expect("loop still on stack");
            ctx.pending_breaks.push(idx);
        } else {
            self.image
                .emit(Instruction::new(Opcode::Jmp, cond_addr as i32));
        }
    }

    // ── Expressions ─────────────────────────────────────────────────

    /// Leaves exactly one value on the stack (spec §4.4's expression
    /// invariant).
    fn gen_expr(&mut self, id: ExprId) {
        match self.ast.expr(id).node.clone() {
            ExprKind::ConstantInt(v) => {
                let addr = self.image.push_const(v);
                self.image
                    .emit(Instruction::new(Opcode::PushAddr, addr as i32));
            }
            ExprKind::Input => {
                self.image.emit(Instruction::new(Opcode::In, 0));
            }
            ExprKind::Variable { name } => {
                let addr = self.var_addr(&name);
                self.image
                    .emit(Instruction::new(Opcode::PushAddr, addr as i32));
            }
            ExprKind::Unary { op, expr } => self.gen_unary(op, expr),
            ExprKind::Binary { op, lhs, rhs } => self.gen_binary(op, lhs, rhs),
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                // Same shape as if/else, but each branch leaves a value.
                self.gen_expr(cond);
                self.flush_postfix_queue();
                let (then_idx, _) = self.image.emit(Instruction::new(Opcode::JmpTrue, -1));
                self.gen_expr(else_expr);
                let (end_idx, _) = self.image.emit(Instruction::new(Opcode::Jmp, -1));
                let then_target = self.image.instr_cur() as i32;
                self.image.patch(then_idx, then_target);
                self.gen_expr(then_expr);
                let end_target = self.image.instr_cur() as i32;
                self.image.patch(end_idx, end_target);
            }
        }
    }

    fn gen_unary(&mut self, op: UnOp, operand: ExprId) {
        match op {
            UnOp::Plus => self.gen_expr(operand),
            UnOp::Neg => {
                // 0 - x, so no extra opcode is needed for unary negation.
                let zero = self.image.push_const(0);
                self.image
                    .emit(Instruction::new(Opcode::PushAddr, zero as i32));
                self.gen_expr(operand);
                self.image.emit(Instruction::new(Opcode::Sub, 0));
            }
            UnOp::Not => {
                self.gen_expr(operand);
                self.image.emit(Instruction::new(Opcode::Not, 0));
            }
            UnOp::PreInc | UnOp::PreDec => {
                let addr = self.variable_addr_of(operand);
                self.image
                    .emit(Instruction::new(Opcode::PushAddr, addr as i32));
                self.image.emit(Instruction::new(Opcode::PushVal, 1));
                let arith = if op == UnOp::PreInc {
                    Opcode::Add
                } else {
                    Opcode::Sub
                };
                self.image.emit(Instruction::new(arith, 0));
                self.image
                    .emit(Instruction::new(Opcode::PopAddr, addr as i32));
                self.image
                    .emit(Instruction::new(Opcode::PushAddr, addr as i32));
            }
            UnOp::PostInc | UnOp::PostDec => {
                let addr = self.variable_addr_of(operand);
                self.image
                    .emit(Instruction::new(Opcode::PushAddr, addr as i32));
                let queued = if op == UnOp::PostInc {
                    PostfixOp::Inc
                } else {
                    PostfixOp::Dec
                };
                self.postfix_queue.push((addr, queued));
            }
        }
    }

    fn variable_addr_of(&self, id: ExprId) -> Addr {
        match &self.ast.expr(id).node {
            ExprKind::Variable { name } => self.var_addr(name),
            other => panic!(
                "non-variable operand ({other:?}) reached codegen for ++/--; the analyzer should have rejected it"
            ),
        }
    }

    fn gen_binary(&mut self, op: BinOp, lhs: ExprId, rhs: ExprId) {
        match op {
            BinOp::Assign => {
                self.gen_expr(rhs);
                let addr = self.variable_addr_of(lhs);
                self.image
                    .emit(Instruction::new(Opcode::PopAddr, addr as i32));
                self.image
                    .emit(Instruction::new(Opcode::PushAddr, addr as i32));
            }
            BinOp::Comma => {
                self.gen_expr(lhs);
                self.image.emit(Instruction::new(Opcode::PopVal, 0));
                self.gen_expr(rhs);
            }
            BinOp::And | BinOp::Or => {
                // Eager (non-short-circuiting) evaluation: both operands
                // are always side-effect-bearing statement-level reads in
                // this language, and spec §4.4 lists `iAnd`/`iOr` as plain
                // pop-pop-push opcodes, not branches.
                self.gen_expr(lhs);
                self.gen_expr(rhs);
                let opcode = if op == BinOp::And {
                    Opcode::And
                } else {
                    Opcode::Or
                };
                self.image.emit(Instruction::new(opcode, 0));
            }
            _ => {
                self.gen_expr(lhs);
                self.gen_expr(rhs);
                let opcode = match op {
                    BinOp::Mul => Opcode::Mul,
                    BinOp::Div => Opcode::Div,
                    BinOp::Mod => Opcode::Mod,
                    BinOp::Add => Opcode::Add,
                    BinOp::Sub => Opcode::Sub,
                    BinOp::Lt => Opcode::CmpL,
                    BinOp::Gt => Opcode::CmpG,
                    BinOp::Le => Opcode::CmpLe,
                    BinOp::Ge => Opcode::CmpGe,
                    BinOp::Eq => Opcode::CmpEq,
                    BinOp::Ne => Opcode::CmpNe,
                    BinOp::And | BinOp::Or | BinOp::Assign | BinOp::Comma => unreachable!(),
                };
                self.image.emit(Instruction::new(opcode, 0));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::image::Opcode;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn compile(source: &str) -> Image {
        let (tokens, lex_diags) = Lexer::new(source, 0).tokenize();
        assert!(lex_diags.is_empty(), "{lex_diags:?}");
        let (mut ast, parse_diags) = Parser::new(tokens, source.to_string()).parse();
        assert!(parse_diags.is_empty(), "{parse_diags:?}");
        let sema_diags = analyze(&mut ast);
        assert!(sema_diags.is_empty(), "{sema_diags:?}");
        generate(&ast)
    }

    #[test]
    fn ends_with_halt() {
        let image = compile("print 1;");
        assert_eq!(image.instrs().last().unwrap().1.opcode, Opcode::Hlt);
    }

    #[test]
    fn every_alloca_is_balanced() {
        let image = compile(
            "i = 0; while (i < 3) { x = i; if (x == 1) { y = x; print y; } i = i + 1; }",
        );
        let mut balance = 0i64;
        for &(_, instr) in image.instrs() {
            if instr.opcode == Opcode::Alloca {
                balance += instr.operand as i64;
            }
        }
        assert_eq!(balance, 0);
    }

    #[test]
    fn break_and_continue_unwind_their_scope() {
        let image = compile(
            "i = 0; while (i < 10) { x = i; if (x == 5) break; if (x == 2) continue; i = i + 1; }",
        );
        let mut balance = 0i64;
        for &(_, instr) in image.instrs() {
            if instr.opcode == Opcode::Alloca {
                balance += instr.operand as i64;
            }
        }
        assert_eq!(balance, 0);
    }

    #[test]
    fn jump_targets_land_inside_the_program_region() {
        let image = compile("x = 1; if (x == 1) { print x; } else { print 0; }");
        for &(_, instr) in image.instrs() {
            if matches!(
                instr.opcode,
                Opcode::Jmp | Opcode::JmpTrue | Opcode::JmpFalse
            ) {
                let target = instr.operand as u32;
                assert!(target >= image.stack_end() && target < image.instr_end());
                assert_eq!((target - image.stack_end()) % crate::image::INSTR_SIZE, 0);
            }
        }
    }

    #[test]
    fn repeated_literal_shares_one_constant_address() {
        let image = compile("a = 7; b = 7; print a + b;");
        let sevens: Vec<Addr> = image
            .consts()
            .iter()
            .filter(|(_, v)| *v == 7)
            .map(|(a, _)| *a)
            .collect();
        assert_eq!(sevens.len(), 1);
    }
}
