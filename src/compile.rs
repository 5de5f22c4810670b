use thiserror::Error;

use crate::{
    ast::{Expr, Stmt},
    token::{Kind, Token},
    Chunk, OpCode, Value, MAX_JUMP,
};

/// Error while lowering the statement tree to bytecode. Compile errors are
/// fatal: no chunk is produced.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A branch longer than a 16-bit offset can encode
    #[error("[line {line}] Error: Too much code to jump over.")]
    JumpTooFar {
        /// Line of the jump's origin
        line: u32,
    },
    /// The chunk's constant pool is full
    #[error("[line {line}] Error: Too many constants in one chunk.")]
    TooManyConstants {
        /// Line of the constant that overflowed the pool
        line: u32,
    },
    /// Function declarations parse but have no lowering
    #[error("[line {line}] Error at '{name}': Function declarations are not supported.")]
    UnsupportedFunction {
        /// The declared function's name
        name: String,
        /// Line of the declaration
        line: u32,
    },
    /// Only the built-in `print` may be called
    #[error("[line {line}] Error: Can only call 'print'.")]
    UnsupportedCall {
        /// Line of the call's closing parenthesis
        line: u32,
    },
}

/// Compile top-level statements into an executable chunk.
///
/// The compiler makes a single post-order walk over the tree, emitting bytes
/// as it goes, and finishes the chunk with a final `OP_RETURN`.
pub fn compile(statements: &[Stmt]) -> Result<Chunk, CompileError> {
    let mut compiler = Compiler::default();
    for stmt in statements {
        compiler.statement(stmt)?;
    }
    Ok(compiler.finish())
}

/// Walks the statement tree and emits bytecode into a [`Chunk`].
#[derive(Debug, Default)]
struct Compiler {
    chunk: Chunk,
    last_line: u32,
}

impl Compiler {
    fn finish(mut self) -> Chunk {
        self.chunk.write_op(OpCode::Return, self.last_line);
        self.chunk
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Expression { expr } => {
                self.expression(expr)?;
                self.emit(OpCode::Pop, expr.pos().line);
            }
            Stmt::VarDecl { name, initializer } => {
                match initializer {
                    Some(expr) => self.expression(expr)?,
                    None => self.emit(OpCode::Nil, name.pos.line),
                }
                let idx = self.identifier_constant(name)?;
                self.emit(OpCode::DefineGlobal, name.pos.line);
                self.emit_byte(idx, name.pos.line);
            }
            Stmt::Block { statements } => {
                for stmt in statements {
                    self.statement(stmt)?;
                }
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => self.if_statement(condition, then_branch, else_branch.as_deref())?,
            Stmt::While { condition, body } => self.while_statement(condition, body)?,
            Stmt::Function { name, .. } => {
                return Err(CompileError::UnsupportedFunction {
                    name: name.lexeme.clone(),
                    line: name.pos.line,
                });
            }
            Stmt::Return { keyword, value } => {
                match value {
                    Some(expr) => self.expression(expr)?,
                    None => self.emit(OpCode::Nil, keyword.pos.line),
                }
                self.emit(OpCode::Return, keyword.pos.line);
            }
        }
        Ok(())
    }

    /// Both arms pop the condition explicitly because `OP_JUMP_IF_FALSE`
    /// never pops:
    ///
    /// ```text
    ///   <condition>
    ///   JUMP_IF_FALSE  -> else
    ///   POP
    ///   <then branch>
    ///   JUMP           -> end
    /// else:
    ///   POP
    ///   <else branch, if any>
    /// end:
    /// ```
    fn if_statement(
        &mut self,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> Result<(), CompileError> {
        let line = condition.pos().line;
        self.expression(condition)?;
        let then_jump = self.emit_jump(OpCode::JumpIfFalse, line);
        self.emit(OpCode::Pop, line);
        self.statement(then_branch)?;
        let else_jump = self.emit_jump(OpCode::Jump, self.last_line);
        self.patch_jump(then_jump)?;
        self.emit(OpCode::Pop, line);
        if let Some(else_branch) = else_branch {
            self.statement(else_branch)?;
        }
        self.patch_jump(else_jump)?;
        Ok(())
    }

    /// The condition is popped at the top of every iteration and once more
    /// after the loop exits:
    ///
    /// ```text
    /// start:
    ///   <condition>
    ///   JUMP_IF_FALSE  -> exit
    ///   POP
    ///   <body>
    ///   LOOP           -> start
    /// exit:
    ///   POP
    /// ```
    fn while_statement(&mut self, condition: &Expr, body: &Stmt) -> Result<(), CompileError> {
        let loop_start = self.chunk.len();
        let line = condition.pos().line;
        self.expression(condition)?;
        let exit_jump = self.emit_jump(OpCode::JumpIfFalse, line);
        self.emit(OpCode::Pop, line);
        self.statement(body)?;
        self.emit_loop(loop_start, self.last_line)?;
        self.patch_jump(exit_jump)?;
        self.emit(OpCode::Pop, line);
        Ok(())
    }

    fn expression(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Binary { left, op, right } => self.binary(left, op, right)?,
            Expr::Grouping { expr } => self.expression(expr)?,
            Expr::Literal { token } => self.literal(token)?,
            Expr::Unary { op, right } => {
                self.expression(right)?;
                match op.kind {
                    Kind::Minus => self.emit(OpCode::Negate, op.pos.line),
                    Kind::Bang | Kind::Not => self.emit(OpCode::Not, op.pos.line),
                    _ => unreachable!("the parser only produces unary '-', '!', and 'not'"),
                }
            }
            Expr::Variable { name } => {
                let idx = self.identifier_constant(name)?;
                self.emit(OpCode::GetGlobal, name.pos.line);
                self.emit_byte(idx, name.pos.line);
            }
            Expr::Assignment { name, value } => {
                self.expression(value)?;
                let idx = self.identifier_constant(name)?;
                self.emit(OpCode::SetGlobal, name.pos.line);
                self.emit_byte(idx, name.pos.line);
            }
            Expr::Call { callee, paren, args } => self.call(callee, paren, args)?,
        }
        Ok(())
    }

    fn binary(&mut self, left: &Expr, op: &Token, right: &Expr) -> Result<(), CompileError> {
        // 'and' and 'or' short-circuit, so the right operand must not be
        // emitted in evaluation order with the rest.
        match op.kind {
            Kind::And => return self.and_expr(left, op, right),
            Kind::Or => return self.or_expr(left, op, right),
            _ => {}
        }

        self.expression(left)?;
        self.expression(right)?;
        let line = op.pos.line;
        match op.kind {
            Kind::Plus => self.emit(OpCode::Add, line),
            Kind::Minus => self.emit(OpCode::Subtract, line),
            Kind::Star => self.emit(OpCode::Multiply, line),
            Kind::Slash => self.emit(OpCode::Divide, line),
            Kind::EqualEqual => self.emit(OpCode::Equal, line),
            Kind::Greater => self.emit(OpCode::Greater, line),
            Kind::Less => self.emit(OpCode::Less, line),
            Kind::BangEqual => {
                self.emit(OpCode::Equal, line);
                self.emit(OpCode::Not, line);
            }
            Kind::GreaterEqual => {
                self.emit(OpCode::Less, line);
                self.emit(OpCode::Not, line);
            }
            Kind::LessEqual => {
                self.emit(OpCode::Greater, line);
                self.emit(OpCode::Not, line);
            }
            _ => unreachable!("the parser only produces binary operators"),
        }
        Ok(())
    }

    /// When the left operand is falsey it stays on the stack as the result;
    /// otherwise it is popped and the right operand takes its place.
    fn and_expr(&mut self, left: &Expr, op: &Token, right: &Expr) -> Result<(), CompileError> {
        let line = op.pos.line;
        self.expression(left)?;
        let end_jump = self.emit_jump(OpCode::JumpIfFalse, line);
        self.emit(OpCode::Pop, line);
        self.expression(right)?;
        self.patch_jump(end_jump)
    }

    /// Mirror image of [`Compiler::and_expr`]: a truthy left operand is the
    /// result, a falsey one is replaced by the right operand.
    fn or_expr(&mut self, left: &Expr, op: &Token, right: &Expr) -> Result<(), CompileError> {
        let line = op.pos.line;
        self.expression(left)?;
        let else_jump = self.emit_jump(OpCode::JumpIfFalse, line);
        let end_jump = self.emit_jump(OpCode::Jump, line);
        self.patch_jump(else_jump)?;
        self.emit(OpCode::Pop, line);
        self.expression(right)?;
        self.patch_jump(end_jump)
    }

    /// Only a direct call of `print` has a lowering. Every argument is
    /// printed in turn, then `nil` is pushed as the call's value for the
    /// surrounding statement to pop.
    fn call(&mut self, callee: &Expr, paren: &Token, args: &[Expr]) -> Result<(), CompileError> {
        let line = paren.pos.line;
        if let Expr::Variable { name } = callee {
            if name.lexeme == "print" {
                for arg in args {
                    self.expression(arg)?;
                    self.emit(OpCode::Print, line);
                }
                self.emit(OpCode::Nil, line);
                return Ok(());
            }
        }
        Err(CompileError::UnsupportedCall { line })
    }

    fn literal(&mut self, token: &Token) -> Result<(), CompileError> {
        let line = token.pos.line;
        match token.lexeme.as_str() {
            "nil" => self.emit(OpCode::Nil, line),
            "true" => self.emit(OpCode::True, line),
            "false" => self.emit(OpCode::False, line),
            lexeme => {
                if let Ok(number) = lexeme.parse::<f64>() {
                    self.emit_constant(Value::Number(number), line)?;
                } else {
                    // The scanner already drops the quotes; strip one pair
                    // here in case the literal came in raw through the
                    // library API.
                    let text = lexeme
                        .strip_prefix('"')
                        .and_then(|s| s.strip_suffix('"'))
                        .unwrap_or(lexeme);
                    self.emit_constant(Value::String(text.to_string()), line)?;
                }
            }
        }
        Ok(())
    }

    fn emit(&mut self, op: OpCode, line: u32) {
        self.last_line = line;
        self.chunk.write_op(op, line);
    }

    fn emit_byte(&mut self, byte: u8, line: u32) {
        self.chunk.write(byte, line);
    }

    /// Emit a jump with a placeholder operand and return the operand's
    /// offset for later patching.
    fn emit_jump(&mut self, op: OpCode, line: u32) -> usize {
        self.emit(op, line);
        self.emit_byte(0xff, line);
        self.emit_byte(0xff, line);
        self.chunk.len() - 2
    }

    /// Point the jump whose operand sits at `operand` to the current end of
    /// the chunk. The `- 2` accounts for the operand bytes themselves.
    fn patch_jump(&mut self, operand: usize) -> Result<(), CompileError> {
        let jump = self.chunk.len() - operand - 2;
        if jump > MAX_JUMP {
            return Err(CompileError::JumpTooFar {
                line: self.chunk.line(operand),
            });
        }
        self.chunk.patch_jump(operand, jump as u16);
        Ok(())
    }

    /// Emit a backward jump to `loop_start`. The `+ 2` accounts for the
    /// operand bytes about to be written.
    fn emit_loop(&mut self, loop_start: usize, line: u32) -> Result<(), CompileError> {
        self.emit(OpCode::Loop, line);
        let offset = self.chunk.len() - loop_start + 2;
        if offset > MAX_JUMP {
            return Err(CompileError::JumpTooFar { line });
        }
        self.emit_byte((offset >> 8) as u8, line);
        self.emit_byte((offset & 0xff) as u8, line);
        Ok(())
    }

    fn emit_constant(&mut self, value: Value, line: u32) -> Result<(), CompileError> {
        let idx = self.make_constant(value, line)?;
        self.emit(OpCode::Constant, line);
        self.emit_byte(idx, line);
        Ok(())
    }

    fn make_constant(&mut self, value: Value, line: u32) -> Result<u8, CompileError> {
        self.chunk
            .add_const(value)
            .ok_or(CompileError::TooManyConstants { line })
    }

    fn identifier_constant(&mut self, name: &Token) -> Result<u8, CompileError> {
        self.make_constant(Value::String(name.lexeme.clone()), name.pos.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Parser;

    fn compile_src(src: &str) -> Chunk {
        compile(&Parser::new(src).parse().unwrap()).unwrap()
    }

    fn compile_err(src: &str) -> CompileError {
        compile(&Parser::new(src).parse().unwrap()).unwrap_err()
    }

    #[test]
    fn a_declaration_defines_a_global() {
        let chunk = compile_src("local x = 1");
        assert_eq!(
            chunk.code(),
            &[
                OpCode::Constant as u8,
                0,
                OpCode::DefineGlobal as u8,
                1,
                OpCode::Return as u8,
            ],
        );
        assert_eq!(chunk.read_const(0), &Value::Number(1.0));
        assert_eq!(chunk.read_const(1), &Value::String("x".to_string()));
    }

    #[test]
    fn an_if_pops_the_condition_on_both_arms() {
        let chunk = compile_src("if a then b end");
        assert_eq!(
            chunk.code(),
            &[
                OpCode::GetGlobal as u8,
                0,
                OpCode::JumpIfFalse as u8,
                0,
                7,
                OpCode::Pop as u8,
                OpCode::GetGlobal as u8,
                1,
                OpCode::Pop as u8,
                OpCode::Jump as u8,
                0,
                1,
                OpCode::Pop as u8,
                OpCode::Return as u8,
            ],
        );
    }

    #[test]
    fn a_while_loops_back_to_its_condition() {
        let chunk = compile_src("while a do b end");
        assert_eq!(
            chunk.code(),
            &[
                OpCode::GetGlobal as u8,
                0,
                OpCode::JumpIfFalse as u8,
                0,
                7,
                OpCode::Pop as u8,
                OpCode::GetGlobal as u8,
                1,
                OpCode::Pop as u8,
                OpCode::Loop as u8,
                0,
                12,
                OpCode::Pop as u8,
                OpCode::Return as u8,
            ],
        );
    }

    #[test]
    fn and_short_circuits_over_the_right_operand() {
        let chunk = compile_src("print(1 and 2)");
        assert_eq!(
            chunk.code(),
            &[
                OpCode::Constant as u8,
                0,
                OpCode::JumpIfFalse as u8,
                0,
                3,
                OpCode::Pop as u8,
                OpCode::Constant as u8,
                1,
                OpCode::Print as u8,
                OpCode::Nil as u8,
                OpCode::Pop as u8,
                OpCode::Return as u8,
            ],
        );
    }

    #[test]
    fn or_skips_the_right_operand_when_truthy() {
        let chunk = compile_src("print(1 or 2)");
        assert_eq!(
            chunk.code(),
            &[
                OpCode::Constant as u8,
                0,
                OpCode::JumpIfFalse as u8,
                0,
                3,
                OpCode::Jump as u8,
                0,
                3,
                OpCode::Pop as u8,
                OpCode::Constant as u8,
                1,
                OpCode::Print as u8,
                OpCode::Nil as u8,
                OpCode::Pop as u8,
                OpCode::Return as u8,
            ],
        );
    }

    #[test]
    fn compound_comparisons_lower_to_their_negations() {
        let chunk = compile_src("1 <= 2");
        assert_eq!(
            chunk.code(),
            &[
                OpCode::Constant as u8,
                0,
                OpCode::Constant as u8,
                1,
                OpCode::Greater as u8,
                OpCode::Not as u8,
                OpCode::Pop as u8,
                OpCode::Return as u8,
            ],
        );
    }

    #[test]
    fn string_literals_become_string_constants() {
        let chunk = compile_src("\"hi\"");
        assert_eq!(chunk.read_const(0), &Value::String("hi".to_string()));
    }

    #[test]
    fn assignment_leaves_its_value_for_the_statement_pop() {
        let chunk = compile_src("x = 1");
        assert_eq!(
            chunk.code(),
            &[
                OpCode::Constant as u8,
                0,
                OpCode::SetGlobal as u8,
                1,
                OpCode::Pop as u8,
                OpCode::Return as u8,
            ],
        );
    }

    #[test]
    fn function_declarations_are_rejected() {
        let err = compile_err("function f() end");
        assert!(matches!(err, CompileError::UnsupportedFunction { .. }));
    }

    #[test]
    fn only_print_can_be_called() {
        let err = compile_err("f(1)");
        assert!(matches!(err, CompileError::UnsupportedCall { .. }));
    }

    #[test]
    fn the_constant_pool_overflows_at_257_literals() {
        let at_limit: String = (0..256).map(|i| format!("{i} ")).collect();
        let chunk = compile_src(&at_limit);
        assert_eq!(chunk.const_count(), 256);

        let over_limit: String = (0..257).map(|i| format!("{i} ")).collect();
        let err = compile_err(&over_limit);
        assert!(matches!(err, CompileError::TooManyConstants { .. }));
    }

    #[test]
    fn a_jump_of_exactly_the_maximum_offset_is_accepted() {
        // The then-branch below is one POP, 65531 bytes of body, and a
        // 3-byte exit JUMP: a forward branch of exactly 65535.
        let mut src = String::from("if true then not nil ");
        for _ in 0..32764 {
            src.push_str("nil ");
        }
        src.push_str("end");
        let chunk = compile_src(&src);
        assert_eq!(chunk.code().last(), Some(&(OpCode::Return as u8)));
    }

    #[test]
    fn a_jump_one_past_the_maximum_offset_is_rejected() {
        let mut src = String::from("if true then ");
        for _ in 0..32766 {
            src.push_str("nil ");
        }
        src.push_str("end");
        let err = compile_err(&src);
        assert!(matches!(err, CompileError::JumpTooFar { .. }));
    }

    #[test]
    fn every_chunk_keeps_lines_parallel_and_ends_with_return() {
        let chunk = compile_src("local x = 1 while x < 3 do x = x + 1 end print(x)");
        assert_eq!(chunk.code().len(), chunk.lines().len());
        assert_eq!(chunk.code().last(), Some(&(OpCode::Return as u8)));
    }
}
