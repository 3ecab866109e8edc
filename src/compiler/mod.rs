//! AST-to-bytecode translation. The compiler owns the constant pool, the
//! local slot table, loop and index-marker contexts, and all jump
//! patching; the emitted `Program` is immutable afterwards.

pub mod disasm;
mod expr;
pub mod program;

pub use program::Program;

use std::collections::HashMap;

use log::debug;
use thiserror::Error as ThisError;

use crate::ast::{CondArm, ExceptArm, ExceptCodes, Expr, ExprKind, Stmt, StmtKind};
use crate::global::limits::{
    JUMP_PLACEHOLDER, MAX_CONSTANTS, MAX_LOCALS, MAX_PROGRAM_BYTES,
};
use crate::global::opcodes::{imm_int_byte, Opcode};
use crate::runtime::builtins::BuiltinRegistry;
use crate::values::Var;

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum CompileError {
    #[error("Line {line}: too many literals")]
    TooManyConstants { line: usize },
    #[error("Line {line}: too many variables")]
    TooManyVariables { line: usize },
    #[error("Line {line}: unknown built-in function `{name}`")]
    UnknownBuiltin { line: usize, name: String },
    #[error("Line {line}: `{word}` is not inside a loop")]
    NoEnclosingLoop { line: usize, word: String },
    #[error("Line {line}: `continue` must name an enclosing loop")]
    BadContinue { line: usize },
    #[error("Line {line}: a range must be the last index in an assignment")]
    RangeNotLast { line: usize },
    #[error("Line {line}: fork body exceeds the bytecode size limit")]
    ForkTooLarge { line: usize },
    #[error("compiled program exceeds the bytecode size limit")]
    ProgramTooLarge,
}

/// Compile a parsed verb body. `source` carries the raw source lines for
/// tracebacks and fork-body extraction when available.
pub fn compile(
    stmts: &[Stmt],
    registry: &BuiltinRegistry,
    source: Option<Vec<String>>,
) -> Result<Program, CompileError> {
    let mut compiler = Compiler::new(registry);
    for stmt in stmts {
        compiler.compile_stmt(stmt)?;
    }
    compiler.emit_op(Opcode::RETURN0);
    compiler.finish(source)
}

/// How `continue` reaches the next iteration of a loop.
enum ContinueMode {
    /// Straight back-jump to a known target (`while` re-tests the guard).
    Backward(usize),
    /// Forward jump to the increment section, patched at loop end.
    Forward,
}

struct LoopCtx {
    label: Option<String>,
    value_name: Option<String>,
    index_name: Option<String>,
    result_slot: u8,
    continue_mode: ContinueMode,
    /// Installed-handler nesting at loop entry; break/continue crossing
    /// deeper try regions must unwind the difference.
    handler_depth: usize,
    break_patches: Vec<usize>,
    continue_patches: Vec<usize>,
}

impl LoopCtx {
    fn matches(&self, name: &str) -> bool {
        let hit = |candidate: &Option<String>| {
            candidate
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(name))
        };
        hit(&self.label) || hit(&self.value_name) || hit(&self.index_name)
    }
}

pub(crate) struct Compiler<'a> {
    registry: &'a BuiltinRegistry,
    code: Vec<u8>,
    constants: Vec<Var>,
    const_keys: HashMap<String, u8>,
    var_names: Vec<String>,
    line_info: Vec<(usize, usize)>,
    cur_line: usize,
    loops: Vec<LoopCtx>,
    /// Slots holding the collection under index evaluation, innermost
    /// last; `^`/`$` marker opcodes read the top entry.
    index_ctx: Vec<u8>,
    /// Try regions currently protecting the emission point.
    handler_depth: usize,
    temp_count: usize,
    deferred: Option<CompileError>,
}

impl<'a> Compiler<'a> {
    fn new(registry: &'a BuiltinRegistry) -> Compiler<'a> {
        let mut compiler = Compiler {
            registry,
            code: Vec::new(),
            constants: Vec::new(),
            const_keys: HashMap::new(),
            var_names: Vec::new(),
            line_info: Vec::new(),
            cur_line: 0,
            loops: Vec::new(),
            index_ctx: Vec::new(),
            handler_depth: 0,
            temp_count: 0,
            deferred: None,
        };
        // the frame initializer fills these by name at verb entry
        for name in ["this", "verb", "caller", "args", "player"] {
            compiler.slot(name, 0);
        }
        compiler
    }

    fn finish(mut self, source: Option<Vec<String>>) -> Result<Program, CompileError> {
        if let Some(err) = self.deferred.take() {
            return Err(err);
        }
        if self.code.len() > MAX_PROGRAM_BYTES {
            return Err(CompileError::ProgramTooLarge);
        }
        debug!(
            "compiled program: {} bytes, {} constants, {} locals",
            self.code.len(),
            self.constants.len(),
            self.var_names.len()
        );
        Ok(Program {
            code: self.code,
            constants: self.constants,
            num_locals: self.var_names.len(),
            var_names: self.var_names,
            line_info: self.line_info,
            source,
        })
    }

    // ---- emission helpers ----

    pub(crate) fn here(&self) -> usize {
        self.code.len()
    }

    pub(crate) fn emit_op(&mut self, op: Opcode) {
        self.code.push(op.into());
    }

    pub(crate) fn emit_u8(&mut self, byte: u8) {
        self.code.push(byte);
    }

    pub(crate) fn emit_u16(&mut self, value: u16) {
        self.code.extend_from_slice(&value.to_be_bytes());
    }

    /// Emit a jump-family opcode with a placeholder target; returns the
    /// operand position for patching.
    pub(crate) fn emit_jump(&mut self, op: Opcode) -> usize {
        self.emit_op(op);
        let at = self.code.len();
        self.emit_u16(JUMP_PLACEHOLDER);
        at
    }

    pub(crate) fn patch_to_here(&mut self, at: usize) {
        let target = self.here() as u16;
        self.code[at..at + 2].copy_from_slice(&target.to_be_bytes());
    }

    pub(crate) fn patch_u16(&mut self, at: usize, value: u16) {
        self.code[at..at + 2].copy_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn note_line(&mut self, line: usize) {
        if line != self.cur_line && line != 0 {
            self.line_info.push((self.code.len(), line));
            self.cur_line = line;
        }
    }

    // ---- slots and constants ----

    /// Slot for a named variable, allocating on first reference.
    pub(crate) fn slot(&mut self, name: &str, line: usize) -> u8 {
        if let Some(i) = self
            .var_names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
        {
            return i as u8;
        }
        if self.var_names.len() >= MAX_LOCALS {
            if self.deferred.is_none() {
                self.deferred = Some(CompileError::TooManyVariables { line });
            }
            return 0;
        }
        self.var_names.push(name.to_string());
        (self.var_names.len() - 1) as u8
    }

    /// A fresh unnamed temporary. The leading space keeps it out of the
    /// identifier namespace.
    pub(crate) fn temp(&mut self, line: usize) -> u8 {
        self.temp_count += 1;
        let name = format!(" t{}", self.temp_count);
        self.slot(&name, line)
    }

    /// `slot + 1` bind encoding (0 means no binding). The last slot index
    /// cannot be encoded; treat it as the variable table overflowing.
    fn bind_slot_byte(&mut self, slot: u8, line: usize) -> u8 {
        if slot == u8::MAX {
            if self.deferred.is_none() {
                self.deferred = Some(CompileError::TooManyVariables { line });
            }
            0
        } else {
            slot + 1
        }
    }

    /// Pool index for a constant, deduplicated by type-tagged canonical
    /// literal form.
    pub(crate) fn const_ref(&mut self, value: &Var, line: usize) -> u8 {
        let key = format!("{}:{}", value.type_name(), value.to_literal());
        if let Some(&i) = self.const_keys.get(&key) {
            return i;
        }
        if self.constants.len() >= MAX_CONSTANTS {
            if self.deferred.is_none() {
                self.deferred = Some(CompileError::TooManyConstants { line });
            }
            return 0;
        }
        let index = self.constants.len() as u8;
        self.constants.push(value.clone());
        self.const_keys.insert(key, index);
        index
    }

    pub(crate) fn emit_push_const(&mut self, value: &Var, line: usize) {
        let index = self.const_ref(value, line);
        self.emit_op(Opcode::PUSH_CONST);
        self.emit_u8(index);
    }

    /// Push an integer: immediate byte when in range, decimal digit
    /// build-up for larger magnitudes, constant pool only for `MinInt64`.
    pub(crate) fn emit_int(&mut self, value: i64, line: usize) {
        if let Some(byte) = imm_int_byte(value) {
            self.emit_u8(byte);
        } else if value == i64::MIN {
            self.emit_push_const(&Var::Int(value), line);
        } else if value < 0 {
            self.emit_int_digits(-value);
            self.emit_op(Opcode::NEG);
        } else {
            self.emit_int_digits(value);
        }
    }

    fn emit_int_digits(&mut self, value: i64) {
        if let Some(byte) = imm_int_byte(value) {
            self.emit_u8(byte);
            return;
        }
        self.emit_int_digits(value / 10);
        self.emit_u8(imm_int_byte(10).unwrap());
        self.emit_op(Opcode::MUL);
        self.emit_u8(imm_int_byte(value % 10).unwrap());
        self.emit_op(Opcode::ADD);
    }

    // ---- statements ----

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        self.note_line(stmt.line);
        match &stmt.kind {
            StmtKind::Empty => Ok(()),
            StmtKind::Expr(expr) => {
                self.compile_expr(expr)?;
                self.emit_op(Opcode::POP);
                Ok(())
            }
            StmtKind::Return(None) => {
                self.emit_op(Opcode::RETURN0);
                Ok(())
            }
            StmtKind::Return(Some(expr)) => {
                self.compile_expr(expr)?;
                self.emit_op(Opcode::RETURN);
                Ok(())
            }
            StmtKind::If { arms, otherwise } => self.compile_if(arms, otherwise),
            StmtKind::While { label, cond, body } => {
                self.compile_while(stmt.line, label.as_deref(), cond, body)
            }
            StmtKind::ForList {
                value,
                index,
                expr,
                body,
            } => self.compile_for_list(
                stmt.line,
                value,
                index.as_deref(),
                expr,
                body,
            ),
            StmtKind::ForRange {
                var,
                from,
                to,
                body,
            } => self.compile_for_range(stmt.line, var, from, to, body),
            StmtKind::Fork { var, delay, body } => {
                self.compile_fork(stmt.line, var.as_deref(), delay, body)
            }
            StmtKind::TryExcept { body, arms } => {
                self.compile_try_except(body, arms)
            }
            StmtKind::TryFinally { body, handler } => {
                self.compile_try_finally(body, handler)
            }
            StmtKind::Break { arg } => self.compile_loop_exit(stmt.line, arg, true),
            StmtKind::Continue { arg } => {
                self.compile_loop_exit(stmt.line, arg, false)
            }
        }
    }

    fn compile_body(&mut self, body: &[Stmt]) -> Result<(), CompileError> {
        for stmt in body {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    fn compile_if(
        &mut self,
        arms: &[CondArm],
        otherwise: &[Stmt],
    ) -> Result<(), CompileError> {
        let mut end_patches = Vec::with_capacity(arms.len());
        for arm in arms {
            self.note_line(arm.line);
            self.compile_expr(&arm.cond)?;
            let next = self.emit_jump(Opcode::IF_FALSE_JUMP);
            self.compile_body(&arm.body)?;
            end_patches.push(self.emit_jump(Opcode::JUMP));
            self.patch_to_here(next);
        }
        self.compile_body(otherwise)?;
        for at in end_patches {
            self.patch_to_here(at);
        }
        Ok(())
    }

    fn compile_while(
        &mut self,
        line: usize,
        label: Option<&str>,
        cond: &Expr,
        body: &[Stmt],
    ) -> Result<(), CompileError> {
        let result = self.temp(line);
        self.emit_int(0, line);
        self.emit_op(Opcode::PUT_VAR);
        self.emit_u8(result);
        self.emit_op(Opcode::POP);

        let top = self.here();
        self.compile_expr(cond)?;
        let exit = self.emit_jump(Opcode::IF_FALSE_JUMP);
        self.loops.push(LoopCtx {
            label: label.map(str::to_string),
            value_name: None,
            index_name: None,
            result_slot: result,
            continue_mode: ContinueMode::Backward(top),
            handler_depth: self.handler_depth,
            break_patches: Vec::new(),
            continue_patches: Vec::new(),
        });
        self.compile_body(body)?;
        let ctx = self.loops.pop().unwrap();
        self.emit_op(Opcode::LOOP_JUMP);
        self.emit_u16(top as u16);
        self.patch_to_here(exit);
        for at in ctx.break_patches {
            self.patch_to_here(at);
        }
        Ok(())
    }

    fn compile_for_list(
        &mut self,
        line: usize,
        value: &str,
        index: Option<&str>,
        expr: &Expr,
        body: &[Stmt],
    ) -> Result<(), CompileError> {
        let result = self.temp(line);
        let list = self.temp(line);
        let flag = self.temp(line);
        let cursor = self.temp(line);
        let end = self.temp(line);
        let elem = self.temp(line);
        let value_slot = self.slot(value, line);
        let index_slot = index.map(|name| self.slot(name, line));

        self.emit_int(0, line);
        self.emit_op(Opcode::PUT_VAR);
        self.emit_u8(result);
        self.emit_op(Opcode::POP);

        self.compile_expr(expr)?;
        self.emit_op(Opcode::ITER_PREP);
        self.emit_u8(index.is_some() as u8);
        self.emit_op(Opcode::PUT_VAR);
        self.emit_u8(flag);
        self.emit_op(Opcode::POP);
        self.emit_op(Opcode::PUT_VAR);
        self.emit_u8(list);
        self.emit_op(Opcode::POP);

        self.emit_int(1, line);
        self.emit_op(Opcode::PUT_VAR);
        self.emit_u8(cursor);
        self.emit_op(Opcode::POP);
        self.emit_op(Opcode::PUSH_VAR);
        self.emit_u8(list);
        self.emit_op(Opcode::LENGTH);
        self.emit_op(Opcode::PUT_VAR);
        self.emit_u8(end);
        self.emit_op(Opcode::POP);

        let top = self.here();
        self.emit_op(Opcode::PUSH_VAR);
        self.emit_u8(cursor);
        self.emit_op(Opcode::PUSH_VAR);
        self.emit_u8(end);
        self.emit_op(Opcode::LE);
        let exit = self.emit_jump(Opcode::IF_FALSE_JUMP);

        // current element
        self.emit_op(Opcode::PUSH_VAR);
        self.emit_u8(list);
        self.emit_op(Opcode::PUSH_VAR);
        self.emit_u8(cursor);
        self.emit_op(Opcode::INDEX_GET);
        self.emit_op(Opcode::PUT_VAR);
        self.emit_u8(elem);
        self.emit_op(Opcode::POP);

        // unpack, depending on the pair flag left by ITER_PREP
        self.emit_op(Opcode::PUSH_VAR);
        self.emit_u8(flag);
        let plain = self.emit_jump(Opcode::IF_FALSE_JUMP);
        self.emit_op(Opcode::PUSH_VAR);
        self.emit_u8(elem);
        self.emit_int(1, line);
        self.emit_op(Opcode::INDEX_GET);
        self.emit_op(Opcode::PUT_VAR);
        self.emit_u8(value_slot);
        self.emit_op(Opcode::POP);
        if let Some(index_slot) = index_slot {
            self.emit_op(Opcode::PUSH_VAR);
            self.emit_u8(elem);
            self.emit_int(2, line);
            self.emit_op(Opcode::INDEX_GET);
            self.emit_op(Opcode::PUT_VAR);
            self.emit_u8(index_slot);
            self.emit_op(Opcode::POP);
        }
        let into_body = self.emit_jump(Opcode::JUMP);
        self.patch_to_here(plain);
        self.emit_op(Opcode::PUSH_VAR);
        self.emit_u8(elem);
        self.emit_op(Opcode::PUT_VAR);
        self.emit_u8(value_slot);
        self.emit_op(Opcode::POP);
        self.patch_to_here(into_body);

        self.loops.push(LoopCtx {
            label: None,
            value_name: Some(value.to_string()),
            index_name: index.map(str::to_string),
            result_slot: result,
            continue_mode: ContinueMode::Forward,
            handler_depth: self.handler_depth,
            break_patches: Vec::new(),
            continue_patches: Vec::new(),
        });
        self.compile_body(body)?;
        let ctx = self.loops.pop().unwrap();
        for at in ctx.continue_patches {
            self.patch_to_here(at);
        }
        self.emit_op(Opcode::PUSH_VAR);
        self.emit_u8(cursor);
        self.emit_int(1, line);
        self.emit_op(Opcode::ADD);
        self.emit_op(Opcode::PUT_VAR);
        self.emit_u8(cursor);
        self.emit_op(Opcode::POP);
        self.emit_op(Opcode::LOOP_JUMP);
        self.emit_u16(top as u16);

        self.patch_to_here(exit);
        for at in ctx.break_patches {
            self.patch_to_here(at);
        }
        Ok(())
    }

    fn compile_for_range(
        &mut self,
        line: usize,
        var: &str,
        from: &Expr,
        to: &Expr,
        body: &[Stmt],
    ) -> Result<(), CompileError> {
        let result = self.temp(line);
        let end = self.temp(line);
        let var_slot = self.slot(var, line);

        self.emit_int(0, line);
        self.emit_op(Opcode::PUT_VAR);
        self.emit_u8(result);
        self.emit_op(Opcode::POP);

        self.compile_expr(from)?;
        self.emit_op(Opcode::PUT_VAR);
        self.emit_u8(var_slot);
        self.emit_op(Opcode::POP);
        self.compile_expr(to)?;
        self.emit_op(Opcode::PUT_VAR);
        self.emit_u8(end);
        self.emit_op(Opcode::POP);

        let top = self.here();
        self.emit_op(Opcode::PUSH_VAR);
        self.emit_u8(var_slot);
        self.emit_op(Opcode::PUSH_VAR);
        self.emit_u8(end);
        self.emit_op(Opcode::LE);
        let exit = self.emit_jump(Opcode::IF_FALSE_JUMP);

        self.loops.push(LoopCtx {
            label: None,
            value_name: Some(var.to_string()),
            index_name: None,
            result_slot: result,
            continue_mode: ContinueMode::Forward,
            handler_depth: self.handler_depth,
            break_patches: Vec::new(),
            continue_patches: Vec::new(),
        });
        self.compile_body(body)?;
        let ctx = self.loops.pop().unwrap();
        for at in ctx.continue_patches {
            self.patch_to_here(at);
        }
        self.emit_op(Opcode::PUSH_VAR);
        self.emit_u8(var_slot);
        self.emit_int(1, line);
        self.emit_op(Opcode::ADD);
        self.emit_op(Opcode::PUT_VAR);
        self.emit_u8(var_slot);
        self.emit_op(Opcode::POP);
        self.emit_op(Opcode::LOOP_JUMP);
        self.emit_u16(top as u16);

        self.patch_to_here(exit);
        for at in ctx.break_patches {
            self.patch_to_here(at);
        }
        Ok(())
    }

    fn compile_fork(
        &mut self,
        line: usize,
        var: Option<&str>,
        delay: &Expr,
        body: &[Stmt],
    ) -> Result<(), CompileError> {
        self.compile_expr(delay)?;
        self.emit_op(Opcode::FORK);
        match var {
            Some(name) => {
                let slot = self.slot(name, line);
                let byte = self.bind_slot_byte(slot, line);
                self.emit_u8(byte);
            }
            None => self.emit_u8(0),
        }
        let len_at = self.here();
        self.emit_u16(JUMP_PLACEHOLDER);
        let body_start = self.here();
        self.compile_body(body)?;
        self.emit_op(Opcode::RETURN0);
        let len = self.here() - body_start;
        if len > u16::MAX as usize {
            return Err(CompileError::ForkTooLarge { line });
        }
        self.patch_u16(len_at, len as u16);
        Ok(())
    }

    fn compile_try_except(
        &mut self,
        body: &[Stmt],
        arms: &[ExceptArm],
    ) -> Result<(), CompileError> {
        self.emit_op(Opcode::TRY_EXCEPT);
        self.emit_u8(arms.len() as u8);
        let mut handler_patches = Vec::with_capacity(arms.len());
        for arm in arms {
            self.emit_except_clause(arm.line, &arm.codes, arm.var.as_deref())?;
            handler_patches.push(self.here());
            self.emit_u16(JUMP_PLACEHOLDER);
        }
        self.handler_depth += 1;
        self.compile_body(body)?;
        self.handler_depth -= 1;
        let done = self.emit_jump(Opcode::END_EXCEPT);
        let mut end_patches = Vec::with_capacity(arms.len());
        for (arm, handler_at) in arms.iter().zip(handler_patches) {
            self.patch_to_here(handler_at);
            // the raised exception list is on the stack; the bind, if
            // any, was done from the clause operand
            self.emit_op(Opcode::POP);
            self.compile_body(&arm.body)?;
            end_patches.push(self.emit_jump(Opcode::JUMP));
        }
        self.patch_to_here(done);
        for at in end_patches {
            self.patch_to_here(at);
        }
        Ok(())
    }

    /// Clause operand block: code count (0 = any), code pool indices,
    /// bind slot + 1, then the caller records the handler address slot.
    pub(crate) fn emit_except_clause(
        &mut self,
        line: usize,
        codes: &ExceptCodes,
        var: Option<&str>,
    ) -> Result<(), CompileError> {
        match codes {
            ExceptCodes::Any => self.emit_u8(0),
            ExceptCodes::Codes(list) => {
                self.emit_u8(list.len() as u8);
                for code in list {
                    let index = self.const_ref(&Var::Err(*code), line);
                    self.emit_u8(index);
                }
            }
        }
        match var {
            Some(name) => {
                let slot = self.slot(name, line);
                let byte = self.bind_slot_byte(slot, line);
                self.emit_u8(byte);
            }
            None => self.emit_u8(0),
        }
        Ok(())
    }

    fn compile_try_finally(
        &mut self,
        body: &[Stmt],
        handler: &[Stmt],
    ) -> Result<(), CompileError> {
        let handler_at = self.emit_jump(Opcode::TRY_FINALLY);
        self.handler_depth += 1;
        self.compile_body(body)?;
        self.handler_depth -= 1;
        self.emit_op(Opcode::END_FINALLY);
        self.patch_to_here(handler_at);
        self.compile_body(handler)?;
        self.emit_op(Opcode::FINALLY_CONTINUE);
        Ok(())
    }

    fn compile_loop_exit(
        &mut self,
        line: usize,
        arg: &Option<Expr>,
        is_break: bool,
    ) -> Result<(), CompileError> {
        let word = if is_break { "break" } else { "continue" };
        let no_loop = || CompileError::NoEnclosingLoop {
            line,
            word: word.to_string(),
        };
        let target = match arg {
            None => self.loops.len().checked_sub(1).ok_or_else(no_loop)?,
            Some(Expr {
                kind: ExprKind::Id(name),
                ..
            }) if self.find_loop(name).is_some() => {
                self.find_loop(name).unwrap()
            }
            Some(expr) => {
                if !is_break {
                    return Err(CompileError::BadContinue { line });
                }
                // value-carrying break: store into the innermost loop's
                // result slot
                let target =
                    self.loops.len().checked_sub(1).ok_or_else(no_loop)?;
                let result = self.loops[target].result_slot;
                self.compile_expr(expr)?;
                self.emit_op(Opcode::PUT_VAR);
                self.emit_u8(result);
                self.emit_op(Opcode::POP);
                let at = self.emit_exit_jump(target);
                self.loops[target].break_patches.push(at);
                return Ok(());
            }
        };
        if is_break {
            let at = self.emit_exit_jump(target);
            self.loops[target].break_patches.push(at);
        } else {
            match self.loops[target].continue_mode {
                ContinueMode::Backward(top) => {
                    let crossed =
                        self.handler_depth - self.loops[target].handler_depth;
                    if crossed == 0 {
                        self.emit_op(Opcode::LOOP_JUMP);
                        self.emit_u16(top as u16);
                    } else {
                        self.emit_op(Opcode::EXIT);
                        self.emit_u8(crossed as u8);
                        self.emit_u16(top as u16);
                    }
                }
                ContinueMode::Forward => {
                    let at = self.emit_exit_jump(target);
                    self.loops[target].continue_patches.push(at);
                }
            }
        }
        Ok(())
    }

    /// A forward jump out of a loop, unwinding any try regions entered
    /// since the loop began. Returns the operand position to patch.
    fn emit_exit_jump(&mut self, target: usize) -> usize {
        let crossed = self.handler_depth - self.loops[target].handler_depth;
        if crossed == 0 {
            self.emit_jump(Opcode::JUMP)
        } else {
            self.emit_op(Opcode::EXIT);
            self.emit_u8(crossed as u8);
            let at = self.here();
            self.emit_u16(JUMP_PLACEHOLDER);
            at
        }
    }

    fn find_loop(&self, name: &str) -> Option<usize> {
        self.loops.iter().rposition(|ctx| ctx.matches(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;
    use crate::runtime::builtins::BuiltinRegistry;

    fn compile_src(src: &str) -> Result<Program, CompileError> {
        let stmts = parse_program(src).unwrap();
        compile(&stmts, &BuiltinRegistry::core(), None)
    }

    #[test]
    fn pre_registered_names_take_the_first_slots() {
        let p = compile_src("return 1;").unwrap();
        assert_eq!(
            &p.var_names[..5],
            &["this", "verb", "caller", "args", "player"]
        );
    }

    #[test]
    fn constants_are_deduplicated() {
        let p = compile_src(
            "x = \"hello\"; y = \"hello\"; z = 3.5; w = 3.5; return {x, y, z, w};",
        )
        .unwrap();
        assert_eq!(p.constants.len(), 2);
    }

    #[test]
    fn small_ints_use_no_constants() {
        let p = compile_src("return 143 + -10 + 0;").unwrap();
        assert!(p.constants.is_empty());
    }

    #[test]
    fn large_ints_use_no_constants() {
        let p = compile_src("return 123456789;").unwrap();
        assert!(p.constants.is_empty());
    }

    #[test]
    fn min_int_is_pooled() {
        let p = compile_src("return -9223372036854775808;").unwrap();
        assert_eq!(p.constants, vec![Var::Int(i64::MIN)]);
    }

    #[test]
    fn line_map_tracks_statements() {
        let p = compile_src("x = 1;\ny = 2;\nreturn x + y;").unwrap();
        let lines: Vec<usize> =
            p.line_info.iter().map(|&(_, line)| line).collect();
        assert_eq!(lines, vec![1, 2, 3]);
    }

    #[test]
    fn unknown_builtin_is_a_compile_error() {
        assert!(matches!(
            compile_src("return frobnicate(1);"),
            Err(CompileError::UnknownBuiltin { .. })
        ));
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        assert!(matches!(
            compile_src("break;"),
            Err(CompileError::NoEnclosingLoop { .. })
        ));
    }

    #[test]
    fn continue_with_value_is_rejected() {
        assert!(matches!(
            compile_src("while (1) continue 5; endwhile"),
            Err(CompileError::BadContinue { .. })
        ));
    }

    #[test]
    fn too_many_variables_is_deferred_but_reported() {
        let mut src = String::new();
        for i in 0..260 {
            src.push_str(&format!("v{i} = {i};\n"));
        }
        assert!(matches!(
            compile_src(&src),
            Err(CompileError::TooManyVariables { .. })
        ));
    }
}
