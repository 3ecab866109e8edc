//! The stack virtual machine: one decode-dispatch loop over the top
//! frame, a value stack shared across frames and segmented by base
//! pointers, handler-stack unwinding, fork surrender, and suspend yield.
//! Verb-to-verb calls push frames here; the host call stack never
//! recurses.

use std::rc::Rc;

use log::{debug, trace};

use crate::compiler::{compile, Program};
use crate::global::opcodes::{imm_int_value, Opcode};
use crate::parser::parse_program;
use crate::runtime::builtins::{BuiltinCtx, BuiltinRegistry, BuiltinResult};
use crate::runtime::context::{ContextSnapshot, TaskContext};
use crate::runtime::dispatch::{self, VerbCall};
use crate::runtime::exceptions::Exception;
use crate::runtime::fork::ForkInfo;
use crate::runtime::frame::{
    ExceptClause, FinallyWhy, Frame, Handler, HandlerKind, PendingFinally,
};
use crate::runtime::operations;
use crate::runtime::scheduler::Scheduler;
use crate::store::ObjectStore;
use crate::values::error::Error;
use crate::values::{objid, List, Objid, Var};

/// How a task run ended, from the host's point of view.
#[derive(Debug)]
pub enum TaskOutcome {
    Complete(Var),
    Exception(Exception),
    /// The task yielded; the engine retains its state and `resume`
    /// continues right after the suspending call.
    Suspended(Option<f64>),
    /// Budget exhaustion or forced kill; `finally` blocks already ran.
    Aborted(Exception),
}

enum Flow {
    Continue,
    Complete(Var),
    Suspend(Option<f64>),
}

enum Caught {
    Except {
        depth: usize,
        bind_slot: Option<u8>,
        handler_ip: usize,
    },
    Finally {
        depth: usize,
        handler_ip: usize,
    },
}

fn invalid_program(detail: &str) -> Exception {
    Exception::with_message(Error::E_INVARG, format!("invalid program: {detail}"))
}

pub struct Vm<'h> {
    store: &'h mut dyn ObjectStore,
    scheduler: &'h mut dyn Scheduler,
    registry: &'h BuiltinRegistry,
    pub ctx: TaskContext,
    stack: Vec<Var>,
    frames: Vec<Frame>,
}

impl<'h> Vm<'h> {
    pub fn new(
        store: &'h mut dyn ObjectStore,
        scheduler: &'h mut dyn Scheduler,
        registry: &'h BuiltinRegistry,
        ctx: TaskContext,
    ) -> Vm<'h> {
        Vm {
            store,
            scheduler,
            registry,
            ctx,
            stack: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// Resolve and push the initial verb frame of a task; `run` executes it.
    pub fn call_verb(
        &mut self,
        target: &Var,
        name: &str,
        args: List,
        caller: Objid,
    ) -> Result<(), Exception> {
        let call = dispatch::resolve_verb_call(self.store, target, name)?;
        self.push_verb_frame(&call, name, args, caller)
    }

    pub fn run(&mut self) -> TaskOutcome {
        self.run_loop()
    }

    /// Continue a suspended task. The optional value replaces suspend's
    /// default return of INT 0.
    pub fn resume(&mut self, value: Option<Var>) -> TaskOutcome {
        if let (Some(value), Some(top)) = (value, self.stack.last_mut()) {
            *top = value;
        }
        self.run_loop()
    }

    /// Host-injected kill: raises the uncatchable kill error through the
    /// frames; pending `finally` blocks still run.
    pub fn kill(&mut self) -> TaskOutcome {
        match self.unwind(Exception::new(Error::E_KILLED)) {
            Ok(()) => self.run_loop(),
            Err(outcome) => outcome,
        }
    }

    /// Execute a forked body in this engine, restoring the snapshot the
    /// fork carried.
    pub fn run_fork(&mut self, fork: &ForkInfo) -> TaskOutcome {
        let saved = ContextSnapshot::capture(&self.ctx);
        self.ctx.programmer = fork.programmer;
        self.ctx.this = fork.this;
        self.ctx.this_value = fork.this_value.clone();
        self.ctx.verb_name = fork.verb_name.clone();
        let args = fork
            .program
            .find_var("args")
            .and_then(|slot| match fork.env.get(slot) {
                Some(Var::List(args)) => Some(args.clone()),
                _ => None,
            })
            .unwrap_or_default();
        self.frames.push(Frame {
            program: fork.program.clone(),
            ip: fork.body_start,
            base: self.stack.len(),
            locals: fork.env.clone(),
            this: fork.this,
            this_value: fork.this_value.clone(),
            player: fork.player,
            verb_name: fork.verb_name.clone(),
            caller: fork.verb_loc,
            verb_loc: fork.verb_loc,
            args,
            handlers: Vec::new(),
            finally_pending: Vec::new(),
            saved,
            eval_root: false,
        });
        self.scheduler.push_frame();
        self.run_loop()
    }

    // ---- frame management ----

    fn compiled_verb(
        &mut self,
        definer: Objid,
        index: usize,
    ) -> Result<(Rc<Program>, Objid), Exception> {
        let (cached, owner, cached_ast, code) = {
            let object = self
                .store
                .get(definer)
                .ok_or_else(|| Exception::new(Error::E_INVIND))?;
            let verb = object
                .verbs
                .get(index)
                .ok_or_else(|| Exception::new(Error::E_VERBNF))?;
            (
                verb.program.clone(),
                verb.owner,
                verb.ast.clone(),
                verb.code.clone(),
            )
        };
        if let Some(program) = cached {
            return Ok((program, owner));
        }
        let ast = match cached_ast {
            Some(ast) => ast,
            None => {
                let parsed =
                    parse_program(&code.join("\n")).map_err(|e| {
                        Exception::with_message(
                            Error::E_INVARG,
                            format!("verb does not parse: {e}"),
                        )
                    })?;
                let ast = Rc::new(parsed);
                self.store.cache_verb_ast(definer, index, ast.clone());
                ast
            }
        };
        let program = compile(&ast, self.registry, Some(code))
            .map_err(|e| {
                Exception::with_message(
                    Error::E_INVARG,
                    format!("verb does not compile: {e}"),
                )
            })?
            .into_shared();
        debug!("compiled verb {} on {definer}", self.ctx.verb_name);
        self.store.cache_verb_program(definer, index, program.clone());
        Ok((program, owner))
    }

    fn push_verb_frame(
        &mut self,
        call: &VerbCall,
        name_used: &str,
        args: List,
        caller: Objid,
    ) -> Result<(), Exception> {
        if self.frames.len() >= self.ctx.max_depth {
            return Err(Exception::new(Error::E_MAXREC));
        }
        let (program, owner) = self.compiled_verb(call.definer, call.index)?;
        let saved = ContextSnapshot::capture(&self.ctx);
        self.ctx.programmer = owner;
        self.ctx.this = call.this;
        self.ctx.this_value = call.this_value.clone();
        self.ctx.verb_name = name_used.to_string();

        let mut locals = Frame::blank_locals(&program);
        let this_var = call
            .this_value
            .clone()
            .unwrap_or(Var::Obj(call.this));
        let mut fill = |name: &str, value: Var| {
            if let Some(slot) = program.find_var(name) {
                locals[slot] = value;
            }
        };
        fill("this", this_var);
        fill("verb", Var::str(name_used));
        fill("caller", Var::Obj(caller));
        fill("args", Var::List(args.clone()));
        fill("player", Var::Obj(self.ctx.player));
        if let Some(command) = &self.ctx.command {
            fill("argstr", Var::str(&command.argstr));
            fill("dobjstr", Var::str(&command.dobjstr));
            fill("iobjstr", Var::str(&command.iobjstr));
            fill("prepstr", Var::str(&command.prepstr));
            fill("dobj", Var::Obj(command.dobj));
            fill("iobj", Var::Obj(command.iobj));
        }

        trace!("push frame {name_used} on {} ({})", call.this, call.definer);
        self.frames.push(Frame {
            program,
            ip: 0,
            base: self.stack.len(),
            locals,
            this: call.this,
            this_value: call.this_value.clone(),
            player: self.ctx.player,
            verb_name: name_used.to_string(),
            caller,
            verb_loc: call.definer,
            args,
            handlers: Vec::new(),
            finally_pending: Vec::new(),
            saved,
            eval_root: false,
        });
        self.scheduler.push_frame();
        Ok(())
    }

    /// Return from the top frame, running its pending `finally` blocks
    /// first.
    fn do_return(&mut self, value: Var) -> Result<Flow, Exception> {
        // a protected body returns through its finally block
        let frame = self.frames.last_mut().expect("returning without a frame");
        let mut enter: Option<(usize, usize)> = None;
        while let Some(handler) = frame.handlers.pop() {
            if let HandlerKind::Finally { handler_ip } = handler.kind {
                enter = Some((handler_ip, handler.depth));
                break;
            }
        }
        if let Some((handler_ip, depth)) = enter {
            self.stack.truncate(depth);
            let frame = self.frames.last_mut().expect("frame vanished");
            frame.finally_pending.push(PendingFinally {
                why: FinallyWhy::Return(value),
                depth,
            });
            frame.ip = handler_ip;
            return Ok(Flow::Continue);
        }

        let frame = self.frames.pop().expect("returning without a frame");
        self.stack.truncate(frame.base);
        frame.saved.restore(&mut self.ctx);
        self.scheduler.pop_frame();
        trace!("return from {} with {}", frame.verb_name, value);
        if frame.eval_root {
            self.stack.push(Var::List(List::from_vec(vec![
                Var::Int(1),
                value,
            ])));
            return Ok(Flow::Continue);
        }
        if self.frames.is_empty() {
            return Ok(Flow::Complete(value));
        }
        self.stack.push(value);
        Ok(Flow::Continue)
    }

    /// Walk handler stacks across frames for an exception; `Ok` means a
    /// handler (or finally) was entered and execution resumes.
    fn unwind(&mut self, mut exc: Exception) -> Result<(), TaskOutcome> {
        loop {
            let Some(frame) = self.frames.last_mut() else {
                for entry in self.scheduler.get_call_stack() {
                    exc.push_frame(entry);
                }
                return Err(match exc.code {
                    Error::E_TICKS | Error::E_KILLED => {
                        TaskOutcome::Aborted(exc)
                    }
                    _ => TaskOutcome::Exception(exc),
                });
            };

            let mut caught = None;
            while let Some(handler) = frame.handlers.pop() {
                match handler.kind {
                    HandlerKind::Except { clauses } => {
                        if let Some(clause) =
                            clauses.iter().find(|c| c.catches(exc.code))
                        {
                            caught = Some(Caught::Except {
                                depth: handler.depth,
                                bind_slot: clause.bind_slot,
                                handler_ip: clause.handler_ip,
                            });
                            break;
                        }
                    }
                    HandlerKind::Finally { handler_ip } => {
                        caught = Some(Caught::Finally {
                            depth: handler.depth,
                            handler_ip,
                        });
                        break;
                    }
                }
            }
            match caught {
                Some(Caught::Except {
                    depth,
                    bind_slot,
                    handler_ip,
                }) => {
                    self.stack.truncate(depth);
                    let frame = self.frames.last_mut().expect("frame vanished");
                    frame.finally_pending.retain(|p| p.depth <= depth);
                    if let Some(slot) = bind_slot {
                        frame.locals[slot as usize] = exc.as_list();
                    }
                    frame.ip = handler_ip;
                    self.stack.push(exc.as_list());
                    return Ok(());
                }
                Some(Caught::Finally { depth, handler_ip }) => {
                    self.stack.truncate(depth);
                    let frame = self.frames.last_mut().expect("frame vanished");
                    frame.finally_pending.retain(|p| p.depth <= depth);
                    frame.finally_pending.push(PendingFinally {
                        why: FinallyWhy::Raise(exc),
                        depth,
                    });
                    frame.ip = handler_ip;
                    return Ok(());
                }
                None => {
                    exc.push_frame(
                        frame.traceback_entry(self.ctx.programmer),
                    );
                    let frame = self.frames.pop().expect("frame vanished");
                    self.stack.truncate(frame.base);
                    frame.saved.restore(&mut self.ctx);
                    self.scheduler.pop_frame();
                    // eval reports runtime failures as a result list, but
                    // budget exhaustion and kills pass through
                    if frame.eval_root
                        && exc.code.is_catchable()
                        && exc.code != Error::E_TICKS
                    {
                        self.stack.push(Var::List(List::from_vec(vec![
                            Var::Int(0),
                            Var::Err(exc.code),
                        ])));
                        return Ok(());
                    }
                }
            }
        }
    }

    // ---- the dispatch loop ----

    fn run_loop(&mut self) -> TaskOutcome {
        loop {
            if self.frames.is_empty() {
                return TaskOutcome::Complete(Var::Int(0));
            }
            match self.step() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Complete(value)) => {
                    return TaskOutcome::Complete(value);
                }
                Ok(Flow::Suspend(delay)) => {
                    return TaskOutcome::Suspended(delay);
                }
                Err(exc) => {
                    if let Err(outcome) = self.unwind(exc) {
                        return outcome;
                    }
                }
            }
        }
    }

    fn fetch_byte(&mut self) -> u8 {
        // frames and ip are maintained by the compiler's own emission;
        // running off the end of a program is a compiler bug
        let frame = self.frames.last_mut().expect("no running frame");
        let byte = frame.program.code[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_u8(&mut self) -> u8 {
        self.fetch_byte()
    }

    fn read_u16(&mut self) -> u16 {
        let hi = self.fetch_byte();
        let lo = self.fetch_byte();
        u16::from_be_bytes([hi, lo])
    }

    fn push(&mut self, value: Var) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Var {
        // bytecode is stack-balanced by construction
        self.stack.pop().expect("value stack underflow")
    }

    fn constant(&self, index: u8) -> Result<Var, Exception> {
        let frame = self.frames.last().expect("no running frame");
        frame
            .program
            .constants
            .get(index as usize)
            .cloned()
            .ok_or_else(|| invalid_program("constant index out of range"))
    }

    fn constant_str(&self, index: u8) -> Result<String, Exception> {
        match self.constant(index)? {
            Var::Str(s) => Ok(s.to_string()),
            _ => Err(invalid_program("expected a string constant")),
        }
    }

    fn jump(&mut self, target: u16) {
        self.frames.last_mut().expect("no running frame").ip = target as usize;
    }

    fn step(&mut self) -> Result<Flow, Exception> {
        let byte = self.fetch_byte();
        if let Some(value) = imm_int_value(byte) {
            self.push(Var::Int(value));
            return Ok(Flow::Continue);
        }
        let op = Opcode::try_from(byte)
            .map_err(|_| invalid_program("unknown opcode"))?;
        if op.counts_tick() {
            self.ctx.charge_tick()?;
            let line = self.frames.last().map(|f| f.line()).unwrap_or(0);
            self.scheduler.update_line_number(line);
        }

        match op {
            Opcode::POP => {
                self.pop();
            }
            Opcode::DUP => {
                let top = self.stack.last().expect("DUP on empty stack").clone();
                self.push(top);
            }
            Opcode::PUSH_CONST => {
                let index = self.read_u8();
                let value = self.constant(index)?;
                self.push(value);
            }
            Opcode::PUSH_VAR => {
                let slot = self.read_u8() as usize;
                let frame = self.frames.last().expect("no running frame");
                let value = frame.locals[slot].clone();
                self.push(value);
            }
            Opcode::PUT_VAR => {
                let slot = self.read_u8() as usize;
                let value =
                    self.stack.last().expect("PUT_VAR on empty stack").clone();
                self.frames.last_mut().expect("no running frame").locals
                    [slot] = value;
            }

            Opcode::ADD => self.binary(operations::add)?,
            Opcode::SUB => self.binary(operations::sub)?,
            Opcode::MUL => self.binary(operations::mul)?,
            Opcode::DIV => self.binary(operations::div)?,
            Opcode::MOD => self.binary(operations::rem)?,
            Opcode::POW => self.binary(operations::pow)?,
            Opcode::BIT_OR => self.binary(operations::bit_or)?,
            Opcode::BIT_AND => self.binary(operations::bit_and)?,
            Opcode::BIT_XOR => self.binary(operations::bit_xor)?,
            Opcode::SHL => self.binary(operations::shl)?,
            Opcode::SHR => self.binary(operations::shr)?,

            Opcode::EQ => {
                let b = self.pop();
                let a = self.pop();
                self.push(Var::Bool(a.equals(&b)));
            }
            Opcode::NE => {
                let b = self.pop();
                let a = self.pop();
                self.push(Var::Bool(!a.equals(&b)));
            }
            Opcode::LT => self.comparison("<", |o| o.is_lt())?,
            Opcode::LE => self.comparison("<=", |o| o.is_le())?,
            Opcode::GT => self.comparison(">", |o| o.is_gt())?,
            Opcode::GE => self.comparison(">=", |o| o.is_ge())?,
            Opcode::IN => {
                let container = self.pop();
                let element = self.pop();
                let result = operations::membership(&element, &container)?;
                self.push(result);
            }

            Opcode::NOT => {
                let v = self.pop();
                self.push(Var::Bool(!v.is_true()));
            }
            Opcode::NEG => {
                let v = self.pop();
                let result = operations::negate(&v)?;
                self.push(result);
            }
            Opcode::BIT_NOT => {
                let v = self.pop();
                let result = operations::bit_not(&v)?;
                self.push(result);
            }

            Opcode::AND => {
                let target = self.read_u16();
                let decided =
                    !self.stack.last().expect("AND on empty stack").is_true();
                if decided {
                    self.jump(target);
                } else {
                    self.pop();
                }
            }
            Opcode::OR => {
                let target = self.read_u16();
                let decided =
                    self.stack.last().expect("OR on empty stack").is_true();
                if decided {
                    self.jump(target);
                } else {
                    self.pop();
                }
            }

            Opcode::JUMP => {
                let target = self.read_u16();
                self.jump(target);
            }
            Opcode::IF_FALSE_JUMP => {
                let target = self.read_u16();
                let cond = self.pop();
                if !cond.is_true() {
                    self.jump(target);
                }
            }
            Opcode::LOOP_JUMP => {
                let target = self.read_u16();
                self.jump(target);
            }
            Opcode::RETURN => {
                let value = self.pop();
                return self.do_return(value);
            }
            Opcode::RETURN0 => {
                return self.do_return(Var::Int(0));
            }

            Opcode::MAKE_LIST => {
                let count = self.read_u16() as usize;
                let at = self.stack.len() - count;
                let items = self.stack.split_off(at);
                self.push(Var::List(List::from_vec(items)));
            }
            Opcode::MAKE_MAP => {
                let pairs = self.read_u16() as usize;
                let at = self.stack.len() - pairs * 2;
                let items = self.stack.split_off(at);
                let mut entries = Vec::with_capacity(pairs);
                for pair in items.chunks(2) {
                    if !pair[0].valid_map_key() {
                        return Err(Exception::with_message(
                            Error::E_TYPE,
                            format!(
                                "{} is not a valid map key",
                                pair[0].type_name()
                            ),
                        ));
                    }
                    entries.push((pair[0].clone(), pair[1].clone()));
                }
                self.push(Var::Map(crate::values::Map::from_pairs(entries)));
            }
            Opcode::LENGTH => {
                let v = self.pop();
                let result = operations::length(&v)?;
                self.push(result);
            }
            Opcode::INDEX_GET => {
                let index = self.pop();
                let coll = self.pop();
                let result = operations::index_get(&coll, &index)?;
                self.push(result);
            }
            Opcode::INDEX_SET => {
                let value = self.pop();
                let index = self.pop();
                let coll = self.pop();
                let result = operations::index_set(&coll, &index, &value)?;
                self.push(result);
            }
            Opcode::RANGE_GET => {
                let to = self.pop();
                let from = self.pop();
                let coll = self.pop();
                let result = operations::range_get(&coll, &from, &to)?;
                self.push(result);
            }
            Opcode::RANGE_SET => {
                let value = self.pop();
                let to = self.pop();
                let from = self.pop();
                let coll = self.pop();
                let result =
                    operations::range_set(&coll, &from, &to, &value)?;
                self.push(result);
            }
            Opcode::LIST_APPEND => {
                let value = self.pop();
                let list = self.pop();
                match list {
                    Var::List(list) => {
                        self.push(Var::List(list.push(value)));
                    }
                    _ => return Err(invalid_program("append to a non-list")),
                }
            }
            Opcode::LIST_EXTEND => {
                let tail = self.pop();
                let head = self.pop();
                match (head, tail) {
                    (Var::List(head), Var::List(tail)) => {
                        self.push(Var::List(head.concat(&tail)));
                    }
                    _ => return Err(invalid_program("extend needs lists")),
                }
            }
            Opcode::LIST_RANGE => {
                let to = self.pop();
                let from = self.pop();
                let result = operations::list_range(&from, &to)?;
                self.push(result);
            }
            Opcode::SPLICE => {
                if !matches!(
                    self.stack.last().expect("SPLICE on empty stack"),
                    Var::List(_)
                ) {
                    return Err(Exception::with_message(
                        Error::E_TYPE,
                        "only lists can be spliced",
                    ));
                }
            }
            Opcode::ITER_PREP => {
                let want_index = self.read_u8() != 0;
                let coll = self.pop();
                let (list, pairs) =
                    operations::iter_prep(&coll, want_index)?;
                self.push(Var::List(list));
                self.push(Var::Bool(pairs));
            }

            Opcode::CALL_BUILTIN => return self.op_call_builtin(),
            Opcode::CALL_VERB => return self.op_call_verb(),
            Opcode::PASS => return self.op_pass(),

            Opcode::GET_PROP => {
                let operand = self.read_u8();
                let (target, name) = if operand == 0xFF {
                    let name = self.pop_name()?;
                    (self.pop(), name)
                } else {
                    let name = self.constant_str(operand)?;
                    (self.pop(), name)
                };
                let value = dispatch::read_property(
                    self.store,
                    self.ctx.programmer,
                    &target,
                    &name,
                )?;
                self.push(value);
            }
            Opcode::SET_PROP_YIELD => return self.op_set_prop_yield(),
            Opcode::WRITE_BACK_PROP => return self.op_write_back_prop(),

            Opcode::TRY_EXCEPT => {
                let count = self.read_u8() as usize;
                let mut clauses = Vec::with_capacity(count);
                for _ in 0..count {
                    let ncodes = self.read_u8() as usize;
                    let codes = if ncodes == 0 {
                        None
                    } else {
                        let mut codes = Vec::with_capacity(ncodes);
                        for _ in 0..ncodes {
                            let index = self.read_u8();
                            match self.constant(index)? {
                                Var::Err(code) => codes.push(code),
                                _ => {
                                    return Err(invalid_program(
                                        "except code is not an error",
                                    ));
                                }
                            }
                        }
                        Some(codes)
                    };
                    let bind = self.read_u8();
                    let handler_ip = self.read_u16() as usize;
                    clauses.push(ExceptClause {
                        codes,
                        bind_slot: bind.checked_sub(1),
                        handler_ip,
                    });
                }
                let depth = self.stack.len();
                self.frames
                    .last_mut()
                    .expect("no running frame")
                    .handlers
                    .push(Handler {
                        kind: HandlerKind::Except { clauses },
                        depth,
                    });
            }
            Opcode::END_EXCEPT => {
                let done = self.read_u16();
                let frame = self.frames.last_mut().expect("no running frame");
                match frame.handlers.pop() {
                    Some(Handler {
                        kind: HandlerKind::Except { .. },
                        ..
                    }) => {}
                    _ => return Err(invalid_program("stray END_EXCEPT")),
                }
                self.jump(done);
            }
            Opcode::TRY_FINALLY => {
                let handler_ip = self.read_u16() as usize;
                let depth = self.stack.len();
                self.frames
                    .last_mut()
                    .expect("no running frame")
                    .handlers
                    .push(Handler {
                        kind: HandlerKind::Finally { handler_ip },
                        depth,
                    });
            }
            Opcode::END_FINALLY => {
                let frame = self.frames.last_mut().expect("no running frame");
                match frame.handlers.pop() {
                    Some(Handler {
                        kind: HandlerKind::Finally { handler_ip },
                        depth,
                    }) => {
                        frame.finally_pending.push(PendingFinally {
                            why: FinallyWhy::Fallthrough,
                            depth,
                        });
                        frame.ip = handler_ip;
                    }
                    _ => return Err(invalid_program("stray END_FINALLY")),
                }
            }
            Opcode::FINALLY_CONTINUE => {
                let frame = self.frames.last_mut().expect("no running frame");
                let pending = frame
                    .finally_pending
                    .pop()
                    .ok_or_else(|| invalid_program("stray FINALLY_CONTINUE"))?;
                match pending.why {
                    FinallyWhy::Fallthrough => {}
                    FinallyWhy::Raise(exc) => return Err(exc),
                    FinallyWhy::Return(value) => {
                        return self.do_return(value);
                    }
                    FinallyWhy::Exit { target, remaining } => {
                        self.run_exits(remaining, target)?;
                    }
                }
            }

            Opcode::EXIT => {
                let count = self.read_u8();
                let target = self.read_u16() as usize;
                self.run_exits(count, target)?;
            }

            Opcode::FORK => return self.op_fork(),
            Opcode::SCATTER => {
                let required = self.read_u8() as usize;
                let optional = self.read_u8() as usize;
                let has_rest = self.read_u8() != 0;
                let value = self.pop();
                let Var::List(list) = value else {
                    return Err(Exception::with_message(
                        Error::E_TYPE,
                        "scatter needs a list",
                    ));
                };
                let len = list.len();
                if len < required
                    || (!has_rest && len > required + optional)
                {
                    return Err(Exception::new(Error::E_ARGS));
                }
                let avail = optional.min(len - required);
                self.push(Var::List(list));
                self.push(Var::Int(avail as i64));
            }
            Opcode::MARK_FIRST | Opcode::MARK_LAST => {
                let slot = self.read_u8() as usize;
                let context = self
                    .frames
                    .last()
                    .expect("no running frame")
                    .locals[slot]
                    .clone();
                let result = operations::resolve_marker(
                    op == Opcode::MARK_LAST,
                    &context,
                )?;
                self.push(result);
            }
        }
        Ok(Flow::Continue)
    }

    /// Pop `count` installed handlers on the way to `target`; crossed
    /// finally blocks run first, resuming the exit afterwards.
    fn run_exits(&mut self, count: u8, target: usize) -> Result<(), Exception> {
        for i in 0..count {
            let frame = self.frames.last_mut().expect("no running frame");
            let handler = frame
                .handlers
                .pop()
                .ok_or_else(|| invalid_program("EXIT without a handler"))?;
            if let HandlerKind::Finally { handler_ip } = handler.kind {
                self.stack.truncate(handler.depth);
                let frame = self.frames.last_mut().expect("frame vanished");
                frame.finally_pending.push(PendingFinally {
                    why: FinallyWhy::Exit {
                        target,
                        remaining: count - i - 1,
                    },
                    depth: handler.depth,
                });
                frame.ip = handler_ip;
                return Ok(());
            }
        }
        self.frames.last_mut().expect("no running frame").ip = target;
        Ok(())
    }

    fn binary(
        &mut self,
        op: fn(&Var, &Var) -> Result<Var, Exception>,
    ) -> Result<(), Exception> {
        let b = self.pop();
        let a = self.pop();
        let result = op(&a, &b)?;
        self.push(result);
        Ok(())
    }

    fn comparison(
        &mut self,
        name: &str,
        accept: fn(core::cmp::Ordering) -> bool,
    ) -> Result<(), Exception> {
        let b = self.pop();
        let a = self.pop();
        let ordering = operations::compare(name, &a, &b)?;
        self.push(Var::Bool(accept(ordering)));
        Ok(())
    }

    fn pop_name(&mut self) -> Result<String, Exception> {
        match self.pop() {
            Var::Str(s) => Ok(s.to_string()),
            other => Err(Exception::with_message(
                Error::E_TYPE,
                format!("name must be a string, got {}", other.type_name()),
            )),
        }
    }

    fn pop_args_list(&mut self) -> Result<List, Exception> {
        match self.pop() {
            Var::List(args) => Ok(args),
            _ => Err(invalid_program("argument list missing")),
        }
    }

    fn op_call_builtin(&mut self) -> Result<Flow, Exception> {
        let id = self.read_u8();
        let argc = self.read_u8();
        let args = if argc == 0xFF {
            self.pop_args_list()?
        } else {
            let at = self.stack.len() - argc as usize;
            List::from_vec(self.stack.split_off(at))
        };
        if self.registry.is_eval(id) {
            return self.do_eval(args);
        }
        let func = self
            .registry
            .get(id)
            .ok_or_else(|| invalid_program("unknown builtin id"))?;
        trace!("builtin {}({} args)", self.registry.name_of(id), args.len());
        let result = {
            let mut bctx = BuiltinCtx {
                task: &mut self.ctx,
                store: &mut *self.store,
                scheduler: &mut *self.scheduler,
            };
            func(&mut bctx, args)
        };
        match result {
            BuiltinResult::Value(value) => {
                self.push(value);
                Ok(Flow::Continue)
            }
            BuiltinResult::Raise(exc) => Err(exc),
            BuiltinResult::Suspend(delay) => {
                // suspend's in-language return value
                self.push(Var::Int(0));
                Ok(Flow::Suspend(delay))
            }
            BuiltinResult::Fork(info) => {
                let task_id = self.scheduler.create_fork(info);
                self.push(Var::Int(task_id));
                Ok(Flow::Continue)
            }
        }
    }

    fn op_call_verb(&mut self) -> Result<Flow, Exception> {
        let operand = self.read_u8();
        let args = self.pop_args_list()?;
        let name = if operand == 0xFF {
            self.pop_name()?
        } else {
            self.constant_str(operand)?
        };
        let target = self.pop();
        let caller = self.frames.last().expect("no running frame").this;
        let call = dispatch::resolve_verb_call(self.store, &target, &name)?;
        self.push_verb_frame(&call, &name, args, caller)?;
        Ok(Flow::Continue)
    }

    fn op_pass(&mut self) -> Result<Flow, Exception> {
        let args = self.pop_args_list()?;
        let (verb_loc, verb_name, this, this_value, inherited) = {
            let frame = self.frames.last().expect("no running frame");
            (
                frame.verb_loc,
                frame.verb_name.clone(),
                frame.this,
                frame.this_value.clone(),
                frame.args.clone(),
            )
        };
        // bare pass() forwards the current arguments
        let args = if args.is_empty() { inherited } else { args };
        let (definer, index) =
            dispatch::resolve_pass(self.store, verb_loc, &verb_name)?;
        let call = VerbCall {
            this,
            this_value,
            definer,
            index,
        };
        self.push_verb_frame(&call, &verb_name, args, verb_loc)?;
        Ok(Flow::Continue)
    }

    fn op_set_prop_yield(&mut self) -> Result<Flow, Exception> {
        let operand = self.read_u8();
        let has_holder = self.read_u8() != 0;
        let value = self.pop();
        let name = if operand == 0xFF {
            self.pop_name()?
        } else {
            self.constant_str(operand)?
        };
        let target = self.pop();
        match target {
            Var::Obj(o) => {
                dispatch::write_property(
                    self.store,
                    self.ctx.programmer,
                    self.ctx.player,
                    o,
                    &name,
                    &value,
                )?;
                self.push(Var::Obj(o));
            }
            Var::Waif(w) => {
                if !has_holder {
                    return Err(Exception::with_message(
                        Error::E_INVARG,
                        "waif property assignment needs a holder",
                    ));
                }
                let updated = dispatch::write_waif_property(
                    self.store,
                    self.ctx.programmer,
                    &w,
                    &name,
                    &value,
                )?;
                self.push(Var::Waif(updated));
            }
            other => {
                return Err(Exception::with_message(
                    Error::E_TYPE,
                    format!(
                        "{} values have no properties",
                        other.type_name()
                    ),
                ));
            }
        }
        Ok(Flow::Continue)
    }

    fn op_write_back_prop(&mut self) -> Result<Flow, Exception> {
        let operand = self.read_u8();
        let new = self.pop();
        let old = self.pop();
        let name = if operand == 0xFF {
            self.pop_name()?
        } else {
            self.constant_str(operand)?
        };
        let base = self.pop();
        if new.identical(&old) {
            // nothing changed at this level; plain objects skip the
            // rewrite so clear bits and permissions stay untouched
            self.push(base);
            return Ok(Flow::Continue);
        }
        match base {
            Var::Obj(o) => {
                dispatch::write_property(
                    self.store,
                    self.ctx.programmer,
                    self.ctx.player,
                    o,
                    &name,
                    &new,
                )?;
                self.push(Var::Obj(o));
            }
            Var::Waif(w) => {
                let updated = dispatch::write_waif_property(
                    self.store,
                    self.ctx.programmer,
                    &w,
                    &name,
                    &new,
                )?;
                self.push(Var::Waif(updated));
            }
            other => {
                return Err(Exception::with_message(
                    Error::E_TYPE,
                    format!(
                        "{} values have no properties",
                        other.type_name()
                    ),
                ));
            }
        }
        Ok(Flow::Continue)
    }

    fn op_fork(&mut self) -> Result<Flow, Exception> {
        let slot = self.read_u8();
        let body_len = self.read_u16() as usize;
        let delay = match self.pop() {
            Var::Int(i) if i >= 0 => i as f64,
            Var::Float(f) if f >= 0.0 => f,
            Var::Int(_) | Var::Float(_) => {
                return Err(Exception::with_message(
                    Error::E_INVARG,
                    "fork delay cannot be negative",
                ));
            }
            other => {
                return Err(Exception::with_message(
                    Error::E_TYPE,
                    format!("fork delay must be a number, got {}", other.type_name()),
                ));
            }
        };
        let info = {
            let frame = self.frames.last_mut().expect("no running frame");
            let body_start = frame.ip;
            let info = ForkInfo {
                delay,
                env: frame.locals.clone(),
                program: frame.program.clone(),
                body_start,
                body_len,
                source: ForkInfo::extract_source(
                    &frame.program,
                    body_start,
                    body_len,
                ),
                this: frame.this,
                this_value: frame.this_value.clone(),
                player: frame.player,
                programmer: self.ctx.programmer,
                verb_name: frame.verb_name.clone(),
                verb_loc: frame.verb_loc,
            };
            // execution continues past the inline body
            frame.ip += body_len;
            info
        };
        let task_id = self.scheduler.create_fork(info);
        debug!("forked child task {task_id}");
        if slot != 0 {
            self.frames
                .last_mut()
                .expect("no running frame")
                .locals[slot as usize - 1] = Var::Int(task_id);
        }
        Ok(Flow::Continue)
    }

    /// The engine half of `eval`: parse failures come back as
    /// `{0, messages}`, runtime failures as `{0, code}` (via the
    /// eval-root barrier), success as `{1, value}`.
    fn do_eval(&mut self, args: List) -> Result<Flow, Exception> {
        if !dispatch::is_programmer(self.store, self.ctx.programmer) {
            return Err(Exception::new(Error::E_PERM));
        }
        if args.is_empty() {
            return Err(Exception::new(Error::E_ARGS));
        }
        let mut lines = Vec::with_capacity(args.len());
        for arg in args.iter() {
            match arg {
                Var::Str(s) => lines.push(s.to_string()),
                _ => {
                    return Err(Exception::with_message(
                        Error::E_TYPE,
                        "eval() takes strings",
                    ));
                }
            }
        }
        let source = lines.join("\n");
        let stmts = match parse_program(&source) {
            Ok(stmts) => stmts,
            Err(err) => {
                self.push(eval_failure(vec![Var::str(err.to_string())]));
                return Ok(Flow::Continue);
            }
        };
        let program = match compile(&stmts, self.registry, Some(lines)) {
            Ok(program) => program.into_shared(),
            Err(err) => {
                self.push(eval_failure(vec![Var::str(err.to_string())]));
                return Ok(Flow::Continue);
            }
        };
        if self.frames.len() >= self.ctx.max_depth {
            return Err(Exception::new(Error::E_MAXREC));
        }

        let saved = ContextSnapshot::capture(&self.ctx);
        let caller = self.ctx.this;
        self.ctx.this = objid::NOTHING;
        self.ctx.this_value = None;
        self.ctx.verb_name = "eval".to_string();

        let mut locals = Frame::blank_locals(&program);
        let mut fill = |name: &str, value: Var| {
            if let Some(slot) = program.find_var(name) {
                locals[slot] = value;
            }
        };
        fill("this", Var::Obj(objid::NOTHING));
        fill("verb", Var::str("eval"));
        fill("caller", Var::Obj(caller));
        fill("args", Var::List(List::new()));
        fill("player", Var::Obj(self.ctx.player));

        self.frames.push(Frame {
            program,
            ip: 0,
            base: self.stack.len(),
            locals,
            this: objid::NOTHING,
            this_value: None,
            player: self.ctx.player,
            verb_name: "eval".to_string(),
            caller,
            verb_loc: objid::NOTHING,
            args: List::new(),
            handlers: Vec::new(),
            finally_pending: Vec::new(),
            saved,
            eval_root: true,
        });
        self.scheduler.push_frame();
        Ok(Flow::Continue)
    }
}

fn eval_failure(messages: Vec<Var>) -> Var {
    Var::List(List::from_vec(vec![
        Var::Int(0),
        Var::List(List::from_vec(messages)),
    ]))
}
