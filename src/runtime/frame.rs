use std::rc::Rc;

use crate::compiler::Program;
use crate::runtime::context::ContextSnapshot;
use crate::runtime::exceptions::Exception;
use crate::values::error::Error;
use crate::values::{List, Objid, Var};

/// One `except` clause of an installed handler.
#[derive(Debug, Clone)]
pub struct ExceptClause {
    /// None catches any kind.
    pub codes: Option<Vec<Error>>,
    pub bind_slot: Option<u8>,
    pub handler_ip: usize,
}

impl ExceptClause {
    pub fn catches(&self, code: Error) -> bool {
        if !code.is_catchable() {
            return false;
        }
        match &self.codes {
            None => true,
            Some(codes) => codes.contains(&code),
        }
    }
}

#[derive(Debug, Clone)]
pub enum HandlerKind {
    Except { clauses: Vec<ExceptClause> },
    Finally { handler_ip: usize },
}

/// Installed exception handler: kind plus the absolute value-stack depth
/// to truncate to when it is entered.
#[derive(Debug, Clone)]
pub struct Handler {
    pub kind: HandlerKind,
    pub depth: usize,
}

/// Why a finally block was entered; consumed at `FINALLY_CONTINUE`.
#[derive(Debug, Clone)]
pub enum FinallyWhy {
    Fallthrough,
    Raise(Exception),
    Return(Var),
    /// A break/continue passing through: after the finally, keep popping
    /// `remaining` handlers and land on `target`.
    Exit { target: usize, remaining: u8 },
}

#[derive(Debug, Clone)]
pub struct PendingFinally {
    pub why: FinallyWhy,
    /// Stack depth at entry; unwinding past it abandons the pending state.
    pub depth: usize,
}

/// A native activation record for one running verb.
#[derive(Debug)]
pub struct Frame {
    pub program: Rc<Program>,
    pub ip: usize,
    /// Base index into the shared value stack.
    pub base: usize,
    pub locals: Vec<Var>,
    pub this: Objid,
    pub this_value: Option<Var>,
    pub player: Objid,
    pub verb_name: String,
    pub caller: Objid,
    /// The object the verb is defined on; `pass` starts above it.
    pub verb_loc: Objid,
    pub args: List,
    pub handlers: Vec<Handler>,
    pub finally_pending: Vec<PendingFinally>,
    pub saved: ContextSnapshot,
    /// Set on frames pushed by `eval`: unwinding stops here and the
    /// outcome is wrapped into eval's result list.
    pub eval_root: bool,
}

impl Frame {
    /// Locals vector sized per the program, all slots INT 0.
    pub fn blank_locals(program: &Program) -> Vec<Var> {
        vec![Var::Int(0); program.num_locals]
    }

    pub fn line(&self) -> usize {
        self.program.line_for_offset(self.ip)
    }

    /// The `{this, verb, programmer, verb_loc, player, line}` entry this
    /// activation contributes to a traceback.
    pub fn traceback_entry(&self, programmer: Objid) -> Var {
        Var::List(List::from_vec(vec![
            Var::Obj(self.this),
            Var::str(&self.verb_name),
            Var::Obj(programmer),
            Var::Obj(self.verb_loc),
            Var::Obj(self.player),
            Var::Int(self.line() as i64),
        ]))
    }
}
