//! The builtin-function registry and the working set of core builtins.
//! Builtins receive the task context plus the store/scheduler handles and
//! return a flow result; `eval` and `pass` are declared here but executed
//! by the engine itself.

use indexmap::IndexMap;

use crate::global::limits::MAX_STRING_BYTES;
use crate::runtime::context::TaskContext;
use crate::runtime::exceptions::Exception;
use crate::runtime::fork::ForkInfo;
use crate::runtime::operations;
use crate::runtime::scheduler::Scheduler;
use crate::store::ObjectStore;
use crate::values::error::Error;
use crate::values::{List, Var};

/// Host handles a builtin may touch.
pub struct BuiltinCtx<'a> {
    pub task: &'a mut TaskContext,
    pub store: &'a mut dyn ObjectStore,
    pub scheduler: &'a mut dyn Scheduler,
}

/// What a builtin hands back to the interpreter.
pub enum BuiltinResult {
    Value(Var),
    Raise(Exception),
    /// Yield the task; the engine pushes suspend's return value and
    /// reports the delay to the host.
    Suspend(Option<f64>),
    /// Queue a fork; the engine pushes the child task id.
    Fork(ForkInfo),
}

pub type BuiltinFn = fn(&mut BuiltinCtx, List) -> BuiltinResult;

/// Registered builtins, addressed by the one-byte id the compiler embeds
/// in call instructions.
pub struct BuiltinRegistry {
    names: IndexMap<String, u8>,
    funcs: Vec<BuiltinFn>,
    eval_id: Option<u8>,
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        BuiltinRegistry::core()
    }
}

impl BuiltinRegistry {
    pub fn empty() -> BuiltinRegistry {
        BuiltinRegistry {
            names: IndexMap::new(),
            funcs: Vec::new(),
            eval_id: None,
        }
    }

    /// The registry with the core working set installed.
    pub fn core() -> BuiltinRegistry {
        let mut registry = BuiltinRegistry::empty();
        registry.register("typeof", bf_typeof);
        registry.register("tostr", bf_tostr);
        registry.register("toliteral", bf_toliteral);
        registry.register("length", bf_length);
        registry.register("raise", bf_raise);
        registry.register("suspend", bf_suspend);
        let eval_id = registry.register("eval", bf_eval_stub);
        registry.eval_id = Some(eval_id);
        registry
    }

    /// Register a builtin under a (case-insensitive) name; returns its id.
    pub fn register(&mut self, name: &str, func: BuiltinFn) -> u8 {
        let id = self.funcs.len() as u8;
        self.funcs.push(func);
        self.names.insert(name.to_ascii_lowercase(), id);
        id
    }

    pub fn id_of(&self, name: &str) -> Option<u8> {
        self.names.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn name_of(&self, id: u8) -> &str {
        self.names
            .iter()
            .find(|&(_, &i)| i == id)
            .map(|(name, _)| name.as_str())
            .unwrap_or("?")
    }

    pub fn get(&self, id: u8) -> Option<BuiltinFn> {
        self.funcs.get(id as usize).copied()
    }

    /// Whether this id is the engine-implemented `eval`.
    pub fn is_eval(&self, id: u8) -> bool {
        self.eval_id == Some(id)
    }
}

fn args_error(name: &str) -> BuiltinResult {
    BuiltinResult::Raise(Exception::with_message(
        Error::E_ARGS,
        format!("wrong number of arguments to {name}()"),
    ))
}

fn bf_typeof(_ctx: &mut BuiltinCtx, args: List) -> BuiltinResult {
    match args.as_slice() {
        [value] => BuiltinResult::Value(Var::Int(value.type_code())),
        _ => args_error("typeof"),
    }
}

fn bf_tostr(_ctx: &mut BuiltinCtx, args: List) -> BuiltinResult {
    let mut out = String::new();
    for value in args.iter() {
        out.push_str(&value.to_display());
        if out.len() > MAX_STRING_BYTES {
            return BuiltinResult::Raise(Exception::new(Error::E_QUOTA));
        }
    }
    BuiltinResult::Value(Var::str(out))
}

fn bf_toliteral(_ctx: &mut BuiltinCtx, args: List) -> BuiltinResult {
    match args.as_slice() {
        [value] => BuiltinResult::Value(Var::str(value.to_literal())),
        _ => args_error("toliteral"),
    }
}

fn bf_length(_ctx: &mut BuiltinCtx, args: List) -> BuiltinResult {
    match args.as_slice() {
        [value] => match operations::length(value) {
            Ok(len) => BuiltinResult::Value(len),
            Err(exc) => BuiltinResult::Raise(exc),
        },
        _ => args_error("length"),
    }
}

fn bf_raise(_ctx: &mut BuiltinCtx, args: List) -> BuiltinResult {
    let (code, message, value) = match args.as_slice() {
        [code] => (code, None, None),
        [code, message] => (code, Some(message), None),
        [code, message, value] => (code, Some(message), Some(value)),
        _ => return args_error("raise"),
    };
    let Var::Err(code) = code else {
        return BuiltinResult::Raise(Exception::with_message(
            Error::E_INVARG,
            "raise() takes an error code",
        ));
    };
    let message = match message {
        None => code.message().to_string(),
        Some(Var::Str(s)) => s.to_string(),
        Some(_) => {
            return BuiltinResult::Raise(Exception::with_message(
                Error::E_TYPE,
                "raise() message must be a string",
            ));
        }
    };
    BuiltinResult::Raise(Exception::with_value(
        *code,
        message,
        value.cloned().unwrap_or(Var::Int(0)),
    ))
}

fn bf_suspend(_ctx: &mut BuiltinCtx, args: List) -> BuiltinResult {
    let delay = match args.as_slice() {
        [] => None,
        [Var::Int(i)] if *i >= 0 => Some(*i as f64),
        [Var::Float(f)] if *f >= 0.0 => Some(*f),
        [Var::Int(_) | Var::Float(_)] => {
            return BuiltinResult::Raise(Exception::with_message(
                Error::E_INVARG,
                "suspend() delay cannot be negative",
            ));
        }
        [_] => {
            return BuiltinResult::Raise(Exception::with_message(
                Error::E_TYPE,
                "suspend() delay must be a number",
            ));
        }
        _ => return args_error("suspend"),
    };
    BuiltinResult::Suspend(delay)
}

/// `eval` is dispatched inside the interpreter, which owns the frame
/// stack; the registry slot exists so the compiler can resolve the name.
fn bf_eval_stub(_ctx: &mut BuiltinCtx, _args: List) -> BuiltinResult {
    BuiltinResult::Raise(Exception::with_message(
        Error::E_INVARG,
        "eval() requires the interpreter",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::scheduler::NullScheduler;
    use crate::store::MemStore;
    use crate::values::Objid;

    fn with_ctx(f: impl FnOnce(&mut BuiltinCtx)) {
        let mut store = MemStore::new();
        let mut scheduler = NullScheduler::new();
        let mut task = TaskContext::new(Objid::new(2));
        let mut ctx = BuiltinCtx {
            task: &mut task,
            store: &mut store,
            scheduler: &mut scheduler,
        };
        f(&mut ctx);
    }

    #[test]
    fn names_resolve_case_insensitively() {
        let registry = BuiltinRegistry::core();
        assert_eq!(registry.id_of("TYPEOF"), registry.id_of("typeof"));
        assert!(registry.id_of("no_such_function").is_none());
        assert!(registry.is_eval(registry.id_of("eval").unwrap()));
    }

    #[test]
    fn typeof_and_tostr() {
        with_ctx(|ctx| {
            let BuiltinResult::Value(v) =
                bf_typeof(ctx, List::from_vec(vec![Var::str("x")]))
            else {
                panic!()
            };
            assert_eq!(v, Var::Int(2));
            let BuiltinResult::Value(v) = bf_tostr(
                ctx,
                List::from_vec(vec![Var::Int(1), Var::str("a")]),
            ) else {
                panic!()
            };
            assert_eq!(v, Var::str("1a"));
        });
    }

    #[test]
    fn raise_shapes() {
        with_ctx(|ctx| {
            let BuiltinResult::Raise(exc) = bf_raise(
                ctx,
                List::from_vec(vec![
                    Var::Err(Error::E_PERM),
                    Var::str("nope"),
                    Var::Int(9),
                ]),
            ) else {
                panic!()
            };
            assert_eq!(exc.code, Error::E_PERM);
            assert_eq!(exc.message, "nope");
            assert_eq!(exc.value, Var::Int(9));
        });
    }

    #[test]
    fn suspend_validates_delay() {
        with_ctx(|ctx| {
            assert!(matches!(
                bf_suspend(ctx, List::from_vec(vec![Var::Int(5)])),
                BuiltinResult::Suspend(Some(d)) if d == 5.0
            ));
            assert!(matches!(
                bf_suspend(ctx, List::from_vec(vec![Var::Int(-1)])),
                BuiltinResult::Raise(_)
            ));
            assert!(matches!(
                bf_suspend(ctx, List::from_vec(vec![Var::str("x")])),
                BuiltinResult::Raise(_)
            ));
        });
    }
}
