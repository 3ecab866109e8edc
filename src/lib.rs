//! Core execution engine for the MOO programming language: the shared
//! value model, the surface-syntax parser, the bytecode compiler, the
//! stack virtual machine with dynamic dispatch over the object graph,
//! structured exception handling, and the fork/suspend control-flow
//! primitives. The persistent store and the task scheduler are consumed
//! through the narrow contracts in [`store`] and [`runtime::scheduler`].

pub mod ast;
pub mod compiler;
pub mod global;
pub mod parser;
pub mod runtime;
pub mod store;
pub mod values;

pub use compiler::{compile, CompileError, Program};
pub use parser::{parse_literal, parse_program};
pub use runtime::{
    BuiltinRegistry, Exception, ForkInfo, NullScheduler, Scheduler,
    TaskContext, TaskOutcome, Vm,
};
pub use store::{MemStore, ObjectStore};
pub use values::{Error, List, Map, Objid, Var, Waif};

#[cfg(feature = "logger")]
pub mod logger {
    //! Opt-in logger backend for hosts that do not install their own.

    /// Initialize a `flexi_logger` backend from `RUST_LOG`-style spec.
    pub fn init(spec: &str) {
        let _ = flexi_logger::Logger::try_with_env_or_str(spec)
            .and_then(flexi_logger::Logger::start);
    }
}
