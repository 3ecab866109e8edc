use std::rc::Rc;

use crate::compiler::Program;
use crate::values::{Objid, Var};

/// Everything the scheduler needs to start a forked child task: a
/// snapshot of the parent's locals, the body's bytecode range inside the
/// parent program, the extracted body source, and the verb identity.
#[derive(Debug, Clone)]
pub struct ForkInfo {
    pub delay: f64,
    /// Deep snapshot of the forking frame's locals. Values are immutable
    /// bodies, so cloning the slots captures the environment.
    pub env: Vec<Var>,
    pub program: Rc<Program>,
    pub body_start: usize,
    pub body_len: usize,
    /// Source lines spanning the fork body, when the program carries
    /// source.
    pub source: Option<Vec<String>>,
    pub this: Objid,
    pub this_value: Option<Var>,
    pub player: Objid,
    pub programmer: Objid,
    pub verb_name: String,
    pub verb_loc: Objid,
}

impl ForkInfo {
    /// Slice the enclosing verb's source lines to the body's line span,
    /// derived from the line map over the body's bytecode range.
    pub fn extract_source(
        program: &Program,
        body_start: usize,
        body_len: usize,
    ) -> Option<Vec<String>> {
        let source = program.source.as_ref()?;
        let first = program.line_for_offset(body_start);
        let last = program.line_for_offset(body_start + body_len.saturating_sub(1));
        let lo = first.saturating_sub(1).min(source.len());
        let hi = last.min(source.len());
        Some(source[lo..hi].to_vec())
    }
}
