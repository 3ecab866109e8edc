//! The object store contract the engine consumes, plus the in-memory
//! reference store. The engine reads objects, writes property values, and
//! fills verb parse/compile caches; it never reorganizes object identity.

pub mod memory;
pub mod object;

pub use memory::MemStore;
pub use object::{
    ArgSpec, MooObject, ObjFlags, PrepSpec, PropPerms, Property, Verb,
    VerbArgs, VerbPerms,
};

use std::collections::HashSet;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::ast::Stmt;
use crate::compiler::Program;
use crate::values::Objid;

pub trait ObjectStore {
    fn get(&self, id: Objid) -> Option<&MooObject>;
    fn get_mut(&mut self, id: Objid) -> Option<&mut MooObject>;

    /// All directory (non-anonymous) object ids.
    fn all(&self) -> Vec<Objid>;

    /// All live anonymous object ids.
    fn get_anonymous_objects(&self) -> Vec<Objid>;

    /// Remove a recycled object entirely.
    fn recycle(&mut self, id: Objid);

    fn valid(&self, id: Objid) -> bool {
        self.get(id)
            .is_some_and(|o| !o.flags.invalid && !o.flags.recycled)
    }

    /// Breadth-first, left-to-right inheritance search for a verb whose
    /// name or alias matches. Returns the defining object and the verb's
    /// index on it.
    fn find_verb(&self, obj: Objid, name: &str) -> Option<(Objid, usize)> {
        let mut queue = VecDeque::from([obj]);
        let mut visited = HashSet::new();
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            let Some(object) = self.get(id) else { continue };
            if let Some(index) = object.find_verb_local(name) {
                return Some((id, index));
            }
            queue.extend(object.parents.iter().copied());
        }
        None
    }

    /// Store the parsed form of a verb body; idempotent per verb.
    fn cache_verb_ast(&mut self, obj: Objid, index: usize, ast: Rc<Vec<Stmt>>) {
        if let Some(object) = self.get_mut(obj) {
            if let Some(verb) = object.verbs.get_mut(index) {
                verb.ast = Some(ast);
            }
        }
    }

    /// Store the compiled form of a verb body; idempotent per verb.
    fn cache_verb_program(
        &mut self,
        obj: Objid,
        index: usize,
        program: Rc<Program>,
    ) {
        if let Some(object) = self.get_mut(obj) {
            if let Some(verb) = object.verbs.get_mut(index) {
                verb.program = Some(program);
            }
        }
    }
}
