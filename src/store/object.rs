use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::Stmt;
use crate::compiler::Program;
use crate::values::{objid, Objid, Var};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjFlags {
    pub player: bool,
    pub programmer: bool,
    pub wizard: bool,
    pub read: bool,
    pub write: bool,
    pub fertile: bool,
    pub anonymous: bool,
    pub invalid: bool,
    pub recycled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropPerms {
    pub read: bool,
    pub write: bool,
    pub chown: bool,
}

impl Default for PropPerms {
    fn default() -> Self {
        PropPerms {
            read: true,
            write: false,
            chown: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Property {
    pub value: Var,
    pub owner: Objid,
    pub perms: PropPerms,
    /// A clear property reads through to the ancestor's value.
    pub clear: bool,
    /// Defined here, as opposed to a local override of an inherited slot.
    pub defined: bool,
}

impl Property {
    pub fn new(value: Var, owner: Objid) -> Property {
        Property {
            value,
            owner,
            perms: PropPerms::default(),
            clear: false,
            defined: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerbPerms {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Default for VerbPerms {
    fn default() -> Self {
        VerbPerms {
            read: true,
            write: false,
            execute: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArgSpec {
    #[default]
    None,
    Any,
    This,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PrepSpec {
    #[default]
    None,
    Any,
    Other(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerbArgs {
    pub dobj: ArgSpec,
    pub prep: PrepSpec,
    pub iobj: ArgSpec,
}

/// A verb record: name aliases, permissions, source, and the cached
/// parse/compile artifacts (each filled at most once, then reused).
#[derive(Debug, Clone)]
pub struct Verb {
    pub names: Vec<String>,
    pub owner: Objid,
    pub perms: VerbPerms,
    pub args: VerbArgs,
    pub code: Vec<String>,
    pub ast: Option<Rc<Vec<Stmt>>>,
    pub program: Option<Rc<Program>>,
}

impl Verb {
    pub fn new(names: &str, owner: Objid, code: Vec<String>) -> Verb {
        Verb {
            names: names.split_whitespace().map(str::to_string).collect(),
            owner,
            perms: VerbPerms::default(),
            args: VerbArgs::default(),
            code,
            ast: None,
            program: None,
        }
    }

    pub fn name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or("")
    }

    /// Case-insensitive alias match with the `*` wildcard rule: the part
    /// before `*` is required, the part after may be truncated anywhere.
    pub fn matches(&self, name: &str) -> bool {
        self.names.iter().any(|alias| verb_match(alias, name))
    }
}

fn verb_match(pattern: &str, word: &str) -> bool {
    match pattern.find('*') {
        None => pattern.eq_ignore_ascii_case(word),
        Some(star) => {
            if pattern.len() == 1 {
                return true;
            }
            let prefix = &pattern[..star];
            let rest = &pattern[star + 1..];
            if word.len() < prefix.len() {
                return false;
            }
            let (head, tail) = word.split_at(prefix.len());
            head.eq_ignore_ascii_case(prefix)
                && tail.len() <= rest.len()
                && rest[..tail.len()].eq_ignore_ascii_case(tail)
        }
    }
}

/// A directory object: identity, flags, graph edges, and the property and
/// verb tables. Property names are stored lowercased; lookups are
/// case-insensitive.
#[derive(Debug, Clone)]
pub struct MooObject {
    pub id: Objid,
    pub name: String,
    pub owner: Objid,
    pub location: Objid,
    pub contents: Vec<Objid>,
    pub parents: Vec<Objid>,
    pub children: Vec<Objid>,
    pub flags: ObjFlags,
    pub properties: IndexMap<String, Property>,
    pub verbs: Vec<Verb>,
}

impl MooObject {
    pub fn new(id: Objid) -> MooObject {
        MooObject {
            id,
            name: String::new(),
            owner: objid::NOTHING,
            location: objid::NOTHING,
            contents: Vec::new(),
            parents: Vec::new(),
            children: Vec::new(),
            flags: ObjFlags::default(),
            properties: IndexMap::new(),
            verbs: Vec::new(),
        }
    }

    pub fn get_property(&self, name: &str) -> Option<&Property> {
        self.properties.get(&name.to_ascii_lowercase())
    }

    pub fn get_property_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.properties.get_mut(&name.to_ascii_lowercase())
    }

    pub fn set_property(&mut self, name: &str, property: Property) {
        self.properties
            .insert(name.to_ascii_lowercase(), property);
    }

    /// First verb whose alias set matches, in definition order.
    pub fn find_verb_local(&self, name: &str) -> Option<usize> {
        self.verbs.iter().position(|verb| verb.matches(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verb_wildcard_matching() {
        let verb = Verb::new("foo*bar l*", objid::NOTHING, Vec::new());
        assert!(verb.matches("foo"));
        assert!(verb.matches("foob"));
        assert!(verb.matches("FOOBAR"));
        assert!(!verb.matches("fo"));
        assert!(!verb.matches("foobarx"));
        assert!(verb.matches("l"));
        assert!(verb.matches("look"));
    }

    #[test]
    fn star_alone_matches_everything() {
        let verb = Verb::new("*", objid::NOTHING, Vec::new());
        assert!(verb.matches("anything"));
    }

    #[test]
    fn property_names_are_case_insensitive() {
        let mut obj = MooObject::new(Objid::new(1));
        obj.set_property("Color", Property::new(Var::str("red"), obj.id));
        assert!(obj.get_property("COLOR").is_some());
    }
}
