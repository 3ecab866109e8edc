use std::rc::Rc;

use indexmap::IndexMap;

use crate::values::objid::Objid;
use crate::values::var::Var;

/// A lightweight instance of a class object: intrinsic class and owner
/// plus sparse property overrides. Waifs are immutable; a property write
/// yields a new waif that the holder must store back.
#[derive(Debug, Clone)]
pub struct Waif(Rc<WaifBody>);

#[derive(Debug)]
struct WaifBody {
    class: Objid,
    owner: Objid,
    overrides: IndexMap<String, Var>,
}

impl Waif {
    pub fn new(class: Objid, owner: Objid) -> Waif {
        Waif(Rc::new(WaifBody {
            class,
            owner,
            overrides: IndexMap::new(),
        }))
    }

    pub fn class(&self) -> Objid {
        self.0.class
    }

    pub fn owner(&self) -> Objid {
        self.0.owner
    }

    /// Override lookup, case-insensitive like every property table.
    pub fn get_override(&self, name: &str) -> Option<&Var> {
        self.0.overrides.get(&name.to_ascii_lowercase())
    }

    pub fn overrides(&self) -> impl Iterator<Item = (&str, &Var)> {
        self.0.overrides.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns a new waif with the override set.
    pub fn with_property(&self, name: &str, value: Var) -> Waif {
        let mut overrides = self.0.overrides.clone();
        overrides.insert(name.to_ascii_lowercase(), value);
        Waif(Rc::new(WaifBody {
            class: self.0.class,
            owner: self.0.owner,
            overrides,
        }))
    }

    pub fn identical(&self, other: &Waif) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_produce_new_waifs() {
        let w = Waif::new(Objid::new(10), Objid::new(2));
        let w2 = w.with_property("Color", Var::str("red"));
        assert!(w.get_override("color").is_none());
        assert_eq!(w2.get_override("COLOR"), Some(&Var::str("red")));
        assert!(!w.identical(&w2));
    }
}
