//! Verb and property resolution: lookup-root selection (objects, waifs,
//! primitive prototypes), breadth-first inheritance search, `pass`
//! dispatch from the defining object's parents, built-in flag properties,
//! and the permission and coercion rules for property writes.

use std::collections::{HashSet, VecDeque};

use log::trace;

use crate::store::object::{MooObject, Property};
use crate::store::ObjectStore;
use crate::values::error::Error;
use crate::values::{objid, Objid, Var, Waif};
use crate::runtime::exceptions::Exception;

/// A resolved verb call target.
#[derive(Debug, Clone)]
pub struct VerbCall {
    /// The lookup root: the frame's `this`.
    pub this: Objid,
    /// The dispatched-on value when the target was not a plain object.
    pub this_value: Option<Var>,
    pub definer: Objid,
    pub index: usize,
}

pub fn is_wizard(store: &dyn ObjectStore, who: Objid) -> bool {
    store.get(who).is_some_and(|o| o.flags.wizard)
}

pub fn is_programmer(store: &dyn ObjectStore, who: Objid) -> bool {
    store
        .get(who)
        .is_some_and(|o| o.flags.programmer || o.flags.wizard)
}

/// Resolve the lookup root for a verb call target value.
fn verb_root(
    store: &dyn ObjectStore,
    target: &Var,
) -> Result<(Objid, Option<Var>), Exception> {
    match target {
        Var::Obj(o) => {
            if !store.valid(*o) {
                return Err(Exception::new(Error::E_INVIND));
            }
            Ok((*o, None))
        }
        Var::Waif(w) => {
            if !store.valid(w.class()) {
                return Err(Exception::new(Error::E_INVIND));
            }
            Ok((w.class(), Some(target.clone())))
        }
        primitive => {
            let proto = format!("{}_proto", primitive.type_name());
            let root = store
                .get(objid::SYSTEM)
                .and_then(|system| system.get_property(&proto))
                .and_then(|prop| match &prop.value {
                    Var::Obj(o) if store.valid(*o) => Some(*o),
                    _ => None,
                });
            match root {
                Some(root) => Ok((root, Some(primitive.clone()))),
                None => Err(Exception::with_message(
                    Error::E_TYPE,
                    format!("no prototype for {} values", primitive.type_name()),
                )),
            }
        }
    }
}

/// Full verb-call resolution: lookup root, inheritance search, execute
/// permission.
pub fn resolve_verb_call(
    store: &dyn ObjectStore,
    target: &Var,
    name: &str,
) -> Result<VerbCall, Exception> {
    let (root, this_value) = verb_root(store, target)?;
    let (definer, index) = store.find_verb(root, name).ok_or_else(|| {
        Exception::with_message(Error::E_VERBNF, format!("verb {name} not found"))
    })?;
    let verb = &store.get(definer).unwrap().verbs[index];
    if !verb.perms.execute {
        return Err(Exception::new(Error::E_PERM));
    }
    trace!("verb {name} on {target} resolved to {definer}");
    Ok(VerbCall {
        this: root,
        this_value,
        definer,
        index,
    })
}

/// `pass` dispatch: the search starts at the parents of the defining
/// object, not of `this`.
pub fn resolve_pass(
    store: &dyn ObjectStore,
    verb_loc: Objid,
    name: &str,
) -> Result<(Objid, usize), Exception> {
    let parents = store
        .get(verb_loc)
        .map(|o| o.parents.clone())
        .unwrap_or_default();
    for parent in parents {
        if let Some(found) = store.find_verb(parent, name) {
            let verb = &store.get(found.0).unwrap().verbs[found.1];
            if !verb.perms.execute {
                return Err(Exception::new(Error::E_PERM));
            }
            return Ok(found);
        }
    }
    Err(Exception::with_message(
        Error::E_VERBNF,
        format!("no ancestor defines {name}"),
    ))
}

/// Breadth-first, left-to-right property search; the first non-cleared
/// occurrence wins. Returns the holder and a clone of the record.
fn search_property(
    store: &dyn ObjectStore,
    obj: Objid,
    name: &str,
) -> Option<(Objid, Property)> {
    let mut queue = VecDeque::from([obj]);
    let mut visited = HashSet::new();
    while let Some(id) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        let Some(object) = store.get(id) else { continue };
        if let Some(prop) = object.get_property(name) {
            if !prop.clear {
                return Some((id, prop.clone()));
            }
        }
        queue.extend(object.parents.iter().copied());
    }
    None
}

/// Like [`search_property`] but for the slot's definition, ignoring the
/// clear bit; used when creating local overrides and validating waif
/// writes.
fn search_property_definition(
    store: &dyn ObjectStore,
    obj: Objid,
    name: &str,
) -> Option<(Objid, Property)> {
    let mut queue = VecDeque::from([obj]);
    let mut visited = HashSet::new();
    while let Some(id) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        let Some(object) = store.get(id) else { continue };
        if let Some(prop) = object.get_property(name) {
            return Some((id, prop.clone()));
        }
        queue.extend(object.parents.iter().copied());
    }
    None
}

fn check_read(
    store: &dyn ObjectStore,
    programmer: Objid,
    prop: &Property,
) -> Result<(), Exception> {
    if prop.perms.read || programmer == prop.owner || is_wizard(store, programmer)
    {
        Ok(())
    } else {
        Err(Exception::new(Error::E_PERM))
    }
}

fn check_write(
    store: &dyn ObjectStore,
    programmer: Objid,
    prop: &Property,
) -> Result<(), Exception> {
    if prop.perms.write || programmer == prop.owner || is_wizard(store, programmer)
    {
        Ok(())
    } else {
        Err(Exception::new(Error::E_PERM))
    }
}

/// The built-in flag properties, consulted only when no user property is
/// found along the inheritance chain.
fn builtin_property(obj: &MooObject, name: &str) -> Option<Var> {
    let flag = |b: bool| Var::Int(b as i64);
    Some(match name.to_ascii_lowercase().as_str() {
        "name" => Var::str(&obj.name),
        "owner" => Var::Obj(obj.owner),
        "location" => Var::Obj(obj.location),
        "contents" => Var::List(
            obj.contents.iter().map(|&o| Var::Obj(o)).collect(),
        ),
        "parents" => Var::List(
            obj.parents.iter().map(|&o| Var::Obj(o)).collect(),
        ),
        "parent" => Var::Obj(
            obj.parents.first().copied().unwrap_or(objid::NOTHING),
        ),
        "children" => Var::List(
            obj.children.iter().map(|&o| Var::Obj(o)).collect(),
        ),
        "player" => flag(obj.flags.player),
        "wizard" => flag(obj.flags.wizard),
        "programmer" => flag(obj.flags.programmer),
        "r" => flag(obj.flags.read),
        "w" => flag(obj.flags.write),
        "f" => flag(obj.flags.fertile),
        "a" => flag(obj.flags.anonymous),
        _ => return None,
    })
}

fn is_builtin_property(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "name"
            | "owner"
            | "location"
            | "contents"
            | "parents"
            | "parent"
            | "children"
            | "player"
            | "wizard"
            | "programmer"
            | "r"
            | "w"
            | "f"
            | "a"
    )
}

/// Property read on any target value.
pub fn read_property(
    store: &dyn ObjectStore,
    programmer: Objid,
    target: &Var,
    name: &str,
) -> Result<Var, Exception> {
    match target {
        Var::Obj(o) => {
            if !store.valid(*o) {
                return Err(Exception::new(Error::E_INVIND));
            }
            if let Some((_, prop)) = search_property(store, *o, name) {
                check_read(store, programmer, &prop)?;
                return Ok(prop.value);
            }
            builtin_property(store.get(*o).unwrap(), name)
                .ok_or_else(|| property_not_found(name))
        }
        Var::Waif(w) => read_waif_property(store, programmer, w, name),
        _ => Err(Exception::with_message(
            Error::E_TYPE,
            format!("{} values have no properties", target.type_name()),
        )),
    }
}

fn read_waif_property(
    store: &dyn ObjectStore,
    programmer: Objid,
    waif: &Waif,
    name: &str,
) -> Result<Var, Exception> {
    match name.to_ascii_lowercase().as_str() {
        "owner" => return Ok(Var::Obj(waif.owner())),
        "class" => {
            return Ok(Var::Obj(if store.valid(waif.class()) {
                waif.class()
            } else {
                objid::NOTHING
            }));
        }
        _ => {}
    }
    if let Some(value) = waif.get_override(name) {
        return Ok(value.clone());
    }
    if !store.valid(waif.class()) {
        return Err(Exception::new(Error::E_INVIND));
    }
    if let Some((_, prop)) = search_property(store, waif.class(), name) {
        check_read(store, programmer, &prop)?;
        return Ok(prop.value);
    }
    Err(property_not_found(name))
}

fn property_not_found(name: &str) -> Exception {
    Exception::with_message(Error::E_PROPNF, format!("property {name} not found"))
}

fn as_flag(value: &Var) -> Result<bool, Exception> {
    match value {
        Var::Int(i) => Ok(*i != 0),
        Var::Bool(b) => Ok(*b),
        _ => Err(Exception::with_message(
            Error::E_TYPE,
            "flag properties take a boolean int",
        )),
    }
}

/// Property write on a directory object, with the built-in coercion and
/// permission rules.
pub fn write_property(
    store: &mut dyn ObjectStore,
    programmer: Objid,
    player: Objid,
    target: Objid,
    name: &str,
    value: &Var,
) -> Result<(), Exception> {
    if !store.valid(target) {
        return Err(Exception::new(Error::E_INVIND));
    }
    if is_builtin_property(name) {
        return write_builtin_property(
            store, programmer, player, target, name, value,
        );
    }
    let wizard = is_wizard(store, programmer);

    // a local slot, defined or override, updates in place
    if store.get(target).unwrap().get_property(name).is_some() {
        let prop = store
            .get(target)
            .unwrap()
            .get_property(name)
            .cloned()
            .unwrap();
        if !(prop.perms.write || programmer == prop.owner || wizard) {
            return Err(Exception::new(Error::E_PERM));
        }
        let object = store.get_mut(target).unwrap();
        let slot = object.get_property_mut(name).unwrap();
        slot.value = value.clone();
        slot.clear = false;
        return Ok(());
    }

    // inherited only: create a local override carrying the ancestor's
    // owner and permissions
    let Some((_, inherited)) =
        search_property_definition(store, target, name)
    else {
        return Err(property_not_found(name));
    };
    if !(inherited.perms.write || programmer == inherited.owner || wizard) {
        return Err(Exception::new(Error::E_PERM));
    }
    let object = store.get_mut(target).unwrap();
    object.set_property(
        name,
        Property {
            value: value.clone(),
            owner: inherited.owner,
            perms: inherited.perms,
            clear: false,
            defined: false,
        },
    );
    Ok(())
}

fn write_builtin_property(
    store: &mut dyn ObjectStore,
    programmer: Objid,
    player: Objid,
    target: Objid,
    name: &str,
    value: &Var,
) -> Result<(), Exception> {
    let wizard = is_wizard(store, programmer);
    let anonymous = store.get(target).unwrap().flags.anonymous;
    let owns = programmer == store.get(target).unwrap().owner;
    // the player may flip `a`/`f` on their own player object
    let own_player_object = {
        let obj = store.get(target).unwrap();
        obj.flags.player && target == player
    };
    match name.to_ascii_lowercase().as_str() {
        "name" => {
            let Var::Str(s) = value else {
                return Err(Exception::with_message(
                    Error::E_TYPE,
                    "name must be a string",
                ));
            };
            if !(owns || wizard) {
                return Err(Exception::new(Error::E_PERM));
            }
            store.get_mut(target).unwrap().name = s.to_string();
            Ok(())
        }
        "owner" => {
            let Var::Obj(o) = value else {
                return Err(Exception::with_message(
                    Error::E_TYPE,
                    "owner must be an object",
                ));
            };
            if !wizard {
                return Err(Exception::new(Error::E_PERM));
            }
            store.get_mut(target).unwrap().owner = *o;
            Ok(())
        }
        "location" => {
            let Var::Obj(o) = value else {
                return Err(Exception::with_message(
                    Error::E_TYPE,
                    "location must be an object",
                ));
            };
            if !wizard {
                return Err(Exception::new(Error::E_PERM));
            }
            store.get_mut(target).unwrap().location = *o;
            Ok(())
        }
        "r" | "w" => {
            let flag = as_flag(value)?;
            if !(owns || wizard) {
                return Err(Exception::new(Error::E_PERM));
            }
            let object = store.get_mut(target).unwrap();
            if name.eq_ignore_ascii_case("r") {
                object.flags.read = flag;
            } else {
                object.flags.write = flag;
            }
            Ok(())
        }
        "f" | "a" => {
            let flag = as_flag(value)?;
            if !(wizard || own_player_object) {
                return Err(Exception::new(Error::E_PERM));
            }
            let object = store.get_mut(target).unwrap();
            if name.eq_ignore_ascii_case("f") {
                object.flags.fertile = flag;
            } else {
                object.flags.anonymous = flag;
            }
            Ok(())
        }
        "player" => {
            let flag = as_flag(value)?;
            if !wizard {
                return Err(Exception::new(Error::E_PERM));
            }
            store.get_mut(target).unwrap().flags.player = flag;
            Ok(())
        }
        "programmer" | "wizard" => {
            let flag = as_flag(value)?;
            if anonymous {
                // unchangeable on anonymous objects
                return Err(Exception::new(if wizard {
                    Error::E_INVARG
                } else {
                    Error::E_PERM
                }));
            }
            if !wizard {
                return Err(Exception::new(Error::E_PERM));
            }
            let object = store.get_mut(target).unwrap();
            if name.eq_ignore_ascii_case("programmer") {
                object.flags.programmer = flag;
            } else {
                object.flags.wizard = flag;
            }
            Ok(())
        }
        // graph edges are maintained by the host, never assigned
        "contents" | "parents" | "parent" | "children" => {
            Err(Exception::new(Error::E_PERM))
        }
        _ => unreachable!("not a builtin property"),
    }
}

/// Property write on a waif: validates against the class chain and yields
/// the new waif for the caller to store back.
pub fn write_waif_property(
    store: &dyn ObjectStore,
    programmer: Objid,
    waif: &Waif,
    name: &str,
    value: &Var,
) -> Result<Waif, Exception> {
    if matches!(
        name.to_ascii_lowercase().as_str(),
        "owner" | "class"
    ) {
        return Err(Exception::new(Error::E_PERM));
    }
    if !store.valid(waif.class()) {
        return Err(Exception::new(Error::E_INVIND));
    }
    let Some((_, prop)) =
        search_property_definition(store, waif.class(), name)
    else {
        return Err(property_not_found(name));
    };
    check_write(store, programmer, &prop)?;
    Ok(waif.with_property(name, value.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::object::{Property, Verb};
    use crate::store::MemStore;

    fn wizardly(store: &mut MemStore, id: i64) -> Objid {
        let o = store.create(id, &[]);
        store.get_mut(o).unwrap().flags.wizard = true;
        o
    }

    #[test]
    fn primitive_dispatch_goes_through_prototypes() {
        let mut store = MemStore::new();
        let system = store.create(0, &[]);
        let proto = store.create(10, &[]);
        store
            .get_mut(proto)
            .unwrap()
            .verbs
            .push(Verb::new("reverse", proto, vec!["return 1;".into()]));
        store.get_mut(system).unwrap().set_property(
            "str_proto",
            Property::new(Var::Obj(proto), system),
        );
        let call =
            resolve_verb_call(&store, &Var::str("abc"), "reverse").unwrap();
        assert_eq!(call.this, proto);
        assert_eq!(call.definer, proto);
        assert_eq!(call.this_value, Some(Var::str("abc")));

        // no prototype property: a type error
        let err =
            resolve_verb_call(&store, &Var::Int(1), "reverse").unwrap_err();
        assert_eq!(err.code, Error::E_TYPE);
    }

    #[test]
    fn clear_properties_read_through() {
        let mut store = MemStore::new();
        let parent = store.create(1, &[]);
        let child = store.create(2, &[parent]);
        store.get_mut(parent).unwrap().set_property(
            "color",
            Property::new(Var::str("blue"), parent),
        );
        let mut cleared = Property::new(Var::str("stale"), child);
        cleared.clear = true;
        cleared.defined = false;
        store.get_mut(child).unwrap().set_property("color", cleared);
        let value = read_property(
            &store,
            parent,
            &Var::Obj(child),
            "color",
        )
        .unwrap();
        assert_eq!(value, Var::str("blue"));
    }

    #[test]
    fn user_properties_shadow_builtins() {
        let mut store = MemStore::new();
        let o = store.create(1, &[]);
        store.get_mut(o).unwrap().name = "thing".into();
        assert_eq!(
            read_property(&store, o, &Var::Obj(o), "name").unwrap(),
            Var::str("thing")
        );
        store
            .get_mut(o)
            .unwrap()
            .set_property("name", Property::new(Var::Int(7), o));
        assert_eq!(
            read_property(&store, o, &Var::Obj(o), "name").unwrap(),
            Var::Int(7)
        );
    }

    #[test]
    fn write_creates_local_override() {
        let mut store = MemStore::new();
        let wizard = wizardly(&mut store, 1);
        let parent = store.create(2, &[]);
        let child = store.create(3, &[parent]);
        store.get_mut(parent).unwrap().set_property(
            "color",
            Property::new(Var::str("blue"), parent),
        );
        write_property(
            &mut store,
            wizard,
            wizard,
            child,
            "color",
            &Var::str("red"),
        )
        .unwrap();
        let local = store.get(child).unwrap().get_property("color").unwrap();
        assert!(!local.defined);
        assert!(!local.clear);
        assert_eq!(local.value, Var::str("red"));
        assert_eq!(local.owner, parent);
        // the parent slot is untouched
        assert_eq!(
            store.get(parent).unwrap().get_property("color").unwrap().value,
            Var::str("blue")
        );
    }

    #[test]
    fn flag_coercions() {
        let mut store = MemStore::new();
        let wizard = wizardly(&mut store, 1);
        let o = store.create(2, &[]);
        write_property(&mut store, wizard, wizard, o, "name", &Var::Int(1))
            .map(|_| ())
            .unwrap_err();
        write_property(&mut store, wizard, wizard, o, "r", &Var::Int(1))
            .unwrap();
        assert!(store.get(o).unwrap().flags.read);
        write_property(&mut store, wizard, wizard, o, "wizard", &Var::Int(1))
            .unwrap();
        assert!(store.get(o).unwrap().flags.wizard);
    }

    #[test]
    fn anonymous_flag_rules() {
        let mut store = MemStore::new();
        let wizard = wizardly(&mut store, 1);
        let plain = store.create(2, &[]);
        let anon = store.create_anonymous(&[], plain);
        let err = write_property(
            &mut store,
            wizard,
            wizard,
            anon,
            "wizard",
            &Var::Int(1),
        )
        .unwrap_err();
        assert_eq!(err.code, Error::E_INVARG);
        let err = write_property(
            &mut store,
            plain,
            plain,
            anon,
            "programmer",
            &Var::Int(1),
        )
        .unwrap_err();
        assert_eq!(err.code, Error::E_PERM);
    }

    #[test]
    fn waif_intrinsics_and_overrides() {
        let mut store = MemStore::new();
        let class = store.create(5, &[]);
        let owner = store.create(6, &[]);
        store.get_mut(class).unwrap().set_property(
            "hp",
            Property::new(Var::Int(10), class),
        );
        let waif = Waif::new(class, owner);
        assert_eq!(
            read_property(&store, owner, &Var::Waif(waif.clone()), "class")
                .unwrap(),
            Var::Obj(class)
        );
        assert_eq!(
            read_property(&store, owner, &Var::Waif(waif.clone()), "hp")
                .unwrap(),
            Var::Int(10)
        );
        let written = write_waif_property(
            &store,
            class,
            &waif,
            "hp",
            &Var::Int(3),
        )
        .unwrap();
        assert_eq!(
            read_property(&store, owner, &Var::Waif(written), "hp").unwrap(),
            Var::Int(3)
        );
        let err = write_waif_property(&store, class, &waif, "class", &Var::Int(1))
            .unwrap_err();
        assert_eq!(err.code, Error::E_PERM);
    }
}
