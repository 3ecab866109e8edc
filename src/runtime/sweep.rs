//! Orphan-anonymous reclamation: mark anonymous ids reachable from the
//! property graphs of directory objects, walk reachable anonymous objects
//! transitively, and recycle the rest in ascending id order.

use std::collections::HashSet;

use log::debug;

use crate::store::ObjectStore;
use crate::values::{Objid, Var};

fn trace_value(value: &Var, out: &mut Vec<i64>) {
    match value {
        Var::Obj(o) if o.anonymous => out.push(o.id),
        Var::List(list) => {
            for v in list.iter() {
                trace_value(v, out);
            }
        }
        Var::Map(map) => {
            for (k, v) in map.iter() {
                trace_value(k, out);
                trace_value(v, out);
            }
        }
        Var::Waif(waif) => {
            for (_, v) in waif.overrides() {
                trace_value(v, out);
            }
        }
        _ => {}
    }
}

fn trace_object(store: &dyn ObjectStore, id: Objid, out: &mut Vec<i64>) {
    if let Some(object) = store.get(id) {
        for prop in object.properties.values() {
            trace_value(&prop.value, out);
        }
    }
}

/// Sweep unreferenced anonymous objects. With `min_id`, only ids at or
/// above the threshold are candidates, so a per-task sweep never disturbs
/// pre-existing state. Returns the recycled ids, ascending.
pub fn sweep_orphan_anonymous(
    store: &mut dyn ObjectStore,
    min_id: Option<i64>,
) -> Vec<Objid> {
    // mark phase: roots are the properties of every live directory object
    let mut marked: HashSet<i64> = HashSet::new();
    let mut worklist: Vec<i64> = Vec::new();
    for id in store.all() {
        let Some(object) = store.get(id) else { continue };
        if object.flags.invalid || object.flags.recycled {
            continue;
        }
        trace_object(store, id, &mut worklist);
    }
    // transitive closure through anonymous objects' own properties
    while let Some(id) = worklist.pop() {
        if marked.insert(id) {
            trace_object(store, Objid::new_anonymous(id), &mut worklist);
        }
    }

    let mut candidates = store.get_anonymous_objects();
    candidates.sort_by_key(|o| o.id);
    let mut recycled = Vec::new();
    for id in candidates {
        if min_id.is_some_and(|min| id.id < min) {
            continue;
        }
        if marked.contains(&id.id) {
            continue;
        }
        if store.get(id).is_some_and(|o| o.flags.player) {
            continue;
        }
        debug!("recycling orphan anonymous object {}", id.id);
        store.recycle(id);
        recycled.push(id);
    }
    recycled
}
