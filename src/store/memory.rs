use indexmap::IndexMap;

use crate::store::object::MooObject;
use crate::store::ObjectStore;
use crate::values::Objid;

/// In-memory object store: the reference implementation backing tests and
/// `eval`, with parent/child edge maintenance and anonymous id allocation.
#[derive(Debug, Default)]
pub struct MemStore {
    objects: IndexMap<i64, MooObject>,
    anonymous: IndexMap<i64, MooObject>,
    next_anonymous: i64,
}

impl MemStore {
    pub fn new() -> MemStore {
        MemStore::default()
    }

    /// Create a directory object with the given id and parents, wiring
    /// the children edges.
    pub fn create(&mut self, id: i64, parents: &[Objid]) -> Objid {
        let oid = Objid::new(id);
        let mut object = MooObject::new(oid);
        object.parents = parents.to_vec();
        object.owner = oid;
        self.objects.insert(id, object);
        for parent in parents {
            if let Some(parent) = self.get_mut(*parent) {
                parent.children.push(oid);
            }
        }
        oid
    }

    /// Create an anonymous object; it has no directory entry and is
    /// reclaimed by the orphan sweep once unreferenced.
    pub fn create_anonymous(&mut self, parents: &[Objid], owner: Objid) -> Objid {
        let id = self.next_anonymous;
        self.next_anonymous += 1;
        let oid = Objid::new_anonymous(id);
        let mut object = MooObject::new(oid);
        object.parents = parents.to_vec();
        object.owner = owner;
        object.flags.anonymous = true;
        self.anonymous.insert(id, object);
        oid
    }

    /// The id the next anonymous object will get; the per-task sweep
    /// threshold.
    pub fn anonymous_watermark(&self) -> i64 {
        self.next_anonymous
    }
}

impl ObjectStore for MemStore {
    fn get(&self, id: Objid) -> Option<&MooObject> {
        if id.anonymous {
            self.anonymous.get(&id.id)
        } else {
            self.objects.get(&id.id)
        }
    }

    fn get_mut(&mut self, id: Objid) -> Option<&mut MooObject> {
        if id.anonymous {
            self.anonymous.get_mut(&id.id)
        } else {
            self.objects.get_mut(&id.id)
        }
    }

    fn all(&self) -> Vec<Objid> {
        self.objects.keys().map(|&id| Objid::new(id)).collect()
    }

    fn get_anonymous_objects(&self) -> Vec<Objid> {
        self.anonymous
            .keys()
            .map(|&id| Objid::new_anonymous(id))
            .collect()
    }

    fn recycle(&mut self, id: Objid) {
        let removed = if id.anonymous {
            self.anonymous.shift_remove(&id.id)
        } else {
            self.objects.shift_remove(&id.id)
        };
        if let Some(removed) = removed {
            for parent in removed.parents {
                if let Some(parent) = self.get_mut(parent) {
                    parent.children.retain(|&c| c != id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::object::Verb;

    #[test]
    fn child_edges_are_maintained() {
        let mut store = MemStore::new();
        let root = store.create(1, &[]);
        let child = store.create(2, &[root]);
        assert_eq!(store.get(root).unwrap().children, vec![child]);
        store.recycle(child);
        assert!(store.get(root).unwrap().children.is_empty());
    }

    #[test]
    fn bfs_verb_search_is_left_to_right() {
        let mut store = MemStore::new();
        let b = store.create(2, &[]);
        let c = store.create(3, &[]);
        let d = store.create(4, &[]);
        store.get_mut(b).unwrap().parents = vec![d];
        store.get_mut(c).unwrap().parents = vec![d];
        let a = store.create(1, &[b, c]);
        store
            .get_mut(b)
            .unwrap()
            .verbs
            .push(Verb::new("v", b, vec!["return 2;".into()]));
        store
            .get_mut(d)
            .unwrap()
            .verbs
            .push(Verb::new("v", d, vec!["return 4;".into()]));
        // the diamond resolves to the left parent before the shared root
        assert_eq!(store.find_verb(a, "v"), Some((b, 0)));
    }

    #[test]
    fn anonymous_objects_have_no_directory_entry() {
        let mut store = MemStore::new();
        let owner = store.create(1, &[]);
        let anon = store.create_anonymous(&[], owner);
        assert!(anon.anonymous);
        assert!(store.get(anon).is_some());
        assert!(!store.all().contains(&anon));
        assert_eq!(store.get_anonymous_objects(), vec![anon]);
    }
}
