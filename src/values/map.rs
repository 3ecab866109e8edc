use core::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexMap;
use ordered_float::OrderedFloat;

use crate::values::var::Var;

/// Map key wrapper giving `Var` the hash/equality contract map bodies
/// need: strings hash case-insensitively, floats through their bit order,
/// and BOOL through its integer image so it collides with INT 0/1 exactly
/// where `Var::equals` bridges them.
#[derive(Debug, Clone)]
pub struct MapKey(pub Var);

impl PartialEq for MapKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.equals(&other.0)
    }
}

impl Eq for MapKey {}

impl Hash for MapKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Var::Int(i) => {
                state.write_u8(0);
                i.hash(state);
            }
            Var::Bool(b) => {
                state.write_u8(0);
                (*b as i64).hash(state);
            }
            Var::Obj(o) => {
                state.write_u8(1);
                o.hash(state);
            }
            Var::Float(f) => {
                state.write_u8(2);
                OrderedFloat(*f).hash(state);
            }
            Var::Err(e) => {
                state.write_u8(3);
                (*e as u8).hash(state);
            }
            Var::Str(s) => {
                state.write_u8(4);
                for b in s.bytes() {
                    state.write_u8(b.to_ascii_lowercase());
                }
            }
            // invalid key kinds are rejected before insertion; hash by
            // type tag so the impl stays total
            other => state.write_u8(5 + other.type_code() as u8),
        }
    }
}

/// An insertion-ordered mapping from scalar keys to values. Lookup is by
/// value equality; iteration and positional addressing use the canonical
/// sort. Bodies are shared and rebuilt copy-on-write.
#[derive(Debug, Clone, Default)]
pub struct Map(Rc<IndexMap<MapKey, Var>>);

impl Map {
    pub fn new() -> Map {
        Map::default()
    }

    /// Builds from pairs; a repeated key keeps its first position and the
    /// most recent value.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Var, Var)>) -> Map {
        let mut body = IndexMap::new();
        for (k, v) in pairs {
            body.insert(MapKey(k), v);
        }
        Map(Rc::new(body))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &Var) -> Option<&Var> {
        self.0.get(&MapKey(key.clone()))
    }

    pub fn contains_key(&self, key: &Var) -> bool {
        self.0.contains_key(&MapKey(key.clone()))
    }

    /// Insertion order iteration.
    pub fn iter(&self) -> impl Iterator<Item = (&Var, &Var)> {
        self.0.iter().map(|(k, v)| (&k.0, v))
    }

    pub fn insert(&self, key: Var, value: Var) -> Map {
        let mut map = self.clone();
        Rc::make_mut(&mut map.0).insert(MapKey(key), value);
        map
    }

    pub fn remove(&self, key: &Var) -> Map {
        let mut map = self.clone();
        Rc::make_mut(&mut map.0).shift_remove(&MapKey(key.clone()));
        map
    }

    /// Pairs in canonical key order.
    pub fn sorted_pairs(&self) -> Vec<(Var, Var)> {
        let mut pairs: Vec<(Var, Var)> = self
            .0
            .iter()
            .map(|(k, v)| (k.0.clone(), v.clone()))
            .collect();
        pairs.sort_by(|(a, _), (b, _)| a.canonical_cmp(b));
        pairs
    }

    /// 1-based position of a key under the canonical sort.
    pub fn position_of_key(&self, key: &Var) -> Option<i64> {
        self.sorted_pairs()
            .iter()
            .position(|(k, _)| k.equals(key))
            .map(|p| p as i64 + 1)
    }

    /// 1-based position of the first pair (canonical order) whose value
    /// equals `value`, or 0.
    pub fn position_of_value(&self, value: &Var) -> i64 {
        self.sorted_pairs()
            .iter()
            .position(|(_, v)| v.equals(value))
            .map(|p| p as i64 + 1)
            .unwrap_or(0)
    }

    pub fn first_key(&self) -> Option<Var> {
        self.sorted_pairs().first().map(|(k, _)| k.clone())
    }

    pub fn last_key(&self) -> Option<Var> {
        self.sorted_pairs().last().map(|(k, _)| k.clone())
    }

    /// Inclusive 1-based positional slice under the canonical sort.
    /// `from > to` yields the empty map.
    pub fn slice_positions(&self, from: i64, to: i64) -> Map {
        if from > to {
            return Map::new();
        }
        Map::from_pairs(
            self.sorted_pairs()
                .into_iter()
                .skip(from as usize - 1)
                .take((to - from + 1) as usize),
        )
    }

    /// Total positional rewrite under the canonical sort:
    /// pairs `1..from-1`, then the replacement pairs, then `to+1..len`.
    pub fn splice_positions(
        &self,
        from: i64,
        to: i64,
        replacement: &Map,
    ) -> Map {
        let sorted = self.sorted_pairs();
        let len = sorted.len() as i64;
        let mut out: Vec<(Var, Var)> = Vec::new();
        out.extend(
            sorted[..(from - 1).clamp(0, len) as usize].iter().cloned(),
        );
        out.extend(replacement.sorted_pairs());
        if to < len {
            out.extend(sorted[to.max(0) as usize..].iter().cloned());
        }
        Map::from_pairs(out)
    }

    /// Structural equality: same pairs under the canonical sort,
    /// regardless of insertion history.
    pub fn equals(&self, other: &Map) -> bool {
        if self.0.len() != other.0.len() {
            return false;
        }
        self.sorted_pairs()
            .iter()
            .zip(other.sorted_pairs().iter())
            .all(|((ka, va), (kb, vb))| ka.equals(kb) && va.equals(vb))
    }

    pub fn identical(&self, other: &Map) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
