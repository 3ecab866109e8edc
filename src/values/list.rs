use std::rc::Rc;

use crate::values::var::Var;

/// An ordered, 1-indexed sequence of values. The body is shared; every
/// update clones the body when it is shared and returns a new list.
#[derive(Debug, Clone, Default)]
pub struct List(Rc<Vec<Var>>);

impl List {
    pub fn new() -> List {
        List::default()
    }

    pub fn from_vec(values: Vec<Var>) -> List {
        List(Rc::new(values))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 1-based element access.
    pub fn get(&self, index: i64) -> Option<&Var> {
        if index < 1 {
            return None;
        }
        self.0.get(index as usize - 1)
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Var> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Var] {
        &self.0
    }

    /// 1-based element replacement; None when out of range.
    pub fn set(&self, index: i64, value: Var) -> Option<List> {
        if index < 1 || index as usize > self.0.len() {
            return None;
        }
        let mut list = self.clone();
        Rc::make_mut(&mut list.0)[index as usize - 1] = value;
        Some(list)
    }

    pub fn push(&self, value: Var) -> List {
        let mut list = self.clone();
        Rc::make_mut(&mut list.0).push(value);
        list
    }

    pub fn concat(&self, other: &List) -> List {
        let mut list = self.clone();
        Rc::make_mut(&mut list.0).extend(other.0.iter().cloned());
        list
    }

    /// Inclusive 1-based slice. `from > to` yields the empty list; the
    /// caller validates bounds otherwise.
    pub fn slice(&self, from: i64, to: i64) -> List {
        if from > to {
            return List::new();
        }
        List::from_vec(self.0[from as usize - 1..to as usize].to_vec())
    }

    /// Total range rewrite: `self[1..from-1] + replacement + self[to+1..]`.
    pub fn splice_range(&self, from: i64, to: i64, replacement: &List) -> List {
        let len = self.0.len() as i64;
        let mut out =
            Vec::with_capacity(replacement.len() + self.0.len());
        out.extend(self.0[..(from - 1).clamp(0, len) as usize].iter().cloned());
        out.extend(replacement.0.iter().cloned());
        if to < len {
            out.extend(self.0[to.max(0) as usize..].iter().cloned());
        }
        List::from_vec(out)
    }

    /// 1-based index of the first equal element, or 0.
    pub fn index_of(&self, value: &Var) -> i64 {
        self.0
            .iter()
            .position(|v| v.equals(value))
            .map(|p| p as i64 + 1)
            .unwrap_or(0)
    }

    pub fn equals(&self, other: &List) -> bool {
        self.0.len() == other.0.len()
            && self.0.iter().zip(other.0.iter()).all(|(a, b)| a.equals(b))
    }

    pub fn identical(&self, other: &List) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl FromIterator<Var> for List {
    fn from_iter<T: IntoIterator<Item = Var>>(iter: T) -> Self {
        List::from_vec(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> List {
        values.iter().map(|&i| Var::Int(i)).collect()
    }

    #[test]
    fn one_based_access() {
        let l = ints(&[10, 20, 30]);
        assert_eq!(l.get(1), Some(&Var::Int(10)));
        assert_eq!(l.get(3), Some(&Var::Int(30)));
        assert_eq!(l.get(0), None);
        assert_eq!(l.get(4), None);
    }

    #[test]
    fn set_preserves_original() {
        let l = ints(&[1, 2, 3]);
        let l2 = l.set(2, Var::Int(99)).unwrap();
        assert_eq!(l.get(2), Some(&Var::Int(2)));
        assert_eq!(l2.get(2), Some(&Var::Int(99)));
        assert!(l.set(4, Var::Int(0)).is_none());
    }

    #[test]
    fn set_to_same_value_stays_equal() {
        let l = ints(&[1, 2, 3]);
        let same = l.set(2, l.get(2).unwrap().clone()).unwrap();
        assert!(l.equals(&same));
    }

    #[test]
    fn slice_lengths() {
        let l = ints(&[1, 2, 3, 4, 5]);
        for a in 1..=5i64 {
            for b in a..=5i64 {
                assert_eq!(l.slice(a, b).len() as i64, b - a + 1);
            }
        }
        assert!(l.slice(4, 2).is_empty());
    }

    #[test]
    fn splice_range_rewrites() {
        let l = ints(&[1, 2, 3]);
        let out = l.splice_range(2, 2, &ints(&[20, 21]));
        assert!(out.equals(&ints(&[1, 20, 21, 3])));
        // inverted form duplicates the overlap
        let dup = l.splice_range(2, 0, &ints(&[]));
        assert!(dup.equals(&ints(&[1, 1, 2, 3])));
    }

    #[test]
    fn membership() {
        let l = ints(&[5, 6, 5]);
        assert_eq!(l.index_of(&Var::Int(5)), 1);
        assert_eq!(l.index_of(&Var::Int(7)), 0);
    }
}
