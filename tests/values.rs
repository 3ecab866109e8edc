//! Value-model invariants: canonical form round-trips, copy-on-write
//! identity, slice lengths, canonical map order stability.

use moo_core::{parse_literal, Error, List, Map, Objid, Var};

fn sample_scalars() -> Vec<Var> {
    vec![
        Var::Int(0),
        Var::Int(-1),
        Var::Int(i64::MAX),
        Var::Int(i64::MIN),
        Var::Float(0.5),
        Var::Float(-2.25e10),
        Var::Float(1.0),
        Var::Bool(true),
        Var::Bool(false),
        Var::str(""),
        Var::str("hello"),
        Var::str("with \"quotes\" and \\slashes\\"),
        Var::Obj(Objid::new(0)),
        Var::Obj(Objid::new(-1)),
        Var::Obj(Objid::new(90009)),
        Var::Err(Error::E_TYPE),
        Var::Err(Error::E_QUOTA),
    ]
}

#[test]
fn canonical_form_round_trips() {
    for value in sample_scalars() {
        let literal = value.to_literal();
        let back = parse_literal(&literal)
            .unwrap_or_else(|e| panic!("{literal}: {e}"));
        assert_eq!(back, value, "round-trip of {literal}");
        // and the bool/int bridge does not blur the round-trip kinds
        assert_eq!(back.type_code(), value.type_code());
    }
}

#[test]
fn copy_on_write_respects_content_identity() {
    let list: List = (1..=5).map(Var::Int).collect();
    for i in 1..=5 {
        let same = list.set(i, list.get(i).unwrap().clone()).unwrap();
        assert!(list.equals(&same));
    }
}

#[test]
fn slices_have_exact_lengths() {
    let list: List = (1..=8).map(Var::Int).collect();
    for a in 1..=8i64 {
        for b in a..=8i64 {
            assert_eq!(list.slice(a, b).len() as i64, b - a + 1);
        }
    }
}

#[test]
fn map_insert_then_remove_is_stable() {
    let map = Map::from_pairs(vec![
        (Var::str("m"), Var::Int(1)),
        (Var::Int(5), Var::Int(2)),
        (Var::Float(2.5), Var::Int(3)),
    ]);
    let key = Var::str("zebra");
    let touched = map.insert(key.clone(), Var::Int(9));
    assert!(!map.equals(&touched));
    let back = touched.remove(&key);
    assert!(map.equals(&back));
    // canonical order is unchanged by the round trip
    let before: Vec<Var> =
        map.sorted_pairs().into_iter().map(|(k, _)| k).collect();
    let after: Vec<Var> =
        back.sorted_pairs().into_iter().map(|(k, _)| k).collect();
    assert_eq!(before, after);
}

#[test]
fn shared_bodies_stay_untouched_through_updates() {
    let original: List = (1..=3).map(Var::Int).collect();
    let alias = original.clone();
    let changed = alias.set(1, Var::Int(99)).unwrap();
    assert_eq!(original.get(1), Some(&Var::Int(1)));
    assert_eq!(changed.get(1), Some(&Var::Int(99)));
    assert!(original.identical(&alias));
    assert!(!original.identical(&changed));
}

#[test]
fn nan_and_infinity_have_no_round_trip_contract() {
    // only finite floats have a well-defined canonical form
    assert!(parse_literal(&Var::Float(f64::NAN).to_literal()).is_err());
    assert!(
        parse_literal(&Var::Float(f64::INFINITY).to_literal()).is_err()
    );
}
