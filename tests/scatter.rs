//! Scatter assignment: required/optional/rest binding, defaults, the
//! left-to-right surplus rule, and shape validation.

mod common;

use common::{ints, World};
use moo_core::{Error, List, Var};

#[test]
fn plain_required_targets() {
    let mut world = World::new();
    assert_eq!(
        world.value("{a, b} = {1, 2}; return {b, a};"),
        ints(&[2, 1])
    );
}

#[test]
fn optionals_fill_left_to_right() {
    let mut world = World::new();
    assert_eq!(
        world.value("{?a = 9, b} = {1, 2}; return {a, b};"),
        ints(&[1, 2])
    );
    assert_eq!(
        world.value("{?a = 9, b} = {5}; return {a, b};"),
        ints(&[9, 5])
    );
}

#[test]
fn unfilled_optional_without_default_keeps_the_binding() {
    let mut world = World::new();
    assert_eq!(
        world.value("b = 77; {a, ?b} = {1}; return {a, b};"),
        ints(&[1, 77])
    );
}

#[test]
fn rest_takes_the_unclaimed_middle() {
    let mut world = World::new();
    assert_eq!(
        world.value("{first, @rest, last} = {1, 2, 3, 4, 5}; return {first, rest, last};"),
        Var::List(List::from_vec(vec![
            Var::Int(1),
            ints(&[2, 3, 4]),
            Var::Int(5),
        ]))
    );
    assert_eq!(
        world.value("{first, @rest, last} = {1, 2}; return {first, rest, last};"),
        Var::List(List::from_vec(vec![Var::Int(1), ints(&[]), Var::Int(2)]))
    );
}

#[test]
fn optionals_after_rest_use_remaining_surplus() {
    let mut world = World::new();
    assert_eq!(
        world.value("{a, @r, ?b, c} = {1, 2, 3}; return {a, r, b, c};"),
        Var::List(List::from_vec(vec![
            Var::Int(1),
            ints(&[]),
            Var::Int(2),
            Var::Int(3),
        ]))
    );
    assert_eq!(
        world.value("{a, @r, ?b, c} = {1, 2, 3, 4, 5}; return {a, r, b, c};"),
        Var::List(List::from_vec(vec![
            Var::Int(1),
            ints(&[2, 3]),
            Var::Int(4),
            Var::Int(5),
        ]))
    );
}

#[test]
fn rest_length_is_never_shorter_than_the_surplus() {
    let mut world = World::new();
    for n in 2..7 {
        let items: Vec<String> =
            (1..=n).map(|i| i.to_string()).collect();
        let src = format!(
            "{{a, ?b, @r}} = {{{}}}; return r;",
            items.join(", ")
        );
        let Var::List(rest) = world.value(&src) else { panic!() };
        // one required, one filled optional
        assert_eq!(rest.len(), n - 2, "for n = {n}");
    }
}

#[test]
fn defaults_may_reference_earlier_targets() {
    let mut world = World::new();
    assert_eq!(
        world.value("{a, ?b = a * 10} = {4}; return {a, b};"),
        ints(&[4, 40])
    );
}

#[test]
fn shape_violations_raise_args_errors() {
    let mut world = World::new();
    let exc = world.exception("{a, b} = {1}; return 0;");
    assert_eq!(exc.code, Error::E_ARGS);
    let exc = world.exception("{a} = {1, 2}; return 0;");
    assert_eq!(exc.code, Error::E_ARGS);
    // a rest target absorbs any excess
    assert_eq!(world.value("{a, @r} = {1, 2, 3}; return r;"), ints(&[2, 3]));
}

#[test]
fn scatter_of_non_lists_is_a_type_error() {
    let mut world = World::new();
    let exc = world.exception("{a, b} = 5; return 0;");
    assert_eq!(exc.code, Error::E_TYPE);
}

#[test]
fn scatter_expression_value_is_the_list() {
    let mut world = World::new();
    assert_eq!(
        world.value("x = ({a, b} = {1, 2}); return x;"),
        ints(&[1, 2])
    );
}
