//! Surface-syntax edges exercised through the public parse entry and the
//! compiled engine: keyword case-insensitivity, operator precedence,
//! comment skipping, and the parse-error surface `eval` exposes.

mod common;

use common::{ints, World};
use indoc::indoc;
use moo_core::{parse_program, Var};

#[test]
fn keywords_are_case_insensitive() {
    let mut world = World::new();
    let out = world.value(indoc! {"
        IF (1)
            RETURN 5;
        ELSE
            RETURN 6;
        ENDIF
    "});
    assert_eq!(out, Var::Int(5));
    let out = world.value("For x In [1..3] EndFor return x;");
    assert_eq!(out, Var::Int(4));
}

#[test]
fn identifiers_are_case_insensitive() {
    let mut world = World::new();
    assert_eq!(world.value("Total = 4; return tOTAL + 1;"), Var::Int(5));
}

#[test]
fn comments_are_skipped() {
    let mut world = World::new();
    let out = world.value(indoc! {"
        x = 1; /* set up
                  across lines */
        return x + /* inline */ 2;
    "});
    assert_eq!(out, Var::Int(3));
}

#[test]
fn bitwise_binds_tighter_than_comparison() {
    let mut world = World::new();
    // (1 |. 2) == 3, not 1 |. (2 == 3)
    assert_eq!(world.value("return 1 |. 2 == 3;"), Var::Bool(true));
    // shifts bind tighter than bitwise and
    assert_eq!(world.value("return 3 &. 1 << 1;"), Var::Int(2));
}

#[test]
fn unary_binds_tighter_than_power_base() {
    let mut world = World::new();
    assert_eq!(world.value("return -2 ^ 2;"), Var::Int(4));
    assert_eq!(world.value("return 0 - 2 ^ 2;"), Var::Int(-4));
}

#[test]
fn ternary_is_looser_than_logic() {
    let mut world = World::new();
    assert_eq!(
        world.value("return 0 || 1 ? \"yes\" | \"no\";"),
        Var::str("yes")
    );
}

#[test]
fn assignment_chains_right() {
    let mut world = World::new();
    assert_eq!(
        world.value("a = b = 3; return {a, b};"),
        ints(&[3, 3])
    );
}

#[test]
fn reserved_words_cannot_be_variables() {
    assert!(parse_program("while = 5;").is_err());
    assert!(parse_program("x = endif;").is_err());
}

#[test]
fn unterminated_blocks_are_errors() {
    assert!(parse_program("if (1) return 2;").is_err());
    assert!(parse_program("while (1) ").is_err());
    assert!(parse_program("fork (0) return 1;").is_err());
}

#[test]
fn error_literals_must_be_known() {
    assert!(parse_program("return E_TYPE;").is_ok());
    assert!(parse_program("return E_BANANA;").is_err());
}

#[test]
fn parse_errors_carry_line_numbers_through_eval() {
    let mut world = World::new();
    let Var::List(result) =
        world.value(r#"return eval("x = 1;", "y = ((;");"#)
    else {
        panic!()
    };
    assert_eq!(result.get(1), Some(&Var::Int(0)));
    let Var::List(messages) = result.get(2).unwrap().clone() else {
        panic!()
    };
    let Some(Var::Str(message)) = messages.get(1) else { panic!() };
    assert!(message.starts_with("Line 2:"), "got {message}");
}

#[test]
fn object_and_negative_literals() {
    let mut world = World::new();
    assert_eq!(
        world.value("return {#-1, #0, -5, -5.5};"),
        Var::List(moo_core::List::from_vec(vec![
            Var::Obj(moo_core::Objid::new(-1)),
            Var::Obj(moo_core::Objid::new(0)),
            Var::Int(-5),
            Var::Float(-5.5),
        ]))
    );
}

#[test]
fn deep_expression_nesting_parses() {
    let mut world = World::new();
    let src = format!("return {}1{};", "(".repeat(40), ")".repeat(40));
    assert_eq!(world.value(&src), Var::Int(1));
}

#[test]
fn empty_statements_and_bodies() {
    let mut world = World::new();
    assert_eq!(world.value(";;; return 1;"), Var::Int(1));
    assert_eq!(world.value("if (1) endif return 2;"), Var::Int(2));
}
