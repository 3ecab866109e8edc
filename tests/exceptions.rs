//! Exception machinery: handler selection, binding, finally paths,
//! catch expressions, tick exhaustion, recursion limits, kill, eval.

mod common;

use common::World;
use indoc::indoc;
use moo_core::{
    Error, List, ObjectStore, TaskContext, TaskOutcome, Var, Vm,
};

#[test]
fn handlers_select_by_code() {
    let mut world = World::new();
    let out = world.value(indoc! {"
        try
            x = 1 / 0;
        except (E_TYPE)
            return 1;
        except (E_DIV, E_RANGE)
            return 2;
        endtry
        return 3;
    "});
    assert_eq!(out, Var::Int(2));
}

#[test]
fn unmatched_exceptions_propagate() {
    let mut world = World::new();
    let exc = world.exception(indoc! {"
        try
            x = 1 / 0;
        except (E_TYPE)
            return 1;
        endtry
    "});
    assert_eq!(exc.code, Error::E_DIV);
}

#[test]
fn bound_exception_has_the_list_shape() {
    let mut world = World::new();
    let out = world.value(indoc! {"
        try
            x = {}[5];
        except e (ANY)
            return {e[1], e[3], length(e)};
        endtry
    "});
    assert_eq!(
        out,
        Var::List(List::from_vec(vec![
            Var::Err(Error::E_RANGE),
            Var::Int(0),
            Var::Int(4),
        ]))
    );
}

#[test]
fn finally_runs_on_both_paths() {
    let mut world = World::new();
    // normal path
    let out = world.value(indoc! {"
        log = {};
        try
            log = {@log, 1};
        finally
            log = {@log, 2};
        endtry
        return log;
    "});
    assert_eq!(out, common::ints(&[1, 2]));

    // error path: the finally runs, then the error continues
    world.set_verb(
        world.thing,
        "noisy",
        indoc! {"
            try
                this.touched = 1;
                x = 1 / 0;
            finally
                this.touched = this.touched + 1;
            endtry
        "},
    );
    let thing = world.thing;
    world.store.get_mut(thing).unwrap().set_property(
        "touched",
        moo_core::store::object::Property::new(Var::Int(0), world.player),
    );
    let TaskOutcome::Exception(exc) =
        world.call(&Var::Obj(thing), "noisy", Vec::new())
    else {
        panic!()
    };
    assert_eq!(exc.code, Error::E_DIV);
    assert_eq!(
        world
            .store
            .get(thing)
            .unwrap()
            .get_property("touched")
            .unwrap()
            .value,
        Var::Int(2)
    );
}

#[test]
fn finally_runs_when_the_body_returns() {
    let mut world = World::new();
    world.set_verb(
        world.thing,
        "count",
        indoc! {"
            try
                return 42;
            finally
                this.cleanup = 1;
            endtry
        "},
    );
    let thing = world.thing;
    world.store.get_mut(thing).unwrap().set_property(
        "cleanup",
        moo_core::store::object::Property::new(Var::Int(0), world.player),
    );
    let TaskOutcome::Complete(value) =
        world.call(&Var::Obj(thing), "count", Vec::new())
    else {
        panic!()
    };
    assert_eq!(value, Var::Int(42));
    assert_eq!(
        world
            .store
            .get(thing)
            .unwrap()
            .get_property("cleanup")
            .unwrap()
            .value,
        Var::Int(1)
    );
}

#[test]
fn finally_return_overrides_the_pending_error() {
    let mut world = World::new();
    let out = world.value(indoc! {"
        try
            x = 1 / 0;
        finally
            return 7;
        endtry
        return 1;
    "});
    assert_eq!(out, Var::Int(7));
}

#[test]
fn except_and_finally_combine() {
    let mut world = World::new();
    let out = world.value(indoc! {"
        log = {};
        try
            x = 1 / 0;
        except (E_DIV)
            log = {@log, \"caught\"};
        finally
            log = {@log, \"finally\"};
        endtry
        return log;
    "});
    assert_eq!(
        out,
        Var::List(List::from_vec(vec![
            Var::str("caught"),
            Var::str("finally"),
        ]))
    );
}

#[test]
fn break_through_finally_runs_it() {
    let mut world = World::new();
    let out = world.value(indoc! {"
        log = {};
        while (1)
            try
                break;
            finally
                log = {@log, \"ran\"};
            endtry
        endwhile
        return log;
    "});
    assert_eq!(out, Var::List(List::from_vec(vec![Var::str("ran")])));
}

#[test]
fn catch_expression_with_default() {
    let mut world = World::new();
    assert_eq!(
        world.value("return `1 / 0 ! E_DIV => 99';"),
        Var::Int(99)
    );
    assert_eq!(world.value("return `4 / 2 ! E_DIV => 99';"), Var::Int(2));
}

#[test]
fn catch_expression_without_default_yields_the_code() {
    let mut world = World::new();
    assert_eq!(
        world.value("return `1 / 0 ! ANY';"),
        Var::Err(Error::E_DIV)
    );
}

#[test]
fn catch_expression_passes_unlisted_codes() {
    let mut world = World::new();
    let exc = world.exception("return `{}[1] ! E_DIV => 0';");
    assert_eq!(exc.code, Error::E_RANGE);
}

#[test]
fn nested_handlers_unwind_outward() {
    let mut world = World::new();
    let out = world.value(indoc! {"
        try
            try
                x = 1 / 0;
            except (E_TYPE)
                return 1;
            endtry
        except e (E_DIV)
            return 2;
        endtry
        return 3;
    "});
    assert_eq!(out, Var::Int(2));
}

#[test]
fn uncaught_exceptions_carry_a_traceback() {
    let mut world = World::new();
    world.set_verb(world.thing, "t2", "x = 1;\ny = x / 0;");
    world.set_verb(world.thing, "t1", "return this:t2();");
    let TaskOutcome::Exception(exc) =
        world.call(&Var::Obj(world.thing), "t1", Vec::new())
    else {
        panic!()
    };
    assert_eq!(exc.code, Error::E_DIV);
    assert_eq!(exc.traceback.len(), 2);
    let Var::List(first) = exc.traceback.get(1).unwrap().clone() else {
        panic!()
    };
    // {this, verb, programmer, verb_loc, player, line}
    assert_eq!(first.get(2), Some(&Var::str("t2")));
    assert_eq!(first.get(6), Some(&Var::Int(2)));
}

#[test]
fn tick_exhaustion_aborts_loops() {
    let mut world = World::new();
    let outcome = world.run_src("while (1) endwhile");
    let TaskOutcome::Aborted(exc) = outcome else { panic!("{outcome:?}") };
    assert_eq!(exc.code, Error::E_TICKS);
}

#[test]
fn tick_exhaustion_is_catchable_by_kind() {
    let mut world = World::new();
    let out = world.value(indoc! {"
        try
            while (1)
            endwhile
        except (E_TICKS)
            return 5;
        endtry
    "});
    assert_eq!(out, Var::Int(5));
}

#[test]
fn recursion_limit_raises() {
    let mut world = World::new();
    world.set_verb(world.thing, "spin", "return this:spin();");
    let out = world.value(indoc! {"
        try
            this:spin();
        except e (E_MAXREC)
            return e[1];
        endtry
        return 0;
    "});
    assert_eq!(out, Var::Err(Error::E_MAXREC));
}

#[test]
fn kill_is_uncatchable_but_finally_runs() {
    let mut world = World::new();
    world.set_verb(
        world.thing,
        "test",
        indoc! {"
            try
                x = suspend(0);
                return 1;
            except (ANY)
                return 2;
            endtry
        "},
    );
    let ctx = TaskContext::new(world.player);
    let mut vm = Vm::new(
        &mut world.store,
        &mut world.scheduler,
        &world.registry,
        ctx,
    );
    vm.call_verb(
        &Var::Obj(world.thing),
        "test",
        List::new(),
        world.player,
    )
    .unwrap();
    let TaskOutcome::Suspended(_) = vm.run() else { panic!() };
    // catch-any must not see the kill
    let TaskOutcome::Aborted(exc) = vm.kill() else { panic!() };
    assert_eq!(exc.code, Error::E_KILLED);
}

#[test]
fn kill_respects_finally_returns() {
    let mut world = World::new();
    world.set_verb(
        world.thing,
        "test",
        indoc! {"
            try
                x = suspend(0);
                return 1;
            finally
                return 99;
            endtry
        "},
    );
    let ctx = TaskContext::new(world.player);
    let mut vm = Vm::new(
        &mut world.store,
        &mut world.scheduler,
        &world.registry,
        ctx,
    );
    vm.call_verb(
        &Var::Obj(world.thing),
        "test",
        List::new(),
        world.player,
    )
    .unwrap();
    let TaskOutcome::Suspended(_) = vm.run() else { panic!() };
    let TaskOutcome::Complete(value) = vm.kill() else { panic!() };
    assert_eq!(value, Var::Int(99));
}

#[test]
fn eval_success_and_failures() {
    let mut world = World::new();
    assert_eq!(
        world.value(r#"return eval("return 2 + 3;");"#),
        Var::List(List::from_vec(vec![Var::Int(1), Var::Int(5)]))
    );
    // runtime failure: {0, code}
    assert_eq!(
        world.value(r#"return eval("return 1 / 0;");"#),
        Var::List(List::from_vec(vec![
            Var::Int(0),
            Var::Err(Error::E_DIV),
        ]))
    );
    // parse failure: {0, messages}
    let Var::List(result) = world.value(r#"return eval("return ((;");"#)
    else {
        panic!()
    };
    assert_eq!(result.get(1), Some(&Var::Int(0)));
    let Var::List(messages) = result.get(2).unwrap().clone() else {
        panic!()
    };
    assert_eq!(messages.len(), 1);
    assert!(matches!(messages.get(1), Some(Var::Str(_))));
}

#[test]
fn eval_joins_arguments_with_newlines() {
    let mut world = World::new();
    assert_eq!(
        world.value(r#"return eval("x = 4;", "return x * 2;");"#),
        Var::List(List::from_vec(vec![Var::Int(1), Var::Int(8)]))
    );
}

#[test]
fn eval_requires_programmer_permissions() {
    let mut world = World::new();
    let mundane = world.store.create(50, &[]);
    let verb = moo_core::store::object::Verb::new(
        "try_eval",
        mundane,
        vec![r#"return eval("return 1;");"#.to_string()],
    );
    let thing = world.thing;
    world.store.get_mut(thing).unwrap().verbs.push(verb);
    let TaskOutcome::Exception(exc) =
        world.call(&Var::Obj(thing), "try_eval", Vec::new())
    else {
        panic!()
    };
    assert_eq!(exc.code, Error::E_PERM);
}

#[test]
fn raise_builtin_carries_message_and_value() {
    let mut world = World::new();
    let out = world.value(indoc! {r#"
        try
            raise(E_PERM, "not yours", #13);
        except e (E_PERM)
            return {e[1], e[2], e[3]};
        endtry
    "#});
    let Var::List(list) = out else { panic!() };
    assert_eq!(list.get(1), Some(&Var::Err(Error::E_PERM)));
    assert_eq!(list.get(2), Some(&Var::str("not yours")));
    assert_eq!(
        list.get(3),
        Some(&Var::Obj(moo_core::Objid::new(13)))
    );
}
