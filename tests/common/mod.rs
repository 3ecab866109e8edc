//! Shared world fixture: an in-memory store with a wizard player and a
//! scratch object, a registry extended with a waif constructor, and
//! helpers that compile and run MOO source end to end.

#![allow(dead_code)]

use moo_core::runtime::builtins::{BuiltinCtx, BuiltinResult};
use moo_core::store::object::Verb;
use moo_core::{
    BuiltinRegistry, Error, Exception, List, MemStore, NullScheduler, Objid,
    ObjectStore, TaskContext, TaskOutcome, Var, Vm, Waif,
};

pub struct World {
    pub store: MemStore,
    pub scheduler: NullScheduler,
    pub registry: BuiltinRegistry,
    pub player: Objid,
    pub thing: Objid,
}

fn bf_new_waif(ctx: &mut BuiltinCtx, args: List) -> BuiltinResult {
    match args.as_slice() {
        [Var::Obj(class)] => BuiltinResult::Value(Var::Waif(Waif::new(
            *class,
            ctx.task.programmer,
        ))),
        _ => BuiltinResult::Raise(Exception::new(Error::E_ARGS)),
    }
}

impl World {
    pub fn new() -> World {
        let mut store = MemStore::new();
        store.create(0, &[]);
        let player = store.create(2, &[]);
        {
            let p = store.get_mut(player).unwrap();
            p.flags.player = true;
            p.flags.programmer = true;
            p.flags.wizard = true;
            p.name = "tester".to_string();
        }
        let thing = store.create(3, &[]);
        store.get_mut(thing).unwrap().owner = player;
        store.get_mut(thing).unwrap().name = "thing".to_string();
        let mut registry = BuiltinRegistry::core();
        registry.register("new_waif", bf_new_waif);
        World {
            store,
            scheduler: NullScheduler::new(),
            registry,
            player,
            thing,
        }
    }

    /// Install (or replace) a verb; the source is split into lines so
    /// tracebacks and fork extraction see real source.
    pub fn set_verb(&mut self, obj: Objid, names: &str, src: &str) {
        let lines: Vec<String> = src.lines().map(str::to_string).collect();
        let verb = Verb::new(names, self.player, lines);
        let primary = names.split_whitespace().next().unwrap();
        let object = self.store.get_mut(obj).unwrap();
        match object.find_verb_local(primary) {
            Some(i) => object.verbs[i] = verb,
            None => object.verbs.push(verb),
        }
    }

    pub fn call(&mut self, target: &Var, verb: &str, args: Vec<Var>) -> TaskOutcome {
        let ctx = TaskContext::new(self.player);
        let mut vm = Vm::new(
            &mut self.store,
            &mut self.scheduler,
            &self.registry,
            ctx,
        );
        match vm.call_verb(target, verb, List::from_vec(args), self.player) {
            Ok(()) => vm.run(),
            Err(exc) => TaskOutcome::Exception(exc),
        }
    }

    /// Run a source snippet as a verb body on the scratch object.
    pub fn run_src(&mut self, src: &str) -> TaskOutcome {
        self.set_verb(self.thing, "test", src);
        self.call(&Var::Obj(self.thing), "test", Vec::new())
    }

    /// Run a snippet and unwrap its completion value.
    pub fn value(&mut self, src: &str) -> Var {
        match self.run_src(src) {
            TaskOutcome::Complete(value) => value,
            other => panic!("task did not complete: {other:?}"),
        }
    }

    /// Run a snippet and unwrap the uncaught exception.
    pub fn exception(&mut self, src: &str) -> Exception {
        match self.run_src(src) {
            TaskOutcome::Exception(exc) => exc,
            other => panic!("task did not raise: {other:?}"),
        }
    }
}

pub fn ints(values: &[i64]) -> Var {
    Var::List(values.iter().map(|&i| Var::Int(i)).collect())
}
