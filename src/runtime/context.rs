use crate::global::limits::{DEFAULT_MAX_DEPTH, DEFAULT_TICKS};
use crate::runtime::exceptions::Exception;
use crate::values::error::Error;
use crate::values::{objid, Objid, Var};

/// Environment of a command-dispatched task; the frame initializer fills
/// the matching locals when the verb names them.
#[derive(Debug, Clone, Default)]
pub struct CommandEnv {
    pub argstr: String,
    pub dobjstr: String,
    pub iobjstr: String,
    pub prepstr: String,
    pub dobj: Objid,
    pub iobj: Objid,
}

impl CommandEnv {
    pub fn new() -> CommandEnv {
        CommandEnv {
            dobj: objid::NOTHING,
            iobj: objid::NOTHING,
            ..Default::default()
        }
    }
}

/// Shared per-task state: permissions, the current dispatch target, and
/// the cooperative tick budget.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub player: Objid,
    pub programmer: Objid,
    pub this: Objid,
    /// The primitive or waif the current verb was dispatched on, when the
    /// target was not a plain object.
    pub this_value: Option<Var>,
    pub verb_name: String,
    pub ticks: u64,
    pub max_depth: usize,
    pub command: Option<CommandEnv>,
}

impl TaskContext {
    pub fn new(player: Objid) -> TaskContext {
        TaskContext {
            player,
            programmer: player,
            this: objid::NOTHING,
            this_value: None,
            verb_name: String::new(),
            ticks: DEFAULT_TICKS,
            max_depth: DEFAULT_MAX_DEPTH,
            command: None,
        }
    }

    /// Spend one tick; exhaustion raises the tick error.
    pub fn charge_tick(&mut self) -> Result<(), Exception> {
        if self.ticks == 0 {
            return Err(Exception::new(Error::E_TICKS));
        }
        self.ticks -= 1;
        Ok(())
    }
}

/// The context fields a frame overwrites on entry and must restore when
/// it returns or unwinds.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    pub programmer: Objid,
    pub this: Objid,
    pub this_value: Option<Var>,
    pub verb_name: String,
}

impl ContextSnapshot {
    pub fn capture(ctx: &TaskContext) -> ContextSnapshot {
        ContextSnapshot {
            programmer: ctx.programmer,
            this: ctx.this,
            this_value: ctx.this_value.clone(),
            verb_name: ctx.verb_name.clone(),
        }
    }

    pub fn restore(self, ctx: &mut TaskContext) {
        ctx.programmer = self.programmer;
        ctx.this = self.this;
        ctx.this_value = self.this_value;
        ctx.verb_name = self.verb_name;
    }
}
