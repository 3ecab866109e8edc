use crate::runtime::fork::ForkInfo;
use crate::values::Var;

/// The task-scheduler contract the engine reports into. The engine never
/// owns queues or timers; it surrenders fork records and yields on
/// suspend, and the host decides when anything runs.
pub trait Scheduler {
    /// Queue a forked child task; returns the child task id the parent
    /// sees (and stores, for a named fork).
    fn create_fork(&mut self, fork: ForkInfo) -> i64;

    fn push_frame(&mut self) {}

    fn pop_frame(&mut self) {}

    fn update_line_number(&mut self, _line: usize) {}

    /// Activation entries of host frames above this task, appended to
    /// tracebacks of exceptions that escape the topmost verb frame.
    fn get_call_stack(&self) -> Vec<Var> {
        Vec::new()
    }
}

/// Scheduler stub that records forks and hands out sequential task ids.
#[derive(Debug, Default)]
pub struct NullScheduler {
    pub forks: Vec<ForkInfo>,
    next_task: i64,
}

impl NullScheduler {
    pub fn new() -> NullScheduler {
        NullScheduler::default()
    }
}

impl Scheduler for NullScheduler {
    fn create_fork(&mut self, fork: ForkInfo) -> i64 {
        self.next_task += 1;
        self.forks.push(fork);
        self.next_task
    }
}
