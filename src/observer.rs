use std::sync::Arc;

use nix::unistd::Pid;
use parking_lot::Mutex;

use crate::trace::{Error, Termination};
use crate::variable::Variable;

/// Receives the events of a [`Tracer`](crate::Tracer) run, synchronously on the
/// tracing thread and in delivery order.
#[allow(unused_variables)]
pub trait Observer: 'static {
    /// The variable has been resolved and the main thread armed.
    fn init(&mut self, variable: &Variable) -> Result<(), Error> { Ok(()) }
    fn fini(&mut self, termination: Termination) -> Result<(), Error> { Ok(()) }

    /// `thread` read the variable; `variable` holds the value it read.
    fn read(&mut self, thread: Pid, variable: &Variable) -> Result<(), Error> { Ok(()) }
    /// `thread` wrote the variable; `previous` is the last value observed
    /// before this write.
    fn write(&mut self, thread: Pid, previous: &Variable, variable: &Variable) -> Result<(), Error> { Ok(()) }

    fn thread_start(&mut self, thread: Pid) -> Result<(), Error> { Ok(()) }
    fn thread_exit(&mut self, thread: Pid, termination: Termination) -> Result<(), Error> { Ok(()) }
}

/// Shares an observer with the caller, who can inspect it after the run.
impl<O: Observer> Observer for Arc<Mutex<O>> {
    fn init(&mut self, variable: &Variable) -> Result<(), Error> {
        self.lock().init(variable)
    }

    fn fini(&mut self, termination: Termination) -> Result<(), Error> {
        self.lock().fini(termination)
    }

    fn read(&mut self, thread: Pid, variable: &Variable) -> Result<(), Error> {
        self.lock().read(thread, variable)
    }

    fn write(&mut self, thread: Pid, previous: &Variable, variable: &Variable) -> Result<(), Error> {
        self.lock().write(thread, previous, variable)
    }

    fn thread_start(&mut self, thread: Pid) -> Result<(), Error> {
        self.lock().thread_start(thread)
    }

    fn thread_exit(&mut self, thread: Pid, termination: Termination) -> Result<(), Error> {
        self.lock().thread_exit(thread, termination)
    }
}

pub(crate) struct OnRead<F>(pub(crate) F);

impl<F> Observer for OnRead<F>
where F: FnMut(&Variable) + 'static {
    fn read(&mut self, _thread: Pid, variable: &Variable) -> Result<(), Error> {
        (self.0)(variable);
        Ok(())
    }
}

pub(crate) struct OnWrite<F>(pub(crate) F);

impl<F> Observer for OnWrite<F>
where F: FnMut(&Variable, &Variable) + 'static {
    fn write(&mut self, _thread: Pid, previous: &Variable, variable: &Variable) -> Result<(), Error> {
        (self.0)(previous, variable);
        Ok(())
    }
}
