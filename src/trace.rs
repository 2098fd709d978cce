use fnv::FnvHashSet as HashSet;
use log::{debug, trace, warn};
use nix::errno::Errno;
use nix::libc;
use nix::sys::ptrace::{cont, getevent, setoptions, Options as PTraceOptions};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use thiserror::Error;

use crate::arch::Word;
use crate::command::{self, Command};
use crate::config::Config;
use crate::elf::{self, Image};
use crate::maps;
use crate::observer::{Observer, OnRead, OnWrite};
use crate::util::{read_memory, wait_any, waitpid};
use crate::variable::{self, Variable};
use crate::watchpoint::{self, Access, Watchpoint};

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not launch `{}`: {1}", _0.display())]
    Launch(PathBuf, #[source] command::Error),
    #[error("could not resolve the path of `{}`", _0.display())]
    Canonicalize(PathBuf),
    #[error("could not execute `{}`", _0.display())]
    Exec(PathBuf),
    #[error("tracee could not request tracing")]
    TraceMe,
    #[error("process `{0}` entered unexpected state {1:?}")]
    UnexpectedState(Pid, WaitStatus),
    #[error("waitpid failed: {0}")]
    Wait(nix::Error),
    #[error("could not continue `{0}`: {1}")]
    Continue(Pid, nix::Error),
    #[error("could not set ptrace options on `{0}`: {1}")]
    SetOptions(Pid, nix::Error),
    #[error("could not fetch event message of `{0}`: {1}")]
    EventMessage(Pid, nix::Error),
    #[error("memory read at {0:#x} failed: {1}")]
    MemoryRead(Word, nix::Error),
    #[error(transparent)]
    Image(#[from] elf::Error),
    #[error(transparent)]
    Maps(#[from] maps::Error),
    #[error(transparent)]
    Watchpoint(#[from] watchpoint::Error),
    #[error(transparent)]
    Variable(#[from] variable::Error),
    #[error("observer failed: {0}")]
    Observer(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn observer<E>(error: E) -> Self
    where E: Into<Box<dyn std::error::Error + Send + Sync>> {
        Self::Observer(error.into())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    Signaled(Signal),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exited(code) => write!(f, "exited with status {}", code),
            Termination::Signaled(signal) => write!(f, "killed by {:?}", signal),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    Idle,
    Launching,
    Attaching,
    Running,
    Terminated,
}

impl Default for State {
    fn default() -> Self {
        Self::Idle
    }
}

/// Kills and reaps a launched process and all of its traced threads unless
/// released. Only the process's own threads are waited for.
struct Child(Option<Pid>);

impl Child {
    fn release(&mut self) {
        self.0 = None;
    }
}

impl Drop for Child {
    fn drop(&mut self) {
        if let Some(pid) = self.0.take() {
            debug!("killing `{}`", pid);
            kill(pid, Signal::SIGKILL).ok();

            // no new threads can appear once the kill is pending, and the
            // leader is only reported after every other thread is reaped
            for tid in threads_of(pid).into_iter().filter(|&tid| tid != pid) {
                reap(tid);
            }
            reap(pid);
        }
    }
}

/// Thread ids of `pid` listed under `/proc/<pid>/task`, including zombies.
fn threads_of(pid: Pid) -> Vec<Pid> {
    fs::read_dir(format!("/proc/{}/task", pid))
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse().ok())
                .map(Pid::from_raw)
                .collect()
        })
        .unwrap_or_default()
}

fn reap(tid: Pid) {
    loop {
        match waitpid(tid, Some(WaitPidFlag::__WALL)) {
            Ok((WaitStatus::Exited(..), _)) | Ok((WaitStatus::Signaled(..), _)) => break,
            Ok(_) | Err(nix::Error::Sys(Errno::EINTR)) => continue,
            Err(_) => break,
        }
    }
}

/// Launches a program and reports every access to one of its globals.
pub struct Tracer {
    command: Command,

    variable: Variable,
    previous: Variable,

    process: Option<Pid>,
    threads: HashSet<Pid>,
    parked: HashSet<Pid>,

    observers: Vec<Box<dyn Observer>>,

    state: State,
    termination: Option<Termination>,
}

impl Tracer {
    pub fn new<P, A, I>(program: P, args: I, variable: Variable) -> Self
    where P: AsRef<OsStr>,
          A: AsRef<OsStr>,
          I: IntoIterator<Item=A> {
        let mut command = Command::new(program);
        command.args(args);
        Self::with_command(command, variable)
    }

    pub fn with_command(command: Command, variable: Variable) -> Self {
        Self {
            command,
            previous: variable.clone(),
            variable,
            process: None,
            threads: HashSet::default(),
            parked: HashSet::default(),
            observers: Vec::new(),
            state: State::default(),
            termination: None,
        }
    }

    pub fn from_config(config: Config) -> Self {
        Self::with_command(config.command(), config.variable())
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn command_mut(&mut self) -> &mut Command {
        &mut self.command
    }

    pub fn add_observer<O: Observer>(&mut self, observer: O) {
        self.observers.push(Box::new(observer))
    }

    /// Calls `f` with the variable after every read.
    pub fn on_read<F>(&mut self, f: F)
    where F: FnMut(&Variable) + 'static {
        self.add_observer(OnRead(f))
    }

    /// Calls `f` with the previous and the current variable after every write.
    pub fn on_write<F>(&mut self, f: F)
    where F: FnMut(&Variable, &Variable) + 'static {
        self.add_observer(OnWrite(f))
    }

    /// The latest snapshot of the watched variable.
    pub fn variable(&self) -> &Variable {
        &self.variable
    }

    /// The snapshot preceding the latest reported access; before the first
    /// access this is the value found at attach time.
    pub fn previous(&self) -> &Variable {
        &self.previous
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// How the main thread of the last run ended.
    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// Runs the program to completion, reporting accesses to the observers.
    ///
    /// Blocks until the main thread exits or is killed. On error the process
    /// is killed and reaped before returning.
    pub fn run(&mut self) -> Result<(), Error> {
        self.reset();

        self.state = State::Launching;
        let pid = self
            .command
            .launch()
            .map_err(|e| Error::Launch(self.command.program().to_owned(), e))?;
        debug!("launched `{}` as `{}`", self.command.program().display(), pid);

        let mut child = Child(Some(pid));
        self.process = Some(pid);

        self.state = State::Attaching;
        let result = self.attach(pid).and_then(|watchpoint| {
            self.state = State::Running;
            self.trace(pid, &watchpoint)
        });
        self.state = State::Terminated;

        // these are decoded from the child's exit, which has been reaped
        if matches!(
            result,
            Err(Error::Canonicalize(_)) | Err(Error::Exec(_)) | Err(Error::TraceMe)
        ) {
            child.release();
        }

        let termination = result?;
        child.release();

        debug!("`{}` {}", pid, termination);
        self.termination = Some(termination);

        self.observers
            .iter_mut()
            .try_for_each(|o| o.fini(termination))
    }

    fn reset(&mut self) {
        self.variable.unresolve();
        self.previous = self.variable.clone();
        self.process = None;
        self.threads.clear();
        self.parked.clear();
        self.state = State::Idle;
        self.termination = None;
    }

    fn attach(&mut self, pid: Pid) -> Result<Watchpoint, Error> {
        let (status, _) = waitpid(pid, Some(WaitPidFlag::__WALL)).map_err(Error::Wait)?;

        let program = self.command.program().to_owned();
        match status {
            WaitStatus::Stopped(_, Signal::SIGTRAP) => (),
            WaitStatus::Exited(_, command::EXIT_CANONICALIZE) => return Err(Error::Canonicalize(program)),
            WaitStatus::Exited(_, command::EXIT_EXEC) => return Err(Error::Exec(program)),
            WaitStatus::Exited(_, command::EXIT_TRACEME) => return Err(Error::TraceMe),
            status => return Err(Error::UnexpectedState(pid, status)),
        }

        let (load_address, symbol) = {
            let image = Image::open(&program)?;
            (image.load_address()?, image.symbol(self.variable.name())?)
        };
        let base = maps::base_address(pid, &program)?;

        let address = base.wrapping_sub(load_address).wrapping_add(symbol.offset);
        let size = symbol.size as usize;
        let watchpoint = Watchpoint::new(address, size)?;

        let initial = self.peek(pid, address, size)?;
        self.variable.resolve(address, size);
        self.variable.update(&initial);
        self.previous = self.variable.clone();

        debug!(
            "watching `{}` at {:#x} ({} bytes, initially {})",
            self.variable.name(),
            address,
            size,
            self.variable
        );

        setoptions(
            pid,
            PTraceOptions::PTRACE_O_TRACECLONE | PTraceOptions::PTRACE_O_EXITKILL,
        )
        .map_err(|e| Error::SetOptions(pid, e))?;

        watchpoint.arm(pid)?;
        self.threads.insert(pid);

        let variable = &self.variable;
        self.observers.iter_mut().try_for_each(|o| o.init(variable))?;

        self.resume(pid, None)?;

        Ok(watchpoint)
    }

    fn trace(&mut self, main: Pid, watchpoint: &Watchpoint) -> Result<Termination, Error> {
        loop {
            let (status, _) = match wait_any() {
                Ok(status) => status,
                Err(nix::Error::Sys(Errno::EINTR)) => continue,
                Err(e) => return Err(Error::Wait(e)),
            };

            match status {
                WaitStatus::Exited(tid, code) => {
                    let termination = Termination::Exited(code);
                    self.thread_exit(tid, termination)?;
                    if tid == main {
                        return Ok(termination);
                    }
                }
                WaitStatus::Signaled(tid, signal, _) => {
                    let termination = Termination::Signaled(signal);
                    self.thread_exit(tid, termination)?;
                    if tid == main {
                        return Ok(termination);
                    }
                }
                WaitStatus::PtraceEvent(tid, _, libc::PTRACE_EVENT_CLONE) => {
                    let new = getevent(tid).map_err(|e| Error::EventMessage(tid, e))?;
                    self.track_thread(Pid::from_raw(new as libc::pid_t), watchpoint)?;
                    self.resume(tid, None)?;
                }
                WaitStatus::PtraceEvent(tid, _, event) => {
                    trace!("`{}`: ignoring ptrace event {}", tid, event);
                    self.resume(tid, None)?;
                }
                WaitStatus::Stopped(tid, Signal::SIGTRAP) => {
                    self.trap(tid, watchpoint)?;
                    self.resume(tid, None)?;
                }
                WaitStatus::Stopped(tid, Signal::SIGSTOP) if !self.threads.contains(&tid) => {
                    // initial stop of a thread whose clone event is still pending
                    debug!("parking new thread `{}` until it is armed", tid);
                    self.parked.insert(tid);
                }
                WaitStatus::Stopped(tid, signal) => {
                    trace!("`{}`: forwarding {:?}", tid, signal);
                    self.resume(tid, Some(signal))?;
                }
                status => trace!("ignoring {:?}", status),
            }
        }
    }

    /// Arms a newly cloned thread and lets it run.
    fn track_thread(&mut self, tid: Pid, watchpoint: &Watchpoint) -> Result<(), Error> {
        if !self.parked.remove(&tid) {
            let status = loop {
                match waitpid(tid, Some(WaitPidFlag::__WALL)) {
                    Ok((status, _)) => break status,
                    Err(nix::Error::Sys(Errno::EINTR)) => continue,
                    Err(e) => return Err(Error::Wait(e)),
                }
            };

            match status {
                WaitStatus::Stopped(..) | WaitStatus::PtraceEvent(..) => (),
                WaitStatus::Exited(..) | WaitStatus::Signaled(..) => {
                    debug!("thread `{}` ended before it could be armed", tid);
                    return Ok(());
                }
                status => return Err(Error::UnexpectedState(tid, status)),
            }
        }

        watchpoint.arm(tid)?;
        self.threads.insert(tid);
        debug!("tracking thread `{}`", tid);

        self.observers.iter_mut().try_for_each(|o| o.thread_start(tid))?;

        self.resume(tid, None)
    }

    fn thread_exit(&mut self, tid: Pid, termination: Termination) -> Result<(), Error> {
        self.threads.remove(&tid);
        self.parked.remove(&tid);

        match termination {
            Termination::Exited(0) => debug!("`{}` exited", tid),
            termination => warn!("`{}` {}", tid, termination),
        }

        self.observers
            .iter_mut()
            .try_for_each(|o| o.thread_exit(tid, termination))
    }

    /// Handles a `SIGTRAP` stop that is not a ptrace event.
    fn trap(&mut self, tid: Pid, watchpoint: &Watchpoint) -> Result<(), Error> {
        let bytes = self.peek(tid, watchpoint.address(), watchpoint.size())?;

        let access = watchpoint::classify(tid)?;
        if access == Access::Other {
            trace!("`{}`: trap not caused by the watch", tid);
            return Ok(());
        }

        self.previous.clone_from(&self.variable);
        self.variable.update(&bytes);

        trace!(
            "`{}`: {:?} of `{}`: {} -> {}",
            tid,
            access,
            self.variable.name(),
            self.previous,
            self.variable
        );

        let previous = &self.previous;
        let variable = &self.variable;

        if access == Access::Write {
            self.observers
                .iter_mut()
                .try_for_each(|o| o.write(tid, previous, variable))
        } else {
            self.observers
                .iter_mut()
                .try_for_each(|o| o.read(tid, variable))
        }
    }

    fn peek(&self, tid: Pid, address: Word, size: usize) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![0u8; size];
        read_memory(tid, address, &mut bytes).map_err(|e| Error::MemoryRead(address, e))?;
        Ok(bytes)
    }

    fn resume(&mut self, tid: Pid, signal: Option<Signal>) -> Result<(), Error> {
        match cont(tid, signal) {
            Ok(()) => Ok(()),
            Err(nix::Error::Sys(Errno::ESRCH)) if Some(tid) != self.process => {
                // killed while stopped, e.g. by another thread's exit_group
                warn!("thread `{}` vanished while stopped", tid);
                self.threads.remove(&tid);
                Ok(())
            }
            Err(e) => Err(Error::Continue(tid, e)),
        }
    }
}
