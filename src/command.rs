use std::ffi::{CString, OsStr, OsString};
use std::os::raw::c_char;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;

use nix::errno::Errno;
use nix::libc;
use nix::sys::personality;
use nix::sys::ptrace;
use nix::unistd::{fork, ForkResult, Pid};
use thiserror::Error;

/// Child exit status when its executable path cannot be resolved.
pub const EXIT_CANONICALIZE: i32 = 3;
/// Child exit status when `execv` fails.
pub const EXIT_EXEC: i32 = 4;
/// Child exit status when it cannot request tracing.
pub const EXIT_TRACEME: i32 = 5;

#[derive(Debug, Error)]
pub enum Error {
    #[error("argument {0:?} contains an interior NUL byte")]
    InvalidArgument(OsString),
    #[error("fork failed: {0}")]
    Fork(nix::Error),
}

#[derive(Debug, Clone)]
pub struct Command {
    path: OsString,
    args: Vec<OsString>,
    aslr: bool,
}

impl Command {
    pub fn new<P: AsRef<OsStr>>(command: P) -> Self {
        Self {
            path: command.as_ref().to_owned(),
            args: Vec::new(),
            aslr: true,
        }
    }

    pub fn program(&self) -> &Path {
        Path::new(&self.path)
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    pub fn disable_aslr(&mut self) -> &mut Self {
        self.aslr = false;
        self
    }

    pub fn enable_aslr(&mut self) -> &mut Self {
        self.aslr = true;
        self
    }

    pub fn aslr(&self) -> bool {
        self.aslr
    }

    pub fn arg<A: AsRef<OsStr>>(&mut self, arg: A) -> &mut Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<A: AsRef<OsStr>, I: IntoIterator<Item=A>>(&mut self, args: I) -> &mut Self {
        self.args.extend(args.into_iter().map(|arg| arg.as_ref().to_owned()));
        self
    }

    /// Forks and executes the program in the child under `PTRACE_TRACEME`.
    /// The child stops with `SIGTRAP` once the new image is loaded.
    ///
    /// Everything the child needs, including its diagnostics, is allocated
    /// before forking.
    pub fn launch(&self) -> Result<Pid, Error> {
        let path = c_string(&self.path)?;
        let args = self.args.iter()
            .map(|arg| c_string(arg))
            .collect::<Result<Vec<_>, _>>()?;

        // argv[0] is filled in with the resolved path by the child
        let mut argv: Vec<*const c_char> = Vec::with_capacity(args.len() + 2);
        argv.push(ptr::null());
        argv.extend(args.iter().map(|arg| arg.as_ptr()));
        argv.push(ptr::null());

        let mut resolved = [0 as c_char; libc::PATH_MAX as usize];

        let program = self.program().display();
        let diagnostics = Diagnostics {
            canonicalize: format!("gwatch: could not resolve `{}`: ", program).into_bytes(),
            exec: format!("gwatch: could not execute `{}`: ", program).into_bytes(),
        };

        if let ForkResult::Parent { child } = unsafe { fork() }.map_err(Error::Fork)? {
            return Ok(child)
        }

        self.exec_child(&path, &mut argv, &mut resolved, &diagnostics)
    }

    fn exec_child(
        &self,
        path: &CString,
        argv: &mut [*const c_char],
        resolved: &mut [c_char],
        diagnostics: &Diagnostics,
    ) -> ! {
        if !self.aslr {
            if let Ok(mut pers) = personality::get() {
                pers.insert(personality::Persona::ADDR_NO_RANDOMIZE);
                personality::set(pers).ok();
            }
        }

        if ptrace::traceme().is_err() {
            child_exit(b"gwatch: could not request tracing: ", EXIT_TRACEME)
        }

        if unsafe { libc::realpath(path.as_ptr(), resolved.as_mut_ptr()) }.is_null() {
            child_exit(&diagnostics.canonicalize, EXIT_CANONICALIZE)
        }

        argv[0] = resolved.as_ptr();
        unsafe { libc::execv(resolved.as_ptr(), argv.as_ptr()) };

        child_exit(&diagnostics.exec, EXIT_EXEC)
    }
}

/// Messages the forked child may print, formatted in the parent.
struct Diagnostics {
    canonicalize: Vec<u8>,
    exec: Vec<u8>,
}

/// Reports `errno` after `message` on stderr and terminates the forked child.
/// Only async-signal-safe calls: `Errno::desc` is a static table.
fn child_exit(message: &[u8], code: i32) -> ! {
    let reason = Errno::last().desc();

    for part in [message, reason.as_bytes(), &b"\n"[..]].iter() {
        unsafe { libc::write(libc::STDERR_FILENO, part.as_ptr() as *const _, part.len()) };
    }

    unsafe { libc::_exit(code) }
}

fn c_string(s: &OsStr) -> Result<CString, Error> {
    CString::new(s.as_bytes()).map_err(|_| Error::InvalidArgument(s.to_owned()))
}
