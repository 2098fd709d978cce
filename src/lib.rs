//! Reports every read and write of a global variable in a launched program,
//! using x86-64 hardware watchpoints under ptrace.

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
compile_error!("gwatch supports x86-64 Linux only");

pub mod arch;
pub mod command;
pub mod config;
pub mod elf;
pub mod maps;
pub mod observer;
pub mod trace;
pub mod variable;
pub mod watchpoint;
mod util;

pub use nix::unistd::Pid;
pub use nix::Error as SystemError;

pub use command::Command;
pub use config::Config;
pub use observer::Observer;
pub use trace::{Error, State, Termination, Tracer};
pub use variable::{Value, Variable};
pub use watchpoint::{Access, Watchpoint};
