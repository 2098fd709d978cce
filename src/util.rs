use nix::errno::Errno;
use nix::libc;
use nix::sys::ptrace::{AddressType, Request, RequestType};
use nix::sys::wait::{WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use std::os::raw::{c_long, c_void};

use crate::arch::Word;

#[repr(transparent)]
pub struct AddressLike(AddressType);

impl From<u64> for AddressLike {
    fn from(t: u64) -> Self {
        Self(t as _)
    }
}

#[repr(transparent)]
pub struct DataLike(*mut c_void);

impl From<u64> for DataLike {
    fn from(t: u64) -> Self {
        Self(t as _)
    }
}

pub(crate) fn ptrace<A, D>(request: Request, pid: Pid, addr: A, data: D) -> nix::Result<c_long>
where A: Into<AddressLike>,
      D: Into<DataLike> {

    let addr = addr.into();
    let data = data.into();

    unsafe {
        Errno::result(libc::ptrace(request as RequestType, libc::pid_t::from(pid), addr.0, data.0))
    }
}

/// Issues a `PEEK*` request. The peeked word may legitimately be `-1`, so
/// failure is decided by `errno` rather than by the return value.
pub(crate) fn peek<A>(request: Request, pid: Pid, addr: A) -> nix::Result<c_long>
where A: Into<AddressLike> {
    let addr = addr.into();

    Errno::clear();
    let res = unsafe {
        libc::ptrace(request as RequestType, libc::pid_t::from(pid), addr.0, std::ptr::null_mut::<c_void>())
    };

    if res == -1 {
        match Errno::last() {
            Errno::UnknownErrno => Ok(res),
            errno => Err(nix::Error::Sys(errno)),
        }
    } else {
        Ok(res)
    }
}

/// Reads `buffer.len()` bytes of tracee memory one aligned word at a time.
pub(crate) fn read_memory(pid: Pid, address: Word, buffer: &mut [u8]) -> nix::Result<()> {
    const WORD: usize = std::mem::size_of::<Word>();

    let mut addr = address;
    let mut data = [0u8; WORD];
    let mut to_read = buffer.len();
    let mut offset = WORD;
    let mut bufpos = 0;

    while to_read != 0 {
        if offset == WORD {
            offset = addr as usize & (WORD - 1);
            addr -= offset as Word;
            let d = peek(Request::PTRACE_PEEKDATA, pid, addr)?;
            data.copy_from_slice(&d.to_ne_bytes()[..]);
            addr += WORD as Word;
        }

        buffer[bufpos] = data[offset];

        bufpos += 1;
        offset += 1;
        to_read -= 1;
    }

    Ok(())
}

pub(crate) fn waitpid(pid: Pid, options: Option<WaitPidFlag>) -> nix::Result<(WaitStatus, i32)> {
    let mut status = 0;
    let option_bits = match options {
        Some(bits) => bits.bits(),
        None => 0,
    };

    let res = unsafe {
        libc::waitpid(
            pid.as_raw(),
            &mut status as *mut _,
            option_bits,
        )
    };

    match Errno::result(res)? {
        0 => Ok((WaitStatus::StillAlive, status)),
        res => WaitStatus::from_raw(Pid::from_raw(res), status).map(|r| (r, status)),
    }
}

/// Waits for any child, including clone children.
pub(crate) fn wait_any() -> nix::Result<(WaitStatus, i32)> {
    waitpid(Pid::from_raw(-1), Some(WaitPidFlag::__WALL))
}
