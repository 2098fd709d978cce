//! Hardware watchpoints on x86-64 debug registers.
//!
//! A watch occupies two slots at the same address: slot 0 traps on writes
//! only, slot 1 traps on any access. After a trap the pair of status bits
//! distinguishes a write (both fired) from a read (only slot 1 fired).

use bitflags::bitflags;
use log::trace;
use nix::unistd::Pid;
use thiserror::Error;

use crate::arch::{self, Condition, Word};

const WRITE_SLOT: usize = 0;
const ACCESS_SLOT: usize = 1;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to watch {0} bytes; supported sizes are 1, 2, 4 and 8")]
    UnsupportedSize(usize),
    #[error("could not access debug register {register} of `{pid}`: {source}")]
    Register {
        pid: Pid,
        register: usize,
        #[source]
        source: nix::Error,
    },
}

bitflags! {
    /// Trigger bits of the debug status register.
    pub struct Status: Word {
        const B0 = 1 << 0;
        const B1 = 1 << 1;
        const B2 = 1 << 2;
        const B3 = 1 << 3;
        const SINGLE_STEP = 1 << 14;
    }
}

/// What a trap on the watched address was caused by.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
    Other,
}

impl Access {
    pub fn from_status(status: Status) -> Self {
        let write = status.contains(Status::B0);
        let access = status.contains(Status::B1);

        match (write, access) {
            (true, true) => Access::Write,
            (false, true) => Access::Read,
            _ => Access::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Watchpoint {
    address: Word,
    size: usize,
    control: Word,
}

impl Watchpoint {
    pub fn new(address: Word, size: usize) -> Result<Self, Error> {
        let len = arch::len_field(size).ok_or(Error::UnsupportedSize(size))?;

        let control = arch::dr7_local_enable(WRITE_SLOT)
            | arch::dr7_kind_field(WRITE_SLOT, Condition::Write)
            | arch::dr7_len_field(WRITE_SLOT, len)
            | arch::dr7_local_enable(ACCESS_SLOT)
            | arch::dr7_kind_field(ACCESS_SLOT, Condition::ReadWrite)
            | arch::dr7_len_field(ACCESS_SLOT, len);

        Ok(Self {
            address,
            size,
            control,
        })
    }

    pub fn address(&self) -> Word {
        self.address
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// The DR7 value programmed by [`Watchpoint::arm`].
    pub fn control(&self) -> Word {
        self.control
    }

    /// Programs the watch into `pid`'s debug registers. The thread must be in
    /// a trace-stop.
    pub fn arm(&self, pid: Pid) -> Result<(), Error> {
        // addresses first; the kernel validates DR7 against them
        write_register(pid, WRITE_SLOT, self.address)?;
        write_register(pid, ACCESS_SLOT, self.address)?;
        write_register(pid, arch::DEBUG_CONTROL_REG, self.control)?;

        trace!(
            "armed {}-byte watch at {:#x} on `{}` (dr7 = {:#x})",
            self.size,
            self.address,
            pid,
            self.control
        );

        Ok(())
    }
}

/// Decodes the trap `pid` is stopped on and clears the status register.
///
/// Destructive: a second call for the same trap reports [`Access::Other`].
pub fn classify(pid: Pid) -> Result<Access, Error> {
    let status = arch::read_register(pid, arch::DEBUG_STATUS_REG).map_err(|source| Error::Register {
        pid,
        register: arch::DEBUG_STATUS_REG,
        source,
    })?;

    write_register(pid, arch::DEBUG_STATUS_REG, 0)?;

    Ok(Access::from_status(Status::from_bits_truncate(status)))
}

fn write_register(pid: Pid, register: usize, value: Word) -> Result<(), Error> {
    arch::write_register(pid, register, value).map_err(|source| Error::Register {
        pid,
        register,
        source,
    })
}
