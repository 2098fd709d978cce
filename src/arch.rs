#[cfg(target_pointer_width = "64")]
pub type Word = u64;

#[cfg(target_arch = "x86_64")]
pub mod x86_64 {
    use crate::util::{peek, ptrace};
    use nix::sys::ptrace::Request;
    use nix::unistd::Pid;

    use super::Word;

    pub const DEBUG_STATUS_REG: usize = 6;
    pub const DEBUG_CONTROL_REG: usize = 7;

    /// DR7 condition field values.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    #[repr(u8)]
    pub enum Condition {
        Execute = 0b00,
        Write = 0b01,
        ReadWrite = 0b11,
    }

    const fn dr7_enable_field_shift(i: usize) -> u32 {
        i.wrapping_mul(2) as u32
    }

    const fn dr7_kind_field_shift(i: usize) -> u32 {
        i.wrapping_mul(4).wrapping_add(16) as u32
    }

    const fn dr7_len_field_shift(i: usize) -> u32 {
        i.wrapping_mul(4).wrapping_add(18) as u32
    }

    #[inline(always)]
    pub(crate) fn dr7_local_enable(i: usize) -> Word {
        (1 as Word).checked_shl(dr7_enable_field_shift(i)).unwrap_or(0)
    }

    #[inline(always)]
    pub(crate) fn dr7_kind_field(i: usize, kind: Condition) -> Word {
        (kind as Word)
            .checked_shl(dr7_kind_field_shift(i))
            .unwrap_or(0)
    }

    #[inline(always)]
    pub(crate) fn dr7_len_field(i: usize, len: u8) -> Word {
        (len as Word)
            .checked_shl(dr7_len_field_shift(i))
            .unwrap_or(0)
    }

    /// Length encoding of a watched range. Not monotonic: 8 bytes is `10`,
    /// 4 bytes is `11`.
    pub(crate) fn len_field(size: usize) -> Option<u8> {
        match size {
            1 => Some(0b00),
            2 => Some(0b01),
            4 => Some(0b11),
            8 => Some(0b10),
            _ => None,
        }
    }

    fn debug_offset(id: usize) -> Word {
        (std::mem::offset_of!(libc::user, u_debugreg) + id * std::mem::size_of::<Word>()) as Word
    }

    pub fn read_register(pid: Pid, id: usize) -> nix::Result<Word> {
        peek(Request::PTRACE_PEEKUSER, pid, debug_offset(id)).map(|v| v as Word)
    }

    pub fn write_register(pid: Pid, id: usize, value: Word) -> nix::Result<()> {
        ptrace(Request::PTRACE_POKEUSER, pid, debug_offset(id), value).map(|_| ())
    }

    #[cfg(test)]
    mod test {
        use super::*;

        #[test]
        fn field_layout() {
            assert_eq!(dr7_local_enable(0), 0b1);
            assert_eq!(dr7_local_enable(1), 0b100);
            assert_eq!(dr7_kind_field(0, Condition::Write), 0b01 << 16);
            assert_eq!(dr7_kind_field(1, Condition::ReadWrite), 0b11 << 20);
            assert_eq!(dr7_len_field(1, 0b10), 0b10 << 22);
        }

        #[test]
        fn debug_register_offsets() {
            assert_eq!(debug_offset(1) - debug_offset(0), 8);
            assert_eq!(debug_offset(DEBUG_CONTROL_REG) - debug_offset(0), 56);
        }
    }
}

#[cfg(target_arch = "x86_64")]
pub use self::x86_64::*;
