//! Raises a stray `SIGTRAP`, reads `global_var` once, then aborts.

#![allow(non_upper_case_globals)]

use std::hint::black_box;
use std::process;
use std::sync::atomic::{AtomicI32, Ordering::Relaxed};

#[no_mangle]
pub static global_var: AtomicI32 = AtomicI32::new(7);

fn main() {
    unsafe { libc::raise(libc::SIGTRAP) };

    black_box(global_var.load(Relaxed));

    process::abort();
}
