//! Writes `global_var` from a `SIGUSR1` handler, then exits with status 3.

#![allow(non_upper_case_globals)]

use std::process;
use std::sync::atomic::{AtomicI32, Ordering::Relaxed};

#[no_mangle]
pub static global_var: AtomicI32 = AtomicI32::new(0);

extern "C" fn on_usr1(_: libc::c_int) {
    global_var.store(1, Relaxed);
}

fn main() {
    unsafe {
        libc::signal(libc::SIGUSR1, on_usr1 as extern "C" fn(libc::c_int) as libc::sighandler_t);
        libc::raise(libc::SIGUSR1);
    }

    process::exit(3);
}
