//! Overwrites `global_var` once from a second thread.

#![allow(non_upper_case_globals)]

use std::sync::atomic::{AtomicI32, Ordering::Relaxed};
use std::thread;

#[no_mangle]
pub static global_var: AtomicI32 = AtomicI32::new(42);

fn main() {
    thread::spawn(|| global_var.store(142, Relaxed))
        .join()
        .unwrap();
}
