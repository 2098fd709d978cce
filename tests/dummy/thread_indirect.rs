//! A thread spawned by a thread reads `global_var` repeatedly.

#![allow(non_upper_case_globals)]

use std::hint::black_box;
use std::sync::atomic::{AtomicI32, Ordering::Relaxed};
use std::thread;

#[no_mangle]
pub static global_var: AtomicI32 = AtomicI32::new(42);

const READS: usize = 1_000;

fn main() {
    thread::spawn(|| {
        thread::spawn(|| {
            for _ in 0..READS {
                black_box(global_var.load(Relaxed));
            }
        })
        .join()
        .unwrap();
    })
    .join()
    .unwrap();
}
