//! Alternates reads and writes of `global_var`, `argv[1]` accesses in total.

#![allow(non_upper_case_globals)]

use std::env;
use std::hint::black_box;
use std::sync::atomic::{AtomicI64, Ordering::Relaxed};

#[no_mangle]
pub static global_var: AtomicI64 = AtomicI64::new(42);

fn main() {
    let count: i64 = match env::args().nth(1).and_then(|arg| arg.parse().ok()) {
        Some(count) => count,
        None => {
            eprintln!("usage: read_write <number>");
            std::process::exit(1);
        }
    };

    for i in 0..count {
        if i % 2 == 0 {
            black_box(global_var.load(Relaxed));
        } else {
            global_var.store(i, Relaxed);
        }
    }
}
