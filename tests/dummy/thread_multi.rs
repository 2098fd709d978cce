//! Two threads increment `global_var` under a mutex.

#![allow(non_upper_case_globals)]

use std::sync::atomic::{AtomicI32, Ordering::Relaxed};
use std::sync::Mutex;
use std::thread;

#[no_mangle]
pub static global_var: AtomicI32 = AtomicI32::new(42);

static LOCK: Mutex<()> = Mutex::new(());

const INCREMENTS: usize = 10_000;

fn main() {
    let worker = || {
        for _ in 0..INCREMENTS {
            let guard = LOCK.lock().unwrap();
            global_var.fetch_add(1, Relaxed);
            drop(guard);

            thread::yield_now();
        }
    };

    let first = thread::spawn(worker);
    let second = thread::spawn(worker);

    first.join().unwrap();
    second.join().unwrap();
}
