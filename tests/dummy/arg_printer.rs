//! Prints its arguments and stores their count, including `argv[0]`, in
//! `global_var`. Exits with 1 unless `argv[0]` is an absolute path.

#![allow(non_upper_case_globals)]

use std::env;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering::Relaxed};

#[no_mangle]
pub static global_var: AtomicI64 = AtomicI64::new(0);

fn main() {
    let args: Vec<String> = env::args().collect();

    println!("Program name: {}", args[0]);
    for (i, arg) in args.iter().enumerate().skip(1) {
        println!("Arg {}: {}", i, arg);
    }

    global_var.store(args.len() as i64, Relaxed);

    if !Path::new(&args[0]).is_absolute() {
        std::process::exit(1);
    }
}
