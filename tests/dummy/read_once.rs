//! Reads the global named by its first argument exactly once.

#![allow(non_upper_case_globals)]

use std::env;
use std::hint::black_box;
use std::sync::atomic::{
    AtomicI16, AtomicI32, AtomicI64, AtomicI8, AtomicU16, AtomicU32, AtomicU64, AtomicU8,
    Ordering::Relaxed,
};

#[no_mangle]
pub static global_var: AtomicI64 = AtomicI64::new(42);

#[no_mangle]
pub static var_i8: AtomicI8 = AtomicI8::new(-42);
#[no_mangle]
pub static var_u8: AtomicU8 = AtomicU8::new(200);
#[no_mangle]
pub static var_i16: AtomicI16 = AtomicI16::new(-4242);
#[no_mangle]
pub static var_u16: AtomicU16 = AtomicU16::new(60000);
#[no_mangle]
pub static var_i32: AtomicI32 = AtomicI32::new(-424242);
#[no_mangle]
pub static var_u32: AtomicU32 = AtomicU32::new(4000000000);
#[no_mangle]
pub static var_i64: AtomicI64 = AtomicI64::new(-4242424242);
#[no_mangle]
pub static var_u64: AtomicU64 = AtomicU64::new(18000000000000000000);

fn main() {
    let name = env::args().nth(1).unwrap_or_else(|| "global_var".to_owned());

    match name.as_str() {
        "var_i8" => { black_box(var_i8.load(Relaxed)); }
        "var_u8" => { black_box(var_u8.load(Relaxed)); }
        "var_i16" => { black_box(var_i16.load(Relaxed)); }
        "var_u16" => { black_box(var_u16.load(Relaxed)); }
        "var_i32" => { black_box(var_i32.load(Relaxed)); }
        "var_u32" => { black_box(var_u32.load(Relaxed)); }
        "var_i64" => { black_box(var_i64.load(Relaxed)); }
        "var_u64" => { black_box(var_u64.load(Relaxed)); }
        _ => { black_box(global_var.load(Relaxed)); }
    }
}
