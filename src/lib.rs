//! Register-based bytecode virtual machine.
//!
//! Loads a flat byte program, checks an optional magic header and executes it
//! against a 32-register file, a 1024-slot call stack and a 65536-cell heap.

pub mod utils;
pub mod virtual_machine;
