//! Register-based bytecode virtual machine.
//!
//! # Architecture
//!
//! - **Registers**: 32 signed 64-bit registers, operand bytes masked to 5 bits
//! - **Flags**: `is_zero` / `is_negative`, written by `CMP` and a fixed set of
//!   arithmetic opcodes, read by the conditional jumps
//! - **Stack**: 1024 `i64` slots shared by `PUSH`/`POP` and `CALL`/`RET`
//! - **Heap**: 65536 `i64` cells addressed by register value
//! - **Instruction format**: one opcode byte followed by fixed-width big-endian
//!   operands; see [`isa`]
//! - **Host calls**: `HOST_CALL` forwards to a caller-supplied
//!   [`vm::HostCallHandler`]
//!
//! # Modules
//!
//! - [`errors`]: Validation and execution error type
//! - [`isa`]: Instruction set definition, opcode and length tables
//! - [`program`]: Program bytes and the programmatic encoder
//! - [`vm`]: Core virtual machine implementation

pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod program;
pub mod vm;
