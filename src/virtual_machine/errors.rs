use thiserror::Error;

/// Errors that can occur while validating or executing a program.
///
/// Every error is fatal to the run that produced it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VMError {
    /// Program does not start with the configured magic header.
    #[error("invalid magic header: expected {expected_len} header bytes, program has {actual_len}")]
    InvalidMagicHeader {
        expected_len: usize,
        actual_len: usize,
    },
    /// Instruction extends past the end of the program.
    #[error(
        "unexpected end of program at offset {offset}: instruction needs {required} bytes, {available} available"
    )]
    UnexpectedEndOfProgram {
        offset: usize,
        required: usize,
        available: usize,
    },
    /// Opcode byte does not name an instruction.
    #[error("unknown opcode 0x{opcode:02x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },
    #[error("division by zero")]
    DivisionByZero,
    #[error("modulo by zero")]
    ModuloByZero,
    /// Push or call with every stack slot occupied.
    #[error("stack overflow: all {capacity} slots in use")]
    StackOverflow { capacity: usize },
    /// Pop or return with an empty stack.
    #[error("stack underflow")]
    StackUnderflow,
    /// Jump/call target outside the program, or heap address outside the heap.
    #[error("memory address {address} out of bounds (limit {limit})")]
    MemoryAddressOutOfBounds { address: i128, limit: usize },
    /// Register index outside the register file.
    #[error("register index {index} out of bounds")]
    RegisterOutOfBounds { index: usize },
    /// `HOST_CALL` executed without a configured handler.
    #[error("host call handler not set")]
    HostCallHandlerNotSet,
    /// Failure reported by a host call handler.
    #[error("host call {func_index} failed: {reason}")]
    HostCallFailed { func_index: i64, reason: String },
}
