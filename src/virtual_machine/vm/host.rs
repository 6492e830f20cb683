use super::registers::NUM_REGISTERS;
use crate::virtual_machine::errors::VMError;

/// Host function bridge invoked by the `HOST_CALL` instruction.
///
/// The VM passes the function index, the argument register, the argument count
/// and a read-only view of the register file. The returned value is written to
/// the argument register. An error ends the run and is returned from
/// [`VM::run`](super::VM::run) unchanged.
///
/// Closures with the matching signature implement this trait.
pub trait HostCallHandler {
    fn call(
        &mut self,
        func_index: i64,
        arg_register: u8,
        arg_count: u8,
        registers: &[i64; NUM_REGISTERS],
    ) -> Result<i64, VMError>;
}

impl<F> HostCallHandler for F
where
    F: FnMut(i64, u8, u8, &[i64; NUM_REGISTERS]) -> Result<i64, VMError>,
{
    fn call(
        &mut self,
        func_index: i64,
        arg_register: u8,
        arg_count: u8,
        registers: &[i64; NUM_REGISTERS],
    ) -> Result<i64, VMError> {
        self(func_index, arg_register, arg_count, registers)
    }
}
