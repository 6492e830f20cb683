//! Core virtual machine implementation.
//!
//! The VM executes bytecode using a register-based architecture with 32 signed
//! 64-bit registers, a 1024-slot stack shared by data pushes and return
//! addresses, and a 65536-cell heap. All arithmetic uses wrapping semantics.
//!
//! Register operand bytes are masked to their low 5 bits when decoded, so
//! operands never fault. Jump, call and return targets and heap addresses are
//! validated on use.

mod config;
mod heap;
mod host;
mod registers;
mod stack;

pub use config::VmConfig;
pub use heap::HEAP_SIZE;
pub use host::HostCallHandler;
pub use registers::{Flags, NUM_REGISTERS, REGISTER_MASK};
pub use stack::STACK_SIZE;

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::program::Program;
use crate::warn;
use heap::Heap;
use registers::{Condition, Registers, ZeroTest};
use stack::Stack;

macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        instr = $instr:ident,
        {
            $(
                $variant:ident => $handler:ident $( [ $( $extra:expr ),* ] )?
                    ( $( $field:ident : $kind:ident ),* $(,)? )
            ),* $(,)?
        }
    ) => {{
        match $instr {
            $(
                Instruction::$variant => {
                    $( let $field = exec_vm!(@read $vm, $kind)?; )*
                    $vm.$handler($( $( $extra, )* )? $( $field ),*)
                }
            ),*
        }
    }};

    // Decode a register index, masked onto the register file
    (@read $vm:ident, Reg) => {{
        $vm.read_u8().map(|b| b & REGISTER_MASK)
    }};

    // Decode a raw byte
    (@read $vm:ident, ImmU8) => {{
        $vm.read_u8()
    }};

    // Decode an i64 immediate (big-endian, 8 bytes)
    (@read $vm:ident, ImmI64) => {{
        $vm.read_array::<8>().map(i64::from_be_bytes)
    }};

    // Decode a u64 jump target (big-endian, 8 bytes)
    (@read $vm:ident, Addr) => {{
        $vm.read_array::<8>().map(u64::from_be_bytes)
    }};
}

/// Why a successful [`VM::run`] stopped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Exit {
    /// A `HALT` instruction executed.
    Halted,
    /// The program counter ran past the last byte.
    EndOfProgram,
}

/// Lifecycle of a [`VM`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExecState {
    /// Constructed, header not yet validated.
    Ready,
    Running,
    Halted,
    /// Ran off the end of the program.
    Completed,
    /// Stopped by an error. Further runs return the same error.
    Failed(VMError),
}

/// Bytecode virtual machine.
///
/// Created from a [`Program`] and a [`VmConfig`], then driven to completion by
/// [`run`](Self::run). State stays readable afterwards through the accessors.
pub struct VM {
    /// Bytecode to execute, magic header included.
    program: Box<[u8]>,
    /// Offset of the next instruction.
    pc: usize,
    /// Start of the instruction being executed.
    instr_start: usize,
    /// Operand read position inside the current instruction.
    cursor: usize,
    registers: Registers,
    flags: Flags,
    stack: Stack,
    heap: Heap,
    magic_header: Vec<u8>,
    host_call_handler: Option<Box<dyn HostCallHandler>>,
    state: ExecState,
}

impl VM {
    /// Creates a VM for `program`. Nothing is validated until [`run`](Self::run).
    pub fn new(program: impl Into<Program>, config: VmConfig) -> Self {
        Self {
            program: program.into().into_bytes().into_boxed_slice(),
            pc: 0,
            instr_start: 0,
            cursor: 0,
            registers: Registers::new(),
            flags: Flags::default(),
            stack: Stack::new(),
            heap: Heap::new(),
            magic_header: config.magic_header,
            host_call_handler: config.host_call_handler,
            state: ExecState::Ready,
        }
    }

    /// Executes the program until `HALT`, the end of the bytecode, or an error.
    ///
    /// The magic header is checked on the first call. On error, `pc` is left at
    /// the start of the failing instruction and the VM stays in
    /// [`ExecState::Failed`]; state written by earlier instructions is kept.
    pub fn run(&mut self) -> Result<Exit, VMError> {
        match &self.state {
            ExecState::Halted => return Ok(Exit::Halted),
            ExecState::Failed(err) => return Err(err.clone()),
            ExecState::Ready => {
                if let Err(err) = self.validate_header() {
                    warn!("rejected program: {err}");
                    self.state = ExecState::Failed(err.clone());
                    return Err(err);
                }
            }
            ExecState::Running | ExecState::Completed => {}
        }

        self.state = ExecState::Running;
        while self.pc < self.program.len() {
            if let Err(err) = self.step() {
                self.pc = self.instr_start;
                let mnemonic = Instruction::try_from(self.program[self.instr_start])
                    .map(|instr| instr.mnemonic())
                    .unwrap_or("?");
                warn!(
                    "execution failed at offset {} ({mnemonic}): {err}",
                    self.instr_start
                );
                self.state = ExecState::Failed(err.clone());
                return Err(err);
            }
            if self.state == ExecState::Halted {
                return Ok(Exit::Halted);
            }
        }
        self.state = ExecState::Completed;
        Ok(Exit::EndOfProgram)
    }

    /// Checks the magic header and positions `pc` right after it.
    fn validate_header(&mut self) -> Result<(), VMError> {
        if !self.program.starts_with(&self.magic_header) {
            return Err(VMError::InvalidMagicHeader {
                expected_len: self.magic_header.len(),
                actual_len: self.program.len(),
            });
        }
        self.pc = self.magic_header.len();
        Ok(())
    }

    /// Decodes and executes the instruction at `pc`.
    fn step(&mut self) -> Result<(), VMError> {
        let start = self.pc;
        self.instr_start = start;
        let opcode = self.program[start];
        let instr = Instruction::try_from(opcode).map_err(|_| VMError::UnknownOpcode {
            opcode,
            offset: start,
        })?;

        let len = instr.encoded_len();
        let available = self.program.len() - start;
        if len > available {
            return Err(VMError::UnexpectedEndOfProgram {
                offset: start,
                required: len,
                available,
            });
        }

        self.cursor = start + 1;
        self.pc = start + len;
        self.exec(instr)
    }

    /// Reads exactly `count` operand bytes of the current instruction.
    fn read_exact(&mut self, count: usize) -> Result<&[u8], VMError> {
        let start = self.cursor;
        let end = start + count;
        let available = self.program.len().saturating_sub(self.instr_start);
        let slice = self
            .program
            .get(start..end)
            .ok_or(VMError::UnexpectedEndOfProgram {
                offset: self.instr_start,
                required: end - self.instr_start,
                available,
            })?;
        self.cursor = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, VMError> {
        Ok(self.read_exact(1)?[0])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], VMError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_exact(N)?);
        Ok(out)
    }

    /// Executes a single decoded instruction.
    fn exec(&mut self, instruction: Instruction) -> Result<(), VMError> {
        exec_vm! {
            vm = self,
            instr = instruction,
            {
                Nop => op_nop(),
                // Stack
                Push => op_push(src: Reg),
                Pop => op_pop(dst: Reg),
                // Loads and stores
                LoadImmediate => op_load_immediate(dst: Reg, value: ImmI64),
                LoadRegister => op_load_register(dst: Reg, src: Reg),
                LoadMemory => op_load_memory(dst: Reg, addr: Reg),
                StoreMemory => op_store_memory(src: Reg, addr: Reg),
                // Integer arithmetic
                Add => op_add(dst: Reg, src1: Reg, src2: Reg),
                Sub => op_sub(dst: Reg, src1: Reg, src2: Reg),
                Mul => op_mul(dst: Reg, src1: Reg, src2: Reg),
                Div => op_div(dst: Reg, src1: Reg, src2: Reg),
                Mod => op_mod(dst: Reg, src1: Reg, src2: Reg),
                // Bitwise
                And => op_and(dst: Reg, src1: Reg, src2: Reg),
                Or => op_or(dst: Reg, src1: Reg, src2: Reg),
                Xor => op_xor(dst: Reg, src1: Reg, src2: Reg),
                Not => op_not(dst: Reg, src: Reg),
                ShiftLeft => op_shl(dst: Reg, src: Reg, amount: Reg),
                ShiftRight => op_shr(dst: Reg, src: Reg, amount: Reg),
                ShiftRightArithmetic => op_sar(dst: Reg, src: Reg, amount: Reg),
                Cmp => op_cmp(src1: Reg, src2: Reg),
                // Jumps, immediate target
                JmpImmediate => op_jmp_immediate(addr: Addr),
                JmpImmediateIfZero => op_jmp_immediate_test[ZeroTest::Zero](check: Reg, addr: Addr),
                JmpImmediateIfNotZero => op_jmp_immediate_test[ZeroTest::NotZero](check: Reg, addr: Addr),
                JmpImmediateIfEqual => op_jmp_immediate_if[Condition::Equal](addr: Addr),
                JmpImmediateIfNotEqual => op_jmp_immediate_if[Condition::NotEqual](addr: Addr),
                JmpImmediateIfGreater => op_jmp_immediate_if[Condition::Greater](addr: Addr),
                JmpImmediateIfGreaterOrEqual => op_jmp_immediate_if[Condition::GreaterOrEqual](addr: Addr),
                JmpImmediateIfLess => op_jmp_immediate_if[Condition::Less](addr: Addr),
                JmpImmediateIfLessOrEqual => op_jmp_immediate_if[Condition::LessOrEqual](addr: Addr),
                // Jumps, register target
                JmpRegister => op_jmp_register(addr: Reg),
                JmpRegisterIfZero => op_jmp_register_test[ZeroTest::Zero](check: Reg, addr: Reg),
                JmpRegisterIfNotZero => op_jmp_register_test[ZeroTest::NotZero](check: Reg, addr: Reg),
                JmpRegisterIfEqual => op_jmp_register_if[Condition::Equal](addr: Reg),
                JmpRegisterIfNotEqual => op_jmp_register_if[Condition::NotEqual](addr: Reg),
                JmpRegisterIfGreater => op_jmp_register_if[Condition::Greater](addr: Reg),
                JmpRegisterIfGreaterOrEqual => op_jmp_register_if[Condition::GreaterOrEqual](addr: Reg),
                JmpRegisterIfLess => op_jmp_register_if[Condition::Less](addr: Reg),
                JmpRegisterIfLessOrEqual => op_jmp_register_if[Condition::LessOrEqual](addr: Reg),
                // Subroutines and host
                CallImmediate => op_call_immediate(addr: Addr),
                CallRegister => op_call_register(addr: Reg),
                Return => op_return(),
                HostCall => op_host_call(func: ImmI64, arg: Reg, argc: ImmU8),
                Halt => op_halt(),
            }
        }
    }

    // =========================
    // Inspection
    // =========================

    /// Offset of the next instruction, or of the failing one after an error.
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Number of occupied stack slots.
    pub fn sp(&self) -> usize {
        self.stack.sp()
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn registers(&self) -> &[i64; NUM_REGISTERS] {
        self.registers.as_array()
    }

    /// Returns register `index`, failing with [`VMError::RegisterOutOfBounds`]
    /// for `index >= NUM_REGISTERS`.
    pub fn register(&self, index: usize) -> Result<i64, VMError> {
        self.registers.checked_get(index)
    }

    /// Occupied stack slots, bottom first.
    pub fn stack(&self) -> &[i64] {
        self.stack.as_slice()
    }

    /// Reads a heap cell with the same bounds check as `LOAD_MEMORY`.
    pub fn heap_cell(&self, addr: i64) -> Result<i64, VMError> {
        self.heap.load(addr)
    }

    pub fn state(&self) -> &ExecState {
        &self.state
    }

    pub fn program(&self) -> &[u8] {
        &self.program
    }

    // =========================
    // Helpers
    // =========================

    /// Writes `value` to `dst` and updates the flags from it.
    fn set_with_flags(&mut self, dst: u8, value: i64) {
        self.registers.set(dst, value);
        self.flags.update(value);
    }

    /// Maps a jump, call or return target to a program offset.
    fn check_target(&self, target: i128) -> Result<usize, VMError> {
        usize::try_from(target)
            .ok()
            .filter(|&t| t < self.program.len())
            .ok_or(VMError::MemoryAddressOutOfBounds {
                address: target,
                limit: self.program.len(),
            })
    }

    /// Validates `target`, then jumps there if `taken`.
    fn branch(&mut self, target: i128, taken: bool) -> Result<(), VMError> {
        let target = self.check_target(target)?;
        if taken {
            self.pc = target;
        }
        Ok(())
    }

    /// Pushes the return address and jumps to `target`.
    ///
    /// Nothing is written unless both the stack and the target are valid.
    fn call(&mut self, target: i128) -> Result<(), VMError> {
        self.stack.ensure_room()?;
        let target = self.check_target(target)?;
        self.stack.push(self.pc as i64)?;
        self.pc = target;
        Ok(())
    }

    // =========================
    // Handlers
    // =========================

    fn op_nop(&mut self) -> Result<(), VMError> {
        Ok(())
    }

    fn op_push(&mut self, src: u8) -> Result<(), VMError> {
        self.stack.push(self.registers.get(src))
    }

    fn op_pop(&mut self, dst: u8) -> Result<(), VMError> {
        let value = self.stack.pop()?;
        self.registers.set(dst, value);
        Ok(())
    }

    fn op_load_immediate(&mut self, dst: u8, value: i64) -> Result<(), VMError> {
        self.registers.set(dst, value);
        Ok(())
    }

    fn op_load_register(&mut self, dst: u8, src: u8) -> Result<(), VMError> {
        self.registers.set(dst, self.registers.get(src));
        Ok(())
    }

    fn op_load_memory(&mut self, dst: u8, addr: u8) -> Result<(), VMError> {
        let value = self.heap.load(self.registers.get(addr))?;
        self.set_with_flags(dst, value);
        Ok(())
    }

    fn op_store_memory(&mut self, src: u8, addr: u8) -> Result<(), VMError> {
        let value = self.registers.get(src);
        self.heap.store(self.registers.get(addr), value)
    }

    fn op_add(&mut self, dst: u8, a: u8, b: u8) -> Result<(), VMError> {
        let value = self.registers.get(a).wrapping_add(self.registers.get(b));
        self.registers.set(dst, value);
        Ok(())
    }

    fn op_sub(&mut self, dst: u8, a: u8, b: u8) -> Result<(), VMError> {
        let value = self.registers.get(a).wrapping_sub(self.registers.get(b));
        self.registers.set(dst, value);
        Ok(())
    }

    fn op_mul(&mut self, dst: u8, a: u8, b: u8) -> Result<(), VMError> {
        let value = self.registers.get(a).wrapping_mul(self.registers.get(b));
        self.set_with_flags(dst, value);
        Ok(())
    }

    fn op_div(&mut self, dst: u8, a: u8, b: u8) -> Result<(), VMError> {
        let divisor = self.registers.get(b);
        if divisor == 0 {
            return Err(VMError::DivisionByZero);
        }
        let value = self.registers.get(a).wrapping_div(divisor);
        self.set_with_flags(dst, value);
        Ok(())
    }

    fn op_mod(&mut self, dst: u8, a: u8, b: u8) -> Result<(), VMError> {
        let divisor = self.registers.get(b);
        if divisor == 0 {
            return Err(VMError::ModuloByZero);
        }
        let value = self.registers.get(a).wrapping_rem(divisor);
        self.set_with_flags(dst, value);
        Ok(())
    }

    fn op_and(&mut self, dst: u8, a: u8, b: u8) -> Result<(), VMError> {
        let value = self.registers.get(a) & self.registers.get(b);
        self.registers.set(dst, value);
        Ok(())
    }

    fn op_or(&mut self, dst: u8, a: u8, b: u8) -> Result<(), VMError> {
        let value = self.registers.get(a) | self.registers.get(b);
        self.registers.set(dst, value);
        Ok(())
    }

    fn op_xor(&mut self, dst: u8, a: u8, b: u8) -> Result<(), VMError> {
        let value = self.registers.get(a) ^ self.registers.get(b);
        self.registers.set(dst, value);
        Ok(())
    }

    fn op_not(&mut self, dst: u8, src: u8) -> Result<(), VMError> {
        let value = !self.registers.get(src);
        self.set_with_flags(dst, value);
        Ok(())
    }

    /// Shift amount register read as an unsigned bit pattern.
    fn shift_amount(&self, amount: u8) -> Option<u32> {
        u32::try_from(self.registers.get(amount) as u64).ok()
    }

    fn op_shl(&mut self, dst: u8, src: u8, amount: u8) -> Result<(), VMError> {
        let value = self
            .shift_amount(amount)
            .and_then(|n| self.registers.get(src).checked_shl(n))
            .unwrap_or(0);
        self.set_with_flags(dst, value);
        Ok(())
    }

    fn op_shr(&mut self, dst: u8, src: u8, amount: u8) -> Result<(), VMError> {
        let bits = self.registers.get(src) as u64;
        let value = self
            .shift_amount(amount)
            .and_then(|n| bits.checked_shr(n))
            .unwrap_or(0) as i64;
        self.set_with_flags(dst, value);
        Ok(())
    }

    fn op_sar(&mut self, dst: u8, src: u8, amount: u8) -> Result<(), VMError> {
        let v = self.registers.get(src);
        let value = self
            .shift_amount(amount)
            .and_then(|n| v.checked_shr(n))
            .unwrap_or(v >> 63);
        self.set_with_flags(dst, value);
        Ok(())
    }

    fn op_cmp(&mut self, a: u8, b: u8) -> Result<(), VMError> {
        let diff = self.registers.get(a).wrapping_sub(self.registers.get(b));
        self.flags.update(diff);
        Ok(())
    }

    fn op_jmp_immediate(&mut self, addr: u64) -> Result<(), VMError> {
        self.branch(addr.into(), true)
    }

    fn op_jmp_immediate_test(&mut self, test: ZeroTest, check: u8, addr: u64) -> Result<(), VMError> {
        let taken = test.holds(self.registers.get(check));
        self.branch(addr.into(), taken)
    }

    fn op_jmp_immediate_if(&mut self, condition: Condition, addr: u64) -> Result<(), VMError> {
        let taken = self.flags.holds(condition);
        self.branch(addr.into(), taken)
    }

    fn op_jmp_register(&mut self, addr: u8) -> Result<(), VMError> {
        self.branch(self.registers.get(addr).into(), true)
    }

    fn op_jmp_register_test(&mut self, test: ZeroTest, check: u8, addr: u8) -> Result<(), VMError> {
        let taken = test.holds(self.registers.get(check));
        self.branch(self.registers.get(addr).into(), taken)
    }

    fn op_jmp_register_if(&mut self, condition: Condition, addr: u8) -> Result<(), VMError> {
        let taken = self.flags.holds(condition);
        self.branch(self.registers.get(addr).into(), taken)
    }

    fn op_call_immediate(&mut self, addr: u64) -> Result<(), VMError> {
        self.call(addr.into())
    }

    fn op_call_register(&mut self, addr: u8) -> Result<(), VMError> {
        self.call(self.registers.get(addr).into())
    }

    fn op_return(&mut self) -> Result<(), VMError> {
        let target = self.check_target(self.stack.peek()?.into())?;
        self.stack.pop()?;
        self.pc = target;
        Ok(())
    }

    fn op_host_call(&mut self, func: i64, arg: u8, argc: u8) -> Result<(), VMError> {
        let handler = self
            .host_call_handler
            .as_mut()
            .ok_or(VMError::HostCallHandlerNotSet)?;
        let result = handler.call(func, arg, argc & REGISTER_MASK, self.registers.as_array())?;
        self.registers.set(arg, result);
        Ok(())
    }

    fn op_halt(&mut self) -> Result<(), VMError> {
        self.state = ExecState::Halted;
        Ok(())
    }
}
