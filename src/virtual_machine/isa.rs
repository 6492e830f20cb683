//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical instruction list and hands it to a callback macro, so several
//! modules can generate instruction-related code from one definition.
//!
//! This module generates:
//! - The [`Instruction`] enum with opcode mappings
//! - `TryFrom<u8>` for decoding opcodes
//! - The opcode→length table ([`Instruction::encoded_len`], [`instruction_len`])
//!
//! [`program`](super::program) generates the bytecode encoder from the same list,
//! and [`vm`](super::vm) holds the opcode→handler table.
//!
//! # Bytecode Format
//!
//! Every instruction is an opcode byte followed by fixed-width operands:
//! - Register operand: 1 byte, masked to its low 5 bits when executed
//! - Count operand: 1 byte
//! - Immediate i64: 8 bytes (big-endian, two's complement)
//! - Address u64: 8 bytes (big-endian)
//!
//! Lengths in the table include the opcode byte.

use crate::virtual_machine::errors::VMError;

/// Invokes a callback macro with the complete instruction definition list.
///
/// Each entry reads `Name = opcode, "MNEMONIC" => [operand: Kind, ...], length`.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            /// NOP ; does nothing
            Nop = 0x00, "NOP" => [], 1,
            // =========================
            // Stack
            // =========================
            /// PUSH rs ; stack[sp++] = rs
            Push = 0x01, "PUSH" => [src: Reg], 2,
            /// POP rd ; rd = stack[--sp]
            Pop = 0x02, "POP" => [dst: Reg], 2,
            // =========================
            // Loads and stores
            // =========================
            /// LOAD_IMMEDIATE rd, imm64 ; rd = imm64
            LoadImmediate = 0x03, "LOAD_IMMEDIATE" => [dst: Reg, value: ImmI64], 10,
            /// LOAD_REGISTER rd, rs ; rd = rs
            LoadRegister = 0x04, "LOAD_REGISTER" => [dst: Reg, src: Reg], 3,
            /// LOAD_MEMORY rd, ra ; rd = heap[ra] (sets flags)
            LoadMemory = 0x05, "LOAD_MEMORY" => [dst: Reg, addr: Reg], 3,
            /// STORE_MEMORY rs, ra ; heap[ra] = rs
            StoreMemory = 0x06, "STORE_MEMORY" => [src: Reg, addr: Reg], 3,
            // =========================
            // Integer arithmetic
            // =========================
            /// ADD rd, rs1, rs2 ; rd = rs1 + rs2 (wrapping)
            Add = 0x07, "ADD" => [dst: Reg, src1: Reg, src2: Reg], 4,
            /// SUB rd, rs1, rs2 ; rd = rs1 - rs2 (wrapping)
            Sub = 0x08, "SUB" => [dst: Reg, src1: Reg, src2: Reg], 4,
            /// MUL rd, rs1, rs2 ; rd = rs1 * rs2 (wrapping, sets flags)
            Mul = 0x09, "MUL" => [dst: Reg, src1: Reg, src2: Reg], 4,
            /// DIV rd, rs1, rs2 ; rd = rs1 / rs2 (trap on zero divisor, sets flags)
            Div = 0x0A, "DIV" => [dst: Reg, src1: Reg, src2: Reg], 4,
            /// MOD rd, rs1, rs2 ; rd = rs1 % rs2 (trap on zero divisor, sets flags)
            Mod = 0x0B, "MOD" => [dst: Reg, src1: Reg, src2: Reg], 4,
            // =========================
            // Bitwise
            // =========================
            /// AND rd, rs1, rs2 ; rd = rs1 & rs2
            And = 0x0C, "AND" => [dst: Reg, src1: Reg, src2: Reg], 4,
            /// OR rd, rs1, rs2 ; rd = rs1 | rs2
            Or = 0x0D, "OR" => [dst: Reg, src1: Reg, src2: Reg], 4,
            /// XOR rd, rs1, rs2 ; rd = rs1 ^ rs2
            Xor = 0x0E, "XOR" => [dst: Reg, src1: Reg, src2: Reg], 4,
            /// NOT rd, rs ; rd = !rs (sets flags)
            Not = 0x0F, "NOT" => [dst: Reg, src: Reg], 3,
            /// SHL rd, rs, rn ; rd = rs << rn (sets flags)
            ShiftLeft = 0x10, "SHL" => [dst: Reg, src: Reg, amount: Reg], 4,
            /// SHR rd, rs, rn ; rd = rs >> rn, zero fill (sets flags)
            ShiftRight = 0x11, "SHR" => [dst: Reg, src: Reg, amount: Reg], 4,
            /// SAR rd, rs, rn ; rd = rs >> rn, sign fill (sets flags)
            ShiftRightArithmetic = 0x12, "SAR" => [dst: Reg, src: Reg, amount: Reg], 4,
            // =========================
            // Comparison
            // =========================
            /// CMP rs1, rs2 ; flags = rs1 - rs2
            Cmp = 0x13, "CMP" => [src1: Reg, src2: Reg], 3,
            // =========================
            // Jumps, immediate target
            // =========================
            /// JMP addr ; pc = addr
            JmpImmediate = 0x14, "JMP" => [addr: Addr], 9,
            /// JZ rc, addr ; if rc == 0 then pc = addr
            JmpImmediateIfZero = 0x15, "JZ" => [check: Reg, addr: Addr], 10,
            /// JNZ rc, addr ; if rc != 0 then pc = addr
            JmpImmediateIfNotZero = 0x16, "JNZ" => [check: Reg, addr: Addr], 10,
            /// JEQ addr ; if zero then pc = addr
            JmpImmediateIfEqual = 0x17, "JEQ" => [addr: Addr], 9,
            /// JNE addr ; if !zero then pc = addr
            JmpImmediateIfNotEqual = 0x18, "JNE" => [addr: Addr], 9,
            /// JGT addr ; if !zero && !negative then pc = addr
            JmpImmediateIfGreater = 0x19, "JGT" => [addr: Addr], 9,
            /// JGE addr ; if !negative then pc = addr
            JmpImmediateIfGreaterOrEqual = 0x1A, "JGE" => [addr: Addr], 9,
            /// JLT addr ; if negative then pc = addr
            JmpImmediateIfLess = 0x1B, "JLT" => [addr: Addr], 9,
            /// JLE addr ; if negative || zero then pc = addr
            JmpImmediateIfLessOrEqual = 0x1C, "JLE" => [addr: Addr], 9,
            // =========================
            // Jumps, register target
            // =========================
            /// JMPR ra ; pc = ra
            JmpRegister = 0x1D, "JMPR" => [addr: Reg], 2,
            /// JZR rc, ra ; if rc == 0 then pc = ra
            JmpRegisterIfZero = 0x1E, "JZR" => [check: Reg, addr: Reg], 3,
            /// JNZR rc, ra ; if rc != 0 then pc = ra
            JmpRegisterIfNotZero = 0x1F, "JNZR" => [check: Reg, addr: Reg], 3,
            /// JEQR ra ; if zero then pc = ra
            JmpRegisterIfEqual = 0x20, "JEQR" => [addr: Reg], 2,
            /// JNER ra ; if !zero then pc = ra
            JmpRegisterIfNotEqual = 0x21, "JNER" => [addr: Reg], 2,
            /// JGTR ra ; if !zero && !negative then pc = ra
            JmpRegisterIfGreater = 0x22, "JGTR" => [addr: Reg], 2,
            /// JGER ra ; if !negative then pc = ra
            JmpRegisterIfGreaterOrEqual = 0x23, "JGER" => [addr: Reg], 2,
            /// JLTR ra ; if negative then pc = ra
            JmpRegisterIfLess = 0x24, "JLTR" => [addr: Reg], 2,
            /// JLER ra ; if negative || zero then pc = ra
            JmpRegisterIfLessOrEqual = 0x25, "JLER" => [addr: Reg], 2,
            // =========================
            // Subroutines and host
            // =========================
            /// CALL addr ; push pc ; pc = addr
            CallImmediate = 0x26, "CALL" => [addr: Addr], 9,
            /// CALLR ra ; push pc ; pc = ra
            CallRegister = 0x27, "CALLR" => [addr: Reg], 2,
            /// RET ; pc = pop
            Return = 0x28, "RET" => [], 1,
            /// HOST_CALL fn, ra, argc ; ra = host(fn, ra, argc, registers)
            HostCall = 0x29, "HOST_CALL" => [func: ImmI64, arg: Reg, argc: ImmU8], 11,
            /// HALT ; stop execution successfully
            Halt = 0x2A, "HALT" => [], 1,
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $len:expr
        ),* $(,)?
    ) => {
        // =========================
        // VM instruction enum
        // =========================
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        #[repr(u8)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for Instruction {
            type Error = VMError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Instruction::$name), )*
                    _ => Err(VMError::UnknownOpcode {
                        opcode: value,
                        offset: 0,
                    }),
                }
            }
        }

        impl Instruction {
            /// Every instruction, in opcode order.
            pub const ALL: &'static [Instruction] = &[ $( Instruction::$name ),* ];

            /// Returns the assembly mnemonic for this instruction.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Instruction::$name => $mnemonic, )*
                }
            }

            /// Returns the encoded size of this instruction, opcode byte included.
            pub const fn encoded_len(&self) -> usize {
                match self {
                    $( Instruction::$name => $len, )*
                }
            }
        }
    };

    // ---------- types ----------
    (@ty Reg)    => { u8 };
    (@ty ImmU8)  => { u8 };
    (@ty ImmI64) => { i64 };
    (@ty Addr)   => { u64 };

    // ---------- operand sizes ----------
    (@size Reg)    => { 1usize };
    (@size ImmU8)  => { 1usize };
    (@size ImmI64) => { 8usize };
    (@size Addr)   => { 8usize };

    // ---------- encoding ----------
    (@emit $out:ident, Reg, $v:ident) => {
        $out.push(*$v);
    };

    (@emit $out:ident, ImmU8, $v:ident) => {
        $out.push(*$v);
    };

    (@emit $out:ident, ImmI64, $v:ident) => {
        $out.extend_from_slice(&$v.to_be_bytes());
    };

    (@emit $out:ident, Addr, $v:ident) => {
        $out.extend_from_slice(&$v.to_be_bytes());
    };
}

for_each_instruction!(define_instructions);

/// Returns the encoded length of the instruction with the given opcode byte,
/// or 0 if the byte is not a known opcode.
pub fn instruction_len(opcode: u8) -> usize {
    Instruction::try_from(opcode)
        .map(|instr| instr.encoded_len())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_try_from_invalid() {
        assert!(matches!(
            Instruction::try_from(0xFF),
            Err(VMError::UnknownOpcode { opcode: 0xFF, .. })
        ));
        assert!(Instruction::try_from(0x2B).is_err());
    }

    #[test]
    fn opcodes_are_dense_from_zero() {
        for (i, instr) in Instruction::ALL.iter().enumerate() {
            assert_eq!(*instr as u8 as usize, i, "{}", instr.mnemonic());
            assert_eq!(Instruction::try_from(i as u8).unwrap(), *instr);
        }
    }

    #[test]
    fn unknown_opcode_has_zero_length() {
        assert_eq!(instruction_len(0xFF), 0);
        assert_eq!(instruction_len(0x2B), 0);
    }

    #[test]
    fn length_table_matches_encoding_table() {
        use Instruction::*;
        let expected: &[(Instruction, usize)] = &[
            (Nop, 1),
            (Return, 1),
            (Halt, 1),
            (Push, 2),
            (Pop, 2),
            (JmpRegister, 2),
            (CallRegister, 2),
            (LoadRegister, 3),
            (LoadMemory, 3),
            (StoreMemory, 3),
            (Not, 3),
            (Cmp, 3),
            (JmpRegisterIfZero, 3),
            (JmpRegisterIfNotZero, 3),
            (JmpRegisterIfEqual, 2),
            (JmpRegisterIfNotEqual, 2),
            (JmpRegisterIfGreater, 2),
            (JmpRegisterIfGreaterOrEqual, 2),
            (JmpRegisterIfLess, 2),
            (JmpRegisterIfLessOrEqual, 2),
            (Add, 4),
            (Sub, 4),
            (Mul, 4),
            (Div, 4),
            (Mod, 4),
            (And, 4),
            (Or, 4),
            (Xor, 4),
            (ShiftLeft, 4),
            (ShiftRight, 4),
            (ShiftRightArithmetic, 4),
            (JmpImmediate, 9),
            (CallImmediate, 9),
            (JmpImmediateIfEqual, 9),
            (JmpImmediateIfNotEqual, 9),
            (JmpImmediateIfGreater, 9),
            (JmpImmediateIfGreaterOrEqual, 9),
            (JmpImmediateIfLess, 9),
            (JmpImmediateIfLessOrEqual, 9),
            (JmpImmediateIfZero, 10),
            (JmpImmediateIfNotZero, 10),
            (LoadImmediate, 10),
            (HostCall, 11),
        ];
        assert_eq!(expected.len(), Instruction::ALL.len());
        for (instr, len) in expected {
            assert_eq!(instr.encoded_len(), *len, "{}", instr.mnemonic());
            assert_eq!(instruction_len(*instr as u8), *len);
        }
    }
}
