//! Bytecode programs and a programmatic encoder.
//!
//! [`Program`] is the immutable byte sequence a [`VM`](super::vm::VM) executes.
//! [`ProgramBuilder`] assembles one from [`Op`] values, which are generated from
//! the ISA definition list so operand layouts cannot drift from the decoder.

use crate::virtual_machine::isa::Instruction;

/// Bytecode executed by the VM, magic header included.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Program {
    bytes: Vec<u8>,
}

impl Program {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<Vec<u8>> for Program {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for Program {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for Program {
    fn from(bytes: [u8; N]) -> Self {
        Self::new(bytes.to_vec())
    }
}

impl AsRef<[u8]> for Program {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

macro_rules! define_program_ops {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $len:expr
        ),* $(,)?
    ) => {
        // =========================
        // Encoder IR
        // =========================
        /// One instruction with its operands, ready to be encoded.
        #[derive(Clone, Copy, Debug, Eq, PartialEq)]
        pub enum Op {
            $(
                $(#[$doc])*
                $name {
                    $( $field: crate::define_instructions!(@ty $kind) ),*
                },
            )*
        }

        impl Op {
            /// Returns the instruction this op encodes.
            pub const fn instruction(&self) -> Instruction {
                match self {
                    $( Op::$name { .. } => Instruction::$name, )*
                }
            }

            /// Appends the encoded instruction to `out`.
            pub fn encode(&self, out: &mut Vec<u8>) {
                match self {
                    $(
                        Op::$name { $( $field ),* } => {
                            out.push($opcode);
                            $(
                                crate::define_instructions!(@emit out, $kind, $field);
                            )*
                        }
                    ),*
                }
            }
        }
    };
}

crate::for_each_instruction!(define_program_ops);

impl Instruction {
    /// Offset of the 8-byte address operand within the instruction, for
    /// instructions with an immediate jump or call target.
    pub const fn address_operand(&self) -> Option<usize> {
        use Instruction::*;
        match self {
            JmpImmediate
            | JmpImmediateIfEqual
            | JmpImmediateIfNotEqual
            | JmpImmediateIfGreater
            | JmpImmediateIfGreaterOrEqual
            | JmpImmediateIfLess
            | JmpImmediateIfLessOrEqual
            | CallImmediate => Some(1),
            JmpImmediateIfZero | JmpImmediateIfNotZero => Some(2),
            _ => None,
        }
    }
}

/// Incrementally encodes a [`Program`].
///
/// Forward jumps are emitted with a placeholder target and fixed up with
/// [`patch_target`](Self::patch_target) once the destination offset is known.
#[derive(Clone, Debug, Default)]
pub struct ProgramBuilder {
    code: Vec<u8>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a program with `header` as its magic prefix.
    pub fn with_magic_header(header: &[u8]) -> Self {
        Self {
            code: header.to_vec(),
        }
    }

    /// Offset the next emitted instruction will start at.
    pub fn offset(&self) -> u64 {
        self.code.len() as u64
    }

    pub fn emit(&mut self, op: Op) -> &mut Self {
        op.encode(&mut self.code);
        self
    }

    pub fn emit_all(&mut self, ops: impl IntoIterator<Item = Op>) -> &mut Self {
        for op in ops {
            self.emit(op);
        }
        self
    }

    /// Appends raw bytes, e.g. a deliberately truncated instruction.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.code.extend_from_slice(bytes);
        self
    }

    /// Rewrites the target of the immediate jump or call starting at `at`.
    ///
    /// Returns false, leaving the code untouched, if no complete immediate
    /// jump or call starts at `at`.
    #[must_use]
    pub fn patch_target(&mut self, at: u64, target: u64) -> bool {
        let Ok(at) = usize::try_from(at) else {
            return false;
        };
        let Some(instr) = self
            .code
            .get(at)
            .and_then(|&opcode| Instruction::try_from(opcode).ok())
        else {
            return false;
        };
        let Some(field) = instr.address_operand() else {
            return false;
        };
        if at + instr.encoded_len() > self.code.len() {
            return false;
        }
        self.code[at + field..at + field + 8].copy_from_slice(&target.to_be_bytes());
        true
    }

    pub fn build(&self) -> Program {
        Program::new(self.code.clone())
    }

    pub fn into_program(self) -> Program {
        Program::new(self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! zeroed_ops {
        (
            $( $(#[$doc:meta])* $name:ident = $opcode:expr, $mnemonic:literal => [ $( $field:ident : $kind:ident ),* $(,)? ], $len:expr ),* $(,)?
        ) => {
            vec![ $( Op::$name { $( $field: 0 ),* } ),* ]
        };
    }

    #[test]
    fn every_op_encodes_to_its_table_length() {
        let ops: Vec<Op> = crate::for_each_instruction!(zeroed_ops);
        assert_eq!(ops.len(), Instruction::ALL.len());
        for op in ops {
            let mut out = Vec::new();
            op.encode(&mut out);
            let instr = op.instruction();
            assert_eq!(out.len(), instr.encoded_len(), "{}", instr.mnemonic());
            assert_eq!(out[0], instr as u8);
        }
    }

    #[test]
    fn immediates_are_big_endian() {
        let mut out = Vec::new();
        Op::LoadImmediate { dst: 1, value: -2 }.encode(&mut out);
        assert_eq!(out, [0x03, 1, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE]);

        out.clear();
        Op::JmpImmediateIfZero {
            check: 4,
            addr: 0x0102,
        }
        .encode(&mut out);
        assert_eq!(out, [0x15, 4, 0, 0, 0, 0, 0, 0, 0x01, 0x02]);

        out.clear();
        Op::HostCall {
            func: 7,
            arg: 2,
            argc: 3,
        }
        .encode(&mut out);
        assert_eq!(out, [0x29, 0, 0, 0, 0, 0, 0, 0, 7, 2, 3]);
    }

    #[test]
    fn builder_tracks_offsets_and_header() {
        let mut b = ProgramBuilder::with_magic_header(b"RVM");
        assert_eq!(b.offset(), 3);
        b.emit(Op::Nop {}).emit(Op::Push { src: 0 });
        assert_eq!(b.offset(), 6);
        let program = b.into_program();
        assert_eq!(program.as_bytes(), b"RVM\x00\x01\x00");
    }

    #[test]
    fn patch_target_rewrites_address_operand() {
        let mut b = ProgramBuilder::new();
        let jz = b.offset();
        b.emit(Op::JmpImmediateIfZero { check: 0, addr: 0 });
        let call = b.offset();
        b.emit(Op::CallImmediate { addr: 0 });
        let end = b.offset();
        assert!(b.patch_target(jz, end));
        assert!(b.patch_target(call, 3));
        let program = b.build();
        assert_eq!(&program.as_bytes()[2..10], &end.to_be_bytes());
        assert_eq!(&program.as_bytes()[11..19], &3u64.to_be_bytes());
    }

    #[test]
    fn patch_target_rejects_non_jumps() {
        let mut b = ProgramBuilder::new();
        b.emit(Op::Add {
            dst: 0,
            src1: 0,
            src2: 0,
        });
        b.raw(&[Instruction::JmpImmediate as u8, 0, 0]);
        assert!(!b.patch_target(0, 1));
        assert!(!b.patch_target(4, 1));
        assert!(!b.patch_target(99, 1));
    }
}
