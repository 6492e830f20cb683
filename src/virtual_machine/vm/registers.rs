use crate::virtual_machine::errors::VMError;

/// Number of general-purpose registers. Must stay a power of two.
pub const NUM_REGISTERS: usize = 32;

/// Mask applied to raw register operand bytes.
pub const REGISTER_MASK: u8 = (NUM_REGISTERS - 1) as u8;

/// Register file holding 32 signed 64-bit values, all zero at start.
///
/// Indices are masked to the low 5 bits, so an out-of-range operand byte
/// aliases onto a valid register instead of faulting.
#[derive(Clone, Debug)]
pub(super) struct Registers {
    regs: [i64; NUM_REGISTERS],
}

impl Registers {
    pub(super) fn new() -> Self {
        Self {
            regs: [0; NUM_REGISTERS],
        }
    }

    /// Returns the value in register `idx` (masked).
    #[inline(always)]
    pub(super) fn get(&self, idx: u8) -> i64 {
        self.regs[(idx & REGISTER_MASK) as usize]
    }

    /// Stores `value` into register `idx` (masked).
    #[inline(always)]
    pub(super) fn set(&mut self, idx: u8, value: i64) {
        self.regs[(idx & REGISTER_MASK) as usize] = value;
    }

    /// Returns the value in register `index` without masking.
    ///
    /// Returns [`VMError::RegisterOutOfBounds`] if `index` is not a register.
    pub(super) fn checked_get(&self, index: usize) -> Result<i64, VMError> {
        self.regs
            .get(index)
            .copied()
            .ok_or(VMError::RegisterOutOfBounds { index })
    }

    /// Read-only view of the whole file, as handed to host calls.
    pub(super) fn as_array(&self) -> &[i64; NUM_REGISTERS] {
        &self.regs
    }
}

/// Condition state written by `CMP` and the flag-setting arithmetic opcodes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Flags {
    /// Last result was zero.
    pub is_zero: bool,
    /// Last result was negative.
    pub is_negative: bool,
}

impl Flags {
    /// Recomputes both flags from `result`.
    #[inline(always)]
    pub(super) fn update(&mut self, result: i64) {
        self.is_zero = result == 0;
        self.is_negative = result < 0;
    }

    /// Evaluates a comparison condition against the current flags.
    pub(super) fn holds(&self, condition: Condition) -> bool {
        match condition {
            Condition::Equal => self.is_zero,
            Condition::NotEqual => !self.is_zero,
            Condition::Greater => !self.is_zero && !self.is_negative,
            Condition::GreaterOrEqual => !self.is_negative,
            Condition::Less => self.is_negative,
            Condition::LessOrEqual => self.is_negative || self.is_zero,
        }
    }
}

/// Comparison outcome tested by the flag-conditional jumps.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum Condition {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

/// Register test used by the `JZ`/`JNZ` family, independent of the flags.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum ZeroTest {
    Zero,
    NotZero,
}

impl ZeroTest {
    pub(super) fn holds(self, value: i64) -> bool {
        match self {
            ZeroTest::Zero => value == 0,
            ZeroTest::NotZero => value != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_index_wraps() {
        let mut regs = Registers::new();
        regs.set(33, 7);
        assert_eq!(regs.get(1), 7);
        assert_eq!(regs.get(0xE1), 7);
    }

    #[test]
    fn checked_get_rejects_out_of_range() {
        let regs = Registers::new();
        assert_eq!(regs.checked_get(31), Ok(0));
        assert_eq!(
            regs.checked_get(32),
            Err(VMError::RegisterOutOfBounds { index: 32 })
        );
    }

    #[test]
    fn flags_from_result() {
        let mut flags = Flags::default();
        flags.update(0);
        assert_eq!(
            flags,
            Flags {
                is_zero: true,
                is_negative: false
            }
        );
        flags.update(-3);
        assert_eq!(
            flags,
            Flags {
                is_zero: false,
                is_negative: true
            }
        );
        flags.update(9);
        assert_eq!(flags, Flags::default());
    }

    #[test]
    fn conditions_follow_cmp_semantics() {
        // (a - b) for a = 2, b = 1 / a = b / a = 1, b = 2
        let mut greater = Flags::default();
        greater.update(1);
        let mut equal = Flags::default();
        equal.update(0);
        let mut less = Flags::default();
        less.update(-1);

        let table = [
            (Condition::Equal, [false, true, false]),
            (Condition::NotEqual, [true, false, true]),
            (Condition::Greater, [true, false, false]),
            (Condition::GreaterOrEqual, [true, true, false]),
            (Condition::Less, [false, false, true]),
            (Condition::LessOrEqual, [false, true, true]),
        ];
        for (condition, [g, e, l]) in table {
            assert_eq!(greater.holds(condition), g, "{condition:?} greater");
            assert_eq!(equal.holds(condition), e, "{condition:?} equal");
            assert_eq!(less.holds(condition), l, "{condition:?} less");
        }
    }

    #[test]
    fn zero_test() {
        assert!(ZeroTest::Zero.holds(0));
        assert!(!ZeroTest::Zero.holds(-1));
        assert!(ZeroTest::NotZero.holds(5));
        assert!(!ZeroTest::NotZero.holds(0));
    }
}
