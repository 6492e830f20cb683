use crate::virtual_machine::errors::VMError;

/// Number of slots in the VM stack.
pub const STACK_SIZE: usize = 1024;

/// Fixed-capacity stack of `i64` slots shared by `PUSH`/`POP` and `CALL`/`RET`.
///
/// `sp` counts occupied slots; `stack[sp]` is the next free slot.
pub(super) struct Stack {
    slots: Box<[i64]>,
    sp: usize,
}

impl Stack {
    pub(super) fn new() -> Self {
        Self {
            slots: vec![0; STACK_SIZE].into_boxed_slice(),
            sp: 0,
        }
    }

    /// Number of occupied slots.
    pub(super) fn sp(&self) -> usize {
        self.sp
    }

    /// Fails with [`VMError::StackOverflow`] if no slot is free.
    pub(super) fn ensure_room(&self) -> Result<(), VMError> {
        if self.sp >= self.slots.len() {
            return Err(VMError::StackOverflow {
                capacity: self.slots.len(),
            });
        }
        Ok(())
    }

    pub(super) fn push(&mut self, value: i64) -> Result<(), VMError> {
        self.ensure_room()?;
        self.slots[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    pub(super) fn pop(&mut self) -> Result<i64, VMError> {
        let value = self.peek()?;
        self.sp -= 1;
        Ok(value)
    }

    /// Returns the top slot without removing it.
    pub(super) fn peek(&self) -> Result<i64, VMError> {
        match self.sp {
            0 => Err(VMError::StackUnderflow),
            sp => Ok(self.slots[sp - 1]),
        }
    }

    /// Occupied slots, bottom first.
    pub(super) fn as_slice(&self) -> &[i64] {
        &self.slots[..self.sp]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_lifo() {
        let mut stack = Stack::new();
        stack.push(1).unwrap();
        stack.push(2).unwrap();
        assert_eq!(stack.as_slice(), &[1, 2]);
        assert_eq!(stack.pop(), Ok(2));
        assert_eq!(stack.pop(), Ok(1));
        assert_eq!(stack.sp(), 0);
    }

    #[test]
    fn pop_empty_underflows() {
        let mut stack = Stack::new();
        assert_eq!(stack.pop(), Err(VMError::StackUnderflow));
        assert_eq!(stack.peek(), Err(VMError::StackUnderflow));
    }

    #[test]
    fn push_full_overflows_without_writing() {
        let mut stack = Stack::new();
        for i in 0..STACK_SIZE {
            stack.push(i as i64).unwrap();
        }
        assert_eq!(
            stack.push(-1),
            Err(VMError::StackOverflow {
                capacity: STACK_SIZE
            })
        );
        assert_eq!(stack.sp(), STACK_SIZE);
        assert_eq!(stack.peek(), Ok(STACK_SIZE as i64 - 1));
    }
}
