use crate::virtual_machine::errors::VMError;

/// Number of cells in the VM heap.
pub const HEAP_SIZE: usize = 65536;

/// Word-addressed heap memory used by `LOAD_MEMORY` and `STORE_MEMORY`.
///
/// Every cell holds one `i64` and starts at zero. Addresses come straight from
/// register values, so they are validated on every access.
pub(super) struct Heap {
    cells: Box<[i64]>,
}

impl Heap {
    pub(super) fn new() -> Self {
        Self {
            cells: vec![0; HEAP_SIZE].into_boxed_slice(),
        }
    }

    /// Maps a register value to a cell index.
    ///
    /// Returns [`VMError::MemoryAddressOutOfBounds`] unless `0 <= addr < HEAP_SIZE`.
    fn index(&self, addr: i64) -> Result<usize, VMError> {
        usize::try_from(addr)
            .ok()
            .filter(|&i| i < self.cells.len())
            .ok_or(VMError::MemoryAddressOutOfBounds {
                address: addr as i128,
                limit: self.cells.len(),
            })
    }

    pub(super) fn load(&self, addr: i64) -> Result<i64, VMError> {
        let i = self.index(addr)?;
        Ok(self.cells[i])
    }

    pub(super) fn store(&mut self, addr: i64, value: i64) -> Result<(), VMError> {
        let i = self.index(addr)?;
        self.cells[i] = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_load() {
        let mut heap = Heap::new();
        heap.store(0, -5).unwrap();
        heap.store(HEAP_SIZE as i64 - 1, 9).unwrap();
        assert_eq!(heap.load(0), Ok(-5));
        assert_eq!(heap.load(HEAP_SIZE as i64 - 1), Ok(9));
        assert_eq!(heap.load(1), Ok(0));
    }

    #[test]
    fn rejects_negative_and_past_end() {
        let mut heap = Heap::new();
        assert_eq!(
            heap.load(-1),
            Err(VMError::MemoryAddressOutOfBounds {
                address: -1,
                limit: HEAP_SIZE
            })
        );
        assert_eq!(
            heap.store(HEAP_SIZE as i64, 1),
            Err(VMError::MemoryAddressOutOfBounds {
                address: HEAP_SIZE as i128,
                limit: HEAP_SIZE
            })
        );
    }
}
