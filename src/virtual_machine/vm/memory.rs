use super::{Trap, WORD_SIZE};
use crate::virtual_machine::errors::VMError;
use std::ops::Range;

/// Fixed-size, zero-initialized memory region.
///
/// Words are stored little-endian. The buffer is sized once at creation and
/// never grows; every access is bounds-checked against it.
pub(super) struct Memory {
    bytes: Box<[u8]>,
}

impl Memory {
    /// Reserves and zeroes `size` bytes.
    pub(super) fn allocate(size: usize) -> Result<Self, VMError> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|_| VMError::AllocationFailure {
                buffer: "memory",
                bytes: size,
            })?;
        bytes.resize(size, 0);
        Ok(Self {
            bytes: bytes.into_boxed_slice(),
        })
    }

    /// Returns the memory size in bytes.
    pub(super) fn len(&self) -> usize {
        self.bytes.len()
    }

    pub(super) fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Resolves the byte range of the word at `address`.
    ///
    /// The whole word must lie inside the region: `address + 8 <= len`.
    fn word_range(&self, address: u64) -> Result<Range<usize>, Trap> {
        usize::try_from(address)
            .ok()
            .and_then(|start| {
                let end = start.checked_add(WORD_SIZE)?;
                (end <= self.bytes.len()).then_some(start..end)
            })
            .ok_or(Trap::MemoryOutOfRange {
                address,
                mem_size: self.bytes.len(),
            })
    }

    /// Reads the little-endian word stored at `address`.
    pub(super) fn read_word(&self, address: u64) -> Result<u64, Trap> {
        let range = self.word_range(address)?;
        let mut word = [0u8; WORD_SIZE];
        word.copy_from_slice(&self.bytes[range]);
        Ok(u64::from_le_bytes(word))
    }

    /// Writes `value` little-endian at `address`.
    pub(super) fn write_word(&mut self, address: u64, value: u64) -> Result<(), Trap> {
        let range = self.word_range(address)?;
        self.bytes[range].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_initialized() {
        let memory = Memory::allocate(32).unwrap();
        assert_eq!(memory.len(), 32);
        assert!(memory.as_slice().iter().all(|b| *b == 0));
    }

    #[test]
    fn word_round_trip_is_little_endian() {
        let mut memory = Memory::allocate(16).unwrap();
        memory.write_word(4, 0x0102_0304_0506_0708).unwrap();
        assert_eq!(memory.read_word(4).unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(&memory.as_slice()[4..12], &[8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn last_full_word_is_addressable() {
        let mut memory = Memory::allocate(16).unwrap();
        assert!(memory.write_word(8, 1).is_ok());
        assert_eq!(
            memory.write_word(9, 1),
            Err(Trap::MemoryOutOfRange {
                address: 9,
                mem_size: 16
            })
        );
    }

    #[test]
    fn huge_address_does_not_wrap() {
        let memory = Memory::allocate(16).unwrap();
        assert!(matches!(
            memory.read_word(u64::MAX - 3),
            Err(Trap::MemoryOutOfRange { .. })
        ));
    }

    #[test]
    fn empty_region_rejects_everything() {
        let memory = Memory::allocate(0).unwrap();
        assert!(memory.read_word(0).is_err());
    }
}
