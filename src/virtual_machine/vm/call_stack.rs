use super::Trap;
use crate::virtual_machine::errors::VMError;

/// Return addresses pushed by CALL, bounded by the configured maximum depth.
pub(super) struct CallStack {
    /// Bytecode offsets to resume at, innermost last.
    frames: Vec<usize>,
    max_depth: usize,
}

impl CallStack {
    pub(super) fn allocate(max_depth: usize) -> Result<Self, VMError> {
        let mut frames = Vec::new();
        frames
            .try_reserve_exact(max_depth)
            .map_err(|_| VMError::AllocationFailure {
                buffer: "call stack",
                bytes: max_depth.saturating_mul(size_of::<usize>()),
            })?;
        Ok(Self { frames, max_depth })
    }

    pub(super) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(super) fn push(&mut self, return_addr: usize) -> Result<(), Trap> {
        if self.frames.len() >= self.max_depth {
            return Err(Trap::CallStackOverflow {
                max_depth: self.max_depth,
            });
        }
        self.frames.push(return_addr);
        Ok(())
    }

    pub(super) fn pop(&mut self) -> Result<usize, Trap> {
        self.frames.pop().ok_or(Trap::CallStackUnderflow)
    }

    pub(super) fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_is_bounded() {
        let mut calls = CallStack::allocate(2).unwrap();
        calls.push(10).unwrap();
        calls.push(20).unwrap();
        assert_eq!(calls.push(30), Err(Trap::CallStackOverflow { max_depth: 2 }));
        assert_eq!(calls.depth(), 2);
        assert_eq!(calls.pop().unwrap(), 20);
        assert_eq!(calls.pop().unwrap(), 10);
        assert_eq!(calls.pop(), Err(Trap::CallStackUnderflow));
    }

    #[test]
    fn clear_empties_frames() {
        let mut calls = CallStack::allocate(4).unwrap();
        calls.push(1).unwrap();
        calls.clear();
        assert_eq!(calls.depth(), 0);
    }
}
