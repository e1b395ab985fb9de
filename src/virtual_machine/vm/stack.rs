use super::Trap;
use crate::virtual_machine::errors::VMError;

/// Operand stack of 64-bit words with a fixed capacity.
///
/// The backing storage is reserved up front, so a push within capacity
/// never reallocates. `len()` is the stack pointer: the number of live words.
pub(super) struct OperandStack {
    words: Vec<u64>,
    capacity: usize,
}

impl OperandStack {
    /// Reserves room for `capacity` words.
    pub(super) fn allocate(capacity: usize) -> Result<Self, VMError> {
        let mut words = Vec::new();
        words
            .try_reserve_exact(capacity)
            .map_err(|_| VMError::AllocationFailure {
                buffer: "operand stack",
                bytes: capacity.saturating_mul(size_of::<u64>()),
            })?;
        Ok(Self { words, capacity })
    }

    pub(super) fn len(&self) -> usize {
        self.words.len()
    }

    pub(super) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Live words, bottom first.
    pub(super) fn as_slice(&self) -> &[u64] {
        &self.words
    }

    /// Fails unless at least `needed` words are live.
    pub(super) fn require(&self, needed: usize) -> Result<(), Trap> {
        if self.words.len() < needed {
            return Err(Trap::StackUnderflow {
                needed,
                available: self.words.len(),
            });
        }
        Ok(())
    }

    pub(super) fn push(&mut self, value: u64) -> Result<(), Trap> {
        if self.words.len() >= self.capacity {
            return Err(Trap::StackOverflow {
                capacity: self.capacity,
            });
        }
        self.words.push(value);
        Ok(())
    }

    pub(super) fn pop(&mut self) -> Result<u64, Trap> {
        self.require(1)?;
        self.words.pop().ok_or(Trap::StackUnderflow {
            needed: 1,
            available: 0,
        })
    }

    /// Returns the top word without removing it.
    pub(super) fn peek(&self) -> Result<u64, Trap> {
        self.words.last().copied().ok_or(Trap::StackUnderflow {
            needed: 1,
            available: 0,
        })
    }

    /// Replaces the top two words `a b` with `op(a, b)`.
    ///
    /// The stack is left untouched when `op` fails or fewer than two words are live.
    pub(super) fn binary<F>(&mut self, op: F) -> Result<(), Trap>
    where
        F: FnOnce(u64, u64) -> Result<u64, Trap>,
    {
        self.require(2)?;
        let len = self.words.len();
        let result = op(self.words[len - 2], self.words[len - 1])?;
        self.words.truncate(len - 1);
        self.words[len - 2] = result;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_lifo() {
        let mut stack = OperandStack::allocate(4).unwrap();
        for v in [1, 2, 3] {
            stack.push(v).unwrap();
        }
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.pop().unwrap(), 3);
        assert_eq!(stack.pop().unwrap(), 2);
        assert_eq!(stack.pop().unwrap(), 1);
        assert_eq!(stack.len(), 0);
    }

    #[test]
    fn overflow_at_capacity() {
        let mut stack = OperandStack::allocate(2).unwrap();
        stack.push(1).unwrap();
        stack.push(2).unwrap();
        assert_eq!(stack.push(3), Err(Trap::StackOverflow { capacity: 2 }));
        assert_eq!(stack.as_slice(), &[1, 2]);
    }

    #[test]
    fn underflow_on_empty() {
        let mut stack = OperandStack::allocate(2).unwrap();
        assert!(matches!(stack.pop(), Err(Trap::StackUnderflow { .. })));
        assert!(matches!(stack.peek(), Err(Trap::StackUnderflow { .. })));
    }

    #[test]
    fn binary_replaces_top_two() {
        let mut stack = OperandStack::allocate(4).unwrap();
        stack.push(10).unwrap();
        stack.push(7).unwrap();
        stack.push(3).unwrap();
        stack.binary(|a, b| Ok(a - b)).unwrap();
        assert_eq!(stack.as_slice(), &[10, 4]);
    }

    #[test]
    fn failed_binary_leaves_stack_intact() {
        let mut stack = OperandStack::allocate(4).unwrap();
        stack.push(7).unwrap();
        stack.push(0).unwrap();
        let err = stack.binary(|_, _| Err(Trap::DivideByZero));
        assert_eq!(err, Err(Trap::DivideByZero));
        assert_eq!(stack.as_slice(), &[7, 0]);

        stack.pop().unwrap();
        assert_eq!(
            stack.binary(|a, b| Ok(a + b)),
            Err(Trap::StackUnderflow {
                needed: 2,
                available: 1
            })
        );
        assert_eq!(stack.as_slice(), &[7]);
    }
}
