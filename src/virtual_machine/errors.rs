use thiserror::Error;

/// Coarse classification of a [`VMError`].
///
/// Hosts that only need to branch on the failure category match on this
/// instead of the detailed variant.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    AlreadyInitialized,
    NotInitialized,
    AllocationFailure,
    InvalidConfig,
    StackOverflow,
    StackUnderflow,
    CallStackOverflow,
    CallStackUnderflow,
    DivideByZero,
    OutOfRange,
    TruncatedBytecode,
    UnknownOpcode,
    Decode,
}

/// Errors raised by the VM lifecycle, the interpreter loop and the bytecode tooling.
///
/// Every execution trap records `ip`, the offset of the opcode byte of the
/// instruction that faulted.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum VMError {
    /// `initialize` called on a handle that still owns its buffers.
    #[error("vm instance is already initialized")]
    AlreadyInitialized,
    /// Operation on a destroyed handle, or `execute` before any `load`.
    #[error("vm instance is not initialized")]
    NotInitialized,
    /// A buffer could not be reserved.
    #[error("failed to allocate {bytes} bytes for {buffer}")]
    AllocationFailure { buffer: &'static str, bytes: usize },
    /// Configuration rejected before any buffer was acquired.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: &'static str },
    /// Push beyond the operand stack capacity.
    #[error("stack overflow at ip {ip}: capacity {capacity}")]
    StackOverflow { ip: usize, capacity: usize },
    /// Fewer operands than the instruction requires.
    #[error("stack underflow at ip {ip}: needed {needed}, available {available}")]
    StackUnderflow {
        ip: usize,
        needed: usize,
        available: usize,
    },
    /// CALL beyond the configured maximum call depth.
    #[error("call stack overflow at ip {ip}: max depth {max_depth}")]
    CallStackOverflow { ip: usize, max_depth: usize },
    /// RET with an empty call stack.
    #[error("return without call at ip {ip}")]
    CallStackUnderflow { ip: usize },
    /// DIV with a zero divisor.
    #[error("division by zero at ip {ip}")]
    DivideByZero { ip: usize },
    /// LOAD/STORE outside the memory region.
    #[error("memory access out of range at ip {ip}: address {address}, memory size {mem_size}")]
    MemoryOutOfRange {
        ip: usize,
        address: u64,
        mem_size: usize,
    },
    /// JMP/JMPIF/CALL target outside the bytecode.
    #[error("jump target out of range at ip {ip}: target {target}, bytecode size {bytecode_size}")]
    JumpOutOfRange {
        ip: usize,
        target: u64,
        bytecode_size: usize,
    },
    /// An immediate operand extends past the end of the bytecode.
    #[error("truncated bytecode at ip {ip}: needed {requested} bytes, {available} available")]
    TruncatedBytecode {
        ip: usize,
        requested: usize,
        available: usize,
    },
    /// Byte at the instruction pointer is not an opcode.
    #[error("unknown opcode 0x{opcode:02x} at ip {ip}")]
    UnknownOpcode { ip: usize, opcode: u8 },
    /// Label referenced by the program builder but never placed.
    #[error("undefined label: {label}")]
    UndefinedLabel { label: String },
    /// Label placed twice in the program builder.
    #[error("duplicate label: {label}")]
    DuplicateLabel { label: String },
    /// Program container could not be decoded.
    #[error("decoding error: {reason}")]
    Decode { reason: String },
}

impl VMError {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VMError::AlreadyInitialized => ErrorKind::AlreadyInitialized,
            VMError::NotInitialized => ErrorKind::NotInitialized,
            VMError::AllocationFailure { .. } => ErrorKind::AllocationFailure,
            VMError::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            VMError::StackOverflow { .. } => ErrorKind::StackOverflow,
            VMError::StackUnderflow { .. } => ErrorKind::StackUnderflow,
            VMError::CallStackOverflow { .. } => ErrorKind::CallStackOverflow,
            VMError::CallStackUnderflow { .. } => ErrorKind::CallStackUnderflow,
            VMError::DivideByZero { .. } => ErrorKind::DivideByZero,
            VMError::MemoryOutOfRange { .. } | VMError::JumpOutOfRange { .. } => {
                ErrorKind::OutOfRange
            }
            VMError::TruncatedBytecode { .. } => ErrorKind::TruncatedBytecode,
            VMError::UnknownOpcode { .. } => ErrorKind::UnknownOpcode,
            VMError::UndefinedLabel { .. }
            | VMError::DuplicateLabel { .. }
            | VMError::Decode { .. } => ErrorKind::Decode,
        }
    }

    /// Returns the offset of the faulting opcode for execution traps.
    pub fn ip(&self) -> Option<usize> {
        match self {
            VMError::StackOverflow { ip, .. }
            | VMError::StackUnderflow { ip, .. }
            | VMError::CallStackOverflow { ip, .. }
            | VMError::CallStackUnderflow { ip }
            | VMError::DivideByZero { ip }
            | VMError::MemoryOutOfRange { ip, .. }
            | VMError::JumpOutOfRange { ip, .. }
            | VMError::TruncatedBytecode { ip, .. }
            | VMError::UnknownOpcode { ip, .. } => Some(*ip),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_variants_share_a_kind() {
        let mem = VMError::MemoryOutOfRange {
            ip: 3,
            address: 100,
            mem_size: 16,
        };
        let jump = VMError::JumpOutOfRange {
            ip: 7,
            target: 99,
            bytecode_size: 10,
        };
        assert_eq!(mem.kind(), ErrorKind::OutOfRange);
        assert_eq!(jump.kind(), ErrorKind::OutOfRange);
        assert_eq!(mem.ip(), Some(3));
        assert_eq!(jump.ip(), Some(7));
    }

    #[test]
    fn lifecycle_errors_have_no_ip() {
        assert_eq!(VMError::NotInitialized.ip(), None);
        assert_eq!(VMError::AlreadyInitialized.ip(), None);
    }

    #[test]
    fn display_includes_location() {
        let err = VMError::UnknownOpcode {
            ip: 12,
            opcode: 0xAB,
        };
        assert_eq!(err.to_string(), "unknown opcode 0xab at ip 12");
        assert_eq!(
            VMError::DivideByZero { ip: 18 }.to_string(),
            "division by zero at ip 18"
        );
    }
}
