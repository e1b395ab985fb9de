//! Sizing parameters for a VM instance.

use crate::virtual_machine::errors::VMError;

/// Default memory region size in bytes.
pub const DEFAULT_MEM_SIZE: u32 = 64 * 1024;
/// Default operand stack capacity in 64-bit words.
pub const DEFAULT_STACK_SIZE: u32 = 1024;
/// Default maximum number of nested CALLs.
pub const DEFAULT_MAX_CALL_DEPTH: u32 = 256;

/// Buffer sizes fixed at VM creation. None of them change for the lifetime
/// of the instance.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VmConfig {
    /// Memory region size in bytes.
    pub mem_size: u32,
    /// Operand stack capacity in words.
    pub stack_size: u32,
    /// Maximum call stack depth.
    pub max_call_depth: u32,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            mem_size: DEFAULT_MEM_SIZE,
            stack_size: DEFAULT_STACK_SIZE,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl VmConfig {
    pub const fn new(mem_size: u32, stack_size: u32, max_call_depth: u32) -> Self {
        Self {
            mem_size,
            stack_size,
            max_call_depth,
        }
    }

    pub const fn with_mem_size(mut self, mem_size: u32) -> Self {
        self.mem_size = mem_size;
        self
    }

    pub const fn with_stack_size(mut self, stack_size: u32) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub const fn with_max_call_depth(mut self, max_call_depth: u32) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }

    /// Rejects sizes that would make every program trap.
    ///
    /// A zero-sized memory region is accepted: programs that never touch
    /// memory still run.
    pub fn validate(&self) -> Result<(), VMError> {
        if self.stack_size == 0 {
            return Err(VMError::InvalidConfig {
                reason: "stack size must be at least one word",
            });
        }
        if self.max_call_depth == 0 {
            return Err(VMError::InvalidConfig {
                reason: "max call depth must be at least one",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(VmConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_stack_rejected() {
        let config = VmConfig::default().with_stack_size(0);
        assert!(matches!(
            config.validate(),
            Err(VMError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn zero_call_depth_rejected() {
        let config = VmConfig::default().with_max_call_depth(0);
        assert!(matches!(
            config.validate(),
            Err(VMError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn zero_memory_allowed() {
        assert!(VmConfig::new(0, 4, 1).validate().is_ok());
    }
}
