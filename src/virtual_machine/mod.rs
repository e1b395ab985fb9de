//! Stack-based bytecode virtual machine.
//!
//! # Architecture
//!
//! - **Memory region**: fixed-size, zero-initialized byte buffer addressed by LOAD/STORE
//! - **Operand stack**: bounded stack of unsigned 64-bit words
//! - **Call stack**: bounded stack of return addresses for CALL/RET
//! - **Instruction format**: 1-byte opcode, optionally followed by an 8-byte
//!   little-endian operand
//! - **Execution model**: fetch-decode-execute until END, end of bytecode, or a trap
//!
//! # Modules
//!
//! - [`builder`]: Programmatic bytecode emission with labels
//! - [`config`]: Instance sizing
//! - [`disasm`]: Bytecode listing
//! - [`errors`]: Lifecycle and execution error types
//! - [`isa`]: Instruction set definition and opcode mappings
//! - [`output`]: Host sink for PRINT
//! - [`program`]: Versioned on-disk program container
//! - [`vm`]: Core virtual machine implementation

pub mod builder;
pub mod config;
pub mod disasm;
pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod output;
pub mod program;
pub mod vm;
