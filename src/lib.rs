//! OBPL bytecode interpreter library.
//!
//! Provides a single-threaded stack virtual machine, its instruction set,
//! a bytecode builder and disassembler, and a small colored logger.

pub mod utils;
pub mod virtual_machine;
