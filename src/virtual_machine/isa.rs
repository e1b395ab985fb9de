//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical instruction table and hands it to a callback macro, so the
//! opcode enum, the builder and the static ISA check are all generated from
//! one list.
//!
//! # Bytecode Format
//!
//! - Opcode: 1 byte
//! - Operand (when present): 8 bytes, unsigned little-endian
//!
//! There is no header; a program is the raw instruction stream.

use crate::virtual_machine::errors::VMError;

/// Size in bytes of every immediate operand.
pub const OPERAND_SIZE: usize = 8;

/// Invokes a callback macro with the complete instruction definition list.
///
/// Each entry reads `Name = opcode, "MNEMONIC" => [operands], pops => pushes`
/// where `pops`/`pushes` describe the operand stack effect.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Stack
            // =========================
            /// PUSH imm ; push imm
            Push = 0x01, "PUSH" => [value: Imm], 0 => 1,
            /// POP ; discard top of stack
            Pop = 0x02, "POP" => [], 1 => 0,
            // =========================
            // Arithmetic (wrapping, unsigned)
            // =========================
            /// ADD ; a b -> a+b
            Add = 0x03, "ADD" => [], 2 => 1,
            /// SUB ; a b -> a-b
            Sub = 0x04, "SUB" => [], 2 => 1,
            /// MUL ; a b -> a*b
            Mul = 0x05, "MUL" => [], 2 => 1,
            /// DIV ; a b -> a/b (trap on b = 0)
            Div = 0x06, "DIV" => [], 2 => 1,
            // =========================
            // Memory
            // =========================
            /// STORE addr ; value -> , mem[addr..addr+8] = value
            Store = 0x07, "STORE" => [address: Addr], 1 => 0,
            /// LOAD addr ; -> mem[addr..addr+8]
            Load = 0x08, "LOAD" => [address: Addr], 0 => 1,
            /// PRINT ; emit top of stack without popping
            Print = 0x09, "PRINT" => [], 1 => 1,
            // =========================
            // Control flow
            // =========================
            /// CALL target ; push return address, ip = target
            Call = 0x0A, "CALL" => [target: Target], 0 => 0,
            /// RET ; ip = popped return address
            Ret = 0x0B, "RET" => [], 0 => 0,
            /// JMP target ; ip = target
            Jmp = 0x0C, "JMP" => [target: Target], 0 => 0,
            /// JMPIF target ; cond -> , ip = target if cond != 0
            JmpIf = 0x0D, "JMPIF" => [target: Target], 1 => 0,
            // =========================
            // Comparison (unsigned)
            // =========================
            /// EQ ; a b -> a==b
            Eq = 0x0E, "EQ" => [], 2 => 1,
            /// GT ; a b -> a>b
            Gt = 0x0F, "GT" => [], 2 => 1,
            /// LT ; a b -> a<b
            Lt = 0x10, "LT" => [], 2 => 1,
            /// END ; stop execution
            End = 0x11, "END" => [], 0 => 0,
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $pops:expr => $pushes:expr
        ),* $(,)?
    ) => {
        /// VM instruction, discriminant is the encoded opcode byte.
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for Instruction {
            type Error = VMError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Instruction::$name), )*
                    _ => Err(VMError::UnknownOpcode {
                        ip: 0,
                        opcode: value,
                    }),
                }
            }
        }

        impl Instruction {
            /// Every instruction in opcode order.
            pub const ALL: &'static [Instruction] = &[ $( Instruction::$name, )* ];

            /// Returns the assembly mnemonic for this instruction.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Instruction::$name => $mnemonic, )*
                }
            }

            /// Looks up an instruction by mnemonic (case-insensitive).
            pub fn from_mnemonic(name: &str) -> Option<Instruction> {
                $(
                    if name.eq_ignore_ascii_case($mnemonic) {
                        return Some(Instruction::$name);
                    }
                )*
                None
            }

            /// Returns the kind of the immediate operand, if any.
            pub const fn operand(&self) -> Option<OperandKind> {
                match self {
                    $( Instruction::$name => define_instructions!(@operand $($kind)*), )*
                }
            }

            /// Number of operand stack entries the instruction reads.
            pub const fn stack_inputs(&self) -> usize {
                match self {
                    $( Instruction::$name => $pops, )*
                }
            }

            /// Number of operand stack entries present after the instruction.
            pub const fn stack_outputs(&self) -> usize {
                match self {
                    $( Instruction::$name => $pushes, )*
                }
            }
        }
    };

    (@operand) => { None };
    (@operand $kind:ident) => { Some(OperandKind::$kind) };
}

for_each_instruction!(define_instructions);

/// Interpretation of an 8-byte immediate operand.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum OperandKind {
    /// Literal stack word.
    Imm,
    /// Byte offset into the memory region.
    Addr,
    /// Absolute byte offset into the bytecode.
    Target,
}

impl Instruction {
    /// Encoded size in bytes: opcode plus operand.
    pub const fn encoded_len(&self) -> usize {
        match self.operand() {
            Some(_) => 1 + OPERAND_SIZE,
            None => 1,
        }
    }

    /// True for instructions that may move the instruction pointer non-sequentially.
    pub const fn is_control_flow(&self) -> bool {
        matches!(
            self,
            Instruction::Call
                | Instruction::Ret
                | Instruction::Jmp
                | Instruction::JmpIf
                | Instruction::End
        )
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
