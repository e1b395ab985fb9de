//! Bytecode disassembler.
//!
//! Walks an instruction stream linearly and decodes each opcode with its
//! operand. Used by the CLI listing and by instruction tracing.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Instruction, OPERAND_SIZE, OperandKind};
use std::fmt;

/// One decoded instruction and where it sits in the bytecode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DecodedInstruction {
    /// Offset of the opcode byte.
    pub offset: usize,
    pub instruction: Instruction,
    pub operand: Option<u64>,
}

impl DecodedInstruction {
    /// Offset of the instruction that follows this one.
    pub fn next_offset(&self) -> usize {
        self.offset + self.instruction.encoded_len()
    }
}

impl fmt::Display for DecodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}: {}", self.offset, self.instruction.mnemonic())?;
        match (self.instruction.operand(), self.operand) {
            (Some(OperandKind::Imm), Some(v)) => write!(f, " {v}"),
            (Some(OperandKind::Addr), Some(v)) => write!(f, " @0x{v:x}"),
            (Some(OperandKind::Target), Some(v)) => write!(f, " ->0x{v:04x}"),
            _ => Ok(()),
        }
    }
}

/// Decodes the instruction whose opcode byte is at `offset`.
pub fn decode_at(code: &[u8], offset: usize) -> Result<DecodedInstruction, VMError> {
    let opcode = *code.get(offset).ok_or(VMError::TruncatedBytecode {
        ip: offset,
        requested: 1,
        available: 0,
    })?;
    let instruction = Instruction::try_from(opcode)
        .map_err(|_| VMError::UnknownOpcode { ip: offset, opcode })?;

    let operand = match instruction.operand() {
        None => None,
        Some(_) => {
            let start = offset + 1;
            let bytes = code
                .get(start..start + OPERAND_SIZE)
                .ok_or(VMError::TruncatedBytecode {
                    ip: offset,
                    requested: OPERAND_SIZE,
                    available: code.len().saturating_sub(start),
                })?;
            let mut word = [0u8; OPERAND_SIZE];
            word.copy_from_slice(bytes);
            Some(u64::from_le_bytes(word))
        }
    };

    Ok(DecodedInstruction {
        offset,
        instruction,
        operand,
    })
}

/// Decodes the whole stream front to back.
///
/// Stops at the first undecodable byte. Data embedded after an END is
/// decoded as instructions too, since the format has no section markers.
pub fn disassemble(code: &[u8]) -> Result<Vec<DecodedInstruction>, VMError> {
    let mut listing = Vec::new();
    let mut offset = 0;
    while offset < code.len() {
        let decoded = decode_at(code, offset)?;
        offset = decoded.next_offset();
        listing.push(decoded);
    }
    Ok(listing)
}

/// Renders a listing, one instruction per line.
pub fn render(listing: &[DecodedInstruction]) -> String {
    let mut out = String::new();
    for decoded in listing {
        out.push_str(&decoded.to_string());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(v: u64) -> Vec<u8> {
        let mut out = vec![Instruction::Push as u8];
        out.extend_from_slice(&v.to_le_bytes());
        out
    }

    #[test]
    fn decodes_operands_and_offsets() {
        let mut code = push(5);
        code.extend(push(3));
        code.push(Instruction::Add as u8);
        code.push(Instruction::End as u8);

        let listing = disassemble(&code).unwrap();
        assert_eq!(listing.len(), 4);
        assert_eq!(listing[0].operand, Some(5));
        assert_eq!(listing[1].offset, 9);
        assert_eq!(listing[2].instruction, Instruction::Add);
        assert_eq!(listing[3].offset, 19);
        assert_eq!(listing[2].operand, None);
    }

    #[test]
    fn renders_by_operand_kind() {
        let mut code = push(42);
        code.push(Instruction::Store as u8);
        code.extend_from_slice(&16u64.to_le_bytes());
        code.push(Instruction::Jmp as u8);
        code.extend_from_slice(&0u64.to_le_bytes());

        let text = render(&disassemble(&code).unwrap());
        assert_eq!(text, "0000: PUSH 42\n0009: STORE @0x10\n0012: JMP ->0x0000\n");
    }

    #[test]
    fn truncated_operand_reports_opcode_offset() {
        let mut code = vec![Instruction::Pop as u8, Instruction::Push as u8];
        code.extend_from_slice(&[1, 2, 3]);
        assert_eq!(
            disassemble(&code),
            Err(VMError::TruncatedBytecode {
                ip: 1,
                requested: 8,
                available: 3
            })
        );
    }

    #[test]
    fn unknown_opcode_reports_offset() {
        let code = [Instruction::Pop as u8, 0xEE];
        assert_eq!(
            disassemble(&code),
            Err(VMError::UnknownOpcode {
                ip: 1,
                opcode: 0xEE
            })
        );
    }
}
