//! Programmatic bytecode construction.
//!
//! [`ProgramBuilder`] emits encoded instructions directly and resolves
//! symbolic jump/call labels once the whole program is known. Forward
//! references are emitted as zero placeholders and patched in [`ProgramBuilder::finish`].

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Instruction, OPERAND_SIZE};
use std::collections::HashMap;

/// Incremental bytecode emitter.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    code: Vec<u8>,
    labels: HashMap<String, usize>,
    /// (operand offset, label) pairs waiting for resolution.
    fixups: Vec<(usize, String)>,
    duplicate: Option<String>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset the next emitted byte will land at.
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    /// Binds `name` to the current offset.
    ///
    /// Rebinding a name is reported by [`finish`](Self::finish).
    pub fn label(&mut self, name: &str) -> &mut Self {
        let offset = self.code.len();
        if self.labels.insert(name.to_string(), offset).is_some() && self.duplicate.is_none() {
            self.duplicate = Some(name.to_string());
        }
        self
    }

    /// Emits `instruction`, appending `operand` when the instruction takes one.
    ///
    /// A missing operand for an instruction that requires one encodes as zero;
    /// an operand for an instruction without one is ignored.
    pub fn emit(&mut self, instruction: Instruction, operand: Option<u64>) -> &mut Self {
        self.code.push(instruction as u8);
        if instruction.operand().is_some() {
            self.code
                .extend_from_slice(&operand.unwrap_or(0).to_le_bytes());
        }
        self
    }

    /// Appends bytes verbatim, bypassing encoding.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.code.extend_from_slice(bytes);
        self
    }

    fn emit_label_ref(&mut self, instruction: Instruction, label: &str) -> &mut Self {
        self.code.push(instruction as u8);
        self.fixups.push((self.code.len(), label.to_string()));
        self.code.extend_from_slice(&[0u8; OPERAND_SIZE]);
        self
    }

    pub fn push(&mut self, value: u64) -> &mut Self {
        self.emit(Instruction::Push, Some(value))
    }

    pub fn pop(&mut self) -> &mut Self {
        self.emit(Instruction::Pop, None)
    }

    pub fn add(&mut self) -> &mut Self {
        self.emit(Instruction::Add, None)
    }

    pub fn sub(&mut self) -> &mut Self {
        self.emit(Instruction::Sub, None)
    }

    pub fn mul(&mut self) -> &mut Self {
        self.emit(Instruction::Mul, None)
    }

    pub fn div(&mut self) -> &mut Self {
        self.emit(Instruction::Div, None)
    }

    pub fn store(&mut self, address: u64) -> &mut Self {
        self.emit(Instruction::Store, Some(address))
    }

    pub fn load(&mut self, address: u64) -> &mut Self {
        self.emit(Instruction::Load, Some(address))
    }

    pub fn print(&mut self) -> &mut Self {
        self.emit(Instruction::Print, None)
    }

    /// CALL to a label.
    pub fn call(&mut self, label: &str) -> &mut Self {
        self.emit_label_ref(Instruction::Call, label)
    }

    /// CALL to an absolute offset.
    pub fn call_to(&mut self, target: u64) -> &mut Self {
        self.emit(Instruction::Call, Some(target))
    }

    pub fn ret(&mut self) -> &mut Self {
        self.emit(Instruction::Ret, None)
    }

    /// JMP to a label.
    pub fn jmp(&mut self, label: &str) -> &mut Self {
        self.emit_label_ref(Instruction::Jmp, label)
    }

    /// JMP to an absolute offset.
    pub fn jmp_to(&mut self, target: u64) -> &mut Self {
        self.emit(Instruction::Jmp, Some(target))
    }

    /// JMPIF to a label.
    pub fn jmp_if(&mut self, label: &str) -> &mut Self {
        self.emit_label_ref(Instruction::JmpIf, label)
    }

    /// JMPIF to an absolute offset.
    pub fn jmp_if_to(&mut self, target: u64) -> &mut Self {
        self.emit(Instruction::JmpIf, Some(target))
    }

    pub fn eq(&mut self) -> &mut Self {
        self.emit(Instruction::Eq, None)
    }

    pub fn gt(&mut self) -> &mut Self {
        self.emit(Instruction::Gt, None)
    }

    pub fn lt(&mut self) -> &mut Self {
        self.emit(Instruction::Lt, None)
    }

    pub fn end(&mut self) -> &mut Self {
        self.emit(Instruction::End, None)
    }

    /// Resolves labels and returns the encoded program.
    pub fn finish(self) -> Result<Vec<u8>, VMError> {
        if let Some(label) = self.duplicate {
            return Err(VMError::DuplicateLabel { label });
        }

        let mut code = self.code;
        for (at, label) in self.fixups {
            let target = *self
                .labels
                .get(&label)
                .ok_or(VMError::UndefinedLabel { label })?;
            code[at..at + OPERAND_SIZE].copy_from_slice(&(target as u64).to_le_bytes());
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_immediates_little_endian() {
        let mut b = ProgramBuilder::new();
        b.push(0x0102).end();
        let code = b.finish().unwrap();
        assert_eq!(code, vec![0x01, 0x02, 0x01, 0, 0, 0, 0, 0, 0, 0x11]);
    }

    #[test]
    fn resolves_forward_and_backward_labels() {
        let mut b = ProgramBuilder::new();
        b.label("top").jmp("bottom").label("bottom").jmp("top");
        let code = b.finish().unwrap();
        // JMP bottom at 0, bottom = 9; JMP top at 9, top = 0.
        assert_eq!(&code[1..9], &9u64.to_le_bytes());
        assert_eq!(&code[10..18], &0u64.to_le_bytes());
    }

    #[test]
    fn undefined_label_is_an_error() {
        let mut b = ProgramBuilder::new();
        b.call("missing");
        assert!(matches!(
            b.finish(),
            Err(VMError::UndefinedLabel { label }) if label == "missing"
        ));
    }

    #[test]
    fn duplicate_label_is_an_error() {
        let mut b = ProgramBuilder::new();
        b.label("x").end().label("x");
        assert!(matches!(
            b.finish(),
            Err(VMError::DuplicateLabel { label }) if label == "x"
        ));
    }

    #[test]
    fn operand_ignored_for_bare_instruction() {
        let mut b = ProgramBuilder::new();
        b.emit(Instruction::Add, Some(99));
        assert_eq!(b.finish().unwrap(), vec![Instruction::Add as u8]);
    }
}
