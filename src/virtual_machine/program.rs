//! On-disk program container.
//!
//! The VM itself consumes raw bytecode. Hosts that persist programs wrap it
//! in a small container so stale files from an incompatible format are
//! rejected instead of executed:
//!
//! ```text
//! "OBPL" | version: u8 | length: u32 LE | bytecode[length]
//! ```
//!
//! The magic cannot be confused with raw bytecode: `'O'` (0x4F) is not an opcode.

use crate::virtual_machine::errors::VMError;

/// Magic bytes identifying a serialized program.
const MAGIC: &[u8; 4] = b"OBPL";

/// Current container format version.
const CURRENT_VERSION: u8 = 1;

const HEADER_LEN: usize = MAGIC.len() + 1 + 4;

/// Bytecode wrapped with a versioned header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProgramFile {
    pub bytecode: Vec<u8>,
}

impl ProgramFile {
    pub fn new(bytecode: Vec<u8>) -> Self {
        Self { bytecode }
    }

    /// Serializes the program with its header.
    pub fn to_bytes(&self) -> Result<Vec<u8>, VMError> {
        let len = u32::try_from(self.bytecode.len()).map_err(|_| VMError::Decode {
            reason: "program exceeds 4 GiB".to_string(),
        })?;
        let mut out = Vec::with_capacity(HEADER_LEN + self.bytecode.len());
        out.extend_from_slice(MAGIC);
        out.push(CURRENT_VERSION);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&self.bytecode);
        Ok(out)
    }

    /// Deserializes a container, validating magic, version and length.
    pub fn from_bytes(input: &[u8]) -> Result<Self, VMError> {
        if input.len() < HEADER_LEN {
            return Err(VMError::Decode {
                reason: "truncated".to_string(),
            });
        }
        if &input[..MAGIC.len()] != MAGIC {
            return Err(VMError::Decode {
                reason: "bad magic".to_string(),
            });
        }
        let version = input[MAGIC.len()];
        if version != CURRENT_VERSION {
            return Err(VMError::Decode {
                reason: format!("unsupported version {version}"),
            });
        }

        let mut len = [0u8; 4];
        len.copy_from_slice(&input[MAGIC.len() + 1..HEADER_LEN]);
        let len = u32::from_le_bytes(len) as usize;
        let body = &input[HEADER_LEN..];
        if body.len() != len {
            return Err(VMError::Decode {
                reason: format!("declared {len} bytes of bytecode, found {}", body.len()),
            });
        }
        Ok(Self {
            bytecode: body.to_vec(),
        })
    }

    /// True when `input` starts with the container magic.
    pub fn is_container(input: &[u8]) -> bool {
        input.starts_with(MAGIC)
    }
}

/// Extracts bytecode from either a container or a raw instruction stream.
pub fn read_program(input: &[u8]) -> Result<Vec<u8>, VMError> {
    if ProgramFile::is_container(input) {
        Ok(ProgramFile::from_bytes(input)?.bytecode)
    } else {
        Ok(input.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_round_trip() {
        let program = ProgramFile::new(vec![0x01, 5, 0, 0, 0, 0, 0, 0, 0, 0x11]);
        let bytes = program.to_bytes().unwrap();
        assert!(ProgramFile::is_container(&bytes));
        assert_eq!(ProgramFile::from_bytes(&bytes).unwrap(), program);
    }

    #[test]
    fn rejects_wrong_version() {
        let mut bytes = ProgramFile::new(vec![0x11]).to_bytes().unwrap();
        bytes[4] = 9;
        assert!(matches!(
            ProgramFile::from_bytes(&bytes),
            Err(VMError::Decode { .. })
        ));
    }

    #[test]
    fn rejects_length_mismatch() {
        let mut bytes = ProgramFile::new(vec![0x11, 0x11]).to_bytes().unwrap();
        bytes.pop();
        assert!(matches!(
            ProgramFile::from_bytes(&bytes),
            Err(VMError::Decode { .. })
        ));
    }

    #[test]
    fn raw_bytecode_passes_through() {
        let raw = vec![0x02, 0x11];
        assert_eq!(read_program(&raw).unwrap(), raw);
    }
}
