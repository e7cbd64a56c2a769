//! Tape decoding and human-readable disassembly.

use std::fmt;

use super::{
    compiler::Bytecode,
    op::{Opcode, Operands},
};
use crate::{
    object::Value,
    table::{ObjectIndex, Table},
};

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub op: Opcode,
    pub a: Option<u16>,
    pub b: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    UnknownOpcode { offset: usize, byte: u8 },
    Truncated { offset: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOpcode { offset, byte } => write!(f, "unrecognized op {byte:#04x} at {offset}"),
            Self::Truncated { offset } => write!(f, "instruction at {offset} is truncated"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Splits a tape into instructions.
pub fn decode(tape: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    let mut out = Vec::new();
    let mut offset = 0;
    while let Some(&byte) = tape.get(offset) {
        let op = Opcode::from_repr(byte).ok_or(DecodeError::UnknownOpcode { offset, byte })?;
        let width = op.operands().width();
        let operands = tape
            .get(offset + 1..offset + 1 + width)
            .ok_or(DecodeError::Truncated { offset })?;
        let (a, b) = match op.operands() {
            Operands::None => (None, None),
            Operands::U16 => (Some(u16::from_le_bytes([operands[0], operands[1]])), None),
            Operands::U16U8 => (
                Some(u16::from_le_bytes([operands[0], operands[1]])),
                Some(operands[2]),
            ),
        };
        out.push(Instruction { offset, op, a, b });
        offset += 1 + width;
    }
    Ok(out)
}

/// Display adapter listing a tape's instructions and the constants it uses.
#[derive(Debug, Clone, Copy)]
pub struct Disassembly<'a> {
    code: &'a Bytecode,
    table: &'a Table,
}

#[must_use]
pub fn disassemble<'a>(code: &'a Bytecode, table: &'a Table) -> Disassembly<'a> {
    Disassembly { code, table }
}

impl Disassembly<'_> {
    fn constant(&self, f: &mut fmt::Formatter<'_>, index: ObjectIndex) -> fmt::Result {
        let Some(object) = self.table.at_index(index) else {
            return writeln!(f, "{index}  <missing>");
        };
        write!(f, "{index}  {:016X}  ", object.bits())?;
        match object.unpack() {
            Ok(Value::Ptr(ptr)) => {
                let tag: &'static str = ptr.tag.into();
                write!(f, "ptr     {tag}@{}", ptr.addr)?;
                if let Some(name) = self.code.names.get(&index) {
                    write!(f, "  {name:?}")?;
                }
            }
            Ok(Value::Str(_)) => match self.table.decode_string(object) {
                Ok(s) => write!(f, "str     {s:?}")?,
                Err(err) => write!(f, "str     <{err}>")?,
            },
            Ok(Value::Number(n)) => write!(f, "number  {n}")?,
            Ok(value) => write!(f, "{:<7} {value:?}", object.category())?,
            Err(err) => write!(f, "<{err}>")?,
        }
        writeln!(f)
    }
}

impl fmt::Display for Disassembly<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match decode(&self.code.tape) {
            Ok(instructions) => {
                for ins in instructions {
                    write!(f, "{:04}  {:<10}", ins.offset, ins.op.mnemonic())?;
                    if let Some(a) = ins.a {
                        write!(f, " {a:#06x}")?;
                    }
                    if let Some(b) = ins.b {
                        write!(f, " {b}")?;
                    }
                    writeln!(f)?;
                }
            }
            Err(err) => writeln!(f, "<{err}>")?,
        }
        if !self.code.consts.is_empty() {
            writeln!(f, "CONSTANTS")?;
            for &index in &self.code.consts {
                self.constant(f, index)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode() {
        let ins = decode(&[0x23, 3, 0, 0x41, 3, 0, 1, 0x31]).unwrap();
        assert_eq!(ins.len(), 3);
        assert_eq!(
            ins[1],
            Instruction {
                offset: 3,
                op: Opcode::ChkQty,
                a: Some(3),
                b: Some(1),
            }
        );
        assert_eq!(ins[2].op, Opcode::Invert);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            decode(&[0x21, 0x99]),
            Err(DecodeError::UnknownOpcode { offset: 1, byte: 0x99 })
        );
        assert_eq!(decode(&[0x32, 1]), Err(DecodeError::Truncated { offset: 0 }));
    }

    #[test]
    fn test_disassembly_lists_instructions() {
        let code = Bytecode {
            tape: vec![0x21, 0x22, 0x33, 2, 0],
            ..Bytecode::default()
        };
        let text = disassemble(&code, &Table::default()).to_string();
        assert_eq!(text, "0000  PUSH_T    \n0001  PUSH_F    \n0002  NEED_ANY   0x0002\n");
    }
}
