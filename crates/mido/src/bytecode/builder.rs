//! Low-level tape emission.
//!
//! `CodeBuilder` encodes opcodes and operands into raw bytes and tracks the
//! operand stack depth so a compiled rule knows how deep the VM stack gets.

use super::op::Opcode;

/// Builder for emitting a bytecode tape.
///
/// ```ignore
/// let mut builder = CodeBuilder::new();
/// builder.emit(Opcode::PushT);
/// builder.emit_u16(Opcode::PushConst, 3);
/// builder.emit_u16(Opcode::NeedAll, 2);
/// let (tape, max_stack) = builder.build();
/// ```
#[derive(Debug, Default)]
pub struct CodeBuilder {
    bytecode: Vec<u8>,
    current_stack_depth: u16,
    max_stack_depth: u16,
}

impl CodeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits a no-operand instruction.
    pub fn emit(&mut self, op: Opcode) {
        self.bytecode.push(op as u8);
        if let Some(effect) = op.stack_effect() {
            self.adjust_stack(effect);
        }
    }

    /// Emits an instruction with a u16 operand (little-endian).
    pub fn emit_u16(&mut self, op: Opcode, operand: u16) {
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&operand.to_le_bytes());
        match op {
            // pops n values, pushes one
            Opcode::NeedAll | Opcode::NeedAny => self.adjust_stack(1 - clamp(operand)),
            // pops callee and argc values, pushes the result
            Opcode::Invoke => self.adjust_stack(-clamp(operand)),
            _ => {
                if let Some(effect) = op.stack_effect() {
                    self.adjust_stack(effect);
                }
            }
        }
    }

    /// Emits an instruction with a u16 operand followed by a u8 operand.
    pub fn emit_u16_u8(&mut self, op: Opcode, operand1: u16, operand2: u8) {
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&operand1.to_le_bytes());
        self.bytecode.push(operand2);
        if let Some(effect) = op.stack_effect() {
            self.adjust_stack(effect);
        }
    }

    fn adjust_stack(&mut self, delta: i16) {
        let depth = i32::from(self.current_stack_depth) + i32::from(delta);
        self.current_stack_depth = u16::try_from(depth.max(0)).unwrap_or(u16::MAX);
        self.max_stack_depth = self.max_stack_depth.max(self.current_stack_depth);
    }

    #[must_use]
    pub fn current_offset(&self) -> usize {
        self.bytecode.len()
    }

    #[must_use]
    pub fn max_stack_depth(&self) -> u16 {
        self.max_stack_depth
    }

    /// Finishes the tape, returning it with the maximum stack depth reached.
    #[must_use]
    pub fn build(self) -> (Vec<u8>, u16) {
        (self.bytecode, self.max_stack_depth)
    }
}

fn clamp(operand: u16) -> i16 {
    i16::try_from(operand).unwrap_or(i16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u16_operand_is_little_endian() {
        let mut builder = CodeBuilder::new();
        builder.emit_u16(Opcode::PushConst, 0x1234);
        let (tape, _) = builder.build();
        assert_eq!(tape, vec![Opcode::PushConst as u8, 0x34, 0x12]);
    }

    #[test]
    fn test_u16_u8_operands() {
        let mut builder = CodeBuilder::new();
        builder.emit_u16_u8(Opcode::ChkQty, 3, 1);
        let (tape, _) = builder.build();
        assert_eq!(tape, vec![0x41, 3, 0, 1]);
    }

    #[test]
    fn test_stack_depth_tracking() {
        let mut builder = CodeBuilder::new();
        builder.emit(Opcode::PushT);
        builder.emit(Opcode::PushF);
        builder.emit(Opcode::PushT);
        builder.emit_u16(Opcode::NeedAll, 2);
        builder.emit_u16(Opcode::NeedAny, 2);
        assert_eq!(builder.max_stack_depth(), 3);
        builder.emit(Opcode::Invert);
        let (tape, max) = builder.build();
        assert_eq!(max, 3);
        assert_eq!(tape.len(), 10);
    }
}
