//! Bytecode: opcodes, tape emission, the tree compiler, disassembly and the VM.

mod builder;
mod compiler;
mod dis;
mod op;
mod vm;

pub use builder::CodeBuilder;
pub use compiler::{Bytecode, CompileError, Compiler, FastOp, FastOps, compile, fast_has};
pub use dis::{DecodeError, Disassembly, Instruction, decode, disassemble};
pub use op::{Opcode, Operands};
pub use vm::{BuiltInError, BuiltInFn, BuiltIns, QuantityCheck, RuntimeError, STACK_LIMIT, VM, VmError};
