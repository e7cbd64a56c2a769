//! Stack machine executing compiled rules.
//!
//! A [`VM`] owns a frozen [`Table`] and the callables for every built-in the
//! table defines. It holds no per-run state: each call to [`VM::execute`]
//! allocates its own instruction pointer and operand stack, so one VM can be
//! shared across threads.

use std::{
    borrow::Cow,
    fmt,
    panic::{self, AssertUnwindSafe},
};

use ahash::AHashMap;
use smallvec::SmallVec;

use super::{compiler::Bytecode, op::Opcode};
use crate::{
    object::Object,
    table::{BuiltInDef, ObjectIndex, Table},
    tracer::{NoopTracer, VmTracer},
};

/// Deepest operand stack a tape may build.
pub const STACK_LIMIT: usize = 256;

/// A host function callable from bytecode.
pub type BuiltInFn = Box<dyn Fn(&Table, &[Object]) -> Result<Object, BuiltInError> + Send + Sync>;

/// Answers `CHK_QTY`: whether at least `qty` of `item` is held.
pub type QuantityCheck = Box<dyn Fn(&Table, Object, u8) -> Result<Object, BuiltInError> + Send + Sync>;

/// Failure reported by a host function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltInError {
    msg: Cow<'static, str>,
}

impl BuiltInError {
    pub fn new(msg: impl Into<Cow<'static, str>>) -> Self {
        Self { msg: msg.into() }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.msg
    }
}

impl fmt::Display for BuiltInError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.msg)
    }
}

impl std::error::Error for BuiltInError {}

/// Host functions by name, handed to [`VM::new`].
#[derive(Default)]
pub struct BuiltIns {
    fns: AHashMap<String, BuiltInFn>,
}

impl BuiltIns {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&Table, &[Object]) -> Result<Object, BuiltInError> + Send + Sync + 'static,
    {
        self.fns.insert(name.into(), Box::new(f));
        self
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fns.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fns.is_empty()
    }
}

impl fmt::Debug for BuiltIns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.fns.keys().collect();
        names.sort();
        f.debug_struct("BuiltIns").field("names", &names).finish()
    }
}

/// Errors constructing a [`VM`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    /// The table defines a built-in the host did not supply.
    UnmappedBuiltIn { name: String },
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnmappedBuiltIn { name } => write!(f, "built-in {name:?} is declared but not mapped to a function"),
        }
    }
}

impl std::error::Error for VmError {}

/// Errors raised while executing a tape. `ip` is the offset of the failing opcode.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    StackUnderflow { ip: usize },
    StackOverflow { ip: usize },
    UnknownOpcode { ip: usize, byte: u8 },
    /// An `ERR` instruction ran.
    Halted { ip: usize },
    /// Comparisons are folded at compile time and have no run-time form.
    Comparison { ip: usize, op: Opcode },
    TruncatedTape { ip: usize },
    BadConstant { ip: usize, index: u16 },
    /// A call target that is not a mapped built-in.
    UnknownCallee { ip: usize, callee: Object },
    MissingQuantityCheck { ip: usize },
    ArgumentCount {
        name: String,
        expected: i32,
        received: usize,
    },
    BuiltIn { name: String, error: BuiltInError },
    /// A host function panicked.
    Panicked(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackUnderflow { ip } => write!(f, "stack underflow at {ip}"),
            Self::StackOverflow { ip } => write!(f, "stack overflow at {ip} (limit {STACK_LIMIT})"),
            Self::UnknownOpcode { ip, byte } => write!(f, "unrecognized op {byte:#04x} at {ip}"),
            Self::Halted { ip } => write!(f, "execution halted at {ip}"),
            Self::Comparison { ip, op } => write!(f, "runtime comparison not implemented: {} at {ip}", op.mnemonic()),
            Self::TruncatedTape { ip } => write!(f, "instruction at {ip} is truncated"),
            Self::BadConstant { ip, index } => write!(f, "constant {index:#06x} at {ip} is not in the table"),
            Self::UnknownCallee { ip, callee } => write!(f, "{callee:?} at {ip} is not a callable built-in"),
            Self::MissingQuantityCheck { ip } => write!(f, "no quantity check installed for CHK_QTY at {ip}"),
            Self::ArgumentCount {
                name,
                expected,
                received,
            } => write!(f, "{name:?} expects {expected} arguments but received {received}"),
            Self::BuiltIn { name, error } => write!(f, "{name}: {error}"),
            Self::Panicked(msg) => write!(f, "VM panicked: {msg}"),
        }
    }
}

impl std::error::Error for RuntimeError {}

struct Callable {
    def: BuiltInDef,
    f: BuiltInFn,
}

/// Fetches a u8 operand, advancing the instruction pointer.
macro_rules! fetch_u8 {
    ($exec:expr) => {{
        let byte = *$exec
            .tape
            .get($exec.ip)
            .ok_or(RuntimeError::TruncatedTape { ip: $exec.op_ip })?;
        $exec.ip += 1;
        byte
    }};
}

/// Fetches a little-endian u16 operand, advancing the instruction pointer.
macro_rules! fetch_u16 {
    ($exec:expr) => {{
        let lo = fetch_u8!($exec);
        let hi = fetch_u8!($exec);
        u16::from_le_bytes([lo, hi])
    }};
}

/// Per-call execution state.
struct Execution<'t> {
    tape: &'t [u8],
    ip: usize,
    /// Offset of the opcode being executed.
    op_ip: usize,
    stack: SmallVec<[Object; 32]>,
}

impl Execution<'_> {
    fn push(&mut self, object: Object) -> Result<(), RuntimeError> {
        if self.stack.len() >= STACK_LIMIT {
            return Err(RuntimeError::StackOverflow { ip: self.op_ip });
        }
        self.stack.push(object);
        Ok(())
    }

    fn pop(&mut self) -> Result<Object, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow { ip: self.op_ip })
    }

    /// Start of the top `n` stack values.
    fn window(&self, n: usize) -> Result<usize, RuntimeError> {
        self.stack
            .len()
            .checked_sub(n)
            .ok_or(RuntimeError::StackUnderflow { ip: self.op_ip })
    }
}

pub struct VM {
    table: Table,
    functions: AHashMap<Object, Callable>,
    quantity_check: Option<QuantityCheck>,
}

impl fmt::Debug for VM {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VM")
            .field("objects", &self.table.len())
            .field("functions", &self.functions.len())
            .field("quantity_check", &self.quantity_check.is_some())
            .finish()
    }
}

impl VM {
    /// Binds every built-in the table defines to its host function.
    pub fn new(table: Table, mut builtins: BuiltIns) -> Result<Self, VmError> {
        let mut functions = AHashMap::with_capacity(table.builtins().len());
        for (ptr, def) in table.builtins() {
            let f = builtins
                .fns
                .remove(&def.name)
                .ok_or_else(|| VmError::UnmappedBuiltIn { name: def.name.clone() })?;
            functions.insert(*ptr, Callable { def: def.clone(), f });
        }
        Ok(Self {
            table,
            functions,
            quantity_check: None,
        })
    }

    /// Installs the function answering `CHK_QTY`.
    #[must_use]
    pub fn with_quantity_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&Table, Object, u8) -> Result<Object, BuiltInError> + Send + Sync + 'static,
    {
        self.quantity_check = Some(Box::new(check));
        self
    }

    #[must_use]
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Runs a tape, returning the value left on top of the stack or null.
    pub fn execute(&self, code: &Bytecode) -> Result<Object, RuntimeError> {
        self.execute_traced(code, &mut NoopTracer)
    }

    pub fn execute_traced<Tr: VmTracer>(&self, code: &Bytecode, tracer: &mut Tr) -> Result<Object, RuntimeError> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run(code, tracer)));
        outcome.unwrap_or_else(|payload| Err(RuntimeError::Panicked(panic_message(payload.as_ref()))))
    }

    fn run<Tr: VmTracer>(&self, code: &Bytecode, tracer: &mut Tr) -> Result<Object, RuntimeError> {
        let mut exec = Execution {
            tape: &code.tape,
            ip: 0,
            op_ip: 0,
            stack: SmallVec::new(),
        };
        while exec.ip < exec.tape.len() {
            if let Err(err) = self.step(&mut exec, tracer) {
                tracer.on_error(exec.op_ip, &err);
                return Err(err);
            }
        }
        Ok(exec.stack.pop().unwrap_or(Object::NULL))
    }

    fn step<Tr: VmTracer>(&self, exec: &mut Execution<'_>, tracer: &mut Tr) -> Result<(), RuntimeError> {
        exec.op_ip = exec.ip;
        let byte = fetch_u8!(exec);
        let op = Opcode::from_repr(byte).ok_or(RuntimeError::UnknownOpcode { ip: exec.op_ip, byte })?;
        tracer.on_instruction(exec.op_ip, op, exec.stack.len());

        match op {
            Opcode::Nop => {}
            Opcode::Err => return Err(RuntimeError::Halted { ip: exec.op_ip }),
            Opcode::PushT => exec.push(Object::TRUE)?,
            Opcode::PushF => exec.push(Object::FALSE)?,
            Opcode::PushConst | Opcode::PushPtr | Opcode::PushStr | Opcode::PushFunc => {
                let index = fetch_u16!(exec);
                let object = self.constant(exec, index)?;
                exec.push(object)?;
            }
            Opcode::Invert => {
                let object = exec.pop()?;
                exec.push(Object::bool(!object.is_truthy()))?;
            }
            Opcode::NeedAll | Opcode::NeedAny => {
                let n = usize::from(fetch_u16!(exec));
                let start = exec.window(n)?;
                let operands = &exec.stack[start..];
                let answer = if op == Opcode::NeedAll {
                    operands.iter().all(|o| o.is_truthy())
                } else {
                    operands.iter().any(|o| o.is_truthy())
                };
                exec.stack.truncate(start);
                exec.push(Object::bool(answer))?;
            }
            Opcode::ChkQty => {
                let index = fetch_u16!(exec);
                let qty = fetch_u8!(exec);
                let check = self
                    .quantity_check
                    .as_ref()
                    .ok_or(RuntimeError::MissingQuantityCheck { ip: exec.op_ip })?;
                let item = self.constant(exec, index)?;
                exec.pop()?;
                let answer = check(&self.table, item, qty).map_err(|error| RuntimeError::BuiltIn {
                    name: op.mnemonic().to_owned(),
                    error,
                })?;
                tracer.on_quantity_check(item, qty, answer.is_truthy());
                exec.push(answer)?;
            }
            Opcode::Invoke => {
                let argc = usize::from(fetch_u16!(exec));
                let callee = exec.pop()?;
                let start = exec.window(argc)?;
                let answer = self.call(exec.op_ip, callee, &exec.stack[start..], tracer)?;
                exec.stack.truncate(start);
                if !answer.is_null() {
                    exec.push(answer)?;
                }
            }
            Opcode::Invoke0 => {
                let index = fetch_u16!(exec);
                let callee = self.constant(exec, index)?;
                let answer = self.call(exec.op_ip, callee, &[], tracer)?;
                if !answer.is_null() {
                    exec.push(answer)?;
                }
            }
            Opcode::CmpEq | Opcode::CmpNq | Opcode::CmpLt => {
                return Err(RuntimeError::Comparison { ip: exec.op_ip, op });
            }
        }
        Ok(())
    }

    fn constant(&self, exec: &Execution<'_>, index: u16) -> Result<Object, RuntimeError> {
        self.table
            .at_index(ObjectIndex::from_raw(index))
            .ok_or(RuntimeError::BadConstant { ip: exec.op_ip, index })
    }

    fn call<Tr: VmTracer>(
        &self,
        ip: usize,
        callee: Object,
        args: &[Object],
        tracer: &mut Tr,
    ) -> Result<Object, RuntimeError> {
        let callable = self
            .functions
            .get(&callee)
            .ok_or(RuntimeError::UnknownCallee { ip, callee })?;
        let name = &callable.def.name;
        if !callable.def.accepts(args.len()) {
            return Err(RuntimeError::ArgumentCount {
                name: name.clone(),
                expected: callable.def.params,
                received: args.len(),
            });
        }
        tracer.on_call(name, args.len());
        (callable.f)(&self.table, args).map_err(|error| RuntimeError::BuiltIn {
            name: name.clone(),
            error,
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
