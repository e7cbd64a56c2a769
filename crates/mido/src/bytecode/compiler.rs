//! Optimized tree to bytecode.
//!
//! Each node variant has a fixed instruction shape. Calls first consult the
//! [`FastOps`] registry, which may replace a recognized call shape with a
//! specialized instruction sequence.

use std::{collections::BTreeSet, fmt};

use ahash::AHashMap;
use indexmap::IndexMap;

use super::{builder::CodeBuilder, op::Opcode};
use crate::{
    ast::{CompareOp, Invoke, Node},
    symbols::{SymbolId, SymbolKind, SymbolTable},
    table::{BuilderError, ObjectBuilder, ObjectIndex},
};

/// A compiled rule.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Bytecode {
    pub tape: Vec<u8>,
    /// Table entries the tape references, ascending.
    pub consts: Vec<ObjectIndex>,
    /// Symbol names of the pointer constants the tape references.
    pub names: IndexMap<ObjectIndex, String>,
    /// Deepest operand stack the tape can reach.
    pub max_stack: u16,
}

impl Bytecode {
    pub fn dump(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn load(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// An identifier whose kind has no run-time representation.
    Uncompilable { name: String, kind: SymbolKind },
    /// A call whose target is not an identifier.
    NotCallable,
    /// A call of a function without a built-in definition.
    UnresolvedCallee { name: String },
    ArgumentCount {
        name: String,
        expected: i32,
        received: usize,
    },
    TooManyOperands { count: usize },
    UnknownSymbol(SymbolId),
    Builder(BuilderError),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uncompilable { name, kind } => write!(f, "uncompilable identifier {name:?} of kind {kind}"),
            Self::NotCallable => f.write_str("can only invoke functions"),
            Self::UnresolvedCallee { name } => write!(f, "unresolved callee {name:?}"),
            Self::ArgumentCount {
                name,
                expected,
                received,
            } => write!(f, "{name:?} expects {expected} arguments but received {received}"),
            Self::TooManyOperands { count } => write!(f, "{count} operands exceed the instruction limit"),
            Self::UnknownSymbol(id) => write!(f, "unknown symbol {id}"),
            Self::Builder(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<BuilderError> for CompileError {
    fn from(err: BuilderError) -> Self {
        Self::Builder(err)
    }
}

/// Emitter for one call shape. Returns `Ok(false)` to decline the call.
pub type FastOp = fn(&mut Compiler<'_>, &Invoke) -> Result<bool, CompileError>;

/// Fast-op registry keyed by callee name.
#[derive(Debug, Clone, Default)]
pub struct FastOps {
    ops: AHashMap<String, FastOp>,
}

impl FastOps {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard registry: `has(token, n)` becomes `CHK_QTY`.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut ops = Self::new();
        ops.register(crate::lower::HAS, fast_has);
        ops
    }

    pub fn register(&mut self, name: impl Into<String>, op: FastOp) {
        self.ops.insert(name.into(), op);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<FastOp> {
        self.ops.get(name).copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Compiles one optimized tree.
pub fn compile(
    node: &Node,
    symbols: &SymbolTable,
    objects: &mut ObjectBuilder,
    fast_ops: &FastOps,
) -> Result<Bytecode, CompileError> {
    let mut compiler = Compiler {
        symbols,
        objects,
        fast_ops,
        code: CodeBuilder::new(),
        consts: BTreeSet::new(),
        names: IndexMap::new(),
    };
    compiler.visit(node)?;
    let (tape, max_stack) = compiler.code.build();
    Ok(Bytecode {
        tape,
        consts: compiler.consts.into_iter().collect(),
        names: compiler.names,
        max_stack,
    })
}

/// Tree walker state, exposed to fast ops.
#[derive(Debug)]
pub struct Compiler<'a> {
    symbols: &'a SymbolTable,
    objects: &'a mut ObjectBuilder,
    fast_ops: &'a FastOps,
    code: CodeBuilder,
    consts: BTreeSet<ObjectIndex>,
    names: IndexMap<ObjectIndex, String>,
}

impl Compiler<'_> {
    #[must_use]
    pub fn symbols(&self) -> &SymbolTable {
        self.symbols
    }

    pub fn emit(&mut self, op: Opcode) {
        self.code.emit(op);
    }

    pub fn emit_u16(&mut self, op: Opcode, operand: u16) {
        self.code.emit_u16(op, operand);
    }

    pub fn emit_u16_u8(&mut self, op: Opcode, operand1: u16, operand2: u8) {
        self.code.emit_u16_u8(op, operand1, operand2);
    }

    pub fn visit(&mut self, node: &Node) -> Result<(), CompileError> {
        match node {
            Node::AnyOf(items) => self.visit_junction(Opcode::NeedAny, items),
            Node::Every(items) => self.visit_junction(Opcode::NeedAll, items),
            Node::Boolean(true) => {
                self.emit(Opcode::PushT);
                Ok(())
            }
            Node::Boolean(false) => {
                self.emit(Opcode::PushF);
                Ok(())
            }
            Node::Compare(compare) => {
                self.visit(&compare.rhs)?;
                self.visit(&compare.lhs)?;
                self.emit(match compare.op {
                    CompareOp::Eq => Opcode::CmpEq,
                    CompareOp::Nq => Opcode::CmpNq,
                    CompareOp::Lt => Opcode::CmpLt,
                });
                Ok(())
            }
            Node::Identifier(id) => self.push_identifier(*id).map(|_| ()),
            Node::Invert(inner) => {
                self.visit(inner)?;
                self.emit(Opcode::Invert);
                Ok(())
            }
            Node::Invoke(invoke) => self.visit_invoke(invoke),
            Node::Number(value) => {
                let index = self.objects.intern_number(*value)?;
                self.push_const(index);
                Ok(())
            }
            Node::String(value) => {
                let index = self.objects.intern_string(value)?;
                self.push_const(index);
                Ok(())
            }
        }
    }

    fn visit_junction(&mut self, op: Opcode, items: &[Node]) -> Result<(), CompileError> {
        let count = u16::try_from(items.len()).map_err(|_| CompileError::TooManyOperands { count: items.len() })?;
        for item in items {
            self.visit(item)?;
        }
        self.emit_u16(op, count);
        Ok(())
    }

    fn visit_invoke(&mut self, invoke: &Invoke) -> Result<(), CompileError> {
        let callee = invoke.callee().ok_or(CompileError::NotCallable)?;
        let name = self
            .symbols
            .name_of(callee)
            .ok_or(CompileError::UnknownSymbol(callee))?;
        let def = self
            .objects
            .function_definition(callee)
            .map_err(|_| CompileError::UnresolvedCallee { name: name.to_owned() })?;
        if !def.accepts(invoke.args.len()) {
            return Err(CompileError::ArgumentCount {
                name: name.to_owned(),
                expected: def.params,
                received: invoke.args.len(),
            });
        }

        if let Some(op) = self.fast_ops.get(name)
            && op(self, invoke)?
        {
            return Ok(());
        }

        if invoke.args.is_empty() {
            let index = self.pointer_of(callee)?;
            self.emit_u16(Opcode::Invoke0, index.raw());
            return Ok(());
        }

        let argc = u16::try_from(invoke.args.len()).map_err(|_| CompileError::TooManyOperands {
            count: invoke.args.len(),
        })?;
        for arg in &invoke.args {
            self.visit(arg)?;
        }
        self.visit(&invoke.target)?;
        self.emit_u16(Opcode::Invoke, argc);
        Ok(())
    }

    fn push_const(&mut self, index: ObjectIndex) {
        self.consts.insert(index);
        self.emit_u16(Opcode::PushConst, index.raw());
    }

    /// Resolves and records the pointer constant of a symbol without emitting.
    pub fn pointer_of(&mut self, id: SymbolId) -> Result<ObjectIndex, CompileError> {
        let symbol = self.symbols.get(id).ok_or(CompileError::UnknownSymbol(id))?;
        let index = self.objects.pointer_for(id)?;
        self.consts.insert(index);
        self.names.entry(index).or_insert_with(|| symbol.name.clone());
        Ok(index)
    }

    /// Pushes the pointer of a built-in, token or setting identifier.
    pub fn push_identifier(&mut self, id: SymbolId) -> Result<ObjectIndex, CompileError> {
        let symbol = self.symbols.get(id).ok_or(CompileError::UnknownSymbol(id))?;
        match symbol.kind {
            SymbolKind::BuiltInFunction | SymbolKind::Token | SymbolKind::Setting => {
                let index = self.pointer_of(id)?;
                self.emit_u16(Opcode::PushConst, index.raw());
                Ok(index)
            }
            kind => Err(CompileError::Uncompilable {
                name: symbol.name.clone(),
                kind,
            }),
        }
    }
}

/// `has(token, n)` with a literal integral `n` in `0..=255` becomes
/// `PUSH_CONST token; CHK_QTY token n`.
pub fn fast_has(compiler: &mut Compiler<'_>, invoke: &Invoke) -> Result<bool, CompileError> {
    let [Node::Identifier(item), Node::Number(qty)] = invoke.args.as_slice() else {
        return Ok(false);
    };
    if compiler.symbols().kind_of(*item) != Some(SymbolKind::Token) {
        return Ok(false);
    }
    if qty.fract() != 0.0 || !(0.0..=255.0).contains(qty) {
        return Ok(false);
    }
    let index = compiler.push_identifier(*item)?;
    compiler.emit_u16_u8(Opcode::ChkQty, index.raw(), *qty as u8);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        object::{Object, PtrTag},
        table::BuiltInDef,
    };

    struct Fixture {
        symbols: SymbolTable,
        objects: ObjectBuilder,
        has: SymbolId,
        bow: SymbolId,
    }

    fn fixture() -> Fixture {
        let mut symbols = SymbolTable::new();
        let mut objects = ObjectBuilder::new();
        let has = symbols.declare("has", SymbolKind::BuiltInFunction).unwrap();
        let bow = symbols.declare("Bow", SymbolKind::Token).unwrap();
        objects
            .define_function(has, Object::ptr(PtrTag::Func, 0), BuiltInDef::new("has", 2))
            .unwrap();
        objects.associate_symbol(bow, Object::ptr(PtrTag::Token, 0)).unwrap();
        Fixture {
            symbols,
            objects,
            has,
            bow,
        }
    }

    #[test]
    fn test_booleans_and_junctions() {
        let mut fx = fixture();
        let node = Node::AnyOf(vec![Node::Boolean(true), Node::Every(vec![Node::Boolean(false), Node::Boolean(true)])]);
        let code = compile(&node, &fx.symbols, &mut fx.objects, &FastOps::new()).unwrap();
        assert_eq!(code.tape, vec![0x21, 0x22, 0x21, 0x32, 2, 0, 0x33, 2, 0]);
        assert_eq!(code.max_stack, 3);
    }

    #[test]
    fn test_fast_has() {
        let mut fx = fixture();
        let node = Node::has(fx.has, fx.bow, 2.0);
        let code = compile(&node, &fx.symbols, &mut fx.objects, &FastOps::with_defaults()).unwrap();
        assert_eq!(code.tape, vec![0x23, 1, 0, 0x41, 1, 0, 2]);
        assert_eq!(code.consts, vec![ObjectIndex::from_raw(1)]);
        assert_eq!(code.names.get(&ObjectIndex::from_raw(1)).map(String::as_str), Some("Bow"));
    }

    #[test]
    fn test_generic_invoke_without_fast_ops() {
        let mut fx = fixture();
        let node = Node::has(fx.has, fx.bow, 2.0);
        let code = compile(&node, &fx.symbols, &mut fx.objects, &FastOps::new()).unwrap();
        // args, then target, then INVOKE argc
        assert_eq!(code.tape, vec![0x23, 1, 0, 0x23, 2, 0, 0x23, 0, 0, 0x51, 2, 0]);
        assert_eq!(code.max_stack, 3);
    }

    #[test]
    fn test_fractional_quantity_falls_back() {
        let mut fx = fixture();
        let node = Node::has(fx.has, fx.bow, 1.5);
        let code = compile(&node, &fx.symbols, &mut fx.objects, &FastOps::with_defaults()).unwrap();
        assert_eq!(code.tape.last(), Some(&0));
        assert_eq!(code.tape[code.tape.len() - 3], Opcode::Invoke as u8);
    }

    #[test]
    fn test_quantity_out_of_byte_range_falls_back() {
        let mut fx = fixture();
        let node = Node::has(fx.has, fx.bow, 256.0);
        let code = compile(&node, &fx.symbols, &mut fx.objects, &FastOps::with_defaults()).unwrap();
        assert_eq!(code.tape, vec![0x23, 1, 0, 0x23, 2, 0, 0x23, 0, 0, 0x51, 2, 0]);

        let node = Node::has(fx.has, fx.bow, 255.0);
        let code = compile(&node, &fx.symbols, &mut fx.objects, &FastOps::with_defaults()).unwrap();
        assert_eq!(code.tape, vec![0x23, 1, 0, 0x41, 1, 0, 255]);

        let node = Node::has(fx.has, fx.bow, -1.0);
        let code = compile(&node, &fx.symbols, &mut fx.objects, &FastOps::with_defaults()).unwrap();
        assert_eq!(code.tape[code.tape.len() - 3], Opcode::Invoke as u8);
    }

    #[test]
    fn test_non_token_subject_falls_back() {
        let mut fx = fixture();
        let setting = fx.symbols.declare("damage_multiplier", SymbolKind::Setting).unwrap();
        fx.objects
            .associate_symbol(setting, Object::ptr(PtrTag::Setting, 0))
            .unwrap();
        let node = Node::has(fx.has, setting, 1.0);
        let code = compile(&node, &fx.symbols, &mut fx.objects, &FastOps::with_defaults()).unwrap();
        assert_eq!(code.tape, vec![0x23, 2, 0, 0x23, 3, 0, 0x23, 0, 0, 0x51, 2, 0]);

        let mut fx = fixture();
        let node = Node::invoke(fx.has, vec![Node::String("Bow".to_owned()), Node::Number(1.0)]);
        let code = compile(&node, &fx.symbols, &mut fx.objects, &FastOps::with_defaults()).unwrap();
        assert_eq!(code.tape, vec![0x23, 2, 0, 0x23, 3, 0, 0x23, 0, 0, 0x51, 2, 0]);
        assert!(!code.tape.contains(&(Opcode::ChkQty as u8)));
    }

    #[test]
    fn test_zero_arg_call_uses_invoke_0() {
        let mut fx = fixture();
        let adult = fx.symbols.declare("is_adult", SymbolKind::BuiltInFunction).unwrap();
        fx.objects
            .define_function(adult, Object::ptr(PtrTag::Func, 1), BuiltInDef::new("is_adult", 0))
            .unwrap();
        let code = compile(&Node::invoke(adult, vec![]), &fx.symbols, &mut fx.objects, &FastOps::new()).unwrap();
        assert_eq!(code.tape, vec![0x52, 2, 0]);
    }

    #[test]
    fn test_compare_visits_rhs_first() {
        let mut fx = fixture();
        let node = Node::compare(CompareOp::Lt, Node::Number(1.0), Node::Number(2.0));
        let code = compile(&node, &fx.symbols, &mut fx.objects, &FastOps::new()).unwrap();
        let two = fx.objects.intern_number(2.0).unwrap();
        assert_eq!(&code.tape[..3], &[0x23, two.raw().to_le_bytes()[0], 0]);
        assert_eq!(code.tape.last(), Some(&(Opcode::CmpLt as u8)));
    }

    #[test]
    fn test_uncompilable_identifier() {
        let mut fx = fixture();
        let local = fx.symbols.declare("x", SymbolKind::Local).unwrap();
        let err = compile(&Node::Identifier(local), &fx.symbols, &mut fx.objects, &FastOps::new()).unwrap_err();
        assert!(matches!(err, CompileError::Uncompilable { kind: SymbolKind::Local, .. }));
    }

    #[test]
    fn test_arity_is_checked() {
        let mut fx = fixture();
        let node = Node::invoke(fx.has, vec![Node::Identifier(fx.bow)]);
        let err = compile(&node, &fx.symbols, &mut fx.objects, &FastOps::with_defaults()).unwrap_err();
        assert_eq!(err.to_string(), "\"has\" expects 2 arguments but received 1");
    }

    #[test]
    fn test_unresolved_callee() {
        let mut fx = fixture();
        let f = fx.symbols.declare("mystery", SymbolKind::Function).unwrap();
        let err = compile(&Node::invoke(f, vec![]), &fx.symbols, &mut fx.objects, &FastOps::new()).unwrap_err();
        assert!(matches!(err, CompileError::UnresolvedCallee { .. }));
    }

    #[test]
    fn test_bytecode_snapshot_round_trip() {
        let mut fx = fixture();
        let code = compile(&Node::has(fx.has, fx.bow, 1.0), &fx.symbols, &mut fx.objects, &FastOps::with_defaults())
            .unwrap();
        assert_eq!(Bytecode::load(&code.dump().unwrap()).unwrap(), code);
    }
}
