//! Constant pool shared by every compiled rule.
//!
//! [`ObjectBuilder`] collects literals and symbol pointers while rules are
//! compiled; [`ObjectBuilder::freeze`] produces the immutable [`Table`] the VM
//! runs against. Indices are `u16` because tapes encode them in two bytes.

use std::fmt;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    object::{Object, ObjectError, StrRef},
    symbols::SymbolId,
};

/// Position of an object in a [`Table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, serde::Serialize, serde::Deserialize)]
pub struct ObjectIndex(u16);

impl ObjectIndex {
    #[inline]
    #[must_use]
    pub fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub fn raw(self) -> u16 {
        self.0
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for ObjectIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Signature of a built-in function: its name and how many arguments it takes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BuiltInDef {
    pub name: String,
    /// Fixed parameter count, or `-1` for variadic.
    pub params: i32,
}

impl BuiltInDef {
    pub const VARIADIC: i32 = -1;

    #[must_use]
    pub fn new(name: impl Into<String>, params: i32) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    #[must_use]
    pub fn variadic(name: impl Into<String>) -> Self {
        Self::new(name, Self::VARIADIC)
    }

    #[must_use]
    pub fn is_variadic(&self) -> bool {
        self.params < 0
    }

    /// Whether a call with `argc` arguments matches this signature.
    #[must_use]
    pub fn accepts(&self, argc: usize) -> bool {
        self.is_variadic() || usize::try_from(self.params).is_ok_and(|p| p == argc)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuilderError {
    /// Every `u16` index is taken.
    TableFull,
    StringTooLong { len: usize },
    /// The string arena outgrew its 32-bit offsets.
    ArenaFull,
    /// A symbol already points at a different object.
    PointerMoved {
        symbol: SymbolId,
        existing: Object,
        attempted: Object,
    },
    /// A symbol was used before a pointer was associated with it.
    NullDereference { symbol: SymbolId },
    MissingDefinition { symbol: SymbolId },
    Object(ObjectError),
}

impl fmt::Display for BuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TableFull => write!(f, "object table is full ({} entries)", usize::from(u16::MAX) + 1),
            Self::StringTooLong { len } => write!(f, "string of {len} bytes exceeds {} bytes", u16::MAX),
            Self::ArenaFull => f.write_str("string arena is full"),
            Self::PointerMoved {
                symbol,
                existing,
                attempted,
            } => write!(f, "ptr moved for {symbol}: {existing:?} -> {attempted:?}"),
            Self::NullDereference { symbol } => write!(f, "compile time dereference of null pointer {symbol}"),
            Self::MissingDefinition { symbol } => write!(f, "{symbol} does not have a mapped definition"),
            Self::Object(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for BuilderError {}

impl From<ObjectError> for BuilderError {
    fn from(err: ObjectError) -> Self {
        Self::Object(err)
    }
}

/// Position in an [`ObjectBuilder`]'s history that
/// [`ObjectBuilder::rollback`] returns to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectCheckpoint {
    values: usize,
    strings: usize,
}

/// Mutable, deduplicating constant pool.
#[derive(Debug, Clone, Default)]
pub struct ObjectBuilder {
    values: Vec<Object>,
    strings: String,
    /// Interned numbers keyed by their bit pattern.
    numbers: AHashMap<u64, ObjectIndex>,
    interned: AHashMap<String, ObjectIndex>,
    pointers: AHashMap<SymbolId, ObjectIndex>,
    definitions: IndexMap<SymbolId, BuiltInDef>,
}

impl ObjectBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, object: Object) -> Result<ObjectIndex, BuilderError> {
        let index = u16::try_from(self.values.len()).map_err(|_| BuilderError::TableFull)?;
        self.values.push(object);
        Ok(ObjectIndex(index))
    }

    pub fn intern_number(&mut self, n: f64) -> Result<ObjectIndex, BuilderError> {
        let object = Object::number(n)?;
        if let Some(&index) = self.numbers.get(&object.bits()) {
            return Ok(index);
        }
        let index = self.push(object)?;
        self.numbers.insert(object.bits(), index);
        Ok(index)
    }

    pub fn intern_string(&mut self, s: &str) -> Result<ObjectIndex, BuilderError> {
        if let Some(&index) = self.interned.get(s) {
            return Ok(index);
        }
        let len = u16::try_from(s.len()).map_err(|_| BuilderError::StringTooLong { len: s.len() })?;
        let offset = u32::try_from(self.strings.len()).map_err(|_| BuilderError::ArenaFull)?;
        if u32::try_from(self.strings.len() + s.len()).is_err() {
            return Err(BuilderError::ArenaFull);
        }
        let index = self.push(Object::str_ref(StrRef { offset, len }))?;
        self.strings.push_str(s);
        self.interned.insert(s.to_owned(), index);
        Ok(index)
    }

    /// Records `ptr` as the pointer for `symbol`. Repeating an association is
    /// harmless; changing it is an error.
    pub fn associate_symbol(&mut self, symbol: SymbolId, ptr: Object) -> Result<ObjectIndex, BuilderError> {
        if let Some(&index) = self.pointers.get(&symbol) {
            let existing = self.values[index.index()];
            if existing != ptr {
                return Err(BuilderError::PointerMoved {
                    symbol,
                    existing,
                    attempted: ptr,
                });
            }
            return Ok(index);
        }
        let index = self.push(ptr)?;
        self.pointers.insert(symbol, index);
        Ok(index)
    }

    pub fn pointer_for(&self, symbol: SymbolId) -> Result<ObjectIndex, BuilderError> {
        self.pointers
            .get(&symbol)
            .copied()
            .ok_or(BuilderError::NullDereference { symbol })
    }

    #[must_use]
    pub fn has_pointer(&self, symbol: SymbolId) -> bool {
        self.pointers.contains_key(&symbol)
    }

    /// Associates a built-in function's pointer and records its signature.
    pub fn define_function(
        &mut self,
        symbol: SymbolId,
        ptr: Object,
        def: BuiltInDef,
    ) -> Result<ObjectIndex, BuilderError> {
        let index = self.associate_symbol(symbol, ptr)?;
        self.definitions.insert(symbol, def);
        Ok(index)
    }

    pub fn function_definition(&self, symbol: SymbolId) -> Result<&BuiltInDef, BuilderError> {
        self.definitions
            .get(&symbol)
            .ok_or(BuilderError::MissingDefinition { symbol })
    }

    #[must_use]
    pub fn at_index(&self, index: ObjectIndex) -> Option<Object> {
        self.values.get(index.index()).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn checkpoint(&self) -> ObjectCheckpoint {
        ObjectCheckpoint {
            values: self.values.len(),
            strings: self.strings.len(),
        }
    }

    /// Drops every constant, pointer and definition added since `checkpoint`.
    pub fn rollback(&mut self, checkpoint: ObjectCheckpoint) {
        let kept = |index: &ObjectIndex| index.index() < checkpoint.values;
        self.values.truncate(checkpoint.values);
        self.strings.truncate(checkpoint.strings);
        self.numbers.retain(|_, index| kept(index));
        self.interned.retain(|_, index| kept(index));
        self.pointers.retain(|_, index| kept(index));
        let pointers = &self.pointers;
        self.definitions.retain(|symbol, _| pointers.contains_key(symbol));
    }

    /// Snapshots the pool into an immutable table.
    #[must_use]
    pub fn freeze(&self) -> Table {
        let builtins = self
            .definitions
            .iter()
            .filter_map(|(symbol, def)| {
                let index = self.pointers.get(symbol)?;
                Some((self.values[index.index()], def.clone()))
            })
            .collect();
        Table {
            values: self.values.clone(),
            strings: self.strings.clone(),
            builtins,
        }
    }
}

/// Frozen constant pool.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Table {
    values: Vec<Object>,
    strings: String,
    /// Pointer and signature of every defined built-in, in definition order.
    builtins: Vec<(Object, BuiltInDef)>,
}

impl Table {
    #[must_use]
    pub fn at_index(&self, index: ObjectIndex) -> Option<Object> {
        self.values.get(index.index()).copied()
    }

    /// Resolves a string object against this table's arena.
    pub fn decode_string(&self, object: Object) -> Result<&str, ObjectError> {
        let s = object.as_str_ref()?;
        let start = s.offset as usize;
        self.strings
            .get(start..start + usize::from(s.len))
            .ok_or(ObjectError::DanglingString(s))
    }

    #[must_use]
    pub fn builtins(&self) -> &[(Object, BuiltInDef)] {
        &self.builtins
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectIndex, Object)> + '_ {
        (0u16..).zip(self.values.iter()).map(|(i, &obj)| (ObjectIndex(i), obj))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Serializes the table with postcard.
    pub fn dump(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn load(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::PtrTag;

    fn sym(n: u32) -> SymbolId {
        SymbolId::from_index(n)
    }

    #[test]
    fn test_numbers_are_deduplicated() {
        let mut builder = ObjectBuilder::new();
        let a = builder.intern_number(1.0).unwrap();
        let b = builder.intern_number(2.0).unwrap();
        let c = builder.intern_number(1.0).unwrap();
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(builder.len(), 2);
        assert!(builder.intern_number(f64::NAN).is_err());
    }

    #[test]
    fn test_strings_are_deduplicated_and_decodable() {
        let mut builder = ObjectBuilder::new();
        let a = builder.intern_string("Deku Tree").unwrap();
        let b = builder.intern_string("Water").unwrap();
        assert_eq!(builder.intern_string("Deku Tree").unwrap(), a);

        let table = builder.freeze();
        assert_eq!(table.decode_string(table.at_index(a).unwrap()).unwrap(), "Deku Tree");
        assert_eq!(table.decode_string(table.at_index(b).unwrap()).unwrap(), "Water");
    }

    #[test]
    fn test_string_length_limit() {
        let mut builder = ObjectBuilder::new();
        let long = "x".repeat(usize::from(u16::MAX) + 1);
        assert_eq!(
            builder.intern_string(&long),
            Err(BuilderError::StringTooLong { len: long.len() })
        );
    }

    #[test]
    fn test_associate_symbol_is_idempotent() {
        let mut builder = ObjectBuilder::new();
        let ptr = Object::ptr(PtrTag::Token, 0);
        let a = builder.associate_symbol(sym(4), ptr).unwrap();
        let b = builder.associate_symbol(sym(4), ptr).unwrap();
        assert_eq!(a, b);
        assert_eq!(builder.pointer_for(sym(4)).unwrap(), a);
    }

    #[test]
    fn test_conflicting_pointer_is_error() {
        let mut builder = ObjectBuilder::new();
        builder.associate_symbol(sym(4), Object::ptr(PtrTag::Token, 0)).unwrap();
        let err = builder
            .associate_symbol(sym(4), Object::ptr(PtrTag::Token, 1))
            .unwrap_err();
        assert!(matches!(err, BuilderError::PointerMoved { .. }));
    }

    #[test]
    fn test_missing_pointer_is_null_dereference() {
        let builder = ObjectBuilder::new();
        assert_eq!(
            builder.pointer_for(sym(9)),
            Err(BuilderError::NullDereference { symbol: sym(9) })
        );
    }

    #[test]
    fn test_function_definitions() {
        let mut builder = ObjectBuilder::new();
        let ptr = Object::ptr(PtrTag::Func, 0);
        builder.define_function(sym(0), ptr, BuiltInDef::new("has", 2)).unwrap();
        assert_eq!(builder.function_definition(sym(0)).unwrap().params, 2);
        assert!(builder.function_definition(sym(1)).is_err());

        let table = builder.freeze();
        assert_eq!(table.builtins(), &[(ptr, BuiltInDef::new("has", 2))]);
    }

    #[test]
    fn test_rollback_drops_later_entries() {
        let mut builder = ObjectBuilder::new();
        let forest = builder.intern_string("Kokiri Forest").unwrap();
        builder.intern_number(1.0).unwrap();
        let checkpoint = builder.checkpoint();

        builder.intern_string("Lost Woods").unwrap();
        builder.intern_number(2.0).unwrap();
        builder.associate_symbol(sym(4), Object::ptr(PtrTag::Token, 4)).unwrap();
        builder
            .define_function(sym(5), Object::ptr(PtrTag::Func, 0), BuiltInDef::new("has", 2))
            .unwrap();
        builder.rollback(checkpoint);

        assert_eq!(builder.len(), 2);
        assert!(!builder.has_pointer(sym(4)));
        assert!(builder.function_definition(sym(5)).is_err());
        assert_eq!(builder.intern_string("Kokiri Forest").unwrap(), forest);
        let woods = builder.intern_string("Lost Woods").unwrap();
        assert_eq!(woods.index(), 2);
        let table = builder.freeze();
        assert_eq!(
            table.decode_string(table.at_index(woods).unwrap()).unwrap(),
            "Lost Woods"
        );
    }

    #[test]
    fn test_builtin_def_accepts() {
        assert!(BuiltInDef::new("has", 2).accepts(2));
        assert!(!BuiltInDef::new("has", 2).accepts(1));
        assert!(BuiltInDef::variadic("has_every").accepts(7));
    }

    #[test]
    fn test_table_snapshot_round_trip() {
        let mut builder = ObjectBuilder::new();
        builder.intern_number(3.5).unwrap();
        builder.intern_string("Kokiri Forest").unwrap();
        builder
            .define_function(sym(1), Object::ptr(PtrTag::Func, 0), BuiltInDef::variadic("has_anyof"))
            .unwrap();
        let table = builder.freeze();

        let bytes = table.dump().unwrap();
        let loaded = Table::load(&bytes).unwrap();
        assert_eq!(loaded, table);
    }
}
