//! Interned names with a refinable classification.
//!
//! Symbols are append-only. A symbol's [`SymbolKind`] starts as whatever the
//! first declaration said and may be refined by later declarations according to
//! [`SymbolKind::refine`]; any transition not in that table is a hard error,
//! since it means the source data disagrees with itself.
//!
//! Aliases bind an extra name to an existing symbol's index and are not counted
//! by [`SymbolTable::len`].

use std::fmt;

use ahash::AHashMap;
use strum::{EnumString, IntoStaticStr};

/// Index of a symbol in its [`SymbolTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, serde::Serialize, serde::Deserialize)]
pub struct SymbolId(u32);

impl SymbolId {
    #[inline]
    #[must_use]
    pub fn from_index(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:04X}", self.0)
    }
}

/// Classification of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr, serde::Serialize, serde::Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SymbolKind {
    BuiltInFunction,
    CompilerFunction,
    /// A callable of yet unknown provenance.
    Function,
    ScriptedFunc,
    Global,
    Setting,
    Alias,
    /// Parameter of a scripted function.
    Local,
    Unknown,
    Region,
    Placement,
    Token,
    Transit,
}

impl SymbolKind {
    /// Returns the kind a symbol of kind `self` becomes when declared again as
    /// `incoming`, or `None` if the two are incompatible.
    #[must_use]
    pub fn refine(self, incoming: Self) -> Option<Self> {
        use SymbolKind::{BuiltInFunction, CompilerFunction, Function, ScriptedFunc, Token, Unknown};

        match (self, incoming) {
            (_, Unknown | Self::Alias) => Some(self),
            (Token, ScriptedFunc) => Some(ScriptedFunc),
            (BuiltInFunction | CompilerFunction | ScriptedFunc, Function) => Some(self),
            (Function | ScriptedFunc, BuiltInFunction) => Some(BuiltInFunction),
            (Function | ScriptedFunc, CompilerFunction) => Some(CompilerFunction),
            (Unknown, _) => Some(incoming),
            (current, incoming) if current == incoming => Some(current),
            _ => None,
        }
    }

    /// Whether symbols of this kind name something callable.
    #[must_use]
    pub fn is_function(self) -> bool {
        matches!(
            self,
            Self::BuiltInFunction | Self::CompilerFunction | Self::Function | Self::ScriptedFunc
        )
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub id: SymbolId,
    pub kind: SymbolKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    /// A symbol was declared again with an incompatible kind.
    Redeclared {
        id: SymbolId,
        name: String,
        from: SymbolKind,
        to: SymbolKind,
    },
    /// An alias was requested for a name that does not exist.
    MissingOriginal { name: String },
    /// The alias name is already bound to a different symbol.
    AliasConflict { alias: String, existing: SymbolId },
    /// Every symbol id is taken.
    TableFull { name: String },
}

impl fmt::Display for SymbolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redeclared { id, name, from, to } => {
                write!(f, "{id} {name:?} redeclared with different kind: {from} -> {to}")
            }
            Self::MissingOriginal { name } => write!(f, "cannot alias unknown symbol {name:?}"),
            Self::AliasConflict { alias, existing } => {
                write!(f, "alias {alias:?} is already bound to {existing}")
            }
            Self::TableFull { name } => write!(f, "no symbol id left for {name:?}"),
        }
    }
}

impl std::error::Error for SymbolError {}

/// Position in a [`SymbolTable`]'s history that [`SymbolTable::rollback`]
/// returns to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolCheckpoint {
    symbols: usize,
    aliases: usize,
    refinements: usize,
}

/// Append-only symbol storage.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    /// Canonical symbols; position equals id.
    symbols: Vec<Symbol>,
    /// Alias entries, each carrying the id of its original.
    aliases: Vec<Symbol>,
    /// Every bound name, aliases included.
    names: AHashMap<String, SymbolId>,
    /// Kinds replaced by refinement, oldest first.
    refinements: Vec<(SymbolId, SymbolKind)>,
}

impl SymbolTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `name` as `kind`, refining the kind of an existing symbol.
    ///
    /// Declaring through an alias refines the original symbol.
    pub fn declare(&mut self, name: &str, kind: SymbolKind) -> Result<SymbolId, SymbolError> {
        if let Some(&id) = self.names.get(name) {
            let symbol = &mut self.symbols[id.index()];
            let Some(refined) = symbol.kind.refine(kind) else {
                return Err(SymbolError::Redeclared {
                    id,
                    name: symbol.name.clone(),
                    from: symbol.kind,
                    to: kind,
                });
            };
            if refined != symbol.kind {
                self.refinements.push((id, symbol.kind));
                symbol.kind = refined;
            }
            return Ok(id);
        }

        let id = next_id(self.symbols.len(), name)?;
        self.symbols.push(Symbol {
            name: name.to_owned(),
            id,
            kind,
        });
        self.names.insert(name.to_owned(), id);
        Ok(id)
    }

    pub fn declare_many<'a>(
        &mut self,
        names: impl IntoIterator<Item = &'a str>,
        kind: SymbolKind,
    ) -> Result<Vec<SymbolId>, SymbolError> {
        names.into_iter().map(|name| self.declare(name, kind)).collect()
    }

    /// Binds `alias` to the symbol named `original`.
    ///
    /// Re-aliasing to the same symbol is a no-op. An alias name that already
    /// names a different symbol is a conflict.
    pub fn alias(&mut self, original: &str, alias: &str) -> Result<SymbolId, SymbolError> {
        let &id = self.names.get(original).ok_or_else(|| SymbolError::MissingOriginal {
            name: original.to_owned(),
        })?;
        if let Some(&existing) = self.names.get(alias) {
            if existing == id {
                return Ok(id);
            }
            return Err(SymbolError::AliasConflict {
                alias: alias.to_owned(),
                existing,
            });
        }

        self.aliases.push(Symbol {
            name: alias.to_owned(),
            id,
            kind: SymbolKind::Alias,
        });
        self.names.insert(alias.to_owned(), id);
        Ok(id)
    }

    /// Finds a symbol by name. Aliases resolve to their original symbol.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.names.get(name).and_then(|&id| self.get(id))
    }

    #[must_use]
    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id.index())
    }

    #[must_use]
    pub fn kind_of(&self, id: SymbolId) -> Option<SymbolKind> {
        self.get(id).map(|s| s.kind)
    }

    #[must_use]
    pub fn name_of(&self, id: SymbolId) -> Option<&str> {
        self.get(id).map(|s| s.name.as_str())
    }

    /// Number of canonical symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Number of entries including aliases.
    #[must_use]
    pub fn raw_len(&self) -> usize {
        self.symbols.len() + self.aliases.len()
    }

    #[must_use]
    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    /// Canonical symbols in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    /// Alias entries in declaration order.
    pub fn aliases(&self) -> impl Iterator<Item = &Symbol> {
        self.aliases.iter()
    }

    /// Canonical symbols of one kind.
    pub fn of_kind(&self, kind: SymbolKind) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(move |s| s.kind == kind)
    }

    #[must_use]
    pub fn checkpoint(&self) -> SymbolCheckpoint {
        SymbolCheckpoint {
            symbols: self.symbols.len(),
            aliases: self.aliases.len(),
            refinements: self.refinements.len(),
        }
    }

    /// Forgets every declaration, alias and refinement made since `checkpoint`.
    pub fn rollback(&mut self, checkpoint: SymbolCheckpoint) {
        for (id, kind) in self.refinements.drain(checkpoint.refinements.min(self.refinements.len())..).rev() {
            if let Some(symbol) = self.symbols.get_mut(id.index()) {
                symbol.kind = kind;
            }
        }
        for alias in self.aliases.drain(checkpoint.aliases.min(self.aliases.len())..) {
            self.names.remove(&alias.name);
        }
        for symbol in self.symbols.drain(checkpoint.symbols.min(self.symbols.len())..) {
            self.names.remove(&symbol.name);
        }
    }
}

fn next_id(len: usize, name: &str) -> Result<SymbolId, SymbolError> {
    u32::try_from(len)
        .map(SymbolId)
        .map_err(|_| SymbolError::TableFull { name: name.to_owned() })
}
