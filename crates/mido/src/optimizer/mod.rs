//! Tree optimizer.
//!
//! Each pass is a [`Rewriter`]. A [`Pipeline`] runs its passes over a whole
//! rule, one after another, for a fixed number of rounds. Passes share state
//! through [`RewriteCx`]: the symbol table, the object builder, the scripted
//! functions and the per-environment [`Context`].

use std::{borrow::Cow, fmt};

use crate::{
    ast::{Node, RewriteCx, Rewriter},
    config::DEFAULT_ROUNDS,
    symbols::{SymbolError, SymbolId, SymbolKind},
    table::BuilderError,
};

mod bare_funcs;
mod collapse_has;
mod compiler_funcs;
mod connections;
mod fold;
mod inline;
mod promote_tokens;
mod scripts;
mod settings;

pub use bare_funcs::InvokeBareFuncs;
pub use collapse_has::CollapseHas;
pub use compiler_funcs::{CompilerFunction, CompilerFunctionTable, CompilerFuncs, compare_setting, const_compile_func};
pub use connections::ConnectionGeneration;
pub(crate) use connections::{AT, HERE};
pub use fold::FoldConstants;
pub use inline::InlineCalls;
pub use promote_tokens::PromoteTokens;
pub use scripts::{ScriptedFunction, ScriptedFunctions};
pub use settings::{InlineSettings, JsonSettings, SETTINGS_SCHEMA, SettingError, SettingReader, SettingType, schema_type};

#[derive(Debug, Clone, PartialEq)]
pub enum OptimizeError {
    /// A scripted function called with the wrong number of arguments.
    Arity {
        name: String,
        expected: usize,
        received: usize,
    },
    /// Scripted calls nested deeper than the inliner allows.
    InlineDepth { name: String, limit: usize },
    /// A function symbol without a scripted definition.
    MissingScript { name: String },
    /// A bare reference to a function that takes arguments.
    BareFunction { name: String, params: usize },
    /// `<` between values without an order.
    Ordering { kind: &'static str },
    /// `here(..)` outside of a region.
    NoCurrentRegion,
    /// A call whose arguments have the wrong shape.
    Malformed {
        construct: &'static str,
        msg: Cow<'static, str>,
    },
    UnknownSetting { name: String },
    /// A settings schema name bound to a symbol that is not a setting.
    NotASetting { name: String, kind: SymbolKind },
    Setting(SettingError),
    UnknownSymbol(SymbolId),
    Symbol(SymbolError),
    Builder(BuilderError),
}

impl OptimizeError {
    pub(crate) fn malformed(construct: &'static str, msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Malformed {
            construct,
            msg: msg.into(),
        }
    }
}

impl fmt::Display for OptimizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arity {
                name,
                expected,
                received,
            } => write!(f, "{name}: expected {expected} args but got {received}"),
            Self::InlineDepth { name, limit } => {
                write!(f, "inlining {name:?} exceeds the nesting limit of {limit}")
            }
            Self::MissingScript { name } => write!(f, "fn {name:?} was declared but not available in table"),
            Self::BareFunction { name, params } => {
                write!(f, "expected 0-arg function, but {name:?} has {params} args")
            }
            Self::Ordering { kind } => write!(f, "{kind} do not support ordering"),
            Self::NoCurrentRegion => f.write_str("expected current location to be set"),
            Self::Malformed { construct, msg } => write!(f, "malformed {construct}: {msg}"),
            Self::UnknownSetting { name } => write!(f, "unknown setting '{name}'"),
            Self::NotASetting { name, kind } => {
                write!(f, "found setting reader for non-setting {name:?} of kind {kind}")
            }
            Self::Setting(err) => write!(f, "{err}"),
            Self::UnknownSymbol(id) => write!(f, "unknown symbol {id}"),
            Self::Symbol(err) => write!(f, "{err}"),
            Self::Builder(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for OptimizeError {}

impl From<SymbolError> for OptimizeError {
    fn from(err: SymbolError) -> Self {
        Self::Symbol(err)
    }
}

impl From<BuilderError> for OptimizeError {
    fn from(err: BuilderError) -> Self {
        Self::Builder(err)
    }
}

impl From<SettingError> for OptimizeError {
    fn from(err: SettingError) -> Self {
        match err {
            SettingError::Unknown { name } => Self::UnknownSetting { name },
            other => Self::Setting(other),
        }
    }
}

/// A rule generated by `at(..)` or `here(..)`, waiting to be compiled.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedConnection {
    /// Region the connection leaves from.
    pub origin: String,
    /// Name of the hidden token the connection grants.
    pub destination: String,
    /// Name of the placement holding the token.
    pub placement: String,
    pub rule: Node,
    /// Generation the connection was recorded in.
    pub generation: u32,
}

/// Connections recorded since the last [`GeneratedConnections::take`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedConnections {
    generation: u32,
    pending: Vec<GeneratedConnection>,
}

impl GeneratedConnections {
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeneratedConnection> {
        self.pending.iter()
    }

    pub(crate) fn record(&mut self, origin: String, destination: String, placement: String, rule: Node) {
        self.pending.push(GeneratedConnection {
            origin,
            destination,
            placement,
            rule,
            generation: self.generation,
        });
    }

    /// Removes the pending connections and starts the next generation.
    pub fn take(&mut self) -> Vec<GeneratedConnection> {
        self.generation += 1;
        std::mem::take(&mut self.pending)
    }
}

/// Position in a [`Context`]'s history that [`Context::rollback`] returns to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextCheckpoint {
    generation: u32,
    pending: usize,
}

/// Optimizer state that outlives a single rule.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Region whose rules are being compiled, used by `here(..)`.
    pub current_region: Option<String>,
    pub connections: GeneratedConnections,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn checkpoint(&self) -> ContextCheckpoint {
        ContextCheckpoint {
            generation: self.connections.generation,
            pending: self.connections.pending.len(),
        }
    }

    /// Drops connections recorded since `checkpoint`. Connections taken in
    /// the meantime stay taken.
    pub fn rollback(&mut self, checkpoint: ContextCheckpoint) {
        if self.connections.generation == checkpoint.generation {
            self.connections.pending.truncate(checkpoint.pending);
        }
    }
}

/// An ordered list of passes run for a number of rounds.
pub struct Pipeline {
    passes: Vec<Box<dyn Rewriter + Send>>,
    rounds: usize,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("passes", &self.names().collect::<Vec<_>>())
            .field("rounds", &self.rounds)
            .finish()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(DEFAULT_ROUNDS)
    }
}

impl Pipeline {
    #[must_use]
    pub fn new(rounds: usize) -> Self {
        Self {
            passes: Vec::new(),
            rounds,
        }
    }

    pub fn add(&mut self, pass: impl Rewriter + Send + 'static) -> &mut Self {
        self.passes.push(Box::new(pass));
        self
    }

    #[must_use]
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.passes.iter().map(|pass| pass.name())
    }

    pub fn run(&mut self, node: Node, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        self.run_traced(node, cx, |_, _, _| {})
    }

    /// Runs every round, calling `step(round, pass, tree)` after each pass.
    /// Rounds are numbered from 1.
    pub fn run_traced<F>(&mut self, mut node: Node, cx: &mut RewriteCx<'_>, mut step: F) -> Result<Node, OptimizeError>
    where
        F: FnMut(usize, &'static str, &Node),
    {
        for round in 1..=self.rounds {
            for pass in &mut self.passes {
                node = pass.rewrite(node, cx)?;
                step(round, pass.name(), &node);
            }
        }
        Ok(node)
    }
}
