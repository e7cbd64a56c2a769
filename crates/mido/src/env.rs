//! The compile environment: everything needed to turn rule text into bytecode.
//!
//! A [`CompileEnv`] owns the symbol table, the object builder, the scripted
//! functions and the optimizer context. Hosts populate it once with built-in
//! definitions, tokens, settings and helper functions, compile every rule of
//! the world through it, then [`freeze`](CompileEnv::freeze) the object table
//! for the VM.
//!
//! ```
//! use mido::{CompileEnv, CompilerConfig, standard_builtins};
//!
//! let mut env = CompileEnv::new(CompilerConfig::default());
//! env.with_builtins(standard_builtins())?
//!     .with_tokens(["Bow", "Slingshot"])?;
//! let code = env.compile("Bow or Slingshot")?;
//! assert!(!code.tape.is_empty());
//! # Ok::<(), mido::RuleError>(())
//! ```

use std::sync::{Arc, LazyLock};

use regex::Regex;
use strum::IntoStaticStr;

use crate::{
    ast::{Node, RewriteCx, render},
    bytecode::{Bytecode, FastOps, compile},
    config::{CompilerConfig, PassKind},
    error::RuleError,
    lower::lower,
    object::{Object, PtrTag},
    optimizer::{
        AT, CollapseHas, CompilerFuncs, CompilerFunctionTable, ConnectionGeneration, Context, ContextCheckpoint,
        FoldConstants, GeneratedConnection, HERE, InlineCalls, InlineSettings, InvokeBareFuncs, OptimizeError,
        Pipeline, PromoteTokens, ScriptedFunctions, SettingReader,
    },
    parse::parse,
    symbols::{SymbolCheckpoint, SymbolKind, SymbolTable},
    table::{BuiltInDef, ObjectBuilder, ObjectCheckpoint, Table},
};

/// Names every rule may use as plain values.
pub const GLOBAL_NAMES: [&str; 11] = [
    "Fire", "Forest", "Light", "Shadow", "Spirit", "Water", "adult", "age", "both", "either", "child",
];

/// The built-in functions a world's rules call, in pointer order.
#[must_use]
pub fn standard_builtins() -> Vec<BuiltInDef> {
    vec![
        BuiltInDef::new("has", 2),
        BuiltInDef::variadic("has_anyof"),
        BuiltInDef::variadic("has_every"),
        BuiltInDef::new("is_adult", 0),
        BuiltInDef::new("is_child", 0),
        BuiltInDef::new("has_bottle", 0),
        BuiltInDef::new("has_dungeon_rewards", 1),
        BuiltInDef::new("has_hearts", 1),
        BuiltInDef::new("has_medallions", 1),
        BuiltInDef::new("has_stones", 1),
        BuiltInDef::new("is_starting_age", 0),
    ]
}

static ESCAPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"['()\[\]-]").expect("token escape pattern is valid"));

/// The identifier spelling of a display name: `Eyeball Frog (Adult)` is
/// written `Eyeball_Frog_Adult` in rules.
#[must_use]
pub fn escape_name(name: &str) -> String {
    ESCAPED.replace_all(name, "").replace(' ', "_")
}

/// Where a rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SourceKind {
    /// Access rule of a location holding an item.
    Check,
    /// Access rule of an event.
    Event,
    /// Access rule of an exit between regions.
    Transit,
    /// Rule produced by `at(..)` or `here(..)`.
    Generated,
}

/// A rule on its way through the compiler.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilationSource {
    pub kind: SourceKind,
    pub text: String,
    /// Lowered tree; filled from `text` when missing.
    pub ast: Option<Node>,
    /// Tree after optimization.
    pub optimized: Option<Node>,
    pub origin: Option<String>,
    pub destination: Option<String>,
}

impl CompilationSource {
    #[must_use]
    pub fn new(kind: SourceKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            ast: None,
            optimized: None,
            origin: None,
            destination: None,
        }
    }

    /// Rule of an edge from `origin` to `destination`.
    #[must_use]
    pub fn edge(mut self, origin: impl Into<String>, destination: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self.destination = Some(destination.into());
        self
    }

    fn generated(conn: GeneratedConnection, symbols: &SymbolTable) -> Self {
        Self {
            kind: SourceKind::Generated,
            text: render(&conn.rule, Some(symbols)),
            ast: Some(conn.rule),
            optimized: None,
            origin: Some(conn.origin),
            destination: Some(conn.destination),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSource {
    pub source: CompilationSource,
    pub bytecode: Bytecode,
}

pub struct CompileEnv {
    config: CompilerConfig,
    symbols: SymbolTable,
    objects: ObjectBuilder,
    scripts: ScriptedFunctions,
    context: Context,
    fast_ops: FastOps,
    settings: Option<Arc<dyn SettingReader + Send + Sync>>,
    compiler_funcs: Option<Arc<CompilerFunctionTable>>,
    /// Built on first use; invalidated whenever its inputs change.
    pipeline: Option<Pipeline>,
    builtin_count: u32,
    setting_count: u32,
}

impl std::fmt::Debug for CompileEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileEnv")
            .field("config", &self.config)
            .field("symbols", &self.symbols.len())
            .field("objects", &self.objects.len())
            .field("scripts", &self.scripts.len())
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl Default for CompileEnv {
    fn default() -> Self {
        Self::new(CompilerConfig::default())
    }
}

impl CompileEnv {
    /// An environment knowing only the global names and the `at`/`here`
    /// compiler functions.
    ///
    /// # Panics
    ///
    /// Never: the preset names are distinct and go into an empty table.
    #[must_use]
    pub fn new(config: CompilerConfig) -> Self {
        let mut symbols = SymbolTable::new();
        symbols
            .declare_many(GLOBAL_NAMES, SymbolKind::Global)
            .expect("global names are distinct");
        symbols
            .declare_many([AT, HERE], SymbolKind::CompilerFunction)
            .expect("at and here are not global names");
        let fast_ops = if config.fast_ops {
            FastOps::with_defaults()
        } else {
            FastOps::new()
        };
        Self {
            config,
            symbols,
            objects: ObjectBuilder::new(),
            scripts: ScriptedFunctions::default(),
            context: Context::new(),
            fast_ops,
            settings: None,
            compiler_funcs: None,
            pipeline: None,
            builtin_count: 0,
            setting_count: 0,
        }
    }

    /// Declares built-in functions. Each one's pointer addresses its position
    /// across all calls, which is the order a VM host registers callables in.
    pub fn with_builtins(&mut self, defs: impl IntoIterator<Item = BuiltInDef>) -> Result<&mut Self, RuleError> {
        for def in defs {
            let symbol = self.symbols.declare(&def.name, SymbolKind::BuiltInFunction)?;
            let ptr = Object::ptr(PtrTag::Func, self.builtin_count);
            self.objects.define_function(symbol, ptr, def)?;
            self.builtin_count += 1;
        }
        Ok(self)
    }

    pub fn with_tokens<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) -> Result<&mut Self, RuleError> {
        for name in names {
            let symbol = self.symbols.declare(name, SymbolKind::Token)?;
            self.objects
                .associate_symbol(symbol, Object::ptr(PtrTag::Token, symbol.raw()))?;
        }
        Ok(self)
    }

    /// Declares settings the VM reads at run time, addressed by position.
    pub fn with_settings<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) -> Result<&mut Self, RuleError> {
        for name in names {
            let symbol = self.symbols.declare(name, SymbolKind::Setting)?;
            self.objects
                .associate_symbol(symbol, Object::ptr(PtrTag::Setting, self.setting_count))?;
            self.setting_count += 1;
        }
        Ok(self)
    }

    /// Binds the escaped spelling of every token name to its token. Returns
    /// how many aliases were added.
    pub fn alias_tokens(&mut self) -> Result<usize, RuleError> {
        let renames: Vec<(String, String)> = self
            .symbols
            .of_kind(SymbolKind::Token)
            .filter_map(|token| {
                let escaped = escape_name(&token.name);
                (escaped != token.name).then(|| (token.name.clone(), escaped))
            })
            .collect();
        let before = self.symbols.alias_count();
        for (original, escaped) in renames {
            self.symbols.alias(&original, &escaped)?;
        }
        Ok(self.symbols.alias_count() - before)
    }

    /// Declares scripted functions from `(header, body)` pairs.
    pub fn with_scripts<'a>(
        &mut self,
        decls: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<&mut Self, RuleError> {
        let built = ScriptedFunctions::build(&mut self.symbols, decls)?;
        for (name, function) in built.iter() {
            self.scripts.insert(name, function.clone());
        }
        Ok(self)
    }

    pub fn with_compiler_functions(&mut self, table: CompilerFunctionTable) -> Result<&mut Self, RuleError> {
        for name in table.names() {
            self.symbols.declare(name, SymbolKind::CompilerFunction)?;
        }
        self.compiler_funcs = Some(Arc::new(table));
        self.pipeline = None;
        Ok(self)
    }

    /// Settings read at compile time by the settings pass.
    pub fn with_setting_reader(&mut self, reader: impl SettingReader + Send + Sync + 'static) -> &mut Self {
        self.settings = Some(Arc::new(reader));
        self.pipeline = None;
        self
    }

    /// Region `here(..)` refers to.
    pub fn set_current_region(&mut self, region: Option<String>) {
        self.context.current_region = region;
    }

    #[must_use]
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    #[must_use]
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    #[must_use]
    pub fn objects(&self) -> &ObjectBuilder {
        &self.objects
    }

    #[must_use]
    pub fn scripts(&self) -> &ScriptedFunctions {
        &self.scripts
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Names of the passes that run each round, in order.
    pub fn pass_names(&mut self) -> Vec<&'static str> {
        self.pipeline().names().collect()
    }

    fn pipeline(&mut self) -> &mut Pipeline {
        self.pipeline.get_or_insert_with(|| {
            build_pipeline(&self.config, self.settings.as_ref(), self.compiler_funcs.as_ref())
        })
    }

    /// Parses and lowers one rule.
    pub fn lower(&mut self, text: &str) -> Result<Node, RuleError> {
        Ok(lower(&mut self.symbols, &parse(text)?)?)
    }

    pub fn optimize(&mut self, node: Node) -> Result<Node, OptimizeError> {
        self.optimize_traced(node, |_, _, _| {})
    }

    /// Optimizes `node`, calling `step(round, pass, tree)` after every pass.
    ///
    /// A failing pass leaves the environment as it was before the call.
    pub fn optimize_traced<F>(&mut self, node: Node, step: F) -> Result<Node, OptimizeError>
    where
        F: FnMut(usize, &'static str, &Node),
    {
        let checkpoint = self.checkpoint();
        let pipeline = self.pipeline.get_or_insert_with(|| {
            build_pipeline(&self.config, self.settings.as_ref(), self.compiler_funcs.as_ref())
        });
        let mut cx = RewriteCx {
            symbols: &mut self.symbols,
            objects: &mut self.objects,
            scripts: &self.scripts,
            context: &mut self.context,
        };
        let optimized = pipeline.run_traced(node, &mut cx, step);
        if optimized.is_err() {
            self.rollback(checkpoint);
        }
        optimized
    }

    /// Compiles an optimized tree.
    pub fn codegen(&mut self, node: &Node) -> Result<Bytecode, RuleError> {
        Ok(compile(node, &self.symbols, &mut self.objects, &self.fast_ops)?)
    }

    /// Parses, optimizes and compiles one rule. On failure nothing the rule
    /// declared, interned or generated is kept.
    pub fn compile(&mut self, text: &str) -> Result<Bytecode, RuleError> {
        self.atomically(|env| {
            let node = env.lower(text)?;
            let optimized = env.optimize(node)?;
            env.codegen(&optimized)
        })
    }

    /// Compiles a source, recording its lowered and optimized trees. A source
    /// with an origin is compiled with that region current.
    pub fn compile_source(&mut self, source: CompilationSource) -> Result<CompiledSource, RuleError> {
        self.atomically(|env| env.compile_source_unchecked(source))
    }

    fn compile_source_unchecked(&mut self, mut source: CompilationSource) -> Result<CompiledSource, RuleError> {
        let ast = match source.ast.take() {
            Some(ast) => ast,
            None => self.lower(&source.text)?,
        };
        let previous = self.context.current_region.clone();
        if let Some(origin) = &source.origin {
            self.context.current_region = Some(origin.clone());
        }
        let optimized = self.optimize(ast.clone());
        self.context.current_region = previous;
        let optimized = optimized?;
        let bytecode = self.codegen(&optimized)?;
        source.ast = Some(ast);
        source.optimized = Some(optimized);
        Ok(CompiledSource { source, bytecode })
    }

    /// Removes the connections generated so far.
    pub fn take_generated_connections(&mut self) -> Vec<GeneratedConnection> {
        self.context.connections.take()
    }

    /// Compiles pending generated connections, and the ones those generate,
    /// until none remain.
    ///
    /// If any of them fails, the environment is restored to its state before
    /// the call, with every connection that was pending still pending.
    pub fn compile_generated_connections(&mut self) -> Result<Vec<CompiledSource>, RuleError> {
        let pending = self.context.connections.clone();
        let compiled = self.atomically(|env| {
            let mut compiled = Vec::new();
            loop {
                let batch = env.context.connections.take();
                if batch.is_empty() {
                    return Ok(compiled);
                }
                for conn in batch {
                    let source = CompilationSource::generated(conn, &env.symbols);
                    compiled.push(env.compile_source_unchecked(source)?);
                }
            }
        });
        if compiled.is_err() {
            self.context.connections = pending;
        }
        compiled
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            symbols: self.symbols.checkpoint(),
            objects: self.objects.checkpoint(),
            context: self.context.checkpoint(),
        }
    }

    fn rollback(&mut self, checkpoint: Checkpoint) {
        self.symbols.rollback(checkpoint.symbols);
        self.objects.rollback(checkpoint.objects);
        self.context.rollback(checkpoint.context);
    }

    /// Runs `f`, undoing whatever it changed if it fails.
    fn atomically<T, E>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, E>) -> Result<T, E> {
        let checkpoint = self.checkpoint();
        let result = f(self);
        if result.is_err() {
            self.rollback(checkpoint);
        }
        result
    }

    /// Snapshots the object table for a VM.
    #[must_use]
    pub fn freeze(&self) -> Table {
        self.objects.freeze()
    }
}

#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    symbols: SymbolCheckpoint,
    objects: ObjectCheckpoint,
    context: ContextCheckpoint,
}

fn build_pipeline(
    config: &CompilerConfig,
    settings: Option<&Arc<dyn SettingReader + Send + Sync>>,
    compiler_funcs: Option<&Arc<CompilerFunctionTable>>,
) -> Pipeline {
    let mut pipeline = Pipeline::new(config.rounds);
    for kind in config.passes.enabled() {
        match kind {
            PassKind::Connections => {
                pipeline.add(ConnectionGeneration);
            }
            PassKind::Inline => {
                pipeline.add(InlineCalls::new(config.max_inline_depth));
            }
            PassKind::Fold => {
                pipeline.add(FoldConstants);
            }
            PassKind::BareFuncs => {
                pipeline.add(InvokeBareFuncs);
            }
            PassKind::CollapseHas => {
                pipeline.add(CollapseHas);
            }
            PassKind::PromoteTokens => {
                pipeline.add(PromoteTokens);
            }
            PassKind::Settings => {
                if let Some(reader) = settings {
                    pipeline.add(InlineSettings::new(Arc::clone(reader)));
                }
            }
            PassKind::CompilerFuncs => {
                if let Some(table) = compiler_funcs {
                    pipeline.add(CompilerFuncs::new(Arc::clone(table)));
                }
            }
        }
    }
    pipeline
}
