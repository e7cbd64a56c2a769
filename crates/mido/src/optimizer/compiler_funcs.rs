//! Functions evaluated by the compiler instead of the VM.
//!
//! A compiler function receives the already rewritten arguments of a call and
//! returns the node replacing it. Most resolve questions fixed for the whole
//! world, such as which tricks are enabled, to literals.

use std::{fmt, sync::Arc};

use ahash::AHashSet;
use indexmap::IndexMap;

use super::OptimizeError;
use crate::{
    ast::{CompareOp, Invoke, Node, RewriteCx, Rewriter, walk_invoke},
    lower::{COMPARE_SETTING, IS_TRIAL_SKIPPED, IS_TRICK_ENABLED, REGION_HAS_SHORTCUTS},
    symbols::SymbolKind,
};

pub type CompilerFunction =
    Box<dyn Fn(&[Node], &mut RewriteCx<'_>) -> Result<Node, OptimizeError> + Send + Sync>;

/// Compiler functions by name, in registration order.
#[derive(Default)]
pub struct CompilerFunctionTable {
    fns: IndexMap<String, CompilerFunction>,
}

impl fmt::Debug for CompilerFunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.fns.keys()).finish()
    }
}

impl CompilerFunctionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The functions every world compiles with.
    ///
    /// `enabled_tricks` holds trick names without their `logic_` prefix.
    /// `night_start` answers `had_night_start`. Time of day checks and trial
    /// skips are treated as always satisfiable, dungeon shortcuts as absent.
    #[must_use]
    pub fn standard(enabled_tricks: AHashSet<String>, night_start: bool) -> Self {
        let mut table = Self::new();
        table
            .register(IS_TRICK_ENABLED, move |args, _| match args {
                [Node::String(trick)] => Ok(Node::Boolean(enabled_tricks.contains(trick))),
                _ => Err(OptimizeError::malformed(
                    IS_TRICK_ENABLED,
                    "expects a single string argument",
                )),
            })
            .register(COMPARE_SETTING, compare_setting)
            .register(IS_TRIAL_SKIPPED, const_compile_func(true))
            .register(REGION_HAS_SHORTCUTS, const_compile_func(false))
            .register("at_day", const_compile_func(true))
            .register("at_night", const_compile_func(true))
            .register("at_dampe_time", const_compile_func(true))
            .register("had_night_start", const_compile_func(night_start));
        table
    }

    /// Adds `f` under `name`, replacing an earlier registration.
    pub fn register<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&[Node], &mut RewriteCx<'_>) -> Result<Node, OptimizeError> + Send + Sync + 'static,
    {
        self.fns.insert(name.to_owned(), Box::new(f));
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CompilerFunction> {
        self.fns.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fns.keys().map(String::as_str)
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

/// A compiler function that always answers `value`.
#[must_use]
pub fn const_compile_func(
    value: bool,
) -> impl Fn(&[Node], &mut RewriteCx<'_>) -> Result<Node, OptimizeError> + Send + Sync + Clone + 'static {
    move |_, _| Ok(Node::Boolean(value))
}

/// `compare_setting(op, lhs, rhs)` becomes a plain comparison once both sides
/// are literals, so constant folding can decide it.
pub fn compare_setting(args: &[Node], cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
    let [Node::Number(code), lhs, rhs] = args else {
        return Err(OptimizeError::malformed(
            COMPARE_SETTING,
            format!("expected op code and 2 operands, received {} args", args.len()),
        ));
    };
    #[expect(clippy::cast_sign_loss, reason = "op codes are small positive literals")]
    let op = CompareOp::from_code(*code as u8)
        .ok_or_else(|| OptimizeError::malformed(COMPARE_SETTING, format!("unknown op code {code}")))?;
    if lhs.is_literal() && rhs.is_literal() {
        return Ok(Node::compare(op, lhs.clone(), rhs.clone()));
    }
    let callee = cx.symbols.declare(COMPARE_SETTING, SymbolKind::Function)?;
    Ok(Node::invoke(callee, args.to_vec()))
}

/// Applies a [`CompilerFunctionTable`] to every call of a registered name.
#[derive(Debug, Default)]
pub struct CompilerFuncs {
    table: Arc<CompilerFunctionTable>,
}

impl CompilerFuncs {
    #[must_use]
    pub fn new(table: impl Into<Arc<CompilerFunctionTable>>) -> Self {
        Self { table: table.into() }
    }
}

impl Rewriter for CompilerFuncs {
    fn name(&self) -> &'static str {
        "compiler_funcs"
    }

    fn rewrite_invoke(&mut self, invoke: Invoke, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        let rewritten = walk_invoke(self, invoke, cx)?;
        let Node::Invoke(invoke) = &rewritten else {
            return Ok(rewritten);
        };
        let f = invoke
            .callee()
            .and_then(|callee| cx.symbols.name_of(callee))
            .and_then(|name| self.table.get(name));
        match f {
            Some(f) => f(&invoke.args, cx),
            None => Ok(rewritten),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        ast::render,
        lower::lower,
        optimizer::{Context, ScriptedFunctions},
        parse::parse,
        symbols::SymbolTable,
        table::ObjectBuilder,
    };

    fn run(symbols: &mut SymbolTable, table: CompilerFunctionTable, source: &str) -> Result<String, OptimizeError> {
        for name in table.names() {
            symbols.declare(name, SymbolKind::CompilerFunction).unwrap();
        }
        let node = lower(symbols, &parse(source).unwrap()).unwrap();
        let mut objects = ObjectBuilder::new();
        let scripts = ScriptedFunctions::default();
        let mut context = Context::new();
        let mut cx = RewriteCx {
            symbols,
            objects: &mut objects,
            scripts: &scripts,
            context: &mut context,
        };
        let out = CompilerFuncs::new(table).rewrite(node, &mut cx)?;
        Ok(render(&out, Some(&*cx.symbols)))
    }

    fn standard() -> CompilerFunctionTable {
        let tricks = ["fewer_tunic_requirements".to_owned()].into_iter().collect();
        CompilerFunctionTable::standard(tricks, false)
    }

    #[test]
    fn test_tricks_resolve_to_literals() {
        let mut symbols = SymbolTable::new();
        let out = run(
            &mut symbols,
            standard(),
            "logic_fewer_tunic_requirements or logic_lens_botw",
        )
        .unwrap();
        assert_eq!(out, "True");
    }

    #[test]
    fn test_constant_functions() {
        let mut symbols = SymbolTable::new();
        let out = run(&mut symbols, standard(), "at_night() and had_night_start()").unwrap();
        assert_eq!(out, "False");
    }

    #[test]
    fn test_compare_setting_waits_for_literals() {
        let mut symbols = SymbolTable::new();
        symbols.declare("damage_multiplier", SymbolKind::Setting).unwrap();
        let out = run(&mut symbols, standard(), "damage_multiplier != 'ohko'").unwrap();
        assert_eq!(
            out,
            r#"(invoke ($0002 "compare_setting") 2.000000 ($0000 "damage_multiplier") s"ohko")"#
        );
    }

    #[test]
    fn test_compare_setting_with_literals() {
        let mut symbols = SymbolTable::new();
        let out = run(&mut symbols, standard(), "compare_setting(3, 2, 5)").unwrap();
        assert_eq!(out, "(< 2.000000 5.000000)");
    }

    #[test]
    fn test_malformed_trick_check() {
        let mut symbols = SymbolTable::new();
        let err = run(&mut symbols, standard(), "is_trick_enabled(1)").unwrap_err();
        assert_eq!(
            err.to_string(),
            "malformed is_trick_enabled: expects a single string argument"
        );
    }

    #[test]
    fn test_unregistered_calls_are_kept() {
        let mut symbols = SymbolTable::new();
        let out = run(&mut symbols, CompilerFunctionTable::new(), "can_use(Bow)").unwrap();
        assert_eq!(out, r#"(invoke ($0000 "can_use") ($0001 "Bow"))"#);
    }
}
