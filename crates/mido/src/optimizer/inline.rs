//! Scripted function inlining.
//!
//! A call of a scripted function is replaced by the function's body with each
//! parameter substituted by the matching argument. The substituted body is
//! rewritten again, so calls it makes are inlined in turn.

use ahash::AHashMap;

use super::OptimizeError;
use crate::{
    ast::{Invoke, Node, RewriteCx, Rewriter, walk_invoke},
    config::DEFAULT_MAX_INLINE_DEPTH,
    symbols::{SymbolId, SymbolKind},
};

#[derive(Debug, Clone)]
pub struct InlineCalls {
    depth: usize,
    max_depth: usize,
}

impl Default for InlineCalls {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INLINE_DEPTH)
    }
}

impl InlineCalls {
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self { depth: 0, max_depth }
    }
}

impl Rewriter for InlineCalls {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn rewrite_invoke(&mut self, invoke: Invoke, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        let scripts = cx.scripts;
        let script = invoke
            .callee()
            .and_then(|callee| cx.symbols.get(callee))
            .filter(|symbol| symbol.kind == SymbolKind::ScriptedFunc)
            .and_then(|symbol| scripts.get(&symbol.name).map(|script| (symbol.name.clone(), script)));
        let Some((name, script)) = script else {
            return walk_invoke(self, invoke, cx);
        };

        if script.params.len() != invoke.args.len() {
            return Err(OptimizeError::Arity {
                name,
                expected: script.params.len(),
                received: invoke.args.len(),
            });
        }
        if self.depth >= self.max_depth {
            return Err(OptimizeError::InlineDepth {
                name,
                limit: self.max_depth,
            });
        }

        let scope: AHashMap<SymbolId, Node> = script.params.iter().copied().zip(invoke.args).collect();
        let body = Substitute { scope: &scope }.rewrite(script.body.clone(), cx)?;

        self.depth += 1;
        let inlined = self.rewrite(body, cx);
        self.depth -= 1;
        inlined
    }
}

/// Replaces the parameters of one call with its arguments.
struct Substitute<'s> {
    scope: &'s AHashMap<SymbolId, Node>,
}

impl Rewriter for Substitute<'_> {
    fn name(&self) -> &'static str {
        "substitute"
    }

    fn rewrite_identifier(&mut self, id: SymbolId, _cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        Ok(self.scope.get(&id).cloned().unwrap_or(Node::Identifier(id)))
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

    fn inline(decls: &[(&str, &str)], source: &str, max_depth: usize) -> Result<String, OptimizeError> {
        let mut symbols = SymbolTable::new();
        let scripts = ScriptedFunctions::build(&mut symbols, decls.iter().copied()).unwrap();
        let node = lower(&mut symbols, &parse(source).unwrap()).unwrap();
        let mut objects = ObjectBuilder::new();
        let mut context = Context::new();
        let mut cx = RewriteCx {
            symbols: &mut symbols,
            objects: &mut objects,
            scripts: &scripts,
            context: &mut context,
        };
        let out = InlineCalls::new(max_depth).rewrite(node, &mut cx)?;
        Ok(render(&out, Some(&symbols)))
    }

    #[test]
    fn test_inlines_with_arguments() {
        let out = inline(&[("both_of(a, b)", "a and b")], "both_of(Bow, Hookshot)", 16).unwrap();
        assert_eq!(out, r#"(every ($0003 "Bow") ($0004 "Hookshot"))"#);
    }

    #[test]
    fn test_nested_calls_are_inlined() {
        let out = inline(
            &[("outer(x)", "inner(x) or False"), ("inner(y)", "not y")],
            "outer(True)",
            16,
        )
        .unwrap();
        assert_eq!(out, "(not True)");
    }

    #[test]
    fn test_arity_mismatch() {
        let err = inline(&[("f(a, b)", "a")], "f(True)", 16).unwrap_err();
        assert_eq!(err.to_string(), "f: expected 2 args but got 1");
    }

    #[test]
    fn test_recursion_hits_depth_limit() {
        let err = inline(&[("loop_forever(a)", "loop_forever(a)")], "loop_forever(True)", 4).unwrap_err();
        assert_eq!(
            err,
            OptimizeError::InlineDepth {
                name: "loop_forever".to_owned(),
                limit: 4,
            }
        );
    }

    #[test]
    fn test_other_calls_are_untouched() {
        let out = inline(&[], "has(Bow, 1)", 16).unwrap();
        assert_eq!(out, r#"(invoke ($0000 "has") ($0001 "Bow") 1.000000)"#);
    }
}
