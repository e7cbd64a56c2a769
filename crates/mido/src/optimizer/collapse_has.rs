//! Merges single-quantity `has` checks of a junction into one variadic call.
//!
//! `has(A, 1) and has(B, 1)` becomes `has_every(A, B)`, and the same for
//! `or` with `has_anyof`. Calls already in collapsed form are merged too, so
//! the pass is idempotent.

use super::OptimizeError;
use crate::{
    ast::{Node, RewriteCx, Rewriter},
    lower::HAS,
    symbols::{SymbolId, SymbolKind},
};

const HAS_EVERY: &str = "has_every";
const HAS_ANYOF: &str = "has_anyof";

#[derive(Debug, Clone, Copy, Default)]
pub struct CollapseHas;

impl Rewriter for CollapseHas {
    fn name(&self) -> &'static str {
        "collapse_has"
    }

    fn rewrite_every(&mut self, items: Vec<Node>, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        let items = self.rewrite_all(items, cx)?;
        Ok(Node::every(collapse(items, HAS_EVERY, cx)?))
    }

    fn rewrite_any_of(&mut self, items: Vec<Node>, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        let items = self.rewrite_all(items, cx)?;
        Ok(Node::any_of(collapse(items, HAS_ANYOF, cx)?))
    }
}

fn collapse(items: Vec<Node>, variadic: &str, cx: &mut RewriteCx<'_>) -> Result<Vec<Node>, OptimizeError> {
    let has = cx.symbols.lookup(HAS).map(|s| s.id);
    let merged = cx.symbols.lookup(variadic).map(|s| s.id);

    let mut kept = Vec::with_capacity(items.len());
    let mut gathered = Vec::new();
    for item in items {
        match classify(item, has, merged) {
            Gather::Single(subject) => gathered.push(subject),
            Gather::Many(subjects) => gathered.extend(subjects),
            Gather::Keep(item) => kept.push(item),
        }
    }

    match gathered.len() {
        0 => {}
        1 => {
            let has = cx.symbols.declare(HAS, SymbolKind::Function)?;
            kept.push(Node::invoke(has, vec![gathered.remove(0), Node::Number(1.0)]));
        }
        _ => {
            let merged = cx.symbols.declare(variadic, SymbolKind::Function)?;
            kept.push(Node::invoke(merged, gathered));
        }
    }
    Ok(kept)
}

enum Gather {
    Single(Node),
    Many(Vec<Node>),
    Keep(Node),
}

fn classify(item: Node, has: Option<SymbolId>, merged: Option<SymbolId>) -> Gather {
    let Node::Invoke(invoke) = item else {
        return Gather::Keep(item);
    };
    let callee = invoke.callee();
    if callee.is_some() && callee == has && matches!(invoke.args.as_slice(), [_, Node::Number(qty)] if *qty == 1.0) {
        let mut args = invoke.args;
        args.truncate(1);
        return Gather::Single(args.remove(0));
    }
    if callee.is_some() && callee == merged {
        return Gather::Many(invoke.args);
    }
    Gather::Keep(Node::Invoke(invoke))
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

    fn collapsed(symbols: &mut SymbolTable, source: &str) -> String {
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
        let out = CollapseHas.rewrite(node, &mut cx).unwrap();
        render(&out, Some(&*cx.symbols))
    }

    fn table() -> SymbolTable {
        let mut symbols = SymbolTable::new();
        symbols
            .declare_many(["has", "has_every", "has_anyof"], SymbolKind::BuiltInFunction)
            .unwrap();
        symbols
    }

    #[test]
    fn test_every_collapses_single_quantities() {
        let mut symbols = table();
        let out = collapsed(&mut symbols, "has(Bow, 1) and is_adult and has(Hookshot, 1)");
        assert_eq!(
            out,
            r#"(every ($0004 "is_adult") (invoke ($0001 "has_every") ($0003 "Bow") ($0005 "Hookshot")))"#
        );
    }

    #[test]
    fn test_any_of_collapses_into_has_anyof() {
        let mut symbols = table();
        let out = collapsed(&mut symbols, "has(Bow, 1) or has(Slingshot, 1)");
        assert_eq!(
            out,
            r#"(invoke ($0002 "has_anyof") ($0003 "Bow") ($0004 "Slingshot"))"#
        );
    }

    #[test]
    fn test_other_quantities_are_kept() {
        let mut symbols = table();
        let out = collapsed(&mut symbols, "has(Bow, 1) and has(Gold_Skulltula_Token, 10)");
        assert_eq!(
            out,
            r#"(every (invoke ($0000 "has") ($0004 "Gold_Skulltula_Token") 10.000000) (invoke ($0000 "has") ($0003 "Bow") 1.000000))"#
        );
    }

    #[test]
    fn test_existing_has_every_is_merged() {
        let mut symbols = table();
        let first = collapsed(&mut symbols, "has(Bow, 1) and has(Hookshot, 1) and has(Bombs, 1)");
        let second = collapsed(&mut symbols, "has_every(Bow, Hookshot, Bombs)");
        assert_eq!(first, second);
    }

    #[test]
    fn test_nested_junctions_collapse_independently() {
        let mut symbols = table();
        let out = collapsed(&mut symbols, "has(Bow, 1) and (has(Bombs, 1) or has(Bombchus, 1))");
        assert_eq!(
            out,
            r#"(every (invoke ($0002 "has_anyof") ($0004 "Bombs") ($0005 "Bombchus")) (invoke ($0000 "has") ($0003 "Bow") 1.000000))"#
        );
    }
}
