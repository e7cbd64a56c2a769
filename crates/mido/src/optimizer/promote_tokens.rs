//! Rewrites bare token references into `has(token, 1)`.

use super::OptimizeError;
use crate::{
    ast::{Invoke, Node, RewriteCx, Rewriter},
    lower::HAS,
    symbols::{SymbolId, SymbolKind, SymbolTable},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct PromoteTokens;

impl Rewriter for PromoteTokens {
    fn name(&self) -> &'static str {
        "promote_tokens"
    }

    fn rewrite_invoke(&mut self, invoke: Invoke, _cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        Ok(Node::Invoke(invoke))
    }

    fn rewrite_identifier(&mut self, id: SymbolId, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        let Some(symbol) = cx.symbols.get(id) else {
            return Err(OptimizeError::UnknownSymbol(id));
        };
        let token = if symbol.kind == SymbolKind::Token {
            Some(id)
        } else if symbol.name.contains('_') {
            token_named(cx.symbols, &symbol.name.replace('_', " "))
        } else {
            None
        };
        match token {
            Some(token) => promote(token, cx),
            None => Ok(Node::Identifier(id)),
        }
    }

    fn rewrite_string(&mut self, value: String, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        match token_named(cx.symbols, &value) {
            Some(token) => promote(token, cx),
            None => Ok(Node::String(value)),
        }
    }
}

fn token_named(symbols: &SymbolTable, name: &str) -> Option<SymbolId> {
    symbols
        .lookup(name)
        .filter(|symbol| symbol.kind == SymbolKind::Token)
        .map(|symbol| symbol.id)
}

fn promote(token: SymbolId, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
    let has = cx.symbols.declare(HAS, SymbolKind::Function)?;
    Ok(Node::has(has, token, 1.0))
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
        table::ObjectBuilder,
    };

    fn promoted(symbols: &mut SymbolTable, source: &str) -> String {
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
        let out = PromoteTokens.rewrite(node, &mut cx).unwrap();
        render(&out, Some(&*cx.symbols))
    }

    fn table() -> SymbolTable {
        let mut symbols = SymbolTable::new();
        symbols.declare("has", SymbolKind::BuiltInFunction).unwrap();
        symbols
            .declare_many(["Bow", "Slingshot", "Kokiri Sword"], SymbolKind::Token)
            .unwrap();
        symbols
    }

    #[test]
    fn test_tokens_become_has_checks() {
        let mut symbols = table();
        let out = promoted(&mut symbols, "Bow or is_adult");
        assert_eq!(
            out,
            r#"(any-of (invoke ($0000 "has") ($0001 "Bow") 1.000000) ($0004 "is_adult"))"#
        );
    }

    #[test]
    fn test_underscored_name_finds_spaced_token() {
        let mut symbols = table();
        let out = promoted(&mut symbols, "Kokiri_Sword");
        assert_eq!(out, r#"(invoke ($0000 "has") ($0003 "Kokiri Sword") 1.000000)"#);
    }

    #[test]
    fn test_string_naming_a_token() {
        let mut symbols = table();
        let out = promoted(&mut symbols, "'Slingshot' and 'not a token'");
        assert_eq!(
            out,
            r#"(every (invoke ($0000 "has") ($0002 "Slingshot") 1.000000) s"not a token")"#
        );
    }

    #[test]
    fn test_underscored_non_token_is_kept() {
        let mut symbols = table();
        symbols.declare("open forest", SymbolKind::Setting).unwrap();
        let out = promoted(&mut symbols, "open_forest");
        assert_eq!(out, r#"($0005 "open_forest")"#);
    }

    #[test]
    fn test_call_arguments_are_not_promoted() {
        let mut symbols = table();
        let out = promoted(&mut symbols, "has(Bow, 2)");
        assert_eq!(out, r#"(invoke ($0000 "has") ($0001 "Bow") 2.000000)"#);
    }
}
