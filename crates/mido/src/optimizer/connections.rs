//! Replaces `at(region, rule)` and `here(rule)` with checks of hidden tokens.
//!
//! Each call records a [`GeneratedConnection`](super::GeneratedConnection):
//! a hidden placement in the region, reachable under `rule`, holding a token
//! only that placement grants. The call itself becomes `has(token, 1)`. The
//! token is named after the region and the rule's hash, so the same rule
//! generated twice for one region shares one token.

use super::OptimizeError;
use crate::{
    ast::{Invoke, Node, RewriteCx, Rewriter, hash, walk_invoke},
    lower::HAS,
    object::{Object, PtrTag},
    symbols::SymbolKind,
};

pub(crate) const AT: &str = "at";
pub(crate) const HERE: &str = "here";

#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionGeneration;

impl Rewriter for ConnectionGeneration {
    fn name(&self) -> &'static str {
        "connections"
    }

    fn rewrite_invoke(&mut self, invoke: Invoke, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        let name = invoke.callee().and_then(|callee| cx.symbols.name_of(callee));
        match name {
            Some(AT) => at(invoke.args, cx),
            Some(HERE) => here(invoke.args, cx),
            _ => walk_invoke(self, invoke, cx),
        }
    }
}

fn at(args: Vec<Node>, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
    let received = args.len();
    let Ok([origin, rule]) = <[Node; 2]>::try_from(args) else {
        return Err(OptimizeError::malformed(
            AT,
            format!("expected 2 args for at, received {received}"),
        ));
    };
    let Node::String(origin) = origin else {
        return Err(OptimizeError::malformed(
            AT,
            "expected first argument to 'at' to be string",
        ));
    };
    generate(origin, rule, cx)
}

fn here(args: Vec<Node>, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
    let received = args.len();
    let Ok([rule]) = <[Node; 1]>::try_from(args) else {
        return Err(OptimizeError::malformed(
            HERE,
            format!("expected 1 arg for here, received {received}"),
        ));
    };
    let origin = cx.context.current_region.clone().ok_or(OptimizeError::NoCurrentRegion)?;
    generate(origin, rule, cx)
}

fn generate(origin: String, rule: Node, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
    let has = cx.symbols.declare(HAS, SymbolKind::Function)?;
    cx.symbols.declare(&origin, SymbolKind::Region)?;

    let digest = hash(&rule);
    let destination = format!("Token#{origin}#{digest:016x}");
    if let Some(token) = cx.symbols.lookup(&destination) {
        return Ok(Node::has(has, token.id, 1.0));
    }

    let token = cx.symbols.declare(&destination, SymbolKind::Token)?;
    cx.objects
        .associate_symbol(token, Object::ptr(PtrTag::Token, token.raw()))?;
    let placement = format!("Place#{origin}#{digest:016x}");
    cx.context
        .connections
        .record(origin, destination, placement, rule);
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
        symbols::SymbolTable,
        table::ObjectBuilder,
    };

    struct Fixture {
        symbols: SymbolTable,
        objects: ObjectBuilder,
        context: Context,
    }

    impl Fixture {
        fn new() -> Self {
            let mut symbols = SymbolTable::new();
            symbols.declare("has", SymbolKind::BuiltInFunction).unwrap();
            symbols
                .declare_many([AT, HERE], SymbolKind::CompilerFunction)
                .unwrap();
            Self {
                symbols,
                objects: ObjectBuilder::new(),
                context: Context::new(),
            }
        }

        fn run(&mut self, source: &str) -> Result<Node, OptimizeError> {
            let node = lower(&mut self.symbols, &parse(source).unwrap()).unwrap();
            let scripts = ScriptedFunctions::default();
            let mut cx = RewriteCx {
                symbols: &mut self.symbols,
                objects: &mut self.objects,
                scripts: &scripts,
                context: &mut self.context,
            };
            ConnectionGeneration.rewrite(node, &mut cx)
        }
    }

    #[test]
    fn test_at_generates_token_and_connection() {
        let mut fx = Fixture::new();
        let out = fx.run("is_adult and at('Death Mountain', Megaton_Hammer)").unwrap();

        let pending: Vec<_> = fx.context.connections.iter().cloned().collect();
        assert_eq!(pending.len(), 1);
        let conn = &pending[0];
        assert_eq!(conn.origin, "Death Mountain");
        assert!(conn.destination.starts_with("Token#Death Mountain#"));
        assert!(conn.placement.starts_with("Place#Death Mountain#"));
        assert_eq!(conn.destination.len(), "Token#Death Mountain#".len() + 16);

        let token = fx.symbols.lookup(&conn.destination).unwrap();
        assert_eq!(token.kind, SymbolKind::Token);
        assert!(fx.objects.has_pointer(token.id));
        assert_eq!(
            fx.symbols.lookup("Death Mountain").unwrap().kind,
            SymbolKind::Region
        );
        assert_eq!(
            render(&out, Some(&fx.symbols)),
            format!(
                r#"(every ($0003 "is_adult") (invoke ($0000 "has") (${:04X} {:?}) 1.000000))"#,
                token.id.raw(),
                conn.destination
            )
        );
    }

    #[test]
    fn test_same_rule_reuses_token() {
        let mut fx = Fixture::new();
        let first = fx.run("at('Kakariko Village', is_child)").unwrap();
        let second = fx.run("at('Kakariko Village', is_child)").unwrap();
        assert_eq!(first, second);
        assert_eq!(fx.context.connections.len(), 1);
    }

    #[test]
    fn test_here_uses_current_region() {
        let mut fx = Fixture::new();
        assert_eq!(fx.run("here(is_adult)").unwrap_err(), OptimizeError::NoCurrentRegion);

        fx.context.current_region = Some("Lost Woods".to_owned());
        fx.run("here(is_adult)").unwrap();
        let taken = fx.context.connections.take();
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].origin, "Lost Woods");
    }

    #[test]
    fn test_malformed_calls() {
        let mut fx = Fixture::new();
        assert_eq!(
            fx.run("at('Lost Woods')").unwrap_err().to_string(),
            "malformed at: expected 2 args for at, received 1"
        );
        assert_eq!(
            fx.run("at(Lost_Woods, True)").unwrap_err().to_string(),
            "malformed at: expected first argument to 'at' to be string"
        );
    }
}
