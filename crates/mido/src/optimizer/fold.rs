//! Constant folding of negations and comparisons.

use super::OptimizeError;
use crate::ast::{Compare, CompareOp, Node, RewriteCx, Rewriter};

#[derive(Debug, Clone, Copy, Default)]
pub struct FoldConstants;

impl Rewriter for FoldConstants {
    fn name(&self) -> &'static str {
        "fold"
    }

    fn rewrite_invert(&mut self, inner: Node, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        Ok(match self.rewrite(inner, cx)? {
            Node::Boolean(value) => Node::Boolean(!value),
            other => Node::invert(other),
        })
    }

    fn rewrite_compare(&mut self, compare: Compare, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        let op = compare.op;
        let lhs = self.rewrite(*compare.lhs, cx)?;
        let rhs = self.rewrite(*compare.rhs, cx)?;
        let folded = match (&lhs, &rhs) {
            (Node::Number(a), Node::Number(b)) => ordered(op, a, b),
            (Node::String(a), Node::String(b)) => ordered(op, a, b),
            (Node::Boolean(a), Node::Boolean(b)) => unordered(op, a, b, "booleans")?,
            // aliases share the id of their original
            (Node::Identifier(a), Node::Identifier(b)) => unordered(op, a, b, "identifiers")?,
            _ => return Ok(Node::compare(op, lhs, rhs)),
        };
        Ok(Node::Boolean(folded))
    }
}

fn ordered<T: PartialOrd + ?Sized>(op: CompareOp, a: &T, b: &T) -> bool {
    match op {
        CompareOp::Eq => a == b,
        CompareOp::Nq => a != b,
        CompareOp::Lt => a < b,
    }
}

fn unordered<T: PartialEq>(op: CompareOp, a: &T, b: &T, kind: &'static str) -> Result<bool, OptimizeError> {
    match op {
        CompareOp::Eq => Ok(a == b),
        CompareOp::Nq => Ok(a != b),
        CompareOp::Lt => Err(OptimizeError::Ordering { kind }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        optimizer::{Context, ScriptedFunctions},
        symbols::{SymbolKind, SymbolTable},
        table::ObjectBuilder,
    };

    fn fold(symbols: &mut SymbolTable, node: Node) -> Result<Node, OptimizeError> {
        let mut objects = ObjectBuilder::new();
        let scripts = ScriptedFunctions::default();
        let mut context = Context::new();
        let mut cx = RewriteCx {
            symbols,
            objects: &mut objects,
            scripts: &scripts,
            context: &mut context,
        };
        FoldConstants.rewrite(node, &mut cx)
    }

    #[test]
    fn test_not_true_is_false() {
        let mut symbols = SymbolTable::new();
        assert_eq!(fold(&mut symbols, Node::invert(Node::Boolean(true))), Ok(Node::Boolean(false)));
    }

    #[test]
    fn test_literal_comparisons() {
        let mut symbols = SymbolTable::new();
        let cases = [
            (Node::compare(CompareOp::Eq, Node::Number(2.0), Node::Number(2.0)), true),
            (Node::compare(CompareOp::Lt, Node::Number(3.0), Node::Number(2.0)), false),
            (
                Node::compare(CompareOp::Nq, Node::String("open".into()), Node::String("closed".into())),
                true,
            ),
            (
                Node::compare(CompareOp::Lt, Node::String("a".into()), Node::String("b".into())),
                true,
            ),
            (Node::compare(CompareOp::Eq, Node::Boolean(true), Node::Boolean(false)), false),
        ];
        for (node, expected) in cases {
            assert_eq!(fold(&mut symbols, node), Ok(Node::Boolean(expected)));
        }
    }

    #[test]
    fn test_identifier_identity() {
        let mut symbols = SymbolTable::new();
        let adult = symbols.declare("adult", SymbolKind::Global).unwrap();
        let child = symbols.declare("child", SymbolKind::Global).unwrap();
        let same = Node::compare(CompareOp::Eq, Node::Identifier(adult), Node::Identifier(adult));
        let different = Node::compare(CompareOp::Eq, Node::Identifier(adult), Node::Identifier(child));
        assert_eq!(fold(&mut symbols, same), Ok(Node::Boolean(true)));
        assert_eq!(fold(&mut symbols, different), Ok(Node::Boolean(false)));
    }

    #[test]
    fn test_orderings_without_order() {
        let mut symbols = SymbolTable::new();
        let err = fold(
            &mut symbols,
            Node::compare(CompareOp::Lt, Node::Boolean(true), Node::Boolean(false)),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "booleans do not support ordering");
    }

    #[test]
    fn test_mixed_kinds_are_kept() {
        let mut symbols = SymbolTable::new();
        let node = Node::compare(CompareOp::Eq, Node::Number(1.0), Node::String("1".into()));
        assert_eq!(fold(&mut symbols, node.clone()), Ok(node));
    }

    #[test]
    fn test_folds_inside_junctions() {
        let mut symbols = SymbolTable::new();
        let bow = symbols.declare("Bow", SymbolKind::Token).unwrap();
        let node = Node::Every(vec![
            Node::invert(Node::Boolean(true)),
            Node::Identifier(bow),
        ]);
        assert_eq!(fold(&mut symbols, node), Ok(Node::Boolean(false)));
    }
}
