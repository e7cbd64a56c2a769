//! Tree rewriting.
//!
//! A [`Rewriter`] gets one hook per node variant. Every hook defaults to
//! rebuilding the node from its rewritten children, so a pass only overrides
//! the variants it cares about. [`walk`] is the dispatcher the default
//! [`Rewriter::rewrite`] uses; passes that override `rewrite` call it to fall
//! back to structural recursion.

use super::{Compare, Invoke, Node};
use crate::{
    optimizer::{Context, OptimizeError, ScriptedFunctions},
    symbols::{SymbolId, SymbolTable},
    table::ObjectBuilder,
};

/// Everything a pass may read or update while rewriting one rule.
#[derive(Debug)]
pub struct RewriteCx<'a> {
    pub symbols: &'a mut SymbolTable,
    pub objects: &'a mut ObjectBuilder,
    pub scripts: &'a ScriptedFunctions,
    pub context: &'a mut Context,
}

pub trait Rewriter {
    /// Short name used in traces and configuration.
    fn name(&self) -> &'static str;

    fn rewrite(&mut self, node: Node, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        walk(self, node, cx)
    }

    fn rewrite_all(&mut self, nodes: Vec<Node>, cx: &mut RewriteCx<'_>) -> Result<Vec<Node>, OptimizeError> {
        nodes.into_iter().map(|node| self.rewrite(node, cx)).collect()
    }

    fn rewrite_any_of(&mut self, items: Vec<Node>, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        Ok(Node::any_of(self.rewrite_all(items, cx)?))
    }

    fn rewrite_every(&mut self, items: Vec<Node>, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        Ok(Node::every(self.rewrite_all(items, cx)?))
    }

    fn rewrite_boolean(&mut self, value: bool, _cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        Ok(Node::Boolean(value))
    }

    fn rewrite_compare(&mut self, compare: Compare, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        let lhs = self.rewrite(*compare.lhs, cx)?;
        let rhs = self.rewrite(*compare.rhs, cx)?;
        Ok(Node::compare(compare.op, lhs, rhs))
    }

    fn rewrite_identifier(&mut self, id: SymbolId, _cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        Ok(Node::Identifier(id))
    }

    fn rewrite_invert(&mut self, inner: Node, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        Ok(Node::invert(self.rewrite(inner, cx)?))
    }

    fn rewrite_invoke(&mut self, invoke: Invoke, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        walk_invoke(self, invoke, cx)
    }

    fn rewrite_number(&mut self, value: f64, _cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        Ok(Node::Number(value))
    }

    fn rewrite_string(&mut self, value: String, _cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        Ok(Node::String(value))
    }
}

/// Rebuilds a call from its rewritten target and arguments.
pub fn walk_invoke<R: Rewriter + ?Sized>(
    rewriter: &mut R,
    invoke: Invoke,
    cx: &mut RewriteCx<'_>,
) -> Result<Node, OptimizeError> {
    let target = rewriter.rewrite(*invoke.target, cx)?;
    let args = rewriter.rewrite_all(invoke.args, cx)?;
    Ok(Node::Invoke(Invoke {
        target: Box::new(target),
        args,
    }))
}

/// Dispatches `node` to the matching hook of `rewriter`.
pub fn walk<R: Rewriter + ?Sized>(rewriter: &mut R, node: Node, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
    match node {
        Node::AnyOf(items) => rewriter.rewrite_any_of(items, cx),
        Node::Every(items) => rewriter.rewrite_every(items, cx),
        Node::Boolean(value) => rewriter.rewrite_boolean(value, cx),
        Node::Compare(compare) => rewriter.rewrite_compare(compare, cx),
        Node::Identifier(id) => rewriter.rewrite_identifier(id, cx),
        Node::Invert(inner) => rewriter.rewrite_invert(*inner, cx),
        Node::Invoke(invoke) => rewriter.rewrite_invoke(invoke, cx),
        Node::Number(value) => rewriter.rewrite_number(value, cx),
        Node::String(value) => rewriter.rewrite_string(value, cx),
    }
}
