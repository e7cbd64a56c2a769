//! S-expression rendering of rule trees, for diagnostics and test output.

use std::fmt;

use super::Node;
use crate::symbols::SymbolTable;

/// Display adapter that renders a node, resolving names when a table is given.
#[derive(Debug, Clone, Copy)]
pub struct Render<'a> {
    node: &'a Node,
    symbols: Option<&'a SymbolTable>,
}

impl<'a> Render<'a> {
    #[must_use]
    pub fn new(node: &'a Node, symbols: Option<&'a SymbolTable>) -> Self {
        Self { node, symbols }
    }

    fn child(&self, node: &'a Node) -> Self {
        Self { node, ..*self }
    }

    fn list(&self, f: &mut fmt::Formatter<'_>, head: &str, items: &[Node]) -> fmt::Result {
        write!(f, "({head}")?;
        for item in items {
            write!(f, " {}", self.child(item))?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for Render<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node {
            Node::AnyOf(items) => self.list(f, "any-of", items),
            Node::Every(items) => self.list(f, "every", items),
            Node::Boolean(true) => f.write_str("True"),
            Node::Boolean(false) => f.write_str("False"),
            Node::Compare(compare) => write!(
                f,
                "({} {} {})",
                compare.op.symbol(),
                self.child(&compare.lhs),
                self.child(&compare.rhs)
            ),
            Node::Identifier(id) => match self.symbols.and_then(|s| s.name_of(*id)) {
                Some(name) => write!(f, "({id} {name:?})"),
                None => write!(f, "({id})"),
            },
            Node::Invert(inner) => write!(f, "(not {})", self.child(inner)),
            Node::Invoke(invoke) => {
                write!(f, "(invoke {}", self.child(&invoke.target))?;
                for arg in &invoke.args {
                    write!(f, " {}", self.child(arg))?;
                }
                f.write_str(")")
            }
            Node::Number(value) => write!(f, "{value:.6}"),
            Node::String(value) => write!(f, "s{value:?}"),
        }
    }
}

/// Renders `node` to a string.
#[must_use]
pub fn render(node: &Node, symbols: Option<&SymbolTable>) -> String {
    Render::new(node, symbols).to_string()
}
