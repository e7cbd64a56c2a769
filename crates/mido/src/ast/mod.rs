//! Typed, symbol-bound syntax tree.
//!
//! Nodes are values: passes consume a tree and build a new one. `Every` and
//! `AnyOf` are kept flat and reduced through [`Node::every`] and
//! [`Node::any_of`], which every pass uses to rebuild junctions.

mod hash;
mod render;
pub(crate) mod rewrite;

pub use hash::{FNV1_OFFSET_BASIS_64, FNV1_PRIME_64, fnv1_64_mix, hash};
pub use render::{Render, render};
pub use rewrite::{RewriteCx, Rewriter, walk, walk_invoke};
use strum::IntoStaticStr;

use crate::symbols::SymbolId;

/// Comparison operator carried by [`Node::Compare`].
///
/// The discriminants are stable: they are written into hashes and passed as
/// numeric literals to `compare_setting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum CompareOp {
    Eq = 1,
    Nq = 2,
    Lt = 3,
}

impl CompareOp {
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Eq),
            2 => Some(Self::Nq),
            3 => Some(Self::Lt),
            _ => None,
        }
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Nq => "!=",
            Self::Lt => "<",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Compare {
    pub op: CompareOp,
    pub lhs: Box<Node>,
    pub rhs: Box<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invoke {
    pub target: Box<Node>,
    pub args: Vec<Node>,
}

impl Invoke {
    /// The callee symbol, if the target is a plain identifier.
    #[must_use]
    pub fn callee(&self) -> Option<SymbolId> {
        match *self.target {
            Node::Identifier(id) => Some(id),
            _ => None,
        }
    }
}

/// A node of the rule tree.
#[derive(Debug, Clone, PartialEq, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Node {
    #[strum(serialize = "anyof")]
    AnyOf(Vec<Node>),
    Every(Vec<Node>),
    #[strum(serialize = "bool")]
    Boolean(bool),
    Compare(Compare),
    Identifier(SymbolId),
    Invert(Box<Node>),
    Invoke(Invoke),
    Number(f64),
    String(String),
}

impl Node {
    /// Stable lowercase tag of this node's variant.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        self.into()
    }

    /// Builds a flattened and reduced `Every`.
    #[must_use]
    pub fn every(items: Vec<Self>) -> Self {
        reduce_every(flatten(items, true))
    }

    /// Builds a flattened and reduced `AnyOf`.
    #[must_use]
    pub fn any_of(items: Vec<Self>) -> Self {
        reduce_any_of(flatten(items, false))
    }

    #[must_use]
    pub fn invoke(target: SymbolId, args: Vec<Self>) -> Self {
        Self::Invoke(Invoke {
            target: Box::new(Self::Identifier(target)),
            args,
        })
    }

    /// `has(item, qty)`
    #[must_use]
    pub fn has(has: SymbolId, item: SymbolId, qty: f64) -> Self {
        Self::invoke(has, vec![Self::Identifier(item), Self::Number(qty)])
    }

    #[must_use]
    pub fn compare(op: CompareOp, lhs: Self, rhs: Self) -> Self {
        Self::Compare(Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    #[must_use]
    pub fn invert(inner: Self) -> Self {
        Self::Invert(Box::new(inner))
    }

    #[must_use]
    pub fn as_identifier(&self) -> Option<SymbolId> {
        match self {
            Self::Identifier(id) => Some(*id),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_invoke(&self) -> Option<&Invoke> {
        match self {
            Self::Invoke(invoke) => Some(invoke),
            _ => None,
        }
    }

    /// Whether this is a call of the symbol `callee`.
    #[must_use]
    pub fn is_call_to(&self, callee: SymbolId) -> bool {
        self.as_invoke().and_then(Invoke::callee) == Some(callee)
    }

    #[must_use]
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Boolean(_) | Self::Number(_) | Self::String(_))
    }
}

fn flatten(items: Vec<Node>, every: bool) -> Vec<Node> {
    fn walk(out: &mut Vec<Node>, items: Vec<Node>, every: bool) {
        for item in items {
            match item {
                Node::Every(inner) if every => walk(out, inner, every),
                Node::AnyOf(inner) if !every => walk(out, inner, every),
                other => out.push(other),
            }
        }
    }

    let mut out = Vec::with_capacity(items.len());
    walk(&mut out, items, every);
    out
}

fn reduce_every(mut items: Vec<Node>) -> Node {
    if items.iter().any(|n| matches!(n, Node::Boolean(false))) {
        return Node::Boolean(false);
    }
    items.retain(|n| !matches!(n, Node::Boolean(true)));
    match items.len() {
        0 => Node::Boolean(true),
        1 => items.pop().unwrap_or(Node::Boolean(true)),
        _ => Node::Every(items),
    }
}

fn reduce_any_of(mut items: Vec<Node>) -> Node {
    if items.iter().any(|n| matches!(n, Node::Boolean(true))) {
        return Node::Boolean(true);
    }
    items.retain(|n| !matches!(n, Node::Boolean(false)));
    match items.len() {
        0 => Node::Boolean(false),
        1 => items.pop().unwrap_or(Node::Boolean(false)),
        _ => Node::AnyOf(items),
    }
}
