//! Stable structural hashing of rule trees.
//!
//! Generated connection tokens are named after the hash of their rule, so the
//! byte stream fed to the hasher is fixed: the node tag, then per-variant
//! payload rendered as text. Uses 64-bit FNV-1 (multiply, then xor).

use std::fmt::Write;

use super::Node;

/// 64-bit FNV-1 offset basis.
pub const FNV1_OFFSET_BASIS_64: u64 = 0xcbf2_9ce4_8422_2325;
/// 64-bit FNV-1 prime.
pub const FNV1_PRIME_64: u64 = 0x0000_0100_0000_01B3;

/// Mixes `bytes` into an FNV-1 state.
#[inline]
#[must_use]
pub const fn fnv1_64_mix(mut hash: u64, bytes: &[u8]) -> u64 {
    let mut i = 0usize;
    while i < bytes.len() {
        hash = hash.wrapping_mul(FNV1_PRIME_64);
        hash ^= bytes[i] as u64;
        i += 1;
    }
    hash
}

/// Hashes a node and everything below it.
#[must_use]
pub fn hash(node: &Node) -> u64 {
    let mut hasher = NodeHasher {
        state: FNV1_OFFSET_BASIS_64,
        scratch: String::new(),
    };
    hasher.node(node);
    hasher.state
}

struct NodeHasher {
    state: u64,
    /// Reused buffer for numeric payloads.
    scratch: String,
}

impl NodeHasher {
    fn bytes(&mut self, bytes: &[u8]) {
        self.state = fnv1_64_mix(self.state, bytes);
    }

    fn display(&mut self, value: impl std::fmt::Display) {
        self.scratch.clear();
        // writing into a String cannot fail
        let _ = write!(self.scratch, "{value}");
        self.state = fnv1_64_mix(self.state, self.scratch.as_bytes());
    }

    fn node(&mut self, node: &Node) {
        self.bytes(node.tag().as_bytes());
        match node {
            Node::AnyOf(items) | Node::Every(items) => {
                self.display(items.len());
                for item in items {
                    self.node(item);
                }
            }
            Node::Boolean(value) => self.display(value),
            Node::Compare(compare) => {
                self.display(compare.op as u8);
                self.node(&compare.lhs);
                self.node(&compare.rhs);
            }
            Node::Identifier(id) => self.display(format_args!("{:x}", id.raw())),
            Node::Invert(inner) => self.node(inner),
            Node::Invoke(invoke) => {
                self.node(&invoke.target);
                self.display(invoke.args.len());
                for arg in &invoke.args {
                    self.node(arg);
                }
            }
            Node::Number(value) => self.display(format_args!("{value:.6}")),
            Node::String(value) => self.bytes(value.as_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::CompareOp,
        symbols::SymbolId,
    };

    #[test]
    fn test_fnv1_empty_is_offset_basis() {
        assert_eq!(fnv1_64_mix(FNV1_OFFSET_BASIS_64, b""), FNV1_OFFSET_BASIS_64);
    }

    #[test]
    fn test_compare_hash_is_pinned() {
        let node = Node::compare(CompareOp::Eq, Node::Number(1.0), Node::Number(2.0));
        assert_eq!(hash(&node), 15_766_529_011_315_612_546);
        assert_eq!(hash(&node), hash(&node.clone()));
    }

    #[test]
    fn test_structurally_different_trees_differ() {
        let a = Node::compare(CompareOp::Eq, Node::Number(1.0), Node::Number(2.0));
        let b = Node::compare(CompareOp::Nq, Node::Number(1.0), Node::Number(2.0));
        let c = Node::compare(CompareOp::Eq, Node::Number(2.0), Node::Number(1.0));
        assert_ne!(hash(&a), hash(&b));
        assert_ne!(hash(&a), hash(&c));
    }

    #[test]
    fn test_child_count_separates_junctions() {
        let one = Node::Identifier(SymbolId::from_index(1));
        let a = Node::Every(vec![one.clone(), Node::AnyOf(vec![one.clone(), one.clone()])]);
        let b = Node::Every(vec![one.clone(), one.clone(), one]);
        assert_ne!(hash(&a), hash(&b));
    }
}
