//! Lowering from [`ParseTree`] to the symbol-bound [`Node`] tree.
//!
//! Every identifier met here is declared in the symbol table (as `UNKNOWN`
//! unless something more specific is known), and the language's sugar is
//! resolved into calls of intrinsic functions:
//!
//! | source | lowered |
//! |--------|---------|
//! | `logic_foo` | `is_trick_enabled('foo')` |
//! | `setting == x` | `compare_setting(1, setting, x)` |
//! | `'x' in dungeon_shortcuts` | `region_has_shortcuts('x')` |
//! | `skipped_trials[Forest]` | `is_trial_skipped('Forest')` |
//! | `(a, b)` | `has(a, b)` |

use std::{borrow::Cow, fmt};

use crate::{
    ast::{CompareOp, Invoke, Node},
    parse::{BinOp, BoolOp, Literal, ParseTree, UnaryOp},
    symbols::{SymbolError, SymbolId, SymbolKind, SymbolTable},
};

const TRICK_PREFIX: &str = "logic_";
const TRICK_PREFIX_EXEMPT: &str = "logic_rules";

pub(crate) const IS_TRICK_ENABLED: &str = "is_trick_enabled";
pub(crate) const COMPARE_SETTING: &str = "compare_setting";
pub(crate) const REGION_HAS_SHORTCUTS: &str = "region_has_shortcuts";
pub(crate) const IS_TRIAL_SKIPPED: &str = "is_trial_skipped";
pub(crate) const HAS: &str = "has";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LowerError {
    /// A parse tree shape with no lowering.
    Invalid {
        construct: &'static str,
        msg: Cow<'static, str>,
    },
    Symbol(SymbolError),
}

impl LowerError {
    fn invalid(construct: &'static str, msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Invalid {
            construct,
            msg: msg.into(),
        }
    }
}

impl fmt::Display for LowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid { construct, msg } => write!(f, "invalid {construct} construction: {msg}"),
            Self::Symbol(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for LowerError {}

impl From<SymbolError> for LowerError {
    fn from(err: SymbolError) -> Self {
        Self::Symbol(err)
    }
}

/// Lowers a parse tree, declaring the identifiers it references.
pub fn lower(symbols: &mut SymbolTable, tree: &ParseTree) -> Result<Node, LowerError> {
    match tree {
        ParseTree::BinOp { op: BinOp::In, lhs, rhs } => lower_contains(symbols, lhs, rhs),
        ParseTree::BinOp { op, lhs, rhs } => {
            let op = match op {
                BinOp::Eq => CompareOp::Eq,
                BinOp::Nq => CompareOp::Nq,
                _ => CompareOp::Lt,
            };
            let lhs = lower(symbols, lhs)?;
            let rhs = lower(symbols, rhs)?;
            if is_setting(symbols, &lhs) || is_setting(symbols, &rhs) {
                return intrinsic(symbols, COMPARE_SETTING, vec![Node::Number(f64::from(op as u8)), lhs, rhs]);
            }
            Ok(Node::compare(op, lhs, rhs))
        }
        ParseTree::BoolOp { op, lhs, rhs } => {
            let items = vec![lower(symbols, lhs)?, lower(symbols, rhs)?];
            Ok(match op {
                BoolOp::And => Node::every(items),
                BoolOp::Or => Node::any_of(items),
            })
        }
        ParseTree::Call { callee, args } => {
            let target = lower(symbols, callee)?;
            if let Some(id) = target.as_identifier() {
                declare_callee(symbols, id)?;
            }
            let args = args
                .iter()
                .map(|arg| lower(symbols, arg))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Node::Invoke(Invoke {
                target: Box::new(target),
                args,
            }))
        }
        ParseTree::Identifier(name) => {
            if let Some(trick) = name.strip_prefix(TRICK_PREFIX)
                && name != TRICK_PREFIX_EXEMPT
            {
                return intrinsic(symbols, IS_TRICK_ENABLED, vec![Node::String(trick.to_owned())]);
            }
            Ok(Node::Identifier(symbols.declare(name, SymbolKind::Unknown)?))
        }
        ParseTree::Literal(Literal::Bool(value)) => Ok(Node::Boolean(*value)),
        ParseTree::Literal(Literal::Number(value)) => Ok(Node::Number(*value)),
        ParseTree::Literal(Literal::String(value)) => Ok(Node::String(value.clone())),
        ParseTree::Subscript { target, index } => match (&**target, &**index) {
            (ParseTree::Identifier(target), ParseTree::Identifier(trial)) if target == "skipped_trials" => {
                intrinsic(symbols, IS_TRIAL_SKIPPED, vec![Node::String(trial.clone())])
            }
            _ => Err(LowerError::invalid(
                "subscript",
                "only skipped_trials[Name] is supported",
            )),
        },
        ParseTree::Tuple(elems) => {
            let args = elems
                .iter()
                .map(|elem| lower(symbols, elem))
                .collect::<Result<Vec<_>, _>>()?;
            intrinsic(symbols, HAS, args)
        }
        ParseTree::UnaryOp { op: UnaryOp::Not, operand } => Ok(Node::invert(lower(symbols, operand)?)),
    }
}

fn lower_contains(symbols: &mut SymbolTable, lhs: &ParseTree, rhs: &ParseTree) -> Result<Node, LowerError> {
    match (lhs, rhs) {
        (ParseTree::Literal(Literal::String(region)), ParseTree::Identifier(set)) if set == "dungeon_shortcuts" => {
            intrinsic(symbols, REGION_HAS_SHORTCUTS, vec![Node::String(region.clone())])
        }
        _ => Err(LowerError::invalid(
            "contains",
            "only 'region' in dungeon_shortcuts is supported",
        )),
    }
}

fn is_setting(symbols: &SymbolTable, node: &Node) -> bool {
    node.as_identifier()
        .and_then(|id| symbols.kind_of(id))
        .is_some_and(|kind| kind == SymbolKind::Setting)
}

fn intrinsic(symbols: &mut SymbolTable, name: &str, args: Vec<Node>) -> Result<Node, LowerError> {
    let callee = symbols.declare(name, SymbolKind::Function)?;
    Ok(Node::invoke(callee, args))
}

/// Marks a called identifier as some kind of function. Symbols already known to
/// be callable keep their more specific kind.
fn declare_callee(symbols: &mut SymbolTable, id: SymbolId) -> Result<(), SymbolError> {
    let Some(symbol) = symbols.get(id) else {
        return Ok(());
    };
    if symbol.kind == SymbolKind::Unknown || symbol.kind.is_function() {
        let name = symbol.name.clone();
        symbols.declare(&name, SymbolKind::Function)?;
    }
    Ok(())
}
