//! Pratt parser producing an untyped [`ParseTree`].
//!
//! A prefix table dispatches on the current token, and an infix table on the
//! following token. The infix loop runs while the following token binds tighter
//! than the caller's minimum [`Precedence`].

use std::{borrow::Cow, fmt, mem};

use crate::lexer::{Lexer, Token, TokenKind};

/// Errors that can occur while lexing or parsing a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Malformed characters: unexpected characters, unterminated strings or brackets.
    Lexical { msg: Cow<'static, str>, position: usize },
    /// Well formed tokens in an unexpected order.
    Syntax { msg: Cow<'static, str>, position: usize },
}

impl ParseError {
    pub(crate) fn lexical(msg: impl Into<Cow<'static, str>>, position: usize) -> Self {
        Self::Lexical {
            msg: msg.into(),
            position,
        }
    }

    pub(crate) fn syntax(msg: impl Into<Cow<'static, str>>, position: usize) -> Self {
        Self::Syntax {
            msg: msg.into(),
            position,
        }
    }

    /// Byte offset the error was reported at.
    #[must_use]
    pub fn position(&self) -> usize {
        match self {
            Self::Lexical { position, .. } | Self::Syntax { position, .. } => *position,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Lexical { msg, .. } | Self::Syntax { msg, .. } => msg,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lexical { msg, position } => write!(f, "lexical error at offset {position}: {msg}"),
            Self::Syntax { msg, position } => write!(f, "syntax error at offset {position}: {msg}"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Binding power of infix operators, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Lowest,
    Or,
    And,
    Not,
    Compare,
    Index,
    Call,
}

impl Precedence {
    fn of(kind: TokenKind) -> Self {
        match kind {
            TokenKind::Or => Self::Or,
            TokenKind::And => Self::And,
            TokenKind::Eq | TokenKind::Nq | TokenKind::Lt | TokenKind::In => Self::Compare,
            TokenKind::OpenBracket => Self::Index,
            TokenKind::OpenParen => Self::Call,
            _ => Self::Lowest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Nq,
    Lt,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Number(f64),
    String(String),
}

/// Untyped tree straight out of the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseTree {
    BinOp {
        op: BinOp,
        lhs: Box<ParseTree>,
        rhs: Box<ParseTree>,
    },
    BoolOp {
        op: BoolOp,
        lhs: Box<ParseTree>,
        rhs: Box<ParseTree>,
    },
    Call {
        callee: Box<ParseTree>,
        args: Vec<ParseTree>,
    },
    Identifier(String),
    Literal(Literal),
    Subscript {
        target: Box<ParseTree>,
        index: Box<ParseTree>,
    },
    /// Parenthesized comma separated list.
    Tuple(Vec<ParseTree>),
    UnaryOp {
        op: UnaryOp,
        operand: Box<ParseTree>,
    },
}

/// Parses a complete rule.
pub fn parse(text: &str) -> Result<ParseTree, ParseError> {
    let mut parser = Parser::new(text)?;
    let tree = parser.parse_expression(Precedence::Lowest)?;
    if parser.peek.kind != TokenKind::Eof {
        return Err(ParseError::syntax(
            format!("unexpected token {}", parser.peek.describe()),
            parser.peek.position,
        ));
    }
    Ok(tree)
}

/// Recursive descent state: the current token and one token of lookahead.
#[derive(Debug)]
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token<'src>,
    peek: Token<'src>,
}

impl<'src> Parser<'src> {
    pub fn new(text: &'src str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(text);
        let current = lexer.next_token()?;
        let peek = lexer.next_token()?;
        Ok(Self { lexer, current, peek })
    }

    fn advance(&mut self) -> Result<(), ParseError> {
        let next = self.lexer.next_token()?;
        self.current = mem::replace(&mut self.peek, next);
        Ok(())
    }

    fn expect_peek(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        if self.peek.kind == kind {
            return self.advance();
        }
        let expected: &'static str = match kind {
            TokenKind::CloseParen => "')'",
            TokenKind::CloseBracket => "']'",
            other => other.into(),
        };
        Err(ParseError::syntax(
            format!("expected {expected} but found {}", self.peek.describe()),
            self.peek.position,
        ))
    }

    /// Parses an expression starting at the current token. On return the current
    /// token is the last token of the expression.
    pub fn parse_expression(&mut self, min: Precedence) -> Result<ParseTree, ParseError> {
        let mut left = self.parse_prefix()?;
        while min < Precedence::of(self.peek.kind) {
            self.advance()?;
            left = self.parse_infix(left)?;
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<ParseTree, ParseError> {
        let token = self.current;
        match token.kind {
            TokenKind::Identifier => Ok(ParseTree::Identifier(token.text.to_owned())),
            TokenKind::Number => token
                .text
                .parse::<f64>()
                .map(|n| ParseTree::Literal(Literal::Number(n)))
                .map_err(|_| ParseError::syntax(format!("invalid number '{}'", token.text), token.position)),
            TokenKind::String => Ok(ParseTree::Literal(Literal::String(token.text.to_owned()))),
            TokenKind::True => Ok(ParseTree::Literal(Literal::Bool(true))),
            TokenKind::False => Ok(ParseTree::Literal(Literal::Bool(false))),
            TokenKind::Not => {
                self.advance()?;
                let operand = self.parse_expression(Precedence::Not)?;
                Ok(ParseTree::UnaryOp {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                })
            }
            TokenKind::OpenParen => self.parse_group(),
            _ => Err(ParseError::syntax(
                format!("unexpected token {}", token.describe()),
                token.position,
            )),
        }
    }

    /// `( expr )` or `( expr, expr, ... )`.
    fn parse_group(&mut self) -> Result<ParseTree, ParseError> {
        self.advance()?;
        let first = self.parse_expression(Precedence::Lowest)?;
        if self.peek.kind != TokenKind::Comma {
            self.expect_peek(TokenKind::CloseParen)?;
            return Ok(first);
        }

        let mut elems = vec![first];
        while self.peek.kind == TokenKind::Comma {
            self.advance()?;
            if self.peek.kind == TokenKind::CloseParen {
                break;
            }
            self.advance()?;
            elems.push(self.parse_expression(Precedence::Lowest)?);
        }
        self.expect_peek(TokenKind::CloseParen)?;
        Ok(ParseTree::Tuple(elems))
    }

    fn parse_infix(&mut self, left: ParseTree) -> Result<ParseTree, ParseError> {
        let token = self.current;
        let prec = Precedence::of(token.kind);
        match token.kind {
            TokenKind::And | TokenKind::Or => {
                self.advance()?;
                let rhs = self.parse_expression(prec)?;
                let op = if token.kind == TokenKind::And { BoolOp::And } else { BoolOp::Or };
                Ok(ParseTree::BoolOp {
                    op,
                    lhs: Box::new(left),
                    rhs: Box::new(rhs),
                })
            }
            TokenKind::Eq | TokenKind::Nq | TokenKind::Lt | TokenKind::In => {
                self.advance()?;
                let rhs = self.parse_expression(prec)?;
                let op = match token.kind {
                    TokenKind::Eq => BinOp::Eq,
                    TokenKind::Nq => BinOp::Nq,
                    TokenKind::Lt => BinOp::Lt,
                    _ => BinOp::In,
                };
                Ok(ParseTree::BinOp {
                    op,
                    lhs: Box::new(left),
                    rhs: Box::new(rhs),
                })
            }
            TokenKind::OpenBracket => {
                self.advance()?;
                let index = self.parse_expression(Precedence::Lowest)?;
                self.expect_peek(TokenKind::CloseBracket)?;
                Ok(ParseTree::Subscript {
                    target: Box::new(left),
                    index: Box::new(index),
                })
            }
            TokenKind::OpenParen => {
                let args = self.parse_call_args()?;
                Ok(ParseTree::Call {
                    callee: Box::new(left),
                    args,
                })
            }
            _ => Err(ParseError::syntax(
                format!("unexpected token {}", token.describe()),
                token.position,
            )),
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<ParseTree>, ParseError> {
        let mut args = Vec::new();
        if self.peek.kind == TokenKind::CloseParen {
            self.advance()?;
            return Ok(args);
        }
        self.advance()?;
        args.push(self.parse_expression(Precedence::Lowest)?);
        while self.peek.kind == TokenKind::Comma {
            self.advance()?;
            self.advance()?;
            args.push(self.parse_expression(Precedence::Lowest)?);
        }
        self.expect_peek(TokenKind::CloseParen)?;
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn ident(name: &str) -> ParseTree {
        ParseTree::Identifier(name.to_owned())
    }

    fn num(n: f64) -> ParseTree {
        ParseTree::Literal(Literal::Number(n))
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let tree = parse("Bow or Slingshot and Bombs").unwrap();
        assert_eq!(
            tree,
            ParseTree::BoolOp {
                op: BoolOp::Or,
                lhs: Box::new(ident("Bow")),
                rhs: Box::new(ParseTree::BoolOp {
                    op: BoolOp::And,
                    lhs: Box::new(ident("Slingshot")),
                    rhs: Box::new(ident("Bombs")),
                }),
            }
        );
    }

    #[test]
    fn test_same_precedence_is_left_associative() {
        let tree = parse("a or b or c").unwrap();
        let ParseTree::BoolOp { lhs, rhs, .. } = tree else {
            panic!("expected bool op");
        };
        assert_eq!(*rhs, ident("c"));
        assert!(matches!(*lhs, ParseTree::BoolOp { .. }));
    }

    #[test]
    fn test_not_binds_looser_than_comparison() {
        let tree = parse("not age == 'child'").unwrap();
        let ParseTree::UnaryOp { operand, .. } = tree else {
            panic!("expected unary op");
        };
        assert!(matches!(*operand, ParseTree::BinOp { op: BinOp::Eq, .. }));
    }

    #[test]
    fn test_call_with_arguments() {
        let tree = parse("has(Bucks, 20)").unwrap();
        assert_eq!(
            tree,
            ParseTree::Call {
                callee: Box::new(ident("has")),
                args: vec![ident("Bucks"), num(20.0)],
            }
        );
    }

    #[test]
    fn test_call_without_arguments() {
        let tree = parse("is_adult()").unwrap();
        assert_eq!(
            tree,
            ParseTree::Call {
                callee: Box::new(ident("is_adult")),
                args: vec![],
            }
        );
    }

    #[test]
    fn test_tuple_and_group() {
        assert_eq!(
            parse("(Gold_Skulltula_Token, 10)").unwrap(),
            ParseTree::Tuple(vec![ident("Gold_Skulltula_Token"), num(10.0)])
        );
        assert_eq!(parse("(a)").unwrap(), ident("a"));
    }

    #[test]
    fn test_subscript() {
        assert_eq!(
            parse("skipped_trials[Forest]").unwrap(),
            ParseTree::Subscript {
                target: Box::new(ident("skipped_trials")),
                index: Box::new(ident("Forest")),
            }
        );
    }

    #[test]
    fn test_contains() {
        let tree = parse("'Deku Tree' in dungeon_shortcuts").unwrap();
        assert!(matches!(tree, ParseTree::BinOp { op: BinOp::In, .. }));
    }

    #[test]
    fn test_trailing_token_is_syntax_error() {
        let err = parse("a b").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { position: 2, .. }), "got {err:?}");
    }

    #[test]
    fn test_missing_close_bracket() {
        let err = parse("x[y,").unwrap_err();
        assert_eq!(err.position(), 3);
    }

    #[test]
    fn test_empty_input() {
        let err = parse("   ").unwrap_err();
        assert_eq!(err.message(), "unexpected token end of input");
    }
}
