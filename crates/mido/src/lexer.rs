//! Tokenizer for rule source text.
//!
//! The lexer hands out one [`Token`] at a time and never allocates: token text
//! borrows from the source. Positions are byte offsets into the source, which is
//! what every lexical and syntax error reports.
//!
//! Parentheses and brackets share one nesting counter, so an unbalanced closer
//! and an unclosed opener are both caught here rather than in the parser.

use strum::IntoStaticStr;

use crate::parse::ParseError;

/// Classification of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum TokenKind {
    Identifier,
    Number,
    /// A quoted string; the token text excludes the quotes.
    String,
    True,
    False,
    And,
    Or,
    Not,
    In,
    /// `==`
    Eq,
    /// `!=`
    Nq,
    /// `<`
    Lt,
    Comma,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    Eof,
}

impl TokenKind {
    fn keyword(text: &str) -> Option<Self> {
        match text {
            "and" => Some(Self::And),
            "or" => Some(Self::Or),
            "not" => Some(Self::Not),
            "in" => Some(Self::In),
            "True" | "true" => Some(Self::True),
            "False" | "false" => Some(Self::False),
            _ => None,
        }
    }
}

/// A single lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub text: &'src str,
    /// Byte offset of the first character of the token.
    pub position: usize,
}

impl<'src> Token<'src> {
    fn new(kind: TokenKind, text: &'src str, position: usize) -> Self {
        Self { kind, text, position }
    }

    /// Human readable form used in syntax errors.
    pub(crate) fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of input".to_owned(),
            TokenKind::String => format!("string '{}'", self.text),
            _ => format!("'{}'", self.text),
        }
    }
}

/// Streaming lexer over rule source text.
#[derive(Debug)]
pub struct Lexer<'src> {
    src: &'src str,
    pos: usize,
    /// Count of currently open `(` and `[`.
    depth: usize,
}

impl<'src> Lexer<'src> {
    #[must_use]
    pub fn new(src: &'src str) -> Self {
        Self { src, pos: 0, depth: 0 }
    }

    /// Produces the next token, or `Eof` once the input is exhausted.
    ///
    /// `Eof` is returned repeatedly after the end is reached.
    pub fn next_token(&mut self) -> Result<Token<'src>, ParseError> {
        self.skip_trivia();
        let start = self.pos;
        let Some(&byte) = self.src.as_bytes().get(start) else {
            if self.depth > 0 {
                return Err(ParseError::lexical("unclosed '(' or '['", start));
            }
            return Ok(Token::new(TokenKind::Eof, "", start));
        };

        match byte {
            b'_' | b'a'..=b'z' | b'A'..=b'Z' => self.identifier(start),
            b'0'..=b'9' => self.number(start),
            b'\'' | b'"' => self.string(start, byte),
            b'=' | b'!' => {
                if self.src.as_bytes().get(start + 1) != Some(&b'=') {
                    return Err(self.unrecognized(start));
                }
                let kind = if byte == b'=' { TokenKind::Eq } else { TokenKind::Nq };
                Ok(self.punct(kind, start, 2))
            }
            b'<' => Ok(self.punct(TokenKind::Lt, start, 1)),
            b',' => Ok(self.punct(TokenKind::Comma, start, 1)),
            b'(' => {
                self.depth += 1;
                Ok(self.punct(TokenKind::OpenParen, start, 1))
            }
            b'[' => {
                self.depth += 1;
                Ok(self.punct(TokenKind::OpenBracket, start, 1))
            }
            b')' | b']' => {
                if self.depth == 0 {
                    // reported just past the offending closer
                    return Err(ParseError::lexical(format!("unexpected '{}'", byte as char), start + 1));
                }
                self.depth -= 1;
                let kind = if byte == b')' {
                    TokenKind::CloseParen
                } else {
                    TokenKind::CloseBracket
                };
                Ok(self.punct(kind, start, 1))
            }
            _ => Err(self.unrecognized(start)),
        }
    }

    fn skip_trivia(&mut self) {
        let bytes = self.src.as_bytes();
        while let Some(&byte) = bytes.get(self.pos) {
            match byte {
                b' ' | b'\t' | b'\n' | b'\r' => self.pos += 1,
                b'#' => {
                    while let Some(&b) = bytes.get(self.pos) {
                        if b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn punct(&mut self, kind: TokenKind, start: usize, len: usize) -> Token<'src> {
        self.pos = start + len;
        Token::new(kind, &self.src[start..self.pos], start)
    }

    fn identifier(&mut self, start: usize) -> Result<Token<'src>, ParseError> {
        self.pos = start + 1;
        self.eat_while(|b| b == b'_' || b.is_ascii_alphanumeric());
        self.expect_separator()?;
        let text = &self.src[start..self.pos];
        let kind = TokenKind::keyword(text).unwrap_or(TokenKind::Identifier);
        Ok(Token::new(kind, text, start))
    }

    fn number(&mut self, start: usize) -> Result<Token<'src>, ParseError> {
        self.pos = start + 1;
        self.eat_while(|b| b.is_ascii_digit());
        self.expect_separator()?;
        Ok(Token::new(TokenKind::Number, &self.src[start..self.pos], start))
    }

    fn string(&mut self, start: usize, quote: u8) -> Result<Token<'src>, ParseError> {
        let body = start + 1;
        match self.src.as_bytes()[body..].iter().position(|&b| b == quote) {
            Some(len) => {
                self.pos = body + len + 1;
                Ok(Token::new(TokenKind::String, &self.src[body..body + len], start))
            }
            None => Err(ParseError::lexical("unterminated string literal", start)),
        }
    }

    fn eat_while(&mut self, pred: impl Fn(u8) -> bool) {
        let bytes = self.src.as_bytes();
        while bytes.get(self.pos).is_some_and(|&b| pred(b)) {
            self.pos += 1;
        }
    }

    /// Identifiers and numbers must be followed by whitespace, punctuation, an
    /// operator, a comment or the end of input.
    fn expect_separator(&self) -> Result<(), ParseError> {
        match self.src.as_bytes().get(self.pos) {
            None
            | Some(
                b' ' | b'\t' | b'\n' | b'\r' | b'.' | b'(' | b')' | b',' | b'[' | b']' | b'=' | b'!' | b'<' | b'#',
            ) => {
                Ok(())
            }
            Some(_) => Err(ParseError::lexical(
                format!("unexpected {:?}", self.char_at(self.pos)),
                self.pos,
            )),
        }
    }

    fn unrecognized(&self, at: usize) -> ParseError {
        ParseError::lexical(format!("unrecognized character {:?}", self.char_at(at)), at)
    }

    fn char_at(&self, at: usize) -> char {
        self.src[at..].chars().next().unwrap_or('\0')
    }
}

/// Lexes the whole input, including the trailing `Eof` token.
pub fn tokenize(src: &str) -> Result<Vec<Token<'_>>, ParseError> {
    let mut lexer = Lexer::new(src);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_token_positions_are_byte_offsets() {
        let tokens = tokenize("Compiler or Interpreter").unwrap();
        let positions: Vec<usize> = tokens.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![0, 9, 12, 23]);
        assert_eq!(tokens[2].text, "Interpreter");
    }

    #[test]
    fn test_keywords_and_operators() {
        use TokenKind::*;
        assert_eq!(
            kinds("not a == 'b' and (c != 1 or d < 2) in True false"),
            vec![
                Not, Identifier, Eq, String, And, OpenParen, Identifier, Nq, Number, Or, Identifier, Lt, Number,
                CloseParen, In, True, False, Eof
            ]
        );
    }

    #[test]
    fn test_string_text_excludes_quotes() {
        let tokens = tokenize("'Kokiri Sword' \"Bow\"").unwrap();
        assert_eq!(tokens[0].text, "Kokiri Sword");
        assert_eq!(tokens[0].position, 0);
        assert_eq!(tokens[1].text, "Bow");
        assert_eq!(tokens[1].position, 15);
    }

    #[test]
    fn test_comments_are_skipped() {
        use TokenKind::*;
        assert_eq!(kinds("a # trailing remark\nor b"), vec![Identifier, Or, Identifier, Eof]);
    }

    #[test]
    fn test_identifier_needs_separator() {
        let err = tokenize("Compiler'").unwrap_err();
        assert_eq!(err.position(), 8);
        assert_eq!(err.message(), "unexpected '\\''");
    }

    #[test]
    fn test_dot_separates_but_is_not_a_token() {
        let err = tokenize("Bow.Arrows").unwrap_err();
        assert_eq!(err.position(), 3);
        assert_eq!(err.message(), "unrecognized character '.'");

        let err = tokenize("Bow$").unwrap_err();
        assert_eq!(err.message(), "unexpected '$'");
    }

    #[test]
    fn test_number_needs_separator() {
        let err = tokenize("99'").unwrap_err();
        assert_eq!(err.position(), 2);
    }

    #[test]
    fn test_unclosed_paren_reports_end_of_input() {
        let err = tokenize("(Compiler").unwrap_err();
        assert_eq!(err.position(), 9);
        assert_eq!(err.message(), "unclosed '(' or '['");
    }

    #[test]
    fn test_stray_close_reports_after_char() {
        let err = tokenize("Compiler)").unwrap_err();
        assert_eq!(err.position(), 9);
        assert_eq!(err.message(), "unexpected ')'");
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("has('Bow)").unwrap_err();
        assert_eq!(err.position(), 4);
    }

    #[test]
    fn test_lone_bang_is_unrecognized() {
        let err = tokenize("a ! b").unwrap_err();
        assert_eq!(err.position(), 2);
    }
}
