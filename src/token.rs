use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw source text, including quotes and escapes for literals.
    pub literal: Rc<str>,
    /// Character index of the first character in the source.
    pub offset: usize,
}

impl Token {
    pub fn new(kind: TokenKind, literal: impl Into<Rc<str>>, offset: usize) -> Self {
        Token {
            kind,
            literal: literal.into(),
            offset,
        }
    }

    /// Offset one past the last character of the token.
    pub fn end(&self) -> usize {
        self.offset + self.literal.chars().count()
    }

    pub fn is(&self, literal: &str) -> bool {
        &*self.literal == literal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifiers and keywords alike; keywords are told apart by their text.
    Identifier,
    Integer,
    Decimal,
    Character,
    String,
    Operator,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Identifier => "identifier",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Character => "character",
            Self::String => "string",
            Self::Operator => "operator",
        };
        f.write_str(name)
    }
}
