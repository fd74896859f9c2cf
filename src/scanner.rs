use crate::token::*;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("[offset {offset}] Unexpected character '{ch}'.")]
    UnexpectedCharacter { ch: char, offset: usize },
    #[error("[offset {offset}] Unterminated string literal.")]
    UnterminatedString { offset: usize },
    #[error("[offset {offset}] Unterminated or malformed character literal.")]
    UnterminatedCharacter { offset: usize },
    #[error("[offset {offset}] Invalid escape sequence.")]
    InvalidEscape { offset: usize },
    #[error("[offset {offset}] Malformed number literal.")]
    MalformedNumber { offset: usize },
}

impl LexError {
    pub fn offset(&self) -> usize {
        match self {
            Self::UnexpectedCharacter { offset, .. }
            | Self::UnterminatedString { offset }
            | Self::UnterminatedCharacter { offset }
            | Self::InvalidEscape { offset }
            | Self::MalformedNumber { offset } => *offset,
        }
    }
}

/// Maps the character after a backslash to the character it stands for.
pub(crate) fn escape(c: char) -> Option<char> {
    match c {
        'n' => Some('\n'),
        'b' => Some('\u{8}'),
        'r' => Some('\r'),
        't' => Some('\t'),
        '\'' => Some('\''),
        '"' => Some('"'),
        '\\' => Some('\\'),
        _ => None,
    }
}

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\u{8}' | '\n' | '\r' | '\t')
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

struct Scanner<'a> {
    str: &'a [char],
    index: usize,
    start: usize,
}

impl<'a> Scanner<'a> {
    fn new(str: &'a [char]) -> Self {
        Self {
            str,
            index: 0,
            start: 0,
        }
    }

    fn advance(&mut self) -> Option<char> {
        self.index += 1;
        self.str.get(self.index - 1).copied()
    }

    // "match" is a keyword in the metalanguage already.
    fn match_next(&mut self, pred: impl Fn(char) -> bool) -> bool {
        let res = self.peek().is_some_and(&pred);
        if res {
            self.index += 1;
        }
        res
    }

    fn peek(&self) -> Option<char> {
        self.str.get(self.index).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.str.get(self.index + ahead).copied()
    }

    fn emit(&mut self, kind: TokenKind) -> Token {
        let literal = self.str[self.start..self.index].iter().collect::<String>();
        let token = Token::new(kind, literal, self.start);
        self.start = self.index;
        token
    }

    fn number(&mut self) -> Result<Token, LexError> {
        // Optional sign was already checked to be followed by a digit.
        self.match_next(|c| c == '+' || c == '-');
        while self.match_next(|c| c.is_ascii_digit()) {}

        if self.peek() != Some('.') || !self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            return Ok(self.emit(TokenKind::Integer));
        }

        self.advance();
        while self.match_next(|c| c.is_ascii_digit()) {}

        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            return Err(LexError::MalformedNumber { offset: self.index });
        }
        Ok(self.emit(TokenKind::Decimal))
    }

    fn escape(&mut self) -> Result<(), LexError> {
        // Positioned on the backslash.
        let at = self.index;
        self.advance();
        match self.advance() {
            Some(c) if escape(c).is_some() => Ok(()),
            _ => Err(LexError::InvalidEscape { offset: at }),
        }
    }

    fn character(&mut self) -> Result<Token, LexError> {
        let open = self.start;
        self.advance();
        match self.peek() {
            Some('\\') => self.escape()?,
            Some(c) if c != '\'' && c != '\n' && c != '\r' => {
                self.advance();
            }
            _ => return Err(LexError::UnterminatedCharacter { offset: open }),
        }
        if !self.match_next(|c| c == '\'') {
            return Err(LexError::UnterminatedCharacter { offset: open });
        }
        Ok(self.emit(TokenKind::Character))
    }

    fn string(&mut self) -> Result<Token, LexError> {
        let open = self.start;
        self.advance();
        loop {
            match self.peek() {
                Some('"') => {
                    self.advance();
                    return Ok(self.emit(TokenKind::String));
                }
                Some('\\') => self.escape()?,
                Some('\n' | '\r') | None => {
                    return Err(LexError::UnterminatedString { offset: open })
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    fn operator(&mut self) -> Result<Token, LexError> {
        let Some(c) = self.advance() else {
            return Err(LexError::UnexpectedCharacter { ch: '\0', offset: self.start });
        };
        match c {
            '<' | '>' | '!' | '=' => {
                self.match_next(|d| d == '=');
            }
            '(' | ')' | ',' | '.' | ':' | ';' | '+' | '-' | '*' | '/' => {}
            ch => {
                return Err(LexError::UnexpectedCharacter {
                    ch,
                    offset: self.start,
                })
            }
        }
        Ok(self.emit(TokenKind::Operator))
    }

    fn token(&mut self) -> Result<Token, LexError> {
        let signed_digit = matches!(self.peek(), Some('+' | '-'))
            && self.peek_at(1).is_some_and(|c| c.is_ascii_digit());

        match self.peek() {
            Some(c) if is_identifier_start(c) => {
                while self.match_next(is_identifier_part) {}
                Ok(self.emit(TokenKind::Identifier))
            }
            Some(c) if c.is_ascii_digit() || signed_digit => self.number(),
            Some('\'') => self.character(),
            Some('"') => self.string(),
            _ => self.operator(),
        }
    }
}

/// Splits source text into tokens, skipping whitespace.
///
/// Fails on the first malformed token; nothing that is not whitespace is ever dropped.
pub fn scan(code: &str) -> Result<Vec<Token>, LexError> {
    let chars = code.chars().collect::<Vec<_>>();
    let mut scanner = Scanner::new(&chars);
    let mut result = vec![];

    while let Some(c) = scanner.peek() {
        if is_whitespace(c) {
            scanner.advance();
            scanner.start = scanner.index;
            continue;
        }
        result.push(scanner.token()?);
    }

    tracing::trace!(tokens = result.len(), "scanned source");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(code: &str) -> Vec<(TokenKind, String)> {
        scan(code)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.literal.to_string()))
            .collect()
    }

    #[test]
    fn identifiers_and_keywords() {
        assert_eq!(
            kinds("LET getName thing-2 _x"),
            vec![
                (TokenKind::Identifier, "LET".into()),
                (TokenKind::Identifier, "getName".into()),
                (TokenKind::Identifier, "thing-2".into()),
                (TokenKind::Identifier, "_x".into()),
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            kinds("1 -5 +3.25 1.foo"),
            vec![
                (TokenKind::Integer, "1".into()),
                (TokenKind::Integer, "-5".into()),
                (TokenKind::Decimal, "+3.25".into()),
                (TokenKind::Integer, "1".into()),
                (TokenKind::Operator, ".".into()),
                (TokenKind::Identifier, "foo".into()),
            ]
        );
    }

    #[test]
    fn double_dot_number_is_error() {
        assert_eq!(scan("1.2.3"), Err(LexError::MalformedNumber { offset: 3 }));
    }

    #[test]
    fn operators_are_greedy_but_separate() {
        assert_eq!(
            kinds("a==b != <=>= =;"),
            vec![
                (TokenKind::Identifier, "a".into()),
                (TokenKind::Operator, "==".into()),
                (TokenKind::Identifier, "b".into()),
                (TokenKind::Operator, "!=".into()),
                (TokenKind::Operator, "<=".into()),
                (TokenKind::Operator, ">=".into()),
                (TokenKind::Operator, "=".into()),
                (TokenKind::Operator, ";".into()),
            ]
        );
    }

    #[test]
    fn character_literals() {
        assert_eq!(kinds("'c'"), vec![(TokenKind::Character, "'c'".into())]);
        assert_eq!(kinds(r"'\n'"), vec![(TokenKind::Character, r"'\n'".into())]);
        assert_eq!(scan("''"), Err(LexError::UnterminatedCharacter { offset: 0 }));
        assert_eq!(scan("'ab'"), Err(LexError::UnterminatedCharacter { offset: 0 }));
    }

    #[test]
    fn string_literals() {
        assert_eq!(
            kinds(r#""Hello,\tWorld\"!""#),
            vec![(TokenKind::String, r#""Hello,\tWorld\"!""#.into())]
        );
        assert_eq!(scan("  \"open"), Err(LexError::UnterminatedString { offset: 2 }));
        assert_eq!(scan("\"line\nbreak\""), Err(LexError::UnterminatedString { offset: 0 }));
    }

    #[test]
    fn bad_escape() {
        assert_eq!(scan(r#""a\qb""#), Err(LexError::InvalidEscape { offset: 2 }));
    }

    #[test]
    fn unknown_character() {
        assert_eq!(
            scan("x # y"),
            Err(LexError::UnexpectedCharacter { ch: '#', offset: 2 })
        );
    }

    #[test]
    fn offsets() {
        let tokens = scan("LET x\n  = 1;").unwrap();
        let offsets = tokens.iter().map(|t| t.offset).collect::<Vec<_>>();
        assert_eq!(offsets, vec![0, 4, 8, 10, 11]);
    }

    #[test]
    fn literals_reproduce_source() {
        let code = "DEF main(): Integer DO\n  print(\"a b\" + 'c');\n  RETURN -1 * 2.5;\nEND";
        let joined = scan(code)
            .unwrap()
            .iter()
            .map(|t| t.literal.to_string())
            .collect::<String>();
        let expected = code.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        // The only whitespace inside a token here is the space in "a b".
        assert_eq!(joined.replace(' ', ""), expected);
    }
}
