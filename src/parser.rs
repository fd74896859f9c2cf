use crate::expr::*;
use crate::scanner::escape;
use crate::statement::*;
use crate::token::*;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use std::{rc::Rc, str::FromStr};
use thiserror::Error;

type ExprResult = Result<Expr, ParseError>;

const KEYWORDS: [&str; 15] = [
    "LET", "DEF", "DO", "END", "IF", "ELSE", "FOR", "IN", "WHILE", "RETURN", "AND", "OR", "TRUE",
    "FALSE", "NIL",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("[offset {offset}] Expected {expected}, got '{found}'.")]
    ExpectedToken {
        expected: String,
        found: Rc<str>,
        offset: usize,
    },
    #[error("[offset {offset}] Expected {expected}, got end of input.")]
    UnexpectedEof { expected: String, offset: usize },
    #[error("[offset {offset}] Expected an expression, got '{found}'.")]
    ExpectedExpression { found: Rc<str>, offset: usize },
    #[error("[offset {offset}] Trailing comma in argument list.")]
    TrailingComma { offset: usize },
    #[error("[offset {offset}] Malformed literal {literal}.")]
    InvalidLiteral { literal: Rc<str>, offset: usize },
}

impl ParseError {
    pub fn offset(&self) -> usize {
        match self {
            Self::ExpectedToken { offset, .. }
            | Self::UnexpectedEof { offset, .. }
            | Self::ExpectedExpression { offset, .. }
            | Self::TrailingComma { offset }
            | Self::InvalidLiteral { offset, .. } => *offset,
        }
    }
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    index: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Parser<'a> {
        Parser { index: 0, tokens }
    }

    fn has_next(&self) -> bool {
        self.index < self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn advance(&mut self) -> Option<&Token> {
        self.index += 1;
        self.tokens.get(self.index - 1)
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.index - 1]
    }

    /// Keywords and operators are matched by their text. Literal tokens never
    /// match, so a string like `"DO"` can't be mistaken for a keyword.
    fn check(&self, lit: &str) -> bool {
        self.peek().is_some_and(|tok| {
            matches!(tok.kind, TokenKind::Identifier | TokenKind::Operator) && tok.is(lit)
        })
    }

    fn match_next_lits<const N: usize>(&mut self, lits: [&str; N]) -> bool {
        let res = lits.iter().any(|lit| self.check(lit));
        if res {
            self.index += 1;
        }
        res
    }

    /// Where an error about the current position points: the next token, or
    /// just past the last one at end of input.
    fn offset(&self) -> usize {
        match self.peek() {
            Some(tok) => tok.offset,
            None => self.tokens.last().map(Token::end).unwrap_or(0),
        }
    }

    fn expected(&self, expected: impl Into<String>) -> ParseError {
        match self.peek() {
            Some(tok) => ParseError::ExpectedToken {
                expected: expected.into(),
                found: tok.literal.clone(),
                offset: tok.offset,
            },
            None => ParseError::UnexpectedEof {
                expected: expected.into(),
                offset: self.offset(),
            },
        }
    }

    fn consume(&mut self, lit: &str) -> Result<&Token, ParseError> {
        if !self.check(lit) {
            return Err(self.expected(format!("'{lit}'")));
        }
        self.index += 1;

        Ok(self.previous())
    }

    fn consume_identifier(&mut self) -> Result<Rc<str>, ParseError> {
        match self.peek() {
            Some(tok)
                if tok.kind == TokenKind::Identifier && !KEYWORDS.contains(&&*tok.literal) =>
            {
                let ret = tok.literal.clone();
                self.index += 1;
                Ok(ret)
            }
            _ => Err(self.expected("an identifier")),
        }
    }

    // Parsing the actual grammar.
    pub fn parse(&mut self) -> Result<Source, ParseError> {
        let mut source = Source::default();
        while self.match_next_lits(["LET"]) {
            source.fields.push(self.field()?);
        }
        while self.match_next_lits(["DEF"]) {
            source.methods.push(self.method()?);
        }
        if self.has_next() {
            return Err(self.expected("'DEF' or end of input"));
        }
        Ok(source)
    }

    fn field(&mut self) -> Result<Field, ParseError> {
        let offset = self.offset();
        let (name, type_name, value) = self.binding()?;
        Ok(Field {
            name,
            type_name,
            value,
            offset,
            variable: None,
        })
    }

    /// `name (: Type)? (= expr)? ;`, shared by fields and local declarations.
    fn binding(&mut self) -> Result<(Rc<str>, Option<Rc<str>>, Option<Expr>), ParseError> {
        let name = self.consume_identifier()?;
        let type_name = if self.match_next_lits([":"]) {
            Some(self.consume_identifier()?)
        } else {
            None
        };
        let value = if self.match_next_lits(["="]) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(";")?;
        Ok((name, type_name, value))
    }

    fn method(&mut self) -> Result<Method, ParseError> {
        let offset = self.offset();
        let name = self.consume_identifier()?;
        self.consume("(")?;

        let mut params = vec![];
        let mut param_types = vec![];
        if !self.check(")") {
            loop {
                params.push(self.consume_identifier()?);
                self.consume(":")?;
                param_types.push(self.consume_identifier()?);
                if !self.match_next_lits([","]) {
                    break;
                }
            }
        }
        self.consume(")")?;

        let return_type = if self.match_next_lits([":"]) {
            Some(self.consume_identifier()?)
        } else {
            None
        };

        self.consume("DO")?;
        let body = self.block(["END"])?;
        self.consume("END")?;

        Ok(Method {
            name,
            params,
            param_types,
            return_type,
            body,
            offset,
            function: None,
        })
    }

    /// Statements up to (not including) one of `terminators`.
    fn block<const N: usize>(&mut self, terminators: [&str; N]) -> Result<Vec<Stmt>, ParseError> {
        let mut res = vec![];
        while self.has_next() && !terminators.iter().any(|t| self.check(t)) {
            res.push(self.statement()?);
        }
        Ok(res)
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        if self.match_next_lits(["LET"]) {
            self.declaration()
        } else if self.match_next_lits(["IF"]) {
            self.if_statement()
        } else if self.match_next_lits(["FOR"]) {
            self.for_statement()
        } else if self.match_next_lits(["WHILE"]) {
            self.while_statement()
        } else if self.match_next_lits(["RETURN"]) {
            self.return_statement()
        } else {
            self.expression_statement()
        }
    }

    fn declaration(&mut self) -> Result<Stmt, ParseError> {
        let offset = self.offset();
        let (name, type_name, value) = self.binding()?;
        Ok(Stmt::Declare(Declaration {
            name,
            type_name,
            value,
            offset,
            variable: None,
        }))
    }

    fn if_statement(&mut self) -> Result<Stmt, ParseError> {
        let cond = self.expression()?;
        self.consume("DO")?;
        let then = self.block(["ELSE", "END"])?;
        let other = if self.match_next_lits(["ELSE"]) {
            self.block(["END"])?
        } else {
            vec![]
        };
        self.consume("END")?;
        Ok(Stmt::If(cond, then, other))
    }

    fn for_statement(&mut self) -> Result<Stmt, ParseError> {
        let offset = self.offset();
        let name = self.consume_identifier()?;
        self.consume("IN")?;
        let iterable = self.expression()?;
        self.consume("DO")?;
        let body = self.block(["END"])?;
        self.consume("END")?;
        Ok(Stmt::For(ForLoop {
            name,
            iterable,
            body,
            offset,
        }))
    }

    fn while_statement(&mut self) -> Result<Stmt, ParseError> {
        let cond = self.expression()?;
        self.consume("DO")?;
        let body = self.block(["END"])?;
        self.consume("END")?;
        Ok(Stmt::While(cond, body))
    }

    fn return_statement(&mut self) -> Result<Stmt, ParseError> {
        let val = self.expression()?;
        self.consume(";")?;
        Ok(Stmt::Return(val))
    }

    fn expression_statement(&mut self) -> Result<Stmt, ParseError> {
        let expr = self.expression()?;
        if self.match_next_lits(["="]) {
            let val = self.expression()?;
            self.consume(";")?;
            return Ok(Stmt::Assign(expr, val));
        }
        self.consume(";")?;
        Ok(Stmt::Expr(expr))
    }

    pub fn expression(&mut self) -> ExprResult {
        self.logical()
    }

    /// One left-associative precedence level: `next (op next)*`.
    fn binary_level<const N: usize>(
        &mut self,
        ops: [&str; N],
        next: fn(&mut Self) -> ExprResult,
    ) -> ExprResult {
        let mut expr = next(self)?;

        while self.match_next_lits(ops) {
            let tok = self.previous();
            let offset = tok.offset;
            let Some(op) = BinaryOp::from_lexeme(&tok.literal) else {
                return Err(ParseError::ExpectedExpression {
                    found: tok.literal.clone(),
                    offset,
                });
            };
            let right = next(self)?;
            expr = Expr::new(ExprKind::Binary(op, Box::new(expr), Box::new(right)), offset);
        }

        Ok(expr)
    }

    fn logical(&mut self) -> ExprResult {
        self.binary_level(["AND", "OR"], Self::equality)
    }

    fn equality(&mut self) -> ExprResult {
        self.binary_level(["<", "<=", ">", ">=", "==", "!="], Self::additive)
    }

    fn additive(&mut self) -> ExprResult {
        self.binary_level(["+", "-"], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> ExprResult {
        self.binary_level(["*", "/"], Self::secondary)
    }

    fn secondary(&mut self) -> ExprResult {
        let mut expr = self.primary()?;
        while self.match_next_lits(["."]) {
            let offset = self.offset();
            let name = self.consume_identifier()?;
            let kind = if self.match_next_lits(["("]) {
                ExprKind::Call(Call {
                    receiver: Some(Box::new(expr)),
                    name,
                    args: self.arguments()?,
                    function: None,
                })
            } else {
                ExprKind::Access(Access {
                    receiver: Some(Box::new(expr)),
                    name,
                    variable: None,
                })
            };
            expr = Expr::new(kind, offset);
        }
        Ok(expr)
    }

    /// Comma-separated arguments after an already consumed `(`, through the `)`.
    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = vec![];
        if self.match_next_lits([")"]) {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.match_next_lits([")"]) {
                return Ok(args);
            }
            if !self.match_next_lits([","]) {
                return Err(self.expected("',' or ')'"));
            }
            if self.check(")") {
                return Err(ParseError::TrailingComma {
                    offset: self.previous().offset,
                });
            }
        }
    }

    fn primary(&mut self) -> ExprResult {
        let offset = self.offset();
        let Some(tok) = self.advance().cloned() else {
            return Err(ParseError::UnexpectedEof {
                expected: "an expression".into(),
                offset,
            });
        };

        let kind = match tok.kind {
            TokenKind::Identifier => match &*tok.literal {
                "TRUE" => ExprKind::Literal(Literal::Boolean(true)),
                "FALSE" => ExprKind::Literal(Literal::Boolean(false)),
                "NIL" => ExprKind::Literal(Literal::Nil),
                kw if KEYWORDS.contains(&kw) => {
                    return Err(ParseError::ExpectedExpression {
                        found: tok.literal.clone(),
                        offset,
                    })
                }
                _ if self.match_next_lits(["("]) => ExprKind::Call(Call {
                    receiver: None,
                    name: tok.literal.clone(),
                    args: self.arguments()?,
                    function: None,
                }),
                _ => ExprKind::Access(Access {
                    receiver: None,
                    name: tok.literal.clone(),
                    variable: None,
                }),
            },
            TokenKind::Integer => {
                let digits = tok.literal.strip_prefix('+').unwrap_or(&tok.literal);
                let value = BigInt::from_str(digits).map_err(|_| invalid(&tok))?;
                ExprKind::Literal(Literal::Integer(value))
            }
            TokenKind::Decimal => {
                let digits = tok.literal.strip_prefix('+').unwrap_or(&tok.literal);
                let value = BigDecimal::from_str(digits).map_err(|_| invalid(&tok))?;
                ExprKind::Literal(Literal::Decimal(value))
            }
            TokenKind::Character => {
                let decoded = unescape(&tok)?;
                let mut chars = decoded.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => ExprKind::Literal(Literal::Character(c)),
                    _ => return Err(invalid(&tok)),
                }
            }
            TokenKind::String => ExprKind::Literal(Literal::String(unescape(&tok)?.into())),
            TokenKind::Operator if tok.is("(") => {
                let inner = self.expression()?;
                self.consume(")")?;
                ExprKind::Group(Box::new(inner))
            }
            TokenKind::Operator => {
                return Err(ParseError::ExpectedExpression {
                    found: tok.literal.clone(),
                    offset,
                })
            }
        };

        Ok(Expr::new(kind, offset))
    }
}

fn invalid(tok: &Token) -> ParseError {
    ParseError::InvalidLiteral {
        literal: tok.literal.clone(),
        offset: tok.offset,
    }
}

/// Strips the delimiters of a character or string literal and decodes escapes.
fn unescape(tok: &Token) -> Result<String, ParseError> {
    let chars = tok.literal.chars().collect::<Vec<_>>();
    if chars.len() < 2 {
        return Err(invalid(tok));
    }
    let mut res = String::with_capacity(chars.len());
    let mut iter = chars[1..chars.len() - 1].iter();
    while let Some(&c) = iter.next() {
        if c != '\\' {
            res.push(c);
            continue;
        }
        match iter.next().and_then(|&e| escape(e)) {
            Some(decoded) => res.push(decoded),
            None => return Err(invalid(tok)),
        }
    }
    Ok(res)
}

/// Parses a full token sequence into a program.
pub fn parse(tokens: &[Token]) -> Result<Source, ParseError> {
    let source = Parser::new(tokens).parse()?;
    tracing::trace!(
        fields = source.fields.len(),
        methods = source.methods.len(),
        "parsed source"
    );
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan;

    fn expr(code: &str) -> Expr {
        let tokens = scan(code).unwrap();
        let mut parser = Parser::new(&tokens);
        let expr = parser.expression().unwrap();
        assert!(!parser.has_next(), "trailing tokens in {code:?}");
        expr
    }

    fn source(code: &str) -> Result<Source, ParseError> {
        parse(&scan(code).unwrap())
    }

    fn binary(expr: &Expr) -> (BinaryOp, &Expr, &Expr) {
        match &expr.kind {
            ExprKind::Binary(op, l, r) => (*op, l, r),
            other => panic!("not a binary expression: {other:?}"),
        }
    }

    fn name(expr: &Expr) -> &str {
        match &expr.kind {
            ExprKind::Access(access) => &access.name,
            ExprKind::Call(call) => &call.name,
            other => panic!("not a named expression: {other:?}"),
        }
    }

    #[test]
    fn precedence() {
        let e = expr("a OR b == c + d * e");
        let (op, a, rest) = binary(&e);
        assert_eq!(op, BinaryOp::Or);
        assert_eq!(name(a), "a");
        let (op, b, sum) = binary(rest);
        assert_eq!(op, BinaryOp::Equal);
        assert_eq!(name(b), "b");
        let (op, _, product) = binary(sum);
        assert_eq!(op, BinaryOp::Add);
        assert_eq!(binary(product).0, BinaryOp::Mul);
    }

    #[test]
    fn left_associative() {
        let e = expr("a - b - c");
        let (op, left, c) = binary(&e);
        assert_eq!(op, BinaryOp::Sub);
        assert_eq!(name(c), "c");
        assert_eq!(binary(left).0, BinaryOp::Sub);
    }

    #[test]
    fn logical_share_precedence() {
        let e = expr("a AND b OR c");
        let (op, left, _) = binary(&e);
        assert_eq!(op, BinaryOp::Or);
        assert_eq!(binary(left).0, BinaryOp::And);
    }

    #[test]
    fn group() {
        let e = expr("(a + b) * c");
        let (op, group, _) = binary(&e);
        assert_eq!(op, BinaryOp::Mul);
        assert!(matches!(group.kind, ExprKind::Group(_)));
    }

    #[test]
    fn method_chain() {
        let e = expr("obj.inner.get(1, x)");
        let ExprKind::Call(call) = &e.kind else {
            panic!("expected call");
        };
        assert_eq!(&*call.name, "get");
        assert_eq!(call.args.len(), 2);
        let receiver = call.receiver.as_deref().unwrap();
        let ExprKind::Access(access) = &receiver.kind else {
            panic!("expected access");
        };
        assert_eq!(&*access.name, "inner");
        assert_eq!(name(access.receiver.as_deref().unwrap()), "obj");
    }

    #[test]
    fn literals() {
        assert_eq!(
            expr("123456789012345678901234567890").kind,
            ExprKind::Literal(Literal::Integer(
                BigInt::from_str("123456789012345678901234567890").unwrap()
            ))
        );
        assert_eq!(
            expr("-1.50").kind,
            ExprKind::Literal(Literal::Decimal(BigDecimal::from_str("-1.50").unwrap()))
        );
        assert_eq!(expr(r"'\t'").kind, ExprKind::Literal(Literal::Character('\t')));
        assert_eq!(
            expr(r#""a\"b\\c\n""#).kind,
            ExprKind::Literal(Literal::String("a\"b\\c\n".into()))
        );
        assert_eq!(expr("NIL").kind, ExprKind::Literal(Literal::Nil));
        assert_eq!(expr("TRUE").kind, ExprKind::Literal(Literal::Boolean(true)));
    }

    #[test]
    fn source_structure() {
        let src = source(
            "LET x: Integer = 1;
             LET y = \"s\";
             DEF add(a: Integer, b: Integer): Integer DO RETURN a + b; END
             DEF main(): Integer DO RETURN add(x, 2); END",
        )
        .unwrap();
        assert_eq!(src.fields.len(), 2);
        assert_eq!(src.fields[0].type_name.as_deref(), Some("Integer"));
        assert_eq!(src.fields[1].type_name, None);
        assert_eq!(src.methods.len(), 2);
        let add = &src.methods[0];
        assert_eq!(add.params, vec![Rc::from("a"), Rc::from("b")]);
        assert_eq!(add.param_types, vec![Rc::from("Integer"), Rc::from("Integer")]);
        assert_eq!(add.return_type.as_deref(), Some("Integer"));
    }

    #[test]
    fn statements() {
        let src = source(
            "DEF main(): Integer DO
                LET i: Integer;
                IF i < 1 DO print(i); ELSE i = 2; END
                FOR n IN range(0, 3) DO print(n); END
                WHILE FALSE DO END
                obj.field = 3;
                RETURN 0;
            END",
        )
        .unwrap();
        let body = &src.methods[0].body;
        assert!(matches!(body[0], Stmt::Declare(_)));
        let Stmt::If(_, then, other) = &body[1] else {
            panic!("expected if");
        };
        assert_eq!((then.len(), other.len()), (1, 1));
        assert!(matches!(body[2], Stmt::For(_)));
        assert!(matches!(&body[3], Stmt::While(_, b) if b.is_empty()));
        assert!(matches!(body[4], Stmt::Assign(..)));
        assert!(matches!(body[5], Stmt::Return(_)));
    }

    #[test]
    fn trailing_comma() {
        let tokens = scan("f(1, )").unwrap();
        assert_eq!(
            Parser::new(&tokens).expression(),
            Err(ParseError::TrailingComma { offset: 3 })
        );
    }

    #[test]
    fn missing_comma() {
        let tokens = scan("f(1 2)").unwrap();
        assert!(matches!(
            Parser::new(&tokens).expression(),
            Err(ParseError::ExpectedToken { offset: 4, .. })
        ));
    }

    #[test]
    fn unclosed_group() {
        let tokens = scan("(1 + 2").unwrap();
        assert_eq!(
            Parser::new(&tokens).expression(),
            Err(ParseError::UnexpectedEof {
                expected: "')'".into(),
                offset: 6
            })
        );
    }

    #[test]
    fn missing_semicolon() {
        let err = source("DEF main(): Integer DO RETURN 1 END").unwrap_err();
        assert_eq!(
            err,
            ParseError::ExpectedToken {
                expected: "';'".into(),
                found: "END".into(),
                offset: 32
            }
        );
    }

    #[test]
    fn missing_end() {
        let err = source("DEF main(): Integer DO RETURN 1;").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof { offset: 32, .. }));
    }

    #[test]
    fn field_after_method() {
        let err = source("DEF main() DO END LET x = 1;").unwrap_err();
        assert_eq!(err.offset(), 18);
    }

    #[test]
    fn keyword_is_not_an_expression() {
        let tokens = scan("DO").unwrap();
        assert!(matches!(
            Parser::new(&tokens).expression(),
            Err(ParseError::ExpectedExpression { offset: 0, .. })
        ));
    }

    #[test]
    fn bad_parameter_list() {
        assert!(source("DEF f(a Integer) DO END").is_err());
        assert!(source("DEF f(a: Integer,) DO END").is_err());
    }
}
