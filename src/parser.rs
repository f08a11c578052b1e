use std::collections::HashMap;

use crate::ast::{Expression, Function, Item, Prototype, ANON_FN_NAME};
use crate::input::LineSource;
use crate::lexer::{Lexer, Token};

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum ParserError {
    #[error("unexpected {found}, expected {expected}")]
    Unexpected {
        found: Token,
        expected: &'static str,
    },
}

fn unexpected<T>(found: &Token, expected: &'static str) -> Result<T, ParserError> {
    Err(ParserError::Unexpected {
        found: found.clone(),
        expected,
    })
}

/// Recursive-descent parser with one token of lookahead and a
/// precedence-climbing expression sub-parser.
pub struct Parser<S> {
    lexer: Lexer<S>,
    current: Token,
    precedence: HashMap<char, i32>,
}

impl<S: LineSource> Parser<S> {
    pub fn new(source: S) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();

        let mut precedence = HashMap::new();
        precedence.insert('<', 10);
        precedence.insert('+', 20);
        precedence.insert('-', 20);
        precedence.insert('*', 40);

        Parser {
            lexer,
            current,
            precedence,
        }
    }

    /// The one-token lookahead.
    pub fn current(&self) -> &Token {
        &self.current
    }

    fn advance(&mut self) {
        self.current = self.lexer.next_token();
    }

    /// Discard the lookahead token. This is the whole error-recovery
    /// policy: drop one token and resume at the next statement boundary.
    pub fn skip(&mut self) {
        self.advance();
    }

    /// Binding strength of the lookahead, or -1 if it is not a binary
    /// operator here.
    fn current_precedence(&self) -> i32 {
        match &self.current {
            Token::Op(op) => self.precedence.get(op).copied().unwrap_or(-1),
            _ => -1,
        }
    }

    /// primary := number | identifier [ '(' args ')' ] | '(' expr ')'
    fn parse_primary(&mut self) -> Result<Expression, ParserError> {
        match self.current.clone() {
            Token::Number(value) => {
                self.advance();
                Ok(Expression::Number(value))
            }
            Token::Ident(name) => self.parse_identifier(name),
            Token::OpenParen => self.parse_paren(),
            other => unexpected(&other, "an expression"),
        }
    }

    fn parse_identifier(&mut self, name: String) -> Result<Expression, ParserError> {
        self.advance();
        if self.current != Token::OpenParen {
            return Ok(Expression::Variable(name));
        }

        self.advance();
        let mut args = Vec::new();
        if self.current != Token::CloseParen {
            loop {
                args.push(self.parse_expression()?);
                match &self.current {
                    Token::CloseParen => break,
                    Token::Comma => self.advance(),
                    other => return unexpected(other, "',' or ')' in argument list"),
                }
            }
        }
        self.advance();

        Ok(Expression::Call(name, args))
    }

    fn parse_paren(&mut self) -> Result<Expression, ParserError> {
        self.advance();
        let inner = self.parse_expression()?;
        if self.current != Token::CloseParen {
            return unexpected(&self.current, "')'");
        }
        self.advance();
        Ok(inner)
    }

    /// expr := primary binop_rhs
    pub fn parse_expression(&mut self) -> Result<Expression, ParserError> {
        let lhs = self.parse_primary()?;
        self.parse_binop_rhs(0, lhs)
    }

    fn parse_binop_rhs(
        &mut self,
        min_precedence: i32,
        mut lhs: Expression,
    ) -> Result<Expression, ParserError> {
        loop {
            let precedence = self.current_precedence();
            if precedence < min_precedence {
                return Ok(lhs);
            }

            let op = match &self.current {
                Token::Op(op) => *op,
                _ => return Ok(lhs),
            };
            self.advance();

            let mut rhs = self.parse_primary()?;

            // a strictly tighter-binding operator ahead claims the rhs
            // first; recursing one level above this operator's precedence
            // keeps equal-precedence chains left-associative
            if precedence < self.current_precedence() {
                rhs = self.parse_binop_rhs(precedence + 1, rhs)?;
            }

            lhs = Expression::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    /// prototype := identifier '(' (identifier (',' identifier)*)? ')'
    fn parse_prototype(&mut self) -> Result<Prototype, ParserError> {
        let name = match &self.current {
            Token::Ident(name) => name.clone(),
            other => return unexpected(other, "a function name"),
        };
        self.advance();

        if self.current != Token::OpenParen {
            return unexpected(&self.current, "'(' after function name");
        }
        self.advance();

        let mut params = Vec::new();
        if self.current != Token::CloseParen {
            loop {
                match self.current.clone() {
                    Token::Ident(param) => {
                        params.push(param);
                        self.advance();
                    }
                    other => return unexpected(&other, "a parameter name"),
                }
                match &self.current {
                    Token::CloseParen => break,
                    Token::Comma => self.advance(),
                    other => return unexpected(other, "',' or ')' in parameter list"),
                }
            }
        }
        self.advance();

        Ok(Prototype { name, params })
    }

    /// definition := 'def' prototype expr
    pub fn parse_definition(&mut self) -> Result<Function, ParserError> {
        self.advance();
        let prototype = self.parse_prototype()?;
        let body = self.parse_expression()?;
        Ok(Function { prototype, body })
    }

    /// extern_decl := 'extern' prototype
    pub fn parse_extern(&mut self) -> Result<Prototype, ParserError> {
        self.advance();
        self.parse_prototype()
    }

    /// toplevel := expr, wrapped into an anonymous zero-parameter function
    pub fn parse_top_level(&mut self) -> Result<Function, ParserError> {
        let body = self.parse_expression()?;
        let prototype = Prototype {
            name: ANON_FN_NAME.to_string(),
            params: Vec::new(),
        };
        Ok(Function { prototype, body })
    }

    /// Dispatch on the lookahead and parse one whole statement.
    pub fn parse_item(&mut self) -> Result<Item, ParserError> {
        match self.current {
            Token::Def => Ok(Item::Definition(self.parse_definition()?)),
            Token::Extern => Ok(Item::Extern(self.parse_extern()?)),
            _ => Ok(Item::TopLevel(self.parse_top_level()?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::input::ReaderSource;

    fn parser_for(source: &'static str) -> Parser<ReaderSource<Cursor<&'static str>>> {
        Parser::new(ReaderSource::new(Cursor::new(source)))
    }

    fn binary(op: char, lhs: Expression, rhs: Expression) -> Expression {
        Expression::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    #[test]
    fn precedence_groups_multiplication_first() {
        let expr = parser_for("x + 1 * (2 - 3)").parse_expression().unwrap();
        let target = binary(
            '+',
            Expression::Variable("x".to_string()),
            binary(
                '*',
                Expression::Number(1.0),
                binary('-', Expression::Number(2.0), Expression::Number(3.0)),
            ),
        );
        assert_eq!(expr, target);
    }

    #[test]
    fn equal_precedence_is_left_associative() {
        let expr = parser_for("10 - 3 - 2").parse_expression().unwrap();
        let target = binary(
            '-',
            binary('-', Expression::Number(10.0), Expression::Number(3.0)),
            Expression::Number(2.0),
        );
        assert_eq!(expr, target);
    }

    #[test]
    fn left_associativity_survives_a_tighter_run() {
        let expr = parser_for("1 - 2 * 3 - 4").parse_expression().unwrap();
        let target = binary(
            '-',
            binary(
                '-',
                Expression::Number(1.0),
                binary('*', Expression::Number(2.0), Expression::Number(3.0)),
            ),
            Expression::Number(4.0),
        );
        assert_eq!(expr, target);
    }

    #[test]
    fn call_arguments_are_comma_separated() {
        let expr = parser_for("atan2(y, x)").parse_expression().unwrap();
        let target = Expression::Call(
            "atan2".to_string(),
            vec![
                Expression::Variable("y".to_string()),
                Expression::Variable("x".to_string()),
            ],
        );
        assert_eq!(expr, target);

        let err = parser_for("f(1 2)").parse_expression().unwrap_err();
        assert_eq!(
            err,
            ParserError::Unexpected {
                found: Token::Number(2.0),
                expected: "',' or ')' in argument list",
            }
        );
    }

    #[test]
    fn definitions_and_externs_parse() {
        let item = parser_for("def add(x, y) x + y").parse_item().unwrap();
        let target = Item::Definition(Function {
            prototype: Prototype {
                name: "add".to_string(),
                params: vec!["x".to_string(), "y".to_string()],
            },
            body: binary(
                '+',
                Expression::Variable("x".to_string()),
                Expression::Variable("y".to_string()),
            ),
        });
        assert_eq!(item, target);

        let item = parser_for("extern sin(x)").parse_item().unwrap();
        let target = Item::Extern(Prototype {
            name: "sin".to_string(),
            params: vec!["x".to_string()],
        });
        assert_eq!(item, target);
    }

    #[test]
    fn top_level_expression_wraps_an_anonymous_function() {
        let item = parser_for("4 < 5").parse_item().unwrap();
        let target = Item::TopLevel(Function {
            prototype: Prototype {
                name: ANON_FN_NAME.to_string(),
                params: Vec::new(),
            },
            body: binary('<', Expression::Number(4.0), Expression::Number(5.0)),
        });
        assert_eq!(item, target);
    }

    #[test]
    fn unmatched_parenthesis_is_reported() {
        let err = parser_for("(1 + 2").parse_expression().unwrap_err();
        assert_eq!(
            err,
            ParserError::Unexpected {
                found: Token::Delimiter,
                expected: "')'",
            }
        );
    }
}
