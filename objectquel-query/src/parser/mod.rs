//! Recursive-descent parser for ObjectQuel.
//!
//! One rule per production, split by area:
//!
//! - [`range`]: `RANGE OF alias IS ...`
//! - [`retrieve`]: `RETRIEVE [UNIQUE] (...) [WHERE] [SORT BY] [WINDOW]`
//! - [`expression`]: the precedence chain from `OR` down to primaries
//! - [`functions`]: built-in function calls with arity checks

mod expression;
mod functions;
mod range;
mod retrieve;

use crate::ast::{Range, Retrieve};
use crate::error::{Error, Result};
use crate::lexer::{Lexer, Token, TokenType};

pub struct Parser;

impl Parser {
    /// Parses a full statement list: any number of ranges followed by a
    /// single `RETRIEVE`, separated by `;`.
    pub fn parse(input: &str) -> Result<Retrieve> {
        let tokens = Lexer::new(input).tokenize()?;
        let mut parser = TokenParser::new(tokens);
        parser.parse_statements()
    }
}

pub(crate) struct TokenParser {
    tokens: Vec<Token>,
    position: usize,
}

impl TokenParser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    fn parse_statements(&mut self) -> Result<Retrieve> {
        let mut ranges: Vec<Range> = Vec::new();
        let mut retrieve = None;

        loop {
            if self.match_token(&TokenType::Semicolon) {
                continue;
            }
            if self.is_at_end() {
                break;
            }
            if retrieve.is_some() {
                return Err(self.error("Unexpected input after RETRIEVE"));
            }
            if self.match_token(&TokenType::Range) {
                let range = self.parse_range(&ranges)?;
                ranges.push(range);
            } else if self.match_token(&TokenType::Retrieve) {
                retrieve = Some(self.parse_retrieve()?);
            } else {
                return Err(self.error("Expected RANGE or RETRIEVE"));
            }
        }

        let Some(mut retrieve) = retrieve else {
            return Err(self.error("Missing RETRIEVE statement"));
        };
        retrieve.ranges = ranges;
        Ok(retrieve)
    }

    fn match_token(&mut self, token_type: &TokenType) -> bool {
        if self.check(token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Compares token kinds only; payloads are ignored.
    fn check(&self, token_type: &TokenType) -> bool {
        std::mem::discriminant(token_type) == std::mem::discriminant(&self.peek().token_type)
    }

    fn check_next(&self, token_type: &TokenType) -> bool {
        std::mem::discriminant(token_type) == std::mem::discriminant(&self.peek_next().token_type)
    }

    fn consume(&mut self, token_type: &TokenType, message: &str) -> Result<()> {
        if self.check(token_type) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn expect_identifier(&mut self, ctx: &str) -> Result<String> {
        match &self.peek().token_type {
            TokenType::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(&format!("Expected identifier for {ctx}"))),
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().token_type, TokenType::Eof)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.position]
    }

    fn peek_next(&self) -> &Token {
        let index = (self.position + 1).min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.position += 1;
        }
        &self.tokens[self.position - 1]
    }

    fn mark(&self) -> usize {
        self.position
    }

    fn tokens_since(&self, mark: usize) -> &[Token] {
        &self.tokens[mark..self.position]
    }

    /// Error pointing at the current token.
    fn error(&self, message: &str) -> Error {
        error_at(self.peek(), message)
    }
}

pub(crate) fn error_at(token: &Token, message: &str) -> Error {
    Error::Parser {
        message: message.to_string(),
        token: token.token_type.to_string(),
        line: token.line,
        column: token.column,
    }
}

/// Renders a token slice back to compact source text (used to name
/// unnamed projections such as `count(p)`).
pub(crate) fn render_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut previous: Option<&TokenType> = None;
    for token in tokens {
        let current = &token.token_type;
        let tight = matches!(
            current,
            TokenType::Dot | TokenType::RightParen | TokenType::Comma | TokenType::LeftParen
        ) || matches!(previous, Some(TokenType::Dot) | Some(TokenType::LeftParen) | None);
        if !tight {
            out.push(' ');
        }
        out.push_str(&current.to_string());
        previous = Some(current);
    }
    out
}
