use super::{TokenParser, error_at};
use crate::ast::{CompareOp, Expr, FactorOp, Identifier, LogicalOp, TermOp, UnaryOp};
use crate::error::Result;
use crate::lexer::TokenType;

impl TokenParser {
    pub(super) fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.match_token(&TokenType::Or) {
            let right = self.parse_and()?;
            left = Expr::logical(left, LogicalOp::Or, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.match_token(&TokenType::And) {
            let right = self.parse_not()?;
            left = Expr::logical(left, LogicalOp::And, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.match_token(&TokenType::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_term()?;

        if self.match_token(&TokenType::Is) {
            let negated = self.match_token(&TokenType::Not);
            self.consume(&TokenType::Null, "Expected NULL after IS")?;
            return Ok(if negated {
                Expr::CheckNotNull(Box::new(left))
            } else {
                Expr::CheckNull(Box::new(left))
            });
        }

        if self.match_token(&TokenType::In) {
            return self.parse_in_list(left);
        }

        if self.check(&TokenType::Not) && self.check_next(&TokenType::In) {
            self.advance();
            self.advance();
            let inner = self.parse_in_list(left)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(inner),
            });
        }

        let op = match self.peek().token_type {
            TokenType::Equals => CompareOp::Eq,
            TokenType::NotEquals => CompareOp::NotEq,
            TokenType::LessThan => CompareOp::Lt,
            TokenType::LessEqual => CompareOp::LtEq,
            TokenType::GreaterThan => CompareOp::Gt,
            TokenType::GreaterEqual => CompareOp::GtEq,
            _ => return Ok(left),
        };
        self.advance();

        let operand = self.peek().clone();
        match &operand.token_type {
            TokenType::Regex { pattern, flags } => {
                if !matches!(op, CompareOp::Eq | CompareOp::NotEq) {
                    return Err(error_at(
                        &operand,
                        "Regular expressions can only be compared with = or <>",
                    ));
                }
                self.advance();
                Ok(Expr::compare(
                    left,
                    op,
                    Expr::RegExp {
                        pattern: pattern.clone(),
                        flags: flags.clone(),
                    },
                ))
            }
            TokenType::Null if op == CompareOp::Eq => {
                self.advance();
                Ok(Expr::CheckNull(Box::new(left)))
            }
            TokenType::Null if op == CompareOp::NotEq => {
                self.advance();
                Ok(Expr::CheckNotNull(Box::new(left)))
            }
            _ => {
                let right = self.parse_term()?;
                Ok(Expr::compare(left, op, right))
            }
        }
    }

    fn parse_in_list(&mut self, operand: Expr) -> Result<Expr> {
        self.consume(&TokenType::LeftParen, "Expected '(' after IN")?;
        let mut list = vec![self.parse_term()?];
        while self.match_token(&TokenType::Comma) {
            list.push(self.parse_term()?);
        }
        self.consume(&TokenType::RightParen, "Expected ')' after IN list")?;
        Ok(Expr::In {
            operand: Box::new(operand),
            list,
        })
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek().token_type {
                TokenType::Plus => TermOp::Add,
                TokenType::Minus => TermOp::Subtract,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_factor()?;
            left = Expr::Term {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
    }

    fn parse_factor(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().token_type {
                TokenType::Star => FactorOp::Multiply,
                TokenType::Slash => FactorOp::Divide,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Factor {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.match_token(&TokenType::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Negate,
                operand: Box::new(operand),
            });
        }
        if self.match_token(&TokenType::Plus) {
            return self.parse_unary();
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.peek().clone();
        match token.token_type {
            TokenType::Number(text) => {
                self.advance();
                Ok(Expr::Number(text))
            }
            TokenType::String(value) => {
                self.advance();
                Ok(Expr::String(value))
            }
            TokenType::Boolean(b) => {
                self.advance();
                Ok(Expr::Bool(b))
            }
            TokenType::Null => {
                self.advance();
                Ok(Expr::Null)
            }
            TokenType::Parameter(name) => {
                self.advance();
                Ok(Expr::Parameter(name))
            }
            TokenType::LeftParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.consume(&TokenType::RightParen, "Expected ')'")?;
                Ok(inner)
            }
            TokenType::Identifier(_) if self.check_next(&TokenType::LeftParen) => {
                self.parse_function_call()
            }
            TokenType::Identifier(_) => self.parse_identifier_chain(),
            TokenType::Regex { .. } => Err(error_at(
                &token,
                "Regular expressions are only allowed as the right operand of = or <>",
            )),
            _ => Err(error_at(&token, "Unexpected token in expression")),
        }
    }

    /// `a.b.c`, or `a.b.method(args)` when the chain is followed by `(`.
    fn parse_identifier_chain(&mut self) -> Result<Expr> {
        let mut parts = vec![self.expect_identifier("identifier")?];
        while self.match_token(&TokenType::Dot) {
            parts.push(self.expect_identifier("property name")?);
        }

        if parts.len() >= 2 && self.match_token(&TokenType::LeftParen) {
            let method = parts.pop().unwrap_or_default();
            let mut args = Vec::new();
            if !self.check(&TokenType::RightParen) {
                loop {
                    args.push(self.parse_expression()?);
                    if !self.match_token(&TokenType::Comma) {
                        break;
                    }
                }
            }
            self.consume(&TokenType::RightParen, "Expected ')' after method arguments")?;
            return Ok(Expr::MethodCall {
                target: Identifier::from_parts(&parts),
                method,
                args,
            });
        }

        Ok(Expr::Identifier(Identifier::from_parts(&parts)))
    }
}
