use super::{TokenParser, error_at, render_tokens};
use crate::ast::{Alias, Expr, Retrieve, SortItem, Window};
use crate::error::Result;
use crate::lexer::TokenType;

impl TokenParser {
    pub(super) fn parse_retrieve(&mut self) -> Result<Retrieve> {
        let unique = self.match_token(&TokenType::Unique);

        self.consume(&TokenType::LeftParen, "Expected '(' after RETRIEVE")?;
        let mut values: Vec<Alias> = Vec::new();
        loop {
            let start = self.peek().clone();
            let alias = self.parse_projection()?;
            if values.iter().any(|v| v.name == alias.name) {
                return Err(error_at(
                    &start,
                    &format!("Duplicate projection name '{}'", alias.name),
                ));
            }
            values.push(alias);
            if !self.match_token(&TokenType::Comma) {
                break;
            }
        }
        self.consume(&TokenType::RightParen, "Expected ')' after projection list")?;

        let conditions = if self.match_token(&TokenType::Where) {
            Some(self.parse_expression()?)
        } else {
            None
        };

        let mut sort = Vec::new();
        if self.match_token(&TokenType::Sort) {
            self.consume(&TokenType::By, "Expected BY after SORT")?;
            loop {
                let expression = self.parse_expression()?;
                let descending = if self.match_token(&TokenType::Desc) {
                    true
                } else {
                    self.match_token(&TokenType::Asc);
                    false
                };
                sort.push(SortItem {
                    expression,
                    descending,
                });
                if !self.match_token(&TokenType::Comma) {
                    break;
                }
            }
        }

        let window = if self.match_token(&TokenType::Window) {
            let page = self.parse_unsigned("WINDOW")?;
            self.consume(&TokenType::Using, "Expected USING after WINDOW page")?;
            self.consume(&TokenType::WindowSize, "Expected WINDOWSIZE after USING")?;
            let size = self.parse_unsigned("WINDOWSIZE")?;
            Some(Window { page, size })
        } else {
            None
        };

        Ok(Retrieve {
            ranges: Vec::new(),
            unique,
            values,
            conditions,
            sort,
            window,
        })
    }

    /// `[name =] expr`. Unnamed projections are named after their source text.
    fn parse_projection(&mut self) -> Result<Alias> {
        if let TokenType::Identifier(name) = &self.peek().token_type
            && self.check_next(&TokenType::Equals)
        {
            let name = name.clone();
            self.advance();
            self.advance();
            let expression = self.parse_expression()?;
            return Ok(Alias {
                name,
                expression,
                explicit: true,
            });
        }

        let mark = self.mark();
        let expression = self.parse_expression()?;
        let name = match &expression {
            Expr::Identifier(ident) => ident.complete_name(),
            _ => render_tokens(self.tokens_since(mark)),
        };
        Ok(Alias {
            name,
            expression,
            explicit: false,
        })
    }

    fn parse_unsigned(&mut self, ctx: &str) -> Result<u64> {
        let parsed = match &self.peek().token_type {
            TokenType::Number(text) => text.parse::<u64>().ok(),
            _ => None,
        };
        match parsed {
            Some(n) => {
                self.advance();
                Ok(n)
            }
            None => Err(self.error(&format!("Expected non-negative integer after {ctx}"))),
        }
    }
}
