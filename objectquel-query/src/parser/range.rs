use super::{TokenParser, error_at};
use crate::ast::{EntityRef, Range, RangeDatabase, RangeJsonSource};
use crate::error::Result;
use crate::lexer::TokenType;

impl TokenParser {
    /// `RANGE OF <alias> IS <Entity>[\<Sub>...] [VIA <expr>]`
    /// or `RANGE OF <alias> IS JSON_SOURCE("<path>"[, "<filter>"]) [VIA <expr>]`.
    pub(super) fn parse_range(&mut self, existing: &[Range]) -> Result<Range> {
        self.consume(&TokenType::Of, "Expected OF after RANGE")?;

        let alias_token = self.peek().clone();
        let alias = self.expect_identifier("range alias")?;
        if existing.iter().any(|r| r.alias() == alias) {
            return Err(error_at(
                &alias_token,
                &format!("Duplicate range alias '{alias}'"),
            ));
        }

        self.consume(&TokenType::Is, "Expected IS after range alias")?;

        if self.match_token(&TokenType::JsonSource) {
            self.consume(&TokenType::LeftParen, "Expected '(' after JSON_SOURCE")?;
            let path = self.expect_string("JSON_SOURCE path")?;
            let filter = if self.match_token(&TokenType::Comma) {
                Some(self.expect_string("JSON_SOURCE filter")?)
            } else {
                None
            };
            self.consume(&TokenType::RightParen, "Expected ')' after JSON_SOURCE arguments")?;
            let via = self.parse_via()?;
            return Ok(Range::JsonSource(RangeJsonSource {
                alias,
                path,
                filter,
                via,
            }));
        }

        let entity = self.parse_entity_name()?;
        let via = self.parse_via()?;
        Ok(Range::Database(RangeDatabase { alias, entity, via }))
    }

    fn parse_entity_name(&mut self) -> Result<EntityRef> {
        // A leading backslash marks a fully qualified name.
        self.match_token(&TokenType::Backslash);
        let mut parts = vec![self.expect_identifier("entity name")?];
        while self.match_token(&TokenType::Backslash) {
            parts.push(self.expect_identifier("entity name")?);
        }
        Ok(EntityRef {
            name: parts.join("\\"),
        })
    }

    fn parse_via(&mut self) -> Result<Option<crate::ast::Expr>> {
        if self.match_token(&TokenType::Via) {
            Ok(Some(self.parse_expression()?))
        } else {
            Ok(None)
        }
    }

    fn expect_string(&mut self, ctx: &str) -> Result<String> {
        match &self.peek().token_type {
            TokenType::String(value) => {
                let value = value.clone();
                self.advance();
                Ok(value)
            }
            _ => Err(self.error(&format!("Expected string literal for {ctx}"))),
        }
    }
}
