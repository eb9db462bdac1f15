use super::{TokenParser, error_at};
use crate::ast::Expr;
use crate::error::Result;
use crate::lexer::TokenType;

/// Accepted argument counts per built-in: (min, max).
fn arity(name: &str) -> Option<(usize, Option<usize>)> {
    match name {
        "count" | "ucount" | "is_empty" | "is_numeric" | "is_integer" | "is_float" | "exists" => {
            Some((1, Some(1)))
        }
        "concat" => Some((1, None)),
        "search" => Some((2, None)),
        _ => None,
    }
}

impl TokenParser {
    pub(super) fn parse_function_call(&mut self) -> Result<Expr> {
        let name_token = self.peek().clone();
        let name = self.expect_identifier("function name")?.to_lowercase();
        let Some((min, max)) = arity(&name) else {
            return Err(error_at(&name_token, &format!("Unknown function '{name}'")));
        };

        self.consume(&TokenType::LeftParen, "Expected '(' after function name")?;
        let mut args = Vec::new();
        if !self.check(&TokenType::RightParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_token(&TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenType::RightParen, "Expected ')' after function arguments")?;

        if args.len() < min || max.is_some_and(|max| args.len() > max) {
            let expected = match max {
                Some(max) if max == min => format!("{min}"),
                _ => format!("at least {min}"),
            };
            return Err(error_at(
                &name_token,
                &format!(
                    "Function '{name}' expects {expected} argument(s), got {}",
                    args.len()
                ),
            ));
        }

        if name == "concat" {
            return Ok(Expr::Concat(args));
        }
        if name == "search" {
            let query = args.pop().unwrap_or(Expr::Null);
            return Ok(Expr::Search {
                columns: args,
                query: Box::new(query),
            });
        }

        let arg = Box::new(args.pop().unwrap_or(Expr::Null));
        Ok(match name.as_str() {
            "count" => Expr::Count(arg),
            "ucount" => Expr::UCount(arg),
            "is_empty" => Expr::IsEmpty(arg),
            "is_numeric" => Expr::IsNumeric(arg),
            "is_integer" => Expr::IsInteger(arg),
            "is_float" => Expr::IsFloat(arg),
            _ => Expr::Exists(arg),
        })
    }
}
