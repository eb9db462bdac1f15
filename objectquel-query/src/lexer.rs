use crate::error::{Error, Result};
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    // Keywords
    Range,
    Of,
    Is,
    Via,
    Retrieve,
    Unique,
    Where,
    Sort,
    By,
    Asc,
    Desc,
    Window,
    Using,
    WindowSize,
    And,
    Or,
    Not,
    In,
    JsonSource,

    // Symbols
    LeftParen,
    RightParen,
    Comma,
    Dot,
    Semicolon,
    Backslash,

    // Operators
    Equals,
    NotEquals,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    Plus,
    Minus,
    Star,
    Slash,

    // Literals
    String(String),
    /// Raw source text of the number.
    Number(String),
    Boolean(bool),
    Null,
    Regex { pattern: String, flags: String },

    Identifier(String),
    Parameter(String), // :name

    Eof,
}

impl TokenType {
    /// Whether a `/` following this token starts a regular expression
    /// rather than a division.
    fn expects_operand(&self) -> bool {
        !matches!(
            self,
            TokenType::Identifier(_)
                | TokenType::Number(_)
                | TokenType::String(_)
                | TokenType::Boolean(_)
                | TokenType::Null
                | TokenType::Parameter(_)
                | TokenType::Regex { .. }
                | TokenType::RightParen
        )
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenType::Range => "RANGE",
            TokenType::Of => "OF",
            TokenType::Is => "IS",
            TokenType::Via => "VIA",
            TokenType::Retrieve => "RETRIEVE",
            TokenType::Unique => "UNIQUE",
            TokenType::Where => "WHERE",
            TokenType::Sort => "SORT",
            TokenType::By => "BY",
            TokenType::Asc => "ASC",
            TokenType::Desc => "DESC",
            TokenType::Window => "WINDOW",
            TokenType::Using => "USING",
            TokenType::WindowSize => "WINDOWSIZE",
            TokenType::And => "AND",
            TokenType::Or => "OR",
            TokenType::Not => "NOT",
            TokenType::In => "IN",
            TokenType::JsonSource => "JSON_SOURCE",
            TokenType::LeftParen => "(",
            TokenType::RightParen => ")",
            TokenType::Comma => ",",
            TokenType::Dot => ".",
            TokenType::Semicolon => ";",
            TokenType::Backslash => "\\",
            TokenType::Equals => "=",
            TokenType::NotEquals => "<>",
            TokenType::LessThan => "<",
            TokenType::LessEqual => "<=",
            TokenType::GreaterThan => ">",
            TokenType::GreaterEqual => ">=",
            TokenType::Plus => "+",
            TokenType::Minus => "-",
            TokenType::Star => "*",
            TokenType::Slash => "/",
            TokenType::String(s) => return write!(f, "\"{s}\""),
            TokenType::Number(n) => n,
            TokenType::Boolean(true) => "true",
            TokenType::Boolean(false) => "false",
            TokenType::Null => "NULL",
            TokenType::Regex { pattern, flags } => return write!(f, "/{pattern}/{flags}"),
            TokenType::Identifier(name) => name,
            TokenType::Parameter(name) => return write!(f, ":{name}"),
            TokenType::Eof => "end of input",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub line: usize,
    pub column: usize,
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
    last: Option<TokenType>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
            last: None,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            self.last = Some(token.token_type.clone());
            tokens.push(token);
        }
        tokens.push(Token {
            token_type: TokenType::Eof,
            line: self.line,
            column: self.column,
        });
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        self.skip_whitespace();

        let start_line = self.line;
        let start_column = self.column;
        let Some(char) = self.advance() else {
            return Ok(None);
        };

        // Comments
        if char == '/' {
            if let Some(&'/') = self.chars.peek() {
                self.skip_line_comment();
                return self.next_token();
            } else if let Some(&'*') = self.chars.peek() {
                self.skip_block_comment(start_line, start_column)?;
                return self.next_token();
            }
            if self.last.as_ref().is_none_or(TokenType::expects_operand) {
                return self.read_regex(start_line, start_column).map(Some);
            }
        }

        if char == '\'' || char == '"' {
            return self
                .read_string(char, start_line, start_column)
                .map(Some);
        }

        if char.is_ascii_digit() {
            return Ok(Some(self.read_number(char, start_line, start_column)));
        }

        if char == ':' {
            return self.read_parameter(start_line, start_column).map(Some);
        }

        if char.is_alphabetic() || char == '_' {
            return Ok(Some(self.read_identifier(char, start_line, start_column)));
        }

        let token_type = match char {
            '(' => TokenType::LeftParen,
            ')' => TokenType::RightParen,
            ',' => TokenType::Comma,
            '.' => TokenType::Dot,
            ';' => TokenType::Semicolon,
            '\\' => TokenType::Backslash,
            '=' => TokenType::Equals,
            '+' => TokenType::Plus,
            '-' => TokenType::Minus,
            '*' => TokenType::Star,
            '/' => TokenType::Slash,
            '<' => {
                if self.next_if('=') {
                    TokenType::LessEqual
                } else if self.next_if('>') {
                    TokenType::NotEquals
                } else {
                    TokenType::LessThan
                }
            }
            '>' => {
                if self.next_if('=') {
                    TokenType::GreaterEqual
                } else {
                    TokenType::GreaterThan
                }
            }
            '!' if self.next_if('=') => TokenType::NotEquals,
            _ => {
                return Err(error(
                    format!("Unexpected character: {char}"),
                    start_line,
                    start_column,
                ));
            }
        };

        Ok(Some(Token {
            token_type,
            line: start_line,
            column: start_column,
        }))
    }

    fn advance(&mut self) -> Option<char> {
        let char = self.chars.next();
        if let Some(c) = char {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        char
    }

    fn next_if(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(&char) = self.chars.peek() {
            if char.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(&char) = self.chars.peek() {
            if char == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn skip_block_comment(&mut self, line: usize, column: usize) -> Result<()> {
        self.advance(); // consume '*'
        while let Some(char) = self.advance() {
            if char == '*' && self.next_if('/') {
                return Ok(());
            }
        }
        Err(error("Unterminated block comment", line, column))
    }

    fn read_string(&mut self, quote: char, line: usize, column: usize) -> Result<Token> {
        let mut value = String::new();
        loop {
            match self.advance() {
                None => return Err(error("Unterminated string literal", line, column)),
                Some(c) if c == quote => break,
                Some('\\') => {
                    let escaped = match self.advance() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some('\'') => '\'',
                        Some(other) => {
                            return Err(error(
                                format!("Unknown escape sequence: \\{other}"),
                                self.line,
                                self.column - 2,
                            ));
                        }
                        None => return Err(error("Unterminated string literal", line, column)),
                    };
                    value.push(escaped);
                }
                Some(c) => value.push(c),
            }
        }
        Ok(Token {
            token_type: TokenType::String(value),
            line,
            column,
        })
    }

    fn read_number(&mut self, first: char, line: usize, column: usize) -> Token {
        let mut value = String::new();
        value.push(first);
        let mut has_dot = false;
        while let Some(&char) = self.chars.peek() {
            if char.is_ascii_digit() {
                value.push(char);
                self.advance();
            } else if char == '.' && !has_dot {
                // `1.x` is not a decimal; only consume the dot when a digit follows.
                let mut ahead = self.chars.clone();
                ahead.next();
                if !ahead.peek().is_some_and(char::is_ascii_digit) {
                    break;
                }
                has_dot = true;
                value.push(char);
                self.advance();
            } else {
                break;
            }
        }
        Token {
            token_type: TokenType::Number(value),
            line,
            column,
        }
    }

    fn read_regex(&mut self, line: usize, column: usize) -> Result<Token> {
        let mut pattern = String::new();
        loop {
            match self.advance() {
                None | Some('\n') => {
                    return Err(error("Unterminated regular expression", line, column));
                }
                Some('/') => break,
                Some('\\') => match self.advance() {
                    Some('/') => pattern.push('/'),
                    Some(other) => {
                        pattern.push('\\');
                        pattern.push(other);
                    }
                    None => return Err(error("Unterminated regular expression", line, column)),
                },
                Some(c) => pattern.push(c),
            }
        }
        let mut flags = String::new();
        while let Some(&char) = self.chars.peek() {
            if char.is_ascii_alphabetic() {
                flags.push(char);
                self.advance();
            } else {
                break;
            }
        }
        Ok(Token {
            token_type: TokenType::Regex { pattern, flags },
            line,
            column,
        })
    }

    fn read_parameter(&mut self, line: usize, column: usize) -> Result<Token> {
        let mut value = String::new();
        while let Some(&char) = self.chars.peek() {
            if char.is_alphanumeric() || char == '_' {
                value.push(char);
                self.advance();
            } else {
                break;
            }
        }
        if value.is_empty() {
            return Err(error("Expected parameter name after ':'", line, column));
        }
        Ok(Token {
            token_type: TokenType::Parameter(value),
            line,
            column,
        })
    }

    fn read_identifier(&mut self, first: char, line: usize, column: usize) -> Token {
        let mut value = String::new();
        value.push(first);
        while let Some(&char) = self.chars.peek() {
            if char.is_alphanumeric() || char == '_' {
                value.push(char);
                self.advance();
            } else {
                break;
            }
        }

        let token_type = match value.to_uppercase().as_str() {
            "RANGE" => TokenType::Range,
            "OF" => TokenType::Of,
            "IS" => TokenType::Is,
            "VIA" => TokenType::Via,
            "RETRIEVE" => TokenType::Retrieve,
            "UNIQUE" => TokenType::Unique,
            "WHERE" => TokenType::Where,
            "SORT" => TokenType::Sort,
            "BY" => TokenType::By,
            "ASC" => TokenType::Asc,
            "DESC" => TokenType::Desc,
            "WINDOW" => TokenType::Window,
            "USING" => TokenType::Using,
            "WINDOWSIZE" => TokenType::WindowSize,
            "AND" => TokenType::And,
            "OR" => TokenType::Or,
            "NOT" => TokenType::Not,
            "IN" => TokenType::In,
            "JSON_SOURCE" => TokenType::JsonSource,
            "TRUE" => TokenType::Boolean(true),
            "FALSE" => TokenType::Boolean(false),
            "NULL" => TokenType::Null,
            _ => TokenType::Identifier(value),
        };

        Token {
            token_type,
            line,
            column,
        }
    }
}

fn error(message: impl Into<String>, line: usize, column: usize) -> Error {
    Error::Lexer {
        message: message.into(),
        line,
        column,
    }
}

/// Tokenizes `source`; the last token is always [`TokenType::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(source: &str) -> Vec<TokenType> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.token_type)
            .collect()
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            types("range Of x Is Product"),
            vec![
                TokenType::Range,
                TokenType::Of,
                TokenType::Identifier("x".into()),
                TokenType::Is,
                TokenType::Identifier("Product".into()),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn numbers_keep_raw_text() {
        assert_eq!(
            types("10.50 007"),
            vec![
                TokenType::Number("10.50".into()),
                TokenType::Number("007".into()),
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn slash_after_operand_is_division() {
        assert_eq!(
            types("p.a / 2"),
            vec![
                TokenType::Identifier("p".into()),
                TokenType::Dot,
                TokenType::Identifier("a".into()),
                TokenType::Slash,
                TokenType::Number("2".into()),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn slash_after_operator_starts_regex() {
        let tokens = types("x = /ab.*/i");
        assert_eq!(
            tokens[2],
            TokenType::Regex {
                pattern: "ab.*".into(),
                flags: "i".into()
            }
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            types(r#"'it\'s' "a\tb""#)[..2],
            [
                TokenType::String("it's".into()),
                TokenType::String("a\tb".into())
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            types("// line\n/* block */ :id"),
            vec![TokenType::Parameter("id".into()), TokenType::Eof]
        );
    }

    #[test]
    fn errors_carry_position() {
        let err = tokenize("RETRIEVE (\n  p.name # )").unwrap_err();
        match err {
            Error::Lexer { line, column, .. } => assert_eq!((line, column), (2, 10)),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unterminated_string_and_regex_fail() {
        assert!(matches!(tokenize("\"abc"), Err(Error::Lexer { .. })));
        assert!(matches!(tokenize("x = /abc"), Err(Error::Lexer { .. })));
        assert!(matches!(tokenize("'a\\qb'"), Err(Error::Lexer { .. })));
    }
}
