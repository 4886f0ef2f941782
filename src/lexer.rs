use crate::ast::{Token, TokenKind};

/// Tokenizes a full query string.
///
/// This never fails: characters the lexer cannot classify become
/// [`TokenKind::Invalid`] tokens and error reporting is deferred to the
/// parser. The returned sequence always ends with [`TokenKind::EndOfInput`].
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let done = token.kind == TokenKind::EndOfInput;
        tokens.push(token);
        if done {
            return tokens;
        }
    }
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_word(&mut self) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current_char() {
            // '-' is legal inside XML tag names, so identifiers accept it
            if ch.is_alphanumeric() || ch == '_' || ch == '-' {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    /// Reads a quoted literal. Returns `None` when the closing quote is
    /// missing, in which case the caller emits an `Invalid` token.
    fn read_string(&mut self, quote: char) -> Option<String> {
        let mut result = String::new();
        self.advance(); // consume opening quote

        while let Some(ch) = self.current_char() {
            if ch == quote {
                self.advance();
                return Some(result);
            }
            result.push(ch);
            self.advance();
        }
        None
    }

    fn read_number(&mut self) -> String {
        let mut number = String::new();
        if self.current_char() == Some('-') {
            number.push('-');
            self.advance();
        }
        let mut seen_dot = false;
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                number.push(ch);
                self.advance();
            } else if ch == '.'
                && !seen_dot
                && self.peek_char(1).is_some_and(|c| c.is_ascii_digit())
            {
                seen_dot = true;
                number.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        number
    }

    fn keyword_kind(word: &str) -> Option<TokenKind> {
        // Keywords are recognized case-insensitively
        let kind = match word.to_ascii_uppercase().as_str() {
            "SELECT" => TokenKind::Select,
            "DISTINCT" => TokenKind::Distinct,
            "FROM" => TokenKind::From,
            "WHERE" => TokenKind::Where,
            "FOR" => TokenKind::For,
            "IN" => TokenKind::In,
            "AT" => TokenKind::At,
            "GROUP" => TokenKind::Group,
            "ORDER" => TokenKind::Order,
            "BY" => TokenKind::By,
            "ASC" => TokenKind::Asc,
            "DESC" => TokenKind::Desc,
            "LIMIT" => TokenKind::Limit,
            "OFFSET" => TokenKind::Offset,
            "AS" => TokenKind::As,
            "AND" => TokenKind::And,
            "OR" => TokenKind::Or,
            "IS" => TokenKind::Is,
            "NOT" => TokenKind::Not,
            "NULL" => TokenKind::Null,
            "LIKE" => TokenKind::Like,
            "COUNT" => TokenKind::Count,
            "SUM" => TokenKind::Sum,
            "AVG" => TokenKind::Avg,
            "MIN" => TokenKind::Min,
            "MAX" => TokenKind::Max,
            _ => return None,
        };
        Some(kind)
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        let start = self.position;

        let Some(ch) = self.current_char() else {
            return Token::new(TokenKind::EndOfInput, "", start);
        };

        match ch {
            '$' => {
                if self.peek_char(1).is_some_and(|c| c.is_alphabetic() || c == '_') {
                    self.advance();
                    let name = self.read_word();
                    Token::new(TokenKind::Variable, name, start)
                } else {
                    self.advance();
                    Token::new(TokenKind::Invalid, "$", start)
                }
            }
            '@' => {
                if self.peek_char(1).is_some_and(|c| c.is_alphabetic() || c == '_') {
                    self.advance();
                    let name = self.read_word();
                    Token::new(TokenKind::Attribute, name, start)
                } else {
                    self.advance();
                    Token::new(TokenKind::Invalid, "@", start)
                }
            }
            '.' => {
                self.advance();
                Token::new(TokenKind::Dot, ".", start)
            }
            '/' => {
                self.advance();
                Token::new(TokenKind::Slash, "/", start)
            }
            ',' => {
                self.advance();
                Token::new(TokenKind::Comma, ",", start)
            }
            '(' => {
                self.advance();
                Token::new(TokenKind::LParen, "(", start)
            }
            ')' => {
                self.advance();
                Token::new(TokenKind::RParen, ")", start)
            }
            '*' => {
                self.advance();
                // Only meaningful as COUNT(*); the parser rejects it elsewhere
                Token::new(TokenKind::Identifier, "*", start)
            }
            '=' => {
                self.advance();
                Token::new(TokenKind::Equal, "=", start)
            }
            '!' => {
                if self.peek_char(1) == Some('=') {
                    self.advance();
                    self.advance();
                    Token::new(TokenKind::NotEqual, "!=", start)
                } else {
                    self.advance();
                    Token::new(TokenKind::Invalid, "!", start)
                }
            }
            '<' => {
                if self.peek_char(1) == Some('=') {
                    self.advance();
                    self.advance();
                    Token::new(TokenKind::LessEqual, "<=", start)
                } else {
                    self.advance();
                    Token::new(TokenKind::Less, "<", start)
                }
            }
            '>' => {
                if self.peek_char(1) == Some('=') {
                    self.advance();
                    self.advance();
                    Token::new(TokenKind::GreaterEqual, ">=", start)
                } else {
                    self.advance();
                    Token::new(TokenKind::Greater, ">", start)
                }
            }
            '"' | '\'' => match self.read_string(ch) {
                Some(text) => Token::new(TokenKind::String, text, start),
                None => {
                    // Unterminated literal; hand the rest to the parser as-is
                    let rest: String = self.input[start..].iter().collect();
                    Token::new(TokenKind::Invalid, rest, start)
                }
            },
            '-' if self.peek_char(1).is_some_and(|c| c.is_ascii_digit()) => {
                let number = self.read_number();
                Token::new(TokenKind::Number, number, start)
            }
            c if c.is_ascii_digit() => {
                let number = self.read_number();
                Token::new(TokenKind::Number, number, start)
            }
            c if c.is_alphabetic() || c == '_' => {
                let word = self.read_word();
                match Self::keyword_kind(&word) {
                    Some(kind) => Token::new(kind, word, start),
                    None => Token::new(TokenKind::Identifier, word, start),
                }
            }
            other => {
                self.advance();
                Token::new(TokenKind::Invalid, other.to_string(), start)
            }
        }
    }
}

#[test]
fn test_keywords_case_insensitive() {
    let tokens = tokenize("select FROM Where oR");
    assert_eq!(tokens[0].kind, TokenKind::Select);
    assert_eq!(tokens[1].kind, TokenKind::From);
    assert_eq!(tokens[2].kind, TokenKind::Where);
    assert_eq!(tokens[3].kind, TokenKind::Or);
    assert_eq!(tokens[4].kind, TokenKind::EndOfInput);
}

#[test]
fn test_two_char_operators_greedy() {
    let tokens = tokenize("<= >= != < >");
    let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::LessEqual,
            TokenKind::GreaterEqual,
            TokenKind::NotEqual,
            TokenKind::Less,
            TokenKind::Greater,
            TokenKind::EndOfInput,
        ]
    );
}

#[test]
fn test_unterminated_string_is_invalid() {
    let tokens = tokenize("SELECT \"oops");
    assert_eq!(tokens[1].kind, TokenKind::Invalid);
    assert_eq!(tokens[2].kind, TokenKind::EndOfInput);
}
