/// The kind of a lexical token.
///
/// Keyword recognition is case-insensitive (`select`, `Select` and `SELECT`
/// all produce [`TokenKind::Select`]); the original spelling is preserved in
/// [`Token::text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Clause keywords
    Select,
    Distinct,
    From,
    Where,
    For,
    In,
    At,
    Group,
    Order,
    By,
    Asc,
    Desc,
    Limit,
    Offset,
    As,

    // Boolean / condition keywords
    And,
    Or,
    Is,
    Not,
    Null,
    Like,

    // Aggregate function names
    Count,
    Sum,
    Avg,
    Min,
    Max,

    /// Field name, tag name, or unquoted path segment
    Identifier,

    /// Loop variable reference (`$name`); [`Token::text`] holds the name
    /// without the sigil
    Variable,

    /// Attribute reference (`@name`); [`Token::text`] holds the name
    /// without the sigil
    Attribute,

    /// Numeric literal, integer or decimal
    Number,

    /// String literal in single or double quotes; [`Token::text`] holds the
    /// unquoted content
    String,

    // Comparison operators
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,

    // Punctuation
    Dot,
    Slash,
    Comma,
    LParen,
    RParen,

    /// A character (or unterminated literal) the lexer could not classify.
    /// The lexer never fails; the parser reports these.
    Invalid,

    /// End-of-input sentinel, always the last token
    EndOfInput,
}

/// A single lexical token.
///
/// # Examples
///
/// ```
/// use xql_lang::lexer::tokenize;
/// use xql_lang::ast::TokenKind;
///
/// let tokens = tokenize("SELECT name FROM data");
/// assert_eq!(tokens[0].kind, TokenKind::Select);
/// assert_eq!(tokens[1].text, "name");
/// assert_eq!(tokens.last().unwrap().kind, TokenKind::EndOfInput);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Original text of the token (unquoted for strings, sigil-stripped for
    /// variables and attributes)
    pub text: String,
    /// Character offset of the token's start in the input
    pub position: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, position: usize) -> Self {
        Token {
            kind,
            text: text.into(),
            position,
        }
    }

    /// True for keywords that begin a new clause; the FROM-path parser stops
    /// at these when reading an unquoted path.
    pub fn is_clause_keyword(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Select
                | TokenKind::From
                | TokenKind::Where
                | TokenKind::For
                | TokenKind::Group
                | TokenKind::Order
                | TokenKind::Limit
                | TokenKind::Offset
        )
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TokenKind::EndOfInput => write!(f, "end of input"),
            TokenKind::String => write!(f, "\"{}\"", self.text),
            TokenKind::Variable => write!(f, "${}", self.text),
            TokenKind::Attribute => write!(f, "@{}", self.text),
            _ => write!(f, "'{}'", self.text),
        }
    }
}
