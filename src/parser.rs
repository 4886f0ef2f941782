use std::collections::HashSet;

use thiserror::Error;

use crate::ast::{
    Aggregate, ComparisonOp, Condition, FieldPath, ForClause, LogicalOp, OrderDirection, Query,
    Token, TokenKind, WhereExpr,
};
use crate::lexer::tokenize;

/// Error raised when query text does not match the grammar.
///
/// Carries a human-readable message naming the offending token and its byte
/// offset in the query string. This is the only error channel out of
/// parsing; execution never starts on a query that failed to parse.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} (at offset {position})")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

/// Parses a query string into a [`Query`].
///
/// # Examples
///
/// ```
/// use xql_lang::parser::parse;
///
/// let query = parse("SELECT employee.name FROM ./data WHERE salary > 50000").unwrap();
/// assert_eq!(query.select_fields.len(), 1);
/// assert!(query.where_clause.is_some());
/// ```
pub fn parse(input: &str) -> Result<Query, ParseError> {
    Parser::new(tokenize(input)).parse_query()
}

/// Recursive-descent parser over the token stream, one method per grammar
/// rule. Clause order is fixed:
///
/// ```text
/// SELECT [DISTINCT] fields FROM path
///     (FOR $var IN path [AT $pos])*
///     [WHERE expr] [GROUP BY f,...] [ORDER BY f [ASC|DESC],...]
///     [LIMIT n] [OFFSET n]
/// ```
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        // The lexer always appends the sentinel; guard anyway so a
        // hand-built token stream cannot index out of bounds
        if !matches!(tokens.last().map(|t| t.kind), Some(TokenKind::EndOfInput)) {
            let position = tokens.last().map(|t| t.position).unwrap_or(0);
            tokens.push(Token::new(TokenKind::EndOfInput, "", position));
        }
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        // The EndOfInput sentinel is never consumed, so this cannot go past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::EndOfInput {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(&format!("expected {what}, found {}", self.peek())))
        }
    }

    fn error(&self, message: &str) -> ParseError {
        ParseError {
            message: message.to_string(),
            position: self.peek().position,
        }
    }

    /// Parses a complete query and runs the variable-resolution pass.
    pub fn parse_query(&mut self) -> Result<Query, ParseError> {
        self.expect(TokenKind::Select, "SELECT")?;
        let distinct = self.eat(TokenKind::Distinct);
        let select_fields = self.parse_select_list()?;

        self.expect(TokenKind::From, "FROM")?;
        let from_path = self.parse_from_path()?;

        let mut for_clauses = Vec::new();
        while self.check(TokenKind::For) {
            for_clauses.push(self.parse_for_clause()?);
        }

        let where_clause = if self.eat(TokenKind::Where) {
            Some(self.parse_or()?)
        } else {
            None
        };

        let group_by_fields = if self.eat(TokenKind::Group) {
            self.expect(TokenKind::By, "BY after GROUP")?;
            self.parse_name_list()?
        } else {
            Vec::new()
        };

        let order_by_fields = if self.eat(TokenKind::Order) {
            self.expect(TokenKind::By, "BY after ORDER")?;
            self.parse_order_list()?
        } else {
            Vec::new()
        };

        let limit = if self.eat(TokenKind::Limit) {
            Some(self.parse_count("LIMIT")?)
        } else {
            None
        };

        let offset = if self.eat(TokenKind::Offset) {
            Some(self.parse_count("OFFSET")?)
        } else {
            None
        };

        if !self.check(TokenKind::EndOfInput) {
            return Err(self.error(&format!("unexpected {} after query", self.peek())));
        }

        let has_aggregates = select_fields.iter().any(|f| f.aggregate != Aggregate::None);
        let mut query = Query {
            select_fields,
            from_path,
            for_clauses,
            where_clause,
            group_by_fields,
            order_by_fields,
            limit,
            offset,
            distinct,
            has_aggregates,
        };
        resolve_variable_refs(&mut query);
        Ok(query)
    }

    fn parse_select_list(&mut self) -> Result<Vec<FieldPath>, ParseError> {
        let mut fields = vec![self.parse_select_field()?];
        while self.eat(TokenKind::Comma) {
            fields.push(self.parse_select_field()?);
        }
        Ok(fields)
    }

    fn parse_select_field(&mut self) -> Result<FieldPath, ParseError> {
        let mut field = if let Some(aggregate) = self.peek_aggregate() {
            self.parse_aggregate(aggregate)?
        } else {
            self.parse_field_path()?
        };

        if self.eat(TokenKind::As) {
            let alias = self.expect(TokenKind::Identifier, "alias after AS")?;
            field.alias = Some(alias.text);
        }
        Ok(field)
    }

    fn peek_aggregate(&self) -> Option<Aggregate> {
        // Only treat the keyword as an aggregate when a '(' follows;
        // otherwise it may be a tag name like <count>
        let next = self.tokens.get(self.pos + 1)?;
        if next.kind != TokenKind::LParen {
            return None;
        }
        match self.peek().kind {
            TokenKind::Count => Some(Aggregate::Count),
            TokenKind::Sum => Some(Aggregate::Sum),
            TokenKind::Avg => Some(Aggregate::Avg),
            TokenKind::Min => Some(Aggregate::Min),
            TokenKind::Max => Some(Aggregate::Max),
            _ => None,
        }
    }

    fn parse_aggregate(&mut self, aggregate: Aggregate) -> Result<FieldPath, ParseError> {
        self.advance(); // function keyword
        self.expect(TokenKind::LParen, "'(' after aggregate function")?;

        if aggregate == Aggregate::Count
            && self.check(TokenKind::Identifier)
            && self.peek().text == "*"
        {
            self.advance();
            self.expect(TokenKind::RParen, "')' after aggregate argument")?;
            return Ok(FieldPath::default().with_aggregate(Aggregate::Count, "*"));
        }

        let arg_path = self.parse_field_path()?;
        self.expect(TokenKind::RParen, "')' after aggregate argument")?;

        let arg_text = arg_path.display_name();
        let mut field = arg_path.with_aggregate(aggregate, arg_text);
        // FILE_NAME makes no sense inside an aggregate; treat it as a tag
        field.include_filename = false;
        Ok(field)
    }

    /// Parses a dotted field path: `a.b.c`, `$var.rest`, `path.@attr`.
    fn parse_field_path(&mut self) -> Result<FieldPath, ParseError> {
        let mut field = FieldPath::default();

        loop {
            let token = self.peek().clone();
            match token.kind {
                TokenKind::Identifier => {
                    self.advance();
                    field.components.push(token.text);
                }
                TokenKind::Variable => {
                    self.advance();
                    field.components.push(format!("${}", token.text));
                }
                TokenKind::Attribute => {
                    self.advance();
                    field.is_attribute = true;
                    field.attribute_name = Some(token.text);
                    if self.check(TokenKind::Dot) {
                        return Err(
                            self.error("attribute must be the last component of a path")
                        );
                    }
                    break;
                }
                // Tag names that collide with function keywords are allowed
                // in paths
                TokenKind::Count
                | TokenKind::Sum
                | TokenKind::Avg
                | TokenKind::Min
                | TokenKind::Max => {
                    self.advance();
                    field.components.push(token.text);
                }
                _ => {
                    return Err(
                        self.error(&format!("expected field name, found {}", self.peek()))
                    );
                }
            }

            if !self.eat(TokenKind::Dot) {
                break;
            }
        }

        if field.components.len() == 1
            && !field.is_attribute
            && field.components[0].eq_ignore_ascii_case("FILE_NAME")
        {
            field.components.clear();
            field.include_filename = true;
        }
        Ok(field)
    }

    /// Parses the FROM path: a quoted string, or an unquoted run of
    /// identifier, slash, dot, and number tokens (so `./data/file.xml`
    /// parses without quoting). Stops at the next clause keyword.
    fn parse_from_path(&mut self) -> Result<String, ParseError> {
        if self.check(TokenKind::String) {
            return Ok(self.advance().text);
        }

        let mut path = String::new();
        loop {
            let token = self.peek();
            if token.is_clause_keyword() {
                break;
            }
            match token.kind {
                TokenKind::Identifier
                | TokenKind::Number
                | TokenKind::Slash
                | TokenKind::Dot => {
                    path.push_str(&token.text);
                    self.advance();
                }
                _ => break,
            }
        }

        if path.is_empty() {
            return Err(self.error(&format!("expected path after FROM, found {}", self.peek())));
        }
        Ok(path)
    }

    /// Parses `FOR $var IN path [AT $pos]`.
    fn parse_for_clause(&mut self) -> Result<ForClause, ParseError> {
        self.expect(TokenKind::For, "FOR")?;
        let variable = self.expect(TokenKind::Variable, "variable after FOR")?.text;
        self.expect(TokenKind::In, "IN")?;
        let path = self.parse_field_path()?;

        let position_var = if self.eat(TokenKind::At) {
            Some(self.expect(TokenKind::Variable, "variable after AT")?.text)
        } else {
            None
        };

        Ok(ForClause {
            variable,
            path,
            position_var,
        })
    }

    // WHERE grammar: Or := And (OR And)*, And := Primary (AND Primary)*,
    // Primary := '(' Or ')' | Condition. AND binds tighter than OR.

    fn parse_or(&mut self) -> Result<WhereExpr, ParseError> {
        let mut left = self.parse_and()?;
        while self.eat(TokenKind::Or) {
            let right = self.parse_and()?;
            left = WhereExpr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<WhereExpr, ParseError> {
        let mut left = self.parse_primary()?;
        while self.eat(TokenKind::And) {
            let right = self.parse_primary()?;
            left = WhereExpr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<WhereExpr, ParseError> {
        if self.eat(TokenKind::LParen) {
            let expr = self.parse_or()?;
            self.expect(TokenKind::RParen, "')'")?;
            return Ok(expr);
        }
        self.parse_condition().map(WhereExpr::Condition)
    }

    fn parse_condition(&mut self) -> Result<Condition, ParseError> {
        let field = self.parse_field_path()?;

        if self.eat(TokenKind::Is) {
            if self.eat(TokenKind::Not) {
                if self.eat(TokenKind::Null) {
                    return Ok(null_check(field, ComparisonOp::IsNotNull));
                }
                if self.eat(TokenKind::Like) {
                    let pattern = self.parse_like_pattern()?;
                    return Ok(like(field, ComparisonOp::NotLike, pattern));
                }
                return Err(self.error(&format!(
                    "expected NULL or LIKE after IS NOT, found {}",
                    self.peek()
                )));
            }
            if self.eat(TokenKind::Null) {
                return Ok(null_check(field, ComparisonOp::IsNull));
            }
            if self.eat(TokenKind::Like) {
                let pattern = self.parse_like_pattern()?;
                return Ok(like(field, ComparisonOp::Like, pattern));
            }
            return Err(self.error(&format!(
                "expected NULL or LIKE after IS, found {}",
                self.peek()
            )));
        }

        if self.eat(TokenKind::Not) {
            self.expect(TokenKind::Like, "LIKE after NOT")?;
            let pattern = self.parse_like_pattern()?;
            return Ok(like(field, ComparisonOp::NotLike, pattern));
        }

        if self.eat(TokenKind::Like) {
            let pattern = self.parse_like_pattern()?;
            return Ok(like(field, ComparisonOp::Like, pattern));
        }

        let op = match self.peek().kind {
            TokenKind::Equal => ComparisonOp::Equal,
            TokenKind::NotEqual => ComparisonOp::NotEqual,
            TokenKind::Less => ComparisonOp::Less,
            TokenKind::Greater => ComparisonOp::Greater,
            TokenKind::LessEqual => ComparisonOp::LessEqual,
            TokenKind::GreaterEqual => ComparisonOp::GreaterEqual,
            _ => {
                return Err(self.error(&format!(
                    "expected comparison operator, found {}",
                    self.peek()
                )));
            }
        };
        self.advance();

        let value = self.peek().clone();
        let (value, is_numeric) = match value.kind {
            TokenKind::Number => {
                self.advance();
                (value.text, true)
            }
            TokenKind::String | TokenKind::Identifier => {
                self.advance();
                (value.text, false)
            }
            _ => {
                return Err(
                    self.error(&format!("expected comparison value, found {}", self.peek()))
                );
            }
        };

        Ok(Condition {
            field,
            op,
            value,
            is_numeric,
        })
    }

    /// Reads a `/regex/` pattern token by token until the closing slash.
    ///
    /// Token texts are concatenated without separating whitespace, so a
    /// pattern must not rely on spaces between words (`/red|blue/` is fine,
    /// `/red blue/` becomes `redblue`).
    fn parse_like_pattern(&mut self) -> Result<String, ParseError> {
        self.expect(TokenKind::Slash, "'/' to open a LIKE pattern")?;
        let mut pattern = String::new();
        loop {
            let token = self.peek().clone();
            match token.kind {
                TokenKind::Slash => {
                    self.advance();
                    return Ok(pattern);
                }
                TokenKind::EndOfInput => {
                    return Err(self.error("unterminated LIKE pattern, missing closing '/'"));
                }
                // Sigils were stripped during lexing; restore them so
                // patterns like /^\$v/ survive
                TokenKind::Variable => {
                    self.advance();
                    pattern.push('$');
                    pattern.push_str(&token.text);
                }
                TokenKind::Attribute => {
                    self.advance();
                    pattern.push('@');
                    pattern.push_str(&token.text);
                }
                _ => {
                    self.advance();
                    pattern.push_str(&token.text);
                }
            }
        }
    }

    /// Parses a comma-separated list of dotted names (GROUP BY).
    fn parse_name_list(&mut self) -> Result<Vec<String>, ParseError> {
        let mut names = vec![self.parse_field_path()?.display_name()];
        while self.eat(TokenKind::Comma) {
            names.push(self.parse_field_path()?.display_name());
        }
        Ok(names)
    }

    /// Parses `field [ASC|DESC] (, field [ASC|DESC])*` (ORDER BY). An
    /// aggregate expression is accepted so results can be ordered by a
    /// selected aggregate column.
    fn parse_order_list(&mut self) -> Result<Vec<(String, OrderDirection)>, ParseError> {
        let mut fields = Vec::new();
        loop {
            let name = if let Some(aggregate) = self.peek_aggregate() {
                self.parse_aggregate(aggregate)?.display_name()
            } else {
                self.parse_field_path()?.display_name()
            };
            let direction = if self.eat(TokenKind::Desc) {
                OrderDirection::Descending
            } else {
                self.eat(TokenKind::Asc);
                OrderDirection::Ascending
            };
            fields.push((name, direction));
            if !self.eat(TokenKind::Comma) {
                return Ok(fields);
            }
        }
    }

    fn parse_count(&mut self, clause: &str) -> Result<u32, ParseError> {
        let token = self.expect(TokenKind::Number, &format!("number after {clause}"))?;
        token.text.parse().map_err(|_| ParseError {
            message: format!("{clause} expects a non-negative integer, found '{}'", token.text),
            position: token.position,
        })
    }
}

fn null_check(field: FieldPath, op: ComparisonOp) -> Condition {
    Condition {
        field,
        op,
        value: String::new(),
        is_numeric: false,
    }
}

fn like(field: FieldPath, op: ComparisonOp, pattern: String) -> Condition {
    Condition {
        field,
        op,
        value: pattern,
        is_numeric: false,
    }
}

/// Post-parse pass: mark every SELECT and WHERE field whose first component
/// names a bound FOR variable or position variable. Doing this once here
/// means execution never has to ask "tag name or loop variable?" per row.
fn resolve_variable_refs(query: &mut Query) {
    let mut names: HashSet<String> = HashSet::new();
    for clause in &query.for_clauses {
        names.insert(clause.variable.clone());
        if let Some(pos) = &clause.position_var {
            names.insert(pos.clone());
        }
    }
    if names.is_empty() {
        return;
    }

    for field in &mut query.select_fields {
        mark_variable_ref(field, &names);
    }
    if let Some(where_clause) = &mut query.where_clause {
        for field in where_clause.fields_mut() {
            mark_variable_ref(field, &names);
        }
    }
}

fn mark_variable_ref(field: &mut FieldPath, names: &HashSet<String>) {
    if let Some(head) = field.head_variable().map(|h| h.to_string()) {
        if names.contains(&head) {
            field.is_variable_ref = true;
            field.variable_name = Some(head);
        }
    }
}
