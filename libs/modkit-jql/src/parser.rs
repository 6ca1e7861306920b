//! JQL parser.
//!
//! ```text
//! query      := ""  |  "$" ("[" parts? "]")? projection?  |  projection
//! parts      := ","? ","? part ("," part)*  // filter, then sort, then slice
//! filter     := "?(" or ")"
//! or         := and ("|" and)*
//! and        := term ("," term)*
//! term       := "(" or ")" | path comparator literal
//! sort       := "^(" path ("+" | "-")? ("," path ("+" | "-")?)* ")"
//! slice      := uint? ":" uint?
//! projection := "{" name projection? ("," name projection?)* "}"
//! path       := "@" name ("." name)*
//! ```
//!
//! Whitespace is insignificant between tokens. No schema lookups happen
//! here; paths stay raw.

use crate::ast::{
    AbstractQuery, Comparator, Comparison, Direction, FieldPath, FilterExpr, Literal, Projection,
    ProjectionField, Slice, SortKey,
};
use crate::config::DEFAULT_MAX_FILTER_DEPTH;
use crate::error::ParseError;

/// Parse `raw` against `resource` with the default nesting limit.
///
/// # Errors
/// [`ParseError`] with kind `Syntax` or `EmptyQuery`.
pub fn parse(raw: &str, resource: &str) -> Result<AbstractQuery, ParseError> {
    Parser::new(raw).parse(resource)
}

/// Single-use recursive-descent parser over one query string.
#[derive(Debug)]
pub struct Parser<'a> {
    src: &'a str,
    pos: usize,
    max_depth: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    #[must_use]
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            max_depth: DEFAULT_MAX_FILTER_DEPTH,
            depth: 0,
        }
    }

    /// Maximum nesting of filter groups and projections.
    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    /// Parse the whole input.
    ///
    /// An empty (or blank) string is the default query.
    ///
    /// # Errors
    /// [`ParseError`] with kind `Syntax` or `EmptyQuery`.
    pub fn parse(mut self, resource: &str) -> Result<AbstractQuery, ParseError> {
        let mut query = AbstractQuery::all(resource);
        self.skip_ws();
        match self.peek() {
            None => return Ok(query),
            Some('$') => {
                self.bump();
                self.skip_ws();
                if self.eat('[') {
                    self.parse_parts(&mut query)?;
                    self.skip_ws();
                }
                if self.peek() == Some('{') {
                    query.projection = Some(self.parse_projection()?);
                }
            }
            Some('{') => query.projection = Some(self.parse_projection()?),
            Some(c) => return Err(self.error(format!("expected '$' or '{{', found '{c}'"))),
        }
        self.skip_ws();
        if let Some(c) = self.peek() {
            return Err(self.error(format!("unexpected '{c}' after end of query")));
        }
        Ok(query)
    }

    // ── Parts ───────────────────────────────────────────────────────

    fn parse_parts(&mut self, query: &mut AbstractQuery) -> Result<(), ParseError> {
        #[derive(PartialEq, PartialOrd)]
        enum Stage {
            Start,
            Filter,
            Sort,
            Slice,
        }

        let mut stage = Stage::Start;
        self.skip_ws();
        if self.eat(']') {
            return Ok(());
        }
        // Leading empty slots stand for an omitted filter, then an omitted sort.
        if self.eat(',') {
            stage = Stage::Filter;
            self.skip_ws();
            if self.eat(',') {
                stage = Stage::Sort;
            }
        }
        loop {
            self.skip_ws();
            let start = self.pos;
            match self.peek() {
                Some('?') => {
                    if stage >= Stage::Filter {
                        return Err(self.error("filter must be the first part and appear once"));
                    }
                    stage = Stage::Filter;
                    self.bump();
                    self.expect('(')?;
                    query.filter = Some(self.parse_filter_group(start)?);
                }
                Some('^') => {
                    if stage >= Stage::Sort {
                        return Err(self.error("sort must precede the slice and appear once"));
                    }
                    stage = Stage::Sort;
                    self.bump();
                    self.expect('(')?;
                    query.sort = self.parse_sort_keys(start)?;
                }
                Some(c) if c.is_ascii_digit() || c == ':' => {
                    if stage >= Stage::Slice {
                        return Err(self.error("slice may appear once"));
                    }
                    stage = Stage::Slice;
                    query.slice = self.parse_slice()?;
                }
                Some(c) => {
                    return Err(self.error(format!("expected filter, sort or slice, found '{c}'")));
                }
                None => return Err(self.error("unterminated '['")),
            }
            self.skip_ws();
            if self.eat(',') {
                continue;
            }
            self.expect(']')?;
            return Ok(());
        }
    }

    // ── Filter ──────────────────────────────────────────────────────

    fn parse_filter_group(&mut self, start: usize) -> Result<FilterExpr, ParseError> {
        self.enter()?;
        self.skip_ws();
        if self.peek() == Some(')') {
            return Err(ParseError::empty(start, "empty filter group"));
        }
        let expr = self.parse_or()?;
        self.skip_ws();
        self.expect(')')?;
        self.depth -= 1;
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<FilterExpr, ParseError> {
        let mut items = vec![self.parse_and()?];
        loop {
            self.skip_ws();
            if !self.eat('|') {
                break;
            }
            items.push(self.parse_and()?);
        }
        Ok(combine(items, false))
    }

    fn parse_and(&mut self) -> Result<FilterExpr, ParseError> {
        let mut items = vec![self.parse_term()?];
        loop {
            self.skip_ws();
            if !self.eat(',') {
                break;
            }
            items.push(self.parse_term()?);
        }
        Ok(combine(items, true))
    }

    fn parse_term(&mut self) -> Result<FilterExpr, ParseError> {
        self.skip_ws();
        let start = self.pos;
        if self.eat('(') {
            return self.parse_filter_group(start);
        }
        let path = self.parse_path()?;
        self.skip_ws();
        let op = self.parse_comparator()?;
        self.skip_ws();
        let literal = self.parse_literal()?;
        Ok(FilterExpr::Compare(Comparison { path, op, literal }))
    }

    fn parse_comparator(&mut self) -> Result<Comparator, ParseError> {
        const TABLE: [(&str, Comparator); 6] = [
            (">=", Comparator::Ge),
            ("<=", Comparator::Le),
            ("!=", Comparator::Ne),
            (">", Comparator::Gt),
            ("<", Comparator::Lt),
            ("=", Comparator::Eq),
        ];
        let rest = self.rest();
        for (text, op) in TABLE {
            if rest.starts_with(text) {
                self.pos += text.len();
                return Ok(op);
            }
        }
        Err(self.error("expected one of >, <, >=, <=, =, !="))
    }

    fn parse_literal(&mut self) -> Result<Literal, ParseError> {
        match self.peek() {
            Some(q @ ('"' | '\'')) => self.parse_string(q).map(Literal::Str),
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number(),
            Some(c) if c.is_ascii_alphabetic() => {
                let start = self.pos;
                let word = self.parse_name()?;
                match word.as_str() {
                    "true" => Ok(Literal::Bool(true)),
                    "false" => Ok(Literal::Bool(false)),
                    "null" => Ok(Literal::Null),
                    _ => Err(ParseError::syntax(
                        start,
                        format!("unknown literal '{word}'; strings must be quoted"),
                    )),
                }
            }
            _ => Err(self.error("expected a literal")),
        }
    }

    fn parse_number(&mut self) -> Result<Literal, ParseError> {
        let start = self.pos;
        self.eat('-');
        if !self.skip_digits() {
            return Err(self.error("expected digits"));
        }
        let mut float = false;
        if self.peek() == Some('.') && self.rest()[1..].starts_with(|c: char| c.is_ascii_digit()) {
            self.bump();
            self.skip_digits();
            float = true;
        }
        let text = &self.src[start..self.pos];
        if float {
            text.parse()
                .map(Literal::Float)
                .map_err(|_| ParseError::syntax(start, format!("invalid number '{text}'")))
        } else {
            text.parse()
                .map(Literal::Int)
                .map_err(|_| ParseError::syntax(start, format!("integer '{text}' out of range")))
        }
    }

    fn parse_string(&mut self, quote: char) -> Result<String, ParseError> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(ParseError::syntax(start, "unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => {
                    let escape = self.pos;
                    match self.bump() {
                        Some('n') => out.push('\n'),
                        Some('t') => out.push('\t'),
                        Some('r') => out.push('\r'),
                        Some(c @ ('\\' | '"' | '\'')) => out.push(c),
                        Some(c) => {
                            return Err(ParseError::syntax(escape, format!("unknown escape '\\{c}'")));
                        }
                        None => return Err(ParseError::syntax(start, "unterminated string")),
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }

    // ── Sort and slice ──────────────────────────────────────────────

    fn parse_sort_keys(&mut self, start: usize) -> Result<Vec<SortKey>, ParseError> {
        self.skip_ws();
        if self.peek() == Some(')') {
            return Err(ParseError::empty(start, "empty sort group"));
        }
        let mut keys = Vec::new();
        loop {
            self.skip_ws();
            let path = self.parse_path()?;
            self.skip_ws();
            let direction = if self.eat('-') {
                Direction::Desc
            } else {
                self.eat('+');
                Direction::Asc
            };
            keys.push(SortKey { path, direction });
            self.skip_ws();
            if !self.eat(',') {
                break;
            }
        }
        self.expect(')')?;
        Ok(keys)
    }

    fn parse_slice(&mut self) -> Result<Slice, ParseError> {
        let start = self.pos;
        let offset = self.parse_uint()?;
        self.skip_ws();
        self.expect(':')?;
        self.skip_ws();
        let end = self.parse_uint()?;
        if let (Some(a), Some(b)) = (offset, end)
            && b < a
        {
            return Err(ParseError::syntax(
                start,
                format!("slice end {b} is before start {a}"),
            ));
        }
        Ok(Slice {
            offset,
            limit: end.map(|b| b - offset.unwrap_or(0)),
        })
    }

    fn parse_uint(&mut self) -> Result<Option<u64>, ParseError> {
        let start = self.pos;
        if !self.skip_digits() {
            return Ok(None);
        }
        let text = &self.src[start..self.pos];
        text.parse()
            .map(Some)
            .map_err(|_| ParseError::syntax(start, format!("integer '{text}' out of range")))
    }

    // ── Projection ──────────────────────────────────────────────────

    fn parse_projection(&mut self) -> Result<Projection, ParseError> {
        let start = self.pos;
        self.expect('{')?;
        self.enter()?;
        self.skip_ws();
        if self.peek() == Some('}') {
            return Err(ParseError::empty(start, "empty projection"));
        }
        let mut fields = Vec::new();
        loop {
            self.skip_ws();
            let name = self.parse_name()?;
            self.skip_ws();
            let nested = if self.peek() == Some('{') {
                Some(self.parse_projection()?)
            } else {
                None
            };
            fields.push(ProjectionField { name, nested });
            self.skip_ws();
            if !self.eat(',') {
                break;
            }
        }
        self.expect('}')?;
        self.depth -= 1;
        Ok(Projection { fields })
    }

    // ── Lexical helpers ─────────────────────────────────────────────

    fn parse_path(&mut self) -> Result<FieldPath, ParseError> {
        if !self.eat('@') {
            return Err(self.error("expected field path starting with '@'"));
        }
        let mut segments = vec![self.parse_name()?];
        while self.eat('.') {
            segments.push(self.parse_name()?);
        }
        Ok(FieldPath::new(segments))
    }

    fn parse_name(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return Err(self.error("expected a field name")),
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        Ok(self.src[start..self.pos].to_owned())
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(self.error(format!("nesting deeper than {}", self.max_depth)));
        }
        Ok(())
    }

    fn skip_digits(&mut self) -> bool {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        self.pos > start
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), ParseError> {
        if self.eat(expected) {
            return Ok(());
        }
        let found = self
            .peek()
            .map_or_else(|| "end of input".to_owned(), |c| format!("'{c}'"));
        Err(self.error(format!("expected '{expected}', found {found}")))
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::syntax(self.pos, message)
    }
}

/// Build an AND/OR node, splicing children of the same combinator.
fn combine(items: Vec<FilterExpr>, and: bool) -> FilterExpr {
    let mut flat = Vec::with_capacity(items.len());
    for item in items {
        match item {
            FilterExpr::And(children) if and => flat.extend(children),
            FilterExpr::Or(children) if !and => flat.extend(children),
            other => flat.push(other),
        }
    }
    match <[FilterExpr; 1]>::try_from(flat) {
        Ok([single]) => single,
        Err(flat) if and => FilterExpr::And(flat),
        Err(flat) => FilterExpr::Or(flat),
    }
}
