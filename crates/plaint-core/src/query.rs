//! Restricted filter expressions for complaint queries
//!
//! The language model is asked to translate natural language into a
//! SQLAlchemy-style filter such as
//!
//! ```text
//! and_(Complaint.user_id == '123',
//!      Complaint.complaint_time >= datetime.now() - timedelta(days=3),
//!      Complaint.complaint_category == '电视')
//! ```
//!
//! The text is never executed. It is parsed against a fixed allow-list of
//! symbols into a [`Filter`] tree; time arithmetic is evaluated at parse time
//! against a caller-supplied "now". Anything outside the allow-list is a
//! [`Error::Query`]. The database layer compiles the tree into a
//! parameterized WHERE clause.
//!
//! A shorthand syntax (`category:电视 user:123 within:3d`) covers manual
//! queries when no model is configured.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::{Error, Result};
use crate::models::parse_timestamp;

/// Columns a filter may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    ComplaintTime,
    Content,
    UserId,
    ComplaintCategory,
    Reply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Integer,
    Time,
    Text,
}

impl Field {
    /// Database column name (identical to the model attribute name)
    pub fn column(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::ComplaintTime => "complaint_time",
            Self::Content => "content",
            Self::UserId => "user_id",
            Self::ComplaintCategory => "complaint_category",
            Self::Reply => "reply",
        }
    }

    fn from_attribute(name: &str) -> Option<Self> {
        match name {
            "id" => Some(Self::Id),
            "complaint_time" => Some(Self::ComplaintTime),
            "content" => Some(Self::Content),
            "user_id" => Some(Self::UserId),
            "complaint_category" => Some(Self::ComplaintCategory),
            "reply" => Some(Self::Reply),
            _ => None,
        }
    }

    fn kind(&self) -> FieldKind {
        match self {
            Self::Id => FieldKind::Integer,
            Self::ComplaintTime => FieldKind::Time,
            _ => FieldKind::Text,
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }

    /// Operator with its operands swapped (`a < b` is `b > a`)
    fn mirror(&self) -> Self {
        match self {
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
            other => *other,
        }
    }
}

/// Substring matching methods on text columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatch {
    Contains,
    StartsWith,
    EndsWith,
    /// Raw SQL LIKE pattern (`like` and `ilike` both map here)
    Like,
}

/// A literal compared against a column
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Text(String),
    Time(NaiveDateTime),
}

/// A parsed, validated filter
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Compare {
        field: Field,
        op: CompareOp,
        value: Value,
    },
    IsNull {
        field: Field,
        negated: bool,
    },
    Text {
        field: Field,
        op: TextMatch,
        pattern: String,
    },
    In {
        field: Field,
        values: Vec<Value>,
        negated: bool,
    },
}

/// Parse a query: an expression when it looks like one, otherwise shorthand
///
/// Blank input means "no filter".
pub fn parse_query(input: &str, now: NaiveDateTime) -> Result<Option<Filter>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    if looks_like_expression(input) {
        return parse_expression(input, now).map(Some);
    }
    parse_shorthand(input, now).map(Some)
}

/// Whether the text uses expression syntax rather than shorthand
pub fn looks_like_expression(input: &str) -> bool {
    input.contains("Complaint.")
        || input.starts_with("and_(")
        || input.starts_with("or_(")
        || input.starts_with("not_(")
}

/// Parse a filter expression
pub fn parse_expression(input: &str, now: NaiveDateTime) -> Result<Filter> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(Error::Query("Empty expression".into()));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        now,
        depth: 0,
        conditions: 0,
    };
    let filter = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(Error::Query(format!(
            "Unexpected {} after end of expression",
            token.describe()
        )));
    }
    Ok(filter)
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Cmp(CompareOp),
    Assign,
    Amp,
    Pipe,
    Tilde,
    Plus,
    Minus,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("'{}'", name),
            Token::Str(s) => format!("string '{}'", s),
            Token::Int(n) => format!("number {}", n),
            Token::Float(n) => format!("number {}", n),
            Token::Dot => "'.'".into(),
            Token::Comma => "','".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
            Token::LBracket => "'['".into(),
            Token::RBracket => "']'".into(),
            Token::Cmp(op) => format!("'{}'", op.sql()),
            Token::Assign => "'='".into(),
            Token::Amp => "'&'".into(),
            Token::Pipe => "'|'".into(),
            Token::Tilde => "'~'".into(),
            Token::Plus => "'+'".into(),
            Token::Minus => "'-'".into(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '&' => {
                tokens.push(Token::Amp);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '~' => {
                tokens.push(Token::Tilde);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (token, width) = match (c, next) {
                    ('=', Some('=')) => (Token::Cmp(CompareOp::Eq), 2),
                    ('!', Some('=')) => (Token::Cmp(CompareOp::Ne), 2),
                    ('>', Some('=')) => (Token::Cmp(CompareOp::Ge), 2),
                    ('<', Some('=')) => (Token::Cmp(CompareOp::Le), 2),
                    ('>', _) => (Token::Cmp(CompareOp::Gt), 1),
                    ('<', _) => (Token::Cmp(CompareOp::Lt), 1),
                    ('=', _) => (Token::Assign, 1),
                    _ => return Err(Error::Query("Unexpected '!'".into())),
                };
                tokens.push(token);
                i += width;
            }
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(Error::Query("Unterminated string literal".into())),
                        Some('\\') => {
                            match chars.get(i + 1) {
                                Some('n') => value.push('\n'),
                                Some('t') => value.push('\t'),
                                Some(&other) => value.push(other),
                                None => {
                                    return Err(Error::Query(
                                        "Unterminated string literal".into(),
                                    ))
                                }
                            }
                            i += 2;
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            value.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '_') {
                    i += 1;
                }
                let is_float = chars.get(i) == Some(&'.')
                    && chars.get(i + 1).is_some_and(|ch| ch.is_ascii_digit());
                if is_float {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().filter(|ch| **ch != '_').collect();
                if is_float {
                    let value = text
                        .parse::<f64>()
                        .map_err(|_| Error::Query(format!("Invalid number '{}'", text)))?;
                    tokens.push(Token::Float(value));
                } else {
                    let value = text
                        .parse::<i64>()
                        .map_err(|_| Error::Query(format!("Invalid number '{}'", text)))?;
                    tokens.push(Token::Int(value));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(Error::Query(format!("Unexpected character '{}'", other)));
            }
        }
    }

    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

/// An operand of a comparison before type checking
#[derive(Debug, Clone)]
enum Operand {
    Field(Field),
    Value(Value),
    Null,
}

/// Deepest allowed chain of groups and negations
const MAX_NESTING: usize = 64;

/// Most comparisons (and list members) one expression may hold
const MAX_CONDITIONS: usize = 256;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    now: NaiveDateTime,
    depth: usize,
    conditions: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.next() {
            Some(ref token) if token == expected => Ok(()),
            Some(token) => Err(Error::Query(format!(
                "Expected {}, found {}",
                expected.describe(),
                token.describe()
            ))),
            None => Err(Error::Query(format!(
                "Expected {}, found end of input",
                expected.describe()
            ))),
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            Some(token) => Err(Error::Query(format!(
                "Expected a name, found {}",
                token.describe()
            ))),
            None => Err(Error::Query("Expected a name, found end of input".into())),
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Filter> {
        let first = self.parse_and()?;
        if self.peek() != Some(&Token::Pipe) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Token::Pipe) {
            items.push(self.parse_and()?);
        }
        Ok(Filter::Or(items))
    }

    fn parse_and(&mut self) -> Result<Filter> {
        let first = self.parse_unary()?;
        if self.peek() != Some(&Token::Amp) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Token::Amp) {
            items.push(self.parse_unary()?);
        }
        Ok(Filter::And(items))
    }

    // Every nested form re-enters here, so this bounds recursion for all of them
    fn parse_unary(&mut self) -> Result<Filter> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(Error::Query("Expression nested too deeply".into()));
        }
        let filter = if self.eat(&Token::Tilde) {
            Filter::Not(Box::new(self.parse_unary()?))
        } else {
            self.parse_primary()?
        };
        self.depth -= 1;
        Ok(filter)
    }

    fn count_conditions(&mut self, n: usize) -> Result<()> {
        self.conditions += n;
        if self.conditions > MAX_CONDITIONS {
            return Err(Error::Query(format!(
                "Expression has more than {} conditions",
                MAX_CONDITIONS
            )));
        }
        Ok(())
    }

    fn parse_primary(&mut self) -> Result<Filter> {
        if self.eat(&Token::LParen) {
            let inner = self.parse_or()?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }

        if let (Some(Token::Ident(name)), Some(Token::LParen)) = (self.peek(), self.peek_at(1)) {
            match name.as_str() {
                "and_" | "or_" => {
                    let is_and = name == "and_";
                    self.pos += 2;
                    let items = self.parse_expr_list()?;
                    return Ok(if is_and {
                        Filter::And(items)
                    } else {
                        Filter::Or(items)
                    });
                }
                "not_" => {
                    self.pos += 2;
                    let inner = self.parse_or()?;
                    self.expect(&Token::RParen)?;
                    return Ok(Filter::Not(Box::new(inner)));
                }
                _ => {}
            }
        }

        self.count_conditions(1)?;
        let lhs = self.parse_operand()?;

        if let Operand::Field(field) = lhs {
            if self.peek() == Some(&Token::Dot) {
                self.pos += 1;
                return self.parse_method(field);
            }
        }

        let op = match self.next() {
            Some(Token::Cmp(op)) => op,
            Some(token) => {
                return Err(Error::Query(format!(
                    "Expected a comparison operator, found {}",
                    token.describe()
                )))
            }
            None => {
                return Err(Error::Query(
                    "Expected a comparison operator, found end of input".into(),
                ))
            }
        };
        let rhs = self.parse_operand()?;
        build_comparison(lhs, op, rhs)
    }

    /// Comma-separated expressions up to the closing parenthesis
    fn parse_expr_list(&mut self) -> Result<Vec<Filter>> {
        let mut items = Vec::new();
        loop {
            if self.eat(&Token::RParen) {
                break;
            }
            items.push(self.parse_or()?);
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RParen)?;
                break;
            }
        }
        if items.is_empty() {
            return Err(Error::Query("and_/or_ need at least one condition".into()));
        }
        Ok(items)
    }

    /// `Complaint.<field>.<method>(...)`, the field already consumed
    fn parse_method(&mut self, field: Field) -> Result<Filter> {
        let method = self.expect_ident()?;
        self.expect(&Token::LParen)?;

        let filter = match method.as_str() {
            "contains" | "startswith" | "endswith" | "like" | "ilike" => {
                let op = match method.as_str() {
                    "contains" => TextMatch::Contains,
                    "startswith" => TextMatch::StartsWith,
                    "endswith" => TextMatch::EndsWith,
                    _ => TextMatch::Like,
                };
                if field.kind() != FieldKind::Text {
                    return Err(Error::Query(format!(
                        "{}() is only supported on text fields, not {}",
                        method,
                        field.column()
                    )));
                }
                let pattern = match self.parse_operand()? {
                    Operand::Value(Value::Text(s)) => s,
                    _ => {
                        return Err(Error::Query(format!(
                            "{}() expects a string argument",
                            method
                        )))
                    }
                };
                Filter::Text { field, op, pattern }
            }
            "is_" | "isnot" | "is_not" => {
                match self.parse_operand()? {
                    Operand::Null => {}
                    _ => {
                        return Err(Error::Query(format!(
                            "{}() only supports None",
                            method
                        )))
                    }
                }
                Filter::IsNull {
                    field,
                    negated: method != "is_",
                }
            }
            "in_" | "notin_" | "not_in" => {
                self.expect(&Token::LBracket)?;
                let mut values = Vec::new();
                loop {
                    if self.eat(&Token::RBracket) {
                        break;
                    }
                    self.count_conditions(1)?;
                    match self.parse_operand()? {
                        Operand::Value(v) => values.push(coerce(field, v)?),
                        _ => {
                            return Err(Error::Query(format!(
                                "{}() expects a list of literals",
                                method
                            )))
                        }
                    }
                    if !self.eat(&Token::Comma) {
                        self.expect(&Token::RBracket)?;
                        break;
                    }
                }
                Filter::In {
                    field,
                    values,
                    negated: method != "in_",
                }
            }
            "between" => {
                let low = self.parse_operand()?;
                self.expect(&Token::Comma)?;
                let high = self.parse_operand()?;
                Filter::And(vec![
                    build_comparison(Operand::Field(field), CompareOp::Ge, low)?,
                    build_comparison(Operand::Field(field), CompareOp::Le, high)?,
                ])
            }
            other => {
                return Err(Error::Query(format!(
                    "Method '{}' is not allowed on Complaint.{}",
                    other,
                    field.column()
                )))
            }
        };

        self.expect(&Token::RParen)?;
        Ok(filter)
    }

    fn parse_operand(&mut self) -> Result<Operand> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Operand::Value(Value::Text(s))),
            Some(Token::Int(n)) => Ok(Operand::Value(Value::Integer(n))),
            Some(Token::Minus) => match self.next() {
                Some(Token::Int(n)) => Ok(Operand::Value(Value::Integer(-n))),
                _ => Err(Error::Query("Expected a number after '-'".into())),
            },
            Some(Token::Float(n)) => Err(Error::Query(format!(
                "Fractional number {} is not comparable with any field",
                n
            ))),
            Some(Token::Ident(name)) => match name.as_str() {
                "Complaint" => {
                    self.expect(&Token::Dot)?;
                    let attribute = self.expect_ident()?;
                    Field::from_attribute(&attribute)
                        .map(Operand::Field)
                        .ok_or_else(|| {
                            Error::Query(format!("Unknown field 'Complaint.{}'", attribute))
                        })
                }
                "None" => Ok(Operand::Null),
                "True" | "False" => Err(Error::Query(format!(
                    "{} cannot be compared with any complaint field",
                    name
                ))),
                "datetime" | "date" => {
                    let base = self.parse_time_atom(&name)?;
                    let time = self.parse_time_offsets(base)?;
                    Ok(Operand::Value(Value::Time(time)))
                }
                other => Err(Error::Query(format!("Symbol '{}' is not allowed", other))),
            },
            Some(token) => Err(Error::Query(format!(
                "Expected a field or literal, found {}",
                token.describe()
            ))),
            None => Err(Error::Query(
                "Expected a field or literal, found end of input".into(),
            )),
        }
    }

    /// `datetime.now()`, `date.today()`, `datetime(2024, 1, 1)`, `datetime.strptime(s, fmt)`
    fn parse_time_atom(&mut self, module: &str) -> Result<NaiveDateTime> {
        if self.eat(&Token::LParen) {
            if module != "datetime" {
                return Err(Error::Query("date(...) is not allowed, use datetime(...)".into()));
            }
            return self.parse_datetime_constructor();
        }

        self.expect(&Token::Dot)?;
        let function = self.expect_ident()?;
        self.expect(&Token::LParen)?;

        match (module, function.as_str()) {
            ("datetime", "now") | ("datetime", "utcnow") | ("datetime", "today") => {
                self.expect(&Token::RParen)?;
                Ok(self.now)
            }
            ("date", "today") => {
                self.expect(&Token::RParen)?;
                Ok(self.now.date().and_time(chrono::NaiveTime::MIN))
            }
            ("datetime", "strptime") | ("datetime", "fromisoformat") => {
                let value = match self.next() {
                    Some(Token::Str(s)) => s,
                    _ => {
                        return Err(Error::Query(format!(
                            "datetime.{}() expects a string",
                            function
                        )))
                    }
                };
                let format = if self.eat(&Token::Comma) {
                    match self.next() {
                        Some(Token::Str(s)) => Some(s),
                        _ => return Err(Error::Query("strptime() expects a format string".into())),
                    }
                } else {
                    None
                };
                self.expect(&Token::RParen)?;
                parse_with_format(&value, format.as_deref())
            }
            _ => Err(Error::Query(format!(
                "Symbol '{}.{}' is not allowed",
                module, function
            ))),
        }
    }

    /// `datetime(year, month, day[, hour, minute[, second]])`, "(" consumed
    fn parse_datetime_constructor(&mut self) -> Result<NaiveDateTime> {
        let mut parts = Vec::new();
        loop {
            match self.next() {
                Some(Token::Int(n)) => parts.push(n),
                Some(token) => {
                    return Err(Error::Query(format!(
                        "datetime() expects integers, found {}",
                        token.describe()
                    )))
                }
                None => return Err(Error::Query("Unterminated datetime()".into())),
            }
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RParen)?;
                break;
            }
        }
        if parts.len() < 3 || parts.len() > 6 {
            return Err(Error::Query(
                "datetime() expects year, month, day and optional hour, minute, second".into(),
            ));
        }
        let get = |i: usize| parts.get(i).copied().unwrap_or(0);
        let date = i32::try_from(get(0))
            .ok()
            .and_then(|y| NaiveDate::from_ymd_opt(y, get(1) as u32, get(2) as u32))
            .ok_or_else(|| Error::Query("datetime(): invalid date".into()))?;
        date.and_hms_opt(get(3) as u32, get(4) as u32, get(5) as u32)
            .ok_or_else(|| Error::Query("datetime(): invalid time".into()))
    }

    /// Any number of `+ timedelta(...)` / `- timedelta(...)`
    fn parse_time_offsets(&mut self, mut time: NaiveDateTime) -> Result<NaiveDateTime> {
        loop {
            let subtract = match self.peek() {
                Some(Token::Plus) => false,
                Some(Token::Minus) => true,
                _ => return Ok(time),
            };
            self.pos += 1;
            match self.next() {
                Some(Token::Ident(name)) if name == "timedelta" => {}
                Some(token) => {
                    return Err(Error::Query(format!(
                        "Only timedelta(...) can be added to a time, found {}",
                        token.describe()
                    )))
                }
                None => return Err(Error::Query("Expected timedelta(...)".into())),
            }
            self.expect(&Token::LParen)?;
            let delta = self.parse_timedelta_args()?;
            let shifted = if subtract {
                time.checked_sub_signed(delta)
            } else {
                time.checked_add_signed(delta)
            };
            time = shifted.ok_or_else(|| Error::Query("Time arithmetic overflow".into()))?;
        }
    }

    /// `days=3, hours=2` or a single positional day count, "(" consumed
    fn parse_timedelta_args(&mut self) -> Result<Duration> {
        let mut total_ms: f64 = 0.0;
        loop {
            if self.eat(&Token::RParen) {
                break;
            }
            let (unit, amount) = match (self.peek().cloned(), self.peek_at(1).cloned()) {
                (Some(Token::Ident(unit)), Some(Token::Assign)) => {
                    self.pos += 2;
                    (unit, self.parse_number()?)
                }
                _ => ("days".to_string(), self.parse_number()?),
            };
            let unit_ms = match unit.as_str() {
                "weeks" => 7.0 * 86_400_000.0,
                "days" => 86_400_000.0,
                "hours" => 3_600_000.0,
                "minutes" => 60_000.0,
                "seconds" => 1_000.0,
                other => {
                    return Err(Error::Query(format!(
                        "timedelta() argument '{}' is not allowed",
                        other
                    )))
                }
            };
            total_ms += amount * unit_ms;
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RParen)?;
                break;
            }
        }
        // About 27,000 years; keeps chrono's Duration constructors in range
        if !total_ms.is_finite() || total_ms.abs() > 1e15 {
            return Err(Error::Query("timedelta() is out of range".into()));
        }
        Ok(Duration::milliseconds(total_ms.round() as i64))
    }

    fn parse_number(&mut self) -> Result<f64> {
        let negative = self.eat(&Token::Minus);
        let value = match self.next() {
            Some(Token::Int(n)) => n as f64,
            Some(Token::Float(n)) => n,
            Some(token) => {
                return Err(Error::Query(format!(
                    "Expected a number, found {}",
                    token.describe()
                )))
            }
            None => return Err(Error::Query("Expected a number".into())),
        };
        Ok(if negative { -value } else { value })
    }
}

fn parse_with_format(value: &str, format: Option<&str>) -> Result<NaiveDateTime> {
    if let Some(format) = format {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt);
        }
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Ok(date.and_time(chrono::NaiveTime::MIN));
        }
    }
    parse_timestamp(value).ok_or_else(|| Error::Query(format!("Invalid datetime '{}'", value)))
}

fn build_comparison(lhs: Operand, op: CompareOp, rhs: Operand) -> Result<Filter> {
    let (field, op, rhs) = match (lhs, rhs) {
        (Operand::Field(field), rhs) => (field, op, rhs),
        (lhs, Operand::Field(field)) => (field, op.mirror(), lhs),
        _ => {
            return Err(Error::Query(
                "A comparison must reference a Complaint field".into(),
            ))
        }
    };

    match rhs {
        Operand::Field(_) => Err(Error::Query(
            "Comparing two fields is not supported".into(),
        )),
        Operand::Null => match op {
            CompareOp::Eq => Ok(Filter::IsNull {
                field,
                negated: false,
            }),
            CompareOp::Ne => Ok(Filter::IsNull {
                field,
                negated: true,
            }),
            _ => Err(Error::Query(format!(
                "Operator '{}' cannot be used with None",
                op.sql()
            ))),
        },
        Operand::Value(value) => Ok(Filter::Compare {
            field,
            op,
            value: coerce(field, value)?,
        }),
    }
}

/// Check a literal against the field's type, converting where unambiguous
fn coerce(field: Field, value: Value) -> Result<Value> {
    match (field.kind(), value) {
        (FieldKind::Integer, Value::Integer(n)) => Ok(Value::Integer(n)),
        (FieldKind::Integer, Value::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| Error::Query(format!("Complaint.id expects an integer, got '{}'", s))),
        (FieldKind::Time, Value::Time(t)) => Ok(Value::Time(t)),
        (FieldKind::Time, Value::Text(s)) => parse_timestamp(&s)
            .map(Value::Time)
            .ok_or_else(|| Error::Query(format!("Invalid datetime '{}'", s))),
        (FieldKind::Text, Value::Text(s)) => Ok(Value::Text(s)),
        (FieldKind::Text, Value::Integer(n)) => Ok(Value::Text(n.to_string())),
        (_, value) => Err(Error::Query(format!(
            "Complaint.{} cannot be compared with {:?}",
            field.column(),
            value
        ))),
    }
}

// ============================================================================
// Shorthand
// ============================================================================

/// Parse `key:value` shorthand
///
/// Keys: `category`, `user`/`user_id`, `content`, `reply` (`none`/`some` test
/// presence), `id`, `since`/`after`, `until`/`before`, `within` (`3d`, `12h`,
/// `2w`). Bare words search the content. Full-width colons are accepted.
pub fn parse_shorthand(input: &str, now: NaiveDateTime) -> Result<Filter> {
    let mut conditions = Vec::new();

    for word in split_words(input)? {
        let normalized = word.replacen('：', ":", 1);
        let Some((key, value)) = normalized.split_once(':') else {
            conditions.push(Filter::Text {
                field: Field::Content,
                op: TextMatch::Contains,
                pattern: word,
            });
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            return Err(Error::Query(format!("Missing value for '{}'", key)));
        }

        let condition = match key.to_lowercase().as_str() {
            "category" | "cat" | "类别" | "分类" => Filter::Compare {
                field: Field::ComplaintCategory,
                op: CompareOp::Eq,
                value: Value::Text(value.to_string()),
            },
            "user" | "user_id" | "用户" => Filter::Compare {
                field: Field::UserId,
                op: CompareOp::Eq,
                value: Value::Text(value.to_string()),
            },
            "content" | "text" | "内容" => Filter::Text {
                field: Field::Content,
                op: TextMatch::Contains,
                pattern: value.to_string(),
            },
            "reply" | "回复" => match value.to_lowercase().as_str() {
                "none" | "null" => Filter::IsNull {
                    field: Field::Reply,
                    negated: false,
                },
                "some" | "any" => Filter::IsNull {
                    field: Field::Reply,
                    negated: true,
                },
                _ => Filter::Text {
                    field: Field::Reply,
                    op: TextMatch::Contains,
                    pattern: value.to_string(),
                },
            },
            "id" => Filter::Compare {
                field: Field::Id,
                op: CompareOp::Eq,
                value: coerce(Field::Id, Value::Text(value.to_string()))?,
            },
            "since" | "after" => Filter::Compare {
                field: Field::ComplaintTime,
                op: CompareOp::Ge,
                value: coerce(Field::ComplaintTime, Value::Text(value.to_string()))?,
            },
            "until" | "before" => Filter::Compare {
                field: Field::ComplaintTime,
                op: CompareOp::Le,
                value: coerce(Field::ComplaintTime, Value::Text(value.to_string()))?,
            },
            "within" | "last" => Filter::Compare {
                field: Field::ComplaintTime,
                op: CompareOp::Ge,
                value: Value::Time(
                    now.checked_sub_signed(parse_span(value)?)
                        .ok_or_else(|| Error::Query("Time arithmetic overflow".into()))?,
                ),
            },
            other => {
                return Err(Error::Query(format!("Unknown query key '{}'", other)));
            }
        };
        conditions.push(condition);
    }

    match conditions.len() {
        0 => Err(Error::Query("Empty query".into())),
        1 => Ok(conditions.remove(0)),
        _ => Ok(Filter::And(conditions)),
    }
}

/// Split on whitespace, keeping quoted runs together and dropping the quotes
fn split_words(input: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }
    if quote.is_some() {
        return Err(Error::Query("Unterminated quote".into()));
    }
    if !current.is_empty() {
        words.push(current);
    }
    Ok(words)
}

/// `3d`, `12h`, `2w`, `30m`; a bare number means days
fn parse_span(value: &str) -> Result<Duration> {
    let value = value.trim().to_lowercase();
    let (digits, unit) = match value.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((idx, _)) => value.split_at(idx),
        None => (value.as_str(), "d"),
    };
    let amount: i64 = digits
        .parse()
        .map_err(|_| Error::Query(format!("Invalid time span '{}'", value)))?;
    if amount > 100_000 {
        return Err(Error::Query(format!("Time span '{}' is too large", value)));
    }
    match unit {
        "m" => Ok(Duration::minutes(amount)),
        "h" => Ok(Duration::hours(amount)),
        "d" => Ok(Duration::days(amount)),
        "w" => Ok(Duration::weeks(amount)),
        other => Err(Error::Query(format!("Unknown time unit '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2024-03-10 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn time(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_parse_model_output() {
        let filter = parse_expression(
            "and_(Complaint.user_id == '123', Complaint.complaint_time >= datetime.now() - timedelta(days=3), Complaint.complaint_category == '电视')",
            now(),
        )
        .unwrap();

        assert_eq!(
            filter,
            Filter::And(vec![
                Filter::Compare {
                    field: Field::UserId,
                    op: CompareOp::Eq,
                    value: Value::Text("123".into()),
                },
                Filter::Compare {
                    field: Field::ComplaintTime,
                    op: CompareOp::Ge,
                    value: Value::Time(time("2024-03-07 12:00:00")),
                },
                Filter::Compare {
                    field: Field::ComplaintCategory,
                    op: CompareOp::Eq,
                    value: Value::Text("电视".into()),
                },
            ])
        );
    }

    #[test]
    fn test_single_comparison() {
        let filter = parse_expression("Complaint.complaint_category == \"冰箱\"", now()).unwrap();
        assert!(matches!(
            filter,
            Filter::Compare {
                field: Field::ComplaintCategory,
                op: CompareOp::Eq,
                ..
            }
        ));
    }

    #[test]
    fn test_reversed_operands_are_mirrored() {
        let filter = parse_expression("datetime(2024, 1, 1) < Complaint.complaint_time", now()).unwrap();
        assert_eq!(
            filter,
            Filter::Compare {
                field: Field::ComplaintTime,
                op: CompareOp::Gt,
                value: Value::Time(time("2024-01-01 00:00:00")),
            }
        );
    }

    #[test]
    fn test_operator_syntax() {
        let filter = parse_expression(
            "(Complaint.complaint_category == '电视') | ~(Complaint.reply == None) & Complaint.id > 5",
            now(),
        )
        .unwrap();
        match filter {
            Filter::Or(items) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(items[1], Filter::And(_)));
            }
            other => panic!("expected Or, got {:?}", other),
        }
    }

    #[test]
    fn test_methods() {
        let filter = parse_expression("Complaint.content.contains('漏水')", now()).unwrap();
        assert_eq!(
            filter,
            Filter::Text {
                field: Field::Content,
                op: TextMatch::Contains,
                pattern: "漏水".into(),
            }
        );

        let filter = parse_expression("Complaint.reply.is_(None)", now()).unwrap();
        assert_eq!(
            filter,
            Filter::IsNull {
                field: Field::Reply,
                negated: false,
            }
        );

        let filter =
            parse_expression("Complaint.complaint_category.in_(['电视', '冰箱'])", now()).unwrap();
        assert!(matches!(filter, Filter::In { negated: false, ref values, .. } if values.len() == 2));

        let filter = parse_expression(
            "Complaint.complaint_time.between('2024-01-01', datetime.now())",
            now(),
        )
        .unwrap();
        assert!(matches!(filter, Filter::And(ref items) if items.len() == 2));
    }

    #[test]
    fn test_null_comparisons() {
        assert_eq!(
            parse_expression("Complaint.reply != None", now()).unwrap(),
            Filter::IsNull {
                field: Field::Reply,
                negated: true,
            }
        );
        assert!(parse_expression("Complaint.reply > None", now()).is_err());
    }

    #[test]
    fn test_time_arithmetic() {
        let filter = parse_expression(
            "Complaint.complaint_time >= datetime.now() - timedelta(weeks=1, hours=12) + timedelta(minutes=30)",
            now(),
        )
        .unwrap();
        assert_eq!(
            filter,
            Filter::Compare {
                field: Field::ComplaintTime,
                op: CompareOp::Ge,
                value: Value::Time(time("2024-03-03 00:30:00")),
            }
        );

        let filter =
            parse_expression("Complaint.complaint_time >= date.today() - timedelta(1)", now())
                .unwrap();
        assert_eq!(
            filter,
            Filter::Compare {
                field: Field::ComplaintTime,
                op: CompareOp::Ge,
                value: Value::Time(time("2024-03-09 00:00:00")),
            }
        );
    }

    #[test]
    fn test_strptime() {
        let filter = parse_expression(
            "Complaint.complaint_time < datetime.strptime('2024-02-01', '%Y-%m-%d')",
            now(),
        )
        .unwrap();
        assert_eq!(
            filter,
            Filter::Compare {
                field: Field::ComplaintTime,
                op: CompareOp::Lt,
                value: Value::Time(time("2024-02-01 00:00:00")),
            }
        );
    }

    #[test]
    fn test_time_string_literal_coerced() {
        let filter =
            parse_expression("Complaint.complaint_time >= '2024-01-05 08:00:00'", now()).unwrap();
        assert_eq!(
            filter,
            Filter::Compare {
                field: Field::ComplaintTime,
                op: CompareOp::Ge,
                value: Value::Time(time("2024-01-05 08:00:00")),
            }
        );
    }

    #[test]
    fn test_rejects_symbols_outside_allow_list() {
        let cases = [
            "__import__('os').system('rm -rf /')",
            "Complaint.password == 'x'",
            "User.id == 1",
            "Complaint.content.upper() == 'X'",
            "and_(Complaint.id == 1, exec('x'))",
            "Complaint.complaint_time >= datetime.now() - os.environ",
            "Complaint.id == Complaint.user_id",
            "'a' == 'b'",
        ];
        for case in cases {
            let result = parse_expression(case, now());
            assert!(result.is_err(), "expected rejection for {}", case);
        }
    }

    #[test]
    fn test_rejects_type_mismatches() {
        assert!(parse_expression("Complaint.id == 'abc'", now()).is_err());
        assert!(parse_expression("Complaint.complaint_time >= 'soon'", now()).is_err());
        assert!(parse_expression("Complaint.content == datetime.now()", now()).is_err());
        assert!(parse_expression("Complaint.complaint_time.contains('x')", now()).is_err());
    }

    #[test]
    fn test_rejects_trailing_input() {
        let err = parse_expression("Complaint.id == 1 Complaint.id == 2", now()).unwrap_err();
        assert!(err.to_string().contains("after end of expression"));
    }

    #[test]
    fn test_rejects_unterminated_string() {
        assert!(parse_expression("Complaint.content == 'open", now()).is_err());
    }

    #[test]
    fn test_integer_user_id_becomes_text() {
        let filter = parse_expression("Complaint.user_id == 123", now()).unwrap();
        assert_eq!(
            filter,
            Filter::Compare {
                field: Field::UserId,
                op: CompareOp::Eq,
                value: Value::Text("123".into()),
            }
        );
    }

    #[test]
    fn test_shorthand() {
        let filter = parse_shorthand("category:电视 user：u1 within:3d", now()).unwrap();
        assert_eq!(
            filter,
            Filter::And(vec![
                Filter::Compare {
                    field: Field::ComplaintCategory,
                    op: CompareOp::Eq,
                    value: Value::Text("电视".into()),
                },
                Filter::Compare {
                    field: Field::UserId,
                    op: CompareOp::Eq,
                    value: Value::Text("u1".into()),
                },
                Filter::Compare {
                    field: Field::ComplaintTime,
                    op: CompareOp::Ge,
                    value: Value::Time(time("2024-03-07 12:00:00")),
                },
            ])
        );
    }

    #[test]
    fn test_shorthand_bare_words_and_quotes() {
        let filter = parse_shorthand("\"no picture\"", now()).unwrap();
        assert_eq!(
            filter,
            Filter::Text {
                field: Field::Content,
                op: TextMatch::Contains,
                pattern: "no picture".into(),
            }
        );

        let filter = parse_shorthand("reply:none", now()).unwrap();
        assert_eq!(
            filter,
            Filter::IsNull {
                field: Field::Reply,
                negated: false,
            }
        );
    }

    #[test]
    fn test_shorthand_errors() {
        assert!(parse_shorthand("color:red", now()).is_err());
        assert!(parse_shorthand("id:abc", now()).is_err());
        assert!(parse_shorthand("within:3y", now()).is_err());
        assert!(parse_shorthand("category:", now()).is_err());
    }

    #[test]
    fn test_parse_query_dispatch() {
        assert_eq!(parse_query("   ", now()).unwrap(), None);
        assert!(matches!(
            parse_query("complaint_category:electronics", now()),
            Err(Error::Query(_))
        ));
        assert!(matches!(
            parse_query("category:electronics", now()).unwrap(),
            Some(Filter::Compare { .. })
        ));
        assert!(matches!(
            parse_query("Complaint.id == 3", now()).unwrap(),
            Some(Filter::Compare { .. })
        ));
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let parens = format!("{}Complaint.id == 1{}", "(".repeat(5000), ")".repeat(5000));
        assert!(matches!(
            parse_expression(&parens, now()),
            Err(Error::Query(msg)) if msg.contains("nested too deeply")
        ));

        let tildes = format!("{}Complaint.id == 1", "~".repeat(3000));
        assert!(matches!(
            parse_expression(&tildes, now()),
            Err(Error::Query(_))
        ));

        let nots = format!("{}Complaint.id == 1{}", "not_(".repeat(2000), ")".repeat(2000));
        assert!(matches!(parse_expression(&nots, now()), Err(Error::Query(_))));

        // Goes through the public entry point as well
        assert!(matches!(parse_query(&tildes, now()), Err(Error::Query(_))));
    }

    #[test]
    fn test_moderate_nesting_allowed() {
        let input = format!("{}Complaint.id == 1{}", "(".repeat(10), ")".repeat(10));
        assert!(parse_expression(&input, now()).is_ok());

        let input = format!("{}Complaint.id == 1", "~".repeat(10));
        assert!(matches!(
            parse_expression(&input, now()).unwrap(),
            Filter::Not(_)
        ));
    }

    #[test]
    fn test_too_many_conditions_rejected() {
        let chain = vec!["Complaint.id == 1"; 1000].join(" | ");
        assert!(matches!(parse_expression(&chain, now()), Err(Error::Query(_))));

        let values = (0..1000).map(|n| n.to_string()).collect::<Vec<_>>().join(", ");
        let list = format!("Complaint.id.in_([{}])", values);
        assert!(matches!(parse_expression(&list, now()), Err(Error::Query(_))));

        let short = vec!["Complaint.id == 1"; 20].join(" | ");
        assert!(parse_expression(&short, now()).is_ok());
    }
}
