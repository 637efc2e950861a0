//! SQL tokens - the atomic units of SQL output.
//!
//! Tokens are dialect-agnostic; they serialize to dialect-specific strings.
//! Every user-supplied value reaches the output exclusively through
//! [`Token::Placeholder`] - never through [`Token::LitString`]/[`Token::LitInt`],
//! which exist only for internal, non-user-controlled constants (grouping
//! ordinals, granularity literals baked in by the compiler itself).

use super::dialect::{Dialect, SqlDialect};

/// SQL token - every element that can appear in a compiled statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Select,
    From,
    Where,
    And,
    Or,
    Not,
    As,
    On,
    Join,
    Inner,
    Left,
    Right,
    Full,
    Outer,
    Cross,
    GroupBy,
    Having,
    OrderBy,
    Asc,
    Desc,
    Limit,
    Offset,
    Case,
    When,
    Then,
    Else,
    End,
    In,
    Between,
    Like,
    IsNull,
    IsNotNull,
    Distinct,
    With,
    Recursive,
    Exists,
    Null,
    True,
    False,

    Over,
    PartitionBy,

    Comma,
    Dot,
    Star,
    LParen,
    RParen,

    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    Concat,

    Space,
    Newline,
    Indent(usize),

    /// Unqualified identifier: column, alias, CTE name.
    Ident(String),
    /// table.column, or bare column if `table` is `None`.
    QualifiedIdent { table: Option<String>, name: String },

    /// Internal integer constant (never a user value).
    LitInt(i64),
    /// Internal float constant (never a user value).
    LitFloat(f64),
    /// Internal string constant (never a user value) - e.g. a granularity
    /// keyword baked into a `DATE_TRUNC` call.
    LitString(String),
    LitBool(bool),
    LitNull,

    /// A bound parameter. `index` is 0-based into the compilation's
    /// parameter list; rendering maps it to the dialect's placeholder style.
    Placeholder(usize),

    /// Function/operator name, uppercased at render time.
    FunctionName(String),

    /// Raw, trusted SQL text emitted verbatim.
    ///
    /// # Security
    ///
    /// Never construct this from a user-supplied value. Only static,
    /// compiler-authored fragments (dialect keywords, frame clauses) may
    /// use this escape hatch.
    Raw(String),
}

impl Token {
    /// Serialize this token to text for the given dialect.
    pub fn serialize(&self, dialect: Dialect) -> String {
        match self {
            Token::Select => "SELECT".into(),
            Token::From => "FROM".into(),
            Token::Where => "WHERE".into(),
            Token::And => "AND".into(),
            Token::Or => "OR".into(),
            Token::Not => "NOT".into(),
            Token::As => "AS".into(),
            Token::On => "ON".into(),
            Token::Join => "JOIN".into(),
            Token::Inner => "INNER".into(),
            Token::Left => "LEFT".into(),
            Token::Right => "RIGHT".into(),
            Token::Full => "FULL".into(),
            Token::Outer => "OUTER".into(),
            Token::Cross => "CROSS".into(),
            Token::GroupBy => "GROUP BY".into(),
            Token::Having => "HAVING".into(),
            Token::OrderBy => "ORDER BY".into(),
            Token::Asc => "ASC".into(),
            Token::Desc => "DESC".into(),
            Token::Limit => "LIMIT".into(),
            Token::Offset => "OFFSET".into(),
            Token::Case => "CASE".into(),
            Token::When => "WHEN".into(),
            Token::Then => "THEN".into(),
            Token::Else => "ELSE".into(),
            Token::End => "END".into(),
            Token::In => "IN".into(),
            Token::Between => "BETWEEN".into(),
            Token::Like => "LIKE".into(),
            Token::IsNull => "IS NULL".into(),
            Token::IsNotNull => "IS NOT NULL".into(),
            Token::Distinct => "DISTINCT".into(),
            Token::With => "WITH".into(),
            Token::Recursive => "RECURSIVE".into(),
            Token::Exists => "EXISTS".into(),
            Token::Null => "NULL".into(),
            Token::True => "TRUE".into(),
            Token::False => "FALSE".into(),

            Token::Over => "OVER".into(),
            Token::PartitionBy => "PARTITION BY".into(),

            Token::Comma => ",".into(),
            Token::Dot => ".".into(),
            Token::Star => "*".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),

            Token::Eq => "=".into(),
            Token::Ne => "<>".into(),
            Token::Lt => "<".into(),
            Token::Gt => ">".into(),
            Token::Lte => "<=".into(),
            Token::Gte => ">=".into(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Mul => "*".into(),
            Token::Div => "/".into(),
            Token::Mod => "%".into(),
            Token::Concat => dialect.concat_operator().into(),

            Token::Space => " ".into(),
            Token::Newline => "\n".into(),
            Token::Indent(n) => "  ".repeat(*n),

            Token::Ident(name) => dialect.quote_identifier(name),
            Token::QualifiedIdent { table, name } => match table {
                Some(t) => format!(
                    "{}.{}",
                    dialect.quote_identifier(t),
                    dialect.quote_identifier(name)
                ),
                None => dialect.quote_identifier(name),
            },

            Token::LitInt(n) => n.to_string(),
            Token::LitFloat(f) => {
                if f.is_nan() || f.is_infinite() {
                    panic!("cannot serialize non-finite float literal to SQL");
                }
                format!("{}", f)
            }
            Token::LitString(s) => dialect.quote_string(s),
            Token::LitBool(b) => dialect.format_bool(*b).into(),
            Token::LitNull => "NULL".into(),

            Token::Placeholder(index) => dialect.format_placeholder(*index),

            Token::FunctionName(name) => match dialect.remap_function(name) {
                Some(remapped) => remapped.to_uppercase(),
                None => name.to_uppercase(),
            },

            Token::Raw(s) => s.clone(),
        }
    }
}

/// A stream of tokens that serializes to one dialect's SQL text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    pub fn new() -> Self {
        Self { tokens: vec![] }
    }

    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    pub fn extend(&mut self, tokens: impl IntoIterator<Item = Token>) -> &mut Self {
        self.tokens.extend(tokens);
        self
    }

    pub fn append(&mut self, other: &TokenStream) -> &mut Self {
        self.tokens.extend(other.tokens.iter().cloned());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn serialize(&self, dialect: Dialect) -> String {
        self.tokens.iter().map(|t| t.serialize(dialect)).collect()
    }

    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }
    pub fn comma(&mut self) -> &mut Self {
        self.push(Token::Comma)
    }
    pub fn lparen(&mut self) -> &mut Self {
        self.push(Token::LParen)
    }
    pub fn rparen(&mut self) -> &mut Self {
        self.push(Token::RParen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_serialize() {
        assert_eq!(Token::Select.serialize(Dialect::DuckDb), "SELECT");
        assert_eq!(Token::GroupBy.serialize(Dialect::Sqlite), "GROUP BY");
    }

    #[test]
    fn test_ident_quoting_per_dialect() {
        let tok = Token::Ident("users".into());
        assert_eq!(tok.serialize(Dialect::DuckDb), "\"users\"");
        assert_eq!(tok.serialize(Dialect::Postgres), "\"users\"");
        assert_eq!(tok.serialize(Dialect::MySql), "`users`");
        assert_eq!(tok.serialize(Dialect::Sqlite), "\"users\"");
    }

    #[test]
    fn test_placeholder_styles() {
        assert_eq!(
            Token::Placeholder(0).serialize(Dialect::Postgres),
            "$1"
        );
        assert_eq!(Token::Placeholder(0).serialize(Dialect::MySql), "?");
        assert_eq!(Token::Placeholder(2).serialize(Dialect::Sqlite), "?");
        assert_eq!(Token::Placeholder(0).serialize(Dialect::DuckDb), "$1");
    }

    #[test]
    fn test_token_stream_serialize() {
        let mut ts = TokenStream::new();
        ts.push(Token::Select)
            .space()
            .push(Token::Ident("name".into()))
            .space()
            .push(Token::From)
            .space()
            .push(Token::Ident("users".into()));

        assert_eq!(
            ts.serialize(Dialect::Postgres),
            "SELECT \"name\" FROM \"users\""
        );
    }
}
