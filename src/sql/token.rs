//! The boundary with the external lexer. The engine never tokenizes
//! text itself; it consumes tokens the lexer produced and keeps them
//! in the tree for rendering and operator dispatch.

/// Byte offset of a token or node in the original statement text.
pub type Pos = u32;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TokenType {
    // Value-carrying kinds
    Identity,
    Number,
    String,
    Null,

    // Operators
    And,
    Or,
    Not,
    Eq,
    Neq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    Like,
    In,
    Between,

    // Keywords the planner dispatches on
    Select,
    From,
    Where,
    As,
    Join,
    Inner,
    Outer,
    Left,
    Right,
    On,
}

impl TokenType {
    pub fn to_str(&self) -> &'static str {
        match self {
            TokenType::Identity => "IDENTITY",
            TokenType::Number => "NUMBER",
            TokenType::String => "STRING",
            TokenType::Null => "NULL",
            TokenType::And => "AND",
            TokenType::Or => "OR",
            TokenType::Not => "NOT",
            TokenType::Eq => "=",
            TokenType::Neq => "!=",
            TokenType::Gt => ">",
            TokenType::GtEq => ">=",
            TokenType::Lt => "<",
            TokenType::LtEq => "<=",
            TokenType::Plus => "+",
            TokenType::Minus => "-",
            TokenType::Mul => "*",
            TokenType::Div => "/",
            TokenType::Mod => "%",
            TokenType::Like => "LIKE",
            TokenType::In => "IN",
            TokenType::Between => "BETWEEN",
            TokenType::Select => "SELECT",
            TokenType::From => "FROM",
            TokenType::Where => "WHERE",
            TokenType::As => "AS",
            TokenType::Join => "JOIN",
            TokenType::Inner => "INNER",
            TokenType::Outer => "OUTER",
            TokenType::Left => "LEFT",
            TokenType::Right => "RIGHT",
            TokenType::On => "ON",
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

/// One lexed token: its kind, the raw text, where it started, and the
/// quote byte (0 for unquoted) so renderers can reproduce the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub ttype: TokenType,
    pub value: String,
    pub pos: Pos,
    pub quote: u8,
}

impl Token {
    pub fn new(ttype: TokenType, value: impl Into<String>, pos: Pos) -> Token {
        Token { ttype, value: value.into(), pos, quote: 0 }
    }

    pub fn quoted(ttype: TokenType, value: impl Into<String>, pos: Pos, quote: u8) -> Token {
        Token { ttype, value: value.into(), pos, quote }
    }

    /// An operator token rendered by its canonical text.
    pub fn op(ttype: TokenType, pos: Pos) -> Token {
        Token { ttype, value: ttype.to_str().to_string(), pos, quote: 0 }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.quote != 0 {
            let q = self.quote as char;
            write!(f, "{}{}{}", q, self.value, q)
        } else {
            f.write_str(&self.value)
        }
    }
}
