//! Expression tree consumed by the planner and the row evaluator.
//!
//! Nodes are built bottom-up by the parser and are immutable once a
//! statement owns them. Each node renders two ways: `Display` is the
//! normalized form, `ast_string` reproduces original-equivalent
//! syntax (quotes, parens) so a rendered tree re-parses to itself.

use std::sync::OnceLock;

use log::warn;

use crate::error::Result;
use crate::parse_err;
use crate::sql::func::Func;
use crate::sql::token::Pos;
use crate::sql::token::Token;
use crate::sql::token::TokenType;
use crate::value::ValueType;

/// Discriminant tag for dispatch without matching the whole variant.
/// Statement kinds share the tag space with expression nodes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NodeType {
    Identity,
    String,
    Number,
    Null,
    Func,
    Binary,
    Unary,
    Tri,
    MultiArg,
    SqlSelect,
    SqlInsert,
    SqlUpdate,
    SqlUpsert,
    SqlDelete,
    SqlShow,
    SqlDescribe,
    SqlPrepared,
    SqlSource,
    SqlWhere,
    SqlJoin,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Identity(IdentityNode),
    String(StringNode),
    Number(NumberNode),
    Null(NullNode),
    Unary(UnaryNode),
    Binary(BinaryNode),
    Tri(TriNode),
    MultiArg(MultiArgNode),
    Func(FuncNode),
}

impl Node {
    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Identity(_) => NodeType::Identity,
            Node::String(_) => NodeType::String,
            Node::Number(_) => NodeType::Number,
            Node::Null(_) => NodeType::Null,
            Node::Unary(_) => NodeType::Unary,
            Node::Binary(_) => NodeType::Binary,
            Node::Tri(_) => NodeType::Tri,
            Node::MultiArg(_) => NodeType::MultiArg,
            Node::Func(_) => NodeType::Func,
        }
    }

    pub fn position(&self) -> Pos {
        match self {
            Node::Identity(n) => n.pos,
            Node::String(n) => n.pos,
            Node::Number(n) => n.pos,
            Node::Null(n) => n.pos,
            Node::Unary(n) => n.pos,
            Node::Binary(n) => n.pos,
            Node::Tri(n) => n.pos,
            Node::MultiArg(n) => n.pos,
            Node::Func(n) => n.pos,
        }
    }

    /// Validates the whole subtree. The first failing node wins,
    /// nothing is aggregated.
    #[cfg_attr(feature = "recursive-protection", recursive::recursive)]
    pub fn check(&self) -> Result<()> {
        match self {
            Node::Identity(_) | Node::String(_) | Node::Number(_) | Node::Null(_) => Ok(()),
            Node::Unary(n) => n.arg.check(),
            Node::Binary(n) => {
                n.left.check()?;
                n.right.check()
            }
            Node::Tri(n) => n.check(),
            Node::MultiArg(n) => n.check(),
            Node::Func(n) => n.check(),
        }
    }

    /// Round-trip rendering: re-parsing the output yields a tree that
    /// renders to the same string.
    pub fn ast_string(&self) -> String {
        match self {
            Node::Identity(n) => n.ast_string(),
            Node::String(n) => n.ast_string(),
            Node::Number(n) => n.text.clone(),
            Node::Null(_) => "NULL".to_string(),
            Node::Unary(n) => n.ast_string(),
            Node::Binary(n) => n.render(true),
            Node::Tri(n) => n.render(true),
            Node::MultiArg(n) => n.render(true),
            Node::Func(n) => n.render(true),
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Identity(n) => f.write_str(&n.text),
            Node::String(n) => f.write_str(&n.text),
            Node::Number(n) => f.write_str(&n.text),
            Node::Null(_) => f.write_str("NULL"),
            Node::Unary(n) => f.write_str(&n.display_string()),
            Node::Binary(n) => f.write_str(&n.render(false)),
            Node::Tri(n) => f.write_str(&n.render(false)),
            Node::MultiArg(n) => f.write_str(&n.render(false)),
            Node::Func(n) => f.write_str(&n.render(false)),
        }
    }
}

/// Column, table or `table.column` reference.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityNode {
    pub pos: Pos,
    pub quote: u8,
    pub text: String,
    split: OnceLock<(String, String, bool)>,
}

impl IdentityNode {
    pub fn new(token: &Token) -> IdentityNode {
        IdentityNode {
            pos: token.pos,
            quote: token.quote,
            text: token.value.clone(),
            split: OnceLock::new(),
        }
    }

    /// Splits `left.right` qualification once and caches the result.
    /// A bare name has no right-hand side; more than one dot is
    /// ambiguous and is returned whole, also without a right side.
    pub fn left_right(&self) -> (&str, &str, bool) {
        let (left, right, has_right) = self.split.get_or_init(|| {
            let parts: Vec<&str> = self.text.split('.').collect();
            match parts.len() {
                2 => (parts[0].to_string(), parts[1].to_string(), true),
                _ => (self.text.clone(), String::new(), false),
            }
        });
        (left, right, *has_right)
    }

    pub fn is_boolean_identity(&self) -> bool {
        self.text.eq_ignore_ascii_case("true") || self.text.eq_ignore_ascii_case("false")
    }

    pub fn bool(&self) -> bool {
        self.text.eq_ignore_ascii_case("true")
    }

    pub fn ast_string(&self) -> String {
        if self.quote == 0 {
            return self.text.clone();
        }
        let q = self.quote as char;
        format!("{}{}{}", q, self.text, q)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringNode {
    pub pos: Pos,
    pub quote: u8,
    pub text: String,
}

impl StringNode {
    pub fn new(pos: Pos, text: impl Into<String>) -> StringNode {
        StringNode { pos, quote: 0, text: text.into() }
    }

    pub fn from_token(token: &Token) -> StringNode {
        StringNode { pos: token.pos, quote: token.quote, text: token.value.clone() }
    }

    pub fn ast_string(&self) -> String {
        if self.quote == 0 {
            return format!("{:?}", self.text);
        }
        let q = self.quote as char;
        format!("{}{}{}", q, self.text, q)
    }
}

/// Numeric literal, dual-stored. A literal that parses as an integer
/// also carries the float form; a float with no fractional part also
/// carries the integer form, so both flags are often true at once.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberNode {
    pub pos: Pos,
    pub is_int: bool,
    pub is_float: bool,
    pub int64: i64,
    pub float64: f64,
    pub text: String,
}

impl NumberNode {
    pub fn try_new(pos: Pos, text: impl Into<String>) -> Result<NumberNode> {
        let text = text.into();
        let mut n =
            NumberNode { pos, is_int: false, is_float: false, int64: 0, float64: 0.0, text };
        if let Some(i) = parse_int_text(&n.text) {
            n.is_int = true;
            n.int64 = i;
        }
        if let Ok(f) = n.text.parse::<f64>() {
            n.is_float = true;
            n.float64 = f;
            if !n.is_int && f == (f as i64) as f64 {
                n.is_int = true;
                n.int64 = f as i64;
            }
        }
        if !n.is_int && !n.is_float {
            return Err(parse_err!("illegal number syntax: {:?}", n.text));
        }
        if n.is_int && !n.is_float {
            n.is_float = true;
            n.float64 = n.int64 as f64;
        }
        Ok(n)
    }

    pub fn value(&self) -> crate::value::Value {
        if self.is_int {
            crate::value::Value::Integer(self.int64)
        } else {
            crate::value::Value::Float(self.float64)
        }
    }
}

/// Integer parsing with the lexer's base prefixes: 0x hex, 0b binary,
/// 0o or a bare leading zero octal, else decimal.
fn parse_int_text(text: &str) -> Option<i64> {
    let (neg, rest) = match text.as_bytes().first() {
        Some(b'+') => (false, &text[1..]),
        Some(b'-') => (true, &text[1..]),
        _ => (false, text),
    };
    let (radix, digits) = if let Some(d) = strip_prefix2(rest, "0x", "0X") {
        (16, d)
    } else if let Some(d) = strip_prefix2(rest, "0b", "0B") {
        (2, d)
    } else if let Some(d) = strip_prefix2(rest, "0o", "0O") {
        (8, d)
    } else if rest.len() > 1 && rest.starts_with('0') {
        (8, &rest[1..])
    } else {
        return text.parse::<i64>().ok();
    };
    if digits.is_empty() {
        return None;
    }
    let magnitude = i64::from_str_radix(digits, radix).ok()?;
    Some(if neg { -magnitude } else { magnitude })
}

fn strip_prefix2<'a>(s: &'a str, a: &str, b: &str) -> Option<&'a str> {
    s.strip_prefix(a).or_else(|| s.strip_prefix(b))
}

#[derive(Debug, Clone, PartialEq)]
pub struct NullNode {
    pub pos: Pos,
}

impl NullNode {
    pub fn new(pos: Pos) -> NullNode {
        NullNode { pos }
    }
}

/// One operand: `NOT x`, `-x`, or `op(x)` for anything else.
#[derive(Debug, Clone)]
pub struct UnaryNode {
    pub pos: Pos,
    pub arg: Box<Node>,
    pub op: Token,
}

impl UnaryNode {
    pub fn new(op: Token, arg: Node) -> UnaryNode {
        UnaryNode { pos: op.pos, arg: Box::new(arg), op }
    }

    fn display_string(&self) -> String {
        match self.op.ttype {
            TokenType::Not => format!("NOT {}", self.arg),
            TokenType::Minus => format!("-{}", self.arg),
            _ => format!("{}({})", self.op.value, self.arg),
        }
    }

    pub fn ast_string(&self) -> String {
        match self.op.ttype {
            TokenType::Not => format!("NOT {}", self.arg.ast_string()),
            TokenType::Minus => format!("-{}", self.arg.ast_string()),
            _ => format!("{}({})", self.op.value, self.arg.ast_string()),
        }
    }
}

/// Two operands. The paren flag records explicit parenthesization so
/// rendering reproduces it.
#[derive(Debug, Clone)]
pub struct BinaryNode {
    pub pos: Pos,
    pub paren: bool,
    pub left: Box<Node>,
    pub right: Box<Node>,
    pub op: Token,
}

impl BinaryNode {
    pub fn new(op: Token, left: Node, right: Node) -> BinaryNode {
        BinaryNode { pos: op.pos, paren: false, left: Box::new(left), right: Box::new(right), op }
    }

    /// A simple binary compares only identities and string literals,
    /// which makes it safe to hand to a backend as a push-down filter.
    pub fn is_simple(&self) -> bool {
        let simple = |n: &Node| matches!(n, Node::Identity(_) | Node::String(_));
        simple(&self.left) && simple(&self.right)
    }

    fn render(&self, ast: bool) -> String {
        let (l, r) = if ast {
            (self.left.ast_string(), self.right.ast_string())
        } else {
            (self.left.to_string(), self.right.to_string())
        };
        if self.paren {
            format!("({} {} {})", l, self.op.value, r)
        } else {
            format!("{} {} {}", l, self.op.value, r)
        }
    }
}

/// Three operands with fixed `x BETWEEN low AND high` semantics.
#[derive(Debug, Clone)]
pub struct TriNode {
    pub pos: Pos,
    pub args: Vec<Node>,
    pub op: Token,
}

impl TriNode {
    pub fn new(op: Token, a: Node, b: Node, c: Node) -> TriNode {
        TriNode { pos: op.pos, args: vec![a, b, c], op }
    }

    pub fn check(&self) -> Result<()> {
        if self.args.len() != 3 {
            return Err(parse_err!("{} expects 3 args, got {}", self.op.value, self.args.len()));
        }
        for arg in &self.args {
            arg.check()?;
        }
        Ok(())
    }

    fn render(&self, ast: bool) -> String {
        let s = |n: &Node| if ast { n.ast_string() } else { n.to_string() };
        format!("{} BETWEEN {} AND {}", s(&self.args[0]), s(&self.args[1]), s(&self.args[2]))
    }
}

/// Variadic operator node. The first arg is the probe value, the rest
/// are candidates: `x IN (a,b,c)`.
#[derive(Debug, Clone)]
pub struct MultiArgNode {
    pub pos: Pos,
    pub args: Vec<Node>,
    pub op: Token,
}

impl MultiArgNode {
    pub fn new(op: Token) -> MultiArgNode {
        MultiArgNode { pos: op.pos, args: Vec::new(), op }
    }

    pub fn with_args(op: Token, args: Vec<Node>) -> MultiArgNode {
        MultiArgNode { pos: op.pos, args, op }
    }

    pub fn push(&mut self, arg: Node) {
        self.args.push(arg);
    }

    pub fn check(&self) -> Result<()> {
        if self.args.len() < 2 {
            return Err(parse_err!(
                "{} expects a probe value and at least one candidate",
                self.op.value
            ));
        }
        for arg in &self.args {
            arg.check()?;
        }
        Ok(())
    }

    fn render(&self, ast: bool) -> String {
        let s = |n: &Node| if ast { n.ast_string() } else { n.to_string() };
        let candidates = self.args[1..].iter().map(s).collect::<Vec<_>>().join(",");
        format!("{} {} ({})", s(&self.args[0]), self.op.value, candidates)
    }
}

/// Function call bound to its descriptor by name lookup at parse time.
#[derive(Debug, Clone)]
pub struct FuncNode {
    pub pos: Pos,
    pub name: String,
    pub func: Func,
    pub args: Vec<Node>,
}

impl FuncNode {
    /// Looks the function up in the builtin registry; unknown names
    /// are rejected here, never at evaluation time.
    pub fn try_new(pos: Pos, name: impl Into<String>) -> Result<FuncNode> {
        let name = name.into();
        let func = crate::sql::func::lookup(&name)
            .ok_or_else(|| parse_err!("non existent function {}", name))?;
        Ok(FuncNode { pos, name, func, args: Vec::new() })
    }

    pub fn new(pos: Pos, name: impl Into<String>, func: Func) -> FuncNode {
        FuncNode { pos, name: name.into(), func, args: Vec::new() }
    }

    pub fn push_arg(&mut self, arg: Node) {
        self.args.push(arg);
    }

    pub fn check(&self) -> Result<()> {
        if self.args.len() < self.func.args.len() && !self.func.variadic {
            return Err(parse_err!("not enough arguments for {}", self.name));
        }
        if self.args.len() > self.func.args.len() && !self.func.variadic {
            return Err(parse_err!("too many arguments for {}", self.name));
        }
        for (i, arg) in self.args.iter().enumerate() {
            arg.check()?;
            // Variadic tail args are checked against no declared kind.
            let declared = match self.func.args.get(i) {
                Some(kind) => kind,
                None => continue,
            };
            if *declared == ValueType::Unknown {
                continue;
            }
            let inferred = value_type_from_node(Some(arg));
            if inferred == ValueType::Unknown {
                continue;
            }
            if *declared != inferred && !(declared.is_numeric() && inferred.is_numeric()) {
                return Err(parse_err!(
                    "bad argument {} to {}: want {}, got {}",
                    i,
                    self.name,
                    declared,
                    inferred
                ));
            }
        }
        Ok(())
    }

    fn render(&self, ast: bool) -> String {
        let s = |n: &Node| if ast { n.ast_string() } else { n.to_string() };
        let args = self.args.iter().map(s).collect::<Vec<_>>().join(", ");
        format!("{}({})", self.name, args)
    }
}

/// Infers the value kind an expression produces, from shape alone.
/// Inference never fails: shapes it cannot classify come back as
/// `Unknown`, with a warning for operator shapes that should be
/// classifiable.
pub fn value_type_from_node(node: Option<&Node>) -> ValueType {
    let node = match node {
        Some(node) => node,
        None => return ValueType::Unknown,
    };
    match node {
        Node::Identity(_) | Node::String(_) => ValueType::String,
        Node::Number(_) => ValueType::Float,
        Node::Binary(b) => match b.op.ttype {
            TokenType::And | TokenType::Or => ValueType::Boolean,
            TokenType::Mul | TokenType::Minus | TokenType::Plus | TokenType::Div => {
                ValueType::Float
            }
            TokenType::Mod => ValueType::Integer,
            _ => {
                warn!("unknown binary value type for operator {}", b.op.value);
                ValueType::Unknown
            }
        },
        Node::Func(_) => ValueType::Unknown,
        _ => {
            warn!("unknown value type for node {}", node);
            ValueType::Unknown
        }
    }
}

/// First identity under the node: depth-first, always descending the
/// first branch only, never exploring siblings.
pub fn find_identity_field(node: &Node) -> Option<&str> {
    match node {
        Node::Identity(id) => Some(&id.text),
        Node::Binary(b) => find_identity_field(&b.left),
        Node::Func(f) => f.args.first().and_then(find_identity_field),
        _ => None,
    }
}

const MAX_ALIAS_DEPTH: usize = 10;

/// Synthesizes an alias for an unaliased expression column by joining
/// the nearest function name with the first identity underneath:
/// `min(year)` becomes `min_year`. Recursion is capped; past the cap
/// the alias is empty rather than an error.
pub fn find_identity_name(depth: usize, node: &Node, prefix: &str) -> String {
    if depth > MAX_ALIAS_DEPTH {
        return String::new();
    }
    match node {
        Node::Identity(id) => {
            if prefix.is_empty() {
                id.text.clone()
            } else {
                format!("{}_{}", prefix, id.text)
            }
        }
        Node::Binary(b) => find_identity_name(depth + 1, &b.left, prefix),
        Node::Func(f) => match f.args.first() {
            Some(arg) => find_identity_name(depth + 1, arg, &f.name.to_lowercase()),
            None => String::new(),
        },
        _ => String::new(),
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::error::Error;

    pub fn ident(text: &str) -> Node {
        Node::Identity(IdentityNode::new(&Token::new(TokenType::Identity, text, 0)))
    }

    pub fn string(text: &str) -> Node {
        Node::String(StringNode::new(0, text))
    }

    pub fn number(text: &str) -> Node {
        Node::Number(NumberNode::try_new(0, text).unwrap())
    }

    pub fn binary(op: TokenType, left: Node, right: Node) -> Node {
        Node::Binary(BinaryNode::new(Token::op(op, 0), left, right))
    }

    #[test]
    fn test_number_dual_parse() -> Result<()> {
        let n = NumberNode::try_new(0, "5")?;
        assert!(n.is_int);
        assert!(n.is_float);
        assert_eq!(5, n.int64);
        assert_eq!(5.0, n.float64);

        // float with no fractional part back-promotes to an integer
        let n = NumberNode::try_new(0, "5.0")?;
        assert!(n.is_int);
        assert!(n.is_float);
        assert_eq!(5, n.int64);

        let n = NumberNode::try_new(0, "1e3")?;
        assert!(n.is_int);
        assert_eq!(1000, n.int64);
        assert_eq!(1000.0, n.float64);

        let n = NumberNode::try_new(0, "3.14")?;
        assert!(!n.is_int);
        assert!(n.is_float);
        assert_eq!(3.14, n.float64);

        let n = NumberNode::try_new(0, "-42")?;
        assert_eq!(-42, n.int64);

        Ok(())
    }

    #[test]
    fn test_number_base_prefixes() -> Result<()> {
        assert_eq!(0x22, NumberNode::try_new(0, "0x22")?.int64);
        assert_eq!(0b101, NumberNode::try_new(0, "0b101")?.int64);
        assert_eq!(0o17, NumberNode::try_new(0, "0o17")?.int64);
        assert_eq!(0o17, NumberNode::try_new(0, "017")?.int64);
        assert_eq!(-0x10, NumberNode::try_new(0, "-0x10")?.int64);
        Ok(())
    }

    #[test]
    fn test_number_invalid() {
        for text in ["abc", "1.2.3", "0x", ""] {
            let err = NumberNode::try_new(0, text).unwrap_err();
            assert!(matches!(err, Error::Parse(_)), "{:?} should fail parse", text);
        }
    }

    #[test]
    fn test_left_right() {
        let id = IdentityNode::new(&Token::new(TokenType::Identity, "t.c", 0));
        assert_eq!(("t", "c", true), id.left_right());
        // memoized: second call returns the same values
        assert_eq!(("t", "c", true), id.left_right());

        let id = IdentityNode::new(&Token::new(TokenType::Identity, "c", 0));
        assert_eq!(("c", "", false), id.left_right());

        // more than one dot is ambiguous and comes back whole
        let id = IdentityNode::new(&Token::new(TokenType::Identity, "a.b.c", 0));
        assert_eq!(("a.b.c", "", false), id.left_right());
    }

    #[test]
    fn test_boolean_identity() {
        let id = IdentityNode::new(&Token::new(TokenType::Identity, "TRUE", 0));
        assert!(id.is_boolean_identity());
        assert!(id.bool());
        let id = IdentityNode::new(&Token::new(TokenType::Identity, "false", 0));
        assert!(id.is_boolean_identity());
        assert!(!id.bool());
        let id = IdentityNode::new(&Token::new(TokenType::Identity, "name", 0));
        assert!(!id.is_boolean_identity());
    }

    #[test]
    fn test_render_forms() {
        let id = IdentityNode::new(&Token::quoted(TokenType::Identity, "user name", 0, b'`'));
        assert_eq!("user name", Node::Identity(id.clone()).to_string());
        assert_eq!("`user name`", id.ast_string());

        let s = StringNode::new(0, "bob");
        assert_eq!("bob", Node::String(s.clone()).to_string());
        assert_eq!("\"bob\"", s.ast_string());

        let n = binary(TokenType::Gt, ident("age"), number("21"));
        assert_eq!("age > 21", n.to_string());
        assert_eq!("age > 21", n.ast_string());

        let mut b = BinaryNode::new(Token::op(TokenType::Gt, 0), ident("age"), number("21"));
        b.paren = true;
        let n = Node::Binary(b);
        assert_eq!("(age > 21)", n.ast_string());

        let n = Node::Unary(UnaryNode::new(Token::op(TokenType::Not, 0), ident("active")));
        assert_eq!("NOT active", n.to_string());

        let n = Node::Tri(TriNode::new(
            Token::op(TokenType::Between, 0),
            ident("age"),
            number("18"),
            number("65"),
        ));
        assert_eq!("age BETWEEN 18 AND 65", n.to_string());

        let n = Node::MultiArg(MultiArgNode::with_args(
            Token::op(TokenType::In, 0),
            vec![ident("city"), string("sf"), string("nyc")],
        ));
        assert_eq!("city IN (sf,nyc)", n.to_string());
        assert_eq!("city IN (\"sf\",\"nyc\")", n.ast_string());
    }

    #[test]
    fn test_is_simple() {
        let n = BinaryNode::new(Token::op(TokenType::Eq, 0), ident("name"), string("bob"));
        assert!(n.is_simple());
        let n = BinaryNode::new(Token::op(TokenType::Eq, 0), ident("age"), number("3"));
        assert!(!n.is_simple());
    }

    #[test]
    fn test_func_check_arity() -> Result<()> {
        let mut f = FuncNode::try_new(0, "upper")?;
        let err = f.check().unwrap_err();
        assert!(err.to_string().contains("not enough arguments"));

        f.push_arg(ident("name"));
        f.check()?;

        f.push_arg(ident("extra"));
        let err = f.check().unwrap_err();
        assert!(err.to_string().contains("too many arguments"));
        Ok(())
    }

    #[test]
    fn test_func_check_kinds() -> Result<()> {
        // length declares a string argument; an arithmetic binary
        // infers float and must be rejected.
        let mut f = FuncNode::try_new(0, "length")?;
        f.push_arg(binary(TokenType::Plus, ident("a"), ident("b")));
        let err = f.check().unwrap_err();
        assert!(err.to_string().contains("bad argument"));

        let mut f = FuncNode::try_new(0, "length")?;
        f.push_arg(string("hello"));
        f.check()?;
        Ok(())
    }

    #[test]
    fn test_func_unknown_name() {
        let err = FuncNode::try_new(0, "no_such_fn").unwrap_err();
        assert!(err.to_string().contains("non existent function"));
    }

    #[test]
    fn test_check_recurses_to_children() -> Result<()> {
        // the failing func node sits two levels down
        let mut f = FuncNode::try_new(0, "upper")?;
        f.push_arg(ident("name"));
        f.push_arg(ident("oops"));
        let bad = Node::Binary(BinaryNode::new(
            Token::op(TokenType::And, 0),
            binary(TokenType::Gt, ident("age"), number("21")),
            Node::Func(f),
        ));
        assert!(bad.check().is_err());
        Ok(())
    }

    #[test]
    fn test_value_type_inference() {
        let and = binary(TokenType::And, string("a"), string("b"));
        assert_eq!(ValueType::Boolean, value_type_from_node(Some(&and)));

        let or = binary(TokenType::Or, ident("a"), ident("b"));
        assert_eq!(ValueType::Boolean, value_type_from_node(Some(&or)));

        let add = binary(TokenType::Plus, ident("a"), number("1"));
        assert_eq!(ValueType::Float, value_type_from_node(Some(&add)));

        let modulus = binary(TokenType::Mod, ident("a"), number("2"));
        assert_eq!(ValueType::Integer, value_type_from_node(Some(&modulus)));

        assert_eq!(ValueType::String, value_type_from_node(Some(&ident("a"))));
        assert_eq!(ValueType::Float, value_type_from_node(Some(&number("1"))));
        assert_eq!(ValueType::Unknown, value_type_from_node(None));
    }

    #[test]
    fn test_find_identity_field() {
        let n = binary(TokenType::Gt, ident("age"), number("21"));
        assert_eq!(Some("age"), find_identity_field(&n));

        // first-branch descent only: an identity on the right side of
        // a left branch without one is not found
        let n = binary(TokenType::Gt, number("21"), ident("age"));
        assert_eq!(None, find_identity_field(&n));

        assert_eq!(None, find_identity_field(&number("1")));
    }

    #[test]
    fn test_find_identity_name() -> Result<()> {
        let mut f = FuncNode::try_new(0, "min")?;
        f.push_arg(ident("year"));
        assert_eq!("min_year", find_identity_name(0, &Node::Func(f), ""));

        let n = binary(TokenType::Gt, ident("age"), number("21"));
        assert_eq!("age", find_identity_name(0, &n, ""));

        // past the depth cap the alias is empty
        let mut deep = ident("x");
        for _ in 0..12 {
            deep = binary(TokenType::Plus, deep, number("1"));
        }
        assert_eq!("", find_identity_name(0, &deep, ""));
        Ok(())
    }

    // A tiny expression parser over the rendered syntax, enough to
    // prove ast_string round-trips: parse(ast_string(t)) renders the
    // identical string.
    mod reparse {
        use super::*;

        pub fn parse(input: &str) -> Result<Node> {
            let mut p = P { src: input.as_bytes(), at: 0 };
            let node = p.expr()?;
            p.ws();
            if p.at != p.src.len() {
                return Err(parse_err!("trailing input at {}", p.at));
            }
            Ok(node)
        }

        struct P<'a> {
            src: &'a [u8],
            at: usize,
        }

        impl<'a> P<'a> {
            fn ws(&mut self) {
                while self.at < self.src.len() && self.src[self.at] == b' ' {
                    self.at += 1;
                }
            }

            fn expr(&mut self) -> Result<Node> {
                let mut node = self.term()?;
                loop {
                    self.ws();
                    let op = match self.op() {
                        Some(op) => op,
                        None => return Ok(node),
                    };
                    let right = self.term()?;
                    node = Node::Binary(BinaryNode::new(op, node, right));
                }
            }

            fn term(&mut self) -> Result<Node> {
                self.ws();
                if self.at >= self.src.len() {
                    return Err(parse_err!("unexpected end of input"));
                }
                let pos = self.at as Pos;
                match self.src[self.at] {
                    b'(' => {
                        self.at += 1;
                        let mut inner = self.expr()?;
                        self.ws();
                        if self.at >= self.src.len() || self.src[self.at] != b')' {
                            return Err(parse_err!("expected closing paren"));
                        }
                        self.at += 1;
                        if let Node::Binary(b) = &mut inner {
                            b.paren = true;
                        }
                        Ok(inner)
                    }
                    q @ (b'"' | b'\'' | b'`') => {
                        self.at += 1;
                        let start = self.at;
                        while self.at < self.src.len() && self.src[self.at] != q {
                            self.at += 1;
                        }
                        let text = std::str::from_utf8(&self.src[start..self.at])
                            .map_err(|e| parse_err!("{}", e))?
                            .to_string();
                        self.at += 1;
                        if q == b'`' {
                            let tok = Token::quoted(TokenType::Identity, text, pos, q);
                            Ok(Node::Identity(IdentityNode::new(&tok)))
                        } else {
                            let tok = Token::quoted(TokenType::String, text, pos, q);
                            Ok(Node::String(StringNode::from_token(&tok)))
                        }
                    }
                    c if c.is_ascii_digit() || c == b'-' => {
                        let text = self.word();
                        Ok(Node::Number(NumberNode::try_new(pos, text)?))
                    }
                    _ => {
                        let text = self.word();
                        let tok = Token::new(TokenType::Identity, text, pos);
                        Ok(Node::Identity(IdentityNode::new(&tok)))
                    }
                }
            }

            fn word(&mut self) -> String {
                let start = self.at;
                while self.at < self.src.len()
                    && !matches!(self.src[self.at], b' ' | b'(' | b')')
                {
                    self.at += 1;
                }
                String::from_utf8_lossy(&self.src[start..self.at]).to_string()
            }

            fn op(&mut self) -> Option<Token> {
                let rest = &self.src[self.at..];
                let table: [(&[u8], TokenType); 12] = [
                    (b"AND ", TokenType::And),
                    (b"OR ", TokenType::Or),
                    (b">=", TokenType::GtEq),
                    (b"<=", TokenType::LtEq),
                    (b"!=", TokenType::Neq),
                    (b"=", TokenType::Eq),
                    (b">", TokenType::Gt),
                    (b"<", TokenType::Lt),
                    (b"+", TokenType::Plus),
                    (b"*", TokenType::Mul),
                    (b"/", TokenType::Div),
                    (b"%", TokenType::Mod),
                ];
                for (text, ttype) in table {
                    if rest.starts_with(text) {
                        let pos = self.at as Pos;
                        self.at += ttype.to_str().len();
                        return Some(Token::op(ttype, pos));
                    }
                }
                None
            }
        }
    }

    #[test]
    fn test_ast_string_round_trip() -> Result<()> {
        let cases = [
            "name",
            "`user name`",
            "\"bob\"",
            "5",
            "3.14",
            "0x22",
            "age > 21",
            "(age > 21)",
            "name = \"bob\" AND age >= 21",
            "(a + 1) * 2",
            "t.c != \"x\"",
        ];
        for case in cases {
            let once = reparse::parse(case)?.ast_string();
            let twice = reparse::parse(&once)?.ast_string();
            assert_eq!(once, twice, "round trip diverged for {:?}", case);
        }
        Ok(())
    }
}
