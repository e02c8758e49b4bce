//! Row-wise expression evaluation. Walks the node tree against one
//! row at a time, with SQL null propagation through arithmetic,
//! comparison and boolean operators.

use crate::error::Error;
use crate::error::Result;
use crate::row::Row;
use crate::sql::node::BinaryNode;
use crate::sql::node::IdentityNode;
use crate::sql::node::MultiArgNode;
use crate::sql::node::Node;
use crate::sql::node::TriNode;
use crate::sql::node::UnaryNode;
use crate::sql::token::TokenType;
use crate::value::Value;
use crate::value_err;

macro_rules! arithmetic_op {
    ($lhs:expr,$op:tt,$rhs:expr) => {{
        match ($lhs, $rhs) {
            (Value::Integer(lhs), Value::Integer(rhs)) => Ok(Value::Integer(lhs $op rhs)),
            (Value::Integer(lhs), Value::Float(rhs)) => Ok(Value::Float(lhs as f64 $op rhs)),
            (Value::Integer(_), Value::Null) => Ok(Value::Null),
            (Value::Float(lhs), Value::Integer(rhs)) => Ok(Value::Float(lhs $op rhs as f64)),
            (Value::Float(lhs), Value::Float(rhs)) => Ok(Value::Float(lhs $op rhs)),
            (Value::Float(_), Value::Null) => Ok(Value::Null),
            (Value::Null, Value::Float(_)) => Ok(Value::Null),
            (Value::Null, Value::Integer(_)) => Ok(Value::Null),
            (Value::Null, Value::Null) => Ok(Value::Null),
            (lhs, rhs) => {
                Err(value_err!("Can't {} {} and {}", stringify!($op), lhs, rhs))
            }
        }
    }};
}

macro_rules! compare_op {
    ($lhs:expr,$op:tt,$rhs:expr) => {{
        match ($lhs, $rhs) {
            (Value::Boolean(lhs), Value::Boolean(rhs)) => Ok(Value::Boolean(lhs $op rhs)),
            (Value::Integer(lhs), Value::Integer(rhs)) => Ok(Value::Boolean(lhs $op rhs)),
            (Value::Integer(lhs), Value::Float(rhs)) => Ok(Value::Boolean((lhs as f64) $op rhs)),
            (Value::Float(lhs), Value::Integer(rhs)) => Ok(Value::Boolean(lhs $op rhs as f64)),
            (Value::Float(lhs), Value::Float(rhs)) => Ok(Value::Boolean(lhs $op rhs)),
            (Value::String(lhs), Value::String(rhs)) => Ok(Value::Boolean(lhs $op rhs)),
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (lhs, rhs) => {
                Err(value_err!("Can't compare {} and {}", lhs, rhs))
            }
        }
    }};
}

macro_rules! like_op {
    ($text:expr, $pattern:expr) => {{
        // Convert the SQL LIKE pattern to a regex.
        let regex_pattern = $pattern
            .replace("\\%", "\x00") // Temporarily replace escaped %
            .replace("\\_", "\x01") // Temporarily replace escaped _
            .replace("%", ".*") // % matches any sequence
            .replace("_", ".") // _ matches any single char
            .replace("\x00", "%") // Restore escaped %
            .replace("\x01", "_"); // Restore escaped _

        let regex_pattern = format!("^{}$", regex_pattern);

        match regex::Regex::new(&regex_pattern) {
            Ok(regex) => Ok(Value::Boolean(regex.is_match(&$text))),
            Err(_) => Err(value_err!("Invalid LIKE pattern: {}", $pattern)),
        }
    }};
}

/// Evaluates the expression against one row. Identities that resolve
/// to no column evaluate to NULL rather than failing, so sparse rows
/// behave like rows with explicit NULLs.
#[cfg_attr(feature = "recursive-protection", recursive::recursive)]
pub fn eval(node: &Node, row: &Row) -> Result<Value> {
    match node {
        Node::Identity(id) => Ok(lookup(id, row)),
        Node::String(s) => Ok(Value::String(s.text.clone())),
        Node::Number(n) => Ok(n.value()),
        Node::Null(_) => Ok(Value::Null),
        Node::Unary(n) => eval_unary(n, row),
        Node::Binary(n) => eval_binary(n, row),
        Node::Tri(n) => eval_between(n, row),
        Node::MultiArg(n) => eval_in(n, row),
        Node::Func(n) => {
            let args = n.args.iter().map(|arg| eval(arg, row)).collect::<Result<Vec<_>>>()?;
            n.func.invoke(&args)
        }
    }
}

/// Resolves an identity against the row: the full reference first so
/// qualified columns of merged join rows win, then the bare column
/// part.
fn lookup(id: &IdentityNode, row: &Row) -> Value {
    if let Some(value) = row.get(&id.text) {
        return value.clone();
    }
    let (_, right, has_left_right) = id.left_right();
    if has_left_right {
        if let Some(value) = row.get(right) {
            return value.clone();
        }
    }
    Value::Null
}

fn eval_unary(node: &UnaryNode, row: &Row) -> Result<Value> {
    let value = eval(&node.arg, row)?;
    match node.op.ttype {
        TokenType::Not => match value {
            Value::Boolean(b) => Ok(Value::Boolean(!b)),
            Value::Null => Ok(Value::Null),
            value => Err(value_err!("Can't negate {}", value)),
        },
        TokenType::Minus => match value {
            Value::Integer(i) => Ok(Value::Integer(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Null => Ok(Value::Null),
            value => Err(value_err!("Unexpected negative op on {}", value)),
        },
        _ => Err(value_err!("Unsupported unary operator {}", node.op.ttype)),
    }
}

fn eval_binary(node: &BinaryNode, row: &Row) -> Result<Value> {
    let l = eval(&node.left, row)?;
    let r = eval(&node.right, row)?;
    match node.op.ttype {
        TokenType::Plus => arithmetic_op!(l, +, r),
        TokenType::Minus => arithmetic_op!(l, -, r),
        TokenType::Mul => arithmetic_op!(l, *, r),
        TokenType::Div => match r {
            Value::Integer(0) => Err(value_err!("Can't divide {} by zero", l)),
            Value::Float(f) if f == 0.0 => Err(value_err!("Can't divide {} by zero", l)),
            r => arithmetic_op!(l, /, r),
        },
        TokenType::Mod => match r {
            Value::Integer(0) => Err(value_err!("Can't divide {} by zero", l)),
            Value::Float(f) if f == 0.0 => Err(value_err!("Can't divide {} by zero", l)),
            r => arithmetic_op!(l, %, r),
        },
        TokenType::Eq => compare_op!(l, ==, r),
        TokenType::Neq => compare_op!(l, !=, r),
        TokenType::Gt => compare_op!(l, >, r),
        TokenType::GtEq => compare_op!(l, >=, r),
        TokenType::Lt => compare_op!(l, <, r),
        TokenType::LtEq => compare_op!(l, <=, r),
        TokenType::And => match (l, r) {
            (Value::Boolean(lhs), Value::Boolean(rhs)) => Ok(Value::Boolean(lhs && rhs)),
            (Value::Boolean(lhs), Value::Null) if !lhs => Ok(Value::Boolean(false)),
            (Value::Boolean(_), Value::Null) => Ok(Value::Null),
            (Value::Null, Value::Boolean(rhs)) if !rhs => Ok(Value::Boolean(false)),
            (Value::Null, Value::Boolean(_)) => Ok(Value::Null),
            (Value::Null, Value::Null) => Ok(Value::Null),
            (lhs, rhs) => Err(value_err!("Can't and {} and {}", lhs, rhs)),
        },
        TokenType::Or => match (l, r) {
            (Value::Boolean(lhs), Value::Boolean(rhs)) => Ok(Value::Boolean(lhs || rhs)),
            (Value::Boolean(lhs), Value::Null) if lhs => Ok(Value::Boolean(true)),
            (Value::Boolean(_), Value::Null) => Ok(Value::Null),
            (Value::Null, Value::Boolean(rhs)) if rhs => Ok(Value::Boolean(true)),
            (Value::Null, Value::Boolean(_)) => Ok(Value::Null),
            (Value::Null, Value::Null) => Ok(Value::Null),
            (lhs, rhs) => Err(value_err!("Can't or {} and {}", lhs, rhs)),
        },
        TokenType::Like => match (l, r) {
            (Value::String(text), Value::String(pattern)) => like_op!(text, pattern),
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (l, r) => Err(value_err!("Like expects string value, got {} and {}", l, r)),
        },
        _ => Err(value_err!("Unsupported binary operator {}", node.op.ttype)),
    }
}

/// BETWEEN is inclusive on both bounds.
fn eval_between(node: &TriNode, row: &Row) -> Result<Value> {
    let value = eval(&node.args[0], row)?;
    let low = eval(&node.args[1], row)?;
    let high = eval(&node.args[2], row)?;
    let ge = compare_op!(value.clone(), >=, low)?;
    let le = compare_op!(value, <=, high)?;
    match (ge, le) {
        (Value::Boolean(a), Value::Boolean(b)) => Ok(Value::Boolean(a && b)),
        _ => Ok(Value::Null),
    }
}

/// Membership by value equality, so `1 IN (1.0)` holds the same way
/// `1 = 1.0` does.
fn eval_in(node: &MultiArgNode, row: &Row) -> Result<Value> {
    let probe = eval(&node.args[0], row)?;
    if probe.is_null() {
        return Ok(Value::Null);
    }
    for candidate in &node.args[1..] {
        if probe == eval(candidate, row)? {
            return Ok(Value::Boolean(true));
        }
    }
    Ok(Value::Boolean(false))
}

/// Filter semantics over an evaluated predicate: only TRUE keeps the
/// row, NULL and FALSE both drop it.
pub fn eval_predicate(node: &Node, row: &Row) -> Result<bool> {
    match eval(node, row)? {
        Value::Boolean(b) => Ok(b),
        Value::Null => Ok(false),
        value => Err(Error::value(format!("Filter expects a boolean predicate, got {}", value))),
    }
}
