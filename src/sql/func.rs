//! Scalar function descriptors and the builtin registry. A
//! function-call node binds to its descriptor by name lookup when the
//! node is built, so evaluation never resolves names.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::LazyLock;

use crate::error::Result;
use crate::value::Value;
use crate::value::ValueType;
use crate::value_err;

pub type FuncRunner = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// A scalar function: declared signature plus the executable.
#[derive(Clone)]
pub struct Func {
    pub name: String,
    /// Declared positional argument kinds. `Unknown` opts an argument
    /// out of kind checking.
    pub args: Vec<ValueType>,
    pub variadic: bool,
    pub return_type: ValueType,
    runner: FuncRunner,
}

impl Func {
    pub fn new(
        name: impl Into<String>,
        args: Vec<ValueType>,
        variadic: bool,
        return_type: ValueType,
        runner: FuncRunner,
    ) -> Func {
        Func { name: name.into(), args, variadic, return_type, runner }
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        (self.runner)(args)
    }
}

impl std::fmt::Debug for Func {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let args = self.args.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
        let variadic = if self.variadic { ", ..." } else { "" };
        write!(f, "{}({}{}) -> {}", self.name, args, variadic, self.return_type)
    }
}

/// Function registry keyed by lowercased name.
pub struct FuncRegistry {
    funcs: HashMap<String, Func>,
}

impl FuncRegistry {
    fn new() -> Self {
        let funcs = vec![upper(), lower(), length(), contains(), min(), max()];
        let map = funcs
            .into_iter()
            .map(|it| (it.name.clone(), it))
            .collect::<HashMap<String, Func>>();
        Self { funcs: map }
    }

    pub fn get(&self, name: &str) -> Option<Func> {
        self.funcs.get(&name.to_lowercase()).cloned()
    }
}

/// Looks a builtin up by name, case-insensitively.
pub fn lookup(name: &str) -> Option<Func> {
    static INSTANCE: LazyLock<FuncRegistry> = LazyLock::new(FuncRegistry::new);
    INSTANCE.get(name)
}

macro_rules! make_scalar_func {
    ($FN:ident, $args:expr, $variadic:expr, $ret:expr, $runner:expr) => {
        pub fn $FN() -> Func {
            static INSTANCE: LazyLock<Func> = LazyLock::new(|| {
                Func::new(stringify!($FN), $args, $variadic, $ret, Arc::new($runner))
            });
            INSTANCE.clone()
        }
    };
}

make_scalar_func!(upper, vec![ValueType::String], false, ValueType::String, |args| {
    match args {
        [Value::Null] => Ok(Value::Null),
        [Value::String(s)] => Ok(Value::String(s.to_uppercase())),
        _ => Err(value_err!("upper expects one string argument")),
    }
});

make_scalar_func!(lower, vec![ValueType::String], false, ValueType::String, |args| {
    match args {
        [Value::Null] => Ok(Value::Null),
        [Value::String(s)] => Ok(Value::String(s.to_lowercase())),
        _ => Err(value_err!("lower expects one string argument")),
    }
});

make_scalar_func!(length, vec![ValueType::String], false, ValueType::Integer, |args| {
    match args {
        [Value::Null] => Ok(Value::Null),
        [Value::String(s)] => Ok(Value::Integer(s.chars().count() as i64)),
        _ => Err(value_err!("length expects one string argument")),
    }
});

make_scalar_func!(
    contains,
    vec![ValueType::String, ValueType::String],
    false,
    ValueType::Boolean,
    |args| {
        match args {
            [Value::String(a), Value::String(b)] => Ok(Value::Boolean(a.contains(b.as_str()))),
            [a, b] if a.is_null() || b.is_null() => Ok(Value::Null),
            _ => Err(value_err!("contains expects two string arguments")),
        }
    }
);

make_scalar_func!(min, vec![], true, ValueType::Unknown, |args| Ok(fold_extreme(args, true)));

make_scalar_func!(max, vec![], true, ValueType::Unknown, |args| Ok(fold_extreme(args, false)));

/// Smallest or largest non-null argument; incomparable pairs keep the
/// running value. All-null input yields Null.
fn fold_extreme(args: &[Value], smallest: bool) -> Value {
    let mut out = Value::Null;
    for arg in args {
        if arg.is_null() {
            continue;
        }
        if out.is_null() {
            out = arg.clone();
            continue;
        }
        if let Some(ord) = arg.partial_cmp(&out) {
            let replace = if smallest { ord.is_lt() } else { ord.is_gt() };
            if replace {
                out = arg.clone();
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_case_insensitive() {
        assert!(lookup("upper").is_some());
        assert!(lookup("UPPER").is_some());
        assert!(lookup("Min").is_some());
        assert!(lookup("no_such_fn").is_none());
    }

    #[test]
    fn test_invoke_scalars() -> Result<()> {
        let v = upper().invoke(&[Value::from("bob")])?;
        assert_eq!(Value::from("BOB"), v);

        let v = length().invoke(&[Value::from("hello")])?;
        assert_eq!(Value::Integer(5), v);

        let v = contains().invoke(&[Value::from("hello"), Value::from("ell")])?;
        assert_eq!(Value::Boolean(true), v);

        assert_eq!(Value::Null, upper().invoke(&[Value::Null])?);
        assert!(upper().invoke(&[Value::Integer(1)]).is_err());
        Ok(())
    }

    #[test]
    fn test_variadic_extremes() -> Result<()> {
        let args = [Value::Integer(3), Value::Null, Value::Float(1.5), Value::Integer(9)];
        assert_eq!(Value::Float(1.5), min().invoke(&args)?);
        assert_eq!(Value::Integer(9), max().invoke(&args)?);
        assert_eq!(Value::Null, min().invoke(&[Value::Null])?);
        Ok(())
    }
}
