use braid_core::error::{BraidError, Result};
use braid_core::value::{Value, Vec2};

use crate::eval::EvalScope;

/// Every function name callable from an expression.
pub const NAMES: &[&str] = &[
    "abs", "sign", "floor", "ceil", "round", "min", "max", "sqrt", "pow", "sin", "cos", "tan",
    "asin", "acos", "atan", "atan2", "clamp", "lerp", "distance", "normalize", "dot", "vec2",
    "length", "len", "concat", "contains", "substring", "upper", "lower", "trim", "int", "float",
    "str", "bool", "typeof", "random", "randomInt", "randomRange",
];

pub fn is_builtin(name: &str) -> bool {
    NAMES.contains(&name)
}

/// Invoke builtin `name` with already-evaluated arguments.
pub fn call(name: &str, args: Vec<Value>, scope: &dyn EvalScope) -> Result<Value> {
    let value = match name {
        "abs" => unary_math(name, &args, f64::abs)?,
        "floor" => unary_math(name, &args, f64::floor)?,
        "ceil" => unary_math(name, &args, f64::ceil)?,
        "round" => unary_math(name, &args, f64::round)?,
        "sqrt" => unary_math(name, &args, f64::sqrt)?,
        "sin" => unary_math(name, &args, f64::sin)?,
        "cos" => unary_math(name, &args, f64::cos)?,
        "tan" => unary_math(name, &args, f64::tan)?,
        "asin" => unary_math(name, &args, f64::asin)?,
        "acos" => unary_math(name, &args, f64::acos)?,
        "atan" => unary_math(name, &args, f64::atan)?,
        "sign" => unary_math(name, &args, |x| {
            if x > 0.0 {
                1.0
            } else if x < 0.0 {
                -1.0
            } else {
                0.0
            }
        })?,
        "pow" => {
            arity(name, &args, 2, 2)?;
            Value::Number(number(name, &args[0])?.powf(number(name, &args[1])?))
        }
        "atan2" => {
            arity(name, &args, 2, 2)?;
            Value::Number(number(name, &args[0])?.atan2(number(name, &args[1])?))
        }
        "min" | "max" => {
            arity(name, &args, 1, usize::MAX)?;
            let mut best = number(name, &args[0])?;
            for arg in &args[1..] {
                let n = number(name, arg)?;
                best = if name == "min" { best.min(n) } else { best.max(n) };
            }
            Value::Number(best)
        }
        "clamp" => {
            arity(name, &args, 3, 3)?;
            let x = number(name, &args[0])?;
            let lo = number(name, &args[1])?;
            let hi = number(name, &args[2])?;
            Value::Number(x.max(lo).min(hi))
        }
        "lerp" => {
            arity(name, &args, 3, 3)?;
            let t = number(name, &args[2])?;
            match (&args[0], &args[1]) {
                (Value::Vec2(a), Value::Vec2(b)) => Value::Vec2(a.lerp(*b, t)),
                (a, b) => {
                    let a = number(name, a)?;
                    let b = number(name, b)?;
                    Value::Number(a + (b - a) * t)
                }
            }
        }
        "vec2" => {
            arity(name, &args, 2, 2)?;
            Value::Vec2(Vec2::new(number(name, &args[0])?, number(name, &args[1])?))
        }
        "distance" => {
            arity(name, &args, 2, 2)?;
            Value::Number(vector(name, &args[0])?.distance(vector(name, &args[1])?))
        }
        "dot" => {
            arity(name, &args, 2, 2)?;
            Value::Number(vector(name, &args[0])?.dot(vector(name, &args[1])?))
        }
        "normalize" => {
            arity(name, &args, 1, 1)?;
            Value::Vec2(vector(name, &args[0])?.normalized())
        }
        "length" => {
            arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Vec2(v) => Value::Number(v.length()),
                other => count(name, other)?,
            }
        }
        "len" => {
            arity(name, &args, 1, 1)?;
            count(name, &args[0])?
        }
        "concat" => concat(args),
        "contains" => {
            arity(name, &args, 2, 2)?;
            let found = match (&args[0], &args[1]) {
                (Value::Array(items), needle) => items.contains(needle),
                (Value::String(s), needle) => s.contains(&needle.to_string()),
                (Value::Record(map), Value::String(key)) => map.contains_key(key),
                (other, _) => return Err(type_error(name, other)),
            };
            Value::Bool(found)
        }
        "substring" => {
            arity(name, &args, 2, 3)?;
            let s = string(name, &args[0])?;
            let total = s.chars().count();
            let start = index_arg(number(name, &args[1])?, total);
            let end = match args.get(2) {
                Some(v) => index_arg(number(name, v)?, total),
                None => total,
            };
            let (start, end) = if start <= end { (start, end) } else { (end, start) };
            Value::String(s.chars().skip(start).take(end - start).collect())
        }
        "upper" => {
            arity(name, &args, 1, 1)?;
            Value::String(string(name, &args[0])?.to_uppercase())
        }
        "lower" => {
            arity(name, &args, 1, 1)?;
            Value::String(string(name, &args[0])?.to_lowercase())
        }
        "trim" => {
            arity(name, &args, 1, 1)?;
            Value::String(string(name, &args[0])?.trim().to_string())
        }
        "int" => {
            arity(name, &args, 1, 1)?;
            Value::Number(to_number(name, &args[0])?.trunc())
        }
        "float" => {
            arity(name, &args, 1, 1)?;
            Value::Number(to_number(name, &args[0])?)
        }
        "str" => {
            arity(name, &args, 1, 1)?;
            Value::String(args[0].to_string())
        }
        "bool" => {
            arity(name, &args, 1, 1)?;
            Value::Bool(args[0].is_truthy())
        }
        "typeof" => {
            arity(name, &args, 1, 1)?;
            Value::from(args[0].type_name())
        }
        "random" => {
            arity(name, &args, 0, 0)?;
            Value::Number(draw(scope))
        }
        "randomInt" => {
            arity(name, &args, 2, 2)?;
            let a = number(name, &args[0])?.ceil();
            let b = number(name, &args[1])?.floor();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            Value::Number(lo + (draw(scope) * (hi - lo + 1.0)).floor())
        }
        "randomRange" => {
            arity(name, &args, 2, 2)?;
            let lo = number(name, &args[0])?;
            let hi = number(name, &args[1])?;
            Value::Number(lo + draw(scope) * (hi - lo))
        }
        other => return Err(BraidError::eval(format!("unknown function '{}'", other))),
    };
    Ok(value)
}

/// One uniform draw, from the scope's PRNG when it has one.
fn draw(scope: &dyn EvalScope) -> f64 {
    scope.random().unwrap_or_else(rand::random::<f64>)
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else if max == usize::MAX {
            format!("at least {}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(BraidError::eval(format!(
            "{}() expects {} argument(s), got {}",
            name,
            expected,
            args.len()
        )));
    }
    Ok(())
}

fn unary_math(name: &str, args: &[Value], f: impl Fn(f64) -> f64) -> Result<Value> {
    arity(name, args, 1, 1)?;
    Ok(Value::Number(f(number(name, &args[0])?)))
}

fn type_error(name: &str, value: &Value) -> BraidError {
    BraidError::eval(format!("{}() does not accept a {}", name, value.type_name()))
}

fn number(name: &str, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| type_error(name, value))
}

fn vector(name: &str, value: &Value) -> Result<Vec2> {
    value.as_vec2().ok_or_else(|| type_error(name, value))
}

fn string<'a>(name: &str, value: &'a Value) -> Result<&'a str> {
    value.as_str().ok_or_else(|| type_error(name, value))
}

fn count(name: &str, value: &Value) -> Result<Value> {
    match value {
        Value::Array(items) => Ok(Value::from(items.len())),
        Value::String(s) => Ok(Value::from(s.chars().count())),
        Value::Record(map) => Ok(Value::from(map.len())),
        other => Err(type_error(name, other)),
    }
}

fn to_number(name: &str, value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Null => Ok(0.0),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| BraidError::eval(format!("{}() cannot convert '{}' to a number", name, s))),
        other => Err(type_error(name, other)),
    }
}

fn index_arg(n: f64, total: usize) -> usize {
    if n.is_nan() || n <= 0.0 {
        0
    } else {
        (n as usize).min(total)
    }
}

/// Arrays flatten one level when the first argument is an array; otherwise
/// every argument is stringified and joined.
fn concat(args: Vec<Value>) -> Value {
    if matches!(args.first(), Some(Value::Array(_))) {
        let mut out = Vec::new();
        for arg in args {
            match arg {
                Value::Array(items) => out.extend(items),
                other => out.push(other),
            }
        }
        Value::Array(out)
    } else {
        Value::String(args.iter().map(|a| a.to_string()).collect())
    }
}
