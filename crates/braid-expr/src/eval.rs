use std::collections::HashMap;
use std::sync::Mutex;

use braid_core::error::{BraidError, Result};
use braid_core::rng::SeededRng;
use braid_core::value::Value;

use crate::ast::{BinaryOp, Expr, LogicalOp, UnaryOp};
use crate::builtins;

/// Variables and randomness visible to an evaluation.
pub trait EvalScope {
    /// Resolve an identifier. `None` means undefined.
    fn lookup(&self, name: &str) -> Option<Value>;

    /// Draw a uniform float in `[0, 1)` from the scope's PRNG, if it has one.
    fn random(&self) -> Option<f64> {
        None
    }
}

/// Plain map-backed scope, mostly for tests and one-off evaluations.
#[derive(Debug, Default)]
pub struct MapScope {
    vars: HashMap<String, Value>,
    rng: Option<Mutex<SeededRng>>,
}

impl MapScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn with_rng(mut self, rng: SeededRng) -> Self {
        self.rng = Some(Mutex::new(rng));
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }
}

impl EvalScope for MapScope {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.vars.get(name).cloned()
    }

    fn random(&self) -> Option<f64> {
        self.rng
            .as_ref()
            .map(|rng| rng.lock().unwrap_or_else(|e| e.into_inner()).next())
    }
}

/// Evaluate a parsed expression against `scope`.
pub fn evaluate(expr: &Expr, scope: &dyn EvalScope) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Ident(name) => scope
            .lookup(name)
            .ok_or_else(|| BraidError::eval(format!("undefined variable '{}'", name))),
        Expr::Array(items) => items
            .iter()
            .map(|item| evaluate(item, scope))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, scope)?;
            unary(*op, value)
        }
        Expr::Binary { op, left, right } => {
            let l = evaluate(left, scope)?;
            let r = evaluate(right, scope)?;
            binary(*op, l, r)
        }
        Expr::Logical { op, left, right } => {
            let l = evaluate(left, scope)?.is_truthy();
            let result = match op {
                LogicalOp::And => l && evaluate(right, scope)?.is_truthy(),
                LogicalOp::Or => l || evaluate(right, scope)?.is_truthy(),
            };
            Ok(Value::Bool(result))
        }
        Expr::Conditional { test, then, otherwise } => {
            if evaluate(test, scope)?.is_truthy() {
                evaluate(then, scope)
            } else {
                evaluate(otherwise, scope)
            }
        }
        Expr::Member { object, property } => {
            let target = evaluate(object, scope)?;
            member(&target, property)
        }
        Expr::Index { object, index } => {
            let target = evaluate(object, scope)?;
            let key = evaluate(index, scope)?;
            index_value(&target, &key)
        }
        Expr::Call { callee, args } => {
            let Expr::Ident(name) = callee.as_ref() else {
                return Err(BraidError::eval("only named builtin functions can be called"));
            };
            let values = args
                .iter()
                .map(|arg| evaluate(arg, scope))
                .collect::<Result<Vec<_>>>()?;
            builtins::call(name, values, scope)
        }
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value> {
    match (op, value) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOp::Neg, Value::Vec2(v)) => Ok(Value::Vec2(v.scale(-1.0))),
        (UnaryOp::Neg, other) => Err(BraidError::eval(format!(
            "cannot negate a {}",
            other.type_name()
        ))),
    }
}

/// Apply a binary operator using the documented coercion rules.
pub fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    use Value::{Number, Vec2};

    match op {
        BinaryOp::Eq => return Ok(Value::Bool(left == right)),
        BinaryOp::NotEq => return Ok(Value::Bool(left != right)),
        _ => {}
    }

    if op == BinaryOp::Add
        && (matches!(left, Value::String(_)) || matches!(right, Value::String(_)))
    {
        return Ok(Value::String(format!("{}{}", left, right)));
    }

    let result = match (op, &left, &right) {
        (BinaryOp::Add, Number(a), Number(b)) => Number(a + b),
        (BinaryOp::Sub, Number(a), Number(b)) => Number(a - b),
        (BinaryOp::Mul, Number(a), Number(b)) => Number(a * b),
        (BinaryOp::Div, Number(a), Number(b)) => Number(a / b),
        (BinaryOp::Mod, Number(a), Number(b)) => Number(a % b),

        (BinaryOp::Add, Vec2(a), Vec2(b)) => Vec2(a.add(*b)),
        (BinaryOp::Sub, Vec2(a), Vec2(b)) => Vec2(a.sub(*b)),
        (BinaryOp::Mul, Vec2(a), Number(k)) | (BinaryOp::Mul, Number(k), Vec2(a)) => Vec2(a.scale(*k)),
        (BinaryOp::Div, Vec2(a), Number(k)) => Vec2(a.scale(1.0 / k)),

        (BinaryOp::Lt, Number(a), Number(b)) => Value::Bool(a < b),
        (BinaryOp::LtEq, Number(a), Number(b)) => Value::Bool(a <= b),
        (BinaryOp::Gt, Number(a), Number(b)) => Value::Bool(a > b),
        (BinaryOp::GtEq, Number(a), Number(b)) => Value::Bool(a >= b),

        (BinaryOp::Lt, Value::String(a), Value::String(b)) => Value::Bool(a < b),
        (BinaryOp::LtEq, Value::String(a), Value::String(b)) => Value::Bool(a <= b),
        (BinaryOp::Gt, Value::String(a), Value::String(b)) => Value::Bool(a > b),
        (BinaryOp::GtEq, Value::String(a), Value::String(b)) => Value::Bool(a >= b),

        _ => {
            return Err(BraidError::eval(format!(
                "operator '{}' is not defined for {} and {}",
                op.symbol(),
                left.type_name(),
                right.type_name()
            )))
        }
    };
    Ok(result)
}

fn member(target: &Value, property: &str) -> Result<Value> {
    match (target, property) {
        (Value::Null, _) => Err(BraidError::eval(format!(
            "cannot read property '{}' of null",
            property
        ))),
        (Value::Vec2(v), "x") => Ok(Value::Number(v.x)),
        (Value::Vec2(v), "y") => Ok(Value::Number(v.y)),
        (Value::Array(items), "length") => Ok(Value::from(items.len())),
        (Value::String(s), "length") => Ok(Value::from(s.chars().count())),
        (Value::Record(map), key) => Ok(map.get(key).cloned().unwrap_or(Value::Null)),
        (other, key) => Err(BraidError::eval(format!(
            "{} has no property '{}'",
            other.type_name(),
            key
        ))),
    }
}

fn index_value(target: &Value, key: &Value) -> Result<Value> {
    match (target, key) {
        (Value::Null, _) => Err(BraidError::eval("cannot index into null")),
        (Value::Array(items), Value::Number(n)) => Ok(position(*n)
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or(Value::Null)),
        (Value::String(s), Value::Number(n)) => Ok(position(*n)
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null)),
        (Value::Record(map), Value::String(k)) => Ok(map.get(k).cloned().unwrap_or(Value::Null)),
        (Value::Vec2(_), Value::String(k)) => member(target, k),
        (other, key) => Err(BraidError::eval(format!(
            "cannot index {} with {}",
            other.type_name(),
            key.type_name()
        ))),
    }
}

fn position(n: f64) -> Option<usize> {
    if n >= 0.0 && n.fract() == 0.0 {
        Some(n as usize)
    } else {
        None
    }
}
