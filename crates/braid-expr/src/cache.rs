use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use braid_core::error::Result;
use braid_core::value::Value;
use tracing::trace;

use crate::ast::Expr;
use crate::eval::{evaluate, EvalScope};
use crate::parser::parse;

/// A parsed expression, cheap to clone and evaluate many times.
#[derive(Debug, Clone)]
pub struct Expression {
    source: Arc<str>,
    ast: Arc<Expr>,
}

impl Expression {
    /// Parse `source` without going through a cache.
    pub fn compile(source: &str) -> Result<Self> {
        Ok(Self {
            source: Arc::from(source),
            ast: Arc::new(parse(source)?),
        })
    }

    pub fn evaluate(&self, scope: &dyn EvalScope) -> Result<Value> {
        evaluate(&self.ast, scope)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }
}

/// Compiled expressions keyed by their source text.
#[derive(Debug, Default)]
pub struct ExpressionCache {
    entries: Mutex<HashMap<String, Expression>>,
}

impl ExpressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached compilation of `source`, parsing it on first use.
    /// Syntax errors are not cached.
    pub fn compile(&self, source: &str) -> Result<Expression> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(expr) = entries.get(source) {
            return Ok(expr.clone());
        }
        let expr = Expression::compile(source)?;
        trace!(source, "Compiled expression");
        entries.insert(source.to_string(), expr.clone());
        Ok(expr)
    }

    /// Compile (through the cache) and evaluate in one step.
    pub fn eval_source(&self, source: &str, scope: &dyn EvalScope) -> Result<Value> {
        self.compile(source)?.evaluate(scope)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
