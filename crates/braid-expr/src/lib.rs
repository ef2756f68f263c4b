//! Expression language used by graph inputs, branch conditions and variable writes.

pub mod ast;
pub mod builtins;
pub mod cache;
pub mod eval;
pub mod parser;
pub mod token;

pub use ast::Expr;
pub use cache::{Expression, ExpressionCache};
pub use eval::{evaluate, EvalScope, MapScope};
pub use parser::{parse, MAX_EXPRESSION_DEPTH};
