//! Recursive-descent parser.
//!
//! Precedence, lowest to highest:
//! ternary `?:`, `||`, `&&`, `== !=`, `< > <= >=`, `+ -`, `* / %`,
//! unary `! -`, postfix (`.name`, `[index]`, `(args)`), primary.

use braid_core::error::{BraidError, Result};
use braid_core::value::Value;

use crate::ast::{BinaryOp, Expr, LogicalOp, UnaryOp};
use crate::token::{tokenize, Token, TokenKind};

/// Expressions nesting deeper than this, in parentheses or in the tree they
/// parse to, are a syntax error.
pub const MAX_EXPRESSION_DEPTH: usize = 128;

/// Parse a complete expression. Trailing tokens are a syntax error.
pub fn parse(source: &str) -> Result<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        nesting: 0,
    };
    let (expr, _) = parser.ternary()?;
    let tail = parser.peek();
    if tail.kind != TokenKind::Eof {
        return Err(syntax(tail.pos, format!("unexpected trailing {}", describe(&tail.kind))));
    }
    Ok(expr)
}

/// A parsed subtree and its depth.
type Node = (Expr, usize);

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nesting: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize always ends with Eof, and we never advance past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token> {
        let token = self.peek().clone();
        if token.kind == kind {
            Ok(self.advance())
        } else {
            Err(syntax(
                token.pos,
                format!("expected {} but found {}", what, describe(&token.kind)),
            ))
        }
    }

    fn ternary(&mut self) -> Result<Node> {
        self.descend()?;
        let (test, depth) = self.logical_or()?;
        let node = if self.eat(&TokenKind::Question) {
            let (then, then_depth) = self.ternary()?;
            self.expect(TokenKind::Colon, "':'")?;
            let (otherwise, otherwise_depth) = self.ternary()?;
            self.node(
                Expr::Conditional {
                    test: Box::new(test),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                },
                depth.max(then_depth).max(otherwise_depth),
            )?
        } else {
            (test, depth)
        };
        self.nesting -= 1;
        Ok(node)
    }

    fn logical_or(&mut self) -> Result<Node> {
        let (mut left, mut depth) = self.logical_and()?;
        while self.eat(&TokenKind::OrOr) {
            let (right, right_depth) = self.logical_and()?;
            (left, depth) = self.node(
                Expr::Logical {
                    op: LogicalOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                depth.max(right_depth),
            )?;
        }
        Ok((left, depth))
    }

    fn logical_and(&mut self) -> Result<Node> {
        let (mut left, mut depth) = self.equality()?;
        while self.eat(&TokenKind::AndAnd) {
            let (right, right_depth) = self.equality()?;
            (left, depth) = self.node(
                Expr::Logical {
                    op: LogicalOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                depth.max(right_depth),
            )?;
        }
        Ok((left, depth))
    }

    fn equality(&mut self) -> Result<Node> {
        let (mut left, mut depth) = self.relational()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::BangEq => BinaryOp::NotEq,
                _ => return Ok((left, depth)),
            };
            self.advance();
            let (right, right_depth) = self.relational()?;
            (left, depth) = self.node(binary(op, left, right), depth.max(right_depth))?;
        }
    }

    fn relational(&mut self) -> Result<Node> {
        let (mut left, mut depth) = self.additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::LtEq => BinaryOp::LtEq,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::GtEq => BinaryOp::GtEq,
                _ => return Ok((left, depth)),
            };
            self.advance();
            let (right, right_depth) = self.additive()?;
            (left, depth) = self.node(binary(op, left, right), depth.max(right_depth))?;
        }
    }

    fn additive(&mut self) -> Result<Node> {
        let (mut left, mut depth) = self.multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok((left, depth)),
            };
            self.advance();
            let (right, right_depth) = self.multiplicative()?;
            (left, depth) = self.node(binary(op, left, right), depth.max(right_depth))?;
        }
    }

    fn multiplicative(&mut self) -> Result<Node> {
        let (mut left, mut depth) = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => return Ok((left, depth)),
            };
            self.advance();
            let (right, right_depth) = self.unary()?;
            (left, depth) = self.node(binary(op, left, right), depth.max(right_depth))?;
        }
    }

    fn unary(&mut self) -> Result<Node> {
        let op = match self.peek().kind {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            _ => return self.postfix(),
        };
        self.advance();
        self.descend()?;
        let (operand, depth) = self.unary()?;
        self.nesting -= 1;
        self.node(
            Expr::Unary {
                op,
                operand: Box::new(operand),
            },
            depth,
        )
    }

    fn postfix(&mut self) -> Result<Node> {
        let (mut expr, mut depth) = self.primary()?;
        loop {
            match self.peek().kind {
                TokenKind::Dot => {
                    self.advance();
                    let token = self.advance();
                    let property = match token.kind {
                        TokenKind::Ident(name) => name,
                        other => {
                            return Err(syntax(
                                token.pos,
                                format!("expected property name but found {}", describe(&other)),
                            ));
                        }
                    };
                    (expr, depth) = self.node(
                        Expr::Member {
                            object: Box::new(expr),
                            property,
                        },
                        depth,
                    )?;
                }
                TokenKind::LBracket => {
                    self.advance();
                    let (index, index_depth) = self.ternary()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    (expr, depth) = self.node(
                        Expr::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        depth.max(index_depth),
                    )?;
                }
                TokenKind::LParen => {
                    self.advance();
                    let (args, args_depth) = self.list(TokenKind::RParen, "')'")?;
                    (expr, depth) = self.node(
                        Expr::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        depth.max(args_depth),
                    )?;
                }
                _ => return Ok((expr, depth)),
            }
        }
    }

    fn primary(&mut self) -> Result<Node> {
        let token = self.advance();
        let leaf = match token.kind {
            TokenKind::Number(n) => Expr::Literal(Value::Number(n)),
            TokenKind::Str(s) => Expr::Literal(Value::String(s)),
            TokenKind::Ident(name) => match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" => Expr::Literal(Value::Null),
                _ => Expr::Ident(name),
            },
            TokenKind::LParen => {
                let inner = self.ternary()?;
                self.expect(TokenKind::RParen, "')'")?;
                return Ok(inner);
            }
            TokenKind::LBracket => {
                let (items, depth) = self.list(TokenKind::RBracket, "']'")?;
                return self.node(Expr::Array(items), depth);
            }
            other => return Err(syntax(token.pos, format!("unexpected {}", describe(&other)))),
        };
        Ok((leaf, 1))
    }

    /// Comma-separated expressions up to `close` (already past the opener),
    /// with the depth of the deepest one.
    fn list(&mut self, close: TokenKind, what: &str) -> Result<(Vec<Expr>, usize)> {
        let mut items = Vec::new();
        let mut depth = 0;
        if self.eat(&close) {
            return Ok((items, depth));
        }
        loop {
            let (item, item_depth) = self.ternary()?;
            items.push(item);
            depth = depth.max(item_depth);
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            self.expect(close, what)?;
            return Ok((items, depth));
        }
    }

    /// Enter one level of parser recursion.
    fn descend(&mut self) -> Result<()> {
        self.nesting += 1;
        if self.nesting > MAX_EXPRESSION_DEPTH {
            return Err(self.too_deep());
        }
        Ok(())
    }

    /// Wrap `expr` as a node one level above children of depth `child_depth`.
    fn node(&self, expr: Expr, child_depth: usize) -> Result<Node> {
        let depth = child_depth + 1;
        if depth > MAX_EXPRESSION_DEPTH {
            return Err(self.too_deep());
        }
        Ok((expr, depth))
    }

    fn too_deep(&self) -> BraidError {
        syntax(
            self.peek().pos,
            format!("expression nested too deeply (limit {})", MAX_EXPRESSION_DEPTH),
        )
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn syntax(position: usize, message: String) -> BraidError {
    BraidError::Syntax { position, message }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Number(n) => format!("number {}", n),
        TokenKind::Str(s) => format!("string '{}'", s),
        TokenKind::Ident(name) => format!("identifier '{}'", name),
        TokenKind::Eof => "end of input".to_string(),
        other => format!("'{}'", symbol(other)),
    }
}

fn symbol(kind: &TokenKind) -> &'static str {
    match kind {
        TokenKind::Plus => "+",
        TokenKind::Minus => "-",
        TokenKind::Star => "*",
        TokenKind::Slash => "/",
        TokenKind::Percent => "%",
        TokenKind::Bang => "!",
        TokenKind::BangEq => "!=",
        TokenKind::EqEq => "==",
        TokenKind::Lt => "<",
        TokenKind::LtEq => "<=",
        TokenKind::Gt => ">",
        TokenKind::GtEq => ">=",
        TokenKind::AndAnd => "&&",
        TokenKind::OrOr => "||",
        TokenKind::Question => "?",
        TokenKind::Colon => ":",
        TokenKind::Dot => ".",
        TokenKind::Comma => ",",
        TokenKind::LParen => "(",
        TokenKind::RParen => ")",
        TokenKind::LBracket => "[",
        TokenKind::RBracket => "]",
        TokenKind::Number(_) | TokenKind::Str(_) | TokenKind::Ident(_) | TokenKind::Eof => "?",
    }
}
