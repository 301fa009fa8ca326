use std::fmt;

use crate::ast::{Ast, BinOp, BuiltinFn, UnOp};
use crate::tokenizer::{Token, TokenKind, tokenize};

/// Raised while building the AST from a token stream. Carries
/// the byte position of the offending token for caller-side diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub pos: usize,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at byte {})", self.message, self.pos)
    }
}

impl std::error::Error for ParseError {}

impl From<crate::tokenizer::TokenizerError> for ParseError {
    fn from(e: crate::tokenizer::TokenizerError) -> Self {
        ParseError {
            message: e.message,
            pos: e.pos,
        }
    }
}

/// Resolves identifiers and bounds-checks indices while parsing.
///
/// `num_parameters = None` defers `[i]` bounds checking to evaluation time
/// (used for `generic_formulas` entries, whose call-site parameter count is
/// only known at the `FormulaRef` that invokes them).
#[derive(Debug, Clone, Copy)]
pub struct ParseContext {
    pub num_variables: usize,
    pub num_parameters: Option<usize>,
}

/// Parses a TFormula expression into an [`Ast`].
pub fn parse(src: &str, ctx: ParseContext) -> Result<Ast, ParseError> {
    let tokens = tokenize(src)?;
    let mut p = Parser {
        tokens,
        pos: 0,
        ctx,
    };
    let ast = p.parse_or()?;
    p.expect_eof()?;
    Ok(ast)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    ctx: ParseContext,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect_eof(&self) -> Result<(), ParseError> {
        if matches!(self.peek().kind, TokenKind::Eof) {
            Ok(())
        } else {
            Err(ParseError {
                message: format!("unexpected trailing token '{}'", self.peek().kind),
                pos: self.peek().start,
            })
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, ParseError> {
        if &self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(ParseError {
                message: format!("expected '{kind}', found '{}'", self.peek().kind),
                pos: self.peek().start,
            })
        }
    }

    // or := and ('||' and)*
    fn parse_or(&mut self) -> Result<Ast, ParseError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek().kind, TokenKind::OrOr) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Ast::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    // and := cmp ('&&' cmp)*
    fn parse_and(&mut self) -> Result<Ast, ParseError> {
        let mut lhs = self.parse_cmp()?;
        while matches!(self.peek().kind, TokenKind::AndAnd) {
            self.advance();
            let rhs = self.parse_cmp()?;
            lhs = Ast::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    // cmp := add ( (< <= > >= == !=) add )*
    fn parse_cmp(&mut self) -> Result<Ast, ParseError> {
        let mut lhs = self.parse_add()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Ge => BinOp::Ge,
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::Ne => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_add()?;
            lhs = Ast::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    // add := mul (('+'|'-') mul)*
    fn parse_add(&mut self) -> Result<Ast, ParseError> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_mul()?;
            lhs = Ast::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    // mul := pow (('*'|'/') pow)*
    fn parse_mul(&mut self) -> Result<Ast, ParseError> {
        let mut lhs = self.parse_pow()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_pow()?;
            lhs = Ast::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    // pow := unary ('^' pow)?   -- right-associative, binds tighter than unary
    // so that `-x^2` parses as `-(x^2)`.
    fn parse_pow(&mut self) -> Result<Ast, ParseError> {
        let lhs = self.parse_unary()?;
        if matches!(self.peek().kind, TokenKind::Caret) {
            self.advance();
            let rhs = self.parse_pow()?;
            Ok(Ast::Binary(BinOp::Pow, Box::new(lhs), Box::new(rhs)))
        } else {
            Ok(lhs)
        }
    }

    // unary := ('-' | '+')? pow_base
    //
    // Note this calls `parse_pow_base` (not `parse_pow`) so that a leading
    // unary minus wraps the *whole* power expression: `-x^2` tokenizes as
    // Minus, x, Caret, 2 and must parse as `-(x^2)`, not `(-x)^2`.
    fn parse_unary(&mut self) -> Result<Ast, ParseError> {
        match self.peek().kind {
            TokenKind::Minus => {
                self.advance();
                let operand = self.parse_unary_pow()?;
                Ok(Ast::Unary(UnOp::Neg, Box::new(operand)))
            }
            TokenKind::Plus => {
                self.advance();
                self.parse_unary_pow()
            }
            _ => self.parse_primary(),
        }
    }

    // Handles the power binding for an operand that follows a unary sign,
    // so `-x^2` is `-(x^2)` and `-x^-2` is `-(x^(-2))`.
    fn parse_unary_pow(&mut self) -> Result<Ast, ParseError> {
        let base = self.parse_unary()?;
        if matches!(self.peek().kind, TokenKind::Caret) {
            self.advance();
            let exp = self.parse_pow()?;
            Ok(Ast::Binary(BinOp::Pow, Box::new(base), Box::new(exp)))
        } else {
            Ok(base)
        }
    }

    fn parse_primary(&mut self) -> Result<Ast, ParseError> {
        match self.peek().kind.clone() {
            TokenKind::Number(v) => {
                self.advance();
                Ok(Ast::Literal(v))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_or()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                let pos = self.peek().start;
                self.advance();
                let idx = self.parse_index_literal(pos)?;
                self.expect(&TokenKind::RBracket)?;
                self.check_parameter_index(idx, pos)?;
                Ok(Ast::Parameter(idx))
            }
            TokenKind::Ident(name) => self.parse_ident(name),
            other => Err(ParseError {
                message: format!("unexpected token '{other}'"),
                pos: self.peek().start,
            }),
        }
    }

    fn parse_index_literal(&mut self, pos: usize) -> Result<usize, ParseError> {
        match self.peek().kind.clone() {
            TokenKind::Number(v) if v.fract() == 0.0 && v >= 0.0 => {
                self.advance();
                Ok(v as usize)
            }
            other => Err(ParseError {
                message: format!("expected a non-negative integer index, found '{other}'"),
                pos,
            }),
        }
    }

    fn check_parameter_index(&self, idx: usize, pos: usize) -> Result<(), ParseError> {
        match self.ctx.num_parameters {
            Some(0) => Err(ParseError {
                message: "parameter reference '[i]' used but no parameters are in scope"
                    .to_string(),
                pos,
            }),
            Some(n) if idx >= n => Err(ParseError {
                message: format!("parameter index {idx} out of range (only {n} declared)"),
                pos,
            }),
            _ => Ok(()),
        }
    }

    fn parse_ident(&mut self, name: String) -> Result<Ast, ParseError> {
        let pos = self.peek().start;
        self.advance();

        if matches!(self.peek().kind, TokenKind::LParen) {
            return self.parse_call(name, pos);
        }

        if name == "x" && matches!(self.peek().kind, TokenKind::LBracket) {
            self.advance();
            let idx = self.parse_index_literal(pos)?;
            self.expect(&TokenKind::RBracket)?;
            return self.check_and_build_variable(idx, pos);
        }

        match name.as_str() {
            "x" => self.check_and_build_variable(0, pos),
            "y" => self.check_and_build_variable(1, pos),
            "z" => self.check_and_build_variable(2, pos),
            "t" => self.check_and_build_variable(3, pos),
            _ => Err(ParseError {
                message: format!("unknown identifier '{name}'"),
                pos,
            }),
        }
    }

    fn check_and_build_variable(&self, idx: usize, pos: usize) -> Result<Ast, ParseError> {
        if idx >= self.ctx.num_variables {
            return Err(ParseError {
                message: format!(
                    "variable index {idx} out of range (only {} declared)",
                    self.ctx.num_variables
                ),
                pos,
            });
        }
        Ok(Ast::Variable(idx))
    }

    fn parse_call(&mut self, name: String, pos: usize) -> Result<Ast, ParseError> {
        let Some(func) = BuiltinFn::lookup(&name) else {
            return Err(ParseError {
                message: format!("unknown function '{name}'"),
                pos,
            });
        };
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        if !matches!(self.peek().kind, TokenKind::RParen) {
            args.push(self.parse_or()?);
            while matches!(self.peek().kind, TokenKind::Comma) {
                self.advance();
                args.push(self.parse_or()?);
            }
        }
        self.expect(&TokenKind::RParen)?;

        if args.len() != func.arity() {
            return Err(ParseError {
                message: format!(
                    "function '{name}' takes {} argument(s), got {}",
                    func.arity(),
                    args.len()
                ),
                pos,
            });
        }
        Ok(Ast::Call(func, args))
    }
}
