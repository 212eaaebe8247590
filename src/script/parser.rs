//! Recursive-descent parser for the probe scripting dialect.
//!
//! stmt    := $v = expr ; | if ( expr ) block | echo expr ; | block | expr ;
//! expr    := unary (== unary)?
//! unary   := @ unary | include unary | postfix
//! postfix := primary (-> ident ( args ))*
//! primary := $v | "str" | int | true | false | null | CONST | ident ( args ) | ( expr )

use crate::script::ParseError;
use crate::script::lexer::{Spanned, Token};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Var { name: String, line: u32 },
    Str(String),
    Int(i64),
    Bool(bool),
    Null,
    Const { name: String, line: u32 },
    Call { name: String, args: Vec<Expr>, line: u32 },
    /// Arguments are parsed but never kept: the call faults before they run.
    MethodCall { target: Box<Expr>, method: String, line: u32 },
    Equals(Box<Expr>, Box<Expr>),
    Silence(Box<Expr>),
    Include { path: Box<Expr>, line: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Assign { name: String, value: Expr },
    If { cond: Expr, body: Vec<Stmt> },
    Echo(Expr),
    Expr(Expr),
    Block(Vec<Stmt>),
}

pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse_program(mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut out = Vec::new();
        while self.peek().is_some() {
            out.push(self.statement()?);
        }
        Ok(out)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    /// Line of the next token, or of the last one at end of input.
    fn line(&self) -> u32 {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.line)
            .unwrap_or(1)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|s| s.token.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn unexpected(&self) -> ParseError {
        let message = match self.peek() {
            None => "syntax error, unexpected end of file".to_string(),
            Some(t) => format!("syntax error, unexpected {}", t),
        };
        ParseError {
            message,
            line: self.line(),
        }
    }

    fn expect(&mut self, want: Token) -> Result<(), ParseError> {
        if self.peek() == Some(&want) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(w)) if w == word)
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        if let (Some(Token::Variable(name)), Some(Token::Assign)) = (self.peek(), self.peek_at(1)) {
            let name = name.clone();
            self.pos += 2;
            let value = self.expr()?;
            self.expect(Token::Semi)?;
            return Ok(Stmt::Assign { name, value });
        }

        if self.is_keyword("if") {
            self.pos += 1;
            self.expect(Token::LParen)?;
            let cond = self.expr()?;
            self.expect(Token::RParen)?;
            let body = self.block()?;
            return Ok(Stmt::If { cond, body });
        }

        if self.is_keyword("echo") {
            self.pos += 1;
            let value = self.expr()?;
            self.expect(Token::Semi)?;
            return Ok(Stmt::Echo(value));
        }

        if self.peek() == Some(&Token::LBrace) {
            return Ok(Stmt::Block(self.block()?));
        }

        let value = self.expr()?;
        self.expect(Token::Semi)?;
        Ok(Stmt::Expr(value))
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(Token::LBrace)?;
        let mut body = Vec::new();
        loop {
            match self.peek() {
                Some(Token::RBrace) => {
                    self.pos += 1;
                    return Ok(body);
                }
                None => return Err(self.unexpected()),
                Some(_) => body.push(self.statement()?),
            }
        }
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.unary()?;
        if self.peek() == Some(&Token::Equals) {
            self.pos += 1;
            let rhs = self.unary()?;
            return Ok(Expr::Equals(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.peek() == Some(&Token::At) {
            self.pos += 1;
            return Ok(Expr::Silence(Box::new(self.unary()?)));
        }
        if self.is_keyword("include") {
            let line = self.line();
            self.pos += 1;
            let path = self.unary()?;
            return Ok(Expr::Include {
                path: Box::new(path),
                line,
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut target = self.primary()?;
        while self.peek() == Some(&Token::Arrow) {
            self.pos += 1;
            let line = self.line();
            let method = match self.peek() {
                Some(Token::Ident(m)) => m.clone(),
                _ => return Err(self.unexpected()),
            };
            self.pos += 1;
            self.args()?;
            target = Expr::MethodCall {
                target: Box::new(target),
                method,
                line,
            };
        }
        Ok(target)
    }

    fn args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            match self.peek() {
                Some(Token::Comma) => self.pos += 1,
                Some(Token::RParen) => {
                    self.pos += 1;
                    return Ok(args);
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let line = self.line();
        match self.peek() {
            Some(Token::Ident(word)) if matches!(word.as_str(), "if" | "echo") => {
                return Err(self.unexpected());
            }
            Some(Token::Ident(_)) if self.peek_at(1) == Some(&Token::LParen) => {
                let Some(Token::Ident(name)) = self.bump() else {
                    unreachable!("peeked an identifier");
                };
                let args = self.args()?;
                return Ok(Expr::Call { name, args, line });
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                return Ok(inner);
            }
            Some(
                Token::Variable(_) | Token::Str(_) | Token::Int(_) | Token::Ident(_),
            ) => {}
            _ => return Err(self.unexpected()),
        }

        let expr = match self.bump() {
            Some(Token::Variable(name)) => Expr::Var { name, line },
            Some(Token::Str(s)) => Expr::Str(s),
            Some(Token::Int(n)) => Expr::Int(n),
            Some(Token::Ident(word)) => match word.to_ascii_lowercase().as_str() {
                "true" => Expr::Bool(true),
                "false" => Expr::Bool(false),
                "null" => Expr::Null,
                _ => Expr::Const { name: word, line },
            },
            _ => unreachable!("checked above"),
        };
        Ok(expr)
    }
}
