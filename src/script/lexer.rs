use crate::script::ParseError;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Variable(String),
    Ident(String),
    Str(String),
    Int(i64),
    OpenTag,
    Assign,
    Equals,
    Arrow,
    At,
    Semi,
    Comma,
    LParen,
    RParen,
    LBrace,
    RBrace,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Variable(name) => write!(f, "variable \"${}\"", name),
            Token::Ident(name) => write!(f, "identifier \"{}\"", name),
            Token::Str(s) => write!(f, "double-quoted string \"{}\"", s),
            Token::Int(n) => write!(f, "integer \"{}\"", n),
            Token::OpenTag => f.write_str("token \"<?php\""),
            Token::Assign => f.write_str("token \"=\""),
            Token::Equals => f.write_str("token \"==\""),
            Token::Arrow => f.write_str("token \"->\""),
            Token::At => f.write_str("token \"@\""),
            Token::Semi => f.write_str("token \";\""),
            Token::Comma => f.write_str("token \",\""),
            Token::LParen => f.write_str("token \"(\""),
            Token::RParen => f.write_str("token \")\""),
            Token::LBrace => f.write_str("token \"{\""),
            Token::RBrace => f.write_str("token \"}\""),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub token: Token,
    pub line: u32,
}

// One alternative per token class, anchored at the cursor.
const TOKEN_RE: &str = r#"^(?:(?P<ws>\s+)|(?P<open><\?php\b)|\$(?P<var>[A-Za-z_][A-Za-z0-9_]*)|(?P<ident>[A-Za-z_][A-Za-z0-9_]*)|(?P<int>[0-9]+)|"(?P<str>(?:[^"\\]|\\.)*)"|(?P<punct>==|->|[=@;,(){}]))"#;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TOKEN_RE).expect("token pattern is valid"));

pub fn tokenize(src: &str) -> Result<Vec<Spanned>, ParseError> {
    let mut out = Vec::new();
    let mut pos = 0;
    let mut line = 1u32;

    while pos < src.len() {
        let rest = &src[pos..];
        let Some(caps) = TOKEN.captures(rest) else {
            let message = if rest.starts_with('"') {
                "syntax error, unexpected end of file".to_string()
            } else {
                let c = rest.chars().next().unwrap_or_default();
                format!("syntax error, unexpected character \"{}\"", c)
            };
            return Err(ParseError { message, line });
        };

        let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        let start_line = line;
        line += whole.matches('\n').count() as u32;
        pos += whole.len();

        let token = if caps.name("ws").is_some() {
            continue;
        } else if caps.name("open").is_some() {
            Token::OpenTag
        } else if let Some(m) = caps.name("var") {
            Token::Variable(m.as_str().to_string())
        } else if let Some(m) = caps.name("ident") {
            Token::Ident(m.as_str().to_string())
        } else if let Some(m) = caps.name("int") {
            let n = m.as_str().parse::<i64>().map_err(|_| ParseError {
                message: format!("integer literal out of range: {}", m.as_str()),
                line: start_line,
            })?;
            Token::Int(n)
        } else if let Some(m) = caps.name("str") {
            Token::Str(unescape(m.as_str()))
        } else {
            match caps.name("punct").map(|m| m.as_str()) {
                Some("==") => Token::Equals,
                Some("->") => Token::Arrow,
                Some("=") => Token::Assign,
                Some("@") => Token::At,
                Some(";") => Token::Semi,
                Some(",") => Token::Comma,
                Some("(") => Token::LParen,
                Some(")") => Token::RParen,
                Some("{") => Token::LBrace,
                _ => Token::RBrace,
            }
        };

        out.push(Spanned {
            token,
            line: start_line,
        });
    }

    Ok(out)
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other @ ('"' | '\\' | '$')) => out.push(other),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
