//! Embedded script engine used to provoke genuine runtime faults.
//!
//! This module owns:
//! - the lexer and parser for a tiny PHP-flavoured dialect
//! - the interpreter, which raises diagnostics through the `Runtime`
//! - the unrecoverable `Fault` that aborts evaluation

pub mod eval;
pub mod lexer;
pub mod parser;

pub use eval::Interpreter;

use parser::{Parser, Stmt};
use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// Reported as `Runtime Version` by the lifecycle hooks.
pub const ENGINE_VERSION: &str = "8.2-compat";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} on line {line}")]
pub struct ParseError {
    pub message: String,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Error,
    TypeError,
    ValueError,
    ParseError,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FaultKind::Error => "Error",
            FaultKind::TypeError => "TypeError",
            FaultKind::ValueError => "ValueError",
            FaultKind::ParseError => "ParseError",
        })
    }
}

/// An unrecoverable fault: evaluation stops and the request terminates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Uncaught {kind}: {message} in {file}:{line}")]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
    pub file: String,
    pub line: u32,
}

/// A compiled fragment, remembering where its source text came from.
#[derive(Debug, Clone)]
pub struct Script {
    pub(crate) file: String,
    pub(crate) first_line: u32,
    pub(crate) program: Vec<Stmt>,
}

impl Script {
    /// Compile code embedded in Rust source. Diagnostics raised by the script
    /// point at the caller's file, offset by the line inside the fragment.
    #[track_caller]
    pub fn compile(src: &str) -> Result<Self, ParseError> {
        let caller = Location::caller();
        Self::compile_at(src, caller.file(), caller.line())
    }

    pub fn compile_at(src: &str, file: &str, first_line: u32) -> Result<Self, ParseError> {
        let at_source_line = |mut err: ParseError| {
            err.line += first_line.saturating_sub(1);
            err
        };
        let tokens = lexer::tokenize(src).map_err(at_source_line)?;
        let program = Parser::new(tokens)
            .parse_program()
            .map_err(at_source_line)?;
        Ok(Self {
            file: file.to_string(),
            first_line,
            program,
        })
    }

    /// Compile a script file; files open in text mode, so one leading
    /// `<?php` marker is allowed.
    pub fn compile_file(path: &str, text: &str) -> Result<Self, ParseError> {
        let trimmed = text.trim_start();
        match trimmed.strip_prefix("<?php") {
            Some(body) => {
                // Keep line numbers aligned with the original file.
                let skipped = &text[..text.len() - trimmed.len()];
                let first_line = 1 + skipped.matches('\n').count() as u32;
                Self::compile_at(body, path, first_line)
            }
            None => Self::compile_at(text, path, 1),
        }
    }
}
