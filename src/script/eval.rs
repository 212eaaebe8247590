//! Tree-walking interpreter.
//!
//! Recoverable problems (undefined variables, missing includes, wrong argument
//! counts, trigger_error) are raised as diagnostics and evaluation continues.
//! Unrecoverable ones come back as `Err(Fault)` and unwind the whole run.

use crate::runtime::{Diagnostic, Runtime, Severity};
use crate::script::parser::{Expr, Stmt};
use crate::script::{Fault, FaultKind, Script};
use std::collections::HashMap;
use std::io;

const MAX_INCLUDE_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty() && s != "0",
        }
    }

    fn to_text(&self) -> String {
        match self {
            Value::Null | Value::Bool(false) => String::new(),
            Value::Bool(true) => "1".to_string(),
            Value::Int(n) => n.to_string(),
            Value::Str(s) => s.clone(),
        }
    }

    /// `==` comparison: bool and null operands compare by truthiness.
    fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Bool(_) | Value::Null, _) | (_, Value::Bool(_) | Value::Null) => {
                self.truthy() == other.truthy()
            }
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(n), Value::Str(s)) | (Value::Str(s), Value::Int(n)) => {
                s.trim().parse::<i64>().map(|v| v == *n).unwrap_or(false)
            }
            (Value::Str(a), Value::Str(b)) => a == b,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ParamType {
    Str,
    Int,
    Array,
    Mixed,
}

impl ParamType {
    fn name(self) -> &'static str {
        match self {
            ParamType::Str => "string",
            ParamType::Int => "int",
            ParamType::Array => "array",
            ParamType::Mixed => "mixed",
        }
    }

    /// Coerce `value` the way a non-strict internal call would.
    fn coerce(self, value: Value) -> Option<Value> {
        match (self, value) {
            (ParamType::Mixed, v) => Some(v),
            (ParamType::Str, v @ Value::Str(_)) => Some(v),
            (ParamType::Str, v @ (Value::Int(_) | Value::Bool(_))) => Some(Value::Str(v.to_text())),
            (ParamType::Int, v @ Value::Int(_)) => Some(v),
            (ParamType::Int, Value::Bool(b)) => Some(Value::Int(b as i64)),
            (ParamType::Int, Value::Str(s)) => s.trim().parse().ok().map(Value::Int),
            _ => None,
        }
    }
}

struct Builtin {
    name: &'static str,
    params: &'static [(&'static str, ParamType)],
    required: usize,
}

const BUILTINS: &[Builtin] = &[
    Builtin {
        name: "strlen",
        params: &[("string", ParamType::Str)],
        required: 1,
    },
    Builtin {
        name: "strpos",
        params: &[
            ("haystack", ParamType::Str),
            ("needle", ParamType::Str),
            ("offset", ParamType::Int),
        ],
        required: 2,
    },
    Builtin {
        name: "array_keys",
        params: &[
            ("array", ParamType::Array),
            ("filter_value", ParamType::Mixed),
            ("strict", ParamType::Int),
        ],
        required: 1,
    },
    Builtin {
        name: "trigger_error",
        params: &[("message", ParamType::Str), ("error_level", ParamType::Int)],
        required: 1,
    },
];

/// Where the statements being executed came from.
struct Frame {
    file: String,
    first_line: u32,
}

pub struct Interpreter<'r, 's> {
    runtime: &'r Runtime<'s>,
    scope: HashMap<String, Value>,
    frame: Frame,
    silence: u32,
    include_depth: usize,
}

impl<'r, 's> Interpreter<'r, 's> {
    pub fn new(runtime: &'r Runtime<'s>) -> Self {
        Self {
            runtime,
            scope: HashMap::new(),
            frame: Frame {
                file: String::new(),
                first_line: 1,
            },
            silence: 0,
            include_depth: 0,
        }
    }

    #[cfg(test)]
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.scope.get(name)
    }

    pub fn run(&mut self, script: &Script) -> Result<(), Fault> {
        let saved = std::mem::replace(
            &mut self.frame,
            Frame {
                file: script.file.clone(),
                first_line: script.first_line,
            },
        );
        let result = self.exec_all(&script.program);
        self.frame = saved;
        result
    }

    fn source_line(&self, line: u32) -> u32 {
        self.frame.first_line + line.saturating_sub(1)
    }

    fn raise(&self, severity: Severity, message: String, line: u32) {
        self.runtime.raise(Diagnostic {
            severity,
            message,
            file: self.frame.file.clone(),
            line: self.source_line(line),
            suppressed: self.silence > 0,
        });
    }

    fn fault(&self, kind: FaultKind, message: String, line: u32) -> Fault {
        Fault {
            kind,
            message,
            file: self.frame.file.clone(),
            line: self.source_line(line),
        }
    }

    fn exec_all(&mut self, body: &[Stmt]) -> Result<(), Fault> {
        for stmt in body {
            self.exec(stmt)?;
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<(), Fault> {
        match stmt {
            Stmt::Assign { name, value } => {
                let v = self.eval(value)?;
                self.scope.insert(name.clone(), v);
            }
            Stmt::If { cond, body } => {
                if self.eval(cond)?.truthy() {
                    self.exec_all(body)?;
                }
            }
            Stmt::Echo(value) => {
                let v = self.eval(value)?;
                self.runtime.echo(&v.to_text());
            }
            Stmt::Expr(value) => {
                self.eval(value)?;
            }
            Stmt::Block(body) => self.exec_all(body)?,
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, Fault> {
        match expr {
            Expr::Var { name, line } => match self.scope.get(name) {
                Some(v) => Ok(v.clone()),
                None => {
                    self.raise(
                        Severity::Notice,
                        format!("Undefined variable ${}", name),
                        *line,
                    );
                    Ok(Value::Null)
                }
            },
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Const { name, line } => self.constant(name, *line),
            Expr::Call { name, args, line } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                self.call(name, values, *line)
            }
            Expr::MethodCall {
                target,
                method,
                line,
            } => {
                // No value in this dialect carries methods.
                let target = self.eval(target)?;
                Err(self.fault(
                    FaultKind::Error,
                    format!(
                        "Call to a member function {}() on {}",
                        method,
                        target.type_name()
                    ),
                    *line,
                ))
            }
            Expr::Equals(lhs, rhs) => {
                let a = self.eval(lhs)?;
                let b = self.eval(rhs)?;
                Ok(Value::Bool(a.loose_eq(&b)))
            }
            Expr::Silence(inner) => {
                self.silence += 1;
                let result = self.eval(inner);
                self.silence -= 1;
                result
            }
            Expr::Include { path, line } => {
                let path = self.eval(path)?.to_text();
                self.include(&path, *line)
            }
        }
    }

    fn constant(&self, name: &str, line: u32) -> Result<Value, Fault> {
        let severity = match name {
            "E_WARNING" => Severity::Warning,
            "E_NOTICE" => Severity::Notice,
            "E_USER_ERROR" => Severity::UserError,
            "E_USER_WARNING" => Severity::UserWarning,
            "E_USER_NOTICE" => Severity::UserNotice,
            _ => {
                return Err(self.fault(
                    FaultKind::Error,
                    format!("Undefined constant \"{}\"", name),
                    line,
                ));
            }
        };
        Ok(Value::Int(severity.code()))
    }

    fn include(&mut self, path: &str, line: u32) -> Result<Value, Fault> {
        if self.include_depth >= MAX_INCLUDE_DEPTH {
            return Err(self.fault(
                FaultKind::Error,
                format!("Maximum include depth of {} reached", MAX_INCLUDE_DEPTH),
                line,
            ));
        }

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                let reason = match err.kind() {
                    io::ErrorKind::NotFound => "No such file or directory".to_string(),
                    io::ErrorKind::PermissionDenied => "Permission denied".to_string(),
                    _ => err.to_string(),
                };
                self.raise(
                    Severity::Warning,
                    format!("include({}): Failed to open stream: {}", path, reason),
                    line,
                );
                self.raise(
                    Severity::Warning,
                    format!("include(): Failed opening '{}' for inclusion", path),
                    line,
                );
                return Ok(Value::Bool(false));
            }
        };

        let script = Script::compile_file(path, &text).map_err(|err| Fault {
            kind: FaultKind::ParseError,
            message: err.message,
            file: path.to_string(),
            line: err.line,
        })?;

        self.include_depth += 1;
        let result = self.run(&script);
        self.include_depth -= 1;
        result.map(|()| Value::Int(1))
    }

    fn call(&mut self, name: &str, args: Vec<Value>, line: u32) -> Result<Value, Fault> {
        let Some(builtin) = BUILTINS.iter().find(|b| b.name == name) else {
            return Err(self.fault(
                FaultKind::Error,
                format!("Call to undefined function {}()", name),
                line,
            ));
        };

        let max = builtin.params.len();
        if args.len() < builtin.required || args.len() > max {
            let (bound, n) = if args.len() < builtin.required {
                let bound = if builtin.required == max { "exactly" } else { "at least" };
                (bound, builtin.required)
            } else {
                let bound = if builtin.required == max { "exactly" } else { "at most" };
                (bound, max)
            };
            let plural = if n == 1 { "" } else { "s" };
            self.raise(
                Severity::Warning,
                format!(
                    "{}() expects {} {} argument{}, {} given",
                    name,
                    bound,
                    n,
                    plural,
                    args.len()
                ),
                line,
            );
            return Ok(Value::Null);
        }

        let mut checked = Vec::with_capacity(args.len());
        for (i, (value, (param, ty))) in args.into_iter().zip(builtin.params).enumerate() {
            let given = value.type_name();
            match ty.coerce(value) {
                Some(v) => checked.push(v),
                None => {
                    return Err(self.fault(
                        FaultKind::TypeError,
                        format!(
                            "{}(): Argument #{} (${}) must be of type {}, {} given",
                            name,
                            i + 1,
                            param,
                            ty.name(),
                            given
                        ),
                        line,
                    ));
                }
            }
        }

        match (name, checked.as_slice()) {
            ("strlen", [Value::Str(s)]) => Ok(Value::Int(s.len() as i64)),
            ("strpos", [Value::Str(haystack), Value::Str(needle), rest @ ..]) => {
                let offset = match rest {
                    [Value::Int(n)] => *n,
                    _ => 0,
                };
                if offset < 0 || offset as usize > haystack.len() {
                    return Err(self.fault(
                        FaultKind::ValueError,
                        "strpos(): Argument #3 ($offset) must be contained in argument #1 ($haystack)"
                            .to_string(),
                        line,
                    ));
                }
                let found = haystack
                    .get(offset as usize..)
                    .and_then(|tail| tail.find(needle.as_str()))
                    .map(|pos| Value::Int((pos + offset as usize) as i64));
                Ok(found.unwrap_or(Value::Bool(false)))
            }
            ("trigger_error", [Value::Str(message), rest @ ..]) => {
                let code = match rest {
                    [Value::Int(n)] => *n,
                    _ => Severity::UserNotice.code(),
                };
                match Severity::from_code(code).filter(|s| s.is_user_level()) {
                    Some(severity) => {
                        self.raise(severity, message.clone(), line);
                        Ok(Value::Bool(true))
                    }
                    None => Err(self.fault(
                        FaultKind::ValueError,
                        "trigger_error(): Argument #2 ($error_level) must be one of E_USER_ERROR, E_USER_WARNING, E_USER_NOTICE, or E_USER_DEPRECATED"
                            .to_string(),
                        line,
                    )),
                }
            }
            // array_keys never gets past the type check: there are no arrays.
            _ => Ok(Value::Null),
        }
    }
}
