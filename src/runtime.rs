//! Diagnostic runtime: severities, the handler stack, and the default handler.
//!
//! Diagnostics raised by the script engine are offered to the innermost
//! installed handler first. A handler either swallows the diagnostic or lets
//! it continue to the default handler, which writes it to the log sink and
//! echoes it into the response body.

use crate::sink::{Destination, LogSink};
use std::cell::{Cell, RefCell};
use std::fmt::{self, Write};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Notice,
    UserError,
    UserWarning,
    UserNotice,
}

impl Severity {
    /// Numeric code, compatible with the E_* constants.
    pub fn code(self) -> i64 {
        match self {
            Severity::Warning => 2,
            Severity::Notice => 8,
            Severity::UserError => 256,
            Severity::UserWarning => 512,
            Severity::UserNotice => 1024,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            2 => Some(Severity::Warning),
            8 => Some(Severity::Notice),
            256 => Some(Severity::UserError),
            512 => Some(Severity::UserWarning),
            1024 => Some(Severity::UserNotice),
            _ => None,
        }
    }

    /// Only the user-level severities may be raised from scripts.
    pub fn is_user_level(self) -> bool {
        matches!(
            self,
            Severity::UserError | Severity::UserWarning | Severity::UserNotice
        )
    }

    /// User errors are reported as "Error" and never halt: they are
    /// recoverable here, unlike the unrecoverable `Fault`s of the engine.
    pub fn label(self) -> &'static str {
        match self {
            Severity::Warning | Severity::UserWarning => "Warning",
            Severity::Notice | Severity::UserNotice => "Notice",
            Severity::UserError => "Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub file: String,
    pub line: u32,
    /// Raised under the `@` operator: logged, never displayed.
    pub suppressed: bool,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} in {} on line {}",
            self.severity.label(),
            self.message,
            self.file,
            self.line
        )
    }
}

/// What a handler wants done with a diagnostic after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handling {
    Handled,
    Continue,
}

type Handler<'s> = Rc<dyn Fn(&Diagnostic) -> Handling + 's>;

#[derive(Debug, Clone, Copy)]
pub struct Settings {
    pub display_errors: bool,
    pub log_errors: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            display_errors: true,
            log_errors: true,
        }
    }
}

pub struct Runtime<'s> {
    sink: &'s dyn LogSink,
    settings: Settings,
    handlers: RefCell<Vec<(u64, Handler<'s>)>>,
    next_handler: Cell<u64>,
    /// Set while a user handler runs; nested diagnostics bypass the stack.
    in_handler: Cell<bool>,
    body: RefCell<String>,
}

impl<'s> Runtime<'s> {
    pub fn new(sink: &'s dyn LogSink, settings: Settings) -> Self {
        Self {
            sink,
            settings,
            handlers: RefCell::new(Vec::new()),
            next_handler: Cell::new(0),
            in_handler: Cell::new(false),
            body: RefCell::new(String::new()),
        }
    }

    pub fn sink(&self) -> &'s dyn LogSink {
        self.sink
    }

    /// Install `handler` for as long as the returned guard lives.
    pub fn install<F>(&self, handler: F) -> HandlerGuard<'_, 's>
    where
        F: Fn(&Diagnostic) -> Handling + 's,
    {
        let id = self.next_handler.get();
        self.next_handler.set(id + 1);
        let handler: Handler<'s> = Rc::new(handler);
        self.handlers.borrow_mut().push((id, handler));
        HandlerGuard { runtime: self, id }
    }

    #[cfg(test)]
    pub fn handler_depth(&self) -> usize {
        self.handlers.borrow().len()
    }

    pub fn raise(&self, diagnostic: Diagnostic) {
        if self.in_handler.get() {
            self.default_handler(&diagnostic);
            return;
        }
        // Release the borrow before calling out so handlers may raise too.
        let top = self.handlers.borrow().last().map(|(_, h)| Rc::clone(h));
        if let Some(handler) = top {
            let handling = {
                let _running = Reentry::enter(&self.in_handler);
                handler(&diagnostic)
            };
            if handling == Handling::Handled {
                return;
            }
        }
        self.default_handler(&diagnostic);
    }

    fn default_handler(&self, diagnostic: &Diagnostic) {
        if self.settings.log_errors {
            let line = format!(
                "PHP {}:  {} in {} on line {}",
                diagnostic.severity.label(),
                diagnostic.message,
                diagnostic.file,
                diagnostic.line
            );
            self.sink.record(&line, Destination::System);
        }
        if self.settings.display_errors && !diagnostic.suppressed {
            let _ = writeln!(self.body.borrow_mut(), "{}", diagnostic);
        }
    }

    /// Append script output to the response body.
    pub fn echo(&self, text: &str) {
        self.body.borrow_mut().push_str(text);
    }

    /// Drain the response body produced so far.
    pub fn take_body(&self) -> String {
        std::mem::take(&mut *self.body.borrow_mut())
    }
}

/// Removes its handler from the runtime when dropped, on every exit path.
#[must_use = "the handler is uninstalled as soon as the guard is dropped"]
pub struct HandlerGuard<'r, 's> {
    runtime: &'r Runtime<'s>,
    id: u64,
}

impl Drop for HandlerGuard<'_, '_> {
    fn drop(&mut self) {
        self.runtime
            .handlers
            .borrow_mut()
            .retain(|(id, _)| *id != self.id);
    }
}

/// Clears the re-entrancy flag even if the handler unwinds.
struct Reentry<'a>(&'a Cell<bool>);

impl<'a> Reentry<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for Reentry<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}
