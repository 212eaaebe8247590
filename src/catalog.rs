//! Fault catalog: the four selectable fault categories and what each emits.
//!
//! Every category except `Fatal` contains its own faults: parse errors and
//! unrecoverable script faults are caught and written to the sink, so control
//! always returns to the caller. `Fatal` is the one category whose result is
//! always `Err(Fault)`.

use crate::runtime::{Handling, Runtime};
use crate::script::{Fault, FaultKind, Interpreter, Script};
use crate::sink::{Destination, LogSink, TAG, tagged};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultCategory {
    SyntaxLike,
    Various,
    LoggingProbe,
    Fatal,
}

impl FaultCategory {
    pub const ALL: [FaultCategory; 4] = [
        FaultCategory::SyntaxLike,
        FaultCategory::Various,
        FaultCategory::LoggingProbe,
        FaultCategory::Fatal,
    ];

    /// Exact match only; anything else selects nothing.
    pub fn from_selector(selector: &str) -> Option<Self> {
        match selector {
            "syntax" => Some(FaultCategory::SyntaxLike),
            "various" => Some(FaultCategory::Various),
            "logging" => Some(FaultCategory::LoggingProbe),
            "fatal" => Some(FaultCategory::Fatal),
            _ => None,
        }
    }

    pub fn selector(self) -> &'static str {
        match self {
            FaultCategory::SyntaxLike => "syntax",
            FaultCategory::Various => "various",
            FaultCategory::LoggingProbe => "logging",
            FaultCategory::Fatal => "fatal",
        }
    }
}

impl fmt::Display for FaultCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.selector())
    }
}

/// Which unrecoverable trigger the `Fatal` category uses. Only one runs per
/// invocation; all three end the request the same way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FatalVariant {
    /// Call a function that is not bound in the program.
    #[default]
    UndefinedFunction,
    /// Invoke a method on a null value.
    NullMethodCall,
    /// Pass a string where a typed parameter requires an array.
    TypeViolation,
}

impl FatalVariant {
    fn source(self) -> &'static str {
        match self {
            FatalVariant::UndefinedFunction => "oh_this_function_does_not_exist();",
            FatalVariant::NullMethodCall => "$null = null;\n$null->methodCall();",
            FatalVariant::TypeViolation => "array_keys(\"not an array\");",
        }
    }
}

type Procedure = fn(&FaultCatalog, &Runtime<'_>) -> Result<(), Fault>;

/// A category bound to the procedure that produces its diagnostics.
#[derive(Clone, Copy)]
pub struct FaultCategoryEntry {
    pub category: FaultCategory,
    procedure: Procedure,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FaultCatalog {
    fatal: FatalVariant,
}

impl FaultCatalog {
    pub fn new(fatal: FatalVariant) -> Self {
        Self { fatal }
    }

    pub fn entry(category: FaultCategory) -> FaultCategoryEntry {
        let procedure: Procedure = match category {
            FaultCategory::SyntaxLike => syntax_like,
            FaultCategory::Various => various,
            FaultCategory::LoggingProbe => logging_probe,
            FaultCategory::Fatal => fatal,
        };
        FaultCategoryEntry {
            category,
            procedure,
        }
    }

    /// Run one category to completion. `Err` means the request must end.
    pub fn execute(&self, category: FaultCategory, runtime: &Runtime<'_>) -> Result<(), Fault> {
        let entry = Self::entry(category);
        tracing::trace!(category = %entry.category, fatal = ?self.fatal, "executing entry");
        (entry.procedure)(self, runtime)
    }
}

/// Compile and run one fragment, logging whatever goes wrong instead of
/// letting it escape. A parse failure is reported as `Parse Error {origin}:`.
#[track_caller]
fn attempt(interp: &mut Interpreter<'_, '_>, sink: &dyn LogSink, origin: Option<&str>, src: &str) {
    match Script::compile(src) {
        Ok(script) => {
            if let Err(fault) = interp.run(&script) {
                tagged(sink, format!("Caught {}", fault));
            }
        }
        Err(err) => {
            let prefix = match origin {
                Some(origin) => format!("Parse Error {}", origin),
                None => "Parse Error".to_string(),
            };
            tagged(sink, format!("{}: {}", prefix, err.message));
        }
    }
}

const MALFORMED: [(&str, &str); 3] = [
    ("missing terminator", r#"$test = "missing semicolon""#),
    ("unbalanced grouping", r#"if ($test == true { echo "bad"; }"#),
    ("duplicate open marker", "<?php <?php double opening tags"),
];

fn syntax_like(_: &FaultCatalog, runtime: &Runtime<'_>) -> Result<(), Fault> {
    let sink = runtime.sink();
    tagged(sink, "=== Starting Syntax Error Tests ===");

    let mut interp = Interpreter::new(runtime);
    for (i, (label, src)) in MALFORMED.iter().enumerate() {
        let origin = format!("#{} ({})", i + 1, label);
        attempt(&mut interp, sink, Some(&origin), src);
    }
    Ok(())
}

fn various(_: &FaultCatalog, runtime: &Runtime<'_>) -> Result<(), Fault> {
    let sink = runtime.sink();
    tagged(sink, "=== Starting Error Generation ===");
    tagged(
        sink,
        format!("Timestamp: {}", Local::now().format("%Y-%m-%d %H:%M:%S")),
    );

    let mut interp = Interpreter::new(runtime);

    tagged(sink, "Triggering E_NOTICE...");
    attempt(&mut interp, sink, None, "$result = $undefined_variable_test;");

    // A fresh suffix on every run keeps the path from ever existing.
    tagged(sink, "Triggering E_WARNING...");
    let missing = format!("/path/to/non/existent/file_{}.php", Uuid::new_v4().simple());
    attempt(&mut interp, sink, None, &format!("@include \"{}\";", missing));

    tagged(sink, "Triggering E_USER_ERROR...");
    attempt(
        &mut interp,
        sink,
        None,
        r#"trigger_error("[Error Log Test] This is a user-generated error!", E_USER_ERROR);"#,
    );
    attempt(
        &mut interp,
        sink,
        None,
        r#"trigger_error("[Error Log Test] This is a user warning!", E_USER_WARNING);"#,
    );
    attempt(
        &mut interp,
        sink,
        None,
        r#"trigger_error("[Error Log Test] This is a user notice!", E_USER_NOTICE);"#,
    );
    Ok(())
}

#[derive(Serialize)]
struct ProbePayload {
    test: &'static str,
    number: u32,
}

fn logging_probe(_: &FaultCatalog, runtime: &Runtime<'_>) -> Result<(), Fault> {
    let sink = runtime.sink();
    tagged(sink, "Simple error log message");

    let payload = ProbePayload {
        test: "data",
        number: 123,
    };
    let data = serde_json::to_string(&payload).unwrap_or_else(|err| format!("<{}>", err));
    tagged(sink, format!("Array data: {}", data));

    sink.record(&format!("{} Message to SAPI", TAG), Destination::Sapi);

    let _handler = runtime.install(move |d| {
        tagged(
            sink,
            format!(
                "Custom Handler - Error [{}]: {} in {} on line {}",
                d.severity.code(),
                d.message,
                d.file,
                d.line
            ),
        );
        Handling::Continue
    });

    // Missing required arguments: exactly one warning while installed.
    let mut interp = Interpreter::new(runtime);
    attempt(&mut interp, sink, None, "strpos();");
    Ok(())
}

fn fatal(catalog: &FaultCatalog, runtime: &Runtime<'_>) -> Result<(), Fault> {
    let sink = runtime.sink();
    tagged(sink, "=== About to trigger FATAL ERROR ===");
    match memory_usage() {
        Some(bytes) => tagged(sink, format!("Memory before crash: {} bytes", bytes)),
        None => tagged(sink, "Memory before crash: unavailable"),
    }

    let script = Script::compile(catalog.fatal.source()).map_err(|err| Fault {
        kind: FaultKind::ParseError,
        message: err.message,
        file: file!().to_string(),
        line: err.line,
    })?;
    Interpreter::new(runtime).run(&script)?;

    Err(Fault {
        kind: FaultKind::Error,
        message: format!("fatal trigger {:?} returned", catalog.fatal),
        file: file!().to_string(),
        line: line!(),
    })
}

/// Resident set size of this process, when the platform exposes it.
fn memory_usage() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let kb = status
        .lines()
        .find_map(|l| l.strip_prefix("VmRSS:"))?
        .trim()
        .strip_suffix("kB")?
        .trim()
        .parse::<u64>()
        .ok()?;
    Some(kb * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Settings;
    use crate::sink::testing::MemorySink;
    use pretty_assertions::assert_eq;
    use regex::Regex;

    fn execute(category: FaultCategory, fatal: FatalVariant) -> (Result<(), Fault>, MemorySink) {
        let sink = MemorySink::default();
        let result = {
            let rt = Runtime::new(&sink, Settings::default());
            FaultCatalog::new(fatal).execute(category, &rt)
        };
        (result, sink)
    }

    #[test]
    fn selectors_match_exactly() {
        for category in FaultCategory::ALL {
            assert_eq!(FaultCategory::from_selector(category.selector()), Some(category));
            assert_eq!(FaultCatalog::entry(category).category, category);
        }
        for junk in ["", "Syntax", "fatal ", "log", "syntax\0"] {
            assert_eq!(FaultCategory::from_selector(junk), None);
        }
    }

    #[test]
    fn syntax_like_attempts_every_fragment() {
        let (result, sink) = execute(FaultCategory::SyntaxLike, FatalVariant::default());
        assert!(result.is_ok());
        assert_eq!(
            sink.tagged(),
            vec![
                "[Error Log Test] === Starting Syntax Error Tests ===".to_string(),
                "[Error Log Test] Parse Error #1 (missing terminator): syntax error, unexpected end of file".to_string(),
                "[Error Log Test] Parse Error #2 (unbalanced grouping): syntax error, unexpected token \"{\"".to_string(),
                "[Error Log Test] Parse Error #3 (duplicate open marker): syntax error, unexpected token \"<?php\"".to_string(),
            ]
        );
    }

    #[test]
    fn attempt_contains_parse_errors_and_faults() {
        let sink = MemorySink::default();
        let rt = Runtime::new(&sink, Settings::default());
        let mut interp = Interpreter::new(&rt);

        attempt(&mut interp, &sink, None, "$x = ");
        attempt(&mut interp, &sink, Some("#9 (label)"), "echo (;");
        attempt(&mut interp, &sink, None, "nope();");

        let messages = sink.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(
            messages[0],
            "[Error Log Test] Parse Error: syntax error, unexpected end of file"
        );
        assert!(messages[1].starts_with("[Error Log Test] Parse Error #9 (label): syntax error"));
        assert!(messages[2].starts_with(
            "[Error Log Test] Caught Uncaught Error: Call to undefined function nope()"
        ));
        assert!(messages[2].contains("catalog.rs"), "{}", messages[2]);
    }

    #[test]
    fn various_runs_every_step_in_order() {
        let (result, sink) = execute(FaultCategory::Various, FatalVariant::default());
        assert!(result.is_ok());

        let messages = sink.messages();
        let position = |needle: &str| {
            messages
                .iter()
                .position(|m| m.contains(needle))
                .unwrap_or_else(|| panic!("missing {:?} in {:#?}", needle, messages))
        };

        let notice = position("PHP Notice:  Undefined variable $undefined_variable_test");
        let open = position("Failed to open stream: No such file or directory");
        let include = position("for inclusion");
        let error = position("PHP Error:  [Error Log Test] This is a user-generated error!");
        let warning = position("PHP Warning:  [Error Log Test] This is a user warning!");
        let user_notice = position("PHP Notice:  [Error Log Test] This is a user notice!");

        assert!(notice < open && open < include);
        assert!(include < error && error < warning && warning < user_notice);
        assert_eq!(user_notice, messages.len() - 1);
    }

    #[test]
    fn various_never_reuses_an_include_path() {
        let path = Regex::new(r"file_([0-9a-f]{32})\.php").unwrap();
        let suffix = |sink: &MemorySink| {
            sink.messages()
                .iter()
                .find_map(|m| path.captures(m).map(|c| c[1].to_string()))
                .unwrap()
        };

        let (_, first) = execute(FaultCategory::Various, FatalVariant::default());
        let (_, second) = execute(FaultCategory::Various, FatalVariant::default());
        assert_ne!(suffix(&first), suffix(&second));
    }

    #[test]
    fn logging_probe_emits_the_expected_sequence() {
        let (result, sink) = execute(FaultCategory::LoggingProbe, FatalVariant::default());
        assert!(result.is_ok());

        let entries = sink.entries();
        assert_eq!(entries[0].message, "[Error Log Test] Simple error log message");
        assert_eq!(
            entries[1].message,
            r#"[Error Log Test] Array data: {"test":"data","number":123}"#
        );
        assert_eq!(entries[2].message, "[Error Log Test] Message to SAPI");
        assert_eq!(entries[2].destination, Destination::Sapi);

        let custom =
            Regex::new(r"^\[Error Log Test\] Custom Handler - Error \[2\]: .+ in .+ on line \d+$")
                .unwrap();
        assert!(custom.is_match(&entries[3].message), "{}", entries[3].message);
        assert!(entries[3].message.contains("strpos() expects at least 2 arguments, 0 given"));
        assert!(entries[3].message.contains("catalog.rs"));

        // The handler let the warning continue to the default handler.
        assert!(entries[4].message.starts_with("PHP Warning:  strpos()"));
        assert_eq!(entries.len(), 5);
    }

    #[test]
    fn logging_probe_uninstalls_its_handler() {
        let sink = MemorySink::default();
        let rt = Runtime::new(&sink, Settings::default());
        FaultCatalog::default()
            .execute(FaultCategory::LoggingProbe, &rt)
            .unwrap();
        assert_eq!(rt.handler_depth(), 0);

        let before = sink.messages().len();
        let mut interp = Interpreter::new(&rt);
        interp.run(&Script::compile("strpos();").unwrap()).unwrap();

        let after = sink.messages();
        assert_eq!(after.len(), before + 1);
        assert!(after[before].starts_with("PHP Warning:  strpos()"));
    }

    #[test]
    fn fatal_logs_two_lines_then_faults() {
        for variant in [
            FatalVariant::UndefinedFunction,
            FatalVariant::NullMethodCall,
            FatalVariant::TypeViolation,
        ] {
            let (result, sink) = execute(FaultCategory::Fatal, variant);
            let fault = result.unwrap_err();

            let messages = sink.messages();
            assert_eq!(messages.len(), 2, "{:?}", variant);
            assert_eq!(messages[0], "[Error Log Test] === About to trigger FATAL ERROR ===");
            assert!(messages[1].starts_with("[Error Log Test] Memory before crash: "));

            let expected = match variant {
                FatalVariant::UndefinedFunction => {
                    "Call to undefined function oh_this_function_does_not_exist()"
                }
                FatalVariant::NullMethodCall => "Call to a member function methodCall() on null",
                FatalVariant::TypeViolation => {
                    "array_keys(): Argument #1 ($array) must be of type array, string given"
                }
            };
            assert_eq!(fault.message, expected);
        }
    }
}
