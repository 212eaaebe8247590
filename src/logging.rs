//! Process logging. Everything `tracing` emits, the `error_log` target
//! included, goes to stderr so stdout carries only the response body.

use std::io::IsTerminal;
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// `RUST_LOG`, falling back to `info`.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Colours only when a person is watching; collectors get plain lines.
pub fn init() -> anyhow::Result<()> {
    let ansi = std::io::stderr().is_terminal();
    tracing::subscriber::set_global_default(subscriber(env_filter(), std::io::stderr, ansi))?;
    Ok(())
}

fn subscriber<W>(filter: EnvFilter, writer: W, ansi: bool) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(ansi)
        .with_writer(writer)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{NONCE_ACTION, Session, SessionAuthority};
    use crate::catalog::FaultCatalog;
    use crate::dispatch::{DispatchRequest, Dispatcher, Outcome};
    use crate::runtime::Settings;
    use crate::sink::TracingSink;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'w> MakeWriter<'w> for Capture {
        type Writer = Capture;

        fn make_writer(&'w self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn sink_lines_and_response_body_use_separate_writers() {
        let log = Capture::default();
        let authority = SessionAuthority::new(
            Session {
                user: "admin".into(),
                token: "t".into(),
                capabilities: vec![crate::auth::ADMIN_CAPABILITY.into()],
            },
            "secret",
            3600,
        );
        let request = DispatchRequest {
            selector: "various".into(),
            nonce: Some(authority.create_nonce(NONCE_ACTION)),
        };

        let outcome = tracing::subscriber::with_default(
            subscriber(EnvFilter::new("info"), log.clone(), false),
            || {
                Dispatcher::new(&TracingSink, Settings::default(), FaultCatalog::default())
                    .dispatch(request, &authority)
            },
        );
        let Outcome::Completed { body, .. } = outcome else {
            panic!("various must complete");
        };

        let log = log.text();
        assert!(log.contains("error_log: PHP Warning:  include("), "{}", log);
        assert!(log.contains("[Error Log Test] === Starting Error Generation ==="));
        assert!(!log.contains('\u{1b}'), "no colour codes when not a terminal");

        assert!(body.contains("Notice: Undefined variable $undefined_variable_test"));
        assert!(!body.contains("PHP "), "{}", body);
        assert!(!body.contains("include("));
        assert!(!body.contains("[Error Log Test] ==="));
    }
}
