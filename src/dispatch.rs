//! Request dispatch: authorize, select a category, run it.
//!
//! Failed authorization and unknown selectors are indistinguishable to the
//! caller: both come back as `Outcome::Ignored` and neither writes anything.

use crate::auth::{ADMIN_CAPABILITY, NONCE_ACTION};
use crate::catalog::{FaultCatalog, FaultCategory};
use crate::runtime::{Runtime, Settings};
use crate::script::Fault;
use crate::sink::{Destination, LogSink};

/// Host-provided checks guarding the trigger action.
pub trait Authorizer {
    fn verify_nonce(&self, nonce: &str, action: &str) -> bool;
    fn current_user_can(&self, capability: &str) -> bool;
}

/// One administrator action. Consumed by `dispatch`.
#[derive(Debug, Clone, Default)]
pub struct DispatchRequest {
    pub selector: String,
    pub nonce: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Outcome {
    /// Nothing ran.
    Ignored,
    /// The category returned normally; `body` is the response text.
    Completed {
        category: FaultCategory,
        body: String,
    },
    /// The category ended the request on purpose.
    Terminated {
        category: FaultCategory,
        fault: Fault,
    },
}

pub struct Dispatcher<'s> {
    sink: &'s dyn LogSink,
    settings: Settings,
    catalog: FaultCatalog,
}

impl<'s> Dispatcher<'s> {
    pub fn new(sink: &'s dyn LogSink, settings: Settings, catalog: FaultCatalog) -> Self {
        Self {
            sink,
            settings,
            catalog,
        }
    }

    pub fn dispatch(&self, request: DispatchRequest, auth: &dyn Authorizer) -> Outcome {
        let authorized = request
            .nonce
            .as_deref()
            .is_some_and(|nonce| auth.verify_nonce(nonce, NONCE_ACTION))
            && auth.current_user_can(ADMIN_CAPABILITY);
        if !authorized {
            return Outcome::Ignored;
        }

        let Some(category) = FaultCategory::from_selector(&request.selector) else {
            return Outcome::Ignored;
        };

        tracing::debug!(%category, "running fault category");
        let runtime = Runtime::new(self.sink, self.settings);
        match self.catalog.execute(category, &runtime) {
            Ok(()) => Outcome::Completed {
                category,
                body: runtime.take_body(),
            },
            Err(fault) => Outcome::Terminated { category, fault },
        }
    }

    /// Host-side handling of a terminated request: the fatal line goes to the
    /// log sink like any other diagnostic, and the returned text is what the
    /// response shows in place of the body.
    pub fn report_fatal(&self, fault: &Fault) -> String {
        if self.settings.log_errors {
            self.sink
                .record(&format!("PHP Fatal error:  {}", fault), Destination::System);
        }
        if self.settings.display_errors {
            format!("Fatal error: {}", fault)
        } else {
            CRITICAL_ERROR_PAGE.to_string()
        }
    }
}

/// Response text for a fatal error when errors are not displayed.
pub const CRITICAL_ERROR_PAGE: &str = "There has been a critical error on this website.";
