use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

mod auth;
mod catalog;
mod config;
mod dispatch;
mod lifecycle;
mod logging;
mod runtime;
mod script;
mod sink;

use catalog::{FatalVariant, FaultCatalog, FaultCategory};
use dispatch::{DispatchRequest, Dispatcher, Outcome};

pub type Result<T> = anyhow::Result<T>;

/// Exit status of a request that ended in an unrecoverable fault.
const FATAL_EXIT_CODE: i32 = 255;

#[derive(Parser)]
#[command(name = "errlog-probe")]
#[command(about = "Provoke runtime faults to verify error-log collection", long_about = None)]
struct Cli {
    /// Config file (defaults to ./errlog-probe.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one fault category: syntax, various, logging or fatal.
    Trigger {
        selector: String,

        #[arg(long)]
        nonce: Option<String>,

        /// Override the configured fatal trigger.
        #[arg(long, value_enum)]
        fatal: Option<FatalVariant>,
    },
    /// Print a nonce for the configured session.
    Nonce,
    /// Write the activation markers.
    Activate,
    /// Write the deactivation marker.
    Deactivate,
    /// Show where diagnostics go.
    Status,
}

fn main() -> Result<()> {
    logging::init()?;

    let cli = Cli::parse();
    let config = config::Config::load(cli.config.as_deref())?;

    match cli.cmd {
        Commands::Trigger {
            selector,
            nonce,
            fatal,
        } => {
            let authority = config.authority()?;
            let sink = config.open_sink()?;
            let catalog = FaultCatalog::new(fatal.unwrap_or(config.fatal.variant));
            let dispatcher = Dispatcher::new(&*sink, config.settings(), catalog);

            match dispatcher.dispatch(DispatchRequest { selector, nonce }, &authority) {
                // Deliberately silent: no hint whether the token or the selector was bad.
                Outcome::Ignored => {}
                Outcome::Completed { category, body } => {
                    print!("{}", body);
                    tracing::info!(%category, "fault category completed");
                }
                Outcome::Terminated { category, fault } => {
                    println!("{}", dispatcher.report_fatal(&fault));
                    tracing::debug!(%category, "request terminated");
                    std::io::stdout().flush()?;
                    std::process::exit(FATAL_EXIT_CODE);
                }
            }
        }
        Commands::Nonce => {
            let authority = config.authority()?;
            tracing::debug!(user = authority.user(), "issuing nonce");
            println!("{}", authority.create_nonce(auth::NONCE_ACTION));
        }
        Commands::Activate => lifecycle::on_activate(&*config.open_sink()?),
        Commands::Deactivate => lifecycle::on_deactivate(&*config.open_sink()?),
        Commands::Status => {
            match &config.log.file {
                Some(path) => println!("Error log: {}", path.display()),
                None => println!("Error log: stderr (tracing target \"error_log\")"),
            }
            println!("display_errors: {}", config.log.display_errors);
            println!("log_errors: {}", config.log.log_errors);
            println!("fatal variant: {:?}", config.fatal.variant);
            let selectors: Vec<&str> = FaultCategory::ALL.iter().map(|c| c.selector()).collect();
            println!("selectors: {}", selectors.join(", "));
        }
    }

    Ok(())
}
