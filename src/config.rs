//! TOML configuration.
//!
//! ```toml
//! [session]
//! user = "admin"
//! token = "3f9c..."
//! capabilities = ["manage_options"]
//! secret = "..."              # or ERRLOG_PROBE_SECRET
//! nonce_lifetime_secs = 86400
//!
//! [log]
//! file = "/var/log/php/error.log"   # omit to log through tracing
//! display_errors = true
//! log_errors = true
//!
//! [fatal]
//! variant = "undefined-function"    # null-method-call | type-violation
//! ```

use crate::auth::{Session, SessionAuthority};
use crate::catalog::FatalVariant;
use crate::runtime::Settings;
use crate::sink::{FileSink, LogSink, TracingSink};
use anyhow::{Context, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "errlog-probe.toml";
pub const SECRET_ENV: &str = "ERRLOG_PROBE_SECRET";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub session: SessionConfig,
    pub log: LogConfig,
    pub fatal: FatalConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub user: String,
    pub token: String,
    pub capabilities: Vec<String>,
    pub secret: Option<String>,
    pub nonce_lifetime_secs: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user: "admin".to_string(),
            token: String::new(),
            capabilities: vec![crate::auth::ADMIN_CAPABILITY.to_string()],
            secret: None,
            nonce_lifetime_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub file: Option<PathBuf>,
    pub display_errors: bool,
    pub log_errors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: None,
            display_errors: true,
            log_errors: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FatalConfig {
    pub variant: FatalVariant,
}

impl Config {
    /// Load `path`, or the default file when it exists, or built-in defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let p = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !p.exists() {
                    return Ok(Self::default());
                }
                p
            }
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parse config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn settings(&self) -> Settings {
        Settings {
            display_errors: self.log.display_errors,
            log_errors: self.log.log_errors,
        }
    }

    /// The environment wins over the file; an empty secret counts as missing.
    pub fn secret(&self, env: Option<String>) -> anyhow::Result<String> {
        match env.or_else(|| self.session.secret.clone()) {
            Some(s) if !s.is_empty() => Ok(s),
            _ => bail!(
                "no session secret configured (set [session].secret or {})",
                SECRET_ENV
            ),
        }
    }

    pub fn authority(&self) -> anyhow::Result<SessionAuthority> {
        let secret = self.secret(std::env::var(SECRET_ENV).ok())?;
        let session = Session {
            user: self.session.user.clone(),
            token: self.session.token.clone(),
            capabilities: self.session.capabilities.clone(),
        };
        Ok(SessionAuthority::new(
            session,
            secret,
            self.session.nonce_lifetime_secs,
        ))
    }

    pub fn open_sink(&self) -> anyhow::Result<Box<dyn LogSink>> {
        Ok(match &self.log.file {
            Some(path) => Box::new(FileSink::open(path)?),
            None => Box::new(TracingSink),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.session.user, "admin");
        assert_eq!(config.session.capabilities, vec!["manage_options".to_string()]);
        assert_eq!(config.fatal.variant, FatalVariant::UndefinedFunction);
        assert!(config.log.file.is_none());
        assert!(config.settings().display_errors);
    }

    #[test]
    fn parses_every_section() {
        let config = Config::from_toml(
            r#"
            [session]
            user = "ops"
            token = "t"
            capabilities = []
            secret = "s"
            nonce_lifetime_secs = 600

            [log]
            file = "/tmp/error.log"
            display_errors = false

            [fatal]
            variant = "type-violation"
            "#,
        )
        .unwrap();

        assert_eq!(config.session.user, "ops");
        assert!(config.session.capabilities.is_empty());
        assert_eq!(config.session.nonce_lifetime_secs, 600);
        assert_eq!(config.log.file, Some(PathBuf::from("/tmp/error.log")));
        assert!(!config.settings().display_errors);
        assert!(config.settings().log_errors);
        assert_eq!(config.fatal.variant, FatalVariant::TypeViolation);
    }

    #[test]
    fn rejects_unknown_keys_and_variants() {
        assert!(Config::from_toml("[log]\nfiel = \"x\"").is_err());
        assert!(Config::from_toml("[fatal]\nvariant = \"segfault\"").is_err());
    }

    #[test]
    fn secret_prefers_the_environment() {
        let config = Config::from_toml("[session]\nsecret = \"file\"").unwrap();
        assert_eq!(config.secret(Some("env".into())).unwrap(), "env");
        assert_eq!(config.secret(None).unwrap(), "file");

        let config = Config::default();
        assert!(config.secret(None).is_err());
        assert!(config.secret(Some(String::new())).is_err());
    }

    #[test]
    fn load_reads_an_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.toml");
        std::fs::write(&path, "[fatal]\nvariant = \"null-method-call\"\n").unwrap();

        let config = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.fatal.variant, FatalVariant::NullMethodCall);

        let missing = dir.path().join("missing.toml");
        assert!(Config::load(Some(missing.as_path())).is_err());
    }
}
