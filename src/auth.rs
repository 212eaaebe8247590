//! Session-bound nonces and capability checks for the trigger action.
//!
//! A nonce is tied to the action, the session (user + token), the server
//! secret, and a time tick of half the nonce lifetime. It verifies during the
//! tick it was issued in and the one after.

use crate::dispatch::Authorizer;
use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const NONCE_ACTION: &str = "errlog_probe_trigger";
pub const ADMIN_CAPABILITY: &str = "manage_options";

const NONCE_LEN: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    pub user: String,
    pub token: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SessionAuthority {
    session: Session,
    secret: String,
    lifetime_secs: i64,
}

impl SessionAuthority {
    pub fn new(session: Session, secret: impl Into<String>, lifetime_secs: i64) -> Self {
        Self {
            session,
            secret: secret.into(),
            lifetime_secs: lifetime_secs.max(2),
        }
    }

    pub fn user(&self) -> &str {
        &self.session.user
    }

    fn tick(&self, now: i64) -> i64 {
        let half = self.lifetime_secs / 2;
        (now + half - 1).div_euclid(half)
    }

    fn nonce_for_tick(&self, tick: i64, action: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(
            format!(
                "{}|{}|{}|{}|{}",
                tick, action, self.session.user, self.session.token, self.secret
            )
            .as_bytes(),
        );
        let mut digest = hex::encode(hasher.finalize());
        digest.truncate(NONCE_LEN);
        digest
    }

    pub fn create_nonce_at(&self, action: &str, now: i64) -> String {
        self.nonce_for_tick(self.tick(now), action)
    }

    pub fn create_nonce(&self, action: &str) -> String {
        self.create_nonce_at(action, Utc::now().timestamp())
    }

    pub fn verify_nonce_at(&self, nonce: &str, action: &str, now: i64) -> bool {
        if nonce.is_empty() {
            return false;
        }
        let tick = self.tick(now);
        [tick, tick - 1].into_iter().any(|t| {
            let expected = self.nonce_for_tick(t, action);
            bool::from(expected.as_bytes().ct_eq(nonce.as_bytes()))
        })
    }
}

impl Authorizer for SessionAuthority {
    fn verify_nonce(&self, nonce: &str, action: &str) -> bool {
        self.verify_nonce_at(nonce, action, Utc::now().timestamp())
    }

    fn current_user_can(&self, capability: &str) -> bool {
        self.session.capabilities.iter().any(|c| c == capability)
    }
}
