use subtle::ConstantTimeEq;
use thiserror::Error;

/// How a cron invocation reached us.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Trusted local invocation (the `hourbank-cron` binary).
    Cli,
    /// Network trigger carrying the shared secret, if any was supplied.
    Http { key: Option<String> },
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AccessDenied {
    /// No secret is configured, so network triggers fail closed.
    #[error("cron key is not configured")]
    NotConfigured,
    #[error("invalid cron key")]
    InvalidKey,
}

/// Authenticate a cron trigger.
///
/// CLI invocations are trusted unconditionally. Network invocations must
/// present the configured shared secret; the comparison is constant-time and
/// a missing configuration rejects everything rather than allowing open
/// access.
pub fn authorize(configured: Option<&str>, trigger: &Trigger) -> Result<(), AccessDenied> {
    match trigger {
        Trigger::Cli => Ok(()),
        Trigger::Http { key } => {
            let expected = match configured {
                Some(secret) if !secret.is_empty() => secret,
                _ => return Err(AccessDenied::NotConfigured),
            };
            let supplied = key.as_deref().ok_or(AccessDenied::InvalidKey)?;
            if expected.as_bytes().ct_eq(supplied.as_bytes()).into() {
                Ok(())
            } else {
                Err(AccessDenied::InvalidKey)
            }
        }
    }
}
