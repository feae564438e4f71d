//! Platform user-presence collaborator.
//!
//! The vault never sees biometric data. It only learns whether a platform
//! authenticator exists, gets an opaque reference back from enrollment and a
//! pass/fail answer from each assertion.

use std::time::Duration;

/// How long an assertion may wait for the user before it counts as failed.
pub const ASSERTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Label shown by the platform when enrolling.
pub const ENROLLMENT_LABEL: &str = "Card Vault User";

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("no platform authenticator available")]
    Unavailable,
    #[error("user presence was not confirmed")]
    Rejected,
    #[error("timed out waiting for user presence")]
    Timeout,
    #[error("platform authenticator error: {0}")]
    Platform(String),
}

pub trait PresenceGate {
    fn is_available(&self) -> bool;

    /// Enroll a credential bound to `user_handle` and return its opaque
    /// reference.
    fn enroll(&self, user_handle: &str, display_label: &str) -> Result<String, GateError>;

    /// Ask the user to confirm presence for the enrolled credential, waiting
    /// at most `timeout`.
    fn assert(&self, credential_ref: &str, timeout: Duration) -> Result<(), GateError>;
}

/// Gate for environments without a platform authenticator.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuthenticator;

impl PresenceGate for NoAuthenticator {
    fn is_available(&self) -> bool {
        false
    }

    fn enroll(&self, _user_handle: &str, _display_label: &str) -> Result<String, GateError> {
        Err(GateError::Unavailable)
    }

    fn assert(&self, _credential_ref: &str, _timeout: Duration) -> Result<(), GateError> {
        Err(GateError::Unavailable)
    }
}
