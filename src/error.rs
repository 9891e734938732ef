// src/error.rs
//
// Session-level failures. Degraded and transient conditions (role grant
// failure, propagation timeout, rollback hiccups) are logged as warnings and
// never become an `AccessError`.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network access cannot be established.
    Blocking,
    /// Invalid or declined interactive choice.
    UserInput,
    /// Everything else that ends the session.
    Fatal,
}

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("not authenticated: {0}")]
    Authentication(String),

    #[error("could not resolve vault: {0}")]
    ResourceResolution(String),

    #[error("network access blocked: {0}")]
    Blocked(String),

    #[error("protected operation failed: {0}")]
    Operation(String),

    #[error("selection aborted: {0}")]
    Selection(String),

    #[error("session interrupted")]
    Interrupted,
}

impl AccessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccessError::Blocked(_) => ErrorKind::Blocking,
            AccessError::Selection(_) => ErrorKind::UserInput,
            AccessError::Config(_)
            | AccessError::Authentication(_)
            | AccessError::ResourceResolution(_)
            | AccessError::Operation(_)
            | AccessError::Interrupted => ErrorKind::Fatal,
        }
    }

    /// Process exit status. Always non-zero.
    pub fn exit_code(&self) -> i32 {
        match self {
            AccessError::Config(_) => 78,
            AccessError::Interrupted => 130,
            AccessError::Blocked(_) => 3,
            AccessError::Selection(_) => 2,
            AccessError::Authentication(_)
            | AccessError::ResourceResolution(_)
            | AccessError::Operation(_) => 1,
        }
    }
}
