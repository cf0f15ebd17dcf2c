//! Error taxonomy for the context engine.
//!
//! Errors fall into four bands: caller errors are returned before any
//! upstream work, soft upstream failures are accumulated as strings on the
//! `ResourceContext` being built, hard upstream failures abort the request,
//! and programmer errors are allowed to panic.

use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// The request was malformed or missing required fields.
    #[error("invalid request: {0}")]
    InvalidInput(String),

    /// A resource kind could not be resolved, even after discovery.
    #[error("unknown resource kind: {0}")]
    UnknownKind(String),

    /// A referenced object does not exist upstream.
    #[error("{0} not found")]
    NotFound(String),

    /// An upstream service failed hard (unreachable, 5xx after retries,
    /// undecodable response).
    #[error("{service} error: {message}")]
    Upstream { service: &'static str, message: String },

    /// An upstream rejected our credentials and the refresh path failed.
    #[error("{service} authentication failed: {message}")]
    UpstreamAuth { service: &'static str, message: String },

    /// The completion provider failed.
    #[error("completion failed: {0}")]
    Llm(String),

    /// Configuration could not be loaded or validated.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal invariant violations surfaced as errors rather than panics.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code carried on the wire.
    pub fn wire_code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) | Error::UnknownKind(_) => "invalid_request",
            Error::NotFound(_) => "not_found",
            Error::Upstream { .. } => "upstream_unavailable",
            Error::UpstreamAuth { .. } => "upstream_auth",
            Error::Llm(_) => "llm_error",
            Error::Config(_) | Error::Internal(_) => "internal",
        }
    }

    /// Shorthand for an upstream failure attributed to a named service.
    pub fn upstream(service: &'static str, err: impl std::fmt::Display) -> Self {
        Error::Upstream { service, message: err.to_string() }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(format!("serialization failed: {err}"))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_are_stable() {
        assert_eq!(Error::InvalidInput("x".into()).wire_code(), "invalid_request");
        assert_eq!(Error::UnknownKind("Widget".into()).wire_code(), "invalid_request");
        assert_eq!(Error::NotFound("pod default/web".into()).wire_code(), "not_found");
        assert_eq!(Error::upstream("argocd", "boom").wire_code(), "upstream_unavailable");
        assert_eq!(
            Error::UpstreamAuth { service: "gitlab", message: "401".into() }.wire_code(),
            "upstream_auth"
        );
        assert_eq!(Error::Llm("timeout".into()).wire_code(), "llm_error");
        assert_eq!(Error::Internal("bug".into()).wire_code(), "internal");
    }

    #[test]
    fn display_includes_service() {
        let err = Error::upstream("gitlab", "connection refused");
        assert_eq!(err.to_string(), "gitlab error: connection refused");
    }
}
