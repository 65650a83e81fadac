//! Error code contract shared by service errors.
//!
//! Every service error carries a stable, grepable code (`E_*`) and a
//! retryability hint. Route handlers put both on the JSON error body; the
//! chat orchestrator puts both on in-band `error` stream parts.

pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
