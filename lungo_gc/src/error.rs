//! Error handling for the Lungo garbage collector.
//!
//! The collector has no user-visible errors on the hot paths: `inc_ref`,
//! `dec_ref` and `assign` either succeed or diagnose a bug through logging.
//! Only the lifecycle operations that manage the worker thread are fallible.

/// Lungo garbage collector result type
///
/// This is a type alias for the standard library's
/// [`Result`](core::result::Result) type with the error type defaulting to
/// [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors that can occur while managing the collector's lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The worker thread could not be spawned
    #[error("failed to spawn collector worker: {0}")]
    Spawn(#[from] std::io::Error),
    /// Thread synchronization error
    #[error("collector synchronization error: {0}")]
    Sync(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_error_from_io() {
        let io = std::io::Error::other("no threads left");
        let error: Error = io.into();
        assert!(matches!(error, Error::Spawn(_)));
        assert!(error.to_string().contains("no threads left"));
    }
}
