use tracing::error;

/// Destination of the reports written when an action fails.
#[cfg_attr(test, mockall::automock)]
pub trait ErrorSink: Send + Sync {
    fn report(&self, message: &str);
}

/// Forwards reports to the `tracing` subscriber at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, message: &str) {
        error!("{message}");
    }
}
