use tracing::{info, warn};

/// Sink for the human-readable scan trail, one entry per noteworthy event,
/// always labeled with the container it concerns.
///
/// Scanning functions take an `Option<&dyn ScanLog>`; passing `None` means "no
/// logging requested" and every call becomes a no-op. Implementations must be
/// safe for concurrent use, as workers scanning different containers share the
/// same sink.
pub trait ScanLog: Send + Sync {
	fn entry(&self, container: &str, message: &str);

	fn entry_with_cause(&self, container: &str, message: &str, cause: &dyn std::error::Error);
}

/// [`ScanLog`] adapter that forwards entries to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingScanLog;

impl ScanLog for TracingScanLog {
	fn entry(&self, container: &str, message: &str) {
		info!(%container, "{message}");
	}

	fn entry_with_cause(&self, container: &str, message: &str, cause: &dyn std::error::Error) {
		warn!(%container, "{message}: {cause:#?}");
	}
}
