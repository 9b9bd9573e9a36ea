use std::{
	num::NonZeroUsize,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use super::{
	accessor::ContainerBackend,
	error::Error,
	pool::{AccessorPool, PooledAccessor},
};

/// Lifecycle of a container. A container moves through `Scanning` into
/// `Scanned` or `Skipped` at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
	Unscanned,
	Scanning,
	Scanned,
	Skipped,
}

/// One scannable container: a location, an optional human-readable name, and
/// the accessor pool owned 1:1 by this container.
///
/// Cheap to clone; clones share the same underlying container.
pub struct Container<B: ContainerBackend> {
	inner: Arc<Inner<B>>,
}

struct Inner<B: ContainerBackend> {
	backend: Arc<B>,
	location: String,
	name: Option<String>,
	pool: Arc<AccessorPool<B>>,
	scan_started: AtomicBool,
	scanned: AtomicBool,
	skipped: AtomicBool,
}

impl<B: ContainerBackend> Clone for Container<B> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<B: ContainerBackend> Container<B> {
	/// Container with an unbounded accessor pool.
	pub fn new(backend: B, location: impl Into<String>, name: Option<String>) -> Self {
		Self::build(backend, location.into(), name, None)
	}

	/// Container whose pool hands out at most `capacity` accessors at once.
	pub fn with_pool_capacity(
		backend: B,
		location: impl Into<String>,
		name: Option<String>,
		capacity: NonZeroUsize,
	) -> Self {
		Self::build(backend, location.into(), name, Some(capacity))
	}

	fn build(
		backend: B,
		location: String,
		name: Option<String>,
		capacity: Option<NonZeroUsize>,
	) -> Self {
		let backend = Arc::new(backend);
		let pool = Arc::new(AccessorPool::new(
			Arc::clone(&backend),
			location.clone(),
			capacity,
		));

		Self {
			inner: Arc::new(Inner {
				backend,
				location,
				name,
				pool,
				scan_started: AtomicBool::new(false),
				scanned: AtomicBool::new(false),
				skipped: AtomicBool::new(false),
			}),
		}
	}

	#[must_use]
	pub fn location(&self) -> &str {
		&self.inner.location
	}

	#[must_use]
	pub fn name(&self) -> Option<&str> {
		self.inner.name.as_deref()
	}

	/// Label used in log entries: the name when present, the location
	/// otherwise.
	#[must_use]
	pub fn label(&self) -> &str {
		self.inner.name.as_deref().unwrap_or(&self.inner.location)
	}

	#[must_use]
	pub fn state(&self) -> ContainerState {
		if self.inner.skipped.load(Ordering::Acquire) {
			ContainerState::Skipped
		} else if self.inner.scanned.load(Ordering::Acquire) {
			ContainerState::Scanned
		} else if self.inner.scan_started.load(Ordering::Acquire) {
			ContainerState::Scanning
		} else {
			ContainerState::Unscanned
		}
	}

	#[must_use]
	pub fn is_skipped(&self) -> bool {
		self.inner.skipped.load(Ordering::Acquire)
	}

	#[must_use]
	pub fn pool(&self) -> &Arc<AccessorPool<B>> {
		&self.inner.pool
	}

	/// Close the owned pool, tearing down its idle accessors. Resources of
	/// this container fail on any subsequent read.
	pub fn close(&self) {
		self.inner.pool.close();
	}

	pub(crate) fn backend(&self) -> &Arc<B> {
		&self.inner.backend
	}

	pub(crate) async fn acquire_accessor(&self) -> Result<PooledAccessor<B>, Error> {
		self.inner.pool.acquire().await
	}

	/// Claim the single scan of this container. Scanning twice is an invariant
	/// violation in the orchestrating caller and fails loudly.
	pub(crate) fn begin_scan(&self) -> Result<(), Error> {
		if self.inner.scan_started.swap(true, Ordering::AcqRel) {
			return Err(Error::AlreadyScanned(self.inner.location.clone()));
		}
		Ok(())
	}

	pub(crate) fn finish_scan(&self) {
		self.inner.scanned.store(true, Ordering::Release);
	}

	pub(crate) fn mark_skipped(&self) {
		self.inner.skipped.store(true, Ordering::Release);
	}
}
