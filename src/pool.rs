use std::{
	num::NonZeroUsize,
	ops::{Deref, DerefMut},
	sync::{Arc, Mutex, MutexGuard},
};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

use super::{
	accessor::{Accessor, ContainerBackend},
	error::Error,
};

/// Bounded recycling pool of container accessors.
///
/// Accessors are constructed lazily, on first demand or whenever the idle set
/// is empty, and returned to the idle set instead of being closed so that many
/// resources can be read without re-opening the container each time. An
/// accessor is either idle in the pool or checked out to exactly one caller;
/// the [`PooledAccessor`] guard makes returning it on every exit path
/// automatic and makes releasing a non-checked-out accessor unrepresentable.
///
/// Growth policy: unbounded by default. When a capacity is given, `acquire`
/// waits until one of the outstanding accessors is returned.
pub struct AccessorPool<B: ContainerBackend> {
	backend: Arc<B>,
	location: String,
	capacity: Option<Arc<Semaphore>>,
	state: Mutex<PoolState<B::Accessor>>,
}

struct PoolState<A> {
	idle: Vec<A>,
	outstanding: usize,
	closed: bool,
}

impl<B: ContainerBackend> AccessorPool<B> {
	pub fn new(
		backend: Arc<B>,
		location: impl Into<String>,
		capacity: Option<NonZeroUsize>,
	) -> Self {
		Self {
			backend,
			location: location.into(),
			capacity: capacity.map(|capacity| Arc::new(Semaphore::new(capacity.get()))),
			state: Mutex::new(PoolState {
				idle: Vec::new(),
				outstanding: 0,
				closed: false,
			}),
		}
	}

	/// Check out an accessor, waiting for capacity when the pool is bounded.
	///
	/// Fails with [`Error::PoolClosed`] once [`close`](Self::close) has run,
	/// and with [`Error::AccessorConstruction`] when lazy construction fails.
	/// The returned guard releases the accessor back on every exit path.
	pub async fn acquire(self: &Arc<Self>) -> Result<PooledAccessor<B>, Error> {
		let permit = match &self.capacity {
			Some(semaphore) => match Arc::clone(semaphore).acquire_owned().await {
				Ok(permit) => Some(permit),
				Err(_) => return Err(Error::PoolClosed(self.location.clone())),
			},
			None => None,
		};

		{
			let mut state = self.lock_state();
			if state.closed {
				return Err(Error::PoolClosed(self.location.clone()));
			}
			if let Some(accessor) = state.idle.pop() {
				state.outstanding += 1;
				return Ok(PooledAccessor {
					accessor: Some(accessor),
					pool: Arc::clone(self),
					_permit: permit,
				});
			}
		}

		let accessor = self
			.backend
			.accessor()
			.await
			.map_err(|e| Error::construction(&self.location, e))?;

		let mut state = self.lock_state();
		if state.closed {
			// closed while we were constructing; the fresh accessor never
			// enters circulation
			drop(state);
			Self::close_accessor(accessor, &self.location);
			return Err(Error::PoolClosed(self.location.clone()));
		}
		state.outstanding += 1;
		drop(state);

		Ok(PooledAccessor {
			accessor: Some(accessor),
			pool: Arc::clone(self),
			_permit: permit,
		})
	}

	/// Close the pool: mark it closed and tear down every idle accessor.
	/// Outstanding accessors are closed as their guards are dropped, so this
	/// never waits on in-flight users. Idempotent.
	pub fn close(&self) {
		let drained = {
			let mut state = self.lock_state();
			if state.closed {
				return;
			}
			state.closed = true;
			std::mem::take(&mut state.idle)
		};

		if let Some(semaphore) = &self.capacity {
			semaphore.close();
		}

		for accessor in drained {
			Self::close_accessor(accessor, &self.location);
		}
	}

	#[must_use]
	pub fn is_closed(&self) -> bool {
		self.lock_state().closed
	}

	#[must_use]
	pub fn idle_count(&self) -> usize {
		self.lock_state().idle.len()
	}

	#[must_use]
	pub fn outstanding_count(&self) -> usize {
		self.lock_state().outstanding
	}

	fn release(&self, accessor: B::Accessor) {
		let mut state = self.lock_state();
		state.outstanding = state.outstanding.saturating_sub(1);
		if state.closed {
			drop(state);
			Self::close_accessor(accessor, &self.location);
		} else {
			state.idle.push(accessor);
		}
	}

	fn close_accessor(mut accessor: B::Accessor, location: &str) {
		// cleanup must not abort on a single failure
		if let Err(e) = accessor.close() {
			warn!(%location, "Failed to close container accessor: {e:#?}");
		}
	}

	fn lock_state(&self) -> MutexGuard<'_, PoolState<B::Accessor>> {
		match self.state.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		}
	}
}

impl<B: ContainerBackend> Drop for AccessorPool<B> {
	fn drop(&mut self) {
		self.close();
	}
}

/// Scoped checkout of one accessor. Dereferences to the accessor; dropping it
/// returns the accessor to the pool (or closes it, if the pool was closed in
/// the meantime).
pub struct PooledAccessor<B: ContainerBackend> {
	accessor: Option<B::Accessor>,
	pool: Arc<AccessorPool<B>>,
	_permit: Option<OwnedSemaphorePermit>,
}

impl<B: ContainerBackend> Deref for PooledAccessor<B> {
	type Target = B::Accessor;

	fn deref(&self) -> &Self::Target {
		self.accessor
			.as_ref()
			.expect("accessor only vacated on drop")
	}
}

impl<B: ContainerBackend> DerefMut for PooledAccessor<B> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		self.accessor
			.as_mut()
			.expect("accessor only vacated on drop")
	}
}

impl<B: ContainerBackend> Drop for PooledAccessor<B> {
	fn drop(&mut self) {
		if let Some(accessor) = self.accessor.take() {
			self.pool.release(accessor);
		}
	}
}

#[cfg(test)]
mod tests {
	use std::{
		path::PathBuf,
		sync::atomic::{AtomicBool, AtomicUsize, Ordering},
		time::Duration,
	};

	use async_trait::async_trait;
	use chrono::{DateTime, Utc};

	use super::*;
	use crate::accessor::ByteStream;

	#[derive(Debug, Default)]
	struct Counters {
		constructed: AtomicUsize,
		closed: AtomicUsize,
		fail_construction: AtomicBool,
	}

	#[derive(Default)]
	struct TestBackend {
		counters: Arc<Counters>,
	}

	struct TestAccessor {
		id: usize,
		counters: Arc<Counters>,
	}

	#[async_trait]
	impl Accessor for TestAccessor {
		type Buffer = Vec<u8>;
		type Error = std::io::Error;

		async fn list(&mut self) -> Result<Vec<String>, Self::Error> {
			Ok(Vec::new())
		}

		async fn open(&mut self, _path: &str) -> Result<ByteStream, Self::Error> {
			Ok(Box::new(std::io::Cursor::new(Vec::new())))
		}

		async fn read(&mut self, _path: &str) -> Result<Self::Buffer, Self::Error> {
			Ok(Vec::new())
		}

		fn release(&mut self, _buffer: Self::Buffer) {}

		fn close(&mut self) -> Result<(), Self::Error> {
			self.counters.closed.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
	}

	#[async_trait]
	impl ContainerBackend for TestBackend {
		type Accessor = TestAccessor;

		async fn accessor(&self) -> Result<TestAccessor, std::io::Error> {
			if self.counters.fail_construction.load(Ordering::SeqCst) {
				return Err(std::io::Error::other("construction refused"));
			}
			Ok(TestAccessor {
				id: self.counters.constructed.fetch_add(1, Ordering::SeqCst),
				counters: Arc::clone(&self.counters),
			})
		}

		async fn last_modified(&self) -> Option<(PathBuf, DateTime<Utc>)> {
			None
		}
	}

	fn test_pool(capacity: Option<NonZeroUsize>) -> (Arc<AccessorPool<TestBackend>>, Arc<Counters>) {
		let backend = Arc::new(TestBackend::default());
		let counters = Arc::clone(&backend.counters);
		(
			Arc::new(AccessorPool::new(backend, "test://pool", capacity)),
			counters,
		)
	}

	#[tokio::test]
	async fn constructs_lazily_and_recycles() {
		let (pool, counters) = test_pool(None);

		let first = pool.acquire().await.expect("first acquire");
		assert_eq!(first.id, 0);
		assert_eq!(pool.outstanding_count(), 1);
		drop(first);
		assert_eq!(pool.idle_count(), 1);

		let second = pool.acquire().await.expect("second acquire");
		assert_eq!(second.id, 0, "idle accessor is reused, not reconstructed");
		assert_eq!(counters.constructed.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn concurrent_checkouts_never_share_an_accessor() {
		let (pool, _) = test_pool(None);

		let a = pool.acquire().await.expect("acquire a");
		let b = pool.acquire().await.expect("acquire b");
		assert_ne!(a.id, b.id);
		assert_eq!(pool.outstanding_count(), 2);
		assert_eq!(pool.idle_count(), 0);

		drop(a);
		drop(b);
		assert_eq!(pool.outstanding_count(), 0);
		assert_eq!(pool.idle_count(), 2);
	}

	#[tokio::test]
	async fn close_tears_down_idle_and_later_released_accessors() {
		let (pool, counters) = test_pool(None);

		let outstanding = pool.acquire().await.expect("acquire outstanding");
		let idle = pool.acquire().await.expect("acquire idle-to-be");
		drop(idle);
		assert_eq!(pool.idle_count(), 1);

		pool.close();
		assert_eq!(counters.closed.load(Ordering::SeqCst), 1, "idle closed now");

		drop(outstanding);
		assert_eq!(
			counters.closed.load(Ordering::SeqCst),
			2,
			"outstanding closed on release, not recycled"
		);
		assert_eq!(pool.idle_count(), 0);

		assert!(matches!(
			pool.acquire().await,
			Err(Error::PoolClosed(location)) if location == "test://pool"
		));
	}

	#[tokio::test]
	async fn close_is_idempotent() {
		let (pool, counters) = test_pool(None);
		drop(pool.acquire().await.expect("acquire"));

		pool.close();
		pool.close();
		assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn construction_failure_surfaces_to_the_caller() {
		let (pool, counters) = test_pool(None);
		counters.fail_construction.store(true, Ordering::SeqCst);

		assert!(matches!(
			pool.acquire().await,
			Err(Error::AccessorConstruction { location, .. }) if location == "test://pool"
		));
		assert_eq!(pool.outstanding_count(), 0);
	}

	#[tokio::test]
	async fn bounded_pool_waits_for_a_returned_accessor() {
		let (pool, _) = test_pool(NonZeroUsize::new(1));

		let held = pool.acquire().await.expect("acquire under capacity");

		let waiting = {
			let pool = Arc::clone(&pool);
			tokio::spawn(async move { pool.acquire().await.map(|guard| guard.id) })
		};

		tokio::time::sleep(Duration::from_millis(50)).await;
		assert!(!waiting.is_finished(), "second acquire must wait");

		drop(held);
		let reused = waiting
			.await
			.expect("join waiter")
			.expect("acquire after release");
		assert_eq!(reused, 0);
	}
}
