use std::{
	io,
	ops::Deref,
	pin::Pin,
	sync::{
		atomic::{AtomicI64, Ordering},
		Arc,
	},
	task::{Context, Poll},
};

use tokio::{
	io::{AsyncRead, ReadBuf},
	sync::{Mutex, MutexGuard},
};
use tracing::warn;

use super::{
	accessor::{Accessor, AccessorBuffer, ByteStream, ContainerBackend},
	container::Container,
	error::Error,
	pool::PooledAccessor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
	Unopened,
	Open,
	Closed,
}

/// One accepted member of a container.
///
/// A resource checks an accessor out of its container's pool on first
/// `open`/`read_buffer` and holds it until [`close`](Self::close), which
/// releases any materialized buffer back to the accessor and then recycles the
/// accessor to the pool (the accessor stays open for reuse by sibling
/// resources). `close` is terminal and idempotent. All operations on one
/// resource are serialized by an internal lock.
pub struct Resource<B: ContainerBackend> {
	path: String,
	container: Container<B>,
	length: AtomicI64,
	state: Mutex<ResourceInner<B>>,
}

struct ResourceInner<B: ContainerBackend> {
	status: Status,
	accessor: Option<PooledAccessor<B>>,
	buffer: Option<AccessorBuffer<B>>,
}

impl<B: ContainerBackend> Resource<B> {
	pub(crate) fn new(container: Container<B>, path: String) -> Self {
		Self {
			path,
			container,
			length: AtomicI64::new(-1),
			state: Mutex::new(ResourceInner {
				status: Status::Unopened,
				accessor: None,
				buffer: None,
			}),
		}
	}

	#[must_use]
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Byte length of this resource, or `-1` while unknown. Known after
	/// [`read_buffer`](Self::read_buffer) or [`load`](Self::load); streaming
	/// via [`open`](Self::open) cannot determine a length up front.
	#[must_use]
	pub fn length(&self) -> i64 {
		self.length.load(Ordering::Acquire)
	}

	#[must_use]
	pub fn container_location(&self) -> &str {
		self.container.location()
	}

	/// Open this resource as a byte stream. The stream reports no length;
	/// closing (or dropping) it closes this handle.
	pub async fn open(self: &Arc<Self>) -> Result<ResourceStream<B>, Error> {
		let mut state = self.state.lock().await;
		self.ensure_operable(&state)?;
		self.ensure_accessor(&mut state).await?;

		let opened = match state.accessor.as_mut() {
			Some(accessor) => accessor.open(&self.path).await,
			None => return Err(self.state_error("accessor vanished mid-open")),
		};

		match opened {
			Ok(stream) => {
				state.status = Status::Open;
				self.length.store(-1, Ordering::Release);
				Ok(ResourceStream {
					stream: Some(stream),
					resource: Some(Arc::clone(self)),
				})
			}
			Err(e) => {
				// don't leak a half-acquired accessor
				let e = Error::read(&self.path, e);
				Self::close_locked(&mut state);
				Err(e)
			}
		}
	}

	/// Materialize this resource as a buffer.
	///
	/// The returned guard borrows the handle; drop it and call
	/// [`close`](Self::close) to release the buffer back to the accessor.
	pub async fn read_buffer(&self) -> Result<BufferRef<'_, B>, Error> {
		let mut state = self.state.lock().await;
		self.ensure_operable(&state)?;
		self.ensure_accessor(&mut state).await?;

		let read = match state.accessor.as_mut() {
			Some(accessor) => accessor.read(&self.path).await,
			None => return Err(self.state_error("accessor vanished mid-read")),
		};

		match read {
			Ok(buffer) => {
				self.length.store(
					i64::try_from(buffer.as_ref().len()).unwrap_or(i64::MAX),
					Ordering::Release,
				);
				state.status = Status::Open;
				state.buffer = Some(buffer);
				Ok(BufferRef { state })
			}
			Err(e) => {
				let e = Error::read(&self.path, e);
				Self::close_locked(&mut state);
				Err(e)
			}
		}
	}

	/// Read this resource into an owned byte vector, closing the handle on
	/// every exit path.
	pub async fn load(&self) -> Result<Vec<u8>, Error> {
		let bytes = match self.read_buffer().await {
			Ok(buffer) => buffer.to_vec(),
			// read_buffer already closed the handle
			Err(e) => return Err(e),
		};
		self.close().await;
		Ok(bytes)
	}

	/// Release any materialized buffer back to the accessor and recycle the
	/// accessor to the pool. Terminal and idempotent: closing twice is a
	/// no-op, and the buffer is never double-released.
	pub async fn close(&self) {
		let mut state = self.state.lock().await;
		Self::close_locked(&mut state);
	}

	fn close_locked(state: &mut ResourceInner<B>) {
		if state.status == Status::Closed {
			return;
		}
		if let Some(buffer) = state.buffer.take() {
			if let Some(accessor) = state.accessor.as_mut() {
				accessor.release(buffer);
			}
		}
		// guard drop returns the accessor to the pool, it is not closed here
		state.accessor = None;
		state.status = Status::Closed;
	}

	fn ensure_operable(&self, state: &ResourceInner<B>) -> Result<(), Error> {
		if self.container.is_skipped() {
			return Err(Error::ContainerUnavailable {
				location: self.container.location().to_owned(),
				path: self.path.clone(),
			});
		}
		match state.status {
			Status::Unopened => Ok(()),
			Status::Open => Err(self.state_error("resource is already open")),
			Status::Closed => Err(self.state_error("resource is already closed")),
		}
	}

	async fn ensure_accessor(&self, state: &mut ResourceInner<B>) -> Result<(), Error> {
		if state.accessor.is_none() {
			state.accessor = Some(self.container.acquire_accessor().await?);
		}
		Ok(())
	}

	fn state_error(&self, message: &str) -> Error {
		Error::read(&self.path, io::Error::other(message.to_owned()))
	}
}

/// View over the buffer materialized by [`Resource::read_buffer`]. Holding it
/// keeps the handle's internal lock, so per-handle serialization extends over
/// the caller's use of the bytes.
pub struct BufferRef<'a, B: ContainerBackend> {
	state: MutexGuard<'a, ResourceInner<B>>,
}

impl<B: ContainerBackend> Deref for BufferRef<'_, B> {
	type Target = [u8];

	fn deref(&self) -> &[u8] {
		self.state.buffer.as_ref().map_or(&[], AsRef::as_ref)
	}
}

/// Byte stream over one resource. Closing it closes the owning resource
/// handle; dropping it without closing falls back to a spawned close.
pub struct ResourceStream<B: ContainerBackend> {
	stream: Option<ByteStream>,
	resource: Option<Arc<Resource<B>>>,
}

impl<B: ContainerBackend> ResourceStream<B> {
	pub async fn close(mut self) {
		self.stream.take();
		if let Some(resource) = self.resource.take() {
			resource.close().await;
		}
	}
}

impl<B: ContainerBackend> AsyncRead for ResourceStream<B> {
	fn poll_read(
		mut self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		buf: &mut ReadBuf<'_>,
	) -> Poll<io::Result<()>> {
		match self.stream.as_mut() {
			Some(stream) => Pin::new(stream).poll_read(cx, buf),
			None => Poll::Ready(Ok(())),
		}
	}
}

impl<B: ContainerBackend> Drop for ResourceStream<B> {
	fn drop(&mut self) {
		self.stream.take();
		if let Some(resource) = self.resource.take() {
			if let Ok(handle) = tokio::runtime::Handle::try_current() {
				handle.spawn(async move { resource.close().await });
			} else {
				warn!(
					path = %resource.path(),
					"Resource stream dropped outside a runtime; handle not closed"
				);
			}
		}
	}
}
