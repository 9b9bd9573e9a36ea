use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;

/// Byte stream handed out by [`Accessor::open`]. Streaming reads don't expose
/// a length up front, so resources opened this way report their length as `-1`.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// An open handle into one container, able to enumerate member paths and read
/// their bytes.
///
/// Accessors are assumed to be expensive to construct (opening an archive,
/// resolving a module reader, etc.), which is why they are recycled through an
/// [`AccessorPool`](crate::AccessorPool) instead of being re-created per
/// resource. An accessor is never used by two callers at once: it is either
/// idle inside the pool or checked out to exactly one caller.
#[async_trait]
pub trait Accessor: Send + 'static {
	/// Buffer type produced by [`read`](Accessor::read). Must be handed back
	/// through [`release`](Accessor::release) once the caller is done with it.
	type Buffer: AsRef<[u8]> + Send + 'static;
	type Error: std::error::Error + Send + Sync + 'static;

	/// List all member paths of the container, `/`-separated and relative to
	/// the container root. Directory entries carry a trailing `/` and are
	/// never materialized as resources.
	async fn list(&mut self) -> Result<Vec<String>, Self::Error>;

	/// Open one member as a byte stream.
	async fn open(&mut self, path: &str) -> Result<ByteStream, Self::Error>;

	/// Materialize one member as a buffer.
	async fn read(&mut self, path: &str) -> Result<Self::Buffer, Self::Error>;

	/// Give a buffer obtained from [`read`](Accessor::read) back to the
	/// accessor. Implementations that don't track buffers just drop it here;
	/// release failures must be handled (logged) internally.
	fn release(&mut self, buffer: Self::Buffer);

	/// Tear down the underlying native handle. Only called by the pool, once,
	/// when the accessor leaves circulation.
	fn close(&mut self) -> Result<(), Self::Error>;
}

/// A kind of container (directory tree, archive, runtime module, ...) that
/// knows how to construct accessors into itself.
#[async_trait]
pub trait ContainerBackend: Send + Sync + 'static {
	type Accessor: Accessor;

	/// Construct a fresh accessor. Called lazily by the pool, on first demand
	/// or whenever the idle set is empty.
	async fn accessor(&self) -> Result<Self::Accessor, AccessorError<Self>>;

	/// Identity and last-modified timestamp of the backing host file, when
	/// determinable, for staleness decisions made by collaborators.
	async fn last_modified(&self) -> Option<(PathBuf, DateTime<Utc>)>;
}

/// Error type of a backend's accessor.
pub type AccessorError<B> = <<B as ContainerBackend>::Accessor as Accessor>::Error;

/// Buffer type of a backend's accessor.
pub type AccessorBuffer<B> = <<B as ContainerBackend>::Accessor as Accessor>::Buffer;
