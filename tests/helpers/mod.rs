#![allow(dead_code)]

use std::{
	collections::BTreeMap,
	io,
	path::PathBuf,
	sync::{
		atomic::{AtomicBool, AtomicUsize, Ordering},
		Arc, Mutex,
	},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Barrier;

use sd_scan::{Accessor, ByteStream, Container, ContainerBackend, ScanLog};

/// Counters shared between a [`MemoryBackend`] and all its accessors.
#[derive(Debug, Default)]
pub struct BackendStats {
	pub constructed: AtomicUsize,
	pub closed: AtomicUsize,
	pub released_buffers: AtomicUsize,
}

impl BackendStats {
	pub fn constructed(&self) -> usize {
		self.constructed.load(Ordering::SeqCst)
	}

	pub fn closed(&self) -> usize {
		self.closed.load(Ordering::SeqCst)
	}

	pub fn released_buffers(&self) -> usize {
		self.released_buffers.load(Ordering::SeqCst)
	}
}

/// In-memory container kind: a fixed member listing (in deliberately
/// unsorted insertion order) plus per-member contents, with instrumented
/// accessors for asserting pool behavior.
pub struct MemoryBackend {
	listing: Vec<String>,
	contents: Arc<BTreeMap<String, Vec<u8>>>,
	pub stats: Arc<BackendStats>,
	fail_listing: AtomicBool,
	read_barrier: Option<Arc<Barrier>>,
}

impl MemoryBackend {
	/// Entries keep their given order in `list()`; directory markers are
	/// entries ending in `/`.
	pub fn new(entries: &[(&str, &[u8])]) -> Self {
		Self {
			listing: entries.iter().map(|(path, _)| (*path).to_owned()).collect(),
			contents: Arc::new(
				entries
					.iter()
					.filter(|(path, _)| !path.ends_with('/'))
					.map(|(path, bytes)| ((*path).to_owned(), bytes.to_vec()))
					.collect(),
			),
			stats: Arc::default(),
			fail_listing: AtomicBool::new(false),
			read_barrier: None,
		}
	}

	pub fn failing_listing(entries: &[(&str, &[u8])]) -> Self {
		let backend = Self::new(entries);
		backend.fail_listing.store(true, Ordering::SeqCst);
		backend
	}

	/// Every `read` call rendezvouses on `barrier` before returning, so a
	/// test can force N reads to be in flight at once.
	pub fn with_read_barrier(mut self, barrier: Arc<Barrier>) -> Self {
		self.read_barrier = Some(barrier);
		self
	}

	pub fn stats(&self) -> Arc<BackendStats> {
		Arc::clone(&self.stats)
	}
}

pub struct MemoryAccessor {
	pub id: usize,
	listing: Vec<String>,
	contents: Arc<BTreeMap<String, Vec<u8>>>,
	stats: Arc<BackendStats>,
	fail_listing: bool,
	read_barrier: Option<Arc<Barrier>>,
}

#[async_trait]
impl Accessor for MemoryAccessor {
	type Buffer = Vec<u8>;
	type Error = io::Error;

	async fn list(&mut self) -> Result<Vec<String>, io::Error> {
		if self.fail_listing {
			return Err(io::Error::other("listing refused"));
		}
		Ok(self.listing.clone())
	}

	async fn open(&mut self, path: &str) -> Result<ByteStream, io::Error> {
		let bytes = self
			.contents
			.get(path)
			.cloned()
			.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_owned()))?;
		Ok(Box::new(io::Cursor::new(bytes)))
	}

	async fn read(&mut self, path: &str) -> Result<Vec<u8>, io::Error> {
		if let Some(barrier) = &self.read_barrier {
			barrier.wait().await;
		}
		self.contents
			.get(path)
			.cloned()
			.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_owned()))
	}

	fn release(&mut self, _buffer: Vec<u8>) {
		self.stats.released_buffers.fetch_add(1, Ordering::SeqCst);
	}

	fn close(&mut self) -> Result<(), io::Error> {
		self.stats.closed.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

#[async_trait]
impl ContainerBackend for MemoryBackend {
	type Accessor = MemoryAccessor;

	async fn accessor(&self) -> Result<MemoryAccessor, io::Error> {
		Ok(MemoryAccessor {
			id: self.stats.constructed.fetch_add(1, Ordering::SeqCst),
			listing: self.listing.clone(),
			contents: Arc::clone(&self.contents),
			stats: Arc::clone(&self.stats),
			fail_listing: self.fail_listing.load(Ordering::SeqCst),
			read_barrier: self.read_barrier.clone(),
		})
	}

	async fn last_modified(&self) -> Option<(PathBuf, DateTime<Utc>)> {
		None
	}
}

pub fn memory_container(
	location: &str,
	entries: &[(&str, &[u8])],
) -> (Container<MemoryBackend>, Arc<BackendStats>) {
	let backend = MemoryBackend::new(entries);
	let stats = backend.stats();
	(
		Container::new(backend, location.to_owned(), None),
		stats,
	)
}

/// [`ScanLog`] sink collecting entries for assertions.
#[derive(Debug, Default)]
pub struct CollectingLog {
	entries: Mutex<Vec<(String, String)>>,
}

impl CollectingLog {
	pub fn entries(&self) -> Vec<(String, String)> {
		self.entries.lock().unwrap().clone()
	}

	pub fn has_entry_for(&self, container: &str, needle: &str) -> bool {
		self.entries
			.lock()
			.unwrap()
			.iter()
			.any(|(label, message)| label == container && message.contains(needle))
	}
}

impl ScanLog for CollectingLog {
	fn entry(&self, container: &str, message: &str) {
		self.entries
			.lock()
			.unwrap()
			.push((container.to_owned(), message.to_owned()));
	}

	fn entry_with_cause(&self, container: &str, message: &str, cause: &dyn std::error::Error) {
		self.entries
			.lock()
			.unwrap()
			.push((container.to_owned(), format!("{message}: {cause}")));
	}
}
