use std::{
	io,
	path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;

use super::super::accessor::{Accessor, ByteStream, ContainerBackend};

/// Container kind backed by a directory tree on the host filesystem.
///
/// Member paths are `/`-separated and relative to the root; subdirectories are
/// listed with a trailing `/` marker. Accessor construction is cheap here
/// compared to archive or module backends, but still validates the root so
/// construction failures surface at `acquire` time like everywhere else.
pub struct DirectoryBackend {
	root: PathBuf,
}

impl DirectoryBackend {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	#[must_use]
	pub fn root(&self) -> &Path {
		&self.root
	}
}

#[async_trait]
impl ContainerBackend for DirectoryBackend {
	type Accessor = DirectoryAccessor;

	async fn accessor(&self) -> Result<DirectoryAccessor, io::Error> {
		if !fs::metadata(&self.root).await?.is_dir() {
			return Err(io::Error::other(format!(
				"not a directory: '{}'",
				self.root.display()
			)));
		}
		Ok(DirectoryAccessor {
			root: self.root.clone(),
		})
	}

	async fn last_modified(&self) -> Option<(PathBuf, DateTime<Utc>)> {
		let modified = fs::metadata(&self.root).await.ok()?.modified().ok()?;
		Some((self.root.clone(), DateTime::<Utc>::from(modified)))
	}
}

pub struct DirectoryAccessor {
	root: PathBuf,
}

#[async_trait]
impl Accessor for DirectoryAccessor {
	type Buffer = Vec<u8>;
	type Error = io::Error;

	async fn list(&mut self) -> Result<Vec<String>, io::Error> {
		let mut paths = Vec::new();
		let mut pending = vec![String::new()];

		while let Some(relative_dir) = pending.pop() {
			let absolute = if relative_dir.is_empty() {
				self.root.clone()
			} else {
				self.root.join(&relative_dir)
			};

			// We must not keep `entry` around or we will quickly hit the OS
			// limit on open file descriptors
			let mut read_dir = fs::read_dir(&absolute).await?;
			while let Some(entry) = read_dir.next_entry().await? {
				let name = entry
					.file_name()
					.to_str()
					.ok_or_else(|| {
						io::Error::new(io::ErrorKind::InvalidData, "non UTF-8 path")
					})?
					.to_owned();

				let relative_path = if relative_dir.is_empty() {
					name
				} else {
					format!("{relative_dir}/{name}")
				};

				if entry.file_type().await?.is_dir() {
					paths.push(format!("{relative_path}/"));
					pending.push(relative_path);
				} else {
					paths.push(relative_path);
				}
			}
		}

		Ok(paths)
	}

	async fn open(&mut self, path: &str) -> Result<ByteStream, io::Error> {
		Ok(Box::new(fs::File::open(self.root.join(path)).await?))
	}

	async fn read(&mut self, path: &str) -> Result<Vec<u8>, io::Error> {
		fs::read(self.root.join(path)).await
	}

	fn release(&mut self, _buffer: Vec<u8>) {
		// plain owned buffers, nothing to hand back
	}

	fn close(&mut self) -> Result<(), io::Error> {
		Ok(())
	}
}
