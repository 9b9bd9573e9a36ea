use thiserror::Error;

/// Boxed source for failures coming out of a container backend, so the
/// crate-level error type stays independent of the backend in use.
pub type BackendSource = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
	#[error("failed to construct container accessor <location='{location}'>")]
	AccessorConstruction {
		location: String,
		#[source]
		source: BackendSource,
	},

	#[error("accessor pool already closed <location='{0}'>")]
	PoolClosed(String),

	#[error("failed to list container contents <location='{location}'>")]
	Listing {
		location: String,
		#[source]
		source: BackendSource,
	},

	#[error("failed to read resource <path='{path}'>")]
	Read {
		path: String,
		#[source]
		source: BackendSource,
	},

	#[error("container already scanned <location='{0}'>")]
	AlreadyScanned(String),

	#[error("container unavailable <location='{location}', path='{path}'>")]
	ContainerUnavailable { location: String, path: String },
}

impl Error {
	pub(crate) fn construction(
		location: impl Into<String>,
		source: impl std::error::Error + Send + Sync + 'static,
	) -> Self {
		Self::AccessorConstruction {
			location: location.into(),
			source: Box::new(source),
		}
	}

	pub(crate) fn listing(
		location: impl Into<String>,
		source: impl std::error::Error + Send + Sync + 'static,
	) -> Self {
		Self::Listing {
			location: location.into(),
			source: Box::new(source),
		}
	}

	pub(crate) fn read(
		path: impl Into<String>,
		source: impl std::error::Error + Send + Sync + 'static,
	) -> Self {
		Self::Read {
			path: path.into(),
			source: Box::new(source),
		}
	}
}
