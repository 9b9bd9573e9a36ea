//!
//! # Container Scanner
//!
//! Concurrent scanner over hierarchical "containers" — directory trees,
//! archives, runtime modules, anything exposing a listing of member paths and
//! per-member reads. Member paths are filtered against nested
//! inclusion/exclusion rules with a memoized directory-level decision, and the
//! expensive accessor handles into each container are recycled through a
//! bounded pool so that many resources can be read without re-opening the
//! container for each one.
//!
//! Scanning is best-effort per container: a container that cannot be listed is
//! skipped and logged, never aborting its siblings. Bring your own
//! [`ContainerBackend`] for other container kinds; [`DirectoryBackend`] is
//! provided.
//!
//! ## Basic example
//!
//! ```
//! use sd_scan::{scan, Container, DirectoryBackend, ScanRules};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dir = tempfile::tempdir()?;
//!     std::fs::create_dir(dir.path().join("assets"))?;
//!     std::fs::write(dir.path().join("assets").join("logo.png"), b"png")?;
//!
//!     let rules = ScanRules::builder().accept_subtree("assets").build()?;
//!     let container = Container::new(
//!         DirectoryBackend::new(dir.path()),
//!         format!("file://{}", dir.path().display()),
//!         None,
//!     );
//!
//!     let result = scan(&container, &rules, None).await?;
//!     assert_eq!(result.accepted().len(), 1);
//!     assert_eq!(result.accepted()[0].path(), "assets/logo.png");
//!     assert_eq!(result.accepted()[0].load().await?, b"png".to_vec());
//!
//!     container.close();
//!     Ok(())
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod accessor;
mod backend;
mod container;
mod error;
mod log;
mod matcher;
mod pool;
mod resource;
mod rules;
mod scanner;

pub use accessor::{Accessor, AccessorBuffer, AccessorError, ByteStream, ContainerBackend};
pub use backend::{DirectoryAccessor, DirectoryBackend};
pub use container::{Container, ContainerState};
pub use error::{BackendSource, Error};
pub use log::{ScanLog, TracingScanLog};
pub use matcher::{parent_prefix, DirDecisionCache};
pub use pool::{AccessorPool, PooledAccessor};
pub use resource::{BufferRef, Resource, ResourceStream};
pub use rules::{MatchDecision, PathGate, PathRules, RuleParams, ScanRules, ScanRulesBuilder};
pub use scanner::{
	scan, scan_all, scan_with, Interrupt, ScanOptions, ScanResult, ScanResultBuilder,
};
