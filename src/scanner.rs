use std::{
	collections::{HashMap, HashSet},
	num::NonZeroUsize,
	path::PathBuf,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use async_channel as chan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::spawn;
use tracing::{error, trace};

use super::{
	accessor::{Accessor, ContainerBackend},
	container::Container,
	error::Error,
	log::ScanLog,
	matcher::{parent_prefix, DirDecisionCache},
	resource::Resource,
	rules::{MatchDecision, PathGate, PathRules},
};

/// Everything one container scan produced.
pub struct ScanResult<B: ContainerBackend> {
	accepted: Vec<Arc<Resource<B>>>,
	discovered_paths: HashSet<String>,
	last_modified: HashMap<PathBuf, DateTime<Utc>>,
}

impl<B: ContainerBackend> ScanResult<B> {
	/// Accepted resources, in lexicographic path order.
	#[must_use]
	pub fn accepted(&self) -> &[Arc<Resource<B>>] {
		&self.accepted
	}

	/// Every non-directory path discovered during listing, whether accepted
	/// or not, for lookups that ignore the active rules.
	#[must_use]
	pub fn discovered_paths(&self) -> &HashSet<String> {
		&self.discovered_paths
	}

	/// Host file identity to last-modified timestamp, for staleness decisions
	/// made by collaborators.
	#[must_use]
	pub fn last_modified(&self) -> &HashMap<PathBuf, DateTime<Utc>> {
		&self.last_modified
	}
}

/// Accumulator for a [`ScanResult`] under construction. Shared post-processing
/// for every container kind: callers producing paths by other means than a
/// pooled accessor listing can still finalize through this.
pub struct ScanResultBuilder<B: ContainerBackend> {
	accepted: Vec<Arc<Resource<B>>>,
	discovered_paths: HashSet<String>,
	last_modified: HashMap<PathBuf, DateTime<Utc>>,
}

impl<B: ContainerBackend> Default for ScanResultBuilder<B> {
	fn default() -> Self {
		Self {
			accepted: Vec::new(),
			discovered_paths: HashSet::new(),
			last_modified: HashMap::new(),
		}
	}
}

impl<B: ContainerBackend> ScanResultBuilder<B> {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn record_discovered(&mut self, path: &str) {
		self.discovered_paths.insert(path.to_owned());
	}

	pub fn accept(&mut self, resource: Arc<Resource<B>>) {
		self.accepted.push(resource);
	}

	pub fn record_last_modified(&mut self, file: PathBuf, timestamp: DateTime<Utc>) {
		self.last_modified.insert(file, timestamp);
	}

	/// Freeze the accepted list and discovered set.
	#[must_use]
	pub fn finish(self) -> ScanResult<B> {
		ScanResult {
			accepted: self.accepted,
			discovered_paths: self.discovered_paths,
			last_modified: self.last_modified,
		}
	}
}

/// Cooperative interruption flag checked between path-processing steps, never
/// mid-read. An interrupted container is left skipped; its scoped accessor is
/// still released.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn interrupt(&self) {
		self.0.store(true, Ordering::Release);
	}

	#[must_use]
	pub fn is_interrupted(&self) -> bool {
		self.0.load(Ordering::Acquire)
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanOptions {
	/// Worker count for [`scan_all`]; defaults to the available parallelism.
	#[serde(default)]
	pub workers: Option<NonZeroUsize>,
	/// Well-known leaf file names accepted regardless of the directory
	/// decision (as long as the prefix isn't rejected).
	#[serde(default)]
	pub always_accept_names: HashSet<String>,
}

/// Scan one container with default options and no interruption.
pub async fn scan<B: ContainerBackend>(
	container: &Container<B>,
	rules: &dyn PathRules,
	log: Option<&dyn ScanLog>,
) -> Result<ScanResult<B>, Error> {
	scan_with(container, rules, log, &ScanOptions::default(), None).await
}

/// Scan one container: acquire a pooled accessor for the duration, list and
/// sort member paths, walk them through the rule gates and the memoized
/// directory decisions, and build the accepted-resource list.
///
/// Single-shot per container; a second invocation fails with
/// [`Error::AlreadyScanned`]. Listing failures are contained: the container
/// degrades to skipped, the failure lands in the log trail, and an empty
/// result is returned so sibling containers are unaffected.
pub async fn scan_with<B: ContainerBackend>(
	container: &Container<B>,
	rules: &dyn PathRules,
	log: Option<&dyn ScanLog>,
	options: &ScanOptions,
	interrupt: Option<&Interrupt>,
) -> Result<ScanResult<B>, Error> {
	let mut builder = ScanResultBuilder::new();
	let label = container.label().to_owned();

	if container.is_skipped() {
		return Ok(builder.finish());
	}
	container.begin_scan()?;

	if let Some(log) = log {
		log.entry(&label, &format!("Scanning container {}", container.location()));
	}

	// scoped acquisition for the lifetime of the scan; returned to the pool
	// (not closed) when this guard drops
	let mut accessor = match container.acquire_accessor().await {
		Ok(accessor) => accessor,
		Err(e) => {
			if let Some(log) = log {
				log.entry_with_cause(&label, "Could not open container", &e);
			}
			container.mark_skipped();
			return Ok(builder.finish());
		}
	};

	let mut paths = match accessor.list().await {
		Ok(paths) => paths,
		Err(e) => {
			let e = Error::listing(container.location(), e);
			if let Some(log) = log {
				log.entry_with_cause(&label, "Could not list container contents", &e);
			}
			container.mark_skipped();
			return Ok(builder.finish());
		}
	};

	// total order: required for the prefix memoization and for deterministic
	// output ordering
	paths.sort_unstable();

	let mut decisions = DirDecisionCache::new();

	for path in paths {
		if interrupt.is_some_and(Interrupt::is_interrupted) {
			if let Some(log) = log {
				log.entry(&label, "Scan interrupted");
			}
			container.mark_skipped();
			return Ok(builder.finish());
		}

		// directory markers are never materialized as resources
		if path.ends_with('/') {
			continue;
		}

		match rules.path_gate(&path) {
			PathGate::Continue => {}
			PathGate::SkipEntry => continue,
			PathGate::SkipContainer => {
				if let Some(log) = log {
					log.entry(&label, &format!("Container disqualified by path: {path}"));
				}
				container.mark_skipped();
				return Ok(builder.finish());
			}
		}

		builder.record_discovered(&path);

		let decision = decisions.decision_for(parent_prefix(&path), rules);
		if decision == MatchDecision::RejectedPrefix {
			trace!(container = %label, %path, "Skipping rejected path");
			if let Some(log) = log {
				log.entry(&label, &format!("Skipping rejected path: {path}"));
			}
			continue;
		}

		let accepted = decision.accepts_all_leaves()
			|| (decision == MatchDecision::AtAcceptedLeafParent
				&& rules.leaf_is_specifically_included(&path))
			|| options.always_accept_names.contains(leaf_name(&path));

		if accepted {
			builder.accept(Arc::new(Resource::new(container.clone(), path)));
		}
	}

	if let Some((file, timestamp)) = container.backend().last_modified().await {
		builder.record_last_modified(file, timestamp);
	}

	container.finish_scan();

	Ok(builder.finish())
}

/// Scan many containers on a fixed worker pool, one work unit per container.
///
/// Listing and read failures degrade only their own container; every reachable
/// container yields a result. No ordering is guaranteed across containers.
pub async fn scan_all<B: ContainerBackend>(
	containers: Vec<Container<B>>,
	rules: Arc<dyn PathRules>,
	log: Option<Arc<dyn ScanLog>>,
	options: ScanOptions,
	interrupt: Option<Interrupt>,
) -> Vec<(Container<B>, Result<ScanResult<B>, Error>)> {
	let workers = options.workers.map_or_else(default_worker_count, NonZeroUsize::get);

	let (queue_tx, queue_rx) = chan::unbounded();
	for container in containers {
		if queue_tx.send(container).await.is_err() {
			// receivers all alive at this point; can't happen
			break;
		}
	}
	queue_tx.close();

	let handles = (0..workers)
		.map(|_| {
			let queue_rx = queue_rx.clone();
			let rules = Arc::clone(&rules);
			let log = log.clone();
			let options = options.clone();
			let interrupt = interrupt.clone();

			spawn(async move {
				let mut completed = Vec::new();
				while let Ok(container) = queue_rx.recv().await {
					let result = scan_with(
						&container,
						rules.as_ref(),
						log.as_deref(),
						&options,
						interrupt.as_ref(),
					)
					.await;
					completed.push((container, result));
				}
				completed
			})
		})
		.collect::<Vec<_>>();

	let mut results = Vec::new();
	for joined in futures::future::join_all(handles).await {
		match joined {
			Ok(mut completed) => results.append(&mut completed),
			Err(e) => error!("Scan worker panicked: {e:#?}"),
		}
	}
	results
}

fn default_worker_count() -> usize {
	std::thread::available_parallelism().map_or_else(
		|e| {
			error!("Failed to get available parallelism for the scan workers: {e:#?}");
			1
		},
		NonZeroUsize::get,
	)
}

fn leaf_name(path: &str) -> &str {
	match path.rfind('/') {
		Some(idx) => &path[idx + 1..],
		None => path,
	}
}
