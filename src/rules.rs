use std::collections::HashSet;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use super::matcher::parent_prefix;

/// Outcome of testing a directory prefix against the inclusion/exclusion
/// rules. Directory decisions are memoized per prefix by
/// [`DirDecisionCache`](crate::DirDecisionCache) while walking sorted paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
	/// The prefix or one of its ancestors is explicitly rejected. Terminal:
	/// nothing below it is ever accepted.
	RejectedPrefix,
	/// An ancestor directory is accepted recursively, so every descendant
	/// leaf is accepted.
	AcceptedPrefix,
	/// This exact directory is accepted.
	AtAcceptedDir,
	/// This directory is accepted only for specifically listed leaves; each
	/// leaf must be re-tested individually through
	/// [`PathRules::leaf_is_specifically_included`]. This decision is never a
	/// final per-leaf answer and therefore never short-circuits leaf tests.
	AtAcceptedLeafParent,
	/// Excluded by omission.
	Unmatched,
}

impl MatchDecision {
	/// Whether every leaf directly under a directory with this decision is
	/// accepted without a per-leaf test.
	#[must_use]
	pub const fn accepts_all_leaves(self) -> bool {
		matches!(self, Self::AcceptedPrefix | Self::AtAcceptedDir)
	}
}

/// Per-entry gate consulted for every non-directory path before any directory
/// decision is made. Distinct from the per-directory decision on purpose: only
/// this gate can escalate to disqualifying the whole container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathGate {
	Continue,
	/// Drop this entry only.
	SkipEntry,
	/// The container as a whole became disqualified by seeing this path;
	/// remaining entries are abandoned and the container is marked skipped.
	SkipContainer,
}

/// The rule seam consulted while scanning. [`ScanRules`] is the provided
/// implementation; hosts with their own rule storage implement this directly.
pub trait PathRules: Send + Sync {
	fn directory_decision(&self, prefix: &str) -> MatchDecision;

	/// Per-leaf test applied under [`MatchDecision::AtAcceptedLeafParent`]
	/// directories.
	fn leaf_is_specifically_included(&self, path: &str) -> bool;

	fn path_gate(&self, _path: &str) -> PathGate {
		PathGate::Continue
	}
}

/// Serializable source form of a [`ScanRules`] instance. Glob sets are not
/// serializable, so only the pattern sources are stored and the sets are
/// rebuilt on construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleParams {
	/// Directories accepted recursively, e.g. `"assets"` accepts
	/// `assets/**`.
	#[serde(default)]
	pub accept_subtrees: Vec<String>,
	/// Directories whose direct leaves are accepted, without descending.
	#[serde(default)]
	pub accept_dirs: Vec<String>,
	/// Directories whose leaves are individually re-tested against the leaf
	/// paths/globs below.
	#[serde(default)]
	pub accept_leaf_dirs: Vec<String>,
	/// Exact member paths accepted; their parent directories become
	/// leaf-parent directories automatically.
	#[serde(default)]
	pub accept_leaf_paths: Vec<String>,
	/// Glob patterns for leaves under leaf-parent directories.
	#[serde(default)]
	pub accept_leaf_globs: Vec<String>,
	/// Directories rejected recursively. Rejection wins over acceptance.
	#[serde(default)]
	pub reject_subtrees: Vec<String>,
	/// Globs dropping individual entries before any directory decision.
	#[serde(default)]
	pub reject_leaf_globs: Vec<String>,
	/// Globs that disqualify the whole container when any member matches.
	#[serde(default)]
	pub disqualify_globs: Vec<String>,
}

/// Include/exclude path rules over `/`-separated relative member paths.
pub struct ScanRules {
	params: RuleParams,
	accept_subtrees: Vec<String>,
	accept_dirs: HashSet<String>,
	leaf_parent_dirs: HashSet<String>,
	accept_leaf_paths: HashSet<String>,
	accept_leaf_globs: GlobSet,
	reject_subtrees: Vec<String>,
	reject_leaf_globs: GlobSet,
	disqualify_globs: GlobSet,
}

impl ScanRules {
	pub fn new(params: RuleParams) -> Result<Self, globset::Error> {
		let accept_subtrees = params.accept_subtrees.iter().map(normalize_dir).collect();
		let accept_dirs = params.accept_dirs.iter().map(normalize_dir).collect();

		let accept_leaf_paths = params
			.accept_leaf_paths
			.iter()
			.cloned()
			.collect::<HashSet<_>>();
		let leaf_parent_dirs = params
			.accept_leaf_dirs
			.iter()
			.map(normalize_dir)
			.chain(
				accept_leaf_paths
					.iter()
					.map(|path| parent_prefix(path).to_owned()),
			)
			.collect();

		Ok(Self {
			accept_subtrees,
			accept_dirs,
			leaf_parent_dirs,
			accept_leaf_paths,
			accept_leaf_globs: build_glob_set(&params.accept_leaf_globs)?,
			reject_subtrees: params.reject_subtrees.iter().map(normalize_dir).collect(),
			reject_leaf_globs: build_glob_set(&params.reject_leaf_globs)?,
			disqualify_globs: build_glob_set(&params.disqualify_globs)?,
			params,
		})
	}

	#[must_use]
	pub fn builder() -> ScanRulesBuilder {
		ScanRulesBuilder {
			params: RuleParams::default(),
		}
	}

	/// The serializable source this rule set was built from.
	#[must_use]
	pub fn params(&self) -> &RuleParams {
		&self.params
	}
}

impl PathRules for ScanRules {
	fn directory_decision(&self, prefix: &str) -> MatchDecision {
		if self
			.reject_subtrees
			.iter()
			.any(|rejected| prefix.starts_with(rejected.as_str()))
		{
			return MatchDecision::RejectedPrefix;
		}

		for subtree in &self.accept_subtrees {
			if prefix == subtree {
				return MatchDecision::AtAcceptedDir;
			}
			if prefix.starts_with(subtree.as_str()) {
				return MatchDecision::AcceptedPrefix;
			}
		}

		if self.accept_dirs.contains(prefix) {
			return MatchDecision::AtAcceptedDir;
		}

		if self.leaf_parent_dirs.contains(prefix) {
			return MatchDecision::AtAcceptedLeafParent;
		}

		MatchDecision::Unmatched
	}

	fn leaf_is_specifically_included(&self, path: &str) -> bool {
		self.accept_leaf_paths.contains(path) || self.accept_leaf_globs.is_match(path)
	}

	fn path_gate(&self, path: &str) -> PathGate {
		if self.disqualify_globs.is_match(path) {
			return PathGate::SkipContainer;
		}
		if self.reject_leaf_globs.is_match(path) {
			return PathGate::SkipEntry;
		}
		PathGate::Continue
	}
}

#[derive(Debug, Default)]
pub struct ScanRulesBuilder {
	params: RuleParams,
}

impl ScanRulesBuilder {
	#[must_use]
	pub fn accept_subtree(mut self, dir: impl Into<String>) -> Self {
		self.params.accept_subtrees.push(dir.into());
		self
	}

	#[must_use]
	pub fn accept_dir(mut self, dir: impl Into<String>) -> Self {
		self.params.accept_dirs.push(dir.into());
		self
	}

	#[must_use]
	pub fn accept_leaf_dir(mut self, dir: impl Into<String>) -> Self {
		self.params.accept_leaf_dirs.push(dir.into());
		self
	}

	#[must_use]
	pub fn accept_leaf_path(mut self, path: impl Into<String>) -> Self {
		self.params.accept_leaf_paths.push(path.into());
		self
	}

	#[must_use]
	pub fn accept_leaf_glob(mut self, glob: impl Into<String>) -> Self {
		self.params.accept_leaf_globs.push(glob.into());
		self
	}

	#[must_use]
	pub fn reject_subtree(mut self, dir: impl Into<String>) -> Self {
		self.params.reject_subtrees.push(dir.into());
		self
	}

	#[must_use]
	pub fn reject_leaf_glob(mut self, glob: impl Into<String>) -> Self {
		self.params.reject_leaf_globs.push(glob.into());
		self
	}

	#[must_use]
	pub fn disqualify_glob(mut self, glob: impl Into<String>) -> Self {
		self.params.disqualify_globs.push(glob.into());
		self
	}

	pub fn build(self) -> Result<ScanRules, globset::Error> {
		ScanRules::new(self.params)
	}
}

/// Normalize a directory to the prefix form used throughout the scanner:
/// trailing `/`, no leading `/`, with the container root spelled `""`.
fn normalize_dir(dir: impl AsRef<str>) -> String {
	let dir = dir.as_ref().trim_matches('/');
	if dir.is_empty() {
		String::new()
	} else {
		format!("{dir}/")
	}
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet, globset::Error> {
	patterns
		.iter()
		.map(|source| source.parse::<Glob>())
		.collect::<Result<Vec<_>, _>>()
		.and_then(|globs| {
			globs
				.into_iter()
				.fold(&mut GlobSetBuilder::new(), |builder, glob| {
					builder.add(glob)
				})
				.build()
		})
}
