use super::rules::{MatchDecision, PathRules};

/// Parent directory prefix of a member path, up to and including the last
/// `/`. Entries at the container root have the empty prefix `""`.
#[must_use]
pub fn parent_prefix(path: &str) -> &str {
	match path.rfind('/') {
		Some(idx) => &path[..=idx],
		None => "",
	}
}

/// One-slot memo over [`PathRules::directory_decision`].
///
/// The scanner walks member paths in lexicographic order, so consecutive
/// entries usually share a parent directory; when the prefix is unchanged from
/// the previous call the memoized decision is reused without consulting the
/// rule set. This is purely a performance shortcut: for any input sequence the
/// decisions produced are identical to querying the rule set fresh every time,
/// the memo just saves redundant queries on sorted input.
#[derive(Debug, Default)]
pub struct DirDecisionCache {
	memo: Option<(String, MatchDecision)>,
}

impl DirDecisionCache {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn decision_for(&mut self, prefix: &str, rules: &dyn PathRules) -> MatchDecision {
		if let Some((memoized_prefix, decision)) = &self.memo {
			if memoized_prefix == prefix {
				return *decision;
			}
		}

		let decision = rules.directory_decision(prefix);
		self.memo = Some((prefix.to_owned(), decision));

		decision
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	#[test]
	fn parent_prefix_forms() {
		assert_eq!(parent_prefix("a/b.txt"), "a/");
		assert_eq!(parent_prefix("a/b/c.txt"), "a/b/");
		assert_eq!(parent_prefix("top.txt"), "");
	}

	struct CountingRules {
		queries: AtomicUsize,
	}

	impl CountingRules {
		fn new() -> Self {
			Self {
				queries: AtomicUsize::new(0),
			}
		}
	}

	impl PathRules for CountingRules {
		fn directory_decision(&self, prefix: &str) -> MatchDecision {
			self.queries.fetch_add(1, Ordering::Relaxed);
			match prefix {
				"a/" => MatchDecision::AtAcceptedDir,
				"a/c/" => MatchDecision::RejectedPrefix,
				"m/" => MatchDecision::AtAcceptedLeafParent,
				_ => MatchDecision::Unmatched,
			}
		}

		fn leaf_is_specifically_included(&self, _path: &str) -> bool {
			false
		}
	}

	#[test]
	fn memo_is_observationally_transparent_on_unsorted_input() {
		// deliberately non-monotonic prefixes, including repeats
		let prefixes = ["a/", "x/", "a/", "a/", "a/c/", "m/", "a/c/", "m/", ""];

		let fresh = CountingRules::new();
		let direct = prefixes
			.iter()
			.map(|prefix| fresh.directory_decision(prefix))
			.collect::<Vec<_>>();

		let memoized_rules = CountingRules::new();
		let mut cache = DirDecisionCache::new();
		let memoized = prefixes
			.iter()
			.map(|prefix| cache.decision_for(prefix, &memoized_rules))
			.collect::<Vec<_>>();

		assert_eq!(direct, memoized);
	}

	#[test]
	fn memo_suppresses_queries_for_repeated_prefixes() {
		let rules = CountingRules::new();
		let mut cache = DirDecisionCache::new();

		for _ in 0..5 {
			assert_eq!(
				cache.decision_for("a/", &rules),
				MatchDecision::AtAcceptedDir
			);
		}

		assert_eq!(rules.queries.load(Ordering::Relaxed), 1);
	}
}
