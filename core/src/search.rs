//! Incremental search state carried across keystrokes.
//!
//! The controller caches, per start position, the dictionary entries found at
//! each end position of the previous query. On the next keystroke it keeps
//! the rows still covered by the unchanged input prefix and re-queries only
//! what the new bytes can have changed. Invalidation is row-grained: a row is
//! either fully trusted or fully recomputed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ahash::AHashSet;
use tracing::debug;

use crate::syllabifier::SyllableGraph;
use crate::vocabulary::DictEntryList;

/// Entries found per `(start, end)` span; the sentence builder's working set
/// and the cache reused across keystrokes.
pub type WordGraph = BTreeMap<usize, BTreeMap<usize, DictEntryList>>;

/// Work counters, exposed for monitoring and for the complexity tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SearchStats {
    /// Rows computed by a full table query.
    pub full_queries: usize,
    /// Rows served from cache plus a differential query.
    pub incremental_queries: usize,
    /// Rows dropped during invalidation.
    pub rows_invalidated: usize,
}

/// Per-translator cache of the previous lookup. Owned by one translator,
/// mutated only on its query thread, reset on commit.
#[derive(Debug, Default)]
pub struct SearchContext {
    pub input: String,
    pub prev_input: String,
    /// Longest input prefix whose cached rows are still valid.
    pub incremental_search_from_pos: usize,
    pub prev_words: WordGraph,
    /// Syllable graph of the previous keystroke, consulted during
    /// invalidation.
    pub prev_graph: Option<Arc<SyllableGraph>>,
    pub stats: SearchStats,
}

/// Length in bytes of the longest common prefix of two strings.
pub fn longest_common_prefix(a: &str, b: &str) -> usize {
    a.as_bytes()
        .iter()
        .zip(b.as_bytes())
        .take_while(|(x, y)| x == y)
        .count()
}

impl SearchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all cached state; used on commit and on prefix divergence.
    pub fn clear(&mut self) {
        self.input.clear();
        self.prev_input.clear();
        self.incremental_search_from_pos = 0;
        self.prev_words.clear();
        self.prev_graph = None;
    }

    /// Recomputes the valid prefix for a new input and invalidates every
    /// cache row the new bytes can have changed. Returns the valid length.
    ///
    /// Beyond the longest-common-prefix rule, a row is also forced out (an
    /// internal cache miss, re-queried in full) when the edges reachable
    /// from it inside the valid prefix differ at all between the previous
    /// and the new syllable graph. New input can revive edges that were
    /// pruned as dead ends, prune edges that used to parse, respell a
    /// completed trailing syllable or shift an ambiguity penalty; cached
    /// rows built over any such span no longer match a from-scratch query.
    pub fn update(
        &mut self,
        input: &str,
        new_graph: &SyllableGraph,
        disable_incremental: bool,
    ) -> usize {
        let valid_len = if disable_incremental {
            0
        } else {
            longest_common_prefix(&self.prev_input, input)
        };
        self.input = input.to_string();

        if valid_len == 0 {
            self.stats.rows_invalidated += self.prev_words.len();
            self.prev_words.clear();
            self.prev_graph = None;
            self.incremental_search_from_pos = 0;
            return 0;
        }

        let affected = self.changed_region_starts(new_graph, valid_len);

        let stats = &mut self.stats;
        self.prev_words.retain(|&start, row| {
            let keep = start <= valid_len
                && !affected.contains(&start)
                && row.keys().all(|&end| end <= valid_len);
            if !keep {
                stats.rows_invalidated += 1;
                debug!(start, "cache row invalidated");
            }
            keep
        });

        self.incremental_search_from_pos = valid_len;
        valid_len
    }

    /// Start positions from which the previous and the new graph disagree
    /// anywhere inside the valid prefix: an edge present on one side only,
    /// or present on both with different spellings. Cached rows there are
    /// stale and must be recomputed.
    fn changed_region_starts(&self, new_graph: &SyllableGraph, valid_len: usize) -> AHashSet<usize> {
        let Some(prev_graph) = self.prev_graph.as_ref() else {
            // no previous graph to compare against: trust nothing
            return self.prev_words.keys().copied().collect();
        };

        let starts: BTreeSet<usize> = prev_graph
            .edges
            .keys()
            .chain(new_graph.edges.keys())
            .copied()
            .filter(|&start| start <= valid_len)
            .collect();

        let mut affected: AHashSet<usize> = AHashSet::new();
        for &start in starts.iter().rev() {
            let prev_ends = prev_graph.edges.get(&start);
            let new_ends = new_graph.edges.get(&start);
            let ends: BTreeSet<usize> = prev_ends
                .into_iter()
                .flat_map(|m| m.keys())
                .chain(new_ends.into_iter().flat_map(|m| m.keys()))
                .copied()
                .filter(|&end| end <= valid_len)
                .collect();
            let changed = ends.iter().any(|end| {
                let prev_spellings = prev_ends.and_then(|m| m.get(end));
                let new_spellings = new_ends.and_then(|m| m.get(end));
                match (prev_spellings, new_spellings) {
                    (Some(prev), Some(new)) => prev != new || affected.contains(end),
                    _ => true,
                }
            });
            if changed {
                affected.insert(start);
            }
        }
        affected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prism::Prism;
    use crate::syllable::SpellingType;
    use crate::syllabifier::Syllabifier;
    use crate::vocabulary::DictEntry;

    fn graph(input: &str, spellings: &[&str]) -> Arc<SyllableGraph> {
        let prism = Prism::from_syllabary(spellings).unwrap();
        let syllabifier = Syllabifier::new(" '", false, false);
        Arc::new(syllabifier.build_syllable_graph(input, &prism).0)
    }

    fn dummy_row(ends: &[usize]) -> BTreeMap<usize, DictEntryList> {
        ends.iter()
            .map(|&end| (end, vec![Arc::new(DictEntry::default())]))
            .collect()
    }

    #[test]
    fn lcp_is_bytewise() {
        assert_eq!(longest_common_prefix("diunei", "diunei"), 6);
        assert_eq!(longest_common_prefix("diu", "diunei"), 3);
        assert_eq!(longest_common_prefix("diu", "dau"), 1);
        assert_eq!(longest_common_prefix("", "diu"), 0);
    }

    #[test]
    fn divergent_input_clears_everything() {
        let mut ctx = SearchContext::new();
        ctx.prev_input = "diu".to_string();
        ctx.prev_words.insert(0, dummy_row(&[3]));
        ctx.prev_graph = Some(graph("diu", &["diu"]));

        let g = graph("nei", &["diu", "nei"]);
        let valid = ctx.update("nei", &g, false);
        assert_eq!(valid, 0);
        assert!(ctx.prev_words.is_empty());
        assert_eq!(ctx.stats.rows_invalidated, 1);
    }

    #[test]
    fn disable_incremental_forces_full_invalidation() {
        let mut ctx = SearchContext::new();
        ctx.prev_input = "diu".to_string();
        ctx.prev_words.insert(0, dummy_row(&[3]));
        ctx.prev_graph = Some(graph("diu", &["diu"]));

        let g = graph("diunei", &["diu", "nei"]);
        assert_eq!(ctx.update("diunei", &g, true), 0);
        assert!(ctx.prev_words.is_empty());
    }

    #[test]
    fn rows_within_the_prefix_survive() {
        let mut ctx = SearchContext::new();
        ctx.prev_input = "diunei".to_string();
        ctx.prev_graph = Some(graph("diunei", &["diu", "nei", "lou"]));
        ctx.prev_words.insert(0, dummy_row(&[3, 6]));
        ctx.prev_words.insert(3, dummy_row(&[6]));

        let g = graph("diuneilou", &["diu", "nei", "lou"]);
        let valid = ctx.update("diuneilou", &g, false);
        assert_eq!(valid, 6);
        assert_eq!(ctx.prev_words.len(), 2);
        assert_eq!(ctx.stats.rows_invalidated, 0);
    }

    #[test]
    fn rows_with_entries_past_the_prefix_drop_whole() {
        let mut ctx = SearchContext::new();
        ctx.prev_input = "diunei".to_string();
        ctx.prev_graph = Some(graph("diunei", &["diu", "nei"]));
        ctx.prev_words.insert(0, dummy_row(&[3, 6]));
        ctx.prev_words.insert(3, dummy_row(&[6]));

        // diverge inside the second syllable
        let g = graph("diunai", &["diu", "nei", "nai"]);
        let valid = ctx.update("diunai", &g, false);
        assert_eq!(valid, 4);
        // row 0 held an entry ending at 6 > 4, row 3 as well
        assert!(ctx.prev_words.is_empty());
        assert_eq!(ctx.stats.rows_invalidated, 2);
    }

    #[test]
    fn revived_edges_invalidate_reaching_rows() {
        // with "ab" the edge a@0..1 is a pruned dead end; "aba" revives it
        let spellings = &["a", "ab", "ba"];
        let prev = graph("ab", spellings);
        assert!(!prev.edges.contains_key(&1));

        let mut ctx = SearchContext::new();
        ctx.prev_input = "ab".to_string();
        ctx.prev_graph = Some(prev);
        ctx.prev_words.insert(0, dummy_row(&[2]));

        let g = graph("aba", spellings);
        ctx.update("aba", &g, false);
        assert!(ctx.prev_words.is_empty());
        assert_eq!(ctx.stats.rows_invalidated, 1);
    }

    #[test]
    fn pruned_edges_invalidate_reaching_rows() {
        // with "aa" the parse a+a is fine; "aab" prunes a@1..2 as a dead end
        let spellings = &["a", "ab"];
        let prev = graph("aa", spellings);
        assert!(prev.edges.contains_key(&1));

        let mut ctx = SearchContext::new();
        ctx.prev_input = "aa".to_string();
        ctx.prev_graph = Some(prev);
        ctx.prev_words.insert(0, dummy_row(&[1, 2]));
        ctx.prev_words.insert(1, dummy_row(&[2]));

        let g = graph("aab", spellings);
        assert!(!g.edges[&1].contains_key(&2));
        ctx.update("aab", &g, false);
        assert!(ctx.prev_words.is_empty());
        assert_eq!(ctx.stats.rows_invalidated, 2);
    }

    #[test]
    fn stale_completion_rows_drop_when_input_extends() {
        let prism = Prism::from_syllabary(&["diu", "nei"]).unwrap();
        let syllabifier = Syllabifier::new(" '", true, false);
        let prev = Arc::new(syllabifier.build_syllable_graph("di", &prism).0);
        assert!(prev.has_edge_of_type_ending_at(SpellingType::Completion, 2));

        let mut ctx = SearchContext::new();
        ctx.prev_input = "di".to_string();
        ctx.prev_graph = Some(prev);
        ctx.prev_words.insert(0, dummy_row(&[2]));

        let g = Arc::new(syllabifier.build_syllable_graph("diu", &prism).0);
        let valid = ctx.update("diu", &g, false);
        assert_eq!(valid, 2);
        assert!(ctx.prev_words.is_empty());
    }

    #[test]
    fn clear_resets_all_state() {
        let mut ctx = SearchContext::new();
        ctx.input = "diu".into();
        ctx.prev_input = "diu".into();
        ctx.incremental_search_from_pos = 3;
        ctx.prev_words.insert(0, dummy_row(&[3]));
        ctx.prev_graph = Some(graph("diu", &["diu"]));
        ctx.clear();
        assert!(ctx.prev_words.is_empty());
        assert!(ctx.prev_graph.is_none());
        assert_eq!(ctx.incremental_search_from_pos, 0);
        assert!(ctx.input.is_empty());
    }
}
