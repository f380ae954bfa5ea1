//! Syllable graph construction.
//!
//! The builder turns raw input into a DAG of plausible syllable boundaries:
//! vertices are byte positions, edges carry the syllable spelling that spans
//! them. A wavefront scan from position 0 queries the prism (and optionally a
//! corrector) at every reachable vertex, then a post-pass prunes dead ends,
//! flags ambiguous joints and transposes the edges into per-position indices
//! for the table walker.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ahash::AHashMap;
use tracing::trace;

use crate::corrector::Corrector;
use crate::prism::{Prism, PrismMatch};
use crate::syllable::{EdgeProperties, SpellingProperties, SpellingType, SyllableId};

/// Log-domain cost of a completion edge (ln 0.5).
pub const COMPLETION_PENALTY: f64 = -0.693_147_180_559_945_3;

/// Extra cost on spellings that cross an ambiguous joint (ln 1e-10).
const AMBIGUOUS_JOINT_PENALTY: f64 = -23.025_850_929_940_457;

/// Spellings leaving one vertex for one end position.
pub type SpellingMap = AHashMap<SyllableId, EdgeProperties>;
/// End position -> spellings, for one start vertex.
pub type EndVertexMap = BTreeMap<usize, SpellingMap>;
/// Start vertex -> outgoing edges.
pub type EdgeMap = BTreeMap<usize, EndVertexMap>;

/// By-value projection of an edge, stored in the transposed index so the
/// table walker never borrows into the edge map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpellingRef {
    pub end_pos: usize,
    pub credibility: f64,
    pub is_correction: bool,
}

/// Per-position index: syllable id -> its edges, longest first.
pub type SpellingIndex = AHashMap<SyllableId, Vec<SpellingRef>>;
pub type SpellingIndices = Vec<SpellingIndex>;

/// DAG of plausible syllable segmentations of one input string.
#[derive(Debug, Default, Clone)]
pub struct SyllableGraph {
    /// Bytes consumed, trailing junk included.
    pub input_length: usize,
    /// Bytes up to which at least one complete parse exists.
    pub interpreted_length: usize,
    /// Best spelling type reachable at each vertex.
    pub vertices: BTreeMap<usize, SpellingType>,
    pub edges: EdgeMap,
    /// Transposed view of `edges`, sized to `interpreted_length`.
    pub indices: SpellingIndices,
}

impl SyllableGraph {
    /// True when some edge of the given type ends at `pos`.
    pub fn has_edge_of_type_ending_at(&self, spelling_type: SpellingType, pos: usize) -> bool {
        self.edges.values().any(|ends| {
            ends.get(&pos)
                .is_some_and(|spellings| {
                    spellings
                        .values()
                        .any(|props| props.spelling.spelling_type == spelling_type)
                })
        })
    }
}

/// Builds the transposed indices from an edge map. Ends are visited in
/// descending order so longer matches precede shorter ones in every list.
pub fn transpose(interpreted_length: usize, edges: &EdgeMap, indices: &mut SpellingIndices) {
    indices.clear();
    indices.resize_with(interpreted_length, SpellingIndex::default);
    for (&start, ends) in edges {
        if start >= interpreted_length {
            continue;
        }
        let index = &mut indices[start];
        for (&end, spellings) in ends.iter().rev() {
            for (&syllable_id, props) in spellings {
                index.entry(syllable_id).or_default().push(SpellingRef {
                    end_pos: end,
                    credibility: props.spelling.credibility,
                    is_correction: props.is_correction,
                });
            }
        }
    }
}

/// Non-deterministic segmenter configured per translation.
pub struct Syllabifier {
    delimiters: String,
    enable_completion: bool,
    strict_spelling: bool,
    corrector: Option<Arc<dyn Corrector>>,
}

impl Syllabifier {
    pub fn new(delimiters: &str, enable_completion: bool, strict_spelling: bool) -> Self {
        Self {
            delimiters: delimiters.to_string(),
            enable_completion,
            strict_spelling,
            corrector: None,
        }
    }

    pub fn enable_correction(&mut self, corrector: Arc<dyn Corrector>) {
        self.corrector = Some(corrector);
    }

    fn is_delimiter(&self, byte: u8) -> bool {
        self.delimiters.as_bytes().contains(&byte)
    }

    /// Builds the syllable graph for `input`. Returns the graph and the
    /// number of bytes interpreted; an input with no leading syllable yields
    /// an empty graph, never an error.
    pub fn build_syllable_graph(&self, input: &str, prism: &Prism) -> (SyllableGraph, usize) {
        let mut graph = SyllableGraph {
            input_length: input.len(),
            ..Default::default()
        };
        if input.is_empty() {
            return (graph, 0);
        }

        graph.vertices.insert(0, SpellingType::Normal);
        let mut worklist: BTreeSet<usize> = BTreeSet::new();
        worklist.insert(0);
        // no-op transitions over delimiter runs
        let mut delimiter_hops: BTreeMap<usize, usize> = BTreeMap::new();

        while let Some(pos) = worklist.pop_first() {
            if pos >= input.len() {
                continue;
            }
            if self.is_delimiter(input.as_bytes()[pos]) {
                let mut end = pos;
                while end < input.len() && self.is_delimiter(input.as_bytes()[end]) {
                    end += 1;
                }
                let hop_type = graph.vertices[&pos];
                self.touch_vertex(&mut graph, &mut worklist, end, hop_type);
                delimiter_hops.insert(pos, end);
                continue;
            }

            let mut matches = prism.extend_all(input, pos);
            if self.enable_completion {
                matches.extend(prism.completions(input, pos));
            }
            let mut corrections: Vec<PrismMatch> = Vec::new();
            if let Some(corrector) = &self.corrector {
                corrections = corrector.suggest(input, pos);
            }

            for m in matches {
                self.add_edge(&mut graph, &mut worklist, input, pos, &m, false);
            }
            for m in corrections {
                self.add_edge(&mut graph, &mut worklist, input, pos, &m, true);
            }
        }

        // deepest vertex transitively reachable from 0
        graph.interpreted_length = graph.vertices.keys().next_back().copied().unwrap_or(0);

        self.prune_dead_ends(&mut graph, &delimiter_hops);
        self.check_overlapped_spellings(&mut graph);
        transpose(graph.interpreted_length, &graph.edges, &mut graph.indices);

        trace!(
            input_length = graph.input_length,
            interpreted_length = graph.interpreted_length,
            edges = graph.edges.len(),
            "syllable graph built"
        );
        let interpreted_length = graph.interpreted_length;
        (graph, interpreted_length)
    }

    fn add_edge(
        &self,
        graph: &mut SyllableGraph,
        worklist: &mut BTreeSet<usize>,
        input: &str,
        start: usize,
        m: &PrismMatch,
        is_correction: bool,
    ) {
        if self.strict_spelling && (m.spelling_type != SpellingType::Normal || is_correction) {
            return;
        }
        // a syllable absorbs the delimiter run that follows it, so paths and
        // phrases cross delimiters transparently
        let mut end_pos = m.end_pos;
        while end_pos < input.len() && self.is_delimiter(input.as_bytes()[end_pos]) {
            end_pos += 1;
        }
        let mut credibility = m.credibility;
        if m.spelling_type == SpellingType::Completion {
            credibility += COMPLETION_PENALTY;
        }
        let props = EdgeProperties {
            spelling: SpellingProperties {
                spelling_type: m.spelling_type,
                end_pos,
                credibility,
                tips: String::new(),
            },
            is_correction,
        };

        let spellings = graph
            .edges
            .entry(start)
            .or_default()
            .entry(end_pos)
            .or_default();
        match spellings.get(&m.syllable_id) {
            // keep the better spelling when the same syllable spans twice
            Some(existing)
                if (existing.spelling.spelling_type, existing.is_correction)
                    <= (props.spelling.spelling_type, props.is_correction) => {}
            _ => {
                spellings.insert(m.syllable_id, props);
            }
        }
        self.touch_vertex(graph, worklist, end_pos, m.spelling_type);
    }

    fn touch_vertex(
        &self,
        graph: &mut SyllableGraph,
        worklist: &mut BTreeSet<usize>,
        pos: usize,
        spelling_type: SpellingType,
    ) {
        match graph.vertices.get_mut(&pos) {
            Some(existing) => {
                if spelling_type < *existing {
                    *existing = spelling_type;
                }
            }
            None => {
                graph.vertices.insert(pos, spelling_type);
                worklist.insert(pos);
            }
        }
    }

    /// Removes edges that cannot take part in any parse reaching
    /// `interpreted_length`, and the vertices stranded by the removal.
    fn prune_dead_ends(&self, graph: &mut SyllableGraph, delimiter_hops: &BTreeMap<usize, usize>) {
        let target = graph.interpreted_length;
        let mut good: BTreeSet<usize> = BTreeSet::new();
        good.insert(target);
        for (&pos, _) in graph.vertices.iter().rev() {
            if good.contains(&pos) {
                continue;
            }
            if delimiter_hops.get(&pos).is_some_and(|end| good.contains(end)) {
                good.insert(pos);
                continue;
            }
            if let Some(ends) = graph.edges.get(&pos) {
                if ends.keys().any(|end| good.contains(end)) {
                    good.insert(pos);
                }
            }
        }

        graph.edges.retain(|_, ends| {
            ends.retain(|end, _| good.contains(end));
            !ends.is_empty()
        });
        graph
            .vertices
            .retain(|pos, _| good.contains(pos) || *pos == 0);
    }

    /// Flags partially overlapping spans: for edges `u..v` and `u'..v'` with
    /// `u < u' < v < v'`, the interior vertices are ambiguous syllable
    /// boundaries unless one spelling strictly dominates the other by type.
    /// The crossing spellings are discouraged so exact segmentations keep
    /// outranking them.
    fn check_overlapped_spellings(&self, graph: &mut SyllableGraph) {
        fn best_type(spellings: &SpellingMap) -> SpellingType {
            spellings
                .values()
                .map(|p| p.spelling.spelling_type)
                .min()
                .unwrap_or(SpellingType::Normal)
        }

        let mut marks: Vec<usize> = Vec::new();
        let mut crossings: Vec<(usize, usize)> = Vec::new();
        for (&u, ends) in &graph.edges {
            for (&v, spellings) in ends {
                let left = best_type(spellings);
                for (&u2, ends2) in graph.edges.range(u + 1..v) {
                    for (&v2, spellings2) in ends2.range(v + 1..) {
                        if best_type(spellings2) != left {
                            // one spelling strictly dominates
                            continue;
                        }
                        if !marks.contains(&u2) {
                            marks.push(u2);
                        }
                        if !marks.contains(&v) {
                            marks.push(v);
                        }
                        if !crossings.contains(&(u2, v2)) {
                            crossings.push((u2, v2));
                        }
                    }
                }
            }
        }
        for pos in marks {
            graph.vertices.insert(pos, SpellingType::Ambiguous);
        }
        for (start, end) in crossings {
            if let Some(spellings) = graph.edges.get_mut(&start).and_then(|e| e.get_mut(&end)) {
                for props in spellings.values_mut() {
                    props.spelling.credibility += AMBIGUOUS_JOINT_PENALTY;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prism() -> Prism {
        Prism::from_syllabary(&["diu", "nei", "lou", "mou", "a", "ab", "ba"]).unwrap()
    }

    fn build(input: &str) -> (SyllableGraph, usize) {
        Syllabifier::new(" '", false, false).build_syllable_graph(input, &prism())
    }

    fn edge_spans(graph: &SyllableGraph) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        for (&start, ends) in &graph.edges {
            for &end in ends.keys() {
                spans.push((start, end));
            }
        }
        spans
    }

    #[test]
    fn edges_connect_vertices_in_order() {
        let (graph, consumed) = build("diunei");
        assert_eq!(consumed, 6);
        assert_eq!(graph.interpreted_length, 6);
        for (start, end) in edge_spans(&graph) {
            assert!(start < end);
            assert!(end <= graph.input_length);
            assert!(graph.vertices.contains_key(&end));
        }
        assert_eq!(edge_spans(&graph), vec![(0, 3), (3, 6)]);
    }

    #[test]
    fn empty_input_yields_empty_graph() {
        let (graph, consumed) = build("");
        assert_eq!(consumed, 0);
        assert_eq!(graph.interpreted_length, 0);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn unparsable_head_yields_empty_graph() {
        let (graph, consumed) = build("xdiu");
        assert_eq!(consumed, 0);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn trailing_junk_limits_interpreted_length() {
        let (graph, consumed) = build("diux");
        assert_eq!(consumed, 3);
        assert_eq!(graph.interpreted_length, 3);
        assert_eq!(graph.input_length, 4);
        assert_eq!(edge_spans(&graph), vec![(0, 3)]);
    }

    #[test]
    fn leading_delimiter_is_skipped() {
        let (graph, consumed) = build(" diu");
        assert_eq!(consumed, 4);
        assert_eq!(edge_spans(&graph), vec![(1, 4)]);
    }

    #[test]
    fn delimiter_is_absorbed_by_the_preceding_syllable() {
        let (graph, consumed) = build("diu'nei");
        assert_eq!(consumed, 7);
        assert_eq!(edge_spans(&graph), vec![(0, 4), (4, 7)]);

        let (graph, consumed) = build("diu ");
        assert_eq!(consumed, 4);
        assert_eq!(edge_spans(&graph), vec![(0, 4)]);
    }

    #[test]
    fn dead_end_edges_are_pruned() {
        // "a" at 0..1 strands at 1 ("ab" must span 0..2 and "a" follows at 2)
        let (graph, consumed) = build("aba");
        assert_eq!(consumed, 3);
        let spans = edge_spans(&graph);
        assert!(spans.contains(&(0, 1))); // a + ba still parses
        assert!(spans.contains(&(1, 3)));
        assert!(spans.contains(&(0, 2))); // ab + a
        assert!(spans.contains(&(2, 3)));

        let (graph, _) = build("abba");
        // "a b..." cannot continue; only ab + ba survives
        assert_eq!(edge_spans(&graph), vec![(0, 2), (2, 4)]);
        assert!(!graph.vertices.contains_key(&1));
    }

    #[test]
    fn completion_disabled_leaves_partial_tail_uninterpreted() {
        let syllabifier = Syllabifier::new(" '", false, false);
        let (graph, consumed) = syllabifier.build_syllable_graph("diune", &prism());
        assert_eq!(consumed, 3);
        assert!(graph.interpreted_length < graph.input_length);
    }

    #[test]
    fn completion_enabled_extends_partial_tail() {
        let syllabifier = Syllabifier::new(" '", true, false);
        let (graph, consumed) = syllabifier.build_syllable_graph("diune", &prism());
        assert_eq!(consumed, 5);
        let ends = &graph.edges[&3];
        let spellings = &ends[&5];
        let props = spellings.values().next().unwrap();
        assert_eq!(props.spelling.spelling_type, SpellingType::Completion);
        assert_eq!(props.spelling.credibility, COMPLETION_PENALTY);
    }

    #[test]
    fn strict_spelling_drops_completions() {
        let syllabifier = Syllabifier::new(" '", true, true);
        let (graph, consumed) = syllabifier.build_syllable_graph("diune", &prism());
        assert_eq!(consumed, 3);
        assert!(graph.interpreted_length < graph.input_length);
    }

    #[test]
    fn overlapping_spans_mark_ambiguous_joint() {
        // "aba" splits as a+ba and ab+a; vertices 1 and 2 join overlapping
        // spans 0..2 and 1..3.
        let (graph, _) = build("aba");
        assert_eq!(graph.vertices.get(&1), Some(&SpellingType::Ambiguous));
        let penalized = &graph.edges[&1][&3];
        for props in penalized.values() {
            assert!(props.spelling.credibility < -20.0);
        }
    }

    #[test]
    fn indices_order_longer_edges_first() {
        let syllabifier = Syllabifier::new(" '", false, false);
        let prism = Prism::from_syllabary(&["a", "ab", "b"]).unwrap();
        let (graph, _) = syllabifier.build_syllable_graph("abab", &prism);
        assert_eq!(graph.indices.len(), graph.interpreted_length);
        let firsts: Vec<usize> = graph.indices[0]
            .values()
            .map(|refs| refs[0].end_pos)
            .collect();
        // every per-syllable list leads with its longest edge
        for (refs, first) in graph.indices[0].values().zip(&firsts) {
            assert!(refs.iter().all(|r| r.end_pos <= *first));
        }
    }

    #[test]
    fn correction_edges_are_flagged_and_discounted() {
        use crate::corrector::{NearKeyCorrector, CORRECTION_CREDIBILITY};
        let prism = std::sync::Arc::new(Prism::from_syllabary(&["diu", "nei"]).unwrap());
        let mut syllabifier = Syllabifier::new(" '", false, false);
        syllabifier.enable_correction(std::sync::Arc::new(NearKeyCorrector::new(prism.clone())));
        let (graph, consumed) = syllabifier.build_syllable_graph("fiunei", &prism);
        assert_eq!(consumed, 6);
        let props = &graph.edges[&0][&3][&0];
        assert!(props.is_correction);
        assert_eq!(props.spelling.credibility, CORRECTION_CREDIBILITY);
    }
}
