//! The translator: one keystroke in, a lazy stream of candidates out.
//!
//! Each query builds a fresh syllable graph, runs a full phrase lookup from
//! the segment start, and, when phrases fail to cover the interpreted input
//! (or the leading candidate is a correction), asks the sentence scorer for a
//! best-effort sentence over the word graph. The word graph itself is filled
//! through the incremental search controller, so successive keystrokes reuse
//! everything the unchanged input prefix already paid for.

use std::sync::Arc;

use tracing::debug;

use crate::candidate::{Candidate, Translation};
use crate::corrector::{Corrector, NearKeyCorrector};
use crate::dictionary::{DictEntryCollector, Dictionary};
use crate::poet::{Sentence, SentenceScorer, UnigramPoet};
use crate::search::{SearchContext, WordGraph};
use crate::syllabifier::{Syllabifier, SyllableGraph};
use crate::syllable::{Segment, SpellingType, SyllableId};
use crate::table::Table;
use crate::utils;
use crate::vocabulary::DictEntry;
use crate::Config;

/// Spans of one candidate code inside the syllable graph, with the
/// correction flag of each traversed edge.
type CodeSpans = Vec<(usize, usize, bool)>;

/// Matches `code` over the graph from `pos` to exactly `target`, favoring
/// longer spellings, recording the spans walked.
fn code_spans_dfs(
    graph: &SyllableGraph,
    code: &[SyllableId],
    pos: usize,
    target: usize,
    depth: usize,
    out: &mut CodeSpans,
) -> bool {
    if depth == code.len() {
        return pos == target;
    }
    let Some(ends) = graph.edges.get(&pos) else {
        return false;
    };
    for (&end, spellings) in ends.iter().rev() {
        if end > target {
            continue;
        }
        if let Some(props) = spellings.get(&code[depth]) {
            out.push((pos, end, props.is_correction));
            if code_spans_dfs(graph, code, end, target, depth + 1, out) {
                return true;
            }
            out.pop();
        }
    }
    false
}

fn code_spans(
    graph: &SyllableGraph,
    code: &[SyllableId],
    origin: usize,
    target: usize,
) -> Option<CodeSpans> {
    let mut spans = CodeSpans::new();
    if code_spans_dfs(graph, code, origin, target, 0, &mut spans) {
        Some(spans)
    } else {
        None
    }
}

/// Candidate-rendering options snapshotted from the config at query time.
#[derive(Debug, Clone)]
struct RenderOptions {
    delimiters: String,
    spelling_hints: usize,
    always_show_comments: bool,
    enable_correction: bool,
    max_corrections: usize,
}

impl RenderOptions {
    fn join_char(&self) -> Option<char> {
        self.delimiters.chars().next()
    }
}

/// Lazy phrase candidates for one query: the optional sentence first, then
/// dictionary entries from the longest covered span down.
pub struct PhraseTranslation {
    table: Arc<Table>,
    graph: Arc<SyllableGraph>,
    collector: DictEntryCollector,
    /// Collector keys, longest span first.
    ends: Vec<usize>,
    end_index: usize,
    sentence: Option<Sentence>,
    candidate: Option<Candidate>,
    candidate_is_correction: bool,
    correction_count: usize,
    input: String,
    start: usize,
    /// First position with outgoing edges; candidate codes spell out from
    /// here (a leading delimiter run sits before it).
    origin: usize,
    options: RenderOptions,
}

impl PhraseTranslation {
    #[allow(clippy::too_many_arguments)]
    fn new(
        table: Arc<Table>,
        graph: Arc<SyllableGraph>,
        collector: DictEntryCollector,
        input: String,
        start: usize,
        origin: usize,
        options: RenderOptions,
    ) -> Self {
        let mut ends: Vec<usize> = collector.keys().copied().collect();
        ends.sort_unstable_by(|a, b| b.cmp(a));
        Self {
            table,
            graph,
            collector,
            ends,
            end_index: 0,
            sentence: None,
            candidate: None,
            candidate_is_correction: false,
            correction_count: 0,
            input,
            start,
            origin,
            options,
        }
    }

    fn set_sentence(&mut self, sentence: Sentence) {
        self.sentence = Some(sentence);
        self.candidate = None;
        self.candidate_is_correction = false;
    }

    pub fn peek(&mut self) -> Option<Candidate> {
        self.prepare();
        self.candidate.clone()
    }

    pub fn next(&mut self) -> bool {
        self.prepare();
        if self.candidate.is_none() {
            return false;
        }
        if self.candidate_is_correction {
            self.correction_count += 1;
        }
        self.candidate = None;
        self.candidate_is_correction = false;
        if self.sentence.take().is_none() {
            if let Some(&end) = self.ends.get(self.end_index) {
                let advanced = self
                    .collector
                    .get_mut(&end)
                    .map(|iter| iter.next())
                    .unwrap_or(false);
                if !advanced {
                    self.end_index += 1;
                }
            }
        }
        self.prepare();
        self.candidate.is_some()
    }

    pub fn exhausted(&self) -> bool {
        if self.candidate.is_some() || self.sentence.is_some() {
            return false;
        }
        let rest = self.ends.get(self.end_index..).unwrap_or(&[]);
        rest.iter()
            .all(|end| self.collector.get(end).map_or(true, |it| it.exhausted()))
    }

    /// Whether the leading candidate came through a corrected spelling.
    fn peek_is_correction(&mut self) -> bool {
        self.prepare();
        self.candidate.is_some() && self.candidate_is_correction
    }

    fn prepare(&mut self) {
        if self.candidate.is_some() {
            return;
        }
        if let Some(sentence) = self.sentence.clone() {
            self.candidate = Some(self.sentence_candidate(&sentence));
            self.candidate_is_correction = false;
            return;
        }
        loop {
            let Some(&end) = self.ends.get(self.end_index) else {
                return;
            };
            let entry = match self.collector.get_mut(&end).and_then(|it| it.peek()) {
                Some(entry) => entry,
                None => {
                    self.end_index += 1;
                    continue;
                }
            };
            let is_correction =
                self.options.enable_correction && self.entry_is_correction(&entry, end);
            if is_correction && self.correction_count >= self.options.max_corrections {
                let advanced = self
                    .collector
                    .get_mut(&end)
                    .map(|iter| iter.next())
                    .unwrap_or(false);
                if !advanced {
                    self.end_index += 1;
                }
                continue;
            }
            self.candidate = Some(self.entry_candidate(&entry, end));
            self.candidate_is_correction = is_correction;
            return;
        }
    }

    fn is_normal_spelling(&self) -> bool {
        self.graph
            .vertices
            .values()
            .next_back()
            .is_some_and(|t| *t == SpellingType::Normal)
    }

    fn entry_is_correction(&self, entry: &DictEntry, end: usize) -> bool {
        code_spans(&self.graph, entry.code.as_slice(), self.origin, end)
            .map(|spans| spans.iter().any(|(_, _, corrected)| *corrected))
            .unwrap_or(false)
    }

    fn preedit_for(&self, code: &[SyllableId], end: usize) -> String {
        let Some(spans) = code_spans(&self.graph, code, self.origin, end) else {
            return String::new();
        };
        let mut preedit = String::new();
        for (from, to, _) in spans {
            // edges absorb trailing delimiters; strip them before joining
            let piece = self.input[from..to]
                .trim_end_matches(|c: char| self.options.delimiters.contains(c));
            if !preedit.is_empty() {
                if let Some(delimiter) = self.options.join_char() {
                    preedit.push(delimiter);
                }
            }
            preedit.push_str(piece);
        }
        preedit
    }

    fn spelling_comment(&self, code: &[SyllableId], preedit: &str) -> String {
        if self.options.spelling_hints == 0 || code.len() > self.options.spelling_hints {
            return String::new();
        }
        let spelled: Vec<&str> = code
            .iter()
            .filter_map(|&id| self.table.syllable_by_id(id))
            .collect();
        if spelled.len() != code.len() {
            return String::new();
        }
        let joined = match self.options.join_char() {
            Some(delimiter) => spelled.join(&delimiter.to_string()),
            None => spelled.concat(),
        };
        if self.options.always_show_comments || joined != preedit {
            joined
        } else {
            String::new()
        }
    }

    fn entry_candidate(&self, entry: &DictEntry, end: usize) -> Candidate {
        let preedit = self.preedit_for(entry.code.as_slice(), end);
        let comment = self.spelling_comment(entry.code.as_slice(), &preedit);
        let quality =
            entry.weight.exp() + if self.is_normal_spelling() { 0.0 } else { -1.0 };
        Candidate {
            text: entry.text.clone(),
            comment,
            preedit,
            quality,
            start: self.start,
            end: self.start + end,
        }
    }

    fn sentence_candidate(&self, sentence: &Sentence) -> Candidate {
        let code = sentence.code();
        let preedit = self.preedit_for(code.as_slice(), sentence.end_pos);
        let comment = self.spelling_comment(code.as_slice(), &preedit);
        Candidate {
            text: sentence.text.clone(),
            comment,
            preedit,
            quality: sentence.weight,
            start: self.start,
            end: self.start + sentence.end_pos,
        }
    }
}

/// Owns the dictionary, the per-session search cache and the scorer; the
/// only query surface exposed to the composition pipeline.
pub struct Translator {
    dict: Dictionary,
    config: Config,
    scorer: Option<Box<dyn SentenceScorer>>,
    corrector: Option<Arc<dyn Corrector>>,
    search_context: SearchContext,
}

impl Translator {
    pub fn new(dict: Dictionary, config: Config) -> Self {
        Self {
            dict,
            config,
            scorer: Some(Box::new(UnigramPoet)),
            corrector: None,
            search_context: SearchContext::new(),
        }
    }

    pub fn set_scorer(&mut self, scorer: Box<dyn SentenceScorer>) {
        self.scorer = Some(scorer);
    }

    pub fn set_corrector(&mut self, corrector: Arc<dyn Corrector>) {
        self.corrector = Some(corrector);
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dict
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn search_context(&self) -> &SearchContext {
        &self.search_context
    }

    /// Commit point: the composition was accepted, drop the per-session
    /// search cache.
    pub fn commit(&mut self) {
        self.search_context.clear();
    }

    /// Translates one segment of input into a lazy candidate stream. Every
    /// failure path degrades to an empty translation.
    pub fn query(&mut self, input: &str, segment: &Segment) -> Translation {
        if !self.dict.loaded() {
            debug!("query ignored, dictionary not loaded");
            return Translation::Empty;
        }
        let input = utils::normalize(input);
        if input.is_empty() {
            return Translation::Empty;
        }
        let (Some(prism), Some(table)) = (self.dict.prism().cloned(), self.dict.table().cloned())
        else {
            return Translation::Empty;
        };

        let mut syllabifier = Syllabifier::new(
            &self.config.delimiters,
            self.config.enable_completion,
            self.config.strict_spelling,
        );
        if self.config.enable_correction {
            let corrector = self
                .corrector
                .clone()
                .unwrap_or_else(|| Arc::new(NearKeyCorrector::new(prism.clone())));
            syllabifier.enable_correction(corrector);
        }
        let (graph, consumed) = syllabifier.build_syllable_graph(&input, &prism);
        let graph = Arc::new(graph);

        // phrases spell out from the first position with outgoing edges; a
        // leading delimiter run sits before it
        let origin = graph.edges.keys().next().copied().unwrap_or(0);
        let Some(collector) = self.dict.lookup(&graph, origin) else {
            debug!(input = %input, "no phrase matches");
            return Translation::Empty;
        };
        let translated_len = collector.keys().next_back().copied().unwrap_or(0);

        let options = RenderOptions {
            delimiters: self.config.delimiters.clone(),
            spelling_hints: self.config.spelling_hints,
            always_show_comments: self.config.always_show_comments,
            enable_correction: self.config.enable_correction,
            max_corrections: self.config.max_corrections,
        };
        let mut translation = PhraseTranslation::new(
            table,
            graph.clone(),
            collector,
            input.clone(),
            segment.start,
            origin,
            options,
        );

        // sentence when phrases fall short of the interpreted input, or when
        // the leading candidate is a correction; two syllables minimum
        let first_is_correction =
            self.config.enable_correction && translation.peek_is_correction();
        if (translated_len < consumed || first_is_correction) && graph.edges.len() > 1 {
            if let Some(sentence) = self.build_sentence(&graph, &input) {
                translation.set_sentence(sentence);
            }
        }

        Translation::Phrase(Box::new(translation)).distinct()
    }

    /// The sentence-building hook: one incremental lookup per edge start
    /// position, merged into the session word graph with the homophone cap.
    /// Also the seam the equivalence tests drive directly.
    pub fn update_word_graph(&mut self, graph: &Arc<SyllableGraph>, input: &str) -> &WordGraph {
        self.search_context
            .update(input, graph, self.config.disable_incremental_search);

        let starts: Vec<usize> = graph.edges.keys().copied().collect();
        for start in starts {
            let row_cached = self.search_context.prev_words.contains_key(&start);
            let Some(mut collector) =
                self.dict
                    .lookup_incremental(graph, start, &mut self.search_context)
            else {
                continue;
            };
            let valid_len = self.search_context.incremental_search_from_pos;
            let row = self.search_context.prev_words.entry(start).or_default();
            for (&end, iterator) in collector.iter_mut() {
                if row_cached && end <= valid_len {
                    // already served from cache
                    continue;
                }
                let cell = row.entry(end).or_default();
                while cell.len() < self.config.max_homophones && !iterator.exhausted() {
                    match iterator.peek() {
                        Some(entry) => cell.push(entry),
                        None => break,
                    }
                    if !iterator.next() {
                        break;
                    }
                }
            }
        }

        self.search_context.prev_input = input.to_string();
        self.search_context.prev_graph = Some(graph.clone());
        &self.search_context.prev_words
    }

    fn build_sentence(&mut self, graph: &Arc<SyllableGraph>, input: &str) -> Option<Sentence> {
        if self.scorer.is_none() {
            return None;
        }
        self.update_word_graph(graph, input);
        self.scorer.as_ref()?.make_sentence(
            &self.search_context.prev_words,
            graph.interpreted_length,
            "",
        )
    }
}
