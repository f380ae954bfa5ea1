//! Dictionary façade: the thin adapter owning the loaded table and prism.
//!
//! Graph queries come back as raw table accessors; the façade resolves them
//! into per-end-position entry iterators. Long entries carry extra code past
//! the indexed prefix, matched here against the syllable graph (longest
//! edges first) to find their actual end position. Iterators materialize
//! `DictEntry` values lazily and share them by reference count.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::prism::Prism;
use crate::search::SearchContext;
use crate::syllable::SyllableId;
use crate::syllabifier::SyllableGraph;
use crate::table::{EntrySlot, Table, TableAccessor, TableQueryResult};
use crate::vocabulary::{Code, DictEntry};

/// Load state; only `Loaded` serves queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictState {
    Unloaded,
    Loading,
    Loaded,
    Closed,
}

/// One run of entries inside a table node, with the resolved code and the
/// accumulated credibility of the path that found it.
#[derive(Debug, Clone)]
struct Chunk {
    slot: EntrySlot,
    offset: usize,
    len: usize,
    cursor: usize,
    code: Code,
    credibility: f64,
    remaining_code_length: usize,
}

impl Chunk {
    fn exhausted(&self) -> bool {
        self.cursor >= self.len
    }
}

/// Lazy iterator over the entries found for one end position.
#[derive(Debug, Clone)]
pub struct DictEntryIterator {
    table: Arc<Table>,
    chunks: Vec<Chunk>,
    chunk_index: usize,
    cached: Option<Arc<DictEntry>>,
}

impl DictEntryIterator {
    fn new(table: Arc<Table>) -> Self {
        Self {
            table,
            chunks: Vec::new(),
            chunk_index: 0,
            cached: None,
        }
    }

    fn add_chunk(&mut self, chunk: Chunk) {
        if !chunk.exhausted() {
            self.chunks.push(chunk);
        }
    }

    /// Orders chunks by the credibility-adjusted weight of their best entry,
    /// so iteration starts with the strongest source.
    fn sort_chunks(&mut self) {
        let table = self.table.clone();
        self.chunks.sort_by(|a, b| {
            let wa = head_weight(&table, a);
            let wb = head_weight(&table, b);
            wb.total_cmp(&wa)
                .then_with(|| a.code.cmp(&b.code))
                .then_with(|| a.offset.cmp(&b.offset))
        });
    }

    pub fn exhausted(&self) -> bool {
        self.chunk_index >= self.chunks.len()
    }

    /// Entries left across all chunks.
    pub fn remaining(&self) -> usize {
        self.chunks[self.chunk_index.min(self.chunks.len())..]
            .iter()
            .map(|c| c.len - c.cursor)
            .sum()
    }

    /// Current entry, building it on first access.
    pub fn peek(&mut self) -> Option<Arc<DictEntry>> {
        if self.exhausted() {
            return None;
        }
        if self.cached.is_none() {
            let chunk = &self.chunks[self.chunk_index];
            let entry = entry_at(&self.table, chunk)?;
            self.cached = Some(Arc::new(entry));
        }
        self.cached.clone()
    }

    /// Advances to the next entry; false once exhausted.
    pub fn next(&mut self) -> bool {
        if self.exhausted() {
            return false;
        }
        self.cached = None;
        let chunk = &mut self.chunks[self.chunk_index];
        chunk.cursor += 1;
        if chunk.exhausted() {
            self.chunk_index += 1;
        }
        !self.exhausted()
    }

    /// Rewinds every cursor; cached rows reuse iterators from the start.
    pub fn reset(&mut self) {
        self.cached = None;
        self.chunk_index = 0;
        for chunk in &mut self.chunks {
            chunk.cursor = 0;
        }
    }
}

fn head_weight(table: &Table, chunk: &Chunk) -> f64 {
    table
        .entry_at(chunk.slot, chunk.offset + chunk.cursor)
        .map(|e| e.weight)
        .unwrap_or(f64::MIN)
        + chunk.credibility
}

fn entry_at(table: &Table, chunk: &Chunk) -> Option<DictEntry> {
    let raw = table.entry_at(chunk.slot, chunk.offset + chunk.cursor)?;
    Some(DictEntry {
        text: raw.text.clone(),
        weight: raw.weight + chunk.credibility,
        code: chunk.code.clone(),
        remaining_code_length: chunk.remaining_code_length,
        ..Default::default()
    })
}

/// Entry iterators keyed by the end position they terminate at.
pub type DictEntryCollector = std::collections::BTreeMap<usize, DictEntryIterator>;

/// Finds the deepest end position at which `extra` can be spelled out in the
/// graph starting from `pos`. Zero means no match.
pub fn match_extra_code(
    extra: &[SyllableId],
    depth: usize,
    graph: &SyllableGraph,
    pos: usize,
) -> usize {
    if depth == extra.len() {
        return pos;
    }
    if pos >= graph.indices.len() {
        return 0;
    }
    let Some(refs) = graph.indices[pos].get(&extra[depth]) else {
        return 0;
    };
    let mut best = 0;
    for r in refs {
        best = best.max(match_extra_code(extra, depth + 1, graph, r.end_pos));
    }
    best
}

#[derive(Debug, Default)]
pub struct Dictionary {
    state: DictState,
    table: Option<Arc<Table>>,
    prism: Option<Arc<Prism>>,
}

impl Default for DictState {
    fn default() -> Self {
        DictState::Unloaded
    }
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopts an already built table, deriving the prism from its syllabary.
    pub fn load(&mut self, table: Table) -> Result<()> {
        self.state = DictState::Loading;
        match Prism::from_syllabary(table.syllabary()) {
            Ok(prism) => {
                self.table = Some(Arc::new(table));
                self.prism = Some(Arc::new(prism));
                self.state = DictState::Loaded;
                Ok(())
            }
            Err(err) => {
                self.table = None;
                self.prism = None;
                self.state = DictState::Unloaded;
                Err(err)
            }
        }
    }

    /// Loads a serialized table image.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.state = DictState::Loading;
        match Table::load(path) {
            Ok(table) => self.load(table),
            Err(err) => {
                self.state = DictState::Unloaded;
                Err(err)
            }
        }
    }

    pub fn close(&mut self) {
        self.table = None;
        self.prism = None;
        self.state = DictState::Closed;
    }

    pub fn state(&self) -> DictState {
        self.state
    }

    pub fn loaded(&self) -> bool {
        self.state == DictState::Loaded
    }

    pub fn table(&self) -> Option<&Arc<Table>> {
        self.table.as_ref()
    }

    pub fn prism(&self) -> Option<&Arc<Prism>> {
        self.prism.as_ref()
    }

    pub fn syllable_by_id(&self, syllable_id: SyllableId) -> Option<&str> {
        self.table.as_ref()?.syllable_by_id(syllable_id)
    }

    /// Renders a code as its syllable spellings.
    pub fn decode(&self, code: &Code) -> Vec<String> {
        let Some(table) = self.table.as_ref() else {
            return Vec::new();
        };
        code.as_slice()
            .iter()
            .filter_map(|&id| table.syllable_by_id(id))
            .map(|s| s.to_string())
            .collect()
    }

    /// Full lookup from one start position.
    pub fn lookup(&self, graph: &SyllableGraph, start_pos: usize) -> Option<DictEntryCollector> {
        let table = self.loaded_table()?;
        let result = table.query(graph, start_pos)?;
        Some(collect(table, graph, result))
    }

    /// Cached lookup: rows the context still holds get only a differential
    /// query for the newly reachable spans; unknown rows get a full query.
    pub fn lookup_incremental(
        &self,
        graph: &SyllableGraph,
        start_pos: usize,
        context: &mut SearchContext,
    ) -> Option<DictEntryCollector> {
        let table = self.loaded_table()?;
        if context.prev_words.contains_key(&start_pos) {
            context.stats.incremental_queries += 1;
            let result =
                table.query_incremental(graph, start_pos, context.incremental_search_from_pos)?;
            Some(collect(table, graph, result))
        } else {
            context.stats.full_queries += 1;
            let result = table.query(graph, start_pos)?;
            Some(collect(table, graph, result))
        }
    }

    fn loaded_table(&self) -> Option<&Arc<Table>> {
        if !self.loaded() {
            debug!(state = ?self.state, "dictionary not ready for queries");
            return None;
        }
        self.table.as_ref()
    }
}

/// Resolves raw accessors into per-end iterators. Short accessors keep their
/// end position; long accessors fan out entry by entry to the end position
/// their extra code reaches in the graph.
fn collect(
    table: &Arc<Table>,
    graph: &SyllableGraph,
    result: TableQueryResult,
) -> DictEntryCollector {
    let mut collector = DictEntryCollector::new();
    for (end_pos, accessors) in result {
        for accessor in accessors {
            if accessor.is_long() {
                let mut cursor = accessor.clone();
                while !cursor.exhausted() {
                    let extra = cursor.extra_code(table).unwrap_or(&[]);
                    let actual_end = match_extra_code(extra, 0, graph, end_pos);
                    if actual_end > 0 {
                        collector
                            .entry(actual_end)
                            .or_insert_with(|| DictEntryIterator::new(table.clone()))
                            .add_chunk(Chunk {
                                slot: cursor.slot(),
                                offset: cursor.cursor(),
                                len: 1,
                                cursor: 0,
                                code: cursor.code(table),
                                credibility: cursor.credibility(),
                                remaining_code_length: 0,
                            });
                    }
                    if !cursor.next() {
                        break;
                    }
                }
            } else {
                collector
                    .entry(end_pos)
                    .or_insert_with(|| DictEntryIterator::new(table.clone()))
                    .add_chunk(chunk_of(table, &accessor));
            }
        }
    }
    for iterator in collector.values_mut() {
        iterator.sort_chunks();
    }
    collector
}

fn chunk_of(table: &Arc<Table>, accessor: &TableAccessor) -> Chunk {
    Chunk {
        slot: accessor.slot(),
        offset: accessor.cursor(),
        len: accessor.remaining(),
        cursor: 0,
        code: accessor.code(table),
        credibility: accessor.credibility(),
        remaining_code_length: 0,
    }
}
