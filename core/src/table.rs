//! Phrase table: an immutable multi-level trie from syllable codes to
//! dictionary entries.
//!
//! The first level (head) is an array indexed by syllable id; levels two and
//! three (trunks) are sorted arrays resolved by binary search; phrases longer
//! than three syllables keep their remaining code next to the entry in a tail
//! list under the three-syllable prefix. Trunk and tail arrays live in arenas
//! and are referenced by offset, so query state never holds pointers into the
//! table ([`TableQuery`] borrows the table instead).
//!
//! The table serializes to a bincode image with a versioned format header;
//! loads below the supported version are refused.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use ahash::AHashSet;
use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::syllable::{Syllabary, SyllableId};
use crate::syllabifier::SyllableGraph;
use crate::vocabulary::{Code, DictEntry, DictEntryList, IndexCode, Vocabulary};

pub const TABLE_FORMAT_LATEST: &str = "Rime::Table/4.0";
const TABLE_FORMAT_PREFIX: &str = "Rime::Table/";
const TABLE_FORMAT_LOWEST_COMPATIBLE: f64 = 4.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMetadata {
    pub format: String,
    pub dict_checksum: u32,
    pub num_syllables: usize,
    pub num_entries: usize,
}

/// One stored entry: the phrase text and its log-probability-like weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    pub text: String,
    pub weight: f64,
}

/// Entry of a phrase longer than the indexed prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongEntry {
    pub extra_code: Vec<SyllableId>,
    pub entry: TableEntry,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HeadNode {
    entries: Vec<TableEntry>,
    next_level: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrunkNode {
    key: SyllableId,
    entries: Vec<TableEntry>,
    next_level: Option<PhraseIndex>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum PhraseIndex {
    Trunk(u32),
    Tail(u32),
}

/// Immutable phrase index. Built once, then only read.
#[derive(Debug, Serialize, Deserialize)]
pub struct Table {
    metadata: TableMetadata,
    syllabary: Syllabary,
    head: Vec<HeadNode>,
    trunks: Vec<Vec<TrunkNode>>,
    tails: Vec<Vec<LongEntry>>,
}

/// Where an accessor's entries live inside the table arenas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySlot {
    Empty,
    Head(SyllableId),
    Trunk { arena: u32, node: u32 },
    Tail(u32),
}

/// Cursor over the entry list of one table node. Plain offset data: reads go
/// through an explicit `&Table` borrow.
#[derive(Debug, Clone)]
pub struct TableAccessor {
    index_code: IndexCode,
    slot: EntrySlot,
    len: usize,
    cursor: usize,
    credibility: f64,
}

impl TableAccessor {
    pub fn empty() -> Self {
        Self {
            index_code: IndexCode::new(),
            slot: EntrySlot::Empty,
            len: 0,
            cursor: 0,
            credibility: 0.0,
        }
    }

    fn new(index_code: IndexCode, slot: EntrySlot, len: usize, credibility: f64) -> Self {
        Self {
            index_code,
            slot,
            len,
            cursor: 0,
            credibility,
        }
    }

    pub fn index_code(&self) -> &IndexCode {
        &self.index_code
    }

    pub fn slot(&self) -> EntrySlot {
        self.slot
    }

    pub fn credibility(&self) -> f64 {
        self.credibility
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn exhausted(&self) -> bool {
        self.cursor >= self.len
    }

    pub fn remaining(&self) -> usize {
        self.len.saturating_sub(self.cursor)
    }

    /// Advances to the next entry; false once exhausted.
    pub fn next(&mut self) -> bool {
        if self.exhausted() {
            return false;
        }
        self.cursor += 1;
        !self.exhausted()
    }

    pub fn entry<'t>(&self, table: &'t Table) -> Option<&'t TableEntry> {
        if self.exhausted() {
            return None;
        }
        table.entry_at(self.slot, self.cursor)
    }

    /// Extra code of the current entry; only tail accessors have one.
    pub fn extra_code<'t>(&self, table: &'t Table) -> Option<&'t [SyllableId]> {
        if self.exhausted() {
            return None;
        }
        match self.slot {
            EntrySlot::Tail(arena) => table
                .tails
                .get(arena as usize)
                .and_then(|tail| tail.get(self.cursor))
                .map(|long| long.extra_code.as_slice()),
            _ => None,
        }
    }

    /// Full code of the current entry.
    pub fn code(&self, table: &Table) -> Code {
        let mut code = Code::from(&self.index_code);
        if let Some(extra) = self.extra_code(table) {
            code.0.extend_from_slice(extra);
        }
        code
    }

    pub fn is_long(&self) -> bool {
        matches!(self.slot, EntrySlot::Tail(_))
    }
}

fn add_syllable(mut code: IndexCode, syllable_id: SyllableId) -> IndexCode {
    code.push(syllable_id);
    code
}

/// Traversal state of one walk down the table index.
#[derive(Clone)]
pub struct TableQuery<'t> {
    table: &'t Table,
    level: usize,
    index_code: IndexCode,
    credibility: Vec<f64>,
    lv2: Option<u32>,
    lv3: Option<u32>,
    lv4: Option<u32>,
}

impl<'t> TableQuery<'t> {
    pub fn new(table: &'t Table) -> Self {
        Self {
            table,
            level: 0,
            index_code: IndexCode::new(),
            credibility: vec![0.0],
            lv2: None,
            lv3: None,
            lv4: None,
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn index_code(&self) -> &IndexCode {
        &self.index_code
    }

    fn find_trunk_node(nodes: &[TrunkNode], key: SyllableId) -> Option<usize> {
        nodes.binary_search_by_key(&key, |node| node.key).ok()
    }

    fn walk(&mut self, syllable_id: SyllableId) -> bool {
        match self.level {
            0 => {
                let Some(node) = self.table.head.get(syllable_id as usize) else {
                    return false;
                };
                match node.next_level {
                    Some(arena) => {
                        self.lv2 = Some(arena);
                        true
                    }
                    None => false,
                }
            }
            1 => {
                let Some(nodes) = self.lv2.and_then(|a| self.table.trunks.get(a as usize)) else {
                    return false;
                };
                let Some(found) = Self::find_trunk_node(nodes, syllable_id) else {
                    return false;
                };
                match nodes[found].next_level {
                    Some(PhraseIndex::Trunk(arena)) => {
                        self.lv3 = Some(arena);
                        true
                    }
                    _ => false,
                }
            }
            2 => {
                let Some(nodes) = self.lv3.and_then(|a| self.table.trunks.get(a as usize)) else {
                    return false;
                };
                let Some(found) = Self::find_trunk_node(nodes, syllable_id) else {
                    return false;
                };
                match nodes[found].next_level {
                    Some(PhraseIndex::Tail(arena)) => {
                        self.lv4 = Some(arena);
                        true
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// Descends one level; false when the index has no such child.
    pub fn advance(&mut self, syllable_id: SyllableId, credibility: f64) -> bool {
        if !self.walk(syllable_id) {
            return false;
        }
        self.level += 1;
        self.index_code.push(syllable_id);
        let total = self.credibility.last().copied().unwrap_or(0.0) + credibility;
        self.credibility.push(total);
        true
    }

    /// Ascends one level; false at the root.
    pub fn backdate(&mut self) -> bool {
        if self.level == 0 {
            return false;
        }
        self.level -= 1;
        if self.index_code.len() > self.level {
            self.index_code.pop();
            self.credibility.pop();
        }
        true
    }

    /// Returns to the root with empty code.
    pub fn reset(&mut self) {
        self.level = 0;
        self.index_code.clear();
        self.credibility.clear();
        self.credibility.push(0.0);
        self.lv2 = None;
        self.lv3 = None;
        self.lv4 = None;
    }

    /// Snapshot of the entry list at a child node without descending.
    pub fn access(&self, syllable_id: SyllableId, credibility: f64) -> TableAccessor {
        let credibility = self.credibility.last().copied().unwrap_or(0.0) + credibility;
        match self.level {
            0 => match self.table.head.get(syllable_id as usize) {
                Some(node) => TableAccessor::new(
                    add_syllable(self.index_code, syllable_id),
                    EntrySlot::Head(syllable_id),
                    node.entries.len(),
                    credibility,
                ),
                None => TableAccessor::empty(),
            },
            1 | 2 => {
                let arena = if self.level == 1 { self.lv2 } else { self.lv3 };
                let Some(arena) = arena else {
                    return TableAccessor::empty();
                };
                let Some(nodes) = self.table.trunks.get(arena as usize) else {
                    return TableAccessor::empty();
                };
                match Self::find_trunk_node(nodes, syllable_id) {
                    Some(node) => TableAccessor::new(
                        add_syllable(self.index_code, syllable_id),
                        EntrySlot::Trunk {
                            arena,
                            node: node as u32,
                        },
                        nodes[node].entries.len(),
                        credibility,
                    ),
                    None => TableAccessor::empty(),
                }
            }
            _ => TableAccessor::empty(),
        }
    }

    /// Snapshot of the tail list below the fully advanced index code.
    pub fn access_long_entries(&self) -> TableAccessor {
        if self.level != IndexCode::MAX_LEN {
            return TableAccessor::empty();
        }
        let credibility = self.credibility.last().copied().unwrap_or(0.0);
        match self.lv4.and_then(|a| self.table.tails.get(a as usize)) {
            Some(tail) => TableAccessor::new(
                self.index_code,
                EntrySlot::Tail(self.lv4.unwrap_or(0)),
                tail.len(),
                credibility,
            ),
            None => TableAccessor::empty(),
        }
    }
}

/// Accessors found at each end position of one graph query.
pub type TableQueryResult = std::collections::BTreeMap<usize, Vec<TableAccessor>>;

impl Table {
    /// Builds the index from a syllabary and a vocabulary trie.
    pub fn build(syllabary: Syllabary, vocabulary: &Vocabulary, dict_checksum: u32) -> Table {
        let num_syllables = syllabary.len();
        let mut table = Table {
            metadata: TableMetadata {
                format: TABLE_FORMAT_LATEST.to_string(),
                dict_checksum,
                num_syllables,
                num_entries: 0,
            },
            syllabary,
            head: Vec::new(),
            trunks: Vec::new(),
            tails: Vec::new(),
        };
        let mut head = vec![HeadNode::default(); num_syllables];
        for (&syllable_id, page) in vocabulary.pages() {
            let Some(node) = head.get_mut(syllable_id as usize) else {
                debug!(syllable_id, "vocabulary key outside syllabary, skipped");
                continue;
            };
            node.entries = table.build_entry_list(&page.entries);
            if let Some(next) = &page.next_level {
                node.next_level = table.build_trunk(next, 1);
            }
        }
        table.head = head;
        info!(
            num_syllables = table.metadata.num_syllables,
            num_entries = table.metadata.num_entries,
            "phrase table built"
        );
        table
    }

    fn build_trunk(&mut self, vocabulary: &Vocabulary, depth: usize) -> Option<u32> {
        let mut nodes = Vec::with_capacity(vocabulary.pages().len());
        for (&key, page) in vocabulary.pages() {
            let mut node = TrunkNode {
                key,
                entries: self.build_entry_list(&page.entries),
                next_level: None,
            };
            if let Some(next) = &page.next_level {
                node.next_level = if depth + 1 < IndexCode::MAX_LEN {
                    self.build_trunk(next, depth + 1).map(PhraseIndex::Trunk)
                } else {
                    self.build_tail(next).map(PhraseIndex::Tail)
                };
            }
            nodes.push(node);
        }
        if nodes.is_empty() {
            return None;
        }
        self.trunks.push(nodes);
        Some((self.trunks.len() - 1) as u32)
    }

    fn build_tail(&mut self, vocabulary: &Vocabulary) -> Option<u32> {
        if vocabulary.long_entries().is_empty() {
            return None;
        }
        let mut sorted: Vec<&Arc<DictEntry>> = vocabulary.long_entries().iter().collect();
        sorted.sort_by(|a, b| a.cmp_by_weight(b));
        self.metadata.num_entries += sorted.len();
        let tail = sorted
            .into_iter()
            .map(|entry| LongEntry {
                extra_code: entry.code.extra().to_vec(),
                entry: TableEntry {
                    text: entry.text.clone(),
                    weight: entry.weight,
                },
            })
            .collect();
        self.tails.push(tail);
        Some((self.tails.len() - 1) as u32)
    }

    fn build_entry_list(&mut self, entries: &DictEntryList) -> Vec<TableEntry> {
        let mut sorted: Vec<&Arc<DictEntry>> = entries.iter().collect();
        sorted.sort_by(|a, b| a.cmp_by_weight(b));
        self.metadata.num_entries += sorted.len();
        sorted
            .into_iter()
            .map(|entry| TableEntry {
                text: entry.text.clone(),
                weight: entry.weight,
            })
            .collect()
    }

    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    pub fn dict_checksum(&self) -> u32 {
        self.metadata.dict_checksum
    }

    pub fn num_entries(&self) -> usize {
        self.metadata.num_entries
    }

    pub fn syllabary(&self) -> &Syllabary {
        &self.syllabary
    }

    pub fn syllable_by_id(&self, syllable_id: SyllableId) -> Option<&str> {
        self.syllabary
            .get(syllable_id as usize)
            .map(|s| s.as_str())
    }

    pub(crate) fn entry_at(&self, slot: EntrySlot, index: usize) -> Option<&TableEntry> {
        match slot {
            EntrySlot::Empty => None,
            EntrySlot::Head(id) => self.head.get(id as usize)?.entries.get(index),
            EntrySlot::Trunk { arena, node } => self
                .trunks
                .get(arena as usize)?
                .get(node as usize)?
                .entries
                .get(index),
            EntrySlot::Tail(arena) => self
                .tails
                .get(arena as usize)?
                .get(index)
                .map(|long| &long.entry),
        }
    }

    /// Serializes the table image.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = bincode::serialize(self).context("serialize table image")?;
        fs::write(path.as_ref(), bytes)
            .with_context(|| format!("write table image {}", path.as_ref().display()))?;
        Ok(())
    }

    /// Loads a table image, refusing unknown or outdated formats.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Table> {
        let bytes = fs::read(path.as_ref())
            .with_context(|| format!("open table image {}", path.as_ref().display()))?;
        let table: Table = bincode::deserialize(&bytes).context("parse table image")?;
        table.check_format()?;
        info!(
            path = %path.as_ref().display(),
            num_entries = table.metadata.num_entries,
            "table image loaded"
        );
        Ok(table)
    }

    fn check_format(&self) -> Result<()> {
        let format = &self.metadata.format;
        let Some(version) = format.strip_prefix(TABLE_FORMAT_PREFIX) else {
            bail!("invalid table format header {:?}", format);
        };
        let version: f64 = version
            .parse()
            .with_context(|| format!("unparsable table format version {:?}", format))?;
        ensure!(
            version >= TABLE_FORMAT_LOWEST_COMPATIBLE - f64::EPSILON,
            "table format version {} is no longer supported, expected at least {}",
            version,
            TABLE_FORMAT_LOWEST_COMPATIBLE,
        );
        Ok(())
    }

    /// Single-syllable words under one head node.
    pub fn query_words(&self, syllable_id: SyllableId) -> TableAccessor {
        TableQuery::new(self).access(syllable_id, 0.0)
    }

    /// Entries under an exact code path.
    pub fn query_phrases(&self, code: &Code) -> TableAccessor {
        if code.is_empty() {
            return TableAccessor::empty();
        }
        let mut query = TableQuery::new(self);
        for i in 0..IndexCode::MAX_LEN {
            let Some(id) = code.at(i) else {
                return TableAccessor::empty();
            };
            if code.len() == i + 1 {
                return query.access(id, 0.0);
            }
            if !query.advance(id, 0.0) {
                return TableAccessor::empty();
            }
        }
        query.access_long_entries()
    }

    /// Enumerates every dictionary match reachable in the syllable graph from
    /// `start_pos`: a breadth-first walk of `(position, query)` states over
    /// the transposed spelling indices.
    pub fn query(&self, graph: &SyllableGraph, start_pos: usize) -> Option<TableQueryResult> {
        if start_pos >= graph.interpreted_length {
            return None;
        }
        let mut result = TableQueryResult::new();
        let mut queue: VecDeque<(usize, TableQuery)> = VecDeque::new();
        queue.push_back((start_pos, TableQuery::new(self)));
        self.run_query(graph, &mut queue, &mut result);
        if result.is_empty() {
            None
        } else {
            Some(result)
        }
    }

    /// Differential query: enumerates only matches that traverse at least one
    /// edge ending past `valid_len` (the longest input prefix whose results
    /// are already cached). A depth-first walk over the graph finds, per
    /// path, the first such edge and seeds the breadth-first walk with the
    /// query advanced along the old prefix; paths that fill their index code
    /// first seed the tail query at the third syllable's end when new edges
    /// remain reachable from it.
    pub fn query_incremental(
        &self,
        graph: &SyllableGraph,
        start_pos: usize,
        valid_len: usize,
    ) -> Option<TableQueryResult> {
        if start_pos >= graph.interpreted_length {
            return None;
        }

        // positions from which an edge past valid_len is reachable
        let mut reachable_new = vec![false; graph.interpreted_length + 1];
        for (&pos, ends) in graph.edges.iter().rev() {
            if pos > graph.interpreted_length {
                continue;
            }
            reachable_new[pos] = ends
                .keys()
                .any(|&end| end > valid_len || reachable_new[end]);
        }

        let mut seeds: Vec<(usize, IndexCode, f64)> = Vec::new();
        let mut seeded: AHashSet<(usize, IndexCode)> = AHashSet::new();
        let mut visited: AHashSet<(usize, IndexCode)> = AHashSet::new();
        let mut stack: Vec<(usize, IndexCode, f64)> = vec![(start_pos, IndexCode::new(), 0.0)];
        visited.insert((start_pos, IndexCode::new()));

        while let Some((pos, path, credibility)) = stack.pop() {
            if path.is_full() {
                if reachable_new[pos] && seeded.insert((pos, path)) {
                    seeds.push((pos, path, credibility));
                }
                continue;
            }
            let Some(ends) = graph.edges.get(&pos) else {
                continue;
            };
            if ends.keys().any(|&end| end > valid_len) {
                // first new edge on this path: re-query the whole subtree
                if seeded.insert((pos, path)) {
                    seeds.push((pos, path, credibility));
                }
                continue;
            }
            for (&end, spellings) in ends {
                for (&syllable_id, props) in spellings {
                    let mut next = path;
                    next.push(syllable_id);
                    if visited.insert((end, next)) {
                        stack.push((end, next, credibility + props.spelling.credibility));
                    }
                }
            }
        }

        let mut result = TableQueryResult::new();
        let mut queue: VecDeque<(usize, TableQuery)> = VecDeque::new();
        for (pos, path, credibility) in seeds {
            let mut query = TableQuery::new(self);
            let mut walkable = true;
            for (i, &syllable_id) in path.as_slice().iter().enumerate() {
                let step = if i == 0 { credibility } else { 0.0 };
                if !query.advance(syllable_id, step) {
                    walkable = false;
                    break;
                }
            }
            if walkable {
                queue.push_back((pos, query));
            }
        }
        self.run_query(graph, &mut queue, &mut result);
        Some(result)
    }

    fn run_query<'t>(
        &'t self,
        graph: &SyllableGraph,
        queue: &mut VecDeque<(usize, TableQuery<'t>)>,
        result: &mut TableQueryResult,
    ) {
        while let Some((pos, mut query)) = queue.pop_front() {
            if pos >= graph.indices.len() {
                continue;
            }
            if query.level() == IndexCode::MAX_LEN {
                let accessor = query.access_long_entries();
                if !accessor.exhausted() {
                    result.entry(pos).or_default().push(accessor);
                }
                continue;
            }
            let index = &graph.indices[pos];
            for (&syllable_id, refs) in index {
                for r in refs {
                    let accessor = query.access(syllable_id, r.credibility);
                    if !accessor.exhausted() {
                        result.entry(r.end_pos).or_default().push(accessor);
                    }
                    if r.end_pos < graph.interpreted_length
                        && query.advance(syllable_id, r.credibility)
                    {
                        queue.push_back((r.end_pos, query.clone()));
                        query.backdate();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prism::Prism;
    use crate::syllabifier::Syllabifier;

    fn entry(text: &str, weight: f64, code: &[SyllableId]) -> Arc<DictEntry> {
        Arc::new(DictEntry {
            text: text.to_string(),
            weight,
            code: Code::from_ids(code.iter().copied()),
            ..Default::default()
        })
    }

    // diu=0 nei=1 lou=2 mou=3 hai=4
    fn syllabary() -> Syllabary {
        ["diu", "nei", "lou", "mou", "hai"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn sample_table() -> Table {
        let mut vocab = Vocabulary::new();
        vocab.insert(entry("屌", -1.0, &[0]));
        vocab.insert(entry("你", -1.0, &[1]));
        vocab.insert(entry("佬", -1.5, &[2]));
        vocab.insert(entry("毛", -1.6, &[3]));
        vocab.insert(entry("係", -1.2, &[4]));
        vocab.insert(entry("屌你", -2.0, &[0, 1]));
        vocab.insert(entry("屌你佬", -3.0, &[0, 1, 2]));
        vocab.insert(entry("屌你老母", -4.0, &[0, 1, 2, 3]));
        vocab.insert(entry("屌你老母閪", -5.0, &[0, 1, 2, 3, 4]));
        vocab.sort_homophones();
        Table::build(syllabary(), &vocab, 0xfeed)
    }

    fn graph_for(input: &str) -> SyllableGraph {
        let prism = Prism::from_syllabary(&syllabary()).unwrap();
        let syllabifier = Syllabifier::new(" '", false, false);
        syllabifier.build_syllable_graph(input, &prism).0
    }

    fn texts(table: &Table, accessor: &TableAccessor) -> Vec<String> {
        let mut accessor = accessor.clone();
        let mut out = Vec::new();
        while let Some(entry) = accessor.entry(table) {
            out.push(entry.text.clone());
            if !accessor.next() {
                break;
            }
        }
        out
    }

    #[test]
    fn query_words_reads_the_head_level() {
        let table = sample_table();
        let accessor = table.query_words(0);
        assert_eq!(texts(&table, &accessor), ["屌"]);
        assert!(table.query_words(99).exhausted());
    }

    #[test]
    fn query_phrases_resolves_each_level() {
        let table = sample_table();
        let two = table.query_phrases(&Code::from_ids([0, 1]));
        assert_eq!(texts(&table, &two), ["屌你"]);

        let three = table.query_phrases(&Code::from_ids([0, 1, 2]));
        assert_eq!(texts(&table, &three), ["屌你佬"]);

        let long = table.query_phrases(&Code::from_ids([0, 1, 2, 3]));
        assert!(long.is_long());
        assert_eq!(texts(&table, &long), ["屌你老母", "屌你老母閪"]);
        assert_eq!(long.extra_code(&table), Some(&[3u32][..]));

        assert!(table.query_phrases(&Code::from_ids([4, 4])).exhausted());
        assert!(table.query_phrases(&Code::new()).exhausted());
    }

    #[test]
    fn advance_backdate_reset_roundtrip() {
        let table = sample_table();
        let mut query = TableQuery::new(&table);
        assert!(query.advance(0, -0.5));
        assert!(query.advance(1, -0.25));
        assert_eq!(query.level(), 2);
        assert_eq!(query.index_code().as_slice(), &[0, 1]);

        let accessor = query.access(2, 0.0);
        assert_eq!(accessor.credibility(), -0.75);
        assert_eq!(texts(&table, &accessor), ["屌你佬"]);

        assert!(query.backdate());
        assert_eq!(query.level(), 1);
        assert_eq!(query.index_code().as_slice(), &[0]);

        query.reset();
        assert_eq!(query.level(), 0);
        assert!(query.index_code().is_empty());
        assert!(!query.backdate());
    }

    #[test]
    fn tail_access_needs_a_full_index_code() {
        let table = sample_table();
        let mut query = TableQuery::new(&table);
        assert!(query.access_long_entries().exhausted());
        assert!(query.advance(0, 0.0));
        assert!(query.advance(1, 0.0));
        assert!(query.advance(2, 0.0));
        let tail = query.access_long_entries();
        assert!(!tail.exhausted());
        assert_eq!(tail.remaining(), 2);
        assert_eq!(tail.code(&table).as_slice(), &[0, 1, 2, 3]);
    }

    #[test]
    fn advance_fails_off_the_index() {
        let table = sample_table();
        let mut query = TableQuery::new(&table);
        assert!(!query.advance(4, 0.0)); // 係 has no phrases below it
        assert!(query.advance(0, 0.0));
        assert!(!query.advance(3, 0.0)); // diu-mou is not indexed
    }

    #[test]
    fn graph_query_emits_matches_at_every_end() {
        let table = sample_table();
        let graph = graph_for("diuneilou");
        let result = table.query(&graph, 0).unwrap();
        assert_eq!(result.keys().copied().collect::<Vec<_>>(), vec![3, 6, 9]);
        assert_eq!(texts(&table, &result[&6][0]), ["屌你"]);
        assert_eq!(texts(&table, &result[&9][0]), ["屌你佬"]);
    }

    #[test]
    fn graph_query_rejects_out_of_range_start() {
        let table = sample_table();
        let graph = graph_for("diu");
        assert!(table.query(&graph, 3).is_none());
        assert!(table.query(&graph, 17).is_none());
    }

    #[test]
    fn incremental_query_covers_exactly_the_new_positions() {
        let table = sample_table();
        let graph = graph_for("diunei");
        // everything up to byte 3 is cached; only nei-terminated paths are new
        let result = table.query_incremental(&graph, 0, 3).unwrap();
        assert_eq!(result.keys().copied().collect::<Vec<_>>(), vec![6]);
        let all: Vec<String> = result[&6]
            .iter()
            .flat_map(|a| texts(&table, a))
            .collect();
        assert!(all.contains(&"屌你".to_string()));

        // nothing new at all
        let unchanged = table.query_incremental(&graph, 0, 6).unwrap();
        assert!(unchanged.is_empty());
    }

    #[test]
    fn incremental_query_matches_full_query_past_the_prefix() {
        let table = sample_table();
        let graph = graph_for("diuneiloumou");
        let full = table.query(&graph, 0).unwrap();
        let incremental = table.query_incremental(&graph, 0, 9).unwrap();
        for (&end, accessors) in &incremental {
            let full_texts: Vec<String> = full[&end]
                .iter()
                .flat_map(|a| texts(&table, a))
                .collect();
            for accessor in accessors {
                // short matches only surface past the cached prefix; long
                // matches sit at their three-syllable prefix end and resolve
                // to their actual end later
                if accessor.is_long() {
                    assert_eq!(end, 9);
                } else {
                    assert!(end > 9);
                }
                for text in texts(&table, accessor) {
                    assert!(full_texts.contains(&text));
                }
            }
        }
        // the four-syllable phrase surfaces from the tail seed
        let new_texts: Vec<String> = incremental
            .values()
            .flatten()
            .flat_map(|a| texts(&table, a))
            .collect();
        assert!(new_texts.contains(&"屌你老母".to_string()));
    }

    #[test]
    fn image_roundtrip_preserves_queries() {
        let table = sample_table();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.table.bin");
        table.save(&path).unwrap();

        let reloaded = Table::load(&path).unwrap();
        assert_eq!(reloaded.dict_checksum(), 0xfeed);
        assert_eq!(reloaded.num_entries(), table.num_entries());
        let accessor = reloaded.query_phrases(&Code::from_ids([0, 1]));
        assert_eq!(texts(&reloaded, &accessor), ["屌你"]);
    }

    #[test]
    fn outdated_and_foreign_formats_are_refused() {
        let mut table = sample_table();
        let dir = tempfile::tempdir().unwrap();

        table.metadata.format = "Rime::Table/3.0".to_string();
        let path = dir.path().join("old.table.bin");
        table.save(&path).unwrap();
        let err = Table::load(&path).unwrap_err();
        assert!(err.to_string().contains("no longer supported"));

        table.metadata.format = "Someone::Else/9.9".to_string();
        let path = dir.path().join("foreign.table.bin");
        table.save(&path).unwrap();
        assert!(Table::load(&path).is_err());
    }
}
