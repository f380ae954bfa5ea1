//! Dictionary entry model and the build-side vocabulary trie.
//!
//! `Code` is the full syllable path of a phrase; its first three syllables
//! form the `IndexCode` used as the key path into the phrase table's fast
//! index. Phrases longer than the index depth keep the remainder as extra
//! code next to the entry.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::syllable::SyllableId;

/// Fixed-capacity key path into the phrase table index.
///
/// Equality and hashing are value-based over the filled prefix only, so an
/// `IndexCode` can key seed-deduplication sets during incremental queries.
#[derive(Debug, Clone, Copy, Default, Eq)]
pub struct IndexCode {
    codes: [SyllableId; IndexCode::MAX_LEN],
    len: u8,
}

impl IndexCode {
    /// Number of syllables the table index resolves before falling back to
    /// extra code stored with long entries.
    pub const MAX_LEN: usize = 3;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == Self::MAX_LEN
    }

    pub fn as_slice(&self) -> &[SyllableId] {
        &self.codes[..self.len()]
    }

    /// Appends a syllable. Pushing onto a full code is a logic error; the
    /// extra syllable is ignored in release builds.
    pub fn push(&mut self, syllable_id: SyllableId) {
        debug_assert!(!self.is_full());
        if !self.is_full() {
            self.codes[self.len()] = syllable_id;
            self.len += 1;
        }
    }

    pub fn pop(&mut self) -> Option<SyllableId> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(self.codes[self.len()])
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.codes = [0; Self::MAX_LEN];
    }
}

impl PartialEq for IndexCode {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Hash for IndexCode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state);
    }
}

impl From<&[SyllableId]> for IndexCode {
    fn from(ids: &[SyllableId]) -> Self {
        let mut code = IndexCode::new();
        for &id in ids.iter().take(IndexCode::MAX_LEN) {
            code.push(id);
        }
        code
    }
}

/// Variable-length syllable path of a phrase.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Code(pub Vec<SyllableId>);

impl Code {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids<I: IntoIterator<Item = SyllableId>>(ids: I) -> Self {
        Self(ids.into_iter().collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, syllable_id: SyllableId) {
        self.0.push(syllable_id);
    }

    pub fn at(&self, index: usize) -> Option<SyllableId> {
        self.0.get(index).copied()
    }

    pub fn as_slice(&self) -> &[SyllableId] {
        &self.0
    }

    /// The indexed prefix of this code.
    pub fn index_prefix(&self) -> IndexCode {
        IndexCode::from(self.as_slice())
    }

    /// The part of the code beyond the indexed prefix.
    pub fn extra(&self) -> &[SyllableId] {
        if self.len() > IndexCode::MAX_LEN {
            &self.0[IndexCode::MAX_LEN..]
        } else {
            &[]
        }
    }
}

impl From<&IndexCode> for Code {
    fn from(index_code: &IndexCode) -> Self {
        Self(index_code.as_slice().to_vec())
    }
}

/// A dictionary entry yielded to candidates and cached in the word graph.
///
/// Entries are shared by reference count between the search cache and any
/// candidate holding them, so they are never mutated after creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DictEntry {
    pub text: String,
    pub comment: String,
    pub preedit: String,
    /// Log-probability-like weight; higher is better.
    pub weight: f64,
    pub commit_count: u32,
    pub code: Code,
    pub remaining_code_length: usize,
}

impl DictEntry {
    /// Ordering used for homophone lists: heavier entries first, ties broken
    /// by text.
    pub fn cmp_by_weight(&self, other: &Self) -> Ordering {
        other
            .weight
            .total_cmp(&self.weight)
            .then_with(|| self.text.cmp(&other.text))
    }
}

/// Homophone list shared between cache rows and candidates.
pub type DictEntryList = Vec<Arc<DictEntry>>;

/// Sorts a homophone list heaviest-first.
pub fn sort_entries(entries: &mut DictEntryList) {
    entries.sort_by(|a, b| a.cmp_by_weight(b));
}

/// Build-side trie of dictionary entries keyed by syllable path.
///
/// The first three levels are keyed by syllable id; entries whose code runs
/// past the index depth collect in the long-entry page of the vocabulary
/// reached after three syllables. The table builder consumes this shape
/// level by level.
#[derive(Debug, Default)]
pub struct Vocabulary {
    pages: BTreeMap<SyllableId, VocabularyPage>,
    long_entries: DictEntryList,
}

#[derive(Debug, Default)]
pub struct VocabularyPage {
    pub entries: DictEntryList,
    pub next_level: Option<Box<Vocabulary>>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pages(&self) -> &BTreeMap<SyllableId, VocabularyPage> {
        &self.pages
    }

    pub fn long_entries(&self) -> &DictEntryList {
        &self.long_entries
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty() && self.long_entries.is_empty()
    }

    /// Inserts an entry under its code. Entries with an empty code are
    /// ignored.
    pub fn insert(&mut self, entry: Arc<DictEntry>) {
        if entry.code.is_empty() {
            return;
        }
        self.insert_at(entry, 0);
    }

    fn insert_at(&mut self, entry: Arc<DictEntry>, depth: usize) {
        if depth == IndexCode::MAX_LEN {
            self.long_entries.push(entry);
            return;
        }
        // depth < MAX_LEN, so the code still has a syllable here
        let id = match entry.code.at(depth) {
            Some(id) => id,
            None => return,
        };
        let page = self.pages.entry(id).or_default();
        if entry.code.len() == depth + 1 {
            page.entries.push(entry);
        } else {
            page.next_level
                .get_or_insert_with(Default::default)
                .insert_at(entry, depth + 1);
        }
    }

    /// Sorts every homophone list heaviest-first, recursively.
    pub fn sort_homophones(&mut self) {
        sort_entries(&mut self.long_entries);
        for page in self.pages.values_mut() {
            sort_entries(&mut page.entries);
            if let Some(next) = &mut page.next_level {
                next.sort_homophones();
            }
        }
    }
}
