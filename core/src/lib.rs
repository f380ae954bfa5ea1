//! libjyutping-core
//!
//! Incremental phrase-lookup core for syllabic-language input methods.
//! A stream of undelimited Latin syllables (e.g. `diuneiloumou`) turns, on
//! every keystroke, into a ranked candidate list and a best-effort sentence
//! over the typed prefix.
//!
//! The moving parts, leaves first:
//! - `Prism` - prefix index of syllable spellings
//! - `Syllabifier` / `SyllableGraph` - DAG of plausible syllable boundaries
//! - `Table` - immutable multi-level phrase trie with graph queries
//! - `SearchContext` - per-session cache driving incremental re-query
//! - `Dictionary` - façade owning the loaded table and prism
//! - `Translator` - the public query surface yielding lazy `Translation`s
use serde::{Deserialize, Serialize};

pub mod syllable;
pub use syllable::{
    EdgeProperties, Segment, SpellingProperties, SpellingType, Syllabary, SyllableId,
};

pub mod vocabulary;
pub use vocabulary::{Code, DictEntry, DictEntryList, IndexCode, Vocabulary};

pub mod prism;
pub use prism::{Prism, PrismMatch};

pub mod corrector;
pub use corrector::{Corrector, NearKeyCorrector, CORRECTION_CREDIBILITY};

pub mod syllabifier;
pub use syllabifier::{SpellingRef, SyllableGraph, Syllabifier, COMPLETION_PENALTY};

pub mod table;
pub use table::{Table, TableAccessor, TableEntry, TableQuery, TABLE_FORMAT_LATEST};

pub mod search;
pub use search::{longest_common_prefix, SearchContext, SearchStats, WordGraph};

pub mod dictionary;
pub use dictionary::{DictEntryCollector, DictEntryIterator, DictState, Dictionary};

pub mod poet;
pub use poet::{Sentence, SentenceScorer, UnigramPoet};

pub mod candidate;
pub use candidate::{Candidate, DistinctTranslation, Translation};

pub mod translator;
pub use translator::{PhraseTranslation, Translator};

/// Session configuration. All keys are optional in the TOML form and default
/// to the values below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Characters consumed as syllable separators without forming edges.
    pub delimiters: String,
    /// Show the spelling of candidates up to this many syllables as a
    /// comment; 0 disables spelling hints.
    pub spelling_hints: usize,
    /// Show spelling comments even when they repeat the preedit.
    pub always_show_comments: bool,
    /// Let the corrector propose near-miss spellings.
    pub enable_correction: bool,
    /// Extend a partial trailing syllable to known spellings.
    pub enable_completion: bool,
    /// Admit exact spellings only.
    pub strict_spelling: bool,
    /// Entries kept per span in the word graph.
    pub max_homophones: usize,
    /// Correction-derived candidates emitted per query.
    pub max_corrections: usize,
    /// Recompute every lookup from scratch; the correctness oracle for the
    /// incremental path.
    pub disable_incremental_search: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delimiters: " '".to_string(),
            spelling_hints: 0,
            always_show_comments: false,
            enable_correction: false,
            enable_completion: true,
            strict_spelling: false,
            max_homophones: 16,
            max_corrections: 4,
            disable_incremental_search: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to a TOML file.
    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Utility helpers.
pub mod utils {
    /// Normalize query input: NFC, lowercased. Offsets must survive, so no
    /// trimming happens here.
    pub fn normalize(s: &str) -> String {
        use unicode_normalization::UnicodeNormalization;
        s.nfc().collect::<String>().to_lowercase()
    }
}
