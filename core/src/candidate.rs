//! Candidate types and lazy translations.
//!
//! A translation yields ranked candidates one at a time through `peek`,
//! `next` and `exhausted`. The variants are a closed set: the phrase
//! translation produced by the translator, a dedup wrapper, and the empty
//! translation every failure path degrades to.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::translator::PhraseTranslation;

/// A ranked conversion candidate over a span of the composition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub text: String,
    pub comment: String,
    pub preedit: String,
    /// Relative quality; higher sorts first.
    pub quality: f64,
    /// Byte span in the composition.
    pub start: usize,
    pub end: usize,
}

/// Lazy candidate iterator.
pub enum Translation {
    Phrase(Box<PhraseTranslation>),
    Distinct(Box<DistinctTranslation>),
    Empty,
}

impl Translation {
    /// Current candidate without consuming it.
    pub fn peek(&mut self) -> Option<Candidate> {
        match self {
            Translation::Phrase(inner) => inner.peek(),
            Translation::Distinct(inner) => inner.peek(),
            Translation::Empty => None,
        }
    }

    /// Advances to the next candidate; false once exhausted.
    pub fn next(&mut self) -> bool {
        match self {
            Translation::Phrase(inner) => inner.next(),
            Translation::Distinct(inner) => inner.next(),
            Translation::Empty => false,
        }
    }

    pub fn exhausted(&self) -> bool {
        match self {
            Translation::Phrase(inner) => inner.exhausted(),
            Translation::Distinct(inner) => inner.exhausted(),
            Translation::Empty => true,
        }
    }

    /// Wraps this translation so repeated candidate texts surface once.
    pub fn distinct(self) -> Translation {
        Translation::Distinct(Box::new(DistinctTranslation {
            inner: self,
            seen: AHashSet::new(),
        }))
    }

    /// Drains up to `limit` candidates; mainly for tests and tools.
    pub fn take(&mut self, limit: usize) -> Vec<Candidate> {
        let mut out = Vec::new();
        while out.len() < limit {
            let Some(candidate) = self.peek() else {
                break;
            };
            out.push(candidate);
            if !self.next() {
                break;
            }
        }
        out
    }
}

/// Skips candidates whose text was already yielded.
pub struct DistinctTranslation {
    inner: Translation,
    seen: AHashSet<String>,
}

impl DistinctTranslation {
    fn skip_seen(&mut self) {
        while let Some(candidate) = self.inner.peek() {
            if !self.seen.contains(&candidate.text) {
                break;
            }
            if !self.inner.next() {
                break;
            }
        }
    }

    pub fn peek(&mut self) -> Option<Candidate> {
        self.skip_seen();
        self.inner.peek()
    }

    pub fn next(&mut self) -> bool {
        self.skip_seen();
        if let Some(candidate) = self.inner.peek() {
            self.seen.insert(candidate.text);
        }
        if !self.inner.next() {
            return false;
        }
        self.skip_seen();
        !self.inner.exhausted()
    }

    pub fn exhausted(&self) -> bool {
        self.inner.exhausted()
    }
}
