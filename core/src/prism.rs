//! Prefix index of syllable spellings.
//!
//! The prism answers one question for the graph builder: which syllables can
//! start at a given input position? Spellings live in an fst map keyed by
//! their bytes; exact prefix matches probe the map once per candidate length,
//! and completion matches stream the keys that extend the trailing input.

use anyhow::{bail, Result};
use fst::{IntoStreamer, Map, MapBuilder, Streamer};

use crate::syllable::{SpellingType, SyllableId};

/// One spelling match reported to the graph builder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrismMatch {
    /// Byte position in the input where the match ends. Completion matches
    /// always end at the end of input.
    pub end_pos: usize,
    pub syllable_id: SyllableId,
    pub spelling_type: SpellingType,
    /// Cost reported by the matcher; 0.0 for exact spellings.
    pub credibility: f64,
}

/// Immutable spelling index, shared by reference across sessions.
#[derive(Debug)]
pub struct Prism {
    map: Map<Vec<u8>>,
    num_spellings: usize,
    max_spelling_len: usize,
}

impl Prism {
    /// Builds the index from a syllabary. Ids are syllabary positions, so the
    /// spellings must be unique.
    pub fn from_syllabary<S: AsRef<str>>(syllabary: &[S]) -> Result<Self> {
        let mut pairs: Vec<(&str, u64)> = syllabary
            .iter()
            .enumerate()
            .map(|(id, spelling)| (spelling.as_ref(), id as u64))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        for window in pairs.windows(2) {
            if window[0].0 == window[1].0 {
                bail!("duplicate spelling in syllabary: {:?}", window[0].0);
            }
        }

        let max_spelling_len = pairs.iter().map(|(s, _)| s.len()).max().unwrap_or(0);
        let mut builder = MapBuilder::memory();
        for (spelling, id) in &pairs {
            builder.insert(spelling, *id)?;
        }
        let map = Map::new(builder.into_inner()?)?;
        Ok(Self {
            map,
            num_spellings: pairs.len(),
            max_spelling_len,
        })
    }

    pub fn len(&self) -> usize {
        self.num_spellings
    }

    pub fn is_empty(&self) -> bool {
        self.num_spellings == 0
    }

    /// Looks up one exact spelling.
    pub fn lookup(&self, spelling: &str) -> Option<SyllableId> {
        self.map.get(spelling).map(|id| id as SyllableId)
    }

    /// Returns every syllable whose spelling is a prefix of `input[from..]`.
    pub fn extend_all(&self, input: &str, from: usize) -> Vec<PrismMatch> {
        let mut matches = Vec::new();
        if from >= input.len() {
            return matches;
        }
        let tail = &input.as_bytes()[from..];
        let longest = tail.len().min(self.max_spelling_len);
        for len in 1..=longest {
            if let Some(id) = self.map.get(&tail[..len]) {
                matches.push(PrismMatch {
                    end_pos: from + len,
                    syllable_id: id as SyllableId,
                    spelling_type: SpellingType::Normal,
                    credibility: 0.0,
                });
            }
        }
        matches
    }

    /// Returns every syllable of which `input[from..]` is a strict prefix.
    /// These become completion edges spanning to the end of input.
    pub fn completions(&self, input: &str, from: usize) -> Vec<PrismMatch> {
        let mut matches = Vec::new();
        if from >= input.len() {
            return matches;
        }
        let tail = input[from..].as_bytes();

        // keys sharing the prefix live in [tail, tail-with-last-byte-bumped)
        let mut upper = tail.to_vec();
        let mut bounded = false;
        while let Some(last) = upper.last_mut() {
            if *last < u8::MAX {
                *last += 1;
                bounded = true;
                break;
            }
            upper.pop();
        }
        let mut builder = self.map.range().ge(tail);
        if bounded {
            builder = builder.lt(&upper);
        }
        let mut stream = builder.into_stream();
        while let Some((spelling, id)) = stream.next() {
            if spelling.len() == tail.len() {
                // exact match, already reported by extend_all
                continue;
            }
            matches.push(PrismMatch {
                end_pos: input.len(),
                syllable_id: id as SyllableId,
                spelling_type: SpellingType::Completion,
                credibility: 0.0,
            });
        }
        matches
    }
}
