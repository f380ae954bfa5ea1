//! Sentence scoring seam.
//!
//! The real language model lives outside this crate; the core only hands it
//! the word graph and takes back a best-effort sentence. `UnigramPoet` is a
//! baseline scorer so sentence candidates work out of the box: a best-path
//! walk over the word graph by entry weight, with a per-word penalty against
//! over-segmentation.

use std::sync::Arc;

use crate::search::WordGraph;
use crate::vocabulary::{Code, DictEntry};

/// A sentence assembled from word-graph entries.
#[derive(Debug, Clone, Default)]
pub struct Sentence {
    pub text: String,
    pub weight: f64,
    pub components: Vec<Arc<DictEntry>>,
    pub end_pos: usize,
}

impl Sentence {
    /// Concatenated code of all components.
    pub fn code(&self) -> Code {
        let mut code = Code::new();
        for component in &self.components {
            code.0.extend_from_slice(component.code.as_slice());
        }
        code
    }
}

/// External sentence scorer contract.
pub trait SentenceScorer {
    /// Builds the best sentence covering `total_length` bytes of input, or
    /// nothing when the graph has no full cover.
    fn make_sentence(
        &self,
        words: &WordGraph,
        total_length: usize,
        preceding_text: &str,
    ) -> Option<Sentence>;
}

/// Per-word cost discouraging over-segmentation (ln 1.2).
const WORD_PENALTY: f64 = 0.182_321_556_793_955_4;

/// Baseline scorer: maximizes summed entry weights minus a length penalty.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnigramPoet;

impl SentenceScorer for UnigramPoet {
    fn make_sentence(
        &self,
        words: &WordGraph,
        total_length: usize,
        _preceding_text: &str,
    ) -> Option<Sentence> {
        if total_length == 0 {
            return None;
        }
        // sentences start at the first word position; a leading delimiter
        // run sits before it and stays outside the path
        let origin = words.keys().next().copied().unwrap_or(0);
        if origin >= total_length {
            return None;
        }
        // best[pos]: weight and component list of the best path covering
        // origin..pos
        let mut best: Vec<Option<(f64, Vec<Arc<DictEntry>>)>> = vec![None; total_length + 1];
        best[origin] = Some((0.0, Vec::new()));

        for (&start, row) in words {
            if start > total_length {
                continue;
            }
            let Some((base_weight, base_path)) = best[start].clone() else {
                continue;
            };
            for (&end, entries) in row {
                if end > total_length {
                    continue;
                }
                let Some(word) = entries
                    .iter()
                    .max_by(|a, b| a.weight.total_cmp(&b.weight))
                else {
                    continue;
                };
                let weight = base_weight + word.weight - WORD_PENALTY;
                let better = match &best[end] {
                    Some((existing, _)) => weight > *existing,
                    None => true,
                };
                if better {
                    let mut path = base_path.clone();
                    path.push(word.clone());
                    best[end] = Some((weight, path));
                }
            }
        }

        let (weight, components) = best[total_length].take()?;
        Some(Sentence {
            text: components.iter().map(|e| e.text.as_str()).collect(),
            weight,
            components,
            end_pos: total_length,
        })
    }
}
