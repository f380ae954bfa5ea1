//! Typo suggestions for the syllable graph builder.
//!
//! A corrector proposes syllables that almost match the input at a position.
//! Suggestions surface as graph edges flagged `is_correction`, with the cost
//! folded into the edge credibility so downstream ranking discounts them.

use std::sync::Arc;

use crate::prism::{Prism, PrismMatch};
use crate::syllable::SpellingType;

/// Log-domain cost attached to corrected spellings (ln 0.01).
pub const CORRECTION_CREDIBILITY: f64 = -4.605_170_185_988_091;

/// Source of near-miss spelling suggestions.
pub trait Corrector {
    /// Returns syllables that match `input[from..]` after one plausible typo.
    fn suggest(&self, input: &str, from: usize) -> Vec<PrismMatch>;
}

/// Suggests syllables reachable by one keyboard slip: a substitution with an
/// adjacent key, or a transposition of two neighboring letters.
#[derive(Debug)]
pub struct NearKeyCorrector {
    prism: Arc<Prism>,
}

impl NearKeyCorrector {
    pub fn new(prism: Arc<Prism>) -> Self {
        Self { prism }
    }

    fn push_if_known(&self, spelling: &str, end_pos: usize, out: &mut Vec<PrismMatch>) {
        if let Some(id) = self.prism.lookup(spelling) {
            let m = PrismMatch {
                end_pos,
                syllable_id: id,
                spelling_type: SpellingType::Normal,
                credibility: CORRECTION_CREDIBILITY,
            };
            if !out.contains(&m) {
                out.push(m);
            }
        }
    }
}

impl Corrector for NearKeyCorrector {
    fn suggest(&self, input: &str, from: usize) -> Vec<PrismMatch> {
        let mut out = Vec::new();
        if from >= input.len() || !input.is_char_boundary(from) {
            return out;
        }
        let tail = input[from..].as_bytes();
        if !tail.iter().all(|b| b.is_ascii_lowercase()) {
            return out;
        }

        let mut buf = Vec::with_capacity(tail.len());
        for len in 1..=tail.len() {
            let slice = &tail[..len];

            // substitution with an adjacent key
            for i in 0..len {
                for &neighbor in adjacent_keys(slice[i] as char) {
                    if neighbor as u8 == slice[i] {
                        continue;
                    }
                    buf.clear();
                    buf.extend_from_slice(slice);
                    buf[i] = neighbor as u8;
                    if let Ok(candidate) = std::str::from_utf8(&buf) {
                        self.push_if_known(candidate, from + len, &mut out);
                    }
                }
            }

            // transposition of two neighboring letters
            for i in 0..len.saturating_sub(1) {
                if slice[i] == slice[i + 1] {
                    continue;
                }
                buf.clear();
                buf.extend_from_slice(slice);
                buf.swap(i, i + 1);
                if let Ok(candidate) = std::str::from_utf8(&buf) {
                    self.push_if_known(candidate, from + len, &mut out);
                }
            }
        }
        out
    }
}

/// QWERTY neighbors of a key, the key itself excluded.
fn adjacent_keys(key: char) -> &'static [char] {
    match key {
        'q' => &['w', 'a'],
        'w' => &['q', 'e', 's'],
        'e' => &['w', 'r', 'd'],
        'r' => &['e', 't', 'f'],
        't' => &['r', 'y', 'g'],
        'y' => &['t', 'u', 'h'],
        'u' => &['y', 'i', 'j'],
        'i' => &['u', 'o', 'k'],
        'o' => &['i', 'p', 'l'],
        'p' => &['o', 'l'],
        'a' => &['q', 's', 'z'],
        's' => &['a', 'd', 'w', 'x', 'z'],
        'd' => &['s', 'f', 'e', 'c', 'x'],
        'f' => &['d', 'g', 'r', 'v', 'c'],
        'g' => &['f', 'h', 't', 'b', 'v'],
        'h' => &['g', 'j', 'y', 'n', 'b'],
        'j' => &['h', 'k', 'u', 'm', 'n'],
        'k' => &['j', 'l', 'i', 'm'],
        'l' => &['k', 'o', 'p'],
        'z' => &['a', 's', 'x'],
        'x' => &['z', 's', 'd', 'c'],
        'c' => &['x', 'd', 'f', 'v'],
        'v' => &['c', 'f', 'g', 'b'],
        'b' => &['v', 'g', 'h', 'n'],
        'n' => &['b', 'h', 'j', 'm'],
        'm' => &['n', 'j', 'k'],
        _ => &[],
    }
}
