//! Text anchors for text-markup annotations
//!
//! A markup remembers the text it covers, 50 characters of context on each
//! side, its character offsets and a fingerprint of the page text it was
//! created against. If the page text is re-extracted differently (document
//! re-processed, different extractor), the fingerprint no longer matches and
//! the anchor is re-located from its context. Anything that cannot be
//! re-located is reported as drifted and left where it was.
//!
//! Offsets count Unicode scalar values, not bytes.

use crate::annotation::Quad;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Characters of context kept on each side of the selection
pub const DEFAULT_CONTEXT_CHARS: usize = 50;

/// Location of a markup inside the page's extracted text
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextAnchor {
    pub selected_text: String,
    pub prefix: String,
    pub suffix: String,
    pub start_offset: usize,
    pub end_offset: usize,
    /// SHA-256 of the page text, hex encoded; empty when unknown
    pub fingerprint: String,
}

/// Outcome of checking an anchor against live page text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorStatus {
    /// Fingerprint and offsets still match
    Intact,

    /// Page text changed but the selection was found again
    Relocated { start: usize, end: usize },

    /// The selection could not be found; keep the last-known position
    Drifted,
}

/// Content hash of a page's extracted text
pub fn fingerprint(page_text: &str) -> String {
    let digest = Sha256::digest(page_text.as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

impl TextAnchor {
    /// Build an anchor for the characters `start..end` of `page_text`
    ///
    /// Returns `None` for an empty or out-of-range selection.
    pub fn from_selection(
        page_text: &str,
        start: usize,
        end: usize,
        context_chars: usize,
    ) -> Option<Self> {
        let chars: Vec<char> = page_text.chars().collect();
        if start >= end || end > chars.len() {
            return None;
        }

        let prefix_start = start.saturating_sub(context_chars);
        let suffix_end = (end + context_chars).min(chars.len());

        Some(Self {
            selected_text: chars[start..end].iter().collect(),
            prefix: chars[prefix_start..start].iter().collect(),
            suffix: chars[end..suffix_end].iter().collect(),
            start_offset: start,
            end_offset: end,
            fingerprint: fingerprint(page_text),
        })
    }

    /// Same selection re-anchored at new offsets of `page_text`
    pub fn rebased(&self, page_text: &str, start: usize, end: usize, context_chars: usize) -> Self {
        Self::from_selection(page_text, start, end, context_chars).unwrap_or_else(|| self.clone())
    }
}

/// Check an anchor against the page's current text
///
/// Order of attempts: fingerprint plus offsets, then the full
/// prefix/selection/suffix context, then the selection on its own when it
/// occurs exactly once.
pub fn verify(anchor: &TextAnchor, page_text: &str) -> AnchorStatus {
    let chars: Vec<char> = page_text.chars().collect();
    let selected: Vec<char> = anchor.selected_text.chars().collect();
    if selected.is_empty() {
        return AnchorStatus::Drifted;
    }

    let at_offsets = anchor.end_offset <= chars.len()
        && anchor.start_offset < anchor.end_offset
        && chars[anchor.start_offset..anchor.end_offset] == selected[..];

    if at_offsets && !anchor.fingerprint.is_empty() && anchor.fingerprint == fingerprint(page_text) {
        return AnchorStatus::Intact;
    }

    let prefix: Vec<char> = anchor.prefix.chars().collect();
    let suffix: Vec<char> = anchor.suffix.chars().collect();
    let context: Vec<char> = prefix
        .iter()
        .chain(selected.iter())
        .chain(suffix.iter())
        .copied()
        .collect();

    let context_matches = find_all(&chars, &context);
    if let Some(&position) = nearest(&context_matches, anchor.start_offset.saturating_sub(prefix.len())) {
        let start = position + prefix.len();
        return AnchorStatus::Relocated {
            start,
            end: start + selected.len(),
        };
    }

    if at_offsets {
        return AnchorStatus::Relocated {
            start: anchor.start_offset,
            end: anchor.end_offset,
        };
    }

    match find_all(&chars, &selected).as_slice() {
        [only] => AnchorStatus::Relocated {
            start: *only,
            end: *only + selected.len(),
        },
        _ => AnchorStatus::Drifted,
    }
}

/// Whether two quad lists describe the same region within `tolerance`
pub fn quads_agree(a: &[Quad], b: &[Quad], tolerance: f64) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(qa, qb)| {
            qa.points
                .iter()
                .zip(qb.points.iter())
                .all(|(pa, pb)| pa.distance_to(pb) <= tolerance)
        })
}

fn find_all(haystack: &[char], needle: &[char]) -> Vec<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return Vec::new();
    }
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(|(_, window)| *window == needle)
        .map(|(index, _)| index)
        .collect()
}

fn nearest(candidates: &[usize], target: usize) -> Option<&usize> {
    candidates.iter().min_by_key(|&&candidate| candidate.abs_diff(target))
}
