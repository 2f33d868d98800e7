//! Fuzzy matching of recognized text against the roster.

use std::collections::BTreeSet;

use crate::error::{AttendanceError, Result};

/// A roster name accepted for one OCR string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RosterMatch {
    pub name: String,
    pub score: u8,
}

/// Case-insensitive similarity on a 0-100 scale.
pub fn similarity(a: &str, b: &str) -> u8 {
    let ratio = strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase());
    (ratio * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Matches OCR strings to known player names.
///
/// Each string is matched on its own; two strings may resolve to the same
/// name.
pub struct RosterMatcher {
    names: Vec<String>,
    threshold: u8,
}

impl RosterMatcher {
    pub fn new<I, S>(names: I, threshold: u8) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        Self {
            names: names.into_iter().collect(),
            threshold,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Best roster name for `text`, accepted only if it scores strictly above
    /// the threshold. The first name reaching the best score wins.
    pub fn match_text(&self, text: &str) -> Result<RosterMatch> {
        let mut best: Option<(&str, u8)> = None;
        for name in &self.names {
            let score = similarity(text, name);
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((name, score));
            }
        }

        match best {
            Some((name, score)) if score > self.threshold => Ok(RosterMatch {
                name: name.to_string(),
                score,
            }),
            other => Err(AttendanceError::RecognitionMiss {
                text: text.to_string(),
                score: other.map(|(_, s)| s).unwrap_or(0),
            }),
        }
    }
}
