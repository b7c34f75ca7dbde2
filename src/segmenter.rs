//! Raw sentence segmentation.
//!
//! The primary path asks a locale-specific [`BoundaryDetector`] for sentence
//! end offsets. Detectors are resolved once per locale and kept for the
//! lifetime of the segmenter. When no detector is available, or the one we
//! have returns garbage, segmentation degrades to a punctuation scan that
//! groups "text followed by terminators" runs and keeps any unterminated
//! tail as a final span. Nothing here panics on well-formed `&str` input.

use crate::position::PositionRange;
use crate::trie::{is_quote_or_bracket, is_sentence_terminator, is_whitespace};
use anyhow::{Result, bail};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

static RE_TERMINATED_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^.!?]+[.!?]+").unwrap());

/// A span produced by raw segmentation. `index` and `length` are byte
/// offsets into the segmented text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSegment {
    pub text: String,
    pub index: usize,
    pub length: usize,
}

/// Minimal addressable span of source text anchored to its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUnit {
    pub text: String,
    pub position: PositionRange,
    pub source_indices: Vec<usize>,
}

impl TextUnit {
    pub fn new(text: impl Into<String>, position: PositionRange, source_index: usize) -> Self {
        Self {
            text: text.into(),
            position,
            source_indices: vec![source_index],
        }
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Locale-aware sentence boundary primitive.
pub trait BoundaryDetector: Send + Sync {
    /// Byte offsets where each sentence ends, strictly increasing and on
    /// char boundaries. The final offset may be omitted; the remainder is
    /// kept as a trailing span.
    fn boundaries(&self, text: &str) -> Result<Vec<usize>>;
}

/// Resolves a detector for a locale; `None` means "not available".
pub type DetectorFactory = Arc<dyn Fn(&str) -> Option<Arc<dyn BoundaryDetector>> + Send + Sync>;

/// General-purpose detector: a sentence ends after a run of terminators
/// (plus any closing quotes or brackets) that is followed by whitespace or
/// the end of the text. Whitespace after the terminator stays with the
/// sentence it follows.
#[derive(Debug, Clone, Copy, Default)]
pub struct PunctuationBoundaries;

impl BoundaryDetector for PunctuationBoundaries {
    fn boundaries(&self, text: &str) -> Result<Vec<usize>> {
        let mut ends = Vec::new();
        let mut chars = text.char_indices().peekable();
        while let Some((_, ch)) = chars.next() {
            if !is_sentence_terminator(ch) {
                continue;
            }
            while let Some(&(_, next)) = chars.peek() {
                if is_sentence_terminator(next) || is_quote_or_bracket(next) {
                    chars.next();
                } else {
                    break;
                }
            }
            match chars.peek() {
                None => ends.push(text.len()),
                Some(&(_, next)) if is_whitespace(next) => {
                    let mut end = text.len();
                    while let Some(&(idx, next)) = chars.peek() {
                        if is_whitespace(next) {
                            chars.next();
                        } else {
                            end = idx;
                            break;
                        }
                    }
                    ends.push(end);
                }
                Some(_) => {}
            }
        }
        Ok(ends)
    }
}

fn default_factory() -> DetectorFactory {
    Arc::new(|_locale: &str| Some(Arc::new(PunctuationBoundaries) as Arc<dyn BoundaryDetector>))
}

pub struct SentenceSegmenter {
    locale: String,
    factory: DetectorFactory,
    detectors: Mutex<HashMap<String, Option<Arc<dyn BoundaryDetector>>>>,
}

impl std::fmt::Debug for SentenceSegmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentenceSegmenter")
            .field("locale", &self.locale)
            .finish_non_exhaustive()
    }
}

impl SentenceSegmenter {
    pub fn new(locale: impl Into<String>) -> Self {
        Self::with_detector_factory(locale, default_factory())
    }

    pub fn with_detector_factory(locale: impl Into<String>, factory: DetectorFactory) -> Self {
        Self {
            locale: locale.into(),
            factory,
            detectors: Mutex::new(HashMap::new()),
        }
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    fn detector(&self) -> Option<Arc<dyn BoundaryDetector>> {
        let mut detectors = self.detectors.lock().unwrap_or_else(PoisonError::into_inner);
        detectors
            .entry(self.locale.clone())
            .or_insert_with(|| {
                let detector = (self.factory)(&self.locale);
                debug!(
                    locale = %self.locale,
                    available = detector.is_some(),
                    "Resolved sentence boundary detector"
                );
                detector
            })
            .clone()
    }

    pub fn segment(&self, text: &str) -> Vec<RawSegment> {
        if text.trim_matches(is_whitespace).is_empty() {
            return Vec::new();
        }
        let Some(detector) = self.detector() else {
            return fallback_segments(text);
        };
        match detector
            .boundaries(text)
            .and_then(|ends| segments_from_boundaries(text, &ends))
        {
            Ok(segments) => segments,
            Err(err) => {
                warn!(locale = %self.locale, "Boundary detector failed; using punctuation scan: {err}");
                fallback_segments(text)
            }
        }
    }
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new("en")
    }
}

fn segments_from_boundaries(text: &str, ends: &[usize]) -> Result<Vec<RawSegment>> {
    let mut segments = Vec::with_capacity(ends.len() + 1);
    let mut start = 0;
    for &end in ends {
        if end <= start || end > text.len() || !text.is_char_boundary(end) {
            bail!("invalid sentence boundary {end} after {start} (len {})", text.len());
        }
        push_span(&mut segments, text, start, end);
        start = end;
    }
    if start < text.len() {
        push_span(&mut segments, text, start, text.len());
    }
    Ok(segments)
}

fn push_span(segments: &mut Vec<RawSegment>, text: &str, start: usize, end: usize) {
    let span = &text[start..end];
    if span.trim_matches(is_whitespace).is_empty() {
        return;
    }
    segments.push(RawSegment {
        text: span.to_string(),
        index: start,
        length: end - start,
    });
}

/// Punctuation scan used when no boundary detector is usable. Text between
/// or after terminated runs is kept as its own span so nothing is lost.
pub fn fallback_segments(text: &str) -> Vec<RawSegment> {
    let mut segments = Vec::new();
    let mut cursor = 0;
    for found in RE_TERMINATED_RUN.find_iter(text) {
        if found.start() > cursor {
            push_span(&mut segments, text, cursor, found.start());
        }
        push_span(&mut segments, text, found.start(), found.end());
        cursor = found.end();
    }
    if cursor < text.len() {
        push_span(&mut segments, text, cursor, text.len());
    }
    segments
}
