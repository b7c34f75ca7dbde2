//! Best-effort refinement of raw sentence units.
//!
//! Raw boundary detection splits after every terminator, so "Mr. Smith" comes
//! out as two units. Refinement walks the units once and glues a unit onto
//! its predecessor when the predecessor ends with a known abbreviation. An
//! optional length pass then folds short fragments together.

use crate::config::SegmentationLists;
use crate::position::merge_ranges;
use crate::segmenter::TextUnit;
use crate::trie::{
    ScanDirection, ScanningTrie, is_punctuation, is_quote_or_bracket, is_sentence_terminator,
    is_whitespace,
};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Tries derived from the three refinement word lists.
#[derive(Debug, Clone)]
pub struct RefinementTries {
    abbreviations: ScanningTrie,
    always_merge: ScanningTrie,
    sentence_starters: ScanningTrie,
}

impl RefinementTries {
    pub fn new<S: AsRef<str>>(
        abbreviations: &[S],
        always_merge: &[S],
        sentence_starters: &[S],
    ) -> Self {
        Self {
            abbreviations: ScanningTrie::from_words(abbreviations, ScanDirection::Suffix),
            always_merge: ScanningTrie::from_words(always_merge, ScanDirection::Suffix),
            sentence_starters: ScanningTrie::from_words(sentence_starters, ScanDirection::Prefix),
        }
    }

    pub fn from_lists(lists: &SegmentationLists) -> Self {
        Self::new(
            &lists.abbreviations,
            &lists.always_merge,
            &lists.sentence_starters,
        )
    }

    /// Whether `right` continues the sentence that `left` ends. Only a
    /// recognized abbreviation at the end of `left` can trigger a merge;
    /// always-merge words then merge regardless of `right`.
    pub fn should_merge(&self, left: &str, right: &str) -> bool {
        if !self.abbreviations.has_match_end(left) {
            return false;
        }
        self.always_merge.has_match_end(left) || !self.sentence_starters.matches_start(right)
    }

    /// Single left-to-right pass merging across abbreviation boundaries.
    pub fn refine(&self, units: &[TextUnit]) -> Vec<TextUnit> {
        let mut merged: Vec<TextUnit> = Vec::with_capacity(units.len());
        for current in units {
            match merged.last_mut() {
                Some(last) if self.should_merge(&last.text, &current.text) => {
                    let text = join_spaced(&last.text, &current.text);
                    *last = combine(last, current, text);
                }
                _ => merged.push(current.clone()),
            }
        }
        merged
    }
}

/// Refine `units` against the given lists, then apply [`merge_by_length`]
/// when `min_length > 0`.
pub fn refine_segments<S: AsRef<str>>(
    units: &[TextUnit],
    abbreviations: &[S],
    always_merge: &[S],
    sentence_starters: &[S],
    min_length: usize,
) -> Vec<TextUnit> {
    let tries = RefinementTries::new(abbreviations, always_merge, sentence_starters);
    let refined = tries.refine(units);
    merge_by_length(&refined, min_length)
}

/// Fold consecutive units together until each reaches `min_length`
/// characters (trimmed). A short tail is merged backward into the last
/// emitted unit. `min_length == 0` returns the input unchanged.
pub fn merge_by_length(units: &[TextUnit], min_length: usize) -> Vec<TextUnit> {
    if min_length == 0 {
        return units.to_vec();
    }
    let mut output: Vec<TextUnit> = Vec::new();
    let mut buffer: Option<TextUnit> = None;
    for unit in units {
        let next = match buffer.take() {
            Some(pending) => {
                let text = join_terminated(&pending.text, &unit.text);
                combine(&pending, unit, text)
            }
            None => unit.clone(),
        };
        if trimmed_len(&next.text) >= min_length {
            output.push(next);
        } else {
            buffer = Some(next);
        }
    }
    if let Some(tail) = buffer {
        match output.last_mut() {
            Some(last) => {
                let text = join_terminated(&last.text, &tail.text);
                *last = combine(last, &tail, text);
            }
            None => output.push(tail),
        }
    }
    debug!(
        input = units.len(),
        output = output.len(),
        min_length,
        "Merged short sentence units"
    );
    output
}

/// Refiner that keeps the derived tries between calls and rebuilds them only
/// when the content of the word lists changes.
#[derive(Debug, Default)]
pub struct SentenceRefiner {
    cached: Mutex<Option<(String, Arc<RefinementTries>)>>,
}

impl SentenceRefiner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tries(&self, lists: &SegmentationLists) -> Arc<RefinementTries> {
        let fingerprint = lists.fingerprint();
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((key, tries)) = cached.as_ref() {
            if *key == fingerprint {
                return Arc::clone(tries);
            }
        }
        debug!(fingerprint = %fingerprint, "Rebuilding refinement tries");
        let tries = Arc::new(RefinementTries::from_lists(lists));
        *cached = Some((fingerprint, Arc::clone(&tries)));
        tries
    }

    pub fn refine(&self, units: &[TextUnit], lists: &SegmentationLists) -> Vec<TextUnit> {
        let refined = self.tries(lists).refine(units);
        merge_by_length(&refined, lists.min_sentence_length)
    }
}

/// Whether `text` ends on a sentence terminator, ignoring trailing
/// whitespace and closing quotes or brackets.
pub fn ends_sentence(text: &str) -> bool {
    text.trim_end_matches(|ch: char| is_whitespace(ch) || is_quote_or_bracket(ch))
        .chars()
        .next_back()
        .is_some_and(is_sentence_terminator)
}

/// Join a unit that stops mid-sentence with the next unit when both start in
/// the same block, e.g. `He said <b>hello</b> to me.` extracted as three
/// text nodes. Text is concatenated as extracted; units from different
/// blocks, such as a heading and the paragraph after it, stay apart.
pub fn join_inline_runs(units: &[TextUnit]) -> Vec<TextUnit> {
    let mut joined: Vec<TextUnit> = Vec::with_capacity(units.len());
    for current in units {
        match joined.last_mut() {
            Some(last)
                if !ends_sentence(&last.text) && last.position.shares_block(&current.position) =>
            {
                let text = format!("{}{}", last.text, current.text);
                *last = combine(last, current, text);
            }
            _ => joined.push(current.clone()),
        }
    }
    if joined.len() < units.len() {
        debug!(before = units.len(), after = joined.len(), "Joined inline runs");
    }
    joined
}

fn combine(left: &TextUnit, right: &TextUnit, text: String) -> TextUnit {
    let mut source_indices = left.source_indices.clone();
    source_indices.extend_from_slice(&right.source_indices);
    source_indices.sort_unstable();
    source_indices.dedup();
    TextUnit {
        text,
        position: merge_ranges(&left.position, &right.position),
        source_indices,
    }
}

fn trimmed_len(text: &str) -> usize {
    text.trim_matches(is_whitespace).chars().count()
}

fn join_spaced(left: &str, right: &str) -> String {
    let mut out = String::with_capacity(left.len() + right.len() + 1);
    out.push_str(left);
    push_separated(&mut out, right);
    out
}

// Adds a `.` when the left side does not already end in punctuation.
fn join_terminated(left: &str, right: &str) -> String {
    let body = left.trim_end_matches(is_whitespace);
    let mut out = String::with_capacity(left.len() + right.len() + 2);
    out.push_str(body);
    if body.chars().next_back().is_some_and(|ch| !is_punctuation(ch)) {
        out.push('.');
    }
    out.push_str(&left[body.len()..]);
    push_separated(&mut out, right);
    out
}

fn push_separated(out: &mut String, right: &str) {
    let left_spaced = out.chars().next_back().is_none_or(is_whitespace);
    let right_spaced = right.chars().next().is_none_or(is_whitespace);
    if !left_spaced && !right_spaced {
        out.push(' ');
    }
    out.push_str(right);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::PositionRange;

    fn units(texts: &[&str]) -> Vec<TextUnit> {
        let mut offset = 0;
        texts
            .iter()
            .enumerate()
            .map(|(idx, text)| {
                let len = text.encode_utf16().count();
                let position = PositionRange::new(format!(
                    "epubcfi(/6/4!/4/2/1,:{offset},:{})",
                    offset + len
                ));
                offset += len;
                TextUnit::new(*text, position, idx)
            })
            .collect()
    }

    fn texts(units: &[TextUnit]) -> Vec<&str> {
        units.iter().map(|u| u.text.as_str()).collect()
    }

    fn strip_separators(text: &str) -> String {
        text.chars()
            .filter(|ch| !ch.is_whitespace() && *ch != '.')
            .collect()
    }

    const NONE: &[&str] = &[];

    #[test]
    fn always_merge_title_joins_following_unit() {
        let input = units(&["Mr.", "Smith went to Washington."]);
        let out = refine_segments(&input, &["Mr."], &["Mr."], NONE, 0);
        assert_eq!(texts(&out), vec!["Mr. Smith went to Washington."]);
        assert_eq!(out[0].source_indices, vec![0, 1]);
        assert_eq!(out[0].position.as_str(), "epubcfi(/6/4!/4/2/1,:0,:28)");
    }

    #[test]
    fn always_merge_needs_a_listed_abbreviation() {
        let input = units(&["Ask Mr.", "Nobody answered."]);
        let out = refine_segments(&input, NONE, &["Mr."], NONE, 0);
        assert_eq!(out, input);

        let out = refine_segments(&input, &["Mr."], &["Mr."], &["Nobody"], 0);
        assert_eq!(texts(&out), vec!["Ask Mr. Nobody answered."]);
    }

    #[test]
    fn sentence_starter_blocks_ambiguous_abbreviation() {
        let input = units(&["I visited the Dr.", "He was nice."]);
        let out = refine_segments(&input, &["Dr."], NONE, &["He"], 0);
        assert_eq!(out, input);
    }

    #[test]
    fn ambiguous_abbreviation_merges_without_starter() {
        let input = units(&["We met on Baker St. ", "near the station."]);
        let out = refine_segments(&input, &["St."], NONE, &["He"], 0);
        assert_eq!(texts(&out), vec!["We met on Baker St. near the station."]);
    }

    #[test]
    fn abbreviation_must_start_a_word() {
        let input = units(&["The cost was 5 Mr.", "Nothing else."]);
        let out = refine_segments(&input, &["r."], &["r."], NONE, 0);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn chained_merges_accumulate() {
        let input = units(&["Dr.", "Mrs.", "Jones arrived.", "It rained."]);
        let out = refine_segments(&input, &["Dr.", "Mrs."], &["Dr.", "Mrs."], NONE, 0);
        assert_eq!(texts(&out), vec!["Dr. Mrs. Jones arrived.", "It rained."]);
        assert_eq!(out[0].source_indices, vec![0, 1, 2]);
    }

    #[test]
    fn refinement_never_grows_or_drops_text() {
        let input = units(&[
            "Mr.", "Brown met Dr.", "Who at St.", "Paul's. ", "He left.", "e.g.", "this.",
        ]);
        let abbreviations = ["Mr.", "Dr.", "St.", "e.g."];
        let always = ["Mr.", "e.g."];
        let starters = ["He", "Who"];
        let out = refine_segments(&input, &abbreviations, &always, &starters, 0);
        assert!(out.len() <= input.len());
        let before: String = input.iter().map(|u| strip_separators(&u.text)).collect();
        let after: String = out.iter().map(|u| strip_separators(&u.text)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn merge_by_length_folds_short_units() {
        let input = units(&["One.", "Two.", "Three four five.", "Six."]);
        let out = merge_by_length(&input, 10);
        assert_eq!(texts(&out), vec!["One. Two. Three four five. Six."]);
        assert_eq!(out[0].source_indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn merge_by_length_inserts_missing_terminator() {
        let input = units(&["A heading", "Then a sentence follows here."]);
        let out = merge_by_length(&input, 12);
        assert_eq!(texts(&out), vec!["A heading. Then a sentence follows here."]);
    }

    #[test]
    fn merge_by_length_keeps_existing_punctuation() {
        let input = units(&["Wait!", "Long enough sentence."]);
        let out = merge_by_length(&input, 8);
        assert_eq!(texts(&out), vec!["Wait! Long enough sentence."]);
    }

    #[test]
    fn merge_by_length_respects_minimum() {
        let input = units(&[
            "Short.", "Another short.", "This one is definitely long enough.", "Tiny.", "Also.",
            "Then a longer closing sentence.", "End.",
        ]);
        let min = 15;
        let out = merge_by_length(&input, min);
        assert!(out.len() <= input.len());
        for unit in &out {
            assert!(trimmed_len(&unit.text) >= min, "{:?}", unit.text);
        }
        let before: String = input.iter().map(|u| strip_separators(&u.text)).collect();
        let after: String = out.iter().map(|u| strip_separators(&u.text)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn zero_min_length_is_passthrough() {
        let input = units(&["A.", "B."]);
        assert_eq!(merge_by_length(&input, 0), input);
        assert!(merge_by_length(&[], 5).is_empty());
    }

    #[test]
    fn single_short_unit_is_kept() {
        let input = units(&["Hi."]);
        assert_eq!(texts(&merge_by_length(&input, 50)), vec!["Hi."]);
    }

    fn unit_at(text: &str, cfi: &str, idx: usize) -> TextUnit {
        TextUnit::new(text, PositionRange::new(cfi), idx)
    }

    #[test]
    fn ends_sentence_looks_past_closing_quotes() {
        assert!(ends_sentence("He left. "));
        assert!(ends_sentence("\u{201C}Go!\u{201D}"));
        assert!(ends_sentence("(see above.)"));
        assert!(!ends_sentence("He said "));
        assert!(!ends_sentence("Chapter One"));
        assert!(!ends_sentence(""));
    }

    #[test]
    fn inline_runs_join_within_a_block() {
        let input = vec![
            unit_at("He said ", "epubcfi(/6/4!/4/2,/1:0,/1:8)", 0),
            unit_at("hello", "epubcfi(/6/4!/4/2/2,/1:0,/1:5)", 1),
            unit_at(" to me. ", "epubcfi(/6/4!/4/2,/3:0,/3:8)", 2),
            unit_at("Then he left.", "epubcfi(/6/4!/4/2,/3:8,/3:21)", 3),
        ];
        let joined = join_inline_runs(&input);
        assert_eq!(texts(&joined), vec!["He said hello to me. ", "Then he left."]);
        assert_eq!(joined[0].position.as_str(), "epubcfi(/6/4!/4/2,/1:0,/3:8)");
        assert_eq!(joined[0].source_indices, vec![0, 1, 2]);
        assert_eq!(joined[1].source_indices, vec![3]);
    }

    #[test]
    fn heading_without_terminator_stays_apart() {
        let input = vec![
            unit_at("Chapter One", "epubcfi(/6/4!/4/2,/1:0,/1:11)", 0),
            unit_at("It was dark.", "epubcfi(/6/4!/4/4,/1:0,/1:12)", 1),
        ];
        assert_eq!(texts(&join_inline_runs(&input)), vec!["Chapter One", "It was dark."]);
    }

    #[test]
    fn unparsable_positions_are_never_joined() {
        let input = vec![
            unit_at("He said ", "not a cfi", 0),
            unit_at("hello.", "not a cfi", 1),
        ];
        assert_eq!(join_inline_runs(&input).len(), 2);
    }

    #[test]
    fn refiner_rebuilds_only_when_lists_change() {
        let refiner = SentenceRefiner::new();
        let mut lists = SegmentationLists {
            abbreviations: vec!["Dr.".into()],
            always_merge: vec![],
            sentence_starters: vec!["He".into()],
            min_sentence_length: 0,
        };
        let first = refiner.tries(&lists);
        let again = refiner.tries(&lists.clone());
        assert!(Arc::ptr_eq(&first, &again));

        lists.always_merge.push("Dr.".into());
        let rebuilt = refiner.tries(&lists);
        assert!(!Arc::ptr_eq(&first, &rebuilt));

        let input = units(&["I visited the Dr.", "He was nice."]);
        assert_eq!(refiner.refine(&input, &lists).len(), 1);
    }
}
