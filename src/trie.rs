//! Scanning trie over the small word lists that drive sentence refinement
//! (abbreviations, always-merge titles, sentence starters).
//!
//! A trie is built in one direction: `Prefix` stores words as written and
//! answers "does this text start with a listed word", `Suffix` stores them
//! reversed and answers "does this text end with a listed word". Both scans
//! walk borrowed `&str` data and never allocate.
//!
//! Character classification uses a static ASCII table plus fixed sets of
//! Unicode code points, so each check is constant time.

use std::collections::HashMap;

const WHITESPACE: u8 = 1 << 0;
const PUNCTUATION: u8 = 1 << 1;
const QUOTE_OR_BRACKET: u8 = 1 << 2;
const OPENING: u8 = 1 << 3;
const TERMINATOR: u8 = 1 << 4;

static ASCII_CLASSES: [u8; 128] = build_ascii_classes();

const fn build_ascii_classes() -> [u8; 128] {
    let mut table = [0u8; 128];
    table = mark(table, b" \t\n\x0B\x0C\r", WHITESPACE);
    table = mark(table, b"!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~", PUNCTUATION);
    table = mark(table, b"\"'`()[]{}<>", QUOTE_OR_BRACKET);
    table = mark(table, b"\"'`([{<", OPENING);
    table = mark(table, b".!?", TERMINATOR);
    table
}

const fn mark(mut table: [u8; 128], bytes: &[u8], flag: u8) -> [u8; 128] {
    let mut idx = 0;
    while idx < bytes.len() {
        table[bytes[idx] as usize] |= flag;
        idx += 1;
    }
    table
}

#[inline]
fn ascii_class(ch: char) -> Option<u8> {
    let code = ch as u32;
    if code < 128 {
        Some(ASCII_CLASSES[code as usize])
    } else {
        None
    }
}

#[inline]
pub fn is_whitespace(ch: char) -> bool {
    match ascii_class(ch) {
        Some(class) => class & WHITESPACE != 0,
        None => matches!(
            ch,
            '\u{0085}'
                | '\u{00A0}'
                | '\u{1680}'
                | '\u{2000}'..='\u{200B}'
                | '\u{2028}'
                | '\u{2029}'
                | '\u{202F}'
                | '\u{205F}'
                | '\u{3000}'
                | '\u{FEFF}'
        ),
    }
}

#[inline]
pub fn is_punctuation(ch: char) -> bool {
    match ascii_class(ch) {
        Some(class) => class & PUNCTUATION != 0,
        None => matches!(
            ch,
            '\u{00A1}'
                | '\u{00A7}'
                | '\u{00AB}'
                | '\u{00B6}'
                | '\u{00B7}'
                | '\u{00BB}'
                | '\u{00BF}'
                | '\u{2010}'..='\u{2027}'
                | '\u{2030}'..='\u{205E}'
                | '\u{3001}'..='\u{3003}'
                | '\u{3008}'..='\u{3011}'
                | '\u{3014}'..='\u{301F}'
                | '\u{FF01}'..='\u{FF0F}'
                | '\u{FF1A}'..='\u{FF20}'
                | '\u{FF3B}'..='\u{FF40}'
                | '\u{FF5B}'..='\u{FF65}'
        ),
    }
}

#[inline]
pub fn is_quote_or_bracket(ch: char) -> bool {
    match ascii_class(ch) {
        Some(class) => class & QUOTE_OR_BRACKET != 0,
        None => matches!(
            ch,
            '\u{00AB}'
                | '\u{00BB}'
                | '\u{2018}'..='\u{201F}'
                | '\u{2039}'
                | '\u{203A}'
                | '\u{3008}'..='\u{3011}'
                | '\u{3014}'..='\u{301B}'
                | '\u{FF08}'
                | '\u{FF09}'
                | '\u{FF3B}'
                | '\u{FF3D}'
                | '\u{FF5B}'
                | '\u{FF5D}'
        ),
    }
}

#[inline]
pub fn is_opening_punctuation(ch: char) -> bool {
    match ascii_class(ch) {
        Some(class) => class & OPENING != 0,
        None => matches!(
            ch,
            '\u{00A1}'
                | '\u{00AB}'
                | '\u{00BF}'
                | '\u{2018}'
                | '\u{201A}'
                | '\u{201B}'
                | '\u{201C}'
                | '\u{201E}'
                | '\u{201F}'
                | '\u{2039}'
                | '\u{3008}'
                | '\u{300A}'
                | '\u{300C}'
                | '\u{300E}'
                | '\u{3010}'
                | '\u{FF08}'
                | '\u{FF3B}'
                | '\u{FF5B}'
        ),
    }
}

/// Characters that end a sentence (`.`, `!`, `?` and their common
/// full-width and ellipsis forms).
#[inline]
pub fn is_sentence_terminator(ch: char) -> bool {
    match ascii_class(ch) {
        Some(class) => class & TERMINATOR != 0,
        None => matches!(
            ch,
            '\u{2026}' | '\u{203C}' | '\u{2047}'..='\u{2049}' | '\u{3002}' | '\u{FF01}' | '\u{FF1F}'
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    Prefix,
    Suffix,
}

#[derive(Debug, Clone, Default)]
struct TrieNode {
    children: HashMap<char, usize>,
    terminal: bool,
}

#[derive(Debug, Clone)]
pub struct ScanningTrie {
    direction: ScanDirection,
    nodes: Vec<TrieNode>,
    words: usize,
}

impl ScanningTrie {
    pub fn new(direction: ScanDirection) -> Self {
        Self {
            direction,
            nodes: vec![TrieNode::default()],
            words: 0,
        }
    }

    pub fn from_words<I, S>(words: I, direction: ScanDirection) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut trie = Self::new(direction);
        for word in words {
            trie.insert(word.as_ref());
        }
        trie
    }

    pub fn direction(&self) -> ScanDirection {
        self.direction
    }

    pub fn len(&self) -> usize {
        self.words
    }

    pub fn is_empty(&self) -> bool {
        self.words == 0
    }

    /// Insert a word; surrounding whitespace is ignored and blank words are
    /// skipped.
    pub fn insert(&mut self, word: &str) {
        let word = word.trim_matches(is_whitespace);
        if word.is_empty() {
            return;
        }
        let mut node = 0;
        match self.direction {
            ScanDirection::Prefix => {
                for ch in word.chars() {
                    node = self.child_or_insert(node, ch);
                }
            }
            ScanDirection::Suffix => {
                for ch in word.chars().rev() {
                    node = self.child_or_insert(node, ch);
                }
            }
        }
        if !self.nodes[node].terminal {
            self.nodes[node].terminal = true;
            self.words += 1;
        }
    }

    fn child_or_insert(&mut self, node: usize, ch: char) -> usize {
        if let Some(&next) = self.nodes[node].children.get(&ch) {
            return next;
        }
        let next = self.nodes.len();
        self.nodes.push(TrieNode::default());
        self.nodes[node].children.insert(ch, next);
        next
    }

    fn step(&self, node: usize, ch: char) -> Option<usize> {
        self.nodes[node].children.get(&ch).copied()
    }

    /// Exact membership test.
    pub fn contains(&self, word: &str) -> bool {
        if word.is_empty() {
            return false;
        }
        let mut node = 0;
        let walked = match self.direction {
            ScanDirection::Prefix => word.chars().try_for_each(|ch| {
                node = self.step(node, ch)?;
                Some(())
            }),
            ScanDirection::Suffix => word.chars().rev().try_for_each(|ch| {
                node = self.step(node, ch)?;
                Some(())
            }),
        };
        walked.is_some() && self.nodes[node].terminal
    }

    /// True when `text`, ignoring trailing whitespace, ends with a listed
    /// word that starts on a word boundary. Only meaningful for `Suffix`
    /// tries; a `Prefix` trie always answers false.
    pub fn has_match_end(&self, text: &str) -> bool {
        if self.direction != ScanDirection::Suffix || self.is_empty() {
            return false;
        }
        let trimmed = text.trim_end_matches(is_whitespace);
        let mut node = 0;
        for (idx, ch) in trimmed.char_indices().rev() {
            let Some(next) = self.step(node, ch) else {
                return false;
            };
            node = next;
            if self.nodes[node].terminal && starts_word(trimmed, idx) {
                return true;
            }
        }
        false
    }

    /// True when the first token of `text` (after leading quotes and
    /// brackets) is a listed word. A token carrying trailing punctuation
    /// (`He,`) is retried without it.
    pub fn matches_start(&self, text: &str) -> bool {
        if self.is_empty() {
            return false;
        }
        let body = text.trim_start_matches(|ch: char| is_whitespace(ch) || is_quote_or_bracket(ch));
        let end = body.find(is_whitespace).unwrap_or(body.len());
        let token = &body[..end];
        if token.is_empty() {
            return false;
        }
        if self.contains(token) {
            return true;
        }
        let bare = token.trim_end_matches(is_punctuation);
        !bare.is_empty() && bare.len() != token.len() && self.contains(bare)
    }
}

fn starts_word(text: &str, idx: usize) -> bool {
    match text[..idx].chars().next_back() {
        None => true,
        Some(prev) => is_whitespace(prev) || (is_punctuation(prev) && prev != '.'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suffix(words: &[&str]) -> ScanningTrie {
        ScanningTrie::from_words(words.iter().copied(), ScanDirection::Suffix)
    }

    fn prefix(words: &[&str]) -> ScanningTrie {
        ScanningTrie::from_words(words.iter().copied(), ScanDirection::Prefix)
    }

    #[test]
    fn classifies_ascii_and_unicode_characters() {
        assert!(is_whitespace(' '));
        assert!(is_whitespace('\u{00A0}'));
        assert!(is_whitespace('\u{3000}'));
        assert!(!is_whitespace('a'));
        assert!(is_punctuation('.'));
        assert!(is_punctuation('\u{201C}'));
        assert!(is_punctuation('\u{2014}'));
        assert!(!is_punctuation('x'));
        assert!(is_opening_punctuation('('));
        assert!(is_opening_punctuation('\u{201C}'));
        assert!(!is_opening_punctuation(')'));
        assert!(is_sentence_terminator('?'));
        assert!(is_sentence_terminator('\u{2026}'));
        assert!(!is_sentence_terminator(','));
    }

    #[test]
    fn suffix_trie_matches_trailing_abbreviation() {
        let trie = suffix(&["Mr.", "Dr.", "St."]);
        assert!(trie.has_match_end("I visited the Dr."));
        assert!(trie.has_match_end("Mr.   "));
        assert!(trie.has_match_end("(Mr."));
        assert!(!trie.has_match_end("He went home."));
        assert!(!trie.has_match_end("Hmr."));
    }

    #[test]
    fn dotted_abbreviations_do_not_match_inside_longer_ones() {
        let trie = suffix(&["D."]);
        assert!(trie.has_match_end("signed by D."));
        assert!(!trie.has_match_end("earned a Ph.D."));
    }

    #[test]
    fn degenerate_inputs_never_match() {
        let trie = suffix(&["Mr."]);
        for text in ["", "   \t\n", "...!?", "\u{3000}"] {
            assert!(!trie.has_match_end(text), "{text:?}");
        }
        let starters = prefix(&["He"]);
        for text in ["", "   ", "\"'([", "...!?"] {
            assert!(!starters.matches_start(text), "{text:?}");
        }
    }

    #[test]
    fn matches_start_uses_exact_first_token() {
        let starters = prefix(&["He", "The"]);
        assert!(starters.matches_start("He was nice."));
        assert!(starters.matches_start("  \u{201C}He said so."));
        assert!(starters.matches_start("He, too, agreed."));
        assert!(!starters.matches_start("Hello there."));
        assert!(!starters.matches_start("Then it rained."));
        assert!(!starters.matches_start("she left."));
    }

    #[test]
    fn prefix_trie_never_reports_suffix_matches() {
        let trie = prefix(&["Mr."]);
        assert!(!trie.has_match_end("Mr."));
        assert!(trie.contains("Mr."));
        assert!(!trie.contains("Mr"));
    }

    #[test]
    fn duplicate_and_blank_words_are_counted_once() {
        let trie = suffix(&["Mr.", " Mr. ", "", "  "]);
        assert_eq!(trie.len(), 1);
        assert!(suffix(&[]).is_empty());
    }
}
