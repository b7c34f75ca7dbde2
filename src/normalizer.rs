//! Speech-text preparation: sanitization and pronunciation lexicon.
//!
//! Display text and spoken text diverge here. Sanitization drops citation
//! markers, URLs and markup that read badly aloud; lexicon rules then rewrite
//! words in list order. The result is what providers receive and what the
//! segment cache is keyed on.

use crate::config::{LexiconRule, NarrationConfig};
use crate::lexicon::bible_rules;
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use unicode_normalization::UnicodeNormalization;

static RE_INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());
static RE_MARKDOWN_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap());
static RE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)[^\s<>()]+[^\s<>().,;:!?]").unwrap());
static RE_NUMERIC_BRACKET_CITE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\s*\d+(?:\s*[,\u{2013}-]\s*\d+)*\s*\]").unwrap());
static RE_PARENTHETICAL_NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*\d+(?:\s*,\s*\d+)*\s*\)").unwrap());
static RE_SUPERSCRIPT_CITE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[⁰¹²³⁴⁵⁶⁷⁸⁹]+").unwrap());
static RE_HORIZONTAL_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{00A0}]+").unwrap());
static RE_LINE_BREAKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*[\r\n]+\s*").unwrap());
static RE_SPACE_BEFORE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+([,.;:!?])").unwrap());

#[derive(Debug, Clone)]
struct CompiledRule {
    pattern: Regex,
    replacement: String,
    literal: bool,
}

#[derive(Debug, Clone)]
pub struct TextNormalizer {
    sanitize: bool,
    rules: Vec<CompiledRule>,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new(true, &[])
    }
}

impl TextNormalizer {
    /// Compile lexicon rules; rules that fail to compile are skipped with a
    /// warning.
    pub fn new(sanitize: bool, lexicon: &[LexiconRule]) -> Self {
        let rules = lexicon.iter().filter_map(compile_rule).collect::<Vec<_>>();
        tracing::debug!(
            sanitize,
            rules = rules.len(),
            skipped = lexicon.len() - rules.len(),
            "Built text normalizer"
        );
        Self { sanitize, rules }
    }

    /// Normalizer for `config`. The Bible preset, when enabled, runs before
    /// the user's rules.
    pub fn from_config(config: &NarrationConfig) -> Self {
        if config.bible_lexicon {
            let mut rules = bible_rules();
            rules.extend(config.lexicon.iter().cloned());
            Self::new(config.sanitize, &rules)
        } else {
            Self::new(config.sanitize, &config.lexicon)
        }
    }

    pub fn sanitizes(&self) -> bool {
        self.sanitize
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Text to hand to a provider, or `None` when nothing speakable is left.
    pub fn prepare(&self, input: &str) -> Option<String> {
        let mut text = input.to_string();
        if self.sanitize {
            text = sanitize(&text);
        }
        for rule in &self.rules {
            text = if rule.literal {
                rule.pattern
                    .replace_all(&text, NoExpand(&rule.replacement))
                    .into_owned()
            } else {
                rule.pattern
                    .replace_all(&text, rule.replacement.as_str())
                    .into_owned()
            };
        }
        text = RE_LINE_BREAKS.replace_all(&text, " ").into_owned();
        text = RE_HORIZONTAL_WS.replace_all(&text, " ").into_owned();
        text = RE_SPACE_BEFORE_PUNCT.replace_all(&text, "$1").into_owned();

        let trimmed = text.trim();
        if !trimmed.chars().any(char::is_alphanumeric) {
            return None;
        }
        Some(trimmed.to_string())
    }
}

/// Canonical form used in cache keys: NFC, single-spaced, trimmed.
pub fn normalized_key_text(text: &str) -> String {
    let composed: String = text.nfc().collect();
    RE_HORIZONTAL_WS
        .replace_all(&RE_LINE_BREAKS.replace_all(&composed, " "), " ")
        .trim()
        .to_string()
}

fn sanitize(input: &str) -> String {
    let text = RE_MARKDOWN_LINK.replace_all(input, "$1");
    let text = RE_INLINE_CODE.replace_all(&text, "$1");
    let text = RE_URL.replace_all(&text, " ");
    let text = RE_NUMERIC_BRACKET_CITE.replace_all(&text, " ");
    let text = RE_PARENTHETICAL_NUMERIC.replace_all(&text, " ");
    RE_SUPERSCRIPT_CITE.replace_all(&text, " ").into_owned()
}

fn compile_rule(rule: &LexiconRule) -> Option<CompiledRule> {
    let original = rule.original.trim();
    if original.is_empty() {
        return None;
    }
    let pattern = if rule.is_regex {
        original.to_string()
    } else {
        literal_pattern(original)
    };
    match Regex::new(&pattern) {
        Ok(pattern) => Some(CompiledRule {
            pattern,
            replacement: rule.replacement.clone(),
            literal: !rule.is_regex,
        }),
        Err(err) => {
            tracing::warn!(original = %rule.original, "Skipping invalid lexicon rule: {err}");
            None
        }
    }
}

// Word boundaries only where the word itself starts/ends with a word char,
// so "Mr." still matches before a space.
fn literal_pattern(word: &str) -> String {
    let is_word = |ch: char| ch.is_alphanumeric() || ch == '_';
    let lead = if word.chars().next().is_some_and(is_word) {
        r"\b"
    } else {
        ""
    };
    let tail = if word.chars().next_back().is_some_and(is_word) {
        r"\b"
    } else {
        ""
    };
    format!(r"(?i){lead}{}{tail}", regex::escape(word))
}
