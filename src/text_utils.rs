//! Small text measurements shared by the queue and pipeline.

/// Narration speed assumed for reading-time estimates at rate 1.0.
pub const BASE_WPM: f32 = 170.0;

pub fn word_count(text: &str) -> usize {
    text.split_whitespace()
        .filter(|word| word.chars().any(char::is_alphanumeric))
        .count()
}

/// Whole minutes needed to narrate `words` at `rate`, never less than one.
pub fn estimated_minutes(words: usize, rate: f32) -> u32 {
    let rate = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
    let minutes = words as f32 / (BASE_WPM * rate);
    minutes.ceil().max(1.0) as u32
}

/// True when the text holds at least one letter or digit.
pub fn is_speakable(text: &str) -> bool {
    text.chars().any(char::is_alphanumeric)
}

pub fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// UTF-16 offset of byte offset `byte_idx` in `text`.
pub fn utf16_offset(text: &str, byte_idx: usize) -> usize {
    utf16_len(&text[..byte_idx.min(text.len())])
}
