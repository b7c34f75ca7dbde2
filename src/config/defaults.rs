pub(crate) fn default_locale() -> String {
    "en".to_string()
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|word| word.to_string()).collect()
}

pub(crate) fn default_abbreviations() -> Vec<String> {
    words(&[
        "Mr.", "Mrs.", "Ms.", "Dr.", "Prof.", "Sr.", "Jr.", "St.", "Mt.", "Ave.", "Rd.", "Blvd.",
        "Ln.", "Apt.", "Bldg.", "Capt.", "Col.", "Gen.", "Lt.", "Maj.", "Sgt.", "Gov.", "Sen.",
        "Rep.", "Rev.", "Hon.", "Fr.", "Co.", "Corp.", "Inc.", "Ltd.", "Dept.", "No.", "vs.",
        "etc.", "e.g.", "i.e.", "approx.", "Jan.", "Feb.", "Mar.", "Apr.", "Jun.", "Jul.", "Aug.",
        "Sep.", "Sept.", "Oct.", "Nov.", "Dec.",
    ])
}

pub(crate) fn default_always_merge() -> Vec<String> {
    words(&[
        "Mr.", "Mrs.", "Ms.", "Dr.", "Prof.", "Capt.", "Col.", "Gen.", "Lt.", "Maj.", "Sgt.",
        "Gov.", "Sen.", "Rep.", "Rev.", "Hon.", "Fr.", "e.g.", "i.e.", "vs.",
    ])
}

pub(crate) fn default_sentence_starters() -> Vec<String> {
    words(&[
        "He", "She", "It", "They", "We", "I", "You", "The", "A", "An", "This", "That", "These",
        "Those", "There", "But", "And", "So", "Then", "However", "When", "If", "In", "On", "At",
        "After", "Before", "His", "Her", "Their", "Our", "My",
    ])
}

pub(crate) fn default_sanitize() -> bool {
    true
}

pub(crate) fn default_bible_lexicon() -> bool {
    true
}

pub(crate) fn default_fallback_to_system() -> bool {
    true
}

pub(crate) fn default_rate() -> f32 {
    1.0
}

pub(crate) fn default_voice() -> String {
    "en-us".to_string()
}

pub(crate) fn default_piper_model() -> String {
    "/usr/share/piper-voices/en/en_US/ryan/high/en_US-ryan-high.onnx".to_string()
}

pub(crate) fn default_piper_espeak_path() -> String {
    "/usr/share".to_string()
}

pub(crate) fn default_http_endpoint() -> String {
    "http://127.0.0.1:8880/v1/audio/speech".to_string()
}

pub(crate) fn default_http_model() -> String {
    "tts-1".to_string()
}

pub(crate) fn default_http_api_key_env() -> String {
    "NARRATOR_API_KEY".to_string()
}

pub(crate) fn default_http_response_format() -> String {
    "wav".to_string()
}

pub(crate) fn default_system_command() -> String {
    "espeak-ng".to_string()
}

pub(crate) fn default_cache_enabled() -> bool {
    true
}

pub(crate) fn default_cache_dir() -> String {
    ".cache/narration".to_string()
}

pub(crate) fn default_log_level() -> crate::config::LogLevel {
    crate::config::LogLevel::Info
}
