use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Flattened narration settings. Read from the TOML tables in `tables.rs`.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrationConfig {
    pub locale: String,
    pub abbreviations: Vec<String>,
    pub always_merge: Vec<String>,
    pub sentence_starters: Vec<String>,
    pub min_sentence_length: usize,
    pub preroll: bool,
    pub sanitize: bool,
    pub bible_lexicon: bool,
    pub fallback_to_system: bool,
    pub rate: f32,
    pub voice: String,
    pub provider: ProviderKind,
    pub piper_model_path: String,
    pub piper_espeak_path: String,
    pub http_endpoint: String,
    pub http_model: String,
    pub http_api_key_env: String,
    pub http_response_format: String,
    pub system_command: String,
    pub cache_enabled: bool,
    pub cache_dir: String,
    pub log_level: LogLevel,
    pub lexicon: Vec<LexiconRule>,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        use crate::config::defaults::*;
        NarrationConfig {
            locale: default_locale(),
            abbreviations: default_abbreviations(),
            always_merge: default_always_merge(),
            sentence_starters: default_sentence_starters(),
            min_sentence_length: 0,
            preroll: false,
            sanitize: default_sanitize(),
            bible_lexicon: default_bible_lexicon(),
            fallback_to_system: default_fallback_to_system(),
            rate: default_rate(),
            voice: default_voice(),
            provider: ProviderKind::default(),
            piper_model_path: default_piper_model(),
            piper_espeak_path: default_piper_espeak_path(),
            http_endpoint: default_http_endpoint(),
            http_model: default_http_model(),
            http_api_key_env: default_http_api_key_env(),
            http_response_format: default_http_response_format(),
            system_command: default_system_command(),
            cache_enabled: default_cache_enabled(),
            cache_dir: default_cache_dir(),
            log_level: default_log_level(),
            lexicon: Vec::new(),
        }
    }
}

impl NarrationConfig {
    /// Refinement lists. With the Bible lexicon on, book abbreviations such
    /// as `Matt.` are treated as abbreviations too.
    pub fn segmentation_lists(&self) -> SegmentationLists {
        let mut abbreviations = self.abbreviations.clone();
        if self.bible_lexicon {
            for word in crate::lexicon::bible_abbreviations() {
                if !abbreviations.contains(&word) {
                    abbreviations.push(word);
                }
            }
        }
        SegmentationLists {
            abbreviations,
            always_merge: self.always_merge.clone(),
            sentence_starters: self.sentence_starters.clone(),
            min_sentence_length: self.min_sentence_length,
        }
    }
}

/// Which synthesis backend narrates the queue.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// On-device speech through an external command; returns no asset.
    #[default]
    System,
    /// Local Piper voice model.
    Piper,
    /// OpenAI-compatible `/v1/audio/speech` endpoint.
    Http,
}

impl ProviderKind {
    pub fn id(self) -> &'static str {
        match self {
            ProviderKind::System => "system",
            ProviderKind::Piper => "piper",
            ProviderKind::Http => "http",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// One pronunciation rule. Rules apply in list order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LexiconRule {
    pub original: String,
    pub replacement: String,
    #[serde(default)]
    pub is_regex: bool,
}

/// Word lists that drive sentence refinement, plus the optional minimum
/// sentence length.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct SegmentationLists {
    pub abbreviations: Vec<String>,
    pub always_merge: Vec<String>,
    pub sentence_starters: Vec<String>,
    pub min_sentence_length: usize,
}

impl SegmentationLists {
    /// Content hash of the three word lists. Derived tries are rebuilt only
    /// when this changes.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for list in [
            &self.abbreviations,
            &self.always_merge,
            &self.sentence_starters,
        ] {
            hasher.update((list.len() as u64).to_le_bytes());
            for word in list {
                hasher.update(word.as_bytes());
                hasher.update([0u8]);
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
