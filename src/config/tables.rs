use super::defaults;
use super::models::{LexiconRule, LogLevel, NarrationConfig, ProviderKind};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
pub(super) struct ConfigTables {
    #[serde(default)]
    segmentation: SegmentationConfig,
    #[serde(default)]
    speech: SpeechConfig,
    #[serde(default)]
    piper: PiperConfig,
    #[serde(default)]
    http: HttpConfig,
    #[serde(default)]
    system: SystemConfig,
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    logging: LoggingConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    lexicon: Vec<LexiconRule>,
}

impl From<ConfigTables> for NarrationConfig {
    fn from(tables: ConfigTables) -> Self {
        NarrationConfig {
            locale: tables.segmentation.locale,
            abbreviations: tables.segmentation.abbreviations,
            always_merge: tables.segmentation.always_merge,
            sentence_starters: tables.segmentation.sentence_starters,
            min_sentence_length: tables.segmentation.min_sentence_length,
            preroll: tables.speech.preroll,
            sanitize: tables.speech.sanitize,
            bible_lexicon: tables.speech.bible_lexicon,
            fallback_to_system: tables.speech.fallback_to_system,
            rate: tables.speech.rate,
            voice: tables.speech.voice,
            provider: tables.speech.provider,
            piper_model_path: tables.piper.model_path,
            piper_espeak_path: tables.piper.espeak_path,
            http_endpoint: tables.http.endpoint,
            http_model: tables.http.model,
            http_api_key_env: tables.http.api_key_env,
            http_response_format: tables.http.response_format,
            system_command: tables.system.command,
            cache_enabled: tables.cache.enabled,
            cache_dir: tables.cache.dir,
            log_level: tables.logging.log_level,
            lexicon: tables.lexicon,
        }
    }
}

impl From<&NarrationConfig> for ConfigTables {
    fn from(config: &NarrationConfig) -> Self {
        ConfigTables {
            segmentation: SegmentationConfig {
                locale: config.locale.clone(),
                abbreviations: config.abbreviations.clone(),
                always_merge: config.always_merge.clone(),
                sentence_starters: config.sentence_starters.clone(),
                min_sentence_length: config.min_sentence_length,
            },
            speech: SpeechConfig {
                preroll: config.preroll,
                sanitize: config.sanitize,
                bible_lexicon: config.bible_lexicon,
                fallback_to_system: config.fallback_to_system,
                rate: config.rate,
                voice: config.voice.clone(),
                provider: config.provider,
            },
            piper: PiperConfig {
                model_path: config.piper_model_path.clone(),
                espeak_path: config.piper_espeak_path.clone(),
            },
            http: HttpConfig {
                endpoint: config.http_endpoint.clone(),
                model: config.http_model.clone(),
                api_key_env: config.http_api_key_env.clone(),
                response_format: config.http_response_format.clone(),
            },
            system: SystemConfig {
                command: config.system_command.clone(),
            },
            cache: CacheConfig {
                enabled: config.cache_enabled,
                dir: config.cache_dir.clone(),
            },
            logging: LoggingConfig {
                log_level: config.log_level,
            },
            lexicon: config.lexicon.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct SegmentationConfig {
    #[serde(default = "defaults::default_locale")]
    locale: String,
    #[serde(default = "defaults::default_abbreviations")]
    abbreviations: Vec<String>,
    #[serde(default = "defaults::default_always_merge")]
    always_merge: Vec<String>,
    #[serde(default = "defaults::default_sentence_starters")]
    sentence_starters: Vec<String>,
    #[serde(default)]
    min_sentence_length: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        SegmentationConfig {
            locale: defaults::default_locale(),
            abbreviations: defaults::default_abbreviations(),
            always_merge: defaults::default_always_merge(),
            sentence_starters: defaults::default_sentence_starters(),
            min_sentence_length: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct SpeechConfig {
    #[serde(default)]
    preroll: bool,
    #[serde(default = "defaults::default_sanitize")]
    sanitize: bool,
    #[serde(default = "defaults::default_bible_lexicon")]
    bible_lexicon: bool,
    #[serde(default = "defaults::default_fallback_to_system")]
    fallback_to_system: bool,
    #[serde(default = "defaults::default_rate")]
    rate: f32,
    #[serde(default = "defaults::default_voice")]
    voice: String,
    #[serde(default)]
    provider: ProviderKind,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        SpeechConfig {
            preroll: false,
            sanitize: defaults::default_sanitize(),
            bible_lexicon: defaults::default_bible_lexicon(),
            fallback_to_system: defaults::default_fallback_to_system(),
            rate: defaults::default_rate(),
            voice: defaults::default_voice(),
            provider: ProviderKind::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct PiperConfig {
    #[serde(default = "defaults::default_piper_model")]
    model_path: String,
    #[serde(default = "defaults::default_piper_espeak_path")]
    espeak_path: String,
}

impl Default for PiperConfig {
    fn default() -> Self {
        PiperConfig {
            model_path: defaults::default_piper_model(),
            espeak_path: defaults::default_piper_espeak_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct HttpConfig {
    #[serde(default = "defaults::default_http_endpoint")]
    endpoint: String,
    #[serde(default = "defaults::default_http_model")]
    model: String,
    #[serde(default = "defaults::default_http_api_key_env")]
    api_key_env: String,
    #[serde(default = "defaults::default_http_response_format")]
    response_format: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            endpoint: defaults::default_http_endpoint(),
            model: defaults::default_http_model(),
            api_key_env: defaults::default_http_api_key_env(),
            response_format: defaults::default_http_response_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct SystemConfig {
    #[serde(default = "defaults::default_system_command")]
    command: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            command: defaults::default_system_command(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct CacheConfig {
    #[serde(default = "defaults::default_cache_enabled")]
    enabled: bool,
    #[serde(default = "defaults::default_cache_dir")]
    dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: defaults::default_cache_enabled(),
            dir: defaults::default_cache_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct LoggingConfig {
    #[serde(default = "defaults::default_log_level")]
    log_level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_level: defaults::default_log_level(),
        }
    }
}
