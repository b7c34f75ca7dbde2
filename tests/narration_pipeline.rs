use anyhow::Result;
use reader_narrator::cache::FileSegmentCache;
use reader_narrator::cancellation::CancellationToken;
use reader_narrator::config::parse_config;
use reader_narrator::normalizer::TextNormalizer;
use reader_narrator::output::NullOutput;
use reader_narrator::pipeline::{NarrationPipeline, SectionInput};
use reader_narrator::playback::{
    ControllerDeps, PlaybackController, PlaybackEvent, PlaybackStatus,
};
use reader_narrator::provider::{
    AudioAsset, SynthesisOutput, SynthesisProvider, VoiceSettings, encode_wav,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const CONFIG: &str = r#"
[segmentation]
abbreviations = ["Mr.", "St."]
always_merge = ["Mr."]
sentence_starters = ["He", "The"]

[speech]
preroll = true
rate = 1.0

[[lexicon]]
original = "St."
replacement = "Street"
"#;

const SECTION: &str = r#"{
  "title": "Chapter One",
  "nodes": [
    { "text": "It was late when Mr.", "cfi": "epubcfi(/6/4!/4/2/1:0)" },
    { "text": "Smith reached Baker St. in the rain [3].", "cfi": "epubcfi(/6/4!/4/4/1:0)" },
    { "text": "He waited.", "cfi": "epubcfi(/6/4!/4/6/1:0)" }
  ]
}"#;

#[derive(Default)]
struct ToneProvider {
    calls: AtomicUsize,
    spoken: Mutex<Vec<String>>,
}

impl SynthesisProvider for ToneProvider {
    fn id(&self) -> &str {
        "tone"
    }

    fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceSettings,
        cancel: &CancellationToken,
    ) -> Result<SynthesisOutput> {
        cancel.check_cancelled("tone:synthesize")?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.spoken
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());
        let samples = vec![0.25f32; 64];
        Ok(SynthesisOutput::asset(AudioAsset::wav(encode_wav(
            &samples, 16_000, 1,
        )?)))
    }
}

fn temp_cache_dir() -> PathBuf {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("reader-narrator-it-{nonce}"))
}

fn run_to_completion(controller: &PlaybackController, events: &Receiver<PlaybackEvent>) -> Vec<usize> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut spoken = Vec::new();
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match events.recv_timeout(left) {
            Ok(PlaybackEvent::NowSpeaking { index, .. }) => spoken.push(index),
            Ok(PlaybackEvent::StatusChanged {
                status: PlaybackStatus::Completed,
                ..
            }) => break,
            Ok(PlaybackEvent::Error { message, .. }) => panic!("narration failed: {message}"),
            Ok(_) => {}
            Err(_) => break,
        }
    }
    assert_eq!(controller.status(), PlaybackStatus::Completed);
    spoken
}

#[test]
fn section_is_refined_narrated_and_cached() {
    let config = parse_config(CONFIG).expect("config");
    let pipeline = NarrationPipeline::from_config(&config);
    let input: SectionInput = serde_json::from_str(SECTION).expect("section json");

    let queue = pipeline.prepare_section(&input);
    let texts: Vec<&str> = queue.iter().map(|item| item.text()).collect();
    assert!(queue[0].is_preroll);
    assert_eq!(
        texts[1..],
        [
            "It was late when Mr. Smith reached Baker St. in the rain [3].",
            "He waited.",
        ]
    );
    assert_eq!(queue[1].title.as_deref(), Some("Chapter One"));

    let cache_dir = temp_cache_dir();
    let provider = Arc::new(ToneProvider::default());
    let deps = ControllerDeps {
        provider: provider.clone(),
        cache: Arc::new(FileSegmentCache::new(&cache_dir)),
        output: Arc::new(NullOutput),
    };
    let voice = VoiceSettings::from_config(&config);

    let first = PlaybackController::new(deps.clone(), voice.clone(), TextNormalizer::from_config(&config));
    let events = first.subscribe();
    first.set_queue(queue.clone());
    first.play();
    assert_eq!(run_to_completion(&first, &events), vec![0, 1, 2]);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);

    let spoken = provider
        .spoken
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    assert_eq!(
        spoken[1],
        "It was late when Mr. Smith reached Baker Street in the rain."
    );

    // Cache writes are detached; wait for all three sidecars.
    let deadline = Instant::now() + Duration::from_secs(5);
    let sidecars = || {
        std::fs::read_dir(&cache_dir)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|entry| entry.file_name().to_string_lossy().ends_with(".json"))
                    .count()
            })
            .unwrap_or(0)
    };
    while sidecars() < 3 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(sidecars(), 3);

    let second = PlaybackController::new(deps, voice, TextNormalizer::from_config(&config));
    let events = second.subscribe();
    second.set_queue(queue);
    second.play();
    assert_eq!(run_to_completion(&second, &events), vec![0, 1, 2]);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);

    let _ = std::fs::remove_dir_all(&cache_dir);
}
