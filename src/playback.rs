//! Playback queue controller.
//!
//! One controller owns one narration session: the queue, the current index,
//! the status and a generation counter. Every operation bumps the
//! generation and cancels whatever synthesis was in flight, then (when it
//! starts playback) spawns a worker tied to the new generation. Workers
//! re-check their generation after each blocking step and drop their result
//! silently once superseded, so only the latest request is ever observed.
//!
//! Lock order is `output_lock` then `session`; `session` is never held while
//! calling into the provider, the cache or the output.

use crate::cache::{CacheKey, CachedSegment, SegmentCache, build_cache};
use crate::cancellation::{CancellationToken, is_cancellation};
use crate::config::NarrationConfig;
use crate::normalizer::TextNormalizer;
use crate::output::{AudioOutput, OutputHandoff};
use crate::provider::{
    AlignmentMark, SynthesisOutput, SynthesisProvider, VoiceSettings, build_provider,
};
use crate::queue::QueueItem;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Stopped,
    Completed,
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PlaybackStatus::Idle => "idle",
            PlaybackStatus::Loading => "loading",
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Stopped => "stopped",
            PlaybackStatus::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// Notifications for the UI collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    StatusChanged {
        status: PlaybackStatus,
        index: usize,
        generation: u64,
    },
    NowSpeaking {
        index: usize,
        generation: u64,
        item: QueueItem,
        alignment: Option<Vec<AlignmentMark>>,
    },
    Error {
        index: usize,
        generation: u64,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub status: PlaybackStatus,
    pub current_index: usize,
    pub generation: u64,
    pub queue_len: usize,
}

/// Collaborators injected into a controller.
#[derive(Clone)]
pub struct ControllerDeps {
    pub provider: Arc<dyn SynthesisProvider>,
    pub cache: Arc<dyn SegmentCache>,
    pub output: Arc<dyn AudioOutput>,
}

impl ControllerDeps {
    pub fn from_config(config: &NarrationConfig, output: Arc<dyn AudioOutput>) -> Result<Self> {
        Ok(Self {
            provider: build_provider(config)?,
            cache: build_cache(config),
            output,
        })
    }
}

struct Session {
    queue: Arc<[QueueItem]>,
    current_index: usize,
    status: PlaybackStatus,
    generation: u64,
    in_flight: Option<CancellationToken>,
}

impl Session {
    /// Supersede everything issued so far.
    fn bump(&mut self) -> u64 {
        self.generation += 1;
        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
        self.generation
    }
}

#[derive(Clone)]
struct SpeechSettings {
    voice: VoiceSettings,
    normalizer: TextNormalizer,
}

struct Shared {
    session: Mutex<Session>,
    settings: Mutex<SpeechSettings>,
    deps: ControllerDeps,
    subscribers: Mutex<Vec<Sender<PlaybackEvent>>>,
    output_lock: Mutex<()>,
}

/// Work order for one synthesis worker.
struct Job {
    generation: u64,
    index: usize,
    item: QueueItem,
    token: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle given to the output with each item; reports how playback of that
/// item ended. Notifiers from superseded generations are ignored.
#[derive(Clone)]
pub struct CompletionNotifier {
    generation: u64,
    index: usize,
    shared: Weak<Shared>,
}

impl fmt::Debug for CompletionNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionNotifier")
            .field("generation", &self.generation)
            .field("index", &self.index)
            .finish()
    }
}

impl CompletionNotifier {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The item played through; advance to the next playable item.
    pub fn finished(&self) {
        if let Some(shared) = self.shared.upgrade() {
            Shared::advance(&shared, self.generation, self.index);
        }
    }

    /// The output could not render the item.
    pub fn failed(&self, message: &str) {
        if let Some(shared) = self.shared.upgrade() {
            shared.fail(self.generation, self.index, message.to_string());
        }
    }
}

/// Cloneable handle to one narration session.
#[derive(Clone)]
pub struct PlaybackController {
    shared: Arc<Shared>,
}

impl fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackController")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl PlaybackController {
    pub fn new(deps: ControllerDeps, voice: VoiceSettings, normalizer: TextNormalizer) -> Self {
        let empty: Arc<[QueueItem]> = Arc::from(Vec::new());
        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(Session {
                    queue: empty,
                    current_index: 0,
                    status: PlaybackStatus::Idle,
                    generation: 0,
                    in_flight: None,
                }),
                settings: Mutex::new(SpeechSettings { voice, normalizer }),
                deps,
                subscribers: Mutex::new(Vec::new()),
                output_lock: Mutex::new(()),
            }),
        }
    }

    pub fn from_config(config: &NarrationConfig, output: Arc<dyn AudioOutput>) -> Result<Self> {
        let deps = ControllerDeps::from_config(config, output)?;
        Ok(Self::new(
            deps,
            VoiceSettings::from_config(config),
            TextNormalizer::from_config(config),
        ))
    }

    pub fn subscribe(&self) -> Receiver<PlaybackEvent> {
        let (tx, rx) = mpsc::channel();
        lock(&self.shared.subscribers).push(tx);
        rx
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let session = lock(&self.shared.session);
        PlaybackSnapshot {
            status: session.status,
            current_index: session.current_index,
            generation: session.generation,
            queue_len: session.queue.len(),
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        lock(&self.shared.session).status
    }

    pub fn queue(&self) -> Arc<[QueueItem]> {
        Arc::clone(&lock(&self.shared.session).queue)
    }

    pub fn current_item(&self) -> Option<QueueItem> {
        let session = lock(&self.shared.session);
        session.queue.get(session.current_index).cloned()
    }

    pub fn set_voice(&self, voice: VoiceSettings) {
        info!(provider = %voice.provider_id, voice = %voice.voice_id, rate = voice.rate, "Voice changed");
        lock(&self.shared.settings).voice = voice;
    }

    pub fn set_normalizer(&self, normalizer: TextNormalizer) {
        lock(&self.shared.settings).normalizer = normalizer;
    }

    /// Replace the queue wholesale and return to `idle` at index 0.
    pub fn set_queue(&self, items: Vec<QueueItem>) {
        self.transition(
            |shared, session| {
                session.bump();
                session.queue = Arc::from(items);
                session.current_index = 0;
                shared.set_status(session, PlaybackStatus::Idle);
                info!(items = session.queue.len(), generation = session.generation, "Queue replaced");
            },
            |_, output| output.stop(),
        );
    }

    /// Start (or restart) synthesis of the current item. No-op while
    /// already playing or when the queue is empty.
    pub fn play(&self) {
        let job = self.transition(
            |shared, session| {
                if session.status == PlaybackStatus::Playing || session.queue.is_empty() {
                    return None;
                }
                Some(shared.start_current(session))
            },
            |started, output| {
                if started.is_some() {
                    output.stop();
                }
            },
        );
        self.launch(job.flatten());
    }

    pub fn resume(&self) {
        self.play();
    }

    pub fn pause(&self) {
        self.transition(
            |shared, session| {
                session.bump();
                if matches!(
                    session.status,
                    PlaybackStatus::Loading | PlaybackStatus::Playing
                ) {
                    shared.set_status(session, PlaybackStatus::Paused);
                }
            },
            |_, output| output.pause(),
        );
    }

    pub fn stop(&self) {
        self.transition(
            |shared, session| {
                session.bump();
                shared.set_status(session, PlaybackStatus::Stopped);
            },
            |_, output| output.stop(),
        );
    }

    /// Move to the next playable item. Returns `false` at the end of the
    /// queue.
    pub fn next(&self) -> bool {
        self.move_to(|session| next_playable(&session.queue, session.current_index + 1))
    }

    /// Move to the previous playable item. Returns `false` at the start.
    pub fn prev(&self) -> bool {
        self.move_to(|session| prev_playable(&session.queue, session.current_index))
    }

    /// Jump to `index`. Out-of-range indices are ignored.
    pub fn jump_to(&self, index: usize) -> bool {
        self.move_to(|session| (index < session.queue.len()).then_some(index))
    }

    fn move_to(&self, target: impl FnOnce(&Session) -> Option<usize>) -> bool {
        let moved = self.transition(
            |shared, session| {
                let Some(index) = target(&*session) else {
                    debug!(index = session.current_index, "Navigation at queue boundary");
                    return None;
                };
                session.current_index = index;
                Some(shared.start_current(session))
            },
            |moved, output| {
                if moved.is_some() {
                    output.stop();
                }
            },
        );
        let Some(job) = moved else {
            return false;
        };
        self.launch(job);
        true
    }

    /// Apply `update` to the session, then issue `command` to the output
    /// before `output_lock` is released. Output commands therefore land in
    /// the same order as the generations they belong to, and a worker can
    /// only start output for a generation after its command has run.
    fn transition<T>(
        &self,
        update: impl FnOnce(&Shared, &mut Session) -> T,
        command: impl FnOnce(&T, &dyn AudioOutput),
    ) -> T {
        let _output_guard = lock(&self.shared.output_lock);
        let result = {
            let mut session = lock(&self.shared.session);
            update(&self.shared, &mut session)
        };
        command(&result, self.shared.deps.output.as_ref());
        result
    }

    fn launch(&self, job: Option<Job>) {
        if let Some(job) = job {
            Shared::spawn(&self.shared, job);
        }
    }
}

impl Shared {
    fn emit(&self, event: PlaybackEvent) {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn set_status(&self, session: &mut Session, status: PlaybackStatus) {
        if session.status == status {
            return;
        }
        debug!(from = %session.status, to = %status, generation = session.generation, "Playback status");
        session.status = status;
        self.emit(PlaybackEvent::StatusChanged {
            status,
            index: session.current_index,
            generation: session.generation,
        });
    }

    fn is_current(&self, generation: u64) -> bool {
        lock(&self.session).generation == generation
    }

    /// Bump the generation and prepare a job for the first playable item at
    /// or after the current index. Completes the session when none is left.
    fn start_current(&self, session: &mut Session) -> Option<Job> {
        let generation = session.bump();
        let Some(index) = next_playable(&session.queue, session.current_index) else {
            self.set_status(session, PlaybackStatus::Completed);
            return None;
        };
        session.current_index = index;
        let token = CancellationToken::new();
        session.in_flight = Some(token.clone());
        self.set_status(session, PlaybackStatus::Loading);
        Some(Job {
            generation,
            index,
            item: session.queue[index].clone(),
            token,
        })
    }

    fn spawn(shared: &Arc<Self>, job: Job) {
        let generation = job.generation;
        let index = job.index;
        let worker = Arc::clone(shared);
        let spawned = thread::Builder::new()
            .name(format!("narration-{generation}"))
            .spawn(move || worker.run(job));
        if let Err(err) = spawned {
            shared.fail(generation, index, format!("failed to start synthesis worker: {err}"));
        }
    }

    fn advance(shared: &Arc<Self>, generation: u64, index: usize) {
        let job = {
            let mut session = lock(&shared.session);
            if session.generation != generation || session.current_index != index {
                debug!(generation, index, "Ignoring stale completion");
                return;
            }
            match next_playable(&session.queue, index + 1) {
                Some(next) => {
                    session.current_index = next;
                    shared.start_current(&mut session)
                }
                None => {
                    session.bump();
                    shared.set_status(&mut session, PlaybackStatus::Completed);
                    info!(items = session.queue.len(), "Queue completed");
                    None
                }
            }
        };
        if let Some(job) = job {
            Self::spawn(shared, job);
        }
    }

    fn fail(&self, generation: u64, index: usize, message: String) {
        let mut session = lock(&self.session);
        if session.generation != generation {
            debug!(generation, "Dropping error from superseded request: {message}");
            return;
        }
        warn!(index, generation, "Playback error: {message}");
        session.in_flight = None;
        self.emit(PlaybackEvent::Error {
            index,
            generation,
            message,
        });
        self.set_status(&mut session, PlaybackStatus::Paused);
    }

    fn run(self: Arc<Self>, job: Job) {
        let settings = lock(&self.settings).clone();
        let Some(text) = settings.normalizer.prepare(job.item.text()) else {
            debug!(index = job.index, "Nothing to speak; skipping item");
            Self::advance(&self, job.generation, job.index);
            return;
        };
        let key = CacheKey::new(&text, &settings.voice);

        let cached = match self.deps.cache.get(&key) {
            Ok(cached) => cached,
            Err(err) => {
                warn!("Segment cache lookup failed: {err:#}");
                None
            }
        };
        if job.token.is_cancelled() || !self.is_current(job.generation) {
            debug!(generation = job.generation, "Superseded after cache lookup");
            return;
        }

        let output = match cached {
            Some(segment) => SynthesisOutput {
                audio: Some(segment.audio),
                is_native: false,
                alignment: segment.alignment,
            },
            None => match self
                .deps
                .provider
                .synthesize(&text, &settings.voice, &job.token)
            {
                Ok(output) => {
                    self.store(key, &output);
                    output
                }
                Err(err) if is_cancellation(&err) => {
                    debug!(generation = job.generation, "Synthesis cancelled: {err}");
                    return;
                }
                Err(err) => {
                    self.fail(job.generation, job.index, format!("{err:#}"));
                    return;
                }
            },
        };

        let _output_guard = lock(&self.output_lock);
        {
            let mut session = lock(&self.session);
            if session.generation != job.generation {
                debug!(generation = job.generation, "Superseded after synthesis");
                return;
            }
            self.set_status(&mut session, PlaybackStatus::Playing);
            self.emit(PlaybackEvent::NowSpeaking {
                index: job.index,
                generation: job.generation,
                item: job.item.clone(),
                alignment: output.alignment.clone(),
            });
        }

        let notifier = CompletionNotifier {
            generation: job.generation,
            index: job.index,
            shared: Arc::downgrade(&self),
        };
        let handoff = OutputHandoff {
            index: job.index,
            generation: job.generation,
            item: job.item,
            output,
        };
        if let Err(err) = self.deps.output.start(handoff, notifier) {
            self.fail(job.generation, job.index, format!("{err:#}"));
        }
    }

    /// Fire-and-forget cache write; playback never waits on it.
    fn store(&self, key: CacheKey, output: &SynthesisOutput) {
        let Some(audio) = output.audio.clone() else {
            return;
        };
        let cache = Arc::clone(&self.deps.cache);
        let segment = CachedSegment {
            audio,
            alignment: output.alignment.clone(),
        };
        let spawned = thread::Builder::new()
            .name("cache-write".to_string())
            .spawn(move || {
                if let Err(err) = cache.put(&key, &segment) {
                    warn!("Failed to store synthesized segment: {err:#}");
                }
            });
        if let Err(err) = spawned {
            warn!("Failed to start cache write: {err}");
        }
    }
}

fn next_playable(queue: &[QueueItem], from: usize) -> Option<usize> {
    (from..queue.len()).find(|&idx| !queue[idx].is_skipped)
}

fn prev_playable(queue: &[QueueItem], before: usize) -> Option<usize> {
    (0..before.min(queue.len()))
        .rev()
        .find(|&idx| !queue[idx].is_skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemorySegmentCache;
    use crate::output::NullOutput;
    use crate::position::PositionRange;
    use crate::provider::AudioAsset;
    use crate::segmenter::TextUnit;
    use anyhow::bail;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    const WAIT: Duration = Duration::from_secs(5);

    /// Provider with fixed latency. Honors cancellation unless told not to.
    struct SlowProvider {
        latency: Duration,
        honor_cancel: bool,
        fail: bool,
        started: AtomicUsize,
        completed: AtomicUsize,
        texts: Mutex<Vec<String>>,
    }

    impl SlowProvider {
        fn new(latency: Duration) -> Self {
            Self {
                latency,
                honor_cancel: true,
                fail: false,
                started: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
                texts: Mutex::new(Vec::new()),
            }
        }
    }

    impl SynthesisProvider for SlowProvider {
        fn id(&self) -> &str {
            "test"
        }

        fn synthesize(
            &self,
            text: &str,
            _voice: &VoiceSettings,
            cancel: &CancellationToken,
        ) -> Result<SynthesisOutput> {
            self.started.fetch_add(1, Ordering::SeqCst);
            if self.honor_cancel {
                cancel.wait_for(self.latency, Duration::from_millis(2));
                cancel.check_cancelled("test:synthesize")?;
            } else {
                thread::sleep(self.latency);
            }
            if self.fail {
                bail!("voice unavailable");
            }
            self.completed.fetch_add(1, Ordering::SeqCst);
            lock(&self.texts).push(text.to_string());
            Ok(SynthesisOutput::asset(AudioAsset::wav(text.as_bytes().to_vec())))
        }
    }

    /// Output that records starts and keeps notifiers for the test to fire.
    #[derive(Default)]
    struct RecordingOutput {
        started: Mutex<Vec<(usize, u64)>>,
        notifiers: Mutex<Vec<CompletionNotifier>>,
        stops: AtomicUsize,
    }

    impl AudioOutput for RecordingOutput {
        fn start(&self, handoff: OutputHandoff, done: CompletionNotifier) -> Result<()> {
            lock(&self.started).push((handoff.index, handoff.generation));
            lock(&self.notifiers).push(done);
            Ok(())
        }

        fn pause(&self) {}

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Output that logs every call in order.
    #[derive(Default)]
    struct OpLog {
        ops: Mutex<Vec<&'static str>>,
    }

    impl AudioOutput for OpLog {
        fn start(&self, _handoff: OutputHandoff, _done: CompletionNotifier) -> Result<()> {
            lock(&self.ops).push("start");
            Ok(())
        }

        fn pause(&self) {
            lock(&self.ops).push("pause");
        }

        fn stop(&self) {
            lock(&self.ops).push("stop");
        }
    }

    fn item(text: &str, idx: usize) -> QueueItem {
        QueueItem::from_unit(TextUnit::new(
            text,
            PositionRange::new(format!("epubcfi(/6/4!/4/{}/1,:0,:{})", idx * 2 + 2, text.len())),
            idx,
        ))
    }

    fn items(texts: &[&str]) -> Vec<QueueItem> {
        texts.iter().enumerate().map(|(i, t)| item(t, i)).collect()
    }

    fn controller(
        provider: Arc<SlowProvider>,
        cache: Arc<dyn SegmentCache>,
        output: Arc<dyn AudioOutput>,
    ) -> PlaybackController {
        PlaybackController::new(
            ControllerDeps {
                provider,
                cache,
                output,
            },
            VoiceSettings::default(),
            TextNormalizer::default(),
        )
    }

    fn wait_for_status(rx: &Receiver<PlaybackEvent>, wanted: PlaybackStatus) -> Vec<PlaybackEvent> {
        let deadline = Instant::now() + WAIT;
        let mut seen = Vec::new();
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match rx.recv_timeout(left) {
                Ok(event) => {
                    let done = matches!(event, PlaybackEvent::StatusChanged { status, .. } if status == wanted);
                    seen.push(event);
                    if done {
                        return seen;
                    }
                }
                Err(_) => break,
            }
        }
        panic!("status {wanted} not reached; saw {seen:?}");
    }

    fn wait_until(mut ready: impl FnMut() -> bool) {
        let deadline = Instant::now() + WAIT;
        while !ready() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn drain(rx: &Receiver<PlaybackEvent>, quiet: Duration) -> Vec<PlaybackEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = rx.recv_timeout(quiet) {
            seen.push(event);
        }
        seen
    }

    fn playing_count(events: &[PlaybackEvent]) -> usize {
        events
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    PlaybackEvent::StatusChanged {
                        status: PlaybackStatus::Playing,
                        ..
                    }
                )
            })
            .count()
    }

    #[test]
    fn back_to_back_play_calls_apply_one_result() {
        let provider = Arc::new(SlowProvider::new(Duration::from_millis(100)));
        let output = Arc::new(RecordingOutput::default());
        let ctl = controller(
            Arc::clone(&provider),
            Arc::new(MemorySegmentCache::new()),
            output.clone(),
        );
        ctl.set_queue(items(&["First sentence.", "Second sentence."]));
        let rx = ctl.subscribe();

        ctl.play();
        ctl.play();
        ctl.play();

        let mut events = wait_for_status(&rx, PlaybackStatus::Playing);
        events.extend(drain(&rx, Duration::from_millis(300)));
        assert_eq!(playing_count(&events), 1);
        assert_eq!(provider.completed.load(Ordering::SeqCst), 1);
        assert_eq!(lock(&output.started).len(), 1);
        assert_eq!(ctl.status(), PlaybackStatus::Playing);
        assert!(
            !events
                .iter()
                .any(|event| matches!(event, PlaybackEvent::Error { .. }))
        );
    }

    #[test]
    fn play_while_playing_is_a_no_op() {
        let provider = Arc::new(SlowProvider::new(Duration::from_millis(5)));
        let output = Arc::new(RecordingOutput::default());
        let ctl = controller(provider.clone(), Arc::new(MemorySegmentCache::new()), output.clone());
        ctl.set_queue(items(&["Only one."]));
        let rx = ctl.subscribe();
        ctl.play();
        wait_for_status(&rx, PlaybackStatus::Playing);
        let before = ctl.snapshot();
        ctl.play();
        assert_eq!(ctl.snapshot(), before);
        assert_eq!(provider.started.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_while_loading_never_reaches_playing() {
        let mut slow = SlowProvider::new(Duration::from_millis(150));
        slow.honor_cancel = false;
        let provider = Arc::new(slow);
        let output = Arc::new(RecordingOutput::default());
        let ctl = controller(provider.clone(), Arc::new(MemorySegmentCache::new()), output.clone());
        ctl.set_queue(items(&["A slow sentence."]));
        let rx = ctl.subscribe();

        ctl.play();
        wait_for_status(&rx, PlaybackStatus::Loading);
        wait_until(|| provider.started.load(Ordering::SeqCst) == 1);
        ctl.stop();

        let mut events = wait_for_status(&rx, PlaybackStatus::Stopped);
        events.extend(drain(&rx, Duration::from_millis(400)));
        assert_eq!(provider.completed.load(Ordering::SeqCst), 1);
        assert_eq!(playing_count(&events), 0);
        assert!(lock(&output.started).is_empty());
        assert_eq!(ctl.status(), PlaybackStatus::Stopped);
    }

    #[test]
    fn rapid_navigation_keeps_only_the_last_request() {
        let provider = Arc::new(SlowProvider::new(Duration::from_millis(60)));
        let output = Arc::new(RecordingOutput::default());
        let ctl = controller(provider.clone(), Arc::new(MemorySegmentCache::new()), output.clone());
        ctl.set_queue(items(&["Zero.", "One.", "Two.", "Three.", "Four."]));
        let rx = ctl.subscribe();

        ctl.play();
        assert!(ctl.next());
        assert!(ctl.next());
        assert!(ctl.prev());
        assert!(ctl.next());
        assert!(ctl.jump_to(3));
        assert!(ctl.prev());

        let mut events = wait_for_status(&rx, PlaybackStatus::Playing);
        events.extend(drain(&rx, Duration::from_millis(300)));
        assert_eq!(playing_count(&events), 1);
        let started = lock(&output.started).clone();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].0, 2);
        assert_eq!(lock(&provider.texts).as_slice(), ["Two."]);
        assert_eq!(ctl.snapshot().current_index, 2);
    }

    #[test]
    fn navigation_is_a_no_op_at_boundaries() {
        let provider = Arc::new(SlowProvider::new(Duration::from_millis(1)));
        let ctl = controller(
            provider,
            Arc::new(MemorySegmentCache::new()),
            Arc::new(RecordingOutput::default()),
        );
        assert!(!ctl.next());
        ctl.set_queue(items(&["A.", "B."]));
        let before = ctl.snapshot();
        assert!(!ctl.prev());
        assert!(!ctl.jump_to(7));
        assert_eq!(ctl.snapshot(), before);
    }

    #[test]
    fn cache_hit_bypasses_provider() {
        let provider = Arc::new(SlowProvider::new(Duration::from_millis(1)));
        let cache = Arc::new(MemorySegmentCache::new());
        let key = CacheKey::new("Cached line.", &VoiceSettings::default());
        cache
            .put(
                &key,
                &CachedSegment {
                    audio: AudioAsset::wav(vec![7; 8]),
                    alignment: None,
                },
            )
            .expect("seed cache");
        let output = Arc::new(RecordingOutput::default());
        let ctl = controller(provider.clone(), cache, output.clone());
        ctl.set_queue(items(&["Cached line."]));
        let rx = ctl.subscribe();
        ctl.play();
        wait_for_status(&rx, PlaybackStatus::Playing);
        wait_until(|| !lock(&output.started).is_empty());
        assert_eq!(provider.started.load(Ordering::SeqCst), 0);
        assert_eq!(lock(&output.started).len(), 1);
    }

    #[test]
    fn synthesized_audio_is_written_to_cache() {
        let provider = Arc::new(SlowProvider::new(Duration::from_millis(1)));
        let cache = Arc::new(MemorySegmentCache::new());
        let ctl = controller(provider, cache.clone(), Arc::new(RecordingOutput::default()));
        ctl.set_queue(items(&["Store me."]));
        let rx = ctl.subscribe();
        ctl.play();
        wait_for_status(&rx, PlaybackStatus::Playing);
        let key = CacheKey::new("Store me.", &VoiceSettings::default());
        wait_until(|| cache.get(&key).expect("get").is_some());
    }

    #[test]
    fn completion_advances_past_skipped_items() {
        let provider = Arc::new(SlowProvider::new(Duration::from_millis(1)));
        let ctl = controller(
            provider.clone(),
            Arc::new(MemorySegmentCache::new()),
            Arc::new(NullOutput),
        );
        ctl.set_queue(items(&["One.", "* * *", "Three."]));
        let rx = ctl.subscribe();
        ctl.play();
        wait_for_status(&rx, PlaybackStatus::Completed);
        assert_eq!(lock(&provider.texts).as_slice(), ["One.", "Three."]);
        assert_eq!(ctl.snapshot().current_index, 2);
    }

    #[test]
    fn unspeakable_text_completes_without_synthesis() {
        let provider = Arc::new(SlowProvider::new(Duration::from_millis(1)));
        let ctl = controller(
            provider.clone(),
            Arc::new(MemorySegmentCache::new()),
            Arc::new(NullOutput),
        );
        ctl.set_queue(items(&["[12]", "Real text."]));
        let rx = ctl.subscribe();
        ctl.play();
        wait_for_status(&rx, PlaybackStatus::Completed);
        assert_eq!(lock(&provider.texts).as_slice(), ["Real text."]);
    }

    #[test]
    fn stale_notifier_is_ignored() {
        let provider = Arc::new(SlowProvider::new(Duration::from_millis(1)));
        let output = Arc::new(RecordingOutput::default());
        let ctl = controller(provider, Arc::new(MemorySegmentCache::new()), output.clone());
        ctl.set_queue(items(&["A.", "B."]));
        let rx = ctl.subscribe();
        ctl.play();
        wait_for_status(&rx, PlaybackStatus::Playing);
        wait_until(|| !lock(&output.notifiers).is_empty());
        let notifier = lock(&output.notifiers)[0].clone();

        ctl.pause();
        notifier.finished();
        assert_eq!(ctl.snapshot().current_index, 0);
        assert_eq!(ctl.status(), PlaybackStatus::Paused);
    }

    #[test]
    fn provider_failure_pauses_with_error() {
        let mut failing = SlowProvider::new(Duration::from_millis(1));
        failing.fail = true;
        let ctl = controller(
            Arc::new(failing),
            Arc::new(MemorySegmentCache::new()),
            Arc::new(RecordingOutput::default()),
        );
        ctl.set_queue(items(&["Broken."]));
        let rx = ctl.subscribe();
        ctl.play();
        let events = wait_for_status(&rx, PlaybackStatus::Paused);
        assert!(events.iter().any(|event| matches!(
            event,
            PlaybackEvent::Error { message, .. } if message.contains("voice unavailable")
        )));
    }

    #[test]
    fn set_queue_resets_to_idle() {
        let provider = Arc::new(SlowProvider::new(Duration::from_millis(100)));
        let output = Arc::new(RecordingOutput::default());
        let ctl = controller(provider.clone(), Arc::new(MemorySegmentCache::new()), output.clone());
        ctl.set_queue(items(&["Old one.", "Old two."]));
        assert!(ctl.jump_to(1));
        ctl.set_queue(items(&["New."]));
        let snapshot = ctl.snapshot();
        assert_eq!(snapshot.status, PlaybackStatus::Idle);
        assert_eq!(snapshot.current_index, 0);
        assert_eq!(snapshot.queue_len, 1);
        thread::sleep(Duration::from_millis(250));
        assert!(lock(&output.started).is_empty());
        assert!(output.stops.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn concurrent_play_leaves_the_winner_audible() {
        for _ in 0..200 {
            let output = Arc::new(OpLog::default());
            let ctl = controller(
                Arc::new(SlowProvider::new(Duration::ZERO)),
                Arc::new(MemorySegmentCache::new()),
                output.clone(),
            );
            ctl.set_queue(items(&["One.", "Two."]));
            lock(&output.ops).clear();

            let barrier = Arc::new(Barrier::new(2));
            let callers: Vec<_> = (0..2)
                .map(|_| {
                    let ctl = ctl.clone();
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        ctl.play();
                    })
                })
                .collect();
            for caller in callers {
                caller.join().expect("caller thread");
            }

            wait_until(|| ctl.status() == PlaybackStatus::Playing);
            drop(lock(&ctl.shared.output_lock));
            let ops = lock(&output.ops).clone();
            assert_eq!(ops.last(), Some(&"start"), "ops: {ops:?}");
            assert_eq!(ctl.status(), PlaybackStatus::Playing);
        }
    }

    #[test]
    fn stop_after_start_is_never_reordered() {
        let output = Arc::new(OpLog::default());
        let ctl = controller(
            Arc::new(SlowProvider::new(Duration::ZERO)),
            Arc::new(MemorySegmentCache::new()),
            output.clone(),
        );
        ctl.set_queue(items(&["One."]));
        ctl.play();
        wait_until(|| lock(&output.ops).last() == Some(&"start"));
        ctl.stop();
        assert_eq!(lock(&output.ops).last(), Some(&"stop"));
        assert_eq!(ctl.status(), PlaybackStatus::Stopped);
    }
}
