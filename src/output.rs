//! Audio output collaborators.
//!
//! The controller hands each ready item to an [`AudioOutput`] together with a
//! [`CompletionNotifier`]. The output calls `finished()` once the audio has
//! played through; the controller then advances. Outputs never decide what
//! plays next.

use crate::playback::CompletionNotifier;
use crate::provider::SynthesisOutput;
use crate::queue::QueueItem;
use anyhow::Result;
use tracing::debug;

/// Everything an output needs to render one queue item.
#[derive(Debug, Clone)]
pub struct OutputHandoff {
    pub index: usize,
    pub generation: u64,
    pub item: QueueItem,
    pub output: SynthesisOutput,
}

pub trait AudioOutput: Send + Sync {
    /// Begin rendering `handoff`, replacing whatever was playing. Must not
    /// block until playback ends.
    fn start(&self, handoff: OutputHandoff, done: CompletionNotifier) -> Result<()>;
    fn pause(&self);
    /// Stop and release the current audio. A stopped item's notifier is
    /// dropped without firing.
    fn stop(&self);
}

/// Output that treats every item as instantly played. Used for dry runs
/// and with native providers, which have already spoken.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOutput;

impl AudioOutput for NullOutput {
    fn start(&self, handoff: OutputHandoff, done: CompletionNotifier) -> Result<()> {
        debug!(
            index = handoff.index,
            native = handoff.output.is_native,
            "Null output finished item"
        );
        done.finished();
        Ok(())
    }

    fn pause(&self) {}

    fn stop(&self) {}
}

#[cfg(feature = "playback")]
pub use rodio_output::RodioOutput;

#[cfg(feature = "playback")]
mod rodio_output {
    use super::{AudioOutput, OutputHandoff};
    use crate::playback::CompletionNotifier;
    use anyhow::{Context, Result, anyhow};
    use rodio::{Decoder, OutputStream, Sink};
    use std::io::Cursor;
    use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
    use std::thread;
    use std::time::Duration;
    use tracing::{debug, info, warn};

    const POLL_INTERVAL: Duration = Duration::from_millis(50);

    enum Command {
        Play {
            bytes: Vec<u8>,
            done: CompletionNotifier,
        },
        Pause,
        Stop,
    }

    /// Plays encoded assets through the default output device. The stream
    /// lives on a dedicated thread; commands arrive over a channel.
    pub struct RodioOutput {
        commands: Sender<Command>,
    }

    impl RodioOutput {
        pub fn new() -> Result<Self> {
            let (commands, rx) = mpsc::channel();
            let (ready_tx, ready_rx) = mpsc::channel();
            thread::Builder::new()
                .name("audio-output".to_string())
                .spawn(move || run(rx, ready_tx))
                .context("Spawning audio output thread")?;
            ready_rx
                .recv()
                .map_err(|_| anyhow!("audio output thread exited during startup"))??;
            info!("Opened audio output");
            Ok(Self { commands })
        }

        fn send(&self, command: Command) {
            if self.commands.send(command).is_err() {
                warn!("Audio output thread is gone");
            }
        }
    }

    impl AudioOutput for RodioOutput {
        fn start(&self, handoff: OutputHandoff, done: CompletionNotifier) -> Result<()> {
            match handoff.output.audio {
                Some(audio) => {
                    debug!(
                        index = handoff.index,
                        bytes = audio.bytes.len(),
                        mime = %audio.mime_type,
                        "Queueing audio"
                    );
                    self.commands
                        .send(Command::Play {
                            bytes: audio.bytes,
                            done,
                        })
                        .map_err(|_| anyhow!("audio output thread is gone"))
                }
                None => {
                    done.finished();
                    Ok(())
                }
            }
        }

        fn pause(&self) {
            self.send(Command::Pause);
        }

        fn stop(&self) {
            self.send(Command::Stop);
        }
    }

    fn run(rx: Receiver<Command>, ready: Sender<Result<()>>) {
        let (_stream, handle) = match OutputStream::try_default().context("Opening audio output") {
            Ok(pair) => pair,
            Err(err) => {
                let _ = ready.send(Err(err));
                return;
            }
        };
        let _ = ready.send(Ok(()));

        let mut current: Option<(Sink, CompletionNotifier)> = None;
        loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(Command::Play { bytes, done }) => {
                    if let Some((sink, _)) = current.take() {
                        sink.stop();
                    }
                    let started = Sink::try_new(&handle)
                        .context("Creating sink")
                        .and_then(|sink| {
                            let source = Decoder::new(Cursor::new(bytes)).context("Decoding audio")?;
                            sink.append(source);
                            sink.play();
                            Ok(sink)
                        });
                    match started {
                        Ok(sink) => current = Some((sink, done)),
                        Err(err) => done.failed(&format!("{err:#}")),
                    }
                }
                Ok(Command::Pause) => {
                    if let Some((sink, _)) = &current {
                        sink.pause();
                    }
                }
                Ok(Command::Stop) => {
                    if let Some((sink, _)) = current.take() {
                        sink.stop();
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let drained = current
                        .as_ref()
                        .is_some_and(|(sink, _)| !sink.is_paused() && sink.empty());
                    if drained {
                        if let Some((_, done)) = current.take() {
                            done.finished();
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("Audio output thread exiting");
    }
}
