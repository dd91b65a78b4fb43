//! Continuous voice-command listening.
//!
//! # Flow
//!
//! ```text
//! listener thread (owns the cpal stream)
//!   recv_timeout(listen timeout) ─▶ AudioChunk ─▶ Segmenter
//!                                                   │ utterance
//!                                                   ▼
//!   Recognizer::dispatch ─▶ tokio task ─▶ spawn_blocking(stt.transcribe)
//!                                        ─▶ route() ─▶ Command (tokio mpsc)
//! ```
//!
//! The thread wakes at least once per listen timeout to check its
//! cancellation token, so it stops promptly even when the microphone goes
//! quiet.  Recognition misses (silence, unintelligible audio) are dropped
//! without a trace beyond a debug log.

use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle as ThreadHandle;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::audio::{AudioCapture, AudioChunk, CaptureError, Segmenter};
use crate::command::{route, Command, PhraseTable};
use crate::config::VoiceConfig;
use crate::stt::{SttEngine, SttError};

// ---------------------------------------------------------------------------
// Recognizer
// ---------------------------------------------------------------------------

/// Turns audio into routed commands.  Each completed utterance gets its own
/// recognition task; the recognizer keeps the handles until they finish.
pub struct Recognizer {
    stt: Arc<dyn SttEngine>,
    phrases: Arc<PhraseTable>,
    commands: mpsc::Sender<Command>,
    runtime: Handle,
    segmenter: Segmenter,
    tasks: Vec<JoinHandle<()>>,
}

impl Recognizer {
    pub fn new(
        stt: Arc<dyn SttEngine>,
        phrases: Arc<PhraseTable>,
        config: &VoiceConfig,
        commands: mpsc::Sender<Command>,
        runtime: Handle,
    ) -> Self {
        Self {
            stt,
            phrases,
            commands,
            runtime,
            segmenter: Segmenter::from_config(config),
            tasks: Vec::new(),
        }
    }

    /// Feed one microphone chunk.
    pub fn feed(&mut self, chunk: &AudioChunk) {
        for utterance in self.segmenter.push(&chunk.to_mono_16k()) {
            self.dispatch(utterance);
        }
    }

    /// No audio arrived within the listen timeout; close any open utterance.
    pub fn idle(&mut self) {
        if let Some(utterance) = self.segmenter.flush() {
            self.dispatch(utterance);
        }
    }

    /// Recognition tasks still running.
    pub fn in_flight(&mut self) -> usize {
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.len()
    }

    /// Abort every pending recognition.
    pub fn cancel(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    fn dispatch(&mut self, audio: Vec<f32>) {
        self.tasks.retain(|task| !task.is_finished());

        let stt = Arc::clone(&self.stt);
        let phrases = Arc::clone(&self.phrases);
        let commands = self.commands.clone();

        let task = self.runtime.spawn(async move {
            let result = tokio::task::spawn_blocking(move || stt.transcribe(&audio)).await;

            let transcript = match result {
                Ok(Ok(text)) => text,
                Ok(Err(SttError::NoSpeech)) => {
                    log::debug!("voice: no speech in utterance");
                    return;
                }
                Ok(Err(e)) => {
                    log::warn!("voice: recognition failed: {e}");
                    return;
                }
                Err(e) => {
                    log::error!("voice: recognition task failed: {e}");
                    return;
                }
            };

            let command = route(&phrases, &transcript);
            log::info!("voice: heard {:?} -> {:?}", command.transcript, command.kind);

            if commands.send(command).await.is_err() {
                log::debug!("voice: controller gone, dropping command");
            }
        });

        self.tasks.push(task);
    }
}

// ---------------------------------------------------------------------------
// VoiceListener
// ---------------------------------------------------------------------------

pub struct VoiceListener {
    stt: Arc<dyn SttEngine>,
    phrases: Arc<PhraseTable>,
    config: VoiceConfig,
}

impl VoiceListener {
    pub fn new(stt: Arc<dyn SttEngine>, phrases: PhraseTable, config: VoiceConfig) -> Self {
        Self {
            stt,
            phrases: Arc::new(phrases),
            config,
        }
    }

    /// Open the microphone and start listening on a dedicated thread.
    ///
    /// Blocks until the microphone is open (or has failed to open).  Must
    /// be called from within a tokio runtime.  The thread exits once
    /// `cancel` fires.
    pub fn spawn(
        self,
        commands: mpsc::Sender<Command>,
        cancel: CancellationToken,
    ) -> Result<ThreadHandle<()>, CaptureError> {
        let runtime = Handle::current();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), CaptureError>>();

        let thread = std::thread::Builder::new()
            .name("voice-listener".into())
            .spawn(move || self.listen(commands, cancel, runtime, ready_tx))
            .map_err(|_| CaptureError::ThreadExited)?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(thread),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CaptureError::ThreadExited),
        }
    }

    fn listen(
        self,
        commands: mpsc::Sender<Command>,
        cancel: CancellationToken,
        runtime: Handle,
        ready: std_mpsc::Sender<Result<(), CaptureError>>,
    ) {
        let (chunk_tx, chunk_rx) = std_mpsc::channel::<AudioChunk>();

        let stream = match AudioCapture::new().and_then(|capture| capture.start(chunk_tx)) {
            Ok(stream) => stream,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };
        let _ = ready.send(Ok(()));
        log::info!("voice: listening");

        let listen_timeout = Duration::from_secs_f32(self.config.listen_timeout_secs.max(0.1));
        let mut recognizer = Recognizer::new(
            self.stt,
            self.phrases,
            &self.config,
            commands,
            runtime,
        );

        while !cancel.is_cancelled() {
            match chunk_rx.recv_timeout(listen_timeout) {
                Ok(chunk) => recognizer.feed(&chunk),
                Err(std_mpsc::RecvTimeoutError::Timeout) => recognizer.idle(),
                Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                    log::error!("voice: audio stream ended");
                    break;
                }
            }
        }

        drop(stream);
        recognizer.cancel();
        log::info!("voice: stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
