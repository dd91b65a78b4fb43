//! Serialised speech output.
//!
//! [`SpeechOutputQueue`] is the only path to the audio output device.
//! Exactly one utterance is audible at a time: every request, blocking or
//! not, waits on the same FIFO guard before the synthesizer runs.
//! Non-blocking requests are spawned as their own tokio task and queue on
//! that guard, so they never overlap whatever is currently playing.
//!
//! [`stop`](SpeechOutputQueue::stop) cancels the current utterance's
//! interrupt token and clears the busy flag immediately.  An utterance that
//! already holds the turn but has not reached the synthesizer yet counts as
//! current: the stop is parked and it never starts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tokio_util::sync::CancellationToken;

use super::synth::Synthesizer;

/// What is on the audio device right now.
#[derive(Default)]
struct Playback {
    busy: bool,
    interrupt: Option<CancellationToken>,
    /// A stop arrived while the turn was held but nothing was registered.
    stop_pending: bool,
}

struct Inner {
    synth: Arc<dyn Synthesizer>,
    /// Held for the whole utterance.  tokio's mutex is FIFO-fair, which
    /// gives first-come-first-served ordering.
    turn: AsyncMutex<()>,
    playback: Mutex<Playback>,
    closed: AtomicBool,
}

/// The speaking turn.  Dropping it resets the playback state and hands the
/// turn on while the playback lock is held, so `stop` never sees a turn
/// owner whose state it cannot reach.
struct Turn<'a> {
    inner: &'a Inner,
    guard: Option<AsyncMutexGuard<'a, ()>>,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        let mut playback = self.inner.playback();
        playback.busy = false;
        playback.interrupt = None;
        playback.stop_pending = false;
        self.guard.take();
    }
}

impl Inner {
    fn playback(&self) -> MutexGuard<'_, Playback> {
        self.playback.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn play(&self, text: &str) {
        let _turn = Turn {
            inner: self,
            guard: Some(self.turn.lock().await),
        };

        if self.closed.load(Ordering::Acquire) {
            log::debug!("speech: queue closed, dropping {text:?}");
            return;
        }

        let interrupt = CancellationToken::new();
        {
            let mut playback = self.playback();
            if std::mem::take(&mut playback.stop_pending) {
                log::debug!("speech: stopped before playback of {text:?}");
                return;
            }
            playback.busy = true;
            playback.interrupt = Some(interrupt.clone());
        }

        log::debug!("speech: saying {text:?}");
        if let Err(e) = self.synth.say(text, interrupt).await {
            log::warn!("speech: playback failed: {e}");
        }
    }
}

/// Cheap-to-clone handle to the single speech channel.
#[derive(Clone)]
pub struct SpeechOutputQueue {
    inner: Arc<Inner>,
}

impl SpeechOutputQueue {
    pub fn new(synth: Arc<dyn Synthesizer>) -> Self {
        Self {
            inner: Arc::new(Inner {
                synth,
                turn: AsyncMutex::new(()),
                playback: Mutex::new(Playback::default()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Speak `text`.
    ///
    /// With `blocking` the call returns once the utterance has finished or
    /// was interrupted.  Without it the request is handed to a background
    /// task and the call returns immediately.  Blank text is ignored.
    pub async fn speak(&self, text: &str, blocking: bool) {
        if text.trim().is_empty() || self.inner.closed.load(Ordering::Acquire) {
            return;
        }

        if blocking {
            self.inner.play(text).await;
        } else {
            let inner = Arc::clone(&self.inner);
            let text = text.to_owned();
            tokio::spawn(async move { inner.play(&text).await });
        }
    }

    /// Interrupt the current utterance, if any.  Queued requests still play.
    pub fn stop(&self) {
        let mut playback = self.inner.playback();
        if let Some(interrupt) = playback.interrupt.take() {
            log::debug!("speech: stop requested");
            interrupt.cancel();
        } else if self.inner.turn.try_lock().is_err() {
            playback.stop_pending = true;
        }
        playback.busy = false;
    }

    /// Stop the current utterance and drop every queued or future request.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.stop();
    }

    /// `true` while an utterance is audible.
    pub fn is_busy(&self) -> bool {
        self.inner.playback().busy
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
