//! Test doubles for the collaborator traits.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::camera::{Camera, CameraError, Frame};
use crate::hardware::{DistanceSensor, HardwareError, OutputPin};
use crate::speech::{SpeechError, Synthesizer};
use crate::stt::{SttEngine, SttError};
use crate::vision::{VisionError, VisionMode, VisionService};

pub fn frame() -> Frame {
    Frame {
        jpeg: vec![0xFF, 0xD8, 0xFF, 0xD9],
        width: 640,
        height: 480,
    }
}

// ---------------------------------------------------------------------------
// RecordingSynth
// ---------------------------------------------------------------------------

/// Records every utterance and plays it for a fixed (virtual) duration.
pub struct RecordingSynth {
    utterance: Duration,
    fail: bool,
    spoken: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl RecordingSynth {
    pub fn new(utterance: Duration) -> Self {
        Self {
            utterance,
            fail: false,
            spoken: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Duration::ZERO)
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn count(&self, text: &str) -> usize {
        self.spoken().iter().filter(|s| s.as_str() == text).count()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Synthesizer for RecordingSynth {
    async fn say(&self, text: &str, interrupt: CancellationToken) -> Result<(), SpeechError> {
        self.spoken.lock().unwrap().push(text.to_string());
        if self.fail {
            return Err(SpeechError::Failed("exit status: 1".into()));
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        tokio::select! {
            _ = tokio::time::sleep(self.utterance) => {}
            _ = interrupt.cancelled() => {}
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingPin
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingPin {
    levels: Mutex<Vec<bool>>,
}

impl RecordingPin {
    pub fn levels(&self) -> Vec<bool> {
        self.levels.lock().unwrap().clone()
    }

    /// Number of rising edges seen so far.
    pub fn pulses(&self) -> usize {
        self.levels().iter().filter(|&&high| high).count()
    }
}

impl OutputPin for RecordingPin {
    fn set(&self, high: bool) -> Result<(), HardwareError> {
        self.levels.lock().unwrap().push(high);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockCamera
// ---------------------------------------------------------------------------

/// Returns a frame (or fails) after a fixed virtual delay; remembers when
/// each capture started.
pub struct MockCamera {
    working: bool,
    delay: Duration,
    started: Mutex<Vec<Instant>>,
}

impl MockCamera {
    pub fn working() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn broken() -> Self {
        Self {
            working: false,
            ..Self::working()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            working: true,
            delay,
            started: Mutex::new(Vec::new()),
        }
    }

    pub fn captures(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    pub fn capture_starts(&self) -> Vec<Instant> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl Camera for MockCamera {
    async fn capture(&self) -> Result<Frame, CameraError> {
        self.started.lock().unwrap().push(Instant::now());
        tokio::time::sleep(self.delay).await;
        if self.working {
            Ok(frame())
        } else {
            Err(CameraError::EmptyFrame)
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedVision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum VisionCall {
    Analyze(VisionMode),
    Chat { text: String, with_frame: bool },
}

/// Replies with a fixed text after a fixed virtual delay.
pub struct ScriptedVision {
    reply: String,
    delay: Duration,
    calls: Mutex<Vec<VisionCall>>,
}

impl ScriptedVision {
    pub fn replying(reply: &str) -> Self {
        Self::with_delay(reply, Duration::ZERO)
    }

    pub fn with_delay(reply: &str, delay: Duration) -> Self {
        Self {
            reply: reply.to_string(),
            delay,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<VisionCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionService for ScriptedVision {
    async fn analyze(&self, _frame: &Frame, mode: VisionMode) -> Result<String, VisionError> {
        self.calls.lock().unwrap().push(VisionCall::Analyze(mode));
        tokio::time::sleep(self.delay).await;
        Ok(self.reply.clone())
    }

    async fn chat(&self, text: &str, frame: Option<&Frame>) -> Result<String, VisionError> {
        self.calls.lock().unwrap().push(VisionCall::Chat {
            text: text.to_string(),
            with_frame: frame.is_some(),
        });
        tokio::time::sleep(self.delay).await;
        Ok(self.reply.clone())
    }
}

// ---------------------------------------------------------------------------
// ScriptedSensor
// ---------------------------------------------------------------------------

/// Plays back a list of readings, then repeats `fallback` forever.
pub struct ScriptedSensor {
    readings: Mutex<VecDeque<Option<f64>>>,
    fallback: Option<f64>,
    samples: AtomicUsize,
}

impl ScriptedSensor {
    pub fn new(readings: &[Option<f64>], fallback: Option<f64>) -> Self {
        Self {
            readings: Mutex::new(readings.iter().copied().collect()),
            fallback,
            samples: AtomicUsize::new(0),
        }
    }

    pub fn constant(reading: Option<f64>) -> Self {
        Self::new(&[], reading)
    }

    pub fn samples(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DistanceSensor for ScriptedSensor {
    async fn measure(&self) -> Option<f64> {
        self.samples.fetch_add(1, Ordering::SeqCst);
        self.readings
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

// ---------------------------------------------------------------------------
// ScriptedStt
// ---------------------------------------------------------------------------

pub struct ScriptedStt {
    result: Result<String, SttError>,
    calls: AtomicUsize,
}

impl ScriptedStt {
    pub fn hearing(text: &str) -> Self {
        Self {
            result: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: SttError) -> Self {
        Self {
            result: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SttEngine for ScriptedStt {
    fn transcribe(&self, _audio: &[f32]) -> Result<String, SttError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}
