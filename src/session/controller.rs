//! Session controller: applies routed commands to the operating mode and
//! owns the guidance workers.
//!
//! # Command flow
//!
//! ```text
//! VoiceListener ──Command (mpsc)──▶ SessionController::run()
//!                                        │
//!                                        ├─ Activate   → system on, chirp, "activated"
//!                                        ├─ Guide      → spawn GuidanceWorker + ObstacleMonitor
//!                                        │               on a fresh child token
//!                                        ├─ StopGuide  → cancel that token
//!                                        ├─ ReadText / Describe → capture → analyze → speak
//!                                        ├─ Chat / ExitChat     → chat flag
//!                                        ├─ Unmatched (chatting) → ChatSession::turn
//!                                        └─ Exit       → shutdown sequence
//!
//! ExitHandle (signals) ─────────────────▶ shutdown sequence, even in standby
//! ```
//!
//! Commands are applied one at a time on the controller task.  Workers only
//! ever see their cancellation token.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::camera::{capture_frame, Camera};
use crate::command::{Command, CommandKind};
use crate::config::{AppConfig, GuidanceConfig, Messages, ObstacleConfig};
use crate::hardware::{BuzzPattern, Peripherals};
use crate::speech::SpeechOutputQueue;
use crate::vision::{FallbackVision, VisionMode};

use super::chat::ChatSession;
use super::guidance::GuidanceWorker;
use super::obstacle::ObstacleMonitor;
use super::state::{Mode, SessionState};

/// How long shutdown waits for workers before aborting them.
pub const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Everything the controller talks to, constructed once at startup.
#[derive(Clone)]
pub struct Collaborators {
    pub camera: Arc<dyn Camera>,
    pub vision: FallbackVision,
    pub speech: SpeechOutputQueue,
    pub peripherals: Peripherals,
}

/// Requests shutdown from outside the command stream (OS signals).
#[derive(Clone)]
pub struct ExitHandle(CancellationToken);

impl ExitHandle {
    pub fn request(&self) {
        self.0.cancel();
    }

    /// Resolves once shutdown has been requested.
    pub async fn requested(&self) {
        self.0.cancelled().await;
    }
}

/// The running guidance pair and the token that stops both.
struct ActiveGuidance {
    cancel: CancellationToken,
    guidance: JoinHandle<()>,
    obstacle: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// SessionController
// ---------------------------------------------------------------------------

pub struct SessionController {
    state: SessionState,
    camera: Arc<dyn Camera>,
    vision: FallbackVision,
    speech: SpeechOutputQueue,
    peripherals: Peripherals,
    chat: ChatSession,
    messages: Messages,
    guidance_config: GuidanceConfig,
    obstacle_config: ObstacleConfig,
    /// Parent of every worker token and of the voice listener's token.
    root: CancellationToken,
    exit: CancellationToken,
    active: Option<ActiveGuidance>,
    /// Stopped workers that have not been joined yet.
    retired: Vec<JoinHandle<()>>,
}

impl SessionController {
    pub fn new(config: &AppConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            camera,
            vision,
            speech,
            peripherals,
        } = collaborators;

        let chat = ChatSession::new(Arc::clone(&camera), vision.clone(), speech.clone());

        Self {
            state: SessionState::default(),
            camera,
            vision,
            speech,
            peripherals,
            chat,
            messages: config.messages.clone(),
            guidance_config: config.guidance.clone(),
            obstacle_config: config.obstacle.clone(),
            root: CancellationToken::new(),
            exit: CancellationToken::new(),
            active: None,
            retired: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.state.mode()
    }

    /// Token for a long-lived loop that must stop at shutdown (the voice
    /// listener).
    pub fn child_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    pub fn exit_handle(&self) -> ExitHandle {
        ExitHandle(self.exit.clone())
    }

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------

    /// Apply commands until an `Exit` command or an exit request, then run
    /// the shutdown sequence.
    ///
    /// An exit request also cuts short the command being applied: its
    /// camera, vision and speech calls are dropped and playback is stopped.
    /// A closed command channel (voice capture gone) does not end the
    /// session; only an explicit exit does.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let exit = self.exit.clone();
        let mut listening = true;

        loop {
            tokio::select! {
                biased;

                _ = exit.cancelled() => {
                    log::info!("session: exit requested");
                    self.terminate().await;
                }
                received = commands.recv(), if listening => match received {
                    Some(command) => {
                        let interrupted = tokio::select! {
                            biased;
                            _ = exit.cancelled() => true,
                            _ = self.handle_command(command) => false,
                        };
                        if interrupted {
                            log::info!("session: exit requested mid-command");
                            self.speech.stop();
                            self.terminate().await;
                        }
                    }
                    None => {
                        log::warn!("session: command channel closed; waiting for exit signal");
                        listening = false;
                    }
                },
            }

            if self.state.terminating {
                break;
            }
        }

        log::info!("session: terminated");
    }

    // -----------------------------------------------------------------------
    // Command handling
    // -----------------------------------------------------------------------

    pub async fn handle_command(&mut self, command: Command) {
        if self.state.terminating {
            return;
        }

        log::info!(
            "session: {:?} in {} ({:?})",
            command.kind,
            self.mode(),
            command.transcript
        );

        if command.kind == CommandKind::Activate {
            self.state.system_active = true;
            self.peripherals.buzzer.buzz(BuzzPattern::Confirm).await;
            self.say(&self.messages.activated).await;
            return;
        }

        if !self.state.system_active {
            log::debug!("session: standby, ignoring {:?}", command.kind);
            return;
        }

        match command.kind {
            CommandKind::Activate => {}
            CommandKind::Guide => self.start_guidance().await,
            CommandKind::StopGuide => self.stop_guidance().await,
            CommandKind::ReadText => self.one_shot(VisionMode::Ocr).await,
            CommandKind::Describe => self.one_shot(VisionMode::Describe).await,
            CommandKind::Chat => {
                self.state.chat_active = true;
                self.say(&self.messages.chat_start).await;
            }
            CommandKind::ExitChat => {
                self.state.chat_active = false;
                self.say(&self.messages.chat_end).await;
            }
            CommandKind::Exit => self.terminate().await,
            CommandKind::Unmatched if self.state.chat_active => {
                self.chat.turn(&command.transcript).await;
            }
            CommandKind::Unmatched => {
                log::debug!("session: unmatched outside chat, ignored");
            }
        }
    }

    async fn say(&self, text: &str) {
        self.speech.speak(text, true).await;
    }

    async fn start_guidance(&mut self) {
        self.reap_retired();

        if self.active.is_some() {
            log::debug!("session: guidance already running");
            return;
        }

        self.say(&self.messages.guidance_start).await;
        self.state.guidance_active = true;

        let cancel = self.root.child_token();

        let guidance = GuidanceWorker::new(
            Arc::clone(&self.camera),
            self.vision.clone(),
            self.speech.clone(),
            self.guidance_config.capture_interval(),
            cancel.clone(),
        );
        let obstacle = ObstacleMonitor::new(
            Arc::clone(&self.peripherals.sensor),
            self.peripherals.buzzer.clone(),
            self.speech.clone(),
            self.obstacle_config.clone(),
            self.messages.obstacle_warning.clone(),
            cancel.clone(),
        );

        self.active = Some(ActiveGuidance {
            cancel,
            guidance: tokio::spawn(guidance.run()),
            obstacle: tokio::spawn(obstacle.run()),
        });
    }

    /// Signal the guidance pair to stop without waiting for it.
    async fn stop_guidance(&mut self) {
        let Some(active) = self.active.take() else {
            log::debug!("session: guidance not running");
            return;
        };

        active.cancel.cancel();
        self.retired.push(active.guidance);
        self.retired.push(active.obstacle);
        self.state.guidance_active = false;

        self.say(&self.messages.guidance_stop).await;
    }

    fn reap_retired(&mut self) {
        self.retired.retain(|handle| !handle.is_finished());
    }

    /// Capture, analyse and speak once.
    async fn one_shot(&self, mode: VisionMode) {
        let cue = match mode {
            VisionMode::Ocr => &self.messages.reading_text,
            _ => &self.messages.analyzing,
        };
        self.say(cue).await;

        match capture_frame(self.camera.as_ref()).await {
            Some(frame) => {
                let reply = self.vision.analyze(&frame, mode).await;
                log::info!("session: {mode:?}: {reply}");
                self.say(&reply).await;
            }
            None => {
                self.peripherals.buzzer.buzz(BuzzPattern::Error).await;
                self.say(&self.messages.error_camera).await;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Speak the goodbye, then stop everything.
    async fn terminate(&mut self) {
        if self.state.terminating {
            return;
        }
        self.say(&self.messages.shutdown).await;
        self.shutdown().await;
    }

    /// Cancel every worker and the voice loop, silence speech, wait (bounded)
    /// for the workers and release the hardware.
    async fn shutdown(&mut self) {
        log::info!("session: shutting down");
        self.state = SessionState {
            terminating: true,
            ..SessionState::default()
        };

        self.root.cancel();
        self.speech.close();

        let mut handles = std::mem::take(&mut self.retired);
        if let Some(active) = self.active.take() {
            handles.push(active.guidance);
            handles.push(active.obstacle);
        }
        join_with_timeout(handles, SHUTDOWN_JOIN_TIMEOUT).await;

        self.peripherals.release();
        log::info!("session: shutdown complete");
    }
}

/// Await every handle until `timeout` has passed in total, then abort the
/// stragglers.
async fn join_with_timeout(handles: Vec<JoinHandle<()>>, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;

    for mut handle in handles {
        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_cancelled() => {}
            Ok(Err(e)) => log::error!("session: worker failed: {e}"),
            Err(_) => {
                log::warn!("session: worker did not stop within {timeout:?}; aborting");
                handle.abort();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{Backend, Buzzer};
    use crate::testing::{
        MockCamera, RecordingPin, RecordingSynth, ScriptedSensor, ScriptedVision, VisionCall,
    };
    use crate::vision::fallback::VISION_UNAVAILABLE;
    use crate::vision::ApiVisionClient;
    use tokio::time::Instant;

    struct Rig {
        controller: SessionController,
        camera: Arc<MockCamera>,
        vision: Arc<ScriptedVision>,
        synth: Arc<RecordingSynth>,
        pin: Arc<RecordingPin>,
        messages: Messages,
    }

    fn rig_with(camera: MockCamera, vision: ScriptedVision) -> Rig {
        let camera = Arc::new(camera);
        let vision = Arc::new(vision);
        let synth = Arc::new(RecordingSynth::instant());
        let pin = Arc::new(RecordingPin::default());

        let collaborators = Collaborators {
            camera: camera.clone(),
            vision: FallbackVision::new(vision.clone()),
            speech: SpeechOutputQueue::new(synth.clone()),
            peripherals: Peripherals {
                sensor: Arc::new(ScriptedSensor::constant(None)),
                buzzer: Buzzer::new(pin.clone()),
                backend: Backend::Simulated,
            },
        };

        let config = AppConfig::default();
        Rig {
            controller: SessionController::new(&config, collaborators),
            camera,
            vision,
            synth,
            pin,
            messages: config.messages,
        }
    }

    fn rig() -> Rig {
        rig_with(MockCamera::working(), ScriptedVision::replying("Chair ahead"))
    }

    fn cmd(kind: CommandKind) -> Command {
        Command::new(kind, "")
    }

    impl Rig {
        async fn send(&mut self, kind: CommandKind) {
            self.controller.handle_command(cmd(kind)).await;
        }

        fn live_workers(&self) -> usize {
            let active = self
                .controller
                .active
                .as_ref()
                .map(|a| [&a.guidance, &a.obstacle].iter().filter(|h| !h.is_finished()).count())
                .unwrap_or(0);
            let retired = self.controller.retired.iter().filter(|h| !h.is_finished()).count();
            active + retired
        }
    }

    #[tokio::test(start_paused = true)]
    async fn standby_ignores_everything_but_activate() {
        let mut rig = rig();

        for kind in [
            CommandKind::Guide,
            CommandKind::ReadText,
            CommandKind::Describe,
            CommandKind::Chat,
            CommandKind::Exit,
        ] {
            rig.send(kind).await;
        }

        assert_eq!(rig.controller.mode(), Mode::Standby);
        assert!(rig.synth.spoken().is_empty());
        assert_eq!(rig.camera.captures(), 0);
        assert!(rig.controller.active.is_none());
        assert!(rig.pin.levels().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn activate_is_idempotent() {
        let mut rig = rig();
        rig.send(CommandKind::Activate).await;
        let after_first = rig.controller.state();
        rig.send(CommandKind::Activate).await;

        assert_eq!(rig.controller.state(), after_first);
        assert_eq!(rig.controller.mode(), Mode::Idle);
        assert_eq!(rig.synth.count(&rig.messages.activated), 2);
        // One confirmation chirp per activation.
        assert_eq!(rig.pin.levels(), vec![true, false, true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn guide_twice_runs_one_worker_pair() {
        let mut rig = rig();
        rig.send(CommandKind::Activate).await;
        rig.send(CommandKind::Guide).await;
        rig.send(CommandKind::Guide).await;

        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(rig.controller.mode(), Mode::Guiding);
        assert_eq!(rig.live_workers(), 2);
        assert_eq!(rig.camera.captures(), 1);
        assert_eq!(rig.synth.count(&rig.messages.guidance_start), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_guide_when_idle_is_a_noop() {
        let mut rig = rig();
        rig.send(CommandKind::Activate).await;
        let before = rig.controller.state();

        rig.send(CommandKind::StopGuide).await;

        assert_eq!(rig.controller.state(), before);
        assert_eq!(rig.synth.count(&rig.messages.guidance_stop), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_guide_cancels_both_workers() {
        let mut rig = rig();
        rig.send(CommandKind::Activate).await;
        rig.send(CommandKind::Guide).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        rig.send(CommandKind::StopGuide).await;
        assert_eq!(rig.controller.mode(), Mode::Idle);
        assert_eq!(rig.synth.count(&rig.messages.guidance_stop), 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(rig.live_workers(), 0);

        let captures = rig.camera.captures();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(rig.camera.captures(), captures);
    }

    #[tokio::test(start_paused = true)]
    async fn guide_after_stop_starts_a_new_pair() {
        let mut rig = rig();
        rig.send(CommandKind::Activate).await;
        rig.send(CommandKind::Guide).await;
        rig.send(CommandKind::StopGuide).await;
        rig.send(CommandKind::Guide).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(rig.controller.mode(), Mode::Guiding);
        assert_eq!(rig.live_workers(), 2);
        assert_eq!(rig.synth.count(&rig.messages.guidance_start), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn read_text_speaks_cue_then_result() {
        let mut rig = rig_with(MockCamera::working(), ScriptedVision::replying("Exit sign."));
        rig.send(CommandKind::Activate).await;
        rig.send(CommandKind::ReadText).await;

        assert_eq!(rig.vision.calls(), vec![VisionCall::Analyze(VisionMode::Ocr)]);
        assert_eq!(
            rig.synth.spoken()[1..],
            [rig.messages.reading_text.clone(), "Exit sign.".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn describe_without_camera_reports_camera_error() {
        let mut rig = rig_with(MockCamera::broken(), ScriptedVision::replying("unused"));
        rig.send(CommandKind::Activate).await;
        rig.send(CommandKind::Describe).await;

        assert!(rig.vision.calls().is_empty());
        assert_eq!(
            rig.synth.spoken()[1..],
            [rig.messages.analyzing.clone(), rig.messages.error_camera.clone()]
        );
        // Confirm chirp, then the two-pulse error pattern.
        assert_eq!(rig.pin.pulses(), 3);
        assert_eq!(rig.pin.levels().last(), Some(&false));
    }

    #[tokio::test(start_paused = true)]
    async fn unconfigured_vision_speaks_apology() {
        let camera = Arc::new(MockCamera::working());
        let synth = Arc::new(RecordingSynth::instant());
        let collaborators = Collaborators {
            camera: camera.clone(),
            vision: FallbackVision::new(Arc::new(ApiVisionClient::from_config(
                &crate::config::VisionConfig::default(),
            ))),
            speech: SpeechOutputQueue::new(synth.clone()),
            peripherals: Peripherals::simulated(),
        };
        let mut controller = SessionController::new(&AppConfig::default(), collaborators);

        controller.handle_command(cmd(CommandKind::Activate)).await;
        controller.handle_command(cmd(CommandKind::Describe)).await;

        assert_eq!(synth.spoken().last().map(String::as_str), Some(VISION_UNAVAILABLE));
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_speech_is_a_chat_turn_only_in_chat_mode() {
        let mut rig = rig_with(MockCamera::working(), ScriptedVision::replying("A blue door."));
        rig.send(CommandKind::Activate).await;

        rig.controller
            .handle_command(Command::new(CommandKind::Unmatched, "what colour is it"))
            .await;
        assert!(rig.vision.calls().is_empty());

        rig.send(CommandKind::Chat).await;
        assert_eq!(rig.controller.mode(), Mode::Chatting);
        rig.controller
            .handle_command(Command::new(CommandKind::Unmatched, "what colour is it"))
            .await;

        assert_eq!(
            rig.vision.calls(),
            vec![VisionCall::Chat {
                text: "what colour is it".into(),
                with_frame: true,
            }]
        );
        assert_eq!(rig.synth.spoken().last().map(String::as_str), Some("A blue door."));

        rig.send(CommandKind::ExitChat).await;
        assert_eq!(rig.controller.mode(), Mode::Idle);
        assert_eq!(rig.synth.count(&rig.messages.chat_end), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn guidance_and_chat_coexist() {
        let mut rig = rig();
        rig.send(CommandKind::Activate).await;
        rig.send(CommandKind::Guide).await;
        rig.send(CommandKind::Chat).await;
        assert_eq!(rig.controller.mode(), Mode::GuidingAndChatting);
        assert!(rig.controller.state().is_consistent());
    }

    #[tokio::test(start_paused = true)]
    async fn exit_command_ends_run_and_releases_hardware() {
        let rig = rig();
        let synth = rig.synth.clone();
        let pin = rig.pin.clone();
        let shutdown_message = rig.messages.shutdown.clone();
        let listener = rig.controller.child_token();

        let (tx, rx) = mpsc::channel(8);
        let run = tokio::spawn(rig.controller.run(rx));

        tx.send(cmd(CommandKind::Activate)).await.unwrap();
        tx.send(cmd(CommandKind::Guide)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let exit_at = Instant::now();
        tx.send(cmd(CommandKind::Exit)).await.unwrap();
        run.await.unwrap();

        assert!(exit_at.elapsed() < SHUTDOWN_JOIN_TIMEOUT);
        assert!(listener.is_cancelled());
        assert_eq!(synth.spoken().last(), Some(&shutdown_message));
        assert_eq!(pin.levels().last(), Some(&false));

        // Speech is closed after shutdown.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(synth.spoken().last(), Some(&shutdown_message));
    }

    #[tokio::test(start_paused = true)]
    async fn exit_request_works_in_standby() {
        let rig = rig();
        let synth = rig.synth.clone();
        let exit = rig.controller.exit_handle();

        let (_tx, rx) = mpsc::channel::<Command>(8);
        let run = tokio::spawn(rig.controller.run(rx));

        exit.request();
        run.await.unwrap();

        assert_eq!(synth.spoken(), vec![rig.messages.shutdown.clone()]);
    }

    #[tokio::test(start_paused = true)]
    async fn exit_request_cuts_short_a_running_command() {
        let rig = rig_with(
            MockCamera::working(),
            ScriptedVision::with_delay("Exit sign.", Duration::from_secs(15)),
        );
        let synth = rig.synth.clone();
        let pin = rig.pin.clone();
        let shutdown_message = rig.messages.shutdown.clone();
        let exit = rig.controller.exit_handle();

        let (tx, rx) = mpsc::channel(8);
        let run = tokio::spawn(rig.controller.run(rx));

        tx.send(cmd(CommandKind::Activate)).await.unwrap();
        tx.send(cmd(CommandKind::ReadText)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let requested_at = Instant::now();
        exit.request();
        run.await.unwrap();

        assert!(requested_at.elapsed() < Duration::from_secs(1));
        assert_eq!(synth.count("Exit sign."), 0);
        assert_eq!(synth.spoken().last(), Some(&shutdown_message));
        assert_eq!(pin.levels().last(), Some(&false));
    }

    #[tokio::test(start_paused = true)]
    async fn exit_handle_clones_observe_the_request() {
        let rig = rig();
        let exit = rig.controller.exit_handle();
        let watcher = exit.clone();

        let waiting = tokio::spawn(async move { watcher.requested().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiting.is_finished());

        exit.request();
        waiting.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn closed_channel_keeps_session_alive_until_exit() {
        let rig = rig();
        let exit = rig.controller.exit_handle();

        let (tx, rx) = mpsc::channel::<Command>(1);
        drop(tx);
        let run = tokio::spawn(rig.controller.run(rx));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!run.is_finished());

        exit.request();
        run.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_worker_is_aborted_after_timeout() {
        let stuck = tokio::spawn(std::future::pending::<()>());
        let started = Instant::now();

        join_with_timeout(vec![stuck], Duration::from_secs(2)).await;

        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }
}
