//! Application entry point: Smart Vision Guide.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk plus environment overrides.
//! 3. Create the tokio runtime.
//! 4. Build the collaborators and probe the GPIO backend.
//! 5. Self-test camera, GPIO and vision credentials.
//! 6. Announce startup, then start the voice listener (announcing a
//!    microphone failure if it cannot start).
//! 7. Run the session controller until an exit command or SIGINT/SIGTERM.
//!    The signal handler is installed before step 6, so an interrupt during
//!    model loading still releases the hardware.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use vision_guide::{
    camera::{capture_frame, Camera, CommandCamera},
    command::Command,
    config::{AppConfig, AppPaths},
    hardware::{self, Backend, Peripherals},
    session::{Collaborators, SessionController},
    speech::{CommandSynthesizer, SpeechOutputQueue},
    stt::WhisperEngine,
    vision::{ApiVisionClient, FallbackVision},
    voice::VoiceListener,
};

/// How long to wait for the listener thread after shutdown.
const LISTENER_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Smart Vision Guide starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(run(config))
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    // 4. Collaborators
    let camera: Arc<dyn Camera> = Arc::new(CommandCamera::new(config.camera.clone()));
    let vision = FallbackVision::new(Arc::new(ApiVisionClient::from_config(&config.vision)));
    let speech = SpeechOutputQueue::new(Arc::new(CommandSynthesizer::new(config.speech.clone())));
    let peripherals = hardware::probe(&config.obstacle);

    // 5. Self-test
    self_test(&config, camera.as_ref(), &peripherals).await;

    let controller = SessionController::new(
        &config,
        Collaborators {
            camera,
            vision,
            speech: speech.clone(),
            peripherals,
        },
    );
    let exit = controller.exit_handle();
    let listener_cancel = controller.child_token();

    // Signals from here on reach the shutdown sequence, which releases the
    // GPIO pins exported above.
    let signalled = exit.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signalled.request();
    });

    // 6. Announce and listen
    let (command_tx, command_rx) = mpsc::channel::<Command>(16);
    let startup = async {
        speech.speak(&config.messages.startup, true).await;
        let listener = start_voice(&config, command_tx, listener_cancel).await;
        if listener.is_none() {
            speech.speak(&config.messages.error_microphone, true).await;
        }
        log::info!("System ready. Say 'Hi Siri' to activate.");
        listener
    };

    let listener = tokio::select! {
        biased;

        _ = exit.requested() => {
            log::info!("Interrupted during startup");
            None
        }
        listener = startup => listener,
    };

    // 7. Session
    controller.run(command_rx).await;

    if let Some(thread) = listener {
        let joined = tokio::time::timeout(
            LISTENER_JOIN_TIMEOUT,
            tokio::task::spawn_blocking(move || thread.join()),
        )
        .await;
        if joined.is_err() {
            log::warn!("voice listener did not stop within {LISTENER_JOIN_TIMEOUT:?}");
        }
    }

    log::info!("Shutdown complete. Goodbye!");
    Ok(())
}

/// Log the state of each device the way the operator sees it on the console.
async fn self_test(config: &AppConfig, camera: &dyn Camera, peripherals: &Peripherals) {
    log::info!("[1/3] Testing camera...");
    if capture_frame(camera).await.is_some() {
        log::info!("      Camera OK");
    } else {
        log::warn!("      Camera FAILED - check connection");
    }

    log::info!("[2/3] GPIO...");
    match peripherals.backend {
        Backend::Sysfs => log::info!("      GPIO OK"),
        Backend::Simulated => log::info!("      GPIO simulation mode"),
    }

    log::info!("[3/3] Checking vision API...");
    if config.vision.is_configured() {
        log::info!("      Vision API key present ({})", config.vision.model);
    } else {
        log::warn!("      Vision API FAILED - set OPENROUTER_API_KEY");
    }
}

/// Load the Whisper model and open the microphone.  `None` when either
/// fails; the session then runs without voice input until a signal ends it.
async fn start_voice(
    config: &AppConfig,
    commands: mpsc::Sender<Command>,
    cancel: CancellationToken,
) -> Option<std::thread::JoinHandle<()>> {
    log::info!("Initialising microphone...");

    let model = AppPaths::new().model_file(&config.voice.model);
    let language = config.voice.language.clone();
    let stt = match tokio::task::spawn_blocking(move || WhisperEngine::load(&model, &language)).await
    {
        Ok(Ok(engine)) => engine,
        Ok(Err(e)) => {
            log::error!("Speech recognition unavailable: {e}");
            return None;
        }
        Err(e) => {
            log::error!("Speech model loader failed: {e}");
            return None;
        }
    };

    let listener = VoiceListener::new(Arc::new(stt), config.commands.clone(), config.voice.clone());

    match tokio::task::spawn_blocking(move || listener.spawn(commands, cancel)).await {
        Ok(Ok(thread)) => {
            log::info!("Microphone OK");
            Some(thread)
        }
        Ok(Err(e)) => {
            log::error!("Microphone FAILED: {e}");
            None
        }
        Err(e) => {
            log::error!("Microphone start-up task failed: {e}");
            None
        }
    }
}

/// Resolve on Ctrl-C or, on Unix, SIGTERM.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => log::info!("Received SIGINT"),
                    _ = sigterm.recv() => log::info!("Received SIGTERM"),
                }
                return;
            }
            Err(e) => log::warn!("Cannot install SIGTERM handler: {e}"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Received SIGINT");
}
