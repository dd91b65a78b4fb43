//! Distance sensor and buzzer.
//!
//! The obstacle monitor talks to two seams:
//!
//! * [`DistanceSensor`] — one range sample in centimetres, or `None` when no
//!   valid echo arrived.
//! * [`Buzzer`] — plays a [`BuzzPattern`] on an [`OutputPin`].
//!
//! [`probe`] picks the backend once at startup: the Linux sysfs GPIO
//! interface when the platform exposes it, otherwise a simulated backend that
//! logs beeps and never reports an obstacle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ObstacleConfig;

pub mod sim;
#[cfg(target_os = "linux")]
pub mod sysfs;

pub use sim::{SimulatedPin, SimulatedSensor};

// ---------------------------------------------------------------------------
// HardwareError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("GPIO {pin}: {source}")]
    Gpio {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("GPIO {0} did not appear after export")]
    ExportTimeout(u32),

    #[error("blocking sensor task failed: {0}")]
    Task(String),
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

#[async_trait]
pub trait DistanceSensor: Send + Sync {
    /// Sample once.  `None` covers timeouts, out-of-range readings and
    /// sensor faults alike.
    async fn measure(&self) -> Option<f64>;

    /// Give the underlying device back to the system.
    fn release(&self) {}
}

pub trait OutputPin: Send + Sync {
    fn set(&self, high: bool) -> Result<(), HardwareError>;

    fn release(&self) {}
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Alert tier for one distance sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObstacleLevel {
    Critical,
    Warning,
    Clear,
}

impl ObstacleLevel {
    /// `d < critical` is critical, `critical <= d < warning` is a warning,
    /// anything else is clear.
    pub fn classify(distance_cm: f64, critical_cm: f64, warning_cm: f64) -> Self {
        if distance_cm < critical_cm {
            ObstacleLevel::Critical
        } else if distance_cm < warning_cm {
            ObstacleLevel::Warning
        } else {
            ObstacleLevel::Clear
        }
    }

    pub fn pattern(self) -> Option<BuzzPattern> {
        match self {
            ObstacleLevel::Critical => Some(BuzzPattern::Double),
            ObstacleLevel::Warning => Some(BuzzPattern::Single),
            ObstacleLevel::Clear => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Buzzer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuzzPattern {
    /// One 100 ms pulse.
    Single,
    /// Two 100 ms pulses 50 ms apart.
    Double,
    /// One 50 ms chirp.
    Confirm,
    /// Two 100 ms pulses 100 ms apart.
    Error,
}

impl BuzzPattern {
    /// `(on, off)` durations in milliseconds.
    pub fn pulses(self) -> &'static [(u64, u64)] {
        match self {
            BuzzPattern::Single => &[(100, 0)],
            BuzzPattern::Double => &[(100, 50), (100, 0)],
            BuzzPattern::Confirm => &[(50, 0)],
            BuzzPattern::Error => &[(100, 100), (100, 0)],
        }
    }
}

#[derive(Clone)]
pub struct Buzzer {
    pin: Arc<dyn OutputPin>,
}

impl Buzzer {
    pub fn new(pin: Arc<dyn OutputPin>) -> Self {
        Self { pin }
    }

    /// Play `pattern`.  Pin errors are logged, never propagated.
    ///
    /// Dropping the future mid-pulse still leaves the pin low.
    pub async fn buzz(&self, pattern: BuzzPattern) {
        let mut pulse = PulseGuard {
            pin: self.pin.as_ref(),
            high: false,
        };

        for &(on_ms, off_ms) in pattern.pulses() {
            if let Err(e) = self.pin.set(true) {
                log::warn!("buzzer: {e}");
                return;
            }
            pulse.high = true;
            tokio::time::sleep(Duration::from_millis(on_ms)).await;
            if let Err(e) = self.pin.set(false) {
                log::warn!("buzzer: {e}");
                return;
            }
            pulse.high = false;
            if off_ms > 0 {
                tokio::time::sleep(Duration::from_millis(off_ms)).await;
            }
        }
    }

    /// Drive the pin low and release it.
    pub fn release(&self) {
        if let Err(e) = self.pin.set(false) {
            log::warn!("buzzer: could not silence on release: {e}");
        }
        self.pin.release();
    }
}

/// Drives the pin low if a pulse is abandoned while high.
struct PulseGuard<'a> {
    pin: &'a dyn OutputPin,
    high: bool,
}

impl Drop for PulseGuard<'_> {
    fn drop(&mut self) {
        if self.high {
            if let Err(e) = self.pin.set(false) {
                log::warn!("buzzer: could not silence interrupted pulse: {e}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Peripherals / probe
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sysfs,
    Simulated,
}

/// The sensor/actuator pair handed to the obstacle monitor.
#[derive(Clone)]
pub struct Peripherals {
    pub sensor: Arc<dyn DistanceSensor>,
    pub buzzer: Buzzer,
    pub backend: Backend,
}

impl Peripherals {
    pub fn simulated() -> Self {
        Self {
            sensor: Arc::new(SimulatedSensor),
            buzzer: Buzzer::new(Arc::new(SimulatedPin::new("buzzer"))),
            backend: Backend::Simulated,
        }
    }

    /// Silence the buzzer and release every pin.
    pub fn release(&self) {
        self.buzzer.release();
        self.sensor.release();
        log::info!("hardware: released ({:?})", self.backend);
    }
}

/// Select the hardware backend for this platform.
pub fn probe(config: &ObstacleConfig) -> Peripherals {
    #[cfg(target_os = "linux")]
    {
        let root = std::path::Path::new(sysfs::SYSFS_GPIO_ROOT);
        if root.join("export").exists() {
            match sysfs::open(root, config) {
                Ok(peripherals) => {
                    log::info!("hardware: sysfs GPIO ready");
                    return peripherals;
                }
                Err(e) => log::warn!("hardware: GPIO setup failed ({e}); simulating"),
            }
        } else {
            log::info!("hardware: no GPIO interface found; simulating");
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = config;
        log::info!("hardware: GPIO unsupported on this platform; simulating");
    }

    Peripherals::simulated()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
