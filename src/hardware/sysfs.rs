//! Linux sysfs GPIO backend: HC-SR04 ultrasonic ranger and a buzzer pin.
//!
//! Pins are exported under `/sys/class/gpio` and their `value` files kept
//! open; reads use positioned I/O so each poll is a single syscall.  Echo
//! timing busy-waits on the echo pin, so a measurement runs on the blocking
//! thread pool.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{Backend, Buzzer, DistanceSensor, HardwareError, OutputPin, Peripherals};
use crate::config::ObstacleConfig;

pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Speed of sound in cm/s at ~20 °C.
const SPEED_OF_SOUND_CM_S: f64 = 34_300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

// ---------------------------------------------------------------------------
// SysfsPin
// ---------------------------------------------------------------------------

pub struct SysfsPin {
    number: u32,
    root: PathBuf,
    value: File,
}

impl SysfsPin {
    /// Export `number` (if needed), set its direction and open its value file.
    pub fn open(root: &Path, number: u32, direction: Direction) -> Result<Self, HardwareError> {
        let io = |source| HardwareError::Gpio { pin: number, source };
        let pin_dir = root.join(format!("gpio{number}"));

        if !pin_dir.exists() {
            write_file(&root.join("export"), &number.to_string()).map_err(io)?;
        }

        // udev may take a moment to create the pin directory and fix its
        // permissions after export.
        let mut attempts = 0;
        loop {
            match write_file(&pin_dir.join("direction"), direction.as_str()) {
                Ok(()) => break,
                Err(_) if attempts < 20 => {
                    attempts += 1;
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(_) => return Err(HardwareError::ExportTimeout(number)),
            }
        }

        let value = OpenOptions::new()
            .read(true)
            .write(direction == Direction::Out)
            .open(pin_dir.join("value"))
            .map_err(io)?;

        Ok(Self {
            number,
            root: root.to_path_buf(),
            value,
        })
    }

    pub fn write(&self, high: bool) -> Result<(), HardwareError> {
        self.value
            .write_all_at(if high { b"1" } else { b"0" }, 0)
            .map_err(|source| HardwareError::Gpio {
                pin: self.number,
                source,
            })
    }

    pub fn read(&self) -> Result<bool, HardwareError> {
        let mut buf = [0u8; 1];
        self.value
            .read_at(&mut buf, 0)
            .map_err(|source| HardwareError::Gpio {
                pin: self.number,
                source,
            })?;
        Ok(buf[0] == b'1')
    }

    fn unexport(&self) {
        if let Err(e) = write_file(&self.root.join("unexport"), &self.number.to_string()) {
            log::debug!("gpio: unexport {} failed: {e}", self.number);
        }
    }
}

impl OutputPin for SysfsPin {
    fn set(&self, high: bool) -> Result<(), HardwareError> {
        self.write(high)
    }

    fn release(&self) {
        self.unexport();
    }
}

fn write_file(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).truncate(true).open(path)?;
    file.write_all(contents.as_bytes())
}

// ---------------------------------------------------------------------------
// HC-SR04
// ---------------------------------------------------------------------------

/// Convert an echo pulse width to centimetres, rejecting readings outside
/// the sensor's valid span.
pub fn pulse_to_distance(pulse: Duration, min_cm: f64, max_cm: f64) -> Option<f64> {
    let distance = pulse.as_secs_f64() * SPEED_OF_SOUND_CM_S / 2.0;
    (min_cm..=max_cm).contains(&distance).then_some(distance)
}

struct Hcsr04 {
    trig: SysfsPin,
    echo: SysfsPin,
    echo_timeout: Duration,
    min_cm: f64,
    max_cm: f64,
}

impl Hcsr04 {
    fn measure_blocking(&self) -> Result<Option<f64>, HardwareError> {
        // 10 µs trigger pulse.
        self.trig.write(false)?;
        spin_for(Duration::from_micros(10));
        self.trig.write(true)?;
        spin_for(Duration::from_micros(10));
        self.trig.write(false)?;

        let deadline = Instant::now() + self.echo_timeout;

        let mut pulse_start = Instant::now();
        while !self.echo.read()? {
            pulse_start = Instant::now();
            if pulse_start > deadline {
                return Ok(None);
            }
        }

        let mut pulse_end = Instant::now();
        while self.echo.read()? {
            pulse_end = Instant::now();
            if pulse_end > deadline {
                return Ok(None);
            }
        }

        Ok(pulse_to_distance(
            pulse_end.saturating_duration_since(pulse_start),
            self.min_cm,
            self.max_cm,
        ))
    }
}

fn spin_for(duration: Duration) {
    let until = Instant::now() + duration;
    while Instant::now() < until {
        std::hint::spin_loop();
    }
}

/// Ultrasonic ranger sharing its pins with the blocking pool per sample.
pub struct UltrasonicSensor {
    inner: Arc<Hcsr04>,
}

#[async_trait]
impl DistanceSensor for UltrasonicSensor {
    async fn measure(&self) -> Option<f64> {
        let inner = Arc::clone(&self.inner);
        let result = tokio::task::spawn_blocking(move || inner.measure_blocking())
            .await
            .map_err(|e| HardwareError::Task(e.to_string()))
            .and_then(|r| r);

        match result {
            Ok(distance) => distance,
            Err(e) => {
                log::debug!("ultrasonic: {e}");
                None
            }
        }
    }

    fn release(&self) {
        self.inner.trig.unexport();
        self.inner.echo.unexport();
    }
}

/// Open the sensor and buzzer pins described by `config` under `root`.
pub fn open(root: &Path, config: &ObstacleConfig) -> Result<Peripherals, HardwareError> {
    let buzzer = SysfsPin::open(root, config.buzzer_pin, Direction::Out)?;
    buzzer.write(false)?;

    let sensor = Hcsr04 {
        trig: SysfsPin::open(root, config.trig_pin, Direction::Out)?,
        echo: SysfsPin::open(root, config.echo_pin, Direction::In)?,
        echo_timeout: Duration::from_millis(config.echo_timeout_ms),
        min_cm: config.min_range_cm,
        max_cm: config.max_range_cm,
    };

    Ok(Peripherals {
        sensor: Arc::new(UltrasonicSensor {
            inner: Arc::new(sensor),
        }),
        buzzer: Buzzer::new(Arc::new(buzzer)),
        backend: Backend::Sysfs,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
