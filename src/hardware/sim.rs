//! Logging-only stand-ins used when no GPIO interface is present.

use async_trait::async_trait;

use super::{DistanceSensor, HardwareError, OutputPin};

/// Never sees an obstacle.
pub struct SimulatedSensor;

#[async_trait]
impl DistanceSensor for SimulatedSensor {
    async fn measure(&self) -> Option<f64> {
        None
    }
}

/// Logs level changes instead of driving a pin.
pub struct SimulatedPin {
    name: &'static str,
}

impl SimulatedPin {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl OutputPin for SimulatedPin {
    fn set(&self, high: bool) -> Result<(), HardwareError> {
        if high {
            log::info!("{}: [BEEP]", self.name);
        }
        Ok(())
    }
}
