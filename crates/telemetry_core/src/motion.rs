//! Derivação de comandos de movimento a partir da leitura da IMU.
//!
//! Convenção dos eixos: `angles.x` = roll, `angles.y` = pitch e
//! `angular_velocity.z` = taxa de yaw. Inclinação tem prioridade sobre
//! rotação; abaixo das zonas mortas o comando é `stop`.

use crate::config::FeedConfig;
use crate::types::{MotionCommand, MotionToken, SensorReading};

/// Limiares da derivação.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionThresholds {
    pub tilt_dead_zone_deg: f64,
    pub tilt_max_deg: f64,
    pub yaw_rate_threshold: f64,
    pub yaw_rate_max: f64,
}

impl Default for MotionThresholds {
    fn default() -> Self {
        Self::from(&FeedConfig::default())
    }
}

impl From<&FeedConfig> for MotionThresholds {
    fn from(cfg: &FeedConfig) -> Self {
        Self {
            tilt_dead_zone_deg: cfg.tilt_dead_zone_deg,
            tilt_max_deg: cfg.tilt_max_deg,
            yaw_rate_threshold: cfg.yaw_rate_threshold,
            yaw_rate_max: cfg.yaw_rate_max,
        }
    }
}

/// Detector com memória do último comando (para `is_motion_start`).
#[derive(Debug, Clone)]
pub struct MotionDetector {
    thresholds: MotionThresholds,
    last: MotionToken,
}

impl MotionDetector {
    pub fn new(thresholds: MotionThresholds) -> Self {
        Self {
            thresholds,
            last: MotionToken::Stop,
        }
    }

    pub fn derive(&mut self, reading: &SensorReading) -> MotionCommand {
        let t = &self.thresholds;
        let roll = reading.angles.x;
        let pitch = reading.angles.y;
        let yaw_rate = reading.angular_velocity.z;

        let (tilt, axis) = if pitch.abs() >= roll.abs() {
            (pitch, "pitch")
        } else {
            (roll, "roll")
        };

        let intensity = normalize(tilt.abs(), t.tilt_dead_zone_deg, t.tilt_max_deg);
        let angular_intensity = normalize(yaw_rate.abs(), t.yaw_rate_threshold, t.yaw_rate_max);

        let (command, raw_direction) = if tilt.abs() > t.tilt_dead_zone_deg {
            let token = match (axis, tilt > 0.0) {
                ("pitch", true) => MotionToken::Forward,
                ("pitch", false) => MotionToken::Backward,
                (_, true) => MotionToken::Right,
                (_, false) => MotionToken::Left,
            };
            (token, format!("{axis}{}", sign(tilt)))
        } else if yaw_rate.abs() > t.yaw_rate_threshold {
            let token = if yaw_rate > 0.0 {
                MotionToken::RotateLeft
            } else {
                MotionToken::RotateRight
            };
            (token, format!("yaw{}", sign(yaw_rate)))
        } else {
            (MotionToken::Stop, String::new())
        };

        let is_motion_start = self.last.is_stop() && !command.is_stop();
        self.last = command.clone();

        MotionCommand {
            command,
            intensity,
            angular_intensity,
            raw_direction,
            is_motion_start,
            timestamp: reading.timestamp.clone(),
        }
    }
}

/// Mapeia `value` de [floor, ceil] para [0, 1].
fn normalize(value: f64, floor: f64, ceil: f64) -> f64 {
    if value <= floor || ceil <= floor {
        return 0.0;
    }
    ((value - floor) / (ceil - floor)).clamp(0.0, 1.0)
}

fn sign(v: f64) -> char {
    if v >= 0.0 { '+' } else { '-' }
}
