//! IMU sintética – gera leituras plausíveis para demos e testes locais.
//!
//! Cada eixo é uma senoide com período próprio, então a sequência passa por
//! todos os comandos de movimento (inclinação para frente/trás, lados,
//! rotação e repouso).

use std::f64::consts::TAU;
use telemetry_core::types::{SensorReading, Timestamp, Vector3};

const GRAVITY: f64 = 9.81;

/// Amplitudes e períodos (segundos) das senoides.
const ROLL_AMPLITUDE_DEG: f64 = 30.0;
const ROLL_PERIOD: f64 = 11.0;
const PITCH_AMPLITUDE_DEG: f64 = 35.0;
const PITCH_PERIOD: f64 = 7.0;
const YAW_RATE_AMPLITUDE: f64 = 120.0;
const YAW_PERIOD: f64 = 5.0;

/// Descarga simulada da bateria (% por minuto).
const BATTERY_DRAIN_PER_MIN: f64 = 0.5;

/// Gerador de leituras da IMU.
#[derive(Debug, Clone)]
pub struct SyntheticImu {
    base_temperature: f64,
}

impl Default for SyntheticImu {
    fn default() -> Self {
        Self {
            base_temperature: 31.0,
        }
    }
}

impl SyntheticImu {
    /// Leitura no instante `elapsed_secs` desde o início do feed.
    pub fn collect(&self, elapsed_secs: f64, epoch_ms: f64) -> SensorReading {
        let wave = |amplitude: f64, period: f64| amplitude * (TAU * elapsed_secs / period).sin();

        let roll = wave(ROLL_AMPLITUDE_DEG, ROLL_PERIOD);
        let pitch = wave(PITCH_AMPLITUDE_DEG, PITCH_PERIOD);
        let yaw_rate = wave(YAW_RATE_AMPLITUDE, YAW_PERIOD);

        // Gravidade projetada nos eixos do sensor
        let (roll_r, pitch_r) = (roll.to_radians(), pitch.to_radians());
        let acceleration = Vector3::new(
            GRAVITY * pitch_r.sin(),
            -GRAVITY * roll_r.sin() * pitch_r.cos(),
            GRAVITY * roll_r.cos() * pitch_r.cos(),
        );

        // Derivadas analíticas de roll/pitch (°/s)
        let roll_rate = ROLL_AMPLITUDE_DEG * TAU / ROLL_PERIOD * (TAU * elapsed_secs / ROLL_PERIOD).cos();
        let pitch_rate = PITCH_AMPLITUDE_DEG * TAU / PITCH_PERIOD * (TAU * elapsed_secs / PITCH_PERIOD).cos();

        SensorReading {
            acceleration,
            angular_velocity: Vector3::new(roll_rate, pitch_rate, yaw_rate),
            angles: Vector3::new(roll, pitch, yaw_angle(elapsed_secs)),
            temperature: self.base_temperature + 0.5 * (TAU * elapsed_secs / 60.0).sin(),
            battery: (100.0 - BATTERY_DRAIN_PER_MIN * elapsed_secs / 60.0).max(0.0),
            timestamp: Timestamp::Millis(epoch_ms),
        }
    }
}

/// Integral da taxa de yaw, normalizada para [0, 360).
fn yaw_angle(elapsed_secs: f64) -> f64 {
    let integral = YAW_RATE_AMPLITUDE * YAW_PERIOD / TAU * (1.0 - (TAU * elapsed_secs / YAW_PERIOD).cos());
    integral.rem_euclid(360.0)
}
