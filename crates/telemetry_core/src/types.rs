//! Definição de tipos/structs para o stream de sensores.
//!
//! Os nomes dos campos seguem o JSON do servidor (camelCase), então todas
//! as structs usam `rename_all = "camelCase"` no serde.

use serde::{Deserialize, Serialize};
use std::fmt;

// ──────────────────────────────────────────────
// Conexão
// ──────────────────────────────────────────────

/// Estado da conexão com o endpoint de push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    /// `true` enquanto existe (ou está sendo aberta) uma conexão.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

// ──────────────────────────────────────────────
// Timestamp
// ──────────────────────────────────────────────

/// Timestamp como enviado pelo servidor: epoch em ms ou string (ISO 8601).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(f64),
    Text(String),
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::Millis(0.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Millis(ms) => write!(f, "{ms:.0}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

// ──────────────────────────────────────────────
// Sensor
// ──────────────────────────────────────────────

/// Vetor de três eixos.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Leitura completa da IMU. Substituída inteira a cada mensagem válida.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    /// Aceleração linear (m/s²)
    pub acceleration: Vector3,
    /// Velocidade angular (°/s)
    pub angular_velocity: Vector3,
    /// Ângulos de Euler (°)
    pub angles: Vector3,
    /// Temperatura do sensor (°C), 0 se ausente
    pub temperature: f64,
    /// Bateria (%), 0 se ausente
    pub battery: f64,
    pub timestamp: Timestamp,
}

// ──────────────────────────────────────────────
// Comandos de movimento
// ──────────────────────────────────────────────

/// Token de comando derivado da leitura.
///
/// Tokens desconhecidos são preservados em [`MotionToken::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MotionToken {
    Forward,
    Backward,
    Left,
    Right,
    RotateLeft,
    RotateRight,
    Stop,
    Other(String),
}

impl MotionToken {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Left => "left",
            Self::Right => "right",
            Self::RotateLeft => "rotate_left",
            Self::RotateRight => "rotate_right",
            Self::Stop => "stop",
            Self::Other(s) => s,
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, Self::Stop)
    }
}

impl From<String> for MotionToken {
    fn from(s: String) -> Self {
        match s.as_str() {
            "forward" => Self::Forward,
            "backward" => Self::Backward,
            "left" => Self::Left,
            "right" => Self::Right,
            "rotate_left" => Self::RotateLeft,
            "rotate_right" => Self::RotateRight,
            "stop" => Self::Stop,
            _ => Self::Other(s),
        }
    }
}

impl From<MotionToken> for String {
    fn from(token: MotionToken) -> Self {
        match token {
            MotionToken::Other(s) => s,
            other => other.as_str().to_owned(),
        }
    }
}

impl fmt::Display for MotionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comando de movimento. Substituído inteiro a cada mensagem válida.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionCommand {
    pub command: MotionToken,
    /// Intensidade linear normalizada (0–1)
    pub intensity: f64,
    /// Intensidade angular normalizada (0–1)
    pub angular_intensity: f64,
    /// Eixo dominante e sinal, ex: "pitch+"
    pub raw_direction: String,
    /// `true` na transição de parado para movimento
    pub is_motion_start: bool,
    pub timestamp: Timestamp,
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
