//! Protocolo de envelopes JSON do stream de sensores.
//!
//! Cada frame de texto do WebSocket carrega um objeto:
//!
//! ```text
//! { "type": "sensor_data" | "motion_command" | "error",
//!   "timestamp": <número ou string>,
//!   "data": { ... } }
//! ```
//!
//! Só JSON inválido (ou que não seja objeto) é erro de protocolo. Envelopes
//! bem formados mas incompletos viram [`Inbound::Dropped`] e são ignorados
//! pelo chamador sem sinalizar erro.

use crate::types::{MotionCommand, SensorReading, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Mensagem usada quando um envelope `error` não traz texto.
pub const UNKNOWN_ERROR: &str = "unknown error";

/// Erros do protocolo.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON inválido: {0}")]
    Json(String),

    #[error("Envelope não é um objeto JSON")]
    NotAnObject,

    #[error("Erro de serialização: {0}")]
    Serialize(String),
}

/// Tipo declarado no campo `type` do envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    SensorData,
    MotionCommand,
    Error,
}

impl EnvelopeKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "sensor_data" => Some(Self::SensorData),
            "motion_command" => Some(Self::MotionCommand),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Resultado da decodificação de um envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Sensor(SensorReading),
    Motion(MotionCommand),
    /// Erro reportado pelo servidor (conexão continua aberta).
    RemoteError(String),
    /// Envelope reconhecido mas com campos obrigatórios ausentes.
    Dropped(EnvelopeKind),
    /// Campo `type` ausente ou desconhecido.
    Unknown(String),
}

impl Inbound {
    /// `true` para envelopes que foram roteados (atualizam o timestamp).
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Sensor(_) | Self::Motion(_) | Self::RemoteError(_))
    }
}

/// Decodifica um frame de texto em [`Inbound`].
pub fn decode_envelope(text: &str) -> Result<Inbound, ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(|e| ProtocolError::Json(e.to_string()))?;
    let Value::Object(envelope) = value else {
        return Err(ProtocolError::NotAnObject);
    };

    let type_name = envelope.get("type").and_then(Value::as_str).unwrap_or_default();
    let Some(kind) = EnvelopeKind::parse(type_name) else {
        return Ok(Inbound::Unknown(type_name.to_owned()));
    };

    let timestamp = envelope_timestamp(&envelope);
    let data = envelope.get("data");

    let inbound = match kind {
        EnvelopeKind::SensorData => data
            .and_then(|d| decode_sensor(d, timestamp))
            .map(Inbound::Sensor),
        EnvelopeKind::MotionCommand => data
            .and_then(|d| decode_motion(d, timestamp))
            .map(Inbound::Motion),
        EnvelopeKind::Error => Some(Inbound::RemoteError(error_message(&envelope, data))),
    };

    Ok(inbound.unwrap_or(Inbound::Dropped(kind)))
}

fn envelope_timestamp(envelope: &Map<String, Value>) -> Option<Timestamp> {
    envelope
        .get("timestamp")
        .and_then(|t| Timestamp::deserialize(t).ok())
}

// Campos obrigatórios são estritos; opcionais inválidos caem no padrão.

fn decode_sensor(data: &Value, timestamp: Option<Timestamp>) -> Option<SensorReading> {
    Some(SensorReading {
        acceleration: field(data, "acceleration")?,
        angular_velocity: field(data, "angularVelocity")?,
        angles: field(data, "angles")?,
        temperature: data.get("temperature").and_then(Value::as_f64).unwrap_or(0.0),
        battery: data.get("battery").and_then(Value::as_f64).unwrap_or(0.0),
        timestamp: timestamp.or_else(|| field(data, "timestamp")).unwrap_or_default(),
    })
}

fn decode_motion(data: &Value, timestamp: Option<Timestamp>) -> Option<MotionCommand> {
    Some(MotionCommand {
        command: field(data, "command")?,
        intensity: data.get("intensity")?.as_f64()?,
        angular_intensity: data.get("angularIntensity")?.as_f64()?,
        raw_direction: data
            .get("rawDirection")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        is_motion_start: data.get("isMotionStart").and_then(Value::as_bool).unwrap_or(false),
        timestamp: timestamp.or_else(|| field(data, "timestamp")).unwrap_or_default(),
    })
}

fn field<'de, T: Deserialize<'de>>(data: &'de Value, key: &str) -> Option<T> {
    T::deserialize(data.get(key)?).ok()
}

fn error_message(envelope: &Map<String, Value>, data: Option<&Value>) -> String {
    data.and_then(|d| match d {
        Value::String(s) => Some(s.as_str()),
        other => other.get("message").and_then(Value::as_str),
    })
    .or_else(|| envelope.get("message").and_then(Value::as_str))
    .filter(|m| !m.is_empty())
    .unwrap_or(UNKNOWN_ERROR)
    .to_owned()
}

// ──────────────────────────────────────────────
// Saída (servidor de feed)
// ──────────────────────────────────────────────

/// Corpo de um envelope `error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorData {
    pub message: String,
}

/// Envelope emitido pelo servidor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    SensorData { timestamp: Timestamp, data: SensorReading },
    MotionCommand { timestamp: Timestamp, data: MotionCommand },
    Error { timestamp: Timestamp, data: ErrorData },
}

impl Outbound {
    /// Envelope `error` com a mensagem em `data.message`.
    pub fn error(timestamp: Timestamp, message: impl Into<String>) -> Self {
        Self::Error {
            timestamp,
            data: ErrorData {
                message: message.into(),
            },
        }
    }
}

/// Codifica um [`Outbound`] como texto JSON para um frame WebSocket.
pub fn encode_envelope(envelope: &Outbound) -> Result<String, ProtocolError> {
    serde_json::to_string(envelope).map_err(|e| ProtocolError::Serialize(e.to_string()))
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MotionToken, Vector3};

    const FULL_SENSOR: &str = r#"{
        "type": "sensor_data",
        "timestamp": 1700000000123,
        "data": {
            "acceleration": {"x": 1, "y": 2, "z": 3},
            "angularVelocity": {"x": 0, "y": 0, "z": 0},
            "angles": {"x": 0, "y": 0, "z": 0}
        }
    }"#;

    #[test]
    fn sensor_data_defaults_temperature_and_battery() {
        let decoded = decode_envelope(FULL_SENSOR).unwrap();
        let expected = SensorReading {
            acceleration: Vector3::new(1.0, 2.0, 3.0),
            angular_velocity: Vector3::default(),
            angles: Vector3::default(),
            temperature: 0.0,
            battery: 0.0,
            timestamp: Timestamp::Millis(1_700_000_000_123.0),
        };
        assert_eq!(decoded, Inbound::Sensor(expected));
    }

    #[test]
    fn sensor_data_keeps_optional_fields() {
        let text = r#"{"type":"sensor_data","timestamp":"t0","data":{
            "acceleration":{"x":0,"y":0,"z":9.8},
            "angularVelocity":{"x":1,"y":2,"z":3},
            "angles":{"x":10,"y":20,"z":30},
            "temperature":36.5,"battery":87}}"#;
        let Inbound::Sensor(reading) = decode_envelope(text).unwrap() else {
            panic!("esperado sensor_data");
        };
        assert_eq!(reading.temperature, 36.5);
        assert_eq!(reading.battery, 87.0);
        assert_eq!(reading.timestamp, Timestamp::Text("t0".into()));
    }

    #[test]
    fn partial_sensor_data_is_dropped() {
        let text = r#"{"type":"sensor_data","timestamp":1,"data":{
            "acceleration":{"x":1,"y":2,"z":3},
            "angles":{"x":0,"y":0,"z":0}}}"#;
        assert_eq!(
            decode_envelope(text).unwrap(),
            Inbound::Dropped(EnvelopeKind::SensorData)
        );
    }

    #[test]
    fn sensor_data_without_data_is_dropped() {
        let text = r#"{"type":"sensor_data","timestamp":1}"#;
        assert_eq!(
            decode_envelope(text).unwrap(),
            Inbound::Dropped(EnvelopeKind::SensorData)
        );
    }

    #[test]
    fn motion_command_applies_defaults() {
        let text = r#"{"type":"motion_command","timestamp":5,"data":{
            "command":"forward","intensity":0.5,"angularIntensity":0.1}}"#;
        let Inbound::Motion(cmd) = decode_envelope(text).unwrap() else {
            panic!("esperado motion_command");
        };
        assert_eq!(cmd.command, MotionToken::Forward);
        assert_eq!(cmd.raw_direction, "");
        assert!(!cmd.is_motion_start);
        assert_eq!(cmd.timestamp, Timestamp::Millis(5.0));
    }

    #[test]
    fn motion_command_missing_intensity_is_dropped() {
        let text = r#"{"type":"motion_command","data":{"command":"left","angularIntensity":0.1}}"#;
        assert_eq!(
            decode_envelope(text).unwrap(),
            Inbound::Dropped(EnvelopeKind::MotionCommand)
        );
    }

    #[test]
    fn error_envelope_reads_message() {
        let text = r#"{"type":"error","data":{"message":"sensor offline"}}"#;
        assert_eq!(
            decode_envelope(text).unwrap(),
            Inbound::RemoteError("sensor offline".into())
        );
        let top_level = r#"{"type":"error","message":"boom"}"#;
        assert_eq!(decode_envelope(top_level).unwrap(), Inbound::RemoteError("boom".into()));
    }

    #[test]
    fn error_envelope_defaults_message() {
        let text = r#"{"type":"error","timestamp":1}"#;
        assert_eq!(
            decode_envelope(text).unwrap(),
            Inbound::RemoteError(UNKNOWN_ERROR.into())
        );
    }

    #[test]
    fn unknown_type_is_not_accepted() {
        let decoded = decode_envelope(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(decoded, Inbound::Unknown("heartbeat".into()));
        assert!(!decoded.is_accepted());
    }

    #[test]
    fn malformed_json_is_error() {
        assert!(matches!(decode_envelope("{not json"), Err(ProtocolError::Json(_))));
        assert!(matches!(decode_envelope("[1,2]"), Err(ProtocolError::NotAnObject)));
    }

    #[test]
    fn bad_optional_sensor_fields_fall_back_to_defaults() {
        let text = r#"{"type":"sensor_data","data":{
            "acceleration":{"x":1,"y":2,"z":3},
            "angularVelocity":{"x":0,"y":0,"z":0},
            "angles":{"x":0,"y":0,"z":0},
            "temperature":"36.5","battery":null,
            "timestamp":{"sec":1}}}"#;
        let Inbound::Sensor(reading) = decode_envelope(text).unwrap() else {
            panic!("esperado sensor_data");
        };
        assert_eq!(reading.acceleration, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(reading.temperature, 0.0);
        assert_eq!(reading.battery, 0.0);
        assert_eq!(reading.timestamp, Timestamp::default());
    }

    #[test]
    fn data_timestamp_used_when_envelope_has_none() {
        let text = r#"{"type":"sensor_data","data":{
            "acceleration":{"x":0,"y":0,"z":0},
            "angularVelocity":{"x":0,"y":0,"z":0},
            "angles":{"x":0,"y":0,"z":0},
            "timestamp":77}}"#;
        let Inbound::Sensor(reading) = decode_envelope(text).unwrap() else {
            panic!("esperado sensor_data");
        };
        assert_eq!(reading.timestamp, Timestamp::Millis(77.0));
    }

    #[test]
    fn bad_optional_motion_fields_fall_back_to_defaults() {
        let text = r#"{"type":"motion_command","timestamp":9,"data":{
            "command":"rotate_left","intensity":0,"angularIntensity":0.7,
            "rawDirection":3,"isMotionStart":1}}"#;
        let Inbound::Motion(cmd) = decode_envelope(text).unwrap() else {
            panic!("esperado motion_command");
        };
        assert_eq!(cmd.command, MotionToken::RotateLeft);
        assert_eq!(cmd.angular_intensity, 0.7);
        assert_eq!(cmd.raw_direction, "");
        assert!(!cmd.is_motion_start);
        assert_eq!(cmd.timestamp, Timestamp::Millis(9.0));
    }

    #[test]
    fn non_numeric_intensity_is_dropped() {
        let text = r#"{"type":"motion_command","data":{
            "command":"left","intensity":"0.5","angularIntensity":0.1}}"#;
        assert_eq!(
            decode_envelope(text).unwrap(),
            Inbound::Dropped(EnvelopeKind::MotionCommand)
        );
    }

    #[test]
    fn encoded_envelope_is_decodable() {
        let reading = SensorReading {
            acceleration: Vector3::new(0.1, -0.2, 9.81),
            battery: 50.0,
            timestamp: Timestamp::Millis(42.0),
            ..Default::default()
        };
        let text = encode_envelope(&Outbound::SensorData {
            timestamp: Timestamp::Millis(42.0),
            data: reading.clone(),
        })
        .unwrap();
        assert!(text.contains("\"type\":\"sensor_data\""));
        assert_eq!(decode_envelope(&text).unwrap(), Inbound::Sensor(reading));
    }

    #[test]
    fn encoded_error_reaches_client_as_remote_error() {
        let text = encode_envelope(&Outbound::error(Timestamp::Millis(1.0), "imu travada")).unwrap();
        assert_eq!(
            decode_envelope(&text).unwrap(),
            Inbound::RemoteError("imu travada".into())
        );
    }
}
