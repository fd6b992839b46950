//! # Telemetry Core
//!
//! Crate compartilhada que define as estruturas de dados, o protocolo de
//! envelopes JSON, a configuração TOML e a máquina de estados do stream de
//! sensores do sistema de Telemetria.
//!
//! ## Módulos
//! - [`types`] – Leitura da IMU, comandos de movimento e estado da conexão
//! - [`protocol`] – Decode/encode dos envelopes `sensor_data`/`motion_command`/`error`
//! - [`config`] – Configuração unificada via TOML
//! - [`backoff`] – Política de reconexão exponencial
//! - [`stream`] – Gerenciador do stream (sem I/O)
//! - [`motion`] – Derivação de comandos a partir das leituras

pub mod types;
pub mod protocol;
pub mod config;
pub mod backoff;
pub mod stream;
pub mod motion;

// Re-exports convenientes
pub use types::{ConnectionState, MotionCommand, MotionToken, SensorReading, Timestamp, Vector3};
pub use protocol::{decode_envelope, encode_envelope, Inbound, Outbound};
pub use config::{AppConfig, FeedConfig, ReceiverConfig, StreamConfig};
pub use stream::{Action, StreamManager, StreamSnapshot, STALENESS_CHECK_PERIOD};
