//! # Telemetria Receiver
//!
//! Cliente do stream de sensores: mantém uma única conexão WebSocket com o
//! servidor de push, decodifica os envelopes e reconecta sozinho com
//! backoff exponencial.
//!
//! ```no_run
//! use telemetry_core::config::StreamConfig;
//! use telemetry_receiver::StreamClient;
//!
//! let client = StreamClient::spawn(StreamConfig::default())?;
//! let snap = client.snapshot();
//! println!("{} stale={}", snap.state, snap.is_stale);
//! client.stop()?;
//! # Ok::<(), telemetry_receiver::ClientError>(())
//! ```

pub mod net_thread;
mod transport;

pub use net_thread::{ClientError, StreamClient};
