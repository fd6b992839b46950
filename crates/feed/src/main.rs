//! # Telemetria Feed
//!
//! Servidor WebSocket que emite leituras sintéticas da IMU (`sensor_data`)
//! e os comandos de movimento derivados delas (`motion_command`) em
//! intervalo fixo, para todos os clientes conectados.
//!
//! ## Uso
//! ```bash
//! telemetry_feed                      # config.toml ao lado do executável
//! telemetry_feed --port 9000 --interval-secs 0.05
//! ```

mod hub;
mod synth;

use clap::Parser;
use hub::ClientHub;
use std::net::TcpListener;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use synth::SyntheticImu;
use telemetry_core::config::AppConfig;
use telemetry_core::motion::{MotionDetector, MotionThresholds};
use telemetry_core::protocol::{Outbound, encode_envelope};
use telemetry_core::types::Timestamp;
use tracing::{debug, error, info, warn};

/// Intervalo entre logs de status.
const STATUS_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "telemetry_feed", about = "Servidor de push de sensores Telemetria")]
struct Args {
    /// Caminho do config.toml (padrão: ao lado do executável)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sobrescreve a porta do WebSocket
    #[arg(long)]
    port: Option<u16>,

    /// Sobrescreve o intervalo de envio (segundos)
    #[arg(long)]
    interval_secs: Option<f64>,
}

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    // ── Carregar config ──
    let config_path = args.config.unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }
    if let Some(port) = args.port {
        config.feed.port = port;
    }
    if let Some(interval) = args.interval_secs {
        config.feed.interval_secs = interval;
    }
    for problem in config.validate() {
        warn!("Config: {problem}");
    }

    let feed_cfg = &config.feed;
    let bind_addr = format!("{}:{}", feed_cfg.bind_ip, feed_cfg.port);
    let interval = Duration::from_secs_f64(feed_cfg.interval_secs.max(0.01));

    // ── Listener WebSocket ──
    let listener = match TcpListener::bind(&bind_addr) {
        Ok(l) => l,
        Err(e) => {
            error!("Falha ao bind {bind_addr}: {e}");
            std::process::exit(1);
        }
    };
    let hub = ClientHub::new();
    if let Err(e) = hub.spawn_acceptor(listener) {
        error!("Falha ao criar thread de accept: {e}");
        std::process::exit(1);
    }

    let imu = SyntheticImu::default();
    let mut detector = MotionDetector::new(MotionThresholds::from(feed_cfg));

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⚡ TELEMETRIA FEED – ATIVO (Rust)");
    println!("══════════════════════════════════════════════");
    println!("  Endpoint:  ws://{bind_addr}/");
    println!("  Intervalo: {:.2}s", feed_cfg.interval_secs);
    println!("  Protocolo: envelopes JSON (sensor_data / motion_command / error)");
    println!("══════════════════════════════════════════════");
    println!();

    // ── Loop principal ──
    let started = Instant::now();
    let mut last_status = Instant::now();
    loop {
        let cycle_start = Instant::now();
        if last_status.elapsed() >= STATUS_INTERVAL {
            info!("{} clientes conectados", hub.len());
            last_status = cycle_start;
        }

        let reading = imu.collect(started.elapsed().as_secs_f64(), epoch_ms());
        let command = detector.derive(&reading);
        if command.is_motion_start {
            info!("Movimento iniciado: {} ({})", command.command, command.raw_direction);
        }

        let envelopes = [
            Outbound::SensorData {
                timestamp: reading.timestamp.clone(),
                data: reading,
            },
            Outbound::MotionCommand {
                timestamp: command.timestamp.clone(),
                data: command,
            },
        ];
        for envelope in &envelopes {
            match encode_envelope(envelope) {
                Ok(text) => {
                    let clients = hub.broadcast(&text);
                    debug!("→ {} bytes para {clients} clientes", text.len());
                }
                Err(e) => {
                    error!("Erro ao serializar envelope: {e}");
                    // Avisa os clientes; a conexão segue aberta
                    let notice = Outbound::error(Timestamp::Millis(epoch_ms()), e.to_string());
                    if let Ok(text) = encode_envelope(&notice) {
                        hub.broadcast(&text);
                    }
                }
            }
        }

        // Dormir pelo tempo restante do intervalo
        let elapsed = cycle_start.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        }
    }
}

fn epoch_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or_default()
}
