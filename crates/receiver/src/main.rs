//! # Telemetria Receiver
//!
//! Console headless que assina o stream de sensores e registra no log o
//! estado da conexão, a última leitura da IMU e o último comando de
//! movimento.
//!
//! ## Uso
//! ```bash
//! telemetry_receiver                                  # config.toml ao lado do executável
//! telemetry_receiver --url ws://10.0.0.5:8765/ws/sensor
//! telemetry_receiver --duration-secs 30               # encerra após 30 s
//! ```

use clap::Parser;
use crossbeam_channel::{after, never, select, tick};
use std::path::PathBuf;
use std::time::Duration;
use telemetry_core::config::AppConfig;
use telemetry_core::stream::StreamSnapshot;
use telemetry_receiver::StreamClient;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "telemetry_receiver", about = "Cliente do stream de sensores Telemetria")]
struct Args {
    /// Caminho do config.toml (padrão: ao lado do executável)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sobrescreve a URL do endpoint de push
    #[arg(long)]
    url: Option<String>,

    /// Encerra após N segundos (padrão: roda até ser interrompido)
    #[arg(long)]
    duration_secs: Option<u64>,
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

    // ── Config ──
    let config_path = args.config.unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path);

    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }
    if let Some(url) = args.url {
        config.stream.url = url;
    }
    for problem in config.validate() {
        warn!("Config: {problem}");
    }

    // ── Cliente ──
    let client = match StreamClient::spawn(config.stream.clone()) {
        Ok(client) => client,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };
    if !config.stream.auto_connect {
        info!("auto_connect desativado; conectando sob demanda");
        if let Err(e) = client.start() {
            error!("{e}");
            std::process::exit(1);
        }
    }

    let updates = match client.subscribe() {
        Ok(rx) => rx,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let report = tick(Duration::from_secs_f64(config.receiver.report_interval_secs.max(0.1)));
    let deadline = args
        .duration_secs
        .map(|s| after(Duration::from_secs(s)))
        .unwrap_or_else(never);

    info!("Receiver ativo → {}", config.stream.url);

    // ── Loop principal ──
    let mut last_state = None;
    let mut last_error: Option<String> = None;
    loop {
        let wakeup = select! {
            recv(updates) -> snap => Wakeup::Update(snap.ok()),
            recv(report) -> _ => Wakeup::Report,
            recv(deadline) -> _ => Wakeup::Deadline,
        };

        match wakeup {
            Wakeup::Update(Some(snap)) => {
                if last_state != Some(snap.state) {
                    info!("Estado: {}", snap.state);
                    last_state = Some(snap.state);
                }
                if snap.error.is_some() && snap.error != last_error {
                    warn!("Erro: {}", snap.error.as_deref().unwrap_or_default());
                }
                last_error = snap.error;
            }
            Wakeup::Report => log_report(&client.snapshot()),
            Wakeup::Update(None) | Wakeup::Deadline => break,
        }
    }

    if let Err(e) = client.stop() {
        warn!("{e}");
    }
    info!("Receiver encerrado");
}

enum Wakeup {
    Update(Option<StreamSnapshot>),
    Report,
    Deadline,
}

fn log_report(snap: &StreamSnapshot) {
    let age = snap
        .last_update
        .map(|t| format!("{} ms", t.elapsed().as_millis()))
        .unwrap_or_else(|| "—".into());
    let uptime = snap
        .connected_since
        .map(|t| format!(" | conectado há {}s", t.elapsed().as_secs()))
        .unwrap_or_default();

    match &snap.reading {
        Some(r) => info!(
            "[{}] acc ({:.2}, {:.2}, {:.2}) | gyro ({:.1}, {:.1}, {:.1}) | ang ({:.1}, {:.1}, {:.1}) | {:.1}°C | bat {:.0}% | idade {age}{uptime}{}",
            snap.state,
            r.acceleration.x,
            r.acceleration.y,
            r.acceleration.z,
            r.angular_velocity.x,
            r.angular_velocity.y,
            r.angular_velocity.z,
            r.angles.x,
            r.angles.y,
            r.angles.z,
            r.temperature,
            r.battery,
            if snap.is_stale { " | OBSOLETO" } else { "" }
        ),
        None => info!(
            "[{}] sem leituras | tentativas {}{uptime}",
            snap.state, snap.reconnect_attempts
        ),
    }

    if let Some(cmd) = &snap.command {
        info!(
            "  comando {} ({}) | intensidade {:.2} | angular {:.2}{}",
            cmd.command,
            if cmd.raw_direction.is_empty() { "-" } else { cmd.raw_direction.as_str() },
            cmd.intensity,
            cmd.angular_intensity,
            if cmd.is_motion_start { " | início" } else { "" }
        );
    }
}
