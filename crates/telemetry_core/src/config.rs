//! Configuração unificada via TOML.
//!
//! Um único `config.toml` com as tabelas `[stream]`, `[receiver]` e `[feed]`.
//! Todos os campos são opcionais e caem no valor padrão.

use crate::backoff::ReconnectPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Configuração do gerenciador de stream (cliente).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// URL do endpoint de push (ws://host:porta/caminho)
    pub url: String,
    /// Conecta automaticamente ao iniciar
    pub auto_connect: bool,
    /// Atraso inicial de reconexão (ms)
    pub reconnect_delay_ms: u64,
    /// Atraso máximo de reconexão (ms)
    pub max_reconnect_delay_ms: u64,
    /// Número máximo de tentativas de reconexão
    pub max_reconnect_attempts: u32,
    /// Tempo sem mensagens até marcar dados como obsoletos (ms)
    pub stale_threshold_ms: u64,
    /// Limite para conexão TCP + handshake WebSocket (ms)
    pub connect_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8765/ws/sensor".into(),
            auto_connect: true,
            reconnect_delay_ms: 1000,
            max_reconnect_delay_ms: 30_000,
            max_reconnect_attempts: 10,
            stale_threshold_ms: 2000,
            connect_timeout_ms: 5000,
        }
    }
}

impl StreamConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial: Duration::from_millis(self.reconnect_delay_ms),
            max: Duration::from_millis(self.max_reconnect_delay_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_millis(self.stale_threshold_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Configuração do Receiver (console).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Intervalo entre relatórios de estado no log (segundos)
    pub report_interval_secs: f64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 1.0,
        }
    }
}

/// Configuração do servidor de feed sintético.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// IP local para bind
    pub bind_ip: String,
    /// Porta TCP do WebSocket
    pub port: u16,
    /// Intervalo de envio em segundos
    pub interval_secs: f64,
    /// Zona morta de inclinação (°) abaixo da qual o comando é "stop"
    pub tilt_dead_zone_deg: f64,
    /// Inclinação (°) que corresponde a intensidade 1.0
    pub tilt_max_deg: f64,
    /// Velocidade angular de yaw (°/s) mínima para rotação
    pub yaw_rate_threshold: f64,
    /// Velocidade angular de yaw (°/s) que corresponde a intensidade 1.0
    pub yaw_rate_max: f64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            bind_ip: "127.0.0.1".into(),
            port: 8765,
            interval_secs: 0.1,
            tilt_dead_zone_deg: 10.0,
            tilt_max_deg: 45.0,
            yaw_rate_threshold: 30.0,
            yaw_rate_max: 180.0,
        }
    }
}

/// Configuração raiz do aplicativo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub stream: StreamConfig,
    pub receiver: ReceiverConfig,
    pub feed: FeedConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self).map_err(|e| e.to_string())?;
        std::fs::write(path, content).map_err(|e| e.to_string())?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let stream = &self.stream;

        if !(stream.url.starts_with("ws://") || stream.url.starts_with("wss://")) {
            errors.push(format!("URL do stream inválida: {} (ws:// ou wss://)", stream.url));
        }
        if stream.reconnect_delay_ms == 0 {
            errors.push("Atraso de reconexão não pode ser 0".into());
        }
        if stream.max_reconnect_delay_ms < stream.reconnect_delay_ms {
            errors.push(format!(
                "Atraso máximo ({} ms) menor que o inicial ({} ms)",
                stream.max_reconnect_delay_ms, stream.reconnect_delay_ms
            ));
        }
        if stream.stale_threshold_ms == 0 {
            errors.push("Limite de obsolescência não pode ser 0".into());
        }
        if stream.connect_timeout_ms == 0 {
            errors.push("Timeout de conexão não pode ser 0".into());
        }
        if self.receiver.report_interval_secs < 0.1 || self.receiver.report_interval_secs > 60.0 {
            errors.push(format!(
                "Intervalo de relatório inválido: {} (0.1–60.0)",
                self.receiver.report_interval_secs
            ));
        }
        if self.feed.port == 0 {
            errors.push("Porta do feed não pode ser 0".into());
        }
        if self.feed.interval_secs < 0.01 || self.feed.interval_secs > 60.0 {
            errors.push(format!(
                "Intervalo do feed inválido: {} (0.01–60.0)",
                self.feed.interval_secs
            ));
        }
        if self.feed.tilt_max_deg <= self.feed.tilt_dead_zone_deg {
            errors.push("tilt_max_deg deve ser maior que tilt_dead_zone_deg".into());
        }
        if self.feed.yaw_rate_max <= self.feed.yaw_rate_threshold {
            errors.push("yaw_rate_max deve ser maior que yaw_rate_threshold".into());
        }

        errors
    }
}
