//! Máquina de estados do stream de telemetria (sem I/O).
//!
//! O [`StreamManager`] recebe as operações do chamador (`start`/`stop`) e os
//! eventos do transporte e dos timers, e devolve [`Action`]s que o runtime
//! executa. Toda a lógica de reconexão, decodificação e obsolescência fica
//! aqui; o runtime só move bytes e arma timers.
//!
//! ```text
//!              start()                open
//! Disconnected ───────▶ Connecting ──────────▶ Connected
//!      ▲                    │                      │
//!      │  close (backoff)   │ error                │ error
//!      └────────────────────┴──────▶ Error ◀───────┘
//! ```

use crate::backoff::Backoff;
use crate::config::StreamConfig;
use crate::protocol::{Inbound, decode_envelope};
use crate::types::{ConnectionState, MotionCommand, SensorReading};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Período fixo da checagem de obsolescência.
pub const STALENESS_CHECK_PERIOD: Duration = Duration::from_secs(1);

/// Efeito colateral pedido ao runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Abre uma nova conexão (substituindo qualquer conexão anterior).
    Connect { url: String },
    /// Fecha a conexão atual e descarta seus eventos.
    Disconnect,
    ScheduleReconnect(Duration),
    CancelReconnect,
    StartStalenessCheck,
    StopStalenessCheck,
}

/// Cópia dos valores observáveis do stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSnapshot {
    pub state: ConnectionState,
    pub reading: Option<SensorReading>,
    pub command: Option<MotionCommand>,
    pub error: Option<String>,
    /// Instante da última mensagem aceita
    pub last_update: Option<Instant>,
    /// Instante em que a conexão atual abriu
    pub connected_since: Option<Instant>,
    pub is_stale: bool,
    pub reconnect_attempts: u32,
}

/// Gerenciador do stream de telemetria.
#[derive(Debug)]
pub struct StreamManager {
    url: String,
    stale_threshold: Duration,
    backoff: Backoff,
    out: StreamSnapshot,
    reconnect_pending: bool,
    staleness_running: bool,
    /// Setado por `stop()`; só `start()` limpa.
    stopped: bool,
}

impl StreamManager {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            url: config.url.clone(),
            stale_threshold: config.stale_threshold(),
            backoff: Backoff::new(config.reconnect_policy()),
            out: StreamSnapshot::default(),
            reconnect_pending: false,
            staleness_running: false,
            stopped: true,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        self.out.state
    }

    pub fn is_stale(&self) -> bool {
        self.out.is_stale
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            reconnect_attempts: self.backoff.attempts(),
            ..self.out.clone()
        }
    }

    // ── Operações do chamador ──

    /// Abre a conexão, a menos que já esteja conectando/conectado.
    ///
    /// Uma chamada explícita zera os contadores de reconexão, então também
    /// retoma o ciclo depois de esgotadas as tentativas.
    pub fn start(&mut self) -> Vec<Action> {
        if self.out.state.is_active() {
            debug!("start() ignorado: estado {}", self.out.state);
            return Vec::new();
        }

        let mut actions = Vec::new();
        if self.reconnect_pending {
            self.reconnect_pending = false;
            actions.push(Action::CancelReconnect);
        }
        self.stopped = false;
        self.backoff.reset();
        self.out.state = ConnectionState::Connecting;
        info!("Conectando a {}", self.url);
        actions.push(Action::Connect {
            url: self.url.clone(),
        });
        actions
    }

    /// Encerra tudo: timers, conexão e reconexões futuras.
    pub fn stop(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.reconnect_pending {
            self.reconnect_pending = false;
            actions.push(Action::CancelReconnect);
        }
        if self.staleness_running {
            self.staleness_running = false;
            actions.push(Action::StopStalenessCheck);
        }
        actions.push(Action::Disconnect);

        if !self.stopped {
            info!("Stream encerrado ({})", self.url);
        }
        self.stopped = true;
        self.backoff.reset();
        self.out.state = ConnectionState::Disconnected;
        self.out.connected_since = None;
        actions
    }

    // ── Eventos do transporte ──

    pub fn on_open(&mut self, now: Instant) -> Vec<Action> {
        if self.stopped || self.out.state != ConnectionState::Connecting {
            debug!("open ignorado: estado {}", self.out.state);
            return Vec::new();
        }

        self.out.state = ConnectionState::Connected;
        self.out.connected_since = Some(now);
        self.out.error = None;
        self.backoff.reset();
        info!("Conectado a {}", self.url);

        if self.staleness_running {
            return Vec::new();
        }
        self.staleness_running = true;
        vec![Action::StartStalenessCheck]
    }

    /// Processa um frame de texto. Envelopes são tratados em ordem de chegada.
    pub fn on_message(&mut self, text: &str, now: Instant) {
        if self.stopped {
            return;
        }

        let inbound = match decode_envelope(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!("Mensagem inválida de {}: {e}", self.url);
                self.out.error = Some(format!("Falha ao decodificar mensagem: {e}"));
                return;
            }
        };

        if inbound.is_accepted() {
            let last = self.out.last_update.map_or(now, |prev| prev.max(now));
            self.out.last_update = Some(last);
            self.out.is_stale = false;
        }

        match inbound {
            Inbound::Sensor(reading) => self.out.reading = Some(reading),
            Inbound::Motion(command) => self.out.command = Some(command),
            Inbound::RemoteError(message) => {
                warn!("Servidor reportou erro: {message}");
                self.out.error = Some(message);
            }
            Inbound::Dropped(kind) => debug!("Envelope {kind:?} incompleto descartado"),
            Inbound::Unknown(kind) => debug!("Tipo de envelope desconhecido: {kind:?}"),
        }
    }

    /// Falha de transporte. O fechamento vem em seguida via [`Self::on_close`].
    pub fn on_transport_error(&mut self, detail: &str) {
        if self.stopped {
            return;
        }
        warn!("Erro de transporte em {}: {detail}", self.url);
        self.out.state = ConnectionState::Error;
        self.out.connected_since = None;
        self.out.error = Some(format!("Não foi possível conectar a {}: {detail}", self.url));
    }

    pub fn on_close(&mut self) -> Vec<Action> {
        if self.stopped {
            return Vec::new();
        }
        self.out.state = ConnectionState::Disconnected;
        self.out.connected_since = None;

        match self.backoff.next_delay() {
            Some(delay) => {
                self.reconnect_pending = true;
                info!(
                    "Conexão fechada. Tentativa {}/{} em {} ms",
                    self.backoff.attempts(),
                    self.backoff.policy().max_attempts,
                    delay.as_millis()
                );
                vec![Action::ScheduleReconnect(delay)]
            }
            None => {
                let attempts = self.backoff.attempts();
                warn!("Reconexão a {} abandonada após {attempts} tentativas", self.url);
                self.out.error = Some(format!(
                    "Falha ao reconectar a {} após {attempts} tentativas",
                    self.url
                ));
                Vec::new()
            }
        }
    }

    // ── Timers ──

    pub fn on_reconnect_due(&mut self) -> Vec<Action> {
        if self.stopped || !self.reconnect_pending {
            return Vec::new();
        }
        self.reconnect_pending = false;
        if self.out.state.is_active() {
            return Vec::new();
        }

        self.out.state = ConnectionState::Connecting;
        debug!("Reconectando a {}", self.url);
        vec![Action::Connect {
            url: self.url.clone(),
        }]
    }

    pub fn on_staleness_tick(&mut self, now: Instant) {
        if !self.staleness_running {
            return;
        }
        let Some(last) = self.out.last_update else {
            return;
        };

        let stale = now.saturating_duration_since(last) >= self.stale_threshold;
        if stale && !self.out.is_stale {
            warn!(
                "Sem dados há {} ms (limite {} ms)",
                now.saturating_duration_since(last).as_millis(),
                self.stale_threshold.as_millis()
            );
        }
        self.out.is_stale = stale;
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
