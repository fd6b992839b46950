//! Thread de rede: loop de eventos que dirige o [`StreamManager`].
//!
//! Um único thread consome, um de cada vez e em ordem de chegada, os
//! comandos do chamador, os eventos do transporte e os dois timers
//! (reconexão e obsolescência). Cancelar um timer é trocá-lo por
//! `never()` dentro do próprio loop, então nada dispara depois que
//! [`StreamClient::stop`] retorna.

use crate::transport::{Connection, TaggedEvent, TransportEvent};
use crossbeam_channel::{Receiver, Sender, TrySendError, after, bounded, never, select, tick, unbounded};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use telemetry_core::config::StreamConfig;
use telemetry_core::stream::{Action, STALENESS_CHECK_PERIOD, StreamManager, StreamSnapshot};
use tracing::{debug, info, warn};

/// Capacidade do canal de cada assinante.
const SUBSCRIBER_BUFFER: usize = 64;

/// Erros do cliente.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Falha ao criar thread de rede: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Loop de eventos encerrado")]
    Closed,
}

enum Command {
    Start(Sender<()>),
    Stop(Sender<()>),
    Subscribe(Sender<StreamSnapshot>),
    Shutdown,
}

/// Cliente do stream de telemetria.
///
/// Dono exclusivo da conexão; leituras de estado nunca bloqueiam o loop.
pub struct StreamClient {
    commands: Sender<Command>,
    shared: Arc<RwLock<StreamSnapshot>>,
    thread: Option<JoinHandle<()>>,
}

impl StreamClient {
    /// Inicia o loop de eventos. Com `auto_connect`, já dispara `start()`.
    pub fn spawn(config: StreamConfig) -> Result<Self, ClientError> {
        let (cmd_tx, cmd_rx) = unbounded::<Command>();
        let (event_tx, event_rx) = unbounded::<TaggedEvent>();
        let shared = Arc::new(RwLock::new(StreamSnapshot::default()));

        let event_loop = EventLoop {
            manager: StreamManager::new(&config),
            connect_timeout: config.connect_timeout(),
            commands: cmd_rx,
            event_tx,
            event_rx,
            connection: None,
            generation: 0,
            reconnect_timer: never(),
            staleness_timer: never(),
            shared: Arc::clone(&shared),
            subscribers: Vec::new(),
        };

        let thread = std::thread::Builder::new()
            .name("stream-client".into())
            .spawn(move || event_loop.run())?;

        let client = Self {
            commands: cmd_tx,
            shared,
            thread: Some(thread),
        };

        if config.auto_connect {
            client.start()?;
        }
        Ok(client)
    }

    /// Abre a conexão (no-op se já conectando/conectado).
    pub fn start(&self) -> Result<(), ClientError> {
        self.round_trip(Command::Start)
    }

    /// Fecha a conexão, cancela timers e suprime reconexões.
    ///
    /// Quando retorna, nenhum timer ou handler antigo dispara mais.
    pub fn stop(&self) -> Result<(), ClientError> {
        self.round_trip(Command::Stop)
    }

    /// Leitura não-bloqueante do último estado publicado.
    pub fn snapshot(&self) -> StreamSnapshot {
        self.shared
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Canal que recebe o estado atual e cada mudança seguinte.
    ///
    /// Assinante lento perde atualizações em vez de travar o loop.
    pub fn subscribe(&self) -> Result<Receiver<StreamSnapshot>, ClientError> {
        let (tx, rx) = bounded(SUBSCRIBER_BUFFER);
        self.commands
            .send(Command::Subscribe(tx))
            .map_err(|_| ClientError::Closed)?;
        Ok(rx)
    }

    fn round_trip(&self, make: fn(Sender<()>) -> Command) -> Result<(), ClientError> {
        let (ack_tx, ack_rx) = bounded(1);
        self.commands
            .send(make(ack_tx))
            .map_err(|_| ClientError::Closed)?;
        ack_rx.recv().map_err(|_| ClientError::Closed)
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Thread do stream terminou com pânico");
            }
        }
    }
}

// ──────────────────────────────────────────────
// Loop de eventos
// ──────────────────────────────────────────────

enum Wakeup {
    Command(Option<Command>),
    Transport(Option<TaggedEvent>),
    ReconnectDue,
    StalenessTick,
}

struct EventLoop {
    manager: StreamManager,
    connect_timeout: Duration,
    commands: Receiver<Command>,
    event_tx: Sender<TaggedEvent>,
    event_rx: Receiver<TaggedEvent>,
    connection: Option<Connection>,
    /// Geração da conexão atual; eventos de outras gerações são descartados.
    generation: u64,
    reconnect_timer: Receiver<Instant>,
    staleness_timer: Receiver<Instant>,
    shared: Arc<RwLock<StreamSnapshot>>,
    subscribers: Vec<Sender<StreamSnapshot>>,
}

impl EventLoop {
    fn run(mut self) {
        info!("Loop do stream iniciado ({})", self.manager.url());

        loop {
            let wakeup = select! {
                recv(self.commands) -> cmd => Wakeup::Command(cmd.ok()),
                recv(self.event_rx) -> ev => Wakeup::Transport(ev.ok()),
                recv(self.reconnect_timer) -> _ => Wakeup::ReconnectDue,
                recv(self.staleness_timer) -> _ => Wakeup::StalenessTick,
            };

            match wakeup {
                Wakeup::Command(Some(Command::Start(ack))) => {
                    let actions = self.manager.start();
                    self.apply(actions);
                    self.publish();
                    let _ = ack.send(());
                }
                Wakeup::Command(Some(Command::Stop(ack))) => {
                    let actions = self.manager.stop();
                    self.apply(actions);
                    self.publish();
                    let _ = ack.send(());
                }
                Wakeup::Command(Some(Command::Subscribe(tx))) => {
                    let _ = tx.try_send(self.manager.snapshot());
                    self.subscribers.push(tx);
                }
                Wakeup::Command(Some(Command::Shutdown) | None) => {
                    let actions = self.manager.stop();
                    self.apply(actions);
                    self.publish();
                    break;
                }
                Wakeup::Transport(Some((generation, event))) => {
                    if generation == self.generation {
                        self.handle_transport(event);
                    } else {
                        debug!("Evento de conexão antiga descartado (geração {generation})");
                    }
                }
                // O loop guarda um Sender próprio, então o canal nunca desconecta
                Wakeup::Transport(None) => {}
                Wakeup::ReconnectDue => {
                    self.reconnect_timer = never();
                    let actions = self.manager.on_reconnect_due();
                    self.apply(actions);
                }
                Wakeup::StalenessTick => self.manager.on_staleness_tick(Instant::now()),
            }

            self.publish();
        }

        info!("Loop do stream encerrado");
    }

    fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                let actions = self.manager.on_open(Instant::now());
                self.apply(actions);
            }
            TransportEvent::Message(text) => self.manager.on_message(&text, Instant::now()),
            TransportEvent::Error(detail) => self.manager.on_transport_error(&detail),
            TransportEvent::Closed => {
                // A thread leitora já saiu; só solta o handle
                self.connection = None;
                let actions = self.manager.on_close();
                self.apply(actions);
            }
        }
    }

    fn apply(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Connect { url } => self.connect(url),
                Action::Disconnect => self.disconnect(),
                Action::ScheduleReconnect(delay) => self.reconnect_timer = after(delay),
                Action::CancelReconnect => self.reconnect_timer = never(),
                Action::StartStalenessCheck => self.staleness_timer = tick(STALENESS_CHECK_PERIOD),
                Action::StopStalenessCheck => self.staleness_timer = never(),
            }
        }
    }

    fn connect(&mut self, url: String) {
        self.disconnect();
        match Connection::open(url, self.generation, self.connect_timeout, self.event_tx.clone()) {
            Ok(conn) => self.connection = Some(conn),
            Err(e) => {
                warn!("Falha ao criar thread de conexão: {e}");
                self.manager.on_transport_error(&e.to_string());
                let actions = self.manager.on_close();
                self.apply(actions);
            }
        }
    }

    /// Desanexa a conexão atual: eventos já enfileirados dela viram lixo.
    fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
        }
        self.generation += 1;
    }

    fn publish(&mut self) {
        let snapshot = self.manager.snapshot();
        {
            let mut current = self.shared.write().unwrap_or_else(PoisonError::into_inner);
            if *current == snapshot {
                return;
            }
            *current = snapshot.clone();
        }

        self.subscribers.retain(|tx| match tx.try_send(snapshot.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Assinante cheio, descartando atualização");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}
