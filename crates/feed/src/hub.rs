//! Hub de clientes WebSocket: aceita conexões e faz broadcast de frames.

use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};
use tungstenite::{Message, WebSocket};

/// Tempo máximo de escrita antes de considerar o cliente morto.
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Tempo máximo para o cliente completar o handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

struct Peer {
    addr: String,
    socket: WebSocket<TcpStream>,
}

/// Conjunto de clientes conectados, compartilhado com a thread de accept.
#[derive(Clone, Default)]
pub struct ClientHub {
    peers: Arc<Mutex<Vec<Peer>>>,
}

impl ClientHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Inicia a thread que aceita conexões no `listener`.
    pub fn spawn_acceptor(&self, listener: TcpListener) -> std::io::Result<()> {
        let hub = self.clone();
        std::thread::Builder::new()
            .name("ws-acceptor".into())
            .spawn(move || hub.accept_loop(&listener))?;
        Ok(())
    }

    fn accept_loop(&self, listener: &TcpListener) {
        for stream in listener.incoming() {
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    warn!("Falha no accept: {e}");
                    continue;
                }
            };
            let addr = stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "?".into());

            // Handshake fora da thread de accept: um peer mudo não trava os outros
            let hub = self.clone();
            let spawned = std::thread::Builder::new()
                .name("ws-handshake".into())
                .spawn(move || hub.handshake(stream, addr));
            if let Err(e) = spawned {
                warn!("Falha ao criar thread de handshake: {e}");
            }
        }
    }

    fn handshake(&self, stream: TcpStream, addr: String) {
        if let Err(e) = stream
            .set_write_timeout(Some(WRITE_TIMEOUT))
            .and_then(|()| stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT)))
        {
            debug!("Não foi possível ajustar timeouts para {addr}: {e}");
        }

        let socket = match tungstenite::accept(stream) {
            Ok(socket) => socket,
            Err(e) => {
                warn!("Handshake WebSocket falhou com {addr}: {e}");
                return;
            }
        };
        if let Err(e) = socket.get_ref().set_read_timeout(None) {
            debug!("Não foi possível limpar timeout de leitura para {addr}: {e}");
        }

        let mut peers = self.peers.lock().unwrap_or_else(PoisonError::into_inner);
        peers.push(Peer {
            addr: addr.clone(),
            socket,
        });
        info!("Cliente conectado: {addr} ({} ativos)", peers.len());
    }

    /// Envia `text` a todos os clientes; remove os que falharem.
    pub fn broadcast(&self, text: &str) -> usize {
        let mut peers = self.peers.lock().unwrap_or_else(PoisonError::into_inner);
        peers.retain_mut(|peer| match peer.socket.send(Message::Text(text.to_owned())) {
            Ok(()) => true,
            Err(e) => {
                info!("Cliente desconectado: {} ({e})", peer.addr);
                false
            }
        });
        peers.len()
    }
}
