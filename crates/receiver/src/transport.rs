//! Conexão WebSocket em thread própria.
//!
//! Cada conexão recebe um número de geração; todos os eventos que ela emite
//! carregam esse número, e o loop de eventos descarta os de gerações
//! antigas. Fechar uma conexão só sinaliza a thread leitora, que percebe o
//! cancelamento no próximo timeout de leitura. Conexão TCP e handshake são
//! limitados por um timeout, então uma thread antiga nunca segura um socket
//! por mais que isso depois de cancelada.

use crossbeam_channel::Sender;
use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info};
use tungstenite::client::IntoClientRequest;
use tungstenite::{Message, WebSocket};

/// Intervalo em que a thread leitora checa o cancelamento.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Evento emitido pela thread leitora.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TransportEvent {
    Opened,
    Message(String),
    Error(String),
    Closed,
}

pub(crate) type TaggedEvent = (u64, TransportEvent);

/// Handle de uma conexão aberta (ou em abertura).
pub(crate) struct Connection {
    generation: u64,
    cancel: Arc<AtomicBool>,
    _thread: JoinHandle<()>,
}

impl Connection {
    pub(crate) fn open(
        url: String,
        generation: u64,
        connect_timeout: Duration,
        events: Sender<TaggedEvent>,
    ) -> std::io::Result<Self> {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);

        let thread = std::thread::Builder::new()
            .name(format!("ws-reader-{generation}"))
            .spawn(move || reader_loop(&url, generation, connect_timeout, &flag, &events))?;

        Ok(Self {
            generation,
            cancel,
            _thread: thread,
        })
    }

    /// Pede o fechamento. A thread sai sozinha; nenhum evento dela é mais aceito.
    pub(crate) fn close(self) {
        debug!("Fechando conexão (geração {})", self.generation);
        self.cancel.store(true, Ordering::Release);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Release);
    }
}

fn reader_loop(
    url: &str,
    generation: u64,
    connect_timeout: Duration,
    cancel: &AtomicBool,
    events: &Sender<TaggedEvent>,
) {
    let emit = |event: TransportEvent| {
        // Receptor fora do ar: o loop de eventos já encerrou
        let _ = events.send((generation, event));
    };

    let mut socket = match open_socket(url, connect_timeout) {
        Ok(socket) => socket,
        Err(e) => {
            emit(TransportEvent::Error(e));
            emit(TransportEvent::Closed);
            return;
        }
    };

    if cancel.load(Ordering::Acquire) {
        let _ = socket.close(None);
        return;
    }

    if let Err(e) = socket.get_ref().set_read_timeout(Some(POLL_INTERVAL)) {
        debug!("Não foi possível ajustar timeout de leitura: {e}");
    }
    info!("WebSocket aberto: {url}");
    emit(TransportEvent::Opened);

    loop {
        if cancel.load(Ordering::Acquire) {
            let _ = socket.close(None);
            let _ = socket.flush();
            return;
        }

        match socket.read() {
            Ok(Message::Text(text)) => emit(TransportEvent::Message(text)),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => emit(TransportEvent::Message(text)),
                Err(_) => debug!("Frame binário não-UTF-8 ignorado"),
            },
            Ok(Message::Close(frame)) => {
                debug!("Servidor pediu fechamento: {frame:?}");
            }
            // Ping/Pong são respondidos pelo próprio tungstenite
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
            {
                // Timeout normal, continua
            }
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                emit(TransportEvent::Closed);
                return;
            }
            Err(e) => {
                emit(TransportEvent::Error(e.to_string()));
                emit(TransportEvent::Closed);
                return;
            }
        }
    }
}

/// Conecta e faz o handshake, cada etapa limitada por `timeout`.
///
/// Só `ws://` é suportado: o build não inclui TLS.
fn open_socket(url: &str, timeout: Duration) -> Result<WebSocket<TcpStream>, String> {
    let request = url.into_client_request().map_err(|e| e.to_string())?;
    let uri = request.uri();
    if uri.scheme_str() != Some("ws") {
        return Err(format!("Esquema não suportado em {url} (apenas ws://)"));
    }
    let host = uri
        .host()
        .ok_or_else(|| format!("URL sem host: {url}"))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_owned();
    let port = uri.port_u16().unwrap_or(80);

    let addrs = (host.as_str(), port)
        .to_socket_addrs()
        .map_err(|e| format!("{host}: {e}"))?;

    let mut last_error = None;
    for addr in addrs {
        let stream = match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => stream,
            Err(e) => {
                debug!("Falha ao conectar em {addr}: {e}");
                last_error = Some(e);
                continue;
            }
        };
        stream
            .set_read_timeout(Some(timeout))
            .and_then(|()| stream.set_write_timeout(Some(timeout)))
            .map_err(|e| e.to_string())?;
        let (socket, _response) = tungstenite::client(request, stream).map_err(|e| e.to_string())?;
        return Ok(socket);
    }

    Err(last_error.map_or_else(|| format!("Nenhum endereço para {host}"), |e| e.to_string()))
}
