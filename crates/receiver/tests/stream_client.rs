//! Testes do cliente contra um servidor WebSocket local.

use serde_json::json;
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use telemetry_core::config::StreamConfig;
use telemetry_core::stream::StreamSnapshot;
use telemetry_core::types::{ConnectionState, MotionToken, SensorReading, Timestamp, Vector3};
use telemetry_receiver::StreamClient;
use tungstenite::Message;

/// Roteiro de uma conexão aceita pelo servidor de teste.
#[derive(Clone)]
enum Session {
    /// Envia os frames e mantém a conexão aberta.
    Hold(Vec<String>),
    /// Envia os frames e fecha.
    HangUp(Vec<String>),
}

struct FeedServer {
    url: String,
    accepted: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
}

impl FeedServer {
    /// Conexões além do roteiro recebem `Hold` sem frames.
    fn spawn(sessions: Vec<Session>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let url = format!("ws://{}/ws/sensor", listener.local_addr().unwrap());
        let accepted = Arc::new(AtomicUsize::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));

        let count = Arc::clone(&accepted);
        let stop = Arc::clone(&shutdown);
        thread::spawn(move || {
            while !stop.load(Ordering::Acquire) {
                let Ok((stream, _)) = listener.accept() else {
                    thread::sleep(Duration::from_millis(10));
                    continue;
                };
                stream.set_nonblocking(false).unwrap();
                let index = count.fetch_add(1, Ordering::AcqRel);
                let session = sessions
                    .get(index)
                    .cloned()
                    .unwrap_or(Session::Hold(Vec::new()));
                let stop = Arc::clone(&stop);
                thread::spawn(move || {
                    let Ok(mut ws) = tungstenite::accept(stream) else {
                        return;
                    };
                    let (frames, hold) = match session {
                        Session::Hold(f) => (f, true),
                        Session::HangUp(f) => (f, false),
                    };
                    for frame in frames {
                        if ws.send(Message::Text(frame)).is_err() {
                            return;
                        }
                    }
                    if hold {
                        while !stop.load(Ordering::Acquire) {
                            thread::sleep(Duration::from_millis(20));
                        }
                    }
                    let _ = ws.close(None);
                    let _ = ws.get_ref().set_read_timeout(Some(Duration::from_secs(1)));
                    while ws.read().is_ok() {}
                });
            }
        });

        Self {
            url,
            accepted,
            shutdown,
        }
    }

    fn accepted(&self) -> usize {
        self.accepted.load(Ordering::Acquire)
    }
}

impl Drop for FeedServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

fn sensor_frame(battery: Option<f64>) -> String {
    let mut data = json!({
        "acceleration": {"x": 1, "y": 2, "z": 3},
        "angularVelocity": {"x": 0, "y": 0, "z": 0},
        "angles": {"x": 0, "y": 0, "z": 0}
    });
    if let Some(b) = battery {
        data["battery"] = json!(b);
    }
    json!({"type": "sensor_data", "timestamp": 1234, "data": data}).to_string()
}

fn motion_frame() -> String {
    json!({
        "type": "motion_command",
        "timestamp": 1235,
        "data": {"command": "forward", "intensity": 0.5, "angularIntensity": 0.0}
    })
    .to_string()
}

fn config(url: &str) -> StreamConfig {
    StreamConfig {
        url: url.into(),
        reconnect_delay_ms: 50,
        max_reconnect_delay_ms: 200,
        ..Default::default()
    }
}

fn unused_port_url() -> String {
    let port = TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .unwrap()
        .port();
    format!("ws://127.0.0.1:{port}/ws/sensor")
}

fn wait_until(
    client: &StreamClient,
    timeout: Duration,
    pred: impl Fn(&StreamSnapshot) -> bool,
) -> StreamSnapshot {
    let deadline = Instant::now() + timeout;
    loop {
        let snap = client.snapshot();
        if pred(&snap) {
            return snap;
        }
        assert!(
            Instant::now() < deadline,
            "condição não atingida; último snapshot: {snap:?}"
        );
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn receives_reading_and_command() {
    let server = FeedServer::spawn(vec![Session::Hold(vec![sensor_frame(None), motion_frame()])]);
    let client = StreamClient::spawn(config(&server.url)).unwrap();

    let snap = wait_until(&client, Duration::from_secs(5), |s| {
        s.reading.is_some() && s.command.is_some()
    });
    assert_eq!(snap.state, ConnectionState::Connected);
    assert_eq!(
        snap.reading,
        Some(SensorReading {
            acceleration: Vector3::new(1.0, 2.0, 3.0),
            angular_velocity: Vector3::default(),
            angles: Vector3::default(),
            temperature: 0.0,
            battery: 0.0,
            timestamp: Timestamp::Millis(1234.0),
        })
    );
    assert_eq!(snap.command.unwrap().command, MotionToken::Forward);
    assert!(snap.last_update.is_some());

    client.stop().unwrap();
    assert_eq!(client.snapshot().state, ConnectionState::Disconnected);
}

#[test]
fn malformed_frame_keeps_connection() {
    let server = FeedServer::spawn(vec![Session::Hold(vec!["not json".into()])]);
    let client = StreamClient::spawn(config(&server.url)).unwrap();

    let snap = wait_until(&client, Duration::from_secs(5), |s| s.error.is_some());
    assert_eq!(snap.state, ConnectionState::Connected);
    assert!(snap.reading.is_none());
}

#[test]
fn becomes_stale_when_feed_goes_quiet() {
    let server = FeedServer::spawn(vec![Session::Hold(vec![sensor_frame(None)])]);
    let client = StreamClient::spawn(StreamConfig {
        stale_threshold_ms: 200,
        ..config(&server.url)
    })
    .unwrap();

    wait_until(&client, Duration::from_secs(5), |s| s.reading.is_some());
    // Limite + um período de checagem, com folga
    let snap = wait_until(&client, Duration::from_secs(3), |s| s.is_stale);
    assert_eq!(snap.state, ConnectionState::Connected);
}

#[test]
fn start_is_idempotent_while_connected() {
    let server = FeedServer::spawn(vec![]);
    let client = StreamClient::spawn(config(&server.url)).unwrap();
    wait_until(&client, Duration::from_secs(5), |s| {
        s.state == ConnectionState::Connected
    });

    client.start().unwrap();
    client.start().unwrap();
    thread::sleep(Duration::from_millis(300));
    assert_eq!(server.accepted(), 1);
    assert_eq!(client.snapshot().state, ConnectionState::Connected);
}

#[test]
fn reconnects_after_server_hangup() {
    let server = FeedServer::spawn(vec![
        Session::HangUp(vec![sensor_frame(Some(10.0))]),
        Session::Hold(vec![sensor_frame(Some(55.0))]),
    ]);
    let client = StreamClient::spawn(config(&server.url)).unwrap();

    let snap = wait_until(&client, Duration::from_secs(5), |s| {
        s.state == ConnectionState::Connected
            && s.reading.as_ref().is_some_and(|r| r.battery == 55.0)
    });
    assert_eq!(snap.reconnect_attempts, 0, "contador zera ao reabrir");
    assert_eq!(server.accepted(), 2);
}

#[test]
fn gives_up_after_max_attempts() {
    let client = StreamClient::spawn(StreamConfig {
        reconnect_delay_ms: 10,
        max_reconnect_delay_ms: 40,
        max_reconnect_attempts: 3,
        ..config(&unused_port_url())
    })
    .unwrap();

    let snap = wait_until(&client, Duration::from_secs(5), |s| {
        s.error.as_deref().is_some_and(|e| e.contains("após 3 tentativas"))
    });
    assert_eq!(snap.reconnect_attempts, 3);
    assert_eq!(snap.state, ConnectionState::Disconnected);

    thread::sleep(Duration::from_millis(200));
    let later = client.snapshot();
    assert_eq!(later.state, ConnectionState::Disconnected);
    assert_eq!(later.reconnect_attempts, 3);
}

#[test]
fn stop_cancels_pending_reconnect() {
    let client = StreamClient::spawn(StreamConfig {
        reconnect_delay_ms: 300,
        max_reconnect_delay_ms: 300,
        ..config(&unused_port_url())
    })
    .unwrap();

    wait_until(&client, Duration::from_secs(5), |s| {
        s.reconnect_attempts >= 1 && s.state == ConnectionState::Disconnected
    });
    client.stop().unwrap();

    let updates = client.subscribe().unwrap();
    let deadline = Instant::now() + Duration::from_millis(800);
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match updates.recv_timeout(left) {
            Ok(snap) => assert_ne!(snap.state, ConnectionState::Connecting),
            Err(_) => break,
        }
    }
    assert_eq!(client.snapshot().state, ConnectionState::Disconnected);
    assert_eq!(client.snapshot().reconnect_attempts, 0);
}

#[test]
fn explicit_start_after_stop_reconnects() {
    let server = FeedServer::spawn(vec![]);
    let client = StreamClient::spawn(StreamConfig {
        auto_connect: false,
        ..config(&server.url)
    })
    .unwrap();
    assert_eq!(client.snapshot().state, ConnectionState::Disconnected);

    client.start().unwrap();
    wait_until(&client, Duration::from_secs(5), |s| {
        s.state == ConnectionState::Connected
    });
    client.stop().unwrap();
    client.start().unwrap();
    wait_until(&client, Duration::from_secs(5), |s| {
        s.state == ConnectionState::Connected
    });
    assert_eq!(server.accepted(), 2);
}
