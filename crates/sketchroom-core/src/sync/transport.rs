//! Transport abstraction and the native WebSocket implementation.

use super::SyncError;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::client::IntoClientRequest;
use tungstenite::http::HeaderValue;
use tungstenite::http::header::AUTHORIZATION;
use tungstenite::{Message, connect};

/// Something that happened on the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    /// The socket closed after being open.
    Closed,
    /// The socket could not be opened.
    Failed(String),
}

/// A message-oriented, non-blocking duplex connection.
pub trait Transport {
    /// Start opening a connection to `url`, authenticating with `credential`.
    /// Completion is reported through [`Transport::poll`].
    fn open(&mut self, url: &str, credential: &str) -> Result<(), SyncError>;

    /// Queue a text frame.
    fn send(&mut self, frame: String) -> Result<(), SyncError>;

    /// Drain pending events without blocking.
    fn poll(&mut self) -> Vec<TransportEvent>;

    fn close(&mut self);
}

enum WsCommand {
    Send(String),
    Close,
}

/// Blocking tungstenite socket driven from a background thread.
pub struct NativeWebSocket {
    /// Channel to send commands to the WebSocket thread.
    cmd_tx: Option<Sender<WsCommand>>,
    /// Channel to receive events from the WebSocket thread.
    event_rx: Option<Receiver<TransportEvent>>,
    _thread: Option<JoinHandle<()>>,
}

impl NativeWebSocket {
    pub fn new() -> Self {
        Self {
            cmd_tx: None,
            event_rx: None,
            _thread: None,
        }
    }
}

impl Default for NativeWebSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for NativeWebSocket {
    fn open(&mut self, url: &str, credential: &str) -> Result<(), SyncError> {
        // A previous socket may still be winding down.
        self.close();

        let mut request = url
            .into_client_request()
            .map_err(|e| SyncError::Connection(format!("invalid request: {e}")))?;
        if !credential.is_empty() {
            let bearer = HeaderValue::from_str(&format!("Bearer {credential}"))
                .map_err(|e| SyncError::Authentication(format!("invalid credential: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, bearer);
        }

        let (cmd_tx, cmd_rx) = channel::<WsCommand>();
        let (event_tx, event_rx) = channel::<TransportEvent>();
        let url = url.to_string();

        let handle = thread::spawn(move || {
            log::info!("WebSocket thread: connecting to {url}");
            let (mut socket, response) = match connect(request) {
                Ok(pair) => pair,
                Err(e) => {
                    log::error!("WebSocket connection failed: {e}");
                    let _ = event_tx.send(TransportEvent::Failed(e.to_string()));
                    return;
                }
            };
            log::info!("WebSocket connected, status: {}", response.status());
            let _ = event_tx.send(TransportEvent::Opened);

            if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
                let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
                let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
            }

            loop {
                match cmd_rx.try_recv() {
                    Ok(WsCommand::Send(msg)) => {
                        if let Err(e) = socket.send(Message::Text(msg)) {
                            log::error!("WebSocket send error: {e}");
                            break;
                        }
                    }
                    Ok(WsCommand::Close) => {
                        log::info!("WebSocket close requested");
                        let _ = socket.close(None);
                        break;
                    }
                    Err(TryRecvError::Disconnected) => break,
                    Err(TryRecvError::Empty) => {}
                }

                match socket.read() {
                    Ok(Message::Text(txt)) => {
                        if event_tx.send(TransportEvent::Message(txt)).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Ping(data)) => {
                        let _ = socket.send(Message::Pong(data));
                    }
                    Ok(Message::Close(_)) => {
                        log::info!("WebSocket received close frame");
                        break;
                    }
                    Ok(_) => {}
                    Err(tungstenite::Error::Io(ref e))
                        if e.kind() == std::io::ErrorKind::WouldBlock
                            || e.kind() == std::io::ErrorKind::TimedOut => {}
                    Err(e) => {
                        log::error!("WebSocket read error: {e}");
                        break;
                    }
                }
            }

            log::info!("WebSocket thread exiting");
            let _ = event_tx.send(TransportEvent::Closed);
        });

        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self._thread = Some(handle);
        Ok(())
    }

    fn send(&mut self, frame: String) -> Result<(), SyncError> {
        match &self.cmd_tx {
            Some(tx) => tx
                .send(WsCommand::Send(frame))
                .map_err(|e| SyncError::Transport(format!("send failed: {e}"))),
            None => Err(SyncError::Transport("not connected".to_string())),
        }
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        if let Some(rx) = &self.event_rx {
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }
        }
        events
    }

    fn close(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(WsCommand::Close);
        }
        self.event_rx = None;
        self._thread = None;
    }
}

impl Drop for NativeWebSocket {
    fn drop(&mut self) {
        self.close();
    }
}
