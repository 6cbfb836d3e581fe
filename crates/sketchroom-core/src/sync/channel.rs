//! The sync channel: protocol, lifecycle and echo suppression on top of a
//! [`Transport`].

use super::connection::{Connection, ConnectionState};
use super::protocol::{ClientMessage, CursorPosition, Originator, OutboundFrame, ServerMessage};
use super::transport::{Transport, TransportEvent};
use super::SyncError;
use crate::config::SessionConfig;
use crate::element::{Element, ElementId, ElementPatch};
use std::time::Instant;

/// Events surfaced to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Connected,
    Disconnected { retrying: bool },
    /// Reconnect budget spent; persistence takes over.
    GaveUp,
    /// A message from a peer (never our own echo).
    Message(ServerMessage),
    Error(SyncError),
}

/// Bidirectional channel to the relay for one canvas.
///
/// Outbound operations are fire-and-forget: while not connected they are
/// dropped (the periodic full save covers the gap) and report `false`.
pub struct SyncChannel<T: Transport> {
    endpoint: String,
    credential: String,
    canvas_id: Option<String>,
    originator: Originator,
    connection: Connection,
    transport: T,
}

impl<T: Transport> SyncChannel<T> {
    pub fn new(config: &SessionConfig, transport: T) -> Result<Self, SyncError> {
        let endpoint = config.endpoint_url()?;
        let originator = config
            .originator
            .clone()
            .map(Originator)
            .unwrap_or_else(Originator::random);
        Ok(Self {
            endpoint: endpoint.to_string(),
            credential: config.credential.clone(),
            canvas_id: config.canvas_id.clone(),
            originator,
            connection: Connection::new(config.reconnect_policy()),
            transport,
        })
    }

    /// Open the connection. Completion arrives as [`SyncEvent::Connected`].
    pub fn connect(&mut self, now: Instant) -> Result<(), SyncError> {
        self.connection.begin();
        if let Err(err) = self.transport.open(&self.endpoint, &self.credential) {
            log::warn!("sync: could not open {}: {err}", self.endpoint);
            self.connection.failed(now);
            return Err(err);
        }
        Ok(())
    }

    /// Tear down for good; no reconnects follow.
    pub fn disconnect(&mut self) {
        self.connection.close();
        self.transport.close();
    }

    /// Drive reconnects and drain inbound traffic.
    pub fn poll(&mut self, now: Instant) -> Vec<SyncEvent> {
        let mut events = Vec::new();

        if self.connection.retry_due(now) {
            log::info!(
                "sync: reconnect attempt {} to {}",
                self.connection.attempts(),
                self.endpoint
            );
            if let Err(err) = self.transport.open(&self.endpoint, &self.credential) {
                log::warn!("sync: reconnect failed: {err}");
                self.connection_lost(now, &mut events);
            }
        }

        for event in self.transport.poll() {
            match event {
                TransportEvent::Opened => {
                    log::info!("sync: connected to {}", self.endpoint);
                    self.connection.opened();
                    events.push(SyncEvent::Connected);
                    self.join();
                }
                TransportEvent::Failed(reason) => {
                    log::warn!("sync: connection failed: {reason}");
                    self.connection_lost(now, &mut events);
                }
                TransportEvent::Closed => {
                    log::info!("sync: connection closed");
                    self.connection_lost(now, &mut events);
                }
                TransportEvent::Message(text) => {
                    if let Some(event) = self.decode(&text) {
                        events.push(event);
                    }
                }
            }
        }
        events
    }

    fn connection_lost(&mut self, now: Instant, events: &mut Vec<SyncEvent>) {
        let already_gave_up = self.connection.gave_up();
        let retrying = self.connection.failed(now);
        events.push(SyncEvent::Disconnected { retrying });
        if !retrying && !already_gave_up {
            log::error!(
                "sync: giving up after {} reconnect attempts, falling back to persistence",
                self.connection.attempts()
            );
            events.push(SyncEvent::GaveUp);
        }
    }

    fn decode(&self, text: &str) -> Option<SyncEvent> {
        let message: ServerMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(err) => {
                log::warn!("sync: dropping malformed frame: {err}");
                return None;
            }
        };
        if message.originator() == Some(&self.originator) {
            log::debug!("sync: suppressing echo of {}", message.kind());
            return None;
        }
        match message {
            ServerMessage::Error { message, code } => {
                let err = match code.as_deref() {
                    Some("unauthorized" | "forbidden") => SyncError::Authentication(message),
                    _ => SyncError::ElementOperation(message),
                };
                log::warn!("sync: relay reported {err}");
                Some(SyncEvent::Error(err))
            }
            message => Some(SyncEvent::Message(message)),
        }
    }

    fn join(&mut self) {
        if let Some(canvas_id) = self.canvas_id.clone() {
            self.send(ClientMessage::Join { canvas_id });
        }
    }

    /// Canvas id to address, if connected to a known canvas.
    fn room(&self) -> Option<String> {
        if !self.connection.is_connected() {
            return None;
        }
        self.canvas_id.clone()
    }

    fn send(&mut self, message: ClientMessage) -> bool {
        let kind = message.kind();
        let frame = OutboundFrame {
            message,
            originator: self.originator.clone(),
        };
        let json = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(err) => {
                log::error!("sync: cannot encode {kind}: {err}");
                return false;
            }
        };
        match self.transport.send(json) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("sync: {kind} not sent: {err}");
                false
            }
        }
    }

    pub fn create_element(&mut self, element: &Element) -> bool {
        let Some(canvas_id) = self.room() else {
            return false;
        };
        self.send(ClientMessage::ElementCreate {
            canvas_id,
            element: element.clone(),
        })
    }

    pub fn update_element(&mut self, element_id: ElementId, updates: ElementPatch) -> bool {
        let Some(canvas_id) = self.room() else {
            return false;
        };
        self.send(ClientMessage::ElementUpdate {
            canvas_id,
            element_id,
            updates,
        })
    }

    pub fn delete_element(&mut self, element_id: ElementId) -> bool {
        let Some(canvas_id) = self.room() else {
            return false;
        };
        self.send(ClientMessage::ElementDelete {
            canvas_id,
            element_id,
        })
    }

    pub fn update_canvas(&mut self, elements: &[Element], name: &str) -> bool {
        let Some(canvas_id) = self.room() else {
            return false;
        };
        self.send(ClientMessage::CanvasUpdate {
            canvas_id,
            elements: elements.to_vec(),
            name: name.to_string(),
        })
    }

    pub fn update_name(&mut self, name: &str) -> bool {
        let Some(canvas_id) = self.room() else {
            return false;
        };
        self.send(ClientMessage::NameUpdate {
            canvas_id,
            name: name.to_string(),
        })
    }

    pub fn update_cursor(&mut self, position: CursorPosition) -> bool {
        let Some(canvas_id) = self.room() else {
            return false;
        };
        self.send(ClientMessage::CursorUpdate {
            canvas_id,
            position,
        })
    }

    /// Address a (newly created) canvas, joining it if already connected.
    pub fn set_canvas_id(&mut self, canvas_id: String) {
        self.canvas_id = Some(canvas_id);
        if self.connection.is_connected() {
            self.join();
        }
    }

    pub fn canvas_id(&self) -> Option<&str> {
        self.canvas_id.as_deref()
    }

    pub fn originator(&self) -> &Originator {
        &self.originator
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn has_given_up(&self) -> bool {
        self.connection.gave_up()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
