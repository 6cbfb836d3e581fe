//! Per-canvas relay state.
//!
//! A room holds the last known element collection and name, and turns
//! client messages into the broadcasts peers receive. Field conflicts are
//! settled by arrival order: the last message to touch a field wins.

use sketchroom_core::element::Element;
use sketchroom_core::sync::{ClientMessage, Originator, RoomUser, ServerMessage};
use std::collections::HashMap;

/// Error code sent back when a mutation names an element the room lacks.
pub const NOT_FOUND: &str = "not-found";

#[derive(Debug, Default)]
pub struct CanvasRoom {
    name: String,
    elements: Vec<Element>,
    /// Connected peers by connection id.
    peers: HashMap<String, RoomUser>,
}

impl CanvasRoom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Distinct users present, in join order of their first connection.
    pub fn users(&self) -> Vec<RoomUser> {
        let mut users: Vec<RoomUser> = Vec::new();
        let mut peers: Vec<(&String, &RoomUser)> = self.peers.iter().collect();
        peers.sort_by(|a, b| a.0.cmp(b.0));
        for (_, user) in peers {
            if !users.iter().any(|u| u.user_id == user.user_id) {
                users.push(user.clone());
            }
        }
        users
    }

    /// The snapshot a joining peer receives.
    pub fn snapshot(&self) -> ServerMessage {
        ServerMessage::Joined {
            name: self.name.clone(),
            description: String::new(),
            owner: None,
            elements: self.elements.clone(),
            shared_with: Vec::new(),
            is_public: false,
        }
    }

    /// Register a connection. Returns `true` if its user was not present yet.
    pub fn join(&mut self, peer_id: &str, user: RoomUser) -> bool {
        let first = !self.peers.values().any(|u| u.user_id == user.user_id);
        self.peers.insert(peer_id.to_string(), user);
        first
    }

    /// Drop a connection. Returns the user id if that was their last one.
    pub fn leave(&mut self, peer_id: &str) -> Option<String> {
        let user = self.peers.remove(peer_id)?;
        let still_here = self.peers.values().any(|u| u.user_id == user.user_id);
        (!still_here).then_some(user.user_id)
    }

    /// Apply one mutation or cursor message.
    ///
    /// `Ok` carries what to broadcast; `Err` carries an error for the sender
    /// alone. `join` is handled by the connection, not here.
    pub fn apply(
        &mut self,
        message: ClientMessage,
        originator: Originator,
        user_id: &str,
    ) -> Result<Option<ServerMessage>, ServerMessage> {
        let broadcast = match message {
            ClientMessage::Join { .. } => return Ok(None),
            ClientMessage::CanvasUpdate { elements, name, .. } => {
                self.elements = elements.clone();
                if !name.is_empty() {
                    self.name = name.clone();
                }
                ServerMessage::CanvasUpdated {
                    elements,
                    name,
                    updated_by: originator,
                }
            }
            ClientMessage::NameUpdate { name, .. } => {
                self.name = name.clone();
                ServerMessage::NameUpdated {
                    name,
                    updated_by: originator,
                }
            }
            ClientMessage::ElementCreate { element, .. } => {
                match self.elements.iter_mut().find(|e| e.id == element.id) {
                    Some(existing) => *existing = element.clone(),
                    None => self.elements.push(element.clone()),
                }
                ServerMessage::ElementCreated {
                    element,
                    created_by: originator,
                }
            }
            ClientMessage::ElementUpdate {
                element_id,
                updates,
                ..
            } => {
                let Some(element) = self.elements.iter_mut().find(|e| e.id == element_id) else {
                    return Err(not_found(element_id));
                };
                if let Err(err) = updates.apply(element) {
                    return Err(ServerMessage::Error {
                        message: err.to_string(),
                        code: Some("invalid-update".to_string()),
                    });
                }
                ServerMessage::ElementUpdated {
                    element_id,
                    updates,
                    updated_by: originator,
                }
            }
            ClientMessage::ElementDelete { element_id, .. } => {
                let Some(index) = self.elements.iter().position(|e| e.id == element_id) else {
                    return Err(not_found(element_id));
                };
                self.elements.remove(index);
                ServerMessage::ElementDeleted {
                    element_id,
                    deleted_by: originator,
                }
            }
            ClientMessage::CursorUpdate { position, .. } => ServerMessage::CursorUpdated {
                user_id: user_id.to_string(),
                position,
            },
        };
        Ok(Some(broadcast))
    }
}

fn not_found(id: impl std::fmt::Display) -> ServerMessage {
    ServerMessage::Error {
        message: format!("element {id} not found"),
        code: Some(NOT_FOUND.to_string()),
    }
}
