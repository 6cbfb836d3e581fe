//! Relay wire protocol.
//!
//! Every frame is a JSON object whose `type` names the event. Outbound frames
//! also carry the sender's `originator`; the relay copies it into the
//! `createdBy`/`updatedBy`/`deletedBy` field of what it broadcasts.

use crate::canvas::{ShareEntry, UserRef};
use crate::element::{Element, ElementId, ElementPatch};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity tag used to recognize our own echoes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Originator(pub String);

impl Originator {
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for Originator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A pointer position in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

/// A connected participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUser {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Messages sent to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Join {
        canvas_id: String,
    },
    CanvasUpdate {
        canvas_id: String,
        elements: Vec<Element>,
        name: String,
    },
    NameUpdate {
        canvas_id: String,
        name: String,
    },
    ElementCreate {
        canvas_id: String,
        element: Element,
    },
    ElementUpdate {
        canvas_id: String,
        element_id: ElementId,
        updates: ElementPatch,
    },
    ElementDelete {
        canvas_id: String,
        element_id: ElementId,
    },
    CursorUpdate {
        canvas_id: String,
        position: CursorPosition,
    },
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Join { .. } => "join",
            ClientMessage::CanvasUpdate { .. } => "canvas-update",
            ClientMessage::NameUpdate { .. } => "name-update",
            ClientMessage::ElementCreate { .. } => "element-create",
            ClientMessage::ElementUpdate { .. } => "element-update",
            ClientMessage::ElementDelete { .. } => "element-delete",
            ClientMessage::CursorUpdate { .. } => "cursor-update",
        }
    }

    pub fn canvas_id(&self) -> &str {
        match self {
            ClientMessage::Join { canvas_id }
            | ClientMessage::CanvasUpdate { canvas_id, .. }
            | ClientMessage::NameUpdate { canvas_id, .. }
            | ClientMessage::ElementCreate { canvas_id, .. }
            | ClientMessage::ElementUpdate { canvas_id, .. }
            | ClientMessage::ElementDelete { canvas_id, .. }
            | ClientMessage::CursorUpdate { canvas_id, .. } => canvas_id,
        }
    }
}

/// A client message tagged with its sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundFrame {
    #[serde(flatten)]
    pub message: ClientMessage,
    pub originator: Originator,
}

/// Messages received from the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Authoritative state of the canvas just joined.
    Joined {
        #[serde(default)]
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner: Option<UserRef>,
        #[serde(default)]
        elements: Vec<Element>,
        #[serde(default, rename = "shared_with")]
        shared_with: Vec<ShareEntry>,
        #[serde(default)]
        is_public: bool,
    },
    CanvasUpdated {
        elements: Vec<Element>,
        #[serde(default)]
        name: String,
        updated_by: Originator,
    },
    NameUpdated {
        name: String,
        updated_by: Originator,
    },
    ElementCreated {
        element: Element,
        created_by: Originator,
    },
    ElementUpdated {
        element_id: ElementId,
        updates: ElementPatch,
        updated_by: Originator,
    },
    ElementDeleted {
        element_id: ElementId,
        deleted_by: Originator,
    },
    CursorUpdated {
        user_id: String,
        position: CursorPosition,
    },
    RoomUsers {
        users: Vec<RoomUser>,
    },
    UserJoined {
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    UserLeft {
        user_id: String,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl ServerMessage {
    /// Who caused this message, for mutation broadcasts.
    pub fn originator(&self) -> Option<&Originator> {
        match self {
            ServerMessage::CanvasUpdated { updated_by, .. }
            | ServerMessage::NameUpdated { updated_by, .. }
            | ServerMessage::ElementUpdated { updated_by, .. } => Some(updated_by),
            ServerMessage::ElementCreated { created_by, .. } => Some(created_by),
            ServerMessage::ElementDeleted { deleted_by, .. } => Some(deleted_by),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Joined { .. } => "joined",
            ServerMessage::CanvasUpdated { .. } => "canvas-updated",
            ServerMessage::NameUpdated { .. } => "name-updated",
            ServerMessage::ElementCreated { .. } => "element-created",
            ServerMessage::ElementUpdated { .. } => "element-updated",
            ServerMessage::ElementDeleted { .. } => "element-deleted",
            ServerMessage::CursorUpdated { .. } => "cursor-updated",
            ServerMessage::RoomUsers { .. } => "room-users",
            ServerMessage::UserJoined { .. } => "user-joined",
            ServerMessage::UserLeft { .. } => "user-left",
            ServerMessage::Error { .. } => "error",
        }
    }
}
