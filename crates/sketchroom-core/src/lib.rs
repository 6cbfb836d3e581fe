//! SketchRoom Core Library
//!
//! State synchronization engine for the SketchRoom collaborative drawing
//! surface: the element model, the interaction state machine with undo/redo,
//! the relay channel and the persistence fallback.

pub mod board;
pub mod canvas;
pub mod config;
pub mod element;
pub mod history;
pub mod persistence;
pub mod session;
pub mod sync;

pub use board::{Board, BoardChange, BoardConfig, InputEvent, Mode, Modifiers, ToolKind};
pub use canvas::{Canvas, CanvasDraft, ShareEntry, UserRef};
pub use config::SessionConfig;
pub use element::{
    Element, ElementError, ElementId, ElementKind, ElementPatch, ElementStyle, ElementType,
    create_element,
};
pub use history::History;
pub use persistence::{AutoSave, CanvasStore, HttpStore, MemoryStore, PersistenceError};
pub use session::CanvasSession;
pub use sync::{ConnectionState, NativeWebSocket, SyncChannel, SyncError, SyncEvent, Transport};
