//! Tools and input events.

use crate::element::ElementType;
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Selection,
    Line,
    Rectangle,
    Ellipse,
    Arrow,
    #[default]
    Freehand,
    Text,
    Eraser,
    /// Read-only: pointer input and editing shortcuts are ignored.
    None,
}

impl ToolKind {
    /// Element type created by this tool, if it is a drawing tool.
    pub fn element_type(self) -> Option<ElementType> {
        match self {
            ToolKind::Line => Some(ElementType::Line),
            ToolKind::Rectangle => Some(ElementType::Rectangle),
            ToolKind::Ellipse => Some(ElementType::Ellipse),
            ToolKind::Arrow => Some(ElementType::Arrow),
            ToolKind::Freehand => Some(ElementType::Freehand),
            ToolKind::Text => Some(ElementType::Text),
            ToolKind::Selection | ToolKind::Eraser | ToolKind::None => None,
        }
    }

    pub fn is_read_only(self) -> bool {
        self == ToolKind::None
    }
}

/// Modifier keys state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const CTRL: Self = Self {
        shift: false,
        ctrl: true,
        alt: false,
        meta: false,
    };

    /// Ctrl on most platforms, Cmd on macOS.
    pub fn command(&self) -> bool {
        self.ctrl || self.meta
    }
}

/// Editing commands bound to keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    Undo,
    Redo,
    Copy,
    Paste,
    Delete,
}

impl Shortcut {
    /// Map a key press (DOM-style key names) to a command.
    pub fn from_key(key: &str, modifiers: Modifiers) -> Option<Self> {
        if modifiers.command() {
            match key.to_ascii_lowercase().as_str() {
                "z" if modifiers.shift => Some(Shortcut::Redo),
                "z" => Some(Shortcut::Undo),
                "y" => Some(Shortcut::Redo),
                "c" => Some(Shortcut::Copy),
                "v" => Some(Shortcut::Paste),
                _ => None,
            }
        } else {
            match key {
                "Delete" | "Backspace" => Some(Shortcut::Delete),
                _ => None,
            }
        }
    }
}

/// Input fed to the board by the host UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    PointerDown(Point),
    PointerMove(Point),
    PointerUp,
    /// The text editor lost focus with this content.
    TextCommitted(String),
    ToolChanged(ToolKind),
    Key { key: String, modifiers: Modifiers },
    /// Paste the clipboard, optionally anchored at a point.
    Paste(Option<Point>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shortcuts() {
        assert_eq!(Shortcut::from_key("z", Modifiers::CTRL), Some(Shortcut::Undo));
        assert_eq!(Shortcut::from_key("Y", Modifiers::CTRL), Some(Shortcut::Redo));
        let cmd_shift = Modifiers {
            shift: true,
            meta: true,
            ..Modifiers::default()
        };
        assert_eq!(Shortcut::from_key("z", cmd_shift), Some(Shortcut::Redo));
        assert_eq!(Shortcut::from_key("Backspace", Modifiers::default()), Some(Shortcut::Delete));
        assert_eq!(Shortcut::from_key("z", Modifiers::default()), None);
        assert_eq!(Shortcut::from_key("Delete", Modifiers::CTRL), None);
    }

    #[test]
    fn test_tool_element_types() {
        assert_eq!(ToolKind::Arrow.element_type(), Some(ElementType::Arrow));
        assert_eq!(ToolKind::Eraser.element_type(), None);
        assert!(ToolKind::None.is_read_only());
        assert!(!ToolKind::Selection.is_read_only());
    }
}
